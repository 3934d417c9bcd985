use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

use crate::error::FlasherResult;
use crate::storage::StoredFirmware;

/// Persistent storage for custom firmware images, one binary per filename.
///
/// The store is the single source of truth for which custom firmware
/// exists. Implementations may block.
#[cfg_attr(test, automock)]
pub trait FirmwareStore: Send + Sync {
    /// List stored filenames in a stable order.
    fn list(&self) -> FlasherResult<Vec<String>>;

    /// Read the full contents of a stored binary.
    fn read(&self, filename: &str) -> FlasherResult<Vec<u8>>;

    /// Store `bytes` under `filename`.
    ///
    /// Fails with `NameConflict` if the name is taken and `overwrite` is false.
    fn store(&self, filename: &str, bytes: &[u8], overwrite: bool) -> FlasherResult<()>;

    /// Remove a stored binary. Fails with `NotFound` if it does not exist.
    fn delete(&self, filename: &str) -> FlasherResult<()>;

    /// Location of a stored binary on disk.
    fn path_of(&self, filename: &str) -> FlasherResult<PathBuf>;

    /// Size, hash and timestamp of a stored binary.
    fn describe(&self, filename: &str) -> FlasherResult<StoredFirmware>;
}
