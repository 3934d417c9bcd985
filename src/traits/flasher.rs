use std::path::Path;

#[cfg(test)]
use mockall::automock;

/// Writes a firmware binary to the device behind a port.
///
/// The call blocks until the device has been written (or the write has
/// failed) and cannot be interrupted once started.
#[cfg_attr(test, automock)]
pub trait FirmwareFlasher: Send + Sync {
    /// Flash `binary_path` to the device on `port`.
    ///
    /// Returns a human-readable result message on success, or the failure
    /// cause.
    fn flash(&self, port: &str, binary_path: &Path) -> Result<String, String>;
}
