//! On-disk storage for custom firmware images.
//!
//! Every custom firmware is a single file inside a dedicated directory; the
//! filename is its identifier everywhere else in the app. Nothing is cached
//! in memory: each call looks at the directory again.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{FlasherError, FlasherResult};
use crate::traits::FirmwareStore;

/// Directory (inside the app data directory) holding custom firmware.
pub const CUSTOM_FIRMWARE_DIR: &str = "custom_firmware";

/// Prefix of in-flight writes; such files never show up in listings.
const PARTIAL_PREFIX: &str = ".partial-";

/// Details of a stored custom firmware, for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFirmware {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// RFC 3339 timestamp of the last write.
    pub stored_at: String,
}

/// Check that `filename` names a single file inside the storage directory.
pub fn validate_filename(filename: &str) -> FlasherResult<()> {
    let invalid = filename.trim().is_empty()
        || filename != filename.trim()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', ':', '\0']);

    if invalid {
        return Err(FlasherError::InvalidFilename {
            filename: filename.to_string(),
        });
    }
    Ok(())
}

/// Calculate the SHA256 hash of in-memory data.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Calculate SHA256 hash of a file
pub fn calculate_sha256(file_path: &Path) -> FlasherResult<String> {
    let mut file = fs::File::open(file_path).map_err(|e| {
        FlasherError::StorageFailure(format!("Failed to open file for hashing: {}", e))
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| {
            FlasherError::StorageFailure(format!("Failed to read file for hashing: {}", e))
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Custom firmware store backed by a plain directory.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `<app_data_dir>/custom_firmware`.
    pub fn new(app_data_dir: &Path) -> Self {
        Self::at(app_data_dir.join(CUSTOM_FIRMWARE_DIR))
    }

    /// Store rooted exactly at `root`.
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, filename: &str) -> FlasherResult<PathBuf> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    fn existing_file(&self, filename: &str) -> FlasherResult<PathBuf> {
        let path = self.file_path(filename)?;
        if !path.is_file() {
            return Err(FlasherError::NotFound {
                filename: filename.to_string(),
            });
        }
        Ok(path)
    }
}

impl FirmwareStore for DirectoryStore {
    fn list(&self) -> FlasherResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            FlasherError::StorageFailure(format!("Failed to read firmware directory: {}", e))
        })?;

        let mut filenames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                FlasherError::StorageFailure(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if validate_filename(name).is_ok() {
                    filenames.push(name.to_string());
                }
            }
        }

        filenames.sort();
        Ok(filenames)
    }

    fn read(&self, filename: &str) -> FlasherResult<Vec<u8>> {
        let path = self.existing_file(filename)?;
        fs::read(&path).map_err(|e| {
            FlasherError::StorageFailure(format!("Failed to read {}: {}", filename, e))
        })
    }

    fn store(&self, filename: &str, bytes: &[u8], overwrite: bool) -> FlasherResult<()> {
        let target = self.file_path(filename)?;
        if target.exists() && !overwrite {
            return Err(FlasherError::NameConflict {
                filename: filename.to_string(),
            });
        }

        fs::create_dir_all(&self.root).map_err(|e| {
            FlasherError::StorageFailure(format!("Failed to create firmware directory: {}", e))
        })?;

        // Write next to the target and rename so a listing never sees a
        // half-written binary.
        let mut partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| {
                FlasherError::StorageFailure(format!("Failed to create temporary file: {}", e))
            })?;
        partial
            .write_all(bytes)
            .and_then(|_| partial.flush())
            .map_err(|e| {
                FlasherError::StorageFailure(format!("Failed to write {}: {}", filename, e))
            })?;

        if overwrite {
            partial.persist(&target).map_err(|e| {
                FlasherError::StorageFailure(format!("Failed to store {}: {}", filename, e.error))
            })?;
        } else {
            // persist_noclobber closes the gap between the exists() check
            // above and the rename.
            partial.persist_noclobber(&target).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    FlasherError::NameConflict {
                        filename: filename.to_string(),
                    }
                } else {
                    FlasherError::StorageFailure(format!(
                        "Failed to store {}: {}",
                        filename, e.error
                    ))
                }
            })?;
        }

        log::debug!("Stored {} ({} bytes)", filename, bytes.len());
        Ok(())
    }

    fn delete(&self, filename: &str) -> FlasherResult<()> {
        let path = self.existing_file(filename)?;
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlasherError::NotFound {
                    filename: filename.to_string(),
                }
            } else {
                FlasherError::StorageFailure(format!("Failed to delete {}: {}", filename, e))
            }
        })
    }

    fn path_of(&self, filename: &str) -> FlasherResult<PathBuf> {
        self.existing_file(filename)
    }

    fn describe(&self, filename: &str) -> FlasherResult<StoredFirmware> {
        let path = self.existing_file(filename)?;
        let metadata = fs::metadata(&path)?;

        let stored_at = match metadata.modified() {
            Ok(time) => {
                let datetime: chrono::DateTime<chrono::Utc> = time.into();
                datetime.to_rfc3339()
            }
            Err(_) => chrono::Utc::now().to_rfc3339(),
        };

        Ok(StoredFirmware {
            filename: filename.to_string(),
            size_bytes: metadata.len(),
            sha256: calculate_sha256(&path)?,
            stored_at,
        })
    }
}
