//! Firmware catalog: built-in images, stored custom images and remote assets.
//!
//! The catalog is the single authority that classifies a firmware
//! identifier. Built-in kind tags win over custom filenames; anything else
//! is looked up in storage, reloaded on every call.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FlasherError, FlasherResult};
use crate::release::ReleaseAsset;
use crate::storage::{sha256_hex, validate_filename, StoredFirmware};
use crate::traits::{FirmwareStore, ReleaseClient};

/// Subdirectory of the bundled resources that holds built-in images.
pub const BUILTIN_FIRMWARE_DIR: &str = "files";

/// Give up suffixing after this many attempts.
const MAX_NAME_SUFFIX: u32 = 99;

/// The three firmware variants bundled with the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmwareKind {
    #[serde(rename = "BLE")]
    Ble,
    #[serde(rename = "Serial")]
    Serial,
    #[serde(rename = "WiFi")]
    WiFi,
}

impl FirmwareKind {
    pub const ALL: [FirmwareKind; 3] = [FirmwareKind::Ble, FirmwareKind::Serial, FirmwareKind::WiFi];

    /// Identifier used to request this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            FirmwareKind::Ble => "BLE",
            FirmwareKind::Serial => "Serial",
            FirmwareKind::WiFi => "WiFi",
        }
    }

    /// Bundled binary for this variant.
    pub fn file_name(&self) -> &'static str {
        match self {
            FirmwareKind::Ble => "NPG-LITE-BLE.ino.bin",
            FirmwareKind::Serial => "NPG-LITE.ino.bin",
            FirmwareKind::WiFi => "NPG-LITE-WiFi.ino.bin",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for FirmwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Where a firmware binary comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FirmwareSource {
    Builtin {
        kind: FirmwareKind,
    },
    Custom {
        filename: String,
    },
    /// Known from a release listing; must be materialized before flashing.
    #[serde(rename_all = "camelCase")]
    Remote {
        display_name: String,
        download_url: String,
    },
}

impl From<ReleaseAsset> for FirmwareSource {
    fn from(asset: ReleaseAsset) -> Self {
        FirmwareSource::Remote {
            display_name: asset.display_name,
            download_url: asset.download_url,
        }
    }
}

/// A resolved firmware binary, read into memory.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    pub source: FirmwareSource,
    pub path: PathBuf,
    pub data: Vec<u8>,
}

impl FirmwareImage {
    pub fn sha256(&self) -> String {
        sha256_hex(&self.data)
    }
}

/// `name.bin` -> `name-1.bin`, `name` -> `name-1`.
fn suffixed_name(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, n, ext),
        _ => format!("{}-{}", filename, n),
    }
}

/// Last path segment of a URL, without query or fragment.
fn name_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

/// Store `data` under `desired` or the first free suffixed name.
///
/// Identical content already stored under a candidate name is reused.
fn store_deterministic(
    store: &dyn FirmwareStore,
    desired: &str,
    data: &[u8],
    overwrite: bool,
) -> FlasherResult<String> {
    validate_filename(desired)?;

    if overwrite {
        store.store(desired, data, true)?;
        return Ok(desired.to_string());
    }

    let existing = store.list()?;
    let digest = sha256_hex(data);

    for n in 0..=MAX_NAME_SUFFIX {
        let candidate = if n == 0 {
            desired.to_string()
        } else {
            suffixed_name(desired, n)
        };

        if !existing.contains(&candidate) {
            match store.store(&candidate, data, false) {
                Ok(()) => return Ok(candidate),
                // Someone else took the name since we listed; keep looking.
                Err(FlasherError::NameConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        if sha256_hex(&store.read(&candidate)?) == digest {
            log::info!("{} already stored as {}", desired, candidate);
            return Ok(candidate);
        }
    }

    Err(FlasherError::NameConflict {
        filename: desired.to_string(),
    })
}

/// Resolves firmware identifiers and manages the custom firmware set.
pub struct FirmwareCatalog {
    builtin_dir: PathBuf,
    store: Arc<dyn FirmwareStore>,
    downloader: Arc<dyn ReleaseClient>,
    download_timeout: Duration,
}

impl FirmwareCatalog {
    /// `resource_dir` is the bundled resource directory; built-in images
    /// live in its `files/` subdirectory.
    pub fn new(
        resource_dir: &Path,
        store: Arc<dyn FirmwareStore>,
        downloader: Arc<dyn ReleaseClient>,
        download_timeout: Duration,
    ) -> Self {
        Self {
            builtin_dir: resource_dir.join(BUILTIN_FIRMWARE_DIR),
            store,
            downloader,
            download_timeout,
        }
    }

    /// Path of the bundled binary for `kind`.
    pub fn builtin_path(&self, kind: FirmwareKind) -> PathBuf {
        self.builtin_dir.join(kind.file_name())
    }

    /// Run a blocking storage call off the async executor.
    async fn with_store<T, F>(&self, f: F) -> FlasherResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FirmwareStore) -> FlasherResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| FlasherError::StorageFailure(format!("Storage task failed: {}", e)))?
    }

    /// List stored custom firmware, freshly read from storage.
    pub async fn list_custom(&self) -> FlasherResult<Vec<String>> {
        self.with_store(|store| store.list()).await
    }

    /// Classify `identifier` as a built-in kind or a stored custom firmware.
    pub async fn resolve(&self, identifier: &str) -> FlasherResult<FirmwareSource> {
        if let Some(kind) = FirmwareKind::from_tag(identifier) {
            return Ok(FirmwareSource::Builtin { kind });
        }

        let custom = self.list_custom().await?;
        if custom.iter().any(|name| name == identifier) {
            return Ok(FirmwareSource::Custom {
                filename: identifier.to_string(),
            });
        }

        Err(FlasherError::UnknownFirmware {
            identifier: identifier.to_string(),
        })
    }

    /// Read the binary behind a resolved source.
    ///
    /// Remote sources are not flashable and resolve to `UnknownFirmware`.
    pub async fn load(&self, source: &FirmwareSource) -> FlasherResult<FirmwareImage> {
        let (path, data) = match source {
            FirmwareSource::Builtin { kind } => {
                let path = self.builtin_path(*kind);
                let read_path = path.clone();
                let data = tokio::task::spawn_blocking(move || std::fs::read(&read_path))
                    .await
                    .map_err(|e| {
                        FlasherError::StorageFailure(format!("Storage task failed: {}", e))
                    })?
                    .map_err(|e| {
                        FlasherError::StorageFailure(format!(
                            "Failed to open {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                (path, data)
            }
            FirmwareSource::Custom { filename } => {
                let filename = filename.clone();
                self.with_store(move |store| {
                    let path = store.path_of(&filename)?;
                    let data = store.read(&filename)?;
                    Ok((path, data))
                })
                .await
                .map_err(|e| match e {
                    FlasherError::NotFound { filename } => FlasherError::UnknownFirmware {
                        identifier: filename,
                    },
                    other => other,
                })?
            }
            FirmwareSource::Remote { display_name, .. } => {
                return Err(FlasherError::UnknownFirmware {
                    identifier: display_name.clone(),
                })
            }
        };

        Ok(FirmwareImage {
            source: source.clone(),
            path,
            data,
        })
    }

    /// Resolve `identifier` and read its bytes in the same step.
    ///
    /// For custom firmware the listing and the read happen in one storage
    /// call, so the returned image is the content the identifier named at
    /// resolution time even if the file is replaced right after.
    pub async fn capture(&self, identifier: &str) -> FlasherResult<FirmwareImage> {
        if let Some(kind) = FirmwareKind::from_tag(identifier) {
            return self.load(&FirmwareSource::Builtin { kind }).await;
        }

        let filename = identifier.to_string();
        self.with_store(move |store| {
            if !store.list()?.contains(&filename) {
                return Err(FlasherError::UnknownFirmware {
                    identifier: filename,
                });
            }
            let path = store.path_of(&filename)?;
            let data = store.read(&filename)?;
            Ok(FirmwareImage {
                source: FirmwareSource::Custom { filename },
                path,
                data,
            })
        })
        .await
        .map_err(|e| match e {
            FlasherError::NotFound { filename } => FlasherError::UnknownFirmware {
                identifier: filename,
            },
            other => other,
        })
    }

    /// Remove a custom firmware. Callers re-list afterwards.
    pub async fn delete(&self, filename: &str) -> FlasherResult<()> {
        let name = filename.to_string();
        self.with_store(move |store| store.delete(&name)).await?;
        log::info!("Deleted custom firmware {}", filename);
        Ok(())
    }

    /// Details of a stored custom firmware.
    pub async fn describe(&self, filename: &str) -> FlasherResult<StoredFirmware> {
        let name = filename.to_string();
        self.with_store(move |store| store.describe(&name)).await
    }

    /// Download a release asset and store it as custom firmware.
    ///
    /// The stored name is `desired_name`, else the asset name, else the last
    /// URL segment; collisions follow the deterministic suffix policy.
    /// Returns the filename, which resolves as `Custom` from now on.
    pub async fn materialize_remote(
        &self,
        asset: &ReleaseAsset,
        desired_name: Option<&str>,
        overwrite: bool,
    ) -> FlasherResult<String> {
        let desired = desired_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| Some(asset.display_name.as_str()).filter(|name| !name.trim().is_empty()))
            .or_else(|| name_from_url(&asset.download_url))
            .ok_or_else(|| FlasherError::InvalidFilename {
                filename: String::new(),
            })?
            .to_string();
        validate_filename(&desired)?;

        log::info!("Downloading {} from {}", desired, asset.download_url);
        let timeout = self.download_timeout;
        let data = tokio::time::timeout(timeout, self.downloader.download(&asset.download_url, timeout))
            .await
            .map_err(|_| FlasherError::DownloadTimeout {
                timeout_secs: timeout.as_secs(),
            })??;

        if data.is_empty() {
            return Err(FlasherError::DownloadFailed(format!(
                "{} is an empty file",
                asset.download_url
            )));
        }

        let size = data.len();
        let filename = self
            .with_store(move |store| store_deterministic(store, &desired, &data, overwrite))
            .await?;
        log::info!("Stored downloaded firmware as {} ({} bytes)", filename, size);

        Ok(filename)
    }

    /// Copy a user-supplied binary into custom storage.
    pub async fn import_local(
        &self,
        source_path: &Path,
        desired_name: Option<&str>,
        overwrite: bool,
    ) -> FlasherResult<String> {
        let desired = match desired_name.filter(|name| !name.trim().is_empty()) {
            Some(name) => name.to_string(),
            None => source_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| FlasherError::InvalidFilename {
                    filename: source_path.display().to_string(),
                })?,
        };
        validate_filename(&desired)?;

        let source_path = source_path.to_path_buf();
        let filename = self
            .with_store(move |store| {
                let data = std::fs::read(&source_path).map_err(|e| {
                    FlasherError::StorageFailure(format!(
                        "Failed to read {}: {}",
                        source_path.display(),
                        e
                    ))
                })?;
                if data.is_empty() {
                    return Err(FlasherError::StorageFailure(format!(
                        "File {} is empty",
                        source_path.display()
                    )));
                }
                store_deterministic(store, &desired, &data, overwrite)
            })
            .await?;
        log::info!("Imported custom firmware {}", filename);

        Ok(filename)
    }
}
