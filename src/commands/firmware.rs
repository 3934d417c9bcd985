//! Tauri commands for custom firmware and release assets.

use std::path::PathBuf;

use tauri::State;

use super::to_message;
use crate::release::ReleaseAsset;
use crate::service::FlasherService;
use crate::storage::StoredFirmware;

#[tauri::command]
pub async fn list_custom_firmware(
    service: State<'_, FlasherService>,
) -> Result<Vec<String>, String> {
    service.list_custom_firmware().await.map_err(to_message)
}

#[tauri::command]
pub async fn get_custom_firmware_info(
    filename: String,
    service: State<'_, FlasherService>,
) -> Result<StoredFirmware, String> {
    service
        .custom_firmware_info(&filename)
        .await
        .map_err(to_message)
}

#[tauri::command]
pub async fn delete_custom_firmware(
    filename: String,
    service: State<'_, FlasherService>,
) -> Result<(), String> {
    service
        .delete_custom_firmware(&filename)
        .await
        .map_err(to_message)
}

/// Copy a file picked in the dialog into the custom firmware store.
///
/// Returns the stored filename, which may carry a numeric suffix.
#[tauri::command]
pub async fn import_custom_firmware(
    source_path: String,
    name: Option<String>,
    service: State<'_, FlasherService>,
) -> Result<String, String> {
    service
        .import_custom_firmware(&PathBuf::from(source_path), name.as_deref())
        .await
        .map_err(to_message)
}

/// Firmware assets of the latest release.
///
/// Uses the configured repository when `repository` is omitted.
#[tauri::command]
pub async fn fetch_release_assets(
    repository: Option<String>,
    service: State<'_, FlasherService>,
) -> Result<Vec<ReleaseAsset>, String> {
    service
        .fetch_release_assets(repository.as_deref())
        .await
        .map_err(to_message)
}

/// Download a release asset into the custom firmware store.
#[tauri::command]
pub async fn download_release_asset(
    url: String,
    name: Option<String>,
    service: State<'_, FlasherService>,
) -> Result<String, String> {
    service
        .download_and_store_asset(&url, name.as_deref())
        .await
        .map_err(to_message)
}
