//! Tauri commands driving the flash session.

use tauri::State;

use super::to_message;
use crate::service::FlasherService;
use crate::session::FlashSessionSnapshot;

/// Flash `firmware` (a built-in kind or a custom filename) to `port`.
///
/// Resolves once the device has been written or the attempt has failed.
/// Progress is observable through the `flash-session` event.
#[tauri::command]
pub async fn flash_firmware(
    port: String,
    firmware: String,
    service: State<'_, FlasherService>,
) -> Result<String, String> {
    service
        .flash_firmware(&port, &firmware)
        .await
        .map_err(to_message)
}

#[tauri::command]
pub fn get_flash_session(service: State<'_, FlasherService>) -> FlashSessionSnapshot {
    service.flash_status()
}

/// Dismiss a finished session's outcome.
#[tauri::command]
pub fn acknowledge_flash(service: State<'_, FlasherService>) -> Result<(), String> {
    service.acknowledge_flash().map_err(to_message)
}
