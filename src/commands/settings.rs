//! Tauri commands for flasher settings management.
//!
//! Settings persist to a JSON file in the app data directory.

use tauri::State;

use super::to_message;
use crate::service::FlasherService;
use crate::settings::FlasherSettings;

/// Current settings. Defaults apply when no settings file exists yet.
#[tauri::command]
pub fn get_settings(service: State<'_, FlasherService>) -> FlasherSettings {
    service.settings()
}

/// Save settings to disk.
#[tauri::command]
pub fn save_settings(
    settings: FlasherSettings,
    service: State<'_, FlasherService>,
) -> Result<(), String> {
    service.save_settings(settings).map_err(to_message)
}
