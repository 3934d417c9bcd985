//! Tauri commands for serial port listing.

use tauri::State;

use crate::ports::Port;
use crate::service::FlasherService;

/// Ports from the latest background scan.
#[tauri::command]
pub fn list_serial_ports(service: State<'_, FlasherService>) -> Vec<Port> {
    service.list_ports()
}

/// Scan for ports now instead of waiting for the next poll.
#[tauri::command]
pub async fn refresh_serial_ports(service: State<'_, FlasherService>) -> Result<Vec<Port>, String> {
    Ok(service.refresh_ports().await)
}
