//! Tauri commands exposing the flasher service to the frontend.
//!
//! Every command takes the managed [`FlasherService`] and reports errors as
//! display strings; the frontend only renders them.

pub mod firmware;
pub mod flash;
pub mod ports;
pub mod settings;

use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tokio::sync::watch;

use crate::error::FlasherError;
use crate::service::FlasherService;

/// Event carrying the current port list.
pub const PORTS_CHANGED_EVENT: &str = "ports-changed";
/// Event carrying the current flash session snapshot.
pub const FLASH_SESSION_EVENT: &str = "flash-session";

pub(crate) fn to_message(err: FlasherError) -> String {
    log::warn!("[{}] {}", err.error_code(), err);
    err.to_string()
}

/// Emit port and session changes to the frontend until the app exits.
pub fn forward_updates(app: &AppHandle, service: &FlasherService) {
    forward(app.clone(), PORTS_CHANGED_EVENT, service.monitor().subscribe());
    forward(app.clone(), FLASH_SESSION_EVENT, service.session().subscribe());
}

fn forward<T>(app: AppHandle, event: &'static str, mut updates: watch::Receiver<T>)
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    tauri::async_runtime::spawn(async move {
        while updates.changed().await.is_ok() {
            let payload = updates.borrow_and_update().clone();
            if let Err(e) = app.emit(event, payload) {
                log::warn!("Failed to emit {}: {}", event, e);
            }
        }
    });
}
