//! Flash session state machine.
//!
//! ```text
//! Idle ──start──▶ InProgress ──▶ Succeeded ─┐
//!   ▲                      └───▶ Failed ────┤
//!   └────────── acknowledge / start ────────┘
//! ```
//!
//! Only one session can be `InProgress` at a time. All state changes go
//! through one transition function; observers get every change via a
//! `watch` channel.

use std::io::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::catalog::{FirmwareCatalog, FirmwareImage};
use crate::error::{FlasherError, FlasherResult};
use crate::traits::FirmwareFlasher;

/// Message reported when the flasher succeeds without saying anything.
pub const DEFAULT_SUCCESS_MESSAGE: &str =
    "Firmware flashed successfully! The device should now reboot.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    InProgress,
    Succeeded,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Succeeded | SessionStatus::Failed)
    }
}

/// Observable state of the flash session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSessionSnapshot {
    pub status: SessionStatus,
    pub target_port: Option<String>,
    pub target_firmware: Option<String>,
    pub result_message: Option<String>,
}

impl Default for FlashSessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            target_port: None,
            target_firmware: None,
            result_message: None,
        }
    }
}

/// Inputs of the state machine.
#[derive(Debug)]
enum Transition {
    Begin { port: String, firmware: String },
    Complete { message: String },
    Fail { message: String },
    Reset,
}

/// The only place session state is mutated.
fn apply(state: &watch::Sender<FlashSessionSnapshot>, transition: Transition) -> FlasherResult<()> {
    let mut outcome = Ok(());

    state.send_if_modified(|state| match transition {
        Transition::Begin { port, firmware } => {
            if state.status == SessionStatus::InProgress {
                outcome = Err(FlasherError::SessionBusy);
                return false;
            }
            *state = FlashSessionSnapshot {
                status: SessionStatus::InProgress,
                target_port: Some(port),
                target_firmware: Some(firmware),
                result_message: None,
            };
            true
        }
        Transition::Complete { message } | Transition::Fail { message }
            if state.status != SessionStatus::InProgress =>
        {
            log::warn!("Ignoring flash result outside of a session: {}", message);
            false
        }
        Transition::Complete { message } => {
            state.status = SessionStatus::Succeeded;
            state.result_message = Some(message);
            true
        }
        Transition::Fail { message } => {
            state.status = SessionStatus::Failed;
            state.result_message = Some(message);
            true
        }
        Transition::Reset => match state.status {
            SessionStatus::InProgress => {
                outcome = Err(FlasherError::SessionBusy);
                false
            }
            status if status.is_terminal() => {
                *state = FlashSessionSnapshot::default();
                true
            }
            _ => false,
        },
    });

    outcome
}

/// Drives flash attempts, one at a time.
pub struct FlashSession {
    catalog: Arc<FirmwareCatalog>,
    flasher: Arc<dyn FirmwareFlasher>,
    state: Arc<watch::Sender<FlashSessionSnapshot>>,
}

impl FlashSession {
    pub fn new(catalog: Arc<FirmwareCatalog>, flasher: Arc<dyn FirmwareFlasher>) -> Self {
        let (state, _) = watch::channel(FlashSessionSnapshot::default());
        Self {
            catalog,
            flasher,
            state: Arc::new(state),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> FlashSessionSnapshot {
        self.state.borrow().clone()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<FlashSessionSnapshot> {
        self.state.subscribe()
    }

    fn transition(&self, transition: Transition) -> FlasherResult<()> {
        apply(&self.state, transition)
    }

    /// Flash `firmware` to the device on `port`.
    ///
    /// Rejected with `SessionBusy` while another flash runs, with
    /// `PortNotSelected` for an empty port and with `UnknownFirmware` when
    /// the identifier does not resolve; none of these touch the session.
    /// The binary is captured while resolving. Then the session goes
    /// `InProgress` and ends in `Succeeded` (returning the result message)
    /// or `Failed` (returning the error). A previous terminal outcome is
    /// discarded.
    ///
    /// Once `InProgress`, the attempt runs on its own task and reaches a
    /// terminal state even if the returned future is dropped.
    pub async fn start(&self, port: &str, firmware: &str) -> FlasherResult<String> {
        if self.snapshot().status == SessionStatus::InProgress {
            return Err(FlasherError::SessionBusy);
        }

        let port = port.trim().to_string();
        if port.is_empty() {
            return Err(FlasherError::PortNotSelected);
        }

        let image = match self.catalog.capture(firmware).await {
            Err(e @ FlasherError::UnknownFirmware { .. }) => return Err(e),
            captured => captured,
        };

        // Another start may have committed while we were resolving.
        self.transition(Transition::Begin {
            port: port.clone(),
            firmware: firmware.to_string(),
        })?;
        log::info!("Flashing {} to {}", firmware, port);

        let attempt = tokio::spawn(run_attempt(
            Arc::clone(&self.state),
            Arc::clone(&self.flasher),
            port,
            firmware.to_string(),
            image,
        ));

        match attempt.await {
            Ok(result) => result,
            Err(e) => {
                let err = FlasherError::FlashFailed(format!("Flash task failed: {}", e));
                self.transition(Transition::Fail {
                    message: err.to_string(),
                })?;
                Err(err)
            }
        }
    }

    /// Reset a finished session back to `Idle`.
    pub fn acknowledge(&self) -> FlasherResult<()> {
        self.transition(Transition::Reset)
    }
}

/// Flash a captured image and record the terminal state.
async fn run_attempt(
    state: Arc<watch::Sender<FlashSessionSnapshot>>,
    flasher: Arc<dyn FirmwareFlasher>,
    port: String,
    firmware: String,
    image: FlasherResult<FirmwareImage>,
) -> FlasherResult<String> {
    let outcome = match image {
        Ok(image) => flash_image(flasher, &port, image).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(message) => {
            log::info!("Flashing {} to {} succeeded", firmware, port);
            apply(
                &state,
                Transition::Complete {
                    message: message.clone(),
                },
            )?;
            Ok(message)
        }
        Err(e) => {
            log::warn!("Flashing {} to {} failed: {}", firmware, port, e);
            apply(
                &state,
                Transition::Fail {
                    message: e.to_string(),
                },
            )?;
            Err(e)
        }
    }
}

/// Snapshot the image into a session-owned file and hand it to the flasher.
async fn flash_image(
    flasher: Arc<dyn FirmwareFlasher>,
    port: &str,
    image: FirmwareImage,
) -> FlasherResult<String> {
    if image.data.is_empty() {
        return Err(FlasherError::FlashFailed(format!(
            "File {} is empty",
            image.path.display()
        )));
    }
    log::debug!(
        "Using {:?} at {} ({} bytes, sha256 {})",
        image.source,
        image.path.display(),
        image.data.len(),
        image.sha256()
    );

    let snapshot = snapshot_binary(&image.data)?;
    let port = port.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let result = flasher.flash(&port, snapshot.path());
        drop(snapshot);
        result
    })
    .await
    .map_err(|e| FlasherError::FlashFailed(format!("Flash task panicked: {}", e)))?;

    match result {
        Ok(message) if message.trim().is_empty() => Ok(DEFAULT_SUCCESS_MESSAGE.to_string()),
        Ok(message) => Ok(message),
        Err(cause) => Err(FlasherError::FlashFailed(cause)),
    }
}

/// Copy `data` into a temporary file that lives as long as the returned handle.
fn snapshot_binary(data: &[u8]) -> FlasherResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("npg-flash-")
        .suffix(".bin")
        .tempfile()
        .map_err(|e| FlasherError::StorageFailure(format!("Failed to create flash image: {}", e)))?;
    file.write_all(data)
        .and_then(|_| file.flush())
        .map_err(|e| FlasherError::StorageFailure(format!("Failed to write flash image: {}", e)))?;
    Ok(file)
}
