//! Error types shared by every part of the flasher core.

use thiserror::Error;

/// Result type alias for flasher operations.
pub type FlasherResult<T> = Result<T, FlasherError>;

/// Errors that can occur while discovering ports, managing firmware or flashing.
///
/// None of these are process-fatal. Every operation that fails leaves the
/// system usable, and retrying is always a caller decision.
#[derive(Debug, Error)]
pub enum FlasherError {
    /// A flash was requested without choosing a port.
    #[error("Please select a port first")]
    PortNotSelected,

    /// The identifier is neither a built-in kind nor a stored custom firmware.
    #[error("Unknown firmware '{identifier}'")]
    UnknownFirmware { identifier: String },

    /// Another flash is already running.
    #[error("A flash operation is already in progress")]
    SessionBusy,

    /// The flashing capability reported a failure.
    #[error("Flash failed: {0}")]
    FlashFailed(String),

    /// Downloading a release asset failed.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Downloading a release asset did not finish in time.
    #[error("Download timed out after {timeout_secs}s")]
    DownloadTimeout { timeout_secs: u64 },

    /// The release listing could not be fetched.
    #[error("Release lookup failed: {0}")]
    ReleaseLookupFailed(String),

    /// A custom firmware with this name already exists.
    #[error("A custom firmware named '{filename}' already exists")]
    NameConflict { filename: String },

    /// No custom firmware with this name is stored.
    #[error("Custom firmware '{filename}' not found")]
    NotFound { filename: String },

    /// The name cannot be used as a custom firmware filename.
    #[error("Invalid firmware filename '{filename}'")]
    InvalidFilename { filename: String },

    /// Reading or writing the firmware storage failed.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Settings could not be read or written.
    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<std::io::Error> for FlasherError {
    fn from(err: std::io::Error) -> Self {
        FlasherError::StorageFailure(err.to_string())
    }
}

impl FlasherError {
    /// Check if this error is worth offering a retry for.
    ///
    /// Input errors (no port, unknown firmware, bad names) are not: the
    /// caller has to change something first.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FlasherError::SessionBusy
                | FlasherError::FlashFailed(_)
                | FlasherError::DownloadFailed(_)
                | FlasherError::DownloadTimeout { .. }
                | FlasherError::ReleaseLookupFailed(_)
        )
    }

    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            FlasherError::PortNotSelected => "NPG-001",
            FlasherError::UnknownFirmware { .. } => "NPG-002",
            FlasherError::SessionBusy => "NPG-003",
            FlasherError::FlashFailed(_) => "NPG-010",
            FlasherError::DownloadFailed(_) => "NPG-020",
            FlasherError::DownloadTimeout { .. } => "NPG-021",
            FlasherError::ReleaseLookupFailed(_) => "NPG-022",
            FlasherError::NameConflict { .. } => "NPG-030",
            FlasherError::NotFound { .. } => "NPG-031",
            FlasherError::InvalidFilename { .. } => "NPG-032",
            FlasherError::StorageFailure(_) => "NPG-040",
            FlasherError::Settings(_) => "NPG-050",
        }
    }
}
