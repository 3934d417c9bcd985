//! Orchestration core of the NPG Lite firmware flasher.
//!
//! Tracks serial ports, catalogs built-in and custom firmware, resolves
//! release assets and runs one flash session at a time. The desktop shell
//! (feature `desktop`) is a thin layer of commands over [`service::FlasherService`].

pub mod catalog;
pub mod error;
pub mod flasher;
pub mod logging;
pub mod ports;
pub mod release;
pub mod service;
pub mod session;
pub mod settings;
pub mod storage;
pub mod traits;

#[cfg(feature = "desktop")]
pub mod commands;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{FlasherError, FlasherResult};
pub use service::FlasherService;
