//! Capability seams between the flasher core and the outside world.
//!
//! Each trait has one real implementation in the crate and a mockall mock
//! under `cfg(test)`, so the orchestration logic can be driven by fakes.

pub mod command;
pub mod discovery;
pub mod flasher;
pub mod release;
pub mod store;

pub use command::{CommandExecutor, RealCommandExecutor};
pub use discovery::PortDiscovery;
pub use flasher::FirmwareFlasher;
pub use release::ReleaseClient;
pub use store::FirmwareStore;

#[cfg(test)]
pub use command::MockCommandExecutor;
#[cfg(test)]
pub use discovery::MockPortDiscovery;
#[cfg(test)]
pub use flasher::MockFirmwareFlasher;
#[cfg(test)]
pub use release::MockReleaseClient;
#[cfg(test)]
pub use store::MockFirmwareStore;
