//! Firmware flashing through the `espflash` command line tool.
//!
//! The chip protocol is espflash's business; this module only builds the
//! command line and interprets the outcome.

use std::path::Path;
use std::sync::Arc;

use crate::session::DEFAULT_SUCCESS_MESSAGE;
use crate::settings::FlasherSettings;
use crate::traits::{CommandExecutor, FirmwareFlasher, PortDiscovery};

/// Flashes application images with `espflash write-bin`.
pub struct EspflashCli {
    executor: Arc<dyn CommandExecutor>,
    discovery: Arc<dyn PortDiscovery>,
    program: String,
    baud_rate: u32,
    offset: u32,
}

impl EspflashCli {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        discovery: Arc<dyn PortDiscovery>,
        program: &str,
        baud_rate: u32,
        offset: u32,
    ) -> Self {
        Self {
            executor,
            discovery,
            program: program.to_string(),
            baud_rate,
            offset,
        }
    }

    pub fn from_settings(
        executor: Arc<dyn CommandExecutor>,
        discovery: Arc<dyn PortDiscovery>,
        settings: &FlasherSettings,
    ) -> Self {
        Self::new(
            executor,
            discovery,
            &settings.flasher_program,
            settings.flash_baud_rate,
            settings.flash_offset,
        )
    }

    fn args(&self, port: &str, binary_path: &Path) -> Vec<String> {
        vec![
            "write-bin".to_string(),
            "--port".to_string(),
            port.to_string(),
            "--baud".to_string(),
            self.baud_rate.to_string(),
            format!("{:#x}", self.offset),
            binary_path.to_string_lossy().to_string(),
        ]
    }
}

/// Last non-empty line of tool output, which is where espflash puts the error.
fn last_line(output: &[u8]) -> Option<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

impl EspflashCli {
    /// Fail early when `port` is gone, listing what is available instead.
    ///
    /// A discovery error is not conclusive; the flash goes ahead and
    /// espflash reports whatever is wrong.
    fn check_port(&self, port: &str) -> Result<(), String> {
        match self.discovery.discover() {
            Ok(ports) if ports.iter().any(|p| p == port) => Ok(()),
            Ok(ports) => Err(format!(
                "Port {} not found. Available ports: {:?}",
                port, ports
            )),
            Err(e) => {
                log::warn!("Could not verify port {}: {}", port, e);
                Ok(())
            }
        }
    }
}

impl FirmwareFlasher for EspflashCli {
    fn flash(&self, port: &str, binary_path: &Path) -> Result<String, String> {
        self.check_port(port)?;
        log::info!(
            "Writing {} to {} at {:#x}",
            binary_path.display(),
            port,
            self.offset
        );
        let output = self
            .executor
            .execute(&self.program, self.args(port, binary_path))?;

        if output.status.success() {
            return Ok(DEFAULT_SUCCESS_MESSAGE.to_string());
        }

        let cause = last_line(&output.stderr)
            .or_else(|| last_line(&output.stdout))
            .unwrap_or_else(|| format!("{} exited with {}", self.program, output.status));
        Err(cause)
    }
}
