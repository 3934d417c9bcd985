//! Serial port discovery and the background port monitor.
//!
//! The monitor keeps the latest port snapshot and refreshes it on a fixed
//! interval. Discovery runs on the blocking pool under a timeout, so a hung
//! enumeration never stalls the schedule or anything else in the app.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialport::{available_ports, SerialPortType};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::traits::PortDiscovery;

/// Identifier of a device connection point, e.g. `COM3` or `/dev/ttyACM0`.
pub type Port = String;

/// Discovery backed by the `serialport` crate.
pub struct SerialPortDiscovery {
    usb_only: bool,
}

impl SerialPortDiscovery {
    pub fn new(usb_only: bool) -> Self {
        Self { usb_only }
    }
}

impl PortDiscovery for SerialPortDiscovery {
    fn discover(&self) -> Result<Vec<Port>, String> {
        let ports = available_ports().map_err(|e| {
            format!(
                "Failed to list ports: {}. On Linux, try 'sudo usermod -a -G dialout $USER' and log in again",
                e
            )
        })?;

        let mut names = Vec::new();
        for port in ports {
            // On macOS, skip tty.* ports to avoid duplicates
            // Each USB serial device appears as both /dev/cu.* and /dev/tty.*
            #[cfg(target_os = "macos")]
            if port.port_name.contains("/dev/tty.") {
                continue;
            }

            if self.usb_only && !matches!(port.port_type, SerialPortType::UsbPort(_)) {
                continue;
            }
            names.push(port.port_name);
        }

        Ok(names)
    }
}

/// Drop repeated names, keeping the first occurrence.
fn dedup_preserving_order(ports: Vec<Port>) -> Vec<Port> {
    let mut unique: Vec<Port> = Vec::with_capacity(ports.len());
    for port in ports {
        if !unique.contains(&port) {
            unique.push(port);
        }
    }
    unique
}

/// Clears the in-flight flag when a scan ends, even by panic.
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the current port snapshot.
pub struct PortMonitor {
    discovery: Arc<dyn PortDiscovery>,
    timeout: Duration,
    snapshot: watch::Sender<Vec<Port>>,
    /// Set while a discovery call occupies a blocking thread.
    scanning: Arc<AtomicBool>,
}

impl PortMonitor {
    pub fn new(discovery: Arc<dyn PortDiscovery>, timeout: Duration) -> Self {
        let (snapshot, _) = watch::channel(Vec::new());
        Self {
            discovery,
            timeout,
            snapshot,
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Last known ports, without any I/O.
    pub fn current(&self) -> Vec<Port> {
        self.snapshot.borrow().clone()
    }

    /// Observe snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Port>> {
        self.snapshot.subscribe()
    }

    /// Run discovery and replace the snapshot with its result.
    ///
    /// Never fails: on error or timeout the previous snapshot is kept and
    /// returned. A scan that outlived its timeout keeps its thread until the
    /// OS call returns; no new scan starts before then.
    pub async fn refresh(&self) -> Vec<Port> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            log::debug!("Previous port scan still running; keeping last snapshot");
            return self.current();
        }

        let guard = ScanGuard(Arc::clone(&self.scanning));
        let discovery = Arc::clone(&self.discovery);
        let scan = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            discovery.discover()
        });

        let ports = match tokio::time::timeout(self.timeout, scan).await {
            Ok(Ok(Ok(ports))) => dedup_preserving_order(ports),
            Ok(Ok(Err(e))) => {
                log::warn!("Port discovery failed: {}", e);
                return self.current();
            }
            Ok(Err(e)) => {
                log::warn!("Port discovery task failed: {}", e);
                return self.current();
            }
            Err(_) => {
                log::warn!("Port discovery timed out after {:?}", self.timeout);
                return self.current();
            }
        };

        self.snapshot.send_if_modified(|current| {
            if *current == ports {
                return false;
            }
            log::info!("Serial ports changed: {:?}", ports);
            *current = ports.clone();
            true
        });

        ports
    }

    /// Refresh once, then keep refreshing every `interval` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(self: Arc<Self>, interval: Duration) -> PortMonitorHandle {
        self.refresh().await;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let monitor = self;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; startup already refreshed.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        monitor.refresh().await;
                    }
                }
            }
            log::debug!("Port monitor stopped");
        });

        PortMonitorHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to the background refresh task.
pub struct PortMonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PortMonitorHandle {
    /// Stop the background task and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            log::warn!("Port monitor task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
