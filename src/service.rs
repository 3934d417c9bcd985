//! The command boundary of the flasher core.
//!
//! `FlasherService` wires the port monitor, firmware catalog, release
//! resolver and flash session together and exposes one method per user
//! operation. The desktop shell calls these and renders the results.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::catalog::FirmwareCatalog;
use crate::error::{FlasherError, FlasherResult};
use crate::flasher::EspflashCli;
use crate::ports::{Port, PortMonitor, PortMonitorHandle, SerialPortDiscovery};
use crate::release::{GithubReleaseClient, ReleaseAsset, ReleaseResolver};
use crate::session::{FlashSession, FlashSessionSnapshot};
use crate::settings::{FlasherSettings, SettingsManager};
use crate::storage::{DirectoryStore, StoredFirmware};
use crate::traits::{FirmwareFlasher, FirmwareStore, PortDiscovery, RealCommandExecutor, ReleaseClient};

/// Collaborators the service is built from.
pub struct Capabilities {
    pub discovery: Arc<dyn PortDiscovery>,
    pub flasher: Arc<dyn FirmwareFlasher>,
    pub releases: Arc<dyn ReleaseClient>,
    pub store: Arc<dyn FirmwareStore>,
}

impl Capabilities {
    /// Real serial, espflash, GitHub and on-disk implementations.
    pub fn real(app_data_dir: &Path, settings: &FlasherSettings) -> FlasherResult<Self> {
        let discovery: Arc<dyn PortDiscovery> =
            Arc::new(SerialPortDiscovery::new(settings.usb_ports_only));
        Ok(Self {
            flasher: Arc::new(EspflashCli::from_settings(
                Arc::new(RealCommandExecutor),
                Arc::clone(&discovery),
                settings,
            )),
            discovery,
            releases: Arc::new(GithubReleaseClient::new()?),
            store: Arc::new(DirectoryStore::new(app_data_dir)),
        })
    }
}

pub struct FlasherService {
    monitor: Arc<PortMonitor>,
    catalog: Arc<FirmwareCatalog>,
    releases: ReleaseResolver,
    session: Arc<FlashSession>,
    settings_manager: SettingsManager,
    settings: RwLock<FlasherSettings>,
}

impl FlasherService {
    /// Build the service with real capabilities and persisted settings.
    pub fn open(app_data_dir: &Path, resource_dir: &Path) -> FlasherResult<Self> {
        let settings_manager = SettingsManager::new(app_data_dir);
        let settings = match settings_manager.load() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                FlasherSettings::default()
            }
        };
        let capabilities = Capabilities::real(app_data_dir, &settings)?;
        Ok(Self::new(capabilities, resource_dir, settings_manager, settings))
    }

    pub fn new(
        capabilities: Capabilities,
        resource_dir: &Path,
        settings_manager: SettingsManager,
        settings: FlasherSettings,
    ) -> Self {
        let monitor = Arc::new(PortMonitor::new(
            capabilities.discovery,
            settings.discovery_timeout(),
        ));
        let catalog = Arc::new(FirmwareCatalog::new(
            resource_dir,
            capabilities.store,
            Arc::clone(&capabilities.releases),
            settings.download_timeout(),
        ));
        let releases = ReleaseResolver::new(capabilities.releases);
        let session = Arc::new(FlashSession::new(
            Arc::clone(&catalog),
            capabilities.flasher,
        ));

        Self {
            monitor,
            catalog,
            releases,
            session,
            settings_manager,
            settings: RwLock::new(settings),
        }
    }

    pub fn monitor(&self) -> &Arc<PortMonitor> {
        &self.monitor
    }

    pub fn session(&self) -> &Arc<FlashSession> {
        &self.session
    }

    /// Start background port discovery with the configured interval.
    pub async fn start_port_monitor(&self) -> PortMonitorHandle {
        let interval = self.settings().port_poll_interval();
        Arc::clone(&self.monitor).start(interval).await
    }

    /// Latest known ports. Never waits on discovery or flashing.
    pub fn list_ports(&self) -> Vec<Port> {
        self.monitor.current()
    }

    /// Discover ports now.
    pub async fn refresh_ports(&self) -> Vec<Port> {
        self.monitor.refresh().await
    }

    /// Flash a built-in kind or custom filename to `port`.
    pub async fn flash_firmware(&self, port: &str, firmware: &str) -> FlasherResult<String> {
        self.session.start(port, firmware).await
    }

    pub fn flash_status(&self) -> FlashSessionSnapshot {
        self.session.snapshot()
    }

    pub fn acknowledge_flash(&self) -> FlasherResult<()> {
        self.session.acknowledge()
    }

    pub async fn list_custom_firmware(&self) -> FlasherResult<Vec<String>> {
        self.catalog.list_custom().await
    }

    pub async fn custom_firmware_info(&self, filename: &str) -> FlasherResult<StoredFirmware> {
        self.catalog.describe(filename).await
    }

    pub async fn delete_custom_firmware(&self, filename: &str) -> FlasherResult<()> {
        self.catalog.delete(filename).await
    }

    pub async fn import_custom_firmware(
        &self,
        source_path: &Path,
        desired_name: Option<&str>,
    ) -> FlasherResult<String> {
        self.catalog.import_local(source_path, desired_name, false).await
    }

    /// Firmware assets of the latest release of `repository`, or of the
    /// configured repository when none is given.
    pub async fn fetch_release_assets(
        &self,
        repository: Option<&str>,
    ) -> FlasherResult<Vec<ReleaseAsset>> {
        let repository = match repository.map(str::trim).filter(|r| !r.is_empty()) {
            Some(repository) => repository.to_string(),
            None => self.settings().release_repository,
        };
        self.releases.list_release_assets(&repository).await
    }

    /// Download `url` and store it as custom firmware; returns the filename.
    pub async fn download_and_store_asset(
        &self,
        url: &str,
        desired_name: Option<&str>,
    ) -> FlasherResult<String> {
        if url.trim().is_empty() {
            return Err(FlasherError::DownloadFailed("No download URL given".into()));
        }
        let asset = ReleaseAsset {
            display_name: desired_name.unwrap_or_default().to_string(),
            download_url: url.trim().to_string(),
        };
        self.catalog.materialize_remote(&asset, desired_name, false).await
    }

    pub fn settings(&self) -> FlasherSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Persist new settings. Port polling, timeouts and flasher options
    /// take effect on the next launch; the release repository immediately.
    pub fn save_settings(&self, settings: FlasherSettings) -> FlasherResult<()> {
        self.settings_manager.save(&settings)?;
        match self.settings.write() {
            Ok(mut current) => *current = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        Ok(())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_manager.settings_path().to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FirmwareKind;
    use crate::session::SessionStatus;
    use crate::test_helpers::fixtures::{release_with_assets, FakeReleaseClient};
    use crate::test_helpers::temp::TestContext;
    use crate::traits::{MockFirmwareFlasher, MockPortDiscovery};

    fn service(ctx: &TestContext, flasher: MockFirmwareFlasher, releases: FakeReleaseClient) -> FlasherService {
        let mut discovery = MockPortDiscovery::new();
        discovery
            .expect_discover()
            .returning(|| Ok(vec!["COM3".to_string()]));

        let capabilities = Capabilities {
            discovery: Arc::new(discovery),
            flasher: Arc::new(flasher),
            releases: Arc::new(releases),
            store: Arc::new(DirectoryStore::new(ctx.root())),
        };
        FlasherService::new(
            capabilities,
            &ctx.path("resources"),
            SettingsManager::new(ctx.root()),
            FlasherSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_release_asset_to_flash_scenario() {
        let ctx = TestContext::new();
        let url = "https://example.test/releases/download/v1/NPG-LITE-custom.bin";
        let releases = FakeReleaseClient::new()
            .with_release(release_with_assets(&[("NPG-LITE-custom.bin", url)]))
            .with_download(url, b"\xe9custom-image");

        let mut flasher = MockFirmwareFlasher::new();
        flasher
            .expect_flash()
            .times(1)
            .withf(|port, path| {
                port == "COM3"
                    && std::fs::read(path)
                        .map(|data| data == b"\xe9custom-image")
                        .unwrap_or(false)
            })
            .returning(|_, _| Ok("flashed".to_string()));
        let service = service(&ctx, flasher, releases);

        let assets = service
            .fetch_release_assets(Some("owner/repo"))
            .await
            .unwrap();
        assert_eq!(
            assets,
            vec![ReleaseAsset {
                display_name: "NPG-LITE-custom.bin".to_string(),
                download_url: url.to_string(),
            }]
        );

        let filename = service
            .download_and_store_asset(&assets[0].download_url, Some(&assets[0].display_name))
            .await
            .unwrap();
        assert_eq!(
            service.list_custom_firmware().await.unwrap(),
            vec![filename.clone()]
        );

        let message = service.flash_firmware("COM3", &filename).await.unwrap();
        assert_eq!(message, "flashed");
        assert_eq!(service.flash_status().status, SessionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_fetch_uses_configured_repository_by_default() {
        let ctx = TestContext::new();
        let releases = FakeReleaseClient::new().with_release(release_with_assets(&[]));
        let service = service(&ctx, MockFirmwareFlasher::new(), releases.clone());

        let assets = service.fetch_release_assets(None).await.unwrap();

        assert!(assets.is_empty());
        assert_eq!(
            releases.requested_repositories(),
            vec![FlasherSettings::default().release_repository]
        );
    }

    #[tokio::test]
    async fn test_fetch_without_release_is_lookup_failure() {
        let ctx = TestContext::new();
        let service = service(&ctx, MockFirmwareFlasher::new(), FakeReleaseClient::new());

        let result = service.fetch_release_assets(Some("owner/repo")).await;
        assert!(matches!(result, Err(FlasherError::ReleaseLookupFailed(_))));
    }

    #[tokio::test]
    async fn test_download_without_name_uses_url() {
        let ctx = TestContext::new();
        let url = "https://example.test/dl/board.bin?raw=1";
        let releases = FakeReleaseClient::new().with_download(url, b"data");
        let service = service(&ctx, MockFirmwareFlasher::new(), releases);

        let filename = service.download_and_store_asset(url, None).await.unwrap();
        assert_eq!(filename, "board.bin");
    }

    #[tokio::test]
    async fn test_ports_and_flash_flow() {
        let ctx = TestContext::new();
        ctx.create_builtin_firmware(FirmwareKind::Serial, b"\xe9serial");
        let mut flasher = MockFirmwareFlasher::new();
        flasher.expect_flash().returning(|_, _| Ok(String::new()));
        let service = service(&ctx, flasher, FakeReleaseClient::new());

        assert!(service.list_ports().is_empty());
        assert_eq!(service.refresh_ports().await, vec!["COM3"]);
        assert_eq!(service.list_ports(), vec!["COM3"]);

        let port = service.list_ports()[0].clone();
        service.flash_firmware(&port, "Serial").await.unwrap();
        service.acknowledge_flash().unwrap();
        assert_eq!(service.flash_status().status, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_delete_then_relist() {
        let ctx = TestContext::new();
        ctx.create_custom_firmware("a.bin", b"a");
        ctx.create_custom_firmware("b.bin", b"b");
        let service = service(&ctx, MockFirmwareFlasher::new(), FakeReleaseClient::new());

        service.delete_custom_firmware("a.bin").await.unwrap();
        assert_eq!(service.list_custom_firmware().await.unwrap(), vec!["b.bin"]);
        assert!(matches!(
            service.flash_firmware("COM3", "a.bin").await,
            Err(FlasherError::UnknownFirmware { .. })
        ));
    }

    #[test]
    fn test_save_settings_updates_running_copy() {
        let ctx = TestContext::new();
        let service = service(&ctx, MockFirmwareFlasher::new(), FakeReleaseClient::new());

        let settings = FlasherSettings {
            release_repository: "someone/else".to_string(),
            ..FlasherSettings::default()
        };
        service.save_settings(settings.clone()).unwrap();

        assert_eq!(service.settings(), settings);
        assert_eq!(
            SettingsManager::new(ctx.root()).load().unwrap(),
            settings
        );
        assert!(service.settings_path().ends_with("flasher_settings.json"));
    }
}
