use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::error::{FlasherError, FlasherResult};
use crate::release::{ReleaseAsset, RemoteAsset, RemoteRelease, RepositoryId};
use crate::traits::{FirmwareFlasher, ReleaseClient};

/// Trimmed response of `GET /repos/{owner}/{repo}/releases/latest`.
pub const RELEASE_JSON: &str = r#"{
  "tag_name": "v1.2.0",
  "name": "NPG Lite v1.2.0",
  "draft": false,
  "prerelease": false,
  "assets": [
    {
      "name": "NPG-LITE-BLE.ino.bin",
      "browser_download_url": "https://github.com/upsidedownlabs/NPG-Lite-Firmware/releases/download/v1.2.0/NPG-LITE-BLE.ino.bin",
      "size": 1048576
    },
    {
      "name": "NPG-LITE.ino.bin",
      "browser_download_url": "https://github.com/upsidedownlabs/NPG-Lite-Firmware/releases/download/v1.2.0/NPG-LITE.ino.bin",
      "size": 917504
    },
    {
      "name": "CHANGELOG.md",
      "browser_download_url": "https://github.com/upsidedownlabs/NPG-Lite-Firmware/releases/download/v1.2.0/CHANGELOG.md",
      "size": 2048
    }
  ]
}"#;

/// Release tagged `v1.0.0` with the given `(name, url)` assets.
pub fn release_with_assets(assets: &[(&str, &str)]) -> RemoteRelease {
    RemoteRelease {
        tag_name: "v1.0.0".to_string(),
        name: Some("v1.0.0".to_string()),
        assets: assets
            .iter()
            .map(|(name, url)| RemoteAsset {
                name: name.to_string(),
                browser_download_url: url.to_string(),
                size: 0,
            })
            .collect(),
    }
}

/// Raw HTTP/1.1 response with a body.
pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Local HTTP server answering every request with `response` after `delay`.
///
/// Returns the base URL. The server lives until the test runtime shuts down.
pub async fn serve_canned(response: String, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Builder for creating test ReleaseAsset instances
pub struct ReleaseAssetBuilder {
    display_name: String,
    download_url: String,
}

impl ReleaseAssetBuilder {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            download_url: format!(
                "https://example.test/releases/download/v1.0.0/{}",
                display_name
            ),
        }
    }

    pub fn build(self) -> ReleaseAsset {
        ReleaseAsset {
            display_name: self.display_name,
            download_url: self.download_url,
        }
    }
}

#[derive(Default)]
struct FakeReleaseState {
    release: Option<RemoteRelease>,
    downloads: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
    requested: Vec<String>,
}

/// In-memory release host. Clones share state.
#[derive(Clone, Default)]
pub struct FakeReleaseClient {
    state: Arc<Mutex<FakeReleaseState>>,
}

impl FakeReleaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `release` as the latest release of every repository.
    pub fn with_release(self, release: RemoteRelease) -> Self {
        self.state.lock().unwrap().release = Some(release);
        self
    }

    pub fn with_download(self, url: &str, body: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .downloads
            .insert(url.to_string(), body.to_vec());
        self
    }

    /// Sleep this long before answering a download.
    pub fn with_download_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn requested_repositories(&self) -> Vec<String> {
        self.state.lock().unwrap().requested.clone()
    }
}

#[async_trait]
impl ReleaseClient for FakeReleaseClient {
    async fn latest_release(&self, repository: &RepositoryId) -> FlasherResult<RemoteRelease> {
        let mut state = self.state.lock().unwrap();
        state.requested.push(repository.to_string());
        state.release.clone().ok_or_else(|| {
            FlasherError::ReleaseLookupFailed(format!("{} has no published release", repository))
        })
    }

    async fn download(&self, url: &str, _timeout: Duration) -> FlasherResult<Vec<u8>> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .unwrap()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| FlasherError::DownloadFailed(format!("HTTP 404 for {}", url)))
    }
}

/// Flasher that blocks inside `flash` until released.
///
/// The image is read after the gate opens, so tests can mutate the store
/// while a flash is in flight and check what actually got written.
pub struct GatedFlasher {
    started: Notify,
    gate: Mutex<bool>,
    opened: Condvar,
    flashed: Mutex<Vec<Vec<u8>>>,
}

impl GatedFlasher {
    pub fn new() -> Self {
        Self {
            started: Notify::new(),
            gate: Mutex::new(false),
            opened: Condvar::new(),
            flashed: Mutex::new(Vec::new()),
        }
    }

    /// Wait until a flash call is blocked on the gate.
    pub async fn wait_until_flashing(&self) {
        self.started.notified().await;
    }

    /// Let blocked and future flash calls finish.
    pub fn release(&self) {
        *self.gate.lock().unwrap() = true;
        self.opened.notify_all();
    }

    pub fn flash_count(&self) -> usize {
        self.flashed.lock().unwrap().len()
    }

    pub fn flashed_images(&self) -> Vec<Vec<u8>> {
        self.flashed.lock().unwrap().clone()
    }
}

impl Default for GatedFlasher {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareFlasher for GatedFlasher {
    fn flash(&self, port: &str, binary_path: &Path) -> Result<String, String> {
        self.started.notify_one();

        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);

        let image = std::fs::read(binary_path).map_err(|e| e.to_string())?;
        self.flashed.lock().unwrap().push(image);
        Ok(format!("flashed {}", port))
    }
}
