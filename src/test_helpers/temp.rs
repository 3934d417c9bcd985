use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::catalog::{FirmwareKind, BUILTIN_FIRMWARE_DIR};
use crate::storage::CUSTOM_FIRMWARE_DIR;

/// Test context with temporary directory management.
/// Automatically cleans up when dropped.
///
/// The root doubles as the app data directory; bundled resources live
/// under `resources/`.
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a fresh temporary directory
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the root path of the temporary directory
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file with binary content at the given relative path
    pub fn create_file_bytes(&self, relative_path: &str, content: &[u8]) -> PathBuf {
        let path = self.root().join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Place a file in the custom firmware store
    pub fn create_custom_firmware(&self, filename: &str, content: &[u8]) -> PathBuf {
        self.create_file_bytes(&format!("{}/{}", CUSTOM_FIRMWARE_DIR, filename), content)
    }

    /// Bundle a built-in image under `resources/`
    pub fn create_builtin_firmware(&self, kind: FirmwareKind, content: &[u8]) -> PathBuf {
        self.create_file_bytes(
            &format!("resources/{}/{}", BUILTIN_FIRMWARE_DIR, kind.file_name()),
            content,
        )
    }

    /// Get full path for a relative path
    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.root().join(relative_path)
    }

    /// Read file bytes
    pub fn read_bytes(&self, relative_path: &str) -> Vec<u8> {
        fs::read(self.path(relative_path)).expect("Failed to read file")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creates_temp_dir() {
        let ctx = TestContext::new();
        assert!(ctx.root().exists());
    }

    #[test]
    fn test_firmware_layout() {
        let ctx = TestContext::new();
        ctx.create_custom_firmware("mine.bin", b"\xe9");
        ctx.create_builtin_firmware(FirmwareKind::WiFi, b"\xe9wifi");

        assert_eq!(ctx.read_bytes("custom_firmware/mine.bin"), b"\xe9");
        assert_eq!(
            ctx.read_bytes("resources/files/NPG-LITE-WiFi.ino.bin"),
            b"\xe9wifi"
        );
    }

    #[test]
    fn test_cleanup_on_drop() {
        let path = {
            let ctx = TestContext::new();
            ctx.create_file_bytes("a/b.bin", b"x");
            ctx.root().to_path_buf()
        };
        assert!(!path.exists());
    }
}
