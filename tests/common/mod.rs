//! Common test utilities and helpers

use permafrost::{ArchiveManager, PermafrostWorkspace, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture managing a temporary workspace
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub workspace: PermafrostWorkspace,
}

impl TestFixture {
    /// Create a new test fixture with an initialized workspace
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let workspace = PermafrostWorkspace::create_new(temp_dir.path().to_path_buf())?;

        Ok(Self {
            temp_dir,
            workspace,
        })
    }

    /// Get the root path of the test fixture
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Open an archive manager against the fixture workspace
    pub fn manager(&self) -> Result<ArchiveManager> {
        ArchiveManager::open(self.workspace.clone())
    }

    /// Create a test CSV file with raw string content
    pub fn create_csv(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }
}
