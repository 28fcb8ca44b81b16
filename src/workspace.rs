//! Workspace management for permafrost operations

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Workspace settings stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub version: String,
    pub created: DateTime<Utc>,
    pub compression_level: i32,
    pub diff_sample_limit: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            version: crate::FORMAT_VERSION.to_string(),
            created: Utc::now(),
            compression_level: crate::DEFAULT_COMPRESSION_LEVEL,
            diff_sample_limit: crate::DIFF_SAMPLE_LIMIT,
        }
    }
}

/// Manages the .permafrost workspace directory
#[derive(Debug, Clone)]
pub struct PermafrostWorkspace {
    /// Project root directory (where .permafrost/ lives)
    pub root: PathBuf,
    /// .permafrost/ directory path
    pub permafrost_dir: PathBuf,
    /// .permafrost/archives/ directory path
    pub archives_dir: PathBuf,
    /// Path to the catalog manifest database
    pub manifest_path: PathBuf,
}

impl PermafrostWorkspace {
    /// Find existing workspace or create a new one
    pub fn find_or_create(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);

        if let Some(workspace) = Self::find_existing(start)? {
            return Ok(workspace);
        }

        Self::create_new(start.to_path_buf())
    }

    /// Find an existing .permafrost workspace by walking up the directory tree
    fn find_existing(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir;

        loop {
            let permafrost_dir = current.join(".permafrost");
            if permafrost_dir.exists() && permafrost_dir.is_dir() {
                return Ok(Some(Self::from_root(current.to_path_buf())?));
            }

            // A .git directory marks the project root; stop searching above it
            if current.join(".git").exists() {
                break;
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Ok(None)
    }

    /// Create a new workspace in the specified root directory
    pub fn create_new(root: PathBuf) -> Result<Self> {
        let workspace = Self::from_root(root)?;

        fs::create_dir_all(&workspace.permafrost_dir)?;
        fs::create_dir_all(&workspace.archives_dir)?;

        workspace.create_config()?;
        workspace.ensure_gitignore()?;

        log::info!(
            "Created permafrost workspace at: {}",
            workspace.root.display()
        );

        Ok(workspace)
    }

    /// Create workspace handles from a root directory path
    pub fn from_root(root: PathBuf) -> Result<Self> {
        let permafrost_dir = root.join(".permafrost");
        let archives_dir = permafrost_dir.join("archives");
        let manifest_path = permafrost_dir.join("manifest.db");

        Ok(Self {
            root,
            permafrost_dir,
            archives_dir,
            manifest_path,
        })
    }

    /// Whether this root already carries an initialized workspace
    pub fn is_initialized(&self) -> bool {
        self.manifest_path.exists()
    }

    /// Wipe the manifest and every stored blob, leaving an empty workspace
    pub fn reset(&self) -> Result<()> {
        if self.manifest_path.exists() {
            fs::remove_file(&self.manifest_path)?;
        }
        // DuckDB may leave a write-ahead log next to the database file
        let wal_path = self.manifest_path.with_extension("db.wal");
        if wal_path.exists() {
            fs::remove_file(&wal_path)?;
        }

        if self.archives_dir.exists() {
            for entry in fs::read_dir(&self.archives_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                    log::debug!("Removed existing blob: {}", entry.path().display());
                }
            }
        }

        fs::create_dir_all(&self.archives_dir)?;
        log::info!("Reset permafrost workspace at: {}", self.root.display());

        Ok(())
    }

    /// Filesystem location for a stored blob
    pub fn blob_path(&self, archive_name: &str) -> PathBuf {
        self.archives_dir.join(format!("{}.zst", archive_name))
    }

    /// Create initial configuration file
    fn create_config(&self) -> Result<()> {
        self.create_config_with_force(false)
    }

    /// Create configuration file with optional force overwrite
    pub fn create_config_with_force(&self, force: bool) -> Result<()> {
        let config_path = self.permafrost_dir.join("config.json");

        if config_path.exists() && !force {
            return Ok(());
        }

        let config = WorkspaceConfig::default();
        fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    /// Read the workspace configuration, falling back to defaults when the
    /// file is missing
    pub fn load_config(&self) -> Result<WorkspaceConfig> {
        let config_path = self.permafrost_dir.join("config.json");

        if !config_path.exists() {
            return Ok(WorkspaceConfig::default());
        }

        Ok(serde_json::from_str(&fs::read_to_string(config_path)?)?)
    }

    /// Ensure .gitignore excludes the workspace directory
    pub fn ensure_gitignore(&self) -> Result<()> {
        let gitignore_path = self.root.join(".gitignore");
        let ignore_entry = "# Ignore permafrost archives and catalog\n.permafrost/\n";

        if gitignore_path.exists() {
            let content = fs::read_to_string(&gitignore_path)?;
            if !content.contains(".permafrost/") {
                let new_content = if content.ends_with('\n') {
                    format!("{}\n{}", content, ignore_entry)
                } else {
                    format!("{}\n\n{}", content, ignore_entry)
                };
                fs::write(gitignore_path, new_content)?;
                log::info!("Updated .gitignore with permafrost entries");
            }
        } else {
            fs::write(gitignore_path, ignore_entry)?;
            log::info!("Created .gitignore with permafrost entries");
        }

        Ok(())
    }

    /// Get workspace disk-usage statistics
    pub fn stats(&self) -> Result<WorkspaceStats> {
        let mut blob_count = 0;
        let mut total_blob_size = 0u64;

        if self.archives_dir.exists() {
            for entry in WalkDir::new(&self.archives_dir) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    blob_count += 1;
                    total_blob_size += entry.metadata()?.len();
                }
            }
        }

        let manifest_size = if self.manifest_path.exists() {
            fs::metadata(&self.manifest_path)?.len()
        } else {
            0
        };

        Ok(WorkspaceStats {
            blob_count,
            total_blob_size,
            manifest_size,
        })
    }
}

/// Disk usage of the workspace
#[derive(Debug, Default)]
pub struct WorkspaceStats {
    pub blob_count: usize,
    pub total_blob_size: u64,
    pub manifest_size: u64,
}
