//! Archive orchestration
//!
//! Composes the codec and the version catalog into the user-facing
//! operations: archive, restore, diff, purge and stats. Every mutation runs
//! to completion inside the catalog's transaction so a failure leaves the
//! pre-operation state.

use crate::catalog::{CatalogStats, PathSummary, VersionCatalog, VersionRecord};
use crate::codec::{self, Codec};
use crate::data::{DataProcessor, Table};
use crate::diff::{DiffEngine, DiffReport};
use crate::error::{PermafrostError, Result};
use crate::progress;
use crate::resolver::PathResolver;
use crate::workspace::PermafrostWorkspace;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Result of a restore operation
#[derive(Debug)]
pub struct RestoreOutcome {
    pub record: VersionRecord,
    pub bytes_written: u64,
}

/// Result of a purge operation
#[derive(Debug)]
pub struct PurgeOutcome {
    pub original_path: String,
    pub removed: Vec<VersionRecord>,
}

/// Result of a diff between two archived snapshots
#[derive(Debug)]
pub struct DiffOutcome {
    pub base: VersionRecord,
    pub candidate: VersionRecord,
    pub report: DiffReport,
}

/// Orchestrates codec + catalog into atomic archive operations
pub struct ArchiveManager {
    workspace: PermafrostWorkspace,
    catalog: VersionCatalog,
    codec: Codec,
    diff_sample_limit: usize,
}

impl ArchiveManager {
    /// Open the manager against an existing (or freshly created) workspace.
    /// Compression level and diff sample limit come from the workspace
    /// configuration.
    pub fn open(workspace: PermafrostWorkspace) -> Result<Self> {
        let catalog = VersionCatalog::open(&workspace)?;
        let config = workspace.load_config()?;

        Ok(Self {
            catalog,
            codec: Codec::with_level(config.compression_level),
            diff_sample_limit: config.diff_sample_limit,
            workspace,
        })
    }

    pub fn workspace(&self) -> &PermafrostWorkspace {
        &self.workspace
    }

    /// Compress a file and append it to the catalog as the next version of
    /// its path. With `verify`, the blob is round-tripped in memory and hash
    /// checked before the record is committed.
    pub fn archive(&mut self, path: &Path, verify: bool) -> Result<VersionRecord> {
        if !path.is_file() {
            return Err(PermafrostError::invalid_input(format!(
                "Not a file: {}",
                path.display()
            )));
        }

        let normalized = path
            .canonicalize()?
            .to_string_lossy()
            .to_string();

        let bytes = fs::read(path)?;
        let hash = codec::content_hash(&bytes);

        let spinner = progress::create_spinner(&format!("Compressing {}...", path.display()));
        let blob = self.codec.compress(&bytes)?;
        spinner.finish_and_clear();

        if verify {
            let roundtrip = self.codec.decompress(&blob)?;
            if codec::content_hash(&roundtrip) != hash {
                return Err(PermafrostError::storage_corruption(format!(
                    "verification failed for {}: restored bytes do not match the original",
                    path.display()
                )));
            }
        }

        let record = self
            .catalog
            .append(&normalized, &blob, &hash, bytes.len() as u64)?;

        log::info!(
            "Archived {} as {} (v{}, {:.1}% saved)",
            record.original_path,
            record.archive_name,
            record.version,
            record.compression_ratio() * 100.0
        );

        Ok(record)
    }

    /// Resolve a spec, decompress its blob and write it back to the
    /// original path
    pub fn restore(&self, spec: &str, version: Option<u32>) -> Result<RestoreOutcome> {
        let (record, bytes) = self.restore_to_memory(spec, version)?;

        let target = Path::new(&record.original_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let progress = progress::create_file_progress(bytes.len() as u64, "Writing restored file");
        fs::write(target, &bytes)?;
        progress.set_position(bytes.len() as u64);
        progress.finish_and_clear();

        log::info!(
            "Restored {} v{} ({} bytes)",
            record.original_path,
            record.version,
            bytes.len()
        );

        Ok(RestoreOutcome {
            bytes_written: bytes.len() as u64,
            record,
        })
    }

    /// Resolve a spec and materialize its decompressed content in memory.
    /// The stored content hash gates the result: damaged blobs never reach
    /// the caller as good data.
    pub fn restore_to_memory(&self, spec: &str, version: Option<u32>) -> Result<(VersionRecord, Vec<u8>)> {
        let record = PathResolver::new(&self.catalog).resolve(spec, version)?;
        let blob = self.catalog.read_blob(&record)?;
        let bytes = self.codec.decompress(&blob)?;

        if codec::content_hash(&bytes) != record.content_hash {
            return Err(PermafrostError::storage_corruption(format!(
                "content hash mismatch for {} v{}: archive blob is damaged",
                record.original_path, record.version
            )));
        }

        Ok((record, bytes))
    }

    /// Structurally compare two archived snapshots
    pub fn diff(
        &self,
        spec_a: &str,
        spec_b: &str,
        key_columns: Option<&[String]>,
    ) -> Result<DiffOutcome> {
        let (base, base_bytes) = self.restore_to_memory(spec_a, None)?;
        let (candidate, cand_bytes) = self.restore_to_memory(spec_b, None)?;

        let spinner = progress::create_spinner("Loading snapshots...");
        let base_table = materialize(&base, &base_bytes)?;
        let cand_table = materialize(&candidate, &cand_bytes)?;
        spinner.finish_and_clear();

        let report = DiffEngine::with_sample_limit(self.diff_sample_limit).compare(
            &base_table,
            &cand_table,
            key_columns,
        )?;

        Ok(DiffOutcome {
            base,
            candidate,
            report,
        })
    }

    /// Remove one version, or every version of a path when `version` is
    /// omitted
    pub fn purge(&mut self, spec: &str, version: Option<u32>) -> Result<PurgeOutcome> {
        let target = PathResolver::new(&self.catalog).resolve_path(spec)?;
        let removed = self.catalog.remove(&target, version)?;

        log::info!("Purged {} archive(s) of {}", removed.len(), target);

        Ok(PurgeOutcome {
            original_path: target,
            removed,
        })
    }

    /// All versions of the spec'd path, ascending
    pub fn list_versions(&self, spec: &str) -> Result<Vec<VersionRecord>> {
        let target = PathResolver::new(&self.catalog).resolve_path(spec)?;
        self.catalog.list_versions(&target)
    }

    /// Every record across every path
    pub fn list_all(&self) -> Result<Vec<VersionRecord>> {
        self.catalog.list_all()
    }

    /// One summary per distinct path
    pub fn summaries(&self) -> Result<Vec<PathSummary>> {
        self.catalog.summaries()
    }

    /// Catalog statistics, optionally narrowed to one path spec
    pub fn stats(&self, spec: Option<&str>) -> Result<CatalogStats> {
        match spec {
            Some(s) => {
                let target = PathResolver::new(&self.catalog).resolve_path(s)?;
                self.catalog.stats(Some(&target))
            }
            None => self.catalog.stats(None),
        }
    }
}

/// Write decompressed snapshot bytes to a suffix-preserving temp file so
/// DuckDB can sniff the format, then load it as a typed table
fn materialize(record: &VersionRecord, bytes: &[u8]) -> Result<Table> {
    let source = Path::new(&record.original_path);
    if !DataProcessor::is_supported_format(source) {
        return Err(PermafrostError::invalid_input(format!(
            "Cannot diff {}: not a supported tabular format (csv, tsv, json, jsonl, parquet)",
            record.original_path
        )));
    }

    let suffix = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut tmp = tempfile::Builder::new()
        .prefix("permafrost-")
        .suffix(&suffix)
        .tempfile()?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    let processor = DataProcessor::new()?;
    processor.load_table(tmp.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(temp_dir: &TempDir) -> ArchiveManager {
        let workspace = PermafrostWorkspace::create_new(temp_dir.path().to_path_buf()).unwrap();
        ArchiveManager::open(workspace).unwrap()
    }

    fn write_file(temp_dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = temp_dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_archive_and_restore_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager_in(&temp_dir);

        let content = "id,amount\n1,10\n2,20\n";
        let path = write_file(&temp_dir, "sales.csv", content);

        let record = manager.archive(&path, true).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.original_size, content.len() as u64);

        // Clobber the working copy, then restore it
        fs::write(&path, "garbage").unwrap();
        let outcome = manager.restore("sales.csv", None).unwrap();
        assert_eq!(outcome.record.version, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_restore_detects_damaged_blob() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager_in(&temp_dir);

        let path = write_file(&temp_dir, "sales.csv", "id\n1\n");
        let record = manager.archive(&path, false).unwrap();

        // Replace the blob with a valid frame of the wrong content
        let bogus = Codec::new().compress(b"id\n9\n").unwrap();
        fs::write(&record.storage_path, bogus).unwrap();

        assert!(matches!(
            manager.restore("sales.csv", None),
            Err(PermafrostError::StorageCorruption { .. })
        ));
    }

    #[test]
    fn test_diff_rejects_non_tabular_formats() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager_in(&temp_dir);

        let path = write_file(&temp_dir, "notes.txt", "free-form text\n");
        manager.archive(&path, false).unwrap();

        assert!(matches!(
            manager.diff("notes.txt@1", "notes.txt@1", None),
            Err(PermafrostError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_purge_narrows_by_fragment() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager_in(&temp_dir);

        let path = write_file(&temp_dir, "sales.csv", "id\n1\n");
        manager.archive(&path, false).unwrap();
        manager.archive(&path, false).unwrap();

        let outcome = manager.purge("sales", Some(1)).unwrap();
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].version, 1);

        let versions = manager.list_versions("sales").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 2);
    }
}
