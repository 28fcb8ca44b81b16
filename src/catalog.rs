//! Version catalog backed by a DuckDB manifest database
//!
//! One row per (original_path, version) archive event. The catalog owns the
//! compressed blobs: a record and its blob are created and destroyed
//! together, so the store never holds an orphaned blob or a dangling record.

use crate::codec;
use crate::error::{PermafrostError, Result};
use crate::workspace::PermafrostWorkspace;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS archives (
    id VARCHAR PRIMARY KEY,
    original_path VARCHAR NOT NULL,
    version BIGINT NOT NULL,
    archive_name VARCHAR NOT NULL UNIQUE,
    created_at VARCHAR NOT NULL,
    content_hash VARCHAR NOT NULL,
    original_size BIGINT NOT NULL,
    compressed_size BIGINT NOT NULL,
    storage_path VARCHAR NOT NULL,
    UNIQUE (original_path, version)
);
";

const RECORD_COLUMNS: &str = "id, original_path, version, archive_name, created_at, \
                              content_hash, original_size, compressed_size, storage_path";

/// One archived snapshot of a file
#[derive(Debug, Clone, Serialize)]
pub struct VersionRecord {
    pub id: String,
    pub original_path: String,
    pub version: u32,
    pub archive_name: String,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub storage_path: PathBuf,
}

impl VersionRecord {
    /// Fraction of bytes saved by compression
    pub fn compression_ratio(&self) -> f64 {
        codec::compression_ratio(self.original_size, self.compressed_size)
    }
}

/// Raw row shape before timestamp parsing
struct RecordRow {
    id: String,
    original_path: String,
    version: i64,
    archive_name: String,
    created_at: String,
    content_hash: String,
    original_size: i64,
    compressed_size: i64,
    storage_path: String,
}

impl RecordRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            original_path: row.get(1)?,
            version: row.get(2)?,
            archive_name: row.get(3)?,
            created_at: row.get(4)?,
            content_hash: row.get(5)?,
            original_size: row.get(6)?,
            compressed_size: row.get(7)?,
            storage_path: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<VersionRecord> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| {
                PermafrostError::storage_corruption(format!(
                    "unparseable timestamp '{}' on record {}: {}",
                    self.created_at, self.id, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(VersionRecord {
            id: self.id,
            original_path: self.original_path,
            version: self.version as u32,
            archive_name: self.archive_name,
            created_at,
            content_hash: self.content_hash,
            original_size: self.original_size as u64,
            compressed_size: self.compressed_size as u64,
            storage_path: PathBuf::from(self.storage_path),
        })
    }
}

/// Per-path rollup used by the summary listing
#[derive(Debug, Clone, Serialize)]
pub struct PathSummary {
    pub original_path: String,
    pub latest_version: u32,
    pub version_count: u64,
    pub last_archived: DateTime<Utc>,
    pub total_original: u64,
    pub total_compressed: u64,
}

impl PathSummary {
    pub fn avg_compression_ratio(&self) -> f64 {
        codec::compression_ratio(self.total_original, self.total_compressed)
    }
}

/// Aggregate statistics over the catalog, optionally scoped to one path
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub scope: Option<String>,
    pub archive_count: u64,
    pub path_count: u64,
    pub total_original: u64,
    pub total_compressed: u64,
    pub latest_version: Option<u32>,
    pub last_archived: Option<DateTime<Utc>>,
}

impl CatalogStats {
    pub fn space_saved(&self) -> u64 {
        self.total_original.saturating_sub(self.total_compressed)
    }

    pub fn avg_compression_ratio(&self) -> f64 {
        codec::compression_ratio(self.total_original, self.total_compressed)
    }
}

/// Append-only record store for archived file versions
pub struct VersionCatalog {
    conn: Connection,
    workspace: PermafrostWorkspace,
}

impl VersionCatalog {
    /// Open (or create) the catalog inside a workspace
    pub fn open(workspace: &PermafrostWorkspace) -> Result<Self> {
        let conn = Connection::open(&workspace.manifest_path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn,
            workspace: workspace.clone(),
        })
    }

    /// Append a new version for `original_path`, storing `blob` alongside the
    /// record. Blob and record persist together or not at all.
    pub fn append(
        &mut self,
        original_path: &str,
        blob: &[u8],
        content_hash: &str,
        original_size: u64,
    ) -> Result<VersionRecord> {
        let version = self.next_version(original_path)?;
        let archive_name = self.archive_name_for(original_path, version)?;
        let storage_path = self.workspace.blob_path(&archive_name);

        // created_at never decreases across versions of one path, even if
        // the wall clock steps backwards between archives
        let created_at = match self.latest_created_at(original_path)? {
            Some(previous) => Utc::now().max(previous),
            None => Utc::now(),
        };

        let record = VersionRecord {
            id: Uuid::new_v4().to_string(),
            original_path: original_path.to_string(),
            version,
            archive_name,
            created_at,
            content_hash: content_hash.to_string(),
            original_size,
            compressed_size: blob.len() as u64,
            storage_path: storage_path.clone(),
        };

        // Stage the blob under a temp name so a failed insert leaves nothing
        let tmp_path = storage_path.with_extension("zst.tmp");
        fs::write(&tmp_path, blob)?;

        if let Err(e) = self.conn.execute_batch("BEGIN TRANSACTION;") {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        let inserted = self.conn.execute(
            &format!("INSERT INTO archives ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)", RECORD_COLUMNS),
            params![
                record.id,
                record.original_path,
                record.version as i64,
                record.archive_name,
                record.created_at.to_rfc3339(),
                record.content_hash,
                record.original_size as i64,
                record.compressed_size as i64,
                record.storage_path.to_string_lossy().to_string(),
            ],
        );

        if let Err(e) = inserted {
            let _ = self.conn.execute_batch("ROLLBACK;");
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp_path, &storage_path) {
            let _ = self.conn.execute_batch("ROLLBACK;");
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        if let Err(e) = self.conn.execute_batch("COMMIT;") {
            let _ = fs::remove_file(&storage_path);
            return Err(e.into());
        }

        log::debug!(
            "Appended {} v{} as {}",
            record.original_path,
            record.version,
            record.archive_name
        );

        Ok(record)
    }

    /// Most recent archive timestamp for a path, if any
    fn latest_created_at(&self, original_path: &str) -> Result<Option<DateTime<Utc>>> {
        let max: Option<String> = self
            .conn
            .prepare("SELECT MAX(created_at) FROM archives WHERE original_path = ?")?
            .query_row(params![original_path], |row| row.get(0))?;

        match max {
            Some(ts) => Ok(Some(
                DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| {
                        PermafrostError::storage_corruption(format!(
                            "unparseable timestamp '{}' for {}: {}",
                            ts, original_path, e
                        ))
                    })?
                    .with_timezone(&Utc),
            )),
            None => Ok(None),
        }
    }

    /// Next version number for a path: max existing + 1, starting at 1
    fn next_version(&self, original_path: &str) -> Result<u32> {
        let next: i64 = self
            .conn
            .prepare("SELECT COALESCE(MAX(version), 0) + 1 FROM archives WHERE original_path = ?")?
            .query_row(params![original_path], |row| row.get(0))?;
        Ok(next as u32)
    }

    /// Canonical blob name: `{stem}_v{version}{ext}`, hash-qualified when a
    /// different path with the same file name is already cataloged.
    fn archive_name_for(&self, original_path: &str, version: u32) -> Result<String> {
        let (stem, ext) = split_file_name(original_path);

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT original_path FROM archives WHERE original_path <> ?")?;
        let others = stmt
            .query_map(params![original_path], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;

        let clashes = others
            .iter()
            .any(|other| split_file_name(other) == (stem.clone(), ext.clone()));

        if clashes {
            let tag = &codec::content_hash(original_path.as_bytes())[..8];
            Ok(format!("{}-{}_v{}{}", stem, tag, version, ext))
        } else {
            Ok(format!("{}_v{}{}", stem, version, ext))
        }
    }

    /// All versions of one path, ascending by version
    pub fn list_versions(&self, original_path: &str) -> Result<Vec<VersionRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM archives WHERE original_path = ? ORDER BY version",
                RECORD_COLUMNS
            ),
            params![original_path],
        )
    }

    /// Every record across every path, ordered by path then version
    pub fn list_all(&self) -> Result<Vec<VersionRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM archives ORDER BY original_path, version",
                RECORD_COLUMNS
            ),
            params![],
        )
    }

    /// One summary row per distinct path (latest version, counts, sizes)
    pub fn summaries(&self) -> Result<Vec<PathSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT original_path,
                    MAX(version),
                    COUNT(*),
                    MAX(created_at),
                    CAST(COALESCE(SUM(original_size), 0) AS BIGINT),
                    CAST(COALESCE(SUM(compressed_size), 0) AS BIGINT)
             FROM archives
             GROUP BY original_path
             ORDER BY original_path",
        )?;

        let rows = stmt.query_map(params![], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (path, latest, count, last, original, compressed) = row?;
            let last_archived = DateTime::parse_from_rfc3339(&last)
                .map_err(|e| {
                    PermafrostError::storage_corruption(format!(
                        "unparseable timestamp '{}' for {}: {}",
                        last, path, e
                    ))
                })?
                .with_timezone(&Utc);

            summaries.push(PathSummary {
                original_path: path,
                latest_version: latest as u32,
                version_count: count as u64,
                last_archived,
                total_original: original as u64,
                total_compressed: compressed as u64,
            });
        }

        Ok(summaries)
    }

    /// Exact lookup by path and version
    pub fn get(&self, original_path: &str, version: u32) -> Result<VersionRecord> {
        self.query_records(
            &format!(
                "SELECT {} FROM archives WHERE original_path = ? AND version = ?",
                RECORD_COLUMNS
            ),
            params![original_path, version as i64],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| PermafrostError::not_found(format!("{}@{}", original_path, version)))
    }

    /// Latest version for a path (maximum version integer)
    pub fn latest(&self, original_path: &str) -> Result<VersionRecord> {
        self.query_records(
            &format!(
                "SELECT {} FROM archives WHERE original_path = ? ORDER BY version DESC LIMIT 1",
                RECORD_COLUMNS
            ),
            params![original_path],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| PermafrostError::not_found(original_path.to_string()))
    }

    /// Exact lookup by derived archive name
    pub fn find_by_archive_name(&self, name: &str) -> Result<VersionRecord> {
        self.query_records(
            &format!("SELECT {} FROM archives WHERE archive_name = ?", RECORD_COLUMNS),
            params![name],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| PermafrostError::not_found(name.to_string()))
    }

    /// Distinct original paths whose path or archive name contains the
    /// fragment, case-insensitively, in sorted order
    pub fn find_by_partial(&self, fragment: &str) -> Result<Vec<String>> {
        let needle = fragment.to_lowercase();

        let mut stmt = self
            .conn
            .prepare("SELECT original_path, archive_name FROM archives")?;
        let rows = stmt.query_map(params![], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut matches = BTreeSet::new();
        for row in rows {
            let (path, name) = row?;
            if path.to_lowercase().contains(&needle) || name.to_lowercase().contains(&needle) {
                matches.insert(path);
            }
        }

        Ok(matches.into_iter().collect())
    }

    /// Remove one version, or every version when `version` is `None`.
    /// Returns the removed records.
    pub fn remove(&mut self, original_path: &str, version: Option<u32>) -> Result<Vec<VersionRecord>> {
        let doomed = match version {
            Some(v) => vec![self.get(original_path, v)?],
            None => {
                let all = self.list_versions(original_path)?;
                if all.is_empty() {
                    return Err(PermafrostError::not_found(original_path.to_string()));
                }
                all
            }
        };

        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        let deleted = match version {
            Some(v) => self.conn.execute(
                "DELETE FROM archives WHERE original_path = ? AND version = ?",
                params![original_path, v as i64],
            ),
            None => self.conn.execute(
                "DELETE FROM archives WHERE original_path = ?",
                params![original_path],
            ),
        };

        match deleted {
            Ok(_) => self.conn.execute_batch("COMMIT;")?,
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                return Err(e.into());
            }
        }

        // Records are gone; blobs go with them. A failed unlink is surfaced in
        // the log rather than silently ignored.
        for record in &doomed {
            if let Err(e) = fs::remove_file(&record.storage_path) {
                log::warn!(
                    "Failed to remove blob {}: {}",
                    record.storage_path.display(),
                    e
                );
            }
        }

        Ok(doomed)
    }

    /// Read the compressed blob owned by a record
    pub fn read_blob(&self, record: &VersionRecord) -> Result<Vec<u8>> {
        if !record.storage_path.exists() {
            return Err(PermafrostError::storage_corruption(format!(
                "record {} v{} has no blob at {}",
                record.original_path,
                record.version,
                record.storage_path.display()
            )));
        }
        Ok(fs::read(&record.storage_path)?)
    }

    /// Aggregate statistics, optionally scoped to one path
    pub fn stats(&self, original_path: Option<&str>) -> Result<CatalogStats> {
        match original_path {
            Some(path) => {
                let mut stmt = self.conn.prepare(
                    "SELECT COUNT(*),
                            CAST(COALESCE(SUM(original_size), 0) AS BIGINT),
                            CAST(COALESCE(SUM(compressed_size), 0) AS BIGINT),
                            MAX(version),
                            MAX(created_at)
                     FROM archives WHERE original_path = ?",
                )?;
                let (count, original, compressed, latest, last) =
                    stmt.query_row(params![path], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    })?;

                if count == 0 {
                    return Err(PermafrostError::not_found(path.to_string()));
                }

                let last_archived = match last {
                    Some(ts) => Some(
                        DateTime::parse_from_rfc3339(&ts)
                            .map_err(|e| {
                                PermafrostError::storage_corruption(format!(
                                    "unparseable timestamp '{}' for {}: {}",
                                    ts, path, e
                                ))
                            })?
                            .with_timezone(&Utc),
                    ),
                    None => None,
                };

                Ok(CatalogStats {
                    scope: Some(path.to_string()),
                    archive_count: count as u64,
                    path_count: 1,
                    total_original: original as u64,
                    total_compressed: compressed as u64,
                    latest_version: latest.map(|v| v as u32),
                    last_archived,
                })
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT COUNT(*),
                            COUNT(DISTINCT original_path),
                            CAST(COALESCE(SUM(original_size), 0) AS BIGINT),
                            CAST(COALESCE(SUM(compressed_size), 0) AS BIGINT)
                     FROM archives",
                )?;
                let (count, paths, original, compressed) = stmt.query_row(params![], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?;

                Ok(CatalogStats {
                    scope: None,
                    archive_count: count as u64,
                    path_count: paths as u64,
                    total_original: original as u64,
                    total_compressed: compressed as u64,
                    latest_version: None,
                    last_archived: None,
                })
            }
        }
    }

    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<VersionRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, RecordRow::from_row)?
            .collect::<duckdb::Result<Vec<RecordRow>>>()?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

/// Split a path into its file stem and extension (with leading dot)
fn split_file_name(path: &str) -> (String, String) {
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());

    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (file_name[..idx].to_string(), file_name[idx..].to_string()),
        _ => (file_name, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::PermafrostWorkspace;
    use tempfile::TempDir;

    fn test_catalog() -> (TempDir, VersionCatalog) {
        let temp_dir = TempDir::new().unwrap();
        let workspace = PermafrostWorkspace::create_new(temp_dir.path().to_path_buf()).unwrap();
        let catalog = VersionCatalog::open(&workspace).unwrap();
        (temp_dir, catalog)
    }

    fn append(catalog: &mut VersionCatalog, path: &str, payload: &[u8]) -> VersionRecord {
        let hash = codec::content_hash(payload);
        catalog
            .append(path, payload, &hash, payload.len() as u64 * 3)
            .unwrap()
    }

    #[test]
    fn test_versions_are_dense_from_one() {
        let (_tmp, mut catalog) = test_catalog();

        for _ in 0..4 {
            append(&mut catalog, "data/sales.csv", b"blob");
        }

        let versions: Vec<u32> = catalog
            .list_versions("data/sales.csv")
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_archive_name_embeds_stem_and_version() {
        let (_tmp, mut catalog) = test_catalog();

        let record = append(&mut catalog, "data/sales.csv", b"blob");
        assert_eq!(record.archive_name, "sales_v1.csv");
        assert!(record.storage_path.exists());
    }

    #[test]
    fn test_archive_name_disambiguates_same_stem() {
        let (_tmp, mut catalog) = test_catalog();

        let first = append(&mut catalog, "a/sales.csv", b"one");
        let second = append(&mut catalog, "b/sales.csv", b"two");

        assert_eq!(first.archive_name, "sales_v1.csv");
        assert_ne!(second.archive_name, "sales_v1.csv");
        assert!(second.archive_name.starts_with("sales-"));
        assert!(second.archive_name.ends_with("_v1.csv"));
    }

    #[test]
    fn test_remove_single_version_leaves_gap() {
        let (_tmp, mut catalog) = test_catalog();

        for _ in 0..3 {
            append(&mut catalog, "data/sales.csv", b"blob");
        }

        let removed = catalog.remove("data/sales.csv", Some(2)).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!removed[0].storage_path.exists());

        let versions: Vec<u32> = catalog
            .list_versions("data/sales.csv")
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![1, 3]);

        assert!(matches!(
            catalog.get("data/sales.csv", 2),
            Err(PermafrostError::NotFound { .. })
        ));

        // A purged version number is never reused
        let next = append(&mut catalog, "data/sales.csv", b"blob");
        assert_eq!(next.version, 4);
    }

    #[test]
    fn test_remove_all_versions() {
        let (_tmp, mut catalog) = test_catalog();

        append(&mut catalog, "data/sales.csv", b"one");
        append(&mut catalog, "data/sales.csv", b"two");
        append(&mut catalog, "data/other.csv", b"keep");

        let removed = catalog.remove("data/sales.csv", None).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(catalog.list_versions("data/sales.csv").unwrap().is_empty());
        assert_eq!(catalog.list_versions("data/other.csv").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_missing_path_fails() {
        let (_tmp, mut catalog) = test_catalog();
        assert!(matches!(
            catalog.remove("nope.csv", None),
            Err(PermafrostError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_by_partial_is_case_insensitive() {
        let (_tmp, mut catalog) = test_catalog();

        append(&mut catalog, "data/Sales.csv", b"blob");
        append(&mut catalog, "data/expenses.csv", b"blob");

        let matches = catalog.find_by_partial("SALES").unwrap();
        assert_eq!(matches, vec!["data/Sales.csv".to_string()]);

        let matches = catalog.find_by_partial("data").unwrap();
        assert_eq!(matches.len(), 2);

        assert!(catalog.find_by_partial("missing").unwrap().is_empty());
    }

    #[test]
    fn test_read_blob_detects_missing_file() {
        let (_tmp, mut catalog) = test_catalog();

        let record = append(&mut catalog, "data/sales.csv", b"blob");
        fs::remove_file(&record.storage_path).unwrap();

        assert!(matches!(
            catalog.read_blob(&record),
            Err(PermafrostError::StorageCorruption { .. })
        ));
    }

    #[test]
    fn test_stats_rollup() {
        let (_tmp, mut catalog) = test_catalog();

        append(&mut catalog, "data/sales.csv", b"0123456789");
        append(&mut catalog, "data/sales.csv", b"0123456789");
        append(&mut catalog, "data/other.csv", b"01234");

        let overall = catalog.stats(None).unwrap();
        assert_eq!(overall.archive_count, 3);
        assert_eq!(overall.path_count, 2);
        assert_eq!(overall.total_compressed, 25);

        let scoped = catalog.stats(Some("data/sales.csv")).unwrap();
        assert_eq!(scoped.archive_count, 2);
        assert_eq!(scoped.latest_version, Some(2));

        assert!(matches!(
            catalog.stats(Some("nope.csv")),
            Err(PermafrostError::NotFound { .. })
        ));
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(
            split_file_name("data/sales.csv"),
            ("sales".to_string(), ".csv".to_string())
        );
        assert_eq!(
            split_file_name("noext"),
            ("noext".to_string(), String::new())
        );
        assert_eq!(
            split_file_name(".hidden"),
            (".hidden".to_string(), String::new())
        );
    }
}
