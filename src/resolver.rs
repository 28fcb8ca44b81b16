//! Path-spec resolution against the version catalog
//!
//! A user-supplied spec is one of: an exact archive filename, a path with an
//! explicit version, an exact original path, or a partial name fragment.
//! Resolution walks those interpretations in order and must land on exactly
//! one record, or fail saying why it could not.

use crate::catalog::{VersionCatalog, VersionRecord};
use crate::error::{PermafrostError, Result};
use std::path::Path;

/// A parsed path spec: the path portion plus any embedded `@N` version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub path: String,
    pub version: Option<u32>,
}

impl PathSpec {
    /// Parse a spec string, recognizing a trailing `@N` version qualifier.
    /// The suffix only counts as a version when it is a positive integer, so
    /// paths that merely contain `@` still resolve as paths.
    pub fn parse(spec: &str) -> Self {
        if let Some((path, suffix)) = spec.rsplit_once('@') {
            if !path.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
            {
                if let Ok(version) = suffix.parse::<u32>() {
                    if version > 0 {
                        return Self {
                            path: path.to_string(),
                            version: Some(version),
                        };
                    }
                }
            }
        }

        Self {
            path: spec.to_string(),
            version: None,
        }
    }
}

/// Resolves path specs to catalog records
pub struct PathResolver<'a> {
    catalog: &'a VersionCatalog,
}

impl<'a> PathResolver<'a> {
    pub fn new(catalog: &'a VersionCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve a spec (plus an optional explicit version, which takes
    /// precedence over an embedded `@N` suffix) to exactly one record.
    pub fn resolve(&self, spec: &str, version: Option<u32>) -> Result<VersionRecord> {
        let parsed = PathSpec::parse(spec);
        let version = version.or(parsed.version);

        // Exact archive filename carries the version in the name
        if let Ok(record) = self.catalog.find_by_archive_name(spec) {
            return match version {
                Some(v) if v != record.version => self.catalog.get(&record.original_path, v),
                _ => Ok(record),
            };
        }

        let path = normalize(&parsed.path);

        match version {
            Some(v) => {
                // Exact path with that version, else narrow by fragment first.
                // The resolved path must carry the exact version either way.
                if let Ok(record) = self.catalog.get(&path, v) {
                    return Ok(record);
                }
                if !self.catalog.list_versions(&path)?.is_empty() {
                    // The path itself is cataloged; the version is simply gone
                    return Err(PermafrostError::not_found(format!("{}@{}", path, v)));
                }
                let target = self.narrow_fragment(&parsed.path)?;
                self.catalog.get(&target, v)
            }
            None => {
                // Exact path resolves to its latest version
                if let Ok(record) = self.catalog.latest(&path) {
                    return Ok(record);
                }
                let target = self.narrow_fragment(&parsed.path)?;
                self.catalog.latest(&target)
            }
        }
    }

    /// Resolve a spec to a catalog path without picking a version: exact
    /// path first, then unique fragment. Used by purge, ls and stats.
    pub fn resolve_path(&self, spec: &str) -> Result<String> {
        let parsed = PathSpec::parse(spec);
        let path = normalize(&parsed.path);

        if !self.catalog.list_versions(&path)?.is_empty() {
            return Ok(path);
        }

        self.narrow_fragment(&parsed.path)
    }

    /// Substring match over the catalog that must narrow to one path
    fn narrow_fragment(&self, fragment: &str) -> Result<String> {
        let mut candidates = self.catalog.find_by_partial(fragment)?;
        match candidates.len() {
            0 => Err(PermafrostError::not_found(fragment.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => Err(PermafrostError::ambiguous(fragment, candidates)),
        }
    }
}

/// Canonicalize specs that point at an existing file so they match the
/// normalized paths the catalog stores; leave everything else untouched.
fn normalize(path: &str) -> String {
    let p = Path::new(path);
    if p.exists() {
        p.canonicalize()
            .map(|c| c.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string())
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::workspace::PermafrostWorkspace;
    use tempfile::TempDir;

    fn catalog_with(paths: &[(&str, usize)]) -> (TempDir, VersionCatalog) {
        let temp_dir = TempDir::new().unwrap();
        let workspace = PermafrostWorkspace::create_new(temp_dir.path().to_path_buf()).unwrap();
        let mut catalog = VersionCatalog::open(&workspace).unwrap();

        for (path, versions) in paths {
            for i in 0..*versions {
                let payload = format!("{} v{}", path, i + 1);
                let hash = codec::content_hash(payload.as_bytes());
                catalog
                    .append(path, payload.as_bytes(), &hash, payload.len() as u64)
                    .unwrap();
            }
        }

        (temp_dir, catalog)
    }

    #[test]
    fn test_parse_version_suffix() {
        let spec = PathSpec::parse("data/sales.csv@2");
        assert_eq!(spec.path, "data/sales.csv");
        assert_eq!(spec.version, Some(2));

        // Non-numeric and zero suffixes stay part of the path
        assert_eq!(PathSpec::parse("user@host.csv").version, None);
        assert_eq!(PathSpec::parse("data/sales.csv@0").version, None);
        assert_eq!(PathSpec::parse("@3").path, "@3");
    }

    #[test]
    fn test_exact_path_resolves_latest() {
        let (_tmp, catalog) = catalog_with(&[("data/sales.csv", 3)]);
        let resolver = PathResolver::new(&catalog);

        let record = resolver.resolve("data/sales.csv", None).unwrap();
        assert_eq!(record.version, 3);
    }

    #[test]
    fn test_explicit_version_wins() {
        let (_tmp, catalog) = catalog_with(&[("data/sales.csv", 3)]);
        let resolver = PathResolver::new(&catalog);

        assert_eq!(
            resolver.resolve("data/sales.csv", Some(1)).unwrap().version,
            1
        );
        assert_eq!(resolver.resolve("data/sales.csv@2", None).unwrap().version, 2);

        assert!(matches!(
            resolver.resolve("data/sales.csv", Some(9)),
            Err(PermafrostError::NotFound { .. })
        ));
    }

    #[test]
    fn test_archive_name_matches_its_own_record() {
        let (_tmp, catalog) = catalog_with(&[("data/sales.csv", 2)]);
        let resolver = PathResolver::new(&catalog);

        let by_name = resolver.resolve("sales_v1.csv", None).unwrap();
        let by_version = resolver.resolve("data/sales.csv", Some(1)).unwrap();
        assert_eq!(by_name.id, by_version.id);
    }

    #[test]
    fn test_fragment_narrows_to_latest() {
        let (_tmp, catalog) = catalog_with(&[("data/sales.csv", 3), ("data/expenses.csv", 1)]);
        let resolver = PathResolver::new(&catalog);

        let record = resolver.resolve("sales", None).unwrap();
        assert_eq!(record.original_path, "data/sales.csv");
        assert_eq!(record.version, 3);

        // Fragment resolution composes with an explicit version
        let record = resolver.resolve("sales", Some(1)).unwrap();
        assert_eq!(record.version, 1);
    }

    #[test]
    fn test_fragment_failures() {
        let (_tmp, catalog) = catalog_with(&[("data/sales.csv", 1), ("data/sales_eu.csv", 1)]);
        let resolver = PathResolver::new(&catalog);

        assert!(matches!(
            resolver.resolve("nothing-here", None),
            Err(PermafrostError::NotFound { .. })
        ));

        match resolver.resolve("sales", None) {
            Err(PermafrostError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.contains(&"data/sales.csv".to_string()));
                assert!(candidates.contains(&"data/sales_eu.csv".to_string()));
            }
            other => panic!("expected Ambiguous, got {:?}", other.map(|r| r.archive_name)),
        }
    }
}
