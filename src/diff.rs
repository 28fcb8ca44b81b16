//! Structural diff engine for tabular snapshots
//!
//! Compares a baseline and a candidate table independently of row order:
//! rows are matched by key columns (supplied, or detected by uniqueness up
//! to pairs), falling back to positional comparison when no reliable key
//! exists. The fallback is carried in the result so callers can tell the
//! modes apart. Counts are exact over the full datasets; per-class samples
//! are bounded for display.

use crate::data::{Column, ScalarValue, Table};
use crate::error::{PermafrostError, Result};
use crate::{DIFF_SAMPLE_LIMIT, MAX_KEY_COMBINATION};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Relative tolerance for floating point comparison
const FLOAT_REL_TOLERANCE: f64 = 1e-9;
/// Absolute tolerance for floating point comparison
const FLOAT_ABS_TOLERANCE: f64 = 1e-12;

/// How rows were matched between the two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "columns", rename_all = "snake_case")]
pub enum KeyMode {
    /// Caller-supplied key columns
    Explicit(Vec<String>),
    /// Key columns detected by uniqueness within both datasets
    Detected(Vec<String>),
    /// Row-index comparison; no reliable key was found
    Positional,
}

/// A column as the schema diff sees it
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

/// Declared type change of a shared column
#[derive(Debug, Clone, Serialize)]
pub struct TypeChange {
    pub column: String,
    pub from: String,
    pub to: String,
}

/// Column-level differences between the snapshots
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiff {
    pub added_columns: Vec<ColumnSchema>,
    pub removed_columns: Vec<ColumnSchema>,
    pub type_changes: Vec<TypeChange>,
}

impl SchemaDiff {
    pub fn has_changes(&self) -> bool {
        !self.added_columns.is_empty()
            || !self.removed_columns.is_empty()
            || !self.type_changes.is_empty()
    }
}

/// Old/new value pair for one cell of a modified row
#[derive(Debug, Clone, Serialize)]
pub struct CellChange {
    pub column: String,
    pub old: ScalarValue,
    pub new: ScalarValue,
}

/// A sampled added or removed row
#[derive(Debug, Clone, Serialize)]
pub struct RowSample {
    pub key: Vec<ScalarValue>,
    pub values: IndexMap<String, ScalarValue>,
}

/// A sampled modified row with its differing cells
#[derive(Debug, Clone, Serialize)]
pub struct ModifiedRow {
    pub key: Vec<ScalarValue>,
    pub changes: Vec<CellChange>,
}

/// Full comparison report
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub key_mode: KeyMode,
    pub schema: SchemaDiff,
    /// Rows examined across both snapshots (added + removed + modified + unchanged)
    pub rows_compared: u64,
    pub rows_added: u64,
    pub rows_removed: u64,
    pub rows_modified: u64,
    pub rows_unchanged: u64,
    /// Per-column count of rows whose value changed in that column
    pub column_change_counts: IndexMap<String, u64>,
    pub sample_added: Vec<RowSample>,
    pub sample_removed: Vec<RowSample>,
    pub sample_modified: Vec<ModifiedRow>,
}

impl DiffReport {
    pub fn has_changes(&self) -> bool {
        self.schema.has_changes()
            || self.rows_added > 0
            || self.rows_removed > 0
            || self.rows_modified > 0
    }
}

/// Deterministic structural comparison of two tables
pub struct DiffEngine {
    sample_limit: usize,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self {
            sample_limit: DIFF_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(sample_limit: usize) -> Self {
        Self { sample_limit }
    }

    /// Compare baseline against candidate with optional explicit key columns
    pub fn compare(
        &self,
        base: &Table,
        candidate: &Table,
        key_columns: Option<&[String]>,
    ) -> Result<DiffReport> {
        let schema = schema_diff(base, candidate);

        let common: Vec<String> = base
            .columns
            .iter()
            .filter(|c| candidate.column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect();

        if common.is_empty() {
            return Err(PermafrostError::comparison_impossible(
                "datasets share no columns and no usable key",
            ));
        }

        let key_mode = match key_columns {
            Some(keys) if !keys.is_empty() => {
                for key in keys {
                    if base.column(key).is_none() || candidate.column(key).is_none() {
                        return Err(PermafrostError::invalid_input(format!(
                            "Key column '{}' is not present in both datasets",
                            key
                        )));
                    }
                }
                KeyMode::Explicit(keys.to_vec())
            }
            _ => match detect_keys(base, candidate, &common) {
                Some(keys) => KeyMode::Detected(keys),
                None => KeyMode::Positional,
            },
        };

        match &key_mode {
            KeyMode::Positional => self.compare_positional(base, candidate, &common, schema),
            KeyMode::Explicit(keys) | KeyMode::Detected(keys) => {
                let keys = keys.clone();
                self.compare_keyed(base, candidate, &keys, &common, schema, key_mode.clone())
            }
        }
    }

    fn compare_keyed(
        &self,
        base: &Table,
        candidate: &Table,
        keys: &[String],
        common: &[String],
        schema: SchemaDiff,
        key_mode: KeyMode,
    ) -> Result<DiffReport> {
        let base_map = key_map(base, keys, "base")?;
        let cand_map = key_map(candidate, keys, "candidate")?;

        let value_pairs = column_pairs(base, candidate, common, keys);
        let mut column_change_counts: IndexMap<String, u64> = value_pairs
            .iter()
            .map(|(name, _, _)| (name.to_string(), 0))
            .collect();

        let mut union: BTreeSet<&Vec<ScalarValue>> = BTreeSet::new();
        union.extend(base_map.keys());
        union.extend(cand_map.keys());

        let mut rows_added = 0u64;
        let mut rows_removed = 0u64;
        let mut rows_modified = 0u64;
        let mut rows_unchanged = 0u64;
        let mut sample_added = Vec::new();
        let mut sample_removed = Vec::new();
        let mut sample_modified = Vec::new();

        for key in union {
            match (base_map.get(key), cand_map.get(key)) {
                (Some(&row), None) => {
                    rows_removed += 1;
                    if sample_removed.len() < self.sample_limit {
                        sample_removed.push(row_sample(base, row, key));
                    }
                }
                (None, Some(&row)) => {
                    rows_added += 1;
                    if sample_added.len() < self.sample_limit {
                        sample_added.push(row_sample(candidate, row, key));
                    }
                }
                (Some(&base_row), Some(&cand_row)) => {
                    let mut changes = Vec::new();
                    for (name, base_col, cand_col) in &value_pairs {
                        let old = &base_col.values[base_row];
                        let new = &cand_col.values[cand_row];
                        if !values_equal(old, new) {
                            if let Some(count) = column_change_counts.get_mut(*name) {
                                *count += 1;
                            }
                            changes.push(CellChange {
                                column: name.to_string(),
                                old: old.clone(),
                                new: new.clone(),
                            });
                        }
                    }

                    if changes.is_empty() {
                        rows_unchanged += 1;
                    } else {
                        rows_modified += 1;
                        if sample_modified.len() < self.sample_limit {
                            sample_modified.push(ModifiedRow {
                                key: key.clone(),
                                changes,
                            });
                        }
                    }
                }
                (None, None) => unreachable!("key came from one of the maps"),
            }
        }

        column_change_counts.retain(|_, count| *count > 0);

        Ok(DiffReport {
            key_mode,
            schema,
            rows_compared: rows_added + rows_removed + rows_modified + rows_unchanged,
            rows_added,
            rows_removed,
            rows_modified,
            rows_unchanged,
            column_change_counts,
            sample_added,
            sample_removed,
            sample_modified,
        })
    }

    fn compare_positional(
        &self,
        base: &Table,
        candidate: &Table,
        common: &[String],
        schema: SchemaDiff,
    ) -> Result<DiffReport> {
        let value_pairs = column_pairs(base, candidate, common, &[]);
        let mut column_change_counts: IndexMap<String, u64> = value_pairs
            .iter()
            .map(|(name, _, _)| (name.to_string(), 0))
            .collect();

        let paired = base.row_count().min(candidate.row_count());

        let mut rows_modified = 0u64;
        let mut rows_unchanged = 0u64;
        let mut sample_modified = Vec::new();

        for row in 0..paired {
            let key = vec![ScalarValue::Int(row as i64)];
            let mut changes = Vec::new();

            for (name, base_col, cand_col) in &value_pairs {
                let old = &base_col.values[row];
                let new = &cand_col.values[row];
                if !values_equal(old, new) {
                    if let Some(count) = column_change_counts.get_mut(*name) {
                        *count += 1;
                    }
                    changes.push(CellChange {
                        column: name.to_string(),
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
            }

            if changes.is_empty() {
                rows_unchanged += 1;
            } else {
                rows_modified += 1;
                if sample_modified.len() < self.sample_limit {
                    sample_modified.push(ModifiedRow { key, changes });
                }
            }
        }

        // Surplus rows on either side are genuine additions or removals
        let mut sample_removed = Vec::new();
        for row in paired..base.row_count() {
            if sample_removed.len() < self.sample_limit {
                let key = vec![ScalarValue::Int(row as i64)];
                sample_removed.push(row_sample(base, row, &key));
            }
        }

        let mut sample_added = Vec::new();
        for row in paired..candidate.row_count() {
            if sample_added.len() < self.sample_limit {
                let key = vec![ScalarValue::Int(row as i64)];
                sample_added.push(row_sample(candidate, row, &key));
            }
        }

        let rows_removed = (base.row_count() - paired) as u64;
        let rows_added = (candidate.row_count() - paired) as u64;

        column_change_counts.retain(|_, count| *count > 0);

        Ok(DiffReport {
            key_mode: KeyMode::Positional,
            schema,
            rows_compared: rows_added + rows_removed + rows_modified + rows_unchanged,
            rows_added,
            rows_removed,
            rows_modified,
            rows_unchanged,
            column_change_counts,
            sample_added,
            sample_removed,
            sample_modified,
        })
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Columns present in both tables with differing declared types, plus
/// columns exclusive to either side
fn schema_diff(base: &Table, candidate: &Table) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    for col in &base.columns {
        match candidate.column(&col.name) {
            None => diff.removed_columns.push(ColumnSchema {
                name: col.name.clone(),
                data_type: col.data_type.clone(),
            }),
            Some(other) if other.data_type != col.data_type => diff.type_changes.push(TypeChange {
                column: col.name.clone(),
                from: col.data_type.clone(),
                to: other.data_type.clone(),
            }),
            Some(_) => {}
        }
    }

    for col in &candidate.columns {
        if base.column(&col.name).is_none() {
            diff.added_columns.push(ColumnSchema {
                name: col.name.clone(),
                data_type: col.data_type.clone(),
            });
        }
    }

    diff
}

/// Common columns resolved in both tables, minus key columns
fn column_pairs<'t>(
    base: &'t Table,
    candidate: &'t Table,
    common: &'t [String],
    keys: &[String],
) -> Vec<(&'t str, &'t Column, &'t Column)> {
    common
        .iter()
        .filter(|name| !keys.contains(name))
        .filter_map(|name| match (base.column(name), candidate.column(name)) {
            (Some(b), Some(c)) => Some((name.as_str(), b, c)),
            _ => None,
        })
        .collect()
}

/// Build key tuple → row index; duplicate key tuples are an error
fn key_map(
    table: &Table,
    keys: &[String],
    label: &str,
) -> Result<BTreeMap<Vec<ScalarValue>, usize>> {
    let key_columns: Vec<&Column> = keys.iter().filter_map(|k| table.column(k)).collect();

    let mut map = BTreeMap::new();
    for row in 0..table.row_count() {
        let key: Vec<ScalarValue> = key_columns.iter().map(|c| c.values[row].clone()).collect();
        if map.insert(key.clone(), row).is_some() {
            return Err(PermafrostError::DuplicateKey {
                dataset: label.to_string(),
                columns: keys.join(", "),
                key: format_key(&key),
            });
        }
    }

    Ok(map)
}

fn format_key(key: &[ScalarValue]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

fn row_sample(table: &Table, row: usize, key: &[ScalarValue]) -> RowSample {
    let values = table
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.values[row].clone()))
        .collect();

    RowSample {
        key: key.to_vec(),
        values,
    }
}

/// Detect key columns: the first common column unique within both datasets,
/// then the first unique pair. The combination search is capped so wide
/// tables cannot blow up combinatorially.
fn detect_keys(base: &Table, candidate: &Table, common: &[String]) -> Option<Vec<String>> {
    if common.is_empty() {
        return None;
    }

    let single = common
        .par_iter()
        .find_first(|name| {
            is_unique_key(base, &[name.as_str()]) && is_unique_key(candidate, &[name.as_str()])
        });
    if let Some(name) = single {
        return Some(vec![name.clone()]);
    }

    if MAX_KEY_COMBINATION < 2 || common.len() < 2 {
        return None;
    }

    let mut pairs = Vec::new();
    for i in 0..common.len() {
        for j in (i + 1)..common.len() {
            pairs.push((i, j));
        }
    }

    pairs
        .par_iter()
        .find_first(|(i, j)| {
            let cols = [common[*i].as_str(), common[*j].as_str()];
            is_unique_key(base, &cols) && is_unique_key(candidate, &cols)
        })
        .map(|(i, j)| vec![common[*i].clone(), common[*j].clone()])
}

/// Whether the given columns form a duplicate-free key within one table
fn is_unique_key(table: &Table, cols: &[&str]) -> bool {
    let key_columns: Vec<&Column> = match cols
        .iter()
        .map(|c| table.column(c))
        .collect::<Option<Vec<_>>>()
    {
        Some(columns) => columns,
        None => return false,
    };

    let mut seen = BTreeSet::new();
    for row in 0..table.row_count() {
        let key: Vec<&ScalarValue> = key_columns.iter().map(|c| &c.values[row]).collect();
        if !seen.insert(key) {
            return false;
        }
    }

    true
}

/// Value equality for diff classification: exact for non-floats, within a
/// fixed relative/absolute tolerance when either side is floating
pub fn values_equal(a: &ScalarValue, b: &ScalarValue) -> bool {
    match (a, b) {
        (ScalarValue::Null, ScalarValue::Null) => true,
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => x == y,
        (ScalarValue::Int(x), ScalarValue::Int(y)) => x == y,
        (ScalarValue::Float(x), ScalarValue::Float(y)) => floats_equal(*x, *y),
        (ScalarValue::Int(x), ScalarValue::Float(y)) | (ScalarValue::Float(y), ScalarValue::Int(x)) => {
            floats_equal(*x as f64, *y)
        }
        (ScalarValue::Text(x), ScalarValue::Text(y)) => x == y,
        _ => false,
    }
}

fn floats_equal(a: f64, b: f64) -> bool {
    if a == b || (a.is_nan() && b.is_nan()) {
        return true;
    }
    let diff = (a - b).abs();
    diff <= FLOAT_ABS_TOLERANCE || diff <= FLOAT_REL_TOLERANCE * a.abs().max(b.abs())
}
