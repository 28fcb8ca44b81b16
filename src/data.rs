//! Tabular snapshot loading via DuckDB
//!
//! Restored snapshots are ingested through a DuckDB view so every supported
//! format (CSV, Parquet, JSON, JSONL, TSV) lands in the same in-memory shape:
//! an ordered list of named, typed columns of scalar values.

use crate::error::{PermafrostError, Result};
use duckdb::Connection;
use serde::ser::Serializer;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// A single typed cell value
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    fn rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Bool(_) => 1,
            ScalarValue::Int(_) => 2,
            ScalarValue::Float(_) => 3,
            ScalarValue::Text(_) => 4,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, ""),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Float(x) => write!(f, "{}", x),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// Exact identity (bit-level for floats) with a total order, so scalars can
// serve as map keys and key tuples sort deterministically. Tolerant value
// comparison lives in the diff engine, not here.
impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a.cmp(b),
            (ScalarValue::Int(a), ScalarValue::Int(b)) => a.cmp(b),
            (ScalarValue::Float(a), ScalarValue::Float(b)) => a.total_cmp(b),
            (ScalarValue::Text(a), ScalarValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
            ScalarValue::Int(i) => serializer.serialize_i64(*i),
            ScalarValue::Float(x) => serializer.serialize_f64(*x),
            ScalarValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// A named column with its declared type and values
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub values: Vec<ScalarValue>,
}

/// An in-memory tabular snapshot
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Loads files into in-memory tables through DuckDB
pub struct DataProcessor {
    connection: Connection,
}

impl DataProcessor {
    pub fn new() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute("SET enable_progress_bar=false", [])?;

        Ok(Self { connection })
    }

    /// Load a file into a typed in-memory table
    pub fn load_table(&self, file_path: &Path) -> Result<Table> {
        if !file_path.exists() {
            return Err(PermafrostError::invalid_input(format!(
                "File not found: {}",
                file_path.display()
            )));
        }

        let path_str = file_path.to_string_lossy().replace('\'', "''");
        let create_view_sql = format!(
            "CREATE OR REPLACE VIEW data_view AS SELECT * FROM '{}'",
            path_str
        );

        self.connection
            .execute(&create_view_sql, [])
            .map_err(|e| self.convert_duckdb_error(e, file_path))?;

        let mut columns = self.describe_columns()?;
        if columns.is_empty() {
            return Ok(Table { columns });
        }

        let mut stmt = self
            .connection
            .prepare("SELECT * FROM data_view")
            .map_err(|e| {
                PermafrostError::data_processing(format!("Failed to prepare data query: {}", e))
            })?;

        let mut rows = stmt.query([]).map_err(|e| {
            PermafrostError::data_processing(format!("Failed to read data rows: {}", e))
        })?;

        while let Some(row) = rows.next().map_err(|e| {
            PermafrostError::data_processing(format!("Failed to advance data row: {}", e))
        })? {
            for (i, column) in columns.iter_mut().enumerate() {
                let value = row.get_ref(i).map_err(|e| {
                    PermafrostError::data_processing(format!(
                        "Failed to read column '{}': {}",
                        column.name, e
                    ))
                })?;
                column.values.push(scalar_from_ref(value));
            }
        }

        Ok(Table { columns })
    }

    /// Column names and declared types, in file order
    fn describe_columns(&self) -> Result<Vec<Column>> {
        let mut stmt = self.connection.prepare("DESCRIBE data_view").map_err(|e| {
            PermafrostError::data_processing(format!("Failed to prepare describe query: {}", e))
        })?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Column {
                    name: row.get::<_, String>(0)?,
                    data_type: row.get::<_, String>(1)?,
                    values: Vec::new(),
                })
            })
            .map_err(|e| {
                PermafrostError::data_processing(format!("Failed to query column info: {}", e))
            })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(|e| {
                PermafrostError::data_processing(format!("Failed to process column info: {}", e))
            })?);
        }

        Ok(columns)
    }

    /// Convert DuckDB errors to friendlier input errors where possible
    fn convert_duckdb_error(&self, error: duckdb::Error, file_path: &Path) -> PermafrostError {
        let error_msg = error.to_string();

        if error_msg.contains("CSV Error")
            || error_msg.contains("Could not convert")
            || error_msg.contains("Invalid CSV")
            || error_msg.contains("Unterminated quoted field")
        {
            PermafrostError::invalid_input(format!(
                "Malformed CSV file '{}': {}",
                file_path.display(),
                error_msg
            ))
        } else if error_msg.contains("JSON") || error_msg.contains("Malformed JSON") {
            PermafrostError::invalid_input(format!(
                "Malformed JSON file '{}': {}",
                file_path.display(),
                error_msg
            ))
        } else if error_msg.contains("No files found") || error_msg.contains("does not exist") {
            PermafrostError::invalid_input(format!("File not found: {}", file_path.display()))
        } else if error_msg.contains("UTF-8") || error_msg.contains("encoding") {
            PermafrostError::invalid_input(format!(
                "File encoding error '{}': {}",
                file_path.display(),
                error_msg
            ))
        } else {
            PermafrostError::DuckDb(error)
        }
    }

    /// Check if file format is supported
    pub fn is_supported_format(file_path: &Path) -> bool {
        if let Some(extension) = file_path.extension().and_then(|s| s.to_str()) {
            matches!(
                extension.to_lowercase().as_str(),
                "csv" | "parquet" | "json" | "jsonl" | "tsv"
            )
        } else {
            false
        }
    }
}

/// Map a DuckDB value to a typed scalar
fn scalar_from_ref(value: duckdb::types::ValueRef<'_>) -> ScalarValue {
    use duckdb::types::ValueRef;

    match value {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Boolean(b) => ScalarValue::Bool(b),
        ValueRef::TinyInt(i) => ScalarValue::Int(i as i64),
        ValueRef::SmallInt(i) => ScalarValue::Int(i as i64),
        ValueRef::Int(i) => ScalarValue::Int(i as i64),
        ValueRef::BigInt(i) => ScalarValue::Int(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => ScalarValue::Int(v),
            Err(_) => ScalarValue::Text(i.to_string()),
        },
        ValueRef::UTinyInt(i) => ScalarValue::Int(i as i64),
        ValueRef::USmallInt(i) => ScalarValue::Int(i as i64),
        ValueRef::UInt(i) => ScalarValue::Int(i as i64),
        ValueRef::UBigInt(i) => match i64::try_from(i) {
            Ok(v) => ScalarValue::Int(v),
            Err(_) => ScalarValue::Text(i.to_string()),
        },
        ValueRef::Float(f) => ScalarValue::Float(f as f64),
        ValueRef::Double(f) => ScalarValue::Float(f),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) => ScalarValue::Float(f),
                Err(_) => ScalarValue::Text(text),
            }
        }
        ValueRef::Text(s) => ScalarValue::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => ScalarValue::Text(format!("<blob:{} bytes>", b.len())),
        ValueRef::Date32(d) => ScalarValue::Text(format!("{:?}", d)),
        ValueRef::Time64(t, _) => ScalarValue::Text(format!("{:?}", t)),
        ValueRef::Timestamp(ts, _) => ScalarValue::Text(format!("{:?}", ts)),
        _ => ScalarValue::Text("<unknown>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_supported_formats() {
        assert!(DataProcessor::is_supported_format(Path::new("test.csv")));
        assert!(DataProcessor::is_supported_format(Path::new("test.parquet")));
        assert!(DataProcessor::is_supported_format(Path::new("test.json")));
        assert!(!DataProcessor::is_supported_format(Path::new("test.txt")));
        assert!(!DataProcessor::is_supported_format(Path::new("test")));
    }

    #[test]
    fn test_csv_loads_typed_columns() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("people.csv");
        fs::write(&csv_path, "name,age,score\nAlice,30,1.5\nBob,25,2.5\n").unwrap();

        let processor = DataProcessor::new().unwrap();
        let table = processor.load_table(&csv_path).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["name", "age", "score"]);

        let age = table.column("age").unwrap();
        assert_eq!(age.values[0], ScalarValue::Int(30));

        let name = table.column("name").unwrap();
        assert_eq!(name.values[1], ScalarValue::Text("Bob".to_string()));

        let score = table.column("score").unwrap();
        assert!(matches!(score.values[0], ScalarValue::Float(_)));
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let processor = DataProcessor::new().unwrap();
        assert!(matches!(
            processor.load_table(Path::new("/no/such/file.csv")),
            Err(PermafrostError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_scalar_ordering_is_total() {
        let mut values = vec![
            ScalarValue::Text("b".to_string()),
            ScalarValue::Int(2),
            ScalarValue::Null,
            ScalarValue::Float(1.5),
            ScalarValue::Int(1),
        ];
        values.sort();

        assert_eq!(values[0], ScalarValue::Null);
        assert_eq!(values[1], ScalarValue::Int(1));
        assert_eq!(values[2], ScalarValue::Int(2));
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(ScalarValue::Null.to_string(), "");
        assert_eq!(ScalarValue::Int(7).to_string(), "7");
        assert_eq!(ScalarValue::Text("x".to_string()).to_string(), "x");
    }
}
