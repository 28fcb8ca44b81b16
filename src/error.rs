//! Error types for permafrost operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PermafrostError>;

#[derive(Error, Debug)]
pub enum PermafrostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Not found: {spec}")]
    NotFound { spec: String },

    #[error("Ambiguous spec '{spec}', matches: {}", .candidates.join(", "))]
    Ambiguous {
        spec: String,
        candidates: Vec<String>,
    },

    #[error("Duplicate key {key} in {dataset} dataset (key columns: {columns})")]
    DuplicateKey {
        dataset: String,
        columns: String,
        key: String,
    },

    #[error("Comparison impossible: {message}")]
    ComparisonImpossible { message: String },

    #[error("Storage corruption: {message}")]
    StorageCorruption { message: String },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Data processing error: {message}")]
    DataProcessing { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl PermafrostError {
    pub fn not_found(spec: impl Into<String>) -> Self {
        Self::NotFound { spec: spec.into() }
    }

    pub fn ambiguous(spec: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::Ambiguous {
            spec: spec.into(),
            candidates,
        }
    }

    pub fn comparison_impossible(msg: impl Into<String>) -> Self {
        Self::ComparisonImpossible {
            message: msg.into(),
        }
    }

    pub fn storage_corruption(msg: impl Into<String>) -> Self {
        Self::StorageCorruption {
            message: msg.into(),
        }
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn data_processing(msg: impl Into<String>) -> Self {
        Self::DataProcessing {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }
}
