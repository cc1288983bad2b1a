use crate::sink::warehouse::WarehouseError;
use std::path::PathBuf;
use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The Error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidationError(String),

    #[error("Credentials error: {0}")]
    CredentialsError(String),

    #[error("Input error: {0}")]
    InputError(String),

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Parquet reading error: {source}")]
    ParquetError {
        #[from]
        source: parquet::errors::ParquetError,
    },

    #[error("Arrow conversion error: {source}")]
    ArrowError {
        #[from]
        source: arrow::error::ArrowError,
    },

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("HTTP error: {source}")]
    HttpError {
        #[from]
        source: reqwest::Error,
    },

    #[error("Annotation of document '{document_id}' failed: {reason}")]
    AnnotationError { document_id: String, reason: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Warehouse error: {source}")]
    Warehouse {
        #[from]
        source: WarehouseError,
    },

    // The staging file is left on disk so the batch can be retried by hand.
    #[error("Load into '{table}' failed (staging file kept at '{}'): {source}", staging_path.display())]
    LoadFailed {
        table: String,
        staging_path: PathBuf,
        source: Box<PipelineError>,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
