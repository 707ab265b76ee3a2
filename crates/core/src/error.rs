//! Error types for GreenAccess

use thiserror::Error;

/// Main error type for GreenAccess operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A raster value has no entry in the lookup table used to reclassify it.
    #[error(
        "The {column} column of the {table} is missing a row for value {value} \
         found in the {raster}"
    )]
    Mapping {
        raster: String,
        column: String,
        table: String,
        value: String,
    },

    #[error("Table error in {path}: {message}")]
    Table { path: String, message: String },

    #[error("Vector error: {0}")]
    Vector(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Vector(e.to_string())
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

/// Result type alias for GreenAccess operations
pub type Result<T> = std::result::Result<T, Error>;
