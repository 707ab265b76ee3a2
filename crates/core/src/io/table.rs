//! CSV attribute tables
//!
//! Header names are matched case-insensitively: every header is lowercased
//! and trimmed before rows are deserialized, so row types use lowercase
//! field names.

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Read every row of a CSV table into `T`.
pub fn read_table<T, P>(path: P) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let table_err = |message: String| Error::Table {
        path: path.display().to_string(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| table_err(e.to_string()))?;

    let headers: csv::StringRecord = reader
        .headers()
        .map_err(|e| table_err(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    reader.set_headers(headers.clone());

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| table_err(e.to_string()))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let row = record
            .deserialize(Some(&headers))
            .map_err(|e| table_err(format!("row {}: {}", line + 1, e)))?;
        rows.push(row);
    }
    debug!("read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
