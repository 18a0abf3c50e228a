//! Line-delimited JSON readers and writers.
//!
//! One record per line. Readers report the offending line number on parse
//! failure; writers create parent directories and emit one line per record,
//! so a partially written file is still valid line-by-line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::DataError;

/// Reads every record from a JSONL file.
///
/// Blank lines are skipped. Parse failures surface as
/// [`DataError::MalformedJsonl`] with the file path and 1-based line number.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, DataError> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| DataError::MalformedJsonl {
            path: path.display().to_string(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }

    debug!(path = %path.display(), count = records.len(), "loaded JSONL records");
    Ok(records)
}

/// Writes records to a JSONL file, one per line, creating parent directories.
pub fn write_jsonl<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<(), DataError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    debug!(path = %path.display(), count = records.len(), "wrote JSONL records");
    Ok(())
}
