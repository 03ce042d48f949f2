/*!
Record file format: one table's rows plus metadata for integrity verification.
*/

use crate::{CellarError, Record, Result, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Current record file format version for compatibility tracking
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// File extension used for record files
pub const RECORD_FILE_EXTENSION: &str = "json";

/// Metadata stored at the head of every record file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordFileMetadata {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Table the rows were read from
    pub table: String,

    /// When the export ran
    pub exported_at: DateTime<Utc>,

    /// Number of rows in the file
    pub row_count: usize,

    /// SHA-256 hash of the rows array exactly as stored
    pub content_hash: String,
}

impl RecordFileMetadata {
    /// Compute SHA-256 hash of the provided data as lowercase hex
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Check if this metadata is compatible with the current format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= RECORD_FORMAT_VERSION
    }
}

/// A table's full row set as written to disk
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordFile {
    pub metadata: RecordFileMetadata,
    pub rows: Vec<Record>,
}

/// On-disk layout: the rows array is kept as the exact bytes that were hashed
#[derive(Serialize)]
struct StoredRef<'a> {
    metadata: &'a RecordFileMetadata,
    rows: &'a RawValue,
}

#[derive(Deserialize)]
struct Stored {
    metadata: RecordFileMetadata,
    rows: Box<RawValue>,
}

impl RecordFile {
    /// Wrap rows for `table`, computing the content hash.
    ///
    /// Fails with `SerializationFailed` when a row holds a value that cannot be
    /// encoded (an unnormalized driver temporal, or a non-finite real).
    pub fn new<S: Into<String>>(table: S, rows: Vec<Record>) -> Result<Self> {
        let table = table.into();
        for (position, row) in rows.iter().enumerate() {
            if row.values().any(Value::is_driver_temporal) {
                return Err(CellarError::serialization(
                    &table,
                    format!("row {} holds an unnormalized date/time", position + 1),
                ));
            }
            // serde_json writes NaN and infinities as null, which would not read back as reals
            if row
                .values()
                .any(|value| matches!(value, Value::Real(r) if !r.is_finite()))
            {
                return Err(CellarError::serialization(
                    &table,
                    format!("row {} holds a non-finite real", position + 1),
                ));
            }
        }
        let encoded = encode_rows(&table, &rows)?;

        Ok(Self {
            metadata: RecordFileMetadata {
                format_version: RECORD_FORMAT_VERSION,
                table,
                exported_at: Utc::now(),
                row_count: rows.len(),
                content_hash: RecordFileMetadata::compute_hash(encoded.as_bytes()),
            },
            rows,
        })
    }

    /// Location of a table's record file inside `dir`.
    ///
    /// The table name must be usable as a single file name; names that are empty,
    /// contain a separator, or are `.`/`..` are `SerializationFailed`.
    pub fn path_for(dir: &Path, table: &str) -> Result<PathBuf> {
        let mut components = Path::new(table).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if name == table
        );
        if !single_normal {
            return Err(CellarError::serialization(
                table,
                "table name cannot be used as a record file name",
            ));
        }
        Ok(dir.join(format!("{table}.{RECORD_FILE_EXTENSION}")))
    }

    /// Serialize to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let rows = RawValue::from_string(encode_rows(&self.metadata.table, &self.rows)?)?;
        let stored = StoredRef {
            metadata: &self.metadata,
            rows: &rows,
        };
        let encoded = serde_json::to_vec_pretty(&stored)
            .map_err(|e| CellarError::serialization(&self.metadata.table, e.to_string()))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Read from `path`, checking format version, content hash and row count.
    ///
    /// The hash is checked against the stored bytes of the rows array, before
    /// any value is decoded.
    pub fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CellarError::not_found(path));
        }
        let data = fs::read(path)?;
        let stored: Stored = serde_json::from_slice(&data)?;
        check_version(&stored.metadata)?;
        check_hash(&stored.metadata, stored.rows.get().as_bytes())?;

        let file = RecordFile {
            rows: serde_json::from_str(stored.rows.get())?,
            metadata: stored.metadata,
        };
        check_row_count(&file)?;
        Ok(file)
    }

    /// Verify format compatibility and that in-memory rows still match the recorded hash
    pub fn verify(&self) -> Result<()> {
        check_version(&self.metadata)?;
        check_row_count(self)?;
        let encoded = encode_rows(&self.metadata.table, &self.rows)?;
        check_hash(&self.metadata, encoded.as_bytes())
    }
}

fn encode_rows(table: &str, rows: &[Record]) -> Result<String> {
    serde_json::to_string(rows).map_err(|e| CellarError::serialization(table, e.to_string()))
}

fn check_version(metadata: &RecordFileMetadata) -> Result<()> {
    if metadata.is_compatible() {
        return Ok(());
    }
    Err(CellarError::invalid_format(format!(
        "Incompatible record file version: {} (current: {})",
        metadata.format_version, RECORD_FORMAT_VERSION
    )))
}

fn check_row_count(file: &RecordFile) -> Result<()> {
    if file.metadata.row_count == file.rows.len() {
        return Ok(());
    }
    Err(CellarError::invalid_format(format!(
        "Record file for '{}' declares {} rows but holds {}",
        file.metadata.table,
        file.metadata.row_count,
        file.rows.len()
    )))
}

fn check_hash(metadata: &RecordFileMetadata, rows: &[u8]) -> Result<()> {
    let actual = RecordFileMetadata::compute_hash(rows);
    if actual != metadata.content_hash {
        return Err(CellarError::IntegrityCheckFailed {
            expected: metadata.content_hash.clone(),
            actual,
        });
    }
    Ok(())
}
