/*!
# Cellar Core Engine

Database snapshot archives: export an application's tables together with selected
files into one gzip tar archive, and load such an archive back into a database.

This crate provides:

- Record files: one JSON document per table with typed values and an integrity hash
- A path registry that only accepts entries inside the archive root
- Pluggable database and archiver adapters (SQLite, in-process tar, system `tar`)
- A scratch workspace that is always cleaned up, even when a run fails
- Per-table transactional restore

## Architecture

The core follows hexagonal architecture principles:
- The backup and restore logic only sees the [`Database`] and [`Archiver`] traits
- SQLite access and archive formats are implemented as adapters
- Each run owns its own [`Session`], so no state is shared between runs

## Usage

```rust,no_run
use cellar_core::{BackupEngine, CellarConfig, NativeArchiver, SqliteDatabase};
use std::path::{Path, PathBuf};

let engine = BackupEngine::new(CellarConfig::new("/srv/app"), NativeArchiver::new());
let mut db = SqliteDatabase::open("/srv/app/db/production.sqlite3")?;

// Back up every table plus the uploads directory
let report = engine.backup(&mut db, Path::new("backup.tgz"), &[PathBuf::from("uploads")])?;

// Load it back
engine.restore(&mut db, &report.archive)?;
# Ok::<(), cellar_core::CellarError>(())
```
*/

pub mod archive;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod export;
pub mod observability;
pub mod record_file;
pub mod registry;
pub mod restore;
pub mod tables;
pub mod value;
pub mod workspace;

#[cfg(test)]
mod error_tests;

pub use archive::{Archiver, NativeArchiver, TarCommand};
pub use config::{ArchiverKind, CellarConfig, DatabaseConfig};
pub use database::{with_transaction, Database};
#[cfg(feature = "sqlite")]
pub use database::SqliteDatabase;
pub use engine::{
    create_engine_from_config, BackupEngine, BackupReport, EngineInterface, RestoreReport,
    Session,
};
pub use error::{CellarError, Result};
pub use export::{ExportSummary, Exporter};
pub use record_file::{RecordFile, RecordFileMetadata};
pub use registry::PathRegistry;
pub use restore::{Importer, RestoreSummary};
pub use tables::{TableSelector, DEFAULT_EXCLUDED_TABLES};
pub use value::{normalize_temporal, DriverDateTime, Record, Value};
pub use workspace::Workspace;
