//! Configuration for backup and restore runs
//!
//! This module provides the run configuration (archive root, record directory,
//! table exclusions, archiver selection) and parsing of database locations.
//! Values can be seeded from the environment with [`CellarConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::tables::DEFAULT_EXCLUDED_TABLES;
use crate::{CellarError, Result};

/// Default record directory inside the archive root
pub const DEFAULT_RECORD_DIR: &str = "db/backup";

/// Environment variable enabling verbose output (name matched case-insensitively)
pub const VERBOSE_ENV: &str = "VERBOSE";
pub const ROOT_ENV: &str = "CELLAR_ROOT";
pub const DATABASE_URL_ENV: &str = "CELLAR_DATABASE_URL";
pub const ARCHIVER_ENV: &str = "CELLAR_ARCHIVER";

/// Which archiver implementation builds and unpacks archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiverKind {
    /// In-process `tar` + `flate2`
    #[default]
    Native,
    /// The system `tar` binary
    Command,
}

impl std::str::FromStr for ArchiverKind {
    type Err = CellarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "command" | "tar" => Ok(Self::Command),
            other => Err(CellarError::validation(format!(
                "Unknown archiver '{other}' (expected 'native' or 'command')"
            ))),
        }
    }
}

/// Settings for one backup or restore run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellarConfig {
    /// Directory every archived path is relative to
    pub root: PathBuf,
    /// Where record files live, relative to the root
    pub record_dir: PathBuf,
    /// Tables never exported or restored
    pub excluded_tables: Vec<String>,
    /// Archiver implementation
    pub archiver: ArchiverKind,
    /// Gzip level for the native archiver (0-9)
    pub compression_level: u32,
    /// Emit diagnostic output
    pub verbose: bool,
}

impl CellarConfig {
    /// Configuration with defaults for everything but the root
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            record_dir: PathBuf::from(DEFAULT_RECORD_DIR),
            excluded_tables: DEFAULT_EXCLUDED_TABLES.iter().map(|t| t.to_string()).collect(),
            archiver: ArchiverKind::Native,
            compression_level: 6,
            verbose: false,
        }
    }

    /// Defaults overridden by `CELLAR_ROOT`, `CELLAR_ARCHIVER` and `VERBOSE`.
    ///
    /// The root falls back to the current directory.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env_vars())
    }

    fn from_vars<I: IntoIterator<Item = (String, String)>>(vars: I) -> Result<Self> {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let lookup = |name: &str| {
            vars.iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        let root = match lookup(ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?,
        };
        let mut config = Self::new(root);
        if let Some(archiver) = lookup(ARCHIVER_ENV) {
            config.archiver = archiver.parse()?;
        }
        config.verbose = verbose_from_vars(vars.iter().cloned());
        Ok(config)
    }

    pub fn with_excluded_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_archiver(mut self, archiver: ArchiverKind) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_record_dir<P: Into<PathBuf>>(mut self, record_dir: P) -> Self {
        self.record_dir = record_dir.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(CellarError::validation(format!(
                "Root {} is not an existing directory",
                self.root.display()
            )));
        }
        if self.record_dir.as_os_str().is_empty()
            || self.record_dir.is_absolute()
            || self
                .record_dir
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CellarError::validation(format!(
                "Record directory {} must be a relative path inside the root",
                self.record_dir.display()
            )));
        }
        if self.compression_level > 9 {
            return Err(CellarError::validation(format!(
                "Compression level {} is out of range 0-9",
                self.compression_level
            )));
        }
        Ok(())
    }
}

/// Read the verbose flag from the environment.
///
/// Any variable whose name equals `VERBOSE` ignoring case counts; its value is
/// truthy unless empty, `0`, `false`, `no` or `off`.
pub fn verbose_from_env() -> bool {
    verbose_from_vars(env_vars())
}

fn env_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(key, value)| {
        Some((key.into_string().ok()?, value.into_string().ok()?))
    })
}

fn verbose_from_vars<I: IntoIterator<Item = (String, String)>>(vars: I) -> bool {
    vars.into_iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(VERBOSE_ENV))
        .any(|(_, value)| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Supported database engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseConfig {
    /// SQLite database file
    SqliteFile(PathBuf),
    /// Private in-memory SQLite database
    SqliteMemory,
}

impl DatabaseConfig {
    /// Parse a database location
    ///
    /// Supports formats:
    /// - `sqlite://path/to/db.sqlite3` (relative) or `sqlite:///abs/path.db`
    /// - `sqlite::memory:`
    /// - a bare path ending in `.sqlite`, `.sqlite3` or `.db`
    pub fn from_uri(uri: &str) -> Result<Self> {
        if uri == "sqlite::memory:" || uri == "sqlite://:memory:" {
            return Ok(Self::SqliteMemory);
        }
        if let Some(path) = uri.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(CellarError::validation("Invalid SQLite URI: missing path"));
            }
            return Ok(Self::SqliteFile(PathBuf::from(path)));
        }
        if uri.contains("://") {
            let scheme = uri.split("://").next().unwrap_or_default();
            return Err(CellarError::validation(format!(
                "Unsupported database scheme '{scheme}'"
            )));
        }

        let path = Path::new(uri);
        match path.extension().and_then(|e| e.to_str()) {
            Some("sqlite" | "sqlite3" | "db") => Ok(Self::SqliteFile(path.to_path_buf())),
            _ => Err(CellarError::validation(format!(
                "Cannot determine database type of '{uri}'"
            ))),
        }
    }

    /// Open a connection for this configuration
    #[cfg(feature = "sqlite")]
    pub fn open(&self) -> Result<crate::database::SqliteDatabase> {
        match self {
            Self::SqliteFile(path) => crate::database::SqliteDatabase::open(path),
            Self::SqliteMemory => crate::database::SqliteDatabase::open_in_memory(),
        }
    }
}
