/*!
In-process archiver built on `tar` and `flate2`.
*/

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use super::{ensure_archive_exists, prepare_destination, Archiver};
use crate::{CellarError, Result};

/// Gzip tar archiver that needs no external tools
///
/// # Example
/// ```rust,no_run
/// use cellar_core::archive::{Archiver, NativeArchiver};
/// use std::path::{Path, PathBuf};
///
/// let archiver = NativeArchiver::new();
/// archiver.create(Path::new("/srv/app"), &[PathBuf::from("db/backup")], Path::new("out.tgz"))?;
/// # Ok::<(), cellar_core::CellarError>(())
/// ```
#[derive(Debug, Clone)]
pub struct NativeArchiver {
    compression_level: Compression,
}

impl NativeArchiver {
    /// Archiver with the default gzip level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Archiver with a gzip level from 0 (store) to 9 (smallest)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level),
        }
    }

    /// Fast compression (level 1)
    pub fn fast() -> Self {
        Self::with_level(1)
    }

    /// Maximum compression (level 9)
    pub fn max() -> Self {
        Self::with_level(9)
    }

    fn write_archive(&self, root: &Path, entries: &[PathBuf], destination: &Path) -> std::io::Result<()> {
        let file = File::create(destination)?;
        let encoder = GzEncoder::new(file, self.compression_level);
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        for entry in entries {
            let source = root.join(entry);
            if source.is_dir() {
                builder.append_dir_all(entry, &source)?;
            } else {
                builder.append_path_with_name(&source, entry)?;
            }
        }

        let encoder = builder.into_inner()?;
        encoder.finish()?;
        Ok(())
    }

    fn open(archive: &Path) -> Result<tar::Archive<GzDecoder<File>>> {
        ensure_archive_exists(archive)?;
        let file = File::open(archive).map_err(|e| {
            CellarError::archive_extraction(format!("Failed to open {}: {}", archive.display(), e))
        })?;
        Ok(tar::Archive::new(GzDecoder::new(file)))
    }
}

impl Default for NativeArchiver {
    fn default() -> Self {
        Self::new()
    }
}

fn escapes_destination(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

impl Archiver for NativeArchiver {
    fn name(&self) -> &str {
        "native"
    }

    fn create(&self, root: &Path, entries: &[PathBuf], destination: &Path) -> Result<PathBuf> {
        let destination = prepare_destination(destination)?;
        tracing::info!(
            "Creating archive {} with {} entries",
            destination.display(),
            entries.len()
        );

        if let Err(e) = self.write_archive(root, entries, &destination) {
            let _ = fs::remove_file(&destination);
            return Err(CellarError::archive_creation(format!(
                "Failed to write {}: {}",
                destination.display(),
                e
            )));
        }

        if !destination.is_file() {
            return Err(CellarError::archive_creation(format!(
                "{} was not created",
                destination.display()
            )));
        }
        Ok(destination)
    }

    fn extract(&self, archive: &Path, into: &Path) -> Result<()> {
        tracing::info!("Extracting {} into {}", archive.display(), into.display());
        let mut reader = Self::open(archive)?;
        let fail = |e: std::io::Error| {
            CellarError::archive_extraction(format!("{}: {}", archive.display(), e))
        };

        for entry in reader.entries().map_err(fail)? {
            let mut entry = entry.map_err(fail)?;
            let path = entry.path().map_err(fail)?.into_owned();
            if escapes_destination(&path) {
                return Err(CellarError::archive_extraction(format!(
                    "Entry {} would be written outside {}",
                    path.display(),
                    into.display()
                )));
            }
            if !entry.unpack_in(into).map_err(fail)? {
                return Err(CellarError::archive_extraction(format!(
                    "Entry {} was refused during unpacking",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        let mut reader = Self::open(archive)?;
        let fail = |e: std::io::Error| {
            CellarError::archive_extraction(format!("{}: {}", archive.display(), e))
        };

        let mut members = Vec::new();
        for entry in reader.entries().map_err(fail)? {
            let entry = entry.map_err(fail)?;
            members.push(entry.path().map_err(fail)?.into_owned());
        }
        Ok(members)
    }
}
