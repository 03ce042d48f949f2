/*!
Archive adapters.

This module defines the archiving abstraction (port) and its implementations
(adapters): an in-process gzip tar writer and one that shells out to the system
`tar`. The engine only sees the [`Archiver`] trait, so tests can swap in a fake.
*/

pub mod command;
pub mod native;

use std::fs;
use std::path::{Path, PathBuf};

use crate::{CellarError, Result};

pub use command::TarCommand;
pub use native::NativeArchiver;

/// Creates and unpacks gzip-compressed tar archives
pub trait Archiver {
    /// Name of the implementation, used in log output
    fn name(&self) -> &str;

    /// Write an archive at `destination` containing exactly `entries`.
    ///
    /// # Arguments
    /// * `root` - Directory the entries are relative to
    /// * `entries` - Root-relative paths; directories are added recursively
    /// * `destination` - Archive file to write; relative paths resolve against the
    ///   current directory and missing parent directories are created
    ///
    /// # Returns
    /// The absolute path of the written archive
    ///
    /// # Errors
    /// * `CellarError::ArchiveCreationFailed` - If writing fails or no file appears
    fn create(&self, root: &Path, entries: &[PathBuf], destination: &Path) -> Result<PathBuf>;

    /// Unpack `archive` into the directory `into`, reproducing its relative tree.
    ///
    /// # Errors
    /// * `CellarError::NotFound` - If the archive does not exist
    /// * `CellarError::ArchiveExtractionFailed` - If it is unreadable, corrupt, or
    ///   holds entries that would land outside `into`
    fn extract(&self, archive: &Path, into: &Path) -> Result<()>;

    /// Member paths stored in `archive`, in archive order
    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>>;
}

impl<A: Archiver + ?Sized> Archiver for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create(&self, root: &Path, entries: &[PathBuf], destination: &Path) -> Result<PathBuf> {
        (**self).create(root, entries, destination)
    }

    fn extract(&self, archive: &Path, into: &Path) -> Result<()> {
        (**self).extract(archive, into)
    }

    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        (**self).members(archive)
    }
}

/// Absolute form of `destination` with its parent directory in place
pub(crate) fn prepare_destination(destination: &Path) -> Result<PathBuf> {
    let absolute = if destination.is_absolute() {
        destination.to_path_buf()
    } else {
        std::env::current_dir()?.join(destination)
    };
    if let Some(parent) = absolute.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                CellarError::archive_creation(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(absolute)
}

/// Fail with `NotFound` unless `archive` exists
pub(crate) fn ensure_archive_exists(archive: &Path) -> Result<()> {
    if archive.exists() {
        Ok(())
    } else {
        Err(CellarError::not_found(archive))
    }
}

/// Archiver that keeps archives in memory, for unit tests.
///
/// `create` copies the files under each entry into a map keyed by destination;
/// `extract` writes them back out.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryArchiver {
    archives: std::cell::RefCell<std::collections::HashMap<PathBuf, Vec<(PathBuf, Vec<u8>)>>>,
}

#[cfg(test)]
impl MemoryArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(root: &Path, relative: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) -> Result<()> {
        let absolute = root.join(relative);
        if absolute.is_dir() {
            let mut children = fs::read_dir(&absolute)?
                .map(|entry| entry.map(|e| e.file_name()))
                .collect::<std::io::Result<Vec<_>>>()?;
            children.sort();
            for child in children {
                Self::collect(root, &relative.join(child), out)?;
            }
        } else {
            out.push((relative.to_path_buf(), fs::read(&absolute)?));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Archiver for MemoryArchiver {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(&self, root: &Path, entries: &[PathBuf], destination: &Path) -> Result<PathBuf> {
        let mut files = Vec::new();
        for entry in entries {
            Self::collect(root, entry, &mut files)?;
        }
        self.archives
            .borrow_mut()
            .insert(destination.to_path_buf(), files);
        Ok(destination.to_path_buf())
    }

    fn extract(&self, archive: &Path, into: &Path) -> Result<()> {
        let archives = self.archives.borrow();
        let files = archives
            .get(archive)
            .ok_or_else(|| CellarError::not_found(archive))?;
        for (relative, contents) in files {
            let target = into.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }
        Ok(())
    }

    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        let archives = self.archives.borrow();
        let files = archives
            .get(archive)
            .ok_or_else(|| CellarError::not_found(archive))?;
        Ok(files.iter().map(|(path, _)| path.clone()).collect())
    }
}
