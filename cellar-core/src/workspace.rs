/*!
Scratch workspace for one backup or restore run.

The workspace directory is created lazily and reused for the rest of the run.
Files generated outside it (record files under the archive root) are marked for
cleanup separately. Dropping a [`Workspace`] releases everything, so an early
return or a panic halfway through a run leaves nothing behind.
*/

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::Result;

const DEFAULT_PREFIX: &str = "cellar-";

/// Lazily created scratch directory plus a list of extra paths to delete
#[derive(Debug)]
pub struct Workspace {
    prefix: String,
    dir: Option<TempDir>,
    marked: Vec<PathBuf>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    /// Workspace whose directory name starts with `prefix`
    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            dir: None,
            marked: Vec::new(),
        }
    }

    /// The scratch directory, created on first call and cached afterwards
    pub fn dir(&mut self) -> Result<&Path> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => {
                let dir = tempfile::Builder::new().prefix(&self.prefix).tempdir()?;
                tracing::debug!("Created workspace {}", dir.path().display());
                dir
            }
        };
        Ok(self.dir.insert(dir).path())
    }

    /// Whether the scratch directory currently exists
    pub fn is_created(&self) -> bool {
        self.dir.is_some()
    }

    /// Path of the scratch directory if it has been created
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Delete `path` (file or directory) when the workspace is cleaned up
    pub fn mark_for_cleanup<P: Into<PathBuf>>(&mut self, path: P) {
        self.marked.push(path.into());
    }

    /// Paths currently marked for deletion
    pub fn marked(&self) -> &[PathBuf] {
        &self.marked
    }

    /// Remove the scratch directory and every marked path, then reset.
    ///
    /// Safe to call repeatedly and when nothing was created. Every removal is
    /// attempted; the first failure is returned after the rest have run.
    pub fn cleanup(&mut self) -> Result<()> {
        let mut first_error: Option<io::Error> = None;

        if let Some(dir) = self.dir.take() {
            tracing::debug!("Removing workspace {}", dir.path().display());
            if let Err(e) = dir.close() {
                first_error.get_or_insert(e);
            }
        }

        // later marks may live inside earlier ones, so remove newest first
        for path in self.marked.drain(..).rev() {
            if let Err(e) = remove_path(&path) {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!("Workspace cleanup on drop failed: {}", e);
        }
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_is_created_once_and_cached() {
        let mut workspace = Workspace::new();
        assert!(!workspace.is_created());

        let first = workspace.dir().unwrap().to_path_buf();
        let second = workspace.dir().unwrap().to_path_buf();

        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cellar-"));
    }

    #[test]
    fn test_cleanup_removes_dir_and_marked_paths() {
        let outside = tempfile::TempDir::new().unwrap();
        let marked_file = outside.path().join("users.json");
        let marked_dir = outside.path().join("db");
        fs::write(&marked_file, b"[]").unwrap();
        fs::create_dir_all(marked_dir.join("backup")).unwrap();
        fs::write(marked_dir.join("backup/posts.json"), b"[]").unwrap();

        let mut workspace = Workspace::new();
        let dir = workspace.dir().unwrap().to_path_buf();
        fs::write(dir.join("scratch"), b"x").unwrap();
        workspace.mark_for_cleanup(&marked_dir);
        workspace.mark_for_cleanup(&marked_file);

        workspace.cleanup().unwrap();

        assert!(!dir.exists());
        assert!(!marked_file.exists());
        assert!(!marked_dir.exists());
        assert!(workspace.marked().is_empty());
        assert!(!workspace.is_created());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut workspace = Workspace::new();
        workspace.cleanup().unwrap();
        workspace.cleanup().unwrap();
        assert!(workspace.path().is_none());

        let dir = workspace.dir().unwrap().to_path_buf();
        workspace.cleanup().unwrap();
        workspace.cleanup().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_dir_after_cleanup_starts_fresh() {
        let mut workspace = Workspace::new();
        let first = workspace.dir().unwrap().to_path_buf();
        workspace.cleanup().unwrap();

        let second = workspace.dir().unwrap().to_path_buf();
        assert_ne!(first, second);
        assert!(second.is_dir());
    }

    #[test]
    fn test_missing_marked_path_is_ignored() {
        let outside = tempfile::TempDir::new().unwrap();
        let mut workspace = Workspace::new();
        workspace.mark_for_cleanup(outside.path().join("never-written.json"));
        assert!(workspace.cleanup().is_ok());
    }

    #[test]
    fn test_drop_releases_everything() {
        let outside = tempfile::TempDir::new().unwrap();
        let marked_file = outside.path().join("partial.json");
        fs::write(&marked_file, b"{").unwrap();

        let dir = {
            let mut workspace = Workspace::new();
            workspace.mark_for_cleanup(&marked_file);
            workspace.dir().unwrap().to_path_buf()
        };

        assert!(!dir.exists());
        assert!(!marked_file.exists());
    }
}
