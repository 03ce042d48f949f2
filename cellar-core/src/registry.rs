/*!
Registry of filesystem paths that go into the archive.

Every entry is stored relative to the archive root. Anything whose resolved location
falls outside the root is refused, since archiving it would let the archive reach
outside the tree it is meant to reproduce.
*/

use std::path::{Path, PathBuf};

use crate::{CellarError, Result};

/// Append-only list of root-relative archive entries
#[derive(Debug, Clone)]
pub struct PathRegistry {
    root: PathBuf,
    entries: Vec<PathBuf>,
}

impl PathRegistry {
    /// Create an empty registry for `root`, which must be an existing directory
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(CellarError::not_found(root));
        }
        if !root.is_dir() {
            return Err(CellarError::validation(format!(
                "Archive root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.canonicalize()?,
            entries: Vec::new(),
        })
    }

    /// Canonical absolute root all entries are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record `path` for archiving.
    ///
    /// Relative paths are resolved against the root. The path must exist
    /// (`NotFound`) and resolve to somewhere strictly below the root
    /// (`PathNotContained`); on either error the registry is left unchanged.
    /// Registering the same path twice stores it twice.
    pub fn register<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        if !candidate.exists() {
            return Err(CellarError::not_found(path));
        }

        let absolute = candidate.canonicalize()?;
        let relative = absolute
            .strip_prefix(&self.root)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| CellarError::PathNotContained {
                path: absolute.clone(),
                root: self.root.clone(),
            })?;

        tracing::debug!("Registered {} for archiving", relative.display());
        self.entries.push(relative);
        Ok(())
    }

    /// Entries in registration order
    pub fn registered(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn root_with_uploads() -> (TempDir, PathRegistry) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("uploads/avatars")).unwrap();
        fs::write(temp_dir.path().join("uploads/avatars/a.png"), b"png").unwrap();
        let registry = PathRegistry::new(temp_dir.path()).unwrap();
        (temp_dir, registry)
    }

    #[test]
    fn test_register_relative_path() {
        let (_temp_dir, mut registry) = root_with_uploads();
        registry.register("uploads").unwrap();
        assert_eq!(registry.registered(), &[PathBuf::from("uploads")]);
    }

    #[test]
    fn test_register_absolute_path_strips_root() {
        let (temp_dir, mut registry) = root_with_uploads();
        registry
            .register(temp_dir.path().join("uploads/avatars/a.png"))
            .unwrap();
        assert_eq!(
            registry.registered(),
            &[PathBuf::from("uploads/avatars/a.png")]
        );
    }

    #[test]
    fn test_duplicates_are_appended_again() {
        let (_temp_dir, mut registry) = root_with_uploads();
        registry.register("uploads").unwrap();
        registry.register("uploads").unwrap();
        registry.register("./uploads/../uploads").unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry
            .registered()
            .iter()
            .all(|entry| entry == Path::new("uploads")));
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let (_temp_dir, mut registry) = root_with_uploads();
        let result = registry.register("does/not/exist");
        assert!(matches!(result, Err(CellarError::NotFound { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_path_outside_root_is_rejected() {
        let (_temp_dir, mut registry) = root_with_uploads();
        let outside = TempDir::new().unwrap();

        let result = registry.register(outside.path());
        assert!(matches!(result, Err(CellarError::PathNotContained { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_temp_dir, mut registry) = root_with_uploads();
        registry.register("uploads").unwrap();

        // both temp dirs live in the same parent directory
        let sibling = TempDir::new().unwrap();
        let escape = Path::new("..").join(sibling.path().file_name().unwrap());
        let result = registry.register(&escape);

        assert!(matches!(result, Err(CellarError::PathNotContained { .. })));
        assert_eq!(registry.registered(), &[PathBuf::from("uploads")]);
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let parent = TempDir::new().unwrap();
        fs::create_dir_all(parent.path().join("app")).unwrap();
        fs::create_dir_all(parent.path().join("app2")).unwrap();
        let mut registry = PathRegistry::new(parent.path().join("app")).unwrap();

        let result = registry.register(parent.path().join("app2"));
        assert!(matches!(result, Err(CellarError::PathNotContained { .. })));
    }

    #[test]
    fn test_root_itself_is_rejected() {
        let (temp_dir, mut registry) = root_with_uploads();
        let result = registry.register(temp_dir.path());
        assert!(matches!(result, Err(CellarError::PathNotContained { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        let (temp_dir, mut registry) = root_with_uploads();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

        let result = registry.register("link");
        assert!(matches!(result, Err(CellarError::PathNotContained { .. })));
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = PathRegistry::new(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(CellarError::NotFound { .. })));
    }
}
