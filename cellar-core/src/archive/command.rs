/*!
Archiver that runs the system `tar` binary.
*/

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::{ensure_archive_exists, prepare_destination, Archiver};
use crate::{CellarError, Result};

/// Runs `tar -czf` / `tar -xzf` / `tar -tzf` synchronously
#[derive(Debug, Clone)]
pub struct TarCommand {
    program: OsString,
}

impl TarCommand {
    /// Use `tar` from `PATH`
    pub fn new() -> Self {
        Self::with_program("tar")
    }

    /// Use a specific tar executable
    pub fn with_program<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        tracing::debug!("Running {:?}", command);
        command.output()
    }
}

impl Default for TarCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_partial(destination: &Path) {
    if let Err(e) = std::fs::remove_file(destination) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove partial archive {}: {}", destination.display(), e);
        }
    }
}

fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("tar exited with {}: {}", output.status, stderr.trim())
}

impl Archiver for TarCommand {
    fn name(&self) -> &str {
        "command"
    }

    fn create(&self, root: &Path, entries: &[PathBuf], destination: &Path) -> Result<PathBuf> {
        let destination = prepare_destination(destination)?;
        tracing::info!(
            "Creating archive {} with {} entries",
            destination.display(),
            entries.len()
        );

        let mut command = Command::new(&self.program);
        command.current_dir(root).arg("-czf").arg(&destination);
        if entries.is_empty() {
            // tar refuses an empty member list unless it reads names from somewhere
            command.arg("-T").arg(null_device());
        } else {
            command.arg("--").args(entries);
        }

        let output = self.run(&mut command).map_err(|e| {
            CellarError::archive_creation(format!(
                "Failed to run {}: {}",
                self.program.to_string_lossy(),
                e
            ))
        })?;
        if !output.status.success() {
            remove_partial(&destination);
            return Err(CellarError::archive_creation(describe_failure(&output)));
        }
        if !destination.is_file() {
            remove_partial(&destination);
            return Err(CellarError::archive_creation(format!(
                "{} was not created",
                destination.display()
            )));
        }
        Ok(destination)
    }

    fn extract(&self, archive: &Path, into: &Path) -> Result<()> {
        ensure_archive_exists(archive)?;
        let archive = archive.canonicalize()?;
        tracing::info!("Extracting {} into {}", archive.display(), into.display());

        let output = self
            .run(
                Command::new(&self.program)
                    .current_dir(into)
                    .arg("-xzf")
                    .arg(&archive),
            )
            .map_err(|e| CellarError::archive_extraction(e.to_string()))?;
        if !output.status.success() {
            return Err(CellarError::archive_extraction(describe_failure(&output)));
        }
        Ok(())
    }

    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        ensure_archive_exists(archive)?;
        let output = self
            .run(Command::new(&self.program).arg("-tzf").arg(archive))
            .map_err(|e| CellarError::archive_extraction(e.to_string()))?;
        if !output.status.success() {
            return Err(CellarError::archive_extraction(describe_failure(&output)));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

#[cfg(unix)]
fn null_device() -> &'static str {
    "/dev/null"
}

#[cfg(windows)]
fn null_device() -> &'static str {
    "NUL"
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::archive::NativeArchiver;
    use std::fs;
    use tempfile::TempDir;

    fn tar_available() -> bool {
        Command::new("tar")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_command_archive_is_readable_natively() {
        if !tar_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("db/backup")).unwrap();
        fs::write(root.path().join("db/backup/users.json"), b"{}").unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("out.tgz");

        TarCommand::new()
            .create(root.path(), &[PathBuf::from("db/backup")], &destination)
            .unwrap();

        let into = TempDir::new().unwrap();
        NativeArchiver::new().extract(&destination, into.path()).unwrap();
        assert!(into.path().join("db/backup/users.json").is_file());
    }

    #[test]
    fn test_command_extracts_native_archive() {
        if !tar_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("notes.txt"), b"hello").unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("out.tgz");
        NativeArchiver::new()
            .create(root.path(), &[PathBuf::from("notes.txt")], &destination)
            .unwrap();

        let into = TempDir::new().unwrap();
        let tar = TarCommand::new();
        tar.extract(&destination, into.path()).unwrap();

        assert_eq!(fs::read(into.path().join("notes.txt")).unwrap(), b"hello");
        assert_eq!(tar.members(&destination).unwrap(), vec![PathBuf::from("notes.txt")]);
    }

    #[test]
    fn test_missing_program_fails_creation() {
        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let result = TarCommand::with_program("definitely-not-a-tar-binary").create(
            root.path(),
            &[],
            &out.path().join("out.tgz"),
        );
        assert!(matches!(result, Err(CellarError::ArchiveCreationFailed(_))));
    }

    #[test]
    fn test_corrupt_archive_fails_extraction() {
        if !tar_available() {
            return;
        }
        let out = TempDir::new().unwrap();
        let bogus = out.path().join("bogus.tgz");
        fs::write(&bogus, b"garbage").unwrap();

        let result = TarCommand::new().extract(&bogus, out.path());
        assert!(matches!(result, Err(CellarError::ArchiveExtractionFailed(_))));
    }

    #[test]
    fn test_failed_creation_removes_partial_archive() {
        if !tar_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"present").unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("out.tgz");

        let result = TarCommand::new().create(
            root.path(),
            &[PathBuf::from("a.txt"), PathBuf::from("ghost")],
            &destination,
        );

        assert!(matches!(result, Err(CellarError::ArchiveCreationFailed(_))));
        assert!(!destination.exists());
    }

    #[test]
    fn test_dash_prefixed_entries_are_not_options() {
        if !tar_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("-v.txt"), b"dash").unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("out.tgz");

        let tar = TarCommand::new();
        tar.create(root.path(), &[PathBuf::from("-v.txt")], &destination)
            .unwrap();

        assert_eq!(
            NativeArchiver::new().members(&destination).unwrap(),
            vec![PathBuf::from("-v.txt")]
        );
    }
}
