/*!
Backup engine that orchestrates the backup and restore runs.

A run wires the pieces together: table selection, the exporter, the path registry,
an archiver and the restore importer. Every run owns a fresh [`Session`], so nothing
registered or generated by one run is visible to the next, and the session's
workspace is cleaned up whether the run succeeds or not.
*/

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{
    archive::{Archiver, NativeArchiver, TarCommand},
    config::{ArchiverKind, CellarConfig},
    database::Database,
    export::{ExportSummary, Exporter},
    registry::PathRegistry,
    restore::{Importer, RestoreSummary},
    tables::TableSelector,
    workspace::Workspace,
    Result,
};

/// Per-run state: the scratch workspace and the archive entry registry
#[derive(Debug)]
pub struct Session {
    pub workspace: Workspace,
    pub registry: PathRegistry,
}

impl Session {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Ok(Self {
            workspace: Workspace::new(),
            registry: PathRegistry::new(root)?,
        })
    }

    /// Release everything the run created
    pub fn finish(mut self) -> Result<()> {
        self.workspace.cleanup()
    }
}

/// Outcome of a successful backup
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub run_id: Uuid,
    /// Absolute path of the written archive
    pub archive: PathBuf,
    pub export: ExportSummary,
    /// Root-relative entries stored in the archive
    pub entries: Vec<PathBuf>,
}

/// Outcome of a successful restore
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub restore: RestoreSummary,
}

/// Main engine for backup and restore runs
///
/// # Example
/// ```rust,no_run
/// use cellar_core::{BackupEngine, CellarConfig, NativeArchiver, SqliteDatabase};
/// use std::path::{Path, PathBuf};
///
/// let engine = BackupEngine::new(CellarConfig::new("/srv/app"), NativeArchiver::new());
/// let mut db = SqliteDatabase::open("/srv/app/db/production.sqlite3")?;
///
/// let report = engine.backup(&mut db, Path::new("backup.tgz"), &[PathBuf::from("uploads")])?;
/// println!("wrote {}", report.archive.display());
///
/// engine.restore(&mut db, &report.archive)?;
/// # Ok::<(), cellar_core::CellarError>(())
/// ```
pub struct BackupEngine<A: Archiver> {
    config: CellarConfig,
    archiver: A,
    selector: TableSelector,
}

impl<A: Archiver> BackupEngine<A> {
    pub fn new(config: CellarConfig, archiver: A) -> Self {
        let selector = TableSelector::new(config.excluded_tables.iter().cloned());
        Self {
            config,
            archiver,
            selector,
        }
    }

    pub fn config(&self) -> &CellarConfig {
        &self.config
    }

    pub fn archiver(&self) -> &A {
        &self.archiver
    }

    /// Export every selected table, add `extra_paths`, and write the archive.
    ///
    /// The record files written under the root are removed again before this
    /// returns, also when a step fails.
    ///
    /// # Errors
    /// * `CellarError::NotFound` / `PathNotContained` - If an extra path is missing
    ///   or lies outside the root
    /// * `CellarError::SerializationFailed` - If a table holds an unrepresentable value
    /// * `CellarError::ArchiveCreationFailed` - If the archive cannot be written
    pub fn backup<D: Database + ?Sized>(
        &self,
        db: &mut D,
        destination: &Path,
        extra_paths: &[PathBuf],
    ) -> Result<BackupReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("backup", %run_id);
        let _enter = span.enter();

        self.config.validate()?;
        let mut session = Session::new(&self.config.root)?;
        let result = self.run_backup(run_id, db, &mut session, destination, extra_paths);
        let cleanup = session.finish();

        let report = result?;
        cleanup?;
        tracing::info!(
            "Backup {} written with {} entries",
            report.archive.display(),
            report.entries.len()
        );
        Ok(report)
    }

    fn run_backup<D: Database + ?Sized>(
        &self,
        run_id: Uuid,
        db: &mut D,
        session: &mut Session,
        destination: &Path,
        extra_paths: &[PathBuf],
    ) -> Result<BackupReport> {
        tracing::info!("Backing up {} from {}", db.name(), session.registry.root().display());
        let tables = self.selector.list_tables(db)?;
        tracing::debug!("Selected tables: {:?}", tables);

        let export = Exporter::new(&self.config.record_dir).export_tables(
            db,
            &tables,
            &mut session.workspace,
            &mut session.registry,
        )?;

        for path in extra_paths {
            session.registry.register(path)?;
        }

        let entries = session.registry.registered().to_vec();
        let archive = self
            .archiver
            .create(session.registry.root(), &entries, destination)?;

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Ok(meta)) = (
            crate::observability::CellarMetrics::global(),
            std::fs::metadata(&archive),
        ) {
            metrics.record_archive_size(meta.len());
        }

        Ok(BackupReport {
            run_id,
            archive,
            export,
            entries,
        })
    }

    /// Extract `source` into a scratch workspace and load every table of `db` from it.
    ///
    /// Tables are restored in sorted order, each in its own transaction. Files in
    /// the archive other than record files are not copied anywhere.
    ///
    /// # Errors
    /// * `CellarError::NotFound` - If the archive or a table's record file is missing
    /// * `CellarError::ArchiveExtractionFailed` - If the archive is unreadable
    /// * `CellarError::RestoreBatchFailed` - If an insert fails; earlier tables stay committed
    pub fn restore<D: Database + ?Sized>(&self, db: &mut D, source: &Path) -> Result<RestoreReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("restore", %run_id);
        let _enter = span.enter();

        self.config.validate()?;
        let mut session = Session::new(&self.config.root)?;
        let result = self.run_restore(run_id, db, &mut session, source);
        let cleanup = session.finish();

        let report = result?;
        cleanup?;
        tracing::info!(
            "Restore of {} finished ({} rows)",
            report.source.display(),
            report.restore.total_rows()
        );
        Ok(report)
    }

    fn run_restore<D: Database + ?Sized>(
        &self,
        run_id: Uuid,
        db: &mut D,
        session: &mut Session,
        source: &Path,
    ) -> Result<RestoreReport> {
        let extracted = session.workspace.dir()?.to_path_buf();
        self.archiver.extract(source, &extracted)?;

        let tables = self.selector.list_tables(db)?;
        tracing::debug!("Restoring tables: {:?}", tables);
        let restore =
            Importer::new(&self.config.record_dir).restore_tables(db, &tables, &extracted)?;

        Ok(RestoreReport {
            run_id,
            source: source.to_path_buf(),
            restore,
        })
    }

    /// Member paths of an existing archive
    pub fn members(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        self.archiver.members(archive)
    }
}

/// Engine operations behind dynamic dispatch
///
/// Lets [`create_engine_from_config`] return engines with different archivers
/// through one type.
pub trait EngineInterface {
    fn backup(
        &self,
        db: &mut dyn Database,
        destination: &Path,
        extra_paths: &[PathBuf],
    ) -> Result<BackupReport>;
    fn restore(&self, db: &mut dyn Database, source: &Path) -> Result<RestoreReport>;
    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>>;
    fn config(&self) -> &CellarConfig;
    fn archiver_name(&self) -> &str;
}

impl<A: Archiver> EngineInterface for BackupEngine<A> {
    fn backup(
        &self,
        db: &mut dyn Database,
        destination: &Path,
        extra_paths: &[PathBuf],
    ) -> Result<BackupReport> {
        self.backup(db, destination, extra_paths)
    }

    fn restore(&self, db: &mut dyn Database, source: &Path) -> Result<RestoreReport> {
        self.restore(db, source)
    }

    fn members(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        self.members(archive)
    }

    fn config(&self) -> &CellarConfig {
        &self.config
    }

    fn archiver_name(&self) -> &str {
        self.archiver.name()
    }
}

/// Create an engine with the archiver selected by `config.archiver`
///
/// # Example
/// ```rust,no_run
/// use cellar_core::{create_engine_from_config, ArchiverKind, CellarConfig};
///
/// let config = CellarConfig::new("/srv/app").with_archiver(ArchiverKind::Command);
/// let engine = create_engine_from_config(config)?;
/// assert_eq!(engine.archiver_name(), "command");
/// # Ok::<(), cellar_core::CellarError>(())
/// ```
pub fn create_engine_from_config(config: CellarConfig) -> Result<Box<dyn EngineInterface>> {
    config.validate()?;

    match config.archiver {
        ArchiverKind::Native => {
            let archiver = NativeArchiver::with_level(config.compression_level);
            Ok(Box::new(BackupEngine::new(config, archiver)))
        }
        ArchiverKind::Command => Ok(Box::new(BackupEngine::new(config, TarCommand::new()))),
    }
}
