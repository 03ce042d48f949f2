/*!
Snapshot exporter: dumps selected tables into record files under the archive root.
*/

use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    database::Database, record_file::RecordFile, registry::PathRegistry, workspace::Workspace,
    CellarError, Record, Result, Value,
};

/// Result of exporting one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableExport {
    pub table: String,
    pub rows: usize,
    pub path: PathBuf,
}

/// Result of a whole export
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub tables: Vec<TableExport>,
}

impl ExportSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Writes one record file per table into `<root>/<record_dir>`
#[derive(Debug, Clone)]
pub struct Exporter {
    record_dir: PathBuf,
}

impl Exporter {
    /// `record_dir` is relative to the archive root, e.g. `db/backup`
    pub fn new<P: Into<PathBuf>>(record_dir: P) -> Self {
        Self {
            record_dir: record_dir.into(),
        }
    }

    /// Export `tables` in the given order.
    ///
    /// Each record file is marked for cleanup before it is written, and the record
    /// directory (or its first missing ancestor) is marked too when the export had to
    /// create it. Once every table is written the record directory is registered as
    /// a single archive entry.
    pub fn export_tables<D: Database + ?Sized>(
        &self,
        db: &mut D,
        tables: &[String],
        workspace: &mut Workspace,
        registry: &mut PathRegistry,
    ) -> Result<ExportSummary> {
        let dir = registry.root().join(&self.record_dir);
        if let Some(created) = first_missing_ancestor(registry.root(), &self.record_dir) {
            workspace.mark_for_cleanup(created);
        }
        fs::create_dir_all(&dir)?;

        let mut summary = ExportSummary::default();
        for table in tables {
            tracing::debug!("Writing {}...", table);
            let mut rows = db.select_all(table)?;
            for row in &mut rows {
                normalize_record(table, row)?;
            }

            let path = RecordFile::path_for(&dir, table)?;
            workspace.mark_for_cleanup(&path);
            let file = RecordFile::new(table.as_str(), rows)?;
            file.write_to(&path)?;

            #[cfg(feature = "metrics")]
            if let Some(metrics) = crate::observability::CellarMetrics::global() {
                metrics.record_table_exported(file.rows.len());
            }

            summary.tables.push(TableExport {
                table: table.clone(),
                rows: file.rows.len(),
                path,
            });
        }

        registry.register(&self.record_dir)?;
        tracing::info!(
            "Exported {} tables ({} rows)",
            summary.tables.len(),
            summary.total_rows()
        );
        Ok(summary)
    }
}

/// Replace every driver temporal in `record` with a calendar value
pub fn normalize_record(table: &str, record: &mut Record) -> Result<()> {
    for value in record.values_mut() {
        if let Value::Driver(raw) = value {
            let normalized = raw.normalize().ok_or_else(|| {
                CellarError::serialization(table, format!("'{raw}' is not a valid date/time"))
            })?;
            *value = normalized;
        }
    }
    Ok(())
}

/// Topmost component of `root/relative` that does not exist yet
fn first_missing_ancestor(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        if !current.exists() {
            return Some(current);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use crate::DriverDateTime;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn users() -> Vec<Record> {
        vec![
            Record::new().with("id", 1i64).with("name", "ada"),
            Record::new().with("id", 2i64).with("name", "grace"),
        ]
    }

    #[test]
    fn test_export_writes_one_file_per_table_and_one_entry() {
        let root = TempDir::new().unwrap();
        let mut db = MemoryDatabase::new()
            .with_table("users", users())
            .with_table("posts", vec![]);
        let mut workspace = Workspace::new();
        let mut registry = PathRegistry::new(root.path()).unwrap();

        let summary = Exporter::new("db/backup")
            .export_tables(
                &mut db,
                &["posts".to_string(), "users".to_string()],
                &mut workspace,
                &mut registry,
            )
            .unwrap();

        assert_eq!(summary.total_rows(), 2);
        assert!(root.path().join("db/backup/users.json").is_file());
        assert!(root.path().join("db/backup/posts.json").is_file());
        assert_eq!(registry.registered(), &[PathBuf::from("db/backup")]);

        let loaded = RecordFile::read_from(&root.path().join("db/backup/users.json")).unwrap();
        assert_eq!(loaded.rows, users());
    }

    #[test]
    fn test_export_normalizes_zero_dates() {
        let root = TempDir::new().unwrap();
        let rows = vec![Record::new()
            .with("id", 1i64)
            .with(
                "created_at",
                Value::Driver(DriverDateTime::datetime(2020, 0, 0, 12, 0, 0)),
            )];
        let mut db = MemoryDatabase::new().with_table("events", rows);
        let mut workspace = Workspace::new();
        let mut registry = PathRegistry::new(root.path()).unwrap();

        Exporter::new("db/backup")
            .export_tables(&mut db, &["events".to_string()], &mut workspace, &mut registry)
            .unwrap();

        let loaded = RecordFile::read_from(&root.path().join("db/backup/events.json")).unwrap();
        assert_eq!(
            loaded.rows[0].get("created_at"),
            Some(&Value::DateTime(
                NaiveDate::from_ymd_opt(2020, 1, 1)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap()
            ))
        );
    }

    #[test]
    fn test_cleanup_removes_exported_files_and_created_dirs() {
        let root = TempDir::new().unwrap();
        let mut db = MemoryDatabase::new().with_table("users", users());
        let mut workspace = Workspace::new();
        let mut registry = PathRegistry::new(root.path()).unwrap();

        Exporter::new("db/backup")
            .export_tables(&mut db, &["users".to_string()], &mut workspace, &mut registry)
            .unwrap();
        workspace.cleanup().unwrap();

        assert!(!root.path().join("db").exists());
    }

    #[test]
    fn test_cleanup_keeps_preexisting_record_dir() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("db/backup")).unwrap();
        fs::write(root.path().join("db/backup/keep.txt"), b"keep").unwrap();
        let mut db = MemoryDatabase::new().with_table("users", users());
        let mut workspace = Workspace::new();
        let mut registry = PathRegistry::new(root.path()).unwrap();

        Exporter::new("db/backup")
            .export_tables(&mut db, &["users".to_string()], &mut workspace, &mut registry)
            .unwrap();
        workspace.cleanup().unwrap();

        assert!(root.path().join("db/backup/keep.txt").exists());
        assert!(!root.path().join("db/backup/users.json").exists());
    }

    #[test]
    fn test_invalid_date_aborts_export_and_is_cleaned_up() {
        let root = TempDir::new().unwrap();
        let bad = vec![Record::new().with(
            "due",
            Value::Driver(DriverDateTime::date(2021, 2, 30)),
        )];
        let mut db = MemoryDatabase::new()
            .with_table("a_ok", users())
            .with_table("b_bad", bad);
        let mut workspace = Workspace::new();
        let mut registry = PathRegistry::new(root.path()).unwrap();

        let result = Exporter::new("db/backup").export_tables(
            &mut db,
            &["a_ok".to_string(), "b_bad".to_string()],
            &mut workspace,
            &mut registry,
        );

        assert!(matches!(
            result,
            Err(CellarError::SerializationFailed { ref table, .. }) if table == "b_bad"
        ));
        assert!(registry.is_empty());
        assert!(root.path().join("db/backup/a_ok.json").exists());

        workspace.cleanup().unwrap();
        assert!(!root.path().join("db").exists());
    }

    #[test]
    fn test_missing_table_is_database_error() {
        let root = TempDir::new().unwrap();
        let mut db = MemoryDatabase::new();
        let mut workspace = Workspace::new();
        let mut registry = PathRegistry::new(root.path()).unwrap();

        let result = Exporter::new("db/backup").export_tables(
            &mut db,
            &["ghost".to_string()],
            &mut workspace,
            &mut registry,
        );
        assert!(matches!(result, Err(CellarError::DatabaseFailed(_))));
    }
}
