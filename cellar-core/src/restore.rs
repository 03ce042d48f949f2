/*!
Restore importer: loads record files from an extracted archive back into a database.
*/

use std::path::{Path, PathBuf};

use crate::{
    database::{insert_statement, with_transaction, Database},
    record_file::RecordFile,
    CellarError, Result,
};

/// Result of restoring one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRestore {
    pub table: String,
    pub rows: usize,
}

/// Result of a whole restore
#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    pub tables: Vec<TableRestore>,
}

impl RestoreSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Inserts record files back into their tables, one transaction per table
#[derive(Debug, Clone)]
pub struct Importer {
    record_dir: PathBuf,
}

impl Importer {
    /// `record_dir` is relative to the extraction directory, e.g. `db/backup`
    pub fn new<P: Into<PathBuf>>(record_dir: P) -> Self {
        Self {
            record_dir: record_dir.into(),
        }
    }

    /// Restore `tables` in the given order from `<extracted>/<record_dir>`.
    ///
    /// Each table is one atomic unit: if any insert fails the table's transaction
    /// is rolled back and `RestoreBatchFailed` is returned. Tables restored before
    /// the failure stay committed and later tables are not attempted.
    pub fn restore_tables<D: Database + ?Sized>(
        &self,
        db: &mut D,
        tables: &[String],
        extracted: &Path,
    ) -> Result<RestoreSummary> {
        let dir = extracted.join(&self.record_dir);
        let mut summary = RestoreSummary::default();

        for table in tables {
            tracing::debug!("Loading {}...", table);
            let file = RecordFile::read_from(&RecordFile::path_for(&dir, table)?)?;
            if file.metadata.table != *table {
                return Err(CellarError::invalid_format(format!(
                    "Record file for '{}' was exported from table '{}'",
                    table, file.metadata.table
                )));
            }

            let rows = self.restore_table(db, table, &file)?;
            summary.tables.push(TableRestore {
                table: table.clone(),
                rows,
            });
        }

        tracing::info!(
            "Restored {} tables ({} rows)",
            summary.tables.len(),
            summary.total_rows()
        );
        Ok(summary)
    }

    fn restore_table<D: Database + ?Sized>(
        &self,
        db: &mut D,
        table: &str,
        file: &RecordFile,
    ) -> Result<usize> {
        let result = with_transaction(db, |db| {
            for (index, record) in file.rows.iter().enumerate() {
                let sql = insert_statement(db, table, record);
                db.execute(&sql).map_err(|e| CellarError::RestoreBatchFailed {
                    table: table.to_string(),
                    row: index + 1,
                    reason: e.to_string(),
                })?;
            }
            Ok(file.rows.len())
        });

        #[cfg(feature = "metrics")]
        if let Some(metrics) = crate::observability::CellarMetrics::global() {
            match &result {
                Ok(rows) => metrics.record_table_restored(*rows),
                Err(_) => metrics.record_restore_failure(),
            }
        }

        if let Err(CellarError::RestoreBatchFailed { row, .. }) = &result {
            tracing::warn!("Rolled back table {} after failure at row {}", table, row);
        }
        result
    }
}
