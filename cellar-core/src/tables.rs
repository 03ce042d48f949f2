/*!
Selection of the tables that take part in a backup or restore.
*/

use crate::{database::Database, Result};

/// Tables skipped unless the configuration says otherwise: migration bookkeeping,
/// session storage and the exception log.
pub const DEFAULT_EXCLUDED_TABLES: &[&str] = &["schema_migrations", "sessions", "public_exceptions"];

/// Lists database tables minus a fixed exclusion set, in lexicographic order
#[derive(Debug, Clone)]
pub struct TableSelector {
    excluded: Vec<String>,
}

impl TableSelector {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.excluded.iter().any(|name| name == table)
    }

    /// Sorted names of every table not in the exclusion set
    pub fn list_tables<D: Database + ?Sized>(&self, db: &mut D) -> Result<Vec<String>> {
        let mut tables = db.table_names()?;
        tables.sort();
        tables.retain(|table| !self.is_excluded(table));
        tracing::debug!("Selected {} tables from {}", tables.len(), db.name());
        Ok(tables)
    }
}

impl Default for TableSelector {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_TABLES.iter().copied())
    }
}
