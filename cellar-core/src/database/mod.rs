/*!
Database access port.

The engine never talks to a database engine directly; it goes through the
[`Database`] trait so the same export and restore logic works against any adapter,
and tests can substitute their own implementation.
*/

#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::{Record, Result, Value};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

/// Minimal data-access interface consumed by the backup engine
pub trait Database {
    /// Name of the adapter, used in log output
    fn name(&self) -> &str;

    /// Names of every table in the database, in any order
    fn table_names(&mut self) -> Result<Vec<String>>;

    /// Every row of `table` as ordered column-to-value records
    fn select_all(&mut self, table: &str) -> Result<Vec<Record>>;

    /// Execute a statement, returning the number of affected rows
    fn execute(&mut self, sql: &str) -> Result<usize>;

    /// Render a value as a literal safe to embed in a textual statement
    fn quote(&self, value: &Value) -> String;

    /// Render an identifier (table or column name) for a textual statement
    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// Run `f` inside a transaction: commit when it succeeds, roll back when it fails.
///
/// The error from `f` is returned even if the rollback itself fails; the rollback
/// failure is logged.
pub fn with_transaction<D, T, F>(db: &mut D, f: F) -> Result<T>
where
    D: Database + ?Sized,
    F: FnOnce(&mut D) -> Result<T>,
{
    db.begin()?;
    match f(db) {
        Ok(value) => {
            db.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = db.rollback() {
                tracing::warn!("Rollback failed after error ({}): {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

/// Build a textual `INSERT` for one record using the adapter's quoting
pub fn insert_statement<D: Database + ?Sized>(db: &D, table: &str, record: &Record) -> String {
    let columns = record
        .columns()
        .map(|column| db.quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    let values = record
        .values()
        .map(|value| db.quote(value))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({values})",
        db.quote_identifier(table)
    )
}

/// Quoting rules shared by SQL dialects that use single-quoted strings and
/// `X'..'` blob literals.
pub fn quote_standard(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) if r.is_finite() => format!("{r:?}"),
        Value::Real(_) => "NULL".to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
        Value::Driver(raw) => format!("'{raw}'"),
    }
}

/// In-memory database for unit tests.
///
/// Statements are recorded, not parsed. `fail_on_execute = Some(n)` makes the
/// statement at position `n` of the recorded log fail.
#[cfg(test)]
pub struct MemoryDatabase {
    pub tables: std::collections::BTreeMap<String, Vec<Record>>,
    pub executed: Vec<String>,
    pub fail_on_execute: Option<usize>,
    snapshot: Option<(std::collections::BTreeMap<String, Vec<Record>>, usize)>,
    pub commits: usize,
    pub rollbacks: usize,
}

#[cfg(test)]
impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            tables: std::collections::BTreeMap::new(),
            executed: Vec::new(),
            fail_on_execute: None,
            snapshot: None,
            commits: 0,
            rollbacks: 0,
        }
    }

    pub fn with_table(mut self, name: &str, rows: Vec<Record>) -> Self {
        self.tables.insert(name.to_string(), rows);
        self
    }
}

#[cfg(test)]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        "memory"
    }

    fn table_names(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn select_all(&mut self, table: &str) -> Result<Vec<Record>> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| crate::CellarError::database(format!("no such table: {table}")))
    }

    fn execute(&mut self, sql: &str) -> Result<usize> {
        if self.fail_on_execute == Some(self.executed.len()) {
            return Err(crate::CellarError::database("injected failure"));
        }
        self.executed.push(sql.to_string());
        Ok(1)
    }

    fn quote(&self, value: &Value) -> String {
        quote_standard(value)
    }

    fn begin(&mut self) -> Result<()> {
        self.snapshot = Some((self.tables.clone(), self.executed.len()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some((tables, executed)) = self.snapshot.take() {
            self.tables = tables;
            self.executed.truncate(executed);
        }
        self.rollbacks += 1;
        Ok(())
    }
}
