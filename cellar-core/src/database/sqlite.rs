/*!
SQLite adapter for the [`Database`] port.
*/

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::{quote_standard, Database};
use crate::{CellarError, DriverDateTime, Record, Result, Value};

/// How a column's declared type steers value conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnAffinity {
    Date,
    DateTime,
    Boolean,
    Other,
}

impl ColumnAffinity {
    fn from_decl_type(decl_type: Option<&str>) -> Self {
        let Some(decl) = decl_type else {
            return Self::Other;
        };
        match decl.trim().to_ascii_uppercase().as_str() {
            "DATE" => Self::Date,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            _ => Self::Other,
        }
    }
}

/// SQLite database accessed through `rusqlite`
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            CellarError::database(format!(
                "Failed to open SQLite database {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Borrow the underlying connection, e.g. to run schema setup
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn convert(value: ValueRef<'_>, affinity: ColumnAffinity) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) if affinity == ColumnAffinity::Boolean && (i == 0 || i == 1) => {
                Value::Boolean(i == 1)
            }
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) => {
                // invalid UTF-8 is kept byte for byte instead of being replaced
                let text = match std::str::from_utf8(bytes) {
                    Ok(text) => text.to_string(),
                    Err(_) => return Value::Blob(bytes.to_vec()),
                };
                match affinity {
                    ColumnAffinity::Date | ColumnAffinity::DateTime => parse_driver_temporal(&text)
                        .map(Value::Driver)
                        .unwrap_or(Value::Text(text)),
                    _ => Value::Text(text),
                }
            }
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` without validating the calendar,
/// so zero dates such as `0000-00-00 00:00:00` are kept for normalization.
fn parse_driver_temporal(text: &str) -> Option<DriverDateTime> {
    fn number<T: std::str::FromStr>(part: &str, width: usize) -> Option<T> {
        if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    }

    let (date, time) = match text.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let mut date_parts = date.split('-');
    let year = number::<i32>(date_parts.next()?, 4)?;
    let month = number::<u32>(date_parts.next()?, 2)?;
    let day = number::<u32>(date_parts.next()?, 2)?;
    if date_parts.next().is_some() {
        return None;
    }

    match time {
        None => Some(DriverDateTime::date(year, month, day)),
        Some(time) => {
            let mut time_parts = time.split(':');
            let hour = number::<u32>(time_parts.next()?, 2)?;
            let minute = number::<u32>(time_parts.next()?, 2)?;
            let second = number::<u32>(time_parts.next()?, 2)?;
            if time_parts.next().is_some() {
                return None;
            }
            Some(DriverDateTime::datetime(year, month, day, hour, minute, second))
        }
    }
}

impl Database for SqliteDatabase {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn table_names(&mut self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn select_all(&mut self, table: &str) -> Result<Vec<Record>> {
        let sql = format!("SELECT * FROM {}", self.quote_identifier(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<(String, ColumnAffinity)> = stmt
            .columns()
            .iter()
            .map(|column| {
                (
                    column.name().to_string(),
                    ColumnAffinity::from_decl_type(column.decl_type()),
                )
            })
            .collect();

        let mut records = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Record::with_capacity(columns.len());
            for (index, (name, affinity)) in columns.iter().enumerate() {
                record.insert(name.as_str(), Self::convert(row.get_ref(index)?, *affinity));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn execute(&mut self, sql: &str) -> Result<usize> {
        Ok(self.conn.execute(sql, [])?)
    }

    fn quote(&self, value: &Value) -> String {
        quote_standard(value)
    }

    fn begin(&mut self) -> Result<()> {
        Ok(self.conn.execute_batch("BEGIN")?)
    }

    fn commit(&mut self) -> Result<()> {
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }
}
