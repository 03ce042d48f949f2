/*!
Typed row values and ordered records.

Every value carries its type through the record file so that a restore writes back
exactly what an export read. Database drivers may report temporal values that do not
form a valid calendar date (the "zero date" `0000-00-00` family); those arrive as
[`Value::Driver`] and must be normalized with [`normalize_temporal`] before a record
is serialized.
*/

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Raw temporal fields as reported by a driver; never written to a record file.
    #[serde(skip)]
    Driver(DriverDateTime),
}

impl Value {
    /// Whether this value still needs temporal normalization
    pub fn is_driver_temporal(&self) -> bool {
        matches!(self, Value::Driver(_))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Temporal value exactly as a driver reported it, fields possibly zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// False when the driver reported a bare date
    pub has_time: bool,
}

impl DriverDateTime {
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
            has_time: false,
        }
    }

    pub fn datetime(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            has_time: true,
        }
    }

    /// Normalize into a serializable [`Value::Date`] or [`Value::DateTime`]
    pub fn normalize(&self) -> Option<Value> {
        let normalized = normalize_temporal(self)?;
        if self.has_time {
            Some(Value::DateTime(normalized))
        } else {
            Some(Value::Date(normalized.date()))
        }
    }
}

impl fmt::Display for DriverDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        if self.has_time {
            write!(f, " {:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        }
        Ok(())
    }
}

/// Rebuild a calendar date/time from raw driver fields.
///
/// A month or day of 0 is clamped to 1, so `2020-00-00` becomes `2020-01-01`.
/// Returns `None` when the fields still do not describe a real instant
/// (for example February 30th or hour 25).
pub fn normalize_temporal(raw: &DriverDateTime) -> Option<NaiveDateTime> {
    let month = raw.month.max(1);
    let day = raw.day.max(1);
    NaiveDate::from_ymd_opt(raw.year, month, day)?.and_hms_opt(raw.hour, raw.minute, raw.second)
}

/// One database row: column names mapped to values, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a column, replacing an existing value in place or appending a new column
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, column: K, value: V) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Builder-style variant of [`Record::insert`]
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, column: K, value: V) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.fields.iter_mut().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to typed values")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Record, M::Error> {
                let mut record = Record::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((column, value)) = access.next_entry::<String, Value>()? {
                    record.fields.push((column, value));
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_month_and_day_clamp_to_first() {
        let raw = DriverDateTime::datetime(2020, 0, 0, 0, 0, 0);
        let normalized = normalize_temporal(&raw).unwrap();
        assert_eq!(normalized.to_string(), "2020-01-01 00:00:00");
    }

    #[test]
    fn test_valid_datetime_is_unchanged() {
        let raw = DriverDateTime::datetime(2021, 7, 14, 9, 30, 5);
        let normalized = normalize_temporal(&raw).unwrap();
        assert_eq!(
            normalized,
            NaiveDate::from_ymd_opt(2021, 7, 14)
                .unwrap()
                .and_hms_opt(9, 30, 5)
                .unwrap()
        );
    }

    #[test]
    fn test_zero_day_keeps_time_of_day() {
        let raw = DriverDateTime::datetime(1999, 12, 0, 23, 59, 59);
        let normalized = normalize_temporal(&raw).unwrap();
        assert_eq!(normalized.to_string(), "1999-12-01 23:59:59");
    }

    #[test]
    fn test_impossible_dates_do_not_normalize() {
        assert!(normalize_temporal(&DriverDateTime::date(2021, 2, 30)).is_none());
        assert!(normalize_temporal(&DriverDateTime::datetime(2021, 13, 1, 0, 0, 0)).is_none());
        assert!(normalize_temporal(&DriverDateTime::datetime(2021, 1, 1, 25, 0, 0)).is_none());
    }

    #[test]
    fn test_bare_driver_date_normalizes_to_date() {
        let value = DriverDateTime::date(2020, 0, 0).normalize().unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()));
    }

    #[test]
    fn test_driver_value_refuses_to_serialize() {
        let value = Value::Driver(DriverDateTime::date(2020, 0, 0));
        assert!(serde_json::to_string(&value).is_err());
    }

    #[test]
    fn test_record_preserves_column_order() {
        let record = Record::new()
            .with("zeta", 1i64)
            .with("alpha", "a")
            .with("mid", Value::Null);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"zeta":{"integer":1},"alpha":{"text":"a"},"mid":"null"}"#
        );

        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.columns().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_record_insert_replaces_existing_column() {
        let mut record = Record::new().with("id", 1i64).with("name", "a");
        record.insert("id", 2i64);

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_typed_values_survive_json() {
        let record = Record::new()
            .with("flag", true)
            .with("ratio", 0.25f64)
            .with("whole_real", 3.0f64)
            .with("payload", Value::Blob(vec![0, 159, 255]))
            .with(
                "born",
                Value::Date(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()),
            );

        let json = serde_json::to_string(&record).unwrap();
        let parsed: Record = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.get("whole_real"), Some(&Value::Real(3.0)));
        assert_eq!(parsed, record);
    }
}
