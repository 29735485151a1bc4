//! Stored record format and key types.
//!
//! A record is a flat JSON object mapping field names to primitives,
//! ISO-8601 date strings, or arrays of primitives. Keys are JSON values
//! too; their compact JSON text is what the engine stores as the primary
//! key column, next to a binary sort key that orders rows by key value.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Format used for calendar dates. Lexicographic order equals chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format used for timestamps. Lexicographic order equals chronological order.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }

    /// Returns the value of `field`, treating JSON `null` as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub(crate) fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub(crate) fn from_json(text: &str) -> Result<Self, StoreError> {
        Ok(Self(serde_json::from_str(text)?))
    }
}

/// Primary key of a record: a scalar or an array of scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(Value);

impl Key {
    pub fn compound<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Key>,
    {
        Self(Value::Array(parts.into_iter().map(|k| k.0).collect()))
    }

    /// Builds a key from a record value. `null`, objects and empty arrays are not keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Object(_) => None,
            Value::Array(items) if items.is_empty() => None,
            other => Some(Self(other.clone())),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    pub(crate) fn encode(&self) -> String {
        self.0.to_string()
    }

    pub(crate) fn decode(text: &str) -> Result<Self, StoreError> {
        Ok(Self(serde_json::from_str(text)?))
    }

    /// The key as an index value, for ranges over an index.
    pub(crate) fn to_sql(&self) -> Option<SqlValue> {
        scalar_to_sql(&self.0)
    }

    /// Byte string whose bytewise order is the order of keys: booleans,
    /// then numbers, then strings, then arrays compared element by element.
    pub(crate) fn sort_key(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_sort_key(&self.0, &mut out);
        out
    }
}

const SORT_BOOL: u8 = 0x10;
const SORT_NUMBER: u8 = 0x20;
const SORT_STRING: u8 = 0x30;
const SORT_ARRAY: u8 = 0x40;
const SORT_OTHER: u8 = 0x50;

fn push_sort_key(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bool(b) => {
            out.push(SORT_BOOL);
            out.push(u8::from(*b));
        }
        Value::Number(n) => {
            out.push(SORT_NUMBER);
            let bits = n.as_f64().unwrap_or_default().to_bits();
            // Flip so negative numbers sort below positive ones.
            let ordered = if bits >> 63 == 1 { !bits } else { bits | 1 << 63 };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        Value::String(s) => {
            out.push(SORT_STRING);
            push_terminated(s.as_bytes(), out);
        }
        Value::Array(items) => {
            out.push(SORT_ARRAY);
            for item in items {
                push_sort_key(item, out);
            }
            out.push(0x00);
        }
        Value::Null | Value::Object(_) => {
            out.push(SORT_OTHER);
            push_terminated(value.to_string().as_bytes(), out);
        }
    }
}

/// Escapes 0x00 as 0x00 0xFF and ends with 0x00 0x01, so a string sorts
/// before every string it is a prefix of.
fn push_terminated(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0xFF);
        }
    }
    out.extend_from_slice(&[0x00, 0x01]);
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(Value::String(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

impl From<NaiveDate> for Key {
    fn from(value: NaiveDate) -> Self {
        Self(encode_date(value))
    }
}

/// Range of index values a cursor visits, or of primary keys for `ObjectStore::get_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum KeyRange {
    #[default]
    All,
    /// Entries whose index value equals the key.
    Only(Key),
    /// Entries whose index value is greater than or equal to the key.
    From(Key),
}

pub fn encode_date(date: NaiveDate) -> Value {
    Value::String(date.format(DATE_FORMAT).to_string())
}

pub fn encode_date_time(date_time: NaiveDateTime) -> Value {
    Value::String(date_time.format(DATE_TIME_FORMAT).to_string())
}

pub fn encode_optional_date(date: Option<NaiveDate>) -> Value {
    date.map(encode_date).unwrap_or(Value::Null)
}

pub fn encode_optional_date_time(date_time: Option<NaiveDateTime>) -> Value {
    date_time.map(encode_date_time).unwrap_or(Value::Null)
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

pub(crate) fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT).ok()
}

/// Converts a record value to the engine value an index sorts by.
pub(crate) fn scalar_to_sql(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Some(SqlValue::Text(value.to_string())),
    }
}

pub(crate) fn sql_to_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(bytes) => Value::from(bytes),
    }
}
