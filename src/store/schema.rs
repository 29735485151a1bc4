//! Schema descriptors and the runtime that turns them into object stores.
//!
//! An entity type declares its store by implementing [`Schema`]: a static,
//! ordered table of [`FieldDef`]s, each naming a field, reading it from the
//! entity, and optionally marking it as the primary key or an index.
//! From that table the runtime derives the store layout ([`StoreDef`]),
//! creates the backing tables on upgrade, and marshals entities to and
//! from [`Record`]s.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

use super::record::{parse_date, parse_date_time, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// The field's value is the record's primary key.
    PrimaryKey,
    /// Non-unique secondary index.
    Field,
    /// Secondary index rejecting two records with the same value.
    Unique,
    /// Set-valued field: one index entry per element.
    MultiEntry,
}

/// One column of an entity's schema table.
pub struct FieldDef<E> {
    pub name: &'static str,
    pub get: fn(&E) -> Value,
    pub index: Option<IndexKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub kind: IndexKind,
}

/// Engine-facing layout of one object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDef {
    pub name: &'static str,
    pub key_field: &'static str,
    pub indices: Vec<IndexDef>,
}

impl StoreDef {
    pub fn from_fields<E>(name: &'static str, fields: &[FieldDef<E>]) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::InvalidSchema {
            store: name.to_string(),
            reason,
        };

        if !is_identifier(name) {
            return Err(invalid("store name must be ascii alphanumeric or '_'".into()));
        }

        let mut key_field = None;
        let mut indices = Vec::new();
        for (pos, field) in fields.iter().enumerate() {
            if !is_identifier(field.name) {
                return Err(invalid(format!("invalid field name '{}'", field.name)));
            }
            if fields[..pos].iter().any(|f| f.name == field.name) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            match field.index {
                Some(IndexKind::PrimaryKey) => {
                    if key_field.replace(field.name).is_some() {
                        return Err(invalid("more than one primary key".into()));
                    }
                }
                Some(kind) => indices.push(IndexDef {
                    name: field.name,
                    kind,
                }),
                None => {}
            }
        }

        let key_field = key_field.ok_or_else(|| invalid("no primary key".into()))?;
        Ok(Self {
            name,
            key_field,
            indices,
        })
    }

    pub fn index(&self, name: &str) -> Result<&IndexDef, StoreError> {
        self.indices
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: self.name.to_string(),
                index: name.to_string(),
            })
    }

    pub(crate) fn table(&self) -> String {
        format!("store_{}", self.name)
    }

    pub(crate) fn index_table(&self, index: &IndexDef) -> String {
        format!("index_{}_{}", self.name, index.name)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Creates the store table and one index table per declared index.
///
/// Safe to call on a database where the store already exists.
pub fn create_store(conn: &Connection, store: &StoreDef) -> rusqlite::Result<()> {
    let table = store.table();
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            key TEXT PRIMARY KEY NOT NULL,
            sort_key BLOB NOT NULL,
            record TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {table}_sort ON {table}(sort_key, key);"
    );

    for index in &store.indices {
        let index_table = store.index_table(index);
        let unique = if index.kind == IndexKind::Unique {
            ", UNIQUE (value)"
        } else {
            ""
        };
        sql.push_str(&format!(
            "
            CREATE TABLE IF NOT EXISTS {index_table} (
                value NOT NULL,
                sort_key BLOB NOT NULL,
                key TEXT NOT NULL,
                PRIMARY KEY (value, sort_key, key){unique}
            ) WITHOUT ROWID;
            CREATE INDEX IF NOT EXISTS {index_table}_key ON {index_table}(key);"
        ));
    }

    conn.execute_batch(&sql)
}

/// Ties an entity type to its object store.
pub trait Schema {
    type Entity: 'static;

    const STORE: &'static str;

    fn fields() -> &'static [FieldDef<Self::Entity>];

    fn store_def() -> Result<StoreDef, StoreError> {
        StoreDef::from_fields(Self::STORE, Self::fields())
    }

    fn to_record(entity: &Self::Entity) -> Record {
        let mut record = Record::new();
        for field in Self::fields() {
            record.insert(field.name, (field.get)(entity));
        }
        record
    }

    /// Rebuilds an entity; `build` pulls typed field values from the reader.
    fn from_record<F>(record: &Record, build: F) -> Result<Self::Entity, StoreError>
    where
        F: FnOnce(&FieldReader<'_>) -> Result<Self::Entity, StoreError>,
    {
        build(&FieldReader {
            store: Self::STORE,
            record,
        })
    }
}

/// Typed view over a stored record, handed to `from_record` builders.
pub struct FieldReader<'r> {
    store: &'static str,
    record: &'r Record,
}

impl FieldReader<'_> {
    pub fn required<T: DeserializeOwned>(&self, field: &str) -> Result<T, StoreError> {
        self.optional(field)?
            .ok_or_else(|| self.integrity_error(field))
    }

    pub fn optional<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, StoreError> {
        match self.record.get(field) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| self.integrity_error(field)),
        }
    }

    pub fn date(&self, field: &str) -> Result<Option<NaiveDate>, StoreError> {
        self.optional::<String>(field)?
            .map(|text| parse_date(&text).ok_or_else(|| self.integrity_error(field)))
            .transpose()
    }

    pub fn date_time(&self, field: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        self.optional::<String>(field)?
            .map(|text| parse_date_time(&text).ok_or_else(|| self.integrity_error(field)))
            .transpose()
    }

    fn integrity_error(&self, field: &str) -> StoreError {
        StoreError::SchemaIntegrity {
            store: self.store,
            field: field.to_string(),
        }
    }
}
