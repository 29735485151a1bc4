//! Scoped transaction handles: object stores, indices and cursors.
//!
//! A [`Transaction`] lives only inside the body passed to
//! [`Database::transaction`](super::Database::transaction) or
//! [`Database::write_transaction`](super::Database::write_transaction) and
//! only reaches the stores named when it was opened.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::StoreError;

use super::record::{scalar_to_sql, sql_to_value, Key, KeyRange, Record};
use super::schema::{IndexDef, IndexKind, StoreDef};
use super::Catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

pub struct Transaction<'t> {
    pub(crate) conn: &'t Connection,
    pub(crate) catalog: &'t Catalog,
    pub(crate) scope: &'t [String],
    pub(crate) mode: TransactionMode,
}

impl<'t> Transaction<'t> {
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn store(&self, name: &str) -> Result<ObjectStore<'t>, StoreError> {
        if !self.scope.iter().any(|s| s == name) {
            return Err(StoreError::StoreNotInScope(name.to_string()));
        }
        Ok(ObjectStore {
            conn: self.conn,
            def: self.catalog.get(name)?,
            mode: self.mode,
        })
    }
}

#[derive(Clone, Copy)]
pub struct ObjectStore<'t> {
    conn: &'t Connection,
    def: &'t StoreDef,
    mode: TransactionMode,
}

impl<'t> ObjectStore<'t> {
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn get(&self, key: &Key) -> Result<Option<Record>, StoreError> {
        let sql = format!("SELECT record FROM {} WHERE key = ?1", self.def.table());
        let text: Option<String> = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![key.encode()], |row| row.get(0))
            .optional()?;
        text.map(|t| Record::from_json(&t)).transpose()
    }

    /// Inserts or replaces the record stored under its primary key and
    /// refreshes its index entries.
    pub fn put(&self, record: &Record) -> Result<Key, StoreError> {
        self.ensure_writable()?;
        let key = record
            .get(self.def.key_field)
            .and_then(Key::from_value)
            .ok_or(StoreError::MissingKey(self.def.name))?;
        let encoded = key.encode();
        let sort_key = key.sort_key();

        let sql = format!(
            "INSERT INTO {} (key, sort_key, record) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET record = excluded.record",
            self.def.table()
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params![encoded, sort_key, record.to_json()?])?;

        for index in &self.def.indices {
            let table = self.def.index_table(index);
            self.conn
                .prepare_cached(&format!("DELETE FROM {table} WHERE key = ?1"))?
                .execute(params![encoded])?;

            let verb = if index.kind == IndexKind::Unique {
                "INSERT"
            } else {
                "INSERT OR IGNORE"
            };
            let mut insert = self
                .conn
                .prepare_cached(&format!(
                    "{verb} INTO {table} (value, sort_key, key) VALUES (?1, ?2, ?3)"
                ))?;
            for value in index_entries(index, record.get(index.name)) {
                insert.execute(params![value, sort_key, encoded])?;
            }
        }

        Ok(key)
    }

    /// Removes the record and its index entries. Returns whether a record existed.
    pub fn delete(&self, key: &Key) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        let encoded = key.encode();
        for index in &self.def.indices {
            let sql = format!("DELETE FROM {} WHERE key = ?1", self.def.index_table(index));
            self.conn.prepare_cached(&sql)?.execute(params![encoded])?;
        }
        let sql = format!("DELETE FROM {} WHERE key = ?1", self.def.table());
        let affected = self.conn.prepare_cached(&sql)?.execute(params![encoded])?;
        Ok(affected > 0)
    }

    /// Records whose primary key is in `range`, in primary-key order.
    pub fn get_all(&self, range: KeyRange) -> Result<Vec<Record>, StoreError> {
        let (filter, args) = match &range {
            KeyRange::All => ("", Vec::new()),
            KeyRange::Only(key) => ("WHERE key = ?1", vec![SqlValue::Text(key.encode())]),
            KeyRange::From(key) => ("WHERE sort_key >= ?1", vec![SqlValue::Blob(key.sort_key())]),
        };
        let sql = format!(
            "SELECT record FROM {} {filter} ORDER BY sort_key, key",
            self.def.table()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let texts = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        texts.iter().map(|t| Record::from_json(t)).collect()
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.def.table());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn index(&self, name: &str) -> Result<Index<'t>, StoreError> {
        Ok(Index {
            store: *self,
            def: self.def.index(name)?,
        })
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(StoreError::ReadOnly(self.def.name)),
        }
    }
}

fn index_entries(index: &IndexDef, value: Option<&Value>) -> Vec<SqlValue> {
    match (index.kind, value) {
        (_, None) => Vec::new(),
        (IndexKind::MultiEntry, Some(Value::Array(items))) => {
            items.iter().filter_map(scalar_to_sql).collect()
        }
        (_, Some(value)) => scalar_to_sql(value).into_iter().collect(),
    }
}

#[derive(Clone, Copy)]
pub struct Index<'t> {
    store: ObjectStore<'t>,
    def: &'t IndexDef,
}

impl<'t> Index<'t> {
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Records in range, ordered by index value then primary key.
    pub fn get_all(&self, range: KeyRange) -> Result<Vec<Record>, StoreError> {
        let mut cursor = self.cursor(range);
        let mut records = Vec::new();
        while let Some(entry) = cursor.next()? {
            records.push(entry.record);
        }
        Ok(records)
    }

    /// Opens a lazy cursor positioned before the first entry in range.
    pub fn cursor(&self, range: KeyRange) -> Cursor<'t> {
        Cursor {
            store: self.store,
            table: self.store.def.index_table(self.def),
            range,
            position: None,
            current: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CursorEntry {
    /// The index value this entry is sorted by.
    pub value: Value,
    pub key: Key,
    pub record: Record,
}

/// Walks an index in ascending order, fetching one entry per step.
///
/// Entries are ordered by index value, then by primary key. Each step
/// resumes strictly after the previous entry, so deleting the current
/// record never skips or repeats one.
pub struct Cursor<'t> {
    store: ObjectStore<'t>,
    table: String,
    range: KeyRange,
    position: Option<(SqlValue, Vec<u8>, String)>,
    current: Option<Key>,
}

impl Cursor<'_> {
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<CursorEntry>, StoreError> {
        let mut conditions = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        let bound = match &self.range {
            KeyRange::All => None,
            KeyRange::Only(key) => Some(("i.value = ?", key.to_sql())),
            KeyRange::From(key) => Some(("i.value >= ?", key.to_sql())),
        };
        if let Some((condition, value)) = bound {
            // A null bound matches nothing: null values are never indexed.
            let Some(value) = value else {
                return self.finish();
            };
            conditions.push(condition);
            args.push(value);
        }
        if let Some((value, sort_key, key)) = &self.position {
            conditions.push("(i.value, i.sort_key, i.key) > (?, ?, ?)");
            args.push(value.clone());
            args.push(SqlValue::Blob(sort_key.clone()));
            args.push(SqlValue::Text(key.clone()));
        }

        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT i.value, i.sort_key, i.key, s.record FROM {} i
             JOIN {} s ON s.key = i.key
             {filter}
             ORDER BY i.value, i.sort_key, i.key
             LIMIT 1",
            self.table,
            self.store.def.table(),
        );

        let row = self
            .store
            .conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, SqlValue>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        let Some((value, sort_key, encoded_key, text)) = row else {
            return self.finish();
        };

        let key = Key::decode(&encoded_key)?;
        let record = Record::from_json(&text)?;
        self.position = Some((value.clone(), sort_key, encoded_key));
        self.current = Some(key.clone());
        Ok(Some(CursorEntry {
            value: sql_to_value(value),
            key,
            record,
        }))
    }

    /// Deletes the record at the current position.
    pub fn delete(&mut self) -> Result<(), StoreError> {
        let key = self.current.take().ok_or(StoreError::CursorExhausted)?;
        self.store.delete(&key)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<CursorEntry>, StoreError> {
        self.current = None;
        Ok(None)
    }
}
