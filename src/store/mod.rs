//! Schema-driven object store layer over SQLite.
//!
//! Each object store is a table of `(key, sort_key, record)` rows where
//! `record` is the JSON form of a [`Record`] and `sort_key` orders rows by
//! key value; each index is a companion table of `(value, sort_key, key)`
//! entries kept in step by [`ObjectStore::put`] and
//! [`ObjectStore::delete`]. Every access goes through a transaction opened
//! on a [`Database`], which commits when the body succeeds and rolls back
//! otherwise.

pub mod record;
pub mod schema;
pub mod transaction;

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::TransactionBehavior;
use tokio_rusqlite::Connection;

use crate::error::StoreError;

pub use record::{Key, KeyRange, Record};
pub use schema::{create_store, FieldDef, FieldReader, IndexDef, IndexKind, Schema, StoreDef};
pub use transaction::{Cursor, CursorEntry, Index, ObjectStore, Transaction, TransactionMode};

/// The set of object stores a database is created with.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    stores: Vec<StoreDef>,
}

impl Catalog {
    pub fn new(stores: Vec<StoreDef>) -> Result<Self, StoreError> {
        for (pos, store) in stores.iter().enumerate() {
            if stores[..pos].iter().any(|s| s.name == store.name) {
                return Err(StoreError::InvalidSchema {
                    store: store.name.to_string(),
                    reason: "registered twice".into(),
                });
            }
        }
        Ok(Self { stores })
    }

    pub fn get(&self, name: &str) -> Result<&StoreDef, StoreError> {
        self.stores
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn stores(&self) -> &[StoreDef] {
        &self.stores
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub name: String,
    pub version: u32,
    pub location: DatabaseLocation,
}

/// An open connection plus the catalog of stores it serves.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
    catalog: Arc<Catalog>,
    name: String,
}

impl Database {
    /// Opens the database and creates every catalog store when `config.version`
    /// is newer than the version recorded in the file.
    pub async fn open(config: &DatabaseConfig, catalog: Arc<Catalog>) -> Result<Self, StoreError> {
        let conn = match &config.location {
            DatabaseLocation::File(path) => {
                let conn = Connection::open(path).await?;
                conn.call(|conn| {
                    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                    Ok(())
                })
                .await?;
                conn
            }
            DatabaseLocation::Memory => Connection::open_in_memory().await?,
        };

        let requested = config.version;
        let upgrade = Arc::clone(&catalog);
        let upgraded_from = conn
            .call(move |conn| {
                let stored: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if requested < stored {
                    return Ok(Err(StoreError::VersionDowngrade { stored, requested }));
                }
                if requested == stored {
                    return Ok(Ok(None));
                }

                let tx = conn.transaction()?;
                for store in upgrade.stores() {
                    create_store(&tx, store)?;
                }
                tx.pragma_update(None, "user_version", requested)?;
                tx.commit()?;
                Ok(Ok(Some(stored)))
            })
            .await??;

        if let Some(stored) = upgraded_from {
            tracing::info!(
                "Upgraded database {} from version {} to {}",
                config.name,
                stored,
                requested
            );
        }

        Ok(Self {
            conn,
            catalog,
            name: config.name.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Runs `body` in a read-only transaction over `stores`.
    pub async fn transaction<T, F>(&self, stores: &[&str], body: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        self.run(stores, TransactionMode::ReadOnly, body).await
    }

    /// Runs `body` in a read-write transaction over `stores`.
    ///
    /// Either every write in `body` is committed or, when `body` or the
    /// engine fails, none is.
    pub async fn write_transaction<T, F>(&self, stores: &[&str], body: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        self.run(stores, TransactionMode::ReadWrite, body).await
    }

    async fn run<T, F>(&self, stores: &[&str], mode: TransactionMode, body: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        for name in stores {
            self.catalog.get(name)?;
        }
        let scope: Vec<String> = stores.iter().map(|s| s.to_string()).collect();
        let catalog = Arc::clone(&self.catalog);

        self.conn
            .call(move |conn| {
                let behavior = match mode {
                    TransactionMode::ReadOnly => TransactionBehavior::Deferred,
                    TransactionMode::ReadWrite => TransactionBehavior::Immediate,
                };
                let tx = conn.transaction_with_behavior(behavior)?;
                let outcome = body(&Transaction {
                    conn: &tx,
                    catalog: &catalog,
                    scope: &scope,
                    mode,
                });
                Ok(settle(tx, outcome))
            })
            .await?
    }
}

/// Commits `tx` when the body succeeded. A failed body or commit drops `tx`
/// uncommitted, which rolls it back; both surface as store errors.
fn settle<T>(tx: rusqlite::Transaction<'_>, outcome: Result<T, StoreError>) -> Result<T, StoreError> {
    let value = outcome?;
    tx.commit()?;
    Ok(value)
}
