use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::StoreError;
use crate::store::{Catalog, Database, DatabaseConfig, StoreDef};

use super::schema::bookmark_stores;

/// Lazily opens one shared [`Database`] and hands it to every caller.
///
/// Concurrent first calls to [`DatabaseHolder::database`] wait on the same
/// open; only one connection is ever created. A failed open is not cached,
/// so the next call tries again.
pub struct DatabaseHolder {
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    database: OnceCell<Database>,
}

impl DatabaseHolder {
    pub fn new(config: DatabaseConfig, stores: Vec<StoreDef>) -> Result<Self, StoreError> {
        Ok(Self {
            config,
            catalog: Arc::new(Catalog::new(stores)?),
            database: OnceCell::new(),
        })
    }

    /// A holder for the bookmark and tag stores.
    pub fn for_bookmarks(config: DatabaseConfig) -> Result<Self, StoreError> {
        Self::new(config, bookmark_stores()?)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.database.initialized()
    }

    pub async fn database(&self) -> Result<&Database, StoreError> {
        self.database
            .get_or_try_init(|| async {
                tracing::debug!(
                    "Opening database {} (version {})",
                    self.config.name,
                    self.config.version
                );
                Database::open(&self.config, Arc::clone(&self.catalog)).await
            })
            .await
    }
}
