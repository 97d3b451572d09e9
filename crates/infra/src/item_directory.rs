//! Item directory: the ledger's view of the item master data.
//!
//! The ledger only needs to know whether an item exists; creating, renaming
//! or deleting items is someone else's job.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use stockledger_core::ItemId;

use crate::stock_store::postgres::map_sqlx_error;
use crate::stock_store::StoreError;

/// Resolves item identity.
#[async_trait]
pub trait ItemDirectory: Send + Sync {
    async fn exists(&self, item_id: ItemId) -> Result<bool, StoreError>;
}

#[async_trait]
impl<D> ItemDirectory for Arc<D>
where
    D: ItemDirectory + ?Sized,
{
    async fn exists(&self, item_id: ItemId) -> Result<bool, StoreError> {
        (**self).exists(item_id).await
    }
}

/// In-memory item directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryItemDirectory {
    items: RwLock<HashSet<ItemId>>,
}

impl InMemoryItemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory that knows exactly `items`.
    pub fn with_items(items: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().collect()),
        }
    }

    pub fn register(&self, item_id: ItemId) -> Result<(), StoreError> {
        self.write()?.insert(item_id);
        Ok(())
    }

    pub fn remove(&self, item_id: ItemId) -> Result<(), StoreError> {
        self.write()?.remove(&item_id);
        Ok(())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashSet<ItemId>>, StoreError> {
        self.items
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl ItemDirectory for InMemoryItemDirectory {
    async fn exists(&self, item_id: ItemId) -> Result<bool, StoreError> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(items.contains(&item_id))
    }
}

/// Item directory backed by the `items` table.
#[derive(Debug, Clone)]
pub struct PostgresItemDirectory {
    pool: Arc<PgPool>,
}

impl PostgresItemDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ItemDirectory for PostgresItemDirectory {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn exists(&self, item_id: ItemId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM items WHERE id = $1)")
            .bind(item_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("item_exists", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_items_exist_until_removed() {
        let directory = InMemoryItemDirectory::new();
        let item_id = ItemId::new();

        assert!(!directory.exists(item_id).await.unwrap());
        directory.register(item_id).unwrap();
        assert!(directory.exists(item_id).await.unwrap());
        directory.remove(item_id).unwrap();
        assert!(!directory.exists(item_id).await.unwrap());
    }

    #[tokio::test]
    async fn poisoned_lock_fails_every_operation() {
        let directory = InMemoryItemDirectory::new();
        let item_id = ItemId::new();

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = directory.items.write().unwrap();
            panic!("writer panicked while holding the lock");
        }));
        assert!(poisoned.is_err());

        assert!(matches!(directory.register(item_id), Err(StoreError::Unavailable(_))));
        assert!(matches!(directory.remove(item_id), Err(StoreError::Unavailable(_))));
        assert!(matches!(directory.exists(item_id).await, Err(StoreError::Unavailable(_))));
    }
}
