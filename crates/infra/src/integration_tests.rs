//! Integration tests for the full adjustment pipeline.
//!
//! Tests: Ledger → ItemDirectory → StockStore (snapshot + movement log)
//!
//! Verifies:
//! - Snapshots always equal the replay of the movement log
//! - Rejected adjustments leave no trace
//! - Concurrent decreases never overdraw an item, even with a slow store

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use stockledger_core::ItemId;
    use stockledger_inventory::{Direction, Movement, NewMovement, Quantity, StockSnapshot};

    use crate::item_directory::InMemoryItemDirectory;
    use crate::ledger::{LedgerError, LedgerErrorKind, StockLedger};
    use crate::stock_store::{
        CommitOutcome, Decide, InMemoryStockStore, MovementPage, Pagination, StockStore, StoreError,
    };

    type Ledger = StockLedger<Arc<InMemoryStockStore>, Arc<InMemoryItemDirectory>>;

    fn setup() -> (Ledger, Arc<InMemoryStockStore>, Arc<InMemoryItemDirectory>) {
        let store = Arc::new(InMemoryStockStore::new());
        let directory = Arc::new(InMemoryItemDirectory::new());
        let ledger = StockLedger::new(store.clone(), directory.clone());
        (ledger, store, directory)
    }

    fn registered_item(directory: &InMemoryItemDirectory) -> ItemId {
        let item_id = ItemId::new();
        directory.register(item_id).unwrap();
        item_id
    }

    #[tokio::test]
    async fn restock_of_empty_item_records_one_inbound_movement() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);

        assert_eq!(ledger.current_quantity(item_id).await.unwrap(), Quantity::ZERO);

        let snapshot = ledger.increase(item_id, 10, "restock").await.unwrap();
        assert_eq!(snapshot.item_id(), item_id);
        assert_eq!(snapshot.quantity().get(), 10);

        assert_eq!(ledger.current_quantity(item_id).await.unwrap().get(), 10);
        let history = ledger.history(item_id).load().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].signed_delta(), 10);
        assert_eq!(history[0].direction(), Direction::In);
        assert_eq!(history[0].reason(), "restock");
    }

    #[tokio::test]
    async fn oversized_sale_is_rejected_and_history_stays_newest_first() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);
        ledger.increase(item_id, 10, "restock").await.unwrap();

        ledger.decrease(item_id, 4, "sale").await.unwrap();
        let err = ledger.decrease(item_id, 10, "sale").await.unwrap_err();

        match err {
            LedgerError::InsufficientStock {
                item_id: rejected,
                available,
                requested,
            } => {
                assert_eq!(rejected, item_id);
                assert_eq!(available, 6);
                assert_eq!(requested, 10);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(ledger.current_quantity(item_id).await.unwrap().get(), 6);
        let history = ledger.history(item_id).load().await.unwrap();
        let deltas: Vec<i64> = history.iter().map(|m| m.signed_delta()).collect();
        assert_eq!(deltas, vec![-4, 10]);
        assert!(history[0].occurred_at() >= history[1].occurred_at());
        assert!(history[0].movement_id() > history[1].movement_id());
    }

    #[tokio::test]
    async fn unknown_item_is_rejected_without_writes() {
        let (ledger, store, _) = setup();
        let item_id = ItemId::new();

        let err = ledger.adjust(item_id, 5, "restock").await.unwrap_err();

        assert_eq!(err.kind(), LedgerErrorKind::ItemNotFound);
        assert_eq!(err.item_id(), item_id);
        assert_eq!(store.load_snapshot(item_id).await.unwrap(), None);
        assert!(store.load_movements(item_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_and_non_positive_quantities_are_invalid() {
        let (ledger, store, directory) = setup();
        let item_id = registered_item(&directory);

        let attempts = [
            ledger.adjust(item_id, 0, "noop").await,
            ledger.increase(item_id, 0, "noop").await,
            ledger.increase(item_id, -3, "noop").await,
            ledger.decrease(item_id, 0, "noop").await,
            ledger.decrease(item_id, -3, "noop").await,
        ];

        for result in attempts {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), LedgerErrorKind::InvalidQuantity);
            assert!(!err.is_retryable());
        }
        assert_eq!(store.load_snapshot(item_id).await.unwrap(), None);
        assert!(store.load_movements(item_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_quantity_wins_over_unknown_item() {
        let (ledger, _, _) = setup();
        let err = ledger.adjust(ItemId::new(), 0, "").await.unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::InvalidQuantity);
    }

    #[tokio::test]
    async fn snapshot_matches_replayed_movements_after_mixed_adjustments() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);

        for delta in [7, -2, 5, -10, -1, 3, -4] {
            // Rejections are part of the sequence; they must not leave a trace.
            let _ = ledger.adjust(item_id, delta, "mixed").await;
        }

        let history = ledger.history(item_id).load().await.unwrap();
        let sum: i64 = history.iter().map(|m| m.signed_delta()).sum();
        let quantity = ledger.current_quantity(item_id).await.unwrap();
        assert_eq!(quantity.as_i64(), sum);

        let reconciliation = ledger.reconcile(item_id).await.unwrap();
        assert!(reconciliation.is_consistent());
        assert_eq!(reconciliation.replayed.version(), history.len() as u64);
    }

    #[tokio::test]
    async fn history_is_restartable_and_sees_later_movements() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);
        ledger.increase(item_id, 2, "restock").await.unwrap();

        let history = ledger.history(item_id);
        assert_eq!(history.load().await.unwrap().len(), 1);

        ledger.decrease(item_id, 1, "sale").await.unwrap();
        assert_eq!(history.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_pages_walk_newest_to_oldest() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);
        for qty in 1..=5 {
            ledger.increase(item_id, qty, format!("receipt {qty}")).await.unwrap();
        }

        let first = ledger
            .history_page(item_id, Pagination::new(Some(2), None))
            .await
            .unwrap();
        assert_eq!(first.total, 5);
        assert!(first.has_more);
        let reasons: Vec<&str> = first.movements.iter().map(|m| m.reason()).collect();
        assert_eq!(reasons, vec!["receipt 5", "receipt 4"]);

        let last = ledger
            .history_page(item_id, Pagination::new(Some(2), Some(4)))
            .await
            .unwrap();
        assert!(!last.has_more);
        assert_eq!(last.movements[0].reason(), "receipt 1");
    }

    #[tokio::test]
    async fn empty_reason_is_recorded_as_empty() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);

        ledger.increase(item_id, 1, String::new()).await.unwrap();

        let history = ledger.history(item_id).load().await.unwrap();
        assert_eq!(history[0].reason(), "");
    }

    #[tokio::test]
    async fn movements_serialize_with_magnitude_and_direction() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);
        ledger.increase(item_id, 3, "restock").await.unwrap();
        ledger.decrease(item_id, 2, "sale").await.unwrap();

        let history = ledger.history(item_id).load().await.unwrap();
        let json = serde_json::to_value(&history[0]).unwrap();

        assert_eq!(json["direction"], "OUT");
        assert_eq!(json["quantity"], 2);
        assert_eq!(json["reason"], "sale");
    }

    #[tokio::test]
    async fn items_are_independent() {
        let (ledger, _, directory) = setup();
        let a = registered_item(&directory);
        let b = registered_item(&directory);

        ledger.increase(a, 5, "restock").await.unwrap();
        let err = ledger.decrease(b, 1, "sale").await.unwrap_err();

        assert_eq!(err.kind(), LedgerErrorKind::InsufficientStock);
        assert_eq!(ledger.current_quantity(a).await.unwrap().get(), 5);
        assert!(ledger.snapshot(b).await.unwrap().is_none());
    }

    /// In-memory store that waits before every read and commit, like a
    /// remote database would.
    struct SlowStore {
        inner: Arc<InMemoryStockStore>,
        latency: Duration,
    }

    #[async_trait]
    impl StockStore for SlowStore {
        async fn load_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
            tokio::time::sleep(self.latency).await;
            self.inner.load_snapshot(item_id).await
        }

        async fn commit(
            &self,
            movement: NewMovement,
            decide: &Decide<'_>,
        ) -> Result<CommitOutcome, StoreError> {
            tokio::time::sleep(self.latency).await;
            self.inner.commit(movement, decide).await
        }

        async fn load_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
            self.inner.load_movements(item_id).await
        }

        async fn query_movements(
            &self,
            item_id: ItemId,
            pagination: Pagination,
        ) -> Result<MovementPage, StoreError> {
            self.inner.query_movements(item_id, pagination).await
        }
    }

    async fn race_decreases<S>(
        ledger: Arc<StockLedger<S, Arc<InMemoryItemDirectory>>>,
        item_id: ItemId,
        callers: usize,
    ) -> (usize, usize)
    where
        S: StockStore + 'static,
    {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.decrease(item_id, 1, "sale").await })
            })
            .collect();

        let mut successes = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::InsufficientStock { available, .. }) => {
                    assert_eq!(available, 0);
                    insufficient += 1;
                }
                Err(other) => panic!("unexpected failure: {other:?}"),
            }
        }
        (successes, insufficient)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decreases_never_overdraw() {
        const INITIAL: i64 = 5;
        const CALLERS: usize = 20;

        let (ledger, store, directory) = setup();
        let item_id = registered_item(&directory);
        ledger.increase(item_id, INITIAL, "restock").await.unwrap();

        let ledger = Arc::new(ledger);
        let (successes, insufficient) = race_decreases(ledger.clone(), item_id, CALLERS).await;

        assert_eq!(successes, INITIAL as usize);
        assert_eq!(insufficient, CALLERS - INITIAL as usize);
        assert_eq!(ledger.current_quantity(item_id).await.unwrap(), Quantity::ZERO);

        let movements = store.load_movements(item_id).await.unwrap();
        assert_eq!(movements.len(), 1 + INITIAL as usize);
        assert!(ledger.reconcile(item_id).await.unwrap().is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_store_under_contention_still_sells_every_unit() {
        const INITIAL: i64 = 40;
        const CALLERS: usize = 64;

        let inner = Arc::new(InMemoryStockStore::new());
        let directory = Arc::new(InMemoryItemDirectory::new());
        let item_id = registered_item(&directory);
        let store = SlowStore {
            inner: inner.clone(),
            latency: Duration::from_millis(1),
        };
        let ledger = Arc::new(StockLedger::new(store, directory));
        ledger.increase(item_id, INITIAL, "restock").await.unwrap();

        let (successes, insufficient) = race_decreases(ledger.clone(), item_id, CALLERS).await;

        assert_eq!(successes, INITIAL as usize);
        assert_eq!(insufficient, CALLERS - INITIAL as usize);
        assert_eq!(ledger.current_quantity(item_id).await.unwrap(), Quantity::ZERO);
        assert_eq!(
            inner.load_movements(item_id).await.unwrap().len(),
            1 + INITIAL as usize
        );
        assert!(ledger.reconcile(item_id).await.unwrap().is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mixed_adjustments_keep_snapshot_and_log_in_step() {
        let (ledger, _, directory) = setup();
        let item_id = registered_item(&directory);
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..40i64)
            .map(|i| {
                let ledger = ledger.clone();
                let delta = if i % 3 == 0 { -2 } else { 1 };
                tokio::spawn(async move { ledger.adjust(item_id, delta, "churn").await })
            })
            .collect();

        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => {}
                Err(err) => assert_eq!(err.kind(), LedgerErrorKind::InsufficientStock),
            }
        }

        let reconciliation = ledger.reconcile(item_id).await.unwrap();
        assert!(reconciliation.is_consistent());
    }
}
