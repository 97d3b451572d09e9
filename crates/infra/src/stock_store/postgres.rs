//! Postgres-backed stock store.
//!
//! Schema: see `migrations/0001_stock_ledger.sql`.
//!
//! ## Atomic commit
//!
//! `commit()` runs one transaction:
//! 1. seed a zero snapshot row if the item has none
//!    (`INSERT … ON CONFLICT DO NOTHING`)
//! 2. lock it with `SELECT … FOR UPDATE` and run the caller's decision on it
//! 3. overwrite the snapshot and insert the movement
//!
//! Competing commits for the same item queue on the row lock in step 2, so
//! each one decides against the latest committed quantity. A rejection rolls
//! the transaction back, taking the seeded row with it. Only backend aborts
//! (serialization failure, deadlock) surface as `Conflict`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `MissingItem` |
//! | Database (check violation) | `23514` | `Corrupt` |
//! | Database (other) | any | `Backend` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockledger_core::{ItemId, MovementId};
use stockledger_inventory::{Movement, NewMovement, Quantity, StockChange, StockSnapshot};

use super::query::{MovementPage, Pagination};
use super::r#trait::{CommitOutcome, CommittedAdjustment, Decide, StockStore, StoreError};

/// Postgres-backed stock store.
///
/// `Send + Sync`; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn load_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT item_id, quantity, version
            FROM stock_snapshots
            WHERE item_id = $1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_snapshot", e))?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    #[instrument(
        skip(self, movement, decide),
        fields(item_id = %movement.item_id, delta = movement.change.signed_delta()),
        err
    )]
    async fn commit(
        &self,
        movement: NewMovement,
        decide: &Decide<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        let item_id = movement.item_id;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_snapshot(&mut tx, item_id).await?;
        let snapshot = match decide(&current) {
            Ok(next) => next,
            Err(rejection) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Ok(CommitOutcome::Rejected(rejection));
            }
        };

        write_snapshot(&mut tx, &snapshot).await?;
        let movement = insert_movement(&mut tx, movement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommitOutcome::Committed(CommittedAdjustment { snapshot, movement }))
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn load_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, quantity, direction, reason, occurred_at
            FROM stock_movements
            WHERE item_id = $1
            ORDER BY occurred_at DESC, id DESC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn query_movements(
        &self,
        item_id: ItemId,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM stock_movements WHERE item_id = $1")
            .bind(item_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let rows = sqlx::query(
            r#"
            SELECT id, item_id, quantity, direction, reason, occurred_at
            FROM stock_movements
            WHERE item_id = $1
            ORDER BY occurred_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(item_id.as_uuid())
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementPage::new(movements, total.max(0) as u64, pagination))
    }
}

/// Lock the item's snapshot row for the rest of the transaction, creating a
/// zero row first if the item never moved.
async fn lock_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    item_id: ItemId,
) -> Result<StockSnapshot, StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_snapshots (item_id, quantity, version, updated_at)
        VALUES ($1, 0, 0, NOW())
        ON CONFLICT (item_id) DO NOTHING
        "#,
    )
    .bind(item_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("seed_snapshot", e))?;

    let row = sqlx::query(
        r#"
        SELECT item_id, quantity, version
        FROM stock_snapshots
        WHERE item_id = $1
        FOR UPDATE
        "#,
    )
    .bind(item_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_snapshot", e))?;

    snapshot_from_row(&row)
}

/// Overwrite the locked snapshot row with the decided state.
async fn write_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    snapshot: &StockSnapshot,
) -> Result<(), StoreError> {
    let item_id = snapshot.item_id();
    let result = sqlx::query(
        r#"
        UPDATE stock_snapshots
        SET quantity = $2, version = $3, updated_at = NOW()
        WHERE item_id = $1
        "#,
    )
    .bind(item_id.as_uuid())
    .bind(snapshot.quantity().as_i64())
    .bind(version_to_i64(snapshot.version())?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_snapshot", e))?;

    if result.rows_affected() != 1 {
        return Err(StoreError::Backend(format!(
            "item {item_id}: locked snapshot row vanished before write"
        )));
    }
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: NewMovement,
) -> Result<Movement, StoreError> {
    // Magnitudes are bounded by `i64::MAX` at construction.
    let quantity = movement.change.magnitude() as i64;

    let row = sqlx::query(
        r#"
        INSERT INTO stock_movements (item_id, quantity, direction, reason, occurred_at)
        VALUES ($1, $2, $3, $4, clock_timestamp())
        RETURNING id, occurred_at
        "#,
    )
    .bind(movement.item_id.as_uuid())
    .bind(quantity)
    .bind(movement.change.direction().as_str())
    .bind(&movement.reason)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;

    let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("insert_movement", e))?;
    let occurred_at: DateTime<Utc> = row
        .try_get("occurred_at")
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
    let id = MovementId::try_from(id).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(movement.committed(id, occurred_at))
}

fn version_to_i64(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("snapshot version {version} out of range")))
}

fn snapshot_from_row(row: &PgRow) -> Result<StockSnapshot, StoreError> {
    SnapshotRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_snapshot", e))?
        .try_into()
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    MovementRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_movement", e))?
        .try_into()
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // Serialization failure, deadlock, unique violation (racing insert).
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::MissingItem(msg),
                Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("undecodable row in {operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug, Clone, PartialEq, Eq)]
struct SnapshotRow {
    item_id: uuid::Uuid,
    quantity: i64,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for SnapshotRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SnapshotRow {
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<SnapshotRow> for StockSnapshot {
    type Error = StoreError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let item_id = ItemId::from_uuid(row.item_id);
        let quantity = Quantity::try_from(row.quantity)
            .map_err(|e| StoreError::Corrupt(format!("item {item_id}: {e}")))?;
        let version = u64::try_from(row.version)
            .map_err(|_| StoreError::Corrupt(format!("item {item_id}: negative version {}", row.version)))?;
        Ok(StockSnapshot::from_stored(item_id, quantity, version))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MovementRow {
    id: i64,
    item_id: uuid::Uuid,
    quantity: i64,
    direction: String,
    reason: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            direction: row.try_get("direction")?,
            reason: row.try_get("reason")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let id = MovementId::try_from(row.id).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let direction = row
            .direction
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("movement {id}: {e}")))?;
        let change = StockChange::new(direction, row.quantity)
            .map_err(|e| StoreError::Corrupt(format!("movement {id}: {e}")))?;
        Ok(Movement::from_stored(
            id,
            ItemId::from_uuid(row.item_id),
            change,
            row.reason,
            row.occurred_at,
        ))
    }
}
