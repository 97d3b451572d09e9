//! Subcommand implementations.
//!
//! Each command returns the text to print on success; errors carry the
//! [`LedgerError`] so `main` can pick an exit code by kind.

use anyhow::{Context, Result};

use stockledger_core::ItemId;
use stockledger_infra::{
    ItemDirectory, LedgerError, LedgerErrorKind, MovementPage, Pagination, StockLedger, StockStore,
};
use stockledger_inventory::StockSnapshot;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_ITEM_NOT_FOUND: u8 = 3;
pub const EXIT_INVALID_QUANTITY: u8 = 4;
pub const EXIT_INSUFFICIENT_STOCK: u8 = 5;
pub const EXIT_PERSISTENCE: u8 = 6;
pub const EXIT_INCONSISTENT: u8 = 7;

/// Exit code for a failed command: one per ledger error kind, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LedgerError>().map(LedgerError::kind) {
        Some(LedgerErrorKind::ItemNotFound) => EXIT_ITEM_NOT_FOUND,
        Some(LedgerErrorKind::InvalidQuantity) => EXIT_INVALID_QUANTITY,
        Some(LedgerErrorKind::InsufficientStock) => EXIT_INSUFFICIENT_STOCK,
        Some(LedgerErrorKind::PersistenceFailure) => EXIT_PERSISTENCE,
        Some(LedgerErrorKind::Inconsistent) => EXIT_INCONSISTENT,
        None => EXIT_FAILURE,
    }
}

fn describe(snapshot: &StockSnapshot) -> String {
    format!(
        "item {}: quantity {} (movements {})",
        snapshot.item_id(),
        snapshot.quantity(),
        snapshot.version()
    )
}

pub async fn increase<S, D>(
    ledger: &StockLedger<S, D>,
    item: ItemId,
    qty: i64,
    reason: Option<String>,
) -> Result<String>
where
    S: StockStore,
    D: ItemDirectory,
{
    let snapshot = ledger.increase(item, qty, reason.unwrap_or_default()).await?;
    Ok(describe(&snapshot))
}

pub async fn decrease<S, D>(
    ledger: &StockLedger<S, D>,
    item: ItemId,
    qty: i64,
    reason: Option<String>,
) -> Result<String>
where
    S: StockStore,
    D: ItemDirectory,
{
    let snapshot = ledger.decrease(item, qty, reason.unwrap_or_default()).await?;
    Ok(describe(&snapshot))
}

pub async fn adjust<S, D>(
    ledger: &StockLedger<S, D>,
    item: ItemId,
    delta: i64,
    reason: Option<String>,
) -> Result<String>
where
    S: StockStore,
    D: ItemDirectory,
{
    let snapshot = ledger.adjust(item, delta, reason.unwrap_or_default()).await?;
    Ok(describe(&snapshot))
}

pub async fn quantity<S, D>(ledger: &StockLedger<S, D>, item: ItemId) -> Result<String>
where
    S: StockStore,
    D: ItemDirectory,
{
    Ok(ledger.current_quantity(item).await?.to_string())
}

pub async fn history<S, D>(
    ledger: &StockLedger<S, D>,
    item: ItemId,
    limit: Option<u32>,
    offset: Option<u32>,
    json: bool,
) -> Result<String>
where
    S: StockStore,
    D: ItemDirectory,
{
    let page = ledger
        .history_page(item, Pagination::new(limit, offset))
        .await?;

    if json {
        return serde_json::to_string_pretty(&page).context("Failed to encode history as JSON");
    }
    Ok(render_page(&page))
}

fn render_page(page: &MovementPage) -> String {
    let mut lines = Vec::with_capacity(page.movements.len() + 2);
    lines.push(format!(
        "{:<8} {:<32} {:>10}  {}",
        "ID", "OCCURRED AT", "DELTA", "REASON"
    ));
    for movement in &page.movements {
        lines.push(format!(
            "{:<8} {:<32} {:>+10}  {}",
            movement.movement_id().to_string(),
            movement.occurred_at().to_rfc3339(),
            movement.signed_delta(),
            movement.reason()
        ));
    }

    let shown_to = u64::from(page.pagination.offset) + page.movements.len() as u64;
    let mut footer = format!("{} of {} movements", shown_to.min(page.total), page.total);
    if page.has_more {
        footer.push_str(&format!(" (more after offset {shown_to})"));
    }
    lines.push(footer);
    lines.join("\n")
}

/// A mismatch is reported as an `Inconsistent` failure so scripts can
/// detect it from the exit code.
pub async fn reconcile<S, D>(ledger: &StockLedger<S, D>, item: ItemId) -> Result<String>
where
    S: StockStore,
    D: ItemDirectory,
{
    let reconciliation = ledger.reconcile(item).await?;
    if !reconciliation.is_consistent() {
        return Err(LedgerError::Inconsistent {
            item_id: item,
            detail: format!(
                "snapshot says {} after {} movements, log replays to {} after {}",
                reconciliation.snapshot.quantity(),
                reconciliation.snapshot.version(),
                reconciliation.replayed.quantity(),
                reconciliation.replayed.version()
            ),
        }
        .into());
    }
    Ok(format!(
        "item {item}: consistent, quantity {} over {} movements",
        reconciliation.snapshot.quantity(),
        reconciliation.snapshot.version()
    ))
}
