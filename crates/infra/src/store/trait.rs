use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bodega_core::{ProductId, WarehouseId};
use bodega_inventory::{LedgerPlan, Movement, StockKey, StockLevel};

/// Result of committing a [`LedgerPlan`]: the levels as written and the
/// movements with their store-assigned ids and timestamps, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedPlan {
    pub levels: Vec<StockLevel>,
    pub movements: Vec<Movement>,
}

/// Filter for stock level reads. `None` fields do not constrain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub product_id: Option<ProductId>,
    /// Only levels with `quantity <= max_quantity`.
    pub max_quantity: Option<i64>,
}

impl LevelFilter {
    pub fn matches(&self, level: &StockLevel) -> bool {
        self.warehouse_id.is_none_or(|w| level.key.warehouse_id == w)
            && self.product_id.is_none_or(|p| level.key.product_id == p)
            && self.max_quantity.is_none_or(|max| level.quantity <= max)
    }
}

/// Filter for movement reads. `None` fields do not constrain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &Movement) -> bool {
        self.product_id.is_none_or(|p| movement.product_id == p)
            && self.warehouse_id.is_none_or(|w| movement.warehouse_id == w)
    }
}

/// Stock store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, insufficient stock), which never reach the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write's version expectation did not hold at commit time.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// The plan would break a storage constraint (negative quantity, zero delta, dangling reference).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The backing store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Transactional storage for stock levels and the movement log.
///
/// ## Commit contract
///
/// `commit()` applies every level write and appends every movement of a plan
/// as one atomic unit:
/// - each `LevelWrite::Initialize` requires the triple to be absent,
/// - each `LevelWrite::Update` requires the row to still be at its version,
/// - any failed expectation rejects the whole plan with `StoreError::Conflict`,
/// - nothing of a rejected plan is visible to any reader.
///
/// Movement ids increase with commit order; `created_at` is assigned by the store.
///
/// ## Reads
///
/// Reads observe committed state only.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Current row for a triple, `None` if it was never written.
    async fn load_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError>;

    /// Atomically commit a ledger plan under its concurrency expectations.
    async fn commit(&self, plan: LedgerPlan) -> Result<CommittedPlan, StoreError>;

    /// All rows matching the filter (unordered).
    async fn levels(&self, filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError>;

    /// Movements matching the filter, newest first, at most `limit`.
    async fn movements(
        &self,
        filter: MovementFilter,
        limit: u32,
    ) -> Result<Vec<Movement>, StoreError>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn load_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
        (**self).load_level(key).await
    }

    async fn commit(&self, plan: LedgerPlan) -> Result<CommittedPlan, StoreError> {
        (**self).commit(plan).await
    }

    async fn levels(&self, filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError> {
        (**self).levels(filter).await
    }

    async fn movements(
        &self,
        filter: MovementFilter,
        limit: u32,
    ) -> Result<Vec<Movement>, StoreError> {
        (**self).movements(filter, limit).await
    }
}
