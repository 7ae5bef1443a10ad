//! Stock ledger: the only writer of stock quantities.
//!
//! Every mutation follows the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate (pure, before any IO)
//!   ↓
//! 2. Resolve warehouse / product / actor ids in the Directory
//!   ↓
//! 3. Read the touched levels from the store
//!   ↓
//! 4. Plan (pure, produces level writes + movements)
//!   ↓
//! 5. Commit the plan atomically under its version expectations
//!   ↓   └─ Conflict → jittered backoff, back to 3, at most `max_commit_attempts` times
//! Receipt
//! ```
//!
//! Business failures (invalid input, unknown ids, insufficient stock) are
//! returned as values and never retried. Storage failures other than
//! conflicts propagate unchanged.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use bodega_core::DomainError;
use bodega_inventory::{
    AdjustStock, LedgerPlan, Movement, SetAbsoluteStock, StockKey, StockLevel, TransferStock,
    plan_adjust, plan_set_absolute, plan_transfer,
};

use crate::directory::{ActorRef, Directory, DirectoryError, ProductRef, WarehouseRef};
use crate::store::{CommittedPlan, StockStore, StoreError};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(5);
const MAX_RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Zero delta, blank reason, non-positive transfer quantity, same-warehouse
    /// transfer, negative target, overflow.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown {kind}: {reference}")]
    UnknownEntity { kind: &'static str, reference: String },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// The commit kept losing races until the retry budget ran out.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LedgerError::InvalidInput(msg)
            }
            DomainError::InsufficientStock {
                requested,
                available,
            } => LedgerError::InsufficientStock {
                requested,
                available,
            },
            DomainError::Conflict(msg) => LedgerError::ConcurrencyConflict(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::ConcurrencyConflict(msg),
            other => LedgerError::Storage(other),
        }
    }
}

impl From<DirectoryError> for LedgerError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::Unknown { kind, reference } => {
                LedgerError::UnknownEntity { kind, reference }
            }
            DirectoryError::Duplicate { kind, key } => {
                LedgerError::InvalidInput(format!("duplicate {kind}: {key}"))
            }
            DirectoryError::Unavailable(msg) => LedgerError::Storage(StoreError::Unavailable(msg)),
        }
    }
}

impl LedgerError {
    /// Whether the failure is a business outcome rather than an infrastructure fault.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidInput(_)
                | LedgerError::UnknownEntity { .. }
                | LedgerError::InsufficientStock { .. }
        )
    }
}

/// Outcome of `adjust` and `set_absolute`.
///
/// `movement` is `None` only when `set_absolute` found the triple already at
/// its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustReceipt {
    pub level: StockLevel,
    pub movement: Option<Movement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub success: bool,
    pub source: StockLevel,
    pub destination: StockLevel,
    pub outgoing: Movement,
    pub incoming: Movement,
}

enum Step {
    Commit(LedgerPlan),
    Unchanged(StockLevel),
}

enum Outcome {
    Committed(CommittedPlan),
    Unchanged(StockLevel),
}

#[derive(Debug, Clone)]
pub struct StockLedger<S, D> {
    store: S,
    directory: D,
    max_commit_attempts: u32,
    retry_backoff: Duration,
}

impl<S, D> StockLedger<S, D> {
    pub fn new(store: S, directory: D) -> Self {
        Self {
            store,
            directory,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Bound on read-plan-commit cycles per operation (at least one).
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    /// Base delay before re-planning after a conflict; doubles per attempt. Zero disables it.
    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.retry_backoff = base;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }
}

impl<S, D> StockLedger<S, D>
where
    S: StockStore,
    D: Directory,
{
    /// Apply a signed delta to one (warehouse, product, unit) triple.
    #[instrument(
        skip(self, cmd),
        fields(key = %cmd.key, delta = cmd.delta, actor = %cmd.actor_id),
        err
    )]
    pub async fn adjust(&self, cmd: AdjustStock) -> Result<AdjustReceipt, LedgerError> {
        cmd.validate()?;
        self.resolve_key(cmd.key, &ActorRef::Id(cmd.actor_id)).await?;

        let cmd = &cmd;
        let outcome = self
            .commit_with_retry("adjust", move || async move {
                let current = self.store.load_level(cmd.key).await?;
                Ok::<_, LedgerError>(Step::Commit(plan_adjust(cmd, current.as_ref())?))
            })
            .await?;

        let receipt = single_leg_receipt(outcome)?;
        info!(quantity = receipt.level.quantity, version = receipt.level.version, "stock adjusted");
        Ok(receipt)
    }

    /// Move `quantity` of a product from one warehouse to another.
    ///
    /// Both legs and both movements commit together or not at all.
    #[instrument(
        skip(self, cmd),
        fields(
            from = %cmd.from_warehouse_id,
            to = %cmd.to_warehouse_id,
            product = %cmd.product_id,
            quantity = cmd.quantity
        ),
        err
    )]
    pub async fn transfer(&self, cmd: TransferStock) -> Result<TransferReceipt, LedgerError> {
        cmd.validate()?;

        let source_wh = self
            .directory
            .resolve_warehouse(&WarehouseRef::Id(cmd.from_warehouse_id))
            .await?;
        let destination_wh = self
            .directory
            .resolve_warehouse(&WarehouseRef::Id(cmd.to_warehouse_id))
            .await?;
        self.directory
            .resolve_product(&ProductRef::Id(cmd.product_id))
            .await?;
        self.directory
            .resolve_actor(&ActorRef::Id(cmd.actor_id))
            .await?;

        let cmd = &cmd;
        let (source_wh, destination_wh) = (&source_wh, &destination_wh);
        let outcome = self
            .commit_with_retry("transfer", move || async move {
                let source = self.store.load_level(cmd.source_key()).await?;
                let destination = self.store.load_level(cmd.destination_key()).await?;
                Ok::<_, LedgerError>(Step::Commit(plan_transfer(
                    cmd,
                    source.as_ref(),
                    destination.as_ref(),
                    &source_wh.name,
                    &destination_wh.name,
                )?))
            })
            .await?;

        let committed = match outcome {
            Outcome::Committed(committed) => committed,
            Outcome::Unchanged(_) => {
                return Err(LedgerError::Storage(StoreError::Corrupt(
                    "transfer produced no writes".to_string(),
                )));
            }
        };
        let receipt = transfer_receipt(committed)?;
        info!(
            source_quantity = receipt.source.quantity,
            destination_quantity = receipt.destination.quantity,
            "stock transferred"
        );
        Ok(receipt)
    }

    /// Bring one triple to an absolute quantity.
    ///
    /// The delta is computed from the level read inside the same
    /// read-plan-commit cycle as the write. A triple already at the target
    /// is left untouched and no movement is logged.
    #[instrument(
        skip(self, cmd),
        fields(key = %cmd.key, target = cmd.target_quantity, actor = %cmd.actor_id),
        err
    )]
    pub async fn set_absolute(&self, cmd: SetAbsoluteStock) -> Result<AdjustReceipt, LedgerError> {
        cmd.validate()?;
        self.resolve_key(cmd.key, &ActorRef::Id(cmd.actor_id)).await?;

        let cmd = &cmd;
        let outcome = self
            .commit_with_retry("set_absolute", move || async move {
                let current = self.store.load_level(cmd.key).await?;
                match plan_set_absolute(cmd, current.as_ref())? {
                    Some(plan) => Ok::<_, LedgerError>(Step::Commit(plan)),
                    None => Ok(Step::Unchanged(
                        current.unwrap_or_else(|| StockLevel::untouched(cmd.key)),
                    )),
                }
            })
            .await?;

        let receipt = single_leg_receipt(outcome)?;
        match &receipt.movement {
            Some(m) => info!(delta = m.delta, quantity = receipt.level.quantity, "stock set"),
            None => info!(quantity = receipt.level.quantity, "stock already at target"),
        }
        Ok(receipt)
    }

    async fn resolve_key(&self, key: StockKey, actor: &ActorRef) -> Result<(), LedgerError> {
        self.directory
            .resolve_warehouse(&WarehouseRef::Id(key.warehouse_id))
            .await?;
        self.directory
            .resolve_product(&ProductRef::Id(key.product_id))
            .await?;
        self.directory.resolve_actor(actor).await?;
        Ok(())
    }

    async fn commit_with_retry<F, Fut>(
        &self,
        operation: &'static str,
        mut plan: F,
    ) -> Result<Outcome, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Step, LedgerError>>,
    {
        let mut last_conflict = String::new();
        for attempt in 1..=self.max_commit_attempts {
            let plan = match plan().await? {
                Step::Commit(plan) => plan,
                Step::Unchanged(level) => return Ok(Outcome::Unchanged(level)),
            };

            match self.store.commit(plan).await {
                Ok(committed) => return Ok(Outcome::Committed(committed)),
                Err(StoreError::Conflict(msg)) => {
                    warn!(operation, attempt, conflict = %msg, "commit lost a race, re-planning");
                    last_conflict = msg;
                    if attempt < self.max_commit_attempts {
                        let delay = retry_delay(self.retry_backoff, attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(other) => return Err(LedgerError::Storage(other)),
            }
        }

        warn!(operation, attempts = self.max_commit_attempts, "giving up after repeated conflicts");
        Err(LedgerError::ConcurrencyConflict(format!(
            "{operation} gave up after {} attempts: {last_conflict}",
            self.max_commit_attempts
        )))
    }
}

/// Exponential in `attempt`, capped, with the upper half jittered so racing
/// writers spread out.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let pow = 1u32 << attempt.saturating_sub(1).min(8);
    let ceiling = base.saturating_mul(pow).min(MAX_RETRY_BACKOFF);
    let micros = ceiling.as_micros() as u64;
    if micros == 0 {
        return Duration::ZERO;
    }
    let half = micros / 2;
    Duration::from_micros(half + rand::thread_rng().gen_range(0..=micros - half))
}

fn single_leg_receipt(outcome: Outcome) -> Result<AdjustReceipt, LedgerError> {
    match outcome {
        Outcome::Unchanged(level) => Ok(AdjustReceipt {
            level,
            movement: None,
        }),
        Outcome::Committed(committed) => {
            let level = committed.levels.into_iter().next();
            let movement = committed.movements.into_iter().next();
            match (level, movement) {
                (Some(level), Some(movement)) => Ok(AdjustReceipt {
                    level,
                    movement: Some(movement),
                }),
                _ => Err(LedgerError::Storage(StoreError::Corrupt(
                    "commit returned no level or movement".to_string(),
                ))),
            }
        }
    }
}

fn transfer_receipt(committed: CommittedPlan) -> Result<TransferReceipt, LedgerError> {
    let malformed = || {
        LedgerError::Storage(StoreError::Corrupt(
            "transfer commit did not return two legs".to_string(),
        ))
    };
    let [source, destination]: [StockLevel; 2] =
        committed.levels.try_into().map_err(|_| malformed())?;
    let [outgoing, incoming]: [Movement; 2] =
        committed.movements.try_into().map_err(|_| malformed())?;
    Ok(TransferReceipt {
        success: true,
        source,
        destination,
        outgoing,
        incoming,
    })
}
