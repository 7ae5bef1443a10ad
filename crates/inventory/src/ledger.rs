//! Ledger planning: pure decision logic for adjustments and transfers.
//!
//! - **Decide**: `plan_*` functions look at the levels currently stored and
//!   return a [`LedgerPlan`] (level writes + movements), or a domain error.
//! - **Commit**: infrastructure applies the plan atomically, checking each
//!   write's concurrency expectation.
//!
//! Planning never performs IO and never mutates its inputs.

use serde::{Deserialize, Serialize};

use bodega_core::{DomainError, DomainResult, ExpectedVersion, ProductId, UserId, WarehouseId};

use crate::level::{StockKey, StockLevel};
use crate::movement::NewMovement;
use crate::unit::Unit;

/// Command: apply a signed delta to one triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub key: StockKey,
    pub delta: i64,
    pub reason: String,
    pub actor_id: UserId,
}

/// Command: move `quantity` of one product between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub unit: Unit,
    pub quantity: i64,
    pub actor_id: UserId,
}

/// Command: bring one triple to an absolute quantity (bulk import path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAbsoluteStock {
    pub key: StockKey,
    pub target_quantity: i64,
    pub reason: String,
    pub actor_id: UserId,
}

fn validate_reason(reason: &str) -> DomainResult<()> {
    if reason.trim().is_empty() {
        return Err(DomainError::validation("reason cannot be empty"));
    }
    Ok(())
}

impl AdjustStock {
    pub fn validate(&self) -> DomainResult<()> {
        if self.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        validate_reason(&self.reason)
    }
}

impl TransferStock {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        if self.from_warehouse_id == self.to_warehouse_id {
            return Err(DomainError::validation(
                "source and destination warehouses must differ",
            ));
        }
        Ok(())
    }

    pub fn source_key(&self) -> StockKey {
        StockKey::new(self.from_warehouse_id, self.product_id, self.unit)
    }

    pub fn destination_key(&self) -> StockKey {
        self.source_key().in_warehouse(self.to_warehouse_id)
    }
}

impl SetAbsoluteStock {
    pub fn validate(&self) -> DomainResult<()> {
        if self.target_quantity < 0 {
            return Err(DomainError::validation("target quantity cannot be negative"));
        }
        validate_reason(&self.reason)
    }
}

/// A write to one stock level row.
///
/// The tag carries the concurrency contract: `Initialize` requires the row to
/// be absent at commit, `Update` requires it to still be at `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelWrite {
    Initialize { key: StockKey, quantity: i64 },
    Update { key: StockKey, version: u64, quantity: i64 },
}

impl LevelWrite {
    fn from_read(current: Option<&StockLevel>, key: StockKey, quantity: i64) -> Self {
        match StockLevel::expectation(current) {
            ExpectedVersion::Exact(version) => LevelWrite::Update {
                key,
                version,
                quantity,
            },
            ExpectedVersion::Absent => LevelWrite::Initialize { key, quantity },
        }
    }

    pub fn key(&self) -> StockKey {
        match self {
            LevelWrite::Initialize { key, .. } | LevelWrite::Update { key, .. } => *key,
        }
    }

    pub fn quantity(&self) -> i64 {
        match self {
            LevelWrite::Initialize { quantity, .. } | LevelWrite::Update { quantity, .. } => {
                *quantity
            }
        }
    }

    pub fn expected(&self) -> ExpectedVersion {
        match self {
            LevelWrite::Initialize { .. } => ExpectedVersion::Absent,
            LevelWrite::Update { version, .. } => ExpectedVersion::Exact(*version),
        }
    }

    /// The row as it reads once this write commits.
    pub fn resulting_level(&self) -> StockLevel {
        StockLevel {
            key: self.key(),
            quantity: self.quantity(),
            version: self.expected().next(),
        }
    }
}

/// Everything one ledger operation commits as a single atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerPlan {
    pub writes: Vec<LevelWrite>,
    pub movements: Vec<NewMovement>,
}

impl LedgerPlan {
    /// Sum of all movement deltas in the plan (zero for a transfer).
    pub fn net_delta(&self) -> i64 {
        self.movements.iter().map(|m| m.delta).sum()
    }

    pub fn resulting_levels(&self) -> Vec<StockLevel> {
        self.writes.iter().map(LevelWrite::resulting_level).collect()
    }
}

/// Apply `delta` to the current read of `key`, enforcing non-negativity.
///
/// A missing row is a zero baseline: a first negative delta is insufficient
/// stock, never clamped.
fn apply_delta(current: Option<&StockLevel>, key: StockKey, delta: i64) -> DomainResult<LevelWrite> {
    let available = StockLevel::quantity_of(current);
    let quantity = available
        .checked_add(delta)
        .ok_or_else(|| DomainError::validation("quantity overflow"))?;
    if quantity < 0 {
        return Err(DomainError::insufficient(delta.saturating_neg(), available));
    }
    Ok(LevelWrite::from_read(current, key, quantity))
}

fn ensure_read_matches(current: Option<&StockLevel>, key: StockKey) -> DomainResult<()> {
    match current {
        Some(level) if level.key != key => Err(DomainError::conflict(format!(
            "read level {} does not match planned key {}",
            level.key, key
        ))),
        _ => Ok(()),
    }
}

/// Decide the writes for an adjustment given the stored level (if any).
pub fn plan_adjust(cmd: &AdjustStock, current: Option<&StockLevel>) -> DomainResult<LedgerPlan> {
    cmd.validate()?;
    ensure_read_matches(current, cmd.key)?;

    let write = apply_delta(current, cmd.key, cmd.delta)?;
    Ok(LedgerPlan {
        writes: vec![write],
        movements: vec![NewMovement {
            key: cmd.key,
            delta: cmd.delta,
            reason: cmd.reason.trim().to_string(),
            actor_id: cmd.actor_id,
        }],
    })
}

/// Decide the writes for an absolute set. `Ok(None)` means the triple is
/// already at the target and nothing must be written.
pub fn plan_set_absolute(
    cmd: &SetAbsoluteStock,
    current: Option<&StockLevel>,
) -> DomainResult<Option<LedgerPlan>> {
    cmd.validate()?;

    let delta = cmd.target_quantity - StockLevel::quantity_of(current);
    if delta == 0 {
        return Ok(None);
    }

    let adjust = AdjustStock {
        key: cmd.key,
        delta,
        reason: cmd.reason.clone(),
        actor_id: cmd.actor_id,
    };
    plan_adjust(&adjust, current).map(Some)
}

/// Reason recorded on the outgoing leg of a transfer.
pub fn transfer_out_reason(destination_name: &str) -> String {
    format!("Transferencia a {destination_name}")
}

/// Reason recorded on the incoming leg of a transfer.
pub fn transfer_in_reason(source_name: &str) -> String {
    format!("Transferencia desde {source_name}")
}

/// Decide the two legs of a transfer given both stored levels.
///
/// Warehouse names are only used to build the human-readable reasons.
pub fn plan_transfer(
    cmd: &TransferStock,
    source: Option<&StockLevel>,
    destination: Option<&StockLevel>,
    source_name: &str,
    destination_name: &str,
) -> DomainResult<LedgerPlan> {
    cmd.validate()?;

    let source_key = cmd.source_key();
    let destination_key = cmd.destination_key();
    ensure_read_matches(source, source_key)?;
    ensure_read_matches(destination, destination_key)?;

    let outgoing = apply_delta(source, source_key, -cmd.quantity)?;
    let incoming = apply_delta(destination, destination_key, cmd.quantity)?;

    Ok(LedgerPlan {
        writes: vec![outgoing, incoming],
        movements: vec![
            NewMovement {
                key: source_key,
                delta: -cmd.quantity,
                reason: transfer_out_reason(destination_name),
                actor_id: cmd.actor_id,
            },
            NewMovement {
                key: destination_key,
                delta: cmd.quantity,
                reason: transfer_in_reason(source_name),
                actor_id: cmd.actor_id,
            },
        ],
    })
}
