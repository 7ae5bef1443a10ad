use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bodega_core::{ProductId, UserId, WarehouseId};

use crate::level::StockKey;
use crate::unit::Unit;

/// Store-assigned movement identifier; increases with commit order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub i64);

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A movement the ledger decided to record, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub key: StockKey,
    pub delta: i64,
    pub reason: String,
    pub actor_id: UserId,
}

/// Immutable audit record of one signed change to one stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub unit: Unit,
    pub delta: i64,
    pub reason: String,
    pub actor_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Materialize a draft with the identity and timestamp assigned at commit.
    pub fn committed(draft: NewMovement, id: MovementId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            warehouse_id: draft.key.warehouse_id,
            product_id: draft.key.product_id,
            unit: draft.key.unit,
            delta: draft.delta,
            reason: draft.reason,
            actor_id: draft.actor_id,
            created_at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id, self.unit)
    }
}
