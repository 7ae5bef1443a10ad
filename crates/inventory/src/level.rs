use serde::{Deserialize, Serialize};

use bodega_core::{ExpectedVersion, ProductId, WarehouseId};

use crate::unit::Unit;

/// Identity of a stock level: the (warehouse, product, unit) triple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub unit: Unit,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, product_id: ProductId, unit: Unit) -> Self {
        Self {
            warehouse_id,
            product_id,
            unit,
        }
    }

    /// Same product and unit, different warehouse.
    pub fn in_warehouse(self, warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            ..self
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.warehouse_id, self.product_id, self.unit)
    }
}

/// Current quantity of one triple.
///
/// `version` is the optimistic concurrency token: 1 after the first write,
/// +1 per committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub key: StockKey,
    pub quantity: i64,
    pub version: u64,
}

impl StockLevel {
    /// Quantity of a level that may not exist yet. Never-touched triples hold zero.
    pub fn quantity_of(level: Option<&StockLevel>) -> i64 {
        level.map(|l| l.quantity).unwrap_or(0)
    }

    /// Concurrency expectation for a write based on this read.
    pub fn expectation(level: Option<&StockLevel>) -> ExpectedVersion {
        ExpectedVersion::from_read(level.map(|l| l.version))
    }

    /// Read-side value for a triple with no row: zero quantity, no version.
    pub fn untouched(key: StockKey) -> Self {
        Self {
            key,
            quantity: 0,
            version: 0,
        }
    }
}
