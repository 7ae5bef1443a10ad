//! Inventory domain module (stock ledger).
//!
//! This crate contains the business rules for stock levels and movements,
//! implemented purely as deterministic domain logic (no IO, no storage).
//! Infrastructure reads the current levels, asks this crate for a
//! [`LedgerPlan`], and commits the plan atomically.

pub mod ledger;
pub mod level;
pub mod movement;
pub mod unit;

pub use ledger::{
    AdjustStock, LedgerPlan, LevelWrite, SetAbsoluteStock, TransferStock, plan_adjust,
    plan_set_absolute, plan_transfer,
};
pub use level::{StockKey, StockLevel};
pub use movement::{Movement, MovementId, NewMovement};
pub use unit::Unit;
