//! Transactional stock storage boundary.
//!
//! Stock levels and the append-only movement log are written together through
//! [`StockStore::commit`], never separately.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::{PostgresStockStore, SCHEMA};
pub use r#trait::{CommittedPlan, LevelFilter, MovementFilter, StockStore, StoreError};
