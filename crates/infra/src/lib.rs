//! Infrastructure layer: stores, directory, ledger orchestration, queries,
//! import and configuration.

pub mod config;
pub mod directory;
pub mod import;
pub mod ledger;
pub mod query;
pub mod store;

mod integration_tests;

pub use config::{LedgerConfig, LedgerConfigError};
pub use directory::{
    ActorRecord, ActorRef, Directory, DirectoryError, InMemoryDirectory, PostgresDirectory,
    ProductRecord, ProductRef, WarehouseRecord, WarehouseRef,
};
pub use import::{ImportError, ImportReport, RowError, StockImporter, IMPORT_REASON, stock_template};
pub use ledger::{AdjustReceipt, LedgerError, StockLedger, TransferReceipt};
pub use query::{
    MovementView, OverviewFilter, ProductStock, StockLevelView, StockQuery, WarehouseQuantity,
    group_by_product,
};
pub use store::{
    CommittedPlan, InMemoryStockStore, LevelFilter, MovementFilter, PostgresStockStore,
    StockStore, StoreError,
};
