//! Read side: stock levels and movements joined with directory data.
//!
//! Queries observe committed state only and never write.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use bodega_core::{ProductId, UserId, WarehouseId};
use bodega_inventory::{Movement, StockKey, StockLevel, Unit};

use crate::directory::{Directory, ProductRecord, WarehouseRecord};
use crate::ledger::LedgerError;
use crate::store::{LevelFilter, MovementFilter, StockStore};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 1000;
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewFilter {
    /// Case-insensitive match against product name, sku or company.
    pub search: Option<String>,
    pub warehouse_id: Option<WarehouseId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelView {
    pub product: ProductRecord,
    pub warehouse: WarehouseRecord,
    pub unit: Unit,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseQuantity {
    pub warehouse: WarehouseRecord,
    pub unit: Unit,
    pub quantity: i64,
}

/// One product with its quantity in every warehouse that holds a level for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product: ProductRecord,
    pub warehouses: Vec<WarehouseQuantity>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementView {
    pub movement: Movement,
    pub product: ProductRecord,
    pub warehouse: WarehouseRecord,
    /// `None` when the actor is no longer known to the directory.
    pub actor_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StockQuery<S, D> {
    store: S,
    directory: D,
    history_limit: u32,
    low_stock_threshold: i64,
}

impl<S, D> StockQuery<S, D> {
    pub fn new(store: S, directory: D) -> Self {
        Self {
            store,
            directory,
            history_limit: DEFAULT_HISTORY_LIMIT,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold.max(0);
        self
    }
}

/// Group overview rows by product, keeping the order in which products first appear.
pub fn group_by_product(views: &[StockLevelView]) -> Vec<ProductStock> {
    let mut grouped: Vec<ProductStock> = Vec::new();
    let mut index: HashMap<ProductId, usize> = HashMap::new();

    for view in views {
        let slot = *index.entry(view.product.id).or_insert_with(|| {
            grouped.push(ProductStock {
                product: view.product.clone(),
                warehouses: Vec::new(),
                total: 0,
            });
            grouped.len() - 1
        });
        let entry = &mut grouped[slot];
        entry.warehouses.push(WarehouseQuantity {
            warehouse: view.warehouse.clone(),
            unit: view.unit,
            quantity: view.quantity,
        });
        entry.total += view.quantity;
    }

    grouped
}

fn matches_search(product: &ProductRecord, needle: &str) -> bool {
    [&product.name, &product.sku, &product.company]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

fn by_product_then_warehouse(a: &StockLevelView, b: &StockLevelView) -> std::cmp::Ordering {
    a.product
        .name
        .cmp(&b.product.name)
        .then_with(|| a.warehouse.name.cmp(&b.warehouse.name))
        .then_with(|| a.unit.as_str().cmp(b.unit.as_str()))
}

impl<S, D> StockQuery<S, D>
where
    S: StockStore,
    D: Directory,
{
    /// Current levels joined with product and warehouse, ordered by product
    /// name then warehouse name.
    #[instrument(skip(self), err)]
    pub async fn overview(&self, filter: &OverviewFilter) -> Result<Vec<StockLevelView>, LedgerError> {
        let levels = self
            .store
            .levels(LevelFilter {
                warehouse_id: filter.warehouse_id,
                ..Default::default()
            })
            .await?;

        let mut views = self.join_levels(levels).await?;
        if let Some(needle) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let needle = needle.to_lowercase();
            views.retain(|v| matches_search(&v.product, &needle));
        }
        views.sort_by(by_product_then_warehouse);
        Ok(views)
    }

    /// Movements newest first. `limit` falls back to the configured default
    /// and is capped at [`MAX_HISTORY_LIMIT`].
    #[instrument(skip(self), err)]
    pub async fn history(
        &self,
        filter: MovementFilter,
        limit: Option<u32>,
    ) -> Result<Vec<MovementView>, LedgerError> {
        let limit = limit.unwrap_or(self.history_limit).min(MAX_HISTORY_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let movements = self.store.movements(filter, limit).await?;

        let product_ids: Vec<ProductId> = movements
            .iter()
            .map(|m| m.product_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let actor_ids: Vec<UserId> = movements
            .iter()
            .map(|m| m.actor_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let products = self.products_by_id(&product_ids).await?;
        let warehouses = self.warehouses_by_id().await?;
        let actors: HashMap<UserId, String> = self
            .directory
            .actors_by_ids(&actor_ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a.email))
            .collect();

        let mut views = Vec::with_capacity(movements.len());
        for movement in movements {
            let (Some(product), Some(warehouse)) = (
                products.get(&movement.product_id),
                warehouses.get(&movement.warehouse_id),
            ) else {
                warn!(movement_id = %movement.id, "movement references unknown product or warehouse");
                continue;
            };
            views.push(MovementView {
                product: product.clone(),
                warehouse: warehouse.clone(),
                actor_email: actors.get(&movement.actor_id).cloned(),
                movement,
            });
        }
        Ok(views)
    }

    /// Levels at or below `threshold` (configured default when `None`),
    /// lowest quantity first.
    #[instrument(skip(self), err)]
    pub async fn low_stock_alerts(&self, threshold: Option<i64>) -> Result<Vec<StockLevelView>, LedgerError> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        let levels = self
            .store
            .levels(LevelFilter {
                max_quantity: Some(threshold),
                ..Default::default()
            })
            .await?;

        let mut views = self.join_levels(levels).await?;
        views.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| by_product_then_warehouse(a, b)));
        Ok(views)
    }

    /// All warehouses ordered by name.
    pub async fn warehouses(&self) -> Result<Vec<WarehouseRecord>, LedgerError> {
        Ok(self.directory.warehouses().await?)
    }

    /// Levels of one product across warehouses, ordered by warehouse name.
    #[instrument(skip(self), err)]
    pub async fn product_stock(&self, product_id: ProductId) -> Result<Vec<StockLevelView>, LedgerError> {
        let levels = self
            .store
            .levels(LevelFilter {
                product_id: Some(product_id),
                ..Default::default()
            })
            .await?;
        let mut views = self.join_levels(levels).await?;
        views.sort_by(by_product_then_warehouse);
        Ok(views)
    }

    /// One level; a triple that was never written reads as quantity 0.
    pub async fn stock_level(&self, key: StockKey) -> Result<StockLevel, LedgerError> {
        Ok(self
            .store
            .load_level(key)
            .await?
            .unwrap_or_else(|| StockLevel::untouched(key)))
    }

    /// Sum of a product's quantity across all warehouses and units.
    pub async fn total_stock(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        let levels = self
            .store
            .levels(LevelFilter {
                product_id: Some(product_id),
                ..Default::default()
            })
            .await?;
        Ok(levels.iter().map(|l| l.quantity).sum())
    }

    async fn products_by_id(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductRecord>, LedgerError> {
        Ok(self
            .directory
            .products_by_ids(ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    async fn warehouses_by_id(&self) -> Result<HashMap<WarehouseId, WarehouseRecord>, LedgerError> {
        Ok(self
            .directory
            .warehouses()
            .await?
            .into_iter()
            .map(|w| (w.id, w))
            .collect())
    }

    async fn join_levels(&self, levels: Vec<StockLevel>) -> Result<Vec<StockLevelView>, LedgerError> {
        let product_ids: Vec<ProductId> = levels
            .iter()
            .map(|l| l.key.product_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self.products_by_id(&product_ids).await?;
        let warehouses = self.warehouses_by_id().await?;

        let mut views = Vec::with_capacity(levels.len());
        for level in levels {
            let (Some(product), Some(warehouse)) = (
                products.get(&level.key.product_id),
                warehouses.get(&level.key.warehouse_id),
            ) else {
                warn!(key = %level.key, "stock level references unknown product or warehouse");
                continue;
            };
            views.push(StockLevelView {
                product: product.clone(),
                warehouse: warehouse.clone(),
                unit: level.key.unit,
                quantity: level.quantity,
            });
        }
        Ok(views)
    }
}
