use std::io::Read;
use std::time::Duration;

use anyhow::{Context, bail};

use bodega_infra::{
    ActorRef, Directory, LedgerConfig, MovementFilter, OverviewFilter, PostgresDirectory,
    PostgresStockStore, ProductRef, StockImporter, StockLedger, StockQuery, WarehouseRef,
    group_by_product,
};
use bodega_inventory::{AdjustStock, SetAbsoluteStock, StockKey, TransferStock};

use crate::commands::{Commands, Register, Target};
use crate::output;

pub struct App {
    ledger: StockLedger<PostgresStockStore, PostgresDirectory>,
    query: StockQuery<PostgresStockStore, PostgresDirectory>,
}

impl App {
    pub fn new(store: PostgresStockStore, directory: PostgresDirectory, config: &LedgerConfig) -> Self {
        Self {
            ledger: StockLedger::new(store.clone(), directory.clone())
                .with_max_commit_attempts(config.max_commit_attempts)
                .with_retry_backoff(Duration::from_millis(config.retry_backoff_ms)),
            query: StockQuery::new(store, directory)
                .with_history_limit(config.history_limit)
                .with_low_stock_threshold(config.low_stock_threshold),
        }
    }

    fn directory(&self) -> &PostgresDirectory {
        self.ledger.directory()
    }

    async fn key(&self, target: &Target) -> anyhow::Result<StockKey> {
        let warehouse = self
            .directory()
            .resolve_warehouse(&WarehouseRef::parse(&target.warehouse))
            .await?;
        let product = self
            .directory()
            .resolve_product(&ProductRef::parse(&target.product))
            .await?;
        Ok(StockKey::new(warehouse.id, product.id, target.unit))
    }

    async fn actor(&self, raw: &str) -> anyhow::Result<bodega_core::UserId> {
        Ok(self.directory().resolve_actor(&ActorRef::parse(raw)).await?.id)
    }

    pub async fn run(&self, command: Commands, json: bool) -> anyhow::Result<()> {
        match command {
            Commands::Migrate => {
                self.ledger.store().ensure_schema().await?;
                output::message(json, "schema is up to date");
            }
            Commands::Register(register) => self.register(register, json).await?,
            Commands::Adjust {
                target,
                delta,
                reason,
                actor,
            } => {
                let receipt = self
                    .ledger
                    .adjust(AdjustStock {
                        key: self.key(&target).await?,
                        delta,
                        reason,
                        actor_id: self.actor(&actor).await?,
                    })
                    .await?;
                output::adjust_receipt(json, &receipt)?;
            }
            Commands::Transfer {
                from,
                to,
                product,
                quantity,
                unit,
                actor,
            } => {
                let dir = self.directory();
                let from = dir.resolve_warehouse(&WarehouseRef::parse(&from)).await?;
                let to = dir.resolve_warehouse(&WarehouseRef::parse(&to)).await?;
                let product = dir.resolve_product(&ProductRef::parse(&product)).await?;
                let receipt = self
                    .ledger
                    .transfer(TransferStock {
                        from_warehouse_id: from.id,
                        to_warehouse_id: to.id,
                        product_id: product.id,
                        unit,
                        quantity,
                        actor_id: self.actor(&actor).await?,
                    })
                    .await?;
                output::transfer_receipt(json, &receipt)?;
            }
            Commands::Set {
                target,
                quantity,
                reason,
                actor,
            } => {
                let receipt = self
                    .ledger
                    .set_absolute(SetAbsoluteStock {
                        key: self.key(&target).await?,
                        target_quantity: quantity,
                        reason,
                        actor_id: self.actor(&actor).await?,
                    })
                    .await?;
                output::adjust_receipt(json, &receipt)?;
            }
            Commands::Import { file, actor } => {
                let input = read_input(&file)?;
                let actor_id = self.actor(&actor).await?;
                let report = StockImporter::new(&self.ledger)
                    .import_stock(&input, actor_id)
                    .await?;
                output::import_report(json, &report)?;
                if !report.errors.is_empty() {
                    bail!("{} row(s) rejected", report.errors.len());
                }
            }
            Commands::Template => print!("{}", bodega_infra::stock_template()),
            Commands::Overview {
                search,
                warehouse,
                grouped,
            } => {
                let warehouse_id = match warehouse {
                    Some(raw) => Some(
                        self.directory()
                            .resolve_warehouse(&WarehouseRef::parse(&raw))
                            .await?
                            .id,
                    ),
                    None => None,
                };
                let views = self
                    .query
                    .overview(&OverviewFilter {
                        search,
                        warehouse_id,
                    })
                    .await?;
                if grouped {
                    output::product_stock(json, &group_by_product(&views))?;
                } else {
                    output::levels(json, &views)?;
                }
            }
            Commands::History {
                product,
                warehouse,
                limit,
            } => {
                let mut filter = MovementFilter::default();
                if let Some(raw) = product {
                    filter.product_id = Some(
                        self.directory()
                            .resolve_product(&ProductRef::parse(&raw))
                            .await?
                            .id,
                    );
                }
                if let Some(raw) = warehouse {
                    filter.warehouse_id = Some(
                        self.directory()
                            .resolve_warehouse(&WarehouseRef::parse(&raw))
                            .await?
                            .id,
                    );
                }
                let history = self.query.history(filter, limit).await?;
                output::history(json, &history)?;
            }
            Commands::Alerts { threshold } => {
                let alerts = self.query.low_stock_alerts(threshold).await?;
                output::levels(json, &alerts)?;
            }
            Commands::Warehouses => {
                output::warehouses(json, &self.query.warehouses().await?)?;
            }
            Commands::Level { target } => {
                let level = self.query.stock_level(self.key(&target).await?).await?;
                output::level(json, &level)?;
            }
            Commands::Total { product } => {
                let product = self
                    .directory()
                    .resolve_product(&ProductRef::parse(&product))
                    .await?;
                let total = self.query.total_stock(product.id).await?;
                output::total(json, &product, total)?;
            }
        }
        Ok(())
    }

    async fn register(&self, register: Register, json: bool) -> anyhow::Result<()> {
        let dir = self.directory();
        match register {
            Register::Warehouse { code, name } => {
                output::record(json, &dir.register_warehouse(&code, &name).await?)
            }
            Register::Product { sku, name, company } => {
                output::record(json, &dir.register_product(&sku, &name, &company).await?)
            }
            Register::User { email } => output::record(json, &dir.register_actor(&email).await?),
        }
    }
}

fn read_input(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {file}"))
}
