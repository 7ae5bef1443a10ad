//! Bulk stock import from CSV.
//!
//! Each data row sets one (warehouse, product, BOTTLE) triple to an absolute
//! quantity through [`StockLedger::set_absolute`]. Rows are independent
//! atomic units: a failing row is reported and the import carries on.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use bodega_core::UserId;
use bodega_inventory::{SetAbsoluteStock, StockKey, Unit};

use crate::directory::{Directory, ProductRef, WarehouseRef};
use crate::ledger::StockLedger;
use crate::store::StockStore;

pub const IMPORT_REASON: &str = "Importación CSV";

const REQUIRED_COLUMNS: [&str; 3] = ["sku", "warehouseCode", "quantity"];

const STOCK_TEMPLATE: &str = "sku,warehouseCode,quantity\nMAL001,DC01,100\nMAL001,DS01,50\nCAB002,DC01,75\n";

/// Sample CSV with the expected header.
pub fn stock_template() -> &'static str {
    STOCK_TEMPLATE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line number in the input, header included.
    pub row: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Rows applied, including those already at their target.
    pub success: u32,
    /// Successful rows that needed no change.
    pub skipped: u32,
    pub errors: Vec<RowError>,
}

/// Failures that stop the import before any row is applied.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("unreadable csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct StockRow {
    sku: Option<String>,
    #[serde(rename = "warehouseCode")]
    warehouse_code: Option<String>,
    quantity: Option<String>,
}

fn required(value: Option<String>, column: &str) -> Result<String, String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {column}"))
}

fn parse_quantity(raw: &str) -> Result<i64, String> {
    match raw.parse::<i64>() {
        Ok(q) if q >= 0 => Ok(q),
        Ok(_) => Err(format!("quantity must be non-negative, got {raw}")),
        Err(_) => Err(format!("quantity must be a whole number, got '{raw}'")),
    }
}

pub struct StockImporter<'a, S, D> {
    ledger: &'a StockLedger<S, D>,
}

enum RowOutcome {
    Changed,
    Unchanged,
}

impl<'a, S, D> StockImporter<'a, S, D>
where
    S: StockStore,
    D: Directory,
{
    pub fn new(ledger: &'a StockLedger<S, D>) -> Self {
        Self { ledger }
    }

    #[instrument(skip(self, input), fields(actor = %actor_id), err)]
    pub async fn import_stock(&self, input: &str, actor_id: UserId) -> Result<ImportReport, ImportError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(input.as_bytes());

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(ImportError::MissingColumn(column));
            }
        }

        let mut report = ImportReport::default();
        for (idx, record) in reader.records().enumerate() {
            let fallback_row = idx as u64 + 2;
            let (row, outcome) = match record {
                Ok(record) => {
                    let row = record.position().map_or(fallback_row, |p| p.line());
                    (row, self.apply_row(&headers, &record, actor_id).await)
                }
                Err(e) => (
                    e.position().map_or(fallback_row, |p| p.line()),
                    Err(e.to_string()),
                ),
            };

            match outcome {
                Ok(RowOutcome::Changed) => report.success += 1,
                Ok(RowOutcome::Unchanged) => {
                    report.success += 1;
                    report.skipped += 1;
                }
                Err(message) => {
                    warn!(row, %message, "import row rejected");
                    report.errors.push(RowError { row, message });
                }
            }
        }

        info!(
            success = report.success,
            skipped = report.skipped,
            errors = report.errors.len(),
            "stock import finished"
        );
        Ok(report)
    }

    async fn apply_row(
        &self,
        headers: &StringRecord,
        record: &StringRecord,
        actor_id: UserId,
    ) -> Result<RowOutcome, String> {
        let row: StockRow = record.deserialize(Some(headers)).map_err(|e| e.to_string())?;
        let sku = required(row.sku, "sku")?;
        let code = required(row.warehouse_code, "warehouseCode")?;
        let quantity = parse_quantity(&required(row.quantity, "quantity")?)?;

        let directory = self.ledger.directory();
        let product = directory
            .resolve_product(&ProductRef::Sku(sku))
            .await
            .map_err(|e| e.to_string())?;
        let warehouse = directory
            .resolve_warehouse(&WarehouseRef::Code(code))
            .await
            .map_err(|e| e.to_string())?;

        let receipt = self
            .ledger
            .set_absolute(SetAbsoluteStock {
                key: StockKey::new(warehouse.id, product.id, Unit::Bottle),
                target_quantity: quantity,
                reason: IMPORT_REASON.to_string(),
                actor_id,
            })
            .await
            .map_err(|e| e.to_string())?;

        Ok(match receipt.movement {
            Some(_) => RowOutcome::Changed,
            None => RowOutcome::Unchanged,
        })
    }
}
