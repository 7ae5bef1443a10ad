//! Human and JSON rendering of command results (stdout).

use serde::Serialize;

use bodega_infra::{
    AdjustReceipt, ImportReport, MovementView, ProductRecord, ProductStock, StockLevelView,
    TransferReceipt, WarehouseRecord,
};
use bodega_inventory::StockLevel;

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn message(json: bool, text: &str) {
    if json {
        println!("{}", serde_json::json!({ "message": text }));
    } else {
        println!("{text}");
    }
}

pub fn record<T: Serialize + std::fmt::Debug>(json: bool, value: &T) -> anyhow::Result<()> {
    if json {
        return print_json(value);
    }
    println!("{value:#?}");
    Ok(())
}

pub fn adjust_receipt(json: bool, receipt: &AdjustReceipt) -> anyhow::Result<()> {
    if json {
        return print_json(receipt);
    }
    match &receipt.movement {
        Some(m) => println!(
            "{:+} {} -> {} (movement #{}, {})",
            m.delta, m.unit, receipt.level.quantity, m.id, m.reason
        ),
        None => println!("unchanged at {}", receipt.level.quantity),
    }
    Ok(())
}

pub fn transfer_receipt(json: bool, receipt: &TransferReceipt) -> anyhow::Result<()> {
    if json {
        return print_json(receipt);
    }
    println!(
        "moved {} {}: source now {}, destination now {}",
        receipt.incoming.delta, receipt.incoming.unit, receipt.source.quantity, receipt.destination.quantity
    );
    Ok(())
}

pub fn import_report(json: bool, report: &ImportReport) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "{} row(s) applied, {} unchanged, {} rejected",
        report.success,
        report.skipped,
        report.errors.len()
    );
    for error in &report.errors {
        println!("  row {}: {}", error.row, error.message);
    }
    Ok(())
}

pub fn levels(json: bool, views: &[StockLevelView]) -> anyhow::Result<()> {
    if json {
        return print_json(views);
    }
    for v in views {
        println!(
            "{:<10} {:<32} {:<8} {:<6} {:>8}",
            v.product.sku, v.product.name, v.warehouse.code, v.unit, v.quantity
        );
    }
    Ok(())
}

pub fn product_stock(json: bool, grouped: &[ProductStock]) -> anyhow::Result<()> {
    if json {
        return print_json(grouped);
    }
    for p in grouped {
        let per_warehouse: Vec<String> = p
            .warehouses
            .iter()
            .map(|w| format!("{}={}", w.warehouse.code, w.quantity))
            .collect();
        println!(
            "{:<10} {:<32} total {:>8}  {}",
            p.product.sku,
            p.product.name,
            p.total,
            per_warehouse.join(" ")
        );
    }
    Ok(())
}

pub fn history(json: bool, movements: &[MovementView]) -> anyhow::Result<()> {
    if json {
        return print_json(movements);
    }
    for v in movements {
        println!(
            "{} #{:<6} {:<10} {:<8} {:>+8} {:<24} {}",
            v.movement.created_at.format("%Y-%m-%d %H:%M:%S"),
            v.movement.id,
            v.product.sku,
            v.warehouse.code,
            v.movement.delta,
            v.actor_email.as_deref().unwrap_or("-"),
            v.movement.reason
        );
    }
    Ok(())
}

pub fn warehouses(json: bool, warehouses: &[WarehouseRecord]) -> anyhow::Result<()> {
    if json {
        return print_json(warehouses);
    }
    for w in warehouses {
        println!("{:<8} {:<32} {}", w.code, w.name, w.id);
    }
    Ok(())
}

pub fn level(json: bool, level: &StockLevel) -> anyhow::Result<()> {
    if json {
        return print_json(level);
    }
    println!("{} {}", level.key, level.quantity);
    Ok(())
}

pub fn total(json: bool, product: &ProductRecord, total: i64) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "product": product, "total": total }));
        return Ok(());
    }
    println!("{} {} {}", product.sku, product.name, total);
    Ok(())
}
