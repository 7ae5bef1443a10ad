use clap::{Args, Parser, Subcommand};

use bodega_inventory::Unit;

#[derive(Parser, Debug)]
#[command(name = "bodega")]
#[command(about = "Stock ledger for bottles across warehouses.")]
pub struct CommandLine {
    /// Configuration file (defaults to config/bodega.toml when present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Warehouses, products and actors accept an id (UUID) or their natural key
/// (warehouse code, product sku, user email).
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database tables if missing
    Migrate,

    /// Register master data for local setups
    #[command(subcommand)]
    Register(Register),

    /// Apply a signed quantity change to one warehouse
    #[command(alias = "a")]
    Adjust {
        #[command(flatten)]
        target: Target,
        #[arg(long, allow_hyphen_values = true)]
        delta: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
    },

    /// Move stock of one product between two warehouses
    #[command(alias = "t")]
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        product: String,
        #[arg(long)]
        quantity: i64,
        #[arg(long, default_value = "BOTTLE")]
        unit: Unit,
        #[arg(long)]
        actor: String,
    },

    /// Set one warehouse's stock of a product to an absolute quantity
    Set {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
    },

    /// Import absolute quantities from a CSV file (`-` reads stdin)
    #[command(alias = "i")]
    Import {
        file: String,
        #[arg(long)]
        actor: String,
    },

    /// Print a sample import CSV
    Template,

    /// Current stock, optionally filtered
    #[command(alias = "o")]
    Overview {
        /// Matches product name, sku or company
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        warehouse: Option<String>,
        /// One line per product with per-warehouse quantities
        #[arg(long)]
        grouped: bool,
    },

    /// Movement history, newest first
    #[command(alias = "h")]
    History {
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        warehouse: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Levels at or below a threshold
    Alerts {
        #[arg(long)]
        threshold: Option<i64>,
    },

    /// List warehouses
    Warehouses,

    /// Quantity of one product in one warehouse
    Level {
        #[command(flatten)]
        target: Target,
    },

    /// Total quantity of a product across warehouses
    Total {
        #[arg(long)]
        product: String,
    },
}

#[derive(Args, Debug)]
pub struct Target {
    #[arg(long)]
    pub warehouse: String,
    #[arg(long)]
    pub product: String,
    #[arg(long, default_value = "BOTTLE")]
    pub unit: Unit,
}

#[derive(Subcommand, Debug)]
pub enum Register {
    Warehouse {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    Product {
        #[arg(long)]
        sku: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        company: String,
    },
    User {
        #[arg(long)]
        email: String,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
