mod commands;
mod output;
mod run;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use bodega_infra::{LedgerConfig, PostgresDirectory, PostgresStockStore, stock_template};
use bodega_observability::LogFormat;
use commands::{CommandLine, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLine::parse_args();

    let config = match &cli.config {
        Some(path) => LedgerConfig::load_from(path),
        None => LedgerConfig::load(),
    }
    .context("failed to load configuration")?;

    bodega_observability::init(LogFormat::from_json_flag(config.log_json));

    if let Err(e) = execute(cli, &config).await {
        error!(error = %format!("{e:#}"), "command failed");
        return Err(e);
    }
    Ok(())
}

async fn execute(cli: CommandLine, config: &LedgerConfig) -> anyhow::Result<()> {
    if let Commands::Template = cli.command {
        print!("{}", stock_template());
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    info!(max_connections = config.max_connections, "connected to database");

    let app = run::App::new(
        PostgresStockStore::new(pool.clone()),
        PostgresDirectory::new(pool),
        config,
    );
    app.run(cli.command, cli.json).await
}
