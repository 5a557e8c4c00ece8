//! Collection ledger administration tool
//!
//! # Usage
//!
//! ```bash
//! # Apply pending schema migrations
//! cargo run --bin ledger-admin -- migrate
//!
//! # Migrate, then open any missing standard accounts
//! LEDGER__DATABASE__URL=postgres://ledger@localhost/ledger cargo run --bin ledger-admin -- seed
//!
//! # Print the trial balance as JSON
//! cargo run --bin ledger-admin -- trial-balance
//! ```
//!
//! Configuration is read from `ledger.toml` and `LEDGER__*` variables; a
//! `.env` file is loaded first if present.

use anyhow::{bail, Context};
use std::sync::Arc;

use core_kernel::{AdapterHealth, HealthCheckable, TracingAuditSink};
use domain_settlement::StaticDirectory;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PgLedgerStore};
use settlement_engine::{telemetry, Engine, EngineConfig};

const USAGE: &str = "usage: ledger-admin <migrate|seed|trial-balance|health>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = std::env::args().nth(1).unwrap_or_default();

    let config = EngineConfig::load().context("loading configuration")?;
    telemetry::init(&config.telemetry);

    let pool = create_pool(DatabaseConfig::from_settings(&config.database))
        .await
        .context("connecting to the ledger database")?;

    match command.as_str() {
        "migrate" => {
            run_migrations(&pool).await?;
        }
        "seed" => {
            run_migrations(&pool).await?;
            let engine = engine(&config, PgLedgerStore::new(pool))?;
            let report = engine.accounts.seed_standard_chart("ledger-admin").await?;
            tracing::info!(created = ?report.created, existing = report.existing.len(), "Chart of accounts ready");
        }
        "trial-balance" => {
            let engine = engine(&config, PgLedgerStore::new(pool))?;
            let trial_balance = engine.reporting.trial_balance().await?;
            println!("{}", serde_json::to_string_pretty(&trial_balance)?);
            if !trial_balance.is_balanced {
                bail!("trial balance does not balance");
            }
        }
        "health" => {
            let health = PgLedgerStore::new(pool).health_check().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if health.status != AdapterHealth::Healthy {
                bail!("ledger store is unhealthy");
            }
        }
        other => bail!("unknown command '{}'; {}", other, USAGE),
    }
    Ok(())
}

fn engine(config: &EngineConfig, store: PgLedgerStore) -> anyhow::Result<Engine> {
    Engine::new(
        config,
        Arc::new(store),
        Arc::new(TracingAuditSink),
        Arc::new(StaticDirectory::standard()),
    )
    .context("building the engine")
}
