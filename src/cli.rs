use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::adapters::{PostgresProductRepository, PostgresTransactionRepository};
use crate::config::Config;
use crate::midtrans::SnapClient;
use crate::use_cases::CheckoutService;

#[derive(Parser)]
#[command(name = "ticketing-core")]
#[command(about = "Ticketing Core - ticket checkout and payment reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction maintenance commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Cancel pending checkouts that never received a payment URL and release their stock
    ExpireAbandoned {
        /// Only transactions older than this many minutes are cancelled
        #[arg(long, default_value_t = 30)]
        older_than_minutes: i64,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_expire_abandoned(config: &Config, older_than_minutes: i64) -> anyhow::Result<()> {
    if older_than_minutes <= 0 {
        anyhow::bail!("--older-than-minutes must be positive");
    }

    let pool = crate::db::create_pool(config).await?;
    let service = CheckoutService::new(
        Arc::new(PostgresTransactionRepository::new(pool.clone())),
        Arc::new(PostgresProductRepository::new(pool)),
        Arc::new(SnapClient::new(
            config.midtrans_snap_url.clone(),
            config.midtrans_server_key.clone(),
        )),
        config.context_timeout(),
    );

    let cutoff = Utc::now() - chrono::Duration::minutes(older_than_minutes);
    let cancelled = service.expire_abandoned(cutoff).await?;

    println!("✓ Cancelled {} abandoned checkout(s) created before {}", cancelled, cutoff);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("running database migrations");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("validating configuration");
    config.validate()?;

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  Context Timeout: {}s", config.context_timeout_secs);
    println!("  Midtrans Snap URL: {}", config.midtrans_snap_url);
    println!("  Verify Notification Signature: {}", config.midtrans_verify_signature);
    match &config.cors_allowed_origins {
        Some(origins) => println!("  CORS Allowed Origins: {}", origins.join(", ")),
        None => println!("  CORS Allowed Origins: any"),
    }
    println!("  Log Format: {:?}", config.log_format);

    println!("✓ Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
