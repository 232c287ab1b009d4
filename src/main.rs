use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketing_core::adapters::{PostgresProductRepository, PostgresTransactionRepository};
use ticketing_core::cli::{self, Cli, Commands, DbCommands, TxCommands};
use ticketing_core::config::{Config, LogFormat};
use ticketing_core::health::{DependencyChecker, PostgresChecker, SnapChecker};
use ticketing_core::middleware::auth::JwtValidator;
use ticketing_core::midtrans::SnapClient;
use ticketing_core::use_cases::CheckoutService;
use ticketing_core::{create_app, db, AppState, NotificationSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match Cli::parse().command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Tx(TxCommands::ExpireAbandoned { older_than_minutes }) => {
            cli::handle_tx_expire_abandoned(&config, older_than_minutes).await
        }
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let pool = db::create_pool(&config)
        .await
        .context("failed to connect to the database")?;
    db::run_migrations(&pool).await?;

    let snap_client = Arc::new(SnapClient::new(
        config.midtrans_snap_url.clone(),
        config.midtrans_server_key.clone(),
    ));
    tracing::info!(snap_url = %config.midtrans_snap_url, "Midtrans Snap client initialized");

    let products = Arc::new(PostgresProductRepository::new(pool.clone()));
    let transactions = Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let checkout = Arc::new(CheckoutService::new(
        transactions.clone(),
        products.clone(),
        snap_client.clone(),
        config.context_timeout(),
    ));

    let health_checkers: Vec<Arc<dyn DependencyChecker>> = vec![
        Arc::new(PostgresChecker::new(pool.clone())),
        Arc::new(SnapChecker::new(snap_client)),
    ];

    let state = AppState {
        checkout,
        products: products.clone(),
        inventory: products,
        transactions,
        jwt: Arc::new(JwtValidator::new(&config.jwt_secret)),
        notifications: NotificationSettings {
            server_key: config.midtrans_server_key.clone(),
            verify_signature: config.midtrans_verify_signature,
        },
        health_checkers: health_checkers.into(),
        start_time: Instant::now(),
        log_request_body: config.log_request_body,
    };

    if !config.midtrans_verify_signature {
        tracing::warn!("payment notification signature verification is disabled");
    }

    let app = create_app(state).layer(cors_layer(&config)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    match &config.cors_allowed_origins {
        Some(origins) => {
            let origins = origins
                .iter()
                .map(|origin| {
                    HeaderValue::from_str(origin)
                        .with_context(|| format!("invalid CORS origin '{origin}'"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(layer.allow_origin(origins))
        }
        None => Ok(layer.allow_origin(Any)),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
