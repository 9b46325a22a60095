//! SQL Gateway - Main entry point.
//!
//! Serves authenticated `/query` and `/upsert` endpoints backed by per-database
//! MySQL connection pools.

use clap::Parser;
use sql_gateway::auth::AuthConfig;
use sql_gateway::config::Config;
use sql_gateway::db::{PoolManager, QueryExecutor};
use sql_gateway::handlers::Gateway;
use sql_gateway::transport::HttpTransport;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Config::parse();
    init_tracing(&config);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        eprintln!();
        eprintln!("Usage: sql-gateway --token <TOKEN> [--host <HOST>] [--user <USER>]");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  sql-gateway --token s3cret --host db.internal --user app --password pw");
        eprintln!("  sql-gateway --token a,b --server-url mysql://app:pw@db.internal:3306");
        eprintln!("  SQL_GATEWAY_TOKEN=s3cret sql-gateway -l 9000");
        std::process::exit(1);
    }

    let settings = config.server_settings()?;
    let auth = AuthConfig::from_tokens(config.tokens.clone())?;

    info!(
        listen = %config.http_bind_addr(),
        mysql_host = %settings.host,
        mysql_port = settings.port,
        mysql_user = %settings.user,
        tokens = auth.token_count(),
        multiple_statements = config.allow_multiple_statements,
        "Starting SQL gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pools = Arc::new(PoolManager::new(settings, config.pool.clone()));
    let executor = QueryExecutor::with_timeout(config.query_timeout_duration());
    let gateway = Arc::new(
        Gateway::new(pools, executor, auth)
            .with_multiple_statements(config.allow_multiple_statements),
    );

    let transport = HttpTransport::new(
        gateway,
        &config.http_host,
        config.http_port,
        config.body_limit,
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
