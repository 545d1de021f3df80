use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod db;
mod domain;
mod health;
mod http;
mod messaging;
mod metrics;
mod models;
mod utils;

use config::{AppConfig, LogFormat, LoggingConfig};
use db::{PgTenantRepository, TenantRepository};
use domain::tenant::TenantLifecycle;
use messaging::{ConnectionManager, KafkaDialer, KafkaQueueClient};

#[derive(Parser)]
#[command(name = "tenant-provisioner")]
#[command(about = "Provision tenants with a dedicated processing queue", long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, env = "TENANT_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Create a tenant and its queue
    Create { name: String },

    /// Delete a tenant and its queue
    Delete { client_id: String },

    /// Publish a payload to a tenant's queue
    Process {
        client_id: String,
        /// JSON document; anything unparseable is sent as a JSON string
        payload: String,
    },

    /// Show a tenant record
    Get { client_id: String },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, found) = AppConfig::load(&cli.config)?;
    init_tracing(&config.logging);

    if found {
        tracing::info!(path = %cli.config.display(), "Loaded configuration");
    } else {
        tracing::warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Database ===
    tracing::info!(host = %config.database.host, dbname = %config.database.dbname, "Connecting to PostgreSQL...");
    let repo = Arc::new(PgTenantRepository::connect(&config.database).await?);
    repo.ensure_schema().await?;

    // === 3. Broker connection (supervised) ===
    tracing::info!(url = %config.broker.url, "Connecting to broker...");
    let dialer = KafkaDialer {
        operation_timeout: config.broker.operation_timeout(),
    };
    let connections = Arc::new(
        ConnectionManager::connect(
            dialer,
            &config.broker.url,
            config.broker.reconnect_policy(),
            metrics.clone(),
        )
        .await?,
    );
    let queues = Arc::new(KafkaQueueClient::new(
        connections.clone(),
        config.broker.operation_timeout(),
        metrics.clone(),
    ));

    // === 4. Lifecycle ===
    let tenant_repo: Arc<dyn TenantRepository> = repo.clone();
    let lifecycle = Arc::new(TenantLifecycle::new(tenant_repo.clone(), queues.clone(), metrics.clone()));

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let state = http::AppState {
                lifecycle,
                repo: tenant_repo,
                broker: connections,
                metrics,
            };
            http::serve(state, &config.server.host, config.server.port)
                .await
                .map_err(anyhow::Error::from)
        }
        Commands::Create { name } => match lifecycle.create_tenant(&name).await {
            Ok(tenant) => print_json(&tenant),
            Err(e) => Err(e.into()),
        },
        Commands::Delete { client_id } => lifecycle
            .delete_tenant(&client_id)
            .await
            .map(|()| println!("Tenant {} deleted", client_id))
            .map_err(anyhow::Error::from),
        Commands::Process { client_id, payload } => {
            let payload = parse_payload(&payload);
            match lifecycle.process_payload(&client_id, &payload).await {
                // Publishing only enqueues; deliver before the process exits
                Ok(()) => match queues.flush().await {
                    Ok(()) => {
                        println!("Payload published for tenant {}", client_id);
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                },
                Err(e) => Err(e.into()),
            }
        }
        Commands::Get { client_id } => match lifecycle.get_tenant(&client_id).await {
            Ok(tenant) => print_json(&tenant),
            Err(e) => Err(e.into()),
        },
    };

    repo.close().await;
    tracing::info!("Shutdown complete");
    result
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tenant_provisioner=debug", logging.level)));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init(),
    }
}

fn parse_payload(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
