//! lootcase API server binary

use clap::Parser;
use lootcase::api::{init_tracing, ApiServer};
use lootcase::config::{generate_sample_config, ConfigLoader, RandomSourceKind};
use lootcase::service::CaseService;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lootcase-api")]
#[command(about = "Case opening reward service", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<String>,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    write_sample_config: Option<String>,

    /// Server host (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Catalog TOML file (overrides configuration)
    #[arg(long)]
    catalog: Option<String>,

    /// Transaction log path (overrides configuration)
    #[arg(long)]
    ledger_log: Option<String>,

    /// Random source: os or vrf (overrides configuration)
    #[arg(long)]
    random_source: Option<RandomSourceKind>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.write_sample_config {
        generate_sample_config(&path)?;
        println!("Sample configuration written to {}", path);
        return Ok(());
    }

    init_tracing();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(catalog) = args.catalog {
        config.catalog.path = Some(catalog);
    }
    if let Some(path) = args.ledger_log {
        config.ledger.log_path = Some(path);
    }
    if let Some(source) = args.random_source {
        config.fairness.source = source;
    }
    if let Some(origins) = args.cors_origins {
        config.server.allowed_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
    }
    loader.validate(&config)?;

    let service = Arc::new(CaseService::from_config(&config)?);
    info!(
        cases = service.catalog().len(),
        accounts = service.account_count(),
        "Case service ready"
    );

    ApiServer::new(config.server.clone(), service).run().await
}
