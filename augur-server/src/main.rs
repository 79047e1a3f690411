use std::sync::Arc;

use augur_core::config::StoreBackend;
use augur_core::AugurConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use augur_server::context::AppContext;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "augur.toml")]
    config: String,

    /// Check the record store and model artifacts, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match AugurConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over service.log_level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    // Store connection, table creation and model loading all happen here.
    let ctx = match AppContext::from_config(&config).await {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("Failed to start Augur: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match ctx.sink.health().await {
            Ok(v) => println!("✅ Record store ({}): {}", ctx.sink.name(), v),
            Err(e) => {
                println!("❌ Record store check failed: {}", e);
                std::process::exit(1);
            }
        }
        for state in &ctx.domains {
            println!(
                "✅ {} model loaded ({})",
                state.domain.name(),
                state.predictor.name()
            );
        }
        if config.store.backend == StoreBackend::Memory {
            println!("⚠️  In-memory store: predictions are not persisted across restarts");
        }
        println!("✅ Augur health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    augur_server::http::start_http_server(ctx, &config.http, tx.subscribe()).await?;

    Ok(())
}
