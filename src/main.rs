use clap::Parser;
use lucid_narrator::config_loader::Settings;
use lucid_narrator::narrator::Narrator;
use lucid_narrator::service::{NarratorService, BUS_NAME, OBJECT_PATH};
use std::error::Error;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zbus::connection::Builder;

/// Narration daemon for Lucid lessons
#[derive(Parser)]
#[command(name = "lucid-narrator")]
#[command(version)]
#[command(about = "Serves cached, prefetched lesson narration over D-Bus", long_about = None)]
struct Cli {
    /// Load settings from this file instead of the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let narrator = Narrator::from_settings(&settings)?;

    let _conn = Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, NarratorService::new(narrator))?
        .build()
        .await?;

    info!("Narrator running at {}", BUS_NAME);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
