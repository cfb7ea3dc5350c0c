use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use heartwatch_service::{Config, Engine};

#[derive(Parser, Debug)]
#[command(name = "heartwatch", version, about = "Runs scheduled monitors without the HTTP API")]
struct Args {
    /// Path to config.toml (defaults to $XDG_CONFIG_HOME/heartwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = Config::from_config(args.config.as_ref()).context("Failed to load configuration")?.with_env_overrides();
    logger::init_with(&config.logging.level, config.logging.format.parse().ok());
    info!("{}", config);

    let engine = Engine::from_config(&config).await?;

    let resume = {
        let engine = engine.clone();
        tokio::spawn(async move {
            match engine.resume_all().await {
                Ok(count) => info!("Resumed {} jobs", count),
                Err(e) => error!("Failed to resume jobs: {}", e),
            }
        })
    };

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    resume.abort();
    engine.shutdown();

    Ok(())
}
