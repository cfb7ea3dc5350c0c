#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::{App, HttpServer, web};
use clap::Parser;
use tracing::{error, info};

mod auth;
mod error;
mod routes;
mod state;

use error::AppError;
use heartwatch_service::{Config, Engine};
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "heartwatch-server", version, about = "HTTP API for the heartwatch engine")]
struct Args {
    /// Path to config.toml (defaults to $XDG_CONFIG_HOME/heartwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = Config::from_config(args.config.as_ref())?.with_env_overrides();
    logger::init_with(&config.logging.level, config.logging.format.parse().ok());
    info!("{}", config);

    if config.server.tokens.is_empty() {
        tracing::warn!("No API tokens configured, every request will be rejected");
    }

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

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = web::Data::new(AppState { engine: engine.clone(), tokens: config.server.tokens.clone() });
    let result = run_server(addr, state).await;

    resume.abort();
    engine.shutdown();
    result
}

async fn run_server(addr: SocketAddr, state: web::Data<AppState>) -> Result<(), AppError> {
    info!("Listening on {}", addr);
    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
