#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions
)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cac_engine::config::ServerConfig;
use cac_engine::engine::ConversationalAssessmentEngine;
use cac_engine::grade::LoggingPassbackClient;
use cac_engine::integrity::{IntegrityEvaluator, IntegrityThresholds};
use cac_engine::llm::HttpLlmClient;
use cac_engine::prompt::PromptBuilder;
use cac_engine::store::SqliteSessionStore;

/// `cac` - the Conversational Assessment Core standalone server.
#[derive(Parser, Debug)]
#[command(name = "cac")]
#[command(author = "Atomic Guide Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Conversational Assessment Core server", long_about = None)]
struct Cli {
    /// Path to the server configuration TOML file.
    #[arg(short, long, default_value = "cac.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP/WebSocket gateway.
    Serve {
        /// Override the host from the config file.
        #[arg(long)]
        host: Option<String>,

        /// Override the port from the config file.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the SQLite schema migration and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: failed to install default crypto provider: {e:?}");
    }

    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config).context("loading server config")?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Migrate => migrate(config).await,
    }
}

async fn serve(config: ServerConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.host.clone());
    let port = port.unwrap_or(config.port);

    let store = Arc::new(
        SqliteSessionStore::connect(&config.database_path)
            .await
            .context("connecting to session store")?,
    );
    let llm = Arc::new(HttpLlmClient::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    ));
    let prompts = Arc::new(PromptBuilder::new().context("registering prompt templates")?);
    let thresholds = IntegrityThresholds {
        warn_at: config.integrity.warn_at,
        flag_at: config.integrity.flag_at,
        block_at: config.integrity.block_at,
    };
    let integrity = Arc::new(IntegrityEvaluator::new(
        thresholds,
        config.integrity.global_rate_per_hour,
        config.integrity.session_rate_per_hour,
    ));
    let passback = Arc::new(LoggingPassbackClient);
    let engine = Arc::new(ConversationalAssessmentEngine::new(llm, prompts, integrity, passback));

    cac_engine::gateway::run_gateway(&host, port, engine, store).await
}

async fn migrate(config: ServerConfig) -> Result<()> {
    tracing::info!(database = %config.database_path, "running schema migration");
    SqliteSessionStore::connect(&config.database_path)
        .await
        .context("running migration")?;
    tracing::info!("migration complete");
    Ok(())
}
