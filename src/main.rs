use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use tutor_core::provider::ModelSource;
use tutor_engine::{Pipeline, PipelineConfig};
use tutor_llm::ModelRegistry;
use tutor_server::ServerConfig;
use tutor_settings::load_settings_from;
use tutor_store::SessionStore;
use tutor_telemetry::{init_telemetry, TelemetryConfig};

/// Streaming English tutor backend.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON settings file, merged over the built-in defaults.
    #[arg(long, env = "TUTOR_CONFIG", default_value = "tutor.json")]
    config: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Base log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings_from(Some(&cli.config), |k| std::env::var(k).ok())
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }

    init_telemetry(&TelemetryConfig::with_level(&settings.logging.level, settings.logging.json))?;
    settings.validate().context("invalid settings")?;

    let models: Arc<dyn ModelSource> = Arc::new(ModelRegistry::from_settings(&settings)?);
    let sessions = Arc::new(SessionStore::with_ttl_hours(settings.session.ttl_hours));
    let pipeline = Arc::new(Pipeline::new(models, sessions, PipelineConfig::from(&settings)));

    let handle = tutor_server::start(ServerConfig::from(settings.server.clone()), pipeline)
        .await
        .context("starting server")?;
    info!(port = handle.port(), environment = %settings.environment, "tutor ready");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}
