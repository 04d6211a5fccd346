use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caseflow_core::{
    create_registry, load_config, metrics, validate_config, CaseStore, ClientDirectory,
    PipelineOrchestrator, PipelineRequest, SanitizedConfig, SqliteCaseStore, StaticDirectory,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("caseflow v{}", VERSION);

    // Determine config path
    let config_path = std::env::var("CASEFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        systems = sanitized.registry.systems.len(),
        venue_overrides = sanitized.registry.venue_overrides,
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);

    // Source registry
    let registry = create_registry(&config.registry).context("Failed to create source registry")?;
    info!(sources = ?registry.supported_sources(), "Source registry ready");

    // Client directory
    let directory: Arc<dyn ClientDirectory> = match &config.directory.path {
        Some(path) => Arc::new(
            StaticDirectory::load(path)
                .with_context(|| format!("Failed to load client directory from {:?}", path))?,
        ),
        None => {
            info!("No client directory configured, every case uses the default client");
            Arc::new(StaticDirectory::empty())
        }
    };

    // Case store
    let store: Arc<dyn CaseStore> = Arc::new(
        SqliteCaseStore::with_options(
            &config.database.path,
            Duration::from_millis(config.database.busy_timeout_ms),
            config.database.max_allocation_retries,
        )
        .context("Failed to open case store")?,
    );

    let orchestrator =
        PipelineOrchestrator::new(config.pipeline.clone(), Arc::new(registry), directory, store);

    // Request: file path argument, or stdin
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read request from {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    let request: PipelineRequest =
        serde_json::from_str(&raw).context("Failed to parse pipeline request")?;

    let summary = orchestrator
        .run_pipeline(&request)
        .await
        .context("Pipeline run failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
    );

    if std::env::var_os("CASEFLOW_PRINT_METRICS").is_some() {
        eprintln!("{}", render_metrics()?);
    }

    Ok(())
}

/// Render core metrics in the Prometheus text format.
fn render_metrics() -> Result<String> {
    use prometheus::Encoder;

    let registry = prometheus::Registry::new();
    for metric in metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metric")?;
    }

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}
