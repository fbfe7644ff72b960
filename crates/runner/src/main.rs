//! ResearchForge Runner
//!
//! Researches a query end to end and prints the result:
//! - Topic research through the full state machine
//! - Optional per-section research for an outline file
//! - One renumbered source list for the whole document
//!
//! Usage: `research "<query>" [outline.json]`
//!
//! Configuration comes from `config/` and `APP__` variables, or from the
//! single file named by `RESEARCH_CONFIG`.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use researchforge_common::{
    cache::{Cache, CacheConfig},
    config::{AppConfig, ObservabilityConfig},
    llm::OpenAICompletion,
    metrics::{self, CALL_BUCKETS, METRICS_PREFIX, RESEARCH_BUCKETS},
    web::FirecrawlSearch,
    VERSION,
};
use researchforge_research::{OutlineSection, ResearchWorkflow};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("RESEARCH_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::load()?,
    };
    init_tracing(&config.observability);

    info!(service = %config.observability.service_name, "Starting ResearchForge runner v{}", VERSION);

    let mut args = std::env::args().skip(1);
    let Some(query) = args.next() else {
        error!("Usage: research \"<query>\" [outline.json]");
        std::process::exit(2);
    };
    let outline = match args.next() {
        Some(path) => read_outline(&path)?,
        None => Vec::new(),
    };

    if config.observability.metrics_port != 0 {
        init_metrics(config.observability.metrics_port)?;
    }

    let llm = OpenAICompletion::new((&config.llm).into()).map_err(|e| {
        error!(error = %e, "Failed to create completion client");
        e
    })?;
    let search = FirecrawlSearch::new((&config.search).into()).map_err(|e| {
        error!(error = %e, "Failed to create search client");
        e
    })?;

    let mut workflow = ResearchWorkflow::new(Arc::new(llm), Arc::new(search), config.clone());

    if let Some(cache_config) = CacheConfig::from_settings(&config.cache) {
        info!("Connecting to Redis...");
        let cache = match Cache::new(cache_config).await {
            Ok(cache) => cache.ping().await.map(|_| cache),
            Err(e) => Err(e),
        };
        match cache {
            Ok(cache) => workflow = workflow.with_cache(Arc::new(cache)),
            Err(e) => warn!(error = %e, "Redis unavailable, running without result cache"),
        }
    }

    let depth = config.research.depth;
    info!(query = %query, depth = %depth, sections = outline.len(), "Researching");

    let output = workflow.run(&query, depth, &outline).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_research_duration_seconds", METRICS_PREFIX)),
            RESEARCH_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("_duration_seconds".to_string()), CALL_BUCKETS)?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(port, "Metrics exporter listening");
    Ok(())
}

fn read_outline(path: &str) -> anyhow::Result<Vec<OutlineSection>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read outline {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("outline {} is not a list of sections", path))
}
