//! Configuration management for ResearchForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Completion service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search/scrape configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Research pipeline configuration
    #[serde(default)]
    pub research: ResearchConfig,

    /// Result cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search+scrape API base URL
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Pages requested per query
    #[serde(default = "default_search_limit")]
    pub result_limit: usize,

    /// Scrape timeout in seconds
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Client-side request budget
    #[serde(default = "default_search_rps")]
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResearchConfig {
    /// Depth of topic-level research
    #[serde(default)]
    pub depth: ResearchDepth,

    /// Override for the depth profile's retry budget
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Hard ceiling on state transitions per run
    #[serde(default = "default_step_limit")]
    pub step_limit: usize,

    /// Concurrent completion calls while summarizing sources
    #[serde(default = "default_summary_concurrency")]
    pub summary_concurrency: usize,

    /// Concurrent section runs during fan-out
    #[serde(default = "default_section_concurrency")]
    pub section_concurrency: usize,

    /// Sources kept per section after merge
    #[serde(default = "default_max_sources_per_section")]
    pub max_sources_per_section: usize,

    /// Deadline for a whole compression pass in seconds
    #[serde(default = "default_compression_timeout")]
    pub compression_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Redis URL; caching is disabled when unset
    #[serde(default)]
    pub url: Option<String>,

    /// TTL for cached topic results in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// How much effort a research run spends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Shallow,
    #[default]
    Standard,
    Deep,
}

impl ResearchDepth {
    /// Depth used for per-section runs under a topic run of this depth
    pub fn section_depth(self) -> Self {
        match self {
            ResearchDepth::Deep => ResearchDepth::Standard,
            _ => ResearchDepth::Shallow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchDepth::Shallow => "shallow",
            ResearchDepth::Standard => "standard",
            ResearchDepth::Deep => "deep",
        }
    }
}

impl fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Default value functions
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retries() -> u32 { 3 }
fn default_temperature() -> f32 { 0.3 }
fn default_search_endpoint() -> String { "https://api.firecrawl.dev".to_string() }
fn default_search_limit() -> usize { 5 }
fn default_scrape_timeout() -> u64 { 30 }
fn default_search_rps() -> u32 { 5 }
fn default_step_limit() -> usize { 35 }
fn default_summary_concurrency() -> usize { 3 }
fn default_section_concurrency() -> usize { 3 }
fn default_max_sources_per_section() -> usize { 3 }
fn default_compression_timeout() -> u64 { 120 }
fn default_cache_ttl() -> u64 { 86_400 }
fn default_key_prefix() -> String { "researchforge".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "researchforge".to_string() }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            temperature: default_temperature(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key: None,
            result_limit: default_search_limit(),
            timeout_secs: default_scrape_timeout(),
            requests_per_second: default_search_rps(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            depth: ResearchDepth::default(),
            max_retries: None,
            step_limit: default_step_limit(),
            summary_concurrency: default_summary_concurrency(),
            section_concurrency: default_section_concurrency(),
            max_sources_per_section: default_max_sources_per_section(),
            compression_timeout_secs: default_compression_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: default_cache_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RESEARCH__DEPTH=deep
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Compression pass deadline as Duration
    pub fn compression_timeout(&self) -> Duration {
        Duration::from_secs(self.research.compression_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            research: ResearchConfig::default(),
            cache: CacheSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
