//! ResearchForge Common Library
//!
//! Shared code for the ResearchForge crates including:
//! - Configuration management
//! - Error types and handling
//! - Metrics and observability
//! - Completion service client abstraction
//! - Web search + scrape client abstraction
//! - Optional retrieval collaborators (vector cache, knowledge base)
//! - Redis result cache

pub mod cache;
pub mod config;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retrieval;
pub mod web;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::{AppConfig, ResearchDepth};
pub use llm::{ChatMessage, CompletionService};
pub use web::{Page, WebSearch};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
