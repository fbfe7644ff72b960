//! Depth profiles for research runs

use researchforge_common::config::{AppConfig, ResearchDepth};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one research state-machine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOptions {
    /// Depth tier this profile was built from
    pub depth: ResearchDepth,

    /// Error-to-retry cycles allowed before giving up
    pub max_retries: u32,

    /// Pages requested per search query
    pub search_limit: usize,

    /// Upper bound on planned sub-queries
    pub max_sub_queries: usize,

    /// Top-ranked sources handed to synthesis
    pub max_synthesis_sources: usize,

    /// Request one-sentence finding summaries while searching
    pub summarize_findings: bool,

    /// Concurrent finding summaries / compression calls
    pub summary_concurrency: usize,

    /// Use the completion service to compress long sources
    pub llm_compression: bool,

    /// Hard ceiling on state transitions per run
    pub step_limit: usize,

    /// Deadline for the whole compression pass
    #[serde(with = "duration_secs")]
    pub compression_timeout: Duration,
}

impl ResearchOptions {
    /// Built-in profile for a depth tier
    pub fn for_depth(depth: ResearchDepth) -> Self {
        let (max_retries, search_limit, max_sub_queries, max_synthesis_sources, summarize_findings) =
            match depth {
                ResearchDepth::Shallow => (2, 3, 2, 5, false),
                ResearchDepth::Standard => (2, 5, 4, 8, true),
                ResearchDepth::Deep => (3, 5, 6, 12, true),
            };

        Self {
            depth,
            max_retries,
            search_limit,
            max_sub_queries,
            max_synthesis_sources,
            summarize_findings,
            summary_concurrency: 3,
            llm_compression: true,
            step_limit: 35,
            compression_timeout: Duration::from_secs(120),
        }
    }

    /// Profile for a depth tier with configuration overrides applied
    pub fn from_config(config: &AppConfig, depth: ResearchDepth) -> Self {
        let mut options = Self::for_depth(depth);

        if let Some(max_retries) = config.research.max_retries {
            options.max_retries = max_retries;
        }
        options.search_limit = options.search_limit.min(config.search.result_limit.max(1));
        options.summary_concurrency = config.research.summary_concurrency.max(1);
        options.step_limit = config.research.step_limit;
        options.compression_timeout = config.compression_timeout();

        options
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self::for_depth(ResearchDepth::default())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
