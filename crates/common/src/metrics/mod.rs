//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for research runs, pipeline phases and
//! outbound collaborator calls with standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_histogram, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all ResearchForge metrics
pub const METRICS_PREFIX: &str = "researchforge";

/// Buckets for whole research runs (in seconds)
pub const RESEARCH_BUCKETS: &[f64] = &[
    1.0,
    2.5,
    5.0,
    10.0,
    20.0,
    30.0,
    60.0,
    120.0,
    300.0,
    600.0,
];

/// Buckets for single outbound calls (completion, search)
pub const CALL_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_research_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total research state-machine runs"
    );

    describe_histogram!(
        format!("{}_research_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Research run latency in seconds"
    );

    describe_counter!(
        format!("{}_phase_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Total pipeline phase transitions"
    );

    describe_counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Total error-to-retry transitions"
    );

    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total completion service requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Completion latency in seconds"
    );

    describe_counter!(
        format!("{}_web_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Total web search calls"
    );

    describe_histogram!(
        format!("{}_web_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Web search+scrape latency in seconds"
    );

    describe_counter!(
        format!("{}_sections_researched_total", METRICS_PREFIX),
        Unit::Count,
        "Total document sections researched"
    );

    describe_histogram!(
        format!("{}_section_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Section research latency in seconds"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record a research run
pub struct RunMetrics {
    start: Instant,
    depth: String,
}

impl RunMetrics {
    /// Start tracking a run
    pub fn start(depth: &str) -> Self {
        Self {
            start: Instant::now(),
            depth: depth.to_string(),
        }
    }

    /// Record run completion
    pub fn finish(self, answered: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let outcome = if answered { "answered" } else { "empty" };

        counter!(
            format!("{}_research_runs_total", METRICS_PREFIX),
            "depth" => self.depth.clone(),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}_research_duration_seconds", METRICS_PREFIX),
            "depth" => self.depth
        )
        .record(duration);
    }
}

/// Helper to record a phase transition
pub fn record_transition(from: &str, to: &str) {
    counter!(
        format!("{}_phase_transitions_total", METRICS_PREFIX),
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Helper to record a retry
pub fn record_retry(kind: &str) {
    counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Helper to record completion metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_completion_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record web search metrics
pub fn record_web_search(duration_secs: f64, page_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_web_searches_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_web_search_duration_seconds", METRICS_PREFIX)
    )
    .record(duration_secs);

    tracing::debug!(page_count, success, "Web search recorded");
}

/// Helper to record a finished section
pub fn record_section(duration_secs: f64, depth: &str) {
    counter!(
        format!("{}_sections_researched_total", METRICS_PREFIX),
        "depth" => depth.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_section_duration_seconds", METRICS_PREFIX),
        "depth" => depth.to_string()
    )
    .record(duration_secs);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [RESEARCH_BUCKETS, CALL_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_run_metrics() {
        let metrics = RunMetrics::start("standard");
        record_transition("understanding", "planning");
        metrics.finish(true);
        // Just verify it runs without an installed recorder
    }
}
