//! Web search + scrape client
//!
//! Provides:
//! - `WebSearch` trait returning scraped pages for a query
//! - Firecrawl-compatible HTTP client with per-call timeout and a
//!   client-side token bucket
//! - A closure-driven mock with optional artificial latency

use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A scraped web page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
}

impl Page {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Some(title.into()),
            content: content.into(),
        }
    }
}

/// Format the scraper should return page bodies in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeFormat {
    #[default]
    Markdown,
    Html,
}

/// Options for a single search call
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum pages to return
    pub limit: usize,

    /// Body format of scraped pages
    pub scrape_format: ScrapeFormat,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            scrape_format: ScrapeFormat::Markdown,
        }
    }
}

/// Trait for web search with page scraping
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web and return scraped pages
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Page>>;
}

/// Firecrawl client configuration
#[derive(Debug, Clone)]
pub struct FirecrawlConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub requests_per_second: u32,
}

impl From<&crate::config::SearchConfig> for FirecrawlConfig {
    fn from(config: &crate::config::SearchConfig) -> Self {
        Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_secs(config.timeout_secs),
            requests_per_second: config.requests_per_second,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FirecrawlSearchRequest<'a> {
    query: &'a str,
    limit: usize,
    scrape_options: FirecrawlScrapeOptions,
}

#[derive(Serialize)]
struct FirecrawlScrapeOptions {
    formats: Vec<ScrapeFormat>,
}

#[derive(Deserialize)]
struct FirecrawlSearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<FirecrawlDocument>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct FirecrawlDocument {
    url: String,
    title: Option<String>,
    description: Option<String>,
    markdown: Option<String>,
    html: Option<String>,
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Firecrawl search+scrape client
pub struct FirecrawlSearch {
    client: reqwest::Client,
    config: FirecrawlConfig,
    limiter: DirectRateLimiter,
}

impl FirecrawlSearch {
    /// Create a new search client
    pub fn new(config: FirecrawlConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Configuration {
                message: "Search API key is not set".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e)
            })?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rps));

        Ok(Self { client, config, limiter })
    }

    async fn request(&self, query: &str, options: &SearchOptions) -> Result<Vec<Page>> {
        let request = FirecrawlSearchRequest {
            query,
            limit: options.limit,
            scrape_options: FirecrawlScrapeOptions {
                formats: vec![options.scrape_format],
            },
        };

        let response = self.client
            .post(format!("{}/v1/search", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Search {
                message: format!("Search API error {}: {}", status, body),
            });
        }

        let parsed: FirecrawlSearchResponse = response.json().await
            .map_err(|e| self.map_transport_error(e))?;

        if !parsed.success {
            return Err(AppError::Search {
                message: parsed.error.unwrap_or_else(|| "search was not successful".to_string()),
            });
        }

        Ok(parsed.data
            .into_iter()
            .map(|doc| Page {
                content: doc.markdown
                    .or(doc.html)
                    .or(doc.description)
                    .unwrap_or_default(),
                url: doc.url,
                title: doc.title,
            })
            .take(options.limit)
            .collect())
    }

    fn map_transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout {
                operation: "web search".to_string(),
                timeout_ms: self.config.timeout.as_millis() as u64,
            }
        } else {
            AppError::Search { message: err.to_string() }
        }
    }
}

#[async_trait]
impl WebSearch for FirecrawlSearch {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Page>> {
        self.limiter.until_ready().await;

        let started = Instant::now();
        let result = self.request(query, options).await;
        metrics::record_web_search(
            started.elapsed().as_secs_f64(),
            result.as_ref().map_or(0, |pages| pages.len()),
            result.is_ok(),
        );

        if let Err(e) = &result {
            tracing::warn!(query = %query, error = %e, "Web search failed");
        }
        result
    }
}

type SearchHandler = dyn Fn(&str, &SearchOptions) -> Result<Vec<Page>> + Send + Sync;
type DelayFn = dyn Fn(&str) -> Duration + Send + Sync;

/// Mock web search for testing
#[derive(Clone)]
pub struct MockWebSearch {
    handler: Arc<SearchHandler>,
    delay: Option<Arc<DelayFn>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockWebSearch {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &SearchOptions) -> Result<Vec<Page>> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always return the same pages
    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self::new(move |_, options| Ok(pages.iter().take(options.limit).cloned().collect()))
    }

    /// Fail every call
    pub fn failing() -> Self {
        Self::new(|query, _| Err(AppError::Search {
            message: format!("search backend down for '{}'", query),
        }))
    }

    /// Sleep before answering, duration chosen per query
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for MockWebSearch {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Page>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(query)).await;
        }

        let result = (self.handler)(query, options);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_respects_limit() {
        let pages = (0..8)
            .map(|i| Page::new(format!("https://example.com/{}", i), "t", "body"))
            .collect();
        let search = MockWebSearch::with_pages(pages);

        let options = SearchOptions { limit: 3, ..Default::default() };
        let result = search.search("anything", &options).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let search = MockWebSearch::failing();
        let result = search.search("q", &SearchOptions::default()).await;
        assert!(matches!(result, Err(AppError::Search { .. })));
    }

    #[test]
    fn test_scrape_format_serialization() {
        let json = serde_json::to_string(&ScrapeFormat::Markdown).unwrap();
        assert_eq!(json, "\"markdown\"");
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = FirecrawlConfig::from(&crate::config::SearchConfig::default());
        assert!(matches!(FirecrawlSearch::new(config), Err(AppError::Configuration { .. })));
    }
}
