//! Optional retrieval collaborators
//!
//! Two lookups can precede live web search for a document section:
//! - a curated knowledge base (highest trust)
//! - a vector-similarity cache of previously researched content
//!
//! Both are optional. Callers check `is_enabled()` and skip the lookup
//! when the backend is not configured.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A document returned by a retrieval backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    /// Canonical URL of the document
    pub url: String,

    /// Display title
    pub title: String,

    /// Retrieved text
    pub content: String,

    /// Backend similarity (0.0 - 1.0)
    pub similarity: f32,

    /// Backend-specific kind, e.g. "statistic", "regulation"
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Vector similarity query options
#[derive(Debug, Clone)]
pub struct VectorSearchOptions {
    pub limit: usize,
    pub content_types: Vec<String>,
    pub similarity_threshold: f32,
}

impl Default for VectorSearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            content_types: vec!["research".to_string(), "fact".to_string()],
            similarity_threshold: 0.75,
        }
    }
}

/// Knowledge-base query options
#[derive(Debug, Clone)]
pub struct KnowledgeQuery {
    pub limit: usize,
    pub country: Option<String>,
}

impl Default for KnowledgeQuery {
    fn default() -> Self {
        Self { limit: 5, country: None }
    }
}

/// Vector-similarity search over previously researched content
#[async_trait]
pub trait VectorSearch: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn search(&self, query: &str, options: &VectorSearchOptions) -> Result<Vec<RetrievedDocument>>;
}

/// Curated knowledge-base lookup
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn search(&self, query: &str, options: &KnowledgeQuery) -> Result<Vec<RetrievedDocument>>;
}

/// Stand-in for an unconfigured backend
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRetrieval;

#[async_trait]
impl VectorSearch for DisabledRetrieval {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _options: &VectorSearchOptions) -> Result<Vec<RetrievedDocument>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl KnowledgeBase for DisabledRetrieval {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _options: &KnowledgeQuery) -> Result<Vec<RetrievedDocument>> {
        Ok(Vec::new())
    }
}

type RetrievalHandler = dyn Fn(&str, usize) -> Result<Vec<RetrievedDocument>> + Send + Sync;

/// Mock retrieval backend for testing; serves as either collaborator
#[derive(Clone)]
pub struct MockRetrieval {
    handler: Arc<RetrievalHandler>,
}

impl MockRetrieval {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, usize) -> Result<Vec<RetrievedDocument>> + Send + Sync + 'static,
    {
        Self { handler: Arc::new(handler) }
    }
}

#[async_trait]
impl VectorSearch for MockRetrieval {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, options: &VectorSearchOptions) -> Result<Vec<RetrievedDocument>> {
        let mut docs = (self.handler)(query, options.limit)?;
        docs.retain(|d| d.similarity >= options.similarity_threshold);
        docs.truncate(options.limit);
        Ok(docs)
    }
}

#[async_trait]
impl KnowledgeBase for MockRetrieval {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, options: &KnowledgeQuery) -> Result<Vec<RetrievedDocument>> {
        let mut docs = (self.handler)(query, options.limit)?;
        docs.truncate(options.limit);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, similarity: f32) -> RetrievedDocument {
        RetrievedDocument {
            url: url.to_string(),
            title: "Doc".to_string(),
            content: "content".to_string(),
            similarity,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_disabled_backend() {
        let disabled = DisabledRetrieval;
        assert!(!VectorSearch::is_enabled(&disabled));
        assert!(!KnowledgeBase::is_enabled(&disabled));

        let docs = VectorSearch::search(&disabled, "q", &VectorSearchOptions::default()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_mock_vector_threshold() {
        let mock = MockRetrieval::new(|_, _| Ok(vec![doc("a", 0.9), doc("b", 0.5)]));
        let docs = VectorSearch::search(&mock, "q", &VectorSearchOptions::default()).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "a");
    }
}
