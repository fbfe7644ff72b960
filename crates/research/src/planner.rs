//! Query Planner - decomposes a research query into sub-queries
//!
//! Provides:
//! - Sub-question decomposition via the completion service
//! - Verbatim single sub-query fallback (planning never fails)
//! - Re-planning of pending sub-queries after a retry

use crate::prompts;
use crate::types::SubQuery;
use researchforge_common::llm::{complete_typed, ChatMessage, CompletionService};
use researchforge_common::{AppError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    #[serde(default, alias = "sub_queries")]
    sub_queries: Vec<PlannedQuery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannedQuery {
    question: String,
    #[serde(default, alias = "search_query")]
    search_query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplanResponse {
    #[serde(default, alias = "search_queries")]
    search_queries: Vec<String>,
}

/// Query planner
pub struct QueryPlanner {
    llm: Arc<dyn CompletionService>,
    max_sub_queries: usize,
}

impl QueryPlanner {
    pub fn new(llm: Arc<dyn CompletionService>, max_sub_queries: usize) -> Self {
        Self {
            llm,
            max_sub_queries: max_sub_queries.max(1),
        }
    }

    /// Plan sub-queries for `query`; always returns at least one
    pub async fn plan(&self, query: &str, understanding: &str) -> Vec<SubQuery> {
        match self.decompose(query, understanding).await {
            Ok(sub_queries) if !sub_queries.is_empty() => {
                debug!(count = sub_queries.len(), "Planned sub-queries");
                sub_queries
            }
            Ok(_) => {
                warn!(query, "Planner returned no sub-queries, using query verbatim");
                vec![Self::fallback(query)]
            }
            Err(e) => {
                warn!(query, error = %e, "Planning failed, using query verbatim");
                vec![Self::fallback(query)]
            }
        }
    }

    /// Single sub-query equal to the original text
    pub fn fallback(query: &str) -> SubQuery {
        SubQuery::new(query, query)
    }

    async fn decompose(&self, query: &str, understanding: &str) -> Result<Vec<SubQuery>> {
        let messages = [
            ChatMessage::system(prompts::PLAN_SYSTEM),
            ChatMessage::user(prompts::plan(query, understanding, self.max_sub_queries)),
        ];
        let response: PlanResponse = complete_typed(self.llm.as_ref(), &messages).await?;

        Ok(response
            .sub_queries
            .into_iter()
            .filter(|p| !p.question.trim().is_empty())
            .map(|p| {
                let search = if p.search_query.trim().is_empty() {
                    p.question.trim().to_string()
                } else {
                    p.search_query.trim().to_string()
                };
                SubQuery::new(p.question.trim(), search)
            })
            .take(self.max_sub_queries)
            .collect())
    }

    /// Fresh search strings for the sub-queries that still need research
    ///
    /// Answered sub-queries are returned untouched. A missing search string
    /// in the response keeps the previous one.
    pub async fn replan(&self, query: &str, sub_queries: &[SubQuery]) -> Result<Vec<SubQuery>> {
        let pending: Vec<SubQuery> = sub_queries.iter().filter(|s| s.needs_research()).cloned().collect();
        if pending.is_empty() {
            return Ok(sub_queries.to_vec());
        }

        let messages = [
            ChatMessage::system(prompts::REPLAN_SYSTEM),
            ChatMessage::user(prompts::replan(query, &pending)),
        ];
        let response: ReplanResponse = complete_typed(self.llm.as_ref(), &messages).await?;

        if response.search_queries.iter().all(|q| q.trim().is_empty()) {
            return Err(AppError::LlmResponse {
                message: "re-planning returned no search queries".to_string(),
            });
        }

        let mut fresh = response.search_queries.into_iter();
        Ok(sub_queries
            .iter()
            .map(|sub| {
                if !sub.needs_research() {
                    return sub.clone();
                }
                let mut updated = sub.clone();
                if let Some(search) = fresh.next().filter(|q| !q.trim().is_empty()) {
                    updated.search_query = search.trim().to_string();
                }
                updated
            })
            .collect())
    }
}
