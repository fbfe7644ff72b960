//! Synthesis & Extraction
//!
//! Provides:
//! - Cited markdown answers from ranked sources
//! - Structured fact extraction grounded in the cited sources
//! - Follow-up question suggestions
//! - One-sentence finding summaries for scraped pages
//!
//! Only answer synthesis can fail; everything else degrades to empty output.

use crate::prompts;
use crate::terms::first_sentence;
use crate::types::{ExtractedFact, FactType, Source};
use regex_lite::Regex;
use researchforge_common::llm::{complete_typed, ChatMessage, CompletionService};
use researchforge_common::{AppError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Maximum length of a finding summary
pub const FINDING_MAX_CHARS: usize = 100;

/// Follow-up questions kept per answer
pub const FOLLOW_UP_COUNT: usize = 3;

/// Matches `[n]` citation markers
pub fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("citation pattern is valid"))
}

/// Citation ids referenced in `text`, in order of first appearance
pub fn cited_ids(text: &str) -> Vec<u32> {
    let mut ids = Vec::new();
    for capture in citation_pattern().captures_iter(text) {
        if let Ok(id) = capture[1].parse::<u32>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[derive(Debug, Deserialize)]
struct FactsResponse {
    #[serde(default)]
    facts: Vec<ExtractedFact>,
}

#[derive(Debug, Deserialize)]
struct FollowUpResponse {
    #[serde(default)]
    questions: Vec<String>,
}

/// Synthesizer for answers, facts and follow-ups
pub struct Synthesizer {
    llm: Arc<dyn CompletionService>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    /// Cited answer from `sources`, numbered `[1]..[N]` in slice order
    pub async fn synthesize(&self, query: &str, understanding: &str, sources: &[Source]) -> Result<String> {
        let messages = [
            ChatMessage::system(prompts::SYNTHESIZE_SYSTEM),
            ChatMessage::user(prompts::synthesize(query, understanding, sources)),
        ];
        let answer = self.llm.complete(&messages).await?;
        let answer = answer.trim().to_string();

        if answer.is_empty() {
            return Err(AppError::LlmResponse {
                message: "synthesis returned an empty answer".to_string(),
            });
        }

        let cited = cited_ids(&answer);
        let dangling = cited.iter().filter(|id| **id == 0 || **id as usize > sources.len()).count();
        if dangling > 0 {
            warn!(dangling, sources = sources.len(), "Answer cites sources that were not provided");
        }
        debug!(citations = cited.len(), chars = answer.len(), "Answer synthesized");

        Ok(answer)
    }

    /// Facts grounded in `sources`; ids outside `1..=sources.len()` are dropped
    pub async fn extract_facts(&self, query: &str, answer: &str, sources: &[Source]) -> Vec<ExtractedFact> {
        let messages = [
            ChatMessage::system(prompts::FACTS_SYSTEM),
            ChatMessage::user(prompts::facts(query, answer, sources)),
        ];

        let response: FactsResponse = match complete_typed(self.llm.as_ref(), &messages).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Fact extraction failed");
                return Vec::new();
            }
        };

        let max_id = sources.len() as u32;
        response
            .facts
            .into_iter()
            .filter(|f| !f.fact.trim().is_empty())
            .map(|mut fact| {
                let ids: BTreeSet<u32> = fact
                    .source_ids
                    .iter()
                    .copied()
                    .filter(|id| (1..=max_id).contains(id))
                    .collect();
                fact.source_ids = ids.into_iter().collect();
                fact
            })
            .collect()
    }

    /// Up to three follow-up questions
    pub async fn follow_up_questions(&self, query: &str, answer: &str) -> Vec<String> {
        let messages = [
            ChatMessage::system(prompts::FOLLOW_UP_SYSTEM),
            ChatMessage::user(prompts::follow_up(query, answer)),
        ];

        match complete_typed::<FollowUpResponse>(self.llm.as_ref(), &messages).await {
            Ok(response) => response
                .questions
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(FOLLOW_UP_COUNT)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Follow-up generation failed");
                Vec::new()
            }
        }
    }

    /// One-sentence finding (at most 100 characters) for a scraped page
    pub async fn finding(&self, query: &str, content: &str) -> Result<String> {
        let messages = [
            ChatMessage::system(prompts::FINDING_SYSTEM),
            ChatMessage::user(prompts::finding(query, content)),
        ];
        let text = self.llm.complete(&messages).await?;
        Ok(first_sentence(&text, FINDING_MAX_CHARS))
    }
}

/// Fact kind guessed from the wording of a snippet
pub fn classify_snippet(text: &str) -> FactType {
    let trimmed = text.trim_start();
    if trimmed.starts_with(['"', '\u{201c}']) {
        FactType::Quote
    } else if text.contains('%') || text.chars().any(|c| c.is_ascii_digit()) {
        FactType::Statistic
    } else if text.contains(" is defined as ") || text.contains(" refers to ") {
        FactType::Definition
    } else {
        FactType::Claim
    }
}
