//! Pipeline state threaded through the research state machine
//!
//! Transitions never mutate the state they are given. Each returns a
//! [`StateUpdate`] that the driver folds in with [`PipelineState::apply`].

use crate::compression::ScoredSource;
use crate::types::{ExtractedFact, ResearchResult, Source, SubQuery};
use indexmap::IndexMap;
use researchforge_common::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// State machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Understanding,
    Planning,
    Searching,
    Analyzing,
    Synthesizing,
    Extracting,
    Error,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Understanding => "understanding",
            Phase::Planning => "planning",
            Phase::Searching => "searching",
            Phase::Analyzing => "analyzing",
            Phase::Synthesizing => "synthesizing",
            Phase::Extracting => "extracting",
            Phase::Error => "error",
            Phase::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification driving the retry transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Llm,
    Search,
    Unknown,
}

impl ErrorKind {
    /// Classify `error` raised in a phase whose failures are of kind `phase_kind`
    ///
    /// Local faults (configuration, validation, internal) are not worth
    /// retrying and come out as `Unknown`.
    pub fn classify(phase_kind: ErrorKind, error: &AppError) -> ErrorKind {
        match error {
            AppError::Configuration { .. }
            | AppError::Validation { .. }
            | AppError::InvalidFormat { .. }
            | AppError::Internal { .. }
            | AppError::CacheError { .. } => ErrorKind::Unknown,
            AppError::Search { .. } => ErrorKind::Search,
            _ => phase_kind,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Unknown)
    }

    /// Phase a retry of this kind resumes from
    pub fn retry_target(&self) -> Phase {
        match self {
            ErrorKind::Search => Phase::Searching,
            _ => Phase::Understanding,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Llm => "llm",
            ErrorKind::Search => "search",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Last error recorded by a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub phase: Phase,
    pub message: String,
}

/// Mutable record of one research run
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub query: String,
    pub understanding: String,
    pub sub_queries: Vec<SubQuery>,

    /// Queued search strings and the next one to issue
    pub search_queries: Vec<String>,
    pub search_cursor: usize,

    /// Everything fetched so far, keyed by URL; re-fetches overwrite
    pub raw_sources: IndexMap<String, Source>,

    /// Compressed and ranked sources, best first
    pub processed: Vec<ScoredSource>,

    /// Sources handed to synthesis, in citation order
    pub cited: Vec<Source>,

    pub answer: String,
    pub facts: Vec<ExtractedFact>,
    pub follow_ups: Vec<String>,

    pub phase: Phase,
    pub error: Option<PipelineError>,
    pub retry_count: u32,
    pub max_retries: u32,

    /// Transitions taken so far
    pub steps: usize,
}

impl PipelineState {
    pub fn new(query: impl Into<String>, max_retries: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            understanding: String::new(),
            sub_queries: Vec::new(),
            search_queries: Vec::new(),
            search_cursor: 0,
            raw_sources: IndexMap::new(),
            processed: Vec::new(),
            cited: Vec::new(),
            answer: String::new(),
            facts: Vec::new(),
            follow_ups: Vec::new(),
            phase: Phase::Understanding,
            error: None,
            retry_count: 0,
            max_retries,
            steps: 0,
        }
    }

    /// Search string at the cursor, if any remain
    pub fn next_search_query(&self) -> Option<&str> {
        self.search_queries.get(self.search_cursor).map(String::as_str)
    }

    /// Fold a transition's partial update into the state
    pub fn apply(&mut self, update: StateUpdate) {
        self.phase = update.phase;
        self.steps += 1;

        if let Some(understanding) = update.understanding {
            self.understanding = understanding;
        }
        if let Some(sub_queries) = update.sub_queries {
            self.sub_queries = sub_queries;
        }
        if let Some(search_queries) = update.search_queries {
            self.search_queries = search_queries;
        }
        if let Some(cursor) = update.search_cursor {
            self.search_cursor = cursor;
        }
        for source in update.new_sources {
            self.raw_sources.insert(source.url.clone(), source);
        }
        if let Some(processed) = update.processed {
            self.processed = processed;
        }
        if let Some(cited) = update.cited {
            self.cited = cited;
        }
        if let Some(answer) = update.answer {
            self.answer = answer;
        }
        if let Some(facts) = update.facts {
            self.facts = facts;
        }
        if let Some(follow_ups) = update.follow_ups {
            self.follow_ups = follow_ups;
        }
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }

        if update.error.is_some() {
            self.error = update.error;
        } else if update.clear_error {
            self.error = None;
        }
    }

    /// Final result; source ids are assigned here, in citation order
    ///
    /// When synthesis never succeeded the best processed sources are
    /// returned so callers still get whatever was gathered.
    pub fn into_result(self, max_sources: usize) -> ResearchResult {
        let sources = if self.cited.is_empty() {
            self.processed
                .into_iter()
                .take(max_sources)
                .map(|s| s.source)
                .collect()
        } else {
            self.cited
        };

        let sources = sources
            .into_iter()
            .zip(1u32..)
            .map(|(mut source, id)| {
                source.id = id;
                source
            })
            .collect();

        ResearchResult {
            query: self.query,
            answer: self.answer,
            sources,
            facts: self.facts,
            follow_up_questions: self.follow_ups,
        }
    }
}

/// Partial update returned by a transition
#[derive(Debug)]
pub struct StateUpdate {
    pub phase: Phase,
    pub understanding: Option<String>,
    pub sub_queries: Option<Vec<SubQuery>>,
    pub search_queries: Option<Vec<String>>,
    pub search_cursor: Option<usize>,
    /// Merged into the raw-source map by URL
    pub new_sources: Vec<Source>,
    pub processed: Option<Vec<ScoredSource>>,
    pub cited: Option<Vec<Source>>,
    pub answer: Option<String>,
    pub facts: Option<Vec<ExtractedFact>>,
    pub follow_ups: Option<Vec<String>>,
    pub retry_count: Option<u32>,
    pub error: Option<PipelineError>,
    pub clear_error: bool,
}

impl StateUpdate {
    /// Move to `phase` with no other changes
    pub fn to(phase: Phase) -> Self {
        Self {
            phase,
            understanding: None,
            sub_queries: None,
            search_queries: None,
            search_cursor: None,
            new_sources: Vec::new(),
            processed: None,
            cited: None,
            answer: None,
            facts: None,
            follow_ups: None,
            retry_count: None,
            error: None,
            clear_error: false,
        }
    }

    /// Move to the error phase
    pub fn failed(kind: ErrorKind, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            error: Some(PipelineError { kind, phase, message: message.into() }),
            ..Self::to(Phase::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sources_overwrite_by_url() {
        let mut state = PipelineState::new("q", 2);

        state.apply(StateUpdate {
            new_sources: vec![
                Source::new("https://a", "A", 0.2).with_content("stale"),
                Source::new("https://b", "B", 0.2),
            ],
            ..StateUpdate::to(Phase::Searching)
        });
        state.apply(StateUpdate {
            new_sources: vec![Source::new("https://a", "A", 0.4).with_content("richer")],
            ..StateUpdate::to(Phase::Analyzing)
        });

        assert_eq!(state.raw_sources.len(), 2);
        assert_eq!(state.raw_sources["https://a"].content.as_deref(), Some("richer"));
        // position of the first fetch is kept
        assert_eq!(state.raw_sources.get_index(0).map(|(k, _)| k.as_str()), Some("https://a"));
        assert_eq!(state.steps, 2);
    }

    #[test]
    fn test_error_set_and_cleared() {
        let mut state = PipelineState::new("q", 2);

        state.apply(StateUpdate::failed(ErrorKind::Llm, Phase::Synthesizing, "boom"));
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(ErrorKind::Llm));

        state.apply(StateUpdate {
            retry_count: Some(1),
            clear_error: true,
            ..StateUpdate::to(Phase::Understanding)
        });
        assert!(state.error.is_none());
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn test_classify_errors() {
        let llm = AppError::Llm { message: "x".into() };
        let search = AppError::Search { message: "x".into() };
        let config = AppError::Configuration { message: "x".into() };

        assert_eq!(ErrorKind::classify(ErrorKind::Llm, &llm), ErrorKind::Llm);
        assert_eq!(ErrorKind::classify(ErrorKind::Llm, &search), ErrorKind::Search);
        assert_eq!(ErrorKind::classify(ErrorKind::Llm, &config), ErrorKind::Unknown);
        assert_eq!(ErrorKind::Search.retry_target(), Phase::Searching);
        assert_eq!(ErrorKind::Llm.retry_target(), Phase::Understanding);
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_ids_assigned_at_output() {
        let mut state = PipelineState::new("q", 2);
        state.cited = vec![Source::new("https://a", "A", 0.5), Source::new("https://b", "B", 0.4)];
        assert!(state.cited.iter().all(|s| s.id == 0));

        let result = state.into_result(8);
        let ids: Vec<u32> = result.sources.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
