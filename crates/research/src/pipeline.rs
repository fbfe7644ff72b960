//! Research State Machine
//!
//! Drives one research run through
//! understanding → planning → searching → analyzing → synthesizing → extracting,
//! routing failures through the error phase with a bounded retry budget.
//!
//! Every transition is a method taking `&PipelineState` and returning a
//! [`StateUpdate`]; [`ResearchPipeline::execute`] is the only place the
//! state is mutated.

use crate::compression::{CompressionEngine, CompressionStrategy, ScoredSource};
use crate::options::ResearchOptions;
use crate::planner::QueryPlanner;
use crate::prompts;
use crate::state::{ErrorKind, Phase, PipelineState, StateUpdate};
use crate::synthesis::Synthesizer;
use crate::terms::{containment_score, extract_terms};
use crate::types::{ResearchResult, Source, SubQuery};
use futures::stream::{self, StreamExt};
use indexmap::IndexSet;
use researchforge_common::llm::{ChatMessage, CompletionService};
use researchforge_common::metrics::{self, RunMetrics};
use researchforge_common::web::{Page, SearchOptions, WebSearch};
use researchforge_common::AppError;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Live web pages are trusted less than cached or curated material
pub const WEB_QUALITY_WEIGHT: f32 = 0.6;

/// Pages shorter than this get no finding summary
pub const MIN_FINDING_CONTENT: usize = 200;

/// The research state machine
pub struct ResearchPipeline {
    llm: Arc<dyn CompletionService>,
    search: Arc<dyn WebSearch>,
    planner: QueryPlanner,
    compressor: CompressionEngine,
    synthesizer: Synthesizer,
    options: ResearchOptions,
}

impl ResearchPipeline {
    pub fn new(llm: Arc<dyn CompletionService>, search: Arc<dyn WebSearch>, options: ResearchOptions) -> Self {
        let compressor = if options.llm_compression {
            CompressionEngine::new(llm.clone(), options.summary_concurrency)
        } else {
            CompressionEngine::keyword_only()
        };

        Self {
            planner: QueryPlanner::new(llm.clone(), options.max_sub_queries),
            synthesizer: Synthesizer::new(llm.clone()),
            compressor,
            llm,
            search,
            options,
        }
    }

    pub fn options(&self) -> &ResearchOptions {
        &self.options
    }

    /// Research `query` and return the final result
    ///
    /// Never fails: an exhausted retry budget yields an empty answer with
    /// whatever sources were gathered.
    pub async fn run(&self, query: &str) -> ResearchResult {
        let state = self.execute(query).await;
        state.into_result(self.options.max_synthesis_sources)
    }

    /// Drive a fresh state to `complete` and return it
    pub async fn execute(&self, query: &str) -> PipelineState {
        let state = PipelineState::new(query, self.options.max_retries);
        let span = info_span!(
            "research",
            run_id = %state.run_id,
            depth = %self.options.depth,
            model = self.llm.model_name(),
        );

        self.drive(state).instrument(span).await
    }

    async fn drive(&self, mut state: PipelineState) -> PipelineState {
        let run_metrics = RunMetrics::start(self.options.depth.as_str());
        info!(query = %state.query, max_retries = state.max_retries, "Research started");

        while !state.phase.is_terminal() {
            if state.steps >= self.options.step_limit {
                warn!(
                    steps = state.steps,
                    phase = %state.phase,
                    "Step limit reached, completing with partial results"
                );
                metrics::record_transition(state.phase.as_str(), Phase::Complete.as_str());
                state.phase = Phase::Complete;
                break;
            }

            let from = state.phase;
            let update = self.step(&state).await;
            debug!(from = %from, to = %update.phase, "Phase transition");
            metrics::record_transition(from.as_str(), update.phase.as_str());
            state.apply(update);
        }

        info!(
            steps = state.steps,
            retries = state.retry_count,
            sources = state.raw_sources.len(),
            answered = !state.answer.is_empty(),
            "Research complete"
        );
        run_metrics.finish(!state.answer.is_empty());

        state
    }

    /// Compute the transition out of the current phase
    pub async fn step(&self, state: &PipelineState) -> StateUpdate {
        match state.phase {
            Phase::Understanding => self.understand(state).await,
            Phase::Planning => self.plan(state).await,
            Phase::Searching => self.search(state).await,
            Phase::Analyzing => self.analyze(state).await,
            Phase::Synthesizing => self.synthesize(state).await,
            Phase::Extracting => self.extract(state).await,
            Phase::Error => self.recover(state),
            Phase::Complete => StateUpdate::to(Phase::Complete),
        }
    }

    async fn understand(&self, state: &PipelineState) -> StateUpdate {
        let messages = [
            ChatMessage::system(prompts::UNDERSTAND_SYSTEM),
            ChatMessage::user(prompts::understand(&state.query)),
        ];

        match self.llm.complete(&messages).await {
            Ok(understanding) => StateUpdate {
                understanding: Some(understanding.trim().to_string()),
                ..StateUpdate::to(Phase::Planning)
            },
            Err(e) => {
                warn!(error = %e, upstream = e.is_upstream(), "Query understanding failed");
                StateUpdate::failed(ErrorKind::classify(ErrorKind::Llm, &e), Phase::Understanding, e.to_string())
            }
        }
    }

    async fn plan(&self, state: &PipelineState) -> StateUpdate {
        if state.sub_queries.is_empty() {
            let sub_queries = self.planner.plan(&state.query, &state.understanding).await;
            return Self::planned(sub_queries);
        }

        match self.planner.replan(&state.query, &state.sub_queries).await {
            Ok(sub_queries) => Self::planned(sub_queries),
            Err(e) => {
                warn!(error = %e, upstream = e.is_upstream(), "Re-planning failed");
                StateUpdate::failed(ErrorKind::classify(ErrorKind::Llm, &e), Phase::Planning, e.to_string())
            }
        }
    }

    /// Queue searches for every sub-query that still needs research
    fn planned(sub_queries: Vec<SubQuery>) -> StateUpdate {
        let queue: IndexSet<String> = sub_queries
            .iter()
            .filter(|s| s.needs_research())
            .map(|s| s.search_query.clone())
            .collect();

        let next = if queue.is_empty() { Phase::Analyzing } else { Phase::Searching };
        info!(sub_queries = sub_queries.len(), queued = queue.len(), "Planning done");

        StateUpdate {
            sub_queries: Some(sub_queries),
            search_queries: Some(queue.into_iter().collect()),
            search_cursor: Some(0),
            ..StateUpdate::to(next)
        }
    }

    async fn search(&self, state: &PipelineState) -> StateUpdate {
        let Some(search_query) = state.next_search_query() else {
            return StateUpdate::to(Phase::Analyzing);
        };

        let cursor = state.search_cursor + 1;
        let next = if cursor < state.search_queries.len() {
            Phase::Searching
        } else {
            Phase::Analyzing
        };

        let options = SearchOptions {
            limit: self.options.search_limit,
            ..Default::default()
        };

        let pages = match self.search.search(search_query, &options).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(query = search_query, error = %e, "Search failed, skipping query");
                return StateUpdate {
                    search_cursor: Some(cursor),
                    ..StateUpdate::to(next)
                };
            }
        };

        let terms = extract_terms(&[state.query.as_str()]);
        let scored = self.collect_pages(&state.query, &terms, pages).await;

        let confidence = scored.iter().map(|(_, relevance)| *relevance).fold(0.0_f32, f32::max);
        let urls: Vec<String> = scored.iter().map(|(source, _)| source.url.clone()).collect();
        debug!(query = search_query, pages = urls.len(), confidence, "Search done");

        let sub_queries = state
            .sub_queries
            .iter()
            .cloned()
            .map(|mut sub| {
                if sub.search_query == search_query {
                    sub.answered = !urls.is_empty();
                    sub.confidence = confidence;
                    sub.sources = urls.clone();
                }
                sub
            })
            .collect();

        StateUpdate {
            search_cursor: Some(cursor),
            sub_queries: Some(sub_queries),
            new_sources: scored.into_iter().map(|(source, _)| source).collect(),
            ..StateUpdate::to(next)
        }
    }

    /// Turn pages into sources paired with their heuristic relevance
    async fn collect_pages(&self, query: &str, terms: &[String], pages: Vec<Page>) -> Vec<(Source, f32)> {
        let pages = pages.into_iter().filter(|p| !p.url.trim().is_empty());

        stream::iter(pages)
            .map(|page| async move {
                let relevance = containment_score(terms, &page.content);
                let summary = if self.options.summarize_findings
                    && page.content.chars().count() >= MIN_FINDING_CONTENT
                {
                    match self.synthesizer.finding(query, &page.content).await {
                        Ok(finding) if !finding.is_empty() => Some(finding),
                        Ok(_) => None,
                        Err(e) => {
                            debug!(url = %page.url, error = %e, "Finding summary failed");
                            None
                        }
                    }
                } else {
                    None
                };

                let title = page.title.clone().unwrap_or_else(|| page.url.clone());
                let mut source = Source::new(page.url, title, WEB_QUALITY_WEIGHT * relevance)
                    .with_content(page.content);
                source.summary = summary;
                (source, relevance)
            })
            .buffered(self.options.summary_concurrency.max(1))
            .collect()
            .await
    }

    async fn analyze(&self, state: &PipelineState) -> StateUpdate {
        let sources: Vec<Source> = state.raw_sources.values().cloned().collect();
        let questions: Vec<String> = state.sub_queries.iter().map(|s| s.question.clone()).collect();
        let total = sources.len();

        let compression = self.compressor.compress(&state.query, &questions, sources);
        let processed = match tokio::time::timeout(self.options.compression_timeout, compression).await {
            Ok(processed) => {
                info!(kept = processed.len(), total, "Sources compressed");
                processed
            }
            Err(_) => {
                let e = AppError::Timeout {
                    operation: "source compression".to_string(),
                    timeout_ms: self.options.compression_timeout.as_millis() as u64,
                };
                warn!(error = %e, "Compression did not finish, using raw sources");
                uncompressed(state)
            }
        };

        StateUpdate {
            processed: Some(processed),
            ..StateUpdate::to(Phase::Synthesizing)
        }
    }

    async fn synthesize(&self, state: &PipelineState) -> StateUpdate {
        let top: Vec<Source> = state
            .processed
            .iter()
            .take(self.options.max_synthesis_sources)
            .map(|s| s.source.clone())
            .collect();

        if top.is_empty() {
            warn!("No sources to synthesize");
            return StateUpdate::failed(ErrorKind::Search, Phase::Synthesizing, "no sources to synthesize");
        }

        match self.synthesizer.synthesize(&state.query, &state.understanding, &top).await {
            Ok(answer) => StateUpdate {
                answer: Some(answer),
                cited: Some(top),
                ..StateUpdate::to(Phase::Extracting)
            },
            Err(e) => {
                warn!(error = %e, upstream = e.is_upstream(), "Synthesis failed");
                StateUpdate::failed(ErrorKind::classify(ErrorKind::Llm, &e), Phase::Synthesizing, e.to_string())
            }
        }
    }

    async fn extract(&self, state: &PipelineState) -> StateUpdate {
        let (facts, follow_ups) = tokio::join!(
            self.synthesizer.extract_facts(&state.query, &state.answer, &state.cited),
            self.synthesizer.follow_up_questions(&state.query, &state.answer),
        );
        debug!(facts = facts.len(), follow_ups = follow_ups.len(), "Extraction done");

        StateUpdate {
            facts: Some(facts),
            follow_ups: Some(follow_ups),
            ..StateUpdate::to(Phase::Complete)
        }
    }

    fn recover(&self, state: &PipelineState) -> StateUpdate {
        let Some(failure) = &state.error else {
            return StateUpdate::to(Phase::Complete);
        };

        if failure.kind.is_retryable() && state.retry_count < state.max_retries {
            let target = failure.kind.retry_target();
            let attempt = state.retry_count + 1;
            warn!(
                kind = failure.kind.as_str(),
                failed_phase = %failure.phase,
                attempt,
                max_retries = state.max_retries,
                resume = %target,
                "Retrying research"
            );
            metrics::record_retry(failure.kind.as_str());

            return StateUpdate {
                retry_count: Some(attempt),
                clear_error: true,
                search_cursor: (target == Phase::Searching).then_some(0),
                ..StateUpdate::to(target)
            };
        }

        error!(
            kind = failure.kind.as_str(),
            failed_phase = %failure.phase,
            retries = state.retry_count,
            error = %failure.message,
            "Research giving up, returning partial results"
        );
        StateUpdate::to(Phase::Complete)
    }
}

/// Raw sources ranked by trust, used when compression does not finish
fn uncompressed(state: &PipelineState) -> Vec<ScoredSource> {
    let mut sources: Vec<ScoredSource> = state
        .raw_sources
        .values()
        .map(|source| ScoredSource {
            source: source.clone(),
            score: source.quality,
            strategy: CompressionStrategy::Uncompressed,
        })
        .collect();
    sources.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchforge_common::config::ResearchDepth;
    use researchforge_common::llm::MockCompletion;
    use researchforge_common::web::MockWebSearch;
    use researchforge_common::Result;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn llm_error() -> AppError {
        AppError::Llm { message: "model overloaded".to_string() }
    }

    /// Answers every call kind sensibly; planning falls back to the query
    fn cooperative(messages: &[ChatMessage]) -> Result<String> {
        match messages[0].content.as_str() {
            prompts::UNDERSTAND_SYSTEM => Ok("The user wants a tax rate.".to_string()),
            prompts::SYNTHESIZE_SYSTEM => Ok("The rate is 22% [1].".to_string()),
            prompts::FACTS_SYSTEM => Ok(r#"{"facts": [{"fact": "Rate is 22%", "sourceIds": [1], "type": "statistic"}]}"#.to_string()),
            prompts::FOLLOW_UP_SYSTEM => Ok(r#"{"questions": ["Why?"]}"#.to_string()),
            _ => Err(llm_error()),
        }
    }

    fn page(url: &str, content: &str) -> Page {
        Page::new(url, "Title", content)
    }

    #[tokio::test]
    async fn test_scenario_swedish_gambling_tax() {
        let synthesis_prompt = Arc::new(Mutex::new(String::new()));
        let captured = synthesis_prompt.clone();

        let llm = MockCompletion::new(move |messages| match messages[0].content.as_str() {
            prompts::UNDERSTAND_SYSTEM => Ok("The user wants Sweden's gambling tax rate for 2026.".to_string()),
            prompts::PLAN_SYSTEM => Ok(r#"{"subQueries": [{"question": "What is the Swedish gambling tax rate in 2026?", "searchQuery": "Swedish gambling tax rate 2026"}]}"#.to_string()),
            prompts::SYNTHESIZE_SYSTEM => {
                *captured.lock().unwrap() = messages[1].content.clone();
                Ok("Sweden taxes licensed gambling at 22% in 2026 [1][2].".to_string())
            }
            prompts::FACTS_SYSTEM => Ok(r#"{"facts": [{"fact": "The Swedish gambling tax is 22%", "sourceIds": [1, 2, 7], "type": "statistic"}]}"#.to_string()),
            prompts::FOLLOW_UP_SYSTEM => Ok(r#"{"questions": ["a?", "b?", "c?", "d?"]}"#.to_string()),
            _ => Err(llm_error()),
        });

        let search = MockWebSearch::with_pages(vec![
            page("https://news.example/sweden-tax", "Sweden's Swedish tax authority confirmed the gambling tax."),
            page("https://example.com/tax-basics", "A tax is a compulsory levy. Every tax funds public services."),
            page(
                "https://skatteverket.example/gambling",
                "Swedish gambling tax rate for 2026 is 22 percent. Sweden raised the tax rate on licensed gambling.",
            ),
        ]);

        let pipeline = ResearchPipeline::new(
            Arc::new(llm),
            Arc::new(search.clone()),
            ResearchOptions::for_depth(ResearchDepth::Standard),
        );
        let result = pipeline.run("Swedish gambling tax rate 2026").await;

        assert_eq!(search.call_count(), 1);
        let urls: Vec<&str> = result.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://skatteverket.example/gambling",
                "https://news.example/sweden-tax",
                "https://example.com/tax-basics",
            ]
        );
        assert_eq!(result.sources.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        assert!(result.answer.contains("[1]") && result.answer.contains("[2]"));
        let prompt = synthesis_prompt.lock().unwrap().clone();
        assert!(prompt.contains("[1] Title (https://skatteverket.example/gambling)"));
        assert!(prompt.contains("[2] Title (https://news.example/sweden-tax)"));

        assert_eq!(result.facts.len(), 1);
        assert_eq!(result.facts[0].source_ids, vec![1, 2]);
        assert_eq!(result.follow_up_questions.len(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_when_every_search_fails() {
        let search = MockWebSearch::failing();
        let pipeline = ResearchPipeline::new(
            Arc::new(MockCompletion::new(cooperative)),
            Arc::new(search.clone()),
            ResearchOptions::for_depth(ResearchDepth::Standard).with_max_retries(2),
        );

        let state = pipeline.execute("Swedish gambling tax rate 2026").await;

        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.retry_count, 2);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(ErrorKind::Search));
        // one search per cycle: the first pass plus two retries
        assert_eq!(search.call_count(), 3);

        let result = state.into_result(8);
        assert_eq!(result.answer, "");
        assert!(result.sources.is_empty());
        assert!(!result.has_answer());
    }

    #[tokio::test]
    async fn test_llm_failure_retries_from_understanding() {
        let understand_calls = Arc::new(AtomicUsize::new(0));
        let counter = understand_calls.clone();
        let llm = MockCompletion::new(move |messages| match messages[0].content.as_str() {
            prompts::UNDERSTAND_SYSTEM => {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok("wants rates".to_string())
            }
            _ => Err(llm_error()),
        });
        let search = MockWebSearch::with_pages(vec![page("https://a.example", "gambling tax rate")]);

        let pipeline = ResearchPipeline::new(
            Arc::new(llm),
            Arc::new(search.clone()),
            ResearchOptions::for_depth(ResearchDepth::Shallow).with_max_retries(2),
        );
        let state = pipeline.execute("gambling tax rate").await;

        assert_eq!(state.retry_count, 2);
        assert_eq!(understand_calls.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(state.error.as_ref().map(|e| e.phase), Some(Phase::Synthesizing));
        // answered sub-query is not searched again after a retry
        assert_eq!(search.call_count(), 1);

        let result = state.into_result(5);
        assert!(result.answer.is_empty());
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].id, 1);
    }

    #[tokio::test]
    async fn test_failed_query_is_skipped() {
        let llm = MockCompletion::new(|messages| match messages[0].content.as_str() {
            prompts::PLAN_SYSTEM => Ok(r#"{"subQueries": [
                {"question": "Who founded Acme?", "searchQuery": "acme founder"},
                {"question": "When was Acme founded?", "searchQuery": "acme founded year"}
            ]}"#
            .to_string()),
            _ => cooperative(messages),
        });
        let search = MockWebSearch::new(|query, _| {
            if query == "acme founder" {
                Err(AppError::Search { message: "timeout".into() })
            } else {
                Ok(vec![page("https://acme.example/history", "Acme was founded in 1947 by a founder.")])
            }
        });

        let pipeline = ResearchPipeline::new(
            Arc::new(llm),
            Arc::new(search.clone()),
            ResearchOptions::for_depth(ResearchDepth::Standard),
        );
        let state = pipeline.execute("who founded acme and when").await;

        assert_eq!(search.call_count(), 2);
        assert_eq!(state.retry_count, 0);
        assert!(!state.sub_queries[0].answered);
        assert!(state.sub_queries[1].answered);
        assert_eq!(state.sub_queries[1].sources, vec!["https://acme.example/history"]);
        assert!(!state.answer.is_empty());
    }

    #[tokio::test]
    async fn test_confidence_gates_replanning() {
        let llm = MockCompletion::new(|messages| match messages[0].content.as_str() {
            prompts::REPLAN_SYSTEM => Ok(r#"{"searchQueries": ["acme founding date"]}"#.to_string()),
            _ => Err(llm_error()),
        });
        let pipeline = ResearchPipeline::new(
            Arc::new(llm.clone()),
            Arc::new(MockWebSearch::failing()),
            ResearchOptions::default(),
        );

        let mut confident = SubQuery::new("Who founded Acme?", "acme founder");
        confident.answered = true;
        confident.confidence = 0.30;
        let mut weak = SubQuery::new("When was Acme founded?", "acme year");
        weak.answered = true;
        weak.confidence = 0.29;

        let mut state = PipelineState::new("q", 2);
        state.phase = Phase::Planning;
        state.sub_queries = vec![confident.clone(), weak];

        let update = pipeline.step(&state).await;
        assert_eq!(update.phase, Phase::Searching);
        assert_eq!(update.search_queries, Some(vec!["acme founding date".to_string()]));
        assert_eq!(llm.call_count(), 1);

        state.sub_queries = vec![confident];
        let update = pipeline.step(&state).await;
        assert_eq!(update.phase, Phase::Analyzing);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_replanning_failure_is_llm_error() {
        let pipeline = ResearchPipeline::new(
            Arc::new(MockCompletion::unreachable()),
            Arc::new(MockWebSearch::failing()),
            ResearchOptions::default(),
        );
        let mut state = PipelineState::new("q", 2);
        state.phase = Phase::Planning;
        state.sub_queries = vec![SubQuery::new("q", "q")];

        let update = pipeline.step(&state).await;
        assert_eq!(update.phase, Phase::Error);
        assert_eq!(update.error.map(|e| e.kind), Some(ErrorKind::Llm));
    }

    #[tokio::test]
    async fn test_step_limit_stops_run() {
        let mut options = ResearchOptions::default();
        options.step_limit = 3;
        let pipeline = ResearchPipeline::new(
            Arc::new(MockCompletion::new(cooperative)),
            Arc::new(MockWebSearch::failing()),
            options,
        );

        let state = pipeline.execute("q").await;
        assert_eq!(state.steps, 3);
        assert_eq!(state.phase, Phase::Complete);
    }

    #[tokio::test]
    async fn test_finding_summaries_degrade_to_empty() {
        let llm = MockCompletion::new(|messages| match messages[0].content.as_str() {
            prompts::FINDING_SYSTEM if messages[1].content.contains("broken") => Err(llm_error()),
            prompts::FINDING_SYSTEM => Ok("Rate is 22%. Extra.".to_string()),
            _ => cooperative(messages),
        });
        let long = |word: &str| format!("{word} gambling tax rate. {}", "Filler text here. ".repeat(15));
        let search = MockWebSearch::with_pages(vec![
            page("https://ok.example", &long("fine")),
            page("https://broken.example", &long("broken")),
        ]);
        let pipeline = ResearchPipeline::new(
            Arc::new(llm),
            Arc::new(search),
            ResearchOptions::for_depth(ResearchDepth::Standard),
        );

        let mut state = PipelineState::new("gambling tax rate", 2);
        state.phase = Phase::Searching;
        state.search_queries = vec!["gambling tax rate".to_string()];

        let update = pipeline.step(&state).await;
        assert_eq!(update.phase, Phase::Analyzing);
        assert_eq!(update.new_sources.len(), 2);
        assert_eq!(update.new_sources[0].summary.as_deref(), Some("Rate is 22%."));
        assert_eq!(update.new_sources[1].summary, None);
        assert!(update.new_sources.iter().all(|s| s.quality <= WEB_QUALITY_WEIGHT));
    }

    #[tokio::test]
    async fn test_slow_compression_falls_back_to_raw_sources() {
        let llm = MockCompletion::new(cooperative).with_delay(|messages| {
            if messages[0].content == prompts::COMPRESS_SYSTEM {
                Duration::from_millis(500)
            } else {
                Duration::ZERO
            }
        });
        let body = format!("Swedish gambling tax rate is 22 percent. {}", "Background detail. ".repeat(10));
        let search = MockWebSearch::with_pages(vec![
            page("https://a.example", &body),
            page("https://b.example", &body),
        ]);

        let mut options = ResearchOptions::for_depth(ResearchDepth::Standard);
        options.compression_timeout = Duration::from_millis(20);
        let llm = Arc::new(llm);
        let pipeline = ResearchPipeline::new(llm.clone(), Arc::new(search), options);

        let state = pipeline.execute("Swedish gambling tax rate").await;

        assert_eq!(state.processed.len(), 2);
        assert!(state
            .processed
            .iter()
            .all(|s| s.strategy == CompressionStrategy::Uncompressed));
        assert_eq!(state.answer, "The rate is 22% [1].");
        assert_eq!(state.phase, Phase::Complete);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_failure_completes_without_retry() {
        let llm = MockCompletion::new(|_| {
            Err(AppError::Configuration { message: "model not configured".to_string() })
        });
        let search = MockWebSearch::with_pages(vec![page("https://a.example", "gambling tax rate")]);
        let llm = Arc::new(llm);
        let pipeline = ResearchPipeline::new(
            llm.clone(),
            Arc::new(search.clone()),
            ResearchOptions::for_depth(ResearchDepth::Standard).with_max_retries(3),
        );

        let state = pipeline.execute("gambling tax rate").await;

        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(ErrorKind::Unknown));
        assert_eq!(llm.call_count(), 1);
        assert_eq!(search.call_count(), 0);
    }
}
