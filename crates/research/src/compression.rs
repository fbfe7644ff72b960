//! Relevance & Compression Engine
//!
//! Provides:
//! - Keyword-window excerpts with coverage/density scoring
//! - LLM-summarized extracts with phrase-adjusted scoring
//! - Per-source strategy selection with keyword fallback
//!
//! Output is filtered to positive scores and ranked best first.

use crate::prompts;
use crate::terms::{extract_terms, FoldedText};
use crate::types::Source;
use futures::stream::{self, StreamExt};
use researchforge_common::llm::{ChatMessage, CompletionService};
use researchforge_common::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters kept on either side of a keyword hit
pub const WINDOW_RADIUS: usize = 500;

/// Content shorter than this is never sent for summarization
pub const MIN_SUMMARY_CONTENT: usize = 100;

const HIGH_CONFIDENCE_PHRASES: &[&str] = &[
    "specifically mentions",
    "data shows",
    "according to",
    "explicitly states",
    "directly addresses",
    "reports that",
];

const LOW_RELEVANCE_PHRASES: &[&str] = &[
    "not directly related",
    "no relevant information",
    "does not mention",
    "does not contain",
    "unrelated to",
    "not relevant",
];

/// How a source was reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    KeywordWindow,
    LlmSummary,
    /// Raw content, used when the compression pass itself did not finish
    Uncompressed,
}

/// A source with its compressed content and relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSource {
    pub source: Source,
    pub score: f32,
    pub strategy: CompressionStrategy,
}

/// Result of scanning content for query terms
#[derive(Debug, Clone, Default)]
pub struct KeywordMatch {
    pub score: f32,
    pub coverage: f32,
    /// Occurrences per 1000 characters
    pub density: f32,
    /// Byte ranges of every term occurrence
    pub hits: Vec<Range<usize>>,
}

/// Corpus-size scaled summary length
pub fn target_length(source_count: usize) -> usize {
    match source_count {
        0..=5 => 4000,
        6..=10 => 3000,
        11..=20 => 2000,
        21..=30 => 1500,
        _ => 1000,
    }
}

/// Score `content` against `terms`: `0.7 * coverage + 0.3 * min(density / 10, 1)`
pub fn keyword_match(terms: &[String], content: &str) -> KeywordMatch {
    if terms.is_empty() || content.is_empty() {
        return KeywordMatch::default();
    }

    let folded = FoldedText::new(content);
    let mut hits = Vec::new();
    let mut found = 0usize;

    for term in terms {
        let before = hits.len();
        hits.extend(
            folded
                .text
                .match_indices(term.as_str())
                .map(|(start, matched)| folded.original_range(start..start + matched.len())),
        );
        if hits.len() > before {
            found += 1;
        }
    }

    let coverage = found as f32 / terms.len() as f32;
    let density = hits.len() as f32 * 1000.0 / content.chars().count() as f32;
    let score = 0.7 * coverage + 0.3 * (density / 10.0).min(1.0);

    hits.sort_by_key(|r| r.start);

    KeywordMatch { score, coverage, density, hits }
}

/// Excerpt windows around `hits`, merged and snapped to sentence breaks
pub fn excerpt_windows(content: &str, hits: &[Range<usize>], radius: usize) -> Vec<Range<usize>> {
    let len = content.len();
    let windows = hits
        .iter()
        .map(|hit| hit.start.saturating_sub(radius)..(hit.end + radius).min(len))
        .collect();

    let snapped = merge_ranges(windows)
        .into_iter()
        .map(|window| snap_to_breaks(content.as_bytes(), window))
        .collect();

    merge_ranges(snapped)
}

fn is_break(byte: &u8) -> bool {
    matches!(byte, b'.' | b'!' | b'?' | b'\n')
}

/// Move both ends outward to the nearest sentence or line break
///
/// Works on bytes so that a window edge inside a multi-byte character is
/// always moved onto an ASCII boundary (or the ends of the text).
fn snap_to_breaks(bytes: &[u8], window: Range<usize>) -> Range<usize> {
    let start = bytes[..window.start]
        .iter()
        .rposition(is_break)
        .map(|idx| idx + 1)
        .unwrap_or(0);

    let end = bytes[window.end..]
        .iter()
        .position(is_break)
        .map(|idx| window.end + idx + 1)
        .unwrap_or(bytes.len());

    start..end
}

fn merge_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());

    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }

    merged
}

/// Keyword-window compression of one document
pub fn keyword_window(terms: &[String], content: &str) -> (f32, String) {
    let matched = keyword_match(terms, content);
    if matched.hits.is_empty() {
        return (0.0, String::new());
    }

    let excerpt = excerpt_windows(content, &matched.hits, WINDOW_RADIUS)
        .into_iter()
        .map(|window| content[window].trim())
        .collect::<Vec<_>>()
        .join("\n...\n");

    (matched.score, excerpt)
}

/// Score an LLM summary: length base, term overlap, phrase adjustments
pub fn summary_score(summary: &str, terms: &[String]) -> f32 {
    let lower = summary.to_lowercase();

    if LOW_RELEVANCE_PHRASES.iter().any(|p| lower.contains(p)) {
        return 0.1;
    }

    let base = (summary.chars().count() as f32 / 2000.0).min(1.0);
    let overlap = if terms.is_empty() {
        0.0
    } else {
        terms.iter().filter(|t| lower.contains(t.as_str())).count() as f32 / terms.len() as f32
    };

    let mut score = 0.6 * base + 0.4 * overlap;
    if HIGH_CONFIDENCE_PHRASES.iter().any(|p| lower.contains(p)) {
        score = (score + 0.3).min(1.0);
    }
    score
}

/// Relevance & compression engine
pub struct CompressionEngine {
    llm: Option<Arc<dyn CompletionService>>,
    concurrency: usize,
}

impl CompressionEngine {
    /// Engine that summarizes long sources with the completion service
    pub fn new(llm: Arc<dyn CompletionService>, concurrency: usize) -> Self {
        Self {
            llm: Some(llm),
            concurrency: concurrency.max(1),
        }
    }

    /// Engine that only uses keyword windows
    pub fn keyword_only() -> Self {
        Self { llm: None, concurrency: 1 }
    }

    /// Strategy for a piece of content
    pub fn strategy_for(&self, content: &str) -> CompressionStrategy {
        if self.llm.is_some() && content.chars().count() >= MIN_SUMMARY_CONTENT {
            CompressionStrategy::LlmSummary
        } else {
            CompressionStrategy::KeywordWindow
        }
    }

    /// Compress and rank `sources` for `query`
    ///
    /// Terms come from the query plus its sub-questions. Sources scoring
    /// zero are dropped; the rest are sorted by score, best first.
    pub async fn compress(&self, query: &str, questions: &[String], sources: Vec<Source>) -> Vec<ScoredSource> {
        let mut texts = vec![query.to_string()];
        texts.extend(questions.iter().cloned());
        let terms = extract_terms(&texts);
        let target = target_length(sources.len());

        debug!(sources = sources.len(), terms = terms.len(), target, "Compressing sources");

        let mut scored: Vec<ScoredSource> = stream::iter(sources)
            .map(|source| self.compress_one(query, questions, &terms, target, source))
            .buffered(self.concurrency)
            .collect()
            .await;

        scored.retain(|s| s.score > 0.0);
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored
    }

    async fn compress_one(
        &self,
        query: &str,
        questions: &[String],
        terms: &[String],
        target: usize,
        mut source: Source,
    ) -> ScoredSource {
        let content = source.content.take().unwrap_or_default();

        if let (CompressionStrategy::LlmSummary, Some(llm)) = (self.strategy_for(&content), &self.llm) {
            match summarize(llm.as_ref(), query, questions, &content, target).await {
                Ok(summary) => {
                    let score = summary_score(&summary, terms);
                    source.content = Some(summary);
                    return ScoredSource { source, score, strategy: CompressionStrategy::LlmSummary };
                }
                Err(e) => {
                    warn!(url = %source.url, error = %e, "Summarization failed, using keyword windows");
                }
            }
        }

        let (score, excerpt) = keyword_window(terms, &content);
        source.content = Some(excerpt);
        ScoredSource { source, score, strategy: CompressionStrategy::KeywordWindow }
    }
}

async fn summarize(
    llm: &dyn CompletionService,
    query: &str,
    questions: &[String],
    content: &str,
    target: usize,
) -> Result<String> {
    let messages = [
        ChatMessage::system(prompts::COMPRESS_SYSTEM),
        ChatMessage::user(prompts::compress(query, questions, content, target)),
    ];
    let summary = llm.complete(&messages).await?;
    let summary = summary.trim();

    if summary.is_empty() {
        return Err(researchforge_common::AppError::LlmResponse {
            message: "empty summary".to_string(),
        });
    }

    Ok(summary.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchforge_common::llm::MockCompletion;
    use researchforge_common::AppError;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_target_length_scales_with_corpus() {
        assert_eq!(target_length(1), 4000);
        assert_eq!(target_length(5), 4000);
        assert_eq!(target_length(6), 3000);
        assert_eq!(target_length(20), 2000);
        assert_eq!(target_length(30), 1500);
        assert_eq!(target_length(31), 1000);
    }

    #[test]
    fn test_keyword_score_formula() {
        // 1 of 2 terms, 1 hit in 1000 chars -> 0.7 * 0.5 + 0.3 * 0.1
        let content = format!("tax{}", " ".repeat(997));
        let matched = keyword_match(&terms(&["tax", "sweden"]), &content);

        assert!((matched.coverage - 0.5).abs() < 1e-6);
        assert!((matched.density - 1.0).abs() < 1e-6);
        assert!((matched.score - 0.38).abs() < 1e-6);
    }

    #[test]
    fn test_keyword_density_counts_characters() {
        // 500 two-byte characters: one hit per 500 chars, not per 1000 bytes
        let content = format!("Öland{}", "ä".repeat(495));
        let matched = keyword_match(&terms(&["öland"]), &content);

        assert_eq!(matched.hits, vec![0.."Öland".len()]);
        assert!((matched.density - 2.0).abs() < 1e-6);
        assert!((matched.coverage - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_windows_merge_and_snap() {
        let filler = "Filler sentence without hits. ".repeat(40);
        let content = format!("{filler}The tax rose. Then tax fell.{filler}Final tax note.");
        let matched = keyword_match(&terms(&["tax"]), &content);
        assert_eq!(matched.hits.len(), 3);

        let windows = excerpt_windows(&content, &matched.hits, 50);
        // first two hits are close enough to share one window
        assert_eq!(windows.len(), 2);
        for window in &windows {
            let text = &content[window.clone()];
            assert!(window.start == 0 || content.as_bytes()[window.start - 1] == b'.');
            assert!(text.ends_with('.'));
            assert!(text.contains("tax"));
        }
    }

    #[test]
    fn test_window_snapping_handles_multibyte_text() {
        let content = format!("{}skatt på spel{}", "ö".repeat(300), "å".repeat(300));
        let (score, excerpt) = keyword_window(&terms(&["skatt"]), &content);
        assert!(score > 0.0);
        assert_eq!(excerpt, content.trim());
    }

    #[test]
    fn test_summary_score_phrases() {
        let t = terms(&["tax", "sweden"]);

        let plain = summary_score("Sweden applies a tax.", &t);
        assert!(plain > 0.4 && plain < 0.5);

        let boosted = summary_score("The page specifically mentions the Sweden tax.", &t);
        assert!((boosted - (plain_for("The page specifically mentions the Sweden tax.", &t) + 0.3)).abs() < 1e-6);

        // low-relevance phrasing wins over a boost
        let floored = summary_score("Data shows this is not directly related to the tax.", &t);
        assert_eq!(floored, 0.1);
    }

    fn plain_for(summary: &str, terms: &[String]) -> f32 {
        let base = (summary.chars().count() as f32 / 2000.0).min(1.0);
        let lower = summary.to_lowercase();
        let overlap = terms.iter().filter(|t| lower.contains(t.as_str())).count() as f32 / terms.len() as f32;
        0.6 * base + 0.4 * overlap
    }

    #[tokio::test]
    async fn test_compress_filters_zero_and_sorts_descending() {
        let engine = CompressionEngine::keyword_only();
        let sources = vec![
            Source::new("https://a", "A", 0.5).with_content("Nothing to see here."),
            Source::new("https://b", "B", 0.5).with_content("Gambling tax applies."),
            Source::new("https://c", "C", 0.5).with_content("Swedish gambling tax rate for 2026."),
            Source::new("https://d", "D", 0.5).with_content("A tax."),
        ];

        let scored = engine.compress("Swedish gambling tax rate 2026", &[], sources).await;

        assert!(scored.iter().all(|s| s.score > 0.0));
        assert!(scored.iter().all(|s| s.source.url != "https://a"));
        assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(scored[0].source.url, "https://c");
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_keywords() {
        let llm = MockCompletion::new(|_| Err(AppError::Llm { message: "down".into() }));
        let engine = CompressionEngine::new(Arc::new(llm.clone()), 2);
        let content = format!("The Swedish gambling tax is 22%. {}", "Background. ".repeat(20));
        let sources = vec![Source::new("https://se", "SE", 0.5).with_content(content)];

        let scored = engine.compress("Swedish gambling tax", &[], sources).await;

        assert_eq!(llm.call_count(), 1);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].strategy, CompressionStrategy::KeywordWindow);
        assert!(scored[0].source.content.as_deref().unwrap_or_default().contains("22%"));
    }

    #[tokio::test]
    async fn test_llm_summary_used_for_long_content() {
        let llm = MockCompletion::new(|_| Ok("Data shows the Swedish gambling tax is 22%.".to_string()));
        let engine = CompressionEngine::new(Arc::new(llm), 2);
        let sources = vec![
            Source::new("https://long", "Long", 0.5).with_content("x".repeat(200)),
            Source::new("https://short", "Short", 0.5).with_content("gambling tax"),
        ];

        let scored = engine.compress("Swedish gambling tax", &[], sources).await;

        let long = scored.iter().find(|s| s.source.url == "https://long").unwrap();
        assert_eq!(long.strategy, CompressionStrategy::LlmSummary);
        assert!(long.score > 0.7);

        let short = scored.iter().find(|s| s.source.url == "https://short").unwrap();
        assert_eq!(short.strategy, CompressionStrategy::KeywordWindow);
    }
}
