//! Query term extraction and lightweight text helpers
//!
//! Provides:
//! - Stop-word filtered term extraction with quoted phrase support
//! - Keyword containment scoring
//! - Sentence / length clamping for short generated text

use indexmap::IndexSet;
use regex_lite::Regex;
use std::ops::Range;
use std::sync::OnceLock;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been",
    "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "its", "as", "do", "does", "did", "has", "have", "had",
    "can", "could", "will", "would", "should", "may", "might",
    "what", "which", "who", "whom", "when", "where", "why", "how",
    "about", "into", "than", "then", "there", "their", "they", "them",
    "i", "me", "my", "we", "our", "you", "your", "all", "any", "some",
];

fn quoted_phrase_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([^"]+)""#).expect("quoted phrase pattern is valid"))
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Extract lowercase search terms from one or more texts
///
/// Quoted phrases are kept whole; everything else is split into
/// alphanumeric tokens with stop words and single characters removed.
/// Order of first appearance is preserved and duplicates are dropped.
pub fn extract_terms<S: AsRef<str>>(texts: &[S]) -> Vec<String> {
    let mut terms = IndexSet::new();

    for text in texts {
        let text = text.as_ref();

        for capture in quoted_phrase_pattern().captures_iter(text) {
            let phrase = capture[1].trim().to_lowercase();
            if !phrase.is_empty() {
                terms.insert(phrase);
            }
        }

        let unquoted = quoted_phrase_pattern().replace_all(text, " ");
        for token in unquoted.split(|c: char| !c.is_alphanumeric()) {
            let token = token.to_lowercase();
            if token.chars().count() > 1 && !is_stop_word(&token) {
                terms.insert(token);
            }
        }
    }

    terms.into_iter().collect()
}

/// Fraction of terms that appear in `content` (0.0 - 1.0)
pub fn containment_score(terms: &[String], content: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }

    let haystack = content.to_lowercase();
    let found = terms.iter().filter(|t| haystack.contains(t.as_str())).count();

    (found as f32 / terms.len() as f32).min(1.0)
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Lowercased text that remembers where each byte came from
///
/// Lowercasing can change byte lengths outside ASCII, so match offsets in
/// `text` are mapped back through `origin` before slicing the original.
#[derive(Debug, Clone)]
pub struct FoldedText {
    pub text: String,
    origin: Vec<usize>,
}

impl FoldedText {
    pub fn new(content: &str) -> Self {
        let mut text = String::with_capacity(content.len());
        let mut origin = Vec::with_capacity(content.len() + 1);

        for (offset, c) in content.char_indices() {
            for lower in c.to_lowercase() {
                text.push(lower);
                origin.extend(std::iter::repeat(offset).take(lower.len_utf8()));
            }
        }
        origin.push(content.len());

        Self { text, origin }
    }

    /// Byte range in the original content for a range of `text`
    pub fn original_range(&self, range: Range<usize>) -> Range<usize> {
        self.origin[range.start]..self.origin[range.end]
    }
}

/// Whether the terminator at byte `idx` of `text` ends a sentence
///
/// A terminator must be followed by whitespace or the end of the text, and
/// a period closing an initialism ("U.S.") or a lone capital ("J.") does
/// not count.
fn ends_sentence(text: &str, idx: usize) -> bool {
    let rest = &text[idx + 1..];
    if !rest.chars().next().map_or(true, char::is_whitespace) {
        return false;
    }
    if &text[idx..idx + 1] != "." || rest.trim().is_empty() {
        return true;
    }

    let word = text[..idx].rsplit(char::is_whitespace).next().unwrap_or("");
    let mut letters = word.chars();
    let initial = matches!((letters.next(), letters.next()), (Some(c), None) if c.is_uppercase());
    !(initial || word.contains('.'))
}

/// First sentence of `text`, clamped to `max_chars`
pub fn first_sentence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let end = trimmed.char_indices().find_map(|(idx, c)| match c {
        '\n' => Some(idx),
        '.' | '!' | '?' if ends_sentence(trimmed, idx) => Some(idx + 1),
        _ => None,
    });
    let sentence = end.map_or(trimmed, |end| &trimmed[..end]).trim();

    truncate_chars(sentence, max_chars).trim_end().to_string()
}
