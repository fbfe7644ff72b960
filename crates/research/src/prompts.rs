//! Prompt templates for every completion call the pipeline makes
//!
//! Each call kind has its own system prompt so that callers (and test
//! doubles) can tell the calls apart.

use crate::types::{Source, SubQuery};

pub const UNDERSTAND_SYSTEM: &str =
    "You are a research analyst. Restate what the user wants to know in two or three sentences, \
     naming the entities, time frame and kind of answer expected.";

pub const PLAN_SYSTEM: &str =
    "You are a research planner. Break the query into the atomic factual questions it contains. \
     Respond with JSON: {\"subQueries\": [{\"question\": \"...\", \"searchQuery\": \"...\"}]}";

pub const REPLAN_SYSTEM: &str =
    "You are a research planner. Earlier web searches did not answer some questions. \
     Write one better web search string per question. Respond with JSON: {\"searchQueries\": [\"...\"]}";

pub const FINDING_SYSTEM: &str =
    "You summarize web pages. Reply with one factual sentence of at most 100 characters stating \
     what the page says about the query. No preamble.";

pub const COMPRESS_SYSTEM: &str =
    "You extract query-relevant material from documents. Keep facts, figures, names and dates verbatim. \
     If the document is not directly related to the query, say so explicitly.";

pub const SYNTHESIZE_SYSTEM: &str =
    "You are a research assistant. Answer based ONLY on the provided sources. \
     Cite sources inline as [1], [2], etc. using the source numbers given. Format the answer in markdown. \
     If the sources do not contain enough information, say so. Do not make up information.";

pub const FACTS_SYSTEM: &str =
    "You extract structured facts from a research answer and its sources. \
     Respond with JSON: {\"facts\": [{\"fact\": \"...\", \"sourceIds\": [1], \"type\": \"statistic|quote|definition|claim\"}]}";

pub const FOLLOW_UP_SYSTEM: &str =
    "You suggest follow-up research questions. Respond with JSON: {\"questions\": [\"...\", \"...\", \"...\"]}";

pub fn understand(query: &str) -> String {
    format!("Research query: {}", query)
}

pub fn plan(query: &str, understanding: &str, max_sub_queries: usize) -> String {
    format!(
        "Query: {}\n\nWhat the user wants: {}\n\n\
         Return at most {} sub-questions. Each searchQuery must be a literal web search string.",
        query, understanding, max_sub_queries
    )
}

pub fn replan(query: &str, pending: &[SubQuery]) -> String {
    let mut prompt = format!("Original query: {}\n\nUnanswered questions:\n", query);
    for (i, sub) in pending.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} (previous search: \"{}\")\n",
            i + 1,
            sub.question,
            sub.search_query
        ));
    }
    prompt.push_str("\nReturn exactly one search string per question, in the same order.");
    prompt
}

pub fn finding(query: &str, content: &str) -> String {
    format!("Query: {}\n\nPage:\n{}", query, content)
}

pub fn compress(query: &str, questions: &[String], content: &str, target_chars: usize) -> String {
    let mut prompt = format!("Query: {}\n", query);
    if !questions.is_empty() {
        prompt.push_str("Related questions:\n");
        for question in questions {
            prompt.push_str(&format!("- {}\n", question));
        }
    }
    prompt.push_str(&format!(
        "\nExtract the passages relevant to the query in at most {} characters. \
         If the document specifically mentions the topic, say so.\n\nDocument:\n{}",
        target_chars, content
    ));
    prompt
}

/// Sources are numbered in slice order, matching their final citation ids
pub fn synthesize(query: &str, understanding: &str, sources: &[Source]) -> String {
    let mut prompt = format!("Question: {}\n", query);
    if !understanding.is_empty() {
        prompt.push_str(&format!("Context: {}\n", understanding));
    }
    prompt.push_str("\nSources:\n");
    push_numbered_sources(&mut prompt, sources);
    prompt.push_str("\nAnswer:");
    prompt
}

pub fn facts(query: &str, answer: &str, sources: &[Source]) -> String {
    let mut prompt = format!("Query: {}\n\nAnswer:\n{}\n\nSources:\n", query, answer);
    push_numbered_sources(&mut prompt, sources);
    prompt.push_str("\nOnly use source numbers listed above.");
    prompt
}

pub fn follow_up(query: &str, answer: &str) -> String {
    format!(
        "Query: {}\n\nAnswer:\n{}\n\nSuggest three short follow-up questions.",
        query, answer
    )
}

fn push_numbered_sources(prompt: &mut String, sources: &[Source]) {
    for (i, source) in sources.iter().enumerate() {
        let body = source
            .content
            .as_deref()
            .or(source.summary.as_deref())
            .unwrap_or_default();
        prompt.push_str(&format!("\n[{}] {} ({})\n{}\n", i + 1, source.title, source.url, body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_numbered_from_one() {
        let sources = vec![
            Source::new("https://a.example", "A", 0.5).with_content("alpha"),
            Source::new("https://b.example", "B", 0.5).with_content("beta"),
        ];
        let prompt = synthesize("q", "", &sources);

        assert!(prompt.contains("[1] A (https://a.example)\nalpha"));
        assert!(prompt.contains("[2] B (https://b.example)\nbeta"));
        assert!(!prompt.contains("[0]"));
    }

    #[test]
    fn test_replan_lists_previous_searches() {
        let pending = vec![SubQuery::new("Who founded X?", "X founder")];
        let prompt = replan("who founded X and when", &pending);
        assert!(prompt.contains("1. Who founded X? (previous search: \"X founder\")"));
    }
}
