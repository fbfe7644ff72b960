//! Research data model
//!
//! Wire names are camelCase so results can be handed to the document
//! layer unchanged.

use serde::{Deserialize, Serialize};

/// A cited source
///
/// `id` is a dense 1-based position assigned only when a result is
/// finalized, so that `[n]` markers in generated text match the array
/// position. Before that it is 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: u32,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Trust score (0.0 - 1.0)
    pub quality: f32,
}

impl Source {
    pub fn new(url: impl Into<String>, title: impl Into<String>, quality: f32) -> Self {
        Self {
            id: 0,
            url: url.into(),
            title: title.into(),
            content: None,
            summary: None,
            quality: quality.clamp(0.0, 1.0),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Kind of an extracted fact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    Statistic,
    Quote,
    Definition,
    #[default]
    Claim,
}

/// A fact grounded in one or more sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFact {
    pub fact: String,
    #[serde(default)]
    pub source_ids: Vec<u32>,
    #[serde(rename = "type", default)]
    pub fact_type: FactType,
}

/// An atomic question derived from the research query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubQuery {
    pub question: String,
    pub search_query: String,
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub confidence: f32,
    /// URLs of pages found for this sub-query
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Below this a sub-query counts as unanswered
pub const MIN_SUB_QUERY_CONFIDENCE: f32 = 0.3;

impl SubQuery {
    pub fn new(question: impl Into<String>, search_query: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            search_query: search_query.into(),
            answered: false,
            confidence: 0.0,
            sources: Vec::new(),
        }
    }

    /// Unanswered or low-confidence sub-queries are searched (again)
    pub fn needs_research(&self) -> bool {
        !self.answered || self.confidence < MIN_SUB_QUERY_CONFIDENCE
    }
}

/// Final output of one research run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub query: String,
    /// Empty when no answer could be generated
    pub answer: String,
    pub sources: Vec<Source>,
    pub facts: Vec<ExtractedFact>,
    pub follow_up_questions: Vec<String>,
}

impl ResearchResult {
    pub fn has_answer(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

/// Research context for one outline section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionResearchContext {
    pub facts: Vec<ExtractedFact>,
    pub sources: Vec<Source>,
    pub statistics: Vec<String>,
    pub quotes: Vec<String>,
}

impl SectionResearchContext {
    /// Build a context, deriving statistics and quotes from the facts
    pub fn new(facts: Vec<ExtractedFact>, sources: Vec<Source>) -> Self {
        let of_type = |kind: FactType| {
            facts
                .iter()
                .filter(|f| f.fact_type == kind)
                .map(|f| f.fact.clone())
                .collect::<Vec<_>>()
        };
        let statistics = of_type(FactType::Statistic);
        let quotes = of_type(FactType::Quote);

        Self { facts, sources, statistics, quotes }
    }
}

/// A node of a document outline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlineSection {
    pub id: String,
    pub heading: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subsections: Vec<OutlineSection>,
}

impl OutlineSection {
    pub fn new(id: impl Into<String>, heading: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            heading: heading.into(),
            description: description.into(),
            subsections: Vec::new(),
        }
    }
}

/// Flatten an outline depth-first (parent before its subsections)
pub fn flatten_outline(outline: &[OutlineSection]) -> Vec<&OutlineSection> {
    let mut flat = Vec::new();
    let mut stack: Vec<&OutlineSection> = outline.iter().rev().collect();

    while let Some(section) = stack.pop() {
        flat.push(section);
        stack.extend(section.subsections.iter().rev());
    }

    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_gate() {
        let mut sub = SubQuery::new("q", "q");
        sub.answered = true;

        sub.confidence = 0.29;
        assert!(sub.needs_research());

        sub.confidence = 0.30;
        assert!(!sub.needs_research());

        sub.answered = false;
        assert!(sub.needs_research());
    }

    #[test]
    fn test_section_context_derives_statistics_and_quotes() {
        let facts = vec![
            ExtractedFact { fact: "18% tax".into(), source_ids: vec![1], fact_type: FactType::Statistic },
            ExtractedFact { fact: "\"A fair rate\"".into(), source_ids: vec![2], fact_type: FactType::Quote },
            ExtractedFact { fact: "Licensing began 2019".into(), source_ids: vec![1], fact_type: FactType::Claim },
        ];
        let ctx = SectionResearchContext::new(facts, vec![]);

        assert_eq!(ctx.statistics, vec!["18% tax".to_string()]);
        assert_eq!(ctx.quotes, vec!["\"A fair rate\"".to_string()]);
        assert_eq!(ctx.facts.len(), 3);
    }

    #[test]
    fn test_flatten_outline_depth_first() {
        let mut intro = OutlineSection::new("1", "Intro", "");
        intro.subsections = vec![
            OutlineSection::new("1.1", "Background", ""),
            OutlineSection::new("1.2", "Scope", ""),
        ];
        let outline = vec![intro, OutlineSection::new("2", "Market", "")];

        let ids: Vec<&str> = flatten_outline(&outline).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "1.1", "1.2", "2"]);
    }

    #[test]
    fn test_fact_wire_format() {
        let fact = ExtractedFact {
            fact: "Rate is 22%".into(),
            source_ids: vec![1, 2],
            fact_type: FactType::Statistic,
        };
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(json["type"], "statistic");
        assert_eq!(json["sourceIds"], serde_json::json!([1, 2]));
    }
}
