//! Section Fan-Out
//!
//! Runs an independent, shallower research state machine per outline
//! section under bounded concurrency. Each section combines curated
//! knowledge, cached research, its own live research and the topic-level
//! result into a draft that is renumbered once all sections are done.

use crate::merge::{merge_sources, AnchoredFact};
use crate::options::ResearchOptions;
use crate::pipeline::ResearchPipeline;
use crate::synthesis::classify_snippet;
use crate::terms::{extract_terms, first_sentence};
use crate::types::{flatten_outline, ExtractedFact, FactType, OutlineSection, ResearchResult, Source};
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use researchforge_common::config::AppConfig;
use researchforge_common::llm::CompletionService;
use researchforge_common::metrics;
use researchforge_common::retrieval::{
    DisabledRetrieval, KnowledgeBase, KnowledgeQuery, RetrievedDocument, VectorSearch, VectorSearchOptions,
};
use researchforge_common::web::WebSearch;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Trust assigned to curated knowledge-base documents
pub const KNOWLEDGE_QUALITY: f32 = 0.9;

/// Trust assigned to vector-cache matches
pub const CACHE_QUALITY: f32 = 0.7;

const FACT_MAX_CHARS: usize = 300;

/// Fan-out limits
#[derive(Debug, Clone)]
pub struct SectionSettings {
    /// Sections researched at once
    pub concurrency: usize,

    /// Sources kept per section after merging
    pub max_sources: usize,

    /// Fact budget per origin
    pub knowledge_facts: usize,
    pub cache_facts: usize,
    pub live_facts: usize,
    pub topic_facts: usize,

    /// Country filter for knowledge-base lookups
    pub country: Option<String>,
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_sources: 3,
            knowledge_facts: 3,
            cache_facts: 2,
            live_facts: 5,
            topic_facts: 2,
            country: None,
        }
    }
}

impl SectionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.research.section_concurrency.max(1),
            max_sources: config.research.max_sources_per_section.max(1),
            ..Self::default()
        }
    }
}

/// Section research before global renumbering
#[derive(Debug, Clone, Default)]
pub struct SectionDraft {
    pub facts: Vec<AnchoredFact>,
    /// Best sources after merging, capped at `max_sources`
    pub sources: Vec<Source>,
    /// Every source a fact is anchored to, kept or not
    pub cited: Vec<Source>,
}

/// Query for a section: topic, heading and description
pub fn section_query(topic: &str, section: &OutlineSection) -> String {
    [topic, section.heading.as_str(), section.description.as_str()]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-section researcher
pub struct SectionResearcher {
    pipeline: ResearchPipeline,
    vector: Arc<dyn VectorSearch>,
    knowledge: Arc<dyn KnowledgeBase>,
    settings: SectionSettings,
}

impl SectionResearcher {
    /// `options` should already be the section depth profile
    pub fn new(
        llm: Arc<dyn CompletionService>,
        search: Arc<dyn WebSearch>,
        options: ResearchOptions,
        settings: SectionSettings,
    ) -> Self {
        Self {
            pipeline: ResearchPipeline::new(llm, search, options),
            vector: Arc::new(DisabledRetrieval),
            knowledge: Arc::new(DisabledRetrieval),
            settings,
        }
    }

    pub fn with_retrieval(mut self, vector: Arc<dyn VectorSearch>, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.vector = vector;
        self.knowledge = knowledge;
        self
    }

    /// Research every section of `outline`, keyed by section id in outline order
    pub async fn research_all(&self, topic: &ResearchResult, outline: &[OutlineSection]) -> IndexMap<String, SectionDraft> {
        let sections = flatten_outline(outline);
        info!(
            sections = sections.len(),
            concurrency = self.settings.concurrency,
            depth = %self.pipeline.options().depth,
            "Researching sections"
        );

        let mut drafts: Vec<(usize, &OutlineSection, SectionDraft)> = stream::iter(sections.into_iter().enumerate())
            .map(|(position, section)| async move {
                let draft = self.research_section(topic, section).await;
                (position, section, draft)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;
        drafts.sort_by_key(|(position, _, _)| *position);

        let mut by_id = IndexMap::with_capacity(drafts.len());
        for (_, section, draft) in drafts {
            if by_id.insert(section.id.clone(), draft).is_some() {
                warn!(section_id = %section.id, "Duplicate section id, keeping the last result");
            }
        }
        by_id
    }

    /// Research one section
    pub async fn research_section(&self, topic: &ResearchResult, section: &OutlineSection) -> SectionDraft {
        let span = info_span!("section", section_id = %section.id);

        async {
            let started = Instant::now();
            let query = section_query(&topic.query, section);

            let (knowledge, cached) = tokio::join!(self.lookup_knowledge(&query), self.lookup_cache(&query));
            let live = self.pipeline.run(&query).await;

            let draft = self.assemble(topic, section, knowledge, cached, live);

            debug!(facts = draft.facts.len(), sources = draft.sources.len(), "Section researched");
            metrics::record_section(started.elapsed().as_secs_f64(), self.pipeline.options().depth.as_str());
            draft
        }
        .instrument(span)
        .await
    }

    fn assemble(
        &self,
        topic: &ResearchResult,
        section: &OutlineSection,
        knowledge: Vec<RetrievedDocument>,
        cached: Vec<RetrievedDocument>,
        live: ResearchResult,
    ) -> SectionDraft {
        let mut facts = Vec::new();
        facts.extend(knowledge.iter().take(self.settings.knowledge_facts).filter_map(document_fact));
        facts.extend(cached.iter().take(self.settings.cache_facts).filter_map(document_fact));
        facts.extend(
            live.facts
                .iter()
                .take(self.settings.live_facts)
                .map(|f| AnchoredFact::from_ids(f.clone(), &live.sources)),
        );
        facts.extend(
            relevant_topic_facts(topic, section, self.settings.topic_facts)
                .into_iter()
                .map(|f| AnchoredFact::from_ids(f.clone(), &topic.sources)),
        );

        let local: Vec<Source> = knowledge
            .into_iter()
            .map(|d| document_source(d, KNOWLEDGE_QUALITY))
            .chain(cached.into_iter().map(|d| document_source(d, CACHE_QUALITY)))
            .chain(live.sources)
            .collect();

        let cited = cited_sources(&facts, &local, &topic.sources);
        SectionDraft {
            facts,
            sources: merge_sources(local, &topic.sources, self.settings.max_sources),
            cited,
        }
    }

    async fn lookup_knowledge(&self, query: &str) -> Vec<RetrievedDocument> {
        if !self.knowledge.is_enabled() {
            return Vec::new();
        }

        let options = KnowledgeQuery {
            limit: self.settings.knowledge_facts,
            country: self.settings.country.clone(),
        };
        match self.knowledge.search(query, &options).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "Knowledge-base lookup failed");
                Vec::new()
            }
        }
    }

    async fn lookup_cache(&self, query: &str) -> Vec<RetrievedDocument> {
        if !self.vector.is_enabled() {
            return Vec::new();
        }

        let options = VectorSearchOptions {
            limit: self.settings.cache_facts,
            ..Default::default()
        };
        match self.vector.search(query, &options).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "Vector cache lookup failed");
                Vec::new()
            }
        }
    }
}

fn document_source(doc: RetrievedDocument, quality: f32) -> Source {
    Source::new(doc.url, doc.title, quality).with_content(doc.content)
}

/// Lead sentence of a retrieved document as a fact anchored to it
fn document_fact(doc: &RetrievedDocument) -> Option<AnchoredFact> {
    let text = first_sentence(&doc.content, FACT_MAX_CHARS);
    if text.is_empty() {
        return None;
    }

    let fact_type = match doc.content_type.as_deref() {
        Some("statistic") => FactType::Statistic,
        Some("quote") => FactType::Quote,
        Some("definition") => FactType::Definition,
        _ => classify_snippet(&text),
    };

    Some(AnchoredFact::from_url(
        ExtractedFact { fact: text, source_ids: Vec::new(), fact_type },
        doc.url.clone(),
    ))
}

/// Sources behind `facts`, local pool first, each URL once
fn cited_sources(facts: &[AnchoredFact], local: &[Source], topic: &[Source]) -> Vec<Source> {
    let urls: IndexSet<&str> = facts.iter().flat_map(|f| f.urls.iter().map(String::as_str)).collect();
    urls.into_iter()
        .filter_map(|url| local.iter().chain(topic).find(|s| s.url == url).cloned())
        .collect()
}

/// Topic facts sharing the most terms with the section
fn relevant_topic_facts<'a>(topic: &'a ResearchResult, section: &OutlineSection, limit: usize) -> Vec<&'a ExtractedFact> {
    let terms = extract_terms(&[section.heading.as_str(), section.description.as_str()]);

    let mut ranked: Vec<(usize, &ExtractedFact)> = topic
        .facts
        .iter()
        .map(|fact| {
            let lower = fact.fact.to_lowercase();
            (terms.iter().filter(|t| lower.contains(t.as_str())).count(), fact)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked.into_iter().take(limit).map(|(_, fact)| fact).collect()
}
