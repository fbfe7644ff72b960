//! Research workflow facade
//!
//! Topic research, section fan-out and the final renumbering that gives
//! the whole document one citation id space.

use crate::merge::{remap_ids, rewrite_citations, SourceRegistry};
use crate::options::ResearchOptions;
use crate::pipeline::ResearchPipeline;
use crate::sections::{SectionDraft, SectionResearcher, SectionSettings};
use crate::types::{OutlineSection, ResearchResult, SectionResearchContext};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use researchforge_common::cache::{keys, Cache};
use researchforge_common::config::{AppConfig, ResearchDepth};
use researchforge_common::llm::CompletionService;
use researchforge_common::retrieval::{DisabledRetrieval, KnowledgeBase, VectorSearch};
use researchforge_common::web::WebSearch;
use researchforge_common::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Topic research plus per-section contexts sharing one source list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub research: ResearchResult,
    pub sections: HashMap<String, SectionResearchContext>,
    pub generated_at: DateTime<Utc>,
}

/// Research workflow
pub struct ResearchWorkflow {
    llm: Arc<dyn CompletionService>,
    search: Arc<dyn WebSearch>,
    vector: Arc<dyn VectorSearch>,
    knowledge: Arc<dyn KnowledgeBase>,
    cache: Option<Arc<Cache>>,
    config: AppConfig,
}

impl ResearchWorkflow {
    pub fn new(llm: Arc<dyn CompletionService>, search: Arc<dyn WebSearch>, config: AppConfig) -> Self {
        Self {
            llm,
            search,
            vector: Arc::new(DisabledRetrieval),
            knowledge: Arc::new(DisabledRetrieval),
            cache: None,
            config,
        }
    }

    pub fn with_retrieval(mut self, vector: Arc<dyn VectorSearch>, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.vector = vector;
        self.knowledge = knowledge;
        self
    }

    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Topic-level research, served from the result cache when possible
    pub async fn research_topic(&self, query: &str, depth: ResearchDepth) -> Result<ResearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "research query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let key = keys::research_result(query, depth.as_str());
        if let Some(cache) = &self.cache {
            match cache.get::<ResearchResult>(&key).await {
                Ok(Some(result)) => {
                    info!(query, depth = %depth, "Topic research served from cache");
                    return Ok(result);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Cache read failed, researching live"),
            }
        }

        let pipeline = ResearchPipeline::new(
            self.llm.clone(),
            self.search.clone(),
            ResearchOptions::from_config(&self.config, depth),
        );
        let result = pipeline.run(query).await;

        // empty answers are not cached so the next request tries again
        if let (Some(cache), true) = (&self.cache, result.has_answer()) {
            if let Err(e) = cache.set(&key, &result).await {
                warn!(error = %e, "Failed to cache topic research");
            }
        }

        Ok(result)
    }

    /// Research `query`, then every section of `outline`, and renumber
    pub async fn run(&self, query: &str, depth: ResearchDepth, outline: &[OutlineSection]) -> Result<WorkflowOutput> {
        let topic = self.research_topic(query, depth).await?;

        let section_depth = depth.section_depth();
        let researcher = SectionResearcher::new(
            self.llm.clone(),
            self.search.clone(),
            ResearchOptions::from_config(&self.config, section_depth),
            SectionSettings::from_config(&self.config),
        )
        .with_retrieval(self.vector.clone(), self.knowledge.clone());

        let drafts = if outline.is_empty() {
            IndexMap::new()
        } else {
            researcher.research_all(&topic, outline).await
        };

        let output = finalize(topic, drafts);
        info!(
            sources = output.research.sources.len(),
            sections = output.sections.len(),
            "Research workflow complete"
        );
        Ok(output)
    }
}

/// Merge topic and section sources into one list numbered `1..N` and
/// rewrite every id reference through it
///
/// Sections are visited in outline order so the first occurrence of a URL
/// is the same on every run. Facts left without any source are dropped.
pub fn finalize(topic: ResearchResult, drafts: IndexMap<String, SectionDraft>) -> WorkflowOutput {
    let registry = SourceRegistry::build(
        topic
            .sources
            .iter()
            .chain(drafts.values().flat_map(|d| d.sources.iter().chain(&d.cited))),
    );

    let table = registry.substitution_table(&topic.sources);
    let answer = rewrite_citations(&topic.answer, &table);
    let facts = topic
        .facts
        .into_iter()
        .filter_map(|mut fact| {
            fact.source_ids = remap_ids(&fact.source_ids, &table);
            (!fact.source_ids.is_empty()).then_some(fact)
        })
        .collect();

    let sections = drafts
        .into_iter()
        .map(|(id, draft)| {
            let facts = draft.facts.iter().filter_map(|f| f.resolve(&registry)).collect();
            let sources = registry.relabel(&draft.sources);
            (id, SectionResearchContext::new(facts, sources))
        })
        .collect();

    let research = ResearchResult {
        query: topic.query,
        answer,
        sources: registry.into_sources(),
        facts,
        follow_up_questions: topic.follow_up_questions,
    };

    WorkflowOutput {
        research,
        sections,
        generated_at: Utc::now(),
    }
}
