//! ResearchForge research pipeline
//!
//! Answers an open-ended query by planning sub-questions, searching the
//! web, compressing what it finds, and synthesizing a cited answer with
//! structured facts. The same state machine is then re-run, shallower,
//! for every section of a document outline and the results are merged
//! into one citation id space.
//!
//! Modules:
//! - `planner` - Query Planner
//! - `pipeline` / `state` - Research State Machine
//! - `compression` - Relevance & Compression Engine
//! - `synthesis` - Synthesis & Extraction
//! - `sections` / `merge` - Section Fan-Out & Merge
//! - `workflow` - topic + sections facade with result caching

pub mod compression;
pub mod merge;
pub mod options;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod sections;
pub mod state;
pub mod synthesis;
pub mod terms;
pub mod types;
pub mod workflow;

pub use options::ResearchOptions;
pub use pipeline::ResearchPipeline;
pub use planner::QueryPlanner;
pub use sections::{SectionResearcher, SectionSettings};
pub use state::{ErrorKind, Phase, PipelineState};
pub use types::{
    ExtractedFact, FactType, OutlineSection, ResearchResult, SectionResearchContext, Source, SubQuery,
};
pub use workflow::{ResearchWorkflow, WorkflowOutput};
