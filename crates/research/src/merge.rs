//! Source merge, ranking and citation renumbering
//!
//! Provides:
//! - URL-keyed merge where local sources win over topic-level ones
//! - Quality ranking with truncation
//! - Global renumbering into one dense `1..N` id space
//! - Citation marker and fact id remapping through the substitution table

use crate::synthesis::citation_pattern;
use crate::types::{ExtractedFact, Source};
use indexmap::IndexMap;
use regex_lite::Captures;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Sort best quality first; equal qualities keep their order
pub fn rank_by_quality(sources: &mut [Source]) {
    sources.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
}

/// Merge `local` and `topic` sources by URL, rank and keep `max`
///
/// Local sources are inserted first so they win URL conflicts even with a
/// lower quality. Within `local` the first occurrence of a URL wins.
pub fn merge_sources(local: Vec<Source>, topic: &[Source], max: usize) -> Vec<Source> {
    let mut merged: IndexMap<String, Source> = IndexMap::new();

    for source in local {
        merged.entry(source.url.clone()).or_insert(source);
    }
    for source in topic {
        if !merged.contains_key(&source.url) {
            merged.insert(source.url.clone(), source.clone());
        }
    }

    let mut merged: Vec<Source> = merged.into_values().collect();
    rank_by_quality(&mut merged);
    merged.truncate(max);
    merged
}

/// A fact tied to its sources by URL, independent of any id space
#[derive(Debug, Clone, PartialEq)]
pub struct AnchoredFact {
    pub fact: ExtractedFact,
    pub urls: Vec<String>,
}

impl AnchoredFact {
    /// Anchor a fact whose ids index into `sources` (1-based)
    pub fn from_ids(fact: ExtractedFact, sources: &[Source]) -> Self {
        let urls = fact
            .source_ids
            .iter()
            .filter_map(|id| sources.iter().find(|s| s.id == *id))
            .map(|s| s.url.clone())
            .collect();
        Self { fact, urls }
    }

    pub fn from_url(fact: ExtractedFact, url: impl Into<String>) -> Self {
        Self { fact, urls: vec![url.into()] }
    }

    /// Fact with ids from the global registry
    ///
    /// Unknown URLs are dropped; `None` when no anchor is left.
    pub fn resolve(&self, registry: &SourceRegistry) -> Option<ExtractedFact> {
        let ids: BTreeSet<u32> = self.urls.iter().filter_map(|url| registry.id_of(url)).collect();
        if ids.is_empty() {
            return None;
        }
        Some(ExtractedFact {
            source_ids: ids.into_iter().collect(),
            ..self.fact.clone()
        })
    }
}

/// Every unique source of a workflow, numbered `1..N` in quality order
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
    ids: HashMap<String, u32>,
}

impl SourceRegistry {
    /// Collect unique sources (first occurrence of a URL wins) and renumber
    pub fn build<'a, I>(pools: I) -> Self
    where
        I: IntoIterator<Item = &'a Source>,
    {
        let mut unique: IndexMap<String, Source> = IndexMap::new();
        for source in pools {
            unique.entry(source.url.clone()).or_insert_with(|| source.clone());
        }

        let mut sources: Vec<Source> = unique.into_values().collect();
        rank_by_quality(&mut sources);
        for (source, id) in sources.iter_mut().zip(1u32..) {
            source.id = id;
        }

        let ids = sources.iter().map(|s| (s.url.clone(), s.id)).collect();
        Self { sources, ids }
    }

    pub fn id_of(&self, url: &str) -> Option<u32> {
        self.ids.get(url).copied()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn into_sources(self) -> Vec<Source> {
        self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Old id → global id for sources carrying a local id space
    pub fn substitution_table(&self, sources: &[Source]) -> HashMap<u32, u32> {
        sources
            .iter()
            .filter_map(|s| self.id_of(&s.url).map(|id| (s.id, id)))
            .collect()
    }

    /// Registry entries for the URLs of `sources`, in the given order
    pub fn relabel(&self, sources: &[Source]) -> Vec<Source> {
        sources
            .iter()
            .filter_map(|s| self.id_of(&s.url))
            .filter_map(|id| self.sources.get(id as usize - 1).cloned())
            .collect()
    }
}

/// Remap ids through `table`, dropping unknown ids and duplicates
pub fn remap_ids(ids: &[u32], table: &HashMap<u32, u32>) -> Vec<u32> {
    let remapped: BTreeSet<u32> = ids.iter().filter_map(|id| table.get(id).copied()).collect();
    remapped.into_iter().collect()
}

/// Rewrite `[n]` markers through `table`; markers with no mapping are removed
pub fn rewrite_citations(text: &str, table: &HashMap<u32, u32>) -> String {
    citation_pattern()
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(|id| table.get(&id))
                .map(|new_id| format!("[{}]", new_id))
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FactType;

    fn source(id: u32, url: &str, quality: f32) -> Source {
        Source { id, ..Source::new(url, url, quality) }
    }

    #[test]
    fn test_local_wins_over_topic_on_same_url() {
        let local = vec![source(1, "https://shared", 0.3), source(2, "https://local", 0.6)];
        let topic = vec![source(1, "https://shared", 0.9), source(2, "https://topic", 0.8)];

        let merged = merge_sources(local, &topic, 10);

        assert_eq!(merged.len(), 3);
        let shared: Vec<&Source> = merged.iter().filter(|s| s.url == "https://shared").collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].quality, 0.3);
        assert_eq!(merged[0].url, "https://topic");
    }

    #[test]
    fn test_first_local_occurrence_wins() {
        let local = vec![source(0, "https://kb", 0.9), source(0, "https://kb", 0.6)];
        let merged = merge_sources(local, &[], 3);
        assert_eq!(merged, vec![source(0, "https://kb", 0.9)]);
    }

    #[test]
    fn test_merge_truncates_after_ranking() {
        let local = vec![
            source(0, "https://a", 0.2),
            source(0, "https://b", 0.9),
            source(0, "https://c", 0.7),
            source(0, "https://d", 0.5),
        ];
        let merged = merge_sources(local, &[], 3);
        let urls: Vec<&str> = merged.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://b", "https://c", "https://d"]);
    }

    #[test]
    fn test_renumbering_is_contiguous() {
        let topic = vec![source(1, "https://t1", 0.5), source(2, "https://t2", 0.6), source(3, "https://t3", 0.1)];
        let section_a = vec![source(1, "https://s1", 0.9), source(2, "https://t2", 0.6)];
        let section_b = vec![source(7, "https://s2", 0.4)];

        let registry = SourceRegistry::build(topic.iter().chain(&section_a).chain(&section_b));

        let ids: Vec<u32> = registry.sources().iter().map(|s| s.id).collect();
        assert_eq!(ids, (1..=5).collect::<Vec<u32>>());

        let table = registry.substitution_table(&topic);
        let mut remapped: Vec<u32> = remap_ids(&[1, 2, 3], &table);
        remapped.sort_unstable();
        remapped.dedup();
        assert_eq!(remapped.len(), 3);
        assert!(remapped.iter().all(|id| (1..=registry.len() as u32).contains(id)));

        // t2 has the same global id wherever it appears
        assert_eq!(table[&2], registry.relabel(&section_a)[1].id);
    }

    #[test]
    fn test_rewrite_citations() {
        let table = HashMap::from([(1, 3), (2, 1)]);
        let text = "Rate is 22% [1][2]. Unknown [9].";
        assert_eq!(rewrite_citations(text, &table), "Rate is 22% [3][1]. Unknown .");
    }

    #[test]
    fn test_anchored_fact_resolves_through_registry() {
        let live = vec![source(1, "https://live", 0.4), source(2, "https://other", 0.3)];
        let fact = ExtractedFact {
            fact: "Rate is 22%".into(),
            source_ids: vec![2, 1, 5],
            fact_type: FactType::Statistic,
        };

        let anchored = AnchoredFact::from_ids(fact, &live);
        assert_eq!(anchored.urls, vec!["https://other", "https://live"]);

        let registry = SourceRegistry::build(&live);
        assert_eq!(anchored.resolve(&registry).map(|f| f.source_ids), Some(vec![1, 2]));

        let elsewhere = SourceRegistry::build(&[source(1, "https://unrelated", 0.5)]);
        assert_eq!(anchored.resolve(&elsewhere), None);
    }
}
