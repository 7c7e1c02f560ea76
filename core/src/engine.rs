//! Document-at-a-time execution and result ranking.

use crate::error::Result;
use crate::index::IndexReader;
use crate::model::RetrievalModel;
use crate::query::{QueryNode, ScoringContext, ScoringTree};
use crate::DocId;
use std::cmp::Ordering;
use tracing::debug;

/// Lines reported per query.
pub const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub external_id: String,
    pub score: f64,
}

/// Scores for one query in insertion order until [`ScoreList::sort`] is called.
#[derive(Debug, Clone, Default)]
pub struct ScoreList {
    entries: Vec<ScoredDoc>,
}

impl ScoreList {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, doc_id: DocId, external_id: impl Into<String>, score: f64) {
        self.entries.push(ScoredDoc { doc_id, external_id: external_id.into(), score });
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredDoc> { self.entries.iter() }

    /// Score descending, then external id ascending.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.external_id.cmp(&b.external_id),
            other => other,
        });
    }

    pub fn truncate(&mut self, n: usize) {
        self.entries.truncate(n);
    }

    /// Sort and keep the reportable prefix.
    pub fn rank(&mut self) {
        self.sort();
        self.truncate(MAX_RESULTS);
    }

    /// The first `k` entries as (doc id, score) pairs.
    pub fn top(&self, k: usize) -> Vec<(DocId, f64)> {
        self.entries.iter().take(k).map(|e| (e.doc_id, e.score)).collect()
    }
}

impl<'a> IntoIterator for &'a ScoreList {
    type Item = &'a ScoredDoc;
    type IntoIter = std::slice::Iter<'a, ScoredDoc>;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/// Score every document `query` matches, in increasing doc id order.
/// Results are unsorted; call [`ScoreList::rank`] before reporting.
pub fn execute(query: &QueryNode, index: &dyn IndexReader, model: &RetrievalModel) -> Result<ScoreList> {
    let mut results = ScoreList::new();
    if query.args.is_empty() && !query.is_term() {
        return Ok(results);
    }
    let ctx = ScoringContext::new(index, model);
    let mut tree = ScoringTree::build(query, &ctx)?;
    while tree.has_match(model) {
        let Some(doc) = tree.current_match() else { break };
        let score = tree.score(&ctx)?;
        results.add(doc, index.external_doc_id(doc).unwrap_or_default(), score);
        tree.advance_past(doc);
    }
    debug!(query = %query, matched = results.len(), "executed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::model::Bm25Params;
    use crate::query::parse_query;

    #[test]
    fn ties_break_on_external_id() {
        let mut list = ScoreList::new();
        list.add(0, "zeta", 1.0);
        list.add(1, "alpha", 1.0);
        list.add(2, "mid", 2.0);
        list.sort();
        let ids: Vec<_> = list.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids, vec!["mid", "alpha", "zeta"]);
    }

    #[test]
    fn empty_query_has_no_results() {
        let mut idx = MemoryIndex::new();
        idx.add(Document::new("d0").field("body", "dog"));
        let model = RetrievalModel::Bm25(Bm25Params::default());
        let q = parse_query("the", &model).unwrap();
        assert!(execute(&q, &idx, &model).unwrap().is_empty());
    }

    #[test]
    fn rank_truncates() {
        let mut list = ScoreList::new();
        for i in 0..150u32 {
            list.add(i, format!("doc{i:03}"), f64::from(i % 7));
        }
        list.rank();
        assert_eq!(list.len(), MAX_RESULTS);
        assert!(list.iter().zip(list.iter().skip(1)).all(|(a, b)| a.score >= b.score));
    }
}
