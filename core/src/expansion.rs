//! Pseudo-relevance feedback.
//!
//! Candidate terms come from the term vectors of the top-ranked documents
//! and are scored with an Indri-style smoothed probability weighted by each
//! document's original score and the term's inverse collection probability.

use crate::index::IndexReader;
use crate::model::RetrievalModel;
use crate::query::Operator;
use crate::DocId;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// The field expansion terms are drawn from.
pub const EXPANSION_FIELD: &str = "keywords";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackParams {
    pub fb_docs: usize,
    pub fb_terms: usize,
    pub fb_mu: f64,
    pub fb_orig_weight: f64,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self { fb_docs: 10, fb_terms: 10, fb_mu: 0.0, fb_orig_weight: 0.5 }
    }
}

fn malformed(term: &str) -> bool {
    term.contains('.') || term.contains(',')
}

/// Score every candidate term in `field` of the first `fb_docs` entries of
/// `top`, returning the best `fb_terms` by score descending (ties by term).
pub fn score_terms(index: &dyn IndexReader, top: &[(DocId, f64)], params: &FeedbackParams, field: &str) -> Vec<(String, f64)> {
    let docs = &top[..top.len().min(params.fb_docs)];
    // term -> (doc -> tf); BTreeMap keeps the scoring order stable.
    let mut candidates: BTreeMap<String, HashMap<DocId, u32>> = BTreeMap::new();
    for &(doc, _) in docs {
        let Some(vector) = index.term_vector(doc, field) else { continue };
        for stem in vector.stems.iter().filter(|s| !malformed(&s.stem)) {
            candidates.entry(stem.stem.clone()).or_default().insert(doc, stem.freq);
        }
    }

    let c_len = index.sum_field_lengths(field) as f64;
    let mu = params.fb_mu;
    let mut scored: Vec<(String, f64)> = candidates
        .into_iter()
        .map(|(term, tfs)| {
            let ptc = index.term_collection_freq(&term, field) as f64 / c_len;
            let idf = (1.0 / ptc).ln();
            let score = docs
                .iter()
                .map(|&(doc, doc_score)| {
                    let tf = tfs.get(&doc).copied().unwrap_or(0) as f64;
                    let d_len = index.field_length(field, doc) as f64;
                    let ptd = (tf + mu * ptc) / (d_len + mu);
                    ptd * doc_score * idf
                })
                .sum::<f64>();
            (term, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(params.fb_terms);
    scored
}

/// The weighted disjunction of expansion terms, lowest score first.
/// Indri and the Boolean models read it as `#wand`; BM25 as `#wsum`.
pub fn expansion_query(terms: &[(String, f64)], model: &RetrievalModel) -> String {
    let op = if model.supports(&Operator::Wand) { Operator::Wand } else { Operator::Wsum };
    let body: Vec<String> = terms.iter().rev().map(|(t, s)| format!("{s:.4} {t}")).collect();
    format!("{}({})", op, body.join(" "))
}

/// Expansion query from an initial ranking.
pub fn expand(index: &dyn IndexReader, top: &[(DocId, f64)], params: &FeedbackParams, model: &RetrievalModel) -> String {
    let terms = score_terms(index, top, params, EXPANSION_FIELD);
    debug!(terms = terms.len(), "expansion terms selected");
    expansion_query(&terms, model)
}

/// `original` under the model's default operator, mixed with the expansion
/// query by `fb_orig_weight`.
pub fn combine(original: &str, expanded: &str, params: &FeedbackParams, model: &RetrievalModel) -> String {
    format!(
        "#wsum({} {}({}) {} {})",
        params.fb_orig_weight,
        model.default_operator(),
        original,
        1.0 - params.fb_orig_weight,
        expanded
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::model::{Bm25Params, IndriParams};

    fn index() -> MemoryIndex {
        let mut idx = MemoryIndex::new();
        idx.add(Document::new("fb").field("keywords", "alpha alpha alpha alpha alpha beta"));
        idx.add(Document::new("other").field("keywords", "beta beta beta beta beta beta beta beta beta"));
        idx
    }

    #[test]
    fn ranks_by_feedback_score() {
        let params = FeedbackParams { fb_docs: 1, fb_terms: 2, fb_mu: 0.0, fb_orig_weight: 0.5 };
        let terms = score_terms(&index(), &[(0, 1.0), (1, 0.5)], &params, EXPANSION_FIELD);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].0, "alpha");
        assert_eq!(terms[1].0, "beta");
        assert!(terms[0].1 > terms[1].1);
    }

    #[test]
    fn query_lists_lowest_score_first() {
        let terms = vec![("alpha".to_string(), 0.91554), ("beta".to_string(), 0.0676)];
        let indri = RetrievalModel::Indri(IndriParams::default());
        assert_eq!(expansion_query(&terms, &indri), "#wand(0.0676 beta 0.9155 alpha)");
        let bm25 = RetrievalModel::Bm25(Bm25Params::default());
        assert!(expansion_query(&terms, &bm25).starts_with("#wsum("));
    }

    #[test]
    fn combined_query_weights_original() {
        let params = FeedbackParams { fb_orig_weight: 0.75, ..Default::default() };
        let indri = RetrievalModel::Indri(IndriParams::default());
        assert_eq!(
            combine("dog cat", "#wand(1.0 fish)", &params, &indri),
            "#wsum(0.75 #and(dog cat) 0.25 #wand(1.0 fish))"
        );
    }

    #[test]
    fn documents_without_the_field_contribute_nothing() {
        let mut idx = index();
        idx.add(Document::new("bare").field("body", "gamma"));
        let params = FeedbackParams { fb_docs: 1, fb_terms: 5, fb_mu: 0.0, fb_orig_weight: 0.5 };
        assert!(score_terms(&idx, &[(2, 1.0)], &params, EXPANSION_FIELD).is_empty());
    }
}
