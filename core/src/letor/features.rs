use crate::index::{IndexReader, TermVector};
use crate::model::{bm25_term_score, indri_term_score, Bm25Params, IndriParams, RetrievalModel};
use crate::query::{Operator, QueryNode};
use crate::DocId;
use std::collections::{BTreeMap, HashSet};

pub const NUM_FEATURES: usize = 18;

/// Documents whose raw URL contains this get feature 3 set.
pub const REFERENCE_SITE: &str = "wikipedia.org";

/// Fields scored by features 5-16, three features each.
pub const SCORED_FIELDS: [&str; 4] = ["body", "title", "url", "inlink"];

/// One slot per feature; `None` when disabled or when the document gives no
/// signal for it.
pub type FeatureVector = Vec<Option<f64>>;

/// Query term to query-term frequency.
pub type QueryTerms = BTreeMap<String, u32>;

/// Count the plain terms directly under the query root. Repeats add to the
/// frequency; nested operators are ignored.
pub fn query_terms(query: &QueryNode) -> QueryTerms {
    let mut terms = QueryTerms::new();
    let mut count = |node: &QueryNode| {
        if let Operator::Term { term, .. } = &node.unwrap_score().op {
            *terms.entry(term.clone()).or_insert(0) += 1;
        }
    };
    if query.op == Operator::Score || query.is_term() {
        count(query);
    } else {
        query.args.iter().for_each(&mut count);
    }
    terms
}

pub struct FeatureExtractor<'a> {
    index: &'a dyn IndexReader,
    bm25: Bm25Params,
    indri: IndriParams,
    /// 1-based feature numbers.
    disabled: HashSet<usize>,
}

impl<'a> FeatureExtractor<'a> {
    /// Scoring parameters come from `model` when it carries them, defaults otherwise.
    pub fn new(index: &'a dyn IndexReader, model: &RetrievalModel, disabled: HashSet<usize>) -> Self {
        let (bm25, indri) = match *model {
            RetrievalModel::Letor { bm25, indri } => (bm25, indri),
            RetrievalModel::Bm25(bm25) => (bm25, IndriParams::default()),
            RetrievalModel::Indri(indri) => (Bm25Params::default(), indri),
            _ => (Bm25Params::default(), IndriParams::default()),
        };
        Self { index, bm25, indri, disabled }
    }

    pub fn disabled(&self) -> &HashSet<usize> { &self.disabled }

    pub fn extract(&self, terms: &QueryTerms, doc: DocId, page_rank: Option<f64>) -> FeatureVector {
        let raw_url = self.index.stored_attribute("rawUrl", doc);
        let mut out = Vec::with_capacity(NUM_FEATURES);
        for feature in 1..=NUM_FEATURES {
            if self.disabled.contains(&feature) {
                out.push(None);
                continue;
            }
            let value = match feature {
                1 => self.index.stored_attribute("score", doc).and_then(|s| s.trim().parse().ok()),
                2 => raw_url.map(|u| u.matches('/').count() as f64),
                3 => raw_url.map(|u| if u.contains(REFERENCE_SITE) { 1.0 } else { 0.0 }),
                4 => page_rank,
                5..=16 => {
                    let field = SCORED_FIELDS[(feature - 5) / 3];
                    match (feature - 5) % 3 {
                        0 => self.bm25(terms, doc, field),
                        1 => self.indri(terms, doc, field),
                        _ => self.term_overlap(terms, doc, field),
                    }
                }
                17 => Some(self.index.field_length("body", doc) as f64),
                _ => self.content_fraction(doc, "body"),
            };
            out.push(value);
        }
        out
    }

    fn vector(&self, doc: DocId, field: &str) -> Option<TermVector> {
        self.index.term_vector(doc, field).filter(|v| !v.is_empty())
    }

    fn bm25(&self, terms: &QueryTerms, doc: DocId, field: &str) -> Option<f64> {
        let vector = self.vector(doc, field)?;
        let n = self.index.num_docs() as f64;
        let doc_len = self.index.field_length(field, doc) as f64;
        let avg_doc_len = self.index.sum_field_lengths(field) as f64 / self.index.doc_count(field) as f64;
        let score = vector
            .stems
            .iter()
            .filter_map(|s| {
                let qtf = *terms.get(&s.stem)?;
                Some(bm25_term_score(&self.bm25, s.freq as f64, s.df as f64, n, doc_len, avg_doc_len, qtf as f64))
            })
            .sum();
        Some(score)
    }

    /// Geometric mean over query terms; 0 when the field holds none of them.
    fn indri(&self, terms: &QueryTerms, doc: DocId, field: &str) -> Option<f64> {
        let vector = self.vector(doc, field)?;
        if !terms.keys().any(|t| vector.stem(t).is_some()) {
            return Some(0.0);
        }
        let d_len = vector.positions_len() as f64;
        let c_len = self.index.sum_field_lengths(field) as f64;
        let share = 1.0 / terms.len() as f64;
        let score = terms
            .keys()
            .map(|term| {
                let (tf, ctf) = match vector.stem(term) {
                    Some(s) => (s.freq as f64, s.ctf as f64),
                    None => (0.0, self.index.term_collection_freq(term, field) as f64),
                };
                indri_term_score(&self.indri, tf, ctf, c_len, d_len).powf(share)
            })
            .product();
        Some(score)
    }

    /// Fraction of distinct query terms present in the field.
    fn term_overlap(&self, terms: &QueryTerms, doc: DocId, field: &str) -> Option<f64> {
        let vector = self.vector(doc, field)?;
        if terms.is_empty() {
            return Some(0.0);
        }
        let present = terms.keys().filter(|t| vector.stem(t).is_some()).count();
        Some(present as f64 / terms.len() as f64)
    }

    /// Share of token positions in the field held by indexed, non-stop terms.
    fn content_fraction(&self, doc: DocId, field: &str) -> Option<f64> {
        let vector = self.vector(doc, field)?;
        let len = vector.positions_len();
        Some((len - vector.stopword_count()) as f64 / len as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::model::Bm25Params;
    use crate::query::parse_query;

    fn index() -> MemoryIndex {
        let mut idx = MemoryIndex::new();
        idx.add(
            Document::new("w")
                .field("body", "the dog and the cat")
                .field("title", "dog")
                .attribute("rawUrl", "http://en.wikipedia.org/wiki/Dog")
                .attribute("score", "71"),
        );
        idx.add(Document::new("x").field("body", "fish bird").attribute("rawUrl", "http://x.com/a"));
        idx
    }

    fn terms(q: &str) -> QueryTerms {
        query_terms(&parse_query(q, &RetrievalModel::Bm25(Bm25Params::default())).unwrap())
    }

    #[test]
    fn query_term_frequencies() {
        let t = terms("dog cat dog #near/2(fish bird)");
        assert_eq!(t.get("dog"), Some(&2));
        assert_eq!(t.get("cat"), Some(&1));
        assert_eq!(t.len(), 2);
        assert_eq!(terms("dog").get("dog"), Some(&1));
    }

    #[test]
    fn document_features() {
        let idx = index();
        let ex = FeatureExtractor::new(&idx, &RetrievalModel::Bm25(Bm25Params::default()), HashSet::new());
        let f = ex.extract(&terms("dog cat"), 0, Some(3.5));
        assert_eq!(f.len(), NUM_FEATURES);
        assert_eq!(f[0], Some(71.0));
        assert_eq!(f[1], Some(4.0));
        assert_eq!(f[2], Some(1.0));
        assert_eq!(f[3], Some(3.5));
        assert_eq!(f[6], Some(1.0));
        assert_eq!(f[9], Some(0.5));
        // no url or inlink fields
        assert!(f[10..16].iter().all(Option::is_none));
        assert_eq!(f[16], Some(5.0));
        // three of five body positions are stop words
        assert_eq!(f[17], Some(0.4));
    }

    #[test]
    fn missing_signals_are_none_not_zero() {
        let idx = index();
        let ex = FeatureExtractor::new(&idx, &RetrievalModel::Bm25(Bm25Params::default()), [5, 6].into_iter().collect());
        let f = ex.extract(&terms("dog cat"), 1, None);
        assert_eq!(f[0], None);
        assert_eq!(f[2], Some(0.0));
        assert_eq!(f[3], None);
        assert_eq!(f[4], None);
        assert_eq!(f[5], None);
        // body present but no query term in it
        assert_eq!(f[6], Some(0.0));
        assert_eq!(f[7], None);
    }

    #[test]
    fn indri_feature_smooths_missing_terms() {
        let idx = index();
        let ex = FeatureExtractor::new(&idx, &RetrievalModel::Bm25(Bm25Params::default()), HashSet::new());
        let f = ex.extract(&terms("dog fish"), 0, None);
        let indri_body = f[5].unwrap();
        assert!(indri_body > 0.0 && indri_body < 1.0);
    }
}
