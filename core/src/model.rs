//! Retrieval models: immutable parameter bundles plus the per-term scoring
//! formulas the query operators share.

use crate::query::Operator;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub k3: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, k3: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndriParams {
    pub mu: f64,
    pub lambda: f64,
}

impl Default for IndriParams {
    fn default() -> Self {
        Self { mu: 2500.0, lambda: 0.4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalModel {
    UnrankedBoolean,
    RankedBoolean,
    Bm25(Bm25Params),
    Indri(IndriParams),
    /// Learning to rank: BM25 for the first pass, both models for features.
    Letor { bm25: Bm25Params, indri: IndriParams },
}

impl RetrievalModel {
    pub fn name(&self) -> &'static str {
        match self {
            RetrievalModel::UnrankedBoolean => "UnrankedBoolean",
            RetrievalModel::RankedBoolean => "RankedBoolean",
            RetrievalModel::Bm25(_) => "BM25",
            RetrievalModel::Indri(_) => "Indri",
            RetrievalModel::Letor { .. } => "Letor",
        }
    }

    /// The operator wrapped around every query string before parsing.
    pub fn default_operator(&self) -> Operator {
        match self {
            RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => Operator::Or,
            RetrievalModel::Bm25(_) | RetrievalModel::Letor { .. } => Operator::Sum,
            RetrievalModel::Indri(_) => Operator::And,
        }
    }

    /// The model used to produce rankings directly.
    pub fn first_pass(&self) -> RetrievalModel {
        match self {
            RetrievalModel::Letor { bm25, .. } => RetrievalModel::Bm25(*bm25),
            other => *other,
        }
    }

    /// Whether the model defines a score for `op`. Positional operators are
    /// always scored through a SCORE wrapper.
    pub fn supports(&self, op: &Operator) -> bool {
        use Operator::*;
        match self {
            RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => {
                matches!(op, Score | Or | And | Wand)
            }
            RetrievalModel::Bm25(_) => matches!(op, Score | Sum | Wsum),
            RetrievalModel::Indri(_) => matches!(op, Score | And | Wand | Wsum),
            RetrievalModel::Letor { .. } => false,
        }
    }

    /// Whether AND/WAND match documents any argument matches (and smooth the
    /// missing ones) instead of requiring every argument.
    pub(crate) fn smooths_missing_terms(&self) -> bool {
        matches!(self, RetrievalModel::Indri(_))
    }
}

/// Robertson/Sparck-Jones weight, clamped at zero.
pub fn rsj_weight(df: f64, n: f64) -> f64 {
    ((n - df + 0.5).ln() - (df + 0.5).ln()).max(0.0)
}

/// BM25 contribution of one query term to one document.
pub fn bm25_term_score(p: &Bm25Params, tf: f64, df: f64, n: f64, doc_len: f64, avg_doc_len: f64, qtf: f64) -> f64 {
    let tf_weight = tf / (tf + p.k1 * ((1.0 - p.b) + p.b * doc_len / avg_doc_len));
    let user_weight = (p.k3 + 1.0) * qtf / (p.k3 + qtf);
    rsj_weight(df, n) * tf_weight * user_weight
}

/// Indri two-stage (Dirichlet, then mixture) smoothed term probability.
/// `tf = 0` gives the default score for a document the term misses.
pub fn indri_term_score(p: &IndriParams, tf: f64, ctf: f64, c_len: f64, d_len: f64) -> f64 {
    let p_c = if c_len > 0.0 { ctf / c_len } else { 0.0 };
    let bayesian = (tf + p.mu * p_c) / (d_len + p.mu);
    (1.0 - p.lambda) * bayesian + p.lambda * p_c
}
