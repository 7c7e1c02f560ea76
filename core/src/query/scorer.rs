use super::iterator::{evaluate_positional, PostingCursor};
use super::{Operator, QueryNode};
use crate::error::{QueryError, Result};
use crate::index::IndexReader;
use crate::model::{bm25_term_score, indri_term_score, RetrievalModel};
use crate::DocId;

/// Everything scoring needs besides the tree itself: the index being read and
/// the model in force for this run.
#[derive(Clone, Copy)]
pub struct ScoringContext<'a> {
    pub index: &'a dyn IndexReader,
    pub model: &'a RetrievalModel,
}

impl<'a> ScoringContext<'a> {
    pub fn new(index: &'a dyn IndexReader, model: &'a RetrievalModel) -> Self {
        Self { index, model }
    }

    fn unsupported(&self, op: &Operator) -> QueryError {
        QueryError::Unsupported { model: self.model.name(), operator: op.to_string() }
    }
}

/// A query tree ready for document-at-a-time scoring.
pub enum ScoringTree {
    /// SCORE over an evaluated positional argument.
    Term(TermScorer),
    Combine(Combinator),
}

pub struct TermScorer {
    cursor: PostingCursor,
    /// How many identical arguments this scorer stands for.
    qtf: u32,
}

pub struct Combinator {
    op: Operator,
    args: Vec<ScoringTree>,
    /// One weight per argument; 1.0 for unweighted operators.
    weights: Vec<f64>,
    current: Option<DocId>,
}

/// Fold repeated SCORE arguments into their first occurrence, summing their
/// weights and counting the repeats. Other arguments are kept as they are.
fn collapse_repeats<'q>(args: &'q [QueryNode], weights: &[f64]) -> Vec<(&'q QueryNode, f64, u32)> {
    let mut out: Vec<(&QueryNode, f64, u32)> = Vec::with_capacity(args.len());
    let mut keys: Vec<Option<String>> = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let weight = weights.get(i).copied().unwrap_or(1.0);
        let key = (arg.op == Operator::Score).then(|| arg.to_string());
        if let Some(k) = &key {
            if let Some(at) = keys.iter().position(|seen| seen.as_ref() == Some(k)) {
                out[at].1 += weight;
                out[at].2 += 1;
                continue;
            }
        }
        keys.push(key);
        out.push((arg, weight, 1));
    }
    out
}

impl ScoringTree {
    /// Evaluate the positional leaves of `node` and check every operator
    /// against the model.
    pub fn build(node: &QueryNode, ctx: &ScoringContext<'_>) -> Result<Self> {
        Self::build_with_qtf(node, ctx, 1)
    }

    fn build_with_qtf(node: &QueryNode, ctx: &ScoringContext<'_>, qtf: u32) -> Result<Self> {
        if node.op.is_positional() {
            return Self::build_with_qtf(&wrap_score(node), ctx, qtf);
        }
        if !ctx.model.supports(&node.op) {
            return Err(ctx.unsupported(&node.op));
        }
        if node.op == Operator::Score {
            let inner = node.args.first().ok_or_else(|| QueryError::NotPositional(node.to_string()))?;
            let list = evaluate_positional(inner, ctx.index)?;
            return Ok(ScoringTree::Term(TermScorer { cursor: PostingCursor::new(list), qtf }));
        }

        let folded = if node.op.collapses_repeats() {
            collapse_repeats(&node.args, &node.weights)
        } else {
            node.args
                .iter()
                .enumerate()
                .map(|(i, a)| (a, node.weights.get(i).copied().unwrap_or(1.0), 1))
                .collect()
        };
        let mut args = Vec::with_capacity(folded.len());
        let mut weights = Vec::with_capacity(folded.len());
        for (arg, weight, qtf) in folded {
            args.push(Self::build_with_qtf(arg, ctx, qtf)?);
            weights.push(weight);
        }
        Ok(ScoringTree::Combine(Combinator { op: node.op.clone(), args, weights, current: None }))
    }

    /// Whether a match remains, positioning the current match if so.
    pub fn has_match(&mut self, model: &RetrievalModel) -> bool {
        match self {
            ScoringTree::Term(t) => t.cursor.has_match(),
            ScoringTree::Combine(c) => c.has_match(model),
        }
    }

    /// Valid only after [`ScoringTree::has_match`] returned true.
    pub fn current_match(&self) -> Option<DocId> {
        match self {
            ScoringTree::Term(t) => t.cursor.current_match(),
            ScoringTree::Combine(c) => c.current,
        }
    }

    pub fn advance_past(&mut self, doc: DocId) {
        match self {
            ScoringTree::Term(t) => t.cursor.advance_past(doc),
            ScoringTree::Combine(c) => {
                c.args.iter_mut().for_each(|a| a.advance_past(doc));
                c.current = None;
            }
        }
    }

    pub fn advance_to(&mut self, doc: DocId) {
        match self {
            ScoringTree::Term(t) => t.cursor.advance_to(doc),
            ScoringTree::Combine(c) => {
                c.args.iter_mut().for_each(|a| a.advance_to(doc));
                c.current = None;
            }
        }
    }

    fn matches(&self, doc: DocId) -> bool {
        self.current_match() == Some(doc)
    }

    /// Score the current match.
    pub fn score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        match self {
            ScoringTree::Term(t) => t.score(ctx),
            ScoringTree::Combine(c) => c.score(ctx),
        }
    }

    /// Indri score for a document this subtree does not match.
    pub fn default_score(&self, ctx: &ScoringContext<'_>, doc: DocId) -> Result<f64> {
        match self {
            ScoringTree::Term(t) => t.default_score(ctx, doc),
            ScoringTree::Combine(c) => c.default_score(ctx, doc),
        }
    }

    /// The argument's own score when it matches `doc`, its default otherwise.
    fn score_or_default(&self, ctx: &ScoringContext<'_>, doc: DocId) -> Result<f64> {
        if self.matches(doc) {
            self.score(ctx)
        } else {
            self.default_score(ctx, doc)
        }
    }
}

fn wrap_score(node: &QueryNode) -> QueryNode {
    QueryNode { op: Operator::Score, args: vec![node.clone()], weights: Vec::new() }
}

impl TermScorer {
    fn score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        let Some(posting) = self.cursor.current_posting() else { return Ok(0.0) };
        let list = self.cursor.list();
        let field = list.field.as_str();
        let tf = posting.tf() as f64;
        match ctx.model {
            RetrievalModel::UnrankedBoolean => Ok(1.0),
            RetrievalModel::RankedBoolean => Ok(tf),
            RetrievalModel::Bm25(p) => {
                let index = ctx.index;
                let avg_doc_len = index.sum_field_lengths(field) as f64 / index.doc_count(field) as f64;
                Ok(bm25_term_score(
                    p,
                    tf,
                    list.df() as f64,
                    index.num_docs() as f64,
                    index.field_length(field, posting.doc_id) as f64,
                    avg_doc_len,
                    self.qtf as f64,
                ))
            }
            RetrievalModel::Indri(p) => Ok(indri_term_score(
                p,
                tf,
                list.ctf as f64,
                ctx.index.sum_field_lengths(field) as f64,
                ctx.index.field_length(field, posting.doc_id) as f64,
            )),
            RetrievalModel::Letor { .. } => Err(ctx.unsupported(&Operator::Score)),
        }
    }

    fn default_score(&self, ctx: &ScoringContext<'_>, doc: DocId) -> Result<f64> {
        let RetrievalModel::Indri(p) = ctx.model else {
            return Err(ctx.unsupported(&Operator::Score));
        };
        let list = self.cursor.list();
        let field = list.field.as_str();
        Ok(indri_term_score(
            p,
            0.0,
            list.ctf as f64,
            ctx.index.sum_field_lengths(field) as f64,
            ctx.index.field_length(field, doc) as f64,
        ))
    }
}

impl Combinator {
    fn has_match(&mut self, model: &RetrievalModel) -> bool {
        let match_all = matches!(self.op, Operator::And | Operator::Wand) && !model.smooths_missing_terms();
        self.current = if match_all { self.match_all(model) } else { self.match_min(model) };
        self.current.is_some()
    }

    /// The smallest current match among arguments that still have one.
    fn match_min(&mut self, model: &RetrievalModel) -> Option<DocId> {
        let mut min: Option<DocId> = None;
        for arg in self.args.iter_mut() {
            if arg.has_match(model) {
                if let Some(doc) = arg.current_match() {
                    min = Some(min.map_or(doc, |m| m.min(doc)));
                }
            }
        }
        min
    }

    /// The next document every argument matches.
    fn match_all(&mut self, model: &RetrievalModel) -> Option<DocId> {
        if self.args.is_empty() {
            return None;
        }
        loop {
            let mut target: DocId = 0;
            let mut agreed = true;
            for (i, arg) in self.args.iter_mut().enumerate() {
                if !arg.has_match(model) {
                    return None;
                }
                let doc = arg.current_match()?;
                if i > 0 && doc != target {
                    agreed = false;
                }
                target = target.max(doc);
            }
            if agreed {
                return Some(target);
            }
            for arg in self.args.iter_mut() {
                arg.advance_to(target);
            }
        }
    }

    /// Exponents (Indri AND/WAND) or mixing weights (Indri WSUM): the
    /// argument weights, folded repeats included, normalized to sum to 1.
    fn indri_shares(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().sum();
        if total <= 0.0 {
            let even = 1.0 / self.weights.len() as f64;
            return vec![even; self.weights.len()];
        }
        self.weights.iter().map(|w| w / total).collect()
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        let Some(doc) = self.current else { return Ok(0.0) };
        match (ctx.model, &self.op) {
            (RetrievalModel::UnrankedBoolean, Operator::Or | Operator::And | Operator::Wand) => Ok(1.0),
            (RetrievalModel::RankedBoolean, Operator::Or) => {
                let mut best = 0.0f64;
                for arg in self.args.iter().filter(|a| a.matches(doc)) {
                    best = best.max(arg.score(ctx)?);
                }
                Ok(best)
            }
            (RetrievalModel::RankedBoolean, Operator::And | Operator::Wand) => {
                let mut worst = f64::MAX;
                for arg in &self.args {
                    worst = worst.min(arg.score(ctx)?);
                }
                Ok(worst)
            }
            (RetrievalModel::Bm25(_), Operator::Sum) => {
                let mut total = 0.0;
                for arg in self.args.iter().filter(|a| a.matches(doc)) {
                    total += arg.score(ctx)?;
                }
                Ok(total)
            }
            (RetrievalModel::Bm25(_), Operator::Wsum) => {
                let weight_sum: f64 = self.weights.iter().sum();
                let mut total = 0.0;
                for (arg, w) in self.args.iter().zip(&self.weights) {
                    if arg.matches(doc) {
                        total += w * arg.score(ctx)?;
                    }
                }
                Ok(total / weight_sum)
            }
            (RetrievalModel::Indri(_), Operator::And | Operator::Wand) => {
                let mut product = 1.0;
                for (arg, share) in self.args.iter().zip(self.indri_shares()) {
                    product *= arg.score_or_default(ctx, doc)?.powf(share);
                }
                Ok(product)
            }
            (RetrievalModel::Indri(_), Operator::Wsum) => {
                let mut total = 0.0;
                for (arg, share) in self.args.iter().zip(self.indri_shares()) {
                    total += share * arg.score_or_default(ctx, doc)?;
                }
                Ok(total)
            }
            (_, op) => Err(ctx.unsupported(op)),
        }
    }

    fn default_score(&self, ctx: &ScoringContext<'_>, doc: DocId) -> Result<f64> {
        match (ctx.model, &self.op) {
            (RetrievalModel::Indri(_), Operator::And | Operator::Wand) => {
                let mut product = 1.0;
                for (arg, share) in self.args.iter().zip(self.indri_shares()) {
                    product *= arg.default_score(ctx, doc)?.powf(share);
                }
                Ok(product)
            }
            (RetrievalModel::Indri(_), Operator::Wsum) => {
                let mut total = 0.0;
                for (arg, share) in self.args.iter().zip(self.indri_shares()) {
                    total += share * arg.default_score(ctx, doc)?;
                }
                Ok(total)
            }
            (_, op) => Err(ctx.unsupported(op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::model::{Bm25Params, IndriParams};
    use crate::query::parse_query;

    fn index() -> MemoryIndex {
        let mut idx = MemoryIndex::new();
        idx.add(Document::new("d0").field("body", "dog dog cat"));
        idx.add(Document::new("d1").field("body", "cat fish"));
        idx.add(Document::new("d2").field("body", "dog fish bird"));
        idx
    }

    fn run(query: &str, model: RetrievalModel) -> Vec<(DocId, f64)> {
        let idx = index();
        let ctx = ScoringContext::new(&idx, &model);
        let node = parse_query(query, &model).unwrap();
        let mut tree = ScoringTree::build(&node, &ctx).unwrap();
        let mut out = Vec::new();
        while tree.has_match(&model) {
            let doc = tree.current_match().unwrap();
            out.push((doc, tree.score(&ctx).unwrap()));
            tree.advance_past(doc);
        }
        out
    }

    fn docs(hits: &[(DocId, f64)]) -> Vec<DocId> {
        hits.iter().map(|(d, _)| *d).collect()
    }

    #[test]
    fn boolean_and_requires_every_argument() {
        let hits = run("#and(dog fish)", RetrievalModel::UnrankedBoolean);
        assert_eq!(hits, vec![(2, 1.0)]);
    }

    #[test]
    fn boolean_or_takes_any_argument() {
        let hits = run("dog fish", RetrievalModel::RankedBoolean);
        assert_eq!(hits, vec![(0, 2.0), (1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn ranked_and_is_minimum_tf() {
        let hits = run("#and(dog cat)", RetrievalModel::RankedBoolean);
        assert_eq!(hits, vec![(0, 1.0)]);
    }

    #[test]
    fn bm25_sum_skips_absent_terms() {
        let model = RetrievalModel::Bm25(Bm25Params::default());
        let hits = run("bird fish", model);
        assert_eq!(docs(&hits), vec![1, 2]);
        assert!(hits[1].1 > hits[0].1);
    }

    #[test]
    fn bm25_repeated_terms_raise_qtf() {
        let model = RetrievalModel::Bm25(Bm25Params { k1: 1.2, b: 0.75, k3: 5.0 });
        let once = run("bird", model);
        let twice = run("bird bird", model);
        assert!(twice[0].1 > once[0].1);
    }

    #[test]
    fn bm25_rejects_and() {
        let model = RetrievalModel::Bm25(Bm25Params::default());
        let idx = index();
        let ctx = ScoringContext::new(&idx, &model);
        let node = parse_query("#and(dog cat)", &model).unwrap();
        let err = ScoringTree::build(&node, &ctx).err().unwrap();
        assert!(matches!(err, QueryError::Unsupported { .. }));
        assert!(!err.is_query_local());
    }

    #[test]
    fn indri_and_scores_partial_matches() {
        let model = RetrievalModel::Indri(IndriParams::default());
        let hits = run("dog cat", model);
        assert_eq!(docs(&hits), vec![0, 1, 2]);
        assert!(hits.iter().all(|(_, s)| *s > 0.0));
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn indri_repeats_do_not_change_scores() {
        let model = RetrievalModel::Indri(IndriParams::default());
        let plain = run("#wand(2 dog 1 cat)", model);
        let folded = run("dog dog cat", model);
        for ((d1, s1), (d2, s2)) in plain.iter().zip(&folded) {
            assert_eq!(d1, d2);
            assert!((s1 - s2).abs() < 1e-12);
        }
    }

    fn assert_same_scores(a: &[(DocId, f64)], b: &[(DocId, f64)]) {
        assert_eq!(docs(a), docs(b));
        for ((_, s1), (_, s2)) in a.iter().zip(b) {
            assert!((s1 - s2).abs() < 1e-12, "{s1} != {s2}");
        }
    }

    #[test]
    fn indri_wsum_repeats_keep_every_weight() {
        let model = RetrievalModel::Indri(IndriParams::default());
        let repeated = run("#wsum(1 dog 3 dog 1 cat)", model);
        let merged = run("#wsum(4 dog 1 cat)", model);
        assert_same_scores(&repeated, &merged);
    }

    #[test]
    fn bm25_wsum_repeats_keep_every_weight() {
        let model = RetrievalModel::Bm25(Bm25Params { k1: 1.2, b: 0.75, k3: 0.0 });
        let repeated = run("#wsum(1 dog 3 dog 1 cat)", model);
        let merged = run("#wsum(4 dog 1 cat)", model);
        assert_same_scores(&repeated, &merged);
    }

    #[test]
    fn indri_wsum_is_weighted_mean() {
        let model = RetrievalModel::Indri(IndriParams::default());
        let both = run("#wsum(1 dog 1 bird)", model);
        let dog = run("dog", model);
        assert_eq!(docs(&both), vec![0, 2]);
        assert!(both[0].1 < dog[0].1);
    }
}
