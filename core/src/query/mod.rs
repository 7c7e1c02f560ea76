//! Query trees and their document-at-a-time evaluation.
//!
//! A parsed query is a [`QueryNode`] tree. Positional operators (TERM, SYN,
//! NEAR, WINDOW) are fully evaluated into inverted lists; structural
//! operators (OR, AND, WAND, SUM, WSUM and the SCORE wrapper) iterate those
//! lists together and score one document at a time.

mod iterator;
mod parser;
mod scorer;

pub use iterator::{evaluate_positional, PostingCursor};
pub use parser::{cleanup, parse_query};
pub use scorer::{ScoringContext, ScoringTree};

use std::fmt;

/// Fields a `term.field` token may name.
pub const FIELDS: &[&str] = &["body", "title", "url", "inlink", "keywords"];
pub const DEFAULT_FIELD: &str = "body";

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Term { term: String, field: String },
    Syn,
    /// Ordered proximity: each argument within `n` positions after the previous one.
    Near(u32),
    /// Unordered proximity: all arguments within a span of `n` positions.
    Window(u32),
    /// Turns a positional argument into a scored one.
    Score,
    Or,
    And,
    Wand,
    Sum,
    Wsum,
}

impl Operator {
    /// Operators that produce inverted lists with positions.
    pub fn is_positional(&self) -> bool {
        matches!(self, Operator::Term { .. } | Operator::Syn | Operator::Near(_) | Operator::Window(_))
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self, Operator::Wand | Operator::Wsum)
    }

    /// Whether repeated identical arguments fold into one with a query-term frequency.
    pub(crate) fn collapses_repeats(&self) -> bool {
        matches!(self, Operator::Sum | Operator::Wsum | Operator::And)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Term { term, field } => write!(f, "{term}.{field}"),
            Operator::Syn => f.write_str("#syn"),
            Operator::Near(n) => write!(f, "#near/{n}"),
            Operator::Window(n) => write!(f, "#window/{n}"),
            Operator::Score => f.write_str("#score"),
            Operator::Or => f.write_str("#or"),
            Operator::And => f.write_str("#and"),
            Operator::Wand => f.write_str("#wand"),
            Operator::Sum => f.write_str("#sum"),
            Operator::Wsum => f.write_str("#wsum"),
        }
    }
}

/// A query operator and its ordered arguments. Weighted operators carry one
/// weight per argument, in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub op: Operator,
    pub args: Vec<QueryNode>,
    pub weights: Vec<f64>,
}

impl QueryNode {
    pub fn new(op: Operator) -> Self {
        Self { op, args: Vec::new(), weights: Vec::new() }
    }

    pub fn term(term: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(Operator::Term { term: term.into(), field: field.into() })
    }

    pub fn is_term(&self) -> bool {
        matches!(self.op, Operator::Term { .. })
    }

    /// Adds `arg` as the last argument. A positional argument of a structural
    /// operator is wrapped in SCORE. `weight` is recorded only for weighted
    /// operators.
    pub fn append(&mut self, arg: QueryNode, weight: Option<f64>) {
        let arg = if !self.op.is_positional() && self.op != Operator::Score && arg.op.is_positional() {
            QueryNode { op: Operator::Score, args: vec![arg], weights: Vec::new() }
        } else {
            arg
        };
        self.args.push(arg);
        if self.op.is_weighted() {
            self.weights.push(weight.unwrap_or(0.0));
        }
    }

    /// The positional node under a SCORE wrapper, or the node itself.
    pub fn unwrap_score(&self) -> &QueryNode {
        match (&self.op, self.args.first()) {
            (Operator::Score, Some(inner)) => inner,
            _ => self,
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Operator::Term { .. } => write!(f, "{}", self.op),
            Operator::Score if self.args.len() == 1 => write!(f, "{}", self.args[0]),
            op => {
                write!(f, "{op}(")?;
                for (i, arg) in self.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    if let Some(w) = self.weights.get(i) {
                        write!(f, "{w} ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
