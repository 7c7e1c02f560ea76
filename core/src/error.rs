use thiserror::Error;

/// Errors raised while parsing, planning or scoring a query.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// A `term.field` token named a field outside the allowed set.
    #[error("unknown field in '{0}'")]
    UnknownField(String),
    /// Parentheses did not balance.
    #[error("unbalanced parentheses in query '{0}'")]
    Unbalanced(String),
    /// A weighted operator argument was not preceded by a weight.
    #[error("missing weight before '{0}'")]
    MissingWeight(String),
    /// Tokens remained after the outermost operator closed.
    #[error("query syntax is incorrect, unexpected '{0}'")]
    TrailingTokens(String),
    /// `#near/n` or `#window/n` with a distance that is not a positive integer.
    #[error("invalid proximity distance in '{0}'")]
    InvalidDistance(String),
    /// A positional operator given a structural (scored) argument.
    #[error("{0} cannot be an argument of a positional operator")]
    NotPositional(String),
    /// A positional operator whose arguments live in different fields.
    #[error("arguments of {operator} must share one field, found {first} and {other}")]
    FieldMismatch { operator: String, first: String, other: String },
    /// The retrieval model defines no scoring for this operator.
    #[error("{model} doesn't support the {operator} operator")]
    Unsupported { model: &'static str, operator: String },
    /// The external ranker exited unsuccessfully or could not be started.
    #[error("ranker failed: {0}")]
    Ranker(String),
}

impl QueryError {
    /// True for errors confined to the query being parsed; the run may go on.
    pub fn is_query_local(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownField(_)
                | QueryError::Unbalanced(_)
                | QueryError::MissingWeight(_)
                | QueryError::TrailingTokens(_)
                | QueryError::InvalidDistance(_)
                | QueryError::NotPositional(_)
                | QueryError::FieldMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
