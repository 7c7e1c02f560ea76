use super::{Operator, QueryNode, DEFAULT_FIELD, FIELDS};
use crate::error::{QueryError, Result};
use crate::model::RetrievalModel;
use crate::tokenizer::tokenize_query;

/// An operator being filled in, plus the weight read for its next argument.
struct Frame {
    node: QueryNode,
    pending_weight: Option<f64>,
}

impl Frame {
    fn new(op: Operator) -> Self {
        Self { node: QueryNode::new(op), pending_weight: None }
    }

    fn expects_weight(&self) -> bool {
        self.node.op.is_weighted() && self.pending_weight.is_none()
    }

    fn attach(&mut self, arg: QueryNode) -> Result<()> {
        if self.node.op.is_weighted() {
            let weight = self
                .pending_weight
                .take()
                .ok_or_else(|| QueryError::MissingWeight(arg.to_string()))?;
            self.node.append(arg, Some(weight));
        } else {
            self.node.append(arg, None);
        }
        Ok(())
    }
}

/// Split on whitespace, commas and parentheses. Only `)` survives as a token:
/// an operator keyword implicitly opens its argument list.
fn lex(query: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in query.char_indices() {
        let delimiter = matches!(c, ' ' | '\t' | '\n' | '\r' | ',' | '(' | ')');
        if delimiter {
            if let Some(s) = start.take() {
                tokens.push(&query[s..i]);
            }
            if c == ')' {
                tokens.push(&query[i..i + 1]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&query[s..]);
    }
    tokens
}

fn parse_distance(token: &str, digits: &str) -> Result<u32> {
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(QueryError::InvalidDistance(token.to_string())),
    }
}

fn operator_keyword(token: &str) -> Result<Option<Operator>> {
    let lower = token.to_ascii_lowercase();
    let op = match lower.as_str() {
        "#or" => Operator::Or,
        "#and" => Operator::And,
        "#wand" => Operator::Wand,
        "#sum" => Operator::Sum,
        "#wsum" => Operator::Wsum,
        "#syn" => Operator::Syn,
        _ => {
            if let Some(n) = lower.strip_prefix("#near/") {
                Operator::Near(parse_distance(token, n)?)
            } else if let Some(n) = lower.strip_prefix("#window/") {
                Operator::Window(parse_distance(token, n)?)
            } else {
                return Ok(None);
            }
        }
    };
    Ok(Some(op))
}

fn split_field(token: &str) -> Result<(&str, String)> {
    match token.find('.') {
        None => Ok((token, DEFAULT_FIELD.to_string())),
        Some(d) => {
            let field = token[d + 1..].to_lowercase();
            if !FIELDS.contains(&field.as_str()) {
                return Err(QueryError::UnknownField(token.to_string()));
            }
            Ok((&token[..d], field))
        }
    }
}

/// Parse `query` into a cleaned operator tree, wrapped in the model's
/// default operator.
pub fn parse_query(query: &str, model: &RetrievalModel) -> Result<QueryNode> {
    let wrapped = format!("{}({})", model.default_operator(), query);
    let tokens = lex(&wrapped);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root = None;
    let mut consumed = 0;

    for token in &tokens {
        consumed += 1;
        if *token == ")" {
            let frame = stack.pop().ok_or_else(|| QueryError::Unbalanced(query.to_string()))?;
            match stack.last_mut() {
                None => {
                    root = Some(frame.node);
                    break;
                }
                Some(parent) => parent.attach(frame.node)?,
            }
            continue;
        }

        if let Some(op) = operator_keyword(token)? {
            stack.push(Frame::new(op));
            continue;
        }

        let frame = stack.last_mut().ok_or_else(|| QueryError::TrailingTokens(token.to_string()))?;
        if frame.expects_weight() {
            let weight = token.parse::<f64>().map_err(|_| QueryError::MissingWeight(token.to_string()))?;
            frame.pending_weight = Some(weight);
            continue;
        }

        let (raw, field) = split_field(token)?;
        let weight = frame.pending_weight.take();
        for term in tokenize_query(raw) {
            frame.node.append(QueryNode::term(term, field.clone()), weight);
        }
    }

    if consumed < tokens.len() {
        return Err(QueryError::TrailingTokens(tokens[consumed..].join(" ")));
    }
    let root = root.ok_or_else(|| QueryError::Unbalanced(query.to_string()))?;
    Ok(cleanup(root))
}

fn same_category(a: &Operator, b: &Operator) -> bool {
    a.is_positional() == b.is_positional()
}

/// Remove childless operators and collapse single-argument operators into
/// their argument, repeating until nothing changes.
pub fn cleanup(mut root: QueryNode) -> QueryNode {
    loop {
        let mut changed = false;
        while root.op != Operator::Score
            && root.args.len() == 1
            && same_category(&root.op, &root.args[0].op)
        {
            root = root.args.remove(0);
            changed = true;
        }
        let (next, args_changed) = cleanup_args(root);
        root = next;
        if !(changed || args_changed) {
            return root;
        }
    }
}

fn cleanup_args(node: QueryNode) -> (QueryNode, bool) {
    let QueryNode { op, args, weights } = node;
    let mut changed = false;
    let mut kept_args = Vec::with_capacity(args.len());
    let mut kept_weights = Vec::with_capacity(weights.len());

    for (i, mut arg) in args.into_iter().enumerate() {
        if arg.args.is_empty() && !arg.is_term() {
            changed = true;
            continue;
        }
        let arg = if arg.args.len() == 1 && arg.op != Operator::Score && same_category(&arg.op, &arg.args[0].op) {
            changed = true;
            arg.args.remove(0)
        } else {
            let (arg, c) = cleanup_args(arg);
            changed |= c;
            arg
        };
        kept_args.push(arg);
        if let Some(w) = weights.get(i) {
            kept_weights.push(*w);
        }
    }

    (QueryNode { op, args: kept_args, weights: kept_weights }, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bm25Params, IndriParams};

    fn bm25() -> RetrievalModel {
        RetrievalModel::Bm25(Bm25Params::default())
    }

    fn indri() -> RetrievalModel {
        RetrievalModel::Indri(IndriParams::default())
    }

    #[test]
    fn lexer_keeps_only_closing_parens() {
        assert_eq!(lex("#and(a, b.title)"), vec!["#and", "a", "b.title", ")"]);
    }

    #[test]
    fn round_trip_weighted_structure() {
        let q = parse_query("#sum(dog cat.title #wand(2.0 fish 1.0 bird))", &bm25()).unwrap();
        assert_eq!(q.to_string(), "#sum(dog.body cat.title #wand(2 fish.body 1 bird.body))");
        let again = parse_query(&q.to_string(), &bm25()).unwrap();
        assert_eq!(again, q);
        assert_eq!(q.args[2].weights, vec![2.0, 1.0]);
    }

    #[test]
    fn default_operator_wraps_bare_terms() {
        let q = parse_query("dog cat", &indri()).unwrap();
        assert_eq!(q.op, Operator::And);
        assert_eq!(q.args.len(), 2);
        assert_eq!(q.args[0].unwrap_score(), &QueryNode::term("dog", "body"));
    }

    #[test]
    fn hyphenated_terms_share_field_and_weight() {
        let q = parse_query("#wsum(0.3 near-death.title 0.7 cat)", &indri()).unwrap();
        assert_eq!(q.op, Operator::Wsum);
        assert_eq!(q.weights, vec![0.3, 0.3, 0.7]);
        assert_eq!(q.args[1].unwrap_score(), &QueryNode::term("death", "title"));
    }

    #[test]
    fn proximity_distance_and_cleanup() {
        let q = parse_query("#near/2(the dog)", &bm25()).unwrap();
        // #near/2 with one surviving argument collapses into the term itself.
        assert_eq!(q.op, Operator::Score);
        assert_eq!(q.args[0], QueryNode::term("dog", "body"));

        let q = parse_query("#window/8(dog cat) #or(the of)", &bm25()).unwrap();
        assert_eq!(q.op, Operator::Score);
        assert_eq!(q.args[0].op, Operator::Window(8));
    }

    #[test]
    fn stopword_only_query_is_empty() {
        let q = parse_query("the of", &bm25()).unwrap();
        assert!(q.args.is_empty());
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(parse_query("dog.author", &bm25()), Err(QueryError::UnknownField(_))));
        assert!(matches!(parse_query("#and(dog", &indri()), Err(QueryError::Unbalanced(_))));
        assert!(matches!(parse_query("dog) cat", &indri()), Err(QueryError::TrailingTokens(_))));
        assert!(matches!(parse_query("#wand(dog 1.0 cat)", &indri()), Err(QueryError::MissingWeight(_))));
        assert!(matches!(parse_query("#wsum(1.0 #and(a b) #and(c d))", &indri()), Err(QueryError::MissingWeight(_))));
        assert!(matches!(parse_query("#near/x(a b)", &indri()), Err(QueryError::InvalidDistance(_))));
    }

    #[test]
    fn cleanup_drops_empty_nested_operators() {
        let q = parse_query("#sum(dog #sum(the) #syn(cat kitten))", &bm25()).unwrap();
        assert_eq!(q.args.len(), 2);
        assert_eq!(q.args[1].unwrap_score().op, Operator::Syn);
    }
}
