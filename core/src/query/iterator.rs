use super::{Operator, QueryNode};
use crate::error::{QueryError, Result};
use crate::index::{IndexReader, InvList, Posting};
use crate::DocId;

/// Document cursor plus position cursor over an evaluated inverted list.
///
/// `advance_past` and `advance_to` never move backwards, so calling them
/// again with the same target is a no-op.
#[derive(Debug, Clone)]
pub struct PostingCursor {
    list: InvList,
    doc: usize,
    loc: usize,
}

impl PostingCursor {
    pub fn new(list: InvList) -> Self {
        Self { list, doc: 0, loc: 0 }
    }

    pub fn list(&self) -> &InvList { &self.list }

    pub fn has_match(&self) -> bool { self.doc < self.list.postings.len() }

    pub fn current_match(&self) -> Option<DocId> {
        self.current_posting().map(|p| p.doc_id)
    }

    pub fn current_posting(&self) -> Option<&Posting> {
        self.list.postings.get(self.doc)
    }

    /// Move to the first posting with a doc id strictly greater than `doc`.
    pub fn advance_past(&mut self, doc: DocId) {
        let skip = self.list.postings[self.doc..].partition_point(|p| p.doc_id <= doc);
        if skip > 0 {
            self.doc += skip;
            self.loc = 0;
        }
    }

    /// Move to the first posting with a doc id greater than or equal to `doc`.
    pub fn advance_to(&mut self, doc: DocId) {
        let skip = self.list.postings[self.doc..].partition_point(|p| p.doc_id < doc);
        if skip > 0 {
            self.doc += skip;
            self.loc = 0;
        }
    }

    pub fn has_position(&self) -> bool {
        self.current_position().is_some()
    }

    pub fn current_position(&self) -> Option<u32> {
        self.current_posting().and_then(|p| p.positions.get(self.loc).copied())
    }

    pub fn advance_position(&mut self) {
        self.loc += 1;
    }

    /// Move to the first position in the current document greater than `pos`.
    pub fn advance_position_past(&mut self, pos: u32) {
        if let Some(p) = self.list.postings.get(self.doc) {
            let rest = p.positions.get(self.loc..).unwrap_or(&[]);
            self.loc += rest.partition_point(|&x| x <= pos);
        }
    }
}

/// Fully evaluate a positional operator into an inverted list.
pub fn evaluate_positional(node: &QueryNode, index: &dyn IndexReader) -> Result<InvList> {
    match &node.op {
        Operator::Term { term, field } => Ok(index.inverted_list(term, field)),
        Operator::Syn | Operator::Near(_) | Operator::Window(_) => {
            let mut cursors = Vec::with_capacity(node.args.len());
            for arg in &node.args {
                let list = evaluate_positional(arg, index)?;
                if let Some(first) = cursors.first().map(|c: &PostingCursor| c.list().field.clone()) {
                    if first != list.field {
                        return Err(QueryError::FieldMismatch {
                            operator: node.op.to_string(),
                            first,
                            other: list.field,
                        });
                    }
                }
                cursors.push(PostingCursor::new(list));
            }
            let field = cursors.first().map(|c| c.list().field.clone()).unwrap_or_default();
            let out = InvList::new(field);
            Ok(match node.op {
                Operator::Syn => synonym(cursors, out),
                Operator::Near(n) => near(cursors, n, out),
                Operator::Window(n) => window(cursors, n, out),
                _ => out,
            })
        }
        _ => Err(QueryError::NotPositional(node.to_string())),
    }
}

fn synonym(mut cursors: Vec<PostingCursor>, mut out: InvList) -> InvList {
    while let Some(doc) = cursors.iter().filter_map(PostingCursor::current_match).min() {
        let mut positions = Vec::new();
        for c in cursors.iter_mut().filter(|c| c.current_match() == Some(doc)) {
            if let Some(p) = c.current_posting() {
                positions.extend_from_slice(&p.positions);
            }
            c.advance_past(doc);
        }
        positions.sort_unstable();
        out.append_posting(doc, positions);
    }
    out
}

/// Advance every cursor to the next document all of them contain.
fn align(cursors: &mut [PostingCursor]) -> Option<DocId> {
    let mut target = cursors.first()?.current_match()?;
    loop {
        let mut agreed = true;
        for c in cursors.iter_mut() {
            c.advance_to(target);
            let doc = c.current_match()?;
            if doc != target {
                target = doc;
                agreed = false;
            }
        }
        if agreed {
            return Some(target);
        }
    }
}

fn near(mut cursors: Vec<PostingCursor>, distance: u32, mut out: InvList) -> InvList {
    if cursors.is_empty() {
        return out;
    }
    while let Some(doc) = align(&mut cursors) {
        let mut positions = Vec::new();
        'anchor: while let Some(anchor) = cursors[0].current_position() {
            let mut last = anchor;
            let mut matched = true;
            for c in cursors[1..].iter_mut() {
                c.advance_position_past(last);
                let Some(now) = c.current_position() else { break 'anchor };
                if now - last > distance {
                    matched = false;
                    break;
                }
                c.advance_position_past(now);
                last = now;
            }
            if matched {
                positions.push(last);
            }
            cursors[0].advance_position();
        }
        if !positions.is_empty() {
            out.append_posting(doc, positions);
        }
        cursors[0].advance_past(doc);
    }
    out
}

fn window(mut cursors: Vec<PostingCursor>, size: u32, mut out: InvList) -> InvList {
    if cursors.is_empty() {
        return out;
    }
    while let Some(doc) = align(&mut cursors) {
        let mut positions = Vec::new();
        loop {
            let Some(current) = cursors.iter().map(PostingCursor::current_position).collect::<Option<Vec<u32>>>() else { break };
            let (min_at, min) = current.iter().copied().enumerate().min_by_key(|&(_, p)| p).unwrap_or((0, 0));
            let max = current.iter().copied().max().unwrap_or(0);
            if max - min < size {
                positions.push(max);
                cursors.iter_mut().for_each(PostingCursor::advance_position);
            } else {
                cursors[min_at].advance_position();
            }
        }
        if !positions.is_empty() {
            out.append_posting(doc, positions);
        }
        cursors[0].advance_past(doc);
    }
    out
}
