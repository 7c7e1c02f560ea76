use crate::tokenizer::analyze;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type DocId = u32;

/// One document's occurrences of a term within a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// 0-based token offsets, strictly increasing.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn tf(&self) -> u32 { self.positions.len() as u32 }
}

/// Doc-id ordered postings for one (term, field) pair, or the evaluated
/// result of a positional operator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvList {
    pub field: String,
    pub postings: Vec<Posting>,
    pub ctf: u64,
}

impl InvList {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), postings: Vec::new(), ctf: 0 }
    }

    pub fn from_postings(field: impl Into<String>, postings: Vec<Posting>) -> Self {
        let ctf = postings.iter().map(|p| p.tf() as u64).sum();
        Self { field: field.into(), postings, ctf }
    }

    /// Appends a posting; `doc_id` must exceed every doc id already present.
    pub fn append_posting(&mut self, doc_id: DocId, positions: Vec<u32>) {
        debug_assert!(self.postings.last().map_or(true, |p| p.doc_id < doc_id));
        self.ctf += positions.len() as u64;
        self.postings.push(Posting { doc_id, positions });
    }

    pub fn df(&self) -> u64 { self.postings.len() as u64 }
}

/// Per-stem statistics carried by a [`TermVector`].
#[derive(Debug, Clone, PartialEq)]
pub struct StemStat {
    pub stem: String,
    /// Frequency in this document's field.
    pub freq: u32,
    /// Collection term frequency in the field.
    pub ctf: u64,
    /// Number of documents containing the stem in the field.
    pub df: u64,
}

/// The analyzed contents of one field of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermVector {
    pub stems: Vec<StemStat>,
    /// Stem slot for every token position; `None` where a stop word was removed.
    pub positions: Vec<Option<u32>>,
}

impl TermVector {
    pub fn is_empty(&self) -> bool { self.stems.is_empty() }

    pub fn positions_len(&self) -> usize { self.positions.len() }

    pub fn stem(&self, term: &str) -> Option<&StemStat> {
        self.stems.iter().find(|s| s.stem == term)
    }

    pub fn stopword_count(&self) -> usize {
        self.positions.iter().filter(|slot| slot.is_none()).count()
    }
}

/// Read-only lookups the query engine needs from an index.
pub trait IndexReader {
    fn num_docs(&self) -> u64;
    /// Number of documents that have a non-empty `field`.
    fn doc_count(&self, field: &str) -> u64;
    fn field_length(&self, field: &str, doc: DocId) -> u64;
    fn sum_field_lengths(&self, field: &str) -> u64;
    fn term_doc_freq(&self, term: &str, field: &str) -> u64;
    fn term_collection_freq(&self, term: &str, field: &str) -> u64;
    /// Materialized inverted list; empty when the term never occurs in `field`.
    fn inverted_list(&self, term: &str, field: &str) -> InvList;
    /// `None` when the document has no indexed content for `field`.
    fn term_vector(&self, doc: DocId, field: &str) -> Option<TermVector>;
    fn internal_doc_id(&self, external_id: &str) -> Option<DocId>;
    fn external_doc_id(&self, doc: DocId) -> Option<&str>;
    fn stored_attribute(&self, name: &str, doc: DocId) -> Option<&str>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldTokens {
    pub stems: Vec<String>,
    pub slots: Vec<Option<u32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredDoc {
    pub external_id: String,
    pub attributes: HashMap<String, String>,
    pub fields: HashMap<String, FieldTokens>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldIndex {
    pub postings: HashMap<String, Vec<Posting>>,
    pub doc_count: u64,
    pub sum_lengths: u64,
}

/// Input to [`MemoryIndex::add`]: raw field text plus stored attributes.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub external_id: String,
    pub fields: Vec<(String, String)>,
    pub attributes: Vec<(String, String)>,
}

impl Document {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self { external_id: external_id.into(), ..Default::default() }
    }

    pub fn field(mut self, name: &str, text: &str) -> Self {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), text.to_string()));
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }
}

/// In-memory index over fielded documents. Doc ids are assigned densely in
/// insertion order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryIndex {
    pub docs: Vec<StoredDoc>,
    pub doc_id_map: HashMap<String, DocId>,
    pub fields: HashMap<String, FieldIndex>,
}

impl MemoryIndex {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, doc: Document) -> DocId {
        let doc_id = self.docs.len() as DocId;
        let mut stored = StoredDoc {
            external_id: doc.external_id.clone(),
            attributes: doc.attributes.into_iter().collect(),
            fields: HashMap::new(),
        };

        for (name, text) in doc.fields {
            let analyzed = analyze(&text);
            if analyzed.length == 0 { continue; }
            let mut tokens = FieldTokens { stems: Vec::new(), slots: vec![None; analyzed.length] };
            let mut slot_of: HashMap<String, u32> = HashMap::new();
            let mut positions: Vec<Vec<u32>> = Vec::new();
            for (term, pos) in analyzed.terms {
                let slot = *slot_of.entry(term.clone()).or_insert_with(|| {
                    tokens.stems.push(term);
                    positions.push(Vec::new());
                    (tokens.stems.len() - 1) as u32
                });
                tokens.slots[pos] = Some(slot);
                positions[slot as usize].push(pos as u32);
            }

            let field = self.fields.entry(name.clone()).or_default();
            field.doc_count += 1;
            field.sum_lengths += analyzed.length as u64;
            for (stem, positions) in tokens.stems.iter().zip(positions) {
                field.postings.entry(stem.clone()).or_default().push(Posting { doc_id, positions });
            }
            stored.fields.insert(name, tokens);
        }

        self.doc_id_map.insert(doc.external_id, doc_id);
        self.docs.push(stored);
        doc_id
    }

    fn postings(&self, term: &str, field: &str) -> &[Posting] {
        self.fields
            .get(field)
            .and_then(|f| f.postings.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl IndexReader for MemoryIndex {
    fn num_docs(&self) -> u64 { self.docs.len() as u64 }

    fn doc_count(&self, field: &str) -> u64 {
        self.fields.get(field).map_or(0, |f| f.doc_count)
    }

    fn field_length(&self, field: &str, doc: DocId) -> u64 {
        self.docs
            .get(doc as usize)
            .and_then(|d| d.fields.get(field))
            .map_or(0, |t| t.slots.len() as u64)
    }

    fn sum_field_lengths(&self, field: &str) -> u64 {
        self.fields.get(field).map_or(0, |f| f.sum_lengths)
    }

    fn term_doc_freq(&self, term: &str, field: &str) -> u64 {
        self.postings(term, field).len() as u64
    }

    fn term_collection_freq(&self, term: &str, field: &str) -> u64 {
        self.postings(term, field).iter().map(|p| p.tf() as u64).sum()
    }

    fn inverted_list(&self, term: &str, field: &str) -> InvList {
        InvList::from_postings(field, self.postings(term, field).to_vec())
    }

    fn term_vector(&self, doc: DocId, field: &str) -> Option<TermVector> {
        let tokens = self.docs.get(doc as usize)?.fields.get(field)?;
        let mut freqs = vec![0u32; tokens.stems.len()];
        for slot in tokens.slots.iter().flatten() {
            freqs[*slot as usize] += 1;
        }
        let stems = tokens
            .stems
            .iter()
            .zip(freqs)
            .map(|(stem, freq)| StemStat {
                stem: stem.clone(),
                freq,
                ctf: self.term_collection_freq(stem, field),
                df: self.term_doc_freq(stem, field),
            })
            .collect();
        Some(TermVector { stems, positions: tokens.slots.clone() })
    }

    fn internal_doc_id(&self, external_id: &str) -> Option<DocId> {
        self.doc_id_map.get(external_id).copied()
    }

    fn external_doc_id(&self, doc: DocId) -> Option<&str> {
        self.docs.get(doc as usize).map(|d| d.external_id.as_str())
    }

    fn stored_attribute(&self, name: &str, doc: DocId) -> Option<&str> {
        self.docs.get(doc as usize)?.attributes.get(name).map(String::as_str)
    }
}
