pub mod engine;
pub mod error;
pub mod expansion;
pub mod formats;
pub mod index;
pub mod letor;
pub mod model;
pub mod persist;
pub mod query;
pub mod tokenizer;

pub use engine::{execute, ScoreList, ScoredDoc, MAX_RESULTS};
pub use error::QueryError;
pub use index::{
    DocId, Document, FieldIndex, FieldTokens, IndexReader, InvList, MemoryIndex, Posting, StemStat, StoredDoc,
    TermVector,
};
pub use model::{Bm25Params, IndriParams, RetrievalModel};
pub use query::{parse_query, QueryNode};
