use crate::{DocId, FieldIndex, MemoryIndex, StoredDoc};
use anyhow::{Context, Result};
use bincode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn fields(&self) -> PathBuf { self.root.join("fields.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).with_context(|| format!("can't read {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn save_docs(paths: &IndexPaths, docs: &(Vec<StoredDoc>, HashMap<String, DocId>)) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.docs())?;
    let bytes = bincode::serialize(docs)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_docs(paths: &IndexPaths) -> Result<(Vec<StoredDoc>, HashMap<String, DocId>)> {
    let docs = bincode::deserialize(&read_bytes(&paths.docs())?)?;
    Ok(docs)
}

pub fn save_fields(paths: &IndexPaths, fields: &HashMap<String, FieldIndex>) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.fields())?;
    let bytes = bincode::serialize(fields)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_fields(paths: &IndexPaths) -> Result<HashMap<String, FieldIndex>> {
    let fields = bincode::deserialize(&read_bytes(&paths.fields())?)?;
    Ok(fields)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = String::from_utf8(read_bytes(&paths.meta())?)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Write a full snapshot of `index` under `paths.root`.
pub fn save_index(paths: &IndexPaths, index: &MemoryIndex) -> Result<()> {
    save_docs(paths, &(index.docs.clone(), index.doc_id_map.clone()))?;
    save_fields(paths, &index.fields)?;
    let meta = MetaFile {
        num_docs: index.docs.len() as u32,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: FORMAT_VERSION,
    };
    save_meta(paths, &meta)
}

/// Load a snapshot written by [`save_index`].
pub fn load_index(paths: &IndexPaths) -> Result<MemoryIndex> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        anyhow::bail!("unsupported index format version {} in {}", meta.version, paths.root.display());
    }
    let (docs, doc_id_map) = load_docs(paths)?;
    let fields = load_fields(paths)?;
    if docs.len() != meta.num_docs as usize {
        anyhow::bail!("index at {} is inconsistent: meta lists {} docs, found {}", paths.root.display(), meta.num_docs, docs.len());
    }
    tracing::info!(num_docs = meta.num_docs, created_at = %meta.created_at, "loaded index");
    Ok(MemoryIndex { docs, doc_id_map, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, IndexReader};

    #[test]
    fn snapshot_round_trip_preserves_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut idx = MemoryIndex::new();
        idx.add(Document::new("GX000-00").field("body", "rust search engine").attribute("score", "42"));
        save_index(&paths, &idx).unwrap();

        let loaded = load_index(&paths).unwrap();
        assert_eq!(loaded.num_docs(), 1);
        assert_eq!(loaded.internal_doc_id("GX000-00"), Some(0));
        assert_eq!(loaded.term_doc_freq("search", "body"), 1);
        assert_eq!(loaded.stored_attribute("score", 0), Some("42"));
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_index(&IndexPaths::new(dir.path().join("nope"))).is_err());
    }
}
