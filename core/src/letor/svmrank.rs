use super::FeatureVector;
use crate::engine::ScoreList;
use crate::error::QueryError;
use crate::index::IndexReader;
use anyhow::{anyhow, Context};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

lazy_static! {
    static ref QID_RE: Regex = Regex::new(r"qid:(\S+)").expect("valid regex");
    static ref DOC_RE: Regex = Regex::new(r"# (.+)$").expect("valid regex");
}

/// One line of a ranker input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub qid: String,
    pub external_id: String,
    pub relevance: i32,
    pub features: FeatureVector,
}

/// `<relevance> qid:<qid> <n>:<value> ... # <externalDocId>`, with feature
/// numbers 1-based. Disabled and missing features are left out.
pub fn write_feature_row<W: Write>(out: &mut W, row: &FeatureRow, disabled: &HashSet<usize>) -> std::io::Result<()> {
    write!(out, "{} qid:{}", row.relevance, row.qid)?;
    for (i, value) in row.features.iter().enumerate() {
        let n = i + 1;
        if let (false, Some(v)) = (disabled.contains(&n), value) {
            write!(out, " {n}:{v}")?;
        }
    }
    writeln!(out, " # {}", row.external_id)
}

/// (query id, external doc id) for every line of a feature file, in order.
pub fn read_feature_ids(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path).with_context(|| format!("can't read {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let qid = QID_RE.captures(line).and_then(|c| c.get(1));
        let doc = DOC_RE.captures(line).and_then(|c| c.get(1));
        match (qid, doc) {
            (Some(q), Some(d)) => out.push((q.as_str().to_string(), d.as_str().trim().to_string())),
            _ => return Err(anyhow!("{}:{}: not a feature line", path.display(), n + 1)),
        }
    }
    Ok(out)
}

/// One predicted score per line.
pub fn read_predictions(path: &Path) -> anyhow::Result<Vec<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("can't read {}", path.display()))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim().parse::<f64>().with_context(|| format!("bad prediction '{l}'")))
        .collect()
}

/// Pair predictions with the feature file lines they were made for and rank
/// each query's documents by them. Queries keep their first-seen order.
pub fn rerank(index: &dyn IndexReader, ids: &[(String, String)], predictions: &[f64]) -> anyhow::Result<Vec<(String, ScoreList)>> {
    if ids.len() != predictions.len() {
        return Err(anyhow!("{} feature lines but {} predictions", ids.len(), predictions.len()));
    }
    let mut out: Vec<(String, ScoreList)> = Vec::new();
    for ((qid, ext), &score) in ids.iter().zip(predictions) {
        let Some(doc) = index.internal_doc_id(ext) else {
            warn!(qid = %qid, doc = %ext, "predicted document not in index");
            continue;
        };
        match out.iter_mut().find(|(q, _)| q == qid) {
            Some((_, list)) => list.add(doc, ext.as_str(), score),
            None => {
                let mut list = ScoreList::new();
                list.add(doc, ext.as_str(), score);
                out.push((qid.clone(), list));
            }
        }
    }
    for (_, list) in out.iter_mut() {
        list.rank();
    }
    Ok(out)
}

/// The external `svm_rank_learn` / `svm_rank_classify` pair.
#[derive(Debug, Clone)]
pub struct SvmRank {
    pub learn_path: PathBuf,
    pub classify_path: PathBuf,
    pub c: f64,
}

impl SvmRank {
    /// `learn -c <C> <train> <model>`
    pub fn learn(&self, train: &Path, model: &Path) -> Result<(), QueryError> {
        let mut cmd = Command::new(&self.learn_path);
        cmd.arg("-c").arg(self.c.to_string()).arg(train).arg(model);
        run(cmd)
    }

    /// `classify <test> <model> <predictions>`
    pub fn classify(&self, test: &Path, model: &Path, predictions: &Path) -> Result<(), QueryError> {
        let mut cmd = Command::new(&self.classify_path);
        cmd.arg(test).arg(model).arg(predictions);
        run(cmd)
    }
}

/// Run to completion with both output pipes drained, logging what the
/// ranker printed.
fn run(mut cmd: Command) -> Result<(), QueryError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    info!(program = %program, "starting ranker");
    let output = cmd.output().map_err(|e| QueryError::Ranker(format!("{program}: {e}")))?;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!(target: "svm_rank", "{line}");
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        warn!(target: "svm_rank", "{line}");
    }
    if !output.status.success() {
        return Err(QueryError::Ranker(format!("{program} exited with {}", output.status)));
    }
    Ok(())
}
