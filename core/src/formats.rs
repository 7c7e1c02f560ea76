//! Line-oriented run files: queries, TREC rankings, relevance judgments and
//! page-rank scores.

use crate::engine::ScoreList;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

fn lines(path: &Path) -> Result<impl Iterator<Item = std::io::Result<String>>> {
    let f = File::open(path).with_context(|| format!("can't read {}", path.display()))?;
    Ok(BufReader::new(f).lines())
}

/// `<qid>:<query text>` per line, in file order. Blank lines are skipped.
pub fn read_queries(path: &Path) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for (n, line) in lines(path)?.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (qid, text) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("{}:{}: missing ':' in query line", path.display(), n + 1))?;
        out.push((qid.trim().to_string(), text.trim().to_string()));
    }
    Ok(out)
}

/// Write one query's ranked results. `results` must already be ranked.
pub fn write_trec<W: Write>(out: &mut W, qid: &str, results: &ScoreList) -> std::io::Result<()> {
    if results.is_empty() {
        info!(qid, "No results");
        return Ok(());
    }
    for (rank, r) in results.iter().enumerate() {
        writeln!(out, "{} Q0 {} {} {:.12} fubar", qid, r.external_id, rank + 1, r.score)?;
    }
    Ok(())
}

/// An existing TREC ranking, grouped by query id, lines kept in file order.
pub fn read_trec(path: &Path) -> Result<HashMap<String, Vec<(String, f64)>>> {
    let mut out: HashMap<String, Vec<(String, f64)>> = HashMap::new();
    for (n, line) in lines(path)?.enumerate() {
        let line = line?;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() {
            continue;
        }
        if cols.len() < 5 {
            return Err(anyhow!("{}:{}: expected 6 columns", path.display(), n + 1));
        }
        let score: f64 = cols[4]
            .parse()
            .with_context(|| format!("{}:{}: bad score '{}'", path.display(), n + 1, cols[4]))?;
        out.entry(cols[0].to_string()).or_default().push((cols[2].to_string(), score));
    }
    Ok(out)
}

/// One relevance judgment.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub external_id: String,
    pub relevance: i32,
}

/// `<qid> <ignored> <externalDocId> <relevance>` per line, grouped by query
/// id in file order.
pub fn read_qrels(path: &Path) -> Result<HashMap<String, Vec<Judgment>>> {
    let mut out: HashMap<String, Vec<Judgment>> = HashMap::new();
    for (n, line) in lines(path)?.enumerate() {
        let line = line?;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() {
            continue;
        }
        if cols.len() < 4 {
            return Err(anyhow!("{}:{}: expected 4 columns", path.display(), n + 1));
        }
        let relevance = cols[3]
            .parse()
            .with_context(|| format!("{}:{}: bad relevance '{}'", path.display(), n + 1, cols[3]))?;
        out.entry(cols[0].to_string())
            .or_default()
            .push(Judgment { external_id: cols[2].to_string(), relevance });
    }
    Ok(out)
}

/// `<externalDocId>\t<score>` per line. Unparseable lines are skipped.
pub fn read_page_rank(path: &Path) -> Result<HashMap<String, f64>> {
    let mut out = HashMap::new();
    for line in lines(path)? {
        let line = line?;
        let mut cols = line.split_whitespace();
        match (cols.next(), cols.next().map(str::parse::<f64>)) {
            (Some(id), Some(Ok(score))) => {
                out.insert(id.to_string(), score);
            }
            (None, _) => {}
            _ => warn!(line = %line, "skipping page-rank line"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn trec_lines() {
        let mut list = ScoreList::new();
        list.add(3, "GX-1", 0.5);
        list.add(1, "GX-0", 0.25);
        list.rank();
        let mut buf = Vec::new();
        write_trec(&mut buf, "7", &list).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "7 Q0 GX-1 1 0.500000000000 fubar\n7 Q0 GX-0 2 0.250000000000 fubar\n"
        );
    }

    #[test]
    fn empty_results_write_nothing() {
        let mut buf = Vec::new();
        write_trec(&mut buf, "7", &ScoreList::new()).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn input_files() {
        let dir = tempfile::tempdir().unwrap();
        let q = dir.path().join("q.txt");
        fs::write(&q, "10:#and(dog cat)\n\n11: bird\n").unwrap();
        assert_eq!(
            read_queries(&q).unwrap(),
            vec![
                ("10".to_string(), "#and(dog cat)".to_string()),
                ("11".to_string(), "bird".to_string())
            ]
        );

        let qrels = dir.path().join("qrels");
        fs::write(&qrels, "10 0 d1 2\n10 0 d0 -1\n11 0 d2 0\n").unwrap();
        let j = read_qrels(&qrels).unwrap();
        assert_eq!(j["10"][1], Judgment { external_id: "d0".into(), relevance: -1 });

        let pr = dir.path().join("pr");
        fs::write(&pr, "d1\t0.75\nbroken\n").unwrap();
        let pr = read_page_rank(&pr).unwrap();
        assert_eq!(pr.get("d1"), Some(&0.75));
        assert_eq!(pr.len(), 1);

        let run = dir.path().join("run");
        fs::write(&run, "10 Q0 d1 1 2.5 fubar\n10 Q0 d0 2 1.0 fubar\n").unwrap();
        assert_eq!(read_trec(&run).unwrap()["10"], vec![("d1".to_string(), 2.5), ("d0".to_string(), 1.0)]);
    }
}
