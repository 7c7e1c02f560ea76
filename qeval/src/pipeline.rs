//! Batch runs: plain retrieval, pseudo-relevance feedback and learning to rank.

use crate::params::{Feedback, Letor, Params};
use anyhow::{Context, Result};
use qeval_core::expansion::{combine, expand};
use qeval_core::formats::{read_page_rank, read_qrels, read_queries, read_trec, write_trec};
use qeval_core::letor::{
    normalize, query_terms, read_feature_ids, read_predictions, rerank, write_feature_row, FeatureExtractor,
    FeatureRow, FeatureVector,
};
use qeval_core::{execute, parse_query, DocId, IndexReader, QueryError, QueryNode, RetrievalModel, ScoreList};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).with_context(|| format!("can't create {}", path.display()))?;
    Ok(BufWriter::new(f))
}

/// `Ok(None)` for errors confined to this query, which are logged and skipped.
fn query_local<T>(qid: &str, result: Result<T, QueryError>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_query_local() => {
            warn!(qid, error = %e, "skipping query");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn parse(qid: &str, text: &str, model: &RetrievalModel) -> Result<Option<QueryNode>> {
    let query = query_local(qid, parse_query(text, model))?;
    if let Some(q) = &query {
        debug!(qid, query = %q, "parsed");
    }
    Ok(query)
}

/// Parse, execute and rank one query.
pub fn evaluate(index: &dyn IndexReader, qid: &str, text: &str, model: &RetrievalModel) -> Result<Option<ScoreList>> {
    let Some(query) = parse(qid, text, model)? else { return Ok(None) };
    let Some(mut results) = query_local(qid, execute(&query, index, model))? else { return Ok(None) };
    results.rank();
    Ok(Some(results))
}

/// Dispatch on the configured run type.
pub fn run(index: &dyn IndexReader, params: &Params) -> Result<()> {
    match (&params.letor, &params.feedback) {
        (Some(letor), _) => run_letor(index, params, letor),
        (None, Some(fb)) => run_feedback(index, params, fb),
        (None, None) => run_queries(index, params),
    }
}

pub fn run_queries(index: &dyn IndexReader, params: &Params) -> Result<()> {
    let model = params.model.first_pass();
    let queries = read_queries(&params.query_file)?;
    let mut out = create(&params.output)?;
    for (qid, text) in &queries {
        info!(qid = %qid, "processing query");
        if let Some(results) = evaluate(index, qid, text, &model)? {
            write_trec(&mut out, qid, &results)?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn run_feedback(index: &dyn IndexReader, params: &Params, fb: &Feedback) -> Result<()> {
    let model = params.model.first_pass();
    let queries = read_queries(&params.query_file)?;
    let initial = match &fb.initial_ranking {
        Some(path) => Some(read_trec(path)?),
        None => None,
    };
    let mut out = create(&params.output)?;
    let mut expansions = create(&fb.expansion_query_file)?;

    for (qid, text) in &queries {
        info!(qid = %qid, "expanding query");
        let top: Vec<(DocId, f64)> = match &initial {
            Some(ranking) => ranking
                .get(qid)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .take(fb.params.fb_docs)
                .filter_map(|(ext, score)| match index.internal_doc_id(ext) {
                    Some(doc) => Some((doc, *score)),
                    None => {
                        warn!(qid = %qid, doc = %ext, "ranked document not in index");
                        None
                    }
                })
                .collect(),
            None => match evaluate(index, qid, text, &model)? {
                Some(results) => results.top(fb.params.fb_docs),
                None => continue,
            },
        };

        let expanded = expand(index, &top, &fb.params, &model);
        writeln!(expansions, "{qid}: {expanded}")?;
        let combined = combine(text, &expanded, &fb.params, &model);
        if let Some(results) = evaluate(index, qid, &combined, &model)? {
            write_trec(&mut out, qid, &results)?;
        }
    }
    expansions.flush()?;
    out.flush()?;
    Ok(())
}

/// Extract, normalize and write the feature rows of one query's documents.
fn write_query_features<W: Write>(
    out: &mut W,
    index: &dyn IndexReader,
    extractor: &FeatureExtractor<'_>,
    page_rank: &HashMap<String, f64>,
    query: &QueryNode,
    qid: &str,
    docs: &[(String, i32)],
) -> Result<()> {
    let terms = query_terms(query);
    let mut judged = Vec::with_capacity(docs.len());
    let mut vectors: Vec<FeatureVector> = Vec::with_capacity(docs.len());
    for (ext, relevance) in docs {
        let Some(doc) = index.internal_doc_id(ext) else {
            warn!(qid, doc = %ext, "judged document not in index");
            continue;
        };
        vectors.push(extractor.extract(&terms, doc, page_rank.get(ext).copied()));
        judged.push((ext, *relevance));
    }
    normalize(&mut vectors);
    for ((ext, relevance), features) in judged.into_iter().zip(vectors) {
        let row = FeatureRow { qid: qid.to_string(), external_id: ext.clone(), relevance, features };
        write_feature_row(out, &row, extractor.disabled())?;
    }
    Ok(())
}

pub fn run_letor(index: &dyn IndexReader, params: &Params, letor: &Letor) -> Result<()> {
    let first_pass = params.model.first_pass();
    let extractor = FeatureExtractor::new(index, &params.model, letor.disabled_features.clone());
    let page_rank = match &letor.page_rank_file {
        Some(path) => read_page_rank(path)?,
        None => HashMap::new(),
    };

    info!("extracting training features");
    let qrels = read_qrels(&letor.training_qrels_file)?;
    let mut train = create(&letor.training_feature_file)?;
    for (qid, text) in &read_queries(&letor.training_query_file)? {
        let Some(query) = parse(qid, text, &first_pass)? else { continue };
        let docs: Vec<(String, i32)> = qrels
            .get(qid)
            .map(|js| js.iter().map(|j| (j.external_id.clone(), j.relevance)).collect())
            .unwrap_or_default();
        write_query_features(&mut train, index, &extractor, &page_rank, &query, qid, &docs)?;
    }
    train.flush()?;
    drop(train);

    info!("training ranker");
    letor.ranker.learn(&letor.training_feature_file, &letor.model_file)?;

    info!("ranking test queries");
    let mut initial = create(&params.output)?;
    let mut test = create(&letor.testing_feature_file)?;
    for (qid, text) in &read_queries(&params.query_file)? {
        let Some(query) = parse(qid, text, &first_pass)? else { continue };
        let Some(mut results) = query_local(qid, execute(&query, index, &first_pass))? else { continue };
        results.rank();
        write_trec(&mut initial, qid, &results)?;
        let docs: Vec<(String, i32)> = results.iter().map(|r| (r.external_id.clone(), 0)).collect();
        write_query_features(&mut test, index, &extractor, &page_rank, &query, qid, &docs)?;
    }
    initial.flush()?;
    test.flush()?;
    drop((initial, test));

    info!("classifying");
    letor.ranker.classify(&letor.testing_feature_file, &letor.model_file, &letor.testing_document_scores)?;
    let ids = read_feature_ids(&letor.testing_feature_file)?;
    let predictions = read_predictions(&letor.testing_document_scores)?;
    let reranked = rerank(index, &ids, &predictions)?;

    let mut out = create(&params.output)?;
    for (qid, results) in &reranked {
        write_trec(&mut out, qid, results)?;
    }
    out.flush()?;
    Ok(())
}
