//! The `key=value` parameter file that configures a run.

use anyhow::{anyhow, bail, Context, Result};
use qeval_core::expansion::FeedbackParams;
use qeval_core::letor::{SvmRank, NUM_FEATURES};
use qeval_core::{Bm25Params, IndriParams, RetrievalModel};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Params {
    pub index_path: PathBuf,
    pub query_file: PathBuf,
    pub output: PathBuf,
    pub model: RetrievalModel,
    pub feedback: Option<Feedback>,
    pub letor: Option<Letor>,
}

#[derive(Debug, Clone)]
pub struct Feedback {
    pub params: FeedbackParams,
    /// Existing ranking to expand from; queries are run first when absent.
    pub initial_ranking: Option<PathBuf>,
    pub expansion_query_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Letor {
    pub training_query_file: PathBuf,
    pub training_qrels_file: PathBuf,
    pub training_feature_file: PathBuf,
    pub page_rank_file: Option<PathBuf>,
    /// 1-based feature numbers.
    pub disabled_features: HashSet<usize>,
    pub ranker: SvmRank,
    pub model_file: PathBuf,
    pub testing_feature_file: PathBuf,
    pub testing_document_scores: PathBuf,
}

struct Raw(HashMap<String, String>);

impl Raw {
    fn parse(text: &str) -> Result<Self> {
        let mut map = HashMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (k, v) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("line {}: expected key=value", n + 1))?;
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
        Ok(Raw(map))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| anyhow!("missing required parameter {key}"))
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        self.required(key).map(PathBuf::from)
    }

    fn number<T: FromStr>(&self, key: &str) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw = self.required(key)?;
        raw.parse().with_context(|| format!("bad value '{raw}' for {key}"))
    }

    fn number_or<T: FromStr>(&self, key: &str, default: T) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(_) => self.number(key),
            None => Ok(default),
        }
    }
}

impl Params {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("can't read {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let raw = Raw::parse(text)?;
        let model = model(&raw)?;
        let feedback = match raw.get("fb") {
            Some(v) if v.eq_ignore_ascii_case("true") => Some(feedback(&raw)?),
            _ => None,
        };
        let letor = match model {
            RetrievalModel::Letor { .. } => Some(letor(&raw)?),
            _ => None,
        };
        Ok(Params {
            index_path: raw.path("indexPath")?,
            query_file: raw.path("queryFilePath")?,
            output: raw.path("trecEvalOutputPath")?,
            model,
            feedback,
            letor,
        })
    }
}

fn model(raw: &Raw) -> Result<RetrievalModel> {
    let name = raw.required("retrievalAlgorithm")?.to_lowercase();
    let defaults_bm25 = Bm25Params::default();
    let defaults_indri = IndriParams::default();
    Ok(match name.as_str() {
        "unrankedboolean" => RetrievalModel::UnrankedBoolean,
        "rankedboolean" => RetrievalModel::RankedBoolean,
        "bm25" => RetrievalModel::Bm25(Bm25Params {
            k1: raw.number("BM25:k_1")?,
            b: raw.number("BM25:b")?,
            k3: raw.number("BM25:k_3")?,
        }),
        "indri" => RetrievalModel::Indri(IndriParams {
            mu: raw.number("Indri:mu")?,
            lambda: raw.number("Indri:lambda")?,
        }),
        "letor" => RetrievalModel::Letor {
            bm25: Bm25Params {
                k1: raw.number_or("BM25:k_1", defaults_bm25.k1)?,
                b: raw.number_or("BM25:b", defaults_bm25.b)?,
                k3: raw.number_or("BM25:k_3", defaults_bm25.k3)?,
            },
            indri: IndriParams {
                mu: raw.number_or("Indri:mu", defaults_indri.mu)?,
                lambda: raw.number_or("Indri:lambda", defaults_indri.lambda)?,
            },
        },
        other => bail!("unknown retrieval model {other}"),
    })
}

fn feedback(raw: &Raw) -> Result<Feedback> {
    let params = FeedbackParams {
        fb_docs: raw.number("fbDocs")?,
        fb_terms: raw.number("fbTerms")?,
        fb_mu: raw.number("fbMu")?,
        fb_orig_weight: raw.number("fbOrigWeight")?,
    };
    if !(0.0..=1.0).contains(&params.fb_orig_weight) {
        bail!("fbOrigWeight must be within [0, 1], got {}", params.fb_orig_weight);
    }
    Ok(Feedback {
        params,
        initial_ranking: raw.get("fbInitialRankingFile").map(PathBuf::from),
        expansion_query_file: raw.path("fbExpansionQueryFile")?,
    })
}

fn disabled_features(raw: &Raw) -> Result<HashSet<usize>> {
    let Some(list) = raw.get("letor:featureDisable") else { return Ok(HashSet::new()) };
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let n: usize = s.parse().with_context(|| format!("bad feature number '{s}'"))?;
            if n == 0 || n > NUM_FEATURES {
                bail!("feature {n} out of range 1..={NUM_FEATURES}");
            }
            Ok(n)
        })
        .collect()
}

fn letor(raw: &Raw) -> Result<Letor> {
    Ok(Letor {
        training_query_file: raw.path("letor:trainingQueryFile")?,
        training_qrels_file: raw.path("letor:trainingQrelsFile")?,
        training_feature_file: raw.path("letor:trainingFeatureVectorsFile")?,
        page_rank_file: raw.get("letor:pageRankFile").map(PathBuf::from),
        disabled_features: disabled_features(raw)?,
        ranker: SvmRank {
            learn_path: raw.path("letor:svmRankLearnPath")?,
            classify_path: raw.path("letor:svmRankClassifyPath")?,
            c: raw.number("letor:svmRankParamC")?,
        },
        model_file: raw.path("letor:svmRankModelFile")?,
        testing_feature_file: raw.path("letor:testingFeatureVectorsFile")?,
        testing_document_scores: raw.path("letor:testingDocumentScores")?,
    })
}
