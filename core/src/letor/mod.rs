//! Learning to rank: per-document features, per-query normalization, the
//! ranker file format and the external ranker process.

mod features;
mod svmrank;

pub use features::{query_terms, FeatureExtractor, FeatureVector, QueryTerms, NUM_FEATURES, REFERENCE_SITE, SCORED_FIELDS};
pub use svmrank::{read_feature_ids, read_predictions, rerank, write_feature_row, FeatureRow, SvmRank};

/// Min-max scale every column over one query's documents, ignoring missing
/// values. A column with no values, or a single distinct value, becomes all 0.
pub fn normalize(rows: &mut [FeatureVector]) {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for col in 0..width {
        let bounds = rows
            .iter()
            .filter_map(|r| r.get(col).copied().flatten())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            });
        for row in rows.iter_mut() {
            let Some(slot) = row.get_mut(col) else { continue };
            *slot = match (bounds, *slot) {
                (Some((lo, hi)), Some(v)) if hi > lo => Some((v - lo) / (hi - lo)),
                (Some((lo, hi)), None) if hi > lo => None,
                _ => Some(0.0),
            };
        }
    }
}
