use qeval_core::formats::write_trec;
use qeval_core::query::{ScoringContext, ScoringTree};
use qeval_core::{execute, parse_query, Bm25Params, Document, IndriParams, MemoryIndex, QueryError, RetrievalModel};

fn ranked(query: &str, index: &MemoryIndex, model: &RetrievalModel) -> Vec<(String, f64)> {
    let q = parse_query(query, model).unwrap();
    let mut results = execute(&q, index, model).unwrap();
    results.rank();
    results.iter().map(|r| (r.external_id.clone(), r.score)).collect()
}

#[test]
fn indri_and_scores_documents_missing_a_term() {
    let mut idx = MemoryIndex::new();
    idx.add(Document::new("A").field("body", "dog dog dog the the the the the the the"));
    idx.add(Document::new("B").field("body", "the bird the the the"));
    idx.add(Document::new("C").field("body", "cat fish"));
    let model = RetrievalModel::Indri(IndriParams { mu: 2500.0, lambda: 0.4 });

    let hits = ranked("#and(dog cat)", &idx, &model);
    let ids: Vec<_> = hits.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["C", "A"]);
    let a = hits[1].1;
    assert!((a - 0.101848598636).abs() < 1e-9);

    // B matches neither term, so it is never a candidate; its smoothed
    // score would still be below A's.
    let q = parse_query("#and(dog cat)", &model).unwrap();
    let ctx = ScoringContext::new(&idx, &model);
    let tree = ScoringTree::build(&q, &ctx).unwrap();
    let b = tree.default_score(&ctx, 1).unwrap();
    assert!(b > 0.0);
    assert!(a > b);
}

#[test]
fn bm25_ties_break_on_external_id() {
    let mut idx = MemoryIndex::new();
    idx.add(Document::new("zz").field("body", "dog"));
    idx.add(Document::new("aa").field("body", "dog"));
    idx.add(Document::new("mm").field("body", "dog dog cat"));
    for (i, text) in ["fish", "bird", "fish bird", "cow", "owl"].iter().enumerate() {
        idx.add(Document::new(format!("x{i}").as_str()).field("body", text));
    }
    let model = RetrievalModel::Bm25(Bm25Params::default());
    let hits = ranked("dog cat", &idx, &model);
    let ids: Vec<_> = hits.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["mm", "aa", "zz"]);
    assert_eq!(hits[1].1, hits[2].1);
    assert!(hits.iter().all(|(_, s)| *s > 0.0));
}

#[test]
fn boolean_models() {
    let mut idx = MemoryIndex::new();
    idx.add(Document::new("d0").field("body", "dog cat cat"));
    idx.add(Document::new("d1").field("body", "dog"));
    idx.add(Document::new("d2").field("body", "cat").field("title", "dog"));

    let unranked = RetrievalModel::UnrankedBoolean;
    assert_eq!(ranked("#and(dog cat)", &idx, &unranked), vec![("d0".to_string(), 1.0)]);
    assert_eq!(ranked("dog.title", &idx, &unranked), vec![("d2".to_string(), 1.0)]);

    let ranked_boolean = RetrievalModel::RankedBoolean;
    let hits = ranked("dog cat", &idx, &ranked_boolean);
    assert_eq!(hits[0], ("d0".to_string(), 2.0));
    assert_eq!(hits.len(), 3);
    let hits = ranked("#and(#near/1(dog cat) cat)", &idx, &ranked_boolean);
    assert_eq!(hits, vec![("d0".to_string(), 1.0)]);
}

#[test]
fn boolean_wand_behaves_as_and() {
    let mut idx = MemoryIndex::new();
    idx.add(Document::new("d0").field("body", "dog cat cat"));
    idx.add(Document::new("d1").field("body", "dog"));
    idx.add(Document::new("d2").field("body", "cat cat cat dog dog"));

    for model in [RetrievalModel::UnrankedBoolean, RetrievalModel::RankedBoolean] {
        let wand = ranked("#wand(2 dog 1 cat)", &idx, &model);
        let and = ranked("#and(dog cat)", &idx, &model);
        assert_eq!(wand, and);
    }
    let hits = ranked("#wand(2 dog 1 cat)", &idx, &RetrievalModel::RankedBoolean);
    assert_eq!(hits, vec![("d2".to_string(), 2.0), ("d0".to_string(), 1.0)]);
}

#[test]
fn errors_are_classified() {
    let idx = MemoryIndex::new();
    let bm25 = RetrievalModel::Bm25(Bm25Params::default());
    let err = parse_query("#and(dog", &bm25).unwrap_err();
    assert!(err.is_query_local());

    let q = parse_query("#and(dog cat)", &bm25).unwrap();
    let err = execute(&q, &idx, &bm25).unwrap_err();
    assert!(matches!(err, QueryError::Unsupported { model: "BM25", .. }));
    assert!(!err.is_query_local());
}

#[test]
fn repeated_runs_write_identical_reports() {
    let mut idx = MemoryIndex::new();
    idx.add(Document::new("b").field("body", "dog cat"));
    idx.add(Document::new("a").field("body", "dog cat"));
    idx.add(Document::new("c").field("body", "dog dog fish").field("title", "cat"));
    idx.add(Document::new("d").field("body", "bird"));

    let models = [
        RetrievalModel::RankedBoolean,
        RetrievalModel::Bm25(Bm25Params::default()),
        RetrievalModel::Indri(IndriParams::default()),
    ];
    for model in models {
        let report = || {
            let q = parse_query("dog cat.title #near/1(dog cat)", &model).unwrap();
            let mut results = execute(&q, &idx, &model).unwrap();
            results.rank();
            let mut buf = Vec::new();
            write_trec(&mut buf, "11", &results).unwrap();
            buf
        };
        let first = report();
        assert!(!first.is_empty());
        assert_eq!(first, report());
    }
}

#[test]
fn report_is_at_most_one_hundred_lines() {
    let mut idx = MemoryIndex::new();
    for i in 0..130 {
        let text = if i % 2 == 0 { "dog cat" } else { "dog" };
        idx.add(Document::new(format!("doc{i:03}").as_str()).field("body", text));
    }
    let model = RetrievalModel::Indri(IndriParams::default());
    let q = parse_query("dog cat", &model).unwrap();
    let mut results = execute(&q, &idx, &model).unwrap();
    assert_eq!(results.len(), 130);
    results.rank();

    let mut buf = Vec::new();
    write_trec(&mut buf, "3", &results).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 100);
    assert!(lines[0].starts_with("3 Q0 doc000 1 "));
    assert!(lines[1].starts_with("3 Q0 doc002 2 "));
    assert!(lines.iter().all(|l| l.ends_with(" fubar")));
}
