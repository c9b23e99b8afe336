use docqa_core::config::{FusionKind, RetrievalConfig};
use docqa_core::traits::FusionStrategy;
use docqa_core::types::{Chunk, FusedResult, RetrievalMethod, RetrievalResult};
use docqa_hybrid::{build_fusion, ReciprocalRankFusion, WeightedFusion};

fn result(id: &str, score: f32, method: RetrievalMethod) -> RetrievalResult {
    RetrievalResult {
        chunk: Chunk {
            id: id.to_string(),
            doc_id: "doc".to_string(),
            source: "doc.pdf".to_string(),
            ordinal: 0,
            text: format!("text of {id}"),
            page: 1,
            page_end: 1,
            start: 0,
            end: 10,
        },
        score,
        method,
    }
}

fn lex(items: &[(&str, f32)]) -> Vec<RetrievalResult> {
    items.iter().map(|(id, s)| result(id, *s, RetrievalMethod::Lexical)).collect()
}

fn vecs(items: &[(&str, f32)]) -> Vec<RetrievalResult> {
    items.iter().map(|(id, s)| result(id, *s, RetrievalMethod::Vector)).collect()
}

fn ids(fused: &[FusedResult]) -> Vec<&str> {
    fused.iter().map(|f| f.chunk.id.as_str()).collect()
}

fn assert_well_formed(fused: &[FusedResult]) {
    for (i, f) in fused.iter().enumerate() {
        assert_eq!(f.rank, i + 1, "ranks are 1..k");
        assert!((0.0..=1.0).contains(&f.score), "score {} out of range", f.score);
    }
    assert!(fused.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn alpha_extremes_reproduce_single_rankings() {
    let lexical = lex(&[("a", 9.0), ("b", 5.0), ("c", 1.0)]);
    let vector = vecs(&[("c", 0.9), ("a", 0.5), ("b", 0.2)]);

    let vector_only = WeightedFusion::new(1.0).unwrap().fuse(&lexical, &vector, 3);
    assert_eq!(ids(&vector_only), vec!["c", "a", "b"]);
    assert_well_formed(&vector_only);

    let lexical_only = WeightedFusion::new(0.0).unwrap().fuse(&lexical, &vector, 3);
    assert_eq!(ids(&lexical_only), vec!["a", "b", "c"]);
    assert_well_formed(&lexical_only);
}

#[test]
fn weighted_fusion_normalizes_and_truncates() {
    let lexical = lex(&[("a", 12.0), ("b", 3.0)]);
    let vector = vecs(&[("b", 0.8), ("c", 0.6), ("d", 0.1)]);
    let fused = WeightedFusion::new(0.5).unwrap().fuse(&lexical, &vector, 3);
    assert_well_formed(&fused);
    assert_eq!(fused.len(), 3);
    // b: 0.5*1 + 0.5*0 ; a: 0.5*0 + 0.5*1 ; tie broken by id
    assert_eq!(ids(&fused)[..2], ["a", "b"]);
    assert!((fused[0].score - 0.5).abs() < 1e-6);
    assert!((fused[1].score - 0.5).abs() < 1e-6);
    assert_eq!(fused[2].chunk.id, "c");
}

#[test]
fn single_element_lists_normalize_to_one() {
    let fusion = WeightedFusion::new(0.75).unwrap();
    let fused = fusion.fuse(&lex(&[("x", 0.3)]), &vecs(&[("x", 0.01)]), 5);
    assert_eq!(fused.len(), 1);
    assert!((fused[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn empty_list_falls_back_to_the_other() {
    let vector = vecs(&[("b", 0.9), ("a", 0.4), ("c", 0.4)]);
    let fused = WeightedFusion::new(0.25).unwrap().fuse(&[], &vector, 10);
    assert_eq!(ids(&fused), vec!["b", "a", "c"]);
    assert!((fused[0].score - 1.0).abs() < 1e-6);

    let lexical = lex(&[("z", 2.0), ("y", 1.0)]);
    let fused = WeightedFusion::new(0.9).unwrap().fuse(&lexical, &[], 10);
    assert_eq!(ids(&fused), vec!["z", "y"]);

    assert!(WeightedFusion::new(0.5).unwrap().fuse(&[], &[], 4).is_empty());
}

#[test]
fn equal_fused_scores_break_on_lower_id() {
    let lexical = lex(&[("m", 1.0), ("k", 1.0)]);
    let vector = vecs(&[("k", 0.5), ("m", 0.5)]);
    let fused = WeightedFusion::new(0.5).unwrap().fuse(&lexical, &vector, 2);
    assert_eq!(ids(&fused), vec!["k", "m"]);
}

#[test]
fn rrf_scores_rank_agreement_highest() {
    let lexical = lex(&[("a", 9.0), ("b", 5.0), ("c", 1.0)]);
    let vector = vecs(&[("b", 0.9), ("a", 0.8), ("d", 0.7)]);
    let rrf = ReciprocalRankFusion::new(60.0).unwrap();
    assert_eq!(rrf.name(), "rrf");
    let fused = rrf.fuse(&lexical, &vector, 4);
    assert_well_formed(&fused);
    // a and b both appear at ranks 1 and 2; tie broken by id
    assert_eq!(ids(&fused), vec!["a", "b", "c", "d"]);
    assert!((fused[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn fusion_is_built_from_config() {
    let mut cfg = RetrievalConfig::default();
    assert_eq!(build_fusion(&cfg).unwrap().name(), "weighted");
    cfg.fusion = FusionKind::Rrf;
    assert_eq!(build_fusion(&cfg).unwrap().name(), "rrf");
    cfg.fusion = FusionKind::Weighted;
    cfg.alpha = -0.1;
    assert!(build_fusion(&cfg).is_err());
    assert!(ReciprocalRankFusion::new(0.0).is_err());
}
