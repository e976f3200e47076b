//! Integration tests for the classification pipeline.
//!
//! These exercise tree flattening, embedding-cache construction, masked
//! vector search, and the constraint/fallback policy end to end using
//! deterministic stub Embedder and Reranker implementations; no live
//! model is required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use remark_classify::classify::{ClassifyError, DefectClassifier, PathClassifier};
use remark_classify::config::Config;
use remark_classify::llm::{Embedder, Reranker};
use remark_classify::state::AppState;
use remark_classify::taxonomy::TaxonomyIndex;

/// Embedder stub: the first rule whose keyword occurs in the text wins,
/// otherwise the fallback vector is used. Counts batch calls so tests can
/// assert the embedder was (not) reached.
struct KeywordEmbedder {
    rules: Vec<(&'static str, Vec<f32>)>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new(rules: Vec<(&'static str, Vec<f32>)>, fallback: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            rules,
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                self.rules
                    .iter()
                    .find(|(keyword, _)| t.contains(keyword))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

/// Reranker stub that always answers the same string.
struct FixedReranker(&'static str);

#[async_trait]
impl Reranker for FixedReranker {
    async fn pick_best(&self, _system: &str, _query: &str, _candidates: &[String]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Reranker stub that echoes the top-ranked candidate.
struct TopCandidateReranker;

#[async_trait]
impl Reranker for TopCandidateReranker {
    async fn pick_best(&self, _system: &str, _query: &str, candidates: &[String]) -> Result<String> {
        Ok(candidates.first().cloned().unwrap_or_default())
    }
}

/// Reranker stub that fails every call.
struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn pick_best(&self, _system: &str, _query: &str, _candidates: &[String]) -> Result<String> {
        anyhow::bail!("reranker offline")
    }
}

fn car_tree() -> serde_json::Value {
    json!({
        "Car": {
            "Interior": { "__defects__": ["Stain"] },
            "Exterior": { "__defects__": ["Dent", "Scratch"] }
        }
    })
}

/// Embedder whose axes are: Exterior-ish, Interior-ish, other.
fn car_embedder() -> Arc<KeywordEmbedder> {
    KeywordEmbedder::new(
        vec![
            ("scratch", vec![1.0, 0.0, 0.0]),
            ("Exterior", vec![1.0, 0.0, 0.0]),
            ("Interior", vec![0.0, 1.0, 0.0]),
        ],
        vec![0.0, 0.0, 1.0],
    )
}

async fn load_path_classifier(
    tree: &serde_json::Value,
    dir: &std::path::Path,
    embedder: Arc<KeywordEmbedder>,
    reranker: Arc<dyn Reranker>,
) -> PathClassifier {
    let taxonomy = Arc::new(TaxonomyIndex::from_value(tree));
    PathClassifier::load(
        taxonomy,
        &dir.join("tree_cache.json"),
        embedder,
        reranker,
        3,
    )
    .await
    .unwrap()
}

// ─── Path classification ─────────────────────────────────

#[tokio::test]
async fn test_unconstrained_classification_picks_best_path() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = load_path_classifier(
        &car_tree(),
        dir.path(),
        car_embedder(),
        Arc::new(TopCandidateReranker),
    )
    .await;

    let result = classifier.classify("deep scratch on the door", 20).await;
    assert_eq!(result.unwrap(), "Car > Exterior");
}

#[tokio::test]
async fn test_unconstrained_fails_when_no_paths_carry_defects() {
    let dir = tempfile::tempdir().unwrap();
    let tree = json!({ "Car": { "Interior": {}, "Exterior": {} } });
    let classifier = load_path_classifier(
        &tree,
        dir.path(),
        car_embedder(),
        Arc::new(TopCandidateReranker),
    )
    .await;

    let result = classifier.classify("scratch", 20).await;
    assert!(matches!(result, Err(ClassifyError::NoDefectPaths)));
}

#[tokio::test]
async fn test_empty_taxonomy_reports_no_index() {
    let dir = tempfile::tempdir().unwrap();
    let taxonomy = Arc::new(TaxonomyIndex::empty());
    let embedder = car_embedder();
    let classifier = PathClassifier::load(
        taxonomy,
        &dir.path().join("tree_cache.json"),
        embedder.clone(),
        Arc::new(TopCandidateReranker),
        3,
    )
    .await
    .unwrap();

    let result = classifier.classify("scratch", 20).await;
    assert!(matches!(result, Err(ClassifyError::NoIndex)));
    // Nothing was embedded: no labels to cache, no query issued.
    assert_eq!(embedder.call_count(), 0);
}

#[tokio::test]
async fn test_constrained_falls_back_to_constraint_on_none() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = load_path_classifier(
        &car_tree(),
        dir.path(),
        car_embedder(),
        Arc::new(FixedReranker("NONE")),
    )
    .await;

    // "Car > Exterior" itself carries defects, so the failed restricted
    // search settles on the constraint instead of failing.
    let allowed = vec!["Car > Exterior".to_string()];
    let result = classifier
        .classify_restricted("something unintelligible", &allowed, 20)
        .await;
    assert_eq!(result.unwrap(), "Car > Exterior");
}

#[tokio::test]
async fn test_constrained_ancestor_pick_is_forced_to_constraint() {
    let dir = tempfile::tempdir().unwrap();
    let tree = json!({
        "Car": {
            "__defects__": ["Rust"],
            "Exterior": {
                "__defects__": ["Dent"],
                "Door": { "__defects__": ["Ding"] }
            }
        }
    });
    // The reranker names "Car" - a real path, but a strict ancestor of the
    // constraint and therefore too shallow.
    let classifier =
        load_path_classifier(&tree, dir.path(), car_embedder(), Arc::new(FixedReranker("Car")))
            .await;

    let allowed = vec![
        "Car > Exterior".to_string(),
        "Car > Exterior > Door".to_string(),
    ];
    let result = classifier.classify_restricted("dented door", &allowed, 20).await;
    assert_eq!(result.unwrap(), "Car > Exterior");
}

#[tokio::test]
async fn test_constrained_ancestor_pick_fails_without_constraint_defects() {
    let dir = tempfile::tempdir().unwrap();
    let tree = json!({
        "Car": {
            "Exterior": {
                "Door": { "__defects__": ["Ding"] }
            }
        }
    });
    let classifier =
        load_path_classifier(&tree, dir.path(), car_embedder(), Arc::new(FixedReranker("Car")))
            .await;

    // "Car > Exterior" has no defects, so there is nothing to force the
    // too-shallow result onto.
    let allowed = vec![
        "Car > Exterior".to_string(),
        "Car > Exterior > Door".to_string(),
    ];
    let result = classifier.classify_restricted("dented door", &allowed, 20).await;
    assert!(matches!(result, Err(ClassifyError::ConstraintViolation)));
}

#[tokio::test]
async fn test_constrained_result_never_escapes_allowed_set() {
    let dir = tempfile::tempdir().unwrap();
    // The reranker names a sibling outside the constraint subtree.
    let classifier = load_path_classifier(
        &car_tree(),
        dir.path(),
        car_embedder(),
        Arc::new(FixedReranker("Car > Interior")),
    )
    .await;

    let allowed = vec!["Car > Exterior".to_string()];
    let result = classifier
        .classify_restricted("stained seat", &allowed, 20)
        .await;
    assert_eq!(result.unwrap(), "Car > Exterior");
}

#[tokio::test]
async fn test_constrained_no_fit_propagates_without_constraint_defects() {
    let dir = tempfile::tempdir().unwrap();
    let tree = json!({
        "Car": {
            "Exterior": {
                "Door": { "__defects__": ["Ding"] }
            }
        }
    });
    let classifier =
        load_path_classifier(&tree, dir.path(), car_embedder(), Arc::new(FixedReranker("NONE")))
            .await;

    let allowed = vec![
        "Car > Exterior".to_string(),
        "Car > Exterior > Door".to_string(),
    ];
    let result = classifier.classify_restricted("unrelated spam", &allowed, 20).await;
    assert!(matches!(result, Err(ClassifyError::NoFit)));
}

#[tokio::test]
async fn test_constrained_fails_when_no_allowed_path_has_defects() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = load_path_classifier(
        &car_tree(),
        dir.path(),
        car_embedder(),
        Arc::new(TopCandidateReranker),
    )
    .await;

    // "Car" exists but carries no defect list, and nothing below it is
    // allowed.
    let allowed = vec!["Car".to_string()];
    let result = classifier.classify_restricted("scratch", &allowed, 20).await;
    assert!(matches!(result, Err(ClassifyError::NoAllowedDefectPaths)));
}

// ─── Defect prediction ───────────────────────────────────

fn defect_embedder() -> Arc<KeywordEmbedder> {
    KeywordEmbedder::new(
        vec![
            ("Dent", vec![1.0, 0.0, 0.0]),
            ("Scratch", vec![0.0, 1.0, 0.0]),
            ("Stain", vec![0.0, 0.0, 1.0]),
        ],
        // Queries without a keyword lean toward the Scratch axis.
        vec![0.0, 1.0, 0.0],
    )
}

async fn load_defect_classifier(
    dir: &std::path::Path,
    embedder: Arc<KeywordEmbedder>,
    reranker: Arc<dyn Reranker>,
) -> DefectClassifier {
    DefectClassifier::load(
        vec!["Dent".to_string(), "Scratch".to_string(), "Stain".to_string()],
        &dir.join("defect_cache.json"),
        embedder,
        reranker,
        3,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_empty_allowed_defects_makes_no_embedder_call() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = defect_embedder();
    let classifier =
        load_defect_classifier(dir.path(), embedder.clone(), Arc::new(TopCandidateReranker)).await;

    let calls_after_startup = embedder.call_count();
    let result = classifier.predict("scraped bumper", &[], 20).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(embedder.call_count(), calls_after_startup);
}

#[tokio::test]
async fn test_defect_winner_moved_to_front_with_score_floor() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = load_defect_classifier(
        dir.path(),
        defect_embedder(),
        Arc::new(FixedReranker("Stain")),
    )
    .await;

    let allowed = vec!["Dent".to_string(), "Scratch".to_string(), "Stain".to_string()];
    let result = classifier.predict("paint damage", &allowed, 20).await.unwrap();

    // Vector search ranked Scratch first, but the reranker's winner leads
    // the list with the display floor applied.
    assert_eq!(result[0].label, "Stain");
    assert!((result[0].score - 0.99).abs() < 1e-6);
    assert_eq!(result[1].label, "Scratch");
}

#[tokio::test]
async fn test_defect_rerank_failure_keeps_vector_order() {
    let dir = tempfile::tempdir().unwrap();
    let classifier =
        load_defect_classifier(dir.path(), defect_embedder(), Arc::new(FailingReranker)).await;

    let allowed = vec!["Dent".to_string(), "Scratch".to_string(), "Stain".to_string()];
    let result = classifier.predict("paint damage", &allowed, 20).await.unwrap();

    let labels: Vec<&str> = result.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, ["Scratch", "Dent", "Stain"]);
    // No display floor was applied; the top score is the raw cosine.
    assert!((result[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_defect_unknown_labels_silently_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = defect_embedder();
    let classifier =
        load_defect_classifier(dir.path(), embedder.clone(), Arc::new(TopCandidateReranker)).await;

    let calls_after_startup = embedder.call_count();
    let allowed = vec!["Phantom Defect".to_string()];
    let result = classifier.predict("anything", &allowed, 20).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(embedder.call_count(), calls_after_startup);
}

#[tokio::test]
async fn test_defect_results_capped_at_ten() {
    let dir = tempfile::tempdir().unwrap();
    let labels: Vec<String> = (0..15).map(|i| format!("Defect {i:02}")).collect();
    let embedder = KeywordEmbedder::new(Vec::new(), vec![1.0, 0.0]);
    let classifier = DefectClassifier::load(
        labels.clone(),
        &dir.path().join("defect_cache.json"),
        embedder,
        Arc::new(FixedReranker("NONE")),
        2,
    )
    .await
    .unwrap();

    let result = classifier.predict("anything", &labels, 50).await.unwrap();
    assert_eq!(result.len(), 10);
}

// ─── Startup degradation ─────────────────────────────────

#[tokio::test]
async fn test_app_state_starts_with_missing_tree() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    config.tree_path = dir.path().join("no_such_tree.json");

    // No tree means no labels to embed, so startup stays offline.
    let state = AppState::new(config).await.unwrap();
    let result = state.path_classifier.classify("scratch", 20).await;
    assert!(matches!(result, Err(ClassifyError::NoIndex)));
}
