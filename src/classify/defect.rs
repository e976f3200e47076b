//! Defect-type prediction over the master defect index, masked to the
//! labels valid for the resolved taxonomy path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::classify::{interpret_choice, ClassifyError};
use crate::index::cache;
use crate::index::embedding::{l2_normalize, EmbeddingIndex};
use crate::llm::{Embedder, Reranker};
use crate::models::DefectCandidate;

/// Hard cap on returned candidates, regardless of the requested top-k.
pub const MAX_CANDIDATES: usize = 10;

/// Display floor applied to the reranker's winner. Cosmetic: the UI shows
/// the winner as a confident match; the value never feeds back into
/// ranking.
pub const WINNER_SCORE_FLOOR: f32 = 0.99;

const RERANK_SYSTEM_PROMPT: &str = "You are a vehicle QA expert. Pick the SINGLE best defect \
category from the list. If the remark is vague, pick the most likely one based on automotive \
context. Return ONLY the category name.";

/// Predicts defect types for a remark, restricted per request to the
/// defects valid under the resolved path.
pub struct DefectClassifier {
    label_to_index: HashMap<String, usize>,
    index: EmbeddingIndex,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
}

impl DefectClassifier {
    /// Build the master index over the union of all defect labels seen in
    /// the tree. Labels are sorted and deduplicated so the matrix row
    /// order is stable across runs.
    pub async fn load(
        all_defects: Vec<String>,
        cache_path: &Path,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        embedding_dim: usize,
    ) -> anyhow::Result<Self> {
        let mut labels = all_defects;
        labels.sort();
        labels.dedup();

        tracing::info!("Defect classifier: {} unique defect types.", labels.len());

        let label_to_index: HashMap<String, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();

        let index = if labels.is_empty() {
            EmbeddingIndex::empty()
        } else {
            let matrix =
                cache::load_or_build(&labels, cache_path, embedder.as_ref(), embedding_dim).await?;
            EmbeddingIndex::new(labels, matrix)
        };

        Ok(Self {
            label_to_index,
            index,
            embedder,
            reranker,
        })
    }

    /// Predict defect candidates for `remark` among `allowed_defects`.
    ///
    /// An empty `allowed_defects` short-circuits to an empty result without
    /// touching the embedder. Labels missing from the master map are
    /// silently dropped. A rerank failure or no-fit keeps the vector-ranked
    /// order instead of failing the prediction.
    pub async fn predict(
        &self,
        remark: &str,
        allowed_defects: &[String],
        top_k: usize,
    ) -> Result<Vec<DefectCandidate>, ClassifyError> {
        if allowed_defects.is_empty() {
            return Ok(Vec::new());
        }
        if self.index.is_empty() {
            return Err(ClassifyError::NoIndex);
        }

        let valid: Vec<usize> = allowed_defects
            .iter()
            .filter_map(|d| self.label_to_index.get(d).copied())
            .collect();

        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = self
            .embedder
            .embed_one(remark)
            .await
            .map_err(ClassifyError::Embed)?;
        l2_normalize(&mut query);

        let hits = self.index.search(&query, &valid, top_k);
        let mut candidates: Vec<DefectCandidate> = hits
            .iter()
            .map(|(i, score)| DefectCandidate {
                label: self.index.label(*i).to_string(),
                score: *score,
            })
            .collect();

        if candidates.is_empty() {
            return Ok(candidates);
        }

        let labels: Vec<String> = candidates.iter().map(|c| c.label.clone()).collect();
        match self.reranker.pick_best(RERANK_SYSTEM_PROMPT, remark, &labels).await {
            Ok(choice) => {
                if let Some(winner) = interpret_choice(&choice, &labels) {
                    if let Some(pos) = candidates.iter().position(|c| c.label == winner) {
                        let mut best = candidates.remove(pos);
                        best.score = best.score.max(WINNER_SCORE_FLOOR);
                        candidates.insert(0, best);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Defect rerank failed: {e}. Keeping vector order.");
            }
        }

        candidates.truncate(MAX_CANDIDATES);
        Ok(candidates)
    }
}
