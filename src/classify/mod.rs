//! Classification orchestration: path search with constraint resolution,
//! and defect prediction over the labels valid for a resolved path.

pub mod defect;
pub mod path;

use thiserror::Error;

use crate::llm::RERANK_NONE;

pub use defect::DefectClassifier;
pub use path::PathClassifier;

/// Why a classification did not resolve. All variants are normal no-match
/// outcomes at the HTTP boundary (empty path, empty defects), never a 5xx.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no embedding index available")]
    NoIndex,

    #[error("no taxonomy paths carry defects")]
    NoDefectPaths,

    #[error("none of the allowed paths carry defects")]
    NoAllowedDefectPaths,

    #[error("embedding request failed: {0}")]
    Embed(anyhow::Error),

    #[error("rerank request failed: {0}")]
    Rerank(anyhow::Error),

    #[error("vector search produced no candidates")]
    Unclassified,

    #[error("reranked result violated the constraint path")]
    ConstraintViolation,

    #[error("no candidate fits the remark")]
    NoFit,
}

/// Match the reranker's raw choice against the candidate list: exact match
/// first, then case-insensitive. `None` means the model declined with the
/// NONE sentinel, or violated the protocol by answering something that is
/// not a candidate at all.
fn interpret_choice(choice: &str, candidates: &[String]) -> Option<String> {
    if choice == RERANK_NONE {
        return None;
    }
    if let Some(exact) = candidates.iter().find(|c| c.as_str() == choice) {
        return Some(exact.clone());
    }
    let lowered = choice.to_lowercase();
    if let Some(close) = candidates.iter().find(|c| c.to_lowercase() == lowered) {
        return Some(close.clone());
    }
    tracing::warn!("Reranker answered '{choice}', which is not a candidate. Treating as no fit.");
    None
}
