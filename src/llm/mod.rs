//! External model collaborators.
//!
//! Two opaque services back the classification pipeline: an embedder
//! (text -> fixed-length vector) and a reranker (query + candidate labels
//! -> best label or "NONE"). Both are reached over HTTP in production;
//! tests substitute deterministic stubs through the traits below.

pub mod embeddings;
pub mod rerank;

use anyhow::{Context, Result};
use async_trait::async_trait;

pub use embeddings::HttpEmbedder;
pub use rerank::HttpReranker;

/// Sentinel the reranker returns when no candidate fits the query.
pub const RERANK_NONE: &str = "NONE";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, same order. Errors are
    /// recoverable per batch; callers decide whether to degrade or fail.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.into_iter().next().context("No embedding returned")
    }
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Ask the model to pick the single best candidate for `query`, under
    /// the given system instructions. Returns the model's raw choice text
    /// (ideally an exact candidate or [`RERANK_NONE`]); callers match it
    /// against the candidate list defensively.
    async fn pick_best(&self, system: &str, query: &str, candidates: &[String]) -> Result<String>;
}
