use std::path::Path;

use anyhow::{Context, Result};

use crate::index::embedding::l2_normalize;
use crate::llm::Embedder;

/// Number of labels sent to the embedder per request during a build.
pub const EMBED_BATCH_SIZE: usize = 100;

/// Load the cached embedding matrix for `labels`, or build and persist it.
///
/// The cache is considered fresh iff its row count equals `labels.len()`;
/// the contents are not verified. On any mismatch or read error the matrix
/// is rebuilt and the file overwritten atomically (tmp file + rename).
///
/// A failed embedder batch does not abort the build: the affected rows are
/// zero-filled (`dim` columns) so a partial outage degrades ranking quality
/// for those labels instead of preventing startup.
pub async fn load_or_build(
    labels: &[String],
    cache_path: &Path,
    embedder: &dyn Embedder,
    dim: usize,
) -> Result<Vec<Vec<f32>>> {
    if cache_path.exists() {
        match read_matrix(cache_path) {
            Ok(matrix) if matrix.len() == labels.len() => {
                tracing::info!(
                    "Loaded {} cached embeddings from {}",
                    matrix.len(),
                    cache_path.display()
                );
                return Ok(matrix);
            }
            Ok(matrix) => {
                tracing::info!(
                    "Embedding cache {} holds {} rows but {} labels exist. Rebuilding...",
                    cache_path.display(),
                    matrix.len(),
                    labels.len()
                );
            }
            Err(e) => {
                tracing::warn!("Embedding cache {} unreadable: {e}. Rebuilding...", cache_path.display());
            }
        }
    }

    tracing::info!("Embedding {} labels (one-time operation)...", labels.len());
    let mut matrix = Vec::with_capacity(labels.len());

    for batch in labels.chunks(EMBED_BATCH_SIZE) {
        match embedder.embed_batch(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => matrix.extend(vectors),
            Ok(vectors) => {
                tracing::warn!(
                    "Embedder returned {} vectors for a batch of {}. Zero-filling batch.",
                    vectors.len(),
                    batch.len()
                );
                matrix.extend(std::iter::repeat_with(|| vec![0.0; dim]).take(batch.len()));
            }
            Err(e) => {
                tracing::warn!("Embedder batch failed: {e}. Zero-filling {} rows.", batch.len());
                matrix.extend(std::iter::repeat_with(|| vec![0.0; dim]).take(batch.len()));
            }
        }
    }

    for row in matrix.iter_mut() {
        l2_normalize(row);
    }

    write_matrix(cache_path, &matrix)?;
    Ok(matrix)
}

fn read_matrix(path: &Path) -> Result<Vec<Vec<f32>>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read embedding cache {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse embedding cache {}", path.display()))
}

/// Write to a sibling tmp file, then rename over the target, so a crash
/// mid-write never leaves a half-written cache behind.
fn write_matrix(path: &Path, matrix: &[Vec<f32>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string(matrix).context("Failed to serialize embedding matrix")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("Failed to write embedding cache {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace embedding cache {}", path.display()))?;
    Ok(())
}
