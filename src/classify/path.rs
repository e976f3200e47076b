//! Tree-path classification: embed the remark, search the defect-bearing
//! paths, let the reranker pick, and enforce the caller's constraint.

use std::path::Path;
use std::sync::Arc;

use crate::classify::ClassifyError;
use crate::index::cache;
use crate::index::embedding::{l2_normalize, EmbeddingIndex};
use crate::llm::{Embedder, Reranker, RERANK_NONE};
use crate::taxonomy::{TaxonomyIndex, PATH_SEPARATOR};

/// Appended to the remark before embedding. Inspectors write "driver side"
/// and "d/s" interchangeably while the taxonomy says Left/Right; spelling
/// out the mapping pulls the query vector toward the correct side without
/// rewriting the remark itself. The reranker sees the original remark only.
const QUERY_CONTEXT_HINT: &str = "(Context: Driver Side or d/s is Left, Passenger Side is Right)";

const RERANK_SYSTEM_PROMPT: &str = "You are a strict classification assistant. \
Your goal: map the Remark to the most accurate category from the Candidates list below.\n\
Rules:\n\
1. You must strictly choose one of the provided candidates.\n\
2. Do NOT output a parent path or a path not listed in the Candidates.\n\
3. Only reply 'NONE' if the remark is completely unrelated (e.g., spam, wrong language).\n\
4. Output EXACTLY the category path string, nothing else.";

/// Classifies remarks against the taxonomy paths that carry defects.
pub struct PathClassifier {
    taxonomy: Arc<TaxonomyIndex>,
    index: EmbeddingIndex,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
}

impl PathClassifier {
    /// Build the classifier, loading or building the path embedding matrix.
    /// An empty taxonomy yields an empty index; every classification then
    /// reports [`ClassifyError::NoIndex`].
    pub async fn load(
        taxonomy: Arc<TaxonomyIndex>,
        cache_path: &Path,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        embedding_dim: usize,
    ) -> anyhow::Result<Self> {
        let index = if taxonomy.is_empty() {
            EmbeddingIndex::empty()
        } else {
            let labels = taxonomy.paths().to_vec();
            let matrix =
                cache::load_or_build(&labels, cache_path, embedder.as_ref(), embedding_dim).await?;
            EmbeddingIndex::new(labels, matrix)
        };
        Ok(Self {
            taxonomy,
            index,
            embedder,
            reranker,
        })
    }

    pub fn taxonomy(&self) -> &TaxonomyIndex {
        &self.taxonomy
    }

    /// Classify against every path with a non-empty defect list.
    pub async fn classify(&self, remark: &str, top_k: usize) -> Result<String, ClassifyError> {
        if self.index.is_empty() {
            return Err(ClassifyError::NoIndex);
        }

        let valid: Vec<usize> = self
            .taxonomy
            .paths()
            .iter()
            .enumerate()
            .filter(|(_, p)| self.taxonomy.has_defects(p))
            .map(|(i, _)| i)
            .collect();

        if valid.is_empty() {
            return Err(ClassifyError::NoDefectPaths);
        }

        self.run_search(remark, &valid, top_k).await
    }

    /// Classify against a caller-restricted path set ("re-evaluate with a
    /// narrower scope"). `allowed_paths` is the caller's prefix filter over
    /// all known paths; the true constraint path is re-derived from it so a
    /// nominal constraint string that does not exactly match tree structure
    /// still restricts correctly.
    ///
    /// The final result is always inside the allowed set or equal to the
    /// constraint path itself; anything the reranker picks outside that set
    /// is resolved by the fallback policy below.
    pub async fn classify_restricted(
        &self,
        remark: &str,
        allowed_paths: &[String],
        top_k: usize,
    ) -> Result<String, ClassifyError> {
        if self.index.is_empty() {
            return Err(ClassifyError::NoIndex);
        }

        let constraint = derive_constraint_path(allowed_paths);
        let ancestors = ancestor_prefixes(&constraint);

        let mut allowed = allowed_paths.to_vec();
        // The search may legitimately terminate at the constraint level
        // itself, but only if that node is a valid defect place.
        if !constraint.is_empty()
            && !allowed.contains(&constraint)
            && self.taxonomy.has_defects(&constraint)
        {
            allowed.push(constraint.clone());
        }

        // Master row indices for the allowed, defect-bearing paths, in
        // allowed order. Paths are sorted, so lookup is a binary search.
        let paths = self.taxonomy.paths();
        let mut valid = Vec::new();
        let mut valid_labels = Vec::new();
        for p in &allowed {
            if !self.taxonomy.has_defects(p) {
                continue;
            }
            if let Ok(row) = paths.binary_search_by(|row| row.as_str().cmp(p)) {
                valid.push(row);
                valid_labels.push(p.clone());
            }
        }

        if valid.is_empty() {
            tracing::info!("Restricted search: no allowed paths carry defects.");
            return Err(ClassifyError::NoAllowedDefectPaths);
        }

        match self.run_search(remark, &valid, top_k).await {
            Ok(path) if !valid_labels.contains(&path) => {
                // The reranker escaped the allowed set. The common case is
                // an ancestor of the constraint: the model defaulted to a
                // parent the caller has already ruled out as too shallow.
                if ancestors.contains(&path) {
                    tracing::warn!(
                        "Reranker picked ancestor '{path}'. Forcing result to '{constraint}'"
                    );
                } else {
                    tracing::warn!(
                        "Reranker picked '{path}' outside the allowed set. \
                         Forcing result to '{constraint}'"
                    );
                }
                if self.taxonomy.has_defects(&constraint) {
                    Ok(constraint)
                } else {
                    Err(ClassifyError::ConstraintViolation)
                }
            }
            Err(ClassifyError::NoFit) => {
                if self.taxonomy.has_defects(&constraint) {
                    tracing::info!(
                        "Restricted classification found no fit. Falling back to '{constraint}'"
                    );
                    Ok(constraint)
                } else {
                    Err(ClassifyError::NoFit)
                }
            }
            other => other,
        }
    }

    /// Embed -> masked search -> rerank, shared by both entry points.
    async fn run_search(
        &self,
        remark: &str,
        allowed: &[usize],
        top_k: usize,
    ) -> Result<String, ClassifyError> {
        if self.index.is_empty() {
            return Err(ClassifyError::NoIndex);
        }

        let augmented = format!("{remark} {QUERY_CONTEXT_HINT}");
        let mut query = self
            .embedder
            .embed_one(&augmented)
            .await
            .map_err(ClassifyError::Embed)?;
        l2_normalize(&mut query);

        let hits = self.index.search(&query, allowed, top_k);
        if hits.is_empty() {
            return Err(ClassifyError::Unclassified);
        }

        let candidates: Vec<String> = hits
            .iter()
            .map(|(i, _)| self.index.label(*i).to_string())
            .collect();

        let choice = self
            .reranker
            .pick_best(RERANK_SYSTEM_PROMPT, remark, &candidates)
            .await
            .map_err(ClassifyError::Rerank)?;

        self.interpret_choice(&choice, &candidates)
            .ok_or(ClassifyError::NoFit)
    }

    /// Accept the reranker's answer if it names any known path exactly, or
    /// one of the candidates up to case. The constrained flow re-checks
    /// containment afterwards, which is how too-shallow ancestor picks are
    /// caught rather than silently returned.
    fn interpret_choice(&self, choice: &str, candidates: &[String]) -> Option<String> {
        if choice == RERANK_NONE {
            return None;
        }
        let paths = self.taxonomy.paths();
        if paths.binary_search_by(|p| p.as_str().cmp(choice)).is_ok() {
            return Some(choice.to_string());
        }
        let lowered = choice.to_lowercase();
        if let Some(close) = candidates.iter().find(|c| c.to_lowercase() == lowered) {
            return Some(close.clone());
        }
        tracing::warn!("Reranker answered '{choice}', which is not a known path. Treating as no fit.");
        None
    }
}

/// Longest prefix (in whole segments) of the first allowed path that
/// string-prefixes every allowed path. Empty if the set shares no prefix.
fn derive_constraint_path(allowed_paths: &[String]) -> String {
    let Some(first) = allowed_paths.first() else {
        return String::new();
    };
    let segments: Vec<&str> = first.split(PATH_SEPARATOR).collect();
    for take in (1..=segments.len()).rev() {
        let prefix = segments[..take].join(PATH_SEPARATOR);
        if allowed_paths.iter().all(|p| p.starts_with(&prefix)) {
            return prefix;
        }
    }
    String::new()
}

/// All strict proper prefixes of `path`, shallowest first. Each is a "too
/// shallow" result the constrained search must reject.
fn ancestor_prefixes(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    (1..segments.len())
        .map(|take| segments[..take].join(PATH_SEPARATOR))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_constraint_from_single_path() {
        assert_eq!(
            derive_constraint_path(&paths(&["Car > Exterior"])),
            "Car > Exterior"
        );
    }

    #[test]
    fn test_constraint_is_common_ancestor() {
        let allowed = paths(&[
            "Car > Exterior > Door",
            "Car > Exterior > Hood",
            "Car > Exterior",
        ]);
        assert_eq!(derive_constraint_path(&allowed), "Car > Exterior");
    }

    #[test]
    fn test_constraint_trims_first_path_suffix() {
        // The deepest allowed path comes first; the shared ancestor is
        // found by trimming its trailing segments.
        let allowed = paths(&["Car > Exterior > Door > Handle", "Car > Exterior > Hood"]);
        assert_eq!(derive_constraint_path(&allowed), "Car > Exterior");
    }

    #[test]
    fn test_constraint_empty_when_no_common_prefix() {
        let allowed = paths(&["Car > Exterior", "Truck > Cabin"]);
        assert_eq!(derive_constraint_path(&allowed), "");
    }

    #[test]
    fn test_constraint_empty_input() {
        assert_eq!(derive_constraint_path(&[]), "");
    }

    #[test]
    fn test_ancestor_prefixes_strict_proper() {
        assert_eq!(
            ancestor_prefixes("Car > Exterior > Door"),
            vec!["Car".to_string(), "Car > Exterior".to_string()]
        );
    }

    #[test]
    fn test_ancestor_prefixes_of_root_level_path() {
        assert!(ancestor_prefixes("Car").is_empty());
        assert!(ancestor_prefixes("").is_empty());
    }
}
