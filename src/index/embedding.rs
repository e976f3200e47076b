use std::cmp::Ordering;

/// A label list and its row-aligned matrix of unit-norm embedding vectors.
///
/// Row `i` is the embedding of `labels[i]`; the cache layer guarantees the
/// alignment before construction. Searches are masked: callers pass the
/// subset of row indices that are valid for the request.
pub struct EmbeddingIndex {
    labels: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn new(labels: Vec<String>, vectors: Vec<Vec<f32>>) -> Self {
        assert_eq!(
            labels.len(),
            vectors.len(),
            "label list and embedding matrix must be row-aligned"
        );
        Self { labels, vectors }
    }

    pub fn empty() -> Self {
        Self {
            labels: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    /// Cosine-score the rows in `allowed` against a unit-norm query vector
    /// and return the top `top_k` as `(row_index, score)`, best first.
    ///
    /// Both sides are unit vectors, so the dot product is the cosine
    /// similarity. The sort is stable: ties keep the order of `allowed`,
    /// which callers build in original row order.
    pub fn search(&self, query: &[f32], allowed: &[usize], top_k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = allowed
            .iter()
            .filter(|&&i| i < self.vectors.len())
            .map(|&i| (i, dot(&self.vectors[i], query)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale a vector to unit length in place. Zero vectors are left as-is;
/// they score 0 against everything, which is the defined degraded state
/// for labels whose embedding could not be fetched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
