use std::sync::Arc;
use std::time::Duration;

use crate::classify::{DefectClassifier, PathClassifier};
use crate::config::Config;
use crate::llm::{Embedder, HttpEmbedder, HttpReranker, Reranker};
use crate::taxonomy::TaxonomyIndex;

/// Shared application state: an immutable context built once at startup
/// and handed by reference to every request handler. Nothing in here is
/// mutated after construction.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Raw tree document, passed through to the UI for drop-down rendering.
    pub tree_data: Arc<serde_json::Value>,
    pub path_classifier: Arc<PathClassifier>,
    pub defect_classifier: Arc<DefectClassifier>,
}

impl AppState {
    /// Build the full context. Embedding matrices are loaded or built here,
    /// before the listener binds, so concurrent requests only ever see a
    /// finished index.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        // One read serves both the UI passthrough and the flattened index.
        // A missing or broken tree degrades to an empty index; the server
        // still starts and reports no-index outcomes per request.
        let tree_data: serde_json::Value = match std::fs::read_to_string(&config.tree_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::error!(
                    "Taxonomy tree {} is not valid JSON: {e}",
                    config.tree_path.display()
                );
                serde_json::json!({})
            }),
            Err(e) => {
                tracing::error!("Cannot read taxonomy tree {}: {e}", config.tree_path.display());
                serde_json::json!({})
            }
        };

        let taxonomy = Arc::new(TaxonomyIndex::from_value(&tree_data));
        if taxonomy.is_empty() {
            tracing::warn!("Taxonomy index is empty. Classification will not resolve.");
        } else {
            tracing::info!("Tree loaded: {} categories.", taxonomy.paths().len());
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let reranker: Arc<dyn Reranker> =
            Arc::new(HttpReranker::new(http_client, config.llm.clone()));

        let path_classifier = PathClassifier::load(
            taxonomy.clone(),
            &config.tree_cache_path(),
            embedder.clone(),
            reranker.clone(),
            config.llm.embedding_dim,
        )
        .await?;

        let defect_classifier = DefectClassifier::load(
            taxonomy.all_unique_defects(),
            &config.defect_cache_path(),
            embedder,
            reranker,
            config.llm.embedding_dim,
        )
        .await?;

        Ok(Self {
            config: Arc::new(config),
            tree_data: Arc::new(tree_data),
            path_classifier: Arc::new(path_classifier),
            defect_classifier: Arc::new(defect_classifier),
        })
    }
}
