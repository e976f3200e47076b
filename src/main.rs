use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use remark_classify::api;
use remark_classify::config::Config;
use remark_classify::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Taxonomy tree: {}", config.tree_path.display());
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    // Embedding caches are loaded or built here, before serving starts.
    let state = AppState::new(config.clone()).await?;

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/api/taxonomy/tree", get(api::taxonomy::get_tree))
        .route("/api/taxonomy/analyze", post(api::taxonomy::analyze))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
