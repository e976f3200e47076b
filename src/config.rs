use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where embedding cache files are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Nested JSON taxonomy tree file
    pub tree_path: PathBuf,
    /// Vector-search candidates handed to the reranker for path search
    pub path_top_k: usize,
    /// Vector-search candidates handed to the reranker for defect search
    pub defect_top_k: usize,
    /// LLM provider configuration
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for reranking chat calls
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension; also the width of zero-filled rows when
    /// an embedder batch fails during cache construction
    pub embedding_dim: usize,
    /// Per-request timeout for rerank chat calls, in seconds (capped at 30)
    pub chat_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            tree_path: PathBuf::from("./taxonomy_tree.json"),
            path_top_k: 20,
            defect_top_k: 20,
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
            chat_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("REMARK_CLASSIFY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REMARK_CLASSIFY_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("TAXONOMY_TREE_PATH") {
            config.tree_path = PathBuf::from(path);
        }
        if let Ok(val) = std::env::var("REMARK_CLASSIFY_PATH_TOP_K") {
            if let Ok(v) = val.parse() {
                config.path_top_k = v;
            }
        }
        if let Ok(val) = std::env::var("REMARK_CLASSIFY_DEFECT_TOP_K") {
            if let Ok(v) = val.parse() {
                config.defect_top_k = v;
            }
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(val) = std::env::var("LLM_CHAT_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.llm.chat_timeout_secs = v.min(30); // Cap at 30s
            }
        }

        config
    }

    pub fn tree_cache_path(&self) -> PathBuf {
        self.data_dir.join("tree_embeddings.json")
    }

    pub fn defect_cache_path(&self) -> PathBuf {
        self.data_dir.join("defect_embeddings.json")
    }
}
