//! Best-label reranking via a single chat completion.
//!
//! The model receives the ranked candidate labels and must answer with
//! exactly one of them, or "NONE". Anything else is a protocol violation
//! the classifiers handle defensively.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::llm::Reranker;

/// Reranker backed by the configured chat provider.
pub struct HttpReranker {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpReranker {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn pick_best(&self, system: &str, query: &str, candidates: &[String]) -> Result<String> {
        let cand_list: String = candidates
            .iter()
            .map(|c| format!("- {c}\n"))
            .collect();
        let user = format!("Remark: \"{query}\"\nCandidates:\n{cand_list}Best fit:");

        let raw = match self.config.provider.as_str() {
            "ollama" => chat_ollama(&self.client, &self.config, system, &user).await?,
            "openai" => chat_openai(&self.client, &self.config, system, &user).await?,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        };

        // Models like to quote the label they picked; strip that before
        // the caller matches against the candidate list.
        Ok(raw.trim().replace(['\'', '"'], ""))
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

async fn chat_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    system: &str,
    user: &str,
) -> Result<String> {
    let url = format!("{}/api/chat", config.base_url);

    let req = OllamaChatRequest {
        model: config.chat_model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        stream: false,
    };

    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(config.chat_timeout_secs))
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama chat API for reranking")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama rerank call returned {status}: {body}");
    }

    let body: OllamaChatResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama rerank response")?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

async fn chat_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    system: &str,
    user: &str,
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiChatRequest {
        model: config.chat_model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        temperature: 0.0,
    };

    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(config.chat_timeout_secs))
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI chat API for reranking")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI rerank call returned {status}: {body}");
    }

    let body: OpenAiChatResponse = resp
        .json()
        .await
        .context("Failed to parse OpenAI rerank response")?;
    Ok(body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .unwrap_or_default())
}
