//! # remark-classify
//!
//! A Rust web service that maps free-text inspection remarks to a location
//! in a hierarchical taxonomy tree and a defect-type label, combining
//! semantic vector search with LLM re-ranking.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────┐
//!                  │ Remark (+ constraint?)    │
//!                  └────────────┬─────────────┘
//!                               │
//!                               ▼
//!                  ┌──────────────────────────┐
//!                  │  Candidate selection      │
//!                  │  defect-bearing paths,    │
//!                  │  ancestry-filtered when   │
//!                  │  a constraint is given    │
//!                  └────────────┬─────────────┘
//!                               │
//!                               ▼
//!                  ┌──────────────────────────┐
//!                  │  Embed + cosine search    │
//!                  │  (top 20 candidates)      │
//!                  └────────────┬─────────────┘
//!                               │
//!                               ▼
//!                  ┌──────────────────────────┐
//!                  │  LLM re-rank: pick one    │
//!                  │  candidate or NONE        │
//!                  └────────────┬─────────────┘
//!                               │
//!                               ▼
//!                  ┌──────────────────────────┐
//!                  │  Constraint resolution    │
//!                  │  ancestor rejection +     │
//!                  │  constraint fallback      │
//!                  └────────────┬─────────────┘
//!                               │
//!                               ▼
//!                  ┌──────────────────────────┐
//!                  │  Defect prediction over   │
//!                  │  the path's valid labels  │
//!                  └──────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, and LLM settings
//! - [`models`] - API request/response types
//! - [`taxonomy`] - Tree loading, flattening into sorted paths, and the path→defects map
//! - [`index`] - Label/vector matrix with masked cosine search, plus its on-disk cache
//! - [`classify`] - Path classification with constraint resolution, and defect prediction
//! - [`llm`] - Embedder/Reranker seams with Ollama and OpenAI-compatible HTTP backends
//! - [`api`] - Axum HTTP handlers for the tree passthrough and the analyze endpoint
//! - [`state`] - Immutable application context built once at startup

pub mod api;
pub mod classify;
pub mod config;
pub mod index;
pub mod llm;
pub mod models;
pub mod state;
pub mod taxonomy;
