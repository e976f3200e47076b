//! Embedding index: the in-memory label/vector matrix and its on-disk cache.

pub mod cache;
pub mod embedding;
