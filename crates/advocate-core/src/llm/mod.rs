//! Completion backend trait and implementations for argument synthesis.
//!
//! The summarization model is an external collaborator and is treated as
//! unreliable: every failure mode (transport, status, body shape, timeout)
//! maps to [`CompletionError`], and the synthesis layer recovers from any
//! of them by falling back to rule-based derivation. Nothing above this
//! module ever sees a completion error.

#[cfg(test)]
pub mod mock;
pub mod ollama;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use ollama::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL, OllamaBackend};

/// Prompt plus decoding configuration for a single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Sampling temperature; 0.0 for deterministic output.
    pub temperature: f32,
    /// Top-k sampling cutoff; 1 is greedy decoding.
    pub top_k: u32,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sequences that end generation when emitted.
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// A request with fully deterministic decoding (temperature 0, greedy
    /// top-k), so a fixed prompt reproduces a fixed completion.
    pub fn deterministic(prompt: String, max_tokens: u32) -> Self {
        Self {
            prompt,
            temperature: 0.0,
            top_k: 1,
            max_tokens,
            stop: Vec::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("malformed completion response: {0}")]
    InvalidResponse(String),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

/// A text-completion backend: prompt in, completion text out.
pub trait CompletionBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Run one completion call with the given decoding parameters.
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;
}
