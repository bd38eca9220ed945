use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use serde::{Deserialize, Serialize};

pub mod backend;
pub mod cache;
pub mod config_file;
pub mod hash;
pub mod llm;
pub mod paragraphs;
pub mod pipeline;
pub mod pool;
pub mod score;
pub mod select;
pub mod synth;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend, PdfDocument};
pub use cache::{CacheStats, ResultCache};
pub use hash::{HASH_PREFIX_BYTES, content_hash};
pub use llm::{
    CompletionBackend, CompletionError, CompletionRequest, DEFAULT_MODEL, DEFAULT_OLLAMA_URL,
    OllamaBackend,
};
pub use pipeline::InFlightLocks;
pub use pool::{MAX_EXTRACTION_WORKERS, MAX_TOTAL_EXCERPTS};
pub use select::select_pages;
pub use synth::{Synthesis, fallback_argument_set};

/// A scored paragraph extracted from one page of a document.
///
/// Ordering invariant: within any ranked collection, excerpts are sorted
/// by (page descending, relevance_score descending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedExcerpt {
    /// 1-based page number the excerpt was found on.
    pub page: u32,
    pub text: String,
    pub relevance_score: u32,
}

/// Structured for/against argument lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSet {
    #[serde(rename = "for")]
    pub for_arguments: Vec<String>,
    #[serde(rename = "against")]
    pub against_arguments: Vec<String>,
}

/// Where an analysis result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Persisted result for the same content hash.
    Cache,
    /// Parsed from a model completion.
    Model,
    /// Derived from the scored excerpts without a model.
    RuleBased,
}

/// The result of analyzing one document.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub content_hash: String,
    /// Total pages in the document. Zero for cache hits, which never open
    /// the document.
    pub page_count: usize,
    /// 0-based indices of the pages that were sampled.
    pub pages_sampled: Vec<usize>,
    pub excerpts: Vec<ExtractedExcerpt>,
    pub arguments: ArgumentSet,
    pub source: AnalysisSource,
    /// True when the model replied but its response could not be parsed
    /// into argument lists.
    pub ambiguous: bool,
}

impl Analysis {
    /// An analysis rehydrated from the cache. The document itself is never
    /// opened, so page data is absent.
    pub fn cached(content_hash: String, arguments: ArgumentSet) -> Self {
        Self {
            content_hash,
            page_count: 0,
            pages_sampled: Vec::new(),
            excerpts: Vec::new(),
            arguments,
            source: AnalysisSource::Cache,
            ambiguous: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("document backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("analysis cancelled")]
    Cancelled,
}

/// Progress events emitted during analysis.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Content hashing finished.
    Hashed { content_hash: String },
    /// A cached result satisfied the request.
    CacheHit,
    /// Another request is already computing this document; waiting on it.
    WaitingOnDuplicate,
    /// Pages were selected; extraction is starting.
    Extracting {
        page_count: usize,
        selected_pages: usize,
    },
    /// One page finished extraction.
    PageDone { page: u32, excerpts: usize },
    /// Prompting the completion backend.
    Synthesizing { excerpts: usize, backend: String },
    /// The model path failed or was unparseable; rule-based synthesis used.
    FallbackUsed,
    /// The result was stored in the cache.
    Stored,
}

/// Configuration for document analysis.
#[derive(Clone)]
pub struct Config {
    /// Model name passed to the completion backend.
    pub model: String,
    /// Base URL of the Ollama server.
    pub ollama_url: String,
    /// Outer deadline for one completion call, in seconds.
    pub llm_timeout_secs: u64,
    /// Output token cap for one completion call.
    pub llm_max_tokens: u32,
    /// Requested extraction workers (capped at [`MAX_EXTRACTION_WORKERS`]).
    pub num_workers: usize,
    pub result_cache: Option<Arc<ResultCache>>,
    /// Path to the persistent SQLite cache database (optional).
    /// When set, the result cache is backed by SQLite for persistence
    /// across restarts.
    pub cache_path: Option<PathBuf>,
    pub in_flight: Arc<InFlightLocks>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("ollama_url", &self.ollama_url)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("num_workers", &self.num_workers)
            .field(
                "result_cache",
                &self.result_cache.as_ref().map(|c| format!("{:?}", c)),
            )
            .field("cache_path", &self.cache_path)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            llm_timeout_secs: 120,
            llm_max_tokens: 1024,
            num_workers: MAX_EXTRACTION_WORKERS,
            result_cache: Some(Arc::new(ResultCache::default())),
            cache_path: None,
            in_flight: Arc::new(InFlightLocks::default()),
        }
    }
}

/// Build a [`ResultCache`] from configuration.
///
/// If `cache_path` is set, opens a persistent SQLite-backed cache.
/// Otherwise, returns an in-memory-only cache.
pub fn build_result_cache(cache_path: Option<&std::path::Path>) -> Arc<ResultCache> {
    if let Some(path) = cache_path {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match ResultCache::open(path) {
            Ok(cache) => {
                tracing::info!(path = %path.display(), "opened persistent cache");
                return Arc::new(cache);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open cache, falling back to in-memory");
            }
        }
    }
    Arc::new(ResultCache::new())
}


/// Analyze a document end to end: hash its content, consult the result
/// cache, extract and rank excerpts, and synthesize for/against arguments.
///
/// Progress events are emitted via the callback. The operation can be
/// cancelled via the CancellationToken.
pub async fn analyze_document(
    path: &std::path::Path,
    backend: &dyn PdfBackend,
    llm: Option<&dyn CompletionBackend>,
    config: &Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Analysis, CoreError> {
    pipeline::analyze_document(path, backend, llm, config, progress, cancel).await
}
