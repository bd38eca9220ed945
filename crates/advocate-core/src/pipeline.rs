//! End-to-end analysis pipeline: hash, cache, extract, synthesize, store.
//!
//! Concurrency policy: a keyed lock table gives at-most-one in-flight
//! computation per content hash. Unrelated documents proceed in parallel;
//! a request that loses the race for a hash waits, then finds the winner's
//! result in the cache on the re-check.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::backend::{PdfBackend, PdfDocument};
use crate::hash::content_hash;
use crate::llm::CompletionBackend;
use crate::pool::{extract_pages, pool_width};
use crate::select::select_pages;
use crate::synth::{fallback_argument_set, synthesize};
use crate::{Analysis, AnalysisSource, Config, CoreError, ProgressEvent};

// ── In-flight lock table ────────────────────────────────────────────────

/// Keyed lock table: at most one in-flight computation per content hash.
///
/// Entries are created on demand and removed once the last holder drops
/// its handle, so the table stays proportional to live work.
#[derive(Default)]
pub struct InFlightLocks {
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl InFlightLocks {
    /// Lock handle for `content_hash`, creating the entry if absent.
    pub fn acquire_handle(&self, content_hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(content_hash.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the entry unless another task still holds a handle to it.
    /// Callers must drop their own handle first.
    pub fn release(&self, content_hash: &str) {
        self.locks
            .remove_if(content_hash, |_, lock| Arc::strong_count(lock) <= 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

impl std::fmt::Debug for InFlightLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightLocks")
            .field("entries", &self.locks.len())
            .finish()
    }
}

// ── Pipeline ────────────────────────────────────────────────────────────

/// Analyze one document: extract the most relevant excerpts and produce
/// for/against argument lists.
///
/// Cached results short-circuit before any document work. On a miss, the
/// per-hash lock serializes duplicate requests; the loser picks up the
/// winner's cached result. The model path is optional (`llm: None` goes
/// straight to rule-based synthesis) and never fails the analysis.
pub async fn analyze_document(
    path: &Path,
    backend: &dyn PdfBackend,
    llm: Option<&dyn CompletionBackend>,
    config: &Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Analysis, CoreError> {
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);

    // Input validation before any pipeline work.
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if file_name.is_empty() {
        return Err(CoreError::Input("no file name supplied".into()));
    }
    if !path.is_file() {
        return Err(CoreError::Input(format!("not a file: {}", path.display())));
    }

    let content_hash = content_hash(path)?;
    tracing::debug!(content_hash, path = %path.display(), "document hashed");
    progress(ProgressEvent::Hashed {
        content_hash: content_hash.clone(),
    });

    // Fast path: cached result, no lock taken.
    if let Some(cache) = config.result_cache.as_deref()
        && let Some(arguments) = cache.get(&content_hash)
    {
        progress(ProgressEvent::CacheHit);
        return Ok(Analysis::cached(content_hash, arguments));
    }

    let lock = config.in_flight.acquire_handle(&content_hash);
    let guard = match lock.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            progress(ProgressEvent::WaitingOnDuplicate);
            lock.lock().await
        }
    };

    // A concurrent holder may have stored the result while we waited.
    if let Some(cache) = config.result_cache.as_deref()
        && let Some(arguments) = cache.get(&content_hash)
    {
        drop(guard);
        drop(lock);
        config.in_flight.release(&content_hash);
        progress(ProgressEvent::CacheHit);
        return Ok(Analysis::cached(content_hash, arguments));
    }

    let result = run_pipeline(
        path,
        backend,
        llm,
        config,
        &content_hash,
        progress.clone(),
        cancel,
    )
    .await;

    if let Ok(ref analysis) = result
        && let Some(cache) = config.result_cache.as_deref()
    {
        cache.insert(&content_hash, &analysis.arguments);
        progress(ProgressEvent::Stored);
    }

    drop(guard);
    drop(lock);
    config.in_flight.release(&content_hash);

    result
}

/// The compute path behind the cache and lock: open, select, extract,
/// synthesize.
async fn run_pipeline(
    path: &Path,
    backend: &dyn PdfBackend,
    llm: Option<&dyn CompletionBackend>,
    config: &Config,
    content_hash: &str,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) -> Result<Analysis, CoreError> {
    let document: Arc<dyn PdfDocument> = Arc::from(backend.open(path)?);
    let page_count = document.page_count();
    let pages = select_pages(page_count);
    progress(ProgressEvent::Extracting {
        page_count,
        selected_pages: pages.len(),
    });

    let excerpts = extract_pages(
        document,
        &pages,
        pool_width(config.num_workers),
        progress.clone(),
        cancel.clone(),
    )
    .await;

    // A cancelled extraction yields empty pages; do not let that masquerade
    // as a real (cacheable) result.
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let (arguments, source, ambiguous) = match llm {
        Some(model) => {
            progress(ProgressEvent::Synthesizing {
                excerpts: excerpts.len(),
                backend: model.name().to_string(),
            });
            let synthesis = synthesize(
                &excerpts,
                model,
                Duration::from_secs(config.llm_timeout_secs),
                config.llm_max_tokens,
            )
            .await;
            if synthesis.via_model {
                (synthesis.arguments, AnalysisSource::Model, synthesis.ambiguous)
            } else {
                progress(ProgressEvent::FallbackUsed);
                (
                    synthesis.arguments,
                    AnalysisSource::RuleBased,
                    synthesis.ambiguous,
                )
            }
        }
        None => (
            fallback_argument_set(&excerpts),
            AnalysisSource::RuleBased,
            false,
        ),
    };

    Ok(Analysis {
        content_hash: content_hash.to_string(),
        page_count,
        pages_sampled: pages,
        excerpts,
        arguments,
        source,
        ambiguous,
    })
}
