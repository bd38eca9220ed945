//! Bounded worker pool for per-page text extraction.
//!
//! Architecture: a fixed set of worker tasks drain a shared page queue.
//! Page text extraction is CPU-bound and runs on the blocking thread pool;
//! paragraph splitting and scoring happen inline on the worker. Pages
//! complete in any order; the final merge-sort in [`extract_pages`] is the
//! single synchronization point.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::PdfDocument;
use crate::paragraphs::extract_page_excerpts;
use crate::{ExtractedExcerpt, ProgressEvent};

/// Upper bound on extraction workers regardless of available parallelism.
pub const MAX_EXTRACTION_WORKERS: usize = 4;

/// At most this many excerpts survive the merge across all pages.
pub const MAX_TOTAL_EXCERPTS: usize = 20;

/// Effective pool width: the requested worker count capped by available
/// parallelism and by [`MAX_EXTRACTION_WORKERS`], never below 1.
pub fn pool_width(requested: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.min(available).min(MAX_EXTRACTION_WORKERS).max(1)
}

// ── Public API ──────────────────────────────────────────────────────────

/// A single page extraction job submitted to the pool.
pub struct PageJob {
    /// 0-based page index into the document.
    pub page_index: usize,
    pub result_tx: oneshot::Sender<Vec<ExtractedExcerpt>>,
    /// Progress callback for this job (emits PageDone).
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks that extract and score excerpts page by page.
///
/// Submit jobs via [`submit()`](ExtractionPool::submit), receive each
/// page's excerpts via the oneshot receiver paired with its job.
pub struct ExtractionPool {
    job_tx: async_channel::Sender<PageJob>,
    pool_handle: JoinHandle<()>,
}

impl ExtractionPool {
    /// Create a new pool with `num_workers` worker tasks.
    pub fn new(
        document: Arc<dyn PdfDocument>,
        num_workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<PageJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    document.clone(),
                    cancel.clone(),
                )));
            }

            // Drop our clone so workers are the last holders
            drop(job_rx);

            // Workers exit when job_tx closes
            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: PageJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the pool and wait for all workers to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

// ── Worker ──────────────────────────────────────────────────────────────

/// Worker loop: pull a page job, extract its text on the blocking pool,
/// split and score paragraphs, send the page's excerpts back.
///
/// A page whose text cannot be extracted degrades to an empty excerpt
/// list so one bad content stream never sinks the whole document.
async fn worker_loop(
    job_rx: async_channel::Receiver<PageJob>,
    document: Arc<dyn PdfDocument>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        if cancel.is_cancelled() {
            // Dropping result_tx signals the collector to move on.
            continue;
        }

        let page_index = job.page_index;
        let doc = document.clone();
        let extracted = tokio::task::spawn_blocking(move || doc.page_text(page_index)).await;

        let excerpts = match extracted {
            Ok(Ok(text)) => extract_page_excerpts(&text, (page_index + 1) as u32),
            Ok(Err(e)) => {
                tracing::warn!(page = page_index + 1, error = %e, "page text extraction failed");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(page = page_index + 1, error = %e, "extraction task panicked");
                Vec::new()
            }
        };

        (job.progress)(ProgressEvent::PageDone {
            page: (page_index + 1) as u32,
            excerpts: excerpts.len(),
        });

        let _ = job.result_tx.send(excerpts);
    }
}

// ── Merge ───────────────────────────────────────────────────────────────

/// Extract and rank excerpts from the selected pages.
///
/// Dispatches one job per page to a bounded pool, collects every page's
/// excerpts regardless of completion order, then sorts the merged list by
/// (page descending, relevance score descending) and truncates to
/// [`MAX_TOTAL_EXCERPTS`].
pub async fn extract_pages(
    document: Arc<dyn PdfDocument>,
    pages: &[usize],
    num_workers: usize,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) -> Vec<ExtractedExcerpt> {
    let pool = ExtractionPool::new(document, num_workers, cancel);

    let mut receivers = Vec::with_capacity(pages.len());
    for &page_index in pages {
        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(PageJob {
            page_index,
            result_tx,
            progress: progress.clone(),
        })
        .await;
        receivers.push(result_rx);
    }

    let mut merged = Vec::new();
    for rx in receivers {
        if let Ok(excerpts) = rx.await {
            merged.extend(excerpts);
        }
    }
    pool.shutdown().await;

    merge_and_rank(merged)
}

/// Merge-sort step: page descending, then relevance score descending.
/// The sort is stable, so excerpts tied on (page, score) keep their
/// extraction order.
pub fn merge_and_rank(mut excerpts: Vec<ExtractedExcerpt>) -> Vec<ExtractedExcerpt> {
    excerpts.sort_by(|a, b| {
        b.page
            .cmp(&a.page)
            .then(b.relevance_score.cmp(&a.relevance_score))
    });
    excerpts.truncate(MAX_TOTAL_EXCERPTS);
    excerpts
}
