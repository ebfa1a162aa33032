//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as pages are extracted and derivative documents are written.
//!
//! # Example
//!
//! ```rust
//! use bill_router::{BatchProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     extracted: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_page_extracted(&self, page_num: usize, total_pages: usize) {
//!         self.extracted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} extracted", page_num, total_pages);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     extracted: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::BatchStats;
use std::sync::Arc;

/// Called by the pipeline as it works through a batch.
///
/// Implementations must be `Send + Sync`: pages are extracted on blocking
/// worker threads and `on_page_extracted` / `on_page_skipped` may fire
/// concurrently. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before extraction starts.
    fn on_batch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// A page produced a usable record.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages in the document
    fn on_page_extracted(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// A page was dropped (identity rejection or unreadable text).
    fn on_page_skipped(&self, page_num: usize, total_pages: usize, reason: &str) {
        let _ = (page_num, total_pages, reason);
    }

    /// A derivative document was written.
    ///
    /// # Arguments
    /// * `label` — output file name or bundle label
    /// * `pages` — pages in the written document
    fn on_document_written(&self, label: &str, pages: usize) {
        let _ = (label, pages);
    }

    /// Called once after extraction, resolution and routing finish.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
