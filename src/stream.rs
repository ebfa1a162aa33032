//! Streaming extraction API: emit per-page records as they complete.
//!
//! Unlike [`crate::process::process_batch`], which returns only after the
//! whole batch is resolved and routed, [`extract_stream`] yields each page's
//! raw extraction result as soon as it is ready. Records arrive in completion
//! order (sort by `page_index` if order matters) and carry whatever serial was
//! printed on the page; nearest-serial repair and routing need the whole
//! batch and are not applied here.

use crate::config::PipelineConfig;
use crate::error::{BillRouteError, PageSkip};
use crate::model::BillRecord;
use crate::pipeline::input;
use crate::process::{self, PageContent};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of per-page extraction results.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<BillRecord, PageSkip>> + Send>>;

fn into_stream(pages: Vec<PageContent>, concurrency: usize) -> RecordStream {
    let s = stream::iter(pages.into_iter().map(|page| async move {
        let index = page.index;
        match tokio::task::spawn_blocking(move || page.extract()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Extraction task for page {} panicked: {}", index + 1, e);
                Err(PageSkip::TextUnavailable {
                    page: index + 1,
                    detail: format!("extraction task panicked: {e}"),
                })
            }
        }
    }))
    .buffer_unordered(concurrency.max(1));
    Box::pin(s)
}

/// Extract records from a PDF, streaming pages as they are ready.
///
/// # Returns
/// - `Ok(RecordStream)` — a stream of `Result<BillRecord, PageSkip>`
/// - `Err(BillRouteError)` — fatal error (file not found, not a PDF, etc.)
///
/// # Example
/// ```rust,no_run
/// use bill_router::{extract_stream, PipelineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let mut records = extract_stream("ward-12.pdf", &config).await?;
/// while let Some(page) = records.next().await {
///     match page {
///         Ok(r) => println!("page {}: serial {}", r.page_number, r.display_serial),
///         Err(skip) => eprintln!("{skip}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RecordStream, BillRouteError> {
    let path = input::resolve_local(path)?;
    info!("Starting streaming extraction: {}", path.display());
    let pages = process::load_pages(path, config.password.clone()).await?;
    Ok(into_stream(pages, config.concurrency))
}

/// Streaming extraction over a PDF held in memory.
pub async fn extract_stream_from_bytes(
    bytes: Vec<u8>,
    config: &PipelineConfig,
) -> Result<RecordStream, BillRouteError> {
    input::check_bytes(&bytes)?;
    let pages = process::load_pages_from_bytes(bytes, config.password.clone()).await?;
    Ok(into_stream(pages, config.concurrency))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::memory::MemoryDocument;

    #[tokio::test]
    async fn streams_every_page_once() {
        let doc = MemoryDocument::from_texts([
            "Owner Name: Asha\nBillSrNo: 7",
            "Owner Name: -",
            "Owner Name: Bina",
        ]);
        let pages = process::read_pages(&doc);
        let mut results: Vec<_> = into_stream(pages, 2).collect().await;
        results.sort_by_key(|r| match r {
            Ok(record) => record.page_index,
            Err(skip) => skip.page() - 1,
        });

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().display_serial, "7");
        assert_eq!(results[1], Err(PageSkip::MissingIdentity { page: 2 }));
        assert!(!results[2].as_ref().unwrap().serial_valid);
    }
}
