//! Batch entry points.
//!
//! [`process_document`] runs extract → resolve → filter → route over any
//! [`SourceDocument`] synchronously. The async functions wrap the pdfium
//! backend: pdfium work runs inside `spawn_blocking`, per-page extraction
//! runs on a bounded pool of blocking tasks, and every composition call
//! opens its own read handle on the source.
//!
//! Derivative documents are written atomically (temp file in the target
//! directory, then rename) so a failed run never leaves a half-written PDF.

use crate::config::PipelineConfig;
use crate::document::pdfium::{bind_pdfium, PdfiumSource};
use crate::document::{PageLayout, SourceDocument};
use crate::error::{BillRouteError, PageSkip};
use crate::model::{distinct_colonies, Batch, BatchOutput, BatchStats, BillRecord, DerivedDocument, Field, SplitOutput};
use crate::pipeline::{compose, extract, input, resolve, route};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Page content ─────────────────────────────────────────────────────────

/// Text and layout read from one source page, ready for extraction on any
/// thread.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub index: usize,
    pub text: Result<String, String>,
    pub layout: Option<PageLayout>,
}

impl PageContent {
    /// Run the extractor on this page.
    pub fn extract(&self) -> Result<BillRecord, PageSkip> {
        match &self.text {
            Ok(text) => extract::extract_record(text, self.layout.as_ref(), self.index),
            Err(detail) => Err(PageSkip::TextUnavailable {
                page: self.index + 1,
                detail: detail.clone(),
            }),
        }
    }
}

/// Read text and layout for every page of `source`.
///
/// A page whose layout cannot be read is still extracted from its text.
pub fn read_pages<S: SourceDocument>(source: &S) -> Vec<PageContent> {
    (0..source.page_count())
        .map(|index| {
            let text = source.page_text(index).map_err(|e| e.to_string());
            let layout = match source.page_layout(index) {
                Ok(layout) => Some(layout),
                Err(e) => {
                    debug!("No layout for page {}: {}", index + 1, e);
                    None
                }
            };
            PageContent {
                index,
                text,
                layout,
            }
        })
        .collect()
}

fn report_page(config: &PipelineConfig, outcome: &Result<BillRecord, PageSkip>, total: usize) {
    if let Some(ref cb) = config.progress_callback {
        match outcome {
            Ok(record) => cb.on_page_extracted(record.page_number, total),
            Err(skip) => cb.on_page_skipped(skip.page(), total, &skip.to_string()),
        }
    }
}

// ── Batch assembly ───────────────────────────────────────────────────────

/// Keep records whose colony contains `colony` (case-insensitive). Returns
/// the kept records and how many were dropped.
pub fn filter_by_colony(records: Vec<BillRecord>, colony: Option<&str>) -> (Vec<BillRecord>, usize) {
    let Some(needle) = colony.map(|c| c.trim().to_lowercase()) else {
        return (records, 0);
    };
    let before = records.len();
    let kept: Vec<BillRecord> = records
        .into_iter()
        .filter(|r| r.field(Field::Colony).to_lowercase().contains(&needle))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Narrow an already-routed batch to one colony and route what is left.
///
/// Used on batches loaded from disk, whose serials were resolved when they
/// were first processed.
pub fn refilter_batch(mut output: BatchOutput, colony: Option<&str>) -> BatchOutput {
    if colony.is_none() {
        return output;
    }
    let (records, dropped) = filter_by_colony(std::mem::take(&mut output.records), colony);
    let (records, routed) = route::route_records(records);
    info!(
        "Colony filter kept {} of {} saved records",
        records.len(),
        records.len() + dropped
    );
    output.records = records;
    output.stats.filtered_out += dropped;
    output.stats.routed = routed.routed;
    output.stats.unrouted = routed.unrouted;
    output.stats.distinct_locations = routed.distinct_locations;
    output
}

/// Turn per-page outcomes into a resolved, routed batch.
///
/// Serials are resolved across every usable record before the colony filter
/// so the filter cannot starve the resolver of anchors.
pub fn assemble_batch(
    name: &str,
    source_pages: usize,
    outcomes: Vec<Result<BillRecord, PageSkip>>,
    config: &PipelineConfig,
    started: Instant,
) -> Result<BatchOutput, BillRouteError> {
    let mut stats = BatchStats {
        source_pages,
        ..BatchStats::default()
    };

    let mut records = Vec::with_capacity(outcomes.len());
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(record) => records.push(record),
            Err(skip) => {
                match skip {
                    PageSkip::MissingIdentity { .. } => stats.skipped_missing_identity += 1,
                    _ => stats.skipped_unreadable += 1,
                }
                skipped.push(skip);
            }
        }
    }

    if records.is_empty() {
        warn!("No usable records: all {} pages were skipped", source_pages);
    }

    // ── Step 1: Batch identity ───────────────────────────────────────────
    let mut batch = Batch::new(name, source_pages);
    batch.record_count = records.len();
    for record in &mut records {
        record.assign_to(&batch);
    }
    stats.extracted_records = records.len();
    let colonies = distinct_colonies(&records);

    // ── Step 2: Resolve serials ──────────────────────────────────────────
    let resolved = resolve::resolve_serials(&mut records);
    stats.printed_serials = resolved.printed;
    stats.resolved_via_nearest = resolved.nearest;
    stats.resolved_via_fallback = resolved.fallback;

    // ── Step 3: Colony filter ────────────────────────────────────────────
    let (records, filtered_out) = filter_by_colony(records, config.colony.as_deref());
    stats.filtered_out = filtered_out;
    if filtered_out > 0 {
        info!(
            "Colony filter kept {} of {} records",
            records.len(),
            records.len() + filtered_out
        );
    }

    // ── Step 4: Route ────────────────────────────────────────────────────
    let (records, routed) = route::route_records(records);
    stats.routed = routed.routed;
    stats.unrouted = routed.unrouted;
    stats.distinct_locations = routed.distinct_locations;
    stats.total_duration_ms = started.elapsed().as_millis() as u64;

    info!(
        "Batch '{}': {}/{} pages usable, {} routed over {} stops, {}ms",
        batch.name,
        stats.extracted_records,
        source_pages,
        stats.routed,
        stats.distinct_locations,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&stats);
    }

    Ok(BatchOutput {
        batch,
        records,
        colonies,
        skipped,
        stats,
    })
}

/// Extract, resolve and route every page of `source`, on the calling thread.
pub fn process_document<S: SourceDocument>(
    source: &S,
    name: &str,
    config: &PipelineConfig,
) -> Result<BatchOutput, BillRouteError> {
    let started = Instant::now();
    let total = source.page_count();
    info!("Processing '{}' ({} pages)", name, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let outcomes = read_pages(source)
        .iter()
        .map(|page| {
            let outcome = page.extract();
            report_page(config, &outcome, total);
            outcome
        })
        .collect();

    assemble_batch(name, total, outcomes, config, started)
}

// ── Async facade ─────────────────────────────────────────────────────────

pub(crate) async fn load_pages(path: PathBuf, password: Option<String>) -> Result<Vec<PageContent>, BillRouteError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open_file(&pdfium, &path, password.as_deref())?;
        Ok(read_pages(&source))
    })
    .await
    .map_err(|e| BillRouteError::Internal(format!("Page reader task panicked: {}", e)))?
}

pub(crate) async fn load_pages_from_bytes(
    bytes: Vec<u8>,
    password: Option<String>,
) -> Result<Vec<PageContent>, BillRouteError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open_bytes(&pdfium, &bytes, password.as_deref())?;
        Ok(read_pages(&source))
    })
    .await
    .map_err(|e| BillRouteError::Internal(format!("Page reader task panicked: {}", e)))?
}

/// Extract pages on at most `config.concurrency` blocking tasks, keeping
/// page order.
pub async fn extract_pages(
    pages: Vec<PageContent>,
    config: &PipelineConfig,
) -> Result<Vec<Result<BillRecord, PageSkip>>, BillRouteError> {
    let total = pages.len();
    let results: Vec<_> = stream::iter(pages.into_iter().map(|page| {
        let config = config.clone();
        async move {
            let outcome = tokio::task::spawn_blocking(move || page.extract()).await;
            if let Ok(ref outcome) = outcome {
                report_page(&config, outcome, total);
            }
            outcome
        }
    }))
    .buffered(config.concurrency)
    .collect()
    .await;

    results
        .into_iter()
        .map(|r| r.map_err(|e| BillRouteError::Internal(format!("Extraction task panicked: {}", e))))
        .collect()
}

/// Process a PDF file: extract, resolve, filter and route.
///
/// # Errors
/// Returns `Err(BillRouteError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - Wrong or missing password, corrupt PDF
///
/// A batch in which every page is skipped is not an error: it comes back
/// with no records and the skip counters filled in.
pub async fn process_batch(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, BillRouteError> {
    let started = Instant::now();
    let path = input::resolve_local(path)?;
    let name = config
        .batch_name
        .clone()
        .unwrap_or_else(|| input::batch_name_for(&path));
    info!("Starting batch: {}", path.display());

    let pages = load_pages(path, config.password.clone()).await?;
    let total = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }
    let outcomes = extract_pages(pages, config).await?;
    assemble_batch(&name, total, outcomes, config, started)
}

/// Process a PDF held in memory.
pub async fn process_batch_from_bytes(
    bytes: Vec<u8>,
    name: &str,
    config: &PipelineConfig,
) -> Result<BatchOutput, BillRouteError> {
    let started = Instant::now();
    input::check_bytes(&bytes)?;
    let pages = load_pages_from_bytes(bytes, config.password.clone()).await?;
    let total = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }
    let outcomes = extract_pages(pages, config).await?;
    assemble_batch(name, total, outcomes, config, started)
}

/// Synchronous wrapper around [`process_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_batch_sync(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, BillRouteError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BillRouteError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_batch(path, config))
}

/// Page count of a PDF without extracting anything.
pub async fn inspect(path: impl AsRef<Path>, password: Option<&str>) -> Result<usize, BillRouteError> {
    let path = input::resolve_local(path)?;
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open_file(&pdfium, &path, password.as_deref())?;
        Ok(source.page_count())
    })
    .await
    .map_err(|e| BillRouteError::Internal(format!("Inspect task panicked: {}", e)))?
}

// ── Composition to disk ──────────────────────────────────────────────────

/// Raised once the future waiting on a blocking composition is dropped, for
/// instance by a timeout. The blocking task itself cannot be stopped, so it
/// checks the flag before each file it writes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: self.clone(),
            armed: true,
        }
    }
}

struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}

/// Run `work` on the blocking pool. If the returned future is dropped before
/// the work finishes, the flag passed to `work` is raised.
async fn run_cancellable<T, F>(task: &str, work: F) -> Result<T, BillRouteError>
where
    F: FnOnce(&CancelFlag) -> Result<T, BillRouteError> + Send + 'static,
    T: Send + 'static,
{
    let flag = CancelFlag::default();
    let guard = flag.guard();
    let result = tokio::task::spawn_blocking(move || work(&flag))
        .await
        .map_err(|e| BillRouteError::Internal(format!("{task} task panicked: {e}")))?;
    guard.disarm();
    result
}

/// [`write_atomic`], unless `cancel` has been raised.
pub fn write_unless_cancelled(
    cancel: &CancelFlag,
    path: &Path,
    bytes: &[u8],
) -> Result<(), BillRouteError> {
    if cancel.is_cancelled() {
        debug!("Not writing {}: caller went away", path.display());
        return Err(BillRouteError::Cancelled {
            path: path.to_path_buf(),
        });
    }
    write_atomic(path, bytes)
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BillRouteError> {
    let write_err = |source: std::io::Error| BillRouteError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// File name used for one employee's bundle.
pub fn bundle_file_name(employee_number: usize) -> String {
    format!("employee_{:02}.pdf", employee_number)
}

/// Compose a reordered, stamped copy of `source_path` and write it to
/// `output_path`.
pub async fn compose_to_file(
    source_path: impl AsRef<Path>,
    records: &[BillRecord],
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<DerivedDocument, BillRouteError> {
    let source_path = input::resolve_local(source_path)?;
    let output_path = output_path.as_ref().to_path_buf();
    let records = records.to_vec();
    let cfg = config.clone();

    let document = run_cancellable("Compose", move |cancel| {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open_file(&pdfium, &source_path, cfg.password.as_deref())?;
        let document = compose::reorder_and_stamp(&source, &records, &cfg)?;
        write_unless_cancelled(cancel, &output_path, &document.bytes)?;
        Ok((document, output_path))
    })
    .await?;

    let (document, output_path) = document;
    if document.out_of_range_pages() > 0 {
        warn!(
            "{} record(s) pointed past the end of the source",
            document.out_of_range_pages()
        );
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_written(&output_path.display().to_string(), document.page_count);
    }
    Ok(document)
}

/// Split the records across `config.employee_count` workers and write one
/// bundle per worker into `dir` (see [`bundle_file_name`]).
pub async fn split_to_dir(
    source_path: impl AsRef<Path>,
    records: &[BillRecord],
    dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<SplitOutput, BillRouteError> {
    let source_path = input::resolve_local(source_path)?;
    let dir = dir.as_ref().to_path_buf();
    let records = records.to_vec();
    let cfg = config.clone();

    let split = run_cancellable("Split", move |cancel| {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open_file(&pdfium, &source_path, cfg.password.as_deref())?;
        let split = compose::split_by_employee(&source, &records, &cfg)?;
        for bundle in &split.bundles {
            write_unless_cancelled(
                cancel,
                &dir.join(bundle_file_name(bundle.employee_number)),
                &bundle.document.bytes,
            )?;
        }
        Ok(split)
    })
    .await?;

    info!(
        "Split {} records into {} bundles of up to {}",
        split.total_records,
        split.bundles.len(),
        split.records_per_employee
    );
    if let Some(ref cb) = config.progress_callback {
        for bundle in &split.bundles {
            cb.on_document_written(
                &bundle_file_name(bundle.employee_number),
                bundle.document.page_count,
            );
        }
    }
    Ok(split)
}
