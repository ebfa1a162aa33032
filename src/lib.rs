//! # bill-router
//!
//! Turn a multi-page PDF of printed property-tax bills into a walking route.
//!
//! Each page carries one bill. The crate reads every page's text, pulls out
//! the bill fields and a `lat : lon` pair, repairs missing bill serials from
//! the geographically nearest printed one, orders the bills into a greedy
//! nearest-neighbour route, and re-emits the source pages in that order with
//! each bill's serial burned onto the page. The ordered set can also be split
//! evenly across field workers, one PDF each.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    validate local file (exists, readable, %PDF)
//!  ├─ 2. Read     page text + positioned spans via pdfium (spawn_blocking)
//!  ├─ 3. Extract  field ladders, coordinates, serial (per page, concurrent)
//!  ├─ 4. Resolve  repair missing serials from the nearest printed one
//!  ├─ 5. Filter   optional colony filter
//!  ├─ 6. Route    group co-located bills, chain stops nearest-first
//!  └─ 7. Compose  reorder + stamp, 1/2/3-up sheets, per-worker split
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bill_router::{compose_to_file, process_batch, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().employee_count(3).build()?;
//!     let batch = process_batch("ward-12.pdf", &config).await?;
//!     eprintln!(
//!         "{} bills, {} stops, {} serials repaired",
//!         batch.records.len(),
//!         batch.stats.distinct_locations,
//!         batch.stats.resolved_via_nearest + batch.stats.resolved_via_fallback,
//!     );
//!     compose_to_file("ward-12.pdf", &batch.records, "ward-12.route.pdf", &config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature       | Default | Description |
//! |---------------|---------|-------------|
//! | `cli`         | on      | Enables the `bill-router` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `auto-pdfium` | on      | Download and cache pdfium when no local copy is found |
//! | `bundled`     | off     | Embed the pdfium shared library; it is extracted to the cache on first bind |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! bill-router = { version = "0.1", default-features = false }
//! ```
//!
//! ## Testing without pdfium
//!
//! Every pipeline stage is written against [`document::SourceDocument`].
//! [`document::memory::MemoryDocument`] implements it over in-memory page
//! text, so [`process_document`] and the composers run without a native
//! library.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    OverlayColor, PipelineConfig, PipelineConfigBuilder, SheetLayout, StampCorner, StampStyle,
};
pub use error::{BillRouteError, PageSkip};
pub use model::{
    Attribute, Batch, BatchOutput, BatchStats, BillRecord, Coordinates, DerivedDocument,
    EmployeeBundle, Field, MapPoint, SerialSource, SplitOutput,
};
pub use pipeline::stamp::{AnchorLocator, SerialLabelAnchor, TextAnchor};
pub use process::{
    compose_to_file, inspect, process_batch, process_batch_from_bytes, process_batch_sync,
    process_document, refilter_batch, split_to_dir,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, extract_stream_from_bytes, RecordStream};
