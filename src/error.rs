//! Error types for the bill-router library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BillRouteError`] — **Fatal**: the operation cannot proceed at all
//!   (bad input file, wrong password, invalid configuration, the output
//!   document could not be written). Returned as `Err(BillRouteError)` from
//!   the top-level `process*` / `compose*` functions. Nothing partial is
//!   produced.
//!
//! * [`PageSkip`] — **Non-fatal**: a single page was left out (owner name
//!   missing, page index beyond the source, raster failed) but every other
//!   page is fine. Skips are collected into the operation's result and
//!   counted in [`crate::model::BatchStats`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bill-router library.
///
/// Page-level problems use [`PageSkip`] and are reported alongside the
/// primary result rather than propagated here.
#[derive(Debug, Error)]
pub enum BillRouteError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document backend failed while building a derivative document.
    #[error("Document operation failed on page {page}: {detail}")]
    Document { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a derivative document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller stopped waiting before `path` was written; nothing was
    /// written there.
    #[error("Cancelled before writing '{path}'")]
    Cancelled { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Install pdfium system-wide.\n\
  • Build with the `auto-pdfium` feature to download a cached copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillRouteError {
    /// Shorthand for a backend failure on a 0-based page index.
    pub(crate) fn document(page_index: usize, detail: impl Into<String>) -> Self {
        BillRouteError::Document {
            page: page_index + 1,
            detail: detail.into(),
        }
    }
}

/// A non-fatal, per-page skip.
///
/// Page numbers are 1-based, matching what a reader sees in a PDF viewer.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageSkip {
    /// The owner name was absent or a null-like token ("NA", "-", …).
    #[error("Page {page}: owner name missing or null-like")]
    MissingIdentity { page: usize },

    /// The backend could not produce text for the page.
    #[error("Page {page}: text unavailable: {detail}")]
    TextUnavailable { page: usize, detail: String },

    /// A record points at a page the source document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    OutOfRange { page: usize, total: usize },

    /// Rasterising the page for a multi-up sheet failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },
}

impl PageSkip {
    /// The 1-based page number the skip refers to.
    pub fn page(&self) -> usize {
        match self {
            PageSkip::MissingIdentity { page }
            | PageSkip::TextUnavailable { page, .. }
            | PageSkip::OutOfRange { page, .. }
            | PageSkip::RenderFailed { page, .. } => *page,
        }
    }
}
