//! Document backend: the only place the pipeline touches PDF bytes.
//!
//! The pipeline is written against two traits:
//!
//! * [`SourceDocument`] — a read-only, random-access view of the submitted
//!   document: page count, page text, positioned text spans, and a 1x raster.
//! * [`OutputDocument`] — a freshly created derivative document that can
//!   receive copied pages, text overlays and raster sheets, then be saved.
//!
//! Two backends ship with the crate:
//!
//! * [`pdfium`] — real PDFs via `pdfium-render`.
//! * [`memory`] — pages held in memory, used by tests and by callers that
//!   already have page text from elsewhere.
//!
//! ## Coordinate conventions
//!
//! [`BBox`] values are in *unrotated* page space with a **top-left** origin
//! (y grows downward), which is what layout heuristics expect. Overlay and
//! raster positions ([`TextOverlay`], [`RasterPlacement`]) are in native PDF
//! user space: **bottom-left** origin, unrotated.

pub mod memory;
pub mod pdfium;

use crate::error::BillRouteError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Write;

// ── Layout types ─────────────────────────────────────────────────────────

/// Axis-aligned box, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Page rotation as stored in the PDF (`/Rotate`), clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageRotation {
    #[default]
    None,
    Degrees90,
    Degrees180,
    Degrees270,
}

impl PageRotation {
    pub fn degrees(self) -> u16 {
        match self {
            PageRotation::None => 0,
            PageRotation::Degrees90 => 90,
            PageRotation::Degrees180 => 180,
            PageRotation::Degrees270 => 270,
        }
    }

    /// Normalises any multiple of 90 (negative values included).
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => PageRotation::Degrees90,
            180 => PageRotation::Degrees180,
            270 => PageRotation::Degrees270,
            _ => PageRotation::None,
        }
    }

    /// True for 90 and 270, where displayed width and height swap.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, PageRotation::Degrees90 | PageRotation::Degrees270)
    }
}

/// One positioned piece of page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub bbox: BBox,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Positioned text for a page plus the geometry needed to interpret it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageLayout {
    /// Unrotated page width in points.
    pub width: f32,
    /// Unrotated page height in points.
    pub height: f32,
    pub rotation: PageRotation,
    pub spans: Vec<TextSpan>,
}

impl PageLayout {
    /// Width and height as a viewer displays the page.
    pub fn display_size(&self) -> (f32, f32) {
        if self.rotation.is_quarter_turn() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// Page size in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// ISO A4 portrait.
    pub const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };
}

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A run of text to burn onto a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    /// Baseline origin in PDF user space (bottom-left origin).
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: Rgb,
    /// Counter-clockwise rotation applied so the text reads upright on a
    /// page displayed with this `/Rotate`.
    pub rotation: PageRotation,
}

/// An image placed on a raster sheet. `x`/`y` is the image's bottom-left
/// corner in PDF user space.
#[derive(Debug, Clone)]
pub struct RasterPlacement {
    pub image: DynamicImage,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

// ── Traits ───────────────────────────────────────────────────────────────

/// Read-only, random-access view of a source document.
///
/// Page indices are 0-based. Implementations must never mutate the
/// underlying document; every composition call creates its own output via
/// [`SourceDocument::new_output`].
pub trait SourceDocument {
    type Output<'s>: OutputDocument
    where
        Self: 's;

    fn page_count(&self) -> usize;

    /// Plain text of a page in reading order.
    fn page_text(&self, index: usize) -> Result<String, BillRouteError>;

    /// Positioned text spans, page size and rotation.
    fn page_layout(&self, index: usize) -> Result<PageLayout, BillRouteError>;

    /// Rasterise a page at 1x scale (one pixel per point).
    fn render_page(&self, index: usize) -> Result<DynamicImage, BillRouteError>;

    /// Create an empty derivative document that can copy pages from `self`.
    fn new_output(&self) -> Result<Self::Output<'_>, BillRouteError>;
}

/// A derivative document under construction.
pub trait OutputDocument {
    /// Append a copy of source page `source_index`; returns the new page's index.
    fn import_page(&mut self, source_index: usize) -> Result<usize, BillRouteError>;

    /// Layout of an output page, used to find stamp anchors on copied pages.
    fn page_layout(&self, index: usize) -> Result<PageLayout, BillRouteError>;

    fn overlay_text(&mut self, index: usize, overlay: &TextOverlay) -> Result<(), BillRouteError>;

    /// Append a new page of `size` carrying the given images; returns its index.
    fn add_raster_sheet(
        &mut self,
        size: PageSize,
        placements: &[RasterPlacement],
    ) -> Result<usize, BillRouteError>;

    fn page_count(&self) -> usize;

    fn save_to<W: Write>(&self, sink: &mut W) -> Result<(), BillRouteError>;

    fn to_bytes(&self) -> Result<Vec<u8>, BillRouteError> {
        let mut buf = Vec::new();
        self.save_to(&mut buf)?;
        Ok(buf)
    }
}
