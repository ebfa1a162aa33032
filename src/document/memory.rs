//! In-memory document backend.
//!
//! Pages are plain structs; "saving" an output document serialises a JSON
//! [`MemoryDump`] describing every page, its source index and the overlays
//! burned onto it. Read it back with [`read_dump`] to inspect what a
//! composition produced.

use super::{
    OutputDocument, PageLayout, PageSize, RasterPlacement, SourceDocument, TextOverlay,
};
use crate::error::BillRouteError;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One source page.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    pub text: String,
    pub layout: PageLayout,
    /// When set, reading this page's layout fails with this detail.
    pub layout_failure: Option<String>,
}

impl MemoryPage {
    /// A text-only US-Letter page with no positioned spans.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            layout: PageLayout {
                width: 612.0,
                height: 792.0,
                ..PageLayout::default()
            },
            layout_failure: None,
        }
    }

    /// Make layout reads fail, as for a damaged content stream.
    pub fn with_layout_failure(mut self, detail: impl Into<String>) -> Self {
        self.layout_failure = Some(detail.into());
        self
    }

    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// A source document held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pages: Vec<MemoryPage>,
}

impl MemoryDocument {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self { pages }
    }

    /// One text-only page per entry.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(MemoryPage::from_text).collect())
    }

    fn page(&self, index: usize) -> Result<&MemoryPage, BillRouteError> {
        self.pages.get(index).ok_or_else(|| {
            BillRouteError::document(index, format!("no such page (have {})", self.pages.len()))
        })
    }
}

impl SourceDocument for MemoryDocument {
    type Output<'s> = MemoryOutput<'s>;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, BillRouteError> {
        Ok(self.page(index)?.text.clone())
    }

    fn page_layout(&self, index: usize) -> Result<PageLayout, BillRouteError> {
        let page = self.page(index)?;
        match &page.layout_failure {
            Some(detail) => Err(BillRouteError::document(index, detail.clone())),
            None => Ok(page.layout.clone()),
        }
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, BillRouteError> {
        let (w, h) = self.page(index)?.layout.display_size();
        let img = RgbaImage::from_pixel(
            w.max(1.0) as u32,
            h.max(1.0) as u32,
            Rgba([255, 255, 255, 255]),
        );
        Ok(DynamicImage::ImageRgba8(img))
    }

    fn new_output(&self) -> Result<MemoryOutput<'_>, BillRouteError> {
        Ok(MemoryOutput {
            source: self,
            pages: Vec::new(),
        })
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// Where an output page came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DumpPageKind {
    Imported { source_index: usize },
    Sheet { size: PageSize, images: Vec<DumpImage> },
}

/// Size and position of an image on a raster sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpImage {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpPage {
    pub kind: DumpPageKind,
    pub overlays: Vec<TextOverlay>,
}

/// Saved form of a [`MemoryOutput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDump {
    pub pages: Vec<DumpPage>,
}

impl MemoryDump {
    /// Text of every overlay, page by page.
    pub fn stamps(&self) -> Vec<Vec<String>> {
        self.pages
            .iter()
            .map(|p| p.overlays.iter().map(|o| o.text.clone()).collect())
            .collect()
    }
}

/// Parse the bytes written by [`MemoryOutput::save_to`].
pub fn read_dump(bytes: &[u8]) -> Result<MemoryDump, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Output document for [`MemoryDocument`].
#[derive(Debug)]
pub struct MemoryOutput<'s> {
    source: &'s MemoryDocument,
    pages: Vec<DumpPage>,
}

impl MemoryOutput<'_> {
    pub fn pages(&self) -> &[DumpPage] {
        &self.pages
    }

    fn page_mut(&mut self, index: usize) -> Result<&mut DumpPage, BillRouteError> {
        self.pages
            .get_mut(index)
            .ok_or_else(|| BillRouteError::document(index, "no such output page"))
    }
}

impl OutputDocument for MemoryOutput<'_> {
    fn import_page(&mut self, source_index: usize) -> Result<usize, BillRouteError> {
        self.source.page(source_index)?;
        self.pages.push(DumpPage {
            kind: DumpPageKind::Imported { source_index },
            overlays: Vec::new(),
        });
        Ok(self.pages.len() - 1)
    }

    fn page_layout(&self, index: usize) -> Result<PageLayout, BillRouteError> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| BillRouteError::document(index, "no such output page"))?;
        match &page.kind {
            DumpPageKind::Imported { source_index } => self.source.page_layout(*source_index),
            DumpPageKind::Sheet { size, .. } => Ok(PageLayout {
                width: size.width,
                height: size.height,
                ..PageLayout::default()
            }),
        }
    }

    fn overlay_text(&mut self, index: usize, overlay: &TextOverlay) -> Result<(), BillRouteError> {
        self.page_mut(index)?.overlays.push(overlay.clone());
        Ok(())
    }

    fn add_raster_sheet(
        &mut self,
        size: PageSize,
        placements: &[RasterPlacement],
    ) -> Result<usize, BillRouteError> {
        let images = placements
            .iter()
            .map(|p| DumpImage {
                pixel_width: p.image.width(),
                pixel_height: p.image.height(),
                x: p.x,
                y: p.y,
                width: p.width,
                height: p.height,
            })
            .collect();
        self.pages.push(DumpPage {
            kind: DumpPageKind::Sheet { size, images },
            overlays: Vec::new(),
        });
        Ok(self.pages.len() - 1)
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save_to<W: Write>(&self, sink: &mut W) -> Result<(), BillRouteError> {
        let dump = MemoryDump {
            pages: self.pages.clone(),
        };
        serde_json::to_writer(sink, &dump)
            .map_err(|e| BillRouteError::Internal(format!("memory dump: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageRotation, Rgb};

    #[test]
    fn import_rejects_missing_page() {
        let doc = MemoryDocument::from_texts(["a"]);
        let mut out = doc.new_output().unwrap();
        assert!(out.import_page(0).is_ok());
        assert!(out.import_page(1).is_err());
        assert_eq!(out.page_count(), 1);
    }

    #[test]
    fn dump_round_trips_overlays() {
        let doc = MemoryDocument::from_texts(["a", "b"]);
        let mut out = doc.new_output().unwrap();
        let idx = out.import_page(1).unwrap();
        out.overlay_text(
            idx,
            &TextOverlay {
                text: "N7".into(),
                x: 10.0,
                y: 20.0,
                font_size: 48.0,
                color: Rgb { r: 255, g: 0, b: 0 },
                rotation: PageRotation::None,
            },
        )
        .unwrap();
        let dump = read_dump(&out.to_bytes().unwrap()).unwrap();
        assert_eq!(dump.stamps(), vec![vec!["N7".to_string()]]);
        assert_eq!(
            dump.pages[0].kind,
            DumpPageKind::Imported { source_index: 1 }
        );
    }

    #[test]
    fn render_is_one_pixel_per_point() {
        let doc = MemoryDocument::from_texts(["a"]);
        let img = doc.render_page(0).unwrap();
        assert_eq!((img.width(), img.height()), (612, 792));
    }
}
