//! pdfium-render backend.
//!
//! pdfium keeps thread-local state and is not async-safe, so every function
//! here is blocking; the async facade in [`crate::process`] runs them inside
//! `tokio::task::spawn_blocking`.
//!
//! ## Binding order
//!
//! 1. `PDFIUM_LIB_PATH` — an explicit library path.
//! 2. The system library (`libpdfium.so` / `.dylib` / `pdfium.dll` on the
//!    loader path).
//! 3. With the `auto-pdfium` feature, the cached download managed by
//!    `pdfium-auto`. With `bundled`, the library embedded at compile time is
//!    extracted into that cache first.

use super::{
    BBox, OutputDocument, PageLayout, PageRotation, PageSize, RasterPlacement, SourceDocument,
    TextOverlay, TextSpan,
};
use crate::error::BillRouteError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind to a pdfium library, trying each source in turn.
pub fn bind_pdfium() -> Result<Pdfium, BillRouteError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path);
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| BillRouteError::PdfiumBindingFailed(format!("{path}: {e:?}")));
        }
    }

    let system_err = match Pdfium::bind_to_system_library() {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => format!("{e:?}"),
    };

    // The embedded library is written to the cache once; the bind below
    // then finds it there without downloading.
    #[cfg(feature = "bundled")]
    {
        let extracted = pdfium_auto::ensure_pdfium_bundled()
            .map_err(|e| BillRouteError::PdfiumBindingFailed(format!("bundled pdfium: {e}")))?;
        debug!("Bundled pdfium ready: {:?}", extracted);
    }

    #[cfg(feature = "auto-pdfium")]
    {
        debug!("System pdfium unavailable ({system_err}); trying cached download");
        pdfium_auto::bind_pdfium_silent()
            .map_err(|e| BillRouteError::PdfiumBindingFailed(e.to_string()))
    }

    #[cfg(not(feature = "auto-pdfium"))]
    Err(BillRouteError::PdfiumBindingFailed(system_err))
}

/// Classify a pdfium load failure the way a user needs to hear about it.
fn open_error(path: &Path, password: Option<&str>, err: PdfiumError) -> BillRouteError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            BillRouteError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            BillRouteError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        BillRouteError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn page_index(index: usize) -> Result<PdfPageIndex, BillRouteError> {
    PdfPageIndex::try_from(index)
        .map_err(|_| BillRouteError::document(index, "page index exceeds pdfium range"))
}

fn backend_error(index: usize, err: PdfiumError) -> BillRouteError {
    BillRouteError::document(index, format!("{:?}", err))
}

/// Read the layout of any pdfium page.
///
/// pdfium reports the *displayed* page size (width and height swap for 90/270
/// rotations) but text bounds in unrotated user space, so the size is swapped
/// back before spans are flipped to a top-left origin.
fn read_layout(page: &PdfPage, index: usize) -> Result<PageLayout, BillRouteError> {
    let rotation = match page.rotation() {
        Ok(PdfPageRenderRotation::Degrees90) => PageRotation::Degrees90,
        Ok(PdfPageRenderRotation::Degrees180) => PageRotation::Degrees180,
        Ok(PdfPageRenderRotation::Degrees270) => PageRotation::Degrees270,
        _ => PageRotation::None,
    };
    let (shown_w, shown_h) = (page.width().value, page.height().value);
    let (width, height) = if rotation.is_quarter_turn() {
        (shown_h, shown_w)
    } else {
        (shown_w, shown_h)
    };

    let text = page.text().map_err(|e| backend_error(index, e))?;
    let spans = text
        .segments()
        .iter()
        .filter_map(|segment| {
            let content = segment.text();
            let content = content.trim();
            if content.is_empty() {
                return None;
            }
            let bounds = segment.bounds();
            Some(TextSpan::new(
                content,
                BBox::new(
                    bounds.left().value,
                    height - bounds.top().value,
                    bounds.right().value,
                    height - bounds.bottom().value,
                ),
            ))
        })
        .collect();

    Ok(PageLayout {
        width,
        height,
        rotation,
        spans,
    })
}

// ── Source ───────────────────────────────────────────────────────────────

/// A source PDF opened read-only through pdfium.
pub struct PdfiumSource<'a> {
    pdfium: &'a Pdfium,
    document: PdfDocument<'a>,
    path: PathBuf,
}

impl<'a> PdfiumSource<'a> {
    /// Open a PDF file.
    pub fn open_file(
        pdfium: &'a Pdfium,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Self, BillRouteError> {
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| open_error(path, password, e))?;
        info!(
            "PDF loaded: {} ({} pages)",
            path.display(),
            document.pages().len()
        );
        Ok(Self {
            pdfium,
            document,
            path: path.to_path_buf(),
        })
    }

    /// Open a PDF held in memory.
    pub fn open_bytes(
        pdfium: &'a Pdfium,
        bytes: &'a [u8],
        password: Option<&'a str>,
    ) -> Result<Self, BillRouteError> {
        let path = PathBuf::from("<memory>");
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| open_error(&path, password, e))?;
        Ok(Self {
            pdfium,
            document,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page(&self, index: usize) -> Result<PdfPage<'_>, BillRouteError> {
        self.document
            .pages()
            .get(page_index(index)?)
            .map_err(|e| backend_error(index, e))
    }
}

impl<'a> SourceDocument for PdfiumSource<'a> {
    type Output<'s>
        = PdfiumOutput<'a, 's>
    where
        Self: 's;

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&self, index: usize) -> Result<String, BillRouteError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| backend_error(index, e))?;
        Ok(text.all())
    }

    fn page_layout(&self, index: usize) -> Result<PageLayout, BillRouteError> {
        read_layout(&self.page(index)?, index)
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, BillRouteError> {
        let page = self.page(index)?;
        let config = PdfRenderConfig::new().scale_page_by_factor(1.0);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| backend_error(index, e))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn new_output(&self) -> Result<PdfiumOutput<'a, '_>, BillRouteError> {
        let document = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| BillRouteError::Internal(format!("create_new_pdf: {:?}", e)))?;
        Ok(PdfiumOutput {
            source: self,
            document,
        })
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// A derivative PDF that copies pages from a [`PdfiumSource`].
pub struct PdfiumOutput<'a, 's> {
    source: &'s PdfiumSource<'a>,
    document: PdfDocument<'a>,
}

impl PdfiumOutput<'_, '_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, BillRouteError> {
        self.document
            .pages()
            .get(page_index(index)?)
            .map_err(|e| backend_error(index, e))
    }
}

impl OutputDocument for PdfiumOutput<'_, '_> {
    fn import_page(&mut self, source_index: usize) -> Result<usize, BillRouteError> {
        let destination = self.document.pages().len();
        self.document
            .pages_mut()
            .copy_page_from_document(
                &self.source.document,
                page_index(source_index)?,
                destination,
            )
            .map_err(|e| backend_error(source_index, e))?;
        Ok(destination as usize)
    }

    fn page_layout(&self, index: usize) -> Result<PageLayout, BillRouteError> {
        read_layout(&self.page(index)?, index)
    }

    fn overlay_text(&mut self, index: usize, overlay: &TextOverlay) -> Result<(), BillRouteError> {
        let font = self.document.fonts_mut().helvetica_bold();
        let mut object = PdfPageTextObject::new(
            &self.document,
            &overlay.text,
            font,
            PdfPoints::new(overlay.font_size),
        )
        .map_err(|e| backend_error(index, e))?;

        let c = overlay.color;
        object
            .set_fill_color(PdfColor::new(c.r, c.g, c.b, 255))
            .map_err(|e| backend_error(index, e))?;
        let degrees = overlay.rotation.degrees();
        if degrees != 0 {
            object
                .rotate_counter_clockwise_degrees(degrees as f32)
                .map_err(|e| backend_error(index, e))?;
        }
        object
            .translate(PdfPoints::new(overlay.x), PdfPoints::new(overlay.y))
            .map_err(|e| backend_error(index, e))?;

        let mut page = self.page(index)?;
        page.objects_mut()
            .add_text_object(object)
            .map_err(|e| backend_error(index, e))?;
        Ok(())
    }

    fn add_raster_sheet(
        &mut self,
        size: PageSize,
        placements: &[RasterPlacement],
    ) -> Result<usize, BillRouteError> {
        let index = self.document.pages().len() as usize;
        let mut page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(size.width),
                PdfPoints::new(size.height),
            ))
            .map_err(|e| backend_error(index, e))?;

        for placement in placements {
            page.objects_mut()
                .create_image_object(
                    PdfPoints::new(placement.x),
                    PdfPoints::new(placement.y),
                    &placement.image,
                    Some(PdfPoints::new(placement.width)),
                    Some(PdfPoints::new(placement.height)),
                )
                .map_err(|e| backend_error(index, e))?;
        }
        Ok(index)
    }

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn save_to<W: Write>(&self, sink: &mut W) -> Result<(), BillRouteError> {
        let bytes = self
            .document
            .save_to_bytes()
            .map_err(|e| BillRouteError::Internal(format!("save_to_bytes: {:?}", e)))?;
        sink.write_all(&bytes)
            .map_err(|e| BillRouteError::Internal(format!("write output: {e}")))
    }
}
