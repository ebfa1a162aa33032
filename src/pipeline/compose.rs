//! Document composer: re-emit source pages in route order with a serial
//! stamp on each, either as one document or split into per-worker bundles.
//!
//! Composition always writes into a fresh output document; the source is
//! only read. A record pointing past the end of the source is skipped and
//! counted, as is a page that cannot be rasterised or measured for a
//! multi-up sheet. Any backend failure while building the output aborts the
//! whole call, so a partially built document is never returned.

use super::sheet;
use super::stamp::{self, AnchorLocator, SerialLabelAnchor};
use crate::config::{PipelineConfig, SheetLayout};
use crate::document::{
    OutputDocument, PageLayout, PageSize, RasterPlacement, SourceDocument, TextOverlay,
};
use crate::error::{BillRouteError, PageSkip};
use crate::model::{BillRecord, DerivedDocument, EmployeeBundle, SplitOutput};
use image::DynamicImage;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Target sheet for multi-up output.
pub const SHEET_SIZE: PageSize = PageSize::A4;

static DEFAULT_LOCATOR: SerialLabelAnchor = SerialLabelAnchor;

fn locator(config: &PipelineConfig) -> &dyn AnchorLocator {
    match &config.anchor_locator {
        Some(custom) => custom.as_ref(),
        None => &DEFAULT_LOCATOR,
    }
}

/// Copy each record's source page into a new document, in the given order,
/// and stamp its display serial.
pub fn reorder_and_stamp<S: SourceDocument>(
    source: &S,
    records: &[BillRecord],
    config: &PipelineConfig,
) -> Result<DerivedDocument, BillRouteError> {
    let total = source.page_count();
    let mut skipped = Vec::new();
    let placeable: Vec<&BillRecord> = records
        .iter()
        .filter(|r| {
            if r.page_index < total {
                true
            } else {
                warn!(
                    "Skipping page {} (out of range, total={})",
                    r.page_number, total
                );
                skipped.push(PageSkip::OutOfRange {
                    page: r.page_index + 1,
                    total,
                });
                false
            }
        })
        .collect();

    let mut out = source.new_output()?;
    let placed = match config.sheet_layout {
        SheetLayout::Single => stamp_pages(&mut out, &placeable, config)?,
        layout => compose_sheets(
            source,
            &mut out,
            &placeable,
            layout.pages_per_sheet(),
            config,
            &mut skipped,
        )?,
    };

    let bytes = out.to_bytes()?;
    info!(
        records = placed,
        pages = out.page_count(),
        skipped = skipped.len(),
        "Composed document"
    );
    Ok(DerivedDocument {
        page_count: out.page_count(),
        record_count: placed,
        skipped,
        bytes,
    })
}

/// One vector page per record.
fn stamp_pages<O: OutputDocument>(
    out: &mut O,
    records: &[&BillRecord],
    config: &PipelineConfig,
) -> Result<usize, BillRouteError> {
    let locator = locator(config);
    for record in records {
        let index = out.import_page(record.page_index)?;
        let layout = out.page_layout(index)?;
        let overlay = stamp::page_overlay(&layout, &record.display_serial, &config.stamp, locator);
        debug!(
            page = record.page_number,
            serial = %record.display_serial,
            x = overlay.x,
            y = overlay.y,
            "Stamping page"
        );
        out.overlay_text(index, &overlay)?;
    }
    Ok(records.len())
}

struct RenderedPage<'r> {
    record: &'r BillRecord,
    image: DynamicImage,
    layout: PageLayout,
}

/// Rasterise pages and stack `per_sheet` of them on each output sheet.
fn compose_sheets<S: SourceDocument, O: OutputDocument>(
    source: &S,
    out: &mut O,
    records: &[&BillRecord],
    per_sheet: usize,
    config: &PipelineConfig,
    skipped: &mut Vec<PageSkip>,
) -> Result<usize, BillRouteError> {
    let locator = locator(config);
    let mut rendered: Vec<RenderedPage<'_>> = Vec::with_capacity(records.len());
    for &record in records {
        let page = source
            .render_page(record.page_index)
            .and_then(|image| {
                source
                    .page_layout(record.page_index)
                    .map(|layout| (image, layout))
            });
        match page {
            Ok((image, layout)) => rendered.push(RenderedPage {
                record,
                image,
                layout,
            }),
            Err(e) => {
                warn!("Failed to rasterise or measure page {}: {}", record.page_number, e);
                skipped.push(PageSkip::RenderFailed {
                    page: record.page_number,
                    detail: e.to_string(),
                });
            }
        }
    }

    for chunk in rendered.chunks(per_sheet) {
        let mut placements = Vec::with_capacity(chunk.len());
        let mut overlays: Vec<TextOverlay> = Vec::with_capacity(chunk.len());
        for (slot, page) in chunk.iter().enumerate() {
            let rect = sheet::slot_rect(
                SHEET_SIZE,
                per_sheet,
                slot,
                page.image.width() as f32,
                page.image.height() as f32,
            );
            let (dw, dh) = page.layout.display_size();
            let serial = &page.record.display_serial;
            let placed = stamp::place_stamp(&page.layout, serial, &config.stamp, locator);
            overlays.push(sheet::stamp_on_slot(&rect, dw, dh, &placed, serial, &config.stamp));
            placements.push(RasterPlacement {
                image: page.image.clone(),
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        }
        let index = out.add_raster_sheet(SHEET_SIZE, &placements)?;
        for overlay in &overlays {
            out.overlay_text(index, overlay)?;
        }
    }
    Ok(rendered.len())
}

/// Exactly `employees` contiguous ranges of `ceil(total / employees)`
/// records. The last non-empty range takes what is left; employees past the
/// end of the records get an empty range at `total`.
pub fn employee_ranges(total: usize, employees: usize) -> Vec<Range<usize>> {
    let employees = employees.max(1);
    let per = total.div_ceil(employees);
    (0..employees)
        .map(|i| (i * per).min(total)..((i + 1) * per).min(total))
        .collect()
}

/// Split the final order across `config.employee_count` workers and compose
/// one stamped document per worker.
pub fn split_by_employee<S: SourceDocument>(
    source: &S,
    records: &[BillRecord],
    config: &PipelineConfig,
) -> Result<SplitOutput, BillRouteError> {
    let ranges = employee_ranges(records.len(), config.employee_count);
    let records_per_employee = records.len().div_ceil(config.employee_count.max(1));

    let mut bundles = Vec::with_capacity(ranges.len());
    for (i, range) in ranges.into_iter().enumerate() {
        let slice = &records[range.clone()];
        let document = reorder_and_stamp(source, slice, config)?;
        let (start_position, end_position) = if range.is_empty() {
            (0, 0)
        } else {
            (range.start + 1, range.end)
        };
        let first_serial = slice
            .first()
            .map(|r| r.display_serial.clone())
            .unwrap_or_default();
        let last_serial = slice
            .last()
            .map(|r| r.display_serial.clone())
            .unwrap_or_default();
        debug!(
            employee = i + 1,
            records = slice.len(),
            "Bundle {} - {}",
            first_serial,
            last_serial
        );
        bundles.push(EmployeeBundle {
            employee_number: i + 1,
            first_serial,
            last_serial,
            start_position,
            end_position,
            record_count: slice.len(),
            document,
        });
    }

    let out_of_range_pages = bundles.iter().map(|b| b.document.out_of_range_pages()).sum();

    Ok(SplitOutput {
        total_records: records.len(),
        records_per_employee,
        bundles,
        out_of_range_pages,
    })
}
