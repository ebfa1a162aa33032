//! Multi-up sheet geometry.
//!
//! A sheet is split into equal horizontal slots stacked top to bottom. Each
//! rasterised page is scaled to fit its slot with its aspect ratio intact
//! and centred both ways. Slot rectangles are in PDF user space
//! (bottom-left origin) so they can be handed straight to
//! [`crate::document::OutputDocument::add_raster_sheet`].

use super::stamp::DisplayStamp;
use crate::config::StampStyle;
use crate::document::{PageRotation, PageSize, TextOverlay};

/// Blank border around the whole sheet, in points.
pub const SHEET_MARGIN: f32 = 18.0;

/// Where one page image lands on a sheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Placement of an image of `image_w × image_h` in slot `slot` of `slots`.
///
/// Slot 0 is the top of the sheet.
pub fn slot_rect(sheet: PageSize, slots: usize, slot: usize, image_w: f32, image_h: f32) -> SlotRect {
    let slots = slots.max(1);
    let inner_w = sheet.width - 2.0 * SHEET_MARGIN;
    let slot_h = (sheet.height - 2.0 * SHEET_MARGIN) / slots as f32;
    let scale = if image_w > 0.0 && image_h > 0.0 {
        (inner_w / image_w).min(slot_h / image_h)
    } else {
        0.0
    };
    let width = image_w * scale;
    let height = image_h * scale;
    let slot_top = sheet.height - SHEET_MARGIN - slot as f32 * slot_h;
    let slot_bottom = slot_top - slot_h;
    SlotRect {
        x: (sheet.width - width) / 2.0,
        y: slot_bottom + (slot_h - height) / 2.0,
        width,
        height,
    }
}

/// Carry a stamp placed on a source page's display space onto the sheet
/// slot that page was scaled into.
///
/// `display_w`/`display_h` are the source page's displayed size.
pub fn stamp_on_slot(
    rect: &SlotRect,
    display_w: f32,
    display_h: f32,
    stamp: &DisplayStamp,
    text: &str,
    style: &StampStyle,
) -> TextOverlay {
    let sx = if display_w > 0.0 { rect.width / display_w } else { 0.0 };
    let sy = if display_h > 0.0 { rect.height / display_h } else { 0.0 };
    TextOverlay {
        text: text.to_string(),
        x: rect.x + stamp.x * sx,
        y: rect.y + (display_h - stamp.baseline) * sy,
        font_size: stamp.font_size * sx,
        color: style.color.rgb(),
        rotation: PageRotation::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-2
    }

    #[test]
    fn two_up_slots_stack_top_to_bottom() {
        let a4 = PageSize::A4;
        let top = slot_rect(a4, 2, 0, 595.0, 842.0);
        let bottom = slot_rect(a4, 2, 1, 595.0, 842.0);
        assert!(top.y > bottom.y);
        // Height-bound: slot is (842 − 36) / 2 = 403 tall.
        assert!(approx(top.height, 403.0), "got {top:?}");
        assert!(approx(top.width, 595.0 * 403.0 / 842.0));
        assert!(approx(bottom.y, SHEET_MARGIN));
    }

    #[test]
    fn images_are_centred_horizontally() {
        let r = slot_rect(PageSize::A4, 3, 1, 612.0, 792.0);
        assert!(approx(r.x * 2.0 + r.width, PageSize::A4.width));
    }

    #[test]
    fn aspect_ratio_preserved() {
        let r = slot_rect(PageSize::A4, 3, 2, 842.0, 595.0);
        assert!(approx(r.width / r.height, 842.0 / 595.0));
    }

    #[test]
    fn wide_image_is_width_bound_and_vertically_centred() {
        let r = slot_rect(PageSize::A4, 1, 0, 2000.0, 100.0);
        assert!(approx(r.width, 595.0 - 2.0 * SHEET_MARGIN));
        let slot_mid = PageSize::A4.height / 2.0;
        assert!(approx(r.y + r.height / 2.0, slot_mid));
    }

    #[test]
    fn stamp_scales_with_slot() {
        let rect = SlotRect {
            x: 100.0,
            y: 50.0,
            width: 300.0,
            height: 400.0,
        };
        let stamp = DisplayStamp {
            x: 60.0,
            baseline: 80.0,
            font_size: 48.0,
            anchored: false,
        };
        let o = stamp_on_slot(&rect, 600.0, 800.0, &stamp, "N3", &StampStyle::default());
        assert!(approx(o.x, 130.0));
        assert!(approx(o.y, 50.0 + 720.0 * 0.5));
        assert!(approx(o.font_size, 24.0));
        assert_eq!(o.text, "N3");
    }
}
