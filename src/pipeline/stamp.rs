//! Serial stamp placement.
//!
//! A stamp is positioned in *display space*: the page as a viewer shows it
//! after applying `/Rotate`, with a top-left origin. Placement is then
//! mapped back to unrotated PDF user space, and the text is counter-rotated
//! by the page rotation so it reads upright.
//!
//! Where the stamp goes:
//!
//! 1. If an [`AnchorLocator`] finds a label on the page, the stamp sits just
//!    above the label, left-aligned with it (below it when there is no room
//!    above).
//! 2. Otherwise it goes in the configured [`StampCorner`], inset by a fixed
//!    fraction of the page's displayed size.

use super::fields::SERIAL_LABEL;
use crate::config::{StampCorner, StampStyle};
use crate::document::{BBox, PageLayout, PageRotation, TextOverlay};

/// Corner inset as a fraction of the displayed page width/height.
pub const CORNER_MARGIN_FRACTION: f32 = 0.05;

/// Gap between an anchor label and the stamp, in points.
pub const ANCHOR_GAP: f32 = 6.0;

/// Average advance of a bold digit, in ems.
pub const GLYPH_WIDTH_EM: f32 = 0.6;

/// Finds the label a stamp should be placed next to.
///
/// Returned boxes are in unrotated page space with a top-left origin, as in
/// [`PageLayout::spans`].
pub trait AnchorLocator: Send + Sync {
    fn locate(&self, layout: &PageLayout) -> Option<BBox>;
}

/// Anchors on the first span carrying the bill serial label.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialLabelAnchor;

impl AnchorLocator for SerialLabelAnchor {
    fn locate(&self, layout: &PageLayout) -> Option<BBox> {
        layout
            .spans
            .iter()
            .find(|s| SERIAL_LABEL.is_match(&s.text))
            .map(|s| s.bbox)
    }
}

/// Anchors on the first span containing a fixed piece of text.
#[derive(Debug, Clone)]
pub struct TextAnchor {
    needle: String,
}

impl TextAnchor {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into().to_lowercase(),
        }
    }
}

impl AnchorLocator for TextAnchor {
    fn locate(&self, layout: &PageLayout) -> Option<BBox> {
        layout
            .spans
            .iter()
            .find(|s| s.text.to_lowercase().contains(&self.needle))
            .map(|s| s.bbox)
    }
}

/// A stamp in display space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayStamp {
    /// Left edge of the text.
    pub x: f32,
    /// Baseline, measured down from the top of the displayed page.
    pub baseline: f32,
    pub font_size: f32,
    /// True when placed from an anchor rather than a corner.
    pub anchored: bool,
}

/// Estimated rendered width of `text`.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * GLYPH_WIDTH_EM * font_size
}

/// Map an unrotated top-left point to display space.
pub fn unrotated_to_display(layout: &PageLayout, ux: f32, uy: f32) -> (f32, f32) {
    let (w, h) = (layout.width, layout.height);
    match layout.rotation {
        PageRotation::None => (ux, uy),
        PageRotation::Degrees90 => (h - uy, ux),
        PageRotation::Degrees180 => (w - ux, h - uy),
        PageRotation::Degrees270 => (uy, w - ux),
    }
}

/// Map a display-space point back to unrotated top-left space.
pub fn display_to_unrotated(layout: &PageLayout, dx: f32, dy: f32) -> (f32, f32) {
    let (w, h) = (layout.width, layout.height);
    match layout.rotation {
        PageRotation::None => (dx, dy),
        PageRotation::Degrees90 => (dy, h - dx),
        PageRotation::Degrees180 => (w - dx, h - dy),
        PageRotation::Degrees270 => (w - dy, dx),
    }
}

/// An unrotated box as it appears on the displayed page.
pub fn box_to_display(layout: &PageLayout, bbox: BBox) -> BBox {
    let (ax, ay) = unrotated_to_display(layout, bbox.x0, bbox.y0);
    let (bx, by) = unrotated_to_display(layout, bbox.x1, bbox.y1);
    BBox::new(ax.min(bx), ay.min(by), ax.max(bx), ay.max(by))
}

/// Decide where `text` goes on a page.
pub fn place_stamp(
    layout: &PageLayout,
    text: &str,
    style: &StampStyle,
    locator: &dyn AnchorLocator,
) -> DisplayStamp {
    let (dw, dh) = layout.display_size();
    let font_size = style.font_size as f32;
    let width = text_width(text, font_size);
    let mx = dw * CORNER_MARGIN_FRACTION;
    let my = dh * CORNER_MARGIN_FRACTION;

    if let Some(anchor) = locator.locate(layout) {
        let a = box_to_display(layout, anchor);
        let above = a.y0 - ANCHOR_GAP;
        let baseline = if above - font_size >= 0.0 {
            above
        } else {
            (a.y1 + ANCHOR_GAP + font_size).min(dh)
        };
        let max_x = (dw - mx - width).max(0.0);
        return DisplayStamp {
            x: a.x0.clamp(0.0, max_x),
            baseline,
            font_size,
            anchored: true,
        };
    }

    let left = mx;
    let right = (dw - mx - width).max(0.0);
    let top = my + font_size;
    let bottom = dh - my;
    let (x, baseline) = match style.corner {
        StampCorner::TopLeft => (left, top),
        StampCorner::TopRight => (right, top),
        StampCorner::BottomLeft => (left, bottom),
        StampCorner::BottomRight => (right, bottom),
    };
    DisplayStamp {
        x,
        baseline,
        font_size,
        anchored: false,
    }
}

/// Convert a display-space stamp to a user-space overlay on the same page.
pub fn to_page_overlay(
    layout: &PageLayout,
    stamp: &DisplayStamp,
    text: &str,
    style: &StampStyle,
) -> TextOverlay {
    let (ux, uy) = display_to_unrotated(layout, stamp.x, stamp.baseline);
    TextOverlay {
        text: text.to_string(),
        x: ux,
        y: layout.height - uy,
        font_size: stamp.font_size,
        color: style.color.rgb(),
        rotation: layout.rotation,
    }
}

/// Place and convert in one step.
pub fn page_overlay(
    layout: &PageLayout,
    text: &str,
    style: &StampStyle,
    locator: &dyn AnchorLocator,
) -> TextOverlay {
    let stamp = place_stamp(layout, text, style, locator);
    to_page_overlay(layout, &stamp, text, style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayColor;
    use crate::document::TextSpan;

    fn page(rotation: PageRotation, spans: Vec<TextSpan>) -> PageLayout {
        PageLayout {
            width: 600.0,
            height: 800.0,
            rotation,
            spans,
        }
    }

    fn close(actual: (f32, f32), expected: (f32, f32)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-3 && (actual.1 - expected.1).abs() < 1e-3,
            "got {actual:?}, expected {expected:?}"
        );
    }

    fn style(corner: StampCorner) -> StampStyle {
        StampStyle {
            font_size: 20,
            color: OverlayColor::Blue,
            corner,
        }
    }

    #[test]
    fn rotation_mapping_round_trips() {
        for deg in [0, 90, 180, 270] {
            let l = page(PageRotation::from_degrees(deg), vec![]);
            let (dx, dy) = unrotated_to_display(&l, 123.0, 456.0);
            let (ux, uy) = display_to_unrotated(&l, dx, dy);
            assert!((ux - 123.0).abs() < 1e-3 && (uy - 456.0).abs() < 1e-3, "rotation {deg}");
        }
    }

    #[test]
    fn quarter_turn_moves_top_left_to_top_right() {
        let l = page(PageRotation::Degrees90, vec![]);
        assert_eq!(unrotated_to_display(&l, 0.0, 0.0), (800.0, 0.0));
        assert_eq!(unrotated_to_display(&l, 0.0, 800.0), (0.0, 0.0));
    }

    #[test]
    fn top_right_corner_on_upright_page() {
        let l = page(PageRotation::None, vec![]);
        let o = page_overlay(&l, "12", &style(StampCorner::TopRight), &SerialLabelAnchor);
        // width = 2 × 0.6 × 20 = 24; margins 30 × 40
        close((o.x, o.y), (546.0, 740.0));
        assert_eq!(o.rotation, PageRotation::None);
        assert_eq!(o.color, OverlayColor::Blue.rgb());
    }

    #[test]
    fn bottom_left_corner() {
        let l = page(PageRotation::None, vec![]);
        let s = place_stamp(&l, "7", &style(StampCorner::BottomLeft), &SerialLabelAnchor);
        close((s.x, s.baseline), (30.0, 760.0));
        assert!(!s.anchored);
    }

    #[test]
    fn corner_on_rotated_page_uses_display_size() {
        let l = page(PageRotation::Degrees90, vec![]);
        let o = page_overlay(&l, "5", &style(StampCorner::TopLeft), &SerialLabelAnchor);
        // Displayed 800 × 600: margin 40 × 30, baseline 50.
        close((o.x, o.y), (50.0, 40.0));
        assert_eq!(o.rotation, PageRotation::Degrees90);
    }

    #[test]
    fn anchor_places_stamp_above_label() {
        let label = TextSpan::new("Bill Sr No", BBox::new(100.0, 200.0, 180.0, 212.0));
        let l = page(PageRotation::None, vec![label]);
        let s = place_stamp(&l, "31", &style(StampCorner::TopRight), &SerialLabelAnchor);
        assert!(s.anchored);
        close((s.x, s.baseline), (100.0, 194.0));
        let o = to_page_overlay(&l, &s, "31", &style(StampCorner::TopRight));
        close((o.x, o.y), (100.0, 606.0));
    }

    #[test]
    fn anchor_near_top_puts_stamp_below() {
        let label = TextSpan::new("Bill Sr No", BBox::new(100.0, 5.0, 180.0, 17.0));
        let l = page(PageRotation::None, vec![label]);
        let s = place_stamp(&l, "31", &style(StampCorner::TopRight), &SerialLabelAnchor);
        close((s.x, s.baseline), (100.0, 17.0 + ANCHOR_GAP + 20.0));
    }

    #[test]
    fn anchor_on_rotated_page_is_mapped() {
        // A label near the unrotated bottom-left shows near the displayed top-left.
        let label = TextSpan::new("Bill Sr No", BBox::new(100.0, 700.0, 160.0, 712.0));
        let l = page(PageRotation::Degrees90, vec![label]);
        let a = box_to_display(&l, l.spans[0].bbox);
        assert_eq!(a, BBox::new(88.0, 100.0, 100.0, 160.0));
        let s = place_stamp(&l, "9", &style(StampCorner::TopRight), &SerialLabelAnchor);
        close((s.x, s.baseline), (88.0, 94.0));
    }

    #[test]
    fn text_anchor_is_case_insensitive() {
        let l = page(
            PageRotation::None,
            vec![TextSpan::new("PROPERTY ID", BBox::new(1.0, 2.0, 3.0, 4.0))],
        );
        assert_eq!(
            TextAnchor::new("property id").locate(&l),
            Some(BBox::new(1.0, 2.0, 3.0, 4.0))
        );
        assert!(SerialLabelAnchor.locate(&l).is_none());
    }
}
