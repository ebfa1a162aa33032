//! Field extractor: one page's text (plus optional positioned spans) in, one
//! [`BillRecord`] out.
//!
//! Extraction never fails on malformed text; a field that does not match
//! simply keeps its default. The only way a page is refused is identity
//! rejection, reported as [`PageSkip::MissingIdentity`].

use super::fields::{self, COORDINATES, DIGITS_ONLY, SERIAL_LABEL, SERIAL_LABEL_WITH_NUMBER};
use crate::document::{PageLayout, TextSpan};
use crate::error::PageSkip;
use crate::model::{BillRecord, Coordinates, Field, SerialSource};

/// Owner-name values treated as "no owner".
pub const NULL_IDENTITY_TOKENS: &[&str] = &[
    "", "NA", "N/A", "N.A.", "NOT AVAILABLE", "NIL", "NONE", "-", "--",
];

/// Maximum vertical distance between a serial label and its number.
pub const SERIAL_Y_TOLERANCE: f32 = 20.0;

/// How far left of the label's right edge a number may start and still
/// count as "to the right of" it.
pub const SERIAL_X_SLACK: f32 = 10.0;

/// Extract one page.
///
/// `page_index` is 0-based. `id`/`batch_id` are left nil for the caller.
pub fn extract_record(
    text: &str,
    layout: Option<&PageLayout>,
    page_index: usize,
) -> Result<BillRecord, PageSkip> {
    let mut record = extract_fields(text, page_index);

    if is_null_identity(record.field(Field::OwnerName)) {
        return Err(PageSkip::MissingIdentity {
            page: page_index + 1,
        });
    }

    let spans = layout.map(|l| l.spans.as_slice());
    if let Some(serial) = find_serial(text, spans) {
        record.set_field(Field::BillSrNo, serial.clone());
        apply_serial(&mut record, serial);
    }

    Ok(record)
}

/// Run every field ladder plus the coordinate pattern, with no rejection.
pub fn extract_fields(text: &str, page_index: usize) -> BillRecord {
    let mut record = BillRecord::new(page_index);
    for ladder in fields::ladders() {
        if let Some(field) = ladder.field {
            record.set_field(field, ladder.value(text));
        }
    }
    record.coordinates = extract_coordinates(text);
    record
}

/// First `<lat> : <lon>` pair in the text, if it parses to a plausible
/// position.
pub fn extract_coordinates(text: &str) -> Option<Coordinates> {
    let caps = COORDINATES.captures(text)?;
    let latitude: f64 = caps[1].parse().ok()?;
    let longitude: f64 = caps[2].parse().ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(Coordinates::new(latitude, longitude))
}

/// True when an owner name is absent or one of [`NULL_IDENTITY_TOKENS`].
pub fn is_null_identity(value: &str) -> bool {
    let value = value.trim();
    NULL_IDENTITY_TOKENS
        .iter()
        .any(|token| value.eq_ignore_ascii_case(token))
}

/// Two-tier serial lookup: positioned spans first, then raw-text patterns.
pub fn find_serial(text: &str, spans: Option<&[TextSpan]>) -> Option<String> {
    spans
        .and_then(find_serial_in_spans)
        .or_else(|| fields::serial_fallback().find(text).map(str::to_string))
}

/// Position-aware serial lookup.
///
/// Finds the first span carrying the serial label. A number inside the label
/// span itself wins outright. Otherwise every all-digit span within
/// [`SERIAL_Y_TOLERANCE`] of the label is a candidate; candidates to the
/// right of the label are preferred, and the vertically closest wins.
pub fn find_serial_in_spans(spans: &[TextSpan]) -> Option<String> {
    let (label_idx, label) = spans
        .iter()
        .enumerate()
        .find(|(_, s)| SERIAL_LABEL.is_match(&s.text))?;

    if let Some(caps) = SERIAL_LABEL_WITH_NUMBER.captures(label.text.trim()) {
        return Some(caps[1].to_string());
    }

    let label_y = label.bbox.y0;
    let label_right = label.bbox.x1;
    let candidates: Vec<&TextSpan> = spans
        .iter()
        .enumerate()
        .filter(|(i, s)| {
            *i != label_idx
                && DIGITS_ONLY.is_match(s.text.trim())
                && (s.bbox.y0 - label_y).abs() <= SERIAL_Y_TOLERANCE
        })
        .map(|(_, s)| s)
        .collect();

    let right: Vec<&TextSpan> = candidates
        .iter()
        .copied()
        .filter(|s| s.bbox.x0 >= label_right - SERIAL_X_SLACK)
        .collect();
    let pool = if right.is_empty() { candidates } else { right };

    // min_by keeps the last of equal elements; fold keeps the first.
    pool.into_iter()
        .fold(None::<&TextSpan>, |best, s| match best {
            Some(b) if (b.bbox.y0 - label_y).abs() <= (s.bbox.y0 - label_y).abs() => Some(b),
            _ => Some(s),
        })
        .map(|s| s.text.trim().to_string())
}

/// Record a found serial. Only a positive integer counts as valid.
fn apply_serial(record: &mut BillRecord, serial: String) {
    let parsed = if DIGITS_ONLY.is_match(&serial) {
        serial.parse::<u32>().ok().filter(|n| *n > 0)
    } else {
        None
    };
    if let Some(n) = parsed {
        record.serial_valid = true;
        record.serial_number = n;
        record.display_serial = serial.clone();
        record.serial_source = SerialSource::Printed;
    }
    record.raw_serial = Some(serial);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BBox;

    fn span(text: &str, x0: f32, y0: f32, x1: f32) -> TextSpan {
        TextSpan::new(text, BBox::new(x0, y0, x1, y0 + 10.0))
    }

    fn layout(spans: Vec<TextSpan>) -> PageLayout {
        PageLayout {
            width: 600.0,
            height: 800.0,
            spans,
            ..PageLayout::default()
        }
    }

    #[test]
    fn basic_page() {
        let text = "Owner Name: Jane Doe\nBillSrNo: 7\n21.234500 : 88.345600";
        let r = extract_record(text, None, 0).unwrap();
        assert_eq!(r.field(Field::OwnerName), "Jane Doe");
        assert!(r.serial_valid);
        assert_eq!(r.serial_number, 7);
        assert_eq!(r.display_serial, "7");
        assert_eq!(r.raw_serial.as_deref(), Some("7"));
        assert_eq!(r.coordinates, Some(Coordinates::new(21.2345, 88.3456)));
        assert_eq!(r.serial_source, SerialSource::Printed);
    }

    #[test]
    fn null_like_owner_is_rejected() {
        for owner in ["NA", "n/a", "N.A.", "Not Available", "nil", "None", "-", "--"] {
            let text = format!("Owner Name: {owner}\nBillSrNo: 3");
            assert_eq!(
                extract_record(&text, None, 4),
                Err(PageSkip::MissingIdentity { page: 5 }),
                "owner {owner:?} should be rejected"
            );
        }
        assert!(extract_record("BillSrNo: 3", None, 0).is_err());
    }

    #[test]
    fn blank_owner_line_is_rejected() {
        assert_eq!(
            extract_record("Owner Name:\nBillSrNo: 7", None, 0),
            Err(PageSkip::MissingIdentity { page: 1 })
        );
        assert_eq!(
            extract_record("Owner Name: \t\nColony Name: Ram Nagar", None, 3),
            Err(PageSkip::MissingIdentity { page: 4 })
        );
    }

    #[test]
    fn missing_serial_stays_unresolved() {
        let r = extract_record("Owner Name: Sunil", None, 2).unwrap();
        assert!(!r.serial_valid);
        assert_eq!(r.serial_number, 0);
        assert_eq!(r.display_serial, "");
        assert_eq!(r.serial_source, SerialSource::Unresolved);
        assert!(r.coordinates.is_none());
    }

    #[test]
    fn zero_serial_is_not_valid() {
        let r = extract_record("Owner Name: Sunil\nBillSrNo: 0", None, 0).unwrap();
        assert!(!r.serial_valid);
        assert_eq!(r.raw_serial.as_deref(), Some("0"));
    }

    #[test]
    fn out_of_range_coordinates_ignored() {
        assert!(extract_coordinates("120.5 : 80.1").is_none());
        assert_eq!(
            extract_coordinates("at 28.61 : 77.20 today"),
            Some(Coordinates::new(28.61, 77.20))
        );
    }

    #[test]
    fn label_span_with_number_wins() {
        let spans = vec![
            span("Bill Sr No: 112", 10.0, 50.0, 90.0),
            span("999", 100.0, 50.0, 120.0),
        ];
        assert_eq!(find_serial_in_spans(&spans).as_deref(), Some("112"));
    }

    #[test]
    fn number_right_of_label_preferred() {
        let spans = vec![
            span("55", 5.0, 101.0, 20.0),
            span("Bill Sr No", 30.0, 100.0, 80.0),
            span("77", 90.0, 108.0, 105.0),
        ];
        assert_eq!(find_serial_in_spans(&spans).as_deref(), Some("77"));
    }

    #[test]
    fn vertically_closest_candidate_wins() {
        let spans = vec![
            span("Bill Sr No", 30.0, 100.0, 80.0),
            span("11", 90.0, 115.0, 105.0),
            span("12", 90.0, 103.0, 105.0),
            span("13", 90.0, 150.0, 105.0),
        ];
        assert_eq!(find_serial_in_spans(&spans).as_deref(), Some("12"));
    }

    #[test]
    fn left_candidate_used_when_nothing_right() {
        let spans = vec![
            span("44", 5.0, 100.0, 20.0),
            span("Bill Sr No", 30.0, 100.0, 80.0),
        ];
        assert_eq!(find_serial_in_spans(&spans).as_deref(), Some("44"));
    }

    #[test]
    fn positioned_serial_beats_text_pattern() {
        let text = "Owner Name: Meena\nBillSrNo: 5";
        let l = layout(vec![
            span("Bill Sr No", 30.0, 100.0, 80.0),
            span("31", 90.0, 100.0, 105.0),
        ]);
        let r = extract_record(text, Some(&l), 0).unwrap();
        assert_eq!(r.serial_number, 31);
        assert_eq!(r.field(Field::BillSrNo), "31");
    }

    #[test]
    fn falls_back_to_text_when_spans_have_no_label() {
        let text = "Owner Name: Meena\nBill Sr. No. 64";
        let l = layout(vec![span("Owner Name: Meena", 10.0, 10.0, 200.0)]);
        let r = extract_record(text, Some(&l), 0).unwrap();
        assert_eq!(r.serial_number, 64);
    }
}
