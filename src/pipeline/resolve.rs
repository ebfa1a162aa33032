//! Serial resolver: fill in display serials for records whose printed serial
//! was missing or unreadable.
//!
//! Two passes. First collect every record that has both a valid serial and
//! coordinates as an anchor; then give each missing record `N<k>`, where `k`
//! is the serial of the nearest anchor. Records that cannot be placed borrow
//! the first valid serial in the batch, or `N0` when there is none.

use crate::model::{BillRecord, Coordinates, SerialSource};
use tracing::debug;

/// Label used when a batch has no valid serial at all.
pub const SENTINEL_SERIAL: &str = "N0";

/// Counts produced by [`resolve_serials`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub printed: usize,
    pub nearest: usize,
    pub fallback: usize,
}

/// Resolve every record's display serial in place.
///
/// Valid serials are left untouched. Missing ones keep `serial_number == 0`
/// and are flagged `ordering_skipped`.
pub fn resolve_serials(records: &mut [BillRecord]) -> ResolveSummary {
    let anchors: Vec<(u32, Coordinates)> = records
        .iter()
        .filter(|r| r.serial_valid)
        .filter_map(|r| r.coordinates.map(|c| (r.serial_number, c)))
        .collect();
    let first_valid = records
        .iter()
        .find(|r| r.serial_valid)
        .map(|r| r.serial_number);

    let mut summary = ResolveSummary::default();
    for record in records.iter_mut() {
        if record.serial_valid {
            record.serial_source = SerialSource::Printed;
            summary.printed += 1;
            continue;
        }

        let nearest = record
            .coordinates
            .and_then(|c| nearest_anchor(&anchors, c));
        let (serial, source) = match (nearest, first_valid) {
            (Some(k), _) => (format!("N{k}"), SerialSource::Nearest),
            (None, Some(k)) => (format!("N{k}"), SerialSource::Fallback),
            (None, None) => (SENTINEL_SERIAL.to_string(), SerialSource::Fallback),
        };
        debug!(page = record.page_number, serial = %serial, "Resolved missing serial");

        match source {
            SerialSource::Nearest => summary.nearest += 1,
            _ => summary.fallback += 1,
        }
        record.serial_number = 0;
        record.display_serial = serial;
        record.serial_source = source;
        record.ordering_skipped = true;
    }
    summary
}

/// Serial of the anchor closest to `target` by planar distance. Ties go to
/// the earliest anchor.
pub fn nearest_anchor(anchors: &[(u32, Coordinates)], target: Coordinates) -> Option<u32> {
    let mut best: Option<(u32, f64)> = None;
    for &(serial, c) in anchors {
        let d = planar_distance_sq(c, target);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((serial, d));
        }
    }
    best.map(|(serial, _)| serial)
}

fn planar_distance_sq(a: Coordinates, b: Coordinates) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlon = a.longitude - b.longitude;
    dlat * dlat + dlon * dlon
}
