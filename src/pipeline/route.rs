//! Geographic router: a greedy nearest-neighbour walk over distinct stops.
//!
//! ```text
//! records ──▶ group by rounded (lat, lon) ──▶ pick NW anchor ──▶ greedy tour ──▶ expand
//! ```
//!
//! Records sharing a rounded position form one stop and stay adjacent in
//! their original relative order. Records without coordinates follow every
//! geo-located record, also in original order. The result is deterministic
//! for a given input order: every tie goes to the first-encountered stop.

use crate::model::{BillRecord, Coordinates};
use std::collections::HashMap;
use tracing::debug;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Decimal places kept when grouping positions into stops.
pub const LOCATION_PRECISION: i32 = 6;

/// Weight of longitude in the anchor score `lat − w·lon`.
pub const ANCHOR_LONGITUDE_WEIGHT: f64 = 0.1;

/// Counts produced by [`route_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSummary {
    pub routed: usize,
    pub unrouted: usize,
    pub distinct_locations: usize,
}

/// One routing stop: a rounded position and the records at it.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub position: Coordinates,
    /// Indices into the routed slice, in original order.
    pub members: Vec<usize>,
}

/// Great-circle distance in metres.
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();
    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

fn location_key(c: Coordinates) -> (i64, i64) {
    let scale = 10f64.powi(LOCATION_PRECISION);
    (
        (c.latitude * scale).round() as i64,
        (c.longitude * scale).round() as i64,
    )
}

/// Group positions into stops, in order of first appearance.
pub fn group_locations(positions: &[Coordinates]) -> Vec<Location> {
    let scale = 10f64.powi(LOCATION_PRECISION);
    let mut by_key: HashMap<(i64, i64), usize> = HashMap::new();
    let mut locations: Vec<Location> = Vec::new();
    for (i, &c) in positions.iter().enumerate() {
        let key = location_key(c);
        let slot = *by_key.entry(key).or_insert_with(|| {
            locations.push(Location {
                position: Coordinates::new(key.0 as f64 / scale, key.1 as f64 / scale),
                members: Vec::new(),
            });
            locations.len() - 1
        });
        locations[slot].members.push(i);
    }
    locations
}

/// Index of the north-westernmost stop (maximum `lat − 0.1·lon`).
pub fn anchor_index(stops: &[Coordinates]) -> Option<usize> {
    let score = |c: &Coordinates| c.latitude - ANCHOR_LONGITUDE_WEIGHT * c.longitude;
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in stops.iter().enumerate() {
        let s = score(c);
        if best.is_none_or(|(_, bs)| s > bs) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}

/// Visit order over `stops`, starting at the anchor and always stepping to
/// the nearest unvisited stop.
pub fn greedy_tour(stops: &[Coordinates]) -> Vec<usize> {
    let Some(start) = anchor_index(stops) else {
        return Vec::new();
    };
    let mut visited = vec![false; stops.len()];
    let mut order = Vec::with_capacity(stops.len());
    visited[start] = true;
    order.push(start);

    let mut current = start;
    while order.len() < stops.len() {
        let mut next: Option<(usize, f64)> = None;
        for (i, &c) in stops.iter().enumerate() {
            if visited[i] {
                continue;
            }
            let d = haversine_m(stops[current], c);
            if next.is_none_or(|(_, nd)| d < nd) {
                next = Some((i, d));
            }
        }
        let Some((i, _)) = next else { break };
        visited[i] = true;
        order.push(i);
        current = i;
    }
    order
}

/// Order records into a walking route and number them 1..=n.
///
/// Geo-located records come first, stop by stop; records without
/// coordinates follow in their original order and continue the numbering.
pub fn route_records(records: Vec<BillRecord>) -> (Vec<BillRecord>, RouteSummary) {
    let (geo, plain): (Vec<BillRecord>, Vec<BillRecord>) =
        records.into_iter().partition(|r| r.coordinates.is_some());

    let positions: Vec<Coordinates> = geo.iter().filter_map(|r| r.coordinates).collect();
    let locations = group_locations(&positions);
    let stops: Vec<Coordinates> = locations.iter().map(|l| l.position).collect();
    let visit = if stops.len() <= 1 {
        (0..stops.len()).collect()
    } else {
        greedy_tour(&stops)
    };
    debug!(
        records = geo.len(),
        locations = stops.len(),
        "Planned route"
    );

    let summary = RouteSummary {
        routed: geo.len(),
        unrouted: plain.len(),
        distinct_locations: stops.len(),
    };

    let mut slots: Vec<Option<BillRecord>> = geo.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len() + plain.len());
    for stop in visit {
        for &member in &locations[stop].members {
            if let Some(record) = slots[member].take() {
                ordered.push(record);
            }
        }
    }
    ordered.extend(plain);

    for (position, record) in ordered.iter_mut().enumerate() {
        record.route_order = Some(position as u32 + 1);
    }
    (ordered, summary)
}
