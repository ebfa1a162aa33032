//! Record, batch and result types shared by every pipeline stage.
//!
//! All types are `Serialize`/`Deserialize` so callers can persist them or
//! hand them to a JSON API without re-mapping. The pipeline itself never
//! persists anything; it takes records by value and returns updated copies.

use crate::error::PageSkip;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ── Fields ───────────────────────────────────────────────────────────────

/// Every named attribute the extractor knows how to recover from a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    BillSrNo,
    PropertyId,
    OldPropertyId,
    FinancialYear,
    PrintDate,
    Mobile,
    Colony,
    OwnerName,
    PlotAddress,
    PermanentAddress,
    TotalArea,
    Category,
    AuthorizedStatus,
    TotalOutstanding,
    PropertyTaxOutstanding,
}

impl Field {
    /// All fields in extraction order.
    pub const ALL: [Field; 15] = [
        Field::BillSrNo,
        Field::PropertyId,
        Field::OldPropertyId,
        Field::FinancialYear,
        Field::PrintDate,
        Field::Mobile,
        Field::Colony,
        Field::OwnerName,
        Field::PlotAddress,
        Field::PermanentAddress,
        Field::TotalArea,
        Field::Category,
        Field::AuthorizedStatus,
        Field::TotalOutstanding,
        Field::PropertyTaxOutstanding,
    ];

    /// The key this field is stored under in [`BillRecord::fields`].
    pub fn key(self) -> &'static str {
        match self {
            Field::BillSrNo => "bill_sr_no",
            Field::PropertyId => "property_id",
            Field::OldPropertyId => "old_property_id",
            Field::FinancialYear => "financial_year",
            Field::PrintDate => "print_date",
            Field::Mobile => "mobile",
            Field::Colony => "colony",
            Field::OwnerName => "owner_name",
            Field::PlotAddress => "plot_address",
            Field::PermanentAddress => "permanent_address",
            Field::TotalArea => "total_area",
            Field::Category => "category",
            Field::AuthorizedStatus => "authorized_status",
            Field::TotalOutstanding => "total_outstanding",
            Field::PropertyTaxOutstanding => "property_tax_outstanding",
        }
    }
}

/// A target attribute that may be satisfied by several stored fields.
///
/// Each variant carries an ordered candidate list; [`BillRecord::lookup`]
/// returns the first candidate with a non-empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Owner,
    Address,
    Area,
    Amount,
    PropertyRef,
}

impl Attribute {
    pub fn candidates(self) -> &'static [Field] {
        match self {
            Attribute::Owner => &[Field::OwnerName],
            Attribute::Address => &[Field::PlotAddress, Field::PermanentAddress],
            Attribute::Area => &[Field::Colony],
            Attribute::Amount => &[Field::TotalOutstanding, Field::PropertyTaxOutstanding],
            Attribute::PropertyRef => &[Field::PropertyId, Field::OldPropertyId],
        }
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// How a record's display serial was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialSource {
    /// Not yet resolved.
    #[default]
    Unresolved,
    /// Read from the page.
    Printed,
    /// Borrowed from the geographically nearest printed serial.
    Nearest,
    /// Borrowed from the first printed serial, or the `N0` sentinel.
    Fallback,
}

/// One page's extracted data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    /// Assigned when the record joins a batch; nil straight out of the extractor.
    pub id: Uuid,
    pub batch_id: Uuid,
    /// 0-based source page; used to re-fetch the original page.
    pub page_index: usize,
    /// 1-based page number as shown by a PDF viewer.
    pub page_number: usize,
    /// Named string attributes keyed by [`Field::key`]. Every known field is present.
    pub fields: BTreeMap<String, String>,
    pub coordinates: Option<Coordinates>,
    /// Digits as found in the source text.
    pub raw_serial: Option<String>,
    pub serial_valid: bool,
    /// Resolved ordering key; 0 while unresolved and for repaired serials.
    pub serial_number: u32,
    /// What gets stamped: the literal serial or `N<k>`.
    pub display_serial: String,
    pub serial_source: SerialSource,
    /// Set for repaired serials, which carry no strict ordering position.
    pub ordering_skipped: bool,
    /// 1-based position in the computed route; `None` until routed.
    pub route_order: Option<u32>,
}

impl BillRecord {
    /// An empty record for a page, with every field defaulted to "".
    pub fn new(page_index: usize) -> Self {
        let fields = Field::ALL
            .iter()
            .map(|f| (f.key().to_string(), String::new()))
            .collect();
        Self {
            id: Uuid::nil(),
            batch_id: Uuid::nil(),
            page_index,
            page_number: page_index + 1,
            fields,
            coordinates: None,
            raw_serial: None,
            serial_valid: false,
            serial_number: 0,
            display_serial: String::new(),
            serial_source: SerialSource::Unresolved,
            ordering_skipped: false,
            route_order: None,
        }
    }

    /// Value of a field, or "" when absent.
    pub fn field(&self, field: Field) -> &str {
        self.fields.get(field.key()).map(String::as_str).unwrap_or("")
    }

    pub fn set_field(&mut self, field: Field, value: impl Into<String>) {
        self.fields.insert(field.key().to_string(), value.into());
    }

    /// First non-empty candidate for `attribute`, or "".
    pub fn lookup(&self, attribute: Attribute) -> &str {
        attribute
            .candidates()
            .iter()
            .map(|f| self.field(*f))
            .find(|v| !v.trim().is_empty())
            .unwrap_or("")
    }

    /// Give the record a fresh id and attach it to `batch`.
    pub fn assign_to(&mut self, batch: &Batch) {
        self.id = Uuid::new_v4();
        self.batch_id = batch.id;
    }
}

// ── Batches ──────────────────────────────────────────────────────────────

/// One submitted source document and its derived records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub source_page_count: usize,
    /// Records kept after identity rejection.
    pub record_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(name: impl Into<String>, source_page_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_page_count,
            record_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Counters returned with every batch-level operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub source_pages: usize,
    pub extracted_records: usize,
    pub skipped_missing_identity: usize,
    pub skipped_unreadable: usize,
    pub filtered_out: usize,
    pub printed_serials: usize,
    pub resolved_via_nearest: usize,
    pub resolved_via_fallback: usize,
    pub routed: usize,
    pub unrouted: usize,
    pub distinct_locations: usize,
    pub total_duration_ms: u64,
}

/// Result of running extract → resolve → route over a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub batch: Batch,
    /// Records in final route order.
    pub records: Vec<BillRecord>,
    pub colonies: Vec<String>,
    pub skipped: Vec<PageSkip>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Geo-located records in route order, projected for map display.
    pub fn map_points(&self) -> Vec<MapPoint> {
        self.records.iter().filter_map(MapPoint::from_record).collect()
    }
}

/// A geo-located record reduced to what a map marker needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: Uuid,
    pub display_serial: String,
    pub route_order: Option<u32>,
    pub owner_name: String,
    pub colony: String,
    pub latitude: f64,
    pub longitude: f64,
    pub total_outstanding: String,
}

impl MapPoint {
    pub fn from_record(record: &BillRecord) -> Option<Self> {
        let c = record.coordinates?;
        Some(Self {
            id: record.id,
            display_serial: record.display_serial.clone(),
            route_order: record.route_order,
            owner_name: record.lookup(Attribute::Owner).to_string(),
            colony: record.lookup(Attribute::Area).to_string(),
            latitude: c.latitude,
            longitude: c.longitude,
            total_outstanding: record.lookup(Attribute::Amount).to_string(),
        })
    }
}

/// Distinct, sorted, non-empty colony names across `records`.
pub fn distinct_colonies(records: &[BillRecord]) -> Vec<String> {
    let mut colonies: Vec<String> = records
        .iter()
        .map(|r| r.field(Field::Colony).trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    colonies.sort();
    colonies.dedup();
    colonies
}

// ── Derivative documents ─────────────────────────────────────────────────

/// A composed output document held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedDocument {
    pub page_count: usize,
    /// Records placed into the document.
    pub record_count: usize,
    pub skipped: Vec<PageSkip>,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl DerivedDocument {
    /// Records that pointed past the end of the source.
    pub fn out_of_range_pages(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s, PageSkip::OutOfRange { .. }))
            .count()
    }
}

/// One worker's contiguous slice of the final order plus its document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeBundle {
    /// 1-based.
    pub employee_number: usize,
    pub first_serial: String,
    pub last_serial: String,
    /// Inclusive 1-based positions in the final order; both `0` when the
    /// bundle is empty.
    pub start_position: usize,
    pub end_position: usize,
    pub record_count: usize,
    pub document: DerivedDocument,
}

impl EmployeeBundle {
    /// Human-readable serial range, e.g. `"12 - N40"`, or `"none"` for an
    /// empty bundle.
    pub fn serial_range(&self) -> String {
        if self.record_count == 0 {
            return "none".to_string();
        }
        format!("{} - {}", self.first_serial, self.last_serial)
    }
}

/// Result of splitting the final order across workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutput {
    pub total_records: usize,
    /// `ceil(total / employee_count)`.
    pub records_per_employee: usize,
    pub bundles: Vec<EmployeeBundle>,
    pub out_of_range_pages: usize,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults_every_field() {
        let r = BillRecord::new(4);
        assert_eq!(r.page_number, 5);
        assert_eq!(r.fields.len(), Field::ALL.len());
        assert_eq!(r.field(Field::OwnerName), "");
        assert!(r.route_order.is_none());
    }

    #[test]
    fn lookup_honours_candidate_order() {
        let mut r = BillRecord::new(0);
        r.set_field(Field::PermanentAddress, "12 Lake Rd");
        assert_eq!(r.lookup(Attribute::Address), "12 Lake Rd");
        r.set_field(Field::PlotAddress, "Plot 4");
        assert_eq!(r.lookup(Attribute::Address), "Plot 4");
    }

    #[test]
    fn lookup_skips_whitespace_only() {
        let mut r = BillRecord::new(0);
        r.set_field(Field::TotalOutstanding, "   ");
        r.set_field(Field::PropertyTaxOutstanding, "1,200");
        assert_eq!(r.lookup(Attribute::Amount), "1,200");
    }

    #[test]
    fn colonies_are_sorted_and_deduplicated() {
        let mut a = BillRecord::new(0);
        a.set_field(Field::Colony, "Ram Nagar");
        let mut b = BillRecord::new(1);
        b.set_field(Field::Colony, " Akash Nagar ");
        let mut c = BillRecord::new(2);
        c.set_field(Field::Colony, "Ram Nagar");
        let d = BillRecord::new(3);
        assert_eq!(
            distinct_colonies(&[a, b, c, d]),
            vec!["Akash Nagar".to_string(), "Ram Nagar".to_string()]
        );
    }

    #[test]
    fn derived_document_bytes_serialise_as_base64() {
        let doc = DerivedDocument {
            page_count: 1,
            record_count: 1,
            skipped: vec![],
            bytes: b"%PDF".to_vec(),
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("JVBERg=="), "got: {json}");
        let back: DerivedDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bytes, b"%PDF");
    }

    #[test]
    fn map_point_requires_coordinates() {
        let mut r = BillRecord::new(0);
        assert!(MapPoint::from_record(&r).is_none());
        r.coordinates = Some(Coordinates::new(21.0, 88.0));
        r.set_field(Field::OwnerName, "Asha");
        let p = MapPoint::from_record(&r).unwrap();
        assert_eq!(p.owner_name, "Asha");
        assert_eq!(p.latitude, 21.0);
    }
}
