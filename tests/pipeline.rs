//! Whole-pipeline tests over the in-memory document backend.
//!
//! These exercise extraction, serial repair, routing and composition end to
//! end without needing a pdfium library, so they always run.
//!
//! Run with:
//!   cargo test --test pipeline

use bill_router::document::memory::{read_dump, DumpPageKind, MemoryDocument, MemoryPage};
use bill_router::document::{BBox, PageLayout, PageRotation, TextSpan};
use bill_router::pipeline::compose::{reorder_and_stamp, split_by_employee};
use bill_router::{
    process_batch, process_batch_from_bytes, process_document, BatchProgressCallback, BatchStats,
    BillRouteError, PageSkip, PipelineConfig, SerialSource, SheetLayout,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn bill(owner: &str, serial: Option<u32>, colony: &str, at: Option<(f64, f64)>) -> String {
    let mut text = format!(
        "Property Tax Bill\nOwner Name: {owner}\nColony Name: {colony}\nTotal Outstanding: Rs. 1,250\n"
    );
    if let Some(s) = serial {
        text.push_str(&format!("Bill Sr No: {s}\n"));
    }
    if let Some((lat, lon)) = at {
        text.push_str(&format!("{lat:.6} : {lon:.6}\n"));
    }
    text
}

/// Six pages: one null owner, two bills sharing a location, one bill with
/// no coordinates and one with no printed serial.
fn ward() -> MemoryDocument {
    MemoryDocument::from_texts([
        bill("Asha Devi", Some(10), "Ram Nagar", Some((21.20, 88.00))),
        bill("Bina Rao", Some(11), "Ram Nagar", Some((21.00, 88.00))),
        bill("Chetan Lal", None, "Ram Nagar", Some((21.00, 88.00))),
        bill("Dinesh Kumar", Some(12), "Shiv Colony", Some((21.10, 88.00))),
        bill("Esha Singh", Some(13), "Shiv Colony", None),
        bill("NA", Some(14), "Shiv Colony", Some((21.05, 88.00))),
    ])
}

#[derive(Default)]
struct Counting {
    extracted: AtomicUsize,
    skipped: AtomicUsize,
    completed: AtomicUsize,
}

impl BatchProgressCallback for Counting {
    fn on_page_extracted(&self, _page: usize, _total: usize) {
        self.extracted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_skipped(&self, _page: usize, _total: usize, _reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, _stats: &BatchStats) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Extract → resolve → route ────────────────────────────────────────────────

#[test]
fn batch_is_resolved_and_routed() {
    let out = process_document(&ward(), "ward-12", &PipelineConfig::default()).unwrap();

    assert_eq!(out.batch.name, "ward-12");
    assert_eq!(out.batch.source_page_count, 6);
    assert_eq!(out.batch.record_count, 5);
    assert_eq!(out.skipped, vec![PageSkip::MissingIdentity { page: 6 }]);

    // Start at the north-most stop, then nearest-first; the record without
    // coordinates trails.
    let order: Vec<usize> = out.records.iter().map(|r| r.page_index).collect();
    assert_eq!(order, vec![0, 3, 1, 2, 4]);

    let serials: Vec<&str> = out.records.iter().map(|r| r.display_serial.as_str()).collect();
    assert_eq!(serials, vec!["10", "12", "11", "N11", "13"]);

    let route: Vec<Option<u32>> = out.records.iter().map(|r| r.route_order).collect();
    assert_eq!(route, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);

    let chetan = &out.records[3];
    assert_eq!(chetan.serial_source, SerialSource::Nearest);
    assert!(chetan.ordering_skipped);
    assert!(!chetan.serial_valid);

    assert_eq!(out.stats.printed_serials, 4);
    assert_eq!(out.stats.resolved_via_nearest, 1);
    assert_eq!(out.stats.distinct_locations, 3);
    assert_eq!(out.stats.routed, 4);
    assert_eq!(out.stats.unrouted, 1);
    assert_eq!(out.colonies, vec!["Ram Nagar", "Shiv Colony"]);
    assert_eq!(out.map_points().len(), 4);
    assert_eq!(out.map_points()[0].total_outstanding, "1,250");
}

#[test]
fn progress_callback_sees_every_page() {
    let counter = Arc::new(Counting::default());
    let config = PipelineConfig::builder()
        .progress_callback(counter.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();
    process_document(&ward(), "ward-12", &config).unwrap();
    assert_eq!(counter.extracted.load(Ordering::SeqCst), 5);
    assert_eq!(counter.skipped.load(Ordering::SeqCst), 1);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
}

#[test]
fn colony_filter_still_resolves_from_whole_batch() {
    let config = PipelineConfig::builder().colony("ram").build().unwrap();
    let out = process_document(&ward(), "ward-12", &config).unwrap();
    assert_eq!(out.records.len(), 3);
    assert_eq!(out.stats.filtered_out, 2);
    let chetan = out.records.iter().find(|r| r.page_index == 2).unwrap();
    assert_eq!(chetan.display_serial, "N11");
}

// ── Composition ──────────────────────────────────────────────────────────────

#[test]
fn arranged_document_follows_route_and_stamps_serials() {
    let doc = ward();
    let config = PipelineConfig::default();
    let out = process_document(&doc, "ward-12", &config).unwrap();
    let composed = reorder_and_stamp(&doc, &out.records, &config).unwrap();

    assert_eq!(composed.page_count, 5);
    assert!(composed.skipped.is_empty());
    let dump = read_dump(&composed.bytes).unwrap();
    let sources: Vec<usize> = dump
        .pages
        .iter()
        .map(|p| match p.kind {
            DumpPageKind::Imported { source_index } => source_index,
            ref other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(sources, vec![0, 3, 1, 2, 4]);
    assert_eq!(
        dump.stamps(),
        vec![vec!["10"], vec!["12"], vec!["11"], vec!["N11"], vec!["13"]]
    );
}

#[test]
fn two_up_sheets_halve_the_page_count() {
    let doc = ward();
    let config = PipelineConfig::builder()
        .sheet_layout(SheetLayout::Two)
        .build()
        .unwrap();
    let out = process_document(&doc, "ward-12", &config).unwrap();
    let composed = reorder_and_stamp(&doc, &out.records, &config).unwrap();
    assert_eq!(composed.page_count, 3);
    assert_eq!(composed.record_count, 5);
    let dump = read_dump(&composed.bytes).unwrap();
    assert_eq!(
        dump.stamps(),
        vec![vec!["10", "12"], vec!["11", "N11"], vec!["13"]]
    );
}

#[test]
fn split_across_two_employees() {
    let doc = ward();
    let config = PipelineConfig::builder().employee_count(2).build().unwrap();
    let out = process_document(&doc, "ward-12", &config).unwrap();
    let split = split_by_employee(&doc, &out.records, &config).unwrap();

    assert_eq!(split.total_records, 5);
    assert_eq!(split.records_per_employee, 3);
    assert_eq!(split.out_of_range_pages, 0);
    let summary: Vec<(usize, usize, String)> = split
        .bundles
        .iter()
        .map(|b| (b.start_position, b.end_position, b.serial_range()))
        .collect();
    assert_eq!(
        summary,
        vec![(1, 3, "10 - 11".to_string()), (4, 5, "N11 - 13".to_string())]
    );
    let second = read_dump(&split.bundles[1].document.bytes).unwrap();
    assert_eq!(second.stamps(), vec![vec!["N11"], vec!["13"]]);
}

#[test]
fn stale_records_point_past_the_end() {
    let full = ward();
    let out = process_document(&full, "ward-12", &PipelineConfig::default()).unwrap();
    // The same records against a shorter re-scan of the document.
    let short = MemoryDocument::from_texts([bill("Asha Devi", Some(10), "Ram Nagar", None)]);
    let composed = reorder_and_stamp(&short, &out.records, &PipelineConfig::default()).unwrap();
    assert_eq!(composed.page_count, 1);
    assert_eq!(composed.out_of_range_pages(), 4);
}

#[test]
fn rotated_page_gets_upright_stamp_near_label() {
    let layout = PageLayout {
        width: 612.0,
        height: 792.0,
        rotation: PageRotation::Degrees90,
        spans: vec![
            TextSpan::new("Bill Sr No", BBox::new(60.0, 100.0, 120.0, 112.0)),
            TextSpan::new("77", BBox::new(126.0, 100.0, 140.0, 112.0)),
        ],
    };
    let doc = MemoryDocument::new(vec![
        MemoryPage::from_text("Owner Name: Farah Khan").with_layout(layout)
    ]);
    let out = process_document(&doc, "rotated", &PipelineConfig::default()).unwrap();
    assert_eq!(out.records[0].display_serial, "77");

    let composed = reorder_and_stamp(&doc, &out.records, &PipelineConfig::default()).unwrap();
    let dump = read_dump(&composed.bytes).unwrap();
    let overlay = &dump.pages[0].overlays[0];
    assert_eq!(overlay.rotation, PageRotation::Degrees90);
    assert!((0.0..=612.0).contains(&overlay.x), "x = {}", overlay.x);
    assert!((0.0..=792.0).contains(&overlay.y), "y = {}", overlay.y);
}

// ── Empty batches ────────────────────────────────────────────────────────────

#[test]
fn every_page_rejected_is_an_empty_batch() {
    let doc = MemoryDocument::from_texts([
        bill("NA", Some(1), "X", None),
        bill("-", Some(2), "X", None),
        "Owner Name:\nBill Sr No: 3\n".to_string(),
    ]);
    let counter = Arc::new(Counting::default());
    let config = PipelineConfig::builder()
        .progress_callback(counter.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();
    let out = process_document(&doc, "empty", &config).unwrap();

    assert!(out.records.is_empty());
    assert_eq!(out.batch.record_count, 0);
    assert_eq!(out.stats.source_pages, 3);
    assert_eq!(out.stats.skipped_missing_identity, 3);
    assert_eq!(
        out.skipped,
        vec![
            PageSkip::MissingIdentity { page: 1 },
            PageSkip::MissingIdentity { page: 2 },
            PageSkip::MissingIdentity { page: 3 },
        ]
    );
    assert_eq!(counter.skipped.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);

    // Composing nothing is still a valid, empty document.
    let composed = reorder_and_stamp(&doc, &out.records, &config).unwrap();
    assert_eq!(composed.page_count, 0);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_file_is_fatal() {
    let err = process_batch("/no/such/ward.pdf", &PipelineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BillRouteError::FileNotFound { .. }));
}

#[test]
fn bytes_without_pdf_magic_are_rejected() {
    let config = PipelineConfig::default();
    let err = tokio_test::block_on(process_batch_from_bytes(
        b"<html>not a pdf</html>".to_vec(),
        "web",
        &config,
    ))
    .unwrap_err();
    assert!(matches!(err, BillRouteError::NotAPdf { .. }));
}
