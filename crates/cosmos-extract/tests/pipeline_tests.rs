//! End-to-end pipeline tests on synthetic page images and replayed detections

use cosmos_core::{
    DocumentMetadata, DocumentStatus, ExtractionConfig, ExtractionConfigBuilder, Page,
    PageFailure, PageSource, RegionClass, StructuredPayload,
};
use cosmos_extract::{
    Detection, DetectorError, DocumentInput, ExtractionPipeline, RecognitionError,
    RegionDetector, ReplayDetector, TextRecognizer,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FixedRecognizer(&'static str);

impl TextRecognizer for FixedRecognizer {
    fn name(&self) -> &str {
        "fixed"
    }
    fn recognize(&self, _image: &DynamicImage) -> Result<String, RecognitionError> {
        Ok(self.0.to_string())
    }
}

/// Replays detections, sleeping on one page
struct SlowDetector {
    inner: ReplayDetector,
    slow_page: u32,
    delay: Duration,
}

impl RegionDetector for SlowDetector {
    fn name(&self) -> &str {
        "slow"
    }
    fn detect(&self, page: &Page) -> Result<Vec<Detection>, DetectorError> {
        if page.page_number == self.slow_page {
            std::thread::sleep(self.delay);
        }
        self.inner.detect(page)
    }
}

/// Counts detector calls; every call is slow
struct CountingDetector {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl RegionDetector for CountingDetector {
    fn name(&self) -> &str {
        "counting"
    }
    fn detect(&self, _page: &Page) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }
}

fn blank_page(page_number: u32, width: u32, height: u32) -> PageSource {
    let image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    PageSource::from_image(page_number, DynamicImage::ImageRgb8(image))
}

fn metadata(name: &str) -> DocumentMetadata {
    DocumentMetadata {
        title: Some(name.to_string()),
        source_filename: Some(format!("{name}.pdf")),
        dataset_id: Some("test".to_string()),
    }
}

fn config() -> ExtractionConfig {
    ExtractionConfigBuilder::new()
        .max_concurrent_pages(2)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_page_does_not_abort_document() {
    let detections = BTreeMap::from([
        (1, vec![Detection::new("Body Text", 0.9, [50.0, 50.0, 350.0, 100.0])]),
        (3, vec![Detection::new("Figure", 0.8, [50.0, 50.0, 350.0, 250.0])]),
    ]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections))).unwrap();
    let input = DocumentInput::new(
        metadata("three_pages"),
        (1..=3).map(|n| blank_page(n, 400, 300)).collect(),
    );

    let doc = pipeline.process_document(input).await;

    assert_eq!(doc.pages.len(), 3);
    assert_eq!(doc.failed_pages, vec![2]);
    assert_eq!(doc.status, DocumentStatus::Degraded);
    assert!(!doc.is_fatal());
    assert_eq!(doc.page(1).unwrap().records.len(), 1);
    assert_eq!(doc.page(3).unwrap().records[0].class(), RegionClass::Figure);
    assert!(matches!(
        doc.page(2).unwrap().failure(),
        Some(PageFailure::DetectionUnavailable { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_document_timeout_marks_incomplete() {
    let detections = BTreeMap::from([(1, Vec::new()), (2, Vec::new()), (3, Vec::new())]);
    let detector = SlowDetector {
        inner: ReplayDetector::new(detections),
        slow_page: 2,
        delay: Duration::from_secs(2),
    };
    let config = ExtractionConfigBuilder::new()
        .max_concurrent_pages(3)
        .document_timeout(Some(Duration::from_millis(500)))
        .build()
        .unwrap();
    let pipeline = ExtractionPipeline::new(config, Arc::new(detector)).unwrap();
    let input = DocumentInput::new(
        metadata("slow"),
        (1..=3).map(|n| blank_page(n, 200, 200)).collect(),
    );

    let doc = pipeline.process_document(input).await;

    assert!(doc.incomplete);
    assert_eq!(doc.status, DocumentStatus::Incomplete);
    assert_eq!(doc.failed_pages, vec![2]);
    assert_eq!(doc.page(2).unwrap().failure(), Some(&PageFailure::TimedOut));
    assert!(!doc.page(1).unwrap().is_failed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_pages_are_skipped_after_timeout() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = CountingDetector {
        calls: Arc::clone(&calls),
        delay: Duration::from_millis(800),
    };
    let config = ExtractionConfigBuilder::new()
        .max_concurrent_pages(1)
        .document_timeout(Some(Duration::from_millis(200)))
        .build()
        .unwrap();
    let pipeline = ExtractionPipeline::new(config, Arc::new(detector)).unwrap();
    let input = DocumentInput::new(
        metadata("queued"),
        (1..=4).map(|n| blank_page(n, 100, 100)).collect(),
    );

    let doc = pipeline.process_document(input).await;
    assert!(doc.incomplete);
    assert_eq!(doc.failed_pages, vec![1, 2, 3, 4]);
    assert!(calls.load(Ordering::SeqCst) <= 1);

    // The running page finishes; the queued ones must not start
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(calls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn test_page_without_regions() {
    let detections = BTreeMap::from([(1, Vec::new())]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections))).unwrap();
    let doc = pipeline
        .process_document(DocumentInput::new(metadata("empty"), vec![blank_page(1, 100, 100)]))
        .await;

    let page = doc.page(1).unwrap();
    assert!(!page.is_failed());
    assert!(page.records.is_empty());
    assert!(page.reading_order.is_empty());
    assert_eq!(doc.status, DocumentStatus::Complete);
}

#[tokio::test]
async fn test_single_column_reading_order() {
    // Listed out of order on purpose
    let detections = BTreeMap::from([(
        1,
        vec![
            Detection::new("Body Text", 0.9, [50.0, 400.0, 550.0, 450.0]),
            Detection::new("Section Header", 0.9, [50.0, 40.0, 300.0, 60.0]),
            Detection::new("Body Text", 0.9, [50.0, 100.0, 550.0, 200.0]),
            Detection::new("Body Text", 0.9, [50.0, 250.0, 550.0, 350.0]),
        ],
    )]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections)))
        .unwrap()
        .with_recognizer(Arc::new(FixedRecognizer("text")));
    let doc = pipeline
        .process_document(DocumentInput::new(metadata("column"), vec![blank_page(1, 600, 800)]))
        .await;

    let page = doc.page(1).unwrap();
    assert_eq!(page.records.len(), 4);
    assert_eq!(page.reading_order.len(), 4);
    let tops: Vec<f64> = page
        .reading_order
        .iter()
        .map(|id| page.records.iter().find(|r| &r.record_id == id).unwrap().bbox().t)
        .collect();
    assert!(tops.windows(2).all(|w| w[0] <= w[1]), "tops out of order: {tops:?}");
    assert_eq!(page.records[0].class(), RegionClass::SectionHeader);
}

#[tokio::test]
async fn test_two_columns_read_left_then_right() {
    let detections = BTreeMap::from([(
        1,
        vec![
            Detection::new("Body Text", 0.9, [310.0, 100.0, 550.0, 200.0]),
            Detection::new("Body Text", 0.9, [50.0, 300.0, 290.0, 400.0]),
            Detection::new("Body Text", 0.9, [50.0, 100.0, 290.0, 200.0]),
            Detection::new("Body Text", 0.9, [310.0, 300.0, 550.0, 400.0]),
        ],
    )]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections)))
        .unwrap()
        .with_recognizer(Arc::new(FixedRecognizer("text")));
    let doc = pipeline
        .process_document(DocumentInput::new(metadata("columns"), vec![blank_page(1, 600, 800)]))
        .await;

    let page = doc.page(1).unwrap();
    assert_eq!(page.columns, 2);
    let order: Vec<(usize, f64)> = page
        .reading_order
        .iter()
        .map(|id| {
            let record = page.records.iter().find(|r| &r.record_id == id).unwrap();
            (record.column, record.bbox().t)
        })
        .collect();
    assert_eq!(order[0].0, 0);
    assert_eq!(order[1].0, 0);
    assert_eq!(order[2].0, 1);
    assert_eq!(order[3].0, 1);
    assert!(order[0].1 < order[1].1);
}

#[tokio::test]
async fn test_table_with_caption() {
    let mut image = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    for (y0, y1) in [(110, 125), (150, 165), (200, 215)] {
        for y in y0..y1 {
            for x in 60..340 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    let detections = BTreeMap::from([(
        1,
        vec![
            Detection::new("Table", 0.95, [50.0, 100.0, 350.0, 250.0]),
            Detection::new("Table Caption", 0.9, [50.0, 60.0, 350.0, 85.0]),
        ],
    )]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections)))
        .unwrap()
        .with_recognizer(Arc::new(FixedRecognizer("Table 1")));
    let doc = pipeline
        .process_document(DocumentInput::new(
            metadata("table"),
            vec![PageSource::from_image(1, DynamicImage::ImageRgb8(image))],
        ))
        .await;

    let page = doc.page(1).unwrap();
    assert_eq!(page.records.len(), 1, "caption should merge into the table");
    let table = &page.records[0];
    assert_eq!(table.class(), RegionClass::Table);
    let caption = table.caption.as_ref().unwrap();
    assert_eq!(caption.class, RegionClass::TableCaption);
    assert_eq!(caption.text, "Table 1");
    let Some(StructuredPayload::Table { rows }) = &table.structured_payload else {
        panic!("table payload missing");
    };
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_unreadable_page_path_fails_page() {
    let detections = BTreeMap::from([(1, Vec::new()), (2, Vec::new())]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections))).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.png");
    let input = DocumentInput::new(
        metadata("paths"),
        vec![blank_page(1, 50, 50), PageSource::from_path(2, missing)],
    );

    let doc = pipeline.process_document(input).await;
    assert!(matches!(
        doc.page(2).unwrap().failure(),
        Some(PageFailure::MalformedInput { .. })
    ));
    assert_eq!(doc.status, DocumentStatus::Degraded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_keeps_input_order() {
    let detections = BTreeMap::from([(1, Vec::new())]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections))).unwrap();
    let inputs = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(|name| DocumentInput::new(metadata(name), vec![blank_page(1, 64, 64)]))
        .collect();

    let docs = pipeline.process_batch(inputs).await;
    let titles: Vec<&str> = docs
        .iter()
        .map(|d| d.metadata.title.as_deref().unwrap())
        .collect();
    assert_eq!(titles, vec!["alpha", "beta", "gamma"]);
    assert!(docs.iter().all(|d| d.status == DocumentStatus::Complete));
}

#[tokio::test]
async fn test_reprocessing_is_deterministic() {
    let detections = BTreeMap::from([(
        1,
        vec![
            Detection::new("Figure", 0.8, [20.0, 20.0, 180.0, 150.0]),
            Detection::new("Figure", 0.79, [22.0, 21.0, 181.0, 152.0]),
        ],
    )]);
    let pipeline = ExtractionPipeline::new(config(), Arc::new(ReplayDetector::new(detections))).unwrap();
    let make = || DocumentInput::new(metadata("again"), vec![blank_page(1, 200, 200)]);

    let first = pipeline.process_document(make()).await;
    let second = pipeline.process_document(make()).await;
    assert_eq!(first.content_hash(), second.content_hash());
    assert_eq!(first.document_id, second.document_id);
    assert_eq!(first.page(1).unwrap().records.len(), 1);
}
