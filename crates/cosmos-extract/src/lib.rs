//! # COSMOS Extract - Page Extraction Pipeline
//!
//! Turns page images into structured document records:
//!
//! 1. **Detect** - a [`RegionDetector`] proposes labeled, scored boxes
//! 2. **Resolve** - [`RegionResolver`] removes duplicate and nested regions, pads and clips
//! 3. **Extract** - [`ContentExtractor`] crops regions and recognizes text and table rows
//! 4. **Aggregate** - [`PageAggregator`] attaches captions and orders the page for reading
//! 5. **Assemble** - [`DocumentAssembler`] combines pages into a versioned document record
//!
//! [`ExtractionPipeline`] runs stages 1-4 per page on a bounded worker pool
//! and assembles the result. A failing page is recorded as failed; it never
//! aborts its document.
//!
//! Finished records can be flattened for search indexing ([`ingest`]) or
//! compared against hand annotations ([`evaluation`]).

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod assembler;
pub mod completion;
pub mod crop_store;
pub mod detector;
pub mod evaluation;
pub mod extractor;
pub mod ingest;
pub mod pipeline;
pub mod recognizer;
pub mod resolver;
pub mod table_rows;
pub mod text;

pub use aggregator::PageAggregator;
pub use assembler::DocumentAssembler;
pub use completion::{CompletionGate, CompletionHandle, GateOutcome};
pub use crop_store::CropStore;
pub use detector::{
    Detection, DetectorAdapter, DetectorError, RegionDetector, ReplayDetector, UnavailableDetector,
};
pub use evaluation::{AnnotationComparator, EvaluationReport, ExpectedRegion, LabelComparison};
pub use extractor::ContentExtractor;
pub use ingest::{FullDocument, IngestExporter, IngestFormat, IngestObject, IngestOptions, IngestSummary};
pub use pipeline::{DocumentInput, ExtractionPipeline};
pub use recognizer::{RecognitionError, TextRecognizer};
#[cfg(feature = "tesseract")]
pub use recognizer::TesseractRecognizer;
pub use resolver::RegionResolver;
