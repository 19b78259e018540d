//! Extraction pipeline
//!
//! Runs detection, resolution, extraction and aggregation for every page of
//! a document on a bounded blocking worker pool, waits for the pages on a
//! [`CompletionGate`], and assembles the document record.
//!
//! # Examples
//!
//! ```no_run
//! use cosmos_core::{DocumentMetadata, ExtractionConfig};
//! use cosmos_extract::{DocumentInput, ExtractionPipeline, ReplayDetector};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> cosmos_core::Result<()> {
//! let detector = ReplayDetector::from_path(Path::new("detections.json"))?;
//! let pipeline = ExtractionPipeline::new(ExtractionConfig::default(), Arc::new(detector))?;
//! let input = DocumentInput::from_page_paths(
//!     DocumentMetadata::default(),
//!     vec!["page_1.png".into(), "page_2.png".into()],
//! );
//! let record = pipeline.process_document(input).await;
//! println!("{} pages, status {:?}", record.pages.len(), record.status);
//! # Ok(())
//! # }
//! ```

use crate::aggregator::PageAggregator;
use crate::assembler::DocumentAssembler;
use crate::completion::CompletionGate;
use crate::crop_store::CropStore;
use crate::detector::{DetectorAdapter, RegionDetector};
use crate::extractor::ContentExtractor;
use crate::recognizer::TextRecognizer;
use crate::resolver::RegionResolver;
use cosmos_core::{
    ComputeBudget, CosmosError, DocumentMetadata, DocumentRecord, ExtractionConfig, PageFailure,
    PageRecord, PageSource, Result,
};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One document to extract
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageSource>,
}

impl DocumentInput {
    #[must_use]
    pub fn new(metadata: DocumentMetadata, pages: Vec<PageSource>) -> Self {
        Self { metadata, pages }
    }

    /// Pages numbered 1..=n in the order given
    #[must_use]
    pub fn from_page_paths(metadata: DocumentMetadata, paths: Vec<PathBuf>) -> Self {
        let pages = paths
            .into_iter()
            .zip(1u32..)
            .map(|(path, page_number)| PageSource::from_path(page_number, path))
            .collect();
        Self { metadata, pages }
    }

    /// Short name used for page ids and crop file names
    #[must_use]
    pub fn document_key(&self) -> String {
        let stem = self
            .metadata
            .source_filename
            .as_deref()
            .and_then(|name| std::path::Path::new(name).file_stem())
            .and_then(|stem| stem.to_str())
            .unwrap_or("document");
        let key: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if key.is_empty() {
            "document".to_string()
        } else {
            key
        }
    }
}

/// Per-page stages, shared by every worker
#[derive(Debug, Clone)]
struct PageStages {
    detector: DetectorAdapter,
    resolver: RegionResolver,
    extractor: ContentExtractor,
    aggregator: PageAggregator,
}

impl PageStages {
    fn process_page(&self, document_key: &str, source: &PageSource) -> PageRecord {
        let page = match source.open(document_key) {
            Ok(page) => page,
            Err(e) => {
                warn!("Skipping page {}: {e}", source.page_number);
                return PageRecord::failed(source.page_number, PageFailure::from(&e));
            }
        };

        let candidates = match self.detector.detect(&page) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Page {} failed: {e}", page.page_number);
                return PageRecord::failed(page.page_number, PageFailure::from(&e));
            }
        };

        let (width, height) = page.dimensions();
        let resolved = self
            .resolver
            .resolve_page(page.page_number, candidates, width, height);
        let records = self.extractor.extract(&page, resolved, document_key);
        self.aggregator.aggregate(page.page_number, width, records)
    }
}

/// The full extraction pipeline
///
/// Cloning is cheap; clones share the worker pool.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    stages: Arc<PageStages>,
    assembler: DocumentAssembler,
    config: ExtractionConfig,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl ExtractionPipeline {
    /// Build a pipeline around a detection capability
    ///
    /// Worker count comes from `runtime.max_concurrent_pages`, or the CPU count.
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::ConfigError`] if the configuration is invalid.
    pub fn new(config: ExtractionConfig, detector: Arc<dyn RegionDetector>) -> Result<Self> {
        config.validate()?;
        let stages = PageStages {
            detector: DetectorAdapter::new(detector, config.detection.clone()),
            resolver: RegionResolver::with_config(config.resolution.clone()),
            extractor: ContentExtractor::new(config.content.clone()),
            aggregator: PageAggregator::with_config(config.aggregation.clone()),
        };
        let workers = config
            .runtime
            .max_concurrent_pages
            .unwrap_or_else(|| ComputeBudget::cpu_only().workers());
        Ok(Self {
            stages: Arc::new(stages),
            assembler: DocumentAssembler::new(),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            config,
        })
    }

    /// Size the worker pool from accelerator memory, unless the config fixes it
    #[must_use]
    pub fn with_compute_budget(mut self, budget: ComputeBudget) -> Self {
        if self.config.runtime.max_concurrent_pages.is_none() {
            self.workers = budget.workers();
            self.permits = Arc::new(Semaphore::new(self.workers));
        }
        self
    }

    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let stages = Arc::make_mut(&mut self.stages);
        stages.extractor = stages.extractor.clone().with_recognizer(recognizer);
        self
    }

    #[must_use]
    pub fn with_crop_store(mut self, store: CropStore) -> Self {
        let stages = Arc::make_mut(&mut self.stages);
        stages.extractor = stages.extractor.clone().with_crop_store(store);
        self
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract one document
    ///
    /// Page failures are recorded on the returned record; this never fails as
    /// a whole. With a document timeout configured, pages still running at
    /// the deadline are marked `TimedOut` and the record is flagged
    /// `incomplete`. Their in-flight work is not cancelled, but pages that
    /// had not yet acquired a worker slot are skipped.
    pub async fn process_document(&self, input: DocumentInput) -> DocumentRecord {
        let document_key = Arc::new(input.document_key());
        let page_numbers: BTreeSet<u32> = input.pages.iter().map(|p| p.page_number).collect();
        if page_numbers.len() != input.pages.len() {
            warn!(
                "Document {document_key}: {} duplicate page numbers in input",
                input.pages.len() - page_numbers.len()
            );
        }
        info!(
            "Document {document_key}: extracting {} pages on {} workers",
            input.pages.len(),
            self.workers
        );

        let (gate, handle) = CompletionGate::new(input.pages.len());
        for source in input.pages {
            let stages = Arc::clone(&self.stages);
            let permits = Arc::clone(&self.permits);
            let document_key = Arc::clone(&document_key);
            let handle = handle.clone();

            tokio::spawn(async move {
                let page_number = source.page_number;
                let record = match permits.acquire_owned().await {
                    Ok(permit) => {
                        // Pages still queued at the deadline give their slot back unused
                        if handle.is_closed() {
                            debug!("Page {page_number} skipped: its document was already emitted");
                            return;
                        }
                        let work = tokio::task::spawn_blocking(move || {
                            let _permit = permit;
                            stages.process_page(&document_key, &source)
                        });
                        match work.await {
                            Ok(record) => record,
                            Err(e) => PageRecord::failed(
                                page_number,
                                PageFailure::WorkerLost {
                                    reason: e.to_string(),
                                },
                            ),
                        }
                    }
                    Err(e) => PageRecord::failed(
                        page_number,
                        PageFailure::WorkerLost {
                            reason: e.to_string(),
                        },
                    ),
                };
                if !handle.complete(record) {
                    debug!("Page {page_number} finished after its document was emitted");
                }
            });
        }
        drop(handle);

        let outcome = gate.wait(self.config.runtime.document_timeout()).await;
        let mut pages = outcome.completed;

        let finished: BTreeSet<u32> = pages.iter().map(|p| p.page_number).collect();
        let missing: Vec<u32> = page_numbers.difference(&finished).copied().collect();
        if outcome.timed_out {
            let err = CosmosError::AggregationIncomplete {
                completed: finished.len(),
                expected: page_numbers.len(),
            };
            warn!("Document {document_key}: {err}");
        }
        for page_number in missing {
            let failure = if outcome.timed_out {
                PageFailure::TimedOut
            } else {
                PageFailure::WorkerLost {
                    reason: "page worker exited without a result".to_string(),
                }
            };
            pages.push(PageRecord::failed(page_number, failure));
        }

        self.assembler
            .assemble(input.metadata, pages, outcome.timed_out)
    }

    /// Extract several documents concurrently on the shared worker pool
    ///
    /// Results are returned in input order. A document whose task panics is
    /// returned with every page marked failed; the rest of the batch is
    /// unaffected.
    pub async fn process_batch(&self, inputs: Vec<DocumentInput>) -> Vec<DocumentRecord> {
        let fallbacks: Vec<(DocumentMetadata, Vec<u32>)> = inputs
            .iter()
            .map(|input| {
                (
                    input.metadata.clone(),
                    input.pages.iter().map(|p| p.page_number).collect(),
                )
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let pipeline = self.clone();
            tasks.spawn(async move { (index, pipeline.process_document(input).await) });
        }

        let mut results: Vec<Option<DocumentRecord>> = vec![None; fallbacks.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, record)) => results[index] = Some(record),
                Err(e) => warn!("Document task failed: {e}"),
            }
        }

        results
            .into_iter()
            .zip(fallbacks)
            .map(|(record, (metadata, page_numbers))| {
                record.unwrap_or_else(|| {
                    let pages = page_numbers
                        .into_iter()
                        .map(|n| {
                            PageRecord::failed(
                                n,
                                PageFailure::WorkerLost {
                                    reason: "document task panicked".to_string(),
                                },
                            )
                        })
                        .collect();
                    self.assembler.assemble(metadata, pages, false)
                })
            })
            .collect()
    }

    /// Blocking convenience wrapper for callers without a runtime
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::IoError`] if the runtime cannot be built.
    pub fn process_document_blocking(&self, input: DocumentInput) -> Result<DocumentRecord> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.process_document(input)))
    }

    #[must_use]
    pub fn document_timeout(&self) -> Option<Duration> {
        self.config.runtime.document_timeout()
    }
}
