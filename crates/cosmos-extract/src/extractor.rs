//! Content Extractor
//!
//! Populates each resolved region with its semantic payload:
//! - text-bearing classes: recognized, normalized text
//! - tables: rows of cell text from whitespace-gap grouping
//! - figures and equations: crop reference only (equations get an extra margin)
//!
//! A recognition failure degrades the record to empty text with an
//! [`RecordFlag::ExtractionDegraded`] flag; it never aborts the page.

use crate::crop_store::CropStore;
use crate::recognizer::TextRecognizer;
use crate::table_rows::segment_table;
use crate::text::{join_table_rows, normalize_text};
use cosmos_core::{
    BBox, ContentConfig, ContentRecord, CropRef, Page, RecordFlag, RegionClass, ResolvedRegion,
    StructuredPayload,
};
use image::DynamicImage;
use log::{debug, warn};
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ContentExtractor {
    config: ContentConfig,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    crop_store: Option<CropStore>,
}

impl std::fmt::Debug for ContentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentExtractor")
            .field("config", &self.config)
            .field("recognizer", &self.recognizer.as_ref().map(|r| r.name()))
            .field("crop_store", &self.crop_store)
            .finish()
    }
}

/// Outcome of recognizing one region or cell
struct Recognized {
    text: String,
    failure: Option<String>,
}

impl ContentExtractor {
    #[must_use = "returns a new ContentExtractor instance"]
    pub fn new(config: ContentConfig) -> Self {
        Self {
            config,
            recognizer: None,
            crop_store: None,
        }
    }

    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    #[must_use]
    pub fn with_crop_store(mut self, store: CropStore) -> Self {
        self.crop_store = Some(store);
        self
    }

    /// Extract every region of a page, in parallel
    ///
    /// Records keep the order of `regions`; the record id encodes the index.
    /// `crop_prefix` names persisted crop files.
    #[must_use = "returns the extracted content records"]
    pub fn extract(
        &self,
        page: &Page,
        regions: Vec<ResolvedRegion>,
        crop_prefix: &str,
    ) -> Vec<ContentRecord> {
        let records: Vec<ContentRecord> = regions
            .into_par_iter()
            .enumerate()
            .map(|(index, region)| self.extract_region(page, index, region, crop_prefix))
            .collect();

        let degraded = records.iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            warn!(
                "Page {}: {degraded} of {} regions degraded",
                page.page_number,
                records.len()
            );
        }
        records
    }

    fn crop_box(&self, page: &Page, region: &ResolvedRegion) -> BBox {
        let (width, height) = page.dimensions();
        if region.class == RegionClass::Equation {
            region
                .bbox
                .expand(self.config.equation_margin)
                .clip(width, height)
        } else {
            region.bbox
        }
    }

    fn extract_region(
        &self,
        page: &Page,
        index: usize,
        region: ResolvedRegion,
        crop_prefix: &str,
    ) -> ContentRecord {
        let crop_box = self.crop_box(page, &region);
        let crop = crop_box
            .pixel_rect(page.width, page.height)
            .map(|(x, y, w, h)| page.image.crop_imm(x, y, w, h));

        let path = match (&self.crop_store, &crop) {
            (Some(store), Some(image)) => {
                match store.save(crop_prefix, page.page_number, index, region.class, image) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("Page {}: failed to save crop {index}: {e}", page.page_number);
                        None
                    }
                }
            }
            _ => None,
        };

        let mut flags = Vec::new();
        let mut extracted_text = None;
        let mut structured_payload = None;

        if region.class == RegionClass::Table {
            let (rows, failure) = match &crop {
                Some(image) => self.extract_table(image),
                None => (Vec::new(), Some("empty crop".to_string())),
            };
            if let Some(reason) = failure {
                flags.push(RecordFlag::ExtractionDegraded { reason });
            }
            extracted_text = Some(join_table_rows(&rows));
            structured_payload = Some(StructuredPayload::Table { rows });
        } else if region.class.is_text_bearing() {
            let recognized = match &crop {
                Some(image) => self.recognize(image),
                None => Recognized {
                    text: String::new(),
                    failure: Some("empty crop".to_string()),
                },
            };
            if let Some(reason) = recognized.failure {
                flags.push(RecordFlag::ExtractionDegraded { reason });
            }
            extracted_text = Some(recognized.text);
        }

        ContentRecord {
            record_id: ContentRecord::record_id_for(page.page_number, index),
            crop: CropRef {
                page_number: page.page_number,
                bbox: crop_box,
                path,
            },
            region,
            extracted_text,
            structured_payload,
            caption: None,
            flags,
            column: 0,
            reading_index: index,
        }
    }

    fn recognize(&self, image: &DynamicImage) -> Recognized {
        let Some(recognizer) = &self.recognizer else {
            return Recognized {
                text: String::new(),
                failure: Some("no text recognizer configured".to_string()),
            };
        };
        match recognizer.recognize(image) {
            Ok(raw) => Recognized {
                text: normalize_text(&raw),
                failure: None,
            },
            Err(e) => Recognized {
                text: String::new(),
                failure: Some(format!("{}: {e}", recognizer.name())),
            },
        }
    }

    /// Rows of cell text; the second value reports the first cell failure
    fn extract_table(&self, image: &DynamicImage) -> (Vec<Vec<String>>, Option<String>) {
        let bands = segment_table(&image.to_luma8(), &self.config);
        debug!("Table crop split into {} row bands", bands.len());

        let mut failure = None;
        let rows = bands
            .iter()
            .map(|band| {
                band.cells
                    .iter()
                    .map(|&(left, right)| {
                        let cell = image.crop_imm(left, band.top, right - left, band.height());
                        let recognized = self.recognize(&cell);
                        if failure.is_none() {
                            failure = recognized.failure;
                        }
                        recognized.text
                    })
                    .collect()
            })
            .collect();
        (rows, failure)
    }
}
