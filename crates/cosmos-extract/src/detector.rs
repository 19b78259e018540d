//! Region Detector Adapter
//!
//! Wraps a spatial object-detection capability behind [`RegionDetector`] and
//! turns its raw output into [`CandidateRegion`]s:
//! - labels are mapped onto the [`RegionClass`] taxonomy (unknown labels are dropped)
//! - non-finite scores or coordinates are dropped
//! - inverted corners are normalized
//! - anything below `min_confidence` is dropped
//!
//! The adapter has no side effects. When the capability cannot be reached the
//! adapter fails with [`CosmosError::DetectionUnavailable`] and the caller
//! marks the page failed.

use cosmos_core::{BBox, CandidateRegion, CosmosError, DetectionConfig, Page, RegionClass, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a detection capability
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detector not available: {0}")]
    Unavailable(String),

    #[error("Detection failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw detector output: a labelled, scored box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f64,
    /// `[x0, y0, x1, y1]` in page pixels
    pub bbox: [f64; 4],
}

impl Detection {
    #[must_use]
    pub fn new(label: impl Into<String>, score: f64, bbox: [f64; 4]) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }
}

/// Spatial object-detection capability
///
/// Given a page raster, return scored boxes with class labels. Any model
/// runtime (local or remote) can implement this.
pub trait RegionDetector: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Detect regions on one page
    fn detect(&self, page: &Page) -> std::result::Result<Vec<Detection>, DetectorError>;
}

/// Validates and normalizes detector output for the resolver
#[derive(Clone)]
pub struct DetectorAdapter {
    detector: Arc<dyn RegionDetector>,
    config: DetectionConfig,
}

impl std::fmt::Debug for DetectorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorAdapter")
            .field("detector", &self.detector.name())
            .field("config", &self.config)
            .finish()
    }
}

impl DetectorAdapter {
    #[must_use = "returns a new DetectorAdapter instance"]
    pub fn new(detector: Arc<dyn RegionDetector>, config: DetectionConfig) -> Self {
        Self { detector, config }
    }

    #[must_use]
    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Run detection on a page and convert the result to candidate regions
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::DetectionUnavailable`] if the capability fails.
    pub fn detect(&self, page: &Page) -> Result<Vec<CandidateRegion>> {
        let raw = self
            .detector
            .detect(page)
            .map_err(|e| CosmosError::DetectionUnavailable {
                detector: self.detector.name().to_string(),
                reason: e.to_string(),
            })?;
        let total = raw.len();

        let candidates: Vec<CandidateRegion> = raw
            .into_iter()
            .filter_map(|det| self.convert(page.page_number, det))
            .collect();

        debug!(
            "Page {}: {} of {} detections kept (min_confidence={})",
            page.page_number,
            candidates.len(),
            total,
            self.config.min_confidence
        );
        Ok(candidates)
    }

    fn convert(&self, page_number: u32, det: Detection) -> Option<CandidateRegion> {
        let class = match det.label.parse::<RegionClass>() {
            Ok(class) => class,
            Err(e) => {
                warn!("Page {page_number}: dropping detection: {e}");
                return None;
            }
        };
        if !det.score.is_finite() || det.bbox.iter().any(|v| !v.is_finite()) {
            warn!("Page {page_number}: dropping non-finite {class} detection");
            return None;
        }
        let score = det.score.clamp(0.0, 1.0);
        if score < self.config.min_confidence {
            return None;
        }
        let [x0, y0, x1, y1] = det.bbox;
        let bbox = BBox::from_corners(x0, y0, x1, y1);
        if !bbox.is_valid() {
            debug!("Page {page_number}: dropping zero-area {class} detection");
            return None;
        }
        Some(CandidateRegion::new(page_number, class, score, bbox))
    }
}

/// Replays detections produced earlier by an external model service
///
/// The JSON input maps page numbers to detections:
///
/// ```json
/// {"1": [{"label": "Table", "score": 0.97, "bbox": [10, 20, 400, 300]}], "2": []}
/// ```
///
/// A page with an empty list has no regions; a page missing from the map is
/// reported as unavailable.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    pages: BTreeMap<u32, Vec<Detection>>,
}

impl ReplayDetector {
    #[must_use]
    pub fn new(pages: BTreeMap<u32, Vec<Detection>>) -> Self {
        Self { pages }
    }

    /// Parse a page-number-to-detections JSON map
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::JsonError`] if the JSON does not match that shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let pages: BTreeMap<u32, Vec<Detection>> = serde_json::from_str(json)?;
        Ok(Self { pages })
    }

    /// # Errors
    ///
    /// Returns [`CosmosError::IoError`] if the file cannot be read, or
    /// [`CosmosError::JsonError`] as for [`ReplayDetector::from_json`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl RegionDetector for ReplayDetector {
    fn name(&self) -> &str {
        "replay"
    }

    fn detect(&self, page: &Page) -> std::result::Result<Vec<Detection>, DetectorError> {
        self.pages.get(&page.page_number).cloned().ok_or_else(|| {
            DetectorError::Unavailable(format!("no detections recorded for page {}", page.page_number))
        })
    }
}

/// Detector used when no model is configured; every call fails
#[derive(Debug, Clone)]
pub struct UnavailableDetector {
    reason: String,
}

impl UnavailableDetector {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RegionDetector for UnavailableDetector {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn detect(&self, _page: &Page) -> std::result::Result<Vec<Detection>, DetectorError> {
        Err(DetectorError::Unavailable(self.reason.clone()))
    }
}
