//! Candidate and resolved page regions

use crate::class::RegionClass;
use crate::geometry::BBox;
use serde::{Deserialize, Serialize};

/// Producer of a candidate region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    #[default]
    Detector,
}

/// Scored box reported by the detector, before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRegion {
    pub page_number: u32,
    pub class: RegionClass,
    /// In [0, 1]
    pub confidence: f64,
    pub bbox: BBox,
    #[serde(default)]
    pub source: RegionSource,
}

impl CandidateRegion {
    #[must_use]
    pub fn new(page_number: u32, class: RegionClass, confidence: f64, bbox: BBox) -> Self {
        Self {
            page_number,
            class,
            confidence,
            bbox,
            source: RegionSource::Detector,
        }
    }
}

/// Which rule decided the final shape of a resolved region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// No other candidate conflicted with this one
    Untouched,
    /// Won against same-page duplicates above the `IoU` threshold
    IouSuppression,
    /// Absorbed lower-priority regions it contained
    ClassPriority,
    /// Won a conflict introduced by padding
    PaddingConflict,
}

/// Region after overlap resolution, padding and clipping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRegion {
    pub page_number: u32,
    pub class: RegionClass,
    pub bbox: BBox,
    pub confidence: f64,
    pub policy: ResolutionPolicy,
    /// How many candidates this region displaced
    #[serde(default)]
    pub suppressed: usize,
}
