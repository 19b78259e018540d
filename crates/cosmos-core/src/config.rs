//! Extraction configuration
//!
//! Every stage of the pipeline has its own config struct with defaults; the
//! structs are aggregated into [`ExtractionConfig`], which can be loaded from
//! TOML (missing keys fall back to defaults) or built fluently with
//! [`ExtractionConfigBuilder`].
//!
//! # Examples
//!
//! ```
//! use cosmos_core::config::ExtractionConfigBuilder;
//!
//! # fn main() -> cosmos_core::Result<()> {
//! let config = ExtractionConfigBuilder::new()
//!     .min_confidence(0.6)
//!     .iou_threshold(0.4)
//!     .caption_distance(80.0)
//!     .build()?;
//! assert_eq!(config.resolution.iou_threshold, 0.4);
//! # Ok(())
//! # }
//! ```

use crate::class::RegionClass;
use crate::error::{CosmosError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Region detector adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Candidates scoring below this are dropped at the detector boundary
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

/// Region resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Two overlap-sensitive regions above this `IoU` are duplicates
    pub iou_threshold: f64,
    /// Confidences closer than this are treated as tied
    pub confidence_epsilon: f64,
    /// Intersection-over-self at which a region counts as inside another
    pub containment_threshold: f64,
    /// Margin added on every side of a surviving region, in pixels
    pub padding: f64,
    /// Classes that take part in same-page duplicate suppression
    pub overlap_sensitive: Vec<RegionClass>,
    /// Highest priority first
    pub class_priority: Vec<RegionClass>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            confidence_epsilon: 0.01,
            containment_threshold: 0.8,
            padding: 5.0,
            overlap_sensitive: RegionClass::ALL.to_vec(),
            class_priority: vec![
                RegionClass::Table,
                RegionClass::Figure,
                RegionClass::Equation,
                RegionClass::SectionHeader,
                RegionClass::TableCaption,
                RegionClass::FigureCaption,
                RegionClass::Caption,
                RegionClass::BodyText,
                RegionClass::PageHeader,
                RegionClass::PageFooter,
            ],
        }
    }
}

impl ResolutionConfig {
    #[inline]
    #[must_use]
    pub fn is_overlap_sensitive(&self, class: RegionClass) -> bool {
        self.overlap_sensitive.contains(&class)
    }

    /// Rank of a class in the priority list; lower wins, unlisted classes rank last
    #[inline]
    #[must_use]
    pub fn priority_rank(&self, class: RegionClass) -> usize {
        self.class_priority
            .iter()
            .position(|c| *c == class)
            .unwrap_or(self.class_priority.len())
    }
}

/// Image encoding used when crops are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CropFormat {
    /// Lossless, full resolution
    #[default]
    Png,
    /// Compressed with the configured quality
    Jpeg,
}

impl CropFormat {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Content extractor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Extra margin around equation crops, in pixels
    pub equation_margin: f64,
    /// Grayscale value below which a pixel counts as ink (0-255)
    pub ink_threshold: u8,
    /// Minimum blank run separating two table rows, in pixels
    pub min_row_gap: u32,
    /// Minimum blank run separating two table cells, in pixels
    pub min_column_gap: u32,
    pub crop_format: CropFormat,
    /// JPEG quality (1-100), ignored for PNG
    pub jpeg_quality: u8,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            equation_margin: 8.0,
            ink_threshold: 160,
            min_row_gap: 4,
            min_column_gap: 12,
            crop_format: CropFormat::Png,
            jpeg_quality: 85,
        }
    }
}

/// Page aggregator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Maximum distance from a caption centroid to the associated Figure/Table box, in pixels
    pub caption_distance: f64,
    /// Regions at least this fraction of the page width break columns into bands
    pub spanning_width_ratio: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            caption_distance: 100.0,
            spanning_width_ratio: 0.6,
        }
    }
}

/// Scheduling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pages processed concurrently; `None` derives it from [`crate::ComputeBudget`]
    pub max_concurrent_pages: Option<usize>,
    /// Per-document deadline in seconds; `None` waits for every page
    pub document_timeout_secs: Option<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: None,
            document_timeout_secs: Some(600.0),
        }
    }
}

impl RuntimeConfig {
    /// Deadline for one document; a value no `Duration` can hold means no deadline
    #[must_use]
    pub fn document_timeout(&self) -> Option<Duration> {
        self.document_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Complete configuration of the extraction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractionConfig {
    pub detection: DetectionConfig,
    pub resolution: ResolutionConfig,
    pub content: ContentConfig,
    pub aggregation: AggregationConfig,
    pub runtime: RuntimeConfig,
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CosmosError::config(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CosmosError::config(format!(
            "{name} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

impl ExtractionConfig {
    /// Parse a TOML document; absent tables and keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::TomlError`] for malformed TOML and
    /// [`CosmosError::ConfigError`] when a setting is out of range.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::IoError`] if the file cannot be read, otherwise
    /// the same errors as [`ExtractionConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::ConfigError`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CosmosError::config(format!("cannot serialize config: {e}")))
    }

    /// Check every setting against its allowed range
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::ConfigError`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        check_unit("detection.min_confidence", self.detection.min_confidence)?;

        let res = &self.resolution;
        check_unit("resolution.iou_threshold", res.iou_threshold)?;
        check_unit("resolution.confidence_epsilon", res.confidence_epsilon)?;
        check_unit("resolution.containment_threshold", res.containment_threshold)?;
        check_non_negative("resolution.padding", res.padding)?;
        if res.class_priority.is_empty() {
            return Err(CosmosError::config("resolution.class_priority is empty"));
        }
        for (i, class) in res.class_priority.iter().enumerate() {
            if res.class_priority[..i].contains(class) {
                return Err(CosmosError::config(format!(
                    "resolution.class_priority lists {class} twice"
                )));
            }
        }

        let content = &self.content;
        check_non_negative("content.equation_margin", content.equation_margin)?;
        if !(1..=100).contains(&content.jpeg_quality) {
            return Err(CosmosError::config(format!(
                "content.jpeg_quality must be within [1, 100], got {}",
                content.jpeg_quality
            )));
        }

        check_non_negative("aggregation.caption_distance", self.aggregation.caption_distance)?;
        check_unit(
            "aggregation.spanning_width_ratio",
            self.aggregation.spanning_width_ratio,
        )?;

        if self.runtime.max_concurrent_pages == Some(0) {
            return Err(CosmosError::config(
                "runtime.max_concurrent_pages must be at least 1",
            ));
        }
        if let Some(secs) = self.runtime.document_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(CosmosError::config(format!(
                    "runtime.document_timeout_secs must be positive, got {secs}"
                )));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(CosmosError::config(format!(
                    "runtime.document_timeout_secs is too large, got {secs}"
                )));
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`ExtractionConfig`]
///
/// `build()` validates the result, so an out-of-range value is reported before
/// any document is processed.
#[derive(Debug, Clone, Default)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    #[inline]
    #[must_use = "returns a new builder with default settings"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from TOML
    #[inline]
    #[must_use]
    pub fn from_config(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Default: 0.5
    #[inline]
    #[must_use = "returns the builder with the detection threshold configured"]
    pub fn min_confidence(mut self, value: f64) -> Self {
        self.config.detection.min_confidence = value;
        self
    }

    /// Default: 0.5
    #[inline]
    #[must_use = "returns the builder with the IoU threshold configured"]
    pub fn iou_threshold(mut self, value: f64) -> Self {
        self.config.resolution.iou_threshold = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn confidence_epsilon(mut self, value: f64) -> Self {
        self.config.resolution.confidence_epsilon = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn containment_threshold(mut self, value: f64) -> Self {
        self.config.resolution.containment_threshold = value;
        self
    }

    /// Region padding in pixels. Default: 5
    #[inline]
    #[must_use = "returns the builder with region padding configured"]
    pub fn padding(mut self, value: f64) -> Self {
        self.config.resolution.padding = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn overlap_sensitive(mut self, classes: Vec<RegionClass>) -> Self {
        self.config.resolution.overlap_sensitive = classes;
        self
    }

    /// Class priority, highest first
    #[inline]
    #[must_use = "returns the builder with class priority configured"]
    pub fn class_priority(mut self, classes: Vec<RegionClass>) -> Self {
        self.config.resolution.class_priority = classes;
        self
    }

    #[inline]
    #[must_use]
    pub fn equation_margin(mut self, value: f64) -> Self {
        self.config.content.equation_margin = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn ink_threshold(mut self, value: u8) -> Self {
        self.config.content.ink_threshold = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn crop_format(mut self, format: CropFormat) -> Self {
        self.config.content.crop_format = format;
        self
    }

    #[inline]
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.content.jpeg_quality = quality;
        self
    }

    /// Caption association distance in pixels. Default: 100
    #[inline]
    #[must_use = "returns the builder with caption distance configured"]
    pub fn caption_distance(mut self, value: f64) -> Self {
        self.config.aggregation.caption_distance = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn spanning_width_ratio(mut self, value: f64) -> Self {
        self.config.aggregation.spanning_width_ratio = value;
        self
    }

    #[inline]
    #[must_use]
    pub fn max_concurrent_pages(mut self, value: usize) -> Self {
        self.config.runtime.max_concurrent_pages = Some(value);
        self
    }

    /// `None` disables the per-document deadline
    #[inline]
    #[must_use = "returns the builder with the document timeout configured"]
    pub fn document_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.runtime.document_timeout_secs = timeout.map(|d| d.as_secs_f64());
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::ConfigError`] as for [`ExtractionConfig::validate`].
    pub fn build(self) -> Result<ExtractionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolution.iou_threshold, 0.5);
        assert_eq!(config.detection.min_confidence, 0.5);
        assert_eq!(config.aggregation.caption_distance, 100.0);
    }

    #[test]
    fn test_priority_rank() {
        let config = ResolutionConfig::default();
        assert!(
            config.priority_rank(RegionClass::Table) < config.priority_rank(RegionClass::BodyText)
        );
        let short = ResolutionConfig {
            class_priority: vec![RegionClass::Figure],
            ..ResolutionConfig::default()
        };
        assert_eq!(short.priority_rank(RegionClass::Table), 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ExtractionConfig::from_toml_str(
            r#"
            [resolution]
            iou_threshold = 0.3
            class_priority = ["figure", "table", "body_text"]

            [runtime]
            max_concurrent_pages = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.resolution.iou_threshold, 0.3);
        assert_eq!(config.resolution.padding, 5.0);
        assert_eq!(config.resolution.class_priority[0], RegionClass::Figure);
        assert_eq!(config.runtime.max_concurrent_pages, Some(2));
        assert_eq!(config.content, ContentConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ExtractionConfigBuilder::new()
            .crop_format(CropFormat::Jpeg)
            .caption_distance(42.0)
            .build()
            .unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(ExtractionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(ExtractionConfigBuilder::new().iou_threshold(1.5).build().is_err());
        assert!(ExtractionConfigBuilder::new().padding(-1.0).build().is_err());
        assert!(ExtractionConfigBuilder::new()
            .max_concurrent_pages(0)
            .build()
            .is_err());
        assert!(ExtractionConfigBuilder::new().jpeg_quality(0).build().is_err());
    }

    #[test]
    fn test_rejects_duplicate_priority() {
        let err = ExtractionConfigBuilder::new()
            .class_priority(vec![RegionClass::Table, RegionClass::Table])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = ExtractionConfig::from_toml_str("[resolution\n").unwrap_err();
        assert!(matches!(err, CosmosError::TomlError(_)));
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let err = ExtractionConfig::from_toml_str("[runtime]\ndocument_timeout_secs = 1e20\n")
            .unwrap_err();
        assert!(err.to_string().contains("too large"));

        let runtime = RuntimeConfig {
            document_timeout_secs: Some(1e20),
            ..RuntimeConfig::default()
        };
        assert_eq!(runtime.document_timeout(), None);
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExtractionConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, CosmosError::IoError(_)));
    }

    #[test]
    fn test_document_timeout_conversion() {
        let config = ExtractionConfigBuilder::new()
            .document_timeout(Some(Duration::from_millis(1500)))
            .build()
            .unwrap();
        assert_eq!(
            config.runtime.document_timeout(),
            Some(Duration::from_millis(1500))
        );
    }
}
