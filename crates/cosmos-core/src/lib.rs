//! # COSMOS Core - Extraction Data Model
//!
//! Shared types for the COSMOS extraction pipeline: page rasters, detected and
//! resolved regions, content/page/document records, geometry, configuration
//! and errors. The pipeline stages themselves live in `cosmos-extract`.
//!
//! ## Coordinates
//!
//! Boxes are in page-image pixels with the origin at the top-left corner.
//! Page numbers are 1-based.
//!
//! ## Example
//!
//! ```
//! use cosmos_core::{BBox, RegionClass};
//!
//! let table = BBox::new(100.0, 200.0, 500.0, 400.0);
//! let duplicate = BBox::new(110.0, 205.0, 500.0, 400.0);
//! assert!(table.iou(&duplicate) > 0.9);
//!
//! let class: RegionClass = "Table Caption".parse().unwrap();
//! assert!(class.captions(RegionClass::Table));
//! ```

pub mod class;
pub mod compute;
pub mod config;
pub mod error;
pub mod geometry;
pub mod page;
pub mod record;
pub mod region;

pub use class::{RegionClass, UnknownLabel};
pub use compute::ComputeBudget;
pub use config::{
    AggregationConfig, ContentConfig, CropFormat, DetectionConfig, ExtractionConfig,
    ExtractionConfigBuilder, ResolutionConfig, RuntimeConfig,
};
pub use error::*;
pub use geometry::BBox;
pub use page::{ImageSource, Page, PageSource};
pub use record::*;
pub use region::*;
