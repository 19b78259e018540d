//! Page rasters

use crate::error::{CosmosError, Result};
use image::{DynamicImage, GenericImageView};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the raster for a page comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// An image file produced by the rasterization stage
    Path(PathBuf),
    /// An already decoded raster
    Image(Arc<DynamicImage>),
}

/// One page of an input document, before decoding
#[derive(Debug, Clone)]
pub struct PageSource {
    /// 1-based page number
    pub page_number: u32,
    pub source: ImageSource,
}

impl PageSource {
    #[must_use]
    pub fn from_path(page_number: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            page_number,
            source: ImageSource::Path(path.into()),
        }
    }

    #[must_use]
    pub fn from_image(page_number: u32, image: DynamicImage) -> Self {
        Self {
            page_number,
            source: ImageSource::Image(Arc::new(image)),
        }
    }

    /// Decode the raster and produce an immutable [`Page`]
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::MalformedInput`] when the image cannot be read,
    /// cannot be decoded, or has zero width or height.
    pub fn open(&self, document_id: &str) -> Result<Page> {
        let (image, path) = match &self.source {
            ImageSource::Image(image) => (Arc::clone(image), None),
            ImageSource::Path(path) => {
                let image = image::open(path).map_err(|e| CosmosError::MalformedInput {
                    page_number: self.page_number,
                    reason: format!("{}: {e}", path.display()),
                })?;
                (Arc::new(image), Some(path.clone()))
            }
        };
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CosmosError::MalformedInput {
                page_number: self.page_number,
                reason: format!("empty raster ({width}x{height})"),
            });
        }
        Ok(Page {
            document_id: document_id.to_string(),
            page_number: self.page_number,
            width,
            height,
            image,
            source: path,
        })
    }
}

/// A decoded page raster
///
/// Pages are never mutated after creation; workers share them through the
/// `Arc` around the raster.
#[derive(Debug, Clone)]
pub struct Page {
    pub document_id: String,
    /// 1-based page number
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub image: Arc<DynamicImage>,
    pub source: Option<PathBuf>,
}

impl Page {
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> (f64, f64) {
        (f64::from(self.width), f64::from(self.height))
    }
}
