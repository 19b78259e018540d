//! Persisted region crops
//!
//! Crops are written either as full-resolution PNG or as compressed JPEG.
//! File names are deterministic: `{prefix}_p{page:04}_r{index:03}_{class}.{ext}`.

use cosmos_core::{ContentConfig, CropFormat, RegionClass, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Writes crop images into one directory
#[derive(Debug, Clone)]
pub struct CropStore {
    dir: PathBuf,
    format: CropFormat,
    jpeg_quality: u8,
}

impl CropStore {
    /// Create the store, creating `dir` if needed
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::IoError`](cosmos_core::CosmosError::IoError) if
    /// the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>, format: CropFormat, jpeg_quality: u8) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            format,
            jpeg_quality,
        })
    }

    /// # Errors
    ///
    /// Same as [`CropStore::new`].
    pub fn from_config(dir: impl Into<PathBuf>, config: &ContentConfig) -> Result<Self> {
        Self::new(dir, config.crop_format, config.jpeg_quality)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn file_name(
        &self,
        prefix: &str,
        page_number: u32,
        index: usize,
        class: RegionClass,
    ) -> String {
        let class_slug = class.as_str().to_lowercase().replace(' ', "_");
        format!(
            "{prefix}_p{page_number:04}_r{index:03}_{class_slug}.{}",
            self.format.extension()
        )
    }

    /// Encode and write one crop, returning its path
    ///
    /// # Errors
    ///
    /// Returns [`CosmosError::IoError`](cosmos_core::CosmosError::IoError) or
    /// [`CosmosError::ImageError`](cosmos_core::CosmosError::ImageError) if
    /// the file cannot be created or encoded.
    pub fn save(
        &self,
        prefix: &str,
        page_number: u32,
        index: usize,
        class: RegionClass,
        crop: &DynamicImage,
    ) -> Result<PathBuf> {
        let path = self
            .dir
            .join(self.file_name(prefix, page_number, index, class));
        match self.format {
            CropFormat::Png => crop.save_with_format(&path, ImageFormat::Png)?,
            CropFormat::Jpeg => {
                let writer = BufWriter::new(File::create(&path)?);
                let encoder = JpegEncoder::new_with_quality(writer, self.jpeg_quality);
                crop.to_rgb8().write_with_encoder(encoder)?;
            }
        }
        Ok(path)
    }
}
