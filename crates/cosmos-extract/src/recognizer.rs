//! Text recognition capability
//!
//! The content extractor calls [`TextRecognizer::recognize`] on region crops.
//! With the `tesseract` feature enabled, [`TesseractRecognizer`] provides a
//! local implementation backed by `leptess`.

use image::DynamicImage;
use thiserror::Error;

/// Errors reported by a recognition capability
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Recognizer not available: {0}")]
    Unavailable(String),

    #[error("Failed to run OCR: {0}")]
    Failed(String),

    #[error("Invalid image dimensions: {0}")]
    InvalidImageDimensions(String),
}

/// Given an image crop, return its text
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognitionError>;
}

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod tesseract {
    use super::{RecognitionError, TextRecognizer};
    use image::DynamicImage;
    use leptess::{LepTess, Variable};

    /// Tesseract OCR
    ///
    /// A fresh `LepTess` handle is created per call, so the recognizer can be
    /// shared across rayon workers.
    #[derive(Debug, Clone)]
    pub struct TesseractRecognizer {
        language: String,
        /// Tesseract page segmentation mode (6 = single uniform block)
        page_segmentation_mode: u32,
    }

    impl TesseractRecognizer {
        /// Create a recognizer, verifying the language data can be loaded
        ///
        /// # Errors
        ///
        /// Returns [`RecognitionError::Unavailable`] if Tesseract cannot load `language`.
        pub fn new(language: &str) -> Result<Self, RecognitionError> {
            LepTess::new(None, language).map_err(|e| {
                RecognitionError::Unavailable(format!(
                    "Failed to initialize Tesseract with language '{language}': {e}"
                ))
            })?;
            Ok(Self {
                language: language.to_string(),
                page_segmentation_mode: 6,
            })
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn name(&self) -> &str {
            "tesseract"
        }

        fn recognize(&self, image: &DynamicImage) -> Result<String, RecognitionError> {
            if image.width() == 0 || image.height() == 0 {
                return Err(RecognitionError::InvalidImageDimensions(format!(
                    "{}x{}",
                    image.width(),
                    image.height()
                )));
            }
            let mut lt = LepTess::new(None, &self.language)
                .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;
            lt.set_variable(
                Variable::TesseditPagesegMode,
                &self.page_segmentation_mode.to_string(),
            )
            .map_err(|e| RecognitionError::Failed(format!("Failed to set PSM: {e}")))?;

            // leptess expects encoded image data
            let mut png_buf = std::io::Cursor::new(Vec::new());
            image
                .write_to(&mut png_buf, image::ImageFormat::Png)
                .map_err(|e| RecognitionError::Failed(format!("Failed to encode crop: {e}")))?;
            lt.set_image_from_mem(png_buf.get_ref())
                .map_err(|e| RecognitionError::Failed(e.to_string()))?;

            lt.get_utf8_text()
                .map_err(|e| RecognitionError::Failed(e.to_string()))
        }
    }
}
