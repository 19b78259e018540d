//! Content, page and document records
//!
//! These are the values handed to ingestion. They are built once and never
//! mutated; stages that need a different shape construct a new value.

use crate::class::RegionClass;
use crate::error::{PageFailure, RecordFlag};
use crate::geometry::BBox;
use crate::region::ResolvedRegion;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Lowercase hex SHA-256 of `bytes`
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Reference to the raster area a record was extracted from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRef {
    pub page_number: u32,
    /// Area actually cropped (includes any equation margin)
    pub bbox: BBox,
    /// Persisted crop image, when a crop store is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Non-text payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredPayload {
    /// Rows of cell text, top to bottom
    Table { rows: Vec<Vec<String>> },
}

impl StructuredPayload {
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Table { rows } => rows.len(),
        }
    }
}

/// Caption attached to a Figure or Table record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionLink {
    /// Record id the caption had before it was merged
    pub record_id: String,
    pub class: RegionClass,
    pub text: String,
    pub bbox: BBox,
    pub confidence: f64,
}

/// One extracted region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// `p{page:04}-r{index:03}`, stable for identical inputs
    pub record_id: String,
    pub region: ResolvedRegion,
    pub crop: CropRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_payload: Option<StructuredPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<CaptionLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<RecordFlag>,
    /// Column index within the page body (0 for furniture and spanning regions)
    #[serde(default)]
    pub column: usize,
    /// Position in the page reading order
    #[serde(default)]
    pub reading_index: usize,
}

impl ContentRecord {
    #[must_use]
    pub fn record_id_for(page_number: u32, index: usize) -> String {
        format!("p{page_number:04}-r{index:03}")
    }

    #[inline]
    #[must_use]
    pub fn class(&self) -> RegionClass {
        self.region.class
    }

    #[inline]
    #[must_use]
    pub fn bbox(&self) -> &BBox {
        &self.region.bbox
    }

    /// Recognized text, or the empty string
    #[must_use]
    pub fn text(&self) -> &str {
        self.extracted_text.as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, RecordFlag::ExtractionDegraded { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PageStatus {
    Ok,
    Failed { failure: PageFailure },
}

/// Ordered content of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_number: u32,
    pub status: PageStatus,
    /// Records in reading order
    pub records: Vec<ContentRecord>,
    /// Record ids in reading order
    pub reading_order: Vec<String>,
    /// Number of body columns detected
    #[serde(default)]
    pub columns: usize,
}

impl PageRecord {
    /// Placeholder for a page that produced no content
    #[must_use]
    pub fn failed(page_number: u32, failure: PageFailure) -> Self {
        Self {
            page_number,
            status: PageStatus::Failed { failure },
            records: Vec::new(),
            reading_order: Vec::new(),
            columns: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, PageStatus::Failed { .. })
    }

    #[must_use]
    pub fn failure(&self) -> Option<&PageFailure> {
        match &self.status {
            PageStatus::Failed { failure } => Some(failure),
            PageStatus::Ok => None,
        }
    }
}

/// Document-level metadata supplied by collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Every page processed
    Complete,
    /// Some pages failed; the rest are populated
    Degraded,
    /// The deadline elapsed before all pages finished
    Incomplete,
    /// No page could be processed
    Failed,
}

/// Assembled document, the unit handed to ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    /// Starts at 1; re-extraction appends a new version
    pub version: u32,
    pub metadata: DocumentMetadata,
    /// Ordered by page number
    pub pages: Vec<PageRecord>,
    pub status: DocumentStatus,
    pub failed_pages: Vec<u32>,
    pub incomplete: bool,
}

#[derive(Serialize)]
struct HashView<'a> {
    document_id: &'a str,
    metadata: &'a DocumentMetadata,
    pages: &'a [PageRecord],
    status: DocumentStatus,
    failed_pages: &'a [u32],
    incomplete: bool,
}

impl DocumentRecord {
    /// SHA-256 over the canonical JSON of the record, excluding `version`
    ///
    /// Two assemblies of the same inputs share this hash.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let view = HashView {
            document_id: &self.document_id,
            metadata: &self.metadata,
            pages: &self.pages,
            status: self.status,
            failed_pages: &self.failed_pages,
            incomplete: self.incomplete,
        };
        // Serializing plain data structs cannot fail
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        sha256_hex(&bytes)
    }

    /// Only a document with no usable page is fatal
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.status == DocumentStatus::Failed
    }

    pub fn records(&self) -> impl Iterator<Item = &ContentRecord> {
        self.pages.iter().flat_map(|p| p.records.iter())
    }

    #[must_use]
    pub fn page(&self, page_number: u32) -> Option<&PageRecord> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::ResolutionPolicy;

    fn record(page: u32, index: usize, class: RegionClass) -> ContentRecord {
        let bbox = BBox::new(0.0, 0.0, 10.0, 10.0);
        ContentRecord {
            record_id: ContentRecord::record_id_for(page, index),
            region: ResolvedRegion {
                page_number: page,
                class,
                bbox,
                confidence: 0.9,
                policy: ResolutionPolicy::Untouched,
                suppressed: 0,
            },
            crop: CropRef {
                page_number: page,
                bbox,
                path: None,
            },
            extracted_text: Some("hello".to_string()),
            structured_payload: None,
            caption: None,
            flags: Vec::new(),
            column: 0,
            reading_index: index,
        }
    }

    fn document(version: u32) -> DocumentRecord {
        let page = PageRecord {
            page_number: 1,
            status: PageStatus::Ok,
            records: vec![record(1, 0, RegionClass::BodyText)],
            reading_order: vec!["p0001-r000".to_string()],
            columns: 1,
        };
        DocumentRecord {
            document_id: "abc".to_string(),
            version,
            metadata: DocumentMetadata::default(),
            pages: vec![page],
            status: DocumentStatus::Complete,
            failed_pages: Vec::new(),
            incomplete: false,
        }
    }

    #[test]
    fn test_record_id_format() {
        assert_eq!(ContentRecord::record_id_for(3, 7), "p0003-r007");
    }

    #[test]
    fn test_content_hash_ignores_version() {
        assert_eq!(document(1).content_hash(), document(2).content_hash());
        assert_eq!(document(1).content_hash().len(), 64);
    }

    #[test]
    fn test_content_hash_tracks_content() {
        let mut changed = document(1);
        changed.pages[0].records[0].extracted_text = Some("world".to_string());
        assert_ne!(document(1).content_hash(), changed.content_hash());
    }

    #[test]
    fn test_failed_page_placeholder() {
        let page = PageRecord::failed(2, PageFailure::TimedOut);
        assert!(page.is_failed());
        assert!(page.records.is_empty());
        assert_eq!(page.failure(), Some(&PageFailure::TimedOut));
    }

    #[test]
    fn test_record_serialization_skips_empty_fields() {
        let json = serde_json::to_value(record(1, 0, RegionClass::Figure)).unwrap();
        assert!(json.get("caption").is_none());
        assert!(json.get("flags").is_none());
        assert_eq!(json["region"]["class"], "figure");
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
