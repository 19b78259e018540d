//! Document Assembler
//!
//! Combines page records into one ordered document record.
//!
//! Algorithm:
//! 1. Sort pages by page number (completion order never matters)
//! 2. Collect failed pages and derive the document status
//! 3. Assign `document_id` = SHA-256 of the canonical JSON of metadata and pages
//!
//! Assembly is idempotent: the same metadata and pages always produce an
//! equal record with the same content hash.

use cosmos_core::{sha256_hex, DocumentMetadata, DocumentRecord, DocumentStatus, PageRecord};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentAssembler;

#[derive(Serialize)]
struct IdentityView<'a> {
    metadata: &'a DocumentMetadata,
    pages: &'a [PageRecord],
}

impl DocumentAssembler {
    #[inline]
    #[must_use = "returns a new DocumentAssembler instance"]
    pub const fn new() -> Self {
        Self
    }

    /// Assemble the first version of a document
    ///
    /// `incomplete` marks a document whose deadline elapsed before every page
    /// finished; the missing pages are expected as failed placeholders.
    #[must_use = "returns the assembled document record"]
    pub fn assemble(
        &self,
        metadata: DocumentMetadata,
        pages: Vec<PageRecord>,
        incomplete: bool,
    ) -> DocumentRecord {
        let pages = Self::order_pages(pages);
        let document_id = Self::document_id(&metadata, &pages);
        Self::build(document_id, 1, metadata, pages, incomplete)
    }

    /// Assemble a re-extraction of `previous` as its next version
    ///
    /// The document id and metadata carry over; the previous record is left untouched.
    #[must_use = "returns the new document version"]
    pub fn assemble_revision(
        &self,
        previous: &DocumentRecord,
        pages: Vec<PageRecord>,
        incomplete: bool,
    ) -> DocumentRecord {
        Self::build(
            previous.document_id.clone(),
            previous.version + 1,
            previous.metadata.clone(),
            Self::order_pages(pages),
            incomplete,
        )
    }

    fn order_pages(mut pages: Vec<PageRecord>) -> Vec<PageRecord> {
        pages.sort_by_key(|p| p.page_number);
        let before = pages.len();
        pages.dedup_by_key(|p| p.page_number);
        if pages.len() != before {
            warn!(
                "Dropped {} duplicate page record(s) during assembly",
                before - pages.len()
            );
        }
        pages
    }

    fn document_id(metadata: &DocumentMetadata, pages: &[PageRecord]) -> String {
        let view = IdentityView { metadata, pages };
        // Serializing plain data structs cannot fail
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        sha256_hex(&bytes)
    }

    fn build(
        document_id: String,
        version: u32,
        metadata: DocumentMetadata,
        pages: Vec<PageRecord>,
        incomplete: bool,
    ) -> DocumentRecord {
        let failed_pages: Vec<u32> = pages
            .iter()
            .filter(|p| p.is_failed())
            .map(|p| p.page_number)
            .collect();

        let status = if !pages.is_empty() && failed_pages.len() == pages.len() {
            DocumentStatus::Failed
        } else if incomplete {
            DocumentStatus::Incomplete
        } else if !failed_pages.is_empty() {
            DocumentStatus::Degraded
        } else {
            DocumentStatus::Complete
        };

        info!(
            "Assembled document {} v{version}: {} pages, {} failed, status {status:?}",
            &document_id[..document_id.len().min(12)],
            pages.len(),
            failed_pages.len()
        );

        DocumentRecord {
            document_id,
            version,
            metadata,
            pages,
            status,
            failed_pages,
            incomplete,
        }
    }
}
