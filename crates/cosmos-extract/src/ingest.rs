//! Ingestion export
//!
//! Flattens document records into the objects consumed by the search index:
//! one object per Table, Figure and Equation, body text grouped into
//! `Section` objects under their section header, and one full-document
//! record per document with all of its text. Objects carry a deterministic
//! SHA-256 id; identical objects are written once.
//!
//! Output is newline-delimited JSON, either plain (one tagged object per
//! line) or in bulk-index format (an action line before every object),
//! flushed in batches of `batch_size` objects.

use cosmos_core::{sha256_hex, BBox, ContentRecord, DocumentRecord, RegionClass, Result};
use log::{debug, info};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Objects per bulk request
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Index name used for region objects in bulk output
pub const OBJECT_INDEX: &str = "object";
/// Index name used for full documents in bulk output
pub const FULL_DOCUMENT_INDEX: &str = "fulldocument";

/// Class label of aggregated body text
pub const SECTION_CLASS: &str = "Section";

/// One searchable object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestObject {
    pub id: String,
    /// "Section", "Table", "Figure", "Equation", or a text class label
    pub cls: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_name: Option<String>,
    pub document_id: String,
    pub content: String,
    /// Caption for tables and figures, section header for sections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_content: Option<String>,
    /// Area of `bbox` in square pixels
    pub area: f64,
    pub detect_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_path: Option<String>,
    pub page_number: u32,
    pub bbox: BBox,
    /// Records this object was built from
    pub record_ids: Vec<String>,
}

/// Concatenated text of a whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    pub name: String,
    pub content: String,
}

/// A line of plain JSONL output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestLine {
    FullDocument(FullDocument),
    Object(IngestObject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestFormat {
    /// One tagged JSON object per line
    #[default]
    JsonLines,
    /// Bulk-index NDJSON: an `{"index": ...}` action line before each object
    Bulk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub batch_size: usize,
    /// Group body text into sections under their headers
    pub aggregate_sections: bool,
    /// Write identical objects once
    pub dedupe: bool,
    pub format: IngestFormat,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            aggregate_sections: true,
            dedupe: true,
            format: IngestFormat::JsonLines,
        }
    }
}

/// Counts reported after an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub documents: usize,
    pub objects: usize,
    pub duplicates: usize,
    pub batches: usize,
}

/// Section being built while walking records in reading order
struct SectionBuilder<'a> {
    header: Option<&'a ContentRecord>,
    body: Vec<&'a ContentRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestExporter {
    options: IngestOptions,
}

impl IngestExporter {
    #[must_use]
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }

    /// Region objects of one document, in reading order
    #[must_use]
    pub fn objects(&self, doc: &DocumentRecord) -> Vec<IngestObject> {
        let mut objects = Vec::new();
        let mut section: Option<SectionBuilder<'_>> = None;

        for record in doc.records() {
            let class = record.class();
            match class {
                RegionClass::Table | RegionClass::Figure | RegionClass::Equation => {
                    objects.push(self.region_object(doc, record));
                }
                RegionClass::PageHeader | RegionClass::PageFooter => {}
                RegionClass::SectionHeader if self.options.aggregate_sections => {
                    if let Some(done) = section.take() {
                        objects.extend(self.section_object(doc, &done));
                    }
                    section = Some(SectionBuilder {
                        header: Some(record),
                        body: Vec::new(),
                    });
                }
                RegionClass::BodyText if self.options.aggregate_sections => {
                    section
                        .get_or_insert_with(|| SectionBuilder {
                            header: None,
                            body: Vec::new(),
                        })
                        .body
                        .push(record);
                }
                _ => {
                    if !record.text().is_empty() {
                        objects.push(self.region_object(doc, record));
                    }
                }
            }
        }
        if let Some(done) = section.take() {
            objects.extend(self.section_object(doc, &done));
        }
        objects
    }

    /// All text of a document, in reading order
    #[must_use]
    pub fn full_document(&self, doc: &DocumentRecord) -> FullDocument {
        let content = doc
            .records()
            .filter(|r| !r.class().is_page_furniture())
            .flat_map(|r| {
                std::iter::once(r.text())
                    .chain(r.caption.as_ref().map(|c| c.text.as_str()))
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        FullDocument {
            id: doc.document_id.clone(),
            dataset_id: doc.metadata.dataset_id.clone(),
            name: pdf_name(doc).unwrap_or_else(|| doc.document_id.clone()),
            content,
        }
    }

    fn region_object(&self, doc: &DocumentRecord, record: &ContentRecord) -> IngestObject {
        let header_content = record.caption.as_ref().map(|c| c.text.clone());
        let cls = record.class().as_str().to_string();
        let content = record.text().to_string();
        IngestObject {
            id: object_id(doc, &cls, &content, header_content.as_deref()),
            cls,
            dataset_id: doc.metadata.dataset_id.clone(),
            pdf_name: pdf_name(doc),
            document_id: doc.document_id.clone(),
            content,
            header_content,
            area: record.bbox().area(),
            detect_score: record.region.confidence,
            img_path: record
                .crop
                .path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            page_number: record.region.page_number,
            bbox: *record.bbox(),
            record_ids: vec![record.record_id.clone()],
        }
    }

    fn section_object(
        &self,
        doc: &DocumentRecord,
        section: &SectionBuilder<'_>,
    ) -> Option<IngestObject> {
        let first = section.header.or_else(|| section.body.first().copied())?;
        let content = section
            .body
            .iter()
            .map(|r| r.text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if content.is_empty() {
            return None;
        }
        let header_content = section
            .header
            .map(|h| h.text().to_string())
            .filter(|t| !t.is_empty());

        let members: Vec<&ContentRecord> = section
            .header
            .into_iter()
            .chain(section.body.iter().copied())
            .collect();
        let page_number = first.region.page_number;
        let bbox = members
            .iter()
            .filter(|r| r.region.page_number == page_number)
            .map(|r| *r.bbox())
            .reduce(|a, b| BBox::new(a.l.min(b.l), a.t.min(b.t), a.r.max(b.r), a.b.max(b.b)))
            .unwrap_or(*first.bbox());
        let detect_score =
            members.iter().map(|r| r.region.confidence).sum::<f64>() / members.len() as f64;

        Some(IngestObject {
            id: object_id(doc, SECTION_CLASS, &content, header_content.as_deref()),
            cls: SECTION_CLASS.to_string(),
            dataset_id: doc.metadata.dataset_id.clone(),
            pdf_name: pdf_name(doc),
            document_id: doc.document_id.clone(),
            content,
            header_content,
            area: bbox.area(),
            detect_score,
            img_path: None,
            page_number,
            bbox,
            record_ids: members.iter().map(|r| r.record_id.clone()).collect(),
        })
    }

    /// Write every document and its objects to `writer`
    ///
    /// # Errors
    ///
    /// Returns an error if serializing or writing a line fails; lines already
    /// written stay in `writer`.
    pub fn write<W: Write>(&self, docs: &[DocumentRecord], mut writer: W) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut pending = 0usize;
        let batch_size = self.options.batch_size.max(1);

        for doc in docs {
            let full = self.full_document(doc);
            let id = full.id.clone();
            self.write_line(&mut writer, FULL_DOCUMENT_INDEX, &id, IngestLine::FullDocument(full))?;
            summary.documents += 1;

            for object in self.objects(doc) {
                if self.options.dedupe && !seen.insert(object.id.clone()) {
                    summary.duplicates += 1;
                    continue;
                }
                let id = object.id.clone();
                self.write_line(&mut writer, OBJECT_INDEX, &id, IngestLine::Object(object))?;
                summary.objects += 1;
                pending += 1;
                if pending == batch_size {
                    writer.flush()?;
                    summary.batches += 1;
                    pending = 0;
                }
            }
        }
        if pending > 0 {
            writer.flush()?;
            summary.batches += 1;
        }

        info!(
            "Exported {} documents, {} objects in {} batches ({} duplicates skipped)",
            summary.documents, summary.objects, summary.batches, summary.duplicates
        );
        Ok(summary)
    }

    fn write_line<W: Write>(
        &self,
        writer: &mut W,
        index: &str,
        id: &str,
        line: IngestLine,
    ) -> Result<()> {
        match self.options.format {
            IngestFormat::JsonLines => {
                serde_json::to_writer(&mut *writer, &line)?;
            }
            IngestFormat::Bulk => {
                let action = serde_json::json!({ "index": { "_index": index, "_id": id } });
                serde_json::to_writer(&mut *writer, &action)?;
                writer.write_all(b"\n")?;
                match &line {
                    IngestLine::FullDocument(full) => serde_json::to_writer(&mut *writer, full)?,
                    IngestLine::Object(object) => serde_json::to_writer(&mut *writer, object)?,
                }
            }
        }
        writer.write_all(b"\n")?;
        debug!("Wrote {index} {id}");
        Ok(())
    }
}

fn pdf_name(doc: &DocumentRecord) -> Option<String> {
    doc.metadata.source_filename.clone()
}

/// Deterministic id over the fields that identify an object's content
fn object_id(doc: &DocumentRecord, cls: &str, content: &str, header: Option<&str>) -> String {
    let key = serde_json::json!([
        cls,
        doc.metadata.dataset_id,
        doc.metadata.source_filename,
        header,
        content,
    ]);
    sha256_hex(key.to_string().as_bytes())
}
