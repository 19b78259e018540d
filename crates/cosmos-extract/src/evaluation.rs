//! Annotation comparison
//!
//! Compares the regions of an extracted document against hand-annotated
//! bounds, per class: how many regions of each class were found versus
//! expected, which pairs overlap, and their mean `IoU`.
//!
//! Captions merged into a table or figure are still compared as captions,
//! using the box carried on the caption link.

use cosmos_core::{BBox, DocumentRecord, RegionClass, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Minimum `IoU` for an extracted region to count as matching an annotation
pub const DEFAULT_MIN_OVERLAP: f64 = 0.5;

/// One annotated region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRegion {
    pub page_number: u32,
    pub class: RegionClass,
    pub bbox: BBox,
}

/// Load annotations from a JSON array of [`ExpectedRegion`]
///
/// # Errors
///
/// Returns [`CosmosError::IoError`](cosmos_core::CosmosError::IoError) if the
/// file cannot be read, or
/// [`CosmosError::JsonError`](cosmos_core::CosmosError::JsonError) if it is
/// not such an array.
pub fn load_expected(path: &Path) -> Result<Vec<ExpectedRegion>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// An annotation paired with the extracted region that overlaps it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPair {
    pub page_number: u32,
    /// Index into the annotation list
    pub expected_index: usize,
    pub record_id: String,
    pub iou: f64,
}

/// Comparison result for one class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelComparison {
    pub class: RegionClass,
    pub expected: usize,
    pub extracted: usize,
    pub matched: Vec<MatchedPair>,
    /// Mean `IoU` over matched pairs; `None` without matches
    pub mean_iou: Option<f64>,
}

impl LabelComparison {
    #[must_use]
    pub fn counts_match(&self) -> bool {
        self.expected == self.extracted
    }

    /// Fraction of annotations that found a match
    #[must_use]
    pub fn recall(&self) -> f64 {
        if self.expected == 0 {
            1.0
        } else {
            self.matched.len() as f64 / self.expected as f64
        }
    }

    /// Fraction of extracted regions that matched an annotation
    #[must_use]
    pub fn precision(&self) -> f64 {
        if self.extracted == 0 {
            1.0
        } else {
            self.matched.len() as f64 / self.extracted as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub labels: Vec<LabelComparison>,
}

impl EvaluationReport {
    #[must_use]
    pub fn label(&self, class: RegionClass) -> Option<&LabelComparison> {
        self.labels.iter().find(|l| l.class == class)
    }

    /// Every compared class has matching counts
    #[must_use]
    pub fn counts_match(&self) -> bool {
        self.labels.iter().all(LabelComparison::counts_match)
    }
}

/// Extracted box considered during matching
struct Extracted<'a> {
    page_number: u32,
    record_id: &'a str,
    bbox: BBox,
}

#[derive(Debug, Clone)]
pub struct AnnotationComparator {
    min_overlap: f64,
    classes: Vec<RegionClass>,
}

impl Default for AnnotationComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationComparator {
    /// Compare tables, figures, their captions and equations at the default overlap
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_overlap: DEFAULT_MIN_OVERLAP,
            classes: vec![
                RegionClass::Figure,
                RegionClass::FigureCaption,
                RegionClass::Table,
                RegionClass::TableCaption,
                RegionClass::Equation,
            ],
        }
    }

    #[must_use]
    pub fn with_min_overlap(mut self, min_overlap: f64) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    #[must_use]
    pub fn with_classes(mut self, classes: Vec<RegionClass>) -> Self {
        self.classes = classes;
        self
    }

    #[must_use]
    pub fn compare(&self, doc: &DocumentRecord, expected: &[ExpectedRegion]) -> EvaluationReport {
        let mut extracted: BTreeMap<RegionClass, Vec<Extracted<'_>>> = BTreeMap::new();
        for record in doc.records() {
            extracted.entry(record.class()).or_default().push(Extracted {
                page_number: record.region.page_number,
                record_id: &record.record_id,
                bbox: *record.bbox(),
            });
            if let Some(caption) = &record.caption {
                extracted.entry(caption.class).or_default().push(Extracted {
                    page_number: record.region.page_number,
                    record_id: &caption.record_id,
                    bbox: caption.bbox,
                });
            }
        }

        let labels = self
            .classes
            .iter()
            .map(|&class| {
                let found = extracted.get(&class).map_or(&[][..], Vec::as_slice);
                let annotated: Vec<(usize, &ExpectedRegion)> = expected
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.class == class)
                    .collect();
                let matched = self.match_pairs(&annotated, found);
                let mean_iou = (!matched.is_empty())
                    .then(|| matched.iter().map(|m| m.iou).sum::<f64>() / matched.len() as f64);
                debug!(
                    "{}: expected {}, extracted {}, matched {}",
                    class.as_str(),
                    annotated.len(),
                    found.len(),
                    matched.len()
                );
                LabelComparison {
                    class,
                    expected: annotated.len(),
                    extracted: found.len(),
                    matched,
                    mean_iou,
                }
            })
            .collect();

        EvaluationReport { labels }
    }

    /// Greedy one-to-one matching on the same page, highest `IoU` first
    fn match_pairs(
        &self,
        annotated: &[(usize, &ExpectedRegion)],
        found: &[Extracted<'_>],
    ) -> Vec<MatchedPair> {
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (ai, (_, expected)) in annotated.iter().enumerate() {
            for (fi, region) in found.iter().enumerate() {
                if region.page_number != expected.page_number {
                    continue;
                }
                let iou = expected.bbox.iou(&region.bbox);
                if iou >= self.min_overlap && iou > 0.0 {
                    candidates.push((iou, ai, fi));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_expected = vec![false; annotated.len()];
        let mut used_found = vec![false; found.len()];
        let mut matched = Vec::new();
        for (iou, ai, fi) in candidates {
            if used_expected[ai] || used_found[fi] {
                continue;
            }
            used_expected[ai] = true;
            used_found[fi] = true;
            let (expected_index, expected) = annotated[ai];
            matched.push(MatchedPair {
                page_number: expected.page_number,
                expected_index,
                record_id: found[fi].record_id.to_string(),
                iou,
            });
        }
        matched.sort_by_key(|m| m.expected_index);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmos_core::{
        CaptionLink, ContentRecord, CropRef, DocumentMetadata, DocumentStatus, PageRecord,
        PageStatus, ResolutionPolicy, ResolvedRegion,
    };

    fn record(page: u32, index: usize, class: RegionClass, bbox: BBox) -> ContentRecord {
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
            extracted_text: None,
            structured_payload: None,
            caption: None,
            flags: Vec::new(),
            column: 0,
            reading_index: index,
        }
    }

    fn document(records: Vec<ContentRecord>) -> DocumentRecord {
        DocumentRecord {
            document_id: "doc".to_string(),
            version: 1,
            metadata: DocumentMetadata::default(),
            pages: vec![PageRecord {
                page_number: 1,
                status: PageStatus::Ok,
                reading_order: records.iter().map(|r| r.record_id.clone()).collect(),
                records,
                columns: 1,
            }],
            status: DocumentStatus::Complete,
            failed_pages: Vec::new(),
            incomplete: false,
        }
    }

    fn expected(page_number: u32, class: RegionClass, bbox: BBox) -> ExpectedRegion {
        ExpectedRegion {
            page_number,
            class,
            bbox,
        }
    }

    #[test]
    fn test_exact_match() {
        let bbox = BBox::new(100.0, 100.0, 300.0, 300.0);
        let doc = document(vec![record(1, 0, RegionClass::Figure, bbox)]);
        let report = AnnotationComparator::new().compare(&doc, &[expected(1, RegionClass::Figure, bbox)]);

        let figure = report.label(RegionClass::Figure).unwrap();
        assert!(figure.counts_match());
        assert_eq!(figure.matched.len(), 1);
        assert!((figure.mean_iou.unwrap() - 1.0).abs() < 1e-9);
        assert!((figure.recall() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_overlap_is_not_a_match() {
        let doc = document(vec![record(1, 0, RegionClass::Table, BBox::new(0.0, 0.0, 100.0, 100.0))]);
        let report = AnnotationComparator::new().compare(
            &doc,
            &[expected(1, RegionClass::Table, BBox::new(80.0, 80.0, 180.0, 180.0))],
        );
        let table = report.label(RegionClass::Table).unwrap();
        assert!(table.counts_match());
        assert!(table.matched.is_empty());
        assert_eq!(table.mean_iou, None);
        assert!(table.recall().abs() < 1e-9);
    }

    #[test]
    fn test_page_must_agree() {
        let bbox = BBox::new(0.0, 0.0, 100.0, 100.0);
        let doc = document(vec![record(1, 0, RegionClass::Equation, bbox)]);
        let report = AnnotationComparator::new().compare(&doc, &[expected(2, RegionClass::Equation, bbox)]);
        assert!(report.label(RegionClass::Equation).unwrap().matched.is_empty());
    }

    #[test]
    fn test_one_to_one_matching() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(0.0, 200.0, 100.0, 300.0);
        let doc = document(vec![
            record(1, 0, RegionClass::Equation, a),
            record(1, 1, RegionClass::Equation, BBox::new(0.0, 5.0, 100.0, 105.0)),
        ]);
        let report = AnnotationComparator::new().compare(
            &doc,
            &[
                expected(1, RegionClass::Equation, a),
                expected(1, RegionClass::Equation, b),
            ],
        );
        let eq = report.label(RegionClass::Equation).unwrap();
        assert_eq!(eq.matched.len(), 1);
        assert_eq!(eq.matched[0].record_id, "p0001-r000");
        assert!((eq.precision() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_merged_caption_still_compared() {
        let caption_box = BBox::new(100.0, 320.0, 300.0, 340.0);
        let mut figure = record(1, 0, RegionClass::Figure, BBox::new(100.0, 100.0, 300.0, 300.0));
        figure.caption = Some(CaptionLink {
            record_id: "p0001-r001".to_string(),
            class: RegionClass::FigureCaption,
            text: "Figure 1.".to_string(),
            bbox: caption_box,
            confidence: 0.9,
        });
        let doc = document(vec![figure]);
        let report = AnnotationComparator::new()
            .compare(&doc, &[expected(1, RegionClass::FigureCaption, caption_box)]);
        let caption = report.label(RegionClass::FigureCaption).unwrap();
        assert_eq!(caption.extracted, 1);
        assert_eq!(caption.matched[0].record_id, "p0001-r001");
    }

    #[test]
    fn test_load_expected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        std::fs::write(
            &path,
            r#"[{"page_number":1,"class":"table","bbox":{"l":1.0,"t":2.0,"r":3.0,"b":4.0}}]"#,
        )
        .unwrap();
        let loaded = load_expected(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].class, RegionClass::Table);
    }

    #[test]
    fn test_load_expected_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        assert!(matches!(
            load_expected(&path),
            Err(cosmos_core::CosmosError::IoError(_))
        ));

        std::fs::write(&path, r#"{"page_number": 1}"#).unwrap();
        assert!(matches!(
            load_expected(&path),
            Err(cosmos_core::CosmosError::JsonError(_))
        ));
    }
}
