// Intentional conversions: column counts and band indices
#![allow(clippy::cast_precision_loss)]
// Pipeline stage functions take Vec ownership for data flow semantics
#![allow(clippy::needless_pass_by_value)]

use cosmos_core::{
    AggregationConfig, CaptionLink, ContentRecord, PageRecord, PageStatus, RegionClass,
};
use log::debug;
use std::cmp::Ordering;

/// Page Aggregator
///
/// Orders a page's content records into reading order and merges captions
/// into the figures and tables they describe.
///
/// Algorithm:
/// 1. Associate captions with the nearest qualifying Figure/Table (one-to-one)
/// 2. Separate page headers above the body and page footers below it; furniture
///    inside the body's vertical extent stays in the body flow
/// 3. Split the body into horizontal bands at spanning (full-width) records
/// 4. Within a band, sweep records by left edge into columns of horizontally
///    overlapping extents and read columns left to right
/// 5. Within a column, sort by top y, then left x
/// 6. Return headers + body + footers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAggregator {
    config: AggregationConfig,
}

/// Top-to-bottom, then left-to-right, then by id for exact ties
fn position_cmp(a: &ContentRecord, b: &ContentRecord) -> Ordering {
    a.bbox()
        .t
        .total_cmp(&b.bbox().t)
        .then_with(|| a.bbox().l.total_cmp(&b.bbox().l))
        .then_with(|| a.record_id.cmp(&b.record_id))
}

/// Whether the caption's default side holds the target
///
/// Tables are expected below their caption, figures above theirs.
fn on_default_side(caption: &ContentRecord, target: &ContentRecord) -> bool {
    let (_, caption_y) = caption.bbox().centroid();
    let (_, target_y) = target.bbox().centroid();
    match target.class() {
        RegionClass::Table => target_y > caption_y,
        _ => target_y < caption_y,
    }
}

impl PageAggregator {
    #[inline]
    #[must_use = "returns a new PageAggregator instance"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "returns a new PageAggregator with custom config"]
    pub const fn with_config(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Build the page record for one successfully processed page
    #[must_use = "returns the ordered page record"]
    pub fn aggregate(
        &self,
        page_number: u32,
        page_width: f64,
        records: Vec<ContentRecord>,
    ) -> PageRecord {
        let records = self.associate_captions(records);

        let body_tops = records
            .iter()
            .filter(|r| !r.class().is_page_furniture())
            .map(|r| r.bbox().t);
        let first_body_top = body_tops.clone().fold(f64::INFINITY, f64::min);
        let last_body_top = body_tops.fold(f64::NEG_INFINITY, f64::max);

        let mut headers = Vec::new();
        let mut footers = Vec::new();
        let mut body = Vec::new();
        for record in records {
            match record.class() {
                RegionClass::PageHeader if record.bbox().t <= first_body_top => {
                    headers.push(record);
                }
                RegionClass::PageFooter if record.bbox().t >= last_body_top => {
                    footers.push(record);
                }
                _ => body.push(record),
            }
        }
        headers.sort_by(position_cmp);
        footers.sort_by(position_cmp);

        let (body, columns) = self.order_body(body, page_width);

        let ordered: Vec<ContentRecord> = headers
            .into_iter()
            .map(|r| (r, 0))
            .chain(body)
            .chain(footers.into_iter().map(|r| (r, 0)))
            .enumerate()
            .map(|(reading_index, (record, column))| ContentRecord {
                column,
                reading_index,
                ..record
            })
            .collect();

        debug!(
            "Page {page_number}: {} records in reading order, {columns} column(s)",
            ordered.len()
        );

        PageRecord {
            page_number,
            status: PageStatus::Ok,
            reading_order: ordered.iter().map(|r| r.record_id.clone()).collect(),
            records: ordered,
            columns,
        }
    }

    /// Merge captions into their Figure/Table; unmatched captions stay standalone
    fn associate_captions(&self, records: Vec<ContentRecord>) -> Vec<ContentRecord> {
        let max_distance = self.config.caption_distance;

        // (not on default side, centroid distance, caption index, target index)
        let mut pairs: Vec<(bool, f64, usize, usize)> = Vec::new();
        for (ci, caption) in records.iter().enumerate() {
            if !caption.class().is_caption() {
                continue;
            }
            let (cx, cy) = caption.bbox().centroid();
            for (ti, target) in records.iter().enumerate() {
                if !caption.class().captions(target.class()) {
                    continue;
                }
                if target.bbox().distance_to_point(cx, cy) > max_distance {
                    continue;
                }
                pairs.push((
                    !on_default_side(caption, target),
                    caption.bbox().centroid_distance(target.bbox()),
                    ci,
                    ti,
                ));
            }
        }
        pairs.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
        });

        let mut caption_of: Vec<Option<usize>> = vec![None; records.len()];
        let mut used_caption = vec![false; records.len()];
        for (_, _, ci, ti) in pairs {
            if used_caption[ci] || caption_of[ti].is_some() {
                continue;
            }
            used_caption[ci] = true;
            caption_of[ti] = Some(ci);
        }

        let links: Vec<Option<CaptionLink>> = caption_of
            .iter()
            .map(|c| {
                c.map(|ci| {
                    let caption = &records[ci];
                    CaptionLink {
                        record_id: caption.record_id.clone(),
                        class: caption.class(),
                        text: caption.text().to_string(),
                        bbox: *caption.bbox(),
                        confidence: caption.region.confidence,
                    }
                })
            })
            .collect();

        records
            .into_iter()
            .zip(links)
            .zip(used_caption)
            .filter_map(|((record, link), merged)| {
                if merged {
                    return None;
                }
                Some(match link {
                    Some(link) => ContentRecord {
                        caption: Some(link),
                        ..record
                    },
                    None => record,
                })
            })
            .collect()
    }

    /// Order body records; returns `(record, column)` pairs and the column count
    fn order_body(
        &self,
        body: Vec<ContentRecord>,
        page_width: f64,
    ) -> (Vec<(ContentRecord, usize)>, usize) {
        let spanning_width = self.config.spanning_width_ratio * page_width;
        let (mut spanning, regular): (Vec<_>, Vec<_>) = body
            .into_iter()
            .partition(|r| r.bbox().width() >= spanning_width);
        spanning.sort_by(position_cmp);

        let mut bands: Vec<Vec<ContentRecord>> = vec![Vec::new(); spanning.len() + 1];
        for record in regular {
            let band = spanning
                .iter()
                .filter(|s| s.bbox().t <= record.bbox().t)
                .count();
            bands[band].push(record);
        }

        let mut ordered = Vec::new();
        let mut max_columns = usize::from(!spanning.is_empty());
        let mut spanning = spanning.into_iter();
        for band in bands {
            let columns = Self::split_columns(band);
            max_columns = max_columns.max(columns.len());
            for (column_index, column) in columns.into_iter().enumerate() {
                ordered.extend(column.into_iter().map(|r| (r, column_index)));
            }
            if let Some(span) = spanning.next() {
                ordered.push((span, 0));
            }
        }
        (ordered, max_columns)
    }

    /// Cluster records into columns by horizontal overlap, left to right
    ///
    /// Sorted by left edge, a record opens a new column once it starts at or
    /// past the right edge of everything seen so far.
    fn split_columns(mut records: Vec<ContentRecord>) -> Vec<Vec<ContentRecord>> {
        records.sort_by(|a, b| {
            a.bbox()
                .l
                .total_cmp(&b.bbox().l)
                .then_with(|| position_cmp(a, b))
        });

        let mut columns: Vec<Vec<ContentRecord>> = Vec::new();
        let mut right_edge = f64::NEG_INFINITY;
        for record in records {
            let (l, r) = (record.bbox().l, record.bbox().r);
            match columns.last_mut() {
                Some(column) if l < right_edge => {
                    right_edge = right_edge.max(r);
                    column.push(record);
                }
                _ => {
                    right_edge = r;
                    columns.push(vec![record]);
                }
            }
        }

        for column in &mut columns {
            column.sort_by(position_cmp);
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmos_core::{BBox, CropRef, ResolutionPolicy, ResolvedRegion};

    fn record(index: usize, class: RegionClass, bbox: BBox, text: &str) -> ContentRecord {
        ContentRecord {
            record_id: ContentRecord::record_id_for(1, index),
            region: ResolvedRegion {
                page_number: 1,
                class,
                bbox,
                confidence: 0.9,
                policy: ResolutionPolicy::Untouched,
                suppressed: 0,
            },
            crop: CropRef {
                page_number: 1,
                bbox,
                path: None,
            },
            extracted_text: Some(text.to_string()),
            structured_payload: None,
            caption: None,
            flags: Vec::new(),
            column: 0,
            reading_index: index,
        }
    }

    fn ids(page: &PageRecord) -> Vec<&str> {
        page.records.iter().map(|r| r.text()).collect()
    }

    #[test]
    fn test_two_column_reading_order() {
        let records = vec![
            record(0, RegionClass::BodyText, BBox::new(320.0, 100.0, 580.0, 200.0), "right-1"),
            record(1, RegionClass::BodyText, BBox::new(20.0, 300.0, 280.0, 400.0), "left-2"),
            record(2, RegionClass::BodyText, BBox::new(20.0, 100.0, 280.0, 200.0), "left-1"),
            record(3, RegionClass::BodyText, BBox::new(320.0, 250.0, 580.0, 350.0), "right-2"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(ids(&page), vec!["left-1", "left-2", "right-1", "right-2"]);
        assert_eq!(page.columns, 2);
        assert_eq!(page.records[2].column, 1);
        assert_eq!(page.reading_order[0], "p0001-r002");
    }

    #[test]
    fn test_spanning_region_splits_bands() {
        let records = vec![
            record(0, RegionClass::BodyText, BBox::new(20.0, 500.0, 280.0, 600.0), "left-below"),
            record(1, RegionClass::Figure, BBox::new(20.0, 300.0, 580.0, 450.0), "figure"),
            record(2, RegionClass::BodyText, BBox::new(320.0, 100.0, 580.0, 250.0), "right-above"),
            record(3, RegionClass::BodyText, BBox::new(20.0, 100.0, 280.0, 250.0), "left-above"),
            record(4, RegionClass::BodyText, BBox::new(320.0, 500.0, 580.0, 600.0), "right-below"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(
            ids(&page),
            vec!["left-above", "right-above", "figure", "left-below", "right-below"]
        );
    }

    #[test]
    fn test_headers_first_footers_last() {
        let records = vec![
            record(0, RegionClass::PageFooter, BBox::new(20.0, 760.0, 580.0, 780.0), "footer"),
            record(1, RegionClass::BodyText, BBox::new(20.0, 100.0, 580.0, 200.0), "body"),
            record(2, RegionClass::PageHeader, BBox::new(20.0, 20.0, 580.0, 40.0), "header"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(ids(&page), vec!["header", "body", "footer"]);
    }

    #[test]
    fn test_furniture_inside_body_keeps_top_order() {
        let records = vec![
            record(0, RegionClass::BodyText, BBox::new(20.0, 300.0, 580.0, 400.0), "body-2"),
            record(1, RegionClass::PageHeader, BBox::new(20.0, 120.0, 580.0, 140.0), "header"),
            record(2, RegionClass::BodyText, BBox::new(20.0, 100.0, 580.0, 110.0), "body-1"),
            record(3, RegionClass::PageFooter, BBox::new(20.0, 250.0, 580.0, 270.0), "footer"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(ids(&page), vec!["body-1", "header", "footer", "body-2"]);
        let tops: Vec<f64> = page.records.iter().map(|r| r.bbox().t).collect();
        assert!(tops.windows(2).all(|w| w[0] <= w[1]), "tops out of order: {tops:?}");
    }

    #[test]
    fn test_chained_overlaps_form_one_column() {
        // a overlaps b, b overlaps c, a and c are disjoint
        let records = vec![
            record(0, RegionClass::BodyText, BBox::new(200.0, 300.0, 320.0, 350.0), "c"),
            record(1, RegionClass::BodyText, BBox::new(20.0, 100.0, 140.0, 150.0), "a"),
            record(2, RegionClass::BodyText, BBox::new(120.0, 200.0, 220.0, 250.0), "b"),
            record(3, RegionClass::BodyText, BBox::new(400.0, 100.0, 500.0, 150.0), "d"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(ids(&page), vec!["a", "b", "c", "d"]);
        assert_eq!(page.columns, 2);
        assert_eq!(page.records[2].column, 0);
        assert_eq!(page.records[3].column, 1);
    }

    #[test]
    fn test_touching_extents_are_separate_columns() {
        let records = vec![
            record(0, RegionClass::BodyText, BBox::new(300.0, 100.0, 500.0, 150.0), "right"),
            record(1, RegionClass::BodyText, BBox::new(100.0, 200.0, 300.0, 250.0), "left"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(ids(&page), vec!["left", "right"]);
        assert_eq!(page.columns, 2);
    }

    #[test]
    fn test_caption_within_distance_attaches() {
        let records = vec![
            record(0, RegionClass::Figure, BBox::new(100.0, 100.0, 400.0, 300.0), ""),
            record(1, RegionClass::FigureCaption, BBox::new(100.0, 320.0, 400.0, 340.0), "Figure 1."),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(page.records.len(), 1);
        let caption = page.records[0].caption.as_ref().unwrap();
        assert_eq!(caption.text, "Figure 1.");
        assert_eq!(caption.record_id, "p0001-r001");
    }

    #[test]
    fn test_caption_beyond_distance_stays_standalone() {
        let records = vec![
            record(0, RegionClass::Figure, BBox::new(100.0, 100.0, 400.0, 300.0), ""),
            record(1, RegionClass::FigureCaption, BBox::new(100.0, 500.0, 400.0, 520.0), "Figure 1."),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(page.records.len(), 2);
        assert!(page.records.iter().all(|r| r.caption.is_none()));
    }

    #[test]
    fn test_caption_prefers_default_side() {
        // Table caption midway between two tables: the one below wins
        let records = vec![
            record(0, RegionClass::Table, BBox::new(100.0, 100.0, 400.0, 190.0), "above"),
            record(1, RegionClass::TableCaption, BBox::new(100.0, 200.0, 400.0, 220.0), "Table 2."),
            record(2, RegionClass::Table, BBox::new(100.0, 240.0, 400.0, 400.0), "below"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        let below = page.records.iter().find(|r| r.text() == "below").unwrap();
        assert!(below.caption.is_some());
        let above = page.records.iter().find(|r| r.text() == "above").unwrap();
        assert!(above.caption.is_none());
    }

    #[test]
    fn test_each_target_takes_one_caption() {
        let records = vec![
            record(0, RegionClass::Figure, BBox::new(100.0, 100.0, 400.0, 300.0), ""),
            record(1, RegionClass::Caption, BBox::new(100.0, 310.0, 400.0, 330.0), "first"),
            record(2, RegionClass::Caption, BBox::new(100.0, 340.0, 400.0, 360.0), "second"),
        ];
        let page = PageAggregator::new().aggregate(1, 600.0, records);
        assert_eq!(page.records.len(), 2);
        let figure = page
            .records
            .iter()
            .find(|r| r.class() == RegionClass::Figure)
            .unwrap();
        assert_eq!(figure.caption.as_ref().unwrap().text, "first");
    }

    #[test]
    fn test_empty_page() {
        let page = PageAggregator::new().aggregate(4, 600.0, Vec::new());
        assert!(page.records.is_empty());
        assert!(page.reading_order.is_empty());
        assert_eq!(page.columns, 0);
        assert_eq!(page.status, PageStatus::Ok);
    }
}
