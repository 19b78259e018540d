//! Table row/cell grouping from whitespace gaps
//!
//! Rows are found from the horizontal ink profile of the table crop: a pixel
//! row "has ink" if any pixel in it is darker than the ink threshold, and
//! maximal runs of inked rows separated by at least `min_row_gap` blank rows
//! form row bands. Each band is split into cells the same way along x.

// Pixel coordinates are u32 image indices
#![allow(clippy::cast_possible_truncation)]

use cosmos_core::ContentConfig;
use image::GrayImage;

/// One row band of a table crop; coordinates are relative to the crop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBand {
    /// First inked pixel row
    pub top: u32,
    /// One past the last inked pixel row
    pub bottom: u32,
    /// `(left, right)` extents of each cell, right exclusive
    pub cells: Vec<(u32, u32)>,
}

impl RowBand {
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Split `profile` into runs of `true`, merging runs separated by fewer than `min_gap` blanks
fn ink_runs(profile: &[bool], min_gap: u32) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &inked) in profile.iter().enumerate() {
        match (inked, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s as u32, i as u32));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s as u32, profile.len() as u32));
    }

    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if run.0 - last.1 < min_gap => last.1 = run.1,
            _ => merged.push(run),
        }
    }
    merged
}

/// Segment a grayscale table crop into row bands with cell extents
///
/// A blank crop yields no rows.
#[must_use]
pub fn segment_table(image: &GrayImage, config: &ContentConfig) -> Vec<RowBand> {
    let (width, height) = image.dimensions();
    let threshold = config.ink_threshold;
    let is_ink = |x: u32, y: u32| image.get_pixel(x, y)[0] < threshold;

    let row_profile: Vec<bool> = (0..height)
        .map(|y| (0..width).any(|x| is_ink(x, y)))
        .collect();

    ink_runs(&row_profile, config.min_row_gap)
        .into_iter()
        .map(|(top, bottom)| {
            let column_profile: Vec<bool> = (0..width)
                .map(|x| (top..bottom).any(|y| is_ink(x, y)))
                .collect();
            RowBand {
                top,
                bottom,
                cells: ink_runs(&column_profile, config.min_column_gap),
            }
        })
        .collect()
}
