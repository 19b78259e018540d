// Pipeline stage functions take Vec ownership for data flow semantics
#![allow(clippy::needless_pass_by_value)]

use cosmos_core::{CandidateRegion, ResolutionConfig, ResolutionPolicy, ResolvedRegion};
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Region Resolver
///
/// Turns noisy, possibly overlapping candidate regions into a clean per-page
/// layout.
///
/// Algorithm:
/// 1. Group candidates by page
/// 2. Sort candidates into a canonical total order (confidence desc, area desc,
///    top, left, right, bottom, class) so input order never matters
/// 3. Drop regions contained in a higher-priority structured region, whatever
///    their confidence
/// 4. Suppress duplicates: among overlap-sensitive regions whose `IoU` exceeds
///    the threshold, keep the preferred one (higher confidence; within epsilon
///    the larger area, then lower top, then lower left)
/// 5. Pad, clip to the page, drop degenerate boxes, and repeat step 4 on the
///    padded boxes
///
/// Input: candidate regions from the detector adapter
/// Output: resolved regions, sorted top-to-bottom then left-to-right
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionResolver {
    config: ResolutionConfig,
}

/// Region being resolved; carries the provenance that ends up on the output
#[derive(Debug, Clone)]
struct Working {
    region: ResolvedRegion,
}

impl Working {
    fn from_candidate(candidate: CandidateRegion) -> Self {
        Self {
            region: ResolvedRegion {
                page_number: candidate.page_number,
                class: candidate.class,
                bbox: candidate.bbox,
                confidence: candidate.confidence,
                policy: ResolutionPolicy::Untouched,
                suppressed: 0,
            },
        }
    }

    fn absorb(&mut self, loser: &Self, policy: ResolutionPolicy) {
        self.region.suppressed += 1 + loser.region.suppressed;
        self.region.policy = policy;
    }
}

/// Canonical total order used before any greedy step
fn canonical_cmp(a: &Working, b: &Working) -> Ordering {
    let (a, b) = (&a.region, &b.region);
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.bbox.area().total_cmp(&a.bbox.area()))
        .then_with(|| a.bbox.t.total_cmp(&b.bbox.t))
        .then_with(|| a.bbox.l.total_cmp(&b.bbox.l))
        .then_with(|| a.bbox.r.total_cmp(&b.bbox.r))
        .then_with(|| a.bbox.b.total_cmp(&b.bbox.b))
        .then_with(|| a.class.cmp(&b.class))
}

/// Output order: top-to-bottom, then left-to-right
fn layout_cmp(a: &ResolvedRegion, b: &ResolvedRegion) -> Ordering {
    a.bbox
        .t
        .total_cmp(&b.bbox.t)
        .then_with(|| a.bbox.l.total_cmp(&b.bbox.l))
        .then_with(|| a.bbox.b.total_cmp(&b.bbox.b))
        .then_with(|| a.bbox.r.total_cmp(&b.bbox.r))
        .then_with(|| a.class.cmp(&b.class))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
}

impl RegionResolver {
    /// Create a resolver with default config
    #[inline]
    #[must_use = "returns a new RegionResolver instance"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with custom config
    #[inline]
    #[must_use = "returns a new RegionResolver with custom config"]
    pub const fn with_config(config: ResolutionConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Resolve candidates for several pages at once
    ///
    /// `page_sizes` maps page numbers to `(width, height)`. Every listed page
    /// gets an entry, possibly empty; candidates for unlisted pages are dropped.
    #[must_use = "returns the resolved regions per page"]
    pub fn resolve(
        &self,
        candidates: Vec<CandidateRegion>,
        page_sizes: &BTreeMap<u32, (f64, f64)>,
    ) -> BTreeMap<u32, Vec<ResolvedRegion>> {
        let mut by_page: BTreeMap<u32, Vec<CandidateRegion>> =
            page_sizes.keys().map(|&p| (p, Vec::new())).collect();
        for candidate in candidates {
            match by_page.get_mut(&candidate.page_number) {
                Some(group) => group.push(candidate),
                None => warn!(
                    "Dropping {} candidate for unknown page {}",
                    candidate.class, candidate.page_number
                ),
            }
        }

        by_page
            .into_iter()
            .map(|(page_number, group)| {
                let (width, height) = page_sizes[&page_number];
                (
                    page_number,
                    self.resolve_page(page_number, group, width, height),
                )
            })
            .collect()
    }

    /// Resolve the candidates of a single page of size `width` x `height`
    #[must_use = "returns the resolved regions for the page"]
    pub fn resolve_page(
        &self,
        page_number: u32,
        candidates: Vec<CandidateRegion>,
        width: f64,
        height: f64,
    ) -> Vec<ResolvedRegion> {
        let input_count = candidates.len();
        let regions: Vec<Working> = candidates
            .into_iter()
            .filter(|c| {
                if c.page_number != page_number {
                    warn!(
                        "Page {page_number}: ignoring candidate from page {}",
                        c.page_number
                    );
                    return false;
                }
                c.bbox.is_valid() && c.confidence.is_finite()
            })
            .map(Working::from_candidate)
            .collect();

        if regions.is_empty() {
            debug!("Page {page_number}: no candidates to resolve");
            return Vec::new();
        }

        // Containment outranks confidence, so it runs before duplicate suppression
        let prioritized = self.apply_class_priority(regions);
        let after_priority = prioritized.len();

        let deduplicated = self.suppress_duplicates(prioritized, ResolutionPolicy::IouSuppression);
        let after_iou = deduplicated.len();

        let padded: Vec<Working> = deduplicated
            .into_iter()
            .filter_map(|w| self.pad(w, width, height))
            .collect();
        let settled = self.suppress_duplicates(padded, ResolutionPolicy::PaddingConflict);

        let mut resolved: Vec<ResolvedRegion> = settled.into_iter().map(|w| w.region).collect();
        resolved.sort_by(layout_cmp);

        debug!(
            "Page {page_number}: {input_count} candidates -> {after_priority} after class priority \
             -> {after_iou} after IoU suppression -> {} resolved",
            resolved.len()
        );
        resolved
    }

    /// True when `a` should survive a duplicate conflict with `b`
    fn prefers(&self, a: &Working, b: &Working) -> bool {
        let (ra, rb) = (&a.region, &b.region);
        if (ra.confidence - rb.confidence).abs() > self.config.confidence_epsilon {
            return ra.confidence > rb.confidence;
        }
        let by_geometry = rb
            .bbox
            .area()
            .total_cmp(&ra.bbox.area())
            .then_with(|| ra.bbox.t.total_cmp(&rb.bbox.t))
            .then_with(|| ra.bbox.l.total_cmp(&rb.bbox.l));
        match by_geometry {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => canonical_cmp(a, b) != Ordering::Greater,
        }
    }

    fn conflicts(&self, a: &Working, b: &Working) -> bool {
        self.config.is_overlap_sensitive(a.region.class)
            && self.config.is_overlap_sensitive(b.region.class)
            && a.region.bbox.iou(&b.region.bbox) > self.config.iou_threshold
    }

    /// Greedy duplicate suppression in canonical order
    ///
    /// A candidate enters the kept set only after every kept region it
    /// conflicts with has been removed, so the kept set never holds a
    /// conflicting pair.
    fn suppress_duplicates(
        &self,
        mut regions: Vec<Working>,
        policy: ResolutionPolicy,
    ) -> Vec<Working> {
        regions.sort_by(canonical_cmp);
        let mut kept: Vec<Working> = Vec::with_capacity(regions.len());

        for candidate in regions {
            let conflicting: Vec<usize> = kept
                .iter()
                .enumerate()
                .filter(|(_, k)| self.conflicts(k, &candidate))
                .map(|(i, _)| i)
                .collect();

            if conflicting.is_empty() {
                kept.push(candidate);
                continue;
            }

            if let Some(&blocker) = conflicting
                .iter()
                .find(|&&i| !self.prefers(&candidate, &kept[i]))
            {
                kept[blocker].absorb(&candidate, policy);
                continue;
            }

            let mut winner = candidate;
            // Indices are ascending; remove from the back so earlier ones stay valid
            for &i in conflicting.iter().rev() {
                let loser = kept.remove(i);
                winner.absorb(&loser, policy);
            }
            kept.push(winner);
        }
        kept
    }

    /// Drop regions that sit inside a higher-priority structured region
    fn apply_class_priority(&self, regions: Vec<Working>) -> Vec<Working> {
        let threshold = self.config.containment_threshold;
        let mut container_of: Vec<Option<usize>> = vec![None; regions.len()];

        for (i, inner) in regions.iter().enumerate() {
            let inner_rank = self.config.priority_rank(inner.region.class);
            container_of[i] = regions
                .iter()
                .enumerate()
                .filter(|(j, outer)| {
                    *j != i
                        && outer.region.class != inner.region.class
                        && outer.region.class.is_structured()
                        && self.config.priority_rank(outer.region.class) < inner_rank
                        && inner.region.bbox.intersection_over_self(&outer.region.bbox)
                            >= threshold
                })
                .min_by(|(_, a), (_, b)| canonical_cmp(a, b))
                .map(|(j, _)| j);
        }

        let mut absorbed: Vec<Vec<usize>> = vec![Vec::new(); regions.len()];
        for (i, container) in container_of.iter().enumerate() {
            if let Some(j) = container {
                absorbed[*j].push(i);
            }
        }

        let mut survivors = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            if container_of[i].is_some() {
                continue;
            }
            let mut region = region.clone();
            for &loser in &absorbed[i] {
                region.absorb(&regions[loser], ResolutionPolicy::ClassPriority);
            }
            survivors.push(region);
        }
        survivors
    }

    fn pad(&self, mut working: Working, width: f64, height: f64) -> Option<Working> {
        let bbox = working
            .region
            .bbox
            .expand(self.config.padding)
            .clip(width, height);
        if !bbox.is_valid() {
            debug!(
                "Page {}: dropping {} region outside page bounds",
                working.region.page_number, working.region.class
            );
            return None;
        }
        working.region.bbox = bbox;
        Some(working)
    }
}
