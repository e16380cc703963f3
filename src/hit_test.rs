//! Hit testing over rendered surfaces (pages, canvases).
//!
//! Each surface owns one quadtree, rebuilt from scratch whenever the
//! surface is redrawn. A query narrows candidates through the quadtree,
//! then keeps only those whose box really contains the point.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::spatial::{Point, Quadtree, QuadtreeConfig, Rect};

/// Stable key of a rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub usize);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Spatial indexes for any number of surfaces, mapping boxes to `T`.
#[derive(Debug, Clone)]
pub struct HitTester<T> {
    config: QuadtreeConfig,
    surfaces: HashMap<SurfaceId, Quadtree<T>>,
}

impl<T> Default for HitTester<T> {
    fn default() -> Self {
        Self::new(QuadtreeConfig::default())
    }
}

impl<T> HitTester<T> {
    pub fn new(config: QuadtreeConfig) -> Self {
        Self {
            config,
            surfaces: HashMap::new(),
        }
    }

    /// Start a fresh, empty index for `surface`, replacing any previous one.
    pub fn rebuild_index(&mut self, surface: SurfaceId, bounds: Rect) {
        log::debug!("Rebuilding spatial index for surface {surface}");
        self.surfaces.insert(surface, Quadtree::new(bounds, self.config));
    }

    /// Forget a surface entirely.
    pub fn remove(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
    }

    pub fn has_surface(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains_key(&surface)
    }

    /// Number of entries indexed for `surface`.
    pub fn len(&self, surface: SurfaceId) -> usize {
        self.surfaces.get(&surface).map_or(0, Quadtree::len)
    }

    pub fn insert(&mut self, surface: SurfaceId, rect: Rect, value: T) -> Result<(), ScoreError> {
        let tree = self
            .surfaces
            .get_mut(&surface)
            .ok_or(ScoreError::UnknownSurface(surface))?;
        tree.insert(rect, value);
        Ok(())
    }
}

impl<T: Clone> HitTester<T> {
    /// Objects whose boxes contain `point` on `surface`. Unknown surfaces
    /// and misses give an empty result.
    pub fn query(&self, surface: SurfaceId, point: Point) -> Vec<T> {
        let Some(tree) = self.surfaces.get(&surface) else {
            return Vec::new();
        };
        tree.retrieve(&Rect::probe(point))
            .into_iter()
            .filter(|entry| entry.rect.contains(point))
            .map(|entry| entry.value.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: SurfaceId = SurfaceId(0);

    fn page_bounds() -> Rect {
        Rect::new(0.0, 0.0, 800.0, 1000.0)
    }

    #[test]
    fn finds_the_box_under_the_point() {
        let mut hits = HitTester::default();
        hits.rebuild_index(PAGE, page_bounds());
        hits.insert(PAGE, Rect::new(10.0, 10.0, 20.0, 20.0), "O").unwrap();

        assert_eq!(hits.query(PAGE, Point::new(15.0, 15.0)), vec!["O"]);
        assert!(hits.query(PAGE, Point::new(100.0, 100.0)).is_empty());
    }

    #[test]
    fn narrow_phase_drops_false_candidates() {
        let mut hits = HitTester::default();
        hits.rebuild_index(PAGE, page_bounds());
        // Straddles the page centre, so the root keeps it for every probe
        hits.insert(PAGE, Rect::new(390.0, 490.0, 20.0, 20.0), 1).unwrap();
        for i in 0..40 {
            hits.insert(PAGE, Rect::new(i as f64 * 15.0, 20.0, 10.0, 10.0), 100 + i).unwrap();
        }

        assert_eq!(hits.query(PAGE, Point::new(400.0, 500.0)), vec![1]);
        assert_eq!(hits.query(PAGE, Point::new(152.0, 25.0)), vec![110]);
        assert!(hits.query(PAGE, Point::new(700.0, 900.0)).is_empty());
    }

    #[test]
    fn overlapping_boxes_all_match() {
        let mut hits = HitTester::default();
        hits.rebuild_index(PAGE, page_bounds());
        hits.insert(PAGE, Rect::new(0.0, 0.0, 50.0, 50.0), 'a').unwrap();
        hits.insert(PAGE, Rect::new(20.0, 20.0, 50.0, 50.0), 'b').unwrap();

        let mut found = hits.query(PAGE, Point::new(30.0, 30.0));
        found.sort();
        assert_eq!(found, vec!['a', 'b']);
    }

    #[test]
    fn surfaces_are_isolated() {
        let mut hits = HitTester::default();
        hits.rebuild_index(SurfaceId(0), page_bounds());
        hits.rebuild_index(SurfaceId(1), page_bounds());
        hits.insert(SurfaceId(0), Rect::new(10.0, 10.0, 20.0, 20.0), 0).unwrap();
        hits.insert(SurfaceId(1), Rect::new(10.0, 10.0, 20.0, 20.0), 1).unwrap();

        assert_eq!(hits.query(SurfaceId(1), Point::new(15.0, 15.0)), vec![1]);
        assert!(hits.query(SurfaceId(2), Point::new(15.0, 15.0)).is_empty());
    }

    #[test]
    fn rebuild_discards_previous_entries() {
        let mut hits = HitTester::default();
        hits.rebuild_index(PAGE, page_bounds());
        hits.insert(PAGE, Rect::new(10.0, 10.0, 20.0, 20.0), 1).unwrap();
        hits.rebuild_index(PAGE, page_bounds());

        assert_eq!(hits.len(PAGE), 0);
        assert!(hits.query(PAGE, Point::new(15.0, 15.0)).is_empty());
    }

    #[test]
    fn insert_needs_an_index() {
        let mut hits: HitTester<u8> = HitTester::default();
        assert_eq!(
            hits.insert(SurfaceId(3), Rect::new(0.0, 0.0, 1.0, 1.0), 0),
            Err(ScoreError::UnknownSurface(SurfaceId(3)))
        );
        hits.rebuild_index(SurfaceId(3), page_bounds());
        hits.remove(SurfaceId(3));
        assert!(!hits.has_surface(SurfaceId(3)));
    }
}
