//! Quadtree over the bounding boxes drawn on one rendering surface.
//!
//! Nodes split into four quadrants once they hold more than
//! `max_objects` entries. An entry that straddles a quadrant boundary
//! stays in the parent, so retrieval returns a superset of the entries
//! that actually overlap the probe; callers do the exact test.

use serde::{Deserialize, Serialize};

/// A point in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Undo a surface zoom.
    pub fn descale(self, zoom: f64) -> Self {
        if zoom.is_finite() && zoom > 0.0 {
            Self::new(self.x / zoom, self.y / zoom)
        } else {
            self
        }
    }
}

/// Axis-aligned rectangle: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// 1×1 probe at a point.
    pub fn probe(point: Point) -> Self {
        Self::new(point.x, point.y, 1.0, 1.0)
    }

    /// Edges count as inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Tuning for a surface's quadtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadtreeConfig {
    /// Entries a node holds before it splits
    pub max_objects: usize,
    /// Deepest level a node may split to
    pub max_levels: usize,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            max_objects: 10,
            max_levels: 4,
        }
    }
}

/// A bounding box and the object drawn in it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry<T> {
    pub rect: Rect,
    pub value: T,
}

#[derive(Debug, Clone)]
pub struct Quadtree<T> {
    bounds: Rect,
    config: QuadtreeConfig,
    level: usize,
    entries: Vec<SpatialEntry<T>>,
    /// Top-right, top-left, bottom-left, bottom-right
    children: Option<Box<[Quadtree<T>; 4]>>,
}

impl<T> Quadtree<T> {
    pub fn new(bounds: Rect, config: QuadtreeConfig) -> Self {
        Self::at_level(bounds, config, 0)
    }

    fn at_level(bounds: Rect, config: QuadtreeConfig, level: usize) -> Self {
        Self {
            bounds,
            config,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Number of entries in the whole tree.
    pub fn len(&self) -> usize {
        self.entries.len()
            + self
                .children
                .as_ref()
                .map_or(0, |children| children.iter().map(Quadtree::len).sum())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth of the deepest node (0 when never split).
    pub fn depth(&self) -> usize {
        match &self.children {
            Some(children) => 1 + children.iter().map(Quadtree::depth).max().unwrap_or(0),
            None => 0,
        }
    }

    pub fn insert(&mut self, rect: Rect, value: T) {
        let entry = SpatialEntry { rect, value };
        if let Some(children) = self.children.as_mut() {
            if let Some(index) = quadrant(&self.bounds, &entry.rect) {
                children[index].insert(entry.rect, entry.value);
                return;
            }
        }

        self.entries.push(entry);

        if self.entries.len() > self.config.max_objects && self.level < self.config.max_levels {
            if self.children.is_none() {
                self.split();
            }
            self.redistribute();
        }
    }

    /// Entries whose boxes could overlap `rect`.
    pub fn retrieve(&self, rect: &Rect) -> Vec<&SpatialEntry<T>> {
        let mut found = Vec::new();
        self.collect(rect, &mut found);
        found
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.children = None;
    }

    fn collect<'a>(&'a self, rect: &Rect, found: &mut Vec<&'a SpatialEntry<T>>) {
        if let Some(children) = &self.children {
            match quadrant(&self.bounds, rect) {
                Some(index) => children[index].collect(rect, found),
                None => {
                    for child in children.iter() {
                        child.collect(rect, found);
                    }
                }
            }
        }
        found.extend(self.entries.iter());
    }

    fn split(&mut self) {
        let Rect { x, y, width, height } = self.bounds;
        let (w, h) = (width / 2.0, height / 2.0);
        let level = self.level + 1;
        let config = self.config;
        self.children = Some(Box::new([
            Quadtree::at_level(Rect::new(x + w, y, w, h), config, level),
            Quadtree::at_level(Rect::new(x, y, w, h), config, level),
            Quadtree::at_level(Rect::new(x, y + h, w, h), config, level),
            Quadtree::at_level(Rect::new(x + w, y + h, w, h), config, level),
        ]));
    }

    /// Push down every entry that fits wholly inside one quadrant.
    fn redistribute(&mut self) {
        let Some(children) = self.children.as_mut() else {
            return;
        };
        let mut kept = Vec::new();
        for entry in self.entries.drain(..) {
            match quadrant(&self.bounds, &entry.rect) {
                Some(index) => children[index].insert(entry.rect, entry.value),
                None => kept.push(entry),
            }
        }
        self.entries = kept;
    }
}

/// Quadrant of `bounds` that wholly contains `rect`, if any.
fn quadrant(bounds: &Rect, rect: &Rect) -> Option<usize> {
    let mid_x = bounds.x + bounds.width / 2.0;
    let mid_y = bounds.y + bounds.height / 2.0;

    let top = rect.y + rect.height < mid_y;
    let bottom = rect.y > mid_y;
    let left = rect.x + rect.width < mid_x;
    let right = rect.x > mid_x;

    match (top, bottom, left, right) {
        (true, _, _, true) => Some(0),
        (true, _, true, _) => Some(1),
        (_, true, true, _) => Some(2),
        (_, true, _, true) => Some(3),
        _ => None,
    }
}
