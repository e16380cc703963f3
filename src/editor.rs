//! Editable score: a fully built [`Score`] plus the hit tester that maps
//! rendered boxes back to notes. The score is held, not extended; the
//! rendering step feeds boxes in through [`EditableScore::index_surface`]
//! and pointer input comes back through [`EditableScore::handle_event`].

use crate::error::ScoreError;
use crate::hit_test::{HitTester, SurfaceId};
use crate::model::{Note, NoteRef};
use crate::score::Score;
use crate::spatial::{Point, QuadtreeConfig, Rect};

/// Raw input delivered by the windowing layer, in unzoomed device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { surface: SurfaceId, point: Point },
}

#[derive(Debug)]
pub struct EditableScore {
    score: Score,
    hits: HitTester<NoteRef>,
    zoom: f64,
}

impl EditableScore {
    /// Build every measure up front so references stay valid while editing.
    pub fn new(score: Score) -> Result<Self, ScoreError> {
        Self::with_config(score, QuadtreeConfig::default())
    }

    pub fn with_config(score: Score, config: QuadtreeConfig) -> Result<Self, ScoreError> {
        score.build_all()?;
        Ok(Self {
            score,
            hits: HitTester::new(config),
            zoom: 1.0,
        })
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Only finite, positive factors are accepted.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        } else {
            log::warn!("Ignoring zoom factor {zoom}");
        }
    }

    /// Replace the index of a redrawn surface with the boxes just drawn.
    pub fn index_surface<I>(&mut self, surface: SurfaceId, bounds: Rect, boxes: I) -> Result<(), ScoreError>
    where
        I: IntoIterator<Item = (Rect, NoteRef)>,
    {
        self.hits.rebuild_index(surface, bounds);
        for (rect, note) in boxes {
            self.hits.insert(surface, rect, note)?;
        }
        Ok(())
    }

    /// Notes under a point given in zoomed surface units.
    pub fn objects_at(&self, surface: SurfaceId, point: Point) -> Vec<NoteRef> {
        self.hits.query(surface, point.descale(self.zoom))
    }

    pub fn handle_event(&self, event: &InputEvent) -> Vec<NoteRef> {
        match *event {
            InputEvent::PointerDown { surface, point } => {
                let found = self.objects_at(surface, point);
                log::debug!("Pointer down on surface {surface} at {point:?}: {} hit(s)", found.len());
                found
            }
        }
    }

    pub fn note(&self, at: NoteRef) -> Option<&Note> {
        self.score.note(at)
    }
}
