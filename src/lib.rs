//! scorecore: structural model of MusicXML scores, plus hit testing over
//! rendered pages.
//!
//! Loading happens in two steps. [`parse`] walks a `score-partwise`
//! document once and collects the part list, stave connectors, sparse
//! attribute changes and raw notes per time slot. [`build_measures`] turns
//! that into a [`Score`] whose measures carry staves, voices and notes.
//! [`load`] does both.
//!
//! Supports both uncompressed MusicXML (.musicxml) and compressed MXL (.mxl) files.
//!
//! # Example
//! ```no_run
//! use scorecore::parse_file;
//!
//! let score = parse_file("path/to/score.musicxml").unwrap();
//! println!("Parts: {}", score.parts().len());
//! println!("Measures: {}", score.measure_count());
//! let first = score.measure(0).unwrap();
//! println!("Time: {}/{}", first.time.num_beats, first.time.beat_value);
//! ```

pub mod attributes;
pub mod builder;
pub mod editor;
pub mod error;
pub mod hit_test;
pub mod model;
pub mod mxl;
pub mod parser;
pub mod score;
pub mod spatial;

use std::path::Path;

pub use editor::{EditableScore, InputEvent};
pub use error::{ErrorKind, ScoreError};
pub use hit_test::{HitTester, SurfaceId};
pub use model::*;
pub use parser::{parse, parse_document, ScoreMetadata};
pub use score::Score;
pub use spatial::{Point, QuadtreeConfig, Rect};

/// Build a [`Score`] from parsed metadata, building every measure.
/// Fails if the metadata was marked invalid.
pub fn build_measures(meta: ScoreMetadata) -> Result<Score, ScoreError> {
    let score = Score::from_metadata(meta)?;
    score.build_all()?;
    Ok(score)
}

/// Parse a MusicXML string and build all of its measures.
pub fn load(xml: &str) -> Result<Score, ScoreError> {
    build_measures(parse(xml)?)
}

/// Parse a MusicXML file from a file path.
/// Automatically detects format based on file extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Score, ScoreError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| ScoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    parse_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Parse MusicXML from raw bytes with an optional format hint.
/// If `extension` is None, tries to auto-detect the format.
pub fn parse_bytes(data: &[u8], extension: Option<&str>) -> Result<Score, ScoreError> {
    let meta = match extension {
        Some("mxl") => mxl::parse_mxl(data)?,
        Some("musicxml") | Some("xml") => parse(utf8(data)?)?,
        _ => {
            // Auto-detect: try as XML first, then as MXL
            match std::str::from_utf8(data) {
                Ok(xml) if xml.trim_start().starts_with('<') => parse(xml)?,
                _ => mxl::parse_mxl(data)?,
            }
        }
    };
    build_measures(meta)
}

/// Convert a score to a JSON string, building any measures not built yet.
pub fn score_to_json(score: &Score) -> Result<String, ScoreError> {
    score.to_json()
}

fn utf8(data: &[u8]) -> Result<&str, ScoreError> {
    std::str::from_utf8(data)
        .map_err(|e| ScoreError::UnsupportedInput(format!("invalid UTF-8 in MusicXML file: {e}")))
}
