//! Error types for score loading and hit testing.

use thiserror::Error;

use crate::hit_test::SurfaceId;

/// Everything that can go wrong while loading a score or querying a surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    /// The input is not something this crate can read (wrong root element,
    /// wrong representation).
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("MXL archive error: {0}")]
    Archive(String),

    #[error("Failed to read '{path}': {message}")]
    Io { path: String, message: String },

    /// A part does not supply a measure for a time slot another part fills.
    #[error("Part {part} missing measure at time slot {slot}")]
    StructuralInconsistency { slot: usize, part: usize },

    /// A `<part-group type="stop">` with no matching start.
    #[error("Part group '{number}' stopped without being started")]
    MalformedGrouping { number: String },

    #[error("Measure index {index} out of range (score has {count} measures)")]
    MeasureOutOfRange { index: usize, count: usize },

    #[error("No spatial index for surface {0}")]
    UnknownSurface(SurfaceId),

    #[error("JSON serialization error: {0}")]
    Json(String),
}

/// Coarse classification of a [`ScoreError`], for callers that report a
/// diagnosis without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedInput,
    StructuralInconsistency,
    MalformedGrouping,
    OutOfRange,
    UnknownSurface,
    Serialization,
}

impl ScoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoreError::UnsupportedInput(_)
            | ScoreError::Xml(_)
            | ScoreError::Archive(_)
            | ScoreError::Io { .. } => ErrorKind::UnsupportedInput,
            ScoreError::StructuralInconsistency { .. } => ErrorKind::StructuralInconsistency,
            ScoreError::MalformedGrouping { .. } => ErrorKind::MalformedGrouping,
            ScoreError::MeasureOutOfRange { .. } => ErrorKind::OutOfRange,
            ScoreError::UnknownSurface(_) => ErrorKind::UnknownSurface,
            ScoreError::Json(_) => ErrorKind::Serialization,
        }
    }

    /// Malformed part groups only cost the offending group's connectors;
    /// every other error stops the operation that raised it.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::MalformedGrouping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        let root = ScoreError::UnsupportedInput("score-timewise".into());
        let missing = ScoreError::StructuralInconsistency { slot: 3, part: 1 };
        let group = ScoreError::MalformedGrouping { number: "1".into() };

        assert_eq!(root.kind(), ErrorKind::UnsupportedInput);
        assert_eq!(missing.kind(), ErrorKind::StructuralInconsistency);
        assert_eq!(group.kind(), ErrorKind::MalformedGrouping);
        assert!(root.is_fatal());
        assert!(missing.is_fatal());
        assert!(!group.is_fatal());
    }

    #[test]
    fn messages_name_the_coordinates() {
        let err = ScoreError::StructuralInconsistency { slot: 4, part: 2 };
        assert_eq!(err.to_string(), "Part 2 missing measure at time slot 4");
    }
}
