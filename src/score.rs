//! The score aggregate handed to rendering: part list, connectors and one
//! measure per time slot, each built the first time it is asked for.

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::builder::build_measure;
use crate::error::ScoreError;
use crate::model::*;
use crate::parser::ScoreMetadata;

/// A validated score. Measures are built lazily and cached; everything is
/// read-only once built.
#[derive(Debug)]
pub struct Score {
    meta: ScoreMetadata,
    measures: Vec<OnceCell<Measure>>,
}

impl Score {
    /// Wrap parsed metadata without building any measure yet. Fails with
    /// the structural problem when the metadata is invalid.
    pub fn from_metadata(meta: ScoreMetadata) -> Result<Self, ScoreError> {
        if let Some(err) = meta.fatal_issue() {
            return Err(err.clone());
        }
        if !meta.is_valid() {
            return Err(ScoreError::UnsupportedInput("score marked invalid".to_string()));
        }
        let measures = (0..meta.measure_count()).map(|_| OnceCell::new()).collect();
        Ok(Self { meta, measures })
    }

    /// The measure at time slot `index`, built on first access.
    pub fn measure(&self, index: usize) -> Result<&Measure, ScoreError> {
        let cell = self.measures.get(index).ok_or(ScoreError::MeasureOutOfRange {
            index,
            count: self.measures.len(),
        })?;
        cell.get_or_try_init(|| build_measure(&self.meta, index))
    }

    /// Whether the measure at `index` has been built already.
    pub fn is_built(&self, index: usize) -> bool {
        self.measures.get(index).is_some_and(|cell| cell.get().is_some())
    }

    /// Build every measure that is not built yet.
    pub fn build_all(&self) -> Result<(), ScoreError> {
        for index in 0..self.measures.len() {
            self.measure(index)?;
        }
        Ok(())
    }

    /// All measures in slot order, building any that are missing.
    pub fn measures(&self) -> Result<Vec<&Measure>, ScoreError> {
        (0..self.measures.len()).map(|i| self.measure(i)).collect()
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    /// Attributes in effect for `part` at time slot `slot`.
    pub fn attributes(&self, slot: usize, part: usize) -> EffectiveAttributes {
        self.meta.attributes(slot, part)
    }

    pub fn parts(&self) -> &[PartInfo] {
        self.meta.parts()
    }

    pub fn stave_connectors(&self) -> &[StaveConnector] {
        self.meta.stave_connectors()
    }

    /// Measure number printed in the source for a slot (0 for a pickup).
    pub fn measure_number(&self, slot: usize) -> Option<i32> {
        self.meta.measure_number(slot)
    }

    pub fn staff_count(&self, part: usize) -> Option<usize> {
        self.meta.staff_count(part)
    }

    /// Recoverable problems met while parsing (e.g. malformed part groups).
    pub fn issues(&self) -> &[ScoreError] {
        self.meta.issues()
    }

    /// Resolve a note reference, building its measure if needed.
    pub fn note(&self, at: NoteRef) -> Option<&Note> {
        self.measure(at.measure)
            .ok()?
            .parts
            .get(at.part)?
            .voices
            .get(at.voice)?
            .notes
            .get(at.note)
    }

    /// Serialize the whole score, building every measure.
    pub fn to_json(&self) -> Result<String, ScoreError> {
        let snapshot = ScoreSnapshot {
            parts: self.parts(),
            stave_connectors: self.stave_connectors(),
            measure_numbers: &self.meta.measure_numbers,
            staff_counts: &self.meta.staff_counts,
            measures: self.measures()?,
        };
        serde_json::to_string_pretty(&snapshot).map_err(|e| ScoreError::Json(e.to_string()))
    }
}

#[derive(Serialize)]
struct ScoreSnapshot<'a> {
    parts: &'a [PartInfo],
    stave_connectors: &'a [StaveConnector],
    measure_numbers: &'a [Option<i32>],
    staff_counts: &'a [usize],
    measures: Vec<&'a Measure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const TWO_MEASURES: &str = r#"<score-partwise>
        <part-list><score-part id="P1"/></part-list>
        <part id="P1">
            <measure number="1">
                <attributes><divisions>1</divisions><clef><sign>F</sign><line>4</line></clef></attributes>
                <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><type>whole</type></note>
            </measure>
            <measure number="2">
                <note><rest/><duration>4</duration></note>
            </measure>
        </part>
    </score-partwise>"#;

    #[test]
    fn measures_build_on_first_access() {
        let score = Score::from_metadata(parse(TWO_MEASURES).unwrap()).unwrap();
        assert!(!score.is_built(0));
        assert!(!score.is_built(1));

        let second = score.measure(1).unwrap();
        assert_eq!(second.number, Some(2));
        assert!(score.is_built(1));
        assert!(!score.is_built(0));

        // Cached: the same instance comes back
        assert!(std::ptr::eq(second, score.measure(1).unwrap()));
    }

    #[test]
    fn out_of_range_measure() {
        let score = Score::from_metadata(parse(TWO_MEASURES).unwrap()).unwrap();
        assert_eq!(
            score.measure(2).unwrap_err(),
            ScoreError::MeasureOutOfRange { index: 2, count: 2 }
        );
    }

    #[test]
    fn note_refs_resolve() {
        let score = Score::from_metadata(parse(TWO_MEASURES).unwrap()).unwrap();
        let rest = score
            .note(NoteRef { measure: 1, part: 0, voice: 0, note: 0 })
            .unwrap();
        assert!(rest.rest);
        // Bass clef carried forward from measure 1, whole from divisions
        assert_eq!(rest.keys, vec!["d/3"]);
        assert_eq!(rest.value, NoteValue::Whole);
        assert!(score.note(NoteRef { measure: 1, part: 0, voice: 1, note: 0 }).is_none());
    }

    #[test]
    fn json_snapshot_contains_measures() {
        let score = Score::from_metadata(parse(TWO_MEASURES).unwrap()).unwrap();
        let json = score.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["measures"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["measures"][0]["parts"][0]["staves"][0]["clef"], "bass");
    }
}
