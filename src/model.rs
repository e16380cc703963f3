//! Data model for the structural view of a parsed MusicXML score.
//!
//! These structures are built once by the parser and the measure builder
//! and are read-only afterwards. They carry what a renderer needs to lay
//! out staves, voices and notes.

use serde::{Deserialize, Serialize};

/// One entry of the score's part list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// Position in part order (the part's identity)
    pub index: usize,
    /// Part identifier from `<score-part id="...">` (e.g., "P1")
    pub id: String,
    /// Part name (e.g., "Piano")
    pub name: Option<String>,
}

/// Named clefs. `Unknown` stands in for any sign/line pair without a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    Treble,
    Alto,
    Tenor,
    Bass,
    Unknown,
}

/// Clef declaration as stored in an attribute delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClefSetting {
    /// Clef without a staff number: applies to the part as a whole
    Single(Clef),
    /// One slot per staff; `None` means "not declared here"
    PerStaff(Vec<Option<Clef>>),
}

/// Key signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
    /// Mode (e.g., "major", "minor")
    pub mode: Option<String>,
    /// Major key name (e.g., "Bb"); `None` when fifths is off the table
    pub name: Option<String>,
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Numerator (e.g., 3 in 3/4)
    pub num_beats: u32,
    /// Denominator (e.g., 4 in 3/4)
    pub beat_value: u32,
    /// No enforced beat count (senza misura, or never declared)
    pub soft: bool,
}

impl Default for TimeSignature {
    /// 4/4, soft: what a measure gets when no time signature was declared.
    fn default() -> Self {
        Self {
            num_beats: 4,
            beat_value: 4,
            soft: true,
        }
    }
}

/// Sparse attribute changes declared at one (time slot, part) coordinate.
/// Fields are only set when the source states them there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDelta {
    pub clef: Option<ClefSetting>,
    pub key: Option<Key>,
    pub time: Option<TimeSignature>,
    /// Divisions per quarter note
    pub divisions: Option<u32>,
}

/// Attributes in effect for a part at a time slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAttributes {
    pub clef: Option<ClefSetting>,
    pub key: Option<Key>,
    pub time: TimeSignature,
    pub divisions: Option<u32>,
}

impl EffectiveAttributes {
    /// Clef governing a staff (zero-based). A part-level clef governs
    /// staff 0 only.
    pub fn clef_for_staff(&self, staff: usize) -> Option<Clef> {
        match &self.clef {
            Some(ClefSetting::Single(clef)) if staff == 0 => Some(*clef),
            Some(ClefSetting::PerStaff(clefs)) => clefs.get(staff).copied().flatten(),
            _ => None,
        }
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| k.name.as_deref())
    }
}

/// Rhythmic value of a note, without dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl NoteValue {
    /// Duration code used by the rendering layer ("w", "h", "q", "8", ...).
    pub fn code(self) -> &'static str {
        match self {
            NoteValue::Whole => "w",
            NoteValue::Half => "h",
            NoteValue::Quarter => "q",
            NoteValue::Eighth => "8",
            NoteValue::Sixteenth => "16",
            NoteValue::ThirtySecond => "32",
            NoteValue::SixtyFourth => "64",
        }
    }

    /// Length in 64ths of a quarter note.
    pub(crate) fn quarter_64ths(self) -> u64 {
        match self {
            NoteValue::Whole => 256,
            NoteValue::Half => 128,
            NoteValue::Quarter => 64,
            NoteValue::Eighth => 32,
            NoteValue::Sixteenth => 16,
            NoteValue::ThirtySecond => 8,
            NoteValue::SixtyFourth => 4,
        }
    }

    pub(crate) const ALL: [NoteValue; 7] = [
        NoteValue::Whole,
        NoteValue::Half,
        NoteValue::Quarter,
        NoteValue::Eighth,
        NoteValue::Sixteenth,
        NoteValue::ThirtySecond,
        NoteValue::SixtyFourth,
    ];
}

/// A note, rest or chord inside a voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Pitch keys such as "c#/4"; a chord carries several
    pub keys: Vec<String>,
    pub value: NoteValue,
    pub dots: u8,
    pub rest: bool,
    /// Duration in divisions, as written
    pub ticks: Option<u32>,
    /// Staff index (zero-based)
    pub staff: Option<usize>,
    /// Index of the voice holding this note within its part
    pub voice: usize,
    pub chord: bool,
    pub grace: bool,
}

impl Note {
    /// Duration code with dots and rest marker, e.g. "qd" or "8r".
    pub fn duration_code(&self) -> String {
        let mut code = self.value.code().to_string();
        for _ in 0..self.dots {
            code.push('d');
        }
        if self.rest {
            code.push('r');
        }
        code
    }
}

/// An independent rhythmic line within a part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub notes: Vec<Note>,
    /// Staff this voice is drawn on; bound by its first note with a staff
    pub stave: Option<usize>,
}

/// One five-line staff of a part within a measure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stave {
    pub clef: Option<Clef>,
    pub key: Option<String>,
}

/// One part's contents within a measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurePart {
    /// Part-level clef, when the clef was declared without a staff number
    pub clef: Option<Clef>,
    pub key: Option<String>,
    pub staves: Vec<Stave>,
    /// Voices numbered 0..n after compaction
    pub voices: Vec<Voice>,
}

/// A single time slot across all parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Zero-based time slot
    pub index: usize,
    /// Number printed in the source (0 for a pickup)
    pub number: Option<i32>,
    /// Governing time signature, taken from the first part
    pub time: TimeSignature,
    pub parts: Vec<MeasurePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Brace,
    Bracket,
    /// Barlines joined across the grouped staves
    Single,
}

/// Visual grouping linking the staves of one or more parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaveConnector {
    pub kind: ConnectorKind,
    /// Part indices the connector spans
    pub parts: Vec<usize>,
    pub system_start: bool,
    pub measure_start: bool,
    pub measure_end: bool,
}

impl StaveConnector {
    pub(crate) fn system_start(kind: ConnectorKind, parts: Vec<usize>) -> Self {
        Self {
            kind,
            parts,
            system_start: true,
            measure_start: false,
            measure_end: false,
        }
    }

    pub(crate) fn barline_join(parts: Vec<usize>) -> Self {
        Self {
            kind: ConnectorKind::Single,
            parts,
            system_start: false,
            measure_start: true,
            measure_end: true,
        }
    }
}

/// Address of a note inside a score. Used as the payload of spatial
/// entries; it never owns the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteRef {
    pub measure: usize,
    pub part: usize,
    pub voice: usize,
    pub note: usize,
}
