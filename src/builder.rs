//! Measure builder: turns the raw notes of one time slot into a
//! structural [`Measure`]: staves seeded from the effective attributes,
//! notes grouped into chords and voices, voices compacted.

use std::collections::BTreeMap;

use crate::error::ScoreError;
use crate::model::*;
use crate::parser::{RawMeasure, RawNote, RawPitch, ScoreMetadata};

/// Build the measure at time slot `slot`.
pub fn build_measure(meta: &ScoreMetadata, slot: usize) -> Result<Measure, ScoreError> {
    let raw_parts = meta.measures.get(slot).ok_or(ScoreError::MeasureOutOfRange {
        index: slot,
        count: meta.measures.len(),
    })?;

    // The first part's time signature governs the whole measure
    let time = meta.resolver.effective(slot, 0).time;

    let parts = raw_parts
        .iter()
        .enumerate()
        .map(|(part, raw)| {
            let attrs = meta.resolver.effective(slot, part);
            let staff_count = meta.staff_count(part).unwrap_or(1);
            build_part(raw, &attrs, staff_count)
        })
        .collect();

    Ok(Measure {
        index: slot,
        number: meta.measure_number(slot),
        time,
        parts,
    })
}

fn build_part(raw: &RawMeasure, attrs: &EffectiveAttributes, staff_count: usize) -> MeasurePart {
    let key = attrs.key_name().map(String::from);
    let clef = match attrs.clef {
        Some(ClefSetting::Single(clef)) => Some(clef),
        _ => None,
    };
    let staves = (0..staff_count.max(1))
        .map(|staff| Stave {
            clef: attrs.clef_for_staff(staff),
            key: key.clone(),
        })
        .collect();

    MeasurePart {
        clef,
        key,
        staves,
        voices: collect_voices(&raw.notes, attrs),
    }
}

/// Group notes into voices in document order. A chord continuation adds
/// its key to the note before it, so each note is held back until the
/// next non-chord note (or the end of the measure) shows it is complete.
fn collect_voices(raw_notes: &[RawNote], attrs: &EffectiveAttributes) -> Vec<Voice> {
    let mut voices: BTreeMap<usize, Voice> = BTreeMap::new();
    voices.insert(0, Voice::default());
    let mut pending: Option<Note> = None;

    for raw in raw_notes {
        // Grace notes are not supported downstream
        if raw.grace {
            continue;
        }
        let note = decode_note(raw, attrs);

        let voice = voices.entry(note.voice).or_default();
        if voice.stave.is_none() {
            voice.stave = note.staff;
        }

        if note.chord {
            if let Some(prev) = pending.as_mut() {
                prev.keys.extend(note.keys.into_iter().take(1));
                continue;
            }
            log::debug!("Chord continuation without a preceding note; starting a new note");
        }

        if let Some(prev) = pending.replace(note) {
            voices.entry(prev.voice).or_default().notes.push(prev);
        }
    }
    if let Some(prev) = pending {
        voices.entry(prev.voice).or_default().notes.push(prev);
    }

    compact_voices(voices)
}

/// Drop empty voices and renumber the rest 0..n, keeping their order.
pub fn compact_voices(voices: BTreeMap<usize, Voice>) -> Vec<Voice> {
    voices
        .into_values()
        .filter(|voice| !voice.notes.is_empty())
        .enumerate()
        .map(|(index, mut voice)| {
            for note in &mut voice.notes {
                note.voice = index;
            }
            voice
        })
        .collect()
}

// ─── Note decoding ───────────────────────────────────────────────────

fn decode_note(raw: &RawNote, attrs: &EffectiveAttributes) -> Note {
    let staff = raw.staff.filter(|s| *s > 0).map(|s| s as usize - 1);
    let voice = raw.voice.filter(|v| *v > 0).map_or(0, |v| v as usize - 1);

    let key = match (&raw.pitch, raw.rest) {
        (Some(pitch), false) => pitch_key(pitch),
        _ => rest_key(raw.display.as_ref(), attrs.clef_for_staff(staff.unwrap_or(0))),
    };
    let (value, dots) = note_value(raw, attrs.divisions);

    Note {
        keys: vec![key],
        value,
        dots,
        rest: raw.rest,
        ticks: raw.duration,
        staff,
        voice,
        chord: raw.chord,
        grace: raw.grace,
    }
}

/// "c#/4" style key for a pitch.
fn pitch_key(pitch: &RawPitch) -> String {
    let accidental = match pitch.alter.map(|a| a.round() as i32).unwrap_or(0) {
        2 => "##",
        1 => "#",
        -1 => "b",
        -2 => "bb",
        _ => "",
    };
    format!("{}{}/{}", pitch.step.to_lowercase(), accidental, pitch.octave)
}

/// Where a rest sits: its explicit display position, otherwise the middle
/// of the staff for the clef in effect.
fn rest_key(display: Option<&(String, i32)>, clef: Option<Clef>) -> String {
    if let Some((step, octave)) = display {
        return format!("{}/{}", step.to_lowercase(), octave);
    }
    match clef {
        Some(Clef::Bass) => "d/3",
        Some(Clef::Alto) => "c/4",
        Some(Clef::Tenor) => "a/3",
        _ => "b/4",
    }
    .to_string()
}

fn note_value(raw: &RawNote, divisions: Option<u32>) -> (NoteValue, u8) {
    if let Some(value) = raw.note_type.as_deref().and_then(value_from_type) {
        return (value, raw.dots);
    }
    if raw.measure_rest {
        return (NoteValue::Whole, 0);
    }
    if let (Some(ticks), Some(divisions)) = (raw.duration, divisions) {
        if let Some(found) = value_from_ticks(ticks, divisions) {
            return found;
        }
    }
    log::debug!(
        "No note value for duration {:?} at {:?} divisions; using a quarter",
        raw.duration,
        divisions
    );
    (NoteValue::Quarter, raw.dots)
}

fn value_from_type(note_type: &str) -> Option<NoteValue> {
    match note_type {
        "whole" => Some(NoteValue::Whole),
        "half" => Some(NoteValue::Half),
        "quarter" => Some(NoteValue::Quarter),
        "eighth" => Some(NoteValue::Eighth),
        "16th" => Some(NoteValue::Sixteenth),
        "32nd" => Some(NoteValue::ThirtySecond),
        "64th" => Some(NoteValue::SixtyFourth),
        _ => None,
    }
}

/// Note value (and dots) whose length is exactly `ticks` at `divisions`
/// ticks per quarter.
fn value_from_ticks(ticks: u32, divisions: u32) -> Option<(NoteValue, u8)> {
    if divisions == 0 {
        return None;
    }
    let scaled = u64::from(ticks) * 64;
    let divisions = u64::from(divisions);
    if scaled % divisions != 0 {
        return None;
    }
    let len = scaled / divisions;
    NoteValue::ALL.iter().find_map(|&value| {
        let base = value.quarter_64ths();
        if len == base {
            Some((value, 0))
        } else if len * 2 == base * 3 {
            Some((value, 1))
        } else if len * 4 == base * 7 {
            Some((value, 2))
        } else {
            None
        }
    })
}
