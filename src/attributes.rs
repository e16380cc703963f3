//! Attribute resolver: records the sparse `<attributes>` changes of every
//! (time slot, part) coordinate and folds them into the attributes in
//! effect at any later slot.

use std::collections::BTreeMap;

use roxmltree::Node;

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accidental {
    Natural,
    Sharp,
    Flat,
}

/// Major keys around the circle of fifths, with accidental kind and count.
const KEY_SPECS: [(&str, Accidental, u32); 15] = [
    ("C", Accidental::Natural, 0),
    ("G", Accidental::Sharp, 1),
    ("D", Accidental::Sharp, 2),
    ("A", Accidental::Sharp, 3),
    ("E", Accidental::Sharp, 4),
    ("B", Accidental::Sharp, 5),
    ("F#", Accidental::Sharp, 6),
    ("C#", Accidental::Sharp, 7),
    ("F", Accidental::Flat, 1),
    ("Bb", Accidental::Flat, 2),
    ("Eb", Accidental::Flat, 3),
    ("Ab", Accidental::Flat, 4),
    ("Db", Accidental::Flat, 5),
    ("Gb", Accidental::Flat, 6),
    ("Cb", Accidental::Flat, 7),
];

/// Convert a key given as fifths (e.g. -2) to its major key name ("Bb").
/// Returns `None` outside -7..=7.
pub fn fifths_to_key(fifths: i32) -> Option<&'static str> {
    KEY_SPECS
        .iter()
        .find(|(_, acc, num)| {
            if fifths < 0 {
                *acc == Accidental::Flat && *num == fifths.unsigned_abs()
            } else {
                *acc != Accidental::Flat && *num == fifths.unsigned_abs()
            }
        })
        .map(|(name, _, _)| *name)
}

/// Map a clef sign and staff line to a named clef.
pub fn clef_from_sign_line(sign: &str, line: i32) -> Clef {
    match (sign, line) {
        ("G", 2) => Clef::Treble,
        ("C", 3) => Clef::Alto,
        ("C", 4) => Clef::Tenor,
        ("F", 4) => Clef::Bass,
        _ => Clef::Unknown,
    }
}

/// Most staves a part may declare; larger `<staves>` values are ignored.
pub const MAX_STAVES: usize = 16;

/// Owner of all attribute deltas of a score.
///
/// Deltas are stored per part in slot order, and [`effective`] is the only
/// way to combine them, so a fold always runs from slot 0 upwards.
///
/// [`effective`]: AttributeResolver::effective
#[derive(Debug, Clone, Default)]
pub struct AttributeResolver {
    /// part -> slot -> delta
    deltas: BTreeMap<usize, BTreeMap<usize, AttributeDelta>>,
    /// Declared staff count per part (from `<staves>` in slot 0)
    staff_counts: Vec<Option<usize>>,
}

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `<attributes>` element and record what it declares at
    /// (slot, part). Unknown children are skipped.
    pub fn record_delta(&mut self, slot: usize, part: usize, node: &Node) {
        // Staff count is fixed by the first measure, before any clef is sized
        if slot == 0 {
            if let Some(staves) = node.children().find(|n| n.has_tag_name("staves")) {
                self.record_staves(part, &staves);
            }
        }

        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "staves" => {}
                "key" => match parse_key(&child) {
                    Some(key) => self.delta_mut(slot, part).key = Some(key),
                    None => log::debug!("Key without fifths at slot {slot}, part {part}"),
                },
                "time" => self.delta_mut(slot, part).time = Some(parse_time(&child)),
                "clef" => {
                    let (number, clef) = parse_clef(&child);
                    self.record_clef(slot, part, number, clef);
                }
                "divisions" => {
                    if let Some(d) = parse_u32(&child).filter(|d| *d > 0) {
                        self.delta_mut(slot, part).divisions = Some(d);
                    }
                }
                other => log::trace!("Skipping <{other}> in attributes at slot {slot}, part {part}"),
            }
        }
    }

    /// The delta declared exactly at (slot, part), if any.
    pub fn delta(&self, slot: usize, part: usize) -> Option<&AttributeDelta> {
        self.deltas.get(&part)?.get(&slot)
    }

    /// Attributes in effect for `part` at `slot`: every delta from slot 0
    /// through `slot`, applied in slot order.
    pub fn effective(&self, slot: usize, part: usize) -> EffectiveAttributes {
        let mut attrs = EffectiveAttributes::default();
        let staff_count = self.staff_count(part).unwrap_or(1);
        if let Some(deltas) = self.deltas.get(&part) {
            for delta in deltas.range(..=slot).map(|(_, d)| d) {
                apply_delta(&mut attrs, delta, staff_count);
            }
        }
        attrs
    }

    pub fn staff_count(&self, part: usize) -> Option<usize> {
        self.staff_counts.get(part).copied().flatten()
    }

    /// Give `part` one staff unless `<staves>` declared otherwise.
    pub(crate) fn default_staff_count(&mut self, part: usize) -> usize {
        match self.staff_count(part) {
            Some(n) => n,
            None => {
                self.set_staff_count(part, 1);
                1
            }
        }
    }

    fn record_staves(&mut self, part: usize, node: &Node) {
        match parse_u32(node).map(|n| n as usize) {
            Some(n) if (1..=MAX_STAVES).contains(&n) => self.set_staff_count(part, n),
            Some(n) => log::warn!("Ignoring <staves>{n}</staves> for part {part}"),
            None => log::debug!("Unreadable <staves> for part {part}"),
        }
    }

    fn set_staff_count(&mut self, part: usize, count: usize) {
        if self.staff_counts.len() <= part {
            self.staff_counts.resize(part + 1, None);
        }
        self.staff_counts[part] = Some(count);
    }

    fn delta_mut(&mut self, slot: usize, part: usize) -> &mut AttributeDelta {
        self.deltas.entry(part).or_default().entry(slot).or_default()
    }

    fn record_clef(&mut self, slot: usize, part: usize, number: Option<u32>, clef: Clef) {
        let staff_count = self.staff_count(part).unwrap_or(1);
        match number {
            Some(n) if n > 0 => {
                let idx = n as usize - 1;
                if idx >= staff_count {
                    log::warn!("Dropping clef for staff {n} of part {part} ({staff_count} staves) at slot {slot}");
                    return;
                }
                let delta = self.delta_mut(slot, part);
                // Several numbered clefs in one <attributes> share an array
                let mut clefs = match delta.clef.take() {
                    Some(ClefSetting::PerStaff(clefs)) => fixed_clefs(&clefs, staff_count),
                    _ => vec![None; staff_count],
                };
                clefs[idx] = Some(clef);
                delta.clef = Some(ClefSetting::PerStaff(clefs));
            }
            _ => self.delta_mut(slot, part).clef = Some(ClefSetting::Single(clef)),
        }
    }
}

fn apply_delta(attrs: &mut EffectiveAttributes, delta: &AttributeDelta, staff_count: usize) {
    if let Some(clef) = &delta.clef {
        attrs.clef = Some(merge_clef(attrs.clef.take(), clef, staff_count));
    }
    if let Some(key) = &delta.key {
        attrs.key = Some(key.clone());
    }
    if let Some(time) = delta.time {
        attrs.time = time;
    }
    if let Some(divisions) = delta.divisions {
        attrs.divisions = Some(divisions);
    }
}

/// Per-staff clefs merge index by index into one slot per staff. An
/// unnamed clef only fills a staff that has no clef yet. A scalar clef
/// replaces wholesale.
fn merge_clef(current: Option<ClefSetting>, incoming: &ClefSetting, staff_count: usize) -> ClefSetting {
    match (current, incoming) {
        (current, ClefSetting::PerStaff(clefs)) => {
            let mut merged = match current {
                Some(ClefSetting::PerStaff(merged)) => fixed_clefs(&merged, staff_count),
                _ => vec![None; staff_count],
            };
            for (slot, clef) in merged.iter_mut().zip(clefs) {
                match (slot.as_ref(), clef) {
                    (_, None) => {}
                    (Some(_), Some(Clef::Unknown)) => {}
                    (_, Some(c)) => *slot = Some(*c),
                }
            }
            ClefSetting::PerStaff(merged)
        }
        (_, incoming) => incoming.clone(),
    }
}

/// Copy of `clefs` with exactly `staff_count` slots.
fn fixed_clefs(clefs: &[Option<Clef>], staff_count: usize) -> Vec<Option<Clef>> {
    (0..staff_count).map(|i| clefs.get(i).copied().flatten()).collect()
}

// ─── Element decoding ────────────────────────────────────────────────

fn parse_key(node: &Node) -> Option<Key> {
    let mut fifths = None;
    let mut mode = None;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "fifths" => fifths = child.text().and_then(|t| t.trim().parse::<i32>().ok()),
            "mode" => mode = child.text().map(|t| t.trim().to_string()),
            _ => {}
        }
    }
    let fifths = fifths?;
    Some(Key {
        fifths,
        mode,
        name: fifths_to_key(fifths).map(String::from),
    })
}

fn parse_time(node: &Node) -> TimeSignature {
    if node.children().any(|n| n.has_tag_name("senza-misura")) {
        return TimeSignature::default();
    }
    let mut ts = TimeSignature {
        num_beats: 4,
        beat_value: 4,
        soft: false,
    };
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "beats" => {
                // Composite signatures such as "3+2"
                if let Some(beats) = child.text().and_then(|t| {
                    t.split('+').map(|p| p.trim().parse::<u32>().ok()).sum::<Option<u32>>()
                }) {
                    ts.num_beats = beats;
                }
            }
            "beat-type" => ts.beat_value = parse_u32(&child).unwrap_or(4),
            _ => {}
        }
    }
    ts
}

fn parse_clef(node: &Node) -> (Option<u32>, Clef) {
    let number = node.attribute("number").and_then(|n| n.trim().parse::<u32>().ok());
    let mut sign = None;
    let mut line = None;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "sign" => sign = child.text().map(|t| t.trim().to_string()),
            "line" => line = child.text().and_then(|t| t.trim().parse::<i32>().ok()),
            _ => {}
        }
    }
    let clef = match sign.as_deref() {
        Some(sign) => {
            // <line> may be omitted; each sign has a standard line
            let line = line.unwrap_or(match sign {
                "G" => 2,
                "F" => 4,
                "C" => 3,
                _ => 0,
            });
            clef_from_sign_line(sign, line)
        }
        None => Clef::Unknown,
    };
    (number, clef)
}

fn parse_u32(node: &Node) -> Option<u32> {
    node.text()?.trim().parse().ok()
}
