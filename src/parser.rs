//! MusicXML parser: walks a `score-partwise` document once, bucketing
//! every part's measures into time slots, recording attribute changes and
//! collecting the part list with its stave connectors.
//!
//! The result is [`ScoreMetadata`]: owned, validated raw material from
//! which [`crate::builder`] builds measures.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};

use crate::attributes::AttributeResolver;
use crate::error::ScoreError;
use crate::model::*;

/// Pitch as written in a `<note>`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPitch {
    /// Note name: A–G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1 = flat, 1 = sharp
    pub alter: Option<f64>,
}

/// A `<note>` element decoded without reference to the attributes in
/// effect. The measure builder finishes the job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawNote {
    pub pitch: Option<RawPitch>,
    pub rest: bool,
    /// `<rest measure="yes">`
    pub measure_rest: bool,
    /// Explicit rest position (`display-step`, `display-octave`)
    pub display: Option<(String, i32)>,
    /// Duration in divisions
    pub duration: Option<u32>,
    /// Note type: "whole", "half", "quarter", "eighth", ...
    pub note_type: Option<String>,
    pub dots: u8,
    /// Voice number as written (1-based)
    pub voice: Option<u32>,
    /// Staff number as written (1-based)
    pub staff: Option<u32>,
    pub chord: bool,
    pub grace: bool,
}

/// One part's `<measure>` element at one time slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMeasure {
    pub notes: Vec<RawNote>,
}

/// Everything gathered by a single pass over the document.
#[derive(Debug, Clone, Default)]
pub struct ScoreMetadata {
    pub(crate) parts: Vec<PartInfo>,
    pub(crate) stave_connectors: Vec<StaveConnector>,
    /// Actual measure number per time slot
    pub(crate) measure_numbers: Vec<Option<i32>>,
    pub(crate) staff_counts: Vec<usize>,
    pub(crate) resolver: AttributeResolver,
    /// Time slot -> one raw measure per part
    pub(crate) measures: Vec<Vec<RawMeasure>>,
    pub(crate) issues: Vec<ScoreError>,
    pub(crate) valid: bool,
}

impl ScoreMetadata {
    /// False when some part does not supply a measure for every time slot.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Problems found while parsing, fatal and recoverable.
    pub fn issues(&self) -> &[ScoreError] {
        &self.issues
    }

    /// The first fatal issue, if any.
    pub fn fatal_issue(&self) -> Option<&ScoreError> {
        self.issues.iter().find(|e| e.is_fatal())
    }

    pub fn parts(&self) -> &[PartInfo] {
        &self.parts
    }

    pub fn stave_connectors(&self) -> &[StaveConnector] {
        &self.stave_connectors
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    pub fn measure_number(&self, slot: usize) -> Option<i32> {
        self.measure_numbers.get(slot).copied().flatten()
    }

    pub fn staff_count(&self, part: usize) -> Option<usize> {
        self.staff_counts.get(part).copied()
    }

    pub fn attributes(&self, slot: usize, part: usize) -> EffectiveAttributes {
        self.resolver.effective(slot, part)
    }

    pub fn raw_measure(&self, slot: usize, part: usize) -> Option<&RawMeasure> {
        self.measures.get(slot)?.get(part)
    }

    fn flag_missing_measure(&mut self, slot: usize, part: usize) {
        self.valid = false;
        let issue = ScoreError::StructuralInconsistency { slot, part };
        if self.issues.contains(&issue) {
            return;
        }
        log::warn!("Part {part} missing measure at time slot {slot}");
        self.issues.push(issue);
    }
}

/// Parse a MusicXML string.
pub fn parse(xml: &str) -> Result<ScoreMetadata, ScoreError> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options).map_err(|e| ScoreError::Xml(e.to_string()))?;
    parse_document(&doc)
}

/// Parse an already parsed XML tree.
pub fn parse_document(doc: &Document) -> Result<ScoreMetadata, ScoreError> {
    let root = doc.root_element();

    // Verify this is a score-partwise document
    if root.tag_name().name() != "score-partwise" {
        return Err(ScoreError::UnsupportedInput(format!(
            "root element '{}'; only 'score-partwise' is supported",
            root.tag_name().name()
        )));
    }

    let mut meta = ScoreMetadata {
        valid: true,
        ..Default::default()
    };
    let mut declared = PartList::default();
    let mut part_ids = Vec::new();

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "part-list" => declared = parse_part_list(&child),
            "part" => {
                walk_part(&child, part_ids.len(), &mut meta);
                part_ids.push(child.attribute("id").unwrap_or("").to_string());
            }
            _ => {}
        }
    }

    let part_count = part_ids.len();
    if declared.parts.len() != part_count {
        log::warn!(
            "Part list declares {} parts but the score has {}",
            declared.parts.len(),
            part_count
        );
    }
    meta.parts = part_ids
        .into_iter()
        .enumerate()
        .map(|(index, id)| match declared.parts.get(index) {
            Some(info) => info.clone(),
            None => PartInfo { index, id, name: None },
        })
        .collect();
    meta.stave_connectors = declared.connectors;
    meta.issues.extend(declared.issues);

    check_short_parts(&mut meta, part_count);

    // A brace for each part with multiple staves
    for part in 0..part_count {
        let staves = meta.resolver.default_staff_count(part);
        meta.staff_counts.push(staves);
        if staves > 1 {
            meta.stave_connectors
                .push(StaveConnector::system_start(ConnectorKind::Brace, vec![part]));
        }
    }

    log::debug!(
        "Parsed {} parts, {} measures, {} stave connectors (valid: {})",
        part_count,
        meta.measures.len(),
        meta.stave_connectors.len(),
        meta.valid
    );
    Ok(meta)
}

// ─── Part (measures) ─────────────────────────────────────────────────

fn walk_part(node: &Node, part: usize, meta: &mut ScoreMetadata) {
    let measures = node.children().filter(|n| n.has_tag_name("measure"));
    for (slot, measure) in measures.enumerate() {
        if meta.measures.len() <= slot {
            meta.measures.push(Vec::new());
            meta.measure_numbers.push(None);
        }
        // Every earlier part must already have filled this slot
        let filled = meta.measures[slot].len();
        if filled != part {
            meta.flag_missing_measure(slot, filled.min(part));
            return;
        }

        if meta.measure_numbers[slot].is_none() {
            meta.measure_numbers[slot] = measure.attribute("number").and_then(parse_leading_int);
        }

        if let Some(attributes) = measure.children().find(|n| n.has_tag_name("attributes")) {
            meta.resolver.record_delta(slot, part, &attributes);
        }

        let notes = measure
            .children()
            .filter(|n| n.has_tag_name("note"))
            .map(|n| parse_note(&n))
            .collect();
        meta.measures[slot].push(RawMeasure { notes });
    }
}

/// Catch parts that stop early: their later slots hold fewer entries than
/// there are parts.
fn check_short_parts(meta: &mut ScoreMetadata, part_count: usize) {
    let mut reported = Vec::new();
    for slot in 0..meta.measures.len() {
        let filled = meta.measures[slot].len();
        if filled < part_count && !reported.contains(&filled) {
            let already = meta.issues.iter().any(|e| {
                matches!(e, ScoreError::StructuralInconsistency { part, .. } if *part == filled)
            });
            if !already {
                meta.flag_missing_measure(slot, filled);
            }
            reported.push(filled);
        }
    }
}

fn parse_leading_int(s: &str) -> Option<i32> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

// ─── Part List ───────────────────────────────────────────────────────

/// Parts and stave connectors declared in `<part-list>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartList {
    pub parts: Vec<PartInfo>,
    pub connectors: Vec<StaveConnector>,
    /// Recoverable problems (unmatched group stops)
    pub issues: Vec<ScoreError>,
}

#[derive(Debug, Default)]
struct OpenGroup {
    members: Vec<usize>,
    connectors: Vec<StaveConnector>,
}

/// Read the part list and the connectors implied by its part groups.
pub fn parse_part_list(node: &Node) -> PartList {
    let mut list = PartList::default();
    // Groups are matched by their `number` attribute
    let mut open: BTreeMap<String, OpenGroup> = BTreeMap::new();

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "part-group" => {
                let number = child.attribute("number").unwrap_or("1").to_string();
                match child.attribute("type") {
                    Some("start") => {
                        if open.contains_key(&number) {
                            log::warn!("Part group '{number}' restarted before it was stopped");
                        }
                        open.insert(number, start_group(&child));
                    }
                    Some("stop") => match open.remove(&number) {
                        Some(group) => {
                            list.connectors.extend(group.connectors.into_iter().map(|mut c| {
                                c.parts = group.members.clone();
                                c
                            }));
                        }
                        None => {
                            log::warn!("Part group '{number}' stopped without being started");
                            list.issues.push(ScoreError::MalformedGrouping { number });
                        }
                    },
                    _ => {}
                }
            }
            "score-part" => {
                let index = list.parts.len();
                for group in open.values_mut() {
                    group.members.push(index);
                }
                let name = child
                    .children()
                    .find(|n| n.has_tag_name("part-name"))
                    .and_then(|n| n.text())
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
                list.parts.push(PartInfo {
                    index,
                    id: child.attribute("id").unwrap_or("").to_string(),
                    name,
                });
            }
            _ => {}
        }
    }

    for number in open.keys() {
        log::warn!("Part group '{number}' never stopped; dropping its connectors");
    }

    list
}

fn start_group(node: &Node) -> OpenGroup {
    let mut group = OpenGroup::default();
    for child in node.children().filter(|n| n.is_element()) {
        let text = child.text().map(str::trim).unwrap_or("");
        match (child.tag_name().name(), text) {
            ("group-symbol", "bracket") => group
                .connectors
                .push(StaveConnector::system_start(ConnectorKind::Bracket, Vec::new())),
            ("group-symbol", "brace") => group
                .connectors
                .push(StaveConnector::system_start(ConnectorKind::Brace, Vec::new())),
            ("group-barline", "yes") => group.connectors.push(StaveConnector::barline_join(Vec::new())),
            _ => {}
        }
    }
    group
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &Node) -> RawNote {
    let mut note = RawNote::default();

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "pitch" => note.pitch = Some(parse_pitch(&child)),
            // Percussion: place the note where it is displayed
            "unpitched" => {
                if let Some((step, octave)) = parse_display(&child) {
                    note.pitch = Some(RawPitch { step, octave, alter: None });
                }
            }
            "rest" => {
                note.rest = true;
                note.measure_rest = child.attribute("measure") == Some("yes");
                note.display = parse_display(&child);
            }
            "duration" => note.duration = parse_u32(&child),
            "type" => note.note_type = child.text().map(|t| t.trim().to_string()),
            "dot" => note.dots = note.dots.saturating_add(1),
            "voice" => note.voice = parse_u32(&child),
            "staff" => note.staff = parse_u32(&child),
            "chord" => note.chord = true,
            "grace" => note.grace = true,
            _ => {}
        }
    }

    note
}

fn parse_pitch(node: &Node) -> RawPitch {
    let mut pitch = RawPitch {
        step: "C".to_string(),
        octave: 4,
        alter: None,
    };
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "step" => {
                pitch.step = child.text().unwrap_or("C").trim().to_string();
            }
            "octave" => pitch.octave = parse_i32(&child).unwrap_or(4),
            "alter" => pitch.alter = parse_f64(&child),
            _ => {}
        }
    }
    pitch
}

fn parse_display(node: &Node) -> Option<(String, i32)> {
    let step = node
        .children()
        .find(|n| n.has_tag_name("display-step"))?
        .text()?
        .trim()
        .to_string();
    let octave = node
        .children()
        .find(|n| n.has_tag_name("display-octave"))
        .and_then(|n| parse_i32(&n))?;
    Some((step, octave))
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn parse_i32(node: &Node) -> Option<i32> {
    node.text()?.trim().parse().ok()
}

fn parse_u32(node: &Node) -> Option<u32> {
    node.text()?.trim().parse().ok()
}

fn parse_f64(node: &Node) -> Option<f64> {
    node.text()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn part_list(xml: &str) -> PartList {
        let doc = Document::parse(xml).unwrap();
        parse_part_list(&doc.root_element())
    }

    #[test]
    fn bracket_group_with_barlines() {
        let list = part_list(
            r#"<part-list>
                <score-part id="P1"><part-name>Flute</part-name></score-part>
                <part-group type="start" number="1">
                    <group-symbol>bracket</group-symbol>
                    <group-barline>yes</group-barline>
                </part-group>
                <score-part id="P2"><part-name>Violin</part-name></score-part>
                <score-part id="P3"><part-name>Cello</part-name></score-part>
                <part-group type="stop" number="1"/>
            </part-list>"#,
        );

        assert_eq!(list.parts.len(), 3);
        assert_eq!(list.parts[1].id, "P2");
        assert_eq!(list.parts[2].name.as_deref(), Some("Cello"));
        assert!(list.issues.is_empty());
        assert_eq!(
            list.connectors,
            vec![
                StaveConnector {
                    kind: ConnectorKind::Bracket,
                    parts: vec![1, 2],
                    system_start: true,
                    measure_start: false,
                    measure_end: false,
                },
                StaveConnector {
                    kind: ConnectorKind::Single,
                    parts: vec![1, 2],
                    system_start: false,
                    measure_start: true,
                    measure_end: true,
                },
            ]
        );
    }

    #[test]
    fn unmatched_stop_is_recoverable() {
        let list = part_list(
            r#"<part-list>
                <score-part id="P1"/>
                <part-group type="stop" number="1"/>
                <score-part id="P2"/>
            </part-list>"#,
        );
        assert!(list.connectors.is_empty());
        assert_eq!(list.parts.len(), 2);
        assert_eq!(list.issues, vec![ScoreError::MalformedGrouping { number: "1".into() }]);
    }

    #[test]
    fn nested_groups_are_tracked_by_number() {
        let list = part_list(
            r#"<part-list>
                <part-group type="start" number="1"><group-symbol>bracket</group-symbol></part-group>
                <score-part id="P1"/>
                <part-group type="start" number="2"><group-symbol>brace</group-symbol></part-group>
                <score-part id="P2"/>
                <score-part id="P3"/>
                <part-group type="stop" number="2"/>
                <part-group type="stop" number="1"/>
            </part-list>"#,
        );
        assert_eq!(list.connectors.len(), 2);
        assert_eq!(list.connectors[0].kind, ConnectorKind::Brace);
        assert_eq!(list.connectors[0].parts, vec![1, 2]);
        assert_eq!(list.connectors[1].kind, ConnectorKind::Bracket);
        assert_eq!(list.connectors[1].parts, vec![0, 1, 2]);
    }

    #[test]
    fn group_without_symbol_or_barline_emits_nothing() {
        let list = part_list(
            r#"<part-list>
                <part-group type="start"><group-symbol>line</group-symbol><group-barline>no</group-barline></part-group>
                <score-part id="P1"/>
                <part-group type="stop"/>
            </part-list>"#,
        );
        assert!(list.connectors.is_empty());
        assert!(list.issues.is_empty());
    }

    #[test]
    fn rejects_timewise_scores() {
        let err = parse("<score-timewise><part-list/></score-timewise>").unwrap_err();
        assert!(matches!(err, ScoreError::UnsupportedInput(_)));
    }

    #[test]
    fn rejects_malformed_xml() {
        let err = parse("<score-partwise><part-list>").unwrap_err();
        assert!(matches!(err, ScoreError::Xml(_)));
    }

    #[test]
    fn leading_int_of_measure_numbers() {
        assert_eq!(parse_leading_int("12"), Some(12));
        assert_eq!(parse_leading_int("12a"), Some(12));
        assert_eq!(parse_leading_int("0"), Some(0));
        assert_eq!(parse_leading_int("X1"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn decodes_note_elements() {
        let doc = Document::parse(
            r#"<note><pitch><step>F</step><alter>1</alter><octave>5</octave></pitch>
                <duration>3</duration><voice>2</voice><type>quarter</type><dot/><staff>2</staff></note>"#,
        )
        .unwrap();
        let note = parse_note(&doc.root_element());
        assert_eq!(
            note.pitch,
            Some(RawPitch { step: "F".into(), octave: 5, alter: Some(1.0) })
        );
        assert_eq!(note.duration, Some(3));
        assert_eq!(note.voice, Some(2));
        assert_eq!(note.staff, Some(2));
        assert_eq!(note.dots, 1);
        assert_eq!(note.note_type.as_deref(), Some("quarter"));
        assert!(!note.rest && !note.chord && !note.grace);
    }

    #[test]
    fn decodes_positioned_rest() {
        let doc = Document::parse(
            r#"<note><rest measure="yes"><display-step>D</display-step><display-octave>5</display-octave></rest>
                <duration>8</duration></note>"#,
        )
        .unwrap();
        let note = parse_note(&doc.root_element());
        assert!(note.rest && note.measure_rest);
        assert_eq!(note.display, Some(("D".to_string(), 5)));
        assert_eq!(note.pitch, None);
    }
}
