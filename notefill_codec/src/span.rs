// Span grouping: stream <-> placeholder-keyed instruction lists.
//
// `parse` walks the decoded token stream with a two-state machine
// (`SeekingPlaceholder` until the first placeholder, then `InSpan(id)`), and
// appends every non-placeholder instruction to the span of the current key.
// End of stream is the only terminal condition.
//
// Design decisions:
// - **Repeated ids merge.** A placeholder id seen twice keeps its first-seen
//   position and later tokens are appended to it, so a response that splits
//   one span around another still yields all of its notes.
// - **Preamble is lazy.** The `SpanKey::Preamble` entry exists only if at least
//   one instruction precedes the first placeholder.
// - **Cursor model.** Inside a span, `Wait` advances the cursor and a `Note`
//   immediately followed by a positive `Duration` sounds at the cursor. Notes
//   can stack at the same cursor position (chords).

use std::fmt::Write as _;

use crate::token::{SEPARATOR, decode_lenient};
use crate::types::{Instruction, PlaceholderId, SpanKey, TimedNote};

/// Placeholder-keyed instruction lists, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpanMap {
    spans: Vec<(SpanKey, Vec<Instruction>)>,
}

impl SpanMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions of a span. A missing key yields an empty slice.
    pub fn get(&self, key: impl Into<SpanKey>) -> &[Instruction] {
        let key = key.into();
        self.spans
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, key: impl Into<SpanKey>) -> bool {
        let key = key.into();
        self.spans.iter().any(|(k, _)| *k == key)
    }

    /// Append one instruction to a span, creating the span if needed.
    pub fn push(&mut self, key: impl Into<SpanKey>, instruction: Instruction) {
        self.span_mut(key.into()).push(instruction);
    }

    /// Append a run of instructions to a span, creating the span if needed.
    pub fn extend(
        &mut self,
        key: impl Into<SpanKey>,
        instructions: impl IntoIterator<Item = Instruction>,
    ) {
        self.span_mut(key.into()).extend(instructions);
    }

    /// Make sure a span exists, even if it stays empty.
    pub fn open(&mut self, key: impl Into<SpanKey>) {
        self.span_mut(key.into());
    }

    fn span_mut(&mut self, key: SpanKey) -> &mut Vec<Instruction> {
        let idx = match self.spans.iter().position(|(k, _)| *k == key) {
            Some(idx) => idx,
            None => {
                self.spans.push((key, Vec::new()));
                self.spans.len() - 1
            }
        };
        &mut self.spans[idx].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpanKey, &[Instruction])> {
        self.spans.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = SpanKey> + '_ {
        self.spans.iter().map(|(k, _)| *k)
    }

    /// Placeholder ids in first-seen order (the preamble is skipped).
    pub fn placeholder_ids(&self) -> Vec<PlaceholderId> {
        self.keys()
            .filter_map(|k| match k {
                SpanKey::Placeholder(id) => Some(id),
                SpanKey::Preamble => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

impl FromIterator<(SpanKey, Vec<Instruction>)> for SpanMap {
    fn from_iter<T: IntoIterator<Item = (SpanKey, Vec<Instruction>)>>(iter: T) -> Self {
        let mut map = SpanMap::new();
        for (key, instructions) in iter {
            map.extend(key, instructions);
        }
        map
    }
}

#[derive(Clone, Copy)]
enum ParseState {
    SeekingPlaceholder,
    InSpan(PlaceholderId),
}

/// Parse a notation stream into spans keyed by placeholder id.
///
/// Never fails: undecodable tokens are logged at debug level and dropped.
pub fn parse(stream: &str) -> SpanMap {
    let mut map = SpanMap::new();
    let mut state = ParseState::SeekingPlaceholder;

    for instruction in decode_lenient(stream) {
        match instruction {
            Instruction::Placeholder(id) => {
                map.open(id);
                state = ParseState::InSpan(id);
            }
            other => match state {
                ParseState::SeekingPlaceholder => map.push(SpanKey::Preamble, other),
                ParseState::InSpan(id) => map.push(id, other),
            },
        }
    }

    map
}

/// Render spans back to notation.
///
/// Each span is written as its placeholder token immediately followed by its
/// instructions joined with `;`; spans are joined with `;`. Zero-length waits
/// are omitted.
pub fn render(spans: &SpanMap) -> String {
    let mut out = String::new();
    for (i, (key, instructions)) in spans.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        render_span_into(&mut out, key, instructions);
    }
    out
}

/// Render a single span.
pub fn render_span(key: SpanKey, instructions: &[Instruction]) -> String {
    let mut out = String::new();
    render_span_into(&mut out, key, instructions);
    out
}

fn render_span_into(out: &mut String, key: SpanKey, instructions: &[Instruction]) {
    if let SpanKey::Placeholder(id) = key {
        let _ = write!(out, "{id}");
    }
    let mut first = true;
    for instruction in instructions {
        match instruction {
            Instruction::Wait(0) | Instruction::Placeholder(_) => continue,
            _ => {}
        }
        if !first {
            out.push(SEPARATOR);
        }
        first = false;
        let _ = write!(out, "{instruction}");
    }
}

/// Convert timed notes into span instructions.
///
/// Notes are ordered by (start, pitch). A `Wait` covers each gap between
/// successive onsets, and a trailing `Wait` runs to the latest note end so the
/// span's length is preserved. Invalid notes (zero duration, pitch > 127) are
/// dropped.
pub fn render_notes(notes: &[TimedNote]) -> Vec<Instruction> {
    let mut sorted: Vec<TimedNote> = notes.iter().copied().filter(TimedNote::is_valid).collect();
    sorted.sort_by_key(|n| (n.start, n.pitch));

    let mut out = Vec::with_capacity(sorted.len() * 3 + 1);
    let mut cursor = 0u32;
    let mut latest_end = 0u32;
    for note in &sorted {
        if note.start > cursor {
            out.push(Instruction::Wait(note.start - cursor));
            cursor = note.start;
        }
        out.push(Instruction::Note(note.pitch));
        out.push(Instruction::Duration(note.duration));
        latest_end = latest_end.max(note.end());
    }
    if latest_end > cursor {
        out.push(Instruction::Wait(latest_end - cursor));
    }
    out
}

/// Recover the sounding notes of a span, with starts relative to the span.
///
/// A note without a following positive duration is dropped.
pub fn span_notes(instructions: &[Instruction]) -> Vec<TimedNote> {
    let mut notes = Vec::new();
    let mut cursor = 0u32;
    let mut pending: Option<u8> = None;

    for instruction in instructions {
        match *instruction {
            Instruction::Note(pitch) => {
                if let Some(dropped) = pending.replace(pitch) {
                    log::debug!("dropping note {dropped}: no duration");
                }
            }
            Instruction::Duration(ticks) => match pending.take() {
                Some(pitch) if ticks > 0 => notes.push(TimedNote::new(pitch, cursor, ticks)),
                Some(pitch) => log::debug!("dropping note {pitch}: non-positive duration"),
                None => {}
            },
            Instruction::Wait(ticks) => {
                if let Some(dropped) = pending.take() {
                    log::debug!("dropping note {dropped}: no duration");
                }
                cursor = cursor.saturating_add(ticks);
            }
            Instruction::Measure(_) | Instruction::Track(_) | Instruction::Placeholder(_) => {
                pending = None;
            }
        }
    }

    notes
}

/// Distinct placeholder ids of a stream, in first-seen order.
pub fn placeholder_ids(stream: &str) -> Vec<PlaceholderId> {
    let mut ids = Vec::new();
    for instruction in decode_lenient(stream) {
        if let Instruction::Placeholder(id) = instruction
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instruction::*;

    #[test]
    fn parses_reference_example() {
        let spans = parse(";<extra_id_0>;N:60;d:240;w:240;N:64;d:240");
        assert_eq!(
            spans.get(PlaceholderId(0)),
            &[Note(60), Duration(240), Wait(240), Note(64), Duration(240)]
        );
        assert!(!spans.contains(SpanKey::Preamble));
    }

    #[test]
    fn missing_key_is_empty() {
        let spans = parse("<extra_id_0>N:60;d:10");
        assert!(spans.get(PlaceholderId(9)).is_empty());
    }

    #[test]
    fn stream_without_placeholders_only_fills_preamble() {
        let spans = parse(";M:0;I:1;N:60;d:240");
        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans.get(SpanKey::Preamble),
            &[Measure(0), Track(1), Note(60), Duration(240)]
        );
        assert!(parse("").is_empty());
        assert!(parse(";;;").is_empty());
    }

    #[test]
    fn preserves_first_seen_order() {
        let spans = parse("<extra_id_3>N:60;d:1;<extra_id_1>N:61;d:1;<extra_id_2>");
        assert_eq!(
            spans.placeholder_ids(),
            vec![PlaceholderId(3), PlaceholderId(1), PlaceholderId(2)]
        );
        assert!(spans.get(PlaceholderId(2)).is_empty());
    }

    #[test]
    fn repeated_placeholder_merges() {
        let spans = parse("<extra_id_0>N:60;d:1;<extra_id_1>N:62;d:1;<extra_id_0>N:64;d:1");
        assert_eq!(spans.len(), 2);
        assert_eq!(
            spans.get(PlaceholderId(0)),
            &[Note(60), Duration(1), Note(64), Duration(1)]
        );
    }

    #[test]
    fn malformed_tokens_are_dropped() {
        let spans = parse("<extra_id_0>N:abc;d:240;N:61;d:-3;w:x;B:4;N:62;d:120");
        assert_eq!(
            spans.get(PlaceholderId(0)),
            &[Duration(240), Note(61), Note(62), Duration(120)]
        );
    }

    #[test]
    fn render_round_trips_parse() {
        let input = ";M:0;I:1;<extra_id_0>N:60;d:240;w:240;N:64;d:240;<extra_id_1>N:67;d:480";
        let spans = parse(input);
        let rendered = render(&spans);
        assert_eq!(
            rendered,
            "M:0;I:1;<extra_id_0>N:60;d:240;w:240;N:64;d:240;<extra_id_1>N:67;d:480"
        );
        assert_eq!(parse(&rendered), spans);
    }

    #[test]
    fn render_omits_zero_waits() {
        let spans: SpanMap = [(
            SpanKey::Placeholder(PlaceholderId(4)),
            vec![Note(60), Duration(480), Wait(0), Note(64), Duration(480), Wait(0)],
        )]
        .into_iter()
        .collect();
        assert_eq!(render(&spans), "<extra_id_4>N:60;d:480;N:64;d:480");
    }

    #[test]
    fn render_notes_emits_gaps_and_trailing_wait() {
        let notes = [
            TimedNote::new(64, 240, 240),
            TimedNote::new(60, 0, 240),
            TimedNote::new(67, 240, 480),
        ];
        assert_eq!(
            render_notes(&notes),
            vec![
                Note(60),
                Duration(240),
                Wait(240),
                Note(64),
                Duration(240),
                Note(67),
                Duration(480),
                Wait(480),
            ]
        );
    }

    #[test]
    fn render_notes_leading_rest() {
        let notes = [TimedNote::new(60, 120, 60)];
        assert_eq!(
            render_notes(&notes),
            vec![Wait(120), Note(60), Duration(60), Wait(60)]
        );
        assert!(render_notes(&[TimedNote::new(60, 0, 0)]).is_empty());
    }

    #[test]
    fn span_notes_follows_cursor() {
        let span = parse("<extra_id_0>N:60;d:240;N:64;d:240;w:240;N:67;d:0;w:100;N:69;N:71;d:50");
        let notes = span_notes(span.get(PlaceholderId(0)));
        assert_eq!(
            notes,
            vec![
                TimedNote::new(60, 0, 240),
                TimedNote::new(64, 0, 240),
                TimedNote::new(71, 340, 50),
            ]
        );
    }

    #[test]
    fn span_notes_inverts_render_notes() {
        let notes = vec![
            TimedNote::new(60, 0, 240),
            TimedNote::new(64, 240, 120),
            TimedNote::new(67, 600, 240),
        ];
        assert_eq!(span_notes(&render_notes(&notes)), notes);
    }

    #[test]
    fn placeholder_ids_are_distinct_in_order() {
        assert_eq!(
            placeholder_ids(";<extra_id_2>N:1;d:1;<extra_id_0>;<extra_id_2>"),
            vec![PlaceholderId(2), PlaceholderId(0)]
        );
    }
}
