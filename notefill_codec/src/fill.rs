// Fallback content and response realignment.
//
// The host writes whatever comes back straight into the project, and it
// expects one non-empty span for every placeholder it sent. Anything that
// breaks that (a failed remote call, a response that skipped or renumbered a
// placeholder) is repaired here: spans are re-keyed to the ids the host asked
// for and holes are filled with a fixed two-note phrase.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::span::{parse, render_span, span_notes};
use crate::token::SEPARATOR;
use crate::types::{Instruction, PlaceholderId, SpanKey};

pub const FALLBACK_PITCHES: [u8; 2] = [60, 64];
pub const FALLBACK_TICKS: u32 = 240;

/// Notation returned by a generation backend, together with the placeholder
/// ids of the request that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub notation: String,
    pub requested: Vec<PlaceholderId>,
}

impl GenerationResult {
    pub fn new(notation: impl Into<String>, requested: Vec<PlaceholderId>) -> Self {
        Self {
            notation: notation.into(),
            requested,
        }
    }
}

/// The fixed filler phrase: `N:60;d:240;w:240;N:64;d:240;w:240`.
pub fn fallback_span() -> Vec<Instruction> {
    FALLBACK_PITCHES
        .iter()
        .flat_map(|&p| {
            [
                Instruction::Note(p),
                Instruction::Duration(FALLBACK_TICKS),
                Instruction::Wait(FALLBACK_TICKS),
            ]
        })
        .collect()
}

/// Fallback notation for a whole request. With no ids, placeholder 0 is used.
pub fn fallback_notation(ids: &[PlaceholderId]) -> String {
    let default = [PlaceholderId(0)];
    let ids = if ids.is_empty() { &default[..] } else { ids };
    let span = fallback_span();
    join_spans(ids.iter().map(|&id| render_span(id.into(), &span)))
}

/// True when the span sounds at least one note.
fn has_content(instructions: &[Instruction]) -> bool {
    !span_notes(instructions).is_empty()
}

/// Re-key a result's spans to `requested_ids` and fill missing spans.
///
/// The i-th id the result was produced for is renamed to `requested_ids[i]`;
/// when that span is absent or sounds no note, a span already carrying the requested id
/// is used instead, and failing that the fallback phrase. The result's
/// preamble, if any, is dropped. Requested ids are emitted in order, once
/// each.
pub fn realign(result: &GenerationResult, requested_ids: &[PlaceholderId]) -> String {
    if requested_ids.is_empty() {
        return result.notation.clone();
    }

    let spans = parse(&result.notation);
    let mut seen = BTreeSet::new();
    let mut rendered = Vec::with_capacity(requested_ids.len());
    let mut filled = 0usize;

    for (i, &want) in requested_ids.iter().enumerate() {
        if !seen.insert(want) {
            continue;
        }
        let source = result.requested.get(i).copied().unwrap_or(want);
        let content = [source, want]
            .into_iter()
            .map(|id| spans.get(id))
            .find(|span| has_content(span));
        let key = SpanKey::Placeholder(want);
        match content {
            Some(span) => rendered.push(render_span(key, span)),
            None => {
                filled += 1;
                rendered.push(render_span(key, &fallback_span()));
            }
        }
    }

    if filled > 0 {
        log::warn!(
            "filled {filled} of {} placeholder span(s) with fallback content",
            seen.len()
        );
    }
    join_spans(rendered.into_iter())
}

fn join_spans(spans: impl Iterator<Item = String>) -> String {
    let mut out = String::new();
    for (i, span) in spans.enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(&span);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<PlaceholderId> {
        raw.iter().copied().map(PlaceholderId).collect()
    }

    #[test]
    fn fallback_matches_fixed_phrase() {
        assert_eq!(
            fallback_notation(&[]),
            "<extra_id_0>N:60;d:240;w:240;N:64;d:240;w:240"
        );
        assert_eq!(
            fallback_notation(&ids(&[3, 7])),
            "<extra_id_3>N:60;d:240;w:240;N:64;d:240;w:240;\
             <extra_id_7>N:60;d:240;w:240;N:64;d:240;w:240"
        );
    }

    #[test]
    fn matching_ids_pass_through() {
        let result = GenerationResult::new("<extra_id_0>N:62;d:120;<extra_id_1>N:65;d:60", ids(&[0, 1]));
        assert_eq!(
            realign(&result, &ids(&[0, 1])),
            "<extra_id_0>N:62;d:120;<extra_id_1>N:65;d:60"
        );
    }

    #[test]
    fn renumbered_result_is_rekeyed_by_position() {
        let result = GenerationResult::new("<extra_id_0>N:62;d:120;<extra_id_1>N:65;d:60", ids(&[0, 1]));
        assert_eq!(
            realign(&result, &ids(&[4, 9])),
            "<extra_id_4>N:62;d:120;<extra_id_9>N:65;d:60"
        );
    }

    #[test]
    fn missing_span_gets_fallback_only_for_itself() {
        let result = GenerationResult::new("<extra_id_0>N:62;d:120;<extra_id_1>w:0", ids(&[0, 1, 2]));
        let out = realign(&result, &ids(&[0, 1, 2]));
        let spans = parse(&out);
        assert_eq!(
            spans.get(PlaceholderId(0)),
            &[Instruction::Note(62), Instruction::Duration(120)]
        );
        assert_eq!(spans.get(PlaceholderId(1)), fallback_span().as_slice());
        assert_eq!(spans.get(PlaceholderId(2)), fallback_span().as_slice());
    }

    #[test]
    fn spans_without_sounding_notes_get_fallback() {
        let result = GenerationResult::new(
            "<extra_id_0>M:3;I:1;w:480;<extra_id_1>N:60;w:240;<extra_id_2>N:61;d:0;<extra_id_3>w:120;N:67;d:60",
            ids(&[0, 1, 2, 3]),
        );
        let spans = parse(&realign(&result, &ids(&[0, 1, 2, 3])));
        for id in 0..3 {
            assert_eq!(spans.get(PlaceholderId(id)), fallback_span().as_slice());
        }
        assert_eq!(
            spans.get(PlaceholderId(3)),
            &[Instruction::Wait(120), Instruction::Note(67), Instruction::Duration(60)]
        );
    }

    #[test]
    fn empty_request_returns_result_unchanged() {
        let result = GenerationResult::new("N:60;d:10", Vec::new());
        assert_eq!(realign(&result, &[]), "N:60;d:10");
    }
}
