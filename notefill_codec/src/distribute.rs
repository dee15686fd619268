// Spreading a flat note list across placeholders.
//
// Some generation backends return one list of notes for the whole request
// instead of one span per placeholder. `distribute_notes` cuts that list into
// as many chunks as there are placeholders, in onset order, and renders each
// chunk as that placeholder's span.

use crate::fill::{FALLBACK_TICKS, fallback_notation};
use crate::span::{render_notes, render_span};
use crate::token::SEPARATOR;
use crate::types::{PlaceholderId, TimedNote};

/// Filler pitches for a chunk that received no notes, cycled by position.
pub const FILLER_PITCHES: [u8; 3] = [60, 64, 67];

/// Render `notes` as one span per placeholder id.
///
/// Notes are ordered by onset and split into `ids.len()` chunks of
/// `n / ids.len()` notes, the last chunk taking the remainder. Each chunk is
/// timed relative to its own first onset. When there are no usable notes at
/// all every placeholder gets the fixed fallback phrase; otherwise a chunk
/// left empty gets a single filler note. Every returned span is non-empty.
pub fn distribute_notes(notes: &[TimedNote], ids: &[PlaceholderId]) -> String {
    if ids.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<TimedNote> = notes.iter().copied().filter(TimedNote::is_valid).collect();
    if sorted.is_empty() {
        return fallback_notation(ids);
    }
    sorted.sort_by_key(|n| (n.start, n.pitch));

    let per_chunk = sorted.len() / ids.len();
    let mut out = String::new();
    for (k, &id) in ids.iter().enumerate() {
        let lo = k * per_chunk;
        let hi = if k + 1 == ids.len() {
            sorted.len()
        } else {
            lo + per_chunk
        };
        let chunk = &sorted[lo..hi];

        let instructions = match chunk.first() {
            Some(first) => {
                let origin = first.start;
                let shifted: Vec<TimedNote> = chunk
                    .iter()
                    .map(|n| TimedNote::new(n.pitch, n.start - origin, n.duration))
                    .collect();
                render_notes(&shifted)
            }
            None => render_notes(&[TimedNote::new(
                FILLER_PITCHES[k % FILLER_PITCHES.len()],
                0,
                FALLBACK_TICKS,
            )]),
        };

        if k > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(&render_span(id.into(), &instructions));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::fallback_span;
    use crate::span::{parse, span_notes};
    use crate::types::SpanKey;

    fn ids(raw: &[u32]) -> Vec<PlaceholderId> {
        raw.iter().copied().map(PlaceholderId).collect()
    }

    fn span_count(s: &str) -> usize {
        s.matches("<extra_id_").count()
    }

    #[test]
    fn empty_ids_give_empty_string() {
        assert_eq!(distribute_notes(&[TimedNote::new(60, 0, 10)], &[]), "");
    }

    #[test]
    fn empty_notes_give_fallback_everywhere() {
        let out = distribute_notes(&[], &ids(&[0]));
        assert_eq!(out, "<extra_id_0>N:60;d:240;w:240;N:64;d:240;w:240");

        let out = distribute_notes(&[TimedNote::new(60, 0, 0)], &ids(&[2, 5]));
        let spans = parse(&out);
        assert_eq!(spans.get(PlaceholderId(2)), fallback_span().as_slice());
        assert_eq!(spans.get(PlaceholderId(5)), fallback_span().as_slice());
    }

    #[test]
    fn remainder_goes_to_last_chunk() {
        let notes: Vec<TimedNote> = (0..5)
            .map(|i| TimedNote::new(60 + i as u8, i * 480, 240))
            .collect();
        let out = distribute_notes(&notes, &ids(&[0, 1]));
        let spans = parse(&out);
        assert_eq!(span_notes(spans.get(PlaceholderId(0))).len(), 2);
        let last = span_notes(spans.get(PlaceholderId(1)));
        assert_eq!(last.len(), 3);
        // Relative to the chunk's first onset.
        assert_eq!(last[0], TimedNote::new(62, 0, 240));
        assert_eq!(last[2], TimedNote::new(64, 960, 240));
    }

    #[test]
    fn more_placeholders_than_notes_fills_every_span() {
        let notes = [TimedNote::new(72, 960, 120)];
        let out = distribute_notes(&notes, &ids(&[0, 1, 2, 3]));
        assert_eq!(span_count(&out), 4);
        let spans = parse(&out);
        for (k, id) in ids(&[0, 1, 2]).into_iter().enumerate() {
            assert_eq!(
                span_notes(spans.get(id)),
                vec![TimedNote::new(FILLER_PITCHES[k % 3], 0, 240)]
            );
        }
        assert_eq!(
            span_notes(spans.get(PlaceholderId(3))),
            vec![TimedNote::new(72, 0, 120)]
        );
    }

    #[test]
    fn every_span_is_non_empty() {
        let notes: Vec<TimedNote> = (0..7).map(|i| TimedNote::new(48, i * 100, 50)).collect();
        for n in 1..10u32 {
            let placeholder_ids: Vec<_> = (0..n).map(PlaceholderId).collect();
            let spans = parse(&distribute_notes(&notes, &placeholder_ids));
            assert_eq!(spans.len(), n as usize);
            assert!(!spans.contains(SpanKey::Preamble));
            for id in placeholder_ids {
                assert!(!spans.get(id).is_empty());
            }
        }
    }
}
