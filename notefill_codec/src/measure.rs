// Placeholder-to-measure alignment.
//
// The host interleaves `M:<measure>` and `I:<track>` markers with notes and
// placeholders. Walking the stream while remembering the latest markers lets
// each placeholder be bound to the (track, measure) it masks, which is what
// the song snapshot and the model's per-track selection are keyed by.
//
// Track resolution for a placeholder, first match wins:
//   1. an `I:` seen since the latest `M:`
//   2. the caller's `track_markers[measure]`
//   3. the last `I:` seen anywhere in the stream
//   4. track 0
//
// The measure is the latest `M:`, or 0 before any marker.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::token::decode_lenient;
use crate::types::{Instruction, PlaceholderId};

/// One placeholder bound to the track and measure it masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaskLocation {
    pub placeholder: PlaceholderId,
    pub track: u32,
    pub measure: u32,
}

/// What the stream says about one measure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureContext {
    /// Last track marker seen inside this measure, if any.
    pub track: Option<u32>,
    /// Whether at least one `N:` token falls in this measure.
    pub has_notes: bool,
    /// Placeholders opened inside this measure, in stream order.
    pub placeholders: Vec<PlaceholderId>,
}

impl MeasureContext {
    /// A measure is a generation target when it carries a placeholder.
    pub fn is_target(&self) -> bool {
        !self.placeholders.is_empty()
    }
}

/// Running marker state while walking a stream.
#[derive(Default)]
struct MarkerWalk {
    measure: u32,
    track_in_measure: Option<u32>,
    last_track: Option<u32>,
}

impl MarkerWalk {
    fn observe(&mut self, instruction: Instruction) {
        match instruction {
            Instruction::Measure(m) => {
                self.measure = m;
                self.track_in_measure = None;
            }
            Instruction::Track(t) => {
                self.track_in_measure = Some(t);
                self.last_track = Some(t);
            }
            _ => {}
        }
    }

    fn track(&self, track_markers: &BTreeMap<u32, u32>) -> u32 {
        self.track_in_measure
            .or_else(|| track_markers.get(&self.measure).copied())
            .or(self.last_track)
            .unwrap_or(0)
    }
}

/// Every placeholder occurrence with its (track, measure), in stream order.
pub fn mask_locations(stream: &str, track_markers: &BTreeMap<u32, u32>) -> Vec<MaskLocation> {
    let mut walk = MarkerWalk::default();
    let mut out = Vec::new();
    for instruction in decode_lenient(stream) {
        if let Instruction::Placeholder(placeholder) = instruction {
            out.push(MaskLocation {
                placeholder,
                track: walk.track(track_markers),
                measure: walk.measure,
            });
        }
        walk.observe(instruction);
    }
    out
}

/// Bind each placeholder id to `(track, measure)`.
///
/// A repeated id keeps its first binding, matching how `parse` merges repeated
/// spans into the first-seen one.
pub fn map_placeholders_to_measures(
    stream: &str,
    track_markers: &BTreeMap<u32, u32>,
) -> BTreeMap<PlaceholderId, (u32, u32)> {
    let mut out = BTreeMap::new();
    for loc in mask_locations(stream, track_markers) {
        out.entry(loc.placeholder)
            .or_insert((loc.track, loc.measure));
    }
    out
}

/// Per-measure summary of a stream, keyed by measure index.
///
/// Only measures introduced by an `M:` marker, or touched by content before
/// the first marker (measure 0), appear.
pub fn measure_contexts(stream: &str) -> BTreeMap<u32, MeasureContext> {
    let mut walk = MarkerWalk::default();
    let mut out: BTreeMap<u32, MeasureContext> = BTreeMap::new();
    for instruction in decode_lenient(stream) {
        walk.observe(instruction);
        let ctx = out.entry(walk.measure).or_default();
        match instruction {
            Instruction::Track(t) => ctx.track = Some(t),
            Instruction::Note(_) => ctx.has_notes = true,
            Instruction::Placeholder(id) => ctx.placeholders.push(id),
            Instruction::Measure(_) | Instruction::Duration(_) | Instruction::Wait(_) => {}
        }
    }
    out
}

/// Measures that carry a placeholder, optionally limited to an inclusive
/// `(start, end)` selection.
pub fn target_measures(
    contexts: &BTreeMap<u32, MeasureContext>,
    selection: Option<(u32, u32)>,
) -> BTreeSet<u32> {
    contexts
        .iter()
        .filter(|(_, ctx)| ctx.is_target())
        .map(|(&m, _)| m)
        .filter(|m| selection.is_none_or(|(start, end)| (start..=end).contains(m)))
        .collect()
}

/// Counts used for request diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub placeholder_ids: Vec<PlaceholderId>,
    pub note_count: usize,
    pub measure_count: usize,
}

pub fn summarize(stream: &str) -> StreamSummary {
    let mut summary = StreamSummary::default();
    for instruction in decode_lenient(stream) {
        match instruction {
            Instruction::Note(_) => summary.note_count += 1,
            Instruction::Measure(_) => summary.measure_count += 1,
            Instruction::Placeholder(id) if !summary.placeholder_ids.contains(&id) => {
                summary.placeholder_ids.push(id);
            }
            _ => {}
        }
    }
    summary
}
