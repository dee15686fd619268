// Host song snapshot ("S").
//
// The DAW host dumps the project as tracks -> measures -> a pair of event
// strings. A measure's `note_ons` string holds space-separated
// `pitch;click;noteidx;velocity` entries and its `note_offs` string holds
// `click;noteidx` entries. Clicks are relative to the start of the measure the
// entry appears in; `noteidx` pairs an off with its on, and a note may end in
// a later measure than it starts.
//
// Malformed entries are skipped with a debug log. Notes that never see an off,
// or whose off is not after their on, are dropped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use notefill_codec::MAX_PITCH;

use crate::error::SongError;

/// Clicks per quarter note when the host does not say.
pub const DEFAULT_CPQ: u32 = 480;

/// Beats per measure assumed when the host sends no measure endpoints.
pub const DEFAULT_BEATS_PER_MEASURE: u32 = 4;

/// How far past the last measure a placeholder may still ask for content.
pub const MAX_MEASURES_PAST_END: u32 = 256;

/// How far past the last track a placeholder may still ask for content.
pub const MAX_TRACKS_PAST_END: u32 = 16;

/// One measure's raw event strings. On the wire this is a two-element array
/// `[note_ons, note_offs]`; either element may be null or missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Option<String>>", into = "Vec<Option<String>>")]
pub struct MeasureEvents {
    pub note_ons: String,
    pub note_offs: String,
}

impl From<Vec<Option<String>>> for MeasureEvents {
    fn from(raw: Vec<Option<String>>) -> Self {
        let mut it = raw.into_iter();
        Self {
            note_ons: it.next().flatten().unwrap_or_default(),
            note_offs: it.next().flatten().unwrap_or_default(),
        }
    }
}

impl From<MeasureEvents> for Vec<Option<String>> {
    fn from(m: MeasureEvents) -> Self {
        vec![Some(m.note_ons), Some(m.note_offs)]
    }
}

impl MeasureEvents {
    pub fn new(note_ons: impl Into<String>, note_offs: impl Into<String>) -> Self {
        Self {
            note_ons: note_ons.into(),
            note_offs: note_offs.into(),
        }
    }

    /// Decoded note-on entries; malformed ones are skipped.
    pub fn note_ons(&self) -> impl Iterator<Item = NoteOn> + '_ {
        self.note_ons.split_whitespace().filter_map(|entry| {
            let on = NoteOn::parse(entry);
            if on.is_none() {
                log::debug!("skipping malformed note-on entry {entry:?}");
            }
            on
        })
    }

    /// Decoded note-off entries; malformed ones are skipped.
    pub fn note_offs(&self) -> impl Iterator<Item = NoteOff> + '_ {
        self.note_offs.split_whitespace().filter_map(|entry| {
            let off = NoteOff::parse(entry);
            if off.is_none() {
                log::debug!("skipping malformed note-off entry {entry:?}");
            }
            off
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteOn {
    pub pitch: u8,
    pub click: u32,
    pub note_idx: u32,
    pub velocity: u8,
}

impl NoteOn {
    fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split(';').map(str::trim);
        let pitch: u8 = parts.next()?.parse().ok()?;
        let click = parts.next()?.parse().ok()?;
        let note_idx = parts.next()?.parse().ok()?;
        let velocity: u8 = parts.next()?.parse().ok()?;
        (pitch <= MAX_PITCH).then_some(Self {
            pitch,
            click,
            note_idx,
            velocity: velocity.min(127),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteOff {
    pub click: u32,
    pub note_idx: u32,
}

impl NoteOff {
    fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split(';').map(str::trim);
        let click = parts.next()?.parse().ok()?;
        let note_idx = parts.next()?.parse().ok()?;
        Some(Self { click, note_idx })
    }
}

enum MeasureEvent {
    On(NoteOn),
    Off(NoteOff),
}

/// A `[bpm, click]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, u32)", into = "(f64, u32)")]
pub struct TempoChange {
    pub bpm: f64,
    pub click: u32,
}

impl From<(f64, u32)> for TempoChange {
    fn from((bpm, click): (f64, u32)) -> Self {
        Self { bpm, click }
    }
}

impl From<TempoChange> for (f64, u32) {
    fn from(t: TempoChange) -> Self {
        (t.bpm, t.click)
    }
}

/// A note with absolute song clicks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongNote {
    pub pitch: u8,
    pub start: u32,
    pub end: u32,
    pub velocity: u8,
}

impl SongNote {
    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

fn default_cpq() -> u32 {
    DEFAULT_CPQ
}

/// The host's per-track, per-measure note dump.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongSnapshot {
    #[serde(default)]
    pub tracks: Vec<Vec<MeasureEvents>>,
    #[serde(default)]
    pub track_insts: Vec<u32>,
    #[serde(default = "default_cpq")]
    pub cpq: u32,
    #[serde(default)]
    pub tempo_changes: Vec<TempoChange>,
    /// Absolute click of each measure boundary; `n_measures + 1` entries when
    /// present.
    #[serde(default)]
    pub measure_endpoints: Option<Vec<u32>>,
}

impl Default for SongSnapshot {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            track_insts: Vec::new(),
            cpq: DEFAULT_CPQ,
            tempo_changes: Vec::new(),
            measure_endpoints: None,
        }
    }
}

impl SongSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SongError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SongError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn n_measures(&self) -> u32 {
        let from_tracks = self.tracks.iter().map(Vec::len).max().unwrap_or(0);
        let from_endpoints = self
            .measure_endpoints
            .as_ref()
            .map_or(0, |e| e.len().saturating_sub(1));
        u32::try_from(from_tracks.max(from_endpoints)).unwrap_or(u32::MAX)
    }

    /// Whether `(track, measure)` is close enough to the song to generate
    /// for. Placeholders may extend the song a little; anything further is
    /// left to fallback content.
    pub fn within_reach(&self, track: u32, measure: u32) -> bool {
        let n_tracks = u32::try_from(self.n_tracks()).unwrap_or(u32::MAX);
        track < n_tracks.saturating_add(MAX_TRACKS_PAST_END)
            && measure < self.n_measures().saturating_add(MAX_MEASURES_PAST_END)
    }

    /// MIDI program of a track; tracks without an entry use program 0.
    pub fn program(&self, track: usize) -> u32 {
        self.track_insts.get(track).copied().unwrap_or(0)
    }

    pub fn is_drum(&self, track: usize) -> bool {
        self.program(track) >= 128
    }

    fn measure(&self, track: usize, measure: u32) -> Option<&MeasureEvents> {
        self.tracks.get(track)?.get(measure as usize)
    }

    /// True when the measure has no decodable note-on, or does not exist.
    pub fn measure_is_empty(&self, track: usize, measure: u32) -> bool {
        self.measure(track, measure)
            .is_none_or(|m| m.note_ons().next().is_none())
    }

    fn measure_len(&self) -> u32 {
        self.cpq.saturating_mul(DEFAULT_BEATS_PER_MEASURE)
    }

    /// Absolute `(start, end)` clicks of a measure.
    pub fn measure_bounds(&self, measure: u32) -> (u32, u32) {
        let m = measure as usize;
        if let Some(endpoints) = &self.measure_endpoints
            && let (Some(&start), Some(&end)) = (endpoints.get(m), endpoints.get(m + 1))
        {
            return (start, end);
        }
        let len = self.measure_len();
        let start = len.saturating_mul(measure);
        (start, start.saturating_add(len))
    }

    /// Notes of one track with absolute clicks, ordered by (start, pitch).
    pub fn track_notes(&self, track: usize) -> Vec<SongNote> {
        let Some(measures) = self.tracks.get(track) else {
            return Vec::new();
        };

        let mut open: HashMap<u32, (NoteOn, u32)> = HashMap::new();
        let mut notes = Vec::new();

        for (m, events) in measures.iter().enumerate() {
            let (offset, _) = self.measure_bounds(u32::try_from(m).unwrap_or(u32::MAX));

            // Within a measure, events run in click order with offs ahead of ons
            // at the same click, so a re-triggered noteidx closes the old note.
            let mut timeline: Vec<(u32, MeasureEvent)> = events
                .note_offs()
                .map(|off| (off.click, MeasureEvent::Off(off)))
                .chain(events.note_ons().map(|on| (on.click, MeasureEvent::On(on))))
                .collect();
            timeline.sort_by_key(|(click, ev)| (*click, matches!(ev, MeasureEvent::On(_))));

            for (click, event) in timeline {
                let at = offset.saturating_add(click);
                match event {
                    MeasureEvent::On(on) => {
                        open.insert(on.note_idx, (on, at));
                    }
                    MeasureEvent::Off(off) => {
                        let Some((on, start)) = open.remove(&off.note_idx) else {
                            continue;
                        };
                        if at > start {
                            notes.push(SongNote {
                                pitch: on.pitch,
                                start,
                                end: at,
                                velocity: on.velocity,
                            });
                        } else {
                            log::debug!("dropping note {} on track {track}: end <= start", on.pitch);
                        }
                    }
                }
            }
        }

        if !open.is_empty() {
            log::debug!("dropping {} unterminated note(s) on track {track}", open.len());
        }
        notes.sort_by_key(|n| (n.start, n.pitch));
        notes
    }

    /// Tempo in BPM at click 0, or 120 when the host sent none.
    pub fn initial_bpm(&self) -> f64 {
        self.tempo_changes
            .iter()
            .filter(|t| t.bpm > 0.0)
            .min_by_key(|t| t.click)
            .map_or(120.0, |t| t.bpm)
    }
}
