// The generation model's JSON piece representation.
//
// A piece is a list of tracks, each with an instrument and absolute-tick notes,
// plus tempo and time-signature maps and the tick resolution. Conversion from a
// host snapshot applies one policy: a program of 128 or above is a drum
// track, a track with no program is program 0, a song with no tempo gets 120
// BPM, and every piece starts in 4/4.

use serde::{Deserialize, Serialize};

use notefill_codec::TimedNote;

use crate::snapshot::{DEFAULT_CPQ, SongNote, SongSnapshot};

pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_VELOCITY: u8 = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    #[serde(default)]
    pub tracks: Vec<PieceTrack>,
    #[serde(default = "default_time_signatures")]
    pub time_signatures: Vec<TimeSignature>,
    #[serde(default = "default_tempos")]
    pub tempos: Vec<Tempo>,
    #[serde(default = "default_resolution")]
    pub resolution: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceTrack {
    #[serde(default)]
    pub instrument: u32,
    #[serde(default)]
    pub is_drum: bool,
    #[serde(default)]
    pub notes: Vec<PieceNote>,
}

/// A note in piece ticks. Accepts either `end` or `duration` on input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPieceNote")]
pub struct PieceNote {
    pub pitch: u8,
    pub start: u32,
    pub end: u32,
    pub velocity: u8,
}

#[derive(Deserialize)]
struct RawPieceNote {
    pitch: u8,
    start: u32,
    #[serde(default)]
    end: Option<u32>,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default = "default_velocity")]
    velocity: u8,
}

impl From<RawPieceNote> for PieceNote {
    fn from(raw: RawPieceNote) -> Self {
        let end = raw
            .end
            .or_else(|| raw.duration.map(|d| raw.start.saturating_add(d)))
            .unwrap_or(raw.start);
        Self {
            pitch: raw.pitch,
            start: raw.start,
            end,
            velocity: raw.velocity,
        }
    }
}

impl PieceNote {
    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

impl From<SongNote> for PieceNote {
    fn from(n: SongNote) -> Self {
        Self {
            pitch: n.pitch,
            start: n.start,
            end: n.end,
            velocity: n.velocity,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
    #[serde(default)]
    pub time: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub qpm: f64,
    #[serde(default)]
    pub time: u32,
}

fn default_time_signatures() -> Vec<TimeSignature> {
    vec![TimeSignature {
        numerator: 4,
        denominator: 4,
        time: 0,
    }]
}

fn default_tempos() -> Vec<Tempo> {
    vec![Tempo {
        qpm: DEFAULT_BPM,
        time: 0,
    }]
}

fn default_resolution() -> u32 {
    DEFAULT_CPQ
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

impl Default for Piece {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            time_signatures: default_time_signatures(),
            tempos: default_tempos(),
            resolution: default_resolution(),
        }
    }
}

impl Piece {
    pub fn from_snapshot(snapshot: &SongSnapshot) -> Self {
        let tracks = (0..snapshot.n_tracks())
            .map(|t| PieceTrack {
                instrument: snapshot.program(t),
                is_drum: snapshot.is_drum(t),
                notes: snapshot
                    .track_notes(t)
                    .into_iter()
                    .map(PieceNote::from)
                    .collect(),
            })
            .collect();

        let mut tempos: Vec<Tempo> = snapshot
            .tempo_changes
            .iter()
            .filter(|t| t.bpm > 0.0)
            .map(|t| Tempo {
                qpm: t.bpm,
                time: t.click,
            })
            .collect();
        if tempos.is_empty() {
            tempos = default_tempos();
        }
        tempos.sort_by_key(|t| t.time);

        Self {
            tracks,
            time_signatures: default_time_signatures(),
            tempos,
            resolution: snapshot.cpq.max(1),
        }
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    /// Convert a piece tick to a click at `cpq` resolution.
    pub fn to_clicks(&self, tick: u32, cpq: u32) -> u32 {
        let resolution = u64::from(self.resolution.max(1));
        let scaled = u64::from(tick) * u64::from(cpq) / resolution;
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    /// Every note of every track as codec notes, in `cpq` clicks.
    pub fn timed_notes(&self, cpq: u32) -> Vec<TimedNote> {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| {
                let start = self.to_clicks(n.start, cpq);
                let end = self.to_clicks(n.end, cpq);
                TimedNote::new(n.pitch, start, end.saturating_sub(start))
            })
            .collect()
    }
}
