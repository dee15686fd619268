// Core value types for the notation codec.
//
// `Instruction` is one token of the notation stream after decoding. Spans
// (see `span.rs`) are ordered lists of instructions keyed by `SpanKey`, which
// is either the preamble (tokens before the first placeholder) or a
// placeholder id. `TimedNote` is the absolute-time view of a sounding note,
// used when converting between spans and note lists.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

/// Id carried by a `<extra_id_N>` placeholder token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceholderId(pub u32);

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<extra_id_{}>", self.0)
    }
}

/// Key of a span inside a parsed stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpanKey {
    /// Tokens that appear before the first placeholder.
    Preamble,
    Placeholder(PlaceholderId),
}

impl From<PlaceholderId> for SpanKey {
    fn from(id: PlaceholderId) -> Self {
        SpanKey::Placeholder(id)
    }
}

/// A decoded notation token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// `N:<pitch>`, 0..=127.
    Note(u8),
    /// `d:<ticks>`, applies to the preceding note.
    Duration(u32),
    /// `w:<ticks>`, advances the span cursor.
    Wait(u32),
    /// `M:<index>`.
    Measure(u32),
    /// `I:<index>`.
    Track(u32),
    /// `<extra_id_N>`. Never stored inside a span; it opens one.
    Placeholder(PlaceholderId),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Note(p) => write!(f, "N:{p}"),
            Instruction::Duration(t) => write!(f, "d:{t}"),
            Instruction::Wait(t) => write!(f, "w:{t}"),
            Instruction::Measure(m) => write!(f, "M:{m}"),
            Instruction::Track(i) => write!(f, "I:{i}"),
            Instruction::Placeholder(id) => write!(f, "{id}"),
        }
    }
}

/// A sounding note in ticks, relative to whatever origin the caller uses
/// (span start, measure start, or song start).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedNote {
    pub pitch: u8,
    pub start: u32,
    pub duration: u32,
}

impl TimedNote {
    pub fn new(pitch: u8, start: u32, duration: u32) -> Self {
        Self {
            pitch,
            start,
            duration,
        }
    }

    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.duration)
    }

    /// A note is renderable when its pitch is in MIDI range and it has a
    /// positive duration.
    pub fn is_valid(&self) -> bool {
        self.pitch <= MAX_PITCH && self.duration > 0
    }
}
