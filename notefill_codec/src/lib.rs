// Legacy note-event notation codec.
//
// The notation is a `;`-separated token stream exchanged with the DAW host and
// the generation service: `N:<pitch>`, `d:<ticks>`, `w:<ticks>`, `M:<measure>`,
// `I:<track>`, and `<extra_id_N>` placeholders marking regions to be filled.
// Everything here is a pure function over strings and plain values; nothing
// in this crate does I/O, and no public stream operation returns an error.
// Undecodable tokens are logged at debug level and dropped.
//
// Architecture:
// - types.rs: Instruction, PlaceholderId, SpanKey, TimedNote
// - token.rs: tokenizer (handles placeholders glued to neighbours) and strict
//   single-token decoding
// - span.rs: parse/render between streams and placeholder-keyed spans, plus
//   span <-> timed-note conversion
// - measure.rs: placeholder -> (track, measure) binding, per-measure context
// - distribute.rs: flat note list -> one span per placeholder
// - fill.rs: fallback phrase and realignment of responses to requested ids
// - normalize.rs: cache key normalization

pub mod distribute;
pub mod error;
pub mod fill;
pub mod measure;
pub mod normalize;
pub mod span;
pub mod token;
pub mod types;

pub use distribute::distribute_notes;
pub use error::CodecError;
pub use fill::{GenerationResult, fallback_notation, fallback_span, realign};
pub use measure::{
    MaskLocation, MeasureContext, StreamSummary, map_placeholders_to_measures, mask_locations,
    measure_contexts, summarize, target_measures,
};
pub use normalize::normalize_request;
pub use span::{SpanMap, parse, placeholder_ids, render, render_notes, span_notes};
pub use types::{Instruction, MAX_PITCH, PlaceholderId, SpanKey, TimedNote};
