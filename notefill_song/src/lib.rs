// Song structure for the notefill bridge.
//
// Everything the bridge knows about the host project beyond the notation
// string lives here: the host's song snapshot, the generation model's piece
// JSON, the option panels that drive sampling, and MIDI conversion for
// upstreams that take a file.
//
// Architecture:
// - snapshot.rs: SongSnapshot (tracks -> measures -> note-on/note-off strings)
// - piece.rs: model piece JSON and snapshot -> piece conversion
// - options.rs: GlobalOptions, TrackOptions, instrument names, control strings
// - status.rs: status/params documents, infill ranges, piece -> placeholder notes
// - midi.rs: SMF writing and reading via midly
// - error.rs: SongError

pub mod error;
pub mod midi;
pub mod options;
pub mod piece;
pub mod snapshot;
pub mod status;

pub use error::SongError;
pub use options::{GlobalOptions, TrackOptions};
pub use piece::Piece;
pub use snapshot::SongSnapshot;
pub use status::{
    BarRange, Params, Status, bar_mode, build_params, build_status, infill_ranges, placeholder_notes,
};
