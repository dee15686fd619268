// Errors for snapshot loading and MIDI conversion.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SongError {
    #[error("invalid song JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MIDI parse error: {0}")]
    Midi(#[from] midly::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported MIDI timing (only metrical timing is supported)")]
    UnsupportedTiming,
}
