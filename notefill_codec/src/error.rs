// Errors from strict single-token decoding.
//
// The public stream operations (`parse`, `render`, `distribute_notes`, ...)
// never surface these: a token that fails to decode is logged and skipped.
// They are exposed for callers that want to validate one token at a time.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown token: {0:?}")]
    UnknownToken(String),

    #[error("malformed integer payload in token {token:?}")]
    InvalidPayload { token: String },

    #[error("pitch {0} out of range (0..=127)")]
    PitchOutOfRange(u32),
}
