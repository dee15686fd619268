// Protocol errors: XML-RPC decoding, faults, and call argument validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML-RPC document: {0}")]
    Malformed(String),

    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("missing argument {index} ({name})")]
    MissingParam { index: usize, name: &'static str },

    #[error("argument {name} should be {expected}")]
    InvalidParam {
        name: &'static str,
        expected: &'static str,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid song snapshot: {0}")]
    Song(#[from] notefill_song::SongError),
}

impl ProtocolError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ProtocolError::Malformed(msg.into())
    }
}
