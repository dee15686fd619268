// Server-side failures. Everything here is recoverable from the host's point
// of view: `InfillService` turns any of these into fallback notation.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream reported failure: {0}")]
    Upstream(String),

    #[error("upstream returned no {0}")]
    EmptyResult(&'static str),

    #[error(transparent)]
    Protocol(#[from] notefill_protocol::ProtocolError),

    #[error(transparent)]
    Song(#[from] notefill_song::SongError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
