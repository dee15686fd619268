// JSON bodies exchanged with the upstream generation service, plus the JSON
// form of the host call.
//
// Upstream endpoints:
// - `GET /health` -> `HealthResponse`
// - `POST /generate` with `GenerateRequest` -> `GenerateResponse` (`result`)
// - `POST /generate_from_midi` with `MidiGenerateRequest` -> `GenerateResponse`
//   (`legacy_result`)
//
// The bridge's own `POST /infill` takes an `InfillRequest` and answers with an
// `InfillResponse`. It carries the same arguments as `call_nn_infill` for
// clients that would rather not speak XML-RPC.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use notefill_codec::PlaceholderId;
use notefill_song::{BarRange, GlobalOptions, Params, Piece, SongSnapshot, Status, TrackOptions};

use crate::call::{InfillCall, SamplingParams};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub piece: Piece,
    pub status: Status,
    pub params: Params,
    /// Masked bar ranges per track with their attribute-control strings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bar_mode: BTreeMap<u32, Vec<BarRange>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub success: bool,
    /// Generated piece, from `/generate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Piece>,
    /// Generated notation, from `/generate_from_midi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    pub fn piece(piece: Piece) -> Self {
        Self {
            success: true,
            result: Some(piece),
            ..Self::default()
        }
    }

    pub fn legacy(notation: impl Into<String>) -> Self {
        Self {
            success: true,
            legacy_result: Some(notation.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Legacy sampling arguments sent with a MIDI file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyParams {
    pub notation: String,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiGenerateRequest {
    /// Path of the MIDI file, readable by the upstream.
    pub midi_file: String,
    pub legacy_params: LegacyParams,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, alias = "midigpt_available")]
    pub model_available: bool,
    #[serde(default)]
    pub version: String,
}

impl HealthResponse {
    pub fn ok(model_available: bool) -> Self {
        Self {
            status: "ok".to_string(),
            model_available,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfillRequest {
    pub notation: String,
    #[serde(default)]
    pub snapshot: SongSnapshot,
    #[serde(default)]
    pub sampling: SamplingParams,
    /// Global options for this call; the service's configured ones otherwise.
    #[serde(default)]
    pub options: Option<GlobalOptions>,
    #[serde(default)]
    pub track_options: BTreeMap<u32, TrackOptions>,
}

impl From<InfillRequest> for InfillCall {
    fn from(req: InfillRequest) -> Self {
        Self {
            notation: req.notation,
            snapshot: req.snapshot,
            sampling: req.sampling,
            options: req.options,
            track_options: req.track_options,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfillResponse {
    pub notation: String,
    pub placeholders: Vec<PlaceholderId>,
}
