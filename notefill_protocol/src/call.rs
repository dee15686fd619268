// The host's `call_nn_infill` arguments.
//
// The host passes positional XML-RPC arguments in one of two layouts:
//
//   (s, S, use_sampling, min_length, enc_no_repeat_ngram_size,
//    has_fully_masked_inst, temperature[, start_measure, end_measure])
//
//   (s, S, use_sampling, min_length, enc_no_repeat_ngram_size,
//    has_fully_masked_inst, options, track_options[, start_measure, end_measure])
//
// The second is told apart by a struct at index 6. `options` is a
// `GlobalOptions` struct whose temperature becomes the call's, and
// `track_options` maps track indices (as strings) to `TrackOptions`.
//
// `s` is the legacy notation string and `S` the song snapshot, either as a
// struct or as a JSON-encoded string. Everything after `S` may be omitted and
// takes the defaults below. `use_sampling` arrives as a boolean from newer
// hosts and as a string ("True", "False", "None") from older ones.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use notefill_song::{GlobalOptions, SongSnapshot, TrackOptions};

use crate::error::ProtocolError;
use crate::value::XmlRpcValue;

pub const DEFAULT_MIN_LENGTH: u32 = 10;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

fn default_min_length() -> u32 {
    DEFAULT_MIN_LENGTH
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

/// Sampling knobs passed alongside the notation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default)]
    pub use_sampling: bool,
    #[serde(default = "default_min_length")]
    pub min_length: u32,
    #[serde(default)]
    pub enc_no_repeat_ngram_size: u32,
    #[serde(default)]
    pub has_fully_masked_inst: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub start_measure: Option<u32>,
    #[serde(default)]
    pub end_measure: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            use_sampling: false,
            min_length: DEFAULT_MIN_LENGTH,
            enc_no_repeat_ngram_size: 0,
            has_fully_masked_inst: false,
            temperature: DEFAULT_TEMPERATURE,
            start_measure: None,
            end_measure: None,
        }
    }
}

impl SamplingParams {
    /// Inclusive measure selection, when both ends were given.
    pub fn selection(&self) -> Option<(u32, u32)> {
        match (self.start_measure, self.end_measure) {
            (Some(start), Some(end)) => Some((start.min(end), start.max(end))),
            _ => None,
        }
    }
}

/// A decoded `call_nn_infill`.
#[derive(Clone, Debug, PartialEq)]
pub struct InfillCall {
    pub notation: String,
    pub snapshot: SongSnapshot,
    pub sampling: SamplingParams,
    /// Per-call global options, when the host sent them.
    pub options: Option<GlobalOptions>,
    /// Per-call track options, keyed by track index.
    pub track_options: BTreeMap<u32, TrackOptions>,
}

/// An absent or nil argument.
fn present(params: &[XmlRpcValue], index: usize) -> Option<&XmlRpcValue> {
    params.get(index).filter(|v| !v.is_nil())
}

fn opt_u32(
    params: &[XmlRpcValue],
    index: usize,
    name: &'static str,
) -> Result<Option<u32>, ProtocolError> {
    present(params, index)
        .map(|v| {
            v.as_i64()
                .and_then(|i| u32::try_from(i).ok())
                .ok_or(ProtocolError::InvalidParam {
                    name,
                    expected: "a non-negative integer",
                })
        })
        .transpose()
}

fn opt_bool(
    params: &[XmlRpcValue],
    index: usize,
    name: &'static str,
) -> Result<Option<bool>, ProtocolError> {
    present(params, index)
        .map(|v| {
            v.as_bool().ok_or(ProtocolError::InvalidParam {
                name,
                expected: "a boolean",
            })
        })
        .transpose()
}

fn parse_snapshot(value: Option<&XmlRpcValue>) -> Result<SongSnapshot, ProtocolError> {
    match value {
        None => Ok(SongSnapshot::default()),
        Some(XmlRpcValue::String(json)) if json.trim().is_empty() => Ok(SongSnapshot::default()),
        Some(XmlRpcValue::String(json)) => Ok(SongSnapshot::from_json(json)?),
        Some(v @ XmlRpcValue::Struct(_)) => Ok(SongSnapshot::from_value(v.clone().into())?),
        Some(_) => Err(ProtocolError::InvalidParam {
            name: "S",
            expected: "a struct or a JSON string",
        }),
    }
}

fn parse_options<T: DeserializeOwned>(value: &XmlRpcValue, name: &'static str) -> Result<T, ProtocolError> {
    match value {
        XmlRpcValue::Struct(_) => serde_json::from_value(value.clone().into()).map_err(|e| {
            log::debug!("cannot decode {name}: {e}");
            ProtocolError::InvalidParam {
                name,
                expected: "an options struct",
            }
        }),
        _ => Err(ProtocolError::InvalidParam {
            name,
            expected: "a struct",
        }),
    }
}

impl InfillCall {
    pub fn from_params(params: &[XmlRpcValue]) -> Result<Self, ProtocolError> {
        let notation = params
            .first()
            .ok_or(ProtocolError::MissingParam { index: 0, name: "s" })?
            .as_str()
            .ok_or(ProtocolError::InvalidParam {
                name: "s",
                expected: "a string",
            })?
            .to_string();

        let snapshot = parse_snapshot(present(params, 1))?;

        let defaults = SamplingParams::default();
        let mut options = None;
        let mut track_options: BTreeMap<u32, TrackOptions> = BTreeMap::new();
        let mut selection_at = 7;
        let temperature = match present(params, 6) {
            Some(v @ XmlRpcValue::Struct(_)) => {
                let global: GlobalOptions = parse_options(v, "options")?;
                if let Some(t) = present(params, 7) {
                    track_options = parse_options(t, "track_options")?;
                }
                selection_at = 8;
                let temperature = global.temperature;
                options = Some(global);
                temperature
            }
            Some(v) => v.as_f64().ok_or(ProtocolError::InvalidParam {
                name: "temperature",
                expected: "a number or an options struct",
            })?,
            None => defaults.temperature,
        };

        let sampling = SamplingParams {
            use_sampling: opt_bool(params, 2, "use_sampling")?.unwrap_or(defaults.use_sampling),
            min_length: opt_u32(params, 3, "min_length")?.unwrap_or(defaults.min_length),
            enc_no_repeat_ngram_size: opt_u32(params, 4, "enc_no_repeat_ngram_size")?
                .unwrap_or(defaults.enc_no_repeat_ngram_size),
            has_fully_masked_inst: opt_bool(params, 5, "has_fully_masked_inst")?
                .unwrap_or(defaults.has_fully_masked_inst),
            temperature,
            start_measure: opt_u32(params, selection_at, "start_measure")?,
            end_measure: opt_u32(params, selection_at + 1, "end_measure")?,
        };

        Ok(Self {
            notation,
            snapshot,
            sampling,
            options,
            track_options,
        })
    }

    /// Positional arguments for forwarding this call to another bridge.
    /// Calls that carry options use the options layout, with the call's
    /// temperature folded into the options struct.
    pub fn to_params(&self) -> Result<Vec<XmlRpcValue>, ProtocolError> {
        let snapshot = serde_json::to_string(&self.snapshot)?;
        let s = &self.sampling;
        let mut params = vec![
            XmlRpcValue::from(self.notation.as_str()),
            XmlRpcValue::String(snapshot),
            XmlRpcValue::Bool(s.use_sampling),
            XmlRpcValue::Int(i64::from(s.min_length)),
            XmlRpcValue::Int(i64::from(s.enc_no_repeat_ngram_size)),
            XmlRpcValue::Bool(s.has_fully_masked_inst),
        ];

        if self.options.is_some() || !self.track_options.is_empty() {
            let global = GlobalOptions {
                temperature: s.temperature,
                ..self.options.clone().unwrap_or_default()
            };
            params.push(XmlRpcValue::from(&serde_json::to_value(&global)?));
            params.push(XmlRpcValue::from(&serde_json::to_value(&self.track_options)?));
        } else {
            params.push(XmlRpcValue::Double(s.temperature));
        }

        if let Some((start, end)) = s.selection() {
            params.push(XmlRpcValue::Int(i64::from(start)));
            params.push(XmlRpcValue::Int(i64::from(end)));
        }
        Ok(params)
    }
}
