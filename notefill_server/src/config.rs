// Service configuration.
//
// `ServiceConfig` is loaded from an optional JSON file and then overridden by
// command-line flags in `main.rs`. Every field has a default, so `{}` (or no
// file at all) is a valid configuration that listens on 127.0.0.1:3456 and
// talks to a piece-JSON upstream on 127.0.0.1:3457.
//
// `track_options` is keyed by track index; tracks without an entry use
// `TrackOptions::default()`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use notefill_song::{GlobalOptions, TrackOptions};

use crate::error::ServerError;

pub const DEFAULT_PORT: u16 = 3456;
pub const DEFAULT_UPSTREAM_PORT: u16 = 3457;

/// Which upstream protocol to speak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamKind {
    /// Piece/status/params JSON to `/generate`.
    #[default]
    Piece,
    /// A MIDI file path to `/generate_from_midi`.
    MidiFile,
    /// Forward the XML-RPC call unchanged to another bridge.
    Legacy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub kind: UpstreamKind,
    /// Base URL, without a trailing slash. For `Legacy` this is the XML-RPC
    /// endpoint itself.
    pub url: String,
    pub timeout_secs: u64,
    /// Directory for MIDI files handed to a `MidiFile` upstream. Must be
    /// readable by the upstream process; the system temp dir when unset.
    pub shared_midi_dir: Option<PathBuf>,
    /// Model checkpoint path passed in `Params::ckpt`.
    pub checkpoint: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            kind: UpstreamKind::Piece,
            url: format!("http://127.0.0.1:{DEFAULT_UPSTREAM_PORT}"),
            timeout_secs: 120,
            shared_midi_dir: None,
            checkpoint: String::new(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url.trim_end_matches('/'))
    }

    pub fn midi_dir(&self) -> PathBuf {
        self.shared_midi_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub port: u16,
    pub upstream: UpstreamConfig,
    pub cache_enabled: bool,
    pub global_options: GlobalOptions,
    pub track_options: BTreeMap<u32, TrackOptions>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            upstream: UpstreamConfig::default(),
            cache_enabled: true,
            global_options: GlobalOptions::default(),
            track_options: BTreeMap::new(),
        }
    }
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ServiceConfig::from_json("{}").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = ServiceConfig::from_json(
            r#"{
                "port": 4000,
                "upstream": {"kind": "midi_file", "url": "http://10.0.0.2:9000/"},
                "global_options": {"temperature": 0.7},
                "track_options": {"2": {"instrument": 33, "density": 5}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.upstream.kind, UpstreamKind::MidiFile);
        assert_eq!(config.upstream.timeout_secs, 120);
        assert_eq!(
            config.upstream.endpoint("/generate_from_midi"),
            "http://10.0.0.2:9000/generate_from_midi"
        );
        assert_eq!(config.global_options.temperature, 0.7);
        assert_eq!(config.global_options.max_steps, 200);
        assert_eq!(config.track_options[&2].instrument, 33);
        assert_eq!(config.track_options[&2].track_type, 10);
        assert!(config.cache_enabled);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notefill.json");
        std::fs::write(&path, r#"{"upstream": {"kind": "legacy"}}"#).unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.upstream.kind, UpstreamKind::Legacy);
        assert_eq!(config.listen_addr(), "127.0.0.1:3456");

        assert!(ServiceConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn unknown_upstream_kind_is_rejected() {
        assert!(ServiceConfig::from_json(r#"{"upstream": {"kind": "grpc"}}"#).is_err());
    }
}
