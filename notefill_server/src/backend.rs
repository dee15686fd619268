// Generation backends.
//
// A `GenerationBackend` turns a `GenerationRequest` plus its target mask
// locations into a `GenerationResult`. Three implementations talk to the
// three kinds of upstream the bridge has been deployed against:
//
// - `PieceBackend`: builds piece/status/params JSON and POSTs `/generate`,
//   then maps the generated piece back onto placeholders.
// - `MidiFileBackend`: writes the snapshot as a MIDI file where the upstream
//   can read it and POSTs `/generate_from_midi`; the upstream answers with
//   notation directly.
// - `LegacyForwardBackend`: forwards `call_nn_infill` as XML-RPC to another
//   bridge and returns whatever it answers.
//
// All HTTP goes through a blocking reqwest client with the configured
// timeout. Errors propagate with `?`; `InfillService` decides what the host
// sees.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::blocking::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use notefill_codec::{GenerationResult, MaskLocation, SpanKey, SpanMap, render, render_notes};
use notefill_protocol::{
    GenerateRequest, GenerateResponse, HealthResponse, LegacyParams, MidiGenerateRequest,
    XmlRpcValue, parse_method_response, write_method_call,
};
use notefill_song::midi::write_midi;
use notefill_song::{
    GlobalOptions, Piece, TrackOptions, bar_mode, build_params, build_status, placeholder_notes,
};

use crate::config::{ServiceConfig, UpstreamConfig, UpstreamKind};
use crate::error::ServerError;
use crate::infill::GenerationRequest;

pub trait GenerationBackend: Send {
    /// Short name for logs and `check_libraries`.
    fn name(&self) -> &'static str;

    fn generate(
        &self,
        request: &GenerationRequest,
        locations: &[MaskLocation],
    ) -> Result<GenerationResult, ServerError>;

    /// Whether the upstream answers and reports a loaded model.
    fn model_available(&self) -> bool;
}

/// Build the backend selected by `config.upstream.kind`.
pub fn backend_from_config(config: &ServiceConfig) -> Result<Box<dyn GenerationBackend>, ServerError> {
    let upstream = config.upstream.clone();
    Ok(match upstream.kind {
        UpstreamKind::Piece => Box::new(PieceBackend::new(
            upstream,
            config.global_options.clone(),
            config.track_options.clone(),
        )?),
        UpstreamKind::MidiFile => Box::new(MidiFileBackend::new(upstream)?),
        UpstreamKind::Legacy => Box::new(LegacyForwardBackend::new(upstream)?),
    })
}

// ---------------------------------------------------------------------------
// JSON upstream client
// ---------------------------------------------------------------------------

/// Upstreams are addressed directly; proxy environment variables are ignored.
fn http_client(config: &UpstreamConfig) -> Result<Client, ServerError> {
    Ok(Client::builder()
        .timeout(config.timeout())
        .no_proxy()
        .build()?)
}

struct UpstreamClient {
    http: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    fn new(config: UpstreamConfig) -> Result<Self, ServerError> {
        Ok(Self {
            http: http_client(&config)?,
            config,
        })
    }

    fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ServerError> {
        let url = self.config.endpoint(path);
        log::debug!("POST {url}");
        Ok(self.http.post(url).json(body).send()?.error_for_status()?.json()?)
    }

    fn health(&self) -> Result<HealthResponse, ServerError> {
        let url = self.config.endpoint("/health");
        Ok(self.http.get(url).send()?.error_for_status()?.json()?)
    }

    fn model_available(&self) -> bool {
        match self.health() {
            Ok(health) => health.model_available,
            Err(e) => {
                log::debug!("health check failed: {e}");
                false
            }
        }
    }
}

/// Unwrap a successful upstream response or turn it into an error.
fn checked(response: GenerateResponse) -> Result<GenerateResponse, ServerError> {
    if response.success {
        Ok(response)
    } else {
        Err(ServerError::Upstream(
            response.error.unwrap_or_else(|| "no error message".to_string()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Piece JSON
// ---------------------------------------------------------------------------

pub struct PieceBackend {
    client: UpstreamClient,
    global: GlobalOptions,
    track_options: BTreeMap<u32, TrackOptions>,
}

impl PieceBackend {
    pub fn new(
        config: UpstreamConfig,
        global: GlobalOptions,
        track_options: BTreeMap<u32, TrackOptions>,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            client: UpstreamClient::new(config)?,
            global,
            track_options,
        })
    }

    /// The `/generate` body for a request. Options sent with the call replace
    /// the configured ones (track options per track), and the call's
    /// temperature replaces the global one.
    pub fn generate_request(&self, request: &GenerationRequest, locations: &[MaskLocation]) -> GenerateRequest {
        let global = GlobalOptions {
            temperature: request.sampling.temperature,
            ..request.options.clone().unwrap_or_else(|| self.global.clone())
        };
        let mut track_options = self.track_options.clone();
        track_options.extend(request.track_options.iter().map(|(&track, opts)| (track, opts.clone())));

        GenerateRequest {
            piece: Piece::from_snapshot(&request.snapshot),
            status: build_status(&request.snapshot, locations, &track_options, &global),
            params: build_params(&global, &self.client.config.checkpoint),
            bar_mode: bar_mode(locations, &track_options),
        }
    }
}

/// Render a generated piece as notation for the requested placeholders: each
/// placeholder takes the notes generated in its own (track, measure).
/// Placeholders without a location get no span here.
pub fn piece_notation(piece: &Piece, request: &GenerationRequest, locations: &[MaskLocation]) -> String {
    let spans: SpanMap = placeholder_notes(piece, &request.snapshot, locations)
        .into_iter()
        .map(|(id, notes)| (SpanKey::from(id), render_notes(&notes)))
        .collect();
    render(&spans)
}

impl GenerationBackend for PieceBackend {
    fn name(&self) -> &'static str {
        "piece"
    }

    fn generate(
        &self,
        request: &GenerationRequest,
        locations: &[MaskLocation],
    ) -> Result<GenerationResult, ServerError> {
        let body = self.generate_request(request, locations);
        let response = checked(self.client.post_json("/generate", &body)?)?;
        let piece = response.result.ok_or(ServerError::EmptyResult("piece"))?;
        log::debug!("upstream returned {} note(s)", piece.note_count());
        Ok(GenerationResult::new(
            piece_notation(&piece, request, locations),
            request.placeholders.clone(),
        ))
    }

    fn model_available(&self) -> bool {
        self.client.model_available()
    }
}

// ---------------------------------------------------------------------------
// MIDI file
// ---------------------------------------------------------------------------

static MIDI_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A MIDI file that is removed when dropped.
struct TempMidi {
    path: PathBuf,
}

impl TempMidi {
    fn create(dir: &Path, request: &GenerationRequest) -> Result<Self, ServerError> {
        std::fs::create_dir_all(dir)?;
        let n = MIDI_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("notefill-{}-{n}.mid", std::process::id()));
        write_midi(&request.snapshot, &path)?;
        Ok(Self { path })
    }
}

impl Drop for TempMidi {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("could not remove {}: {e}", self.path.display());
        }
    }
}

pub struct MidiFileBackend {
    client: UpstreamClient,
}

impl MidiFileBackend {
    pub fn new(config: UpstreamConfig) -> Result<Self, ServerError> {
        Ok(Self {
            client: UpstreamClient::new(config)?,
        })
    }
}

impl GenerationBackend for MidiFileBackend {
    fn name(&self) -> &'static str {
        "midi_file"
    }

    fn generate(
        &self,
        request: &GenerationRequest,
        _locations: &[MaskLocation],
    ) -> Result<GenerationResult, ServerError> {
        let midi = TempMidi::create(&self.client.config.midi_dir(), request)?;
        let body = MidiGenerateRequest {
            midi_file: midi.path.to_string_lossy().into_owned(),
            legacy_params: LegacyParams {
                notation: request.notation.clone(),
                sampling: request.sampling.clone(),
            },
        };
        let response = checked(self.client.post_json("/generate_from_midi", &body)?)?;
        let notation = response
            .legacy_result
            .ok_or(ServerError::EmptyResult("legacy_result"))?;
        Ok(GenerationResult::new(notation, request.placeholders.clone()))
    }

    fn model_available(&self) -> bool {
        self.client.model_available()
    }
}

// ---------------------------------------------------------------------------
// XML-RPC forwarding
// ---------------------------------------------------------------------------

pub struct LegacyForwardBackend {
    http: Client,
    url: String,
}

impl LegacyForwardBackend {
    pub fn new(config: UpstreamConfig) -> Result<Self, ServerError> {
        Ok(Self {
            http: http_client(&config)?,
            url: config.url,
        })
    }

    fn call(&self, method: &str, params: &[XmlRpcValue]) -> Result<XmlRpcValue, ServerError> {
        let body = write_method_call(method, params);
        let text = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(parse_method_response(&text)?)
    }
}

impl GenerationBackend for LegacyForwardBackend {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn generate(
        &self,
        request: &GenerationRequest,
        _locations: &[MaskLocation],
    ) -> Result<GenerationResult, ServerError> {
        let params = request.to_call().to_params()?;
        let reply = self.call("call_nn_infill", &params)?;
        let notation = reply
            .as_str()
            .ok_or(ServerError::EmptyResult("notation string"))?;
        Ok(GenerationResult::new(notation, request.placeholders.clone()))
    }

    fn model_available(&self) -> bool {
        match self.call("check_libraries", &[]) {
            Ok(info) => ["model_available", "midigpt_available"]
                .iter()
                .any(|key| info.get(key).and_then(XmlRpcValue::as_bool) == Some(true)),
            Err(e) => {
                log::debug!("check_libraries failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefill_codec::{PlaceholderId, parse, span_notes};
    use notefill_protocol::InfillCall;
    use notefill_song::SongSnapshot;
    use notefill_song::piece::{PieceNote, PieceTrack};

    fn request(notation: &str) -> GenerationRequest {
        GenerationRequest::new(InfillCall {
            notation: notation.into(),
            snapshot: SongSnapshot::default(),
            sampling: Default::default(),
            options: None,
            track_options: BTreeMap::new(),
        })
    }

    fn unreachable_upstream() -> UpstreamConfig {
        // Port 9 (discard) is closed on test machines; connecting fails fast.
        UpstreamConfig {
            url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..UpstreamConfig::default()
        }
    }

    fn piece_with(notes: &[(u8, u32, u32)]) -> Piece {
        Piece {
            tracks: vec![PieceTrack {
                notes: notes
                    .iter()
                    .map(|&(pitch, start, end)| PieceNote {
                        pitch,
                        start,
                        end,
                        velocity: 100,
                    })
                    .collect(),
                ..PieceTrack::default()
            }],
            ..Piece::default()
        }
    }

    #[test]
    fn piece_notes_land_in_their_measures() {
        let req = request(";M:0;I:0;<extra_id_0>;M:1;I:0;<extra_id_1>");
        let locations = req.target_locations();
        let piece = piece_with(&[(60, 0, 480), (67, 1920, 2400), (69, 2400, 2640)]);
        let spans = parse(&piece_notation(&piece, &req, &locations));

        let first = span_notes(spans.get(PlaceholderId(0)));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].pitch, 60);

        let second = span_notes(spans.get(PlaceholderId(1)));
        assert_eq!(second.iter().map(|n| n.pitch).collect::<Vec<_>>(), vec![67, 69]);
        assert_eq!(second[0].start, 0);
        assert_eq!(second[1].start, 480);
    }

    #[test]
    fn piece_without_locations_fills_nothing() {
        let req = request("<extra_id_0>;<extra_id_1>");
        let piece = piece_with(&[(60, 0, 240), (62, 240, 480)]);
        let notation = piece_notation(&piece, &req, &[]);
        assert!(parse(&notation).placeholder_ids().is_empty());

        // The selection excludes both placeholders: the song's own notes are
        // not handed out, so realignment falls back for each.
        let mut req = request(";M:0;<extra_id_0>;M:1;<extra_id_1>");
        req.sampling.start_measure = Some(4);
        req.sampling.end_measure = Some(6);
        let locations = req.target_locations();
        assert!(locations.is_empty());
        let result = GenerationResult::new(piece_notation(&piece, &req, &locations), req.placeholders.clone());
        assert_eq!(
            notefill_codec::realign(&result, &req.placeholders),
            notefill_codec::fallback_notation(&req.placeholders)
        );
    }

    #[test]
    fn generate_request_uses_call_temperature() {
        let backend = PieceBackend::new(
            UpstreamConfig {
                checkpoint: "model.pt".into(),
                ..unreachable_upstream()
            },
            GlobalOptions::default(),
            BTreeMap::new(),
        )
        .unwrap();
        let mut req = request(";M:2;I:1;<extra_id_0>");
        req.sampling.temperature = 0.5;
        let body = backend.generate_request(&req, &req.target_locations());
        assert_eq!(body.params.temperature, 0.5);
        assert_eq!(body.params.ckpt, "model.pt");
        assert_eq!(body.status.tracks.len(), 1);
        assert_eq!(body.status.tracks[0].track_id, 1);
        assert_eq!(body.status.tracks[0].selected_bars, vec![false, false, true]);
    }

    #[test]
    fn call_options_replace_configured_ones() {
        let configured = BTreeMap::from([
            (0, TrackOptions { instrument: 42, ..TrackOptions::default() }),
            (1, TrackOptions { instrument: 33, ..TrackOptions::default() }),
        ]);
        let backend = PieceBackend::new(
            unreachable_upstream(),
            GlobalOptions { model_dim: 4, ..GlobalOptions::default() },
            configured,
        )
        .unwrap();

        let mut req = request(";M:0;I:0;<extra_id_0>;M:1;I:1;<extra_id_1>;M:2;I:1;<extra_id_2>");
        req.sampling.temperature = 0.9;
        req.options = Some(GlobalOptions {
            model_dim: 8,
            sampling_seed: 7,
            ..GlobalOptions::default()
        });
        req.track_options = BTreeMap::from([(
            1,
            TrackOptions {
                instrument: 40,
                horiz_density: 2,
                controls: vec!["GENRE_FOLK".into()],
                ..TrackOptions::default()
            },
        )]);

        let body = backend.generate_request(&req, &req.target_locations());
        assert_eq!(body.params.model_dim, 8);
        assert_eq!(body.params.sampling_seed, 7);
        assert_eq!(body.params.temperature, 0.9);
        assert_eq!(body.status.tracks[0].instrument, "cello");
        assert_eq!(body.status.tracks[1].instrument, "violin");

        assert!(body.bar_mode[&0][0].controls.is_empty());
        assert_eq!(body.bar_mode[&1].len(), 1);
        assert_eq!((body.bar_mode[&1][0].start, body.bar_mode[&1][0].end), (1, 3));
        assert_eq!(body.bar_mode[&1][0].controls, vec!["GENRE_FOLK", "HORIZ_2"]);
    }

    #[test]
    fn connection_refused_is_an_error() {
        let req = request(";M:0;<extra_id_0>");
        let piece = PieceBackend::new(unreachable_upstream(), GlobalOptions::default(), BTreeMap::new()).unwrap();
        assert!(matches!(
            piece.generate(&req, &req.target_locations()),
            Err(ServerError::Http(_))
        ));
        assert!(!piece.model_available());

        let legacy = LegacyForwardBackend::new(unreachable_upstream()).unwrap();
        assert!(legacy.generate(&req, &[]).is_err());
        assert!(!legacy.model_available());
    }

    #[test]
    fn midi_file_is_removed_after_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MidiFileBackend::new(UpstreamConfig {
            kind: UpstreamKind::MidiFile,
            shared_midi_dir: Some(dir.path().to_path_buf()),
            ..unreachable_upstream()
        })
        .unwrap();
        let req = request(";M:0;<extra_id_0>");
        assert!(backend.generate(&req, &[]).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn backend_kind_follows_config() {
        let mut config = ServiceConfig::default();
        for (kind, name) in [
            (UpstreamKind::Piece, "piece"),
            (UpstreamKind::MidiFile, "midi_file"),
            (UpstreamKind::Legacy, "legacy"),
        ] {
            config.upstream.kind = kind;
            assert_eq!(backend_from_config(&config).unwrap().name(), name);
        }
    }

    #[test]
    fn upstream_failure_flag_becomes_error() {
        let err = checked(GenerateResponse::failure("out of memory")).unwrap_err();
        assert!(err.to_string().contains("out of memory"));
        assert!(checked(GenerateResponse::legacy("<extra_id_0>")).is_ok());
    }
}
