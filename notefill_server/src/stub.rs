// Stub generation service.
//
// Speaks the upstream's HTTP/JSON protocol with deterministic content, for
// integration tests and for exercising a host setup without a model:
//
// - `GET /health`: always ok, model available.
// - `POST /generate`: returns the request piece with every selected bar
//   replaced by a C-major arpeggio (one note per beat for the first three
//   beats). Bars come from `bar_mode` when the request has one, otherwise from
//   the status tracks' `selected_bars`.
// - `POST /generate_from_midi`: reads the MIDI file named in the request and
//   spreads its notes over the request's placeholders as notation.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;

use tiny_http::{Method, Request};

use notefill_codec::{TimedNote, distribute_notes, placeholder_ids};
use notefill_protocol::{
    GenerateRequest, GenerateResponse, HealthResponse, MAX_BODY_SIZE, MidiGenerateRequest, read_body,
};
use notefill_song::Piece;
use notefill_song::midi::read_midi_notes;
use notefill_song::piece::{PieceNote, PieceTrack};

use crate::server::{ServerHandle, error_body, json_body, respond, spawn_http};

pub const STUB_PITCHES: [u8; 3] = [60, 64, 67];

/// Beats per bar assumed when placing generated notes.
const BEATS_PER_BAR: u32 = 4;

/// Start the stub service on `addr` (e.g. `127.0.0.1:3457`, or port 0).
pub fn start_stub_service(addr: &str) -> io::Result<(ServerHandle, SocketAddr)> {
    log::info!("starting stub generation service");
    spawn_http(addr, handle_request)
}

fn handle_request(mut request: Request) {
    let path = request.url().split('?').next().unwrap_or("").to_string();
    let method = request.method().clone();
    log::debug!("stub: {method} {path}");

    let (status, body) = match (&method, path.as_str()) {
        (Method::Get, "/health") => (200, json_body(&HealthResponse::ok(true))),
        (Method::Post, "/generate" | "/generate_from_midi") => {
            let response = read_body(request.as_reader(), MAX_BODY_SIZE)
                .map_err(|e| e.to_string())
                .and_then(|body| {
                    if path == "/generate" {
                        generate(&body)
                    } else {
                        generate_from_midi(&body)
                    }
                });
            match response {
                Ok(r) => (200, json_body(&r)),
                Err(e) => (400, json_body(&GenerateResponse::failure(e))),
            }
        }
        _ => (404, error_body(&format!("no route for {method} {path}"))),
    };
    respond(request, status, "application/json", body);
}

/// Bars to regenerate, per track.
fn selected_bars(request: &GenerateRequest) -> BTreeMap<u32, Vec<u32>> {
    if !request.bar_mode.is_empty() {
        return request
            .bar_mode
            .iter()
            .map(|(&track, ranges)| (track, ranges.iter().flat_map(|r| r.start..r.end).collect()))
            .collect();
    }
    request
        .status
        .tracks
        .iter()
        .map(|t| {
            let bars = t
                .selected_bars
                .iter()
                .enumerate()
                .filter(|&(_, &selected)| selected)
                .filter_map(|(b, _)| u32::try_from(b).ok())
                .collect();
            (t.track_id, bars)
        })
        .collect()
}

/// Replace every selected bar with the stub arpeggio.
pub fn fill_selected_bars(request: &GenerateRequest) -> Piece {
    let mut piece = request.piece.clone();
    let beat = piece.resolution.max(1);
    let bar = beat.saturating_mul(BEATS_PER_BAR);

    for (track_id, bars) in selected_bars(request) {
        let index = track_id as usize;
        if piece.tracks.len() <= index {
            piece.tracks.resize_with(index + 1, PieceTrack::default);
        }
        let track = &mut piece.tracks[index];

        for b in bars {
            let start = bar.saturating_mul(b);
            let end = start.saturating_add(bar);
            track.notes.retain(|n| !(start..end).contains(&n.start));
            track.notes.extend(STUB_PITCHES.iter().zip(0u32..).map(|(&pitch, k)| {
                let onset = start.saturating_add(beat.saturating_mul(k));
                PieceNote {
                    pitch,
                    start: onset,
                    end: onset.saturating_add(beat),
                    velocity: 100,
                }
            }));
        }
        track.notes.sort_by_key(|n| (n.start, n.pitch));
    }
    piece
}

fn generate(body: &str) -> Result<GenerateResponse, String> {
    let request: GenerateRequest = serde_json::from_str(body).map_err(|e| e.to_string())?;
    Ok(GenerateResponse::piece(fill_selected_bars(&request)))
}

fn generate_from_midi(body: &str) -> Result<GenerateResponse, String> {
    let request: MidiGenerateRequest = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let bytes = std::fs::read(&request.midi_file)
        .map_err(|e| format!("cannot read {}: {e}", request.midi_file))?;
    let midi = read_midi_notes(&bytes).map_err(|e| e.to_string())?;
    let notes: Vec<TimedNote> = midi
        .all_notes()
        .into_iter()
        .map(|n| TimedNote::new(n.pitch, n.start, n.duration()))
        .collect();
    let ids = placeholder_ids(&request.legacy_params.notation);
    Ok(GenerateResponse::legacy(distribute_notes(&notes, &ids)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefill_codec::{MaskLocation, PlaceholderId};
    use notefill_song::{BarRange, GlobalOptions, Params, Status, build_params, build_status};
    use notefill_song::SongSnapshot;

    fn request(locations: &[MaskLocation]) -> GenerateRequest {
        let snapshot = SongSnapshot::default();
        let status: Status = build_status(
            &snapshot,
            locations,
            &Default::default(),
            &GlobalOptions::default(),
        );
        let params: Params = build_params(&GlobalOptions::default(), "");
        GenerateRequest {
            piece: Piece::from_snapshot(&snapshot),
            status,
            params,
            bar_mode: BTreeMap::new(),
        }
    }

    #[test]
    fn selected_bars_get_three_notes() {
        let piece = fill_selected_bars(&request(&[MaskLocation {
            placeholder: PlaceholderId(0),
            track: 1,
            measure: 2,
        }]));
        assert_eq!(piece.tracks.len(), 2);
        assert!(piece.tracks[0].notes.is_empty());
        let notes = &piece.tracks[1].notes;
        assert_eq!(notes.iter().map(|n| n.pitch).collect::<Vec<_>>(), vec![60, 64, 67]);
        assert_eq!(notes[0].start, 2 * 4 * 480);
        assert_eq!(notes[2].end, 2 * 4 * 480 + 3 * 480);
    }

    #[test]
    fn existing_notes_in_selected_bars_are_replaced() {
        let mut req = request(&[MaskLocation {
            placeholder: PlaceholderId(0),
            track: 0,
            measure: 0,
        }]);
        req.piece.tracks = vec![PieceTrack {
            notes: vec![
                PieceNote { pitch: 40, start: 100, end: 200, velocity: 90 },
                PieceNote { pitch: 41, start: 1920, end: 2000, velocity: 90 },
            ],
            ..PieceTrack::default()
        }];
        let piece = fill_selected_bars(&req);
        let pitches: Vec<u8> = piece.tracks[0].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67, 41]);
    }

    #[test]
    fn bar_mode_ranges_take_precedence() {
        let mut req = request(&[MaskLocation {
            placeholder: PlaceholderId(0),
            track: 0,
            measure: 0,
        }]);
        req.bar_mode = BTreeMap::from([(
            2,
            vec![BarRange {
                start: 1,
                end: 3,
                controls: vec!["HORIZ_1".into()],
            }],
        )]);
        let piece = fill_selected_bars(&req);
        assert!(piece.tracks[0].notes.is_empty());
        let starts: Vec<u32> = piece.tracks[2].notes.iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![1920, 2400, 2880, 3840, 4320, 4800]);
    }

    #[test]
    fn bad_body_is_reported() {
        assert!(generate("{").is_err());
        assert!(generate_from_midi(r#"{"midi_file": "/nonexistent/x.mid", "legacy_params": {"notation": ""}}"#).is_err());
    }
}
