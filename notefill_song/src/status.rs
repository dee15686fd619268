// Model request documents derived from mask locations.
//
// The model takes three JSON documents: the piece, a per-track "status" that
// says which bars to regenerate and how, and global sampling "params". This
// module builds the last two from the placeholders' (track, measure) bindings
// and the host's options, and maps a generated piece back onto placeholders.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use notefill_codec::{MaskLocation, PlaceholderId, TimedNote};

use crate::options::{GlobalOptions, TrackOptions, attribute_controls, instrument_name, polyphony_level};
use crate::piece::Piece;
use crate::snapshot::SongSnapshot;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub tracks: Vec<TrackStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackStatus {
    pub track_id: u32,
    pub temperature: f64,
    pub instrument: String,
    pub density: u32,
    pub track_type: u32,
    pub ignore: bool,
    pub selected_bars: Vec<bool>,
    pub min_polyphony_q: String,
    pub max_polyphony_q: String,
    pub autoregressive: bool,
    pub polyphony_hard_limit: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub tracks_per_step: u32,
    pub bars_per_step: u32,
    pub model_dim: u32,
    pub percentage: u32,
    pub batch_size: u32,
    pub temperature: f64,
    pub max_steps: u32,
    pub polyphony_hard_limit: u32,
    pub shuffle: bool,
    pub verbose: bool,
    pub ckpt: String,
    pub sampling_seed: i64,
    pub mask_top_k: u32,
}

/// One status entry per masked track, in track order.
///
/// `selected_bars` covers every measure of the song (or up to the furthest
/// masked measure, if that is later) and is true exactly where a placeholder
/// masks that track. Locations out of the snapshot's reach are skipped.
pub fn build_status(
    snapshot: &SongSnapshot,
    locations: &[MaskLocation],
    track_options: &BTreeMap<u32, TrackOptions>,
    global: &GlobalOptions,
) -> Status {
    let locations: Vec<&MaskLocation> = locations
        .iter()
        .filter(|l| {
            let reachable = snapshot.within_reach(l.track, l.measure);
            if !reachable {
                log::debug!(
                    "{} at track {} measure {} is out of reach, not selecting it",
                    l.placeholder,
                    l.track,
                    l.measure
                );
            }
            reachable
        })
        .collect();

    let n_bars = locations
        .iter()
        .map(|l| l.measure.saturating_add(1))
        .max()
        .unwrap_or(0)
        .max(snapshot.n_measures()) as usize;

    let masked_tracks: BTreeSet<u32> = locations.iter().map(|l| l.track).collect();
    let default_opts = TrackOptions::default();

    let tracks = masked_tracks
        .into_iter()
        .map(|track_id| {
            let opts = track_options.get(&track_id).unwrap_or(&default_opts);
            let mut selected_bars = vec![false; n_bars];
            for loc in locations.iter().filter(|l| l.track == track_id) {
                if let Some(bar) = selected_bars.get_mut(loc.measure as usize) {
                    *bar = true;
                }
            }
            TrackStatus {
                track_id,
                temperature: opts.resolved_temperature(global),
                instrument: instrument_name(opts.instrument).to_string(),
                density: opts.density,
                track_type: opts.track_type,
                ignore: opts.ignore,
                selected_bars,
                min_polyphony_q: polyphony_level(opts.min_polyphony),
                max_polyphony_q: polyphony_level(opts.max_polyphony),
                autoregressive: opts.autoregressive,
                polyphony_hard_limit: opts.polyphony_hard_limit,
            }
        })
        .collect();

    Status { tracks }
}

pub fn build_params(global: &GlobalOptions, checkpoint: &str) -> Params {
    Params {
        tracks_per_step: global.tracks_per_step,
        bars_per_step: global.bars_per_step,
        model_dim: global.model_dim,
        percentage: global.percentage,
        batch_size: global.batch_size,
        temperature: global.temperature,
        max_steps: global.max_steps,
        polyphony_hard_limit: global.polyphony_hard_limit,
        shuffle: global.shuffle,
        verbose: global.verbose,
        ckpt: checkpoint.to_string(),
        sampling_seed: global.sampling_seed,
        mask_top_k: global.mask_top_k,
    }
}

/// Contiguous masked measure ranges (half-open) per track.
pub fn infill_ranges(locations: &[MaskLocation]) -> BTreeMap<u32, Vec<Range<u32>>> {
    let mut per_track: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for loc in locations {
        per_track.entry(loc.track).or_default().insert(loc.measure);
    }

    per_track
        .into_iter()
        .map(|(track, measures)| {
            let mut ranges: Vec<Range<u32>> = Vec::new();
            for m in measures {
                match ranges.last_mut() {
                    Some(r) if r.end == m => r.end = m.saturating_add(1),
                    _ => ranges.push(m..m.saturating_add(1)),
                }
            }
            (track, ranges)
        })
        .collect()
}

/// A masked range together with the track's attribute controls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarRange {
    pub start: u32,
    pub end: u32,
    pub controls: Vec<String>,
}

/// `infill_ranges` with each track's control strings attached.
pub fn bar_mode(
    locations: &[MaskLocation],
    track_options: &BTreeMap<u32, TrackOptions>,
) -> BTreeMap<u32, Vec<BarRange>> {
    infill_ranges(locations)
        .into_iter()
        .map(|(track, ranges)| {
            let controls = track_options
                .get(&track)
                .map(attribute_controls)
                .unwrap_or_default();
            let bars = ranges
                .into_iter()
                .map(|r| BarRange {
                    start: r.start,
                    end: r.end,
                    controls: controls.clone(),
                })
                .collect();
            (track, bars)
        })
        .collect()
}

/// Notes of a generated piece that fall inside each placeholder's masked
/// (track, measure), timed relative to the measure start in snapshot clicks.
///
/// Every placeholder gets an entry, possibly empty. A repeated placeholder
/// keeps its first location.
pub fn placeholder_notes(
    piece: &Piece,
    snapshot: &SongSnapshot,
    locations: &[MaskLocation],
) -> BTreeMap<PlaceholderId, Vec<TimedNote>> {
    let mut out = BTreeMap::new();
    for loc in locations {
        if out.contains_key(&loc.placeholder) {
            continue;
        }
        let (lo, hi) = snapshot.measure_bounds(loc.measure);
        let notes = piece
            .tracks
            .get(loc.track as usize)
            .map(|track| {
                track
                    .notes
                    .iter()
                    .filter_map(|n| {
                        let start = piece.to_clicks(n.start, snapshot.cpq);
                        let end = piece.to_clicks(n.end, snapshot.cpq);
                        (lo..hi)
                            .contains(&start)
                            .then(|| TimedNote::new(n.pitch, start - lo, end.saturating_sub(start)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.insert(loc.placeholder, notes);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{PieceNote, PieceTrack};
    use crate::snapshot::MeasureEvents;

    fn loc(id: u32, track: u32, measure: u32) -> MaskLocation {
        MaskLocation {
            placeholder: PlaceholderId(id),
            track,
            measure,
        }
    }

    fn three_bar_snapshot() -> SongSnapshot {
        SongSnapshot {
            tracks: vec![vec![MeasureEvents::default(); 3], vec![MeasureEvents::default(); 3]],
            ..SongSnapshot::default()
        }
    }

    #[test]
    fn status_selects_masked_bars_per_track() {
        let locations = [loc(0, 1, 2), loc(1, 0, 0), loc(2, 1, 0)];
        let status = build_status(
            &three_bar_snapshot(),
            &locations,
            &BTreeMap::new(),
            &GlobalOptions::default(),
        );
        assert_eq!(status.tracks.len(), 2);
        assert_eq!(status.tracks[0].track_id, 0);
        assert_eq!(status.tracks[0].selected_bars, vec![true, false, false]);
        assert_eq!(status.tracks[1].selected_bars, vec![true, false, true]);
        assert_eq!(status.tracks[1].instrument, "acoustic_grand_piano");
        assert_eq!(status.tracks[1].min_polyphony_q, "POLYPHONY_ANY");
        assert_eq!(status.tracks[1].temperature, 1.0);
    }

    #[test]
    fn status_grows_to_cover_late_masks() {
        let status = build_status(
            &SongSnapshot::default(),
            &[loc(0, 0, 4)],
            &BTreeMap::new(),
            &GlobalOptions::default(),
        );
        assert_eq!(status.tracks[0].selected_bars.len(), 5);
        assert!(status.tracks[0].selected_bars[4]);
    }

    #[test]
    fn status_skips_locations_out_of_reach() {
        let status = build_status(
            &three_bar_snapshot(),
            &[loc(0, 0, u32::MAX), loc(1, 0, 50_000_000), loc(2, 1, 1), loc(3, u32::MAX, 0)],
            &BTreeMap::new(),
            &GlobalOptions::default(),
        );
        assert_eq!(status.tracks.len(), 1);
        assert_eq!(status.tracks[0].track_id, 1);
        assert_eq!(status.tracks[0].selected_bars, vec![false, true, false]);
    }

    #[test]
    fn status_uses_track_options() {
        let opts = BTreeMap::from([(
            0,
            TrackOptions {
                temperature: 0.5,
                instrument: 40,
                max_polyphony: 3,
                ..TrackOptions::default()
            },
        )]);
        let status = build_status(
            &three_bar_snapshot(),
            &[loc(0, 0, 1)],
            &opts,
            &GlobalOptions::default(),
        );
        let t = &status.tracks[0];
        assert_eq!(t.temperature, 0.5);
        assert_eq!(t.instrument, "violin");
        assert_eq!(t.max_polyphony_q, "POLYPHONY_3");
    }

    #[test]
    fn params_copy_global_options() {
        let params = build_params(&GlobalOptions::default(), "model.ckpt");
        assert_eq!(params.ckpt, "model.ckpt");
        assert_eq!(params.model_dim, 4);
        assert_eq!(params.sampling_seed, -1);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["polyphony_hard_limit"], 6);
    }

    #[test]
    fn ranges_are_contiguous_per_track() {
        let locations = [loc(0, 0, 1), loc(1, 0, 2), loc(2, 0, 4), loc(3, 2, 0), loc(4, 0, 2)];
        let ranges = infill_ranges(&locations);
        assert_eq!(ranges[&0], vec![1..3, 4..5]);
        assert_eq!(ranges[&2], vec![0..1]);
    }

    #[test]
    fn bar_mode_attaches_controls() {
        let opts = BTreeMap::from([(
            0,
            TrackOptions {
                horiz_density: 3,
                ..TrackOptions::default()
            },
        )]);
        let bars = bar_mode(&[loc(0, 0, 0), loc(1, 1, 0)], &opts);
        assert_eq!(bars[&0][0].controls, vec!["HORIZ_3".to_string()]);
        assert!(bars[&1][0].controls.is_empty());
    }

    #[test]
    fn placeholder_notes_are_measure_relative() {
        let piece = Piece {
            tracks: vec![
                PieceTrack::default(),
                PieceTrack {
                    notes: vec![
                        PieceNote { pitch: 60, start: 100, end: 200, velocity: 90 },
                        PieceNote { pitch: 62, start: 1920, end: 2400, velocity: 90 },
                        PieceNote { pitch: 64, start: 2000, end: 2100, velocity: 90 },
                    ],
                    ..PieceTrack::default()
                },
            ],
            ..Piece::default()
        };
        let snapshot = three_bar_snapshot();
        let notes = placeholder_notes(&piece, &snapshot, &[loc(7, 1, 1), loc(8, 0, 0), loc(9, 5, 0)]);
        assert_eq!(
            notes[&PlaceholderId(7)],
            vec![TimedNote::new(62, 0, 480), TimedNote::new(64, 80, 100)]
        );
        assert!(notes[&PlaceholderId(8)].is_empty());
        assert!(notes[&PlaceholderId(9)].is_empty());
    }
}
