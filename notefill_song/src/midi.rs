// MIDI conversion for song snapshots.
//
// Converts a SongSnapshot into a Standard MIDI File (SMF) for upstream
// services that take a MIDI file instead of piece JSON, and reads note
// content back out of a MIDI file. Output is SMF Format 1: track 0 carries the
// tempo map and time signature, and each host track becomes one MIDI track
// with its program change and note events. Drum tracks (program >= 128) play
// on channel 9, melodic tracks on channels 0-15 skipping 9.
//
// Uses the `midly` crate for reading and writing.

use std::collections::HashMap;
use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::error::SongError;
use crate::snapshot::{SongNote, SongSnapshot};

const DRUM_CHANNEL: u8 = 9;

/// Convert a snapshot to MIDI and write it to a file.
pub fn write_midi(snapshot: &SongSnapshot, path: &Path) -> Result<(), SongError> {
    std::fs::write(path, midi_bytes(snapshot)?)?;
    Ok(())
}

/// Convert a snapshot to encoded SMF bytes.
pub fn midi_bytes(snapshot: &SongSnapshot) -> Result<Vec<u8>, SongError> {
    let smf = snapshot_to_smf(snapshot);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

fn channel_for(track: usize, is_drum: bool) -> u8 {
    if is_drum {
        return DRUM_CHANNEL;
    }
    // 15 melodic channels, skipping the drum channel.
    let ch = (track % 15) as u8;
    if ch >= DRUM_CHANNEL { ch + 1 } else { ch }
}

/// Absolute-tick events turned into a delta-timed track, closed with
/// EndOfTrack.
fn into_track(mut events: Vec<(u32, TrackEventKind<'static>)>) -> Track<'static> {
    // Stable sort keeps program changes ahead of notes and offs ahead of ons
    // at equal ticks, as pushed.
    events.sort_by_key(|(tick, _)| *tick);
    let mut track: Track<'static> = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u32;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

/// Convert a snapshot to an in-memory SMF.
pub fn snapshot_to_smf(snapshot: &SongSnapshot) -> Smf<'static> {
    let ticks_per_quarter = u16::try_from(snapshot.cpq.clamp(1, 0x7FFF)).unwrap_or(480);
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_quarter)),
    ));

    // Track 0: tempo map + 4/4
    let mut conductor: Vec<(u32, TrackEventKind<'static>)> = vec![(
        0,
        TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    )];
    let mut tempos: Vec<(u32, f64)> = snapshot
        .tempo_changes
        .iter()
        .filter(|t| t.bpm > 0.0)
        .map(|t| (t.click, t.bpm))
        .collect();
    if tempos.is_empty() {
        tempos.push((0, snapshot.initial_bpm()));
    }
    for (click, bpm) in tempos {
        let micros = (60_000_000.0 / bpm).round().clamp(1.0, f64::from(0x00FF_FFFF)) as u32;
        conductor.push((click, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros)))));
    }
    smf.tracks.push(into_track(conductor));

    for t in 0..snapshot.n_tracks() {
        let is_drum = snapshot.is_drum(t);
        let channel = u4::new(channel_for(t, is_drum));
        let program = (snapshot.program(t) % 128) as u8;

        let mut events: Vec<(u32, TrackEventKind<'static>)> = vec![(
            0,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(program),
                },
            },
        )];

        let notes = snapshot.track_notes(t);
        // Offs go in first so a note ending where another starts is released
        // before the re-attack.
        for note in &notes {
            events.push((
                note.end,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(note.pitch),
                        vel: u7::new(0),
                    },
                },
            ));
        }
        for note in &notes {
            events.push((
                note.start,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(note.pitch),
                        vel: u7::new(note.velocity.clamp(1, 127)),
                    },
                },
            ));
        }

        smf.tracks.push(into_track(events));
    }

    smf
}

/// Notes decoded from one MIDI track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MidiTrackNotes {
    pub program: Option<u8>,
    pub is_drum: bool,
    pub notes: Vec<SongNote>,
}

/// Note content of a MIDI file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiNotes {
    pub ticks_per_quarter: u16,
    /// Tracks that carry at least one note, in file order.
    pub tracks: Vec<MidiTrackNotes>,
}

impl MidiNotes {
    /// Every note of every track, ordered by (start, pitch).
    pub fn all_notes(&self) -> Vec<SongNote> {
        let mut notes: Vec<SongNote> = self.tracks.iter().flat_map(|t| t.notes.iter().copied()).collect();
        notes.sort_by_key(|n| (n.start, n.pitch));
        notes
    }
}

/// Pair note-ons with note-offs per track. A note-on with velocity 0 counts as
/// a note-off; notes still sounding at the end of a track are dropped.
pub fn read_midi_notes(bytes: &[u8]) -> Result<MidiNotes, SongError> {
    let smf = Smf::parse(bytes)?;
    let Timing::Metrical(tpq) = smf.header.timing else {
        return Err(SongError::UnsupportedTiming);
    };

    let mut tracks = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u32;
        let mut open: HashMap<(u8, u8), (u32, u8)> = HashMap::new();
        let mut out = MidiTrackNotes::default();

        for event in track {
            tick = tick.saturating_add(event.delta.as_int());
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            if channel == DRUM_CHANNEL {
                out.is_drum = true;
            }
            match message {
                MidiMessage::ProgramChange { program } => out.program = Some(program.as_int()),
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.insert((channel, key.as_int()), (tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some((start, velocity)) = open.remove(&(channel, key.as_int()))
                        && tick > start
                    {
                        out.notes.push(SongNote {
                            pitch: key.as_int(),
                            start,
                            end: tick,
                            velocity,
                        });
                    }
                }
                _ => {}
            }
        }

        if !out.notes.is_empty() {
            out.notes.sort_by_key(|n| (n.start, n.pitch));
            tracks.push(out);
        }
    }

    Ok(MidiNotes {
        ticks_per_quarter: tpq.as_int(),
        tracks,
    })
}
