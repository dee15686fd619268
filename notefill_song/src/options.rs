// Generation options: global sampling settings and per-track controls.
//
// These mirror the host's option panels. Every field has a default so a
// partial JSON object (or none at all) is valid. A negative track temperature
// means "use the global temperature"; negative attribute levels mean "no
// control".

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
    pub temperature: f64,
    pub tracks_per_step: u32,
    pub bars_per_step: u32,
    pub model_dim: u32,
    pub percentage: u32,
    pub max_steps: u32,
    pub batch_size: u32,
    pub shuffle: bool,
    pub sampling_seed: i64,
    pub mask_top_k: u32,
    pub polyphony_hard_limit: u32,
    pub verbose: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            tracks_per_step: 1,
            bars_per_step: 1,
            model_dim: 4,
            percentage: 100,
            max_steps: 200,
            batch_size: 1,
            shuffle: true,
            sampling_seed: -1,
            mask_top_k: 0,
            polyphony_hard_limit: 6,
            verbose: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackOptions {
    /// Negative means the global temperature applies.
    pub temperature: f64,
    /// MIDI program used to pick the model's instrument name.
    pub instrument: u32,
    pub density: u32,
    pub track_type: u32,
    pub ignore: bool,
    /// 0 means unconstrained.
    pub min_polyphony: u32,
    /// 0 means unconstrained.
    pub max_polyphony: u32,
    pub autoregressive: bool,
    pub polyphony_hard_limit: u32,

    pub vert_density: i32,
    pub n_pitch_classes: i32,
    pub horiz_density: i32,
    pub rhythm: i32,
    pub step_bin: i32,
    pub leap_bin: i32,
    pub low_note_strict: i32,
    pub high_note_strict: i32,
    pub low_note_loose: i32,
    pub high_note_loose: i32,
    /// Control strings from the host, sent ahead of the derived ones.
    pub controls: Vec<String>,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            temperature: -1.0,
            instrument: 0,
            density: 10,
            track_type: 10,
            ignore: false,
            min_polyphony: 0,
            max_polyphony: 0,
            autoregressive: false,
            polyphony_hard_limit: 9,
            vert_density: -1,
            n_pitch_classes: -1,
            horiz_density: -1,
            rhythm: -1,
            step_bin: -1,
            leap_bin: -1,
            low_note_strict: -1,
            high_note_strict: -1,
            low_note_loose: -1,
            high_note_loose: -1,
            controls: Vec::new(),
        }
    }
}

impl TrackOptions {
    pub fn resolved_temperature(&self, global: &GlobalOptions) -> f64 {
        if self.temperature >= 0.0 {
            self.temperature
        } else {
            global.temperature
        }
    }
}

const INSTRUMENT_NAMES: &[(u32, &str)] = &[
    (0, "acoustic_grand_piano"),
    (1, "bright_acoustic_piano"),
    (4, "electric_piano_1"),
    (5, "electric_piano_2"),
    (24, "acoustic_guitar_nylon"),
    (25, "acoustic_guitar_steel"),
    (26, "electric_guitar_jazz"),
    (27, "electric_guitar_clean"),
    (32, "acoustic_bass"),
    (33, "electric_bass_finger"),
    (40, "violin"),
    (41, "viola"),
    (42, "cello"),
    (48, "string_ensemble_1"),
    (56, "trumpet"),
    (60, "french_horn"),
    (64, "soprano_sax"),
    (65, "alto_sax"),
    (66, "tenor_sax"),
    (67, "baritone_sax"),
    (72, "piccolo"),
    (73, "flute"),
    (80, "lead_1_square"),
];

/// Model instrument name for a MIDI program. Unknown programs map to the
/// grand piano.
pub fn instrument_name(program: u32) -> &'static str {
    INSTRUMENT_NAMES
        .iter()
        .find(|(p, _)| *p == program)
        .map_or(INSTRUMENT_NAMES[0].1, |&(_, name)| name)
}

/// Polyphony quantile label: 0 is unconstrained.
pub fn polyphony_level(n: u32) -> String {
    if n == 0 {
        "POLYPHONY_ANY".to_string()
    } else {
        format!("POLYPHONY_{n}")
    }
}

/// Attribute-control strings for a track: the host's own strings first, then
/// the attribute levels in the model's fixed order. Levels below zero are
/// omitted, as are repeats.
pub fn attribute_controls(opts: &TrackOptions) -> Vec<String> {
    let derived = [
        ("VERT", opts.vert_density),
        ("PITCH_CLASS", opts.n_pitch_classes),
        ("HORIZ", opts.horiz_density),
        ("RHYTHM", opts.rhythm),
        ("STEP", opts.step_bin),
        ("LEAP", opts.leap_bin),
        ("LOW_NOTE_STRICT", opts.low_note_strict),
        ("HIGH_NOTE_STRICT", opts.high_note_strict),
        ("LOW_NOTE_LOOSE", opts.low_note_loose),
        ("HIGH_NOTE_LOOSE", opts.high_note_loose),
    ]
    .into_iter()
    .filter(|(_, level)| *level >= 0)
    .map(|(name, level)| format!("{name}_{level}"));

    let mut out: Vec<String> = Vec::new();
    for control in opts.controls.iter().cloned().chain(derived) {
        if !out.contains(&control) {
            out.push(control);
        }
    }
    out
}
