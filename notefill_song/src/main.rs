// Song snapshot converter: CLI entry point.
//
// Reads a host song snapshot (the JSON save dictionary) and writes it as a
// Standard MIDI File, optionally also dumping the model piece JSON. Useful
// for inspecting what the upstream service will be sent.
//
// Usage:
//   cargo run -p notefill_song -- snapshot.json [output.mid] [--piece piece.json]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use notefill_song::midi::write_midi;
use notefill_song::piece::Piece;
use notefill_song::snapshot::SongSnapshot;

#[derive(Parser, Debug)]
#[command(about = "Convert a host song snapshot to MIDI")]
struct Args {
    /// Snapshot JSON file.
    snapshot: PathBuf,

    /// Output MIDI path.
    #[arg(default_value = "snapshot.mid")]
    output: PathBuf,

    /// Also write the model piece JSON here.
    #[arg(long)]
    piece: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let json = std::fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading {}", args.snapshot.display()))?;
    let snapshot = SongSnapshot::from_json(&json)
        .with_context(|| format!("parsing {}", args.snapshot.display()))?;

    println!("Tracks: {}", snapshot.n_tracks());
    println!("Measures: {}", snapshot.n_measures());
    println!("Clicks per quarter: {}", snapshot.cpq);

    write_midi(&snapshot, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("wrote {}", args.output.display());

    if let Some(path) = &args.piece {
        let piece = Piece::from_snapshot(&snapshot);
        std::fs::write(path, serde_json::to_string_pretty(&piece)?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {} ({} notes)", path.display(), piece.note_count());
    }

    Ok(())
}
