use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::Env;
use tally_engine::game::{Game, GameSnapshot, PlayState};
use tally_engine::serialization::{read_snapshot_from_path, SNAPSHOT_EXTENSION};
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(name = "inspect", about = "Verify .tally snapshots and replay their histories")]
struct Args {
    /// A single .tally file or a directory containing them
    input: PathBuf,

    /// Recursive directory traversal (default: true for directories)
    #[arg(long)]
    recursive: Option<bool>,

    /// Print the board and history of every snapshot
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct Tally {
    ok: usize,
    unreadable: usize,
    diverged: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let files = if args.input.is_file() {
        vec![args.input.clone()]
    } else if args.input.is_dir() {
        collect_snapshots(&args.input, args.recursive.unwrap_or(true))
    } else {
        anyhow::bail!("Input path '{}' is neither a file nor directory", args.input.display());
    };
    if files.is_empty() {
        println!("No .{SNAPSHOT_EXTENSION} files found in {}", args.input.display());
        return Ok(());
    }

    let mut tally = Tally::default();
    for path in &files {
        let snapshot = match read_snapshot_from_path(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("✗ {}: {e}", path.display());
                tally.unreadable += 1;
                continue;
            }
        };
        match check(&snapshot) {
            Ok(game) => {
                tally.ok += 1;
                println!(
                    "✓ {}: {} | {:?} | moves {} | score {}",
                    path.display(),
                    display_name(&game),
                    game.play_state(),
                    game.moves(),
                    game.score()
                );
                if args.verbose {
                    let history = game.history().describe().unwrap_or_else(|e| format!("<{e}>"));
                    println!("{}\nhistory: {history}", game.board());
                }
            }
            Err(e) => {
                eprintln!("✗ {}: {e:#}", path.display());
                tally.diverged += 1;
            }
        }
    }

    println!(
        "\nChecked {} files: {} ok, {} unreadable, {} diverged on replay",
        files.len(),
        tally.ok,
        tally.unreadable,
        tally.diverged
    );
    if tally.unreadable + tally.diverged > 0 {
        anyhow::bail!("{} snapshots failed verification", tally.unreadable + tally.diverged);
    }
    Ok(())
}

fn collect_snapshots(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive { WalkDir::new(dir) } else { WalkDir::new(dir).max_depth(1) };
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(SNAPSHOT_EXTENSION))
        .collect();
    files.sort();
    files
}

/// Restore the snapshot, then replay its history from the recorded start and
/// require the same cells, score and move count.
fn check(snapshot: &GameSnapshot) -> anyhow::Result<Game> {
    let game = Game::restore(snapshot)?;
    let instructions = game.history().all()?;

    let start = GameSnapshot {
        cells: snapshot.start_cells.clone(),
        score: snapshot.start_score,
        moves: snapshot.start_moves,
        seed: snapshot.start_seed,
        state: snapshot.start_state,
        play_state: PlayState::Current,
        history: Vec::new(),
        ..snapshot.clone()
    };
    let mut replay = Game::restore(&start)?;
    for (n, instruction) in instructions.iter().enumerate() {
        replay
            .instruct(instruction)
            .map_err(|e| anyhow::anyhow!("instruction {} ({instruction}) failed: {e}", n + 1))?;
    }

    if replay.cells() != game.cells() {
        anyhow::bail!("replayed cells differ from the stored board");
    }
    if replay.score() != game.score() || replay.moves() != game.moves() {
        anyhow::bail!(
            "replay reached score {} in {} moves, stored {} in {}",
            replay.score(),
            replay.moves(),
            game.score(),
            game.moves()
        );
    }
    Ok(game)
}

fn display_name(game: &Game) -> &str {
    if game.name().is_empty() {
        game.id()
    } else {
        game.name()
    }
}
