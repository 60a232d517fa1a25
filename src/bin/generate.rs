use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use tally_engine::generator::{GameGenerator, GeneratorOptions, SolvableGame, TargetCellGenerator, TargetCellOptions};
use tally_engine::serialization::{write_snapshot_to_path, SNAPSHOT_EXTENSION};
use tally_engine::solver::SolveOptions;
use tally_engine::stats::SolutionStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    /// Random boards, kept when the solver wins them
    Randomized,
    /// Boards built around the halving chain of the target cell
    Reverse,
}

#[derive(Debug, Parser)]
#[command(name = "generate", about = "Generate solvable boards into a directory of .tally snapshots")]
struct Args {
    /// Output directory for generated boards
    #[arg(long)]
    out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Algorithm::Randomized)]
    algorithm: Algorithm,

    /// Stop after this many boards
    #[arg(long, default_value_t = 10)]
    games: usize,

    #[arg(long, default_value_t = 5)]
    rows: usize,

    #[arg(long, default_value_t = 5)]
    columns: usize,

    #[arg(long, default_value_t = 48)]
    target_cell: u64,

    #[arg(long, default_value_t = 1)]
    min_moves: u64,

    #[arg(long, default_value_t = 6)]
    max_moves: u64,

    /// Fewest filled cells on a randomized board
    #[arg(long, default_value_t = 0)]
    min_cells: usize,

    /// Most filled cells on a randomized board; 0 fills up to the board size
    #[arg(long, default_value_t = 0)]
    max_cells: usize,

    /// Randomized candidates to try before giving up
    #[arg(long, default_value_t = 1_000_000)]
    max_iterations: u64,

    /// Worker threads; 0 uses one per core
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Milliseconds the solver may spend on one candidate
    #[arg(long, default_value_t = 100)]
    solve_ms: u64,

    #[arg(long)]
    seed: Option<u64>,

    /// Maximum total MB allowed in out_dir
    #[arg(long, default_value_t = 100.0)]
    max_mb: f64,

    /// Suppress the spinner status line
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    fs::create_dir_all(&args.out_dir)?;
    let max_bytes = if args.max_mb.is_finite() && args.max_mb > 0.0 { (args.max_mb * 1e6) as u64 } else { 100_000_000 };
    let seed = args.seed.unwrap_or_else(rand::random);

    let pb = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | Boards: {pos} | {msg}")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };
    let mut writer = Writer { dir: &args.out_dir, written: 0, bytes: directory_size_bytes(&args.out_dir)?, max_bytes };

    match args.algorithm {
        Algorithm::Randomized => run_randomized(&args, seed, &mut writer, pb.as_ref())?,
        Algorithm::Reverse => run_reverse(&args, seed, &mut writer, pb.as_ref())?,
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    eprintln!("Generator stopped. Boards: {}, Size: {:.2} MB", writer.written, writer.bytes as f64 / 1e6);
    Ok(())
}

fn run_randomized(args: &Args, seed: u64, writer: &mut Writer<'_>, pb: Option<&ProgressBar>) -> anyhow::Result<()> {
    let generator = GameGenerator::new(GeneratorOptions {
        rows: args.rows,
        columns: args.columns,
        target_cell_value: args.target_cell,
        min_cells: args.min_cells,
        max_cells: args.max_cells,
        min_moves: args.min_moves,
        max_moves: args.max_moves,
        max_iterations: args.max_iterations,
        concurrency: args.threads,
        min_games: args.games,
        seed,
        solve: SolveOptions { max_time: Duration::from_millis(args.solve_ms), ..SolveOptions::default() },
        ..GeneratorOptions::default()
    })?;
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<SolvableGame>();

    thread::scope(|s| -> anyhow::Result<()> {
        let worker = s.spawn(|| generator.generate(&tx, &stop));
        let written = drain(&rx, &worker, writer, &stop, |writer| {
            if let Some(pb) = pb {
                let p = generator.progress();
                pb.set_position(writer.written);
                pb.set_message(format!(
                    "attempts: {} | dup: {} | skipped: {} | unsolved: {} | {:.2} MB",
                    p.attempts,
                    p.duplicates,
                    p.skipped,
                    p.unsolved,
                    writer.bytes as f64 / 1e6
                ));
            }
        });
        stop.store(true, Ordering::Relaxed);
        let report = worker.join().map_err(|_| anyhow::anyhow!("generator thread panicked"))??;
        log::info!("randomized generation: {report:?}");
        written
    })
}

/// Write boards as they arrive until the worker finishes or the size cap is hit.
fn drain<T>(
    rx: &Receiver<SolvableGame>,
    worker: &ScopedJoinHandle<'_, T>,
    writer: &mut Writer<'_>,
    stop: &AtomicBool,
    mut status: impl FnMut(&Writer<'_>),
) -> anyhow::Result<()> {
    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(solvable) => {
                if !writer.write(&solvable)? {
                    stop.store(true, Ordering::Relaxed);
                }
            }
            Err(RecvTimeoutError::Timeout) if worker.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        status(writer);
    }
    // Boards sent between the last receive and the worker exiting.
    for solvable in rx.try_iter() {
        if !writer.write(&solvable)? {
            break;
        }
    }
    Ok(())
}

fn run_reverse(args: &Args, seed: u64, writer: &mut Writer<'_>, pb: Option<&ProgressBar>) -> anyhow::Result<()> {
    let generator = TargetCellGenerator::new(TargetCellOptions {
        target_cell: args.target_cell,
        rows: args.rows,
        columns: args.columns,
        max_cells: args.max_cells,
        min_moves: args.min_moves,
        max_moves: args.max_moves,
        seed,
        solve_time: Duration::from_millis(args.solve_ms),
        ..TargetCellOptions::default()
    })?;
    while (writer.written as usize) < args.games {
        let solvable = generator.generate_game()?;
        if !writer.write(&solvable)? {
            break;
        }
        if let Some(pb) = pb {
            pb.set_position(writer.written);
            pb.set_message(format!("{:.2} MB", writer.bytes as f64 / 1e6));
        }
    }
    Ok(())
}

struct Writer<'a> {
    dir: &'a Path,
    written: u64,
    bytes: u64,
    max_bytes: u64,
}

impl Writer<'_> {
    /// Write one board. Returns false once the size cap is reached.
    fn write(&mut self, solvable: &SolvableGame) -> anyhow::Result<bool> {
        if self.bytes >= self.max_bytes {
            return Ok(false);
        }
        let stats = SolutionStats::new(&solvable.game, &solvable.solutions)?;
        let mut snapshot = solvable.game.snapshot();
        if let Some(best) = solvable.solutions.iter().min_by_key(|s| s.moves()) {
            snapshot.description = format!(
                "Solvable in {} moves (max score {}): {}",
                stats.ideal_moves,
                stats.max_score,
                best.describe()
            );
        }
        let path = autoname(self.dir, stats.ideal_moves, &solvable.game.board().hash().digest());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_snapshot_to_path(&path, &snapshot)?;
        self.written += 1;
        self.bytes = self.bytes.saturating_add(fs::metadata(&path)?.len());
        Ok(self.bytes < self.max_bytes)
    }
}

fn autoname(dir: &Path, ideal_moves: usize, digest: &str) -> PathBuf {
    // shard by ideal move count
    let short = digest.get(..16).unwrap_or(digest);
    dir.join(format!("m{ideal_moves:02}")).join(format!("board-{short}.{SNAPSHOT_EXTENSION}"))
}

fn directory_size_bytes(dir: &Path) -> anyhow::Result<u64> {
    let mut total = 0u64;
    if !dir.exists() {
        return Ok(0);
    }
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(md) = entry.metadata() {
                total = total.saturating_add(md.len());
            }
        }
    }
    Ok(total)
}
