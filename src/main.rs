use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use tally_engine::game::{Game, GameOptions};
use tally_engine::solver::{BreadthFirstSolver, DepthFirstSolver, SolveOptions, Solver};
use tally_engine::template::{challenge_games, template_by_id};

#[derive(Debug, Parser)]
#[command(name = "tally-engine", about = "Solve a built-in board and print each step")]
struct Args {
    /// Template id; defaults to the daily challenge
    #[arg(long)]
    template: Option<String>,

    /// Search depth-first instead of breadth-first
    #[arg(long)]
    depth_first: bool,

    /// Seconds the solver may run
    #[arg(long, default_value_t = 60)]
    max_time: u64,

    #[arg(long, default_value_t = 100_000)]
    max_visits: usize,

    /// Print every solution found, not just the shortest
    #[arg(long)]
    all: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let template = match &args.template {
        Some(id) => template_by_id(id).with_context(|| format!("no built-in template named {id:?}"))?,
        None => challenge_games().first().context("no challenges are built in")?,
    };
    let game = Game::from_template(template, GameOptions::seeded(1))?;
    println!("{} ({})\n{}\n{}", template.name, template.id, template.description, game.board());

    let options = SolveOptions {
        max_moves: game.rules().max_moves,
        max_visits: args.max_visits,
        max_time: Duration::from_secs(args.max_time),
        max_solutions: if args.all { 0 } else { 1 },
        ..SolveOptions::default()
    };
    let mut solver: Box<dyn Solver> = if args.depth_first {
        Box::new(DepthFirstSolver::with_options(options))
    } else {
        Box::new(BreadthFirstSolver::with_options(options))
    };
    let mut solutions = solver.solve(&game)?;
    let stats = solver.last_stats();
    println!(
        "Solutions: {} | visits: {} | deepest: {} | elapsed: {:.2?}",
        solutions.len(),
        stats.visits,
        stats.deepest,
        stats.elapsed
    );
    solutions.sort_by_key(|s| s.moves());
    let shown = if args.all { solutions.len() } else { solutions.len().min(1) };

    for (n, solution) in solutions.iter().take(shown).enumerate() {
        println!("\n#{} in {} moves, score {}: {}", n + 1, solution.moves(), solution.score(), solution.describe());
        let mut replay = game.clone();
        for (step, instruction) in solution.instructions.iter().enumerate() {
            let description = replay.describe_instruction(instruction);
            replay.instruct(instruction)?;
            println!("{:>3}. {description}\n{}", step + 1, replay.board());
        }
    }
    Ok(())
}
