//! tally-engine: a grid number puzzle engine with solvers and a generator
//!
//! This crate provides:
//! - `Board` with swipes, neighbour tables and sum/product combine paths
//! - `Game` state transitions with a bit-packed history (`history`) and undo by replay
//! - Exhaustive hints (`hints`), breadth- and depth-first solvers (`solver`)
//! - A rayon-backed board generator (`generator`) with board statistics (`stats`)
//! - Persistence formats (`serialization`), a storage seam (`store`) and the
//!   session-level operations a transport wraps (`service`)
//!
//! Quick start:
//! ```
//! use tally_engine::game::{Game, GameOptions};
//! use tally_engine::solver::{BreadthFirstSolver, Solver};
//! use tally_engine::template::tutorial_games;
//!
//! // The first tutorial: reach 36 on a 3x3 board
//! let mut game = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
//! game.combine(&[2, 5, 8]).unwrap(); // 5 + 4 = 9
//! game.combine(&[6, 7, 8]).unwrap(); // 3 * 6 = 18
//! assert!(game.is_won());
//! assert_eq!(game.history().describe().unwrap(), "2,5,8;6,7,8;");
//!
//! // The solver finds the same two-move line
//! let fresh = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
//! let solutions = BreadthFirstSolver::new().solve(&fresh).unwrap();
//! assert_eq!(solutions[0].moves(), 2);
//! ```
//!
pub mod board;
pub mod cell;
pub mod cellgen;
pub mod factors;
pub mod game;
pub mod generator;
pub mod goal;
pub mod hints;
pub mod history;
pub mod randomizer;
pub mod rating;
pub mod rules;
pub mod serialization;
pub mod service;
pub mod solver;
pub mod stats;
pub mod store;
pub mod template;
pub mod weightmap;
