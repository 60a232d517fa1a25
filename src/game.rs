use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardError, Direction, Evaluation, PathError};
use crate::cell::Cell;
use crate::cellgen::CellGenerator;
use crate::goal::GoalChecker;
use crate::hints::{self, Hint};
use crate::history::{CompactHistory, Helper, HistoryError, Instruction};
use crate::randomizer::{Randomizer, SeededRandomizer};
use crate::rules::{RuleMode, Rules, RulesError};
use crate::template::{goal_for, GameTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayState {
    Current,
    Won,
    Lost,
    Abandoned,
}

#[derive(thiserror::Error, Debug)]
pub enum GameError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("replaying {instruction} did not change the board")]
    Replay { instruction: Instruction },
}

/// Seed and stream position for a new game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameOptions {
    /// `None` seeds from entropy.
    pub seed: Option<u64>,
    pub state: u64,
}

impl GameOptions {
    pub fn seeded(seed: u64) -> Self { GameOptions { seed: Some(seed), state: 0 } }
}

/// Position the game started from. Undo and restart replay from here.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Start {
    board: Board,
    score: i64,
    moves: u64,
    seed: u64,
    state: u64,
}

/// Serializable state of a game, including where it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rules: Rules,
    pub cells: Vec<Cell>,
    pub score: i64,
    pub moves: u64,
    pub seed: u64,
    pub state: u64,
    pub play_state: PlayState,
    pub history: Vec<u8>,
    pub start_cells: Vec<Cell>,
    pub start_score: i64,
    pub start_moves: u64,
    pub start_seed: u64,
    pub start_state: u64,
}

/// A game in progress.
#[derive(Debug, Clone)]
pub struct Game {
    id: String,
    name: String,
    description: String,
    rules: Rules,
    board: Board,
    selection: Vec<usize>,
    score: i64,
    moves: u64,
    history: CompactHistory,
    randomizer: SeededRandomizer,
    cell_generator: Arc<CellGenerator>,
    goal: GoalChecker,
    defeat: GoalChecker,
    play_state: PlayState,
    start: Start,
}

pub fn new_id() -> String { format!("{:016x}", rand::random::<u64>()) }

impl Game {
    /// Start a game from explicit rules, board and goal.
    pub fn from_parts(rules: Rules, board: Board, goal: GoalChecker, options: GameOptions) -> Result<Self, GameError> {
        rules.validate()?;
        let board = board.with_options(rules.evaluate_options());
        let randomizer = match options.seed {
            Some(seed) => SeededRandomizer::with_state(seed, options.state),
            None => SeededRandomizer::from_entropy(),
        };
        let (seed, state) = randomizer.seed();
        let history = CompactHistory::new(board.rows(), board.columns())?;
        let mut game = Game {
            id: new_id(),
            name: String::new(),
            description: rules.description.clone(),
            rules,
            start: Start { board: board.clone(), score: 0, moves: 0, seed, state },
            board,
            selection: Vec::new(),
            score: 0,
            moves: 0,
            history,
            randomizer,
            cell_generator: Arc::new(CellGenerator::default()),
            goal,
            defeat: GoalChecker::NoMoreMoves,
            play_state: PlayState::Current,
        };
        game.update_play_state();
        Ok(game)
    }

    /// An endless game on an empty board seeded with the rules' starting cells.
    pub fn new_infinite(mode: RuleMode, options: GameOptions) -> Result<Self, GameError> {
        let rules = Rules::infinite(mode);
        let board = Board::new(rules.rows as usize, rules.columns as usize);
        let mut game = Self::from_parts(rules, board, GoalChecker::RunsForever, options)?;
        game.description = "Default game, 5x5".to_string();
        for _ in 0..game.rules.starting_cells {
            game.refill();
        }
        game.mark_start();
        game.update_play_state();
        Ok(game)
    }

    pub fn from_template(template: &GameTemplate, options: GameOptions) -> Result<Self, GameError> {
        let mut game = Self::from_parts(template.rules.clone(), template.board()?, template.goal(), options)?;
        game.name = template.name.clone();
        game.description = template.description.clone();
        Ok(game)
    }

    /// Rebuild a game from a snapshot, history included.
    pub fn restore(snapshot: &GameSnapshot) -> Result<Self, GameError> {
        let rules = snapshot.rules.clone();
        let (rows, columns) = (rules.rows as usize, rules.columns as usize);
        let options = rules.evaluate_options();
        let goal = goal_for(&rules);
        let start_board = Board::from_cells(rows, columns, snapshot.start_cells.clone())?.with_options(options);
        let mut game = Self::from_parts(rules, start_board.clone(), goal, GameOptions::default())?;
        game.id = snapshot.id.clone();
        game.name = snapshot.name.clone();
        game.description = snapshot.description.clone();
        game.start = Start {
            board: start_board,
            score: snapshot.start_score,
            moves: snapshot.start_moves,
            seed: snapshot.start_seed,
            state: snapshot.start_state,
        };
        game.board = Board::from_cells(rows, columns, snapshot.cells.clone())?.with_options(options);
        game.score = snapshot.score;
        game.moves = snapshot.moves;
        game.randomizer.set_seed(snapshot.seed, snapshot.state);
        game.history = CompactHistory::from_bytes(rows, columns, snapshot.history.clone())?;
        game.play_state = snapshot.play_state;
        Ok(game)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let (seed, state) = self.randomizer.seed();
        GameSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            rules: self.rules.clone(),
            cells: self.board.cells().to_vec(),
            score: self.score,
            moves: self.moves,
            seed,
            state,
            play_state: self.play_state,
            history: self.history.bytes().to_vec(),
            start_cells: self.start.board.cells().to_vec(),
            start_score: self.start.score,
            start_moves: self.start.moves,
            start_seed: self.start.seed,
            start_state: self.start.state,
        }
    }

    #[inline]
    pub fn id(&self) -> &str { &self.id }
    #[inline]
    pub fn name(&self) -> &str { &self.name }
    #[inline]
    pub fn description(&self) -> &str { &self.description }
    #[inline]
    pub fn rules(&self) -> &Rules { &self.rules }
    #[inline]
    pub fn board(&self) -> &Board { &self.board }
    #[inline]
    pub fn cells(&self) -> &[Cell] { self.board.cells() }
    #[inline]
    pub fn score(&self) -> i64 { self.score }
    #[inline]
    pub fn moves(&self) -> u64 { self.moves }
    #[inline]
    pub fn history(&self) -> &CompactHistory { &self.history }
    #[inline]
    pub fn selection(&self) -> &[usize] { &self.selection }
    #[inline]
    pub fn play_state(&self) -> PlayState { self.play_state }
    #[inline]
    pub fn goal(&self) -> &GoalChecker { &self.goal }
    #[inline]
    pub fn seed(&self) -> (u64, u64) { self.randomizer.seed() }
    #[inline]
    pub fn is_won(&self) -> bool { self.play_state == PlayState::Won }
    #[inline]
    pub fn is_lost(&self) -> bool { self.play_state == PlayState::Lost }

    pub fn set_id(&mut self, id: impl Into<String>) { self.id = id.into(); }

    pub fn abandon(&mut self) { self.play_state = PlayState::Abandoned; }

    /// Swipe the board. Returns whether the move was taken.
    ///
    /// With `no_reswipe`, a swipe equal or opposite to the previous instruction
    /// is rejected. A swipe that changes nothing does not count as a move.
    pub fn swipe(&mut self, dir: Direction) -> bool {
        if self.rules.no_reswipe {
            if let Some(Instruction::Swipe(last)) = self.history.last() {
                if last == dir || last == dir.opposite() {
                    return false;
                }
            }
        }
        self.apply_swipe(dir)
    }

    fn apply_swipe(&mut self, dir: Direction) -> bool {
        if !self.board.swipe(dir) {
            return false;
        }
        self.selection.clear();
        if self.rules.recreate_on_swipe {
            self.refill();
        }
        self.moves += 1;
        self.history.add_swipe(dir);
        self.update_play_state();
        true
    }

    fn refill(&mut self) {
        if let Some((index, cell)) = self.cell_generator.generate(&self.board, &self.randomizer) {
            if let Err(err) = self.board.add_cell(index, cell, false) {
                log::warn!("refill of cell {index} failed: {err}");
            }
        }
    }

    /// Combine along `path`; the last index is the target.
    pub fn combine(&mut self, path: &[usize]) -> Result<Evaluation, GameError> {
        self.board.evaluates_to(path)?;
        self.history.add_path(path)?;
        let eval = self.board.combine(path)?;
        self.score = self.score.saturating_add(eval.value.saturating_mul(2));
        self.moves += 1;
        self.selection.clear();
        self.update_play_state();
        Ok(eval)
    }

    /// Extend the selection with `index`. Selecting the last selected cell
    /// again removes it. Returns whether the selection changed.
    pub fn select_cell(&mut self, index: usize) -> bool {
        if self.selection.last() == Some(&index) {
            self.selection.pop();
            return true;
        }
        if self.selection.contains(&index) || self.board.get(index).map_or(true, |c| c.is_empty()) {
            return false;
        }
        if let Some(&last) = self.selection.last() {
            if !self.board.are_neighbours(last, index) {
                return false;
            }
        }
        self.selection.push(index);
        true
    }

    pub fn clear_selection(&mut self) { self.selection.clear(); }

    /// Combine the current selection.
    pub fn evaluate_selection(&mut self) -> Result<Evaluation, GameError> {
        let path = self.selection.clone();
        self.combine(&path)
    }

    pub fn can_undo(&self) -> bool { self.moves > 0 && self.history.can_undo() }

    /// Step back one instruction by replaying the history from the start.
    pub fn undo(&mut self) -> Result<(), GameError> {
        if self.moves == 0 {
            return Err(GameError::NothingToUndo);
        }
        let replay = self.history.filter_for_undo().map_err(|err| match err {
            HistoryError::NothingToUndo => GameError::NothingToUndo,
            other => other.into(),
        })?;
        let mut fresh = self.clone();
        fresh.reset_to_start()?;
        for instruction in &replay {
            fresh.replay(instruction)?;
        }
        let mut history = self.history.clone();
        history.add_undo();
        fresh.history = history;
        fresh.moves = self.moves;
        if fresh.play_state != PlayState::Abandoned {
            fresh.play_state = PlayState::Current;
            fresh.update_play_state();
        }
        log::debug!("undo on game {} replayed {} instructions", self.id, replay.len());
        *self = fresh;
        Ok(())
    }

    /// Back to the starting position with an empty history.
    pub fn restart(&mut self) -> Result<(), GameError> {
        self.reset_to_start()?;
        self.play_state = PlayState::Current;
        self.update_play_state();
        Ok(())
    }

    fn reset_to_start(&mut self) -> Result<(), GameError> {
        self.board = self.start.board.clone();
        self.score = self.start.score;
        self.moves = self.start.moves;
        self.selection.clear();
        self.randomizer.set_seed(self.start.seed, self.start.state);
        self.history = CompactHistory::new(self.board.rows(), self.board.columns())?;
        Ok(())
    }

    fn mark_start(&mut self) {
        let (seed, state) = self.randomizer.seed();
        self.start = Start { board: self.board.clone(), score: self.score, moves: self.moves, seed, state };
    }

    fn replay(&mut self, instruction: &Instruction) -> Result<(), GameError> {
        match instruction {
            Instruction::Swipe(d) => {
                if !self.apply_swipe(*d) {
                    return Err(GameError::Replay { instruction: instruction.clone() });
                }
            }
            Instruction::Combine(path) => {
                self.combine(path)?;
            }
            Instruction::Helper(h) => self.history.add_helper(*h),
        }
        Ok(())
    }

    /// Apply one instruction as a player would.
    pub fn instruct(&mut self, instruction: &Instruction) -> Result<bool, GameError> {
        match instruction {
            Instruction::Swipe(d) => Ok(self.swipe(*d)),
            Instruction::Combine(path) => self.combine(path).map(|_| true),
            Instruction::Helper(Helper::Undo) => self.undo().map(|_| true),
            Instruction::Helper(h) => {
                self.history.add_helper(*h);
                Ok(true)
            }
        }
    }

    /// Every combine available on the current board.
    pub fn hints(&self) -> Vec<Hint> { hints::get_hints(&self.board) }

    /// Record that the player asked for a hint.
    pub fn record_hint(&mut self) { self.history.add_hint(); }

    pub fn describe_instruction(&self, instruction: &Instruction) -> String {
        match instruction {
            Instruction::Swipe(d) => format!("Swipe {d:?}"),
            Instruction::Combine(path) => {
                format!("Combine {} ({})", self.board.describe_path(path), instruction.to_string().trim_end_matches(';'))
            }
            Instruction::Helper(h) => format!("Helper {h:?}"),
        }
    }

    fn update_play_state(&mut self) {
        if self.play_state == PlayState::Abandoned {
            return;
        }
        self.play_state = if self.goal.check(&self.board, self.score) {
            PlayState::Won
        } else if self.rules.max_moves > 0 && self.moves >= self.rules.max_moves {
            PlayState::Lost
        } else if self.defeat.check(&self.board, self.score) {
            PlayState::Lost
        } else {
            PlayState::Current
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::parse_describe;
    use crate::template::{challenge_games, template_by_id, tutorial_games};

    fn daily() -> Game {
        Game::from_template(&challenge_games()[0], GameOptions::seeded(1)).unwrap()
    }

    fn sum_and_product() -> Game {
        Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap()
    }

    /// `(x, y)` pairs to indexes on a 5-wide board.
    fn at(coords: &[(usize, usize)]) -> Vec<usize> { coords.iter().map(|&(x, y)| y * 5 + x).collect() }

    #[test]
    fn it_wins_the_tutorial_in_two_moves() {
        let mut g = sum_and_product();
        assert_eq!(g.play_state(), PlayState::Current);
        g.combine(&[2, 5, 8]).unwrap();
        assert_eq!(g.board().values(), vec![0, 0, 0, 0, 0, 0, 3, 6, 18]);
        assert_eq!(g.score(), 18);
        let e = g.combine(&[6, 7, 8]).unwrap();
        assert_eq!(e.method, crate::board::EvalMethod::Product);
        assert_eq!(g.board().get(8).unwrap().value(), 36);
        assert_eq!(g.score(), 18 + 36);
        assert_eq!(g.moves(), 2);
        assert!(g.is_won());
        assert_eq!(g.history().describe().unwrap(), "2,5,8;6,7,8;");
    }

    #[test]
    fn it_wins_the_daily_challenge() {
        let mut g = daily();
        for coords in [
            vec![(2, 1), (2, 2)],
            vec![(2, 2), (1, 2)],
            vec![(1, 1), (1, 2), (0, 2)],
            vec![(2, 3), (1, 3), (0, 3), (0, 4)],
        ] {
            for i in at(&coords) {
                assert!(g.select_cell(i), "select {i}");
            }
            g.evaluate_selection().unwrap();
        }
        assert_eq!(g.score(), 184);
        assert!(g.swipe(Direction::Left));
        g.combine(&[0, 5, 10]).unwrap();
        g.combine(&[6, 11]).unwrap();
        assert!(g.swipe(Direction::Down));
        assert_eq!(g.board().get(15).unwrap().value(), 256);
        assert_eq!(&g.board().values()[20..23], &[32, 4, 2]);
        g.combine(&[22, 21, 20, 15]).unwrap();
        assert_eq!(g.board().highest_value().0.value(), 512);
        assert_eq!(g.moves(), 9);
        assert_eq!(g.score(), 954);
        assert!(g.is_won());
    }

    #[test]
    fn failed_combine_changes_nothing() {
        let mut g = daily();
        let before = g.board().clone();
        assert!(matches!(g.combine(&[0, 1]), Err(GameError::Path(PathError::CellEmpty { .. }))));
        assert!(matches!(g.combine(&[1, 2]), Err(GameError::Path(PathError::ResultOvershot { .. }))));
        assert_eq!(g.board(), &before);
        assert_eq!(g.moves(), 0);
        assert!(g.history().is_empty());
    }

    #[test]
    fn unchanged_swipe_is_not_a_move() {
        let mut g = sum_and_product();
        assert!(!g.swipe(Direction::Right));
        assert!(!g.swipe(Direction::Down));
        assert_eq!(g.moves(), 0);
        assert!(g.history().is_empty());
        assert!(g.swipe(Direction::Up));
        assert_eq!(g.moves(), 1);
    }

    #[test]
    fn no_reswipe_rejects_same_and_opposite() {
        let mut rules = Rules::challenge(RuleMode::Tutorial, 3, 3, 0, 0);
        rules.no_reswipe = true;
        let board = Board::from_values(3, 3, &[1, 0, 0, 0, 2, 0, 0, 0, 3]).unwrap();
        let mut g = Game::from_parts(rules, board, GoalChecker::RunsForever, GameOptions::seeded(3)).unwrap();
        assert!(g.swipe(Direction::Left));
        assert!(!g.swipe(Direction::Right));
        assert!(!g.swipe(Direction::Left));
        assert!(g.swipe(Direction::Up));
        assert_eq!(g.moves(), 2);
    }

    #[test]
    fn recreate_on_swipe_adds_one_cell() {
        let mut g = Game::new_infinite(RuleMode::InfiniteNormal, GameOptions::seeded(5)).unwrap();
        assert_eq!(g.board().list_empty().len(), 20);
        let dir = Direction::ALL.into_iter().find(|&d| g.board().swipe_changes(d)).unwrap();
        let merged_before = g.board().cells().iter().filter(|c| !c.is_empty()).count();
        let preview = g.board().swipe_preview(dir);
        let after_swipe = preview.iter().filter(|c| !c.is_empty()).count();
        assert!(after_swipe <= merged_before);
        assert!(g.swipe(dir));
        assert_eq!(g.cells().iter().filter(|c| !c.is_empty()).count(), after_swipe + 1);
    }

    #[test]
    fn same_seed_same_game() {
        let a = Game::new_infinite(RuleMode::InfiniteEasy, GameOptions::seeded(77)).unwrap();
        let b = Game::new_infinite(RuleMode::InfiniteEasy, GameOptions::seeded(77)).unwrap();
        assert_eq!(a.board(), b.board());
        assert_eq!(a.seed(), b.seed());
    }

    #[test]
    fn it_undoes_one_step_at_a_time() {
        let mut g = sum_and_product();
        assert!(!g.can_undo());
        assert!(matches!(g.undo(), Err(GameError::NothingToUndo)));
        assert!(g.swipe(Direction::Up));
        let after_swipe = g.board().clone();
        assert_eq!(after_swipe.values(), vec![3, 6, 5, 0, 0, 4, 0, 0, 9]);
        g.combine(&[2, 5, 8]).unwrap();
        g.undo().unwrap();
        assert_eq!(g.board(), &after_swipe);
        g.undo().unwrap();
        assert_eq!(g.board().values(), vec![0, 0, 5, 0, 0, 4, 3, 6, 9]);
        assert_eq!(g.score(), 0);
        assert!(!g.can_undo());
        assert!(g.undo().is_err());
    }

    #[test]
    fn undo_restores_score_and_keeps_history() {
        let mut g = sum_and_product();
        g.combine(&[2, 5, 8]).unwrap();
        assert_eq!(g.score(), 18);
        g.undo().unwrap();
        assert_eq!(g.board().values(), vec![0, 0, 5, 0, 0, 4, 3, 6, 9]);
        assert_eq!(g.score(), 0);
        assert_eq!(g.moves(), 1);
        assert_eq!(g.history().describe().unwrap(), "2,5,8;Z;");
        assert!(!g.can_undo());
        g.combine(&[6, 7, 8]).unwrap();
        assert!(g.can_undo());
    }

    #[test]
    fn undo_replays_refills_deterministically() {
        let mut g = Game::new_infinite(RuleMode::InfiniteNormal, GameOptions::seeded(21)).unwrap();
        let mut moved = Vec::new();
        for d in Direction::ALL {
            if g.swipe(d) {
                moved.push(g.board().clone());
            }
        }
        assert!(moved.len() >= 2);
        g.undo().unwrap();
        assert_eq!(g.board(), &moved[moved.len() - 2]);
    }

    #[test]
    fn copies_are_independent() {
        let g = Game::new_infinite(RuleMode::InfiniteHard, GameOptions::seeded(8)).unwrap();
        let mut a = g.clone();
        let mut b = g.clone();
        let dir = Direction::ALL.into_iter().find(|&d| g.board().swipe_changes(d)).unwrap();
        assert!(a.swipe(dir));
        assert!(b.swipe(dir));
        assert_eq!(a.board(), b.board());
        assert_eq!(g.moves(), 0);
    }

    #[test]
    fn max_moves_loses_the_game() {
        let mut g = daily();
        while g.moves() < 10 {
            let dir = Direction::ALL.into_iter().find(|&d| g.board().swipe_changes(d)).unwrap();
            assert!(g.swipe(dir));
        }
        assert_eq!(g.moves(), 10);
        assert!(g.is_lost());
    }

    #[test]
    fn it_restores_from_snapshot() {
        let mut g = Game::new_infinite(RuleMode::InfiniteNormal, GameOptions::seeded(4)).unwrap();
        for d in Direction::ALL {
            g.swipe(d);
        }
        g.record_hint();
        let restored = Game::restore(&g.snapshot()).unwrap();
        assert_eq!(restored.board(), g.board());
        assert_eq!(restored.score(), g.score());
        assert_eq!(restored.seed(), g.seed());
        assert_eq!(restored.history().describe().unwrap(), g.history().describe().unwrap());
        let mut a = g.clone();
        let mut b = restored;
        a.undo().unwrap();
        b.undo().unwrap();
        assert_eq!(a.board(), b.board());
    }

    #[test]
    fn instruct_replays_descriptions() {
        let mut g = sum_and_product();
        for i in parse_describe("2,5,8;H;6,7,8;").unwrap() {
            assert!(g.instruct(&i).unwrap());
        }
        assert!(g.is_won());
        assert_eq!(g.history().len(), 3);
        assert_eq!(g.moves(), 2);
    }

    #[test]
    fn selection_toggles_and_follows_adjacency() {
        let mut g = sum_and_product();
        assert!(!g.select_cell(0));
        assert!(g.select_cell(2));
        assert!(!g.select_cell(8));
        assert!(g.select_cell(5));
        assert!(g.select_cell(5));
        assert_eq!(g.selection(), &[2]);
        assert!(g.select_cell(5));
        assert!(g.select_cell(8));
        g.evaluate_selection().unwrap();
        assert!(g.selection().is_empty());
    }

    #[test]
    fn restart_goes_back_to_the_start() {
        let mut g = sum_and_product();
        g.combine(&[2, 5, 8]).unwrap();
        g.restart().unwrap();
        assert_eq!(g.board().values(), vec![0, 0, 5, 0, 0, 4, 3, 6, 9]);
        assert_eq!(g.moves(), 0);
        assert!(g.history().is_empty());
        assert!(template_by_id("Sum&Product").is_some());
    }

    #[test]
    fn it_describes_instructions() {
        let g = sum_and_product();
        assert_eq!(g.describe_instruction(&Instruction::Combine(vec![2, 5, 8])), "Combine 5 + 4 = 9 (2,5,8)");
        assert_eq!(g.describe_instruction(&Instruction::Swipe(Direction::Up)), "Swipe Up");
    }
}
