use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::game::{GameSnapshot, PlayState};
use crate::rules::{RuleCache, Rules};

use super::{
    CreateGameTemplatePayload, CreateUserSessionPayload, GameRecord, GameTemplateRecord, NewGamePayload, PlayStats,
    RestartGamePayload, Session, SessionUser, Statistics, Store, StoreError, UpdateGamePayload, User,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    sessions: HashMap<String, Session>,
    games: HashMap<String, GameRecord>,
    originals: HashMap<String, GameSnapshot>,
    /// user id -> active game id
    active: HashMap<String, String>,
    templates: HashMap<String, GameTemplateRecord>,
}

/// In-process [`Store`] behind a single `RwLock`.
///
/// Rules are interned through a [`RuleCache`], so games sharing a rule set
/// share its id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    rules: RuleCache,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn read(&self) -> RwLockReadGuard<'_, Tables> { self.tables.read().unwrap_or_else(PoisonError::into_inner) }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> { self.tables.write().unwrap_or_else(PoisonError::into_inner) }

    fn intern_rules(&self, mut rules: Rules) -> Rules {
        if rules.id.is_empty() {
            rules.id = rules.hash();
        }
        self.rules.get_or_insert(rules)
    }

    pub fn rule_count(&self) -> usize { self.rules.len() }

    fn insert_game(&self, tables: &mut Tables, user_id: &str, template_id: Option<String>, mut game: GameSnapshot) -> GameRecord {
        game.rules = self.intern_rules(game.rules);
        let previous_id = tables.active.get(user_id).cloned();
        if let Some(previous) = previous_id.and_then(|id| tables.games.get_mut(&id)) {
            if previous.snapshot.play_state == PlayState::Current {
                previous.snapshot.play_state = PlayState::Abandoned;
                previous.updated_at = Some(SystemTime::now());
                log::debug!("game {} abandoned", previous.id());
            }
        }
        let record = GameRecord {
            user_id: user_id.to_string(),
            template_id,
            created_at: SystemTime::now(),
            updated_at: None,
            snapshot: game,
        };
        tables.originals.insert(record.id().to_string(), original_of(&record.snapshot));
        tables.games.insert(record.id().to_string(), record.clone());
        tables.active.insert(user_id.to_string(), record.id().to_string());
        record
    }
}

/// The snapshot as it stood before the first move.
fn original_of(snapshot: &GameSnapshot) -> GameSnapshot {
    GameSnapshot {
        cells: snapshot.start_cells.clone(),
        score: snapshot.start_score,
        moves: snapshot.start_moves,
        seed: snapshot.start_seed,
        state: snapshot.start_state,
        play_state: PlayState::Current,
        history: Vec::new(),
        ..snapshot.clone()
    }
}

impl Store for MemoryStore {
    fn get_user_by_session_id(&self, session_id: &str) -> Result<SessionUser, StoreError> {
        if session_id.is_empty() {
            return Err(StoreError::ArgumentMissing("session_id"));
        }
        let t = self.read();
        let session = t.sessions.get(session_id).ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        if session.invalid_after < SystemTime::now() {
            return Err(StoreError::NotFound(format!("session {session_id} has expired")));
        }
        let user = t
            .users
            .get(&session.user_id)
            .ok_or_else(|| StoreError::Internal(format!("session {session_id} points to a missing user")))?;
        let game = t
            .active
            .get(&user.id)
            .and_then(|id| t.games.get(id))
            .ok_or_else(|| StoreError::Internal(format!("user {} has no active game", user.id)))?;
        Ok(SessionUser { session: session.clone(), user: user.clone(), game: game.clone() })
    }

    fn create_user_session(&self, payload: CreateUserSessionPayload) -> Result<SessionUser, StoreError> {
        payload.validate()?;
        let mut t = self.write();
        if t.sessions.contains_key(&payload.session_id) {
            return Err(StoreError::ArgumentInvalid(format!("session {} already exists", payload.session_id)));
        }
        let now = SystemTime::now();
        let user = t
            .users
            .entry(payload.user_id.clone())
            .or_insert_with(|| User { id: payload.user_id.clone(), username: payload.username.clone(), created_at: now })
            .clone();
        let session = Session {
            id: payload.session_id.clone(),
            user_id: user.id.clone(),
            created_at: now,
            invalid_after: payload.invalid_after,
        };
        t.sessions.insert(session.id.clone(), session.clone());
        let game = self.insert_game(&mut t, &user.id, None, payload.game);
        log::debug!("created session {} for user {}", session.id, user.id);
        Ok(SessionUser { session, user, game })
    }

    fn new_game_for_user(&self, payload: NewGamePayload) -> Result<GameRecord, StoreError> {
        payload.validate()?;
        let mut t = self.write();
        if !t.users.contains_key(&payload.user_id) {
            return Err(StoreError::NotFound(format!("user {}", payload.user_id)));
        }
        if t.games.contains_key(&payload.game.id) {
            return Err(StoreError::ArgumentInvalid(format!("game {} already exists", payload.game.id)));
        }
        Ok(self.insert_game(&mut t, &payload.user_id, payload.template_id, payload.game))
    }

    fn update_game(&self, payload: UpdateGamePayload) -> Result<(), StoreError> {
        payload.validate()?;
        let mut t = self.write();
        let record = t.games.get_mut(&payload.game_id).ok_or_else(|| StoreError::NotFound(format!("game {}", payload.game_id)))?;
        let expected = record.snapshot.rules.rows as usize * record.snapshot.rules.columns as usize;
        if payload.cells.len() != expected {
            return Err(StoreError::ArgumentInvalid(format!("expected {expected} cells, got {}", payload.cells.len())));
        }
        let s = &mut record.snapshot;
        s.moves = payload.moves;
        s.score = payload.score;
        s.cells = payload.cells;
        s.seed = payload.seed;
        s.state = payload.state;
        s.history = payload.history;
        s.play_state = payload.play_state;
        record.updated_at = Some(SystemTime::now());
        log::trace!("game {} updated at move {}", payload.game_id, payload.moves);
        Ok(())
    }

    fn get_original_game(&self, game_id: &str) -> Result<GameSnapshot, StoreError> {
        if game_id.is_empty() {
            return Err(StoreError::ArgumentMissing("game_id"));
        }
        self.read().originals.get(game_id).cloned().ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))
    }

    fn restart_game(&self, payload: RestartGamePayload) -> Result<GameRecord, StoreError> {
        payload.validate()?;
        let mut t = self.write();
        let original = t
            .originals
            .get(&payload.game_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("game {}", payload.game_id)))?;
        let record = t.games.get_mut(&payload.game_id).ok_or_else(|| StoreError::NotFound(format!("game {}", payload.game_id)))?;
        if record.user_id != payload.user_id {
            return Err(StoreError::NotFound(format!("game {} for user {}", payload.game_id, payload.user_id)));
        }
        record.snapshot = original;
        record.updated_at = Some(SystemTime::now());
        Ok(record.clone())
    }

    fn create_game_template(&self, payload: CreateGameTemplatePayload) -> Result<GameTemplateRecord, StoreError> {
        payload.validate()?;
        let rules = self.intern_rules(payload.rules);
        let mut t = self.write();
        if t.templates.contains_key(&payload.id) {
            return Err(StoreError::ArgumentInvalid(format!("template {} already exists", payload.id)));
        }
        if let Some(n) = payload.challenge_number {
            if t.templates.values().any(|tpl| tpl.challenge_number == Some(n)) {
                return Err(StoreError::ArgumentInvalid(format!("challenge number {n} is taken")));
            }
        }
        let record = GameTemplateRecord {
            id: payload.id,
            created_at: SystemTime::now(),
            created_by_id: payload.created_by_id,
            challenge_number: payload.challenge_number,
            ideal_moves: payload.ideal_moves,
            name: payload.name,
            description: payload.description,
            cells: payload.cells,
            rules,
            stats: Vec::new(),
        };
        t.templates.insert(record.id.clone(), record.clone());
        log::info!("created game template {} ({})", record.id, record.name);
        Ok(record)
    }

    fn get_game_challenges(&self) -> Result<Vec<GameTemplateRecord>, StoreError> {
        let t = self.read();
        let mut out: Vec<GameTemplateRecord> = t.templates.values().cloned().collect();
        for tpl in &mut out {
            tpl.stats = t
                .games
                .values()
                .filter(|g| g.template_id.as_deref() == Some(tpl.id.as_str()) && g.snapshot.play_state == PlayState::Won)
                .map(|g| PlayStats {
                    game_id: g.id().to_string(),
                    user_id: g.user_id.clone(),
                    username: t.users.get(&g.user_id).map(|u| u.username.clone()).unwrap_or_default(),
                    score: g.snapshot.score,
                    moves: g.snapshot.moves,
                })
                .collect();
        }
        out.sort_by(|a, b| a.challenge_number.cmp(&b.challenge_number).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    fn stats(&self) -> Result<Statistics, StoreError> {
        let t = self.read();
        let mut s = Statistics { users: t.users.len() as u64, sessions: t.sessions.len() as u64, ..Default::default() };
        let sizes: Vec<u64> = t.games.values().map(|g| g.snapshot.history.len() as u64).collect();
        for g in t.games.values() {
            s.games += 1;
            match g.snapshot.play_state {
                PlayState::Won => s.games_won += 1,
                PlayState::Lost => s.games_lost += 1,
                PlayState::Abandoned => s.games_abandoned += 1,
                PlayState::Current => s.games_current += 1,
            }
            s.longest_game = s.longest_game.max(g.snapshot.moves);
            s.highest_score = s.highest_score.max(g.snapshot.score);
        }
        if !sizes.is_empty() {
            s.history_total = sizes.iter().sum();
            s.history_min = sizes.iter().copied().min().unwrap_or_default();
            s.history_max = sizes.iter().copied().max().unwrap_or_default();
            s.history_avg = s.history_total as f64 / sizes.len() as f64;
            let var = sizes.iter().map(|&n| (n as f64 - s.history_avg).powi(2)).sum::<f64>() / sizes.len() as f64;
            s.history_std_dev = var.sqrt();
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::board::Direction;
    use crate::game::{Game, GameOptions};
    use crate::rules::RuleMode;
    use crate::template::{challenge_games, tutorial_games};

    fn infinite(id: &str) -> Game {
        let mut g = Game::new_infinite(RuleMode::InfiniteNormal, GameOptions::seeded(5)).unwrap();
        g.set_id(id);
        g
    }

    fn session(store: &MemoryStore, session_id: &str, user_id: &str) -> SessionUser {
        store
            .create_user_session(CreateUserSessionPayload {
                session_id: session_id.into(),
                user_id: user_id.into(),
                username: format!("{user_id}-name"),
                invalid_after: SystemTime::now() + Duration::from_secs(3600),
                game: infinite(&format!("{user_id}-g0")).snapshot(),
            })
            .unwrap()
    }

    #[test]
    fn sessions_resolve_to_user_and_game() {
        let store = MemoryStore::new();
        let created = session(&store, "s1", "u1");
        let got = store.get_user_by_session_id("s1").unwrap();
        assert_eq!(got, created);
        assert_eq!(got.game.id(), "u1-g0");
        assert!(!got.game.snapshot.rules.id.is_empty());
        assert!(matches!(store.get_user_by_session_id("nope"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_user_by_session_id(""), Err(StoreError::ArgumentMissing(_))));
    }

    #[test]
    fn expired_or_incomplete_sessions_are_rejected() {
        let store = MemoryStore::new();
        let mut payload = CreateUserSessionPayload {
            session_id: "s".into(),
            user_id: "u".into(),
            username: "".into(),
            invalid_after: SystemTime::now() + Duration::from_secs(60),
            game: infinite("g").snapshot(),
        };
        assert_eq!(store.create_user_session(payload.clone()).unwrap_err(), StoreError::ArgumentMissing("username"));
        payload.username = "name".into();
        payload.invalid_after = SystemTime::now() - Duration::from_secs(1);
        assert!(matches!(store.create_user_session(payload), Err(StoreError::ArgumentInvalid(_))));
        assert_eq!(store.stats().unwrap().sessions, 0);
    }

    #[test]
    fn a_new_game_abandons_the_active_one() {
        let store = MemoryStore::new();
        session(&store, "s1", "u1");
        let next = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
        let mut snap = next.snapshot();
        snap.id = "u1-g1".into();
        store.new_game_for_user(NewGamePayload { user_id: "u1".into(), template_id: None, game: snap }).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.games, 2);
        assert_eq!(stats.games_abandoned, 1);
        assert_eq!(stats.games_current, 1);
        assert_eq!(store.get_user_by_session_id("s1").unwrap().game.id(), "u1-g1");
    }

    #[test]
    fn updates_keep_the_original() {
        let store = MemoryStore::new();
        let created = session(&store, "s1", "u1");
        let mut g = Game::restore(&created.game.snapshot).unwrap();
        assert!(g.swipe(Direction::Up) || g.swipe(Direction::Down));
        store.update_game(UpdateGamePayload::from_snapshot(&g.snapshot())).unwrap();

        let stored = store.get_user_by_session_id("s1").unwrap().game;
        assert_eq!(stored.snapshot.moves, 1);
        assert_eq!(stored.snapshot.cells, g.cells());
        assert!(stored.updated_at.is_some());

        let original = store.get_original_game("u1-g0").unwrap();
        assert_eq!(original.moves, 0);
        assert_eq!(original.cells, created.game.snapshot.cells);
        assert!(original.history.is_empty());

        let restarted = store.restart_game(RestartGamePayload { user_id: "u1".into(), game_id: "u1-g0".into() }).unwrap();
        assert_eq!(restarted.snapshot, original);
    }

    #[test]
    fn update_validation() {
        let store = MemoryStore::new();
        session(&store, "s1", "u1");
        let snap = store.get_original_game("u1-g0").unwrap();
        let mut p = UpdateGamePayload::from_snapshot(&snap);
        p.moves = 3;
        assert_eq!(store.update_game(p.clone()).unwrap_err(), StoreError::ArgumentMissing("history"));
        p.history = vec![0b0000_0001];
        p.cells.pop();
        assert!(matches!(store.update_game(p.clone()), Err(StoreError::ArgumentInvalid(_))));
        p.game_id = "missing".into();
        assert!(matches!(store.update_game(p), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn challenges_carry_win_stats() {
        let store = MemoryStore::new();
        session(&store, "s1", "u1");
        let tpl = &challenge_games()[0];
        let record = store
            .create_game_template(CreateGameTemplatePayload {
                id: "t1".into(),
                created_by_id: "u1".into(),
                challenge_number: Some(1),
                ideal_moves: Some(9),
                name: tpl.name.clone(),
                description: tpl.description.clone(),
                cells: tpl.cells.clone(),
                rules: tpl.rules.clone(),
            })
            .unwrap();
        assert_eq!(record.rules.id, tpl.rules.hash());

        let mut g = Game::from_template(tpl, GameOptions::seeded(2)).unwrap();
        g.set_id("u1-g1");
        let mut snap = g.snapshot();
        snap.play_state = PlayState::Won;
        snap.score = 954;
        snap.moves = 9;
        snap.history = vec![1];
        store.new_game_for_user(NewGamePayload { user_id: "u1".into(), template_id: Some("t1".into()), game: snap }).unwrap();

        let challenges = store.get_game_challenges().unwrap();
        assert_eq!(challenges.len(), 1);
        assert_eq!(challenges[0].stats.len(), 1);
        assert_eq!(challenges[0].stats[0].username, "u1-name");
        assert_eq!(challenges[0].stats[0].moves, 9);
    }

    #[test]
    fn template_validation() {
        let store = MemoryStore::new();
        let tpl = &challenge_games()[0];
        let mut payload = CreateGameTemplatePayload {
            id: "t1".into(),
            created_by_id: "u1".into(),
            challenge_number: None,
            ideal_moves: None,
            name: "x".into(),
            description: String::new(),
            cells: tpl.cells.clone(),
            rules: tpl.rules.clone(),
        };
        payload.cells.pop();
        assert!(matches!(store.create_game_template(payload.clone()), Err(StoreError::ArgumentInvalid(_))));
        payload.cells = tpl.cells.clone();
        payload.rules.target_cell_value = 0;
        payload.rules.mode = RuleMode::Challenge;
        assert_eq!(store.create_game_template(payload).unwrap_err(), StoreError::ArgumentMissing("rules.target_cell_value"));
    }

    #[test]
    fn history_size_aggregates() {
        let store = MemoryStore::new();
        session(&store, "s1", "u1");
        session(&store, "s2", "u2");
        let mut p = UpdateGamePayload::from_snapshot(&store.get_original_game("u2-g0").unwrap());
        p.moves = 1;
        p.history = vec![1, 2, 3, 4];
        store.update_game(p).unwrap();
        let s = store.stats().unwrap();
        assert_eq!(s.users, 2);
        assert_eq!(s.history_total, 4);
        assert_eq!(s.history_min, 0);
        assert_eq!(s.history_max, 4);
        assert!((s.history_avg - 2.0).abs() < 1e-9);
        assert!((s.history_std_dev - 2.0).abs() < 1e-9);
    }
}
