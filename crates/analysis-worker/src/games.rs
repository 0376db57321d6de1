//! Games to analyze, as replayed half-moves.

use chess_board::{replay, HalfMove};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::WorkerError;

pub trait GameSource: Send + Sync {
    /// The game's plies in order, each with the boards on either side.
    fn load_plies(&self, game_id: &str) -> Result<Vec<HalfMove>, WorkerError>;
}

/// Replays a stored start position and move list.
pub fn replay_game<S: AsRef<str>>(
    game_id: &str,
    start_fen: &str,
    moves: &[S],
) -> Result<Vec<HalfMove>, WorkerError> {
    replay(start_fen, moves).map_err(|e| WorkerError::InvalidGame {
        game_id: game_id.to_string(),
        reason: e.to_string(),
    })
}

/// Games held in memory.
#[derive(Debug, Default)]
pub struct MemoryGames {
    games: RwLock<HashMap<String, (String, Vec<String>)>>,
}

impl MemoryGames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, game_id: &str, start_fen: &str, moves: &[&str]) {
        let mut games = self.games.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        games.insert(
            game_id.to_string(),
            (
                start_fen.to_string(),
                moves.iter().map(|m| m.to_string()).collect(),
            ),
        );
    }
}

impl GameSource for MemoryGames {
    fn load_plies(&self, game_id: &str) -> Result<Vec<HalfMove>, WorkerError> {
        let games = self.games.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (start, moves) = games
            .get(game_id)
            .ok_or_else(|| WorkerError::GameNotFound(game_id.to_string()))?;
        replay_game(game_id, start, moves)
    }
}
