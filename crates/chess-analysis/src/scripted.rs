//! A deterministic in-process engine.
//!
//! Scores a position by material (or by a score registered for it) and picks
//! moves with a one-ply lookahead. It speaks the same [`UciEngine`] trait as
//! the process-backed engine, which lets the evaluator, the even-move selector
//! and the worker run without Stockfish installed. Failures can be queued to
//! exercise respawn and retry paths.

use crate::engine::{EngineError, EngineFactory, PvLine, SearchOutcome, SearchRequest, UciEngine};
use crate::{Evaluation, MATE_SCORE};
use chess_board::Position;
use chess_core::{Color, Piece};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An injected failure for the next search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Behaves like a crashed process.
    Crash,
    /// Behaves like an engine that never answered.
    Timeout,
}

#[derive(Default)]
struct Script {
    scores: HashMap<String, i32>,
    best_moves: HashMap<String, String>,
    skill_moves: HashMap<String, String>,
    failures: VecDeque<ScriptedFailure>,
}

/// Clones share their script, failure queue and call counter.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

/// Positions are keyed without move counters.
fn key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

fn material(position: &Position, side: Color) -> i32 {
    Piece::ALL
        .iter()
        .map(|&piece| {
            let ours = position.pieces_of(piece, side).count() as i32;
            let theirs = position.pieces_of(piece, side.opposite()).count() as i32;
            (ours - theirs) * piece.material_value() as i32 * 100
        })
        .sum()
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers the evaluation of `fen`, side-to-move perspective.
    pub fn with_score(self, fen: &str, cp: i32) -> Self {
        self.script().scores.insert(key(fen), cp);
        self
    }

    /// Forces the full-strength best move for `fen`.
    pub fn with_best_move(self, fen: &str, uci: &str) -> Self {
        self.script().best_moves.insert(key(fen), uci.to_string());
        self
    }

    /// Forces the move returned when a skill level is set.
    pub fn with_skill_move(self, fen: &str, uci: &str) -> Self {
        self.script().skill_moves.insert(key(fen), uci.to_string());
        self
    }

    /// Sleeps this long inside every search.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues failures consumed by the next searches, in order.
    pub fn fail_next(&self, failures: &[ScriptedFailure]) {
        self.script().failures.extend(failures.iter().copied());
    }

    /// Number of searches attempted, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn value(&self, position: &Position) -> i32 {
        let fen = position.to_fen();
        self.script()
            .scores
            .get(&key(&fen))
            .copied()
            .unwrap_or_else(|| material(position, position.side_to_move))
    }
}

impl UciEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchOutcome, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.script().failures.pop_front() {
            Some(ScriptedFailure::Crash) => return Err(EngineError::Closed),
            Some(ScriptedFailure::Timeout) => return Err(EngineError::Timeout(Duration::ZERO)),
            None => {}
        }

        let position = Position::from_fen(&request.fen)
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        let depth = match request.limit {
            crate::SearchLimit::Depth(d) => d,
            crate::SearchLimit::MoveTime(_) => 1,
        };

        let mut scored: Vec<(String, i32)> = Vec::new();
        for mv in position.legal_moves() {
            let child = position
                .play(mv)
                .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
            let score = if child.is_checkmate() {
                MATE_SCORE - 1
            } else {
                -self.value(&child)
            };
            scored.push((mv.to_uci(), score));
        }
        // Stable: equal scores keep generation order.
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let fen_key = key(&request.fen);
        let script = self.script();
        if scored.is_empty() {
            let score = if position.is_check() { -MATE_SCORE } else { 0 };
            return Ok(SearchOutcome {
                best_move: None,
                lines: vec![PvLine {
                    multipv: 1,
                    depth: 0,
                    score: Evaluation::Centipawns(score),
                    moves: Vec::new(),
                }],
            });
        }

        let mut lines: Vec<PvLine> = scored
            .iter()
            .take(request.multipv as usize)
            .enumerate()
            .map(|(i, (uci, score))| PvLine {
                multipv: i as u32 + 1,
                depth,
                score: Evaluation::Centipawns(*score),
                moves: vec![uci.clone()],
            })
            .collect();

        let mut best_move = script
            .best_moves
            .get(&fen_key)
            .cloned()
            .unwrap_or_else(|| scored[0].0.clone());
        if let Some(&cp) = script.scores.get(&fen_key) {
            lines[0].score = Evaluation::Centipawns(cp);
        }
        if best_move != lines[0].moves[0] {
            lines[0].moves = vec![best_move.clone()];
        }
        if request.skill_level.is_some() {
            if let Some(mv) = script.skill_moves.get(&fen_key) {
                best_move = mv.clone();
            }
        }

        Ok(SearchOutcome {
            best_move: Some(best_move),
            lines,
        })
    }
}

/// Hands out clones of one [`ScriptedEngine`].
pub struct ScriptedFactory {
    template: ScriptedEngine,
    spawn_failures: AtomicU32,
    spawned: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(template: ScriptedEngine) -> Self {
        Self {
            template,
            spawn_failures: AtomicU32::new(0),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_spawns(&self, count: u32) {
        self.spawn_failures.store(count, Ordering::SeqCst);
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl EngineFactory for ScriptedFactory {
    fn spawn(&self) -> Result<Box<dyn UciEngine>, EngineError> {
        let pending = self.spawn_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.spawn_failures.store(pending - 1, Ordering::SeqCst);
            return Err(EngineError::InitFailed("scripted spawn failure".to_string()));
        }
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchLimit;

    #[test]
    fn test_prefers_winning_material() {
        // White can take a hanging queen on d5
        let fen = "4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1";
        let mut engine = ScriptedEngine::new();
        let outcome = engine
            .search(&SearchRequest::new(fen, SearchLimit::Depth(4)))
            .unwrap();
        assert_eq!(outcome.best_move.as_deref(), Some("e4d5"));
        assert_eq!(outcome.best_line().unwrap().score, Evaluation::Centipawns(100));
    }

    #[test]
    fn test_scripted_scores_and_moves() {
        let fen = chess_core::FenParser::STARTPOS;
        let mut engine = ScriptedEngine::new()
            .with_score(fen, 35)
            .with_best_move(fen, "d2d4")
            .with_skill_move(fen, "a2a3");
        let full = engine
            .search(&SearchRequest::new(fen, SearchLimit::Depth(10)))
            .unwrap();
        assert_eq!(full.best_move.as_deref(), Some("d2d4"));
        assert_eq!(full.best_line().unwrap().score, Evaluation::Centipawns(35));

        let weak = engine
            .search(&SearchRequest::new(fen, SearchLimit::MoveTime(Duration::from_millis(10))).with_skill(3))
            .unwrap();
        assert_eq!(weak.best_move.as_deref(), Some("a2a3"));
    }

    #[test]
    fn test_multipv_lines() {
        let fen = chess_core::FenParser::STARTPOS;
        let mut engine = ScriptedEngine::new();
        let outcome = engine
            .search(&SearchRequest::new(fen, SearchLimit::Depth(2)).with_multipv(5))
            .unwrap();
        assert_eq!(outcome.lines.len(), 5);
        assert_eq!(outcome.lines[4].multipv, 5);
    }

    #[test]
    fn test_failures_are_consumed_in_order() {
        let engine = ScriptedEngine::new();
        engine.fail_next(&[ScriptedFailure::Crash, ScriptedFailure::Timeout]);
        let mut clone = engine.clone();
        let request = SearchRequest::new(chess_core::FenParser::STARTPOS, SearchLimit::Depth(1));
        assert!(matches!(clone.search(&request), Err(EngineError::Closed)));
        assert!(matches!(clone.search(&request), Err(EngineError::Timeout(_))));
        assert!(clone.search(&request).is_ok());
        assert_eq!(engine.calls(), 3);
    }
}
