//! Position evaluation through the engine pool.

use crate::engine::{EngineError, SearchLimit, SearchOutcome, SearchRequest};
use crate::pool::EnginePool;
use crate::{AnalysisError, Evaluation, MATE_SCORE};
use chess_board::Position;
use chess_core::{Color, Move};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A position's evaluation, normalized to white.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEvaluation {
    /// Positive is good for white.
    pub evaluation: Evaluation,
    pub side_to_move: Color,
    /// `None` for checkmate and stalemate.
    pub best_move: Option<Move>,
    pub principal_variation: Vec<String>,
    /// Depth the engine reached; 0 for positions decided on the board.
    pub depth: u32,
}

impl PositionEvaluation {
    /// White-perspective centipawns, mates collapsed.
    pub fn white_cp(&self) -> i32 {
        self.evaluation.to_centipawns()
    }

    /// Centipawns from the side to move.
    pub fn side_to_move_cp(&self) -> i32 {
        match self.side_to_move {
            Color::White => self.white_cp(),
            Color::Black => -self.white_cp(),
        }
    }
}

/// One candidate move from a multi-line search, scored for the side to move.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLine {
    pub mv: Move,
    pub score: Evaluation,
}

/// Synchronous evaluation backed by an [`EnginePool`].
///
/// Each call checks an engine out for its duration. An engine that fails is
/// discarded and the call is retried on a fresh one, up to `max_respawns`
/// times.
pub struct PositionEvaluator {
    pool: Arc<EnginePool>,
    max_respawns: u32,
}

impl PositionEvaluator {
    pub fn new(pool: Arc<EnginePool>, max_respawns: u32) -> Self {
        Self { pool, max_respawns }
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Evaluates `fen` at a fixed depth.
    pub fn evaluate(&self, fen: &str, depth: u32) -> Result<PositionEvaluation, AnalysisError> {
        let position = Position::from_fen(fen)?;
        if let Some(decided) = Self::decided_on_board(&position) {
            return Ok(decided);
        }

        let outcome = self.search(&SearchRequest::new(fen, SearchLimit::Depth(depth)))?;
        let line = outcome.best_line();
        let score = line
            .map(|l| l.score)
            .ok_or_else(|| AnalysisError::EngineUnavailable("search returned no score".into()))?;
        let best_move = Self::resolve_move(&position, outcome.best_move.as_deref())?;

        Ok(PositionEvaluation {
            evaluation: score.for_white(position.side_to_move),
            side_to_move: position.side_to_move,
            best_move,
            principal_variation: line.map(|l| l.moves.clone()).unwrap_or_default(),
            depth: line.map(|l| l.depth).unwrap_or(depth),
        })
    }

    /// The move a weakened engine plays in `fen`.
    pub fn evaluate_at_skill(
        &self,
        fen: &str,
        skill_level: u8,
        move_time: Duration,
    ) -> Result<Move, AnalysisError> {
        let position = Position::from_fen(fen)?;
        if position.legal_moves().is_empty() {
            return Err(AnalysisError::InvalidPosition(format!("no legal moves in {}", fen)));
        }
        let request = SearchRequest::new(fen, SearchLimit::MoveTime(move_time)).with_skill(skill_level);
        let outcome = self.search(&request)?;
        Self::resolve_move(&position, outcome.best_move.as_deref())?
            .ok_or_else(|| AnalysisError::EngineUnavailable("engine returned no move".into()))
    }

    /// The engine's top `lines` moves in `fen`, best first, scored for the
    /// side to move.
    pub fn candidate_lines(
        &self,
        fen: &str,
        lines: u32,
        depth: u32,
    ) -> Result<Vec<CandidateLine>, AnalysisError> {
        let position = Position::from_fen(fen)?;
        let request = SearchRequest::new(fen, SearchLimit::Depth(depth)).with_multipv(lines);
        let outcome = self.search(&request)?;
        let mut candidates = Vec::with_capacity(outcome.lines.len());
        for line in outcome.lines {
            let Some(first) = line.moves.first() else {
                continue;
            };
            if let Some(mv) = Self::resolve_move(&position, Some(first))? {
                candidates.push(CandidateLine { mv, score: line.score });
            }
        }
        Ok(candidates)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, AnalysisError> {
        let mut last_error: Option<EngineError> = None;
        for attempt in 0..=self.max_respawns {
            let mut engine = match self.pool.checkout() {
                Ok(engine) => engine,
                Err(e) => {
                    warn!(attempt, error = %e, "engine checkout failed");
                    last_error = Some(e);
                    continue;
                }
            };
            match engine.search(request) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!(attempt, fen = %request.fen, error = %e, "engine call failed, respawning");
                    engine.discard();
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .map(AnalysisError::from)
            .unwrap_or_else(|| AnalysisError::EngineUnavailable("no attempts made".into())))
    }

    /// Checkmate and stalemate need no engine.
    fn decided_on_board(position: &Position) -> Option<PositionEvaluation> {
        if !position.legal_moves().is_empty() {
            return None;
        }
        let stm = if position.is_check() { -MATE_SCORE } else { 0 };
        Some(PositionEvaluation {
            evaluation: Evaluation::Centipawns(stm).for_white(position.side_to_move),
            side_to_move: position.side_to_move,
            best_move: None,
            principal_variation: Vec::new(),
            depth: 0,
        })
    }

    fn resolve_move(position: &Position, uci: Option<&str>) -> Result<Option<Move>, AnalysisError> {
        let Some(text) = uci else {
            return Ok(None);
        };
        let mv = Move::from_uci(text)
            .map_err(|e| AnalysisError::EngineUnavailable(format!("engine sent bad move: {}", e)))?;
        if !position.is_legal(mv) {
            return Err(AnalysisError::EngineUnavailable(format!(
                "engine sent illegal move {}",
                text
            )));
        }
        Ok(Some(mv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedEngine, ScriptedFactory, ScriptedFailure};
    use chess_core::mirror_fen;
    use proptest::prelude::*;

    fn evaluator(engine: ScriptedEngine, max_respawns: u32) -> (PositionEvaluator, Arc<ScriptedFactory>) {
        let factory = Arc::new(ScriptedFactory::new(engine));
        let pool = Arc::new(EnginePool::new(factory.clone(), 1));
        (PositionEvaluator::new(pool, max_respawns), factory)
    }

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

    #[test]
    fn test_black_to_move_is_negated() {
        let engine = ScriptedEngine::new().with_score(AFTER_E4, -30);
        let (evaluator, _) = evaluator(engine, 0);
        let eval = evaluator.evaluate(AFTER_E4, 12).unwrap();
        assert_eq!(eval.evaluation, Evaluation::Centipawns(30));
        assert_eq!(eval.side_to_move_cp(), -30);
        assert!(eval.best_move.is_some());
    }

    #[test]
    fn test_invalid_fen_is_fatal() {
        let (evaluator, factory) = evaluator(ScriptedEngine::new(), 3);
        let err = evaluator.evaluate("not a fen", 10).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPosition(_)));
        assert!(!err.is_transient());
        assert_eq!(factory.spawned(), 0);
    }

    #[test]
    fn test_checkmate_without_engine() {
        let engine = ScriptedEngine::new();
        let (evaluator, _) = evaluator(engine.clone(), 0);
        // Fool's mate, white is mated
        let fen = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";
        let eval = evaluator.evaluate(fen, 20).unwrap();
        assert_eq!(eval.white_cp(), -MATE_SCORE);
        assert_eq!(eval.best_move, None);
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_stalemate_is_zero() {
        let (evaluator, _) = evaluator(ScriptedEngine::new(), 0);
        let eval = evaluator.evaluate("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 20).unwrap();
        assert_eq!(eval.white_cp(), 0);
    }

    #[test]
    fn test_crash_respawns_and_retries() {
        let engine = ScriptedEngine::new();
        engine.fail_next(&[ScriptedFailure::Crash, ScriptedFailure::Crash]);
        let (evaluator, factory) = evaluator(engine, 2);
        assert!(evaluator.evaluate(AFTER_E4, 8).is_ok());
        assert_eq!(factory.spawned(), 3);
    }

    #[test]
    fn test_gives_up_after_limit() {
        let engine = ScriptedEngine::new();
        engine.fail_next(&[ScriptedFailure::Crash; 3]);
        let (evaluator, _) = evaluator(engine, 1);
        let err = evaluator.evaluate(AFTER_E4, 8).unwrap_err();
        assert!(matches!(err, AnalysisError::EngineUnavailable(_)));
    }

    #[test]
    fn test_timeout_maps_to_analysis_timeout() {
        let engine = ScriptedEngine::new();
        engine.fail_next(&[ScriptedFailure::Timeout]);
        let (evaluator, _) = evaluator(engine, 0);
        let err = evaluator.evaluate(AFTER_E4, 8).unwrap_err();
        assert!(matches!(err, AnalysisError::AnalysisTimeout(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_skill_move() {
        let engine = ScriptedEngine::new().with_skill_move(AFTER_E4, "c7c5");
        let (evaluator, _) = evaluator(engine, 0);
        let mv = evaluator
            .evaluate_at_skill(AFTER_E4, 5, Duration::from_millis(50))
            .unwrap();
        assert_eq!(mv.to_uci(), "c7c5");
    }

    #[test]
    fn test_illegal_engine_move_is_rejected() {
        let engine = ScriptedEngine::new().with_best_move(AFTER_E4, "e2e4");
        let (evaluator, _) = evaluator(engine, 0);
        assert!(matches!(
            evaluator.evaluate(AFTER_E4, 8),
            Err(AnalysisError::EngineUnavailable(_))
        ));
    }

    /// Positions with no castling rights or en passant square.
    fn plain_fen() -> impl Strategy<Value = String> {
        prop::collection::vec(any::<prop::sample::Index>(), 0..30).prop_map(|choices| {
            let mut position =
                Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1").unwrap();
            for choice in choices {
                let moves = position.legal_moves();
                if moves.is_empty() {
                    break;
                }
                position = position.play(moves[choice.index(moves.len())]).unwrap();
            }
            let fen = position.to_fen();
            let mut fields: Vec<&str> = fen.split_whitespace().collect();
            fields[3] = "-";
            fields.join(" ")
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn mirrored_position_negates_evaluation(fen in plain_fen()) {
            let (evaluator, _) = evaluator(ScriptedEngine::new(), 0);
            let mirrored = mirror_fen(&fen).unwrap();
            let original = evaluator.evaluate(&fen, 1).unwrap();
            let flipped = evaluator.evaluate(&mirrored, 1).unwrap();
            prop_assert_eq!(original.white_cp(), -flipped.white_cp());
        }
    }
}
