//! Per-move analysis.
//!
//! [`MoveAnalyzer`] ties the evaluator, classifier, control grids and motif
//! detection together for one half-move at a time, so a caller can persist
//! each annotation before moving on to the next.

use crate::classifier::{MoveClassification, MoveClassifier, OpeningBook};
use crate::control::{ControlGrids, SquareControlAnalyzer};
use crate::evaluator::{PositionEvaluation, PositionEvaluator};
use crate::tactics::{TacticalMotif, TacticalMotifDetector};
use crate::{AnalysisError, ClassificationThresholds};
use chess_board::{HalfMove, Position};
use chess_core::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which pass produced an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisPhase {
    /// Shallow pass over every move for early, coarse labels.
    Quick,
    /// Full depth, with control grids and motifs.
    Deep,
}

impl AnalysisPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisPhase::Quick => "quick",
            AnalysisPhase::Deep => "deep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(AnalysisPhase::Quick),
            "deep" => Some(AnalysisPhase::Deep),
            _ => None,
        }
    }

    /// The phase after this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            AnalysisPhase::Quick => Some(AnalysisPhase::Deep),
            AnalysisPhase::Deep => None,
        }
    }
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The analysis of one half-move. Evaluations are white-perspective
/// centipawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAnnotation {
    pub game_id: String,
    pub move_number: u32,
    pub color: Color,
    pub move_san: String,
    pub move_uci: String,
    pub fen_before: String,
    pub fen_after: String,
    pub evaluation_before: i32,
    pub evaluation_after: i32,
    /// `evaluation_after - evaluation_before`.
    pub evaluation_change: i32,
    pub classification: MoveClassification,
    pub is_best_move: bool,
    pub is_book_move: bool,
    pub analysis_depth: u32,
    /// The engine's choice in `fen_before`, UCI notation.
    pub best_move: Option<String>,
    pub phase: AnalysisPhase,
    /// Control of `fen_after`. Deep phase only.
    pub control_grids: Option<ControlGrids>,
}

impl MoveAnnotation {
    /// The evaluation change seen by the player who moved.
    pub fn mover_delta(&self) -> i32 {
        crate::classifier::mover_delta(self.evaluation_before, self.evaluation_after, self.color)
    }
}

/// Result of analyzing one half-move.
#[derive(Debug, Clone)]
pub struct PlyAnalysis {
    pub annotation: MoveAnnotation,
    /// Motifs created by the engine's best move in `fen_before`.
    pub motifs: Vec<TacticalMotif>,
    /// Evaluation of `fen_after`, reusable as the next ply's `before`.
    pub evaluation_after: PositionEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    pub quick_depth: u32,
    pub deep_depth: u32,
    pub thresholds: ClassificationThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            quick_depth: 8,
            deep_depth: 18,
            thresholds: ClassificationThresholds::default(),
        }
    }
}

pub struct MoveAnalyzer {
    evaluator: Arc<PositionEvaluator>,
    classifier: MoveClassifier,
    control: SquareControlAnalyzer,
    tactics: TacticalMotifDetector,
    config: AnalyzerConfig,
}

impl MoveAnalyzer {
    pub fn new(evaluator: Arc<PositionEvaluator>, config: AnalyzerConfig) -> Self {
        Self {
            evaluator,
            classifier: MoveClassifier::new(config.thresholds),
            control: SquareControlAnalyzer,
            tactics: TacticalMotifDetector::default(),
            config,
        }
    }

    pub fn with_book(mut self, book: Box<dyn OpeningBook>) -> Self {
        self.classifier = self.classifier.with_book(book);
        self
    }

    pub fn with_tactics(mut self, tactics: TacticalMotifDetector) -> Self {
        self.tactics = tactics;
        self
    }

    pub fn depth(&self, phase: AnalysisPhase) -> u32 {
        match phase {
            AnalysisPhase::Quick => self.config.quick_depth,
            AnalysisPhase::Deep => self.config.deep_depth,
        }
    }

    pub fn evaluate(&self, fen: &str, phase: AnalysisPhase) -> Result<PositionEvaluation, AnalysisError> {
        self.evaluator.evaluate(fen, self.depth(phase))
    }

    /// Analyzes one half-move.
    ///
    /// # Arguments
    ///
    /// * `game_id` - Game the annotation belongs to.
    /// * `ply` - The half-move with the boards on either side of it.
    /// * `phase` - Sets the depth, and whether grids and motifs are computed.
    /// * `before` - Evaluation of `ply.fen_before` if already known, usually
    ///   the previous ply's `evaluation_after`. Evaluated here when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidPosition`] for unreadable FENs and
    /// engine errors once the evaluator's retries are exhausted.
    pub fn analyze_move(
        &self,
        game_id: &str,
        ply: &HalfMove,
        phase: AnalysisPhase,
        before: Option<PositionEvaluation>,
    ) -> Result<PlyAnalysis, AnalysisError> {
        let before = match before {
            Some(eval) => eval,
            None => self.evaluate(&ply.fen_before, phase)?,
        };
        let after = self.evaluate(&ply.fen_after, phase)?;

        let best_move = before.best_move.map(|m| m.to_uci());
        let is_best_move = best_move.as_deref() == Some(ply.uci.as_str());
        let (eval_before, eval_after) = (before.white_cp(), after.white_cp());
        let classification = self
            .classifier
            .classify(eval_before, eval_after, ply.color, is_best_move);

        let (control_grids, motifs) = match phase {
            AnalysisPhase::Quick => (None, Vec::new()),
            AnalysisPhase::Deep => {
                let grids = self.control.analyze(&Position::from_fen(&ply.fen_after)?);
                let motifs = match before.best_move {
                    Some(best) => self.tactics.detect(&Position::from_fen(&ply.fen_before)?, best)?,
                    None => Vec::new(),
                };
                (Some(grids), motifs)
            }
        };

        debug!(
            game_id,
            move_number = ply.move_number,
            color = %ply.color,
            phase = %phase,
            classification = %classification,
            "move analyzed"
        );

        Ok(PlyAnalysis {
            annotation: MoveAnnotation {
                game_id: game_id.to_string(),
                move_number: ply.move_number,
                color: ply.color,
                move_san: ply.san.clone(),
                move_uci: ply.uci.clone(),
                fen_before: ply.fen_before.clone(),
                fen_after: ply.fen_after.clone(),
                evaluation_before: eval_before,
                evaluation_after: eval_after,
                evaluation_change: eval_after - eval_before,
                classification,
                is_best_move,
                is_book_move: self.classifier.is_book_move(&ply.fen_before, &ply.uci),
                analysis_depth: self.depth(phase),
                best_move,
                phase,
                control_grids,
            },
            motifs,
            evaluation_after: after,
        })
    }

    /// Analyzes every ply in order, reusing each evaluation once.
    pub fn analyze_game(
        &self,
        game_id: &str,
        plies: &[HalfMove],
        phase: AnalysisPhase,
    ) -> Result<Vec<PlyAnalysis>, AnalysisError> {
        let mut results: Vec<PlyAnalysis> = Vec::with_capacity(plies.len());
        for ply in plies {
            let before = results.last().map(|r| r.evaluation_after.clone());
            results.push(self.analyze_move(game_id, ply, phase, before)?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::EnginePool;
    use crate::scripted::{ScriptedEngine, ScriptedFactory};
    use crate::tactics::MotifKind;
    use crate::KnownPositions;
    use chess_board::replay;
    use chess_core::FenParser;

    fn analyzer(engine: ScriptedEngine) -> MoveAnalyzer {
        let factory = Arc::new(ScriptedFactory::new(engine));
        let pool = Arc::new(EnginePool::new(factory, 1));
        MoveAnalyzer::new(
            Arc::new(PositionEvaluator::new(pool, 0)),
            AnalyzerConfig::default(),
        )
    }

    #[test]
    fn test_hanging_queen_is_a_blunder() {
        // The queen steps into the c6 knight's range.
        let fen = "4k3/8/2n5/8/8/8/8/3QK3 w - - 0 1";
        let engine = ScriptedEngine::new().with_best_move(fen, "e1f2");
        let plies = replay(fen, &["d1d4"]).unwrap();
        let analysis = analyzer(engine)
            .analyze_move("g1", &plies[0], AnalysisPhase::Quick, None)
            .unwrap();
        let a = &analysis.annotation;
        assert_eq!(a.move_san, "Qd4");
        assert_eq!(a.evaluation_before, 600);
        assert!(a.evaluation_after < 0);
        assert_eq!(a.classification, MoveClassification::Blunder);
        assert!(!a.is_best_move);
        assert_eq!(a.evaluation_change, a.evaluation_after - a.evaluation_before);
        assert!(a.control_grids.is_none());
    }

    #[test]
    fn test_engine_choice_is_best() {
        let start = "4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1";
        let plies = replay(start, &["e4d5"]).unwrap();
        let analysis = analyzer(ScriptedEngine::new())
            .analyze_move("g1", &plies[0], AnalysisPhase::Quick, None)
            .unwrap();
        assert!(analysis.annotation.is_best_move);
        assert_eq!(analysis.annotation.best_move.as_deref(), Some("e4d5"));
        assert_eq!(analysis.annotation.classification, MoveClassification::Best);
    }

    #[test]
    fn test_black_mover_perspective() {
        let start = "4k3/8/8/3q4/4P3/8/8/4K3 b - - 0 1";
        let plies = replay(start, &["d5e4"]).unwrap();
        let analysis = analyzer(ScriptedEngine::new())
            .analyze_move("g1", &plies[0], AnalysisPhase::Quick, None)
            .unwrap();
        let a = &analysis.annotation;
        assert_eq!(a.color, Color::Black);
        assert!(a.evaluation_after < 0, "black is winning after Qxe4");
        assert!(a.mover_delta() >= 0);
        assert_eq!(a.classification, MoveClassification::Best);
    }

    #[test]
    fn test_deep_phase_adds_grids_and_motifs() {
        let start = "2q3k1/8/8/3N4/8/8/8/6K1 w - - 0 1";
        let engine = ScriptedEngine::new().with_best_move(start, "d5e7");
        let plies = replay(start, &["g1f2"]).unwrap();
        let analysis = analyzer(engine)
            .analyze_move("g1", &plies[0], AnalysisPhase::Deep, None)
            .unwrap();
        assert!(analysis.annotation.control_grids.is_some());
        assert_eq!(analysis.annotation.phase, AnalysisPhase::Deep);
        assert_eq!(analysis.motifs.len(), 1);
        assert_eq!(analysis.motifs[0].kind, MotifKind::Fork);
        assert_eq!(analysis.motifs[0].move_uci, "d5e7");
    }

    #[test]
    fn test_game_reuses_evaluations() {
        let engine = ScriptedEngine::new();
        let plies = replay(FenParser::STARTPOS, &["e2e4", "e7e5", "g1f3"]).unwrap();
        let results = analyzer(engine.clone())
            .analyze_game("g1", &plies, AnalysisPhase::Quick)
            .unwrap();
        assert_eq!(results.len(), 3);
        // One search per distinct position.
        assert_eq!(engine.calls(), 4);
        assert_eq!(
            results[0].annotation.evaluation_after,
            results[1].annotation.evaluation_before
        );
    }

    #[test]
    fn test_book_moves_flagged() {
        let mut book = KnownPositions::new();
        book.insert(FenParser::STARTPOS, "e2e4");
        let analyzer = analyzer(ScriptedEngine::new()).with_book(Box::new(book));
        let plies = replay(FenParser::STARTPOS, &["e2e4", "e7e5"]).unwrap();
        let results = analyzer.analyze_game("g1", &plies, AnalysisPhase::Quick).unwrap();
        assert!(results[0].annotation.is_book_move);
        assert!(!results[1].annotation.is_book_move);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(AnalysisPhase::parse("deep"), Some(AnalysisPhase::Deep));
        assert_eq!(AnalysisPhase::Quick.next(), Some(AnalysisPhase::Deep));
        assert_eq!(AnalysisPhase::Deep.next(), None);
    }
}
