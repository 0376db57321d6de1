//! Engine-backed chess analysis.
//!
//! Evaluates positions through a pool of UCI engines and builds the
//! per-move pieces a game review needs.
//!
//! # Overview
//!
//! - [`PositionEvaluator`] - white-normalized evaluations with engine respawn
//! - [`MoveClassifier`] - best / good / inaccuracy / mistake / blunder
//! - [`SquareControlAnalyzer`] - per-square control counts and material
//! - [`TacticalMotifDetector`] - forks on the engine's best move
//! - [`AdaptiveResponseSelector`] - replies that even the game out again
//! - [`MoveAnalyzer`] - all of the above for one half-move
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{EnginePool, EngineSettings, PositionEvaluator, ProcessFactory};
//! use std::sync::Arc;
//!
//! let factory = Arc::new(ProcessFactory::new(EngineSettings::default()));
//! let pool = Arc::new(EnginePool::new(factory, 2));
//! let evaluator = PositionEvaluator::new(pool, 3);
//! let eval = evaluator.evaluate(chess_core::FenParser::STARTPOS, 16)?;
//! println!("{} cp", eval.white_cp());
//! ```

pub mod analyzer;
pub mod classifier;
pub mod control;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod evaluator;
pub mod even_move;
pub mod pool;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod tactics;

pub use analyzer::{AnalysisPhase, AnalyzerConfig, MoveAnalyzer, MoveAnnotation, PlyAnalysis};
pub use classifier::{
    mover_delta, ClassificationThresholds, KnownPositions, MoveClassification, MoveClassifier,
    NoOpeningBook, OpeningBook,
};
pub use control::{analyze_control, ControlGrids, SquareControlAnalyzer};
pub use engine::{
    EngineError, EngineFactory, EngineProcess, EngineSettings, ProcessFactory, PvLine, SearchLimit,
    SearchOutcome, SearchRequest, UciEngine,
};
pub use error::AnalysisError;
pub use evaluation::{Evaluation, MATE_SCORE};
pub use evaluator::{CandidateLine, PositionEvaluation, PositionEvaluator};
pub use even_move::{AdaptiveResponseSelector, EvenMoveChoice, EvenMoveConfig, FallbackReason};
pub use pool::{EnginePool, PooledEngine};
pub use tactics::{
    ForkDetector, MotifContext, MotifDetector, MotifKind, PlacedPiece, TacticalMotif,
    TacticalMotifDetector,
};
