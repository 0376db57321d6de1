//! Integration tests against a real Stockfish.
//!
//! These tests require Stockfish to be installed and available in PATH.
//! Run with: `cargo test -p chess-analysis --test integration -- --ignored`

use chess_analysis::{
    AnalysisPhase, AnalyzerConfig, EnginePool, EngineSettings, MoveAnalyzer, MoveClassification,
    PositionEvaluator, ProcessFactory, MATE_SCORE,
};
use chess_board::replay;
use chess_core::FenParser;
use std::sync::Arc;
use std::time::Duration;

/// Check if Stockfish is available in PATH.
fn stockfish_available() -> bool {
    std::process::Command::new("stockfish")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

fn evaluator() -> Arc<PositionEvaluator> {
    let factory = Arc::new(ProcessFactory::new(EngineSettings::default()));
    let pool = Arc::new(EnginePool::new(factory, 1));
    Arc::new(PositionEvaluator::new(pool, 2))
}

#[test]
#[ignore = "requires Stockfish"]
fn test_engine_basic_evaluation() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let eval = evaluator()
        .evaluate(FenParser::STARTPOS, 10)
        .expect("Failed to evaluate starting position");

    assert!(eval.best_move.is_some(), "Best move should be present");
    assert!(eval.depth >= 10, "Search depth should be at least 10, got: {}", eval.depth);
    assert!(
        eval.white_cp().abs() < 100,
        "Start position should be roughly level, got: {}",
        eval.white_cp()
    );
}

#[test]
#[ignore = "requires Stockfish"]
fn test_black_to_move_normalized() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    // Black is a queen down and to move
    let eval = evaluator()
        .evaluate("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1", 10)
        .expect("Failed to evaluate");
    assert!(eval.white_cp() > 500, "White should be winning, got: {}", eval.white_cp());
}

#[test]
#[ignore = "requires Stockfish"]
fn test_mate_in_one_found() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let eval = evaluator()
        .evaluate("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", 12)
        .expect("Failed to evaluate");
    assert_eq!(eval.best_move.map(|m| m.to_uci()).as_deref(), Some("a1a8"));
    assert_eq!(eval.white_cp(), MATE_SCORE - 1);
}

#[test]
#[ignore = "requires Stockfish"]
fn test_weakened_play_returns_legal_move() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let mv = evaluator()
        .evaluate_at_skill(FenParser::STARTPOS, 0, Duration::from_millis(50))
        .expect("Failed to get a move");
    let position = chess_board::Position::startpos();
    assert!(position.is_legal(mv));
}

#[test]
#[ignore = "requires Stockfish"]
fn test_scholars_mate_game_analysis() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    // 1.e4 e5 2.Qh5 Nc6 3.Bc4 Nf6?? 4.Qxf7#
    let moves = ["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"];
    let plies = replay(FenParser::STARTPOS, &moves).expect("Failed to replay game");

    let analyzer = MoveAnalyzer::new(
        evaluator(),
        AnalyzerConfig {
            quick_depth: 8,
            deep_depth: 12,
            ..AnalyzerConfig::default()
        },
    );
    let results = analyzer
        .analyze_game("scholars_mate", &plies, AnalysisPhase::Deep)
        .expect("Failed to analyze game");

    let nf6 = &results[5].annotation;
    assert_eq!(nf6.move_uci, "g8f6");
    assert_eq!(
        nf6.classification,
        MoveClassification::Blunder,
        "Nf6 should be classified as a Blunder, got: {:?}. Change: {}",
        nf6.classification,
        nf6.evaluation_change
    );

    let mate = &results[6].annotation;
    assert_eq!(mate.move_san, "Qxf7#");
    assert_eq!(mate.evaluation_after, MATE_SCORE);
    assert!(mate.is_best_move);
}
