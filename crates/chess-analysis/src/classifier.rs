//! Move quality labels from evaluation deltas.

use chess_core::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Centipawn loss cutoffs, mover's perspective. A delta sitting exactly on a
/// cutoff gets the less severe label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationThresholds {
    #[serde(default = "default_blunder")]
    pub blunder: i32,
    #[serde(default = "default_mistake")]
    pub mistake: i32,
    #[serde(default = "default_inaccuracy")]
    pub inaccuracy: i32,
}

fn default_blunder() -> i32 {
    300
}

fn default_mistake() -> i32 {
    150
}

fn default_inaccuracy() -> i32 {
    50
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            blunder: default_blunder(),
            mistake: default_mistake(),
            inaccuracy: default_inaccuracy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveClassification {
    Best,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveClassification {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveClassification::Best => "best",
            MoveClassification::Good => "good",
            MoveClassification::Inaccuracy => "inaccuracy",
            MoveClassification::Mistake => "mistake",
            MoveClassification::Blunder => "blunder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "best" => Some(MoveClassification::Best),
            "good" => Some(MoveClassification::Good),
            "inaccuracy" => Some(MoveClassification::Inaccuracy),
            "mistake" => Some(MoveClassification::Mistake),
            "blunder" => Some(MoveClassification::Blunder),
            _ => None,
        }
    }
}

impl fmt::Display for MoveClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation change from the mover's point of view. Both inputs are
/// white-perspective centipawns.
pub fn mover_delta(evaluation_before: i32, evaluation_after: i32, mover: Color) -> i32 {
    (evaluation_after - evaluation_before) * mover.sign()
}

/// Opening theory lookup.
pub trait OpeningBook: Send + Sync {
    fn contains(&self, fen_before: &str, move_uci: &str) -> bool;
}

/// A book that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpeningBook;

impl OpeningBook for NoOpeningBook {
    fn contains(&self, _fen_before: &str, _move_uci: &str) -> bool {
        false
    }
}

/// A fixed set of (position, move) pairs. Positions ignore move counters.
#[derive(Debug, Default, Clone)]
pub struct KnownPositions {
    entries: HashSet<(String, String)>,
}

impl KnownPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fen_before: &str, move_uci: &str) {
        self.entries.insert((position_key(fen_before), move_uci.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OpeningBook for KnownPositions {
    fn contains(&self, fen_before: &str, move_uci: &str) -> bool {
        self.entries
            .contains(&(position_key(fen_before), move_uci.to_string()))
    }
}

fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

pub struct MoveClassifier {
    thresholds: ClassificationThresholds,
    book: Box<dyn OpeningBook>,
}

impl Default for MoveClassifier {
    fn default() -> Self {
        Self::new(ClassificationThresholds::default())
    }
}

impl MoveClassifier {
    pub fn new(thresholds: ClassificationThresholds) -> Self {
        Self {
            thresholds,
            book: Box::new(NoOpeningBook),
        }
    }

    pub fn with_book(mut self, book: Box<dyn OpeningBook>) -> Self {
        self.book = book;
        self
    }

    pub fn thresholds(&self) -> ClassificationThresholds {
        self.thresholds
    }

    pub fn classify(
        &self,
        evaluation_before: i32,
        evaluation_after: i32,
        mover: Color,
        is_best_move: bool,
    ) -> MoveClassification {
        let delta = mover_delta(evaluation_before, evaluation_after, mover);
        let t = &self.thresholds;
        if delta < -t.blunder {
            MoveClassification::Blunder
        } else if delta < -t.mistake {
            MoveClassification::Mistake
        } else if delta < -t.inaccuracy {
            MoveClassification::Inaccuracy
        } else if is_best_move {
            MoveClassification::Best
        } else {
            MoveClassification::Good
        }
    }

    pub fn is_book_move(&self, fen_before: &str, move_uci: &str) -> bool {
        self.book.contains(fen_before, move_uci)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_delta(delta: i32, is_best: bool) -> MoveClassification {
        MoveClassifier::default().classify(0, delta, Color::White, is_best)
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(classify_delta(-350, false), MoveClassification::Blunder);
        assert_eq!(classify_delta(-301, true), MoveClassification::Blunder);
        assert_eq!(classify_delta(-300, false), MoveClassification::Mistake);
        assert_eq!(classify_delta(-151, false), MoveClassification::Mistake);
        assert_eq!(classify_delta(-150, false), MoveClassification::Inaccuracy);
        assert_eq!(classify_delta(-51, false), MoveClassification::Inaccuracy);
        assert_eq!(classify_delta(-50, false), MoveClassification::Good);
        assert_eq!(classify_delta(-50, true), MoveClassification::Best);
        assert_eq!(classify_delta(120, false), MoveClassification::Good);
    }

    #[test]
    fn test_black_mover_flips_sign() {
        let classifier = MoveClassifier::default();
        // White-perspective eval rises by 400 after a black move: black blundered.
        assert_eq!(
            classifier.classify(-100, 300, Color::Black, false),
            MoveClassification::Blunder
        );
        assert_eq!(mover_delta(-100, 300, Color::Black), -400);
        assert_eq!(
            classifier.classify(300, -100, Color::Black, true),
            MoveClassification::Best
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let classifier = MoveClassifier::new(ClassificationThresholds {
            blunder: 200,
            mistake: 100,
            inaccuracy: 20,
        });
        assert_eq!(classifier.classify(0, -201, Color::White, false), MoveClassification::Blunder);
        assert_eq!(classifier.classify(0, -200, Color::White, false), MoveClassification::Mistake);
        assert_eq!(classifier.classify(0, -21, Color::White, false), MoveClassification::Inaccuracy);
    }

    #[test]
    fn test_thresholds_deserialize_with_defaults() {
        let t: ClassificationThresholds = serde_json::from_str(r#"{"blunder": 400}"#).unwrap();
        assert_eq!(t.blunder, 400);
        assert_eq!(t.mistake, 150);
        assert_eq!(t.inaccuracy, 50);
    }

    #[test]
    fn test_known_positions_book() {
        let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let mut book = KnownPositions::new();
        book.insert(start, "e2e4");
        let classifier = MoveClassifier::default().with_book(Box::new(book));
        assert!(classifier.is_book_move(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 3 9",
            "e2e4"
        ));
        assert!(!classifier.is_book_move(start, "d2d4"));
        assert!(!MoveClassifier::default().is_book_move(start, "e2e4"));
    }

    #[test]
    fn test_classification_names() {
        for c in [
            MoveClassification::Best,
            MoveClassification::Good,
            MoveClassification::Inaccuracy,
            MoveClassification::Mistake,
            MoveClassification::Blunder,
        ] {
            assert_eq!(MoveClassification::parse(c.as_str()), Some(c));
        }
        assert_eq!(MoveClassification::parse("brilliant"), None);
    }
}
