//! Chess position evaluation types.

use chess_core::Color;
use serde::{Deserialize, Serialize};
use uci::Score;

/// Centipawn value assigned to an immediate checkmate.
pub const MATE_SCORE: i32 = 10_000;

/// A position evaluation, either a centipawn score or a forced-mate distance.
///
/// An evaluation is always relative to some side: the engine reports from the
/// side to move, stored annotations are from white. [`Evaluation::for_white`]
/// converts between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Evaluation {
    Centipawns(i32),
    /// Mate in N moves (positive = this side mates, negative = this side is mated).
    Mate(i32),
}

impl Evaluation {
    /// Collapses mate scores onto the centipawn scale: mate in `n` is worth
    /// `MATE_SCORE - n`, so shorter mates sort higher.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp.clamp(-MATE_SCORE, MATE_SCORE),
            Evaluation::Mate(n) if n > 0 => MATE_SCORE - n,
            Evaluation::Mate(n) => -MATE_SCORE - n,
        }
    }

    /// The same evaluation seen from the other side.
    pub fn negate(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(-cp),
            Evaluation::Mate(n) => Evaluation::Mate(-n),
        }
    }

    /// Converts a score relative to `side_to_move` into white's perspective.
    pub fn for_white(self, side_to_move: Color) -> Self {
        match side_to_move {
            Color::White => self,
            Color::Black => self.negate(),
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }
}

impl From<Score> for Evaluation {
    fn from(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            // "mate 0": the side to move is already mated
            Score::Mate(0) => Evaluation::Centipawns(-MATE_SCORE),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }
}
