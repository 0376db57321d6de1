//! Tactical motif detection on a single move.
//!
//! Detectors look at the position before and after one move together with
//! the control grids of both. Only the fork is implemented; other motifs
//! plug in through [`MotifDetector`].

use crate::control::{analyze_control, ControlGrids};
use crate::AnalysisError;
use chess_board::Position;
use chess_core::{Color, Move, Piece, Square};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotifKind {
    Fork,
}

impl MotifKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MotifKind::Fork => "fork",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fork" => Some(MotifKind::Fork),
            _ => None,
        }
    }
}

impl fmt::Display for MotifKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece on a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedPiece {
    pub square: Square,
    pub piece: Piece,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TacticalMotif {
    pub kind: MotifKind,
    /// The move that creates the motif, UCI notation.
    pub move_uci: String,
    /// The moved piece on its landing square.
    pub attacker: PlacedPiece,
    pub pieces_involved: Vec<PlacedPiece>,
    /// Target material minus the attacker's material at risk.
    pub strength: i32,
}

/// Everything a detector sees about one move.
pub struct MotifContext<'a> {
    pub before: &'a Position,
    pub after: &'a Position,
    pub mv: Move,
    pub grids_before: &'a ControlGrids,
    pub grids_after: &'a ControlGrids,
}

pub trait MotifDetector: Send + Sync {
    fn kind(&self) -> MotifKind;

    fn detect(&self, context: &MotifContext<'_>) -> Vec<TacticalMotif>;
}

/// One piece attacking two or more enemy pieces from a square it can hold.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkDetector;

impl ForkDetector {
    /// A cheaper attacker threatens a dearer target whatever the exchange
    /// count. Any non-king attacker threatens the king.
    fn dominates(attacker: Piece, target: Piece) -> bool {
        match (attacker, target) {
            (Piece::King, _) => false,
            (_, Piece::King) => true,
            _ => attacker.material_value() < target.material_value(),
        }
    }
}

impl MotifDetector for ForkDetector {
    fn kind(&self) -> MotifKind {
        MotifKind::Fork
    }

    fn detect(&self, ctx: &MotifContext<'_>) -> Vec<TacticalMotif> {
        let landing = ctx.mv.to;
        let Some((attacker, mover)) = ctx.after.piece_at(landing) else {
            return Vec::new();
        };
        let opponent = mover.opposite();
        let grids = ctx.grids_after;

        let newly_attacked = ctx.after.attacks_of(landing) & !ctx.before.attacks_of(ctx.mv.from);
        let targets: Vec<PlacedPiece> = newly_attacked
            .into_iter()
            .filter_map(|sq| match ctx.after.piece_at(sq) {
                Some((piece, color)) if color == opponent => Some(PlacedPiece {
                    square: sq,
                    piece,
                    color,
                }),
                _ => None,
            })
            .filter(|t| {
                grids.control(mover, t.square) > grids.control(opponent, t.square)
                    || Self::dominates(attacker, t.piece)
            })
            .collect();
        if targets.len() < 2 {
            return Vec::new();
        }

        let ours = grids.control(mover, landing);
        let theirs = grids.control(opponent, landing);
        let at_risk = if theirs == 0 { 0 } else { attacker.material_value() };
        let best_target = targets
            .iter()
            .map(|t| t.piece.material_value())
            .max()
            .unwrap_or(0);
        let safe = theirs == 0 || ours > theirs || (ours == theirs && at_risk < best_target);
        if !safe {
            return Vec::new();
        }

        let total: u32 = targets.iter().map(|t| t.piece.material_value()).sum();
        vec![TacticalMotif {
            kind: MotifKind::Fork,
            move_uci: ctx.mv.to_uci(),
            attacker: PlacedPiece {
                square: landing,
                piece: attacker,
                color: mover,
            },
            pieces_involved: targets,
            strength: total as i32 - at_risk as i32,
        }]
    }
}

/// Runs a set of detectors over a move.
pub struct TacticalMotifDetector {
    detectors: Vec<Box<dyn MotifDetector>>,
}

impl Default for TacticalMotifDetector {
    fn default() -> Self {
        Self::new(vec![Box::new(ForkDetector)])
    }
}

impl TacticalMotifDetector {
    pub fn new(detectors: Vec<Box<dyn MotifDetector>>) -> Self {
        Self { detectors }
    }

    /// Plays `mv` in `before` and collects every motif it creates.
    pub fn detect(&self, before: &Position, mv: Move) -> Result<Vec<TacticalMotif>, AnalysisError> {
        let after = before.play(mv)?;
        let grids_before = analyze_control(before);
        let grids_after = analyze_control(&after);
        Ok(self.detect_in(&MotifContext {
            before,
            after: &after,
            mv,
            grids_before: &grids_before,
            grids_after: &grids_after,
        }))
    }

    pub fn detect_in(&self, context: &MotifContext<'_>) -> Vec<TacticalMotif> {
        self.detectors
            .iter()
            .flat_map(|d| d.detect(context))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motifs(fen: &str, uci: &str) -> Vec<TacticalMotif> {
        let position = Position::from_fen(fen).unwrap();
        TacticalMotifDetector::default()
            .detect(&position, Move::from_uci(uci).unwrap())
            .unwrap()
    }

    fn sq(s: &str) -> Square {
        Square::from_algebraic(s).unwrap()
    }

    #[test]
    fn test_knight_forks_king_and_queen() {
        let found = motifs("2q3k1/8/8/3N4/8/8/8/6K1 w - - 0 1", "d5e7");
        assert_eq!(found.len(), 1);
        let fork = &found[0];
        assert_eq!(fork.kind, MotifKind::Fork);
        assert_eq!(fork.attacker.piece, Piece::Knight);
        assert_eq!(fork.attacker.square, sq("e7"));
        assert_eq!(fork.pieces_involved.len(), 2);
        let squares: Vec<Square> = fork.pieces_involved.iter().map(|p| p.square).collect();
        assert!(squares.contains(&sq("c8")));
        assert!(squares.contains(&sq("g8")));
        assert_eq!(fork.strength, 9);
    }

    #[test]
    fn test_pawn_fork_beats_defended_pieces() {
        // Both targets are defended, the pawn is worth less than either.
        let found = motifs("4k3/1p3p2/2r1n3/8/3P4/8/8/4K3 w - - 0 1", "d4d5");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attacker.piece, Piece::Pawn);
        assert_eq!(found[0].strength, 8);
    }

    #[test]
    fn test_unsafe_landing_square() {
        // The rook on e2 takes the knight for free.
        assert!(motifs("2q3k1/8/8/3N4/8/8/4r3/6K1 w - - 0 1", "d5e7").is_empty());
    }

    #[test]
    fn test_contested_landing_square() {
        // Bishop b4 and rook e2 both see e7; the knight is cheaper than the queen.
        let found = motifs("2q3k1/8/8/3N4/1B6/8/4r3/6K1 w - - 0 1", "d5e7");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strength, 9 - 3);
    }

    #[test]
    fn test_single_target_is_not_a_fork() {
        assert!(motifs("2q5/8/8/3N4/8/8/8/k5K1 w - - 0 1", "d5e7").is_empty());
    }

    #[test]
    fn test_already_attacked_targets_do_not_count() {
        // The rook already attacked both pawns from c4.
        assert!(motifs("k7/8/8/8/p1R1p3/8/8/6K1 w - - 0 1", "c4d4").is_empty());
    }

    #[test]
    fn test_motif_kind_names() {
        assert_eq!(MotifKind::parse("fork"), Some(MotifKind::Fork));
        assert_eq!(MotifKind::Fork.to_string(), "fork");
        assert_eq!(MotifKind::parse("pin"), None);
    }
}
