//! Expands a move list into per-ply records.

use chess_core::Color;

use crate::{move_to_san, BoardError, Position};

/// One half-move of a replayed game, with the board on either side of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalfMove {
    /// Fullmove number the ply belongs to (1. e4 e5 are both move 1).
    pub move_number: u32,
    pub color: Color,
    pub san: String,
    pub uci: String,
    pub fen_before: String,
    pub fen_after: String,
}

/// Replays `moves` (UCI or SAN text) from `start_fen`.
///
/// Stops at the first move that is not legal and reports it.
pub fn replay<S: AsRef<str>>(start_fen: &str, moves: &[S]) -> Result<Vec<HalfMove>, BoardError> {
    let mut position = Position::from_fen(start_fen)?;
    let mut plies = Vec::with_capacity(moves.len());

    for text in moves {
        let mv = position.parse_move(text.as_ref())?;
        let san = move_to_san(&position, mv);
        let next = position.play(mv)?;
        plies.push(HalfMove {
            move_number: position.fullmove_number,
            color: position.side_to_move,
            san,
            uci: mv.to_uci(),
            fen_before: position.to_fen(),
            fen_after: next.to_fen(),
        });
        position = next;
    }

    Ok(plies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::FenParser;

    #[test]
    fn numbers_plies_by_fullmove() {
        let plies = replay(FenParser::STARTPOS, &["e2e4", "e7e5", "g1f3"]).unwrap();
        let keys: Vec<(u32, Color)> = plies.iter().map(|p| (p.move_number, p.color)).collect();
        assert_eq!(
            keys,
            vec![(1, Color::White), (1, Color::Black), (2, Color::White)]
        );
        assert_eq!(plies[2].san, "Nf3");
        assert_eq!(plies[0].fen_after, plies[1].fen_before);
    }

    #[test]
    fn accepts_san_input() {
        let plies = replay(FenParser::STARTPOS, &["f3", "e5", "g4", "Qh4#"]).unwrap();
        assert_eq!(plies[3].uci, "d8h4");
        assert_eq!(plies[3].san, "Qh4#");
    }

    #[test]
    fn black_to_move_start() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let plies = replay(fen, &["c7c5"]).unwrap();
        assert_eq!(plies[0].color, Color::Black);
        assert_eq!(plies[0].move_number, 1);
    }

    #[test]
    fn reports_illegal_move() {
        let err = replay(FenParser::STARTPOS, &["e2e4", "e2e4"]).unwrap_err();
        assert!(matches!(err, BoardError::IllegalMove { .. }));
        assert!(replay("bad fen", &["e2e4"]).is_err());
    }
}
