//! Coordinate-form moves.

use crate::{Piece, Square};
use std::fmt;
use thiserror::Error;

/// Errors from parsing UCI move text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("invalid move length in '{0}'")]
    Length(String),
    #[error("invalid square in '{0}'")]
    Square(String),
    #[error("invalid promotion piece in '{0}'")]
    Promotion(String),
}

/// A move as an engine speaks it: origin, destination, optional promotion.
///
/// Castling is the king's two-file step (e1g1) and en passant is a plain
/// diagonal pawn move; the board resolves both from context.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Piece>,
}

impl Move {
    /// A non-promoting move.
    #[inline]
    pub const fn new(from: Square, to: Square) -> Self {
        Move {
            from,
            to,
            promotion: None,
        }
    }

    /// A promoting move.
    #[inline]
    pub const fn promoting(from: Square, to: Square, piece: Piece) -> Self {
        Move {
            from,
            to,
            promotion: Some(piece),
        }
    }

    /// Parses UCI notation ("e2e4", "e7e8q").
    pub fn from_uci(s: &str) -> Result<Self, MoveParseError> {
        if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
            return Err(MoveParseError::Length(s.to_string()));
        }
        let from = Square::from_algebraic(&s[0..2])
            .ok_or_else(|| MoveParseError::Square(s.to_string()))?;
        let to = Square::from_algebraic(&s[2..4])
            .ok_or_else(|| MoveParseError::Square(s.to_string()))?;
        let promotion = match s.as_bytes().get(4) {
            None => None,
            Some(b'n') | Some(b'N') => Some(Piece::Knight),
            Some(b'b') | Some(b'B') => Some(Piece::Bishop),
            Some(b'r') | Some(b'R') => Some(Piece::Rook),
            Some(b'q') | Some(b'Q') => Some(Piece::Queen),
            Some(_) => return Err(MoveParseError::Promotion(s.to_string())),
        };
        Ok(Move {
            from,
            to,
            promotion,
        })
    }

    /// UCI notation.
    pub fn to_uci(self) -> String {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(piece) = self.promotion {
            s.push(piece.to_fen_char(crate::Color::Black));
        }
        s
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Move({})", self.to_uci())
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

impl std::str::FromStr for Move {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Move::from_uci(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_move() {
        let m = Move::from_uci("e2e4").unwrap();
        assert_eq!(m.from.to_algebraic(), "e2");
        assert_eq!(m.to.to_algebraic(), "e4");
        assert_eq!(m.promotion, None);
        assert_eq!(m.to_uci(), "e2e4");
    }

    #[test]
    fn parse_promotion() {
        let m: Move = "e7e8q".parse().unwrap();
        assert_eq!(m.promotion, Some(Piece::Queen));
        assert_eq!(m.to_uci(), "e7e8q");
        assert_eq!(Move::from_uci("a2a1N").unwrap().to_uci(), "a2a1n");
    }

    #[test]
    fn reject_malformed() {
        assert!(matches!(Move::from_uci("e2"), Err(MoveParseError::Length(_))));
        assert!(matches!(Move::from_uci("e2e4qq"), Err(MoveParseError::Length(_))));
        assert!(matches!(Move::from_uci("e2e9"), Err(MoveParseError::Square(_))));
        assert!(matches!(Move::from_uci("e7e8k"), Err(MoveParseError::Promotion(_))));
        assert!(Move::from_uci("(none)").is_err());
    }
}
