//! Piece kinds and their material scale.

use crate::Color;
use serde::{Deserialize, Serialize};

/// The six kinds of chess pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Piece {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl Piece {
    /// All piece kinds in index order.
    pub const ALL: [Piece; 6] = [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
        Piece::King,
    ];

    /// Index of this piece kind (0-5).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Material value in pawns. The king is worth nothing here: it contributes
    /// to square control but never to material weighting.
    #[inline]
    pub const fn material_value(self) -> u32 {
        match self {
            Piece::Pawn => 1,
            Piece::Knight | Piece::Bishop => 3,
            Piece::Rook => 5,
            Piece::Queen => 9,
            Piece::King => 0,
        }
    }

    /// FEN character for this piece in the given color.
    pub const fn to_fen_char(self, color: Color) -> char {
        let c = match self {
            Piece::Pawn => 'p',
            Piece::Knight => 'n',
            Piece::Bishop => 'b',
            Piece::Rook => 'r',
            Piece::Queen => 'q',
            Piece::King => 'k',
        };
        match color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// Parses a FEN character into a piece and its color.
    pub const fn from_fen_char(c: char) -> Option<(Piece, Color)> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let piece = match c.to_ascii_lowercase() {
            'p' => Piece::Pawn,
            'n' => Piece::Knight,
            'b' => Piece::Bishop,
            'r' => Piece::Rook,
            'q' => Piece::Queen,
            'k' => Piece::King,
            _ => return None,
        };
        Some((piece, color))
    }

    /// SAN letter; pawns have none.
    pub const fn san_letter(self) -> Option<char> {
        match self {
            Piece::Pawn => None,
            Piece::Knight => Some('N'),
            Piece::Bishop => Some('B'),
            Piece::Rook => Some('R'),
            Piece::Queen => Some('Q'),
            Piece::King => Some('K'),
        }
    }

    /// Returns true for bishops, rooks, and queens.
    #[inline]
    pub const fn is_slider(self) -> bool {
        matches!(self, Piece::Bishop | Piece::Rook | Piece::Queen)
    }
}

impl std::fmt::Display for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Piece::Pawn => "pawn",
            Piece::Knight => "knight",
            Piece::Bishop => "bishop",
            Piece::Rook => "rook",
            Piece::Queen => "queen",
            Piece::King => "king",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_scale() {
        assert_eq!(Piece::Pawn.material_value(), 1);
        assert_eq!(Piece::Knight.material_value(), 3);
        assert_eq!(Piece::Bishop.material_value(), 3);
        assert_eq!(Piece::Rook.material_value(), 5);
        assert_eq!(Piece::Queen.material_value(), 9);
        assert_eq!(Piece::King.material_value(), 0);
    }

    #[test]
    fn fen_chars() {
        assert_eq!(Piece::Knight.to_fen_char(Color::White), 'N');
        assert_eq!(Piece::Queen.to_fen_char(Color::Black), 'q');
        assert_eq!(Piece::from_fen_char('K'), Some((Piece::King, Color::White)));
        assert_eq!(Piece::from_fen_char('r'), Some((Piece::Rook, Color::Black)));
        assert_eq!(Piece::from_fen_char('x'), None);
    }

    #[test]
    fn san_letters() {
        assert_eq!(Piece::Pawn.san_letter(), None);
        assert_eq!(Piece::Knight.san_letter(), Some('N'));
    }
}
