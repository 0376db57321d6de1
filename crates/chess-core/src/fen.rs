//! FEN (Forsyth-Edwards Notation) validation and transforms.

use crate::{Color, Piece, Square};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when parsing FEN strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FenError {
    #[error("invalid FEN: expected 4 or 6 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid piece placement: {0}")]
    PiecePlacement(String),

    #[error("invalid side to move: expected 'w' or 'b', got '{0}'")]
    SideToMove(String),

    #[error("invalid castling rights: {0}")]
    CastlingRights(String),

    #[error("invalid en passant square: {0}")]
    EnPassant(String),

    #[error("invalid move counter: {0}")]
    Counter(String),

    #[error("{color} must have exactly one king, found {count}")]
    KingCount { color: Color, count: usize },
}

/// A validated FEN record, split into its fields.
///
/// Board representations build from this; it does not itself check move
/// legality beyond king count and pawn placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenParser {
    pub piece_placement: String,
    pub side_to_move: Color,
    pub castling: String,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl FenParser {
    /// The standard starting position.
    pub const STARTPOS: &'static str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// Parses a FEN string. Trailing move counters may be omitted and
    /// default to `0 1`.
    pub fn parse(fen: &str) -> Result<Self, FenError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.len() != 6 && parts.len() != 4 {
            return Err(FenError::FieldCount(parts.len()));
        }

        Self::validate_piece_placement(parts[0])?;

        let side_to_move = match parts[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::SideToMove(other.to_string())),
        };

        Self::validate_castling(parts[2])?;
        let en_passant = Self::parse_en_passant(parts[3])?;

        let (halfmove_clock, fullmove_number) = if parts.len() == 6 {
            let half = parts[4]
                .parse::<u32>()
                .map_err(|_| FenError::Counter(parts[4].to_string()))?;
            let full = parts[5]
                .parse::<u32>()
                .map_err(|_| FenError::Counter(parts[5].to_string()))?;
            (half, full.max(1))
        } else {
            (0, 1)
        };

        Ok(FenParser {
            piece_placement: parts[0].to_string(),
            side_to_move,
            castling: parts[2].to_string(),
            en_passant,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// Expands the placement field into 64 optional pieces, a1 first.
    pub fn squares(&self) -> [Option<(Piece, Color)>; 64] {
        let mut board = [None; 64];
        for (i, rank_str) in self.piece_placement.split('/').enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                } else if let Some(pc) = Piece::from_fen_char(c) {
                    if let Some(sq) = Square::from_coords(file, rank) {
                        board[sq.index() as usize] = Some(pc);
                    }
                    file += 1;
                }
            }
        }
        board
    }

    fn validate_piece_placement(placement: &str) -> Result<(), FenError> {
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::PiecePlacement(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }

        let mut kings = [0usize; 2];
        for (i, rank) in ranks.iter().enumerate() {
            let rank_number = 8 - i;
            let mut squares = 0u32;
            for c in rank.chars() {
                if let Some(n) = c.to_digit(10) {
                    if n == 0 || n > 8 {
                        return Err(FenError::PiecePlacement(format!(
                            "invalid empty-run '{}' in rank {}",
                            c, rank_number
                        )));
                    }
                    squares += n;
                    continue;
                }
                let (piece, color) = Piece::from_fen_char(c).ok_or_else(|| {
                    FenError::PiecePlacement(format!(
                        "invalid character '{}' in rank {}",
                        c, rank_number
                    ))
                })?;
                if piece == Piece::Pawn && (rank_number == 1 || rank_number == 8) {
                    return Err(FenError::PiecePlacement(format!(
                        "pawn on back rank {}",
                        rank_number
                    )));
                }
                if piece == Piece::King {
                    kings[color.index()] += 1;
                }
                squares += 1;
            }
            if squares != 8 {
                return Err(FenError::PiecePlacement(format!(
                    "rank {} has {} squares, expected 8",
                    rank_number, squares
                )));
            }
        }

        for color in Color::BOTH {
            let count = kings[color.index()];
            if count != 1 {
                return Err(FenError::KingCount { color, count });
            }
        }
        Ok(())
    }

    fn validate_castling(castling: &str) -> Result<(), FenError> {
        if castling == "-" {
            return Ok(());
        }
        if castling.is_empty() || castling.len() > 4 {
            return Err(FenError::CastlingRights(castling.to_string()));
        }
        for c in castling.chars() {
            if !"KQkq".contains(c) {
                return Err(FenError::CastlingRights(format!("invalid character '{}'", c)));
            }
        }
        Ok(())
    }

    fn parse_en_passant(field: &str) -> Result<Option<Square>, FenError> {
        if field == "-" {
            return Ok(None);
        }
        let sq = Square::from_algebraic(field)
            .ok_or_else(|| FenError::EnPassant(field.to_string()))?;
        if sq.rank() != 2 && sq.rank() != 5 {
            return Err(FenError::EnPassant(format!("{} is not on rank 3 or 6", field)));
        }
        Ok(Some(sq))
    }
}

impl fmt::Display for FenParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ep = self
            .en_passant
            .map(|sq| sq.to_algebraic())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} {} {} {} {} {}",
            self.piece_placement,
            self.side_to_move.to_fen_char(),
            self.castling,
            ep,
            self.halfmove_clock,
            self.fullmove_number
        )
    }
}

/// Mirrors a position top-to-bottom and swaps the colours of every piece.
///
/// The side to move, castling rights and en passant square are swapped to
/// match, so the result is the same position seen from the other player's
/// chair. Evaluations of a position and its mirror are negatives of each
/// other.
pub fn mirror_fen(fen: &str) -> Result<String, FenError> {
    let parsed = FenParser::parse(fen)?;

    let placement = parsed
        .piece_placement
        .split('/')
        .rev()
        .map(|rank| {
            rank.chars()
                .map(|c| {
                    if c.is_ascii_uppercase() {
                        c.to_ascii_lowercase()
                    } else {
                        c.to_ascii_uppercase()
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/");

    let castling = if parsed.castling == "-" {
        "-".to_string()
    } else {
        // Keep the canonical KQkq ordering after the case swap.
        let swapped: Vec<char> = parsed
            .castling
            .chars()
            .map(|c| {
                if c.is_ascii_uppercase() {
                    c.to_ascii_lowercase()
                } else {
                    c.to_ascii_uppercase()
                }
            })
            .collect();
        "KQkq".chars().filter(|c| swapped.contains(c)).collect()
    };

    let mirrored = FenParser {
        piece_placement: placement,
        side_to_move: parsed.side_to_move.opposite(),
        castling,
        en_passant: parsed.en_passant.map(Square::flip_rank),
        halfmove_clock: parsed.halfmove_clock,
        fullmove_number: parsed.fullmove_number,
    };
    Ok(mirrored.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_startpos() {
        let fen = FenParser::parse(FenParser::STARTPOS).unwrap();
        assert_eq!(fen.side_to_move, Color::White);
        assert_eq!(fen.castling, "KQkq");
        assert_eq!(fen.en_passant, None);
        assert_eq!(fen.fullmove_number, 1);
        assert_eq!(fen.to_string(), FenParser::STARTPOS);
    }

    #[test]
    fn parse_short_form_defaults_counters() {
        let fen = FenParser::parse("4k3/8/8/8/8/8/8/4K3 b - -").unwrap();
        assert_eq!(fen.side_to_move, Color::Black);
        assert_eq!(fen.halfmove_clock, 0);
        assert_eq!(fen.fullmove_number, 1);
    }

    #[test]
    fn squares_expand_placement() {
        let fen = FenParser::parse(FenParser::STARTPOS).unwrap();
        let squares = fen.squares();
        assert_eq!(squares[Square::E1.index() as usize], Some((Piece::King, Color::White)));
        assert_eq!(squares[Square::D8.index() as usize], Some((Piece::Queen, Color::Black)));
        assert_eq!(squares[Square::from_algebraic("e4").unwrap().index() as usize], None);
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(FenParser::parse("not a fen"), Err(FenError::FieldCount(3))));
        assert!(matches!(
            FenParser::parse("8/8/8/8/8/8/8/8 w - - 0 1"),
            Err(FenError::KingCount { .. })
        ));
        assert!(matches!(
            FenParser::parse("4k3/8/8/8/8/8/8/4K3 x - - 0 1"),
            Err(FenError::SideToMove(_))
        ));
        assert!(matches!(
            FenParser::parse("4k3/8/8/8/8/8/8/4K2 w - - 0 1"),
            Err(FenError::PiecePlacement(_))
        ));
        assert!(matches!(
            FenParser::parse("P3k3/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenError::PiecePlacement(_))
        ));
        assert!(matches!(
            FenParser::parse("4k3/8/8/8/8/8/8/4K3 w X - 0 1"),
            Err(FenError::CastlingRights(_))
        ));
        assert!(matches!(
            FenParser::parse("4k3/8/8/8/8/8/8/4K3 w - e4 0 1"),
            Err(FenError::EnPassant(_))
        ));
    }

    #[test]
    fn mirror_swaps_sides() {
        let fen = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";
        let mirrored = mirror_fen(fen).unwrap();
        assert_eq!(
            mirrored,
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2"
        );
    }

    #[test]
    fn mirror_is_an_involution() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w Kq - 0 1";
        let once = mirror_fen(fen).unwrap();
        assert_ne!(once, fen);
        assert_eq!(mirror_fen(&once).unwrap(), fen);
    }
}
