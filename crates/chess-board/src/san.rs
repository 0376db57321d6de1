//! Standard Algebraic Notation.
//!
//! Examples: "e4", "Nf3", "Bxc6", "O-O", "e8=Q", "Nbd2", "R1e1", "Qh4#".

use crate::movegen::make_move;
use crate::Position;
use chess_core::{Move, Piece, Square};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SanError {
    #[error("empty SAN string")]
    Empty,
    #[error("invalid SAN format: {0}")]
    InvalidFormat(String),
    #[error("no legal move matches: {0}")]
    NoMatchingMove(String),
    #[error("ambiguous move: {0}")]
    AmbiguousMove(String),
}

/// Renders a legal move in SAN, including the check or mate suffix.
///
/// `position` is the state before the move.
pub fn move_to_san(position: &Position, m: Move) -> String {
    let Some((piece, _)) = position.piece_at(m.from) else {
        return m.to_uci();
    };

    let mut san = String::new();
    if piece == Piece::King && m.from.file().abs_diff(m.to.file()) == 2 {
        san.push_str(if m.to.file() == 6 { "O-O" } else { "O-O-O" });
    } else {
        let capture = position.piece_at(m.to).is_some()
            || (piece == Piece::Pawn && m.from.file() != m.to.file());

        if let Some(letter) = piece.san_letter() {
            san.push(letter);
            san.push_str(&disambiguation(position, m, piece));
        } else if capture {
            san.push((b'a' + m.from.file()) as char);
        }
        if capture {
            san.push('x');
        }
        san.push_str(&m.to.to_algebraic());
        if let Some(letter) = m.promotion.and_then(Piece::san_letter) {
            san.push('=');
            san.push(letter);
        }
    }

    if let Some(next) = make_move(position, m) {
        if next.is_checkmate() {
            san.push('#');
        } else if next.is_check() {
            san.push('+');
        }
    }
    san
}

fn disambiguation(position: &Position, m: Move, piece: Piece) -> String {
    let rivals: Vec<Square> = position
        .legal_moves()
        .into_iter()
        .filter(|other| other.to == m.to && other.from != m.from)
        .filter(|other| position.piece_at(other.from).map(|(p, _)| p) == Some(piece))
        .map(|other| other.from)
        .collect();

    if rivals.is_empty() {
        return String::new();
    }
    let file = (b'a' + m.from.file()) as char;
    let rank = (b'1' + m.from.rank()) as char;
    if rivals.iter().all(|sq| sq.file() != m.from.file()) {
        file.to_string()
    } else if rivals.iter().all(|sq| sq.rank() != m.from.rank()) {
        rank.to_string()
    } else {
        format!("{}{}", file, rank)
    }
}

/// Resolves a SAN string to the legal move it denotes.
pub fn san_to_move(position: &Position, san: &str) -> Result<Move, SanError> {
    let trimmed = san.trim().trim_end_matches(['+', '#', '!', '?']);
    if trimmed.is_empty() {
        return Err(SanError::Empty);
    }

    let legal = position.legal_moves();

    if matches!(trimmed, "O-O" | "0-0" | "O-O-O" | "0-0-0") {
        let target_file = if trimmed.len() == 3 { 6 } else { 2 };
        return legal
            .into_iter()
            .find(|m| {
                position.piece_at(m.from).map(|(p, _)| p) == Some(Piece::King)
                    && m.from.file() == 4
                    && m.to.file() == target_file
            })
            .ok_or_else(|| SanError::NoMatchingMove(san.to_string()));
    }

    let (body, promotion) = match trimmed.split_once('=') {
        Some((body, promo)) => {
            let piece = promo
                .chars()
                .next()
                .and_then(|c| Piece::from_fen_char(c).map(|(p, _)| p))
                .filter(|p| !matches!(p, Piece::Pawn | Piece::King))
                .ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;
            (body, Some(piece))
        }
        None => (trimmed, None),
    };

    let mut chars: Vec<char> = body.chars().filter(|&c| c != 'x' && c != '-').collect();
    let piece = match chars.first() {
        Some(c) if c.is_ascii_uppercase() => {
            let (p, _) = Piece::from_fen_char(*c)
                .filter(|(p, _)| *p != Piece::Pawn)
                .ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;
            chars.remove(0);
            p
        }
        _ => Piece::Pawn,
    };

    if chars.len() < 2 || chars.len() > 4 {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let dest: String = chars[chars.len() - 2..].iter().collect();
    let to = Square::from_algebraic(&dest).ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;

    let mut from_file = None;
    let mut from_rank = None;
    for &c in &chars[..chars.len() - 2] {
        match c {
            'a'..='h' => from_file = Some(c as u8 - b'a'),
            '1'..='8' => from_rank = Some(c as u8 - b'1'),
            _ => return Err(SanError::InvalidFormat(san.to_string())),
        }
    }

    let matching: Vec<Move> = legal
        .into_iter()
        .filter(|m| m.to == to && m.promotion == promotion)
        .filter(|m| position.piece_at(m.from).map(|(p, _)| p) == Some(piece))
        .filter(|m| from_file.map_or(true, |f| m.from.file() == f))
        .filter(|m| from_rank.map_or(true, |r| m.from.rank() == r))
        .collect();

    match matching.as_slice() {
        [] => Err(SanError::NoMatchingMove(san.to_string())),
        [only] => Ok(*only),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn san_of(fen: &str, uci: &str) -> String {
        let pos = Position::from_fen(fen).unwrap();
        move_to_san(&pos, Move::from_uci(uci).unwrap())
    }

    #[test]
    fn renders_basic_moves() {
        let start = chess_core::FenParser::STARTPOS;
        assert_eq!(san_of(start, "e2e4"), "e4");
        assert_eq!(san_of(start, "g1f3"), "Nf3");
    }

    #[test]
    fn renders_captures_and_checks() {
        let fen = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";
        assert_eq!(san_of(fen, "e4d5"), "exd5");
        let fen = "rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2";
        assert_eq!(san_of(fen, "d8h4"), "Qh4#");
        assert_eq!(san_of("2q3k1/8/8/3N4/8/8/8/6K1 w - - 0 1", "d5e7"), "Ne7+");
    }

    #[test]
    fn renders_castling_and_promotion() {
        let fen = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1";
        assert_eq!(san_of(fen, "e1g1"), "O-O");
        assert_eq!(san_of(fen, "e1c1"), "O-O-O");
        assert_eq!(san_of("8/P6k/8/8/8/8/8/4K3 w - - 0 1", "a7a8q"), "a8=Q");
    }

    #[test]
    fn disambiguates_by_file_then_rank() {
        let fen = "7k/8/8/8/8/8/8/R4RK1 w - - 0 1";
        assert_eq!(san_of(fen, "a1d1"), "Rad1");
        let fen = "4k3/R7/8/8/8/8/8/R3K3 w - - 0 1";
        assert_eq!(san_of(fen, "a1a4"), "R1a4");
    }

    #[test]
    fn parses_san() {
        let pos = Position::startpos();
        assert_eq!(san_to_move(&pos, "Nf3").unwrap(), Move::from_uci("g1f3").unwrap());
        assert_eq!(san_to_move(&pos, "e4").unwrap(), Move::from_uci("e2e4").unwrap());
        assert!(matches!(san_to_move(&pos, "Ke2"), Err(SanError::NoMatchingMove(_))));
        assert!(matches!(san_to_move(&pos, ""), Err(SanError::Empty)));

        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R4R1K w - - 0 1").unwrap();
        assert!(matches!(san_to_move(&pos, "Rd1"), Err(SanError::AmbiguousMove(_))));
        assert_eq!(san_to_move(&pos, "Rfd1").unwrap(), Move::from_uci("f1d1").unwrap());
    }

    #[test]
    fn parses_castling_and_promotion() {
        let pos = Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(san_to_move(&pos, "O-O").unwrap(), Move::from_uci("e1g1").unwrap());
        assert_eq!(san_to_move(&pos, "O-O-O").unwrap(), Move::from_uci("e1c1").unwrap());
        let pos = Position::from_fen("8/P6k/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(san_to_move(&pos, "a8=N").unwrap(), Move::from_uci("a7a8n").unwrap());
    }
}
