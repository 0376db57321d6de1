//! Board state.

use chess_core::{Color, FenError, FenParser, Move, MoveParseError, Piece, Square};
use thiserror::Error;

use crate::attacks::{attacks_from, bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks};
use crate::{movegen, san, Bitboard};

/// Errors from building positions or applying moves.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error(transparent)]
    Fen(#[from] FenError),

    #[error(transparent)]
    MoveText(#[from] MoveParseError),

    #[error(transparent)]
    San(#[from] san::SanError),

    #[error("illegal move {mv} in {fen}")]
    IllegalMove { mv: String, fen: String },
}

/// Castling rights flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: CastlingRights = CastlingRights(0);
    const WHITE_KINGSIDE: u8 = 0b0001;
    const WHITE_QUEENSIDE: u8 = 0b0010;
    const BLACK_KINGSIDE: u8 = 0b0100;
    const BLACK_QUEENSIDE: u8 = 0b1000;

    fn from_fen_field(field: &str) -> Self {
        let mut flags = 0;
        for c in field.chars() {
            flags |= match c {
                'K' => Self::WHITE_KINGSIDE,
                'Q' => Self::WHITE_QUEENSIDE,
                'k' => Self::BLACK_KINGSIDE,
                'q' => Self::BLACK_QUEENSIDE,
                _ => 0,
            };
        }
        CastlingRights(flags)
    }

    const fn flag(color: Color, kingside: bool) -> u8 {
        match (color, kingside) {
            (Color::White, true) => Self::WHITE_KINGSIDE,
            (Color::White, false) => Self::WHITE_QUEENSIDE,
            (Color::Black, true) => Self::BLACK_KINGSIDE,
            (Color::Black, false) => Self::BLACK_QUEENSIDE,
        }
    }

    #[inline]
    pub const fn has(self, color: Color, kingside: bool) -> bool {
        self.0 & Self::flag(color, kingside) != 0
    }

    #[inline]
    pub fn remove(&mut self, color: Color, kingside: bool) {
        self.0 &= !Self::flag(color, kingside);
    }

    #[inline]
    pub fn remove_color(&mut self, color: Color) {
        self.remove(color, true);
        self.remove(color, false);
    }

    fn to_fen_field(self) -> String {
        if self.0 == 0 {
            return "-".to_string();
        }
        [('K', Color::White, true), ('Q', Color::White, false), ('k', Color::Black, true), ('q', Color::Black, false)]
            .iter()
            .filter(|(_, color, kingside)| self.has(*color, *kingside))
            .map(|(c, _, _)| *c)
            .collect()
    }
}

/// Complete chess position state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Indexed by [`Piece::index`].
    pub pieces: [Bitboard; 6],
    /// Indexed by [`Color::index`].
    pub colors: [Bitboard; 2],
    pub side_to_move: Color,
    pub castling: CastlingRights,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl Position {
    fn empty() -> Self {
        Position {
            pieces: [Bitboard::EMPTY; 6],
            colors: [Bitboard::EMPTY; 2],
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// The standard starting position.
    pub fn startpos() -> Self {
        let mut position = Position::empty();
        let back_rank = [
            Piece::Rook,
            Piece::Knight,
            Piece::Bishop,
            Piece::Queen,
            Piece::King,
            Piece::Bishop,
            Piece::Knight,
            Piece::Rook,
        ];
        for (file, piece) in back_rank.into_iter().enumerate() {
            let file = file as u8;
            for (color, back, pawns) in [(Color::White, 0, 1), (Color::Black, 7, 6)] {
                if let Some(sq) = Square::from_coords(file, back) {
                    position.put(piece, color, sq);
                }
                if let Some(sq) = Square::from_coords(file, pawns) {
                    position.put(Piece::Pawn, color, sq);
                }
            }
        }
        position.castling = CastlingRights::from_fen_field("KQkq");
        position
    }

    /// Creates a position from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        let parsed = FenParser::parse(fen)?;
        let mut position = Position::empty();
        for (sq, occupant) in Square::all().zip(parsed.squares()) {
            if let Some((piece, color)) = occupant {
                position.put(piece, color, sq);
            }
        }
        position.side_to_move = parsed.side_to_move;
        position.castling = CastlingRights::from_fen_field(&parsed.castling);
        position.en_passant = parsed.en_passant;
        position.halfmove_clock = parsed.halfmove_clock;
        position.fullmove_number = parsed.fullmove_number;
        Ok(position)
    }

    /// Serializes to FEN.
    pub fn to_fen(&self) -> String {
        let mut placement = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let occupant = Square::from_coords(file, rank).and_then(|sq| self.piece_at(sq));
                match occupant {
                    Some((piece, color)) => {
                        if empty > 0 {
                            placement.push_str(&empty.to_string());
                            empty = 0;
                        }
                        placement.push(piece.to_fen_char(color));
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                placement.push_str(&empty.to_string());
            }
            if rank > 0 {
                placement.push('/');
            }
        }

        FenParser {
            piece_placement: placement,
            side_to_move: self.side_to_move,
            castling: self.castling.to_fen_field(),
            en_passant: self.en_passant,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
        }
        .to_string()
    }

    pub(crate) fn put(&mut self, piece: Piece, color: Color, sq: Square) {
        self.pieces[piece.index()].set(sq);
        self.colors[color.index()].set(sq);
    }

    pub(crate) fn remove(&mut self, piece: Piece, color: Color, sq: Square) {
        self.pieces[piece.index()].clear(sq);
        self.colors[color.index()].clear(sq);
    }

    /// The piece and its colour on `sq`, if any.
    pub fn piece_at(&self, sq: Square) -> Option<(Piece, Color)> {
        let color = Color::BOTH
            .into_iter()
            .find(|c| self.colors[c.index()].contains(sq))?;
        let piece = Piece::ALL
            .into_iter()
            .find(|p| self.pieces[p.index()].contains(sq))?;
        Some((piece, color))
    }

    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.colors[0] | self.colors[1]
    }

    #[inline]
    pub fn pieces_of(&self, piece: Piece, color: Color) -> Bitboard {
        self.pieces[piece.index()] & self.colors[color.index()]
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces_of(Piece::King, color).first()
    }

    /// Every square attacked by the piece standing on `sq`.
    pub fn attacks_of(&self, sq: Square) -> Bitboard {
        match self.piece_at(sq) {
            Some((piece, color)) => attacks_from(piece, color, sq, self.occupied()),
            None => Bitboard::EMPTY,
        }
    }

    /// Pieces of `by` that attack `sq`.
    pub fn attackers_to(&self, sq: Square, by: Color) -> Bitboard {
        let occupied = self.occupied();
        let diagonal = self.pieces_of(Piece::Bishop, by) | self.pieces_of(Piece::Queen, by);
        let straight = self.pieces_of(Piece::Rook, by) | self.pieces_of(Piece::Queen, by);
        (pawn_attacks(sq, by.opposite()) & self.pieces_of(Piece::Pawn, by))
            | (knight_attacks(sq) & self.pieces_of(Piece::Knight, by))
            | (king_attacks(sq) & self.pieces_of(Piece::King, by))
            | (bishop_attacks(sq, occupied) & diagonal)
            | (rook_attacks(sq, occupied) & straight)
    }

    pub fn is_square_attacked(&self, sq: Square, by: Color) -> bool {
        self.attackers_to(sq, by).is_not_empty()
    }

    /// True if the side to move is in check.
    pub fn is_check(&self) -> bool {
        self.king_square(self.side_to_move)
            .map(|k| self.is_square_attacked(k, self.side_to_move.opposite()))
            .unwrap_or(false)
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        movegen::legal_moves(self)
    }

    pub fn is_legal(&self, mv: Move) -> bool {
        self.legal_moves().contains(&mv)
    }

    pub fn is_checkmate(&self) -> bool {
        self.is_check() && self.legal_moves().is_empty()
    }

    pub fn is_stalemate(&self) -> bool {
        !self.is_check() && self.legal_moves().is_empty()
    }

    /// Applies a legal move, returning the resulting position.
    pub fn play(&self, mv: Move) -> Result<Position, BoardError> {
        if !self.is_legal(mv) {
            return Err(self.illegal(mv.to_uci()));
        }
        movegen::make_move(self, mv).ok_or_else(|| self.illegal(mv.to_uci()))
    }

    /// Resolves move text in UCI ("g1f3") or SAN ("Nf3") form to a legal move.
    pub fn parse_move(&self, text: &str) -> Result<Move, BoardError> {
        if let Ok(mv) = Move::from_uci(text) {
            if self.is_legal(mv) {
                return Ok(mv);
            }
            return Err(self.illegal(text.to_string()));
        }
        Ok(san::san_to_move(self, text)?)
    }

    fn illegal(&self, mv: String) -> BoardError {
        BoardError::IllegalMove {
            mv,
            fen: self.to_fen(),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::from_algebraic(s).unwrap()
    }

    #[test]
    fn startpos_matches_fen() {
        assert_eq!(Position::startpos().to_fen(), FenParser::STARTPOS);
        assert_eq!(Position::from_fen(FenParser::STARTPOS).unwrap(), Position::startpos());
    }

    #[test]
    fn fen_roundtrip_preserves_fields() {
        for fen in [
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3",
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            "r3k2r/8/8/8/8/8/8/R3K2R w Kq - 0 1",
        ] {
            assert_eq!(Position::from_fen(fen).unwrap().to_fen(), fen);
        }
    }

    #[test]
    fn piece_queries() {
        let pos = Position::startpos();
        assert_eq!(pos.piece_at(Square::E1), Some((Piece::King, Color::White)));
        assert_eq!(pos.piece_at(sq("e4")), None);
        assert_eq!(pos.pieces_of(Piece::Pawn, Color::Black).count(), 8);
        assert_eq!(pos.king_square(Color::Black), Some(Square::E8));
        assert_eq!(pos.occupied().count(), 32);
    }

    #[test]
    fn attackers_and_attacks() {
        let pos = Position::startpos();
        // e3 is covered by the d2 and f2 pawns
        assert_eq!(pos.attackers_to(sq("e3"), Color::White).count(), 2);
        assert!(!pos.is_square_attacked(sq("e4"), Color::White));
        assert_eq!(pos.attacks_of(sq("g1")).count(), 3);
        assert!(pos.attacks_of(sq("e4")).is_empty());
    }

    #[test]
    fn check_mate_and_stalemate() {
        let mate = Position::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();
        assert!(mate.is_check());
        assert!(mate.is_checkmate());
        assert!(!mate.is_stalemate());

        let stale = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(!stale.is_check());
        assert!(stale.is_stalemate());
    }

    #[test]
    fn play_rejects_illegal() {
        let pos = Position::startpos();
        let err = pos.play(Move::from_uci("e2e5").unwrap()).unwrap_err();
        assert!(matches!(err, BoardError::IllegalMove { .. }));
        let next = pos.play(Move::from_uci("e2e4").unwrap()).unwrap();
        assert_eq!(next.side_to_move, Color::Black);
    }

    #[test]
    fn parse_move_accepts_uci_and_san() {
        let pos = Position::startpos();
        assert_eq!(pos.parse_move("g1f3").unwrap(), pos.parse_move("Nf3").unwrap());
        assert!(pos.parse_move("Qh5").is_err());
    }

    #[test]
    fn castling_rights_flags() {
        let mut rights = CastlingRights::from_fen_field("KQkq");
        assert!(rights.has(Color::White, true));
        rights.remove(Color::White, true);
        assert!(!rights.has(Color::White, true));
        assert!(rights.has(Color::White, false));
        rights.remove_color(Color::Black);
        assert_eq!(rights.to_fen_field(), "Q");
    }
}
