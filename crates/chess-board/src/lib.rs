//! Board model for game analysis.
//!
//! This crate provides:
//! - [`Bitboard`] - 64-bit square sets
//! - [`Position`] - full board state with FEN import/export
//! - attack sets for every piece ([`attacks_from`]), used both by legal move
//!   generation and by square-control analysis
//! - legal move generation and move application
//! - SAN rendering and parsing
//! - [`replay`] - turns a start position plus a move list into per-ply records
//!
//! # Example
//!
//! ```
//! use chess_board::{replay, Position};
//!
//! let position = Position::startpos();
//! assert_eq!(position.legal_moves().len(), 20);
//!
//! let plies = replay(chess_core::FenParser::STARTPOS, &["e2e4", "e7e5"]).unwrap();
//! assert_eq!(plies[0].san, "e4");
//! assert_eq!(plies[1].move_number, 1);
//! ```

mod attacks;
mod bitboard;
mod movegen;
mod position;
mod replay;
pub mod san;

pub use attacks::{
    attacks_from, bishop_attacks, king_attacks, knight_attacks, pawn_attacks, queen_attacks,
    rook_attacks,
};
pub use bitboard::Bitboard;
pub use position::{BoardError, CastlingRights, Position};
pub use replay::{replay, HalfMove};
pub use san::{move_to_san, san_to_move, SanError};
