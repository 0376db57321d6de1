//! Core chess vocabulary shared by the analysis crates.
//!
//! - [`Color`] and [`Piece`], including the material scale used for
//!   square-control weighting and tactic scoring
//! - [`Square`] coordinates
//! - [`Move`] in coordinate (UCI) form
//! - FEN parsing, validation, and colour mirroring

mod color;
mod fen;
mod mov;
mod piece;
mod square;

pub use color::Color;
pub use fen::{mirror_fen, FenError, FenParser};
pub use mov::{Move, MoveParseError};
pub use piece::Piece;
pub use square::Square;
