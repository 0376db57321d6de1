//! Attack sets cross-checked against a square-by-square scan.

use chess_board::{attacks_from, Bitboard, Position};
use chess_core::{Color, Piece, Square};
use proptest::prelude::*;

/// Walks each direction one square at a time with no tables involved.
fn scan_attacks(position: &Position, from: Square) -> Bitboard {
    let Some((piece, color)) = position.piece_at(from) else {
        return Bitboard::EMPTY;
    };
    let occupied = position.occupied();
    let mut out = Bitboard::EMPTY;
    let leap = |out: &mut Bitboard, steps: &[(i8, i8)]| {
        for &(df, dr) in steps {
            if let Some(sq) = from.offset(df, dr) {
                out.set(sq);
            }
        }
    };
    let slide = |out: &mut Bitboard, dirs: &[(i8, i8)]| {
        for &(df, dr) in dirs {
            let mut k = 1;
            while let Some(sq) = from.offset(df * k, dr * k) {
                out.set(sq);
                if occupied.contains(sq) {
                    break;
                }
                k += 1;
            }
        }
    };
    let diag: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
    let ortho: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
    match piece {
        Piece::Pawn => {
            let dr: i8 = if color == Color::White { 1 } else { -1 };
            leap(&mut out, &[(1, dr), (-1, dr)]);
        }
        Piece::Knight => leap(
            &mut out,
            &[(1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2)],
        ),
        Piece::King => leap(&mut out, [diag, ortho].concat().as_slice()),
        Piece::Bishop => slide(&mut out, &diag),
        Piece::Rook => slide(&mut out, &ortho),
        Piece::Queen => slide(&mut out, [diag, ortho].concat().as_slice()),
    }
    out
}

fn arbitrary_position() -> impl Strategy<Value = Position> {
    // Random walks from the start position keep the boards legal.
    prop::collection::vec(any::<prop::sample::Index>(), 0..40).prop_map(|choices| {
        let mut position = Position::startpos();
        for choice in choices {
            let moves = position.legal_moves();
            if moves.is_empty() {
                break;
            }
            position = position.play(moves[choice.index(moves.len())]).unwrap();
        }
        position
    })
}

proptest! {
    #[test]
    fn attack_tables_match_scan(position in arbitrary_position()) {
        for sq in Square::all() {
            if let Some((piece, color)) = position.piece_at(sq) {
                prop_assert_eq!(
                    attacks_from(piece, color, sq, position.occupied()),
                    scan_attacks(&position, sq)
                );
            }
        }
    }

    #[test]
    fn fen_roundtrip_from_random_games(position in arbitrary_position()) {
        let fen = position.to_fen();
        prop_assert_eq!(Position::from_fen(&fen).unwrap(), position);
    }
}
