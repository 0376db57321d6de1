//! Property tests over random legal positions.

use chess_analysis::analyze_control;
use chess_board::Position;
use chess_core::{Color, Piece, Square};
use proptest::prelude::*;

/// Counts attackers of `target` by trying every piece's geometry directly.
fn recount(position: &Position, target: Square, color: Color) -> (u32, u32) {
    let occupied = position.occupied();
    let (mut count, mut material) = (0, 0);
    for from in Square::all() {
        let Some((piece, c)) = position.piece_at(from) else {
            continue;
        };
        if c != color || from == target {
            continue;
        }
        let df = target.file() as i8 - from.file() as i8;
        let dr = target.rank() as i8 - from.rank() as i8;
        let clear_path = || {
            let (sf, sr) = (df.signum(), dr.signum());
            let steps = df.abs().max(dr.abs());
            (1..steps).all(|k| match from.offset(sf * k, sr * k) {
                Some(sq) => !occupied.contains(sq),
                None => false,
            })
        };
        let straight = df == 0 || dr == 0;
        let diagonal = df.abs() == dr.abs();
        let hits = match piece {
            Piece::Pawn => {
                let forward = if color == Color::White { 1 } else { -1 };
                dr == forward && df.abs() == 1
            }
            Piece::Knight => (df.abs(), dr.abs()) == (1, 2) || (df.abs(), dr.abs()) == (2, 1),
            Piece::King => df.abs() <= 1 && dr.abs() <= 1,
            Piece::Bishop => diagonal && clear_path(),
            Piece::Rook => straight && clear_path(),
            Piece::Queen => (diagonal || straight) && clear_path(),
        };
        if hits {
            count += 1;
            material += piece.material_value();
        }
    }
    (count, material)
}

fn walk(start: &str, choices: Vec<prop::sample::Index>) -> Position {
    let mut position = Position::from_fen(start).unwrap();
    for choice in choices {
        let moves = position.legal_moves();
        if moves.is_empty() {
            break;
        }
        position = position.play(moves[choice.index(moves.len())]).unwrap();
    }
    position
}

fn arbitrary_position() -> impl Strategy<Value = Position> {
    prop::collection::vec(any::<prop::sample::Index>(), 0..40)
        .prop_map(|choices| walk(chess_core::FenParser::STARTPOS, choices))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn control_matches_recount(position in arbitrary_position()) {
        let grids = analyze_control(&position);
        for sq in Square::all() {
            for color in Color::BOTH {
                let (count, material) = recount(&position, sq, color);
                prop_assert_eq!(grids.control(color, sq), count, "{} {:?}", position.to_fen(), sq);
                prop_assert_eq!(grids.material(color, sq), material);
            }
        }
    }
}
