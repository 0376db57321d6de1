//! Legal move generation and move application.

use crate::attacks::{attacks_from, pawn_attacks};
use crate::{Bitboard, Position};
use chess_core::{Color, Move, Piece, Square};

const PROMOTIONS: [Piece; 4] = [Piece::Queen, Piece::Rook, Piece::Bishop, Piece::Knight];

/// All legal moves for the side to move.
pub(crate) fn legal_moves(position: &Position) -> Vec<Move> {
    let us = position.side_to_move;
    let mut moves = pseudo_legal_moves(position);
    moves.retain(|&m| match make_move(position, m) {
        Some(next) => next
            .king_square(us)
            .map(|k| !next.is_square_attacked(k, us.opposite()))
            .unwrap_or(true),
        None => false,
    });
    moves
}

fn pseudo_legal_moves(position: &Position) -> Vec<Move> {
    let us = position.side_to_move;
    let own = position.colors[us.index()];
    let occupied = position.occupied();
    let mut moves = Vec::with_capacity(48);

    pawn_moves(position, &mut moves);

    for piece in [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen, Piece::King] {
        for from in position.pieces_of(piece, us) {
            for to in attacks_from(piece, us, from, occupied) & !own {
                moves.push(Move::new(from, to));
            }
        }
    }

    castling_moves(position, &mut moves);
    moves
}

fn push_pawn_move(moves: &mut Vec<Move>, from: Square, to: Square, promotion_rank: u8) {
    if to.rank() == promotion_rank {
        for piece in PROMOTIONS {
            moves.push(Move::promoting(from, to, piece));
        }
    } else {
        moves.push(Move::new(from, to));
    }
}

fn pawn_moves(position: &Position, moves: &mut Vec<Move>) {
    let us = position.side_to_move;
    let them = position.colors[us.opposite().index()];
    let occupied = position.occupied();
    let (forward, start_rank, promotion_rank) = match us {
        Color::White => (1i8, 1u8, 7u8),
        Color::Black => (-1i8, 6u8, 0u8),
    };

    for from in position.pieces_of(Piece::Pawn, us) {
        if let Some(one) = from.offset(0, forward) {
            if !occupied.contains(one) {
                push_pawn_move(moves, from, one, promotion_rank);
                if from.rank() == start_rank {
                    if let Some(two) = one.offset(0, forward) {
                        if !occupied.contains(two) {
                            moves.push(Move::new(from, two));
                        }
                    }
                }
            }
        }

        let mut targets = pawn_attacks(from, us) & them;
        if let Some(ep) = position.en_passant {
            if pawn_attacks(from, us).contains(ep) {
                targets.set(ep);
            }
        }
        for to in targets {
            push_pawn_move(moves, from, to, promotion_rank);
        }
    }
}

fn castling_moves(position: &Position, moves: &mut Vec<Move>) {
    let us = position.side_to_move;
    let them = us.opposite();
    let king = match us {
        Color::White => Square::E1,
        Color::Black => Square::E8,
    };
    if position.piece_at(king) != Some((Piece::King, us)) || position.is_square_attacked(king, them)
    {
        return;
    }
    let occupied = position.occupied();

    // (kingside, rook square, squares that must be empty, squares the king crosses)
    let (rank, home_rank) = match us {
        Color::White => (0u8, [Square::H1, Square::A1]),
        Color::Black => (7u8, [Square::H8, Square::A8]),
    };
    let on_rank = |files: &[u8]| -> Vec<Square> {
        files.iter().filter_map(|&f| Square::from_coords(f, rank)).collect()
    };
    let options = [
        (true, home_rank[0], on_rank(&[5, 6]), on_rank(&[5, 6])),
        (false, home_rank[1], on_rank(&[1, 2, 3]), on_rank(&[3, 2])),
    ];

    for (kingside, rook, between, crossed) in options {
        if !position.castling.has(us, kingside) || position.piece_at(rook) != Some((Piece::Rook, us)) {
            continue;
        }
        let between: Bitboard = between.into_iter().collect();
        if (between & occupied).is_not_empty() {
            continue;
        }
        if crossed.iter().any(|&sq| position.is_square_attacked(sq, them)) {
            continue;
        }
        if let Some(&target) = crossed.last() {
            moves.push(Move::new(king, target));
        }
    }
}

/// Applies a pseudo-legal move. Castling, en passant and double pushes are
/// recognised from the board; returns `None` if `m.from` is empty.
pub(crate) fn make_move(position: &Position, m: Move) -> Option<Position> {
    let (piece, us) = position.piece_at(m.from)?;
    let them = us.opposite();
    let mut next = position.clone();

    next.remove(piece, us, m.from);

    let mut capture = false;
    if let Some((captured, _)) = position.piece_at(m.to) {
        next.remove(captured, them, m.to);
        capture = true;
    }

    let is_en_passant = piece == Piece::Pawn
        && Some(m.to) == position.en_passant
        && m.from.file() != m.to.file()
        && !capture;
    if is_en_passant {
        if let Some(victim) = Square::from_coords(m.to.file(), m.from.rank()) {
            next.remove(Piece::Pawn, them, victim);
            capture = true;
        }
    }

    next.put(m.promotion.unwrap_or(piece), us, m.to);

    if piece == Piece::King && m.from.file().abs_diff(m.to.file()) == 2 {
        let rank = m.from.rank();
        let (rook_from, rook_to) = if m.to.file() == 6 { (7, 5) } else { (0, 3) };
        if let (Some(rf), Some(rt)) = (Square::from_coords(rook_from, rank), Square::from_coords(rook_to, rank)) {
            next.remove(Piece::Rook, us, rf);
            next.put(Piece::Rook, us, rt);
        }
    }

    if piece == Piece::King {
        next.castling.remove_color(us);
    }
    for (corner, color, kingside) in [
        (Square::H1, Color::White, true),
        (Square::A1, Color::White, false),
        (Square::H8, Color::Black, true),
        (Square::A8, Color::Black, false),
    ] {
        if m.from == corner || m.to == corner {
            next.castling.remove(color, kingside);
        }
    }

    next.en_passant = if piece == Piece::Pawn && m.from.rank().abs_diff(m.to.rank()) == 2 {
        Square::from_coords(m.from.file(), (m.from.rank() + m.to.rank()) / 2)
    } else {
        None
    };

    if piece == Piece::Pawn || capture {
        next.halfmove_clock = 0;
    } else {
        next.halfmove_clock += 1;
    }
    if us == Color::Black {
        next.fullmove_number += 1;
    }
    next.side_to_move = them;

    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> Move {
        Move::from_uci(s).unwrap()
    }

    #[test]
    fn startpos_has_twenty_moves() {
        assert_eq!(legal_moves(&Position::startpos()).len(), 20);
    }

    #[test]
    fn double_push_sets_en_passant() {
        let next = make_move(&Position::startpos(), mv("e2e4")).unwrap();
        assert_eq!(next.en_passant, Square::from_algebraic("e3"));
        assert_eq!(next.side_to_move, Color::Black);
        assert_eq!(next.halfmove_clock, 0);
    }

    #[test]
    fn en_passant_captures_the_passed_pawn() {
        let pos =
            Position::from_fen("rnbqkbnr/pppp1ppp/8/4pP2/8/8/PPPPP1PP/RNBQKBNR w KQkq e6 0 3").unwrap();
        assert!(legal_moves(&pos).contains(&mv("f5e6")));
        let next = make_move(&pos, mv("f5e6")).unwrap();
        assert_eq!(next.piece_at(Square::from_algebraic("e5").unwrap()), None);
        assert_eq!(
            next.piece_at(Square::from_algebraic("e6").unwrap()),
            Some((Piece::Pawn, Color::White))
        );
    }

    #[test]
    fn castling_moves_the_rook() {
        let pos = Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let moves = legal_moves(&pos);
        assert!(moves.contains(&mv("e1g1")));
        assert!(moves.contains(&mv("e1c1")));

        let next = make_move(&pos, mv("e1g1")).unwrap();
        assert_eq!(next.piece_at(Square::F1), Some((Piece::Rook, Color::White)));
        assert_eq!(next.piece_at(Square::H1), None);
        assert!(!next.castling.has(Color::White, true));
        assert!(!next.castling.has(Color::White, false));
        assert!(next.castling.has(Color::Black, true));
    }

    #[test]
    fn no_castling_through_attacked_square() {
        let pos = Position::from_fen("r3k2r/pppp1ppp/8/8/8/8/PPPP1PPP/R3K2R w KQkq - 0 1").unwrap();
        assert!(legal_moves(&pos).contains(&mv("e1g1")));

        let pos = Position::from_fen("r3k2r/ppppp1pp/8/8/8/8/PPPPP1PP/R3K2R w KQkq - 0 1").unwrap();
        let with_rook = Position::from_fen("r3kr2/ppppp1pp/8/8/8/8/PPPPP1PP/R3K2R w KQq - 0 1").unwrap();
        assert!(legal_moves(&pos).contains(&mv("e1g1")));
        assert!(!legal_moves(&with_rook).contains(&mv("e1g1")));
    }

    #[test]
    fn promotions_expand_to_four_pieces() {
        let pos = Position::from_fen("8/P7/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        let promos = legal_moves(&pos).into_iter().filter(|m| m.promotion.is_some()).count();
        assert_eq!(promos, 4);
    }

    #[test]
    fn pinned_piece_cannot_move() {
        // Bishop on e2 pinned against e1 by the e8 rook
        let pos = Position::from_fen("4r1k1/8/8/8/8/8/4B3/4K3 w - - 0 1").unwrap();
        assert!(legal_moves(&pos).iter().all(|m| m.from != Square::from_algebraic("e2").unwrap()));
    }
}
