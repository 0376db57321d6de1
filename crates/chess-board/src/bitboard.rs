//! Square sets packed into a `u64`.

use chess_core::Square;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// A set of squares.
///
/// Bit 0 = a1, bit 1 = b1, ..., bit 63 = h8, matching [`Square::index`].
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Bitboard(pub u64);

impl Bitboard {
    pub const EMPTY: Bitboard = Bitboard(0);
    pub const FULL: Bitboard = Bitboard(!0);

    pub const RANK_2: Bitboard = Bitboard(0x0000_0000_0000_FF00);
    pub const RANK_7: Bitboard = Bitboard(0x00FF_0000_0000_0000);

    #[inline]
    pub const fn from_square(sq: Square) -> Self {
        Bitboard(sq.bit())
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_not_empty(self) -> bool {
        self.0 != 0
    }

    /// Number of squares in the set.
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    #[inline]
    pub const fn contains(self, sq: Square) -> bool {
        self.0 & sq.bit() != 0
    }

    #[inline]
    pub fn set(&mut self, sq: Square) {
        self.0 |= sq.bit();
    }

    #[inline]
    pub fn clear(&mut self, sq: Square) {
        self.0 &= !sq.bit();
    }

    /// Lowest square in the set.
    #[inline]
    pub fn first(self) -> Option<Square> {
        if self.0 == 0 {
            None
        } else {
            Square::from_index(self.0.trailing_zeros() as u8)
        }
    }

    /// Removes and returns the lowest square in the set.
    #[inline]
    pub fn pop_first(&mut self) -> Option<Square> {
        let sq = self.first()?;
        self.0 &= self.0 - 1;
        Some(sq)
    }
}

impl BitAnd for Bitboard {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Bitboard(self.0 & rhs.0)
    }
}

impl BitAndAssign for Bitboard {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitOr for Bitboard {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Bitboard(self.0 | rhs.0)
    }
}

impl BitOrAssign for Bitboard {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Not for Bitboard {
    type Output = Self;
    #[inline]
    fn not(self) -> Self::Output {
        Bitboard(!self.0)
    }
}

impl fmt::Debug for Bitboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bitboard({:#018x})", self.0)?;
        for rank in (0..8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8 {
                let mark = if (self.0 >> (rank * 8 + file)) & 1 == 1 { "X" } else { "." };
                write!(f, "{} ", mark)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  a b c d e f g h")
    }
}

/// Iterator over the squares of a bitboard, lowest first.
pub struct BitboardIter(Bitboard);

impl Iterator for BitboardIter {
    type Item = Square;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.pop_first()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.0.count() as usize;
        (count, Some(count))
    }
}

impl IntoIterator for Bitboard {
    type Item = Square;
    type IntoIter = BitboardIter;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        BitboardIter(self)
    }
}

impl FromIterator<Square> for Bitboard {
    fn from_iter<I: IntoIterator<Item = Square>>(iter: I) -> Self {
        let mut bb = Bitboard::EMPTY;
        for sq in iter {
            bb.set(sq);
        }
        bb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::from_algebraic(s).unwrap()
    }

    #[test]
    fn set_clear_contains() {
        let mut bb = Bitboard::EMPTY;
        bb.set(sq("e4"));
        assert!(bb.contains(sq("e4")));
        assert!(!bb.contains(sq("e5")));
        assert_eq!(bb.count(), 1);
        bb.clear(sq("e4"));
        assert!(bb.is_empty());
    }

    #[test]
    fn iterates_lowest_first() {
        let bb: Bitboard = [sq("h8"), sq("a1"), sq("d4")].into_iter().collect();
        let squares: Vec<Square> = bb.into_iter().collect();
        assert_eq!(squares, vec![sq("a1"), sq("d4"), sq("h8")]);
    }

    #[test]
    fn pop_first_drains() {
        let mut bb = Bitboard(0b1010);
        assert_eq!(bb.pop_first().map(|s| s.index()), Some(1));
        assert_eq!(bb.pop_first().map(|s| s.index()), Some(3));
        assert_eq!(bb.pop_first(), None);
    }

    #[test]
    fn rank_masks() {
        assert_eq!(Bitboard::RANK_2.count(), 8);
        assert!(Bitboard::RANK_7.contains(sq("c7")));
        assert_eq!(Bitboard::FULL.count(), 64);
    }
}
