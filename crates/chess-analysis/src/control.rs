//! Per-square control counts.
//!
//! Every piece adds one to its colour's control count on each square it
//! pseudo-legally attacks, and its material value to the material grid.
//! Occupancy of the attacked square does not matter, so a piece defending
//! its own neighbour counts the same as one attacking an enemy. Kings count
//! for control with material 0.

use chess_board::Position;
use chess_core::{Color, Square};
use serde::{Deserialize, Serialize};

/// An 8×8 grid indexed `[rank][file]`, rank 0 being white's back rank.
pub type Grid = [[u32; 8]; 8];

/// The four control grids of one position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlGrids {
    pub white_control: Grid,
    pub black_control: Grid,
    pub white_control_material: Grid,
    pub black_control_material: Grid,
}

impl ControlGrids {
    /// Number of `color`'s pieces attacking `sq`.
    pub fn control(&self, color: Color, sq: Square) -> u32 {
        let grid = match color {
            Color::White => &self.white_control,
            Color::Black => &self.black_control,
        };
        grid[sq.rank() as usize][sq.file() as usize]
    }

    /// Summed material value of `color`'s pieces attacking `sq`.
    pub fn material(&self, color: Color, sq: Square) -> u32 {
        let grid = match color {
            Color::White => &self.white_control_material,
            Color::Black => &self.black_control_material,
        };
        grid[sq.rank() as usize][sq.file() as usize]
    }

    fn add(&mut self, color: Color, sq: Square, value: u32) {
        let (count, material) = match color {
            Color::White => (&mut self.white_control, &mut self.white_control_material),
            Color::Black => (&mut self.black_control, &mut self.black_control_material),
        };
        let (r, f) = (sq.rank() as usize, sq.file() as usize);
        count[r][f] += 1;
        material[r][f] += value;
    }
}

/// Computes [`ControlGrids`] for positions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SquareControlAnalyzer;

impl SquareControlAnalyzer {
    pub fn analyze(&self, position: &Position) -> ControlGrids {
        analyze_control(position)
    }
}

pub fn analyze_control(position: &Position) -> ControlGrids {
    let mut grids = ControlGrids::default();
    for from in position.occupied() {
        let Some((piece, color)) = position.piece_at(from) else {
            continue;
        };
        let value = piece.material_value();
        for target in position.attacks_of(from) {
            grids.add(color, target, value);
        }
    }
    grids
}
