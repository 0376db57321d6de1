//! Even-move reply selection.
//!
//! Instead of punishing a player's mistake (or failing to answer a strong
//! move), the engine picks the reply that brings the evaluation back to
//! where it stood before the player moved.

use crate::evaluator::PositionEvaluator;
use crate::AnalysisError;
use chess_board::Position;
use chess_core::Move;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvenMoveConfig {
    /// Replies considered. When at least the number of legal moves, every
    /// legal move is a candidate and the shallow search is skipped.
    #[serde(default = "default_candidates")]
    pub candidates: u32,
    /// Depth of the multi-line search that picks candidates.
    #[serde(default = "default_shallow_depth")]
    pub shallow_depth: u32,
    /// Depth each candidate's resulting position is evaluated at.
    #[serde(default = "default_standard_depth")]
    pub standard_depth: u32,
    /// Largest accepted distance from the target, in centipawns.
    #[serde(default = "default_tolerance_cp")]
    pub tolerance_cp: i32,
}

fn default_candidates() -> u32 {
    20
}

fn default_shallow_depth() -> u32 {
    6
}

fn default_standard_depth() -> u32 {
    12
}

fn default_tolerance_cp() -> i32 {
    100
}

impl Default for EvenMoveConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            shallow_depth: default_shallow_depth(),
            standard_depth: default_standard_depth(),
            tolerance_cp: default_tolerance_cp(),
        }
    }
}

/// Why the selector played the engine's own move instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The closest candidate missed the target by more than the tolerance.
    OutsideTolerance { closest: Move, distance: i32 },
    SearchFailed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::OutsideTolerance { closest, distance } => {
                write!(f, "closest reply {} missed target by {}cp", closest, distance)
            }
            FallbackReason::SearchFailed(reason) => write!(f, "search failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvenMoveChoice {
    pub mv: Move,
    /// Evaluation the reply aims for, side to move. `None` if the search
    /// failed before it was known.
    pub target: Option<i32>,
    /// Evaluation after the chosen reply, side to move. `None` on fallback.
    pub resulting_eval: Option<i32>,
    pub fallback: Option<FallbackReason>,
}

struct Scored {
    mv: Move,
    resulting: i32,
}

pub struct AdaptiveResponseSelector {
    evaluator: Arc<PositionEvaluator>,
    config: EvenMoveConfig,
}

impl AdaptiveResponseSelector {
    pub fn new(evaluator: Arc<PositionEvaluator>, config: EvenMoveConfig) -> Self {
        Self { evaluator, config }
    }

    pub fn config(&self) -> &EvenMoveConfig {
        &self.config
    }

    /// Picks a reply in `fen` (engine to move). `eval_change` is how much the
    /// player's last move shifted the evaluation, engine's perspective.
    pub fn select(
        &self,
        fen: &str,
        eval_change: i32,
        skill_level: u8,
        move_time: Duration,
    ) -> Result<EvenMoveChoice, AnalysisError> {
        let position = Position::from_fen(fen)?;
        if position.legal_moves().is_empty() {
            return Err(AnalysisError::InvalidPosition(format!("no legal moves in {}", fen)));
        }

        let (target, reason) = match self.closest_reply(&position, fen, eval_change) {
            Ok((target, best)) => {
                let distance = (best.resulting - target).abs();
                if distance <= self.config.tolerance_cp {
                    debug!(fen, mv = %best.mv, target, resulting = best.resulting, "even move found");
                    return Ok(EvenMoveChoice {
                        mv: best.mv,
                        target: Some(target),
                        resulting_eval: Some(best.resulting),
                        fallback: None,
                    });
                }
                (
                    Some(target),
                    FallbackReason::OutsideTolerance {
                        closest: best.mv,
                        distance,
                    },
                )
            }
            Err(e) => {
                warn!(fen, error = %e, "even-move search failed, falling back");
                (None, FallbackReason::SearchFailed(e.to_string()))
            }
        };

        let mv = self.evaluator.evaluate_at_skill(fen, skill_level, move_time)?;
        debug!(fen, mv = %mv, reason = %reason, "even move fallback");
        Ok(EvenMoveChoice {
            mv,
            target,
            resulting_eval: None,
            fallback: Some(reason),
        })
    }

    fn closest_reply(
        &self,
        position: &Position,
        fen: &str,
        eval_change: i32,
    ) -> Result<(i32, Scored), AnalysisError> {
        let current = self
            .evaluator
            .evaluate(fen, self.config.standard_depth)?
            .side_to_move_cp();
        let target = current - eval_change;

        let mut best: Option<Scored> = None;
        for mv in self.candidates(position, fen)? {
            let child = position.play(mv)?;
            let resulting = -self
                .evaluator
                .evaluate(&child.to_fen(), self.config.standard_depth)?
                .side_to_move_cp();
            let closer = match &best {
                None => true,
                Some(b) => {
                    let (d, bd) = ((resulting - target).abs(), (b.resulting - target).abs());
                    d < bd || (d == bd && resulting > b.resulting)
                }
            };
            if closer {
                best = Some(Scored { mv, resulting });
            }
        }
        best.map(|b| (target, b))
            .ok_or_else(|| AnalysisError::InvalidPosition(format!("no candidates in {}", fen)))
    }

    fn candidates(&self, position: &Position, fen: &str) -> Result<Vec<Move>, AnalysisError> {
        let legal = position.legal_moves();
        if self.config.candidates as usize >= legal.len() {
            return Ok(legal);
        }
        let lines = self
            .evaluator
            .candidate_lines(fen, self.config.candidates, self.config.shallow_depth)?;
        if lines.is_empty() {
            return Ok(legal);
        }
        Ok(lines.into_iter().map(|l| l.mv).collect())
    }
}
