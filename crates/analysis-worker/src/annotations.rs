//! Where per-move results go.

use chess_analysis::{MoveAnnotation, TacticalMotif};
use chess_core::Color;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A motif attached to the annotation of one ply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMotif {
    pub game_id: String,
    pub move_number: u32,
    pub color: Color,
    pub motif: TacticalMotif,
}

/// Annotation and motif storage.
///
/// Writes are upserts keyed by `(game_id, move_number, color)`, plus kind and
/// move for motifs, so repeating a ply never duplicates rows.
pub trait AnnotationStore: Send + Sync {
    fn upsert_annotation(&self, annotation: &MoveAnnotation) -> Result<(), StoreError>;

    fn upsert_motif(&self, motif: &StoredMotif) -> Result<(), StoreError>;

    /// Writes a ply's annotation and replaces its motifs in one transaction.
    /// Motifs from an earlier run of the ply that `motifs` lacks are removed.
    fn write_ply(&self, annotation: &MoveAnnotation, motifs: &[TacticalMotif]) -> Result<(), StoreError>;

    /// Annotations of a game in move order.
    fn annotations(&self, game_id: &str) -> Result<Vec<MoveAnnotation>, StoreError>;

    fn motifs(&self, game_id: &str) -> Result<Vec<StoredMotif>, StoreError>;
}
