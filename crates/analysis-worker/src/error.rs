//! Error types for the queue, storage and workers.

use chess_analysis::AnalysisError;
use thiserror::Error;

/// Failures of the backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Another thread panicked while holding the connection.
    #[error("Database connection poisoned")]
    Poisoned,
    /// A stored value could not be read back.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Why a job (or a worker's attempt at it) stopped.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("Storage write failed after {attempts} attempts: {source}")]
    StorageWriteFailure { attempts: u32, source: StoreError },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Game not found: {0}")]
    GameNotFound(String),
    #[error("Invalid game {game_id}: {reason}")]
    InvalidGame { game_id: String, reason: String },
    #[error("cancelled")]
    Cancelled,
    /// The lease was taken away, by expiry or a forced requeue.
    #[error("Lease lost")]
    LeaseLost,
    /// The worker is stopping and hands the job back.
    #[error("Worker shutting down")]
    ShuttingDown,
}

impl WorkerError {
    /// Whether the job should be retried rather than failed outright.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::Analysis(e) => e.is_transient(),
            WorkerError::StorageWriteFailure { .. } | WorkerError::Store(_) => true,
            WorkerError::GameNotFound(_)
            | WorkerError::InvalidGame { .. }
            | WorkerError::Cancelled
            | WorkerError::LeaseLost
            | WorkerError::ShuttingDown => false,
        }
    }
}
