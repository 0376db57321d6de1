//! Analysis failures as seen by callers.

use crate::engine::EngineError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The engine crashed, could not be spawned, or stopped talking, and
    /// respawning did not help.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    /// Malformed FEN or an impossible position. Retrying cannot fix it.
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
    #[error("Analysis timed out after {0:?}")]
    AnalysisTimeout(Duration),
}

impl AnalysisError {
    /// Whether retrying the same work later can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AnalysisError::InvalidPosition(_))
    }
}

impl From<EngineError> for AnalysisError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Timeout(after) => AnalysisError::AnalysisTimeout(after),
            other => AnalysisError::EngineUnavailable(other.to_string()),
        }
    }
}

impl From<chess_core::FenError> for AnalysisError {
    fn from(err: chess_core::FenError) -> Self {
        AnalysisError::InvalidPosition(err.to_string())
    }
}

impl From<chess_board::BoardError> for AnalysisError {
    fn from(err: chess_board::BoardError) -> Self {
        AnalysisError::InvalidPosition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transience() {
        assert!(AnalysisError::EngineUnavailable("x".into()).is_transient());
        assert!(AnalysisError::AnalysisTimeout(Duration::from_secs(1)).is_transient());
        assert!(!AnalysisError::InvalidPosition("x".into()).is_transient());
    }

    #[test]
    fn test_engine_error_mapping() {
        let timeout: AnalysisError = EngineError::Timeout(Duration::from_millis(5)).into();
        assert!(matches!(timeout, AnalysisError::AnalysisTimeout(_)));
        let closed: AnalysisError = EngineError::Closed.into();
        assert!(matches!(closed, AnalysisError::EngineUnavailable(_)));
    }
}
