//! The surface other parts of the application call into.

use chess_analysis::{AdaptiveResponseSelector, EvenMoveChoice, MoveAnnotation};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::annotations::{AnnotationStore, StoredMotif};
use crate::error::WorkerError;
use crate::queue::{JobQueue, JobStatus, JobStatusReport};

pub struct AnalysisService {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn AnnotationStore>,
    selector: Arc<AdaptiveResponseSelector>,
}

impl AnalysisService {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn AnnotationStore>,
        selector: Arc<AdaptiveResponseSelector>,
    ) -> Self {
        Self {
            queue,
            store,
            selector,
        }
    }

    /// Queues a game for analysis.
    ///
    /// Idempotent: an existing job is left alone, unless it has finished
    /// (analyzed or failed) and `force_retry` is set, in which case it
    /// starts over from the first move.
    pub fn trigger_analysis(
        &self,
        game_id: &str,
        priority: i64,
        force_retry: bool,
    ) -> Result<JobStatusReport, WorkerError> {
        let job = match self.queue.job(game_id)? {
            None => {
                info!(game_id, priority, "analysis job created");
                self.queue.create_job(game_id, priority)?
            }
            Some(job) if force_retry && matches!(job.status, JobStatus::Analyzed | JobStatus::Failed) => {
                info!(game_id, priority, previous = %job.status, "analysis job restarted");
                self.queue
                    .reset_job(game_id, priority)?
                    .unwrap_or(job)
            }
            Some(job) => job,
        };
        Ok(job.report())
    }

    pub fn get_status(&self, game_id: &str) -> Result<Option<JobStatusReport>, WorkerError> {
        Ok(self.queue.get_job_status(game_id)?)
    }

    /// A reply for the engine side of a coached game. Blocks on the engine.
    pub fn get_even_move(
        &self,
        fen: &str,
        eval_change: i32,
        skill_level: u8,
        move_time: Duration,
    ) -> Result<EvenMoveChoice, WorkerError> {
        Ok(self.selector.select(fen, eval_change, skill_level, move_time)?)
    }

    pub fn cancel(&self, game_id: &str) -> Result<Option<JobStatus>, WorkerError> {
        Ok(self.queue.request_cancel(game_id)?)
    }

    pub fn force_requeue(&self, game_id: &str) -> Result<bool, WorkerError> {
        Ok(self.queue.force_requeue(game_id)?)
    }

    pub fn annotations(&self, game_id: &str) -> Result<Vec<MoveAnnotation>, WorkerError> {
        Ok(self.store.annotations(game_id)?)
    }

    pub fn motifs(&self, game_id: &str) -> Result<Vec<StoredMotif>, WorkerError> {
        Ok(self.store.motifs(game_id)?)
    }
}
