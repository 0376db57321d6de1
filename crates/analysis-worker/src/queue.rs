//! Job records and the queue interface workers run against.

use chess_analysis::AnalysisPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Analyzing,
    Analyzed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Analyzed => "analyzed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "analyzing" => Some(JobStatus::Analyzing),
            "analyzed" => Some(JobStatus::Analyzed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lease and retry rules applied by a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub lease_ttl: Duration,
    pub stall_window: Duration,
    /// Retries allowed before a job stays failed.
    pub max_retries: u32,
    /// Delay before the first retry of a failed attempt; doubles each time.
    pub retry_backoff: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(120),
            stall_window: Duration::from_secs(600),
            max_retries: 3,
            retry_backoff: Duration::from_secs(30),
        }
    }
}

impl QueuePolicy {
    /// Delay before retry number `retry_count` (1-based) may be claimed.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1 << exponent)
    }
}

/// A per-game analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub game_id: String,
    /// Higher tiers drain first.
    pub priority: i64,
    pub status: JobStatus,
    /// Phase in progress, or last completed once analyzed. `None` until first
    /// claimed.
    pub phase: Option<AnalysisPhase>,
    pub retry_count: u32,
    /// Moves annotated in the current phase.
    pub moves_done: u32,
    pub total_moves: u32,
    pub last_error: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn progress(&self) -> f64 {
        if self.total_moves == 0 {
            return 0.0;
        }
        self.moves_done as f64 / self.total_moves as f64
    }

    pub fn report(&self) -> JobStatusReport {
        JobStatusReport {
            game_id: self.game_id.clone(),
            status: self.status,
            phase: self.phase,
            moves_done: self.moves_done,
            total_moves: self.total_moves,
            progress: self.progress(),
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
        }
    }
}

/// What a client polls for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub game_id: String,
    pub status: JobStatus,
    pub phase: Option<AnalysisPhase>,
    pub moves_done: u32,
    pub total_moves: u32,
    pub progress: f64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

/// A job claimed by a worker, with the lease it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job: JobRecord,
    pub worker_id: String,
    pub lease_expiry: DateTime<Utc>,
}

/// How a worker's attempt at a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Analyzed,
    /// Retrying cannot help.
    Failed(String),
    /// Requeue with backoff, consuming a retry.
    Retry(String),
    Cancelled,
}

/// Jobs and leases.
///
/// Claims are atomic: two workers calling [`JobQueue::claim_next_job`]
/// concurrently never receive the same job. Operations taking a `worker_id`
/// only take effect while that worker still holds the job's lease.
pub trait JobQueue: Send + Sync {
    /// Creates a queued job for `game_id`, or returns the existing one.
    fn create_job(&self, game_id: &str, priority: i64) -> Result<JobRecord, StoreError>;

    /// Puts a finished job back at the end of the queue from scratch.
    fn reset_job(&self, game_id: &str, priority: i64) -> Result<Option<JobRecord>, StoreError>;

    fn job(&self, game_id: &str) -> Result<Option<JobRecord>, StoreError>;

    fn get_job_status(&self, game_id: &str) -> Result<Option<JobStatusReport>, StoreError> {
        Ok(self.job(game_id)?.map(|job| job.report()))
    }

    /// Claims the highest-priority, oldest queued job whose backoff elapsed.
    fn claim_next_job(&self, worker_id: &str) -> Result<Option<ClaimedJob>, StoreError>;

    /// Extends the lease. `false` if the worker no longer holds it.
    fn renew_lease(&self, job_id: &str, worker_id: &str) -> Result<bool, StoreError>;

    /// Records progress and renews the lease. `false` if the lease is gone.
    fn record_progress(
        &self,
        job_id: &str,
        worker_id: &str,
        phase: AnalysisPhase,
        moves_done: u32,
        total_moves: u32,
    ) -> Result<bool, StoreError>;

    /// Ends an attempt. `None` if the worker no longer held the lease.
    fn finish_job(
        &self,
        job_id: &str,
        worker_id: &str,
        outcome: &JobOutcome,
    ) -> Result<Option<JobStatus>, StoreError>;

    /// Hands a job back without consuming a retry, e.g. on shutdown.
    fn release(&self, job_id: &str, worker_id: &str) -> Result<bool, StoreError>;

    /// Sets a job's status directly, dropping any lease unless analyzing.
    fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError>;

    /// Queued jobs fail at once; analyzing ones are flagged for the worker.
    /// Returns the status after the request.
    fn request_cancel(&self, game_id: &str) -> Result<Option<JobStatus>, StoreError>;

    /// Requeues an analyzing job without consuming a retry.
    fn force_requeue(&self, game_id: &str) -> Result<bool, StoreError>;

    /// Requeues jobs whose lease expired. Returns their game ids.
    fn expire_leases(&self) -> Result<Vec<String>, StoreError>;

    /// Requeues analyzing jobs without progress in the stall window.
    fn requeue_stalled(&self) -> Result<Vec<String>, StoreError>;
}
