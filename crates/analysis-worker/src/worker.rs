//! Workers that drain the analysis queue.
//!
//! A worker claims one job at a time and walks its plies strictly in order,
//! first in the quick phase and then in the deep one. Each annotation is
//! written before the next ply is evaluated, and progress is recorded after
//! every ply. A retried job resumes at the phase and ply it had reached.
//!
//! While a job is claimed, a heartbeat thread renews its lease on a fixed
//! interval, independent of how long a ply takes. The lease therefore only
//! lapses when the worker is gone; a worker that is alive but stuck is left
//! to the stall window.

use chess_analysis::{AnalysisPhase, MoveAnalyzer, PlyAnalysis};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::annotations::AnnotationStore;
use crate::error::WorkerError;
use crate::games::GameSource;
use crate::queue::{JobOutcome, JobQueue, JobRecord, JobStatus};
use crate::watchdog::Watchdog;

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub game_id: String,
    /// Status after the attempt. `None` if the worker had lost the lease.
    pub status: Option<JobStatus>,
    pub error: Option<String>,
}

pub struct AnalysisWorker {
    id: String,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn AnnotationStore>,
    games: Arc<dyn GameSource>,
    analyzer: Arc<MoveAnalyzer>,
    storage_write_attempts: u32,
    heartbeat_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

/// Sets the flag when dropped, so the heartbeat stops even if the attempt
/// unwinds.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl AnalysisWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn AnnotationStore>,
        games: Arc<dyn GameSource>,
        analyzer: Arc<MoveAnalyzer>,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            store,
            games,
            analyzer,
            storage_write_attempts: 3,
            heartbeat_interval: Duration::from_secs(40),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_storage_write_attempts(mut self, attempts: u32) -> Self {
        self.storage_write_attempts = attempts.max(1);
        self
    }

    /// How often the lease is renewed while a job is claimed. Keep it well
    /// under the queue's lease TTL.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Shares a stop flag checked between plies.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claims and processes one job. `Ok(None)` when nothing is claimable.
    pub fn run_once(&self) -> Result<Option<JobRun>, WorkerError> {
        let Some(claim) = self.queue.claim_next_job(&self.id)? else {
            return Ok(None);
        };
        let job = claim.job;
        info!(
            game_id = %job.game_id,
            worker_id = %self.id,
            phase = ?job.phase,
            retry = job.retry_count,
            "claimed job"
        );

        let done = AtomicBool::new(false);
        let lease_lost = AtomicBool::new(false);
        let result = thread::scope(|scope| {
            scope.spawn(|| self.heartbeat(&job.id, &done, &lease_lost));
            let _stop = StopOnDrop(&done);
            self.process(&job, &lease_lost)
        });
        let error = result.as_ref().err().map(|e| e.to_string());
        let outcome = match result {
            Ok(()) => JobOutcome::Analyzed,
            Err(WorkerError::Cancelled) => {
                info!(game_id = %job.game_id, "job cancelled");
                JobOutcome::Cancelled
            }
            Err(WorkerError::LeaseLost) => {
                warn!(game_id = %job.game_id, worker_id = %self.id, "lease lost, abandoning job");
                return Ok(Some(JobRun {
                    game_id: job.game_id,
                    status: None,
                    error,
                }));
            }
            Err(WorkerError::ShuttingDown) => {
                info!(game_id = %job.game_id, "releasing job due to shutdown");
                let status = if self.queue.release(&job.id, &self.id)? {
                    Some(JobStatus::Queued)
                } else {
                    None
                };
                return Ok(Some(JobRun {
                    game_id: job.game_id,
                    status,
                    error,
                }));
            }
            Err(e) if e.is_transient() => {
                warn!(game_id = %job.game_id, error = %e, "job attempt failed, will retry");
                JobOutcome::Retry(e.to_string())
            }
            Err(e) => {
                error!(game_id = %job.game_id, error = %e, "job failed");
                JobOutcome::Failed(e.to_string())
            }
        };

        let status = self.queue.finish_job(&job.id, &self.id, &outcome)?;
        if status == Some(JobStatus::Analyzed) {
            info!(game_id = %job.game_id, "job analyzed");
        }
        Ok(Some(JobRun {
            game_id: job.game_id,
            status,
            error,
        }))
    }

    /// Renews the lease until `done` is set or the lease turns out to be gone.
    fn heartbeat(&self, job_id: &str, done: &AtomicBool, lease_lost: &AtomicBool) {
        loop {
            sleep_unless(done, self.heartbeat_interval);
            if done.load(Ordering::SeqCst) {
                return;
            }
            match self.queue.renew_lease(job_id, &self.id) {
                Ok(true) => debug!(job_id, worker_id = %self.id, "lease renewed"),
                Ok(false) => {
                    warn!(job_id, worker_id = %self.id, "lease no longer held");
                    lease_lost.store(true, Ordering::SeqCst);
                    return;
                }
                Err(e) => warn!(job_id, error = %e, "lease renewal failed"),
            }
        }
    }

    fn process(&self, job: &JobRecord, lease_lost: &AtomicBool) -> Result<(), WorkerError> {
        let plies = self.games.load_plies(&job.game_id)?;
        let total = plies.len() as u32;
        let mut phase = job.phase.unwrap_or(AnalysisPhase::Quick);
        let mut start = if job.moves_done <= total { job.moves_done } else { 0 };
        if start > 0 {
            info!(game_id = %job.game_id, phase = %phase, from = start, "resuming job");
        }

        loop {
            self.progress(job, phase, start, total)?;
            let mut before = None;
            for (index, ply) in plies.iter().enumerate().skip(start as usize) {
                if self.shutdown.load(Ordering::SeqCst) {
                    return Err(WorkerError::ShuttingDown);
                }
                if self.queue.is_cancel_requested(&job.id)? {
                    return Err(WorkerError::Cancelled);
                }

                let analysis = self.analyzer.analyze_move(&job.game_id, ply, phase, before.take())?;
                // A slow ply may have outlived the lease; never write over a new holder.
                if lease_lost.load(Ordering::SeqCst) || !self.queue.renew_lease(&job.id, &self.id)? {
                    return Err(WorkerError::LeaseLost);
                }
                self.persist(&analysis)?;
                debug!(
                    game_id = %job.game_id,
                    move_number = ply.move_number,
                    color = %ply.color,
                    phase = %phase,
                    "annotation written"
                );
                before = Some(analysis.evaluation_after);
                self.progress(job, phase, index as u32 + 1, total)?;
            }

            match phase.next() {
                Some(next) => {
                    phase = next;
                    start = 0;
                }
                None => return Ok(()),
            }
        }
    }

    fn progress(&self, job: &JobRecord, phase: AnalysisPhase, done: u32, total: u32) -> Result<(), WorkerError> {
        if self.queue.record_progress(&job.id, &self.id, phase, done, total)? {
            Ok(())
        } else {
            Err(WorkerError::LeaseLost)
        }
    }

    fn persist(&self, analysis: &PlyAnalysis) -> Result<(), WorkerError> {
        let annotation = &analysis.annotation;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let written = self.store.write_ply(annotation, &analysis.motifs);
            match written {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.storage_write_attempts => {
                    warn!(game_id = %annotation.game_id, attempt, error = %e, "annotation write failed, retrying");
                    thread::sleep(Duration::from_millis(20 * attempt as u64));
                }
                Err(source) => {
                    return Err(WorkerError::StorageWriteFailure {
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }
}

/// Pool sizing and pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub workers: usize,
    pub poll_interval: Duration,
    pub watchdog_interval: Duration,
    /// Lease renewal period of a worker holding a job.
    pub heartbeat_interval: Duration,
    pub storage_write_attempts: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(1000),
            watchdog_interval: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_secs(40),
            storage_write_attempts: 3,
        }
    }
}

/// Worker threads plus a watchdog thread.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `settings.workers` workers and the watchdog.
    pub fn start(
        settings: &PoolSettings,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn AnnotationStore>,
        games: Arc<dyn GameSource>,
        analyzer: Arc<MoveAnalyzer>,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(settings.workers + 1);

        for n in 0..settings.workers.max(1) {
            let worker = AnalysisWorker::new(
                format!("worker-{}-{}", n, uuid::Uuid::new_v4()),
                queue.clone(),
                store.clone(),
                games.clone(),
                analyzer.clone(),
            )
            .with_storage_write_attempts(settings.storage_write_attempts)
            .with_heartbeat_interval(settings.heartbeat_interval)
            .with_shutdown(shutdown.clone());
            let poll = settings.poll_interval;
            let stop = shutdown.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("analysis-worker-{}", n))
                    .spawn(move || worker_loop(worker, poll, stop))?,
            );
        }

        handles.push(Watchdog::new(queue).spawn(settings.watchdog_interval, shutdown.clone())?);
        info!(workers = settings.workers.max(1), "worker pool started");
        Ok(Self { shutdown, handles })
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Stops every thread after its current ply and waits for it.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("worker pool stopped");
    }
}

fn worker_loop(worker: AnalysisWorker, poll: Duration, shutdown: Arc<AtomicBool>) {
    info!(worker_id = worker.id(), "worker started");
    while !shutdown.load(Ordering::SeqCst) {
        match worker.run_once() {
            Ok(Some(_)) => {}
            Ok(None) => sleep_unless(&shutdown, poll),
            Err(e) => {
                error!(worker_id = worker.id(), error = %e, "queue error");
                sleep_unless(&shutdown, poll);
            }
        }
    }
    info!(worker_id = worker.id(), "worker stopped");
}

/// Sleeps for `total` in short slices, returning early once `flag` is set.
pub(crate) fn sleep_unless(flag: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(25);
    let mut left = total;
    while !left.is_zero() && !flag.load(Ordering::SeqCst) {
        let step = left.min(slice);
        thread::sleep(step);
        left -= step;
    }
}
