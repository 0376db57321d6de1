//! Analysis job queue and worker pool.
//!
//! Games are submitted as jobs, claimed by workers under a lease and
//! analyzed ply by ply through [`chess_analysis::MoveAnalyzer`]. Results are
//! written as they are produced, so clients can read a game's annotations
//! while its analysis is still running.
//!
//! - [`SqliteStore`] - jobs, leases, annotations, motifs and games in SQLite
//! - [`AnalysisWorker`] / [`WorkerPool`] - claim, analyze, persist, repeat
//! - [`Watchdog`] - requeues jobs whose lease expired or that stopped moving
//! - [`AnalysisService`] - trigger, status, cancel, requeue and even-move calls

pub mod annotations;
pub mod clock;
pub mod config;
pub mod error;
pub mod games;
pub mod queue;
pub mod service;
pub mod sqlite;
pub mod watchdog;
pub mod worker;

pub use annotations::{AnnotationStore, StoredMotif};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CoachConfig, ConfigError};
pub use error::{StoreError, WorkerError};
pub use games::{GameSource, MemoryGames};
pub use queue::{
    ClaimedJob, JobOutcome, JobQueue, JobRecord, JobStatus, JobStatusReport, QueuePolicy,
};
pub use service::AnalysisService;
pub use sqlite::SqliteStore;
pub use watchdog::{SweepReport, Watchdog};
pub use worker::{AnalysisWorker, JobRun, PoolSettings, WorkerPool};
