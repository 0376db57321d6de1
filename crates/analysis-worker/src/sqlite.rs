//! SQLite-backed job queue, annotation store and game source.
//!
//! Timestamps are stored as Unix milliseconds from the injected [`Clock`].

use chess_analysis::{AnalysisPhase, MoveAnnotation, MoveClassification, TacticalMotif};
use chess_board::HalfMove;
use chess_core::Color;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::annotations::{AnnotationStore, StoredMotif};
use crate::clock::Clock;
use crate::error::{StoreError, WorkerError};
use crate::games::{replay_game, GameSource};
use crate::queue::{ClaimedJob, JobOutcome, JobQueue, JobRecord, JobStatus, QueuePolicy};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        start_fen TEXT NOT NULL,
        moves TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS analysis_jobs (
        id TEXT PRIMARY KEY,
        game_id TEXT NOT NULL UNIQUE,
        priority INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'queued',
        phase TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        moves_done INTEGER NOT NULL DEFAULT 0,
        total_moves INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        cancel_requested INTEGER NOT NULL DEFAULT 0,
        not_before INTEGER NOT NULL DEFAULT 0,
        last_progress_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_jobs_claim
        ON analysis_jobs (status, priority DESC, created_at);

    CREATE TABLE IF NOT EXISTS worker_leases (
        job_id TEXT PRIMARY KEY REFERENCES analysis_jobs(id) ON DELETE CASCADE,
        worker_id TEXT NOT NULL,
        heartbeat_at INTEGER NOT NULL,
        lease_expiry INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS move_annotations (
        game_id TEXT NOT NULL,
        move_number INTEGER NOT NULL,
        color TEXT NOT NULL,
        move_san TEXT NOT NULL,
        move_uci TEXT NOT NULL,
        fen_before TEXT NOT NULL,
        fen_after TEXT NOT NULL,
        evaluation_before INTEGER NOT NULL,
        evaluation_after INTEGER NOT NULL,
        evaluation_change INTEGER NOT NULL,
        classification TEXT NOT NULL,
        is_best_move INTEGER NOT NULL,
        is_book_move INTEGER NOT NULL,
        analysis_depth INTEGER NOT NULL,
        best_move TEXT,
        phase TEXT NOT NULL,
        control_grids TEXT,
        PRIMARY KEY (game_id, move_number, color)
    );

    CREATE TABLE IF NOT EXISTS tactical_motifs (
        game_id TEXT NOT NULL,
        move_number INTEGER NOT NULL,
        color TEXT NOT NULL,
        kind TEXT NOT NULL,
        move_uci TEXT NOT NULL,
        motif TEXT NOT NULL,
        strength INTEGER NOT NULL,
        PRIMARY KEY (game_id, move_number, color, kind, move_uci)
    );
";

const JOB_COLUMNS: &str = "id, game_id, priority, status, phase, retry_count, moves_done, \
     total_moves, last_error, cancel_requested, created_at";

const CANCELLED: &str = "cancelled";

/// SQLite storage for the whole analysis pipeline.
///
/// # Example
///
/// ```ignore
/// let store = SqliteStore::open("data/coach.db", QueuePolicy::default(), Arc::new(SystemClock))?;
/// store.save_game("g1", FenParser::STARTPOS, &["e2e4", "e7e5"])?;
/// store.create_job("g1", 0)?;
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
    policy: QueuePolicy,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Opens or creates a database at `path` and initializes the schema.
    pub fn open<P: AsRef<Path>>(
        path: P,
        policy: QueuePolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?, policy, clock)
    }

    pub fn open_in_memory(policy: QueuePolicy, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, policy, clock)
    }

    fn with_connection(
        conn: Connection,
        policy: QueuePolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
            clock,
        })
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn lease_expiry(&self, now: i64) -> i64 {
        now + self.policy.lease_ttl.as_millis() as i64
    }

    /// Stores a game as a start position and move list. Returns its ply count.
    pub fn save_game<S: AsRef<str>>(
        &self,
        game_id: &str,
        start_fen: &str,
        moves: &[S],
    ) -> Result<usize, WorkerError> {
        let plies = replay_game(game_id, start_fen, moves)?;
        let uci: Vec<&str> = plies.iter().map(|p| p.uci.as_str()).collect();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO games (id, start_fen, moves, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET start_fen = excluded.start_fen, moves = excluded.moves",
            params![game_id, start_fen, uci.join(" "), self.now()],
        )
        .map_err(StoreError::from)?;
        Ok(plies.len())
    }

    /// Requeues `job_id` consuming a retry, or fails it once retries run out.
    fn requeue_counted(
        &self,
        conn: &Connection,
        job_id: &str,
        reason: &str,
        with_backoff: bool,
        now: i64,
    ) -> Result<JobStatus, StoreError> {
        let (retry_count, cancel_requested): (u32, bool) = conn.query_row(
            "SELECT retry_count, cancel_requested FROM analysis_jobs WHERE id = ?1",
            [job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [job_id])?;

        if cancel_requested {
            set_failed(conn, job_id, CANCELLED, now)?;
            return Ok(JobStatus::Failed);
        }

        let next = retry_count + 1;
        if next > self.policy.max_retries {
            conn.execute(
                "UPDATE analysis_jobs SET status = 'failed', retry_count = ?1, last_error = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![next, reason, now, job_id],
            )?;
            warn!(job_id, retries = next, reason, "job failed, retries exhausted");
            return Ok(JobStatus::Failed);
        }

        let not_before = if with_backoff {
            now + self.policy.backoff(next).as_millis() as i64
        } else {
            now
        };
        conn.execute(
            "UPDATE analysis_jobs SET status = 'queued', retry_count = ?1, last_error = ?2,
                 not_before = ?3, updated_at = ?4
             WHERE id = ?5",
            params![next, reason, not_before, now, job_id],
        )?;
        info!(job_id, retry = next, reason, "job requeued");
        Ok(JobStatus::Queued)
    }

    fn lease_held(conn: &Connection, job_id: &str, worker_id: &str) -> Result<bool, StoreError> {
        let held = conn
            .query_row(
                "SELECT 1 FROM worker_leases WHERE job_id = ?1 AND worker_id = ?2",
                [job_id, worker_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(held.is_some())
    }

    fn job_by_id(conn: &Connection, job_id: &str) -> Result<JobRecord, StoreError> {
        let sql = format!("SELECT {} FROM analysis_jobs WHERE id = ?1", JOB_COLUMNS);
        let raw = conn.query_row(&sql, [job_id], RawJob::from_row)?;
        raw.into_record()
    }
}

/// Runs `f` inside `BEGIN IMMEDIATE`, committing on success.
fn immediate<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    match f(conn) {
        Ok(value) => match conn.execute_batch("COMMIT;") {
            Ok(()) => Ok(value),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e.into())
            }
        },
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

fn set_failed(conn: &Connection, job_id: &str, reason: &str, now: i64) -> Result<(), StoreError> {
    conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [job_id])?;
    conn.execute(
        "UPDATE analysis_jobs SET status = 'failed', last_error = ?1, updated_at = ?2 WHERE id = ?3",
        params![reason, now, job_id],
    )?;
    Ok(())
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt(format!("timestamp {}", ms)))
}

/// A job row before its text columns are parsed.
struct RawJob {
    id: String,
    game_id: String,
    priority: i64,
    status: String,
    phase: Option<String>,
    retry_count: u32,
    moves_done: u32,
    total_moves: u32,
    last_error: Option<String>,
    cancel_requested: bool,
    created_at: i64,
}

impl RawJob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            game_id: row.get(1)?,
            priority: row.get(2)?,
            status: row.get(3)?,
            phase: row.get(4)?,
            retry_count: row.get(5)?,
            moves_done: row.get(6)?,
            total_moves: row.get(7)?,
            last_error: row.get(8)?,
            cancel_requested: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<JobRecord, StoreError> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("job status {:?}", self.status)))?;
        let phase = match self.phase.as_deref() {
            None => None,
            Some(text) => Some(
                AnalysisPhase::parse(text)
                    .ok_or_else(|| StoreError::Corrupt(format!("job phase {:?}", text)))?,
            ),
        };
        Ok(JobRecord {
            id: self.id,
            game_id: self.game_id,
            priority: self.priority,
            status,
            phase,
            retry_count: self.retry_count,
            moves_done: self.moves_done,
            total_moves: self.total_moves,
            last_error: self.last_error,
            cancel_requested: self.cancel_requested,
            created_at: millis_to_datetime(self.created_at)?,
        })
    }
}

impl JobQueue for SqliteStore {
    fn create_job(&self, game_id: &str, priority: i64) -> Result<JobRecord, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        conn.execute(
            "INSERT INTO analysis_jobs (id, game_id, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(game_id) DO NOTHING",
            params![Uuid::new_v4().to_string(), game_id, priority, now],
        )?;
        let sql = format!("SELECT {} FROM analysis_jobs WHERE game_id = ?1", JOB_COLUMNS);
        conn.query_row(&sql, [game_id], RawJob::from_row)?.into_record()
    }

    fn reset_job(&self, game_id: &str, priority: i64) -> Result<Option<JobRecord>, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            let id: Option<String> = conn
                .query_row("SELECT id FROM analysis_jobs WHERE game_id = ?1", [game_id], |row| row.get(0))
                .optional()?;
            let Some(id) = id else {
                return Ok(None);
            };
            conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [&id])?;
            conn.execute(
                "UPDATE analysis_jobs SET status = 'queued', phase = NULL, priority = ?1,
                     retry_count = 0, moves_done = 0, last_error = NULL, cancel_requested = 0,
                     not_before = 0, last_progress_at = NULL, created_at = ?2, updated_at = ?2
                 WHERE id = ?3",
                params![priority, now, id],
            )?;
            Self::job_by_id(conn, &id).map(Some)
        })
    }

    fn job(&self, game_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM analysis_jobs WHERE game_id = ?1", JOB_COLUMNS);
        conn.query_row(&sql, [game_id], RawJob::from_row)
            .optional()?
            .map(RawJob::into_record)
            .transpose()
    }

    fn claim_next_job(&self, worker_id: &str) -> Result<Option<ClaimedJob>, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        let expiry = self.lease_expiry(now);

        immediate(&conn, |conn| {
            let candidate: Option<String> = conn
                .query_row(
                    "SELECT id FROM analysis_jobs
                     WHERE status = 'queued' AND not_before <= ?1
                     ORDER BY priority DESC, created_at ASC, rowid ASC
                     LIMIT 1",
                    [now],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(job_id) = candidate else {
                return Ok(None);
            };

            let updated = conn.execute(
                "UPDATE analysis_jobs SET status = 'analyzing', phase = COALESCE(phase, 'quick'),
                     last_progress_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'queued'",
                params![now, job_id],
            )?;
            if updated == 0 {
                // Race condition - another worker claimed it
                return Ok(None);
            }
            conn.execute(
                "INSERT OR REPLACE INTO worker_leases (job_id, worker_id, heartbeat_at, lease_expiry)
                 VALUES (?1, ?2, ?3, ?4)",
                params![job_id, worker_id, now, expiry],
            )?;

            Ok(Some(ClaimedJob {
                job: Self::job_by_id(conn, &job_id)?,
                worker_id: worker_id.to_string(),
                lease_expiry: millis_to_datetime(expiry)?,
            }))
        })
    }

    fn renew_lease(&self, job_id: &str, worker_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        let updated = conn.execute(
            "UPDATE worker_leases SET heartbeat_at = ?1, lease_expiry = ?2
             WHERE job_id = ?3 AND worker_id = ?4",
            params![now, self.lease_expiry(now), job_id, worker_id],
        )?;
        Ok(updated > 0)
    }

    fn record_progress(
        &self,
        job_id: &str,
        worker_id: &str,
        phase: AnalysisPhase,
        moves_done: u32,
        total_moves: u32,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            if !Self::lease_held(conn, job_id, worker_id)? {
                return Ok(false);
            }
            conn.execute(
                "UPDATE analysis_jobs SET phase = ?1, moves_done = ?2, total_moves = ?3,
                     last_progress_at = ?4, updated_at = ?4
                 WHERE id = ?5",
                params![phase.as_str(), moves_done, total_moves, now, job_id],
            )?;
            conn.execute(
                "UPDATE worker_leases SET heartbeat_at = ?1, lease_expiry = ?2 WHERE job_id = ?3",
                params![now, self.lease_expiry(now), job_id],
            )?;
            Ok(true)
        })
    }

    fn finish_job(
        &self,
        job_id: &str,
        worker_id: &str,
        outcome: &JobOutcome,
    ) -> Result<Option<JobStatus>, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            if !Self::lease_held(conn, job_id, worker_id)? {
                return Ok(None);
            }
            let status = match outcome {
                JobOutcome::Analyzed => {
                    conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [job_id])?;
                    conn.execute(
                        "UPDATE analysis_jobs SET status = 'analyzed', moves_done = total_moves,
                             last_error = NULL, updated_at = ?1
                         WHERE id = ?2",
                        params![now, job_id],
                    )?;
                    JobStatus::Analyzed
                }
                JobOutcome::Failed(reason) => {
                    set_failed(conn, job_id, reason, now)?;
                    JobStatus::Failed
                }
                JobOutcome::Cancelled => {
                    set_failed(conn, job_id, CANCELLED, now)?;
                    JobStatus::Failed
                }
                JobOutcome::Retry(reason) => self.requeue_counted(conn, job_id, reason, true, now)?,
            };
            Ok(Some(status))
        })
    }

    fn release(&self, job_id: &str, worker_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            if !Self::lease_held(conn, job_id, worker_id)? {
                return Ok(false);
            }
            conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [job_id])?;
            conn.execute(
                "UPDATE analysis_jobs SET status = 'queued', updated_at = ?1 WHERE id = ?2",
                params![now, job_id],
            )?;
            Ok(true)
        })
    }

    fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            if status != JobStatus::Analyzing {
                conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [job_id])?;
            }
            conn.execute(
                "UPDATE analysis_jobs SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), error, now, job_id],
            )?;
            Ok(())
        })
    }

    fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let flag = conn
            .query_row(
                "SELECT cancel_requested FROM analysis_jobs WHERE id = ?1",
                [job_id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    }

    fn request_cancel(&self, game_id: &str) -> Result<Option<JobStatus>, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            let sql = format!("SELECT {} FROM analysis_jobs WHERE game_id = ?1", JOB_COLUMNS);
            let Some(raw) = conn.query_row(&sql, [game_id], RawJob::from_row).optional()? else {
                return Ok(None);
            };
            let job = raw.into_record()?;
            match job.status {
                JobStatus::Queued => {
                    set_failed(conn, &job.id, CANCELLED, now)?;
                    Ok(Some(JobStatus::Failed))
                }
                JobStatus::Analyzing => {
                    conn.execute(
                        "UPDATE analysis_jobs SET cancel_requested = 1, updated_at = ?1 WHERE id = ?2",
                        params![now, job.id],
                    )?;
                    Ok(Some(JobStatus::Analyzing))
                }
                other => Ok(Some(other)),
            }
        })
    }

    fn force_requeue(&self, game_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM analysis_jobs WHERE game_id = ?1 AND status = 'analyzing'",
                    [game_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = id else {
                return Ok(false);
            };
            conn.execute("DELETE FROM worker_leases WHERE job_id = ?1", [&id])?;
            conn.execute(
                "UPDATE analysis_jobs SET status = 'queued', not_before = ?1, updated_at = ?1
                 WHERE id = ?2",
                params![now, id],
            )?;
            info!(game_id, "job force-requeued");
            Ok(true)
        })
    }

    fn expire_leases(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        immediate(&conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT j.id, j.game_id FROM worker_leases l
                 JOIN analysis_jobs j ON j.id = l.job_id
                 WHERE l.lease_expiry < ?1",
            )?;
            let expired = stmt
                .query_map([now], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (job_id, _) in &expired {
                self.requeue_counted(conn, job_id, "lease expired", false, now)?;
            }
            Ok(expired.into_iter().map(|(_, game_id)| game_id).collect())
        })
    }

    fn requeue_stalled(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let now = self.now();
        let cutoff = now - self.policy.stall_window.as_millis() as i64;
        immediate(&conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, game_id FROM analysis_jobs
                 WHERE status = 'analyzing' AND last_progress_at < ?1",
            )?;
            let stalled = stmt
                .query_map([cutoff], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (job_id, _) in &stalled {
                self.requeue_counted(conn, job_id, "stalled: no progress", false, now)?;
            }
            Ok(stalled.into_iter().map(|(_, game_id)| game_id).collect())
        })
    }
}

fn write_annotation(conn: &Connection, a: &MoveAnnotation) -> Result<(), StoreError> {
    let grids = a.control_grids.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO move_annotations (
             game_id, move_number, color, move_san, move_uci, fen_before, fen_after,
             evaluation_before, evaluation_after, evaluation_change, classification,
             is_best_move, is_book_move, analysis_depth, best_move, phase, control_grids)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(game_id, move_number, color) DO UPDATE SET
             move_san = excluded.move_san,
             move_uci = excluded.move_uci,
             fen_before = excluded.fen_before,
             fen_after = excluded.fen_after,
             evaluation_before = excluded.evaluation_before,
             evaluation_after = excluded.evaluation_after,
             evaluation_change = excluded.evaluation_change,
             classification = excluded.classification,
             is_best_move = excluded.is_best_move,
             is_book_move = excluded.is_book_move,
             analysis_depth = excluded.analysis_depth,
             best_move = excluded.best_move,
             phase = excluded.phase,
             control_grids = excluded.control_grids",
        params![
            a.game_id,
            a.move_number,
            a.color.as_str(),
            a.move_san,
            a.move_uci,
            a.fen_before,
            a.fen_after,
            a.evaluation_before,
            a.evaluation_after,
            a.evaluation_change,
            a.classification.as_str(),
            a.is_best_move,
            a.is_book_move,
            a.analysis_depth,
            a.best_move,
            a.phase.as_str(),
            grids,
        ],
    )?;
    Ok(())
}

fn write_motif(conn: &Connection, stored: &StoredMotif) -> Result<(), StoreError> {
    let motif = serde_json::to_string(&stored.motif)?;
    conn.execute(
        "INSERT INTO tactical_motifs (game_id, move_number, color, kind, move_uci, motif, strength)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(game_id, move_number, color, kind, move_uci) DO UPDATE SET
             motif = excluded.motif,
             strength = excluded.strength",
        params![
            stored.game_id,
            stored.move_number,
            stored.color.as_str(),
            stored.motif.kind.as_str(),
            stored.motif.move_uci,
            motif,
            stored.motif.strength,
        ],
    )?;
    Ok(())
}

impl AnnotationStore for SqliteStore {
    fn upsert_annotation(&self, annotation: &MoveAnnotation) -> Result<(), StoreError> {
        write_annotation(&*self.conn()?, annotation)
    }

    fn upsert_motif(&self, motif: &StoredMotif) -> Result<(), StoreError> {
        write_motif(&*self.conn()?, motif)
    }

    fn write_ply(&self, annotation: &MoveAnnotation, motifs: &[TacticalMotif]) -> Result<(), StoreError> {
        let conn = self.conn()?;
        immediate(&conn, |conn| {
            write_annotation(conn, annotation)?;
            conn.execute(
                "DELETE FROM tactical_motifs WHERE game_id = ?1 AND move_number = ?2 AND color = ?3",
                params![annotation.game_id, annotation.move_number, annotation.color.as_str()],
            )?;
            for motif in motifs {
                write_motif(
                    conn,
                    &StoredMotif {
                        game_id: annotation.game_id.clone(),
                        move_number: annotation.move_number,
                        color: annotation.color,
                        motif: motif.clone(),
                    },
                )?;
            }
            Ok(())
        })
    }

    fn annotations(&self, game_id: &str) -> Result<Vec<MoveAnnotation>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, move_number, color, move_san, move_uci, fen_before, fen_after,
                    evaluation_before, evaluation_after, evaluation_change, classification,
                    is_best_move, is_book_move, analysis_depth, best_move, phase, control_grids
             FROM move_annotations
             WHERE game_id = ?1
             ORDER BY move_number ASC, CASE color WHEN 'white' THEN 0 ELSE 1 END",
        )?;
        let rows = stmt.query_map([game_id], |row| {
            Ok((
                MoveAnnotation {
                    game_id: row.get(0)?,
                    move_number: row.get(1)?,
                    color: Color::White,
                    move_san: row.get(3)?,
                    move_uci: row.get(4)?,
                    fen_before: row.get(5)?,
                    fen_after: row.get(6)?,
                    evaluation_before: row.get(7)?,
                    evaluation_after: row.get(8)?,
                    evaluation_change: row.get(9)?,
                    classification: MoveClassification::Good,
                    is_best_move: row.get(11)?,
                    is_book_move: row.get(12)?,
                    analysis_depth: row.get(13)?,
                    best_move: row.get(14)?,
                    phase: AnalysisPhase::Quick,
                    control_grids: None,
                },
                row.get::<_, String>(2)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(15)?,
                row.get::<_, Option<String>>(16)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mut annotation, color, classification, phase, grids) = row?;
            annotation.color =
                Color::parse(&color).ok_or_else(|| StoreError::Corrupt(format!("color {:?}", color)))?;
            annotation.classification = MoveClassification::parse(&classification)
                .ok_or_else(|| StoreError::Corrupt(format!("classification {:?}", classification)))?;
            annotation.phase = AnalysisPhase::parse(&phase)
                .ok_or_else(|| StoreError::Corrupt(format!("phase {:?}", phase)))?;
            annotation.control_grids = grids.as_deref().map(|g| serde_json::from_str(g)).transpose()?;
            out.push(annotation);
        }
        Ok(out)
    }

    fn motifs(&self, game_id: &str) -> Result<Vec<StoredMotif>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, move_number, color, motif FROM tactical_motifs
             WHERE game_id = ?1
             ORDER BY move_number ASC, CASE color WHEN 'white' THEN 0 ELSE 1 END, kind",
        )?;
        let rows = stmt.query_map([game_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (game_id, move_number, color, motif) = row?;
            out.push(StoredMotif {
                game_id,
                move_number,
                color: Color::parse(&color)
                    .ok_or_else(|| StoreError::Corrupt(format!("color {:?}", color)))?,
                motif: serde_json::from_str::<TacticalMotif>(&motif)?,
            });
        }
        Ok(out)
    }
}

impl GameSource for SqliteStore {
    fn load_plies(&self, game_id: &str) -> Result<Vec<HalfMove>, WorkerError> {
        let row: Option<(String, String)> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT start_fen, moves FROM games WHERE id = ?1",
                [game_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::from)?
        };
        let (start_fen, moves) = row.ok_or_else(|| WorkerError::GameNotFound(game_id.to_string()))?;
        let moves: Vec<&str> = moves.split_whitespace().collect();
        replay_game(game_id, &start_fen, &moves)
    }
}
