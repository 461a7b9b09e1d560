//! SQLite job store.
//!
//! The single source of truth for job state. Every mutation the pipeline
//! needs is expressed as an atomic conditional `UPDATE` checked via
//! `rows_affected` — the store's conditional update is the system's only
//! concurrency primitive; workers never touch rows directly.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::artifact::ArtifactType;
use crate::error::{Error, Result};
use crate::model::{ArtifactJob, GenerationPlan, JobId, JobStatus};

/// Fields an [`advance`](JobStore::advance) call may set alongside the
/// status. `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct AdvanceFields {
    pub progress: Option<u8>,
    pub plan: Option<GenerationPlan>,
    pub result: Option<serde_json::Value>,
}

/// Storage backend. Owns the SQLite connection.
pub struct JobStore {
    conn: Mutex<Connection>,
}

const JOB_COLUMNS: &str = "id, user_id, notebook_id, artifact_type, content, source_ids, options, \
     request_fingerprint, status, progress, worker_id, retrieval_snapshot, plan, result, \
     token_budget, tokens_used, error, retry_count, created_at, updated_at, started_at, \
     completed_at";

impl JobStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("job store mutex poisoned".to_string()))
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;

        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS artifact_jobs (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                notebook_id         TEXT NOT NULL,
                artifact_type       TEXT NOT NULL,
                content             TEXT NOT NULL,
                source_ids          TEXT,
                options             TEXT NOT NULL DEFAULT '{}',
                request_fingerprint TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                progress            INTEGER NOT NULL DEFAULT 0,
                worker_id           TEXT,
                retrieval_snapshot  TEXT NOT NULL DEFAULT '',
                plan                TEXT,
                result              TEXT,
                token_budget        INTEGER NOT NULL,
                tokens_used         INTEGER NOT NULL DEFAULT 0,
                error               TEXT,
                retry_count         INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                started_at          TEXT,
                completed_at        TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_pending
                ON artifact_jobs(created_at)
                WHERE status = 'pending' AND worker_id IS NULL;
            CREATE INDEX IF NOT EXISTS idx_jobs_fingerprint
                ON artifact_jobs(user_id, request_fingerprint);
            CREATE INDEX IF NOT EXISTS idx_jobs_user
                ON artifact_jobs(user_id, created_at);
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Insert `job`, unless an active job with the same fingerprint already
    /// exists for the user — then return that one instead (idempotent
    /// submission). The dedup check and the insert run in one transaction.
    ///
    /// "Active" means non-terminal and created after `stale_cutoff`; failed,
    /// completed, and stale in-flight jobs never shield a new submission.
    ///
    /// Returns the job and whether it was newly created.
    pub fn insert_or_existing(
        &self,
        job: &ArtifactJob,
        stale_cutoff: DateTime<Utc>,
    ) -> Result<(ArtifactJob, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM artifact_jobs
                 WHERE user_id = ?1 AND request_fingerprint = ?2
                 AND status IN ('pending', 'planning', 'generating', 'validating')
                 AND created_at > ?3
                 ORDER BY created_at ASC LIMIT 1",
                params![
                    job.user_id,
                    job.request_fingerprint,
                    stale_cutoff.to_rfc3339()
                ],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id_str) = existing {
            let found = get_job_on(&tx, &id_str)?;
            tx.commit()?;
            return Ok((found, false));
        }

        insert_job_on(&tx, job)?;
        tx.commit()?;
        Ok((job.clone(), true))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Get a job by ID.
    pub fn get(&self, id: JobId) -> Result<ArtifactJob> {
        let conn = self.conn()?;
        get_job_on(&conn, &id.0.to_string())
    }

    /// A user's jobs, newest first.
    pub fn list_recent(&self, user_id: &str, limit: u32) -> Result<Vec<ArtifactJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM artifact_jobs
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))?;

        let rows = stmt
            .query_map(params![user_id, limit], JobRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    // -----------------------------------------------------------------------
    // Atomic mutations
    // -----------------------------------------------------------------------

    /// Claim the oldest pending job: `pending -> planning`, `worker_id` set,
    /// succeeding only if the row is still pending and unclaimed. Exactly
    /// one concurrent caller wins any given job. Returns `None` when no job
    /// is eligible.
    pub fn claim_next_pending(&self, worker_id: &str) -> Result<Option<ArtifactJob>> {
        loop {
            let now = Utc::now().to_rfc3339();
            let conn = self.conn()?;

            let candidate: Option<String> = conn
                .query_row(
                    "SELECT id FROM artifact_jobs
                     WHERE status = 'pending' AND worker_id IS NULL
                     ORDER BY created_at ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id_str) = candidate else {
                return Ok(None);
            };

            let claimed = conn.execute(
                "UPDATE artifact_jobs
                 SET status = 'planning', worker_id = ?1, progress = 10,
                     started_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending' AND worker_id IS NULL",
                params![worker_id, now, id_str],
            )?;

            if claimed == 1 {
                return get_job_on(&conn, &id_str).map(Some);
            }
            // Lost the race for this candidate — the next iteration sees a
            // fresh queue.
        }
    }

    /// Atomically add `delta` to the token ledger. Returns `false` (no
    /// mutation) if the result would exceed the budget or go negative.
    pub fn try_add_tokens(&self, id: JobId, delta: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let id_str = id.0.to_string();
        let conn = self.conn()?;

        let affected = conn.execute(
            "UPDATE artifact_jobs
             SET tokens_used = tokens_used + ?1, updated_at = ?2
             WHERE id = ?3
               AND tokens_used + ?1 <= token_budget
               AND tokens_used + ?1 >= 0",
            params![delta, now, id_str],
        )?;
        if affected == 1 {
            return Ok(true);
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM artifact_jobs WHERE id = ?1)",
            params![id_str],
            |row| row.get(0),
        )?;
        if exists {
            Ok(false)
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }

    /// Move a job to `to`, validating the transition and conditioning the
    /// write on the status we read — a concurrent change surfaces as an
    /// invalid transition rather than a silent overwrite.
    pub fn advance(&self, id: JobId, to: JobStatus, fields: AdvanceFields) -> Result<ArtifactJob> {
        let id_str = id.0.to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = get_status_on(&tx, &id_str)?;
        if !current.can_transition_to(to) {
            return Err(Error::InvalidTransition { from: current, to });
        }

        let now = Utc::now().to_rfc3339();
        let completed_at = to.is_terminal().then(|| now.clone());
        let plan_json = fields
            .plan
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result_json = fields
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let affected = tx.execute(
            "UPDATE artifact_jobs
             SET status = ?1, updated_at = ?2,
                 progress = COALESCE(?3, progress),
                 plan = COALESCE(?4, plan),
                 result = COALESCE(?5, result),
                 completed_at = COALESCE(?6, completed_at)
             WHERE id = ?7 AND status = ?8",
            params![
                to.to_string(),
                now,
                fields.progress,
                plan_json,
                result_json,
                completed_at,
                id_str,
                current.to_string()
            ],
        )?;
        if affected == 0 {
            return Err(Error::InvalidTransition { from: current, to });
        }

        let job = get_job_on(&tx, &id_str)?;
        tx.commit()?;
        Ok(job)
    }

    /// Update the progress indicator without a status change.
    pub fn set_progress(&self, id: JobId, progress: u8) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE artifact_jobs SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress, now, id.0.to_string()],
        )?;
        if affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Terminal failure: any non-terminal status -> failed, recording the
    /// cause and bumping the retry counter.
    pub fn mark_failed(&self, id: JobId, error: &str) -> Result<ArtifactJob> {
        let id_str = id.0.to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = get_status_on(&tx, &id_str)?;
        if !current.can_transition_to(JobStatus::Failed) {
            return Err(Error::InvalidTransition {
                from: current,
                to: JobStatus::Failed,
            });
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE artifact_jobs
             SET status = 'failed', error = ?1, retry_count = retry_count + 1,
                 updated_at = ?2, completed_at = ?2
             WHERE id = ?3",
            params![error, now, id_str],
        )?;

        let job = get_job_on(&tx, &id_str)?;
        tx.commit()?;
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Inner functions — accept &Connection so they work with both
// Connection (auto-commit) and Transaction (deref to Connection).
// ---------------------------------------------------------------------------

fn insert_job_on(conn: &Connection, job: &ArtifactJob) -> Result<()> {
    conn.execute(
        "INSERT INTO artifact_jobs (
            id, user_id, notebook_id, artifact_type, content, source_ids, options,
            request_fingerprint, status, progress, worker_id, retrieval_snapshot,
            plan, result, token_budget, tokens_used, error, retry_count,
            created_at, updated_at, started_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            job.id.0.to_string(),
            job.user_id,
            job.notebook_id,
            job.artifact_type.to_string(),
            job.content,
            job.source_ids
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            serde_json::to_string(&job.options)?,
            job.request_fingerprint,
            job.status.to_string(),
            job.progress,
            job.worker_id,
            job.retrieval_snapshot,
            job.plan.as_ref().map(serde_json::to_string).transpose()?,
            job.result.as_ref().map(serde_json::to_string).transpose()?,
            job.token_budget,
            job.tokens_used,
            job.error,
            job.retry_count,
            job.created_at.to_rfc3339(),
            job.updated_at.to_rfc3339(),
            job.started_at.map(|t| t.to_rfc3339()),
            job.completed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn get_status_on(conn: &Connection, id_str: &str) -> Result<JobStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM artifact_jobs WHERE id = ?1",
            params![id_str],
            |row| row.get(0),
        )
        .optional()?;

    match status {
        Some(s) => JobStatus::from_str(&s),
        None => Err(Error::NotFound(id_str.to_string())),
    }
}

fn get_job_on(conn: &Connection, id_str: &str) -> Result<ArtifactJob> {
    let row = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM artifact_jobs WHERE id = ?1"),
            params![id_str],
            JobRow::from_row,
        )
        .optional()?;

    match row {
        Some(row) => row.try_into_job(),
        None => Err(Error::NotFound(id_str.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// Intermediate row type: plain SQLite column values, converted to the
/// domain type in a second step so parse failures map to crate errors.
struct JobRow {
    id: String,
    user_id: String,
    notebook_id: String,
    artifact_type: String,
    content: String,
    source_ids: Option<String>,
    options: String,
    request_fingerprint: String,
    status: String,
    progress: u8,
    worker_id: Option<String>,
    retrieval_snapshot: String,
    plan: Option<String>,
    result: Option<String>,
    token_budget: u32,
    tokens_used: u32,
    error: Option<String>,
    retry_count: u32,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            notebook_id: row.get(2)?,
            artifact_type: row.get(3)?,
            content: row.get(4)?,
            source_ids: row.get(5)?,
            options: row.get(6)?,
            request_fingerprint: row.get(7)?,
            status: row.get(8)?,
            progress: row.get(9)?,
            worker_id: row.get(10)?,
            retrieval_snapshot: row.get(11)?,
            plan: row.get(12)?,
            result: row.get(13)?,
            token_budget: row.get(14)?,
            tokens_used: row.get(15)?,
            error: row.get(16)?,
            retry_count: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
            started_at: row.get(20)?,
            completed_at: row.get(21)?,
        })
    }

    fn try_into_job(self) -> Result<ArtifactJob> {
        Ok(ArtifactJob {
            id: JobId(
                self.id
                    .parse()
                    .map_err(|e: uuid::Error| Error::Other(format!("bad job id: {e}")))?,
            ),
            user_id: self.user_id,
            notebook_id: self.notebook_id,
            artifact_type: ArtifactType::from_str(&self.artifact_type)?,
            content: self.content,
            source_ids: self
                .source_ids
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            options: serde_json::from_str(&self.options)?,
            request_fingerprint: self.request_fingerprint,
            status: JobStatus::from_str(&self.status)?,
            progress: self.progress,
            worker_id: self.worker_id,
            retrieval_snapshot: self.retrieval_snapshot,
            plan: self.plan.as_deref().map(serde_json::from_str).transpose()?,
            result: self
                .result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            token_budget: self.token_budget,
            tokens_used: self.tokens_used,
            error: self.error,
            retry_count: self.retry_count,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            started_at: self.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse()
        .map_err(|e| Error::Other(format!("bad timestamp '{s}': {e}")))
}
