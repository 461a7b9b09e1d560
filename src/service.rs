//! Job service. The public API for creating and mutating artifact jobs.
//!
//! All job state lives in the store; all mutations go through the atomic
//! operations exposed here. Workers hold a service reference and never
//! touch the store directly.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::artifact::ArtifactType;
use crate::error::Result;
use crate::model::{
    ArtifactJob, DEFAULT_TOKEN_BUDGET, GenerationOptions, JobId, JobStatus, NewArtifactJob,
};
use crate::retrieval::ContextRetriever;
use crate::store::{AdvanceFields, JobStore};

/// How long an in-flight job shields identical resubmissions. An active job
/// older than this is presumed orphaned by a dead worker and stops deduping.
pub const DEDUP_WINDOW_HOURS: i64 = 24;

pub struct JobService {
    store: Arc<JobStore>,
    retriever: Arc<dyn ContextRetriever>,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, retriever: Arc<dyn ContextRetriever>) -> Self {
        Self { store, retriever }
    }

    /// Create a job, or return the existing active job for an identical
    /// request (idempotent submission).
    ///
    /// The retrieval snapshot is captured here and frozen — later changes
    /// to notebook content do not affect an in-flight job.
    pub async fn create_job(&self, new: NewArtifactJob) -> Result<ArtifactJob> {
        let fingerprint = request_fingerprint(
            &new.user_id,
            &new.notebook_id,
            new.artifact_type,
            &new.content,
            &new.options,
        );

        let snapshot = self
            .retriever
            .get_context(
                &new.user_id,
                &new.notebook_id,
                new.source_ids.as_deref(),
                &new.content,
            )
            .await?;

        let now = Utc::now();
        let job = ArtifactJob {
            id: JobId::new(),
            user_id: new.user_id,
            notebook_id: new.notebook_id,
            artifact_type: new.artifact_type,
            content: new.content,
            source_ids: new.source_ids,
            options: new.options,
            request_fingerprint: fingerprint,
            status: JobStatus::Pending,
            progress: 0,
            worker_id: None,
            retrieval_snapshot: snapshot,
            plan: None,
            result: None,
            token_budget: new.token_budget.unwrap_or(DEFAULT_TOKEN_BUDGET),
            tokens_used: 0,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        let cutoff = now - Duration::hours(DEDUP_WINDOW_HOURS);
        let (job, created) = self.store.insert_or_existing(&job, cutoff)?;

        if created {
            info!(job_id = %job.id, artifact_type = %job.artifact_type, "job created");
        } else {
            debug!(job_id = %job.id, "identical submission deduped onto active job");
        }
        Ok(job)
    }

    /// Atomically claim the oldest pending job for `worker_id`. `None` when
    /// nothing is eligible; losing a claim race is not an error.
    pub fn claim_next_pending(&self, worker_id: &str) -> Result<Option<ArtifactJob>> {
        let claimed = self.store.claim_next_pending(worker_id)?;
        if let Some(ref job) = claimed {
            info!(job_id = %job.id, worker_id, "job claimed");
        }
        Ok(claimed)
    }

    /// Add `delta` to the job's token ledger. Returns `false` — with the
    /// ledger untouched — when the delta would exceed the budget, signaling
    /// the caller to abort before making the call it was reserving for.
    /// Negative deltas correct the ledger once real usage is known.
    pub fn increment_tokens_used(&self, id: JobId, delta: i64) -> Result<bool> {
        self.store.try_add_tokens(id, delta)
    }

    /// Legal-transition-checked status update.
    pub fn advance(&self, id: JobId, to: JobStatus, fields: AdvanceFields) -> Result<ArtifactJob> {
        self.store.advance(id, to, fields)
    }

    /// Progress-only update within the current phase.
    pub fn set_progress(&self, id: JobId, progress: u8) -> Result<()> {
        self.store.set_progress(id, progress)
    }

    /// Record a terminal failure with a human-readable cause.
    pub fn fail_job(&self, id: JobId, error: &str) -> Result<ArtifactJob> {
        self.store.mark_failed(id, error)
    }

    pub fn get(&self, id: JobId) -> Result<ArtifactJob> {
        self.store.get(id)
    }

    pub fn list_recent(&self, user_id: &str, limit: u32) -> Result<Vec<ArtifactJob>> {
        self.store.list_recent(user_id, limit)
    }
}

/// Stable hash over a request's defining inputs. Options are hashed in
/// their canonical JSON form, so field order cannot perturb the digest.
pub fn request_fingerprint(
    user_id: &str,
    notebook_id: &str,
    artifact_type: ArtifactType,
    content: &str,
    options: &GenerationOptions,
) -> String {
    let options_json = serde_json::to_string(options).unwrap_or_default();

    let mut hasher = Sha256::new();
    for part in [
        user_id,
        notebook_id,
        &artifact_type.to_string(),
        content,
        &options_json,
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]); // unit separator, guards against boundary shifts
    }
    hex::encode(hasher.finalize())
}
