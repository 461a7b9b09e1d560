//! Worker: claims pending jobs and drives them through the phase pipeline.
//!
//! planning -> generating -> validating -> (repair sub-loop) -> terminal.
//! No error escapes [`Worker::run_job`]: every failure path writes a
//! terminal failed status with a human-readable cause and publishes an
//! event, so user-visible state is never hung or ambiguous.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::artifact::Artifact;
use crate::budget::guarded_generate;
use crate::error::{Error, Result};
use crate::event::{ArtifactEvent, EventBus};
use crate::model::{ArtifactJob, GenerationPlan, JobStatus};
use crate::provider::{ResponseFormat, TextGenerator};
use crate::repair::{self, RepairTimeouts};
use crate::service::JobService;
use crate::store::AdvanceFields;
use crate::{prompt, semantic, validate};

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll interval when the queue is empty.
    pub poll_interval: Duration,
    /// Wall-clock ceiling for the planning call.
    pub planning_timeout: Duration,
    /// Wall-clock ceiling for the generation call.
    pub generation_timeout: Duration,
    /// Wall-clock ceiling per semantic-validation call.
    pub validation_timeout: Duration,
    /// Wall-clock ceiling per repair call.
    pub repair_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            planning_timeout: Duration::from_secs(45),
            generation_timeout: Duration::from_secs(90),
            validation_timeout: Duration::from_secs(45),
            repair_timeout: Duration::from_secs(60),
        }
    }
}

/// A single worker. Multiple workers may run concurrently — coordination
/// happens entirely through the store's atomic claim.
pub struct Worker {
    id: String,
    service: Arc<JobService>,
    provider: Arc<dyn TextGenerator>,
    events: Arc<EventBus>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        service: Arc<JobService>,
        provider: Arc<dyn TextGenerator>,
        events: Arc<EventBus>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            service,
            provider,
            events,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signaling this worker to stop after its current job.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run until shutdown: claim, execute, repeat; sleep when idle.
    pub async fn run(&self) {
        info!(worker_id = %self.id, "worker started");
        loop {
            match self.run_one().await {
                Ok(true) => continue, // drain the queue before sleeping
                Ok(false) => {}
                Err(e) => error!(worker_id = %self.id, error = %e, "claim failed"),
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!(worker_id = %self.id, "worker shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Claim and fully process one job. Returns whether a job was claimed.
    pub async fn run_one(&self) -> Result<bool> {
        let Some(job) = self.service.claim_next_pending(&self.id)? else {
            return Ok(false);
        };
        self.run_job(job).await;
        Ok(true)
    }

    /// Drive a claimed job to a terminal state. Never returns an error.
    pub async fn run_job(&self, job: ArtifactJob) {
        let job_id = job.id;
        debug!(worker_id = %self.id, job_id = %job_id, artifact_type = %job.artifact_type, "job started");

        if let Err(e) = self.execute_phases(&job).await {
            error!(job_id = %job_id, error = %e, "job failed");
            match self.service.fail_job(job_id, &e.to_string()) {
                Ok(failed) => {
                    self.events.publish(ArtifactEvent::failed(&failed, e.to_string()));
                }
                Err(store_err) => {
                    // The job may already be terminal; nothing more to record.
                    error!(job_id = %job_id, error = %store_err, "could not record failure");
                }
            }
        }
    }

    async fn execute_phases(&self, job: &ArtifactJob) -> Result<()> {
        // --- Planning ---
        let plan = self.plan(job).await?;
        let job = self.service.advance(
            job.id,
            JobStatus::Generating,
            AdvanceFields {
                progress: Some(25),
                plan: Some(plan.clone()),
                ..Default::default()
            },
        )?;

        // --- Generation ---
        let draft = self.generate(&job, &plan).await?;
        let job = self.service.advance(
            job.id,
            JobStatus::Validating,
            AdvanceFields {
                progress: Some(55),
                ..Default::default()
            },
        )?;

        // --- Validation (with repair sub-loop) ---
        let artifact = self.validate_and_repair(&job, &plan, draft).await?;

        // --- Terminal ---
        let result = artifact.to_value()?;
        let job = self.service.advance(
            job.id,
            JobStatus::Completed,
            AdvanceFields {
                progress: Some(100),
                result: Some(result.clone()),
                ..Default::default()
            },
        )?;
        info!(job_id = %job.id, tokens_used = job.tokens_used, "job completed");
        self.events.publish(ArtifactEvent::completed(&job, result));
        Ok(())
    }

    async fn plan(&self, job: &ArtifactJob) -> Result<GenerationPlan> {
        let messages = prompt::planning_messages(job);
        let completion = guarded_generate(
            &self.service,
            job.id,
            self.provider.as_ref(),
            "planning",
            &messages,
            ResponseFormat::JsonObject,
            self.config.planning_timeout,
        )
        .await?;

        serde_json::from_str(crate::artifact::strip_code_fences(&completion.content))
            .map_err(|e| Error::BadArtifact(format!("unparsable plan: {e}")))
    }

    async fn generate(&self, job: &ArtifactJob, plan: &GenerationPlan) -> Result<Artifact> {
        let messages = prompt::generation_messages(job, plan)?;
        let completion = guarded_generate(
            &self.service,
            job.id,
            self.provider.as_ref(),
            "generation",
            &messages,
            ResponseFormat::JsonObject,
            self.config.generation_timeout,
        )
        .await?;

        Artifact::parse(job.artifact_type, &completion.content)
    }

    /// Structural check, then semantic; on failure, the bounded repair
    /// chain. Returns the artifact that passed both validators.
    async fn validate_and_repair(
        &self,
        job: &ArtifactJob,
        plan: &GenerationPlan,
        draft: Artifact,
    ) -> Result<Artifact> {
        let violations = {
            let structural = validate::validate(&draft);
            if structural.is_empty() {
                let verdict = semantic::check_grounding(
                    &self.service,
                    job.id,
                    self.provider.as_ref(),
                    &draft,
                    &job.retrieval_snapshot,
                    self.config.validation_timeout,
                )
                .await?;
                if verdict.valid {
                    return Ok(draft);
                }
                verdict.issues
            } else {
                structural
            }
        };

        debug!(job_id = %job.id, violations = violations.len(), "draft invalid, entering repair");
        self.service.set_progress(job.id, 80)?;

        let outcome = repair::run_repair_chain(
            &self.service,
            job.id,
            self.provider.as_ref(),
            Some(plan),
            &job.retrieval_snapshot,
            draft,
            violations,
            RepairTimeouts {
                repair: self.config.repair_timeout,
                validation: self.config.validation_timeout,
            },
        )
        .await?;

        if outcome.success {
            return Ok(outcome.artifact);
        }

        let mut violations = outcome.final_violations;
        if violations.is_empty() {
            violations.push(
                outcome
                    .error
                    .unwrap_or_else(|| "artifact rejected by validation".to_string()),
            );
        }
        Err(Error::ValidationFailed {
            attempts: outcome.attempts,
            violations,
        })
    }
}
