//! Bounded repair chain.
//!
//! When validation fails, the pipeline asks the provider to fix the
//! artifact — at most [`MAX_REPAIR_ATTEMPTS`] times, each attempt a single
//! budgeted repair call followed by a full revalidation. A provider or
//! parse failure consumes the attempt and carries the previous artifact
//! forward unchanged, so no attempt can corrupt the state the next one
//! starts from.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use crate::model::{GenerationPlan, JobId};
use crate::provider::{ResponseFormat, TextGenerator};
use crate::semantic;
use crate::service::JobService;
use crate::{prompt, validate};

/// Hard ceiling on repair provider calls per job.
pub const MAX_REPAIR_ATTEMPTS: u32 = 2;

/// What the repair chain produced.
#[derive(Debug)]
pub struct RepairOutcome {
    /// Whether the final artifact passed both validators.
    pub success: bool,
    /// The last artifact the chain held — repaired on success, the best
    /// failing candidate otherwise.
    pub artifact: Artifact,
    /// Repair calls consumed.
    pub attempts: u32,
    /// Violations still standing when the chain stopped. Empty on success.
    pub final_violations: Vec<String>,
    /// Last provider/parse error, if one consumed an attempt.
    pub error: Option<String>,
}

/// Per-call timeouts the chain operates under.
#[derive(Debug, Clone, Copy)]
pub struct RepairTimeouts {
    /// Timeout for each repair call.
    pub repair: Duration,
    /// Timeout for each semantic revalidation call.
    pub validation: Duration,
}

/// Drive the repair loop for a validation-failing artifact.
///
/// Budget and timeout errors abort immediately (fatal to the job); all
/// other failures consume attempts until the bound is hit.
pub async fn run_repair_chain(
    service: &JobService,
    job_id: JobId,
    provider: &dyn TextGenerator,
    plan: Option<&GenerationPlan>,
    source: &str,
    artifact: Artifact,
    violations: Vec<String>,
    timeouts: RepairTimeouts,
) -> Result<RepairOutcome> {
    let mut current = artifact;
    let mut current_violations = violations;
    let mut last_error: Option<String> = None;

    for attempt in 1..=MAX_REPAIR_ATTEMPTS {
        debug!(
            job_id = %job_id,
            attempt,
            violations = current_violations.len(),
            "repair attempt"
        );

        let messages = prompt::repair_messages(plan, source, &current, &current_violations)?;
        let completion = match crate::budget::guarded_generate(
            service,
            job_id,
            provider,
            "repair",
            &messages,
            ResponseFormat::JsonObject,
            timeouts.repair,
        )
        .await
        {
            Ok(completion) => completion,
            Err(e @ (Error::BudgetExceeded { .. } | Error::PhaseTimeout { .. })) => return Err(e),
            Err(e) => {
                warn!(job_id = %job_id, attempt, error = %e, "repair call failed");
                last_error = Some(e.to_string());
                continue;
            }
        };

        let candidate = match Artifact::parse(current.artifact_type(), &completion.content) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(job_id = %job_id, attempt, error = %e, "unparsable repair output");
                last_error = Some(e.to_string());
                continue;
            }
        };

        // Revalidate: structural first, semantic only on a clean shape.
        let structural = validate::validate(&candidate);
        if structural.is_empty() {
            let verdict = semantic::check_grounding(
                service,
                job_id,
                provider,
                &candidate,
                source,
                timeouts.validation,
            )
            .await?;

            if verdict.valid {
                info!(job_id = %job_id, attempts = attempt, "repair succeeded");
                return Ok(RepairOutcome {
                    success: true,
                    artifact: candidate,
                    attempts: attempt,
                    final_violations: Vec::new(),
                    error: None,
                });
            }
            current = candidate;
            current_violations = verdict.issues;
        } else {
            current = candidate;
            current_violations = structural;
        }
    }

    info!(
        job_id = %job_id,
        attempts = MAX_REPAIR_ATTEMPTS,
        violations = current_violations.len(),
        "repair attempts exhausted"
    );
    Ok(RepairOutcome {
        success: false,
        artifact: current,
        attempts: MAX_REPAIR_ATTEMPTS,
        final_violations: current_violations,
        error: last_error,
    })
}
