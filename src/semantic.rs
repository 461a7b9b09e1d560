//! Semantic validation.
//!
//! Asks the provider whether an artifact's content is actually grounded in
//! the source material. Fail-closed: a malformed or failed provider
//! response is an invalid verdict, never a pass. Budget and timeout errors
//! are not absorbed — they are fatal to the job and propagate.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::artifact::{Artifact, ArtifactType, strip_code_fences};
use crate::error::{Error, Result};
use crate::model::JobId;
use crate::provider::{ChatMessage, ResponseFormat, TextGenerator};
use crate::service::JobService;

/// The provider's grounding verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticVerdict {
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl SemanticVerdict {
    fn fail_closed(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            issues: vec![reason.into()],
        }
    }
}

fn grounding_instructions(artifact_type: ArtifactType) -> &'static str {
    match artifact_type {
        ArtifactType::Quiz => {
            "Check every question: is it answerable from the source, is the \
             marked correct answer actually correct per the source, and do \
             any options or explanations use terms the source never defines?"
        }
        ArtifactType::Flashcards => {
            "Check every card: is the back an accurate statement of what the \
             source says about the front term, and does any card introduce a \
             term or claim the source never makes?"
        }
        ArtifactType::Mindmap => {
            "Check every node: does the label name a concept the source \
             actually covers, and do parent-child edges reflect \
             relationships the source supports?"
        }
    }
}

/// Ask the provider whether `artifact` is grounded in `source`.
pub async fn check_grounding(
    service: &JobService,
    job_id: JobId,
    provider: &dyn TextGenerator,
    artifact: &Artifact,
    source: &str,
    timeout: Duration,
) -> Result<SemanticVerdict> {
    let artifact_json = serde_json::to_string_pretty(&artifact.to_value()?)?;

    let messages = vec![
        ChatMessage::system(format!(
            "You are a strict fact checker for study materials. {} Respond \
             with a JSON object of exactly this shape: \
             {{\"valid\": true|false, \"issues\": [string]}} — valid is \
             false if anything is ungrounded, incorrect, or hallucinated.",
            grounding_instructions(artifact.artifact_type())
        )),
        ChatMessage::user(format!(
            "Source material:\n{source}\n\nArtifact to check:\n{artifact_json}"
        )),
    ];

    let completion = match crate::budget::guarded_generate(
        service,
        job_id,
        provider,
        "semantic-validation",
        &messages,
        ResponseFormat::JsonObject,
        timeout,
    )
    .await
    {
        Ok(completion) => completion,
        // Resource exhaustion is fatal to the job, not a verdict.
        Err(e @ (Error::BudgetExceeded { .. } | Error::PhaseTimeout { .. })) => return Err(e),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "semantic check failed, treating as invalid");
            return Ok(SemanticVerdict::fail_closed(format!(
                "semantic validation unavailable: {e}"
            )));
        }
    };

    match serde_json::from_str::<SemanticVerdict>(strip_code_fences(&completion.content)) {
        Ok(verdict) => Ok(verdict),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "unparsable semantic verdict, treating as invalid");
            Ok(SemanticVerdict::fail_closed(format!(
                "semantic validator returned an unparsable verdict: {e}"
            )))
        }
    }
}
