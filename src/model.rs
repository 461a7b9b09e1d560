//! Core data model.
//!
//! An artifact job is one request to turn study content into a structured
//! learning artifact. It carries identity, the frozen request, progress
//! through the phase pipeline, and its resource/failure accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactType;

/// Token ceiling applied to new jobs unless the caller overrides it.
pub const DEFAULT_TOKEN_BUDGET: u32 = 12_000;

// ---------------------------------------------------------------------------
// Artifact Job
// ---------------------------------------------------------------------------

/// A unit of work tracked by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactJob {
    /// Unique identifier.
    pub id: JobId,

    /// Owner of the request.
    pub user_id: String,

    /// Notebook whose content the artifact is generated from.
    pub notebook_id: String,

    /// Which kind of artifact to produce.
    pub artifact_type: ArtifactType,

    /// Free-form study content submitted with the request.
    pub content: String,

    /// Optional filter restricting which notebook sources feed retrieval.
    /// None means all sources.
    pub source_ids: Option<Vec<String>>,

    /// Type-specific generation parameters.
    pub options: GenerationOptions,

    /// Stable hash of (user, notebook, type, content, options). Identical
    /// resubmissions while a job is still active land on the same row.
    pub request_fingerprint: String,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Coarse progress indicator, 0–100.
    pub progress: u8,

    /// Identity of the claiming worker. Set exactly once, by the claim.
    pub worker_id: Option<String>,

    /// Source chunks captured at creation time. Frozen so every phase
    /// operates on the same input even if notebook content changes mid-job.
    pub retrieval_snapshot: String,

    /// Outline produced by the planning phase.
    pub plan: Option<GenerationPlan>,

    /// Final validated artifact document. Present iff status is Completed.
    pub result: Option<serde_json::Value>,

    /// Ceiling on cumulative model-usage cost for this job.
    pub token_budget: u32,

    /// Running total. Never exceeds `token_budget`.
    pub tokens_used: u32,

    /// Human-readable terminal failure cause.
    pub error: Option<String>,

    /// Number of recorded failures for this job.
    pub retry_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an artifact job.
///
/// Repair is a bounded sub-loop inside Validating, not a status of its own —
/// there is no Validating → Generating edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a worker.
    Pending,
    /// Claimed; producing the generation plan.
    Planning,
    /// Producing the draft artifact from the plan.
    Generating,
    /// Structural and semantic checks, including the repair sub-loop.
    Validating,
    /// Done; `result` holds the artifact. Terminal.
    Completed,
    /// Any phase failure. Terminal — resubmission is the caller's retry path.
    Failed,
}

impl JobStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Planning)         // claim
                | (Planning, Generating)
                | (Generating, Validating)
                | (Validating, Completed)
                | (Pending, Failed)     // administratively cancelled
                | (Planning, Failed)
                | (Generating, Failed)
                | (Validating, Failed)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Planning => "planning",
            JobStatus::Generating => "generating",
            JobStatus::Validating => "validating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "planning" => Ok(JobStatus::Planning),
            "generating" => Ok(JobStatus::Generating),
            "validating" => Ok(JobStatus::Validating),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(crate::error::Error::Other(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Options & Plan
// ---------------------------------------------------------------------------

/// Type-specific generation parameters. All optional; the planning phase
/// fills in defaults appropriate to the artifact type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Target number of questions/cards (ignored for mind maps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u32>,

    /// Requested difficulty, e.g. "easy", "medium", "hard".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,

    /// Topic or angle to emphasise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,

    /// Maximum tree depth (mind maps only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
}

/// Intermediate outline produced by the planning phase. Lenient on
/// deserialization — a thin plan is still a plan; validators gate the output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationPlan {
    #[serde(default)]
    pub topics: Vec<String>,

    /// Target item count (questions, cards, or top-level branches).
    #[serde(default)]
    pub item_count: u32,

    #[serde(default)]
    pub difficulty: Option<String>,

    /// Free-form notes on how to cover the material.
    #[serde(default)]
    pub approach: Option<String>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for new artifact jobs. The service's public API for submission.
pub struct NewArtifactJob {
    pub(crate) user_id: String,
    pub(crate) notebook_id: String,
    pub(crate) artifact_type: ArtifactType,
    pub(crate) content: String,
    pub(crate) source_ids: Option<Vec<String>>,
    pub(crate) options: GenerationOptions,
    pub(crate) token_budget: Option<u32>,
}

impl NewArtifactJob {
    pub fn new(
        user_id: impl Into<String>,
        notebook_id: impl Into<String>,
        artifact_type: ArtifactType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            notebook_id: notebook_id.into(),
            artifact_type,
            content: content.into(),
            source_ids: None,
            options: GenerationOptions::default(),
            token_budget: None,
        }
    }

    pub fn source_ids(mut self, ids: Vec<String>) -> Self {
        self.source_ids = Some(ids);
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn token_budget(mut self, budget: u32) -> Self {
        self.token_budget = Some(budget);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_is_one_directional() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Planning));
        assert!(Planning.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Completed));

        // No going back, and repair is not a job-level edge.
        assert!(!Validating.can_transition_to(Generating));
        assert!(!Planning.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn every_non_terminal_status_can_fail() {
        use JobStatus::*;
        for status in [Pending, Planning, Generating, Validating] {
            assert!(status.can_transition_to(Failed), "{status} should fail");
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        use JobStatus::*;
        for status in [Pending, Planning, Generating, Validating, Completed, Failed] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
