//! In-process event bus.
//!
//! The worker announces terminal job states here; listeners (notification
//! streams, dashboards) subscribe independently. Each subscriber has its
//! own channel, so a slow or panicking handler cannot affect the publisher
//! or its peers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::artifact::ArtifactType;
use crate::model::{ArtifactJob, JobId};

pub const EVENT_ARTIFACT_COMPLETED: &str = "artifact.completed";
pub const EVENT_ARTIFACT_FAILED: &str = "artifact.failed";

/// A terminal-state announcement. Ephemeral — published, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEvent {
    pub job_id: JobId,
    pub user_id: String,
    pub notebook_id: String,
    pub artifact_type: ArtifactType,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ArtifactEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactEventKind {
    Completed {
        result: serde_json::Value,
    },
    Failed {
        error: String,
        retry_count: u32,
    },
}

impl ArtifactEvent {
    pub fn completed(job: &ArtifactJob, result: serde_json::Value) -> Self {
        Self {
            job_id: job.id,
            user_id: job.user_id.clone(),
            notebook_id: job.notebook_id.clone(),
            artifact_type: job.artifact_type,
            timestamp: Utc::now(),
            kind: ArtifactEventKind::Completed { result },
        }
    }

    pub fn failed(job: &ArtifactJob, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            user_id: job.user_id.clone(),
            notebook_id: job.notebook_id.clone(),
            artifact_type: job.artifact_type,
            timestamp: Utc::now(),
            kind: ArtifactEventKind::Failed {
                error: error.into(),
                retry_count: job.retry_count,
            },
        }
    }

    /// The event-type string listeners filter on.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            ArtifactEventKind::Completed { .. } => EVENT_ARTIFACT_COMPLETED,
            ArtifactEventKind::Failed { .. } => EVENT_ARTIFACT_FAILED,
        }
    }
}

/// Publish/subscribe fan-out for [`ArtifactEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<ArtifactEvent>,
}

impl EventBus {
    /// `capacity` is the per-subscriber backlog; a subscriber that falls
    /// further behind observes a `Lagged` error rather than blocking the
    /// publisher.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArtifactEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: ArtifactEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
