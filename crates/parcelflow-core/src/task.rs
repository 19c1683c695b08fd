//! Units of work handed between processing components.

use serde::{Deserialize, Serialize};

use crate::id::{EpisodeId, TaskId};
use crate::manifest::DataParcelManifest;
use crate::time::{Timestamp, now_utc};

/// Workflow lineage of a task: the hop it belongs to and the hop before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLineage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_episode_id: Option<EpisodeId>,
    pub present_episode_id: EpisodeId,
}

impl TaskLineage {
    pub fn new(present_episode_id: EpisodeId) -> Self {
        Self {
            previous_episode_id: None,
            present_episode_id,
        }
    }

    /// Move to the next hop: the present id becomes the previous one.
    pub fn advance(&mut self, next: EpisodeId) {
        let present = std::mem::replace(&mut self.present_episode_id, next);
        self.previous_episode_id = Some(present);
    }
}

/// Content produced by a task, tagged with its routing manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<DataParcelManifest>,
    #[serde(default)]
    pub content: String,
}

impl TaskPayload {
    pub fn new(manifest: DataParcelManifest, content: impl Into<String>) -> Self {
        Self {
            manifest: Some(manifest),
            content: content.into(),
        }
    }
}

/// A unit of work with its egress payload and lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    pub lineage: TaskLineage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress: Option<TaskPayload>,
    pub created_at: Timestamp,
}

impl Task {
    /// New task starting a fresh lineage.
    pub fn new(egress: Option<TaskPayload>) -> Self {
        Self {
            task_id: TaskId::generate(),
            lineage: TaskLineage::new(EpisodeId::generate()),
            egress,
            created_at: now_utc(),
        }
    }

    pub fn with_lineage(mut self, lineage: TaskLineage) -> Self {
        self.lineage = lineage;
        self
    }

    pub fn egress_manifest(&self) -> Option<&DataParcelManifest> {
        self.egress.as_ref().and_then(|p| p.manifest.as_ref())
    }

    /// Independent copy for a single recipient.
    ///
    /// Gets its own task id; lineage and payload are copied by value so the
    /// caller can stamp recipient-specific values without touching the source.
    pub fn fork(&self) -> Task {
        Task {
            task_id: TaskId::generate(),
            lineage: self.lineage.clone(),
            egress: self.egress.clone(),
            created_at: now_utc(),
        }
    }
}
