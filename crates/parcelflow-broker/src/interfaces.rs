//! Collaborators the broker calls into.
//!
//! The physical transport, endpoint naming and lineage id scheme live outside
//! the broker. The distributor only sees these traits, so the server can plug
//! in its in-process mailboxes and tests can plug in recording doubles.

use serde::{Deserialize, Serialize};
use std::fmt;

use parcelflow_core::{DataParcelDescriptor, EpisodeId, FunctionToken, Participant, Task};

use crate::error::DeliveryError;

/// Address of a delivery endpoint as understood by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointAddress(String);

impl EndpointAddress {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves a participant to the endpoint a task should be handed to.
pub trait EndpointResolver: Send + Sync {
    /// `None` when the participant has no live endpoint.
    fn resolve_endpoint(&self, participant: &Participant) -> Option<EndpointAddress>;
}

/// Fire-and-forget send primitive.
///
/// Returns once the task is enqueued or transmitted; never waits for downstream processing.
pub trait TaskSender: Send + Sync {
    fn send(&self, endpoint: &EndpointAddress, task: Task) -> Result<(), DeliveryError>;
}

/// Mints the episode id for one delivery hop.
pub trait EpisodeIdMinter: Send + Sync {
    fn new_episode_id(
        &self,
        target: &FunctionToken,
        content: Option<&DataParcelDescriptor>,
    ) -> EpisodeId;
}

/// Default minter: `<function>:<descriptor token>:<uuid>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidEpisodeIdMinter;

impl EpisodeIdMinter for UuidEpisodeIdMinter {
    fn new_episode_id(
        &self,
        target: &FunctionToken,
        content: Option<&DataParcelDescriptor>,
    ) -> EpisodeId {
        let token = content
            .map(DataParcelDescriptor::to_token)
            .unwrap_or_else(|| "none".to_string());
        EpisodeId::new(format!(
            "{}:{}:{}",
            target,
            token,
            parcelflow_core::generate_id()
        ))
    }
}
