//! Subscription registry types.

use serde::{Deserialize, Serialize};

use parcelflow_core::{DataParcelManifest, Participant};

/// A subscriber's interest in parcels matching a pattern manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Pattern; fields may carry the wildcard sentinel.
    pub manifest: DataParcelManifest,
    pub subscriber: Participant,
}

impl Subscription {
    pub fn new(manifest: DataParcelManifest, subscriber: Participant) -> Self {
        Self {
            manifest,
            subscriber,
        }
    }
}

/// Connection state of a subscriber reached across a subsystem boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteConnectionStatus {
    Established,
    #[default]
    NotEstablished,
}

/// How a subscription qualified for a published manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Content and container descriptors both matched.
    Full,
    /// Pattern only constrains the container ("anything in this envelope").
    ContainerOnly,
}
