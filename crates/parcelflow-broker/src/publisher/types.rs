//! Publisher registry types.

use serde::{Deserialize, Serialize};

use parcelflow_core::{DataParcelManifest, Participant, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublisherRegistrationStatus {
    Registered,
    NotRegistered,
}

/// A live remote service instance fulfilling a publishing role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherRegistration {
    pub participant: Participant,
    pub status: PublisherRegistrationStatus,
    pub registered_at: Timestamp,
    pub last_activity_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

impl PublisherRegistration {
    pub fn instance_name(&self) -> &str {
        self.participant.instance_name()
    }

    pub fn service_name(&self) -> Option<&str> {
        self.participant.service_name()
    }
}

/// Whether a consumer-side subscription to a service currently has a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublisherSubscriptionStatus {
    Fulfilled,
    PendingNoProviders,
}

/// Manifests this process wants from a named publishing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherSubscriptionRegistration {
    pub service_name: String,
    pub declared_manifests: Vec<DataParcelManifest>,
    pub status: PublisherSubscriptionStatus,
    pub registered_at: Timestamp,
    pub updated_at: Timestamp,
}
