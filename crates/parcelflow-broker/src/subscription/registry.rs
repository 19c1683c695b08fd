//! Subscription registry.
//!
//! Subscriptions are filed under their registration key (content descriptor,
//! else container descriptor). Lookups read the `DashMap` directly; compound
//! writes (find-or-create the list, then append) are serialized by a single
//! registry mutex so two concurrent registrations for a new key cannot race.

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use parcelflow_core::{CoreError, DataParcelDescriptor, DataParcelManifest, Participant, Result};

use super::matcher::{classify, descriptor_matches};
use super::types::{RemoteConnectionStatus, Subscription};
use crate::metrics;

/// Registry of subscriber interest keyed by descriptor pattern.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Subscriptions by registration key
    subscriptions: DashMap<DataParcelDescriptor, Vec<Subscription>>,
    /// Connection state of remote subscribers
    connection_status: DashMap<Participant, RemoteConnectionStatus>,
    /// Guards compound mutations of `subscriptions`
    write_lock: Mutex<()>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `participant`'s interest in parcels matching `manifest`.
    ///
    /// A subscription by the same participant identity under the same
    /// registration key already covers it; re-registering is a no-op.
    pub fn add_subscriber(
        &self,
        manifest: &DataParcelManifest,
        participant: &Participant,
    ) -> Result<()> {
        participant.validate()?;
        let key = Self::registration_key(manifest)?;

        {
            let _guard = self.write_lock.lock();
            let mut entry = self.subscriptions.entry(key.clone()).or_default();
            let exists = entry
                .iter()
                .any(|s| s.subscriber.same_identity(participant));

            if exists {
                debug!(
                    subscriber = %participant,
                    key = %key,
                    "Subscription already registered"
                );
            } else {
                entry.push(Subscription::new(manifest.clone(), participant.clone()));
                debug!(subscriber = %participant, key = %key, "Registered subscription");
            }
        }

        if participant.is_remote() {
            self.set_connection_status(participant, RemoteConnectionStatus::Established);
        }

        metrics::set_subscription_count(self.subscription_count());
        Ok(())
    }

    /// Remove the first subscription equal to `(manifest, participant)`.
    ///
    /// Returns whether anything was removed.
    pub fn remove_subscriber(
        &self,
        manifest: &DataParcelManifest,
        participant: &Participant,
    ) -> Result<bool> {
        let key = Self::registration_key(manifest)?;
        let target = Subscription::new(manifest.clone(), participant.clone());

        let removed = {
            let _guard = self.write_lock.lock();
            let removed = match self.subscriptions.get_mut(&key) {
                Some(mut list) => match list.iter().position(|s| *s == target) {
                    Some(index) => {
                        list.remove(index);
                        true
                    }
                    None => false,
                },
                None => false,
            };
            self.subscriptions.remove_if(&key, |_, list| list.is_empty());
            removed
        };

        if removed {
            debug!(subscriber = %participant, key = %key, "Removed subscription");
            metrics::set_subscription_count(self.subscription_count());
        }
        Ok(removed)
    }

    /// Subscriptions filed exactly under `descriptor`.
    pub fn get_subscriber_list(&self, descriptor: &DataParcelDescriptor) -> Vec<Subscription> {
        self.subscriptions
            .get(descriptor)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Participants whose subscriptions qualify for the published `manifest`.
    ///
    /// Scans every registered pattern, since any pattern field may be a
    /// wildcard. Each participant is returned once.
    pub fn derive_subscriber_list(&self, manifest: &DataParcelManifest) -> Vec<Participant> {
        let content = manifest.content_descriptor.as_ref();
        let container = manifest.container_descriptor.as_ref();
        let mut participants: Vec<Participant> = Vec::new();

        for entry in self.subscriptions.iter() {
            let key = entry.key();
            let content_candidate = content.is_some_and(|c| descriptor_matches(key, c));
            let container_candidate = container.is_some_and(|c| descriptor_matches(key, c));
            if !content_candidate && !container_candidate {
                continue;
            }

            for subscription in entry.value() {
                let Some(kind) = classify(&subscription.manifest, manifest) else {
                    continue;
                };
                trace!(
                    subscriber = %subscription.subscriber,
                    kind = ?kind,
                    "Subscription matched"
                );
                if !participants.contains(&subscription.subscriber) {
                    participants.push(subscription.subscriber.clone());
                }
            }
        }

        debug!(
            matched = participants.len(),
            content = ?content.map(|c| c.to_token()),
            "Derived subscriber list"
        );
        participants
    }

    /// Snapshot of every registered subscription.
    pub fn all_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn connection_status(&self, participant: &Participant) -> RemoteConnectionStatus {
        self.connection_status
            .get(participant)
            .map(|status| *status)
            .unwrap_or_default()
    }

    pub fn set_connection_status(&self, participant: &Participant, status: RemoteConnectionStatus) {
        self.connection_status.insert(participant.clone(), status);
    }

    fn registration_key(manifest: &DataParcelManifest) -> Result<DataParcelDescriptor> {
        manifest.registration_key().cloned().ok_or_else(|| {
            CoreError::invalid_argument(
                "subscription manifest has neither a content nor a container descriptor",
            )
        })
    }
}
