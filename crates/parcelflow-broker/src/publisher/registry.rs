//! Publisher registry.
//!
//! Tracks which remote service instances are alive, which instances back each
//! named service (the fulfillment map), and whether the subscriptions this
//! process declared against a service currently have any provider.
//!
//! Instance liveness is only as fresh as the registration traffic relayed by
//! discovery; nothing here talks to other nodes.

use std::collections::BTreeSet;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use parcelflow_core::{CoreError, DataParcelManifest, Participant, Result, now_utc};

use super::types::{
    PublisherRegistration, PublisherRegistrationStatus, PublisherSubscriptionRegistration,
    PublisherSubscriptionStatus,
};
use crate::metrics;

#[derive(Debug, Default)]
pub struct PublisherRegistry {
    /// Registrations by instance name
    instances: DashMap<String, PublisherRegistration>,
    /// Service name -> instance names backing it
    fulfillment: DashMap<String, BTreeSet<String>>,
    /// Declared subscriptions by service name
    subscriptions: DashMap<String, PublisherSubscriptionRegistration>,
    /// Guards compound mutations across the three maps
    write_lock: Mutex<()>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live publisher instance.
    ///
    /// Returns the existing registration unchanged if the instance is already known.
    pub fn register_publisher_instance(
        &self,
        participant: &Participant,
    ) -> Result<PublisherRegistration> {
        participant.validate()?;
        let service_name = participant
            .service_name()
            .ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "publisher {participant} has no inter-subsystem identity"
                ))
            })?
            .to_string();
        let instance_name = participant.instance_name().to_string();

        let registration = {
            let _guard = self.write_lock.lock();
            if let Some(existing) = self.instances.get(&instance_name) {
                debug!(instance = %instance_name, "Publisher instance already registered");
                return Ok(existing.clone());
            }

            let now = now_utc();
            let registration = PublisherRegistration {
                participant: participant.clone(),
                status: PublisherRegistrationStatus::Registered,
                registered_at: now,
                last_activity_at: now,
                commentary: Some("registered".to_string()),
            };
            self.instances
                .insert(instance_name.clone(), registration.clone());
            self.fulfillment
                .entry(service_name.clone())
                .or_default()
                .insert(instance_name.clone());
            registration
        };

        info!(
            instance = %instance_name,
            service = %service_name,
            "Registered publisher instance"
        );
        metrics::set_publisher_instance_count(self.instances.len());
        self.check_a_provider_is_available(&service_name);
        Ok(registration)
    }

    /// Remove a publisher instance by participant.
    pub fn unregister_publisher(&self, participant: &Participant) -> Option<PublisherRegistration> {
        self.unregister_publisher_instance(participant.instance_name())
    }

    /// Remove a publisher instance by instance name.
    ///
    /// When the last instance of a service goes away, the service is dropped
    /// from the fulfillment map and its subscription status re-evaluated.
    pub fn unregister_publisher_instance(
        &self,
        instance_name: &str,
    ) -> Option<PublisherRegistration> {
        let (registration, emptied_service) = {
            let _guard = self.write_lock.lock();
            let (_, registration) = self.instances.remove(instance_name)?;

            let emptied_service = match registration.service_name() {
                Some(service) => {
                    let now_empty = match self.fulfillment.get_mut(service) {
                        Some(mut instances) => {
                            instances.remove(instance_name);
                            instances.is_empty()
                        }
                        None => false,
                    };
                    if now_empty {
                        self.fulfillment.remove(service);
                        Some(service.to_string())
                    } else {
                        None
                    }
                }
                None => None,
            };
            (registration, emptied_service)
        };

        info!(instance = %instance_name, "Unregistered publisher instance");
        metrics::set_publisher_instance_count(self.instances.len());

        if let Some(service) = emptied_service {
            debug!(service = %service, "Last provider of service went away");
            self.check_a_provider_is_available(&service);
        }
        Some(registration)
    }

    /// Participants currently backing `service_name`; empty when unknown.
    pub fn get_publisher_service_provider_instances(&self, service_name: &str) -> Vec<Participant> {
        let Some(instance_names) = self.fulfillment.get(service_name).map(|set| set.clone()) else {
            return Vec::new();
        };

        instance_names
            .iter()
            .filter_map(|name| self.instances.get(name).map(|r| r.participant.clone()))
            .collect()
    }

    /// Declare interest in `manifests` published by `service_name`.
    ///
    /// The first declaration creates the registration as `PendingNoProviders`;
    /// later ones append manifests not already declared.
    pub fn add_subscription_to_publisher(
        &self,
        manifests: &[DataParcelManifest],
        service_name: &str,
    ) -> Result<PublisherSubscriptionRegistration> {
        if service_name.trim().is_empty() {
            return Err(CoreError::invalid_argument("service name is empty"));
        }
        for manifest in manifests {
            manifest.validate()?;
        }

        {
            let _guard = self.write_lock.lock();
            let now = now_utc();
            let mut registration = self
                .subscriptions
                .entry(service_name.to_string())
                .or_insert_with(|| PublisherSubscriptionRegistration {
                    service_name: service_name.to_string(),
                    declared_manifests: Vec::new(),
                    status: PublisherSubscriptionStatus::PendingNoProviders,
                    registered_at: now,
                    updated_at: now,
                });

            for manifest in manifests {
                if !registration.declared_manifests.contains(manifest) {
                    registration.declared_manifests.push(manifest.clone());
                    registration.updated_at = now;
                }
            }
        }

        debug!(
            service = %service_name,
            declared = manifests.len(),
            "Declared subscription to publisher service"
        );
        self.check_a_provider_is_available(service_name);

        self.subscriptions
            .get(service_name)
            .map(|r| r.clone())
            .ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "subscription registration for {service_name} disappeared"
                ))
            })
    }

    /// Re-evaluate the provider status of the subscription declared for `service_name`.
    ///
    /// Returns the resulting status, or `None` if nothing was declared for the service.
    pub fn check_a_provider_is_available(
        &self,
        service_name: &str,
    ) -> Option<PublisherSubscriptionStatus> {
        // Status is decided and written under the same guard
        let _guard = self.write_lock.lock();
        let available = self
            .fulfillment
            .get(service_name)
            .is_some_and(|instances| !instances.is_empty());
        let status = if available {
            PublisherSubscriptionStatus::Fulfilled
        } else {
            PublisherSubscriptionStatus::PendingNoProviders
        };

        let mut registration = self.subscriptions.get_mut(service_name)?;
        if registration.status != status {
            debug!(
                service = %service_name,
                from = ?registration.status,
                to = ?status,
                "Publisher subscription status changed"
            );
            registration.status = status;
            registration.updated_at = now_utc();
        }
        Some(status)
    }

    /// Record activity from a publisher instance.
    pub fn touch_publisher(&self, instance_name: &str, commentary: Option<String>) -> bool {
        match self.instances.get_mut(instance_name) {
            Some(mut registration) => {
                registration.last_activity_at = now_utc();
                if commentary.is_some() {
                    registration.commentary = commentary;
                }
                true
            }
            None => false,
        }
    }

    pub fn get_publisher_registration(&self, instance_name: &str) -> Option<PublisherRegistration> {
        self.instances.get(instance_name).map(|r| r.clone())
    }

    pub fn get_publisher_subscription(
        &self,
        service_name: &str,
    ) -> Option<PublisherSubscriptionRegistration> {
        self.subscriptions.get(service_name).map(|r| r.clone())
    }

    pub fn publisher_registrations(&self) -> Vec<PublisherRegistration> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }

    pub fn publisher_subscriptions(&self) -> Vec<PublisherSubscriptionRegistration> {
        self.subscriptions.iter().map(|e| e.value().clone()).collect()
    }

    /// Instance names currently fulfilling `service_name`.
    pub fn fulfillment_instances(&self, service_name: &str) -> BTreeSet<String> {
        self.fulfillment
            .get(service_name)
            .map(|set| set.clone())
            .unwrap_or_default()
    }
}
