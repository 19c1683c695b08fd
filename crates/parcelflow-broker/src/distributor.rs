//! Task fan-out.
//!
//! One distribution pass hands a forked copy of a task to every matched
//! subscriber exactly once. Remote subscribers belonging to the manifest's
//! explicit target system are served first; the general pass then skips that
//! system so it is never reached twice. Each copy gets its own lineage hop and
//! the recipient's function is registered as expected downstream work.
//!
//! Delivery is best-effort: a recipient that cannot be resolved or whose send
//! fails is logged and counted, and the pass moves on.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use parcelflow_core::{Participant, Task, WILDCARD};

use crate::error::DeliveryError;
use crate::finalisation::EpisodeFinalisationTracker;
use crate::interfaces::{
    EndpointAddress, EndpointResolver, EpisodeIdMinter, TaskSender, UuidEpisodeIdMinter,
};
use crate::metrics;
use crate::subscription::SubscriptionRegistry;

pub struct TaskDistributor {
    subscriptions: Arc<SubscriptionRegistry>,
    finalisation: Arc<EpisodeFinalisationTracker>,
    resolver: Arc<dyn EndpointResolver>,
    sender: Arc<dyn TaskSender>,
    minter: Arc<dyn EpisodeIdMinter>,
}

impl TaskDistributor {
    pub fn new(
        subscriptions: Arc<SubscriptionRegistry>,
        finalisation: Arc<EpisodeFinalisationTracker>,
        resolver: Arc<dyn EndpointResolver>,
        sender: Arc<dyn TaskSender>,
    ) -> Self {
        Self {
            subscriptions,
            finalisation,
            resolver,
            sender,
            minter: Arc::new(UuidEpisodeIdMinter),
        }
    }

    /// Replace the default episode id scheme.
    pub fn with_minter(mut self, minter: Arc<dyn EpisodeIdMinter>) -> Self {
        self.minter = minter;
        self
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn finalisation(&self) -> &Arc<EpisodeFinalisationTracker> {
        &self.finalisation
    }

    /// Deliver `task` to every matched subscriber.
    ///
    /// Returns the endpoints actually reached. A task without an egress
    /// manifest has nothing to route and yields an empty list.
    pub fn distribute_task(&self, task: &Task) -> Vec<EndpointAddress> {
        let Some(manifest) = task.egress_manifest() else {
            debug!(task_id = %task.task_id, "Task has no egress manifest, nothing to distribute");
            return Vec::new();
        };

        let started = Instant::now();
        let candidates = self.subscriptions.derive_subscriber_list(manifest);
        let mut delivered = Vec::new();

        if candidates.is_empty() {
            debug!(task_id = %task.task_id, "No subscribers for task");
            metrics::record_distribution(0, started.elapsed());
            return delivered;
        }

        // Targeted pass
        let already_sent_to = manifest.explicit_target_system();
        if let Some(target_system) = already_sent_to {
            for participant in candidates
                .iter()
                .filter(|p| p.service_name() == Some(target_system))
            {
                if let Some(endpoint) = self.deliver(task, participant) {
                    delivered.push(endpoint);
                }
            }
        }

        // General pass
        for participant in &candidates {
            if let (Some(service), Some(sent)) = (participant.service_name(), already_sent_to)
                && service == sent
            {
                continue;
            }
            if let Some(endpoint) = self.deliver(task, participant) {
                delivered.push(endpoint);
            }
        }

        info!(
            task_id = %task.task_id,
            candidates = candidates.len(),
            delivered = delivered.len(),
            "Distributed task"
        );
        metrics::record_distribution(delivered.len(), started.elapsed());
        delivered
    }

    /// Fork, stamp and send one copy. `None` when the delivery failed.
    fn deliver(&self, task: &Task, recipient: &Participant) -> Option<EndpointAddress> {
        match self.try_deliver(task, recipient) {
            Ok(endpoint) => Some(endpoint),
            Err(err) => {
                warn!(
                    task_id = %task.task_id,
                    recipient = %recipient,
                    reason = err.reason(),
                    error = %err,
                    "Delivery failed, skipping recipient"
                );
                metrics::record_delivery_failure(err.reason());
                None
            }
        }
    }

    fn try_deliver(
        &self,
        task: &Task,
        recipient: &Participant,
    ) -> Result<EndpointAddress, DeliveryError> {
        let mut copy = task.fork();

        let content = match copy.egress.as_mut().and_then(|p| p.manifest.as_mut()) {
            Some(manifest) => {
                if let Some(service) = recipient.service_name() {
                    let untargeted = manifest
                        .intended_target_system
                        .as_deref()
                        .is_none_or(|t| t.trim().is_empty() || t == WILDCARD);
                    if untargeted {
                        manifest.intended_target_system = Some(service.to_string());
                    }
                }
                manifest.content_descriptor.clone()
            }
            None => None,
        };

        let function = recipient.function();
        let episode_id = self.minter.new_episode_id(function, content.as_ref());
        copy.lineage.advance(episode_id);
        let present = copy.lineage.present_episode_id.clone();

        let endpoint = self
            .resolver
            .resolve_endpoint(recipient)
            .ok_or_else(|| DeliveryError::endpoint_not_resolved(recipient))?;

        // Interest must exist before the consumer can report on the copy
        if let Err(err) = self
            .finalisation
            .register_downstream_wup_interest(&present, function)
        {
            warn!(
                episode = %present,
                function = %function,
                error = %err,
                "Could not register downstream interest"
            );
        }

        if let Err(err) = self.sender.send(&endpoint, copy) {
            self.finalisation
                .withdraw_downstream_wup_interest(&present, function);
            return Err(err);
        }

        debug!(
            recipient = %recipient,
            endpoint = %endpoint,
            episode = %present,
            "Delivered task copy"
        );
        metrics::record_delivery(&endpoint);
        Ok(endpoint)
    }
}

impl std::fmt::Debug for TaskDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDistributor")
            .field("subscriptions", &self.subscriptions.subscription_count())
            .field("episodes", &self.finalisation.episode_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcelflow_core::{
        DataParcelDescriptor, DataParcelManifest, EpisodeId, FunctionToken, TaskLineage,
        TaskPayload,
    };
    use parking_lot::Mutex;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(EndpointAddress, Task)>>,
        failing: HashSet<String>,
    }

    impl RecordingSender {
        fn failing_on(endpoint: &str) -> Self {
            Self {
                failing: HashSet::from([endpoint.to_string()]),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(EndpointAddress, Task)> {
            self.sent.lock().clone()
        }
    }

    impl TaskSender for RecordingSender {
        fn send(&self, endpoint: &EndpointAddress, task: Task) -> Result<(), DeliveryError> {
            if self.failing.contains(endpoint.as_str()) {
                return Err(DeliveryError::MailboxClosed {
                    endpoint: endpoint.clone(),
                });
            }
            self.sent.lock().push((endpoint.clone(), task));
            Ok(())
        }
    }

    /// Resolves every participant to its component id, except those listed.
    #[derive(Default)]
    struct StaticResolver {
        unknown: HashSet<String>,
    }

    impl EndpointResolver for StaticResolver {
        fn resolve_endpoint(&self, participant: &Participant) -> Option<EndpointAddress> {
            (!self.unknown.contains(participant.component_id()))
                .then(|| EndpointAddress::new(participant.component_id()))
        }
    }

    fn descriptor() -> DataParcelDescriptor {
        DataParcelDescriptor::new()
            .with_definer("HL7")
            .with_category("Observation")
            .with_sub_category("Vitals")
            .with_resource("Patient")
            .fill_unset("NA")
    }

    fn pattern() -> DataParcelManifest {
        DataParcelManifest::new().with_content(descriptor().with_sub_category("*"))
    }

    fn task_for(manifest: DataParcelManifest) -> Task {
        Task::new(Some(TaskPayload::new(manifest, "{\"resourceType\":\"Observation\"}")))
    }

    fn r1() -> Participant {
        Participant::remote("lab-egress", "lab-forward", "LabSystemX", "lab-ep")
    }

    fn local() -> Participant {
        Participant::local("vitals-processor", "vitals")
    }

    fn distributor(
        sender: Arc<RecordingSender>,
        resolver: StaticResolver,
    ) -> (TaskDistributor, Arc<SubscriptionRegistry>, Arc<EpisodeFinalisationTracker>) {
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let finalisation = Arc::new(EpisodeFinalisationTracker::new());
        let distributor = TaskDistributor::new(
            subscriptions.clone(),
            finalisation.clone(),
            Arc::new(resolver),
            sender,
        );
        (distributor, subscriptions, finalisation)
    }

    #[test]
    fn targeted_system_is_reached_once() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, _) = distributor(sender.clone(), StaticResolver::default());
        subscriptions.add_subscriber(&pattern(), &r1()).unwrap();

        let manifest = DataParcelManifest::new()
            .with_content(descriptor())
            .with_intended_target_system("LabSystemX");
        let delivered = distributor.distribute_task(&task_for(manifest));

        assert_eq!(delivered, vec![EndpointAddress::new("lab-egress")]);
        assert_eq!(sender.sent().len(), 1);
    }

    #[test]
    fn local_participant_unaffected_by_target_routing() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, _) = distributor(sender.clone(), StaticResolver::default());
        subscriptions.add_subscriber(&pattern(), &r1()).unwrap();
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();

        let manifest = DataParcelManifest::new()
            .with_content(descriptor())
            .with_intended_target_system("LabSystemX");
        let delivered = distributor.distribute_task(&task_for(manifest));

        assert_eq!(delivered.len(), 2);
        assert!(delivered.contains(&EndpointAddress::new("vitals-processor")));
        assert!(delivered.contains(&EndpointAddress::new("lab-egress")));
    }

    #[test]
    fn other_remote_systems_still_served_in_general_pass() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, _) = distributor(sender.clone(), StaticResolver::default());
        let pharmacy = Participant::remote("rx-egress", "rx-forward", "PharmacyY", "rx-ep");
        subscriptions.add_subscriber(&pattern(), &r1()).unwrap();
        subscriptions.add_subscriber(&pattern(), &pharmacy).unwrap();

        let manifest = DataParcelManifest::new()
            .with_content(descriptor())
            .with_intended_target_system("LabSystemX");
        let delivered = distributor.distribute_task(&task_for(manifest));

        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn no_manifest_short_circuits() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, finalisation) =
            distributor(sender.clone(), StaticResolver::default());
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();

        assert!(distributor.distribute_task(&Task::new(None)).is_empty());
        assert!(sender.sent().is_empty());
        assert!(finalisation.get_episode_list().is_empty());
    }

    #[test]
    fn no_subscribers_is_silent() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, _, _) = distributor(sender.clone(), StaticResolver::default());
        let delivered =
            distributor.distribute_task(&task_for(DataParcelManifest::new().with_content(descriptor())));
        assert!(delivered.is_empty());
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn failing_recipients_do_not_abort_fan_out() {
        let sender = Arc::new(RecordingSender::failing_on("broken"));
        let resolver = StaticResolver {
            unknown: HashSet::from(["ghost".to_string()]),
        };
        let (distributor, subscriptions, finalisation) = distributor(sender.clone(), resolver);
        subscriptions
            .add_subscriber(&pattern(), &Participant::local("ghost", "vitals"))
            .unwrap();
        subscriptions
            .add_subscriber(&pattern(), &Participant::local("broken", "vitals"))
            .unwrap();
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();

        let delivered =
            distributor.distribute_task(&task_for(DataParcelManifest::new().with_content(descriptor())));

        assert_eq!(delivered, vec![EndpointAddress::new("vitals-processor")]);
        assert_eq!(finalisation.episode_count(), 1);
    }

    /// Consumer that reports its downstream episode and sweeps before `send` returns.
    struct EagerConsumer {
        finalisation: Arc<EpisodeFinalisationTracker>,
    }

    impl TaskSender for EagerConsumer {
        fn send(&self, _endpoint: &EndpointAddress, task: Task) -> Result<(), DeliveryError> {
            self.finalisation
                .register_downstream_episode_id(
                    &task.lineage.present_episode_id,
                    &FunctionToken::new("vitals"),
                    &EpisodeId::new("downstream-1"),
                )
                .unwrap();
            self.finalisation.remove_finalised_episodes();
            Ok(())
        }
    }

    #[test]
    fn report_racing_the_send_leaves_no_pending_episode() {
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let finalisation = Arc::new(EpisodeFinalisationTracker::new());
        let distributor = TaskDistributor::new(
            subscriptions.clone(),
            finalisation.clone(),
            Arc::new(StaticResolver::default()),
            Arc::new(EagerConsumer {
                finalisation: finalisation.clone(),
            }),
        );
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();

        let delivered =
            distributor.distribute_task(&task_for(DataParcelManifest::new().with_content(descriptor())));

        assert_eq!(delivered.len(), 1);
        assert!(finalisation.get_episode_list().is_empty());
    }

    #[test]
    fn each_copy_gets_its_own_lineage_hop() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, finalisation) =
            distributor(sender.clone(), StaticResolver::default());
        let archiver = Participant::local("archiver", "archive");
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();
        subscriptions.add_subscriber(&pattern(), &archiver).unwrap();

        let task = task_for(DataParcelManifest::new().with_content(descriptor()))
            .with_lineage(TaskLineage::new(EpisodeId::new("upstream")));
        distributor.distribute_task(&task);

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        for (_, copy) in &sent {
            assert_eq!(
                copy.lineage.previous_episode_id,
                Some(EpisodeId::new("upstream"))
            );
            assert_ne!(copy.task_id, task.task_id);
        }
        assert_ne!(
            sent[0].1.lineage.present_episode_id,
            sent[1].1.lineage.present_episode_id
        );
        // source task untouched
        assert_eq!(task.lineage.present_episode_id, EpisodeId::new("upstream"));

        for (_, copy) in &sent {
            let status = finalisation
                .episode_status(&copy.lineage.present_episode_id)
                .unwrap();
            assert_eq!(status.downstream.len(), 1);
            assert!(!status.finalised);
        }
    }

    #[test]
    fn remote_copy_is_stamped_with_service_name() {
        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, _) = distributor(sender.clone(), StaticResolver::default());
        subscriptions.add_subscriber(&pattern(), &r1()).unwrap();
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();

        let task = task_for(DataParcelManifest::new().with_content(descriptor()));
        distributor.distribute_task(&task);

        for (endpoint, copy) in sender.sent() {
            let target = copy.egress_manifest().unwrap().intended_target_system.clone();
            if endpoint.as_str() == "lab-egress" {
                assert_eq!(target.as_deref(), Some("LabSystemX"));
            } else {
                assert_eq!(target, None);
            }
        }
        assert_eq!(task.egress_manifest().unwrap().intended_target_system, None);
    }

    #[test]
    fn custom_minter_is_used() {
        struct Fixed;
        impl EpisodeIdMinter for Fixed {
            fn new_episode_id(
                &self,
                target: &FunctionToken,
                _content: Option<&DataParcelDescriptor>,
            ) -> EpisodeId {
                EpisodeId::new(format!("fixed-{target}"))
            }
        }

        let sender = Arc::new(RecordingSender::default());
        let (distributor, subscriptions, finalisation) =
            distributor(sender.clone(), StaticResolver::default());
        let distributor = distributor.with_minter(Arc::new(Fixed));
        subscriptions.add_subscriber(&pattern(), &local()).unwrap();

        distributor.distribute_task(&task_for(DataParcelManifest::new().with_content(descriptor())));
        assert_eq!(
            finalisation.get_episode_list(),
            vec![EpisodeId::new("fixed-vitals")]
        );
    }
}
