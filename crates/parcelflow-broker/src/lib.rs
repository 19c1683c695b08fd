//! Content-addressed publish/subscribe broker with workflow lineage tracking.

pub mod distributor;
pub mod error;
pub mod finalisation;
pub mod interfaces;
pub mod metrics;
pub mod publisher;
pub mod subscription;

pub use distributor::TaskDistributor;
pub use error::DeliveryError;
pub use finalisation::{
    EpisodeFinalisationStatus, EpisodeFinalisationStatusSet, EpisodeFinalisationTracker,
};
pub use interfaces::{
    EndpointAddress, EndpointResolver, EpisodeIdMinter, TaskSender, UuidEpisodeIdMinter,
};
pub use publisher::{
    PublisherRegistration, PublisherRegistrationStatus, PublisherRegistry,
    PublisherSubscriptionRegistration, PublisherSubscriptionStatus,
};
pub use subscription::{MatchKind, RemoteConnectionStatus, Subscription, SubscriptionRegistry};
