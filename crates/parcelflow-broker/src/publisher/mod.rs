//! Publisher liveness and provider availability.

pub mod registry;
pub mod types;

pub use registry::PublisherRegistry;
pub use types::{
    PublisherRegistration, PublisherRegistrationStatus, PublisherSubscriptionRegistration,
    PublisherSubscriptionStatus,
};
