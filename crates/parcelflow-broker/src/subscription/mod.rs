//! Wildcard-capable subscription matching.

pub mod matcher;
pub mod registry;
pub mod types;

pub use registry::SubscriptionRegistry;
pub use types::{MatchKind, RemoteConnectionStatus, Subscription};
