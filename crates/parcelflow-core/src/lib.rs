pub mod error;
pub mod id;
pub mod manifest;
pub mod participant;
pub mod task;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use id::{EpisodeId, TaskId, generate_id};
pub use manifest::{
    DataParcelDescriptor, DataParcelManifest, DescriptorField, FlowDirection, NormalisationStatus,
    ParcelType, PolicyApprovalStatus, ValidationStatus, WILDCARD,
};
pub use participant::{FunctionToken, LocalIdentity, Participant, RemoteIdentity};
pub use task::{Task, TaskLineage, TaskPayload};
pub use time::{Timestamp, now_utc};
