//! Broker error types.

use thiserror::Error;

use crate::interfaces::EndpointAddress;

/// Failure of a single delivery during fan-out.
///
/// Never escapes [`TaskDistributor::distribute_task`](crate::TaskDistributor::distribute_task);
/// it is logged, counted and the fan-out moves on to the next recipient.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("No endpoint resolved for participant {participant}")]
    EndpointNotResolved { participant: String },

    #[error("Mailbox for endpoint {endpoint} is full")]
    MailboxFull { endpoint: EndpointAddress },

    #[error("Mailbox for endpoint {endpoint} is closed")]
    MailboxClosed { endpoint: EndpointAddress },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn endpoint_not_resolved(participant: impl ToString) -> Self {
        Self::EndpointNotResolved {
            participant: participant.to_string(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Short label used for metrics and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::EndpointNotResolved { .. } => "unresolved",
            Self::MailboxFull { .. } => "mailbox_full",
            Self::MailboxClosed { .. } => "mailbox_closed",
            Self::Transport(_) => "transport",
        }
    }
}
