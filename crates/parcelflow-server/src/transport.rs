//! In-process mailbox transport.
//!
//! Each endpoint is a bounded `tokio::sync::mpsc` channel named after the
//! component it feeds. Local participants resolve to their component id;
//! remote participants resolve to the egress mailbox configured for their
//! service, else to their endpoint name. Sends use `try_send`, so a full
//! mailbox is a failed delivery rather than a blocked distributor.
//!
//! A mailbox's receiver either stays parked here (drained over HTTP) or is
//! taken by an in-process consumer.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use parcelflow_broker::{DeliveryError, EndpointAddress, EndpointResolver, TaskSender};
use parcelflow_core::{Participant, Task};

use crate::config::TransportConfig;

struct Mailbox {
    sender: mpsc::Sender<Task>,
    /// `None` once an in-process consumer took it
    receiver: Mutex<Option<mpsc::Receiver<Task>>>,
}

pub struct MailboxTransport {
    capacity: usize,
    mailboxes: DashMap<EndpointAddress, Mailbox>,
    remote_egress: HashMap<String, String>,
}

impl MailboxTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            capacity: config.mailbox_capacity.max(1),
            mailboxes: DashMap::new(),
            remote_egress: config
                .remote_egress
                .iter()
                .map(|route| (route.service.clone(), route.mailbox.clone()))
                .collect(),
        }
    }

    /// Name of the mailbox a participant is delivered to, whether or not it is open.
    pub fn endpoint_for(&self, participant: &Participant) -> EndpointAddress {
        match &participant.remote {
            Some(remote) => {
                let name = self
                    .remote_egress
                    .get(&remote.service_name)
                    .unwrap_or(&remote.endpoint_name);
                EndpointAddress::new(name.as_str())
            }
            None => EndpointAddress::new(participant.component_id()),
        }
    }

    /// Open the mailbox for `endpoint` if it is not open yet.
    pub fn ensure_mailbox(&self, endpoint: &EndpointAddress) {
        self.mailboxes.entry(endpoint.clone()).or_insert_with(|| {
            info!(endpoint = %endpoint, capacity = self.capacity, "Opened mailbox");
            let (sender, receiver) = mpsc::channel(self.capacity);
            Mailbox {
                sender,
                receiver: Mutex::new(Some(receiver)),
            }
        });
    }

    /// Hand the receiving side of a mailbox to an in-process consumer.
    pub fn take_receiver(&self, endpoint: &EndpointAddress) -> Option<mpsc::Receiver<Task>> {
        self.ensure_mailbox(endpoint);
        let mailbox = self.mailboxes.get(endpoint)?;
        let receiver = mailbox.receiver.lock().take();
        receiver
    }

    /// Pop up to `max` queued tasks from a parked mailbox.
    ///
    /// `None` when the mailbox does not exist or its receiver was taken.
    pub fn drain(&self, endpoint: &EndpointAddress, max: usize) -> Option<Vec<Task>> {
        let mailbox = self.mailboxes.get(endpoint)?;
        let mut guard = mailbox.receiver.lock();
        let receiver = guard.as_mut()?;

        let mut tasks = Vec::new();
        while tasks.len() < max {
            match receiver.try_recv() {
                Ok(task) => tasks.push(task),
                Err(_) => break,
            }
        }
        Some(tasks)
    }

    pub fn close_mailbox(&self, endpoint: &EndpointAddress) -> bool {
        let closed = self.mailboxes.remove(endpoint).is_some();
        if closed {
            info!(endpoint = %endpoint, "Closed mailbox");
        }
        closed
    }

    /// Open mailboxes with their queued task counts.
    pub fn mailboxes(&self) -> Vec<(EndpointAddress, usize)> {
        let mut listed: Vec<_> = self
            .mailboxes
            .iter()
            .map(|entry| {
                let queued = entry.sender.max_capacity() - entry.sender.capacity();
                (entry.key().clone(), queued)
            })
            .collect();
        listed.sort();
        listed
    }
}

impl EndpointResolver for MailboxTransport {
    fn resolve_endpoint(&self, participant: &Participant) -> Option<EndpointAddress> {
        let endpoint = self.endpoint_for(participant);
        self.mailboxes.contains_key(&endpoint).then_some(endpoint)
    }
}

impl TaskSender for MailboxTransport {
    fn send(&self, endpoint: &EndpointAddress, task: Task) -> Result<(), DeliveryError> {
        let sender = self
            .mailboxes
            .get(endpoint)
            .map(|mailbox| mailbox.sender.clone())
            .ok_or_else(|| DeliveryError::transport(format!("no mailbox named {endpoint}")))?;

        match sender.try_send(task) {
            Ok(()) => {
                debug!(endpoint = %endpoint, "Enqueued task");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DeliveryError::MailboxFull {
                endpoint: endpoint.clone(),
            }),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::MailboxClosed {
                endpoint: endpoint.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for MailboxTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxTransport")
            .field("capacity", &self.capacity)
            .field("mailboxes", &self.mailboxes.len())
            .field("remote_egress", &self.remote_egress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteEgressRoute;
    use tokio_test::block_on;

    fn transport(capacity: usize) -> MailboxTransport {
        let mut config = TransportConfig {
            mailbox_capacity: capacity,
            ..Default::default()
        };
        config.remote_egress.push(RemoteEgressRoute {
            service: "LabSystemX".into(),
            mailbox: "lab-forwarder".into(),
        });
        MailboxTransport::new(&config)
    }

    #[test]
    fn endpoint_naming() {
        let transport = transport(4);
        assert_eq!(
            transport.endpoint_for(&Participant::local("vitals", "fn")).as_str(),
            "vitals"
        );
        assert_eq!(
            transport
                .endpoint_for(&Participant::remote("c", "fn", "LabSystemX", "lab-ep"))
                .as_str(),
            "lab-forwarder"
        );
        assert_eq!(
            transport
                .endpoint_for(&Participant::remote("c", "fn", "PharmacyY", "rx-ep"))
                .as_str(),
            "rx-ep"
        );
    }

    #[test]
    fn unopened_mailbox_does_not_resolve() {
        let transport = transport(4);
        let participant = Participant::local("vitals", "fn");
        assert!(transport.resolve_endpoint(&participant).is_none());

        transport.ensure_mailbox(&EndpointAddress::new("vitals"));
        assert_eq!(
            transport.resolve_endpoint(&participant),
            Some(EndpointAddress::new("vitals"))
        );
    }

    #[test]
    fn send_then_drain() {
        let transport = transport(4);
        let endpoint = EndpointAddress::new("vitals");
        transport.ensure_mailbox(&endpoint);

        transport.send(&endpoint, Task::new(None)).unwrap();
        transport.send(&endpoint, Task::new(None)).unwrap();
        assert_eq!(transport.mailboxes(), vec![(endpoint.clone(), 2)]);

        assert_eq!(transport.drain(&endpoint, 1).unwrap().len(), 1);
        assert_eq!(transport.drain(&endpoint, 10).unwrap().len(), 1);
        assert!(transport.drain(&endpoint, 10).unwrap().is_empty());
    }

    #[test]
    fn full_mailbox_fails_fast() {
        let transport = transport(1);
        let endpoint = EndpointAddress::new("vitals");
        transport.ensure_mailbox(&endpoint);

        transport.send(&endpoint, Task::new(None)).unwrap();
        let err = transport.send(&endpoint, Task::new(None)).unwrap_err();
        assert_eq!(err.reason(), "mailbox_full");
    }

    #[test]
    fn send_to_missing_mailbox() {
        let transport = transport(1);
        let err = transport
            .send(&EndpointAddress::new("ghost"), Task::new(None))
            .unwrap_err();
        assert_eq!(err.reason(), "transport");
    }

    #[test]
    fn taken_receiver_gets_tasks() {
        let transport = transport(4);
        let endpoint = EndpointAddress::new("vitals");
        let mut receiver = transport.take_receiver(&endpoint).unwrap();
        assert!(transport.take_receiver(&endpoint).is_none());
        assert!(transport.drain(&endpoint, 1).is_none());

        let task = Task::new(None);
        transport.send(&endpoint, task.clone()).unwrap();
        assert_eq!(block_on(receiver.recv()), Some(task));
    }

    #[test]
    fn closed_receiver_is_reported() {
        let transport = transport(4);
        let endpoint = EndpointAddress::new("vitals");
        drop(transport.take_receiver(&endpoint));

        let err = transport.send(&endpoint, Task::new(None)).unwrap_err();
        assert_eq!(err.reason(), "mailbox_closed");
        assert!(transport.close_mailbox(&endpoint));
        assert!(!transport.close_mailbox(&endpoint));
    }
}
