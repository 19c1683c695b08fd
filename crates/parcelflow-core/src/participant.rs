//! Identity of subscribers and publishers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Intra-subsystem identity of a processing component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIdentity {
    /// Unique id of the component instance within this process.
    pub component_id: String,
    /// Function the component performs; the unit downstream work is tracked against.
    pub function: FunctionToken,
}

/// Inter-subsystem identity, present only for participants reached across a subsystem boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIdentity {
    pub service_name: String,
    pub endpoint_name: String,
}

/// Function performed by a work unit processor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionToken(String);

impl FunctionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for FunctionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A subscriber or publisher.
///
/// Equality is a value comparison over both identity components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub local: LocalIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteIdentity>,
}

impl Participant {
    /// A participant living in this process.
    pub fn local(component_id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            local: LocalIdentity {
                component_id: component_id.into(),
                function: FunctionToken::new(function),
            },
            remote: None,
        }
    }

    /// A participant reached across a subsystem boundary.
    pub fn remote(
        component_id: impl Into<String>,
        function: impl Into<String>,
        service_name: impl Into<String>,
        endpoint_name: impl Into<String>,
    ) -> Self {
        Self {
            local: LocalIdentity {
                component_id: component_id.into(),
                function: FunctionToken::new(function),
            },
            remote: Some(RemoteIdentity {
                service_name: service_name.into(),
                endpoint_name: endpoint_name.into(),
            }),
        }
    }

    pub fn component_id(&self) -> &str {
        &self.local.component_id
    }

    pub fn function(&self) -> &FunctionToken {
        &self.local.function
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn service_name(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.service_name.as_str())
    }

    /// Instance name used by the publisher registry.
    pub fn instance_name(&self) -> &str {
        &self.local.component_id
    }

    /// Identity comparison shared by registry de-duplication and fan-out skip logic.
    ///
    /// Intra-subsystem identities must be equal; service names are compared only
    /// when both participants carry a remote identity.
    pub fn same_identity(&self, other: &Participant) -> bool {
        if self.local != other.local {
            return false;
        }
        match (self.service_name(), other.service_name()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Reject participants with blank identity components.
    pub fn validate(&self) -> Result<()> {
        if self.local.component_id.trim().is_empty() {
            return Err(CoreError::invalid_participant("component id is empty"));
        }
        if self.local.function.is_empty() {
            return Err(CoreError::invalid_participant("function token is empty"));
        }
        if let Some(remote) = &self.remote
            && remote.service_name.trim().is_empty()
        {
            return Err(CoreError::invalid_participant(
                "remote identity has an empty service name",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remote {
            Some(remote) => write!(
                f,
                "{}({})@{}/{}",
                self.local.component_id,
                self.local.function,
                remote.service_name,
                remote.endpoint_name
            ),
            None => write!(f, "{}({})", self.local.component_id, self.local.function),
        }
    }
}
