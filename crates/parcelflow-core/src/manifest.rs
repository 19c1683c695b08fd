//! Data parcel classification carried by every task.
//!
//! A [`DataParcelDescriptor`] is a fixed, ordered tuple of eight classification
//! fields. Subscribers may put the [`WILDCARD`] sentinel in any field of their
//! pattern; publishers never do. A [`DataParcelManifest`] pairs a content and a
//! container descriptor with the secondary dimensions used for routing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Wildcard sentinel accepted in subscriber-side pattern fields.
pub const WILDCARD: &str = "*";

/// The eight ordered descriptor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorField {
    Definer,
    Category,
    SubCategory,
    Resource,
    Segment,
    Attribute,
    DiscriminatorType,
    DiscriminatorValue,
}

impl DescriptorField {
    pub const ALL: [DescriptorField; 8] = [
        DescriptorField::Definer,
        DescriptorField::Category,
        DescriptorField::SubCategory,
        DescriptorField::Resource,
        DescriptorField::Segment,
        DescriptorField::Attribute,
        DescriptorField::DiscriminatorType,
        DescriptorField::DiscriminatorValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorField::Definer => "definer",
            DescriptorField::Category => "category",
            DescriptorField::SubCategory => "subCategory",
            DescriptorField::Resource => "resource",
            DescriptorField::Segment => "segment",
            DescriptorField::Attribute => "attribute",
            DescriptorField::DiscriminatorType => "discriminatorType",
            DescriptorField::DiscriminatorValue => "discriminatorValue",
        }
    }
}

/// Hierarchical classification of a data parcel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataParcelDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator_value: Option<String>,
}

impl DataParcelDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: DescriptorField) -> Option<&str> {
        match field {
            DescriptorField::Definer => self.definer.as_deref(),
            DescriptorField::Category => self.category.as_deref(),
            DescriptorField::SubCategory => self.sub_category.as_deref(),
            DescriptorField::Resource => self.resource.as_deref(),
            DescriptorField::Segment => self.segment.as_deref(),
            DescriptorField::Attribute => self.attribute.as_deref(),
            DescriptorField::DiscriminatorType => self.discriminator_type.as_deref(),
            DescriptorField::DiscriminatorValue => self.discriminator_value.as_deref(),
        }
    }

    pub fn set(&mut self, field: DescriptorField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            DescriptorField::Definer => self.definer = value,
            DescriptorField::Category => self.category = value,
            DescriptorField::SubCategory => self.sub_category = value,
            DescriptorField::Resource => self.resource = value,
            DescriptorField::Segment => self.segment = value,
            DescriptorField::Attribute => self.attribute = value,
            DescriptorField::DiscriminatorType => self.discriminator_type = value,
            DescriptorField::DiscriminatorValue => self.discriminator_value = value,
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, field: DescriptorField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn with_definer(self, value: impl Into<String>) -> Self {
        self.with(DescriptorField::Definer, value)
    }

    pub fn with_category(self, value: impl Into<String>) -> Self {
        self.with(DescriptorField::Category, value)
    }

    pub fn with_sub_category(self, value: impl Into<String>) -> Self {
        self.with(DescriptorField::SubCategory, value)
    }

    pub fn with_resource(self, value: impl Into<String>) -> Self {
        self.with(DescriptorField::Resource, value)
    }

    /// Field values in declaration order.
    pub fn fields(&self) -> [Option<&str>; 8] {
        DescriptorField::ALL.map(|field| self.get(field))
    }

    /// Fill every unset field with `value`.
    pub fn fill_unset(mut self, value: &str) -> Self {
        for field in DescriptorField::ALL {
            if self.get(field).is_none() {
                self.set(field, value);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(Option::is_none)
    }

    /// Dotted token of the set fields, used when minting lineage ids.
    pub fn to_token(&self) -> String {
        self.fields()
            .iter()
            .map(|f| f.unwrap_or("-"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for DataParcelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

/// Whether the parcel content has been normalised to the platform's canonical form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalisationStatus {
    Normalised,
    NonNormalised,
    #[default]
    Any,
}

/// Whether the parcel content passed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    Validated,
    NonValidated,
    #[default]
    Any,
}

/// Outcome of the policy enforcement point for this parcel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyApprovalStatus {
    Positive,
    Negative,
    Pending,
    #[default]
    Any,
}

/// Kind of parcel being carried. Matched exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParcelType {
    #[default]
    General,
    Acknowledgement,
    Notification,
    Audit,
}

/// Direction of information flow relative to the processing component. Matched exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowDirection {
    InboundFromExternal,
    OutboundToExternal,
    WorkflowInput,
    #[default]
    WorkflowOutput,
}

macro_rules! impl_wildcard_status {
    ($($ty:ty),*) => {
        $(
            impl $ty {
                /// True for the subscriber-side "any" value.
                pub fn is_any(&self) -> bool {
                    matches!(self, Self::Any)
                }
            }
        )*
    };
}

impl_wildcard_status!(NormalisationStatus, ValidationStatus, PolicyApprovalStatus);

/// Routing header of a task: what the payload is, what holds it, and how it may travel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataParcelManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_descriptor: Option<DataParcelDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_descriptor: Option<DataParcelDescriptor>,
    #[serde(default)]
    pub normalisation_status: NormalisationStatus,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub parcel_type: ParcelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_target_system: Option<String>,
    #[serde(default)]
    pub policy_approval_status: PolicyApprovalStatus,
    #[serde(default)]
    pub inter_subsystem_distributable: bool,
    #[serde(default)]
    pub flow_direction: FlowDirection,
}

impl DataParcelManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, descriptor: DataParcelDescriptor) -> Self {
        self.content_descriptor = Some(descriptor);
        self
    }

    pub fn with_container(mut self, descriptor: DataParcelDescriptor) -> Self {
        self.container_descriptor = Some(descriptor);
        self
    }

    pub fn with_normalisation_status(mut self, status: NormalisationStatus) -> Self {
        self.normalisation_status = status;
        self
    }

    pub fn with_validation_status(mut self, status: ValidationStatus) -> Self {
        self.validation_status = status;
        self
    }

    pub fn with_parcel_type(mut self, parcel_type: ParcelType) -> Self {
        self.parcel_type = parcel_type;
        self
    }

    pub fn with_source_system(mut self, system: impl Into<String>) -> Self {
        self.source_system = Some(system.into());
        self
    }

    pub fn with_intended_target_system(mut self, system: impl Into<String>) -> Self {
        self.intended_target_system = Some(system.into());
        self
    }

    pub fn with_policy_approval_status(mut self, status: PolicyApprovalStatus) -> Self {
        self.policy_approval_status = status;
        self
    }

    pub fn with_inter_subsystem_distributable(mut self, distributable: bool) -> Self {
        self.inter_subsystem_distributable = distributable;
        self
    }

    pub fn with_flow_direction(mut self, direction: FlowDirection) -> Self {
        self.flow_direction = direction;
        self
    }

    pub fn has_descriptor(&self) -> bool {
        self.content_descriptor.is_some() || self.container_descriptor.is_some()
    }

    /// Descriptor a subscription for this manifest is filed under:
    /// content if present, otherwise container.
    pub fn registration_key(&self) -> Option<&DataParcelDescriptor> {
        self.content_descriptor
            .as_ref()
            .or(self.container_descriptor.as_ref())
    }

    /// True when the content descriptor is present and differs from the container descriptor.
    pub fn has_distinct_content_descriptor(&self) -> bool {
        match (&self.content_descriptor, &self.container_descriptor) {
            (None, _) => false,
            (Some(content), Some(container)) => content != container,
            (Some(_), None) => true,
        }
    }

    /// Intended target system, treating blank and wildcard values as absent.
    pub fn explicit_target_system(&self) -> Option<&str> {
        self.intended_target_system
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != WILDCARD)
    }

    /// Ensure the manifest can be used for matching.
    pub fn validate(&self) -> Result<()> {
        if !self.has_descriptor() {
            return Err(CoreError::invalid_manifest(
                "manifest has neither a content nor a container descriptor",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> DataParcelDescriptor {
        DataParcelDescriptor::new()
            .with_definer("HL7")
            .with_category("Observation")
            .with_sub_category("Vitals")
            .with_resource("Patient")
    }

    #[test]
    fn fields_follow_declaration_order() {
        let descriptor = observation();
        let fields = descriptor.fields();
        assert_eq!(fields[0], Some("HL7"));
        assert_eq!(fields[2], Some("Vitals"));
        assert_eq!(fields[4], None);
    }

    #[test]
    fn fill_unset_keeps_existing_fields() {
        let filled = observation().fill_unset("NA");
        assert_eq!(filled.definer.as_deref(), Some("HL7"));
        assert_eq!(filled.segment.as_deref(), Some("NA"));
        assert_eq!(filled.discriminator_value.as_deref(), Some("NA"));
    }

    #[test]
    fn registration_key_prefers_content() {
        let container = DataParcelDescriptor::new().with_definer("Envelope");
        let manifest = DataParcelManifest::new()
            .with_content(observation())
            .with_container(container.clone());
        assert_eq!(manifest.registration_key(), Some(&observation()));

        let container_only = DataParcelManifest::new().with_container(container.clone());
        assert_eq!(container_only.registration_key(), Some(&container));
    }

    #[test]
    fn distinct_content_descriptor() {
        let same = DataParcelManifest::new()
            .with_content(observation())
            .with_container(observation());
        assert!(!same.has_distinct_content_descriptor());

        let container_only = DataParcelManifest::new().with_container(observation());
        assert!(!container_only.has_distinct_content_descriptor());

        let content_only = DataParcelManifest::new().with_content(observation());
        assert!(content_only.has_distinct_content_descriptor());
    }

    #[test]
    fn manifest_without_descriptor_is_invalid() {
        let err = DataParcelManifest::new().validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidManifest(_)));
        assert!(
            DataParcelManifest::new()
                .with_content(observation())
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn explicit_target_ignores_blank_and_wildcard() {
        let manifest = DataParcelManifest::new().with_intended_target_system("*");
        assert_eq!(manifest.explicit_target_system(), None);
        let manifest = DataParcelManifest::new().with_intended_target_system("  ");
        assert_eq!(manifest.explicit_target_system(), None);
        let manifest = DataParcelManifest::new().with_intended_target_system("LabSystemX");
        assert_eq!(manifest.explicit_target_system(), Some("LabSystemX"));
    }

    #[test]
    fn manifest_json_uses_camel_case() {
        let manifest = DataParcelManifest::new()
            .with_content(observation())
            .with_intended_target_system("LabSystemX");
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["contentDescriptor"]["subCategory"], "Vitals");
        assert_eq!(json["intendedTargetSystem"], "LabSystemX");
        assert_eq!(json["flowDirection"], "workflow-output");
    }

    #[test]
    fn descriptor_token() {
        let token = DataParcelDescriptor::new().with_definer("HL7").to_token();
        assert_eq!(token, "HL7.-.-.-.-.-.-.-");
    }
}
