//! Pure matching functions for subscription patterns.
//!
//! The pattern side (subscriber) may use the wildcard sentinel; the published
//! side never does. Every function here is side-effect free so each dimension
//! can be tested field by field.

use parcelflow_core::{DataParcelDescriptor, DataParcelManifest, WILDCARD};

use super::types::MatchKind;

/// A pattern field accepts a published field when equal or wildcarded.
#[inline]
pub fn field_matches(pattern: Option<&str>, published: Option<&str>) -> bool {
    pattern == Some(WILDCARD) || pattern == published
}

/// All eight descriptor fields pass [`field_matches`].
pub fn descriptor_matches(pattern: &DataParcelDescriptor, published: &DataParcelDescriptor) -> bool {
    pattern
        .fields()
        .iter()
        .zip(published.fields().iter())
        .all(|(p, q)| field_matches(*p, *q))
}

/// Descriptor comparison where the pattern may leave the descriptor out.
///
/// An absent pattern descriptor places no constraint; a present one needs a
/// published descriptor to compare against.
pub fn optional_descriptor_matches(
    pattern: Option<&DataParcelDescriptor>,
    published: Option<&DataParcelDescriptor>,
) -> bool {
    match (pattern, published) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(p), Some(q)) => descriptor_matches(p, q),
    }
}

/// Source/target system comparison; an unset or wildcard pattern accepts anything.
fn system_matches(pattern: Option<&str>, published: Option<&str>) -> bool {
    match pattern {
        None => true,
        Some(p) if p == WILDCARD => true,
        Some(p) => Some(p) == published,
    }
}

/// Secondary routing dimensions other than the descriptors.
pub fn secondary_matches(pattern: &DataParcelManifest, published: &DataParcelManifest) -> bool {
    let normalisation = pattern.normalisation_status.is_any()
        || pattern.normalisation_status == published.normalisation_status;
    let validation = pattern.validation_status.is_any()
        || pattern.validation_status == published.validation_status;
    let policy = pattern.policy_approval_status.is_any()
        || pattern.policy_approval_status == published.policy_approval_status;

    normalisation
        && validation
        && policy
        && pattern.parcel_type == published.parcel_type
        && system_matches(
            pattern.source_system.as_deref(),
            published.source_system.as_deref(),
        )
        && system_matches(
            pattern.intended_target_system.as_deref(),
            published.intended_target_system.as_deref(),
        )
        && pattern.inter_subsystem_distributable == published.inter_subsystem_distributable
        && pattern.flow_direction == published.flow_direction
}

/// Content and container descriptors equal-or-wildcarded, and secondary dimensions match.
pub fn is_full_match(pattern: &DataParcelManifest, published: &DataParcelManifest) -> bool {
    optional_descriptor_matches(
        pattern.content_descriptor.as_ref(),
        published.content_descriptor.as_ref(),
    ) && optional_descriptor_matches(
        pattern.container_descriptor.as_ref(),
        published.container_descriptor.as_ref(),
    ) && secondary_matches(pattern, published)
}

/// Pattern has no distinct content descriptor and its container matches.
pub fn is_container_only_match(
    pattern: &DataParcelManifest,
    published: &DataParcelManifest,
) -> bool {
    let (Some(pattern_container), Some(published_container)) = (
        pattern.container_descriptor.as_ref(),
        published.container_descriptor.as_ref(),
    ) else {
        return false;
    };

    !pattern.has_distinct_content_descriptor()
        && descriptor_matches(pattern_container, published_container)
        && secondary_matches(pattern, published)
}

/// Classify how (if at all) a subscription pattern qualifies for a published manifest.
pub fn classify(pattern: &DataParcelManifest, published: &DataParcelManifest) -> Option<MatchKind> {
    if is_full_match(pattern, published) {
        Some(MatchKind::Full)
    } else if is_container_only_match(pattern, published) {
        Some(MatchKind::ContainerOnly)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcelflow_core::{
        DescriptorField, FlowDirection, NormalisationStatus, ParcelType, PolicyApprovalStatus,
        ValidationStatus,
    };

    fn vitals() -> DataParcelDescriptor {
        DataParcelDescriptor::new()
            .with_definer("HL7")
            .with_category("Observation")
            .with_sub_category("Vitals")
            .with_resource("Patient")
            .fill_unset("NA")
    }

    fn envelope() -> DataParcelDescriptor {
        DataParcelDescriptor::new()
            .with_definer("HL7")
            .with_category("Bundle")
            .fill_unset("NA")
    }

    #[test]
    fn field_level_rules() {
        assert!(field_matches(Some("*"), Some("Vitals")));
        assert!(field_matches(Some("*"), None));
        assert!(field_matches(Some("Vitals"), Some("Vitals")));
        assert!(field_matches(None, None));
        assert!(!field_matches(Some("Vitals"), Some("Labs")));
        assert!(!field_matches(None, Some("Vitals")));
        // a published wildcard is just a literal value
        assert!(!field_matches(Some("Vitals"), Some("*")));
    }

    #[test]
    fn each_descriptor_field_is_checked() {
        let published = vitals();
        for field in DescriptorField::ALL {
            let mut pattern = vitals();
            pattern.set(field, "something-else");
            assert!(
                !descriptor_matches(&pattern, &published),
                "field {} should be compared",
                field.as_str()
            );
            pattern.set(field, WILDCARD);
            assert!(descriptor_matches(&pattern, &published));
        }
    }

    #[test]
    fn sub_category_wildcard_matches_any_value() {
        let pattern = vitals().with_sub_category("*");
        assert!(descriptor_matches(&pattern, &vitals()));
        assert!(descriptor_matches(
            &pattern,
            &vitals().with_sub_category("Labs")
        ));
    }

    #[test]
    fn category_mismatch_excludes() {
        let pattern = vitals().with_category("Medication");
        assert!(!descriptor_matches(&pattern, &vitals()));
    }

    #[test]
    fn optional_descriptor_rules() {
        assert!(optional_descriptor_matches(None, Some(&vitals())));
        assert!(optional_descriptor_matches(None, None));
        assert!(!optional_descriptor_matches(Some(&vitals()), None));
        assert!(optional_descriptor_matches(Some(&vitals()), Some(&vitals())));
    }

    #[test]
    fn wildcardable_statuses() {
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_normalisation_status(NormalisationStatus::Normalised)
            .with_validation_status(ValidationStatus::Validated)
            .with_policy_approval_status(PolicyApprovalStatus::Positive);

        let any = DataParcelManifest::new().with_content(vitals());
        assert!(secondary_matches(&any, &published));

        let strict = any
            .clone()
            .with_normalisation_status(NormalisationStatus::NonNormalised);
        assert!(!secondary_matches(&strict, &published));

        let strict = any
            .clone()
            .with_validation_status(ValidationStatus::NonValidated);
        assert!(!secondary_matches(&strict, &published));

        let strict = any
            .clone()
            .with_policy_approval_status(PolicyApprovalStatus::Negative);
        assert!(!secondary_matches(&strict, &published));

        let exact = any
            .with_normalisation_status(NormalisationStatus::Normalised)
            .with_validation_status(ValidationStatus::Validated)
            .with_policy_approval_status(PolicyApprovalStatus::Positive);
        assert!(secondary_matches(&exact, &published));
    }

    #[test]
    fn exact_dimensions() {
        let published = DataParcelManifest::new().with_content(vitals());

        let other_type = published.clone().with_parcel_type(ParcelType::Audit);
        assert!(!secondary_matches(&other_type, &published));

        let other_direction = published
            .clone()
            .with_flow_direction(FlowDirection::InboundFromExternal);
        assert!(!secondary_matches(&other_direction, &published));

        let distributable = published.clone().with_inter_subsystem_distributable(true);
        assert!(!secondary_matches(&distributable, &published));
    }

    #[test]
    fn system_dimensions() {
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_source_system("EMR")
            .with_intended_target_system("LabSystemX");

        let unset = DataParcelManifest::new().with_content(vitals());
        assert!(secondary_matches(&unset, &published));

        let wildcard = unset
            .clone()
            .with_source_system("*")
            .with_intended_target_system("*");
        assert!(secondary_matches(&wildcard, &published));

        let wrong_source = unset.clone().with_source_system("PAS");
        assert!(!secondary_matches(&wrong_source, &published));

        let right_target = unset.with_intended_target_system("LabSystemX");
        assert!(secondary_matches(&right_target, &published));
    }

    #[test]
    fn content_pattern_full_match() {
        let pattern = DataParcelManifest::new().with_content(vitals().with_sub_category("*"));
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_container(envelope());
        assert_eq!(classify(&pattern, &published), Some(MatchKind::Full));
    }

    #[test]
    fn container_pattern_matches_any_content_in_envelope() {
        let pattern = DataParcelManifest::new().with_container(envelope());
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_container(envelope());
        assert!(is_container_only_match(&pattern, &published));
        assert!(classify(&pattern, &published).is_some());
    }

    #[test]
    fn content_equal_to_container_counts_as_container_only() {
        let pattern = DataParcelManifest::new()
            .with_content(envelope())
            .with_container(envelope());
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_container(envelope());
        assert!(!is_full_match(&pattern, &published));
        assert_eq!(classify(&pattern, &published), Some(MatchKind::ContainerOnly));
    }

    #[test]
    fn distinct_content_pattern_is_not_container_only() {
        let pattern = DataParcelManifest::new()
            .with_content(vitals().with_category("Medication"))
            .with_container(envelope());
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_container(envelope());
        assert_eq!(classify(&pattern, &published), None);
    }

    #[test]
    fn container_match_still_needs_secondary_dimensions() {
        let pattern = DataParcelManifest::new()
            .with_container(envelope())
            .with_parcel_type(ParcelType::Notification);
        let published = DataParcelManifest::new()
            .with_content(vitals())
            .with_container(envelope());
        assert_eq!(classify(&pattern, &published), None);
    }
}
