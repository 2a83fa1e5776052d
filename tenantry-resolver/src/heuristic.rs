//! Deterministic partition derivation for tenants the directory knows
//! nothing about, or whose assignment carries no partition name.

use tenantry_core::{PartitionName, PartitionSettings, TenantId};

const SEPARATORS: &[char] = &['.', '/', ':', '@'];

/// How a heuristic answer was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derivation {
    /// First label of the tenant identifier.
    Prefix(PartitionName),
    /// The identifier is the legacy tenant.
    Legacy(PartitionName),
    /// No usable identifier.
    Default(PartitionName),
}

impl Derivation {
    pub fn partition(&self) -> &PartitionName {
        match self {
            Self::Prefix(p) | Self::Legacy(p) | Self::Default(p) => p,
        }
    }

    pub fn into_partition(self) -> PartitionName {
        match self {
            Self::Prefix(p) | Self::Legacy(p) | Self::Default(p) => p,
        }
    }
}

/// First label of a public tenant identifier, lowercased.
///
/// `https://Acme.portal.io/x` and `acme:eu` both give `acme`.
pub fn first_label(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    without_scheme
        .split(SEPARATORS)
        .next()
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
}

pub fn derive(identifier: Option<&TenantId>, partitions: &PartitionSettings) -> Derivation {
    let Some(label) = identifier.and_then(|id| first_label(id.as_str())) else {
        return Derivation::Default(partitions.fallback.clone());
    };

    if label == partitions.legacy_tenant {
        return Derivation::Legacy(partitions.legacy.clone());
    }

    match PartitionName::new(label) {
        Some(partition) => Derivation::Prefix(partition),
        None => Derivation::Default(partitions.fallback.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn settings() -> PartitionSettings {
        PartitionSettings::default()
    }

    #[test]
    fn takes_the_first_label() {
        assert_eq!(first_label("acme.portal.io").as_deref(), Some("acme"));
        assert_eq!(first_label("https://Globex.example.com/login").as_deref(), Some("globex"));
        assert_eq!(first_label("initech:eu-west").as_deref(), Some("initech"));
        assert_eq!(first_label("  hooli  ").as_deref(), Some("hooli"));
        assert_eq!(first_label(".leading"), None);
        assert_eq!(first_label("   "), None);
    }

    #[test]
    fn legacy_identifier_maps_to_legacy_partition() {
        let s = settings();
        let d = derive(Some(&TenantId::new("Portal.example.com")), &s);
        assert_eq!(d, Derivation::Legacy(s.legacy.clone()));
        assert_ne!(d.partition().as_str(), "portal");
    }

    #[test]
    fn missing_identifier_maps_to_default_partition() {
        let s = settings();
        assert_eq!(derive(None, &s), Derivation::Default(s.fallback.clone()));
        assert_eq!(
            derive(Some(&TenantId::new("")), &s),
            Derivation::Default(s.fallback.clone())
        );
    }

    #[test]
    fn prefix_becomes_the_partition() {
        let d = derive(Some(&TenantId::new("acme.portal.io")), &settings());
        assert_eq!(d.partition().as_str(), "acme");
        assert!(matches!(d, Derivation::Prefix(_)));
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic_and_never_empty(id in ".{0,40}") {
            let s = settings();
            let tenant = TenantId::new(id);
            let first = derive(Some(&tenant), &s);
            let second = derive(Some(&tenant), &s);
            prop_assert!(!first.partition().as_str().trim().is_empty());
            prop_assert_eq!(first, second);
        }
    }
}
