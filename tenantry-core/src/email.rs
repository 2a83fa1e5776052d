use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TenantryError;

/// A login email, trimmed and lowercased.
///
/// Every cache key and directory lookup is keyed by this form, so raw
/// strings never reach a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedEmail(String);

impl NormalizedEmail {
    pub fn parse(raw: &str) -> Result<Self, TenantryError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(TenantryError::not_authenticated("missing user email"));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(TenantryError::bad_request(format!(
                "user email '{normalized}' contains whitespace"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NormalizedEmail {
    type Error = TenantryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NormalizedEmail> for String {
    fn from(value: NormalizedEmail) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_trims() {
        let email = NormalizedEmail::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn rejects_blank_and_inner_whitespace() {
        assert!(NormalizedEmail::parse("   ").is_err());
        assert!(NormalizedEmail::parse("al ice@example.com").is_err());
    }

    proptest! {
        #[test]
        fn case_variants_share_one_key(local in "[a-zA-Z0-9._]{1,16}", domain in "[a-zA-Z]{1,12}") {
            let raw = format!("{local}@{domain}.com");
            let upper = NormalizedEmail::parse(&raw.to_uppercase()).unwrap();
            let lower = NormalizedEmail::parse(&raw.to_lowercase()).unwrap();
            prop_assert_eq!(upper, lower);
        }
    }
}
