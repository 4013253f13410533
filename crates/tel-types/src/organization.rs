use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of one organization's ledger.
///
/// Also used as a directory name by file-backed stores, so it is limited
/// to 1-64 characters of `[a-z0-9_-]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationId(String);

impl OrganizationId {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= 64
            && value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if valid {
            Ok(Self(value))
        } else {
            Err(TypeError::InvalidOrganizationId(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrganizationId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OrganizationId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrganizationId> for String {
    fn from(id: OrganizationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_slug() {
        assert_eq!(OrganizationId::new("acme-corp_1").unwrap().as_str(), "acme-corp_1");
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(OrganizationId::new("../etc").is_err());
        assert!(OrganizationId::new("").is_err());
        assert!(OrganizationId::new("Acme").is_err());
        assert!(OrganizationId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<OrganizationId>("\"ok\"").is_ok());
        assert!(serde_json::from_str::<OrganizationId>("\"not ok\"").is_err());
    }
}
