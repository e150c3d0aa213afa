use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub const DATE_COLUMN: &str = "OCCUPANCY_DATE";
pub const ID_COLUMN: &str = "_id";
pub const DEFAULT_FINGERPRINT_COLUMN: &str = "FINGERPRINT";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PackageId {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        if !is_ckan_name(&normalized) {
            return Err(LedgerError::InvalidPackageId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        if !is_ckan_name(&normalized) {
            return Err(LedgerError::InvalidResourceId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for ResourceId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

/// CKAN names and ids are url-safe slugs; uuids fit the same alphabet.
fn is_ckan_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// One entry of `package_show`'s `result.resources`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub datastore_active: bool,
}

impl Resource {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnparsedDatePolicy {
    /// Append the row with the date left as published.
    #[default]
    Keep,
    /// Count the row but never append it.
    Reject,
}

impl fmt::Display for UnparsedDatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnparsedDatePolicy::Keep => write!(f, "keep"),
            UnparsedDatePolicy::Reject => write!(f, "reject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a value read back from the ledger's first column.
    pub fn from_ledger(value: &str) -> Self {
        Self(value.to_string())
    }

    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_package_id_valid() {
        let id: PackageId = " daily-shelter-overnight-service-occupancy-capacity "
            .parse()
            .unwrap();
        assert_eq!(
            id.as_str(),
            "daily-shelter-overnight-service-occupancy-capacity"
        );
    }

    #[test]
    fn parse_package_id_invalid() {
        let err = "shelter data?".parse::<PackageId>().unwrap_err();
        assert_matches!(err, LedgerError::InvalidPackageId(_));
        let err = "".parse::<PackageId>().unwrap_err();
        assert_matches!(err, LedgerError::InvalidPackageId(_));
    }

    #[test]
    fn parse_resource_id_rejects_path_segments() {
        let err = "../../etc".parse::<ResourceId>().unwrap_err();
        assert_matches!(err, LedgerError::InvalidResourceId(_));
    }

    #[test]
    fn resource_defaults_to_inactive() {
        let resource: Resource =
            serde_json::from_str(r#"{"id": "42d5a2d2-0c3f-4c2e-8bd4-1d2b3c4d5e6f"}"#).unwrap();
        assert!(!resource.datastore_active);
        assert_eq!(resource.label(), "42d5a2d2-0c3f-4c2e-8bd4-1d2b3c4d5e6f");
    }
}
