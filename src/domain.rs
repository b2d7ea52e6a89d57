use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DlsError;

/// UUID of a SmartEM acquisition, normalized to lowercase hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcquisitionId(String);

impl AcquisitionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AcquisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AcquisitionId {
    type Err = DlsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = Uuid::parse_str(value.trim())
            .map_err(|_| DlsError::InvalidAcquisitionId(value.to_string()))?;
        Ok(Self(parsed.hyphenated().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitId(u64);

impl VisitId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VisitId {
    type Err = DlsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| DlsError::InvalidVisitId(value.to_string()))
    }
}

/// Keys stored against a project in the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectKey {
    AcquisitionId,
    MetadataJson,
    DataLocation,
}

impl ProjectKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectKey::AcquisitionId => "acquisition_id",
            ProjectKey::MetadataJson => "metadata_json",
            ProjectKey::DataLocation => "data_location",
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_id_is_normalized() {
        let id: AcquisitionId = " A1B2C3D4-E5F6-7890-ABCD-EF1234567890 ".parse().unwrap();
        assert_eq!(id.as_str(), "a1b2c3d4-e5f6-7890-abcd-ef1234567890");
    }

    #[test]
    fn acquisition_id_rejects_garbage() {
        assert!("a1b2c3d4".parse::<AcquisitionId>().is_err());
    }

    #[test]
    fn visit_id_requires_integer() {
        assert_eq!("12345".parse::<VisitId>().unwrap().get(), 12345);
        assert!("visit-1".parse::<VisitId>().is_err());
    }
}
