use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProvisionError;

/// Name of the side-car file recording what is deployed in a directory.
pub const STATUS_FILE: &str = "deploy-status.toml";

/// Deployment record persisted next to a deployed tree.
///
/// The fingerprint is stored as a hex string so the file stays
/// human-readable and round-trips the full 64-bit range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatus {
    pub version: String,
    #[serde(with = "hex_fingerprint")]
    pub fingerprint: u64,
}

impl DeployStatus {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(STATUS_FILE)
    }

    /// Load the status for a deployment directory. A missing or unreadable
    /// file means "no prior deployment" and is never an error.
    pub fn load(dir: &Path) -> Self {
        let path = Self::path(dir);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        toml::from_str(&content).unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "Unreadable deployment status, treating as absent");
            Self::default()
        })
    }

    pub fn save(&self, dir: &Path) -> Result<(), ProvisionError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(Self::path(dir), content)?;
        Ok(())
    }
}

mod hex_fingerprint {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:016x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(&s, 16).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrips_through_disk() {
        let dir = tempdir().unwrap();
        let status = DeployStatus {
            version: "3.0.2".into(),
            fingerprint: u64::MAX - 7,
        };
        status.save(dir.path()).unwrap();
        assert_eq!(DeployStatus::load(dir.path()), status);
    }

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempdir().unwrap();
        assert_eq!(DeployStatus::load(dir.path()), DeployStatus::default());
    }

    #[test]
    fn corrupt_file_loads_as_default() {
        let dir = tempdir().unwrap();
        fs::write(DeployStatus::path(dir.path()), "not really { toml").unwrap();
        assert_eq!(DeployStatus::load(dir.path()), DeployStatus::default());
    }

    #[test]
    fn fingerprint_is_stored_as_hex() {
        let dir = tempdir().unwrap();
        DeployStatus {
            version: "1".into(),
            fingerprint: 0xdead_beef,
        }
        .save(dir.path())
        .unwrap();
        let content = fs::read_to_string(DeployStatus::path(dir.path())).unwrap();
        assert!(content.contains("00000000deadbeef"));
    }
}
