//! Identity directory.
//!
//! The daemon does not own residents; it only asks whether an identity may be
//! enrolled and how to present a match at the gate. A TOML roster provides the
//! answers:
//!
//! ```toml
//! [[resident]]
//! id = 42
//! name = "Ada Moreau"
//! unit = "4B"
//! role = "resident"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use vigil_core::IdentityId;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid roster: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("resident {0} is listed more than once")]
    Duplicate(IdentityId),
}

/// Lookup seam injected into the enrollment and recognition workflows.
pub trait IdentityDirectory: Send + Sync {
    fn contains(&self, identity: &IdentityId) -> bool;

    /// Display metadata (name, unit, role) for a matched identity.
    fn resident(&self, identity: &IdentityId) -> Option<Resident>;
}

/// Accepts every identity. Used when no roster is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenDirectory;

impl IdentityDirectory for OpenDirectory {
    fn contains(&self, _identity: &IdentityId) -> bool {
        true
    }

    fn resident(&self, _identity: &IdentityId) -> Option<Resident> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    Resident,
    Security,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resident {
    #[serde(deserialize_with = "deserialize_identity")]
    pub id: IdentityId,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
struct Roster {
    #[serde(default)]
    resident: Vec<Resident>,
}

/// Roster-backed directory, immutable once loaded.
#[derive(Debug, Default)]
pub struct ResidentDirectory {
    residents: HashMap<IdentityId, Resident>,
}

impl ResidentDirectory {
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let src = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let dir = Self::from_toml(&src)?;
        tracing::info!(path = %path.display(), residents = dir.len(), "resident directory loaded");
        Ok(dir)
    }

    pub fn from_toml(src: &str) -> Result<Self, DirectoryError> {
        let roster: Roster = toml::from_str(src)?;
        let mut residents = HashMap::with_capacity(roster.resident.len());
        for resident in roster.resident {
            if residents.contains_key(&resident.id) {
                return Err(DirectoryError::Duplicate(resident.id));
            }
            residents.insert(resident.id.clone(), resident);
        }
        Ok(Self { residents })
    }

    fn len(&self) -> usize {
        self.residents.len()
    }
}

impl IdentityDirectory for ResidentDirectory {
    fn contains(&self, identity: &IdentityId) -> bool {
        self.residents.contains_key(identity)
    }

    fn resident(&self, identity: &IdentityId) -> Option<Resident> {
        self.residents.get(identity).cloned()
    }
}

/// Identity ids may be written as integers or strings.
pub(crate) fn deserialize_identity<'de, D>(deserializer: D) -> Result<IdentityId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(u64),
        Str(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(n) => Ok(IdentityId::from(n)),
        RawId::Str(s) if s.trim().is_empty() => {
            Err(serde::de::Error::custom("identity id must not be empty"))
        }
        RawId::Str(s) => Ok(IdentityId::from(s)),
    }
}
