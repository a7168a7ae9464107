//! Wire types for the Scaleway Marketplace API (`/marketplace/v2`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locality::Zone;

/// Flavour of a marketplace local image.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalImageType {
    /// Image whose root volume is a local or instance block volume.
    InstanceLocal,
    /// Image whose root volume is an SBS block volume.
    InstanceSbs,
}

impl LocalImageType {
    /// Returns the API spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstanceLocal => "instance_local",
            Self::InstanceSbs => "instance_sbs",
        }
    }
}

impl fmt::Display for LocalImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A marketplace image materialised in one zone.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LocalImage {
    /// Instance image identifier to pass to `CreateServer`.
    pub id: String,
    /// Commercial types able to boot the image.
    #[serde(default)]
    pub compatible_commercial_types: Vec<String>,
    /// CPU architecture.
    #[serde(default)]
    pub arch: String,
    /// Zone of the image.
    pub zone: Zone,
    /// Image label, for example `ubuntu_jammy`.
    #[serde(default)]
    pub label: String,
    /// Image flavour.
    #[serde(rename = "type")]
    pub image_type: LocalImageType,
}

/// Query used to resolve a marketplace label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalImageQuery {
    /// Image label.
    pub label: String,
    /// Zone to resolve in.
    pub zone: Zone,
    /// Commercial type that must be compatible.
    pub commercial_type: String,
    /// Requested flavour.
    pub image_type: LocalImageType,
}
