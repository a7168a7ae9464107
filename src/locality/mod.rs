//! Localized identifiers for Scaleway resources.
//!
//! Every zonal resource is addressed as `<zone>/<uuid>`; nested resources
//! (private NICs, user-data keys) as `<zone>/<outer>/<inner>`. Regional
//! resources such as private networks use `<region>/<uuid>`. Every
//! downstream call re-derives the zone from the identifier, so the prefix
//! is never dropped once assigned.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when parsing or validating localized identifiers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LocalityError {
    /// The zone segment is not one of the supported availability zones.
    #[error("unknown zone '{0}'")]
    UnknownZone(String),
    /// The region segment is not one of the supported regions.
    #[error("unknown region '{0}'")]
    UnknownRegion(String),
    /// The identifier does not have the expected number of segments.
    #[error("cannot parse localized id '{value}': expected {expected}")]
    Malformed {
        /// Raw input.
        value: String,
        /// Human readable description of the expected form.
        expected: String,
    },
    /// The id segment is not a UUID.
    #[error("'{0}' is not a valid UUID")]
    InvalidUuid(String),
}

macro_rules! locality_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $error:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                $variant,
            )+
        }

        impl $name {
            /// Every supported value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the canonical API spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LocalityError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(LocalityError::$error(other.to_owned())),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

locality_enum! {
    /// Scaleway availability zone.
    Zone, UnknownZone {
        FrPar1 => "fr-par-1",
        FrPar2 => "fr-par-2",
        FrPar3 => "fr-par-3",
        NlAms1 => "nl-ams-1",
        NlAms2 => "nl-ams-2",
        NlAms3 => "nl-ams-3",
        PlWaw1 => "pl-waw-1",
        PlWaw2 => "pl-waw-2",
        PlWaw3 => "pl-waw-3",
    }
}

locality_enum! {
    /// Scaleway region enclosing one or more zones.
    Region, UnknownRegion {
        FrPar => "fr-par",
        NlAms => "nl-ams",
        PlWaw => "pl-waw",
    }
}

impl Zone {
    /// Region that contains this zone: everything before the final `-N`.
    #[must_use]
    pub const fn region(self) -> Region {
        match self {
            Self::FrPar1 | Self::FrPar2 | Self::FrPar3 => Region::FrPar,
            Self::NlAms1 | Self::NlAms2 | Self::NlAms3 => Region::NlAms,
            Self::PlWaw1 | Self::PlWaw2 | Self::PlWaw3 => Region::PlWaw,
        }
    }
}

impl Region {
    /// Zones belonging to this region.
    #[must_use]
    pub fn zones(self) -> Vec<Zone> {
        Zone::ALL
            .iter()
            .copied()
            .filter(|zone| zone.region() == self)
            .collect()
    }
}

/// Strips the trailing `-N` from a zone string. Returns `None` when the
/// input does not end with a numeric suffix.
#[must_use]
pub fn region_name_of(zone: &str) -> Option<&str> {
    let (prefix, suffix) = zone.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(prefix)
}

/// A `(zone, id)` pair rendered as `zone/id`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ZonedId {
    /// Zone hosting the resource.
    pub zone: Zone,
    /// Resource UUID.
    pub id: String,
}

impl ZonedId {
    /// Builds a localized id from its parts.
    #[must_use]
    pub fn new(zone: Zone, id: impl Into<String>) -> Self {
        Self {
            zone,
            id: id.into(),
        }
    }
}

impl fmt::Display for ZonedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.id)
    }
}

impl FromStr for ZonedId {
    type Err = LocalityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (zone, id) = parse_zoned_id(value)?;
        Ok(Self { zone, id })
    }
}

/// A `(zone, outer, inner)` triple rendered as `zone/outer/inner`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NestedZonedId {
    /// Zone hosting the resource.
    pub zone: Zone,
    /// Parent identifier (for example the server id).
    pub outer: String,
    /// Child identifier (for example the private NIC id or user-data key).
    pub inner: String,
}

impl NestedZonedId {
    /// Builds a nested id from its parts.
    #[must_use]
    pub fn new(zone: Zone, outer: impl Into<String>, inner: impl Into<String>) -> Self {
        Self {
            zone,
            outer: outer.into(),
            inner: inner.into(),
        }
    }
}

impl fmt::Display for NestedZonedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zone, self.outer, self.inner)
    }
}

impl FromStr for NestedZonedId {
    type Err = LocalityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_nested_zoned_id(value)
    }
}

/// Formats `zone/id`.
#[must_use]
pub fn new_zoned_id(zone: Zone, id: &str) -> String {
    format!("{zone}/{id}")
}

/// Formats `zone/outer/inner`.
#[must_use]
pub fn new_nested_zoned_id(zone: Zone, outer: &str, inner: &str) -> String {
    format!("{zone}/{outer}/{inner}")
}

/// Formats `region/id`.
#[must_use]
pub fn new_regional_id(region: Region, id: &str) -> String {
    format!("{region}/{id}")
}

/// Parses a strict `zone/uuid` identifier.
///
/// # Errors
///
/// Returns [`LocalityError`] when the input lacks a zone prefix, names an
/// unknown zone, or carries a non-UUID id.
pub fn parse_zoned_id(value: &str) -> Result<(Zone, String), LocalityError> {
    let mut parts = value.split('/');
    let (Some(zone_name), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(LocalityError::Malformed {
            value: value.to_owned(),
            expected: String::from("<zone>/<id>"),
        });
    };
    let zone = zone_name.parse::<Zone>()?;
    validate_uuid(id)?;
    Ok((zone, id.to_owned()))
}

/// Parses `zone/id` but tolerates un-prefixed input, returning `None` for
/// the zone in that case. Used for user-supplied references.
///
/// # Errors
///
/// Returns [`LocalityError::UnknownZone`] when a prefix is present but
/// does not name a supported zone.
pub fn parse_zoned_id_lenient(value: &str) -> Result<(Option<Zone>, String), LocalityError> {
    match value.split_once('/') {
        None => Ok((None, value.to_owned())),
        Some((zone, id)) => Ok((Some(zone.parse()?), id.to_owned())),
    }
}

/// Parses a strict `zone/outer/inner` identifier. The inner segment is not
/// required to be a UUID (user-data keys are free-form).
///
/// # Errors
///
/// Returns [`LocalityError`] when the segment count, zone, or outer UUID is
/// invalid.
pub fn parse_nested_zoned_id(value: &str) -> Result<NestedZonedId, LocalityError> {
    let mut parts = value.splitn(3, '/');
    let (Some(zone_name), Some(outer), Some(inner)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(LocalityError::Malformed {
            value: value.to_owned(),
            expected: String::from("<zone>/<outer-id>/<inner-id>"),
        });
    };
    if inner.is_empty() {
        return Err(LocalityError::Malformed {
            value: value.to_owned(),
            expected: String::from("<zone>/<outer-id>/<inner-id>"),
        });
    }
    let zone = zone_name.parse::<Zone>()?;
    validate_uuid(outer)?;
    Ok(NestedZonedId::new(zone, outer, inner))
}

/// Parses `region/id`, tolerating bare ids.
///
/// # Errors
///
/// Returns [`LocalityError::UnknownRegion`] when the prefix is not a known
/// region.
pub fn parse_regional_id_lenient(value: &str) -> Result<(Option<Region>, String), LocalityError> {
    match value.split_once('/') {
        None => Ok((None, value.to_owned())),
        Some((region, id)) => Ok((Some(region.parse()?), id.to_owned())),
    }
}

/// Returns the final segment of a localized id, accepting bare ids as-is.
#[must_use]
pub fn expand_id(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// Returns `Some(id)` for a non-empty input, expanded to its id segment.
#[must_use]
pub fn expand_optional_id(value: Option<&str>) -> Option<String> {
    value
        .filter(|raw| !raw.is_empty())
        .map(|raw| expand_id(raw).to_owned())
}

/// Validates a bare UUID.
///
/// # Errors
///
/// Returns [`LocalityError::InvalidUuid`] when parsing fails.
pub fn validate_uuid(value: &str) -> Result<(), LocalityError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| LocalityError::InvalidUuid(value.to_owned()))
}

/// Validates either a bare UUID or a `zone/uuid` identifier.
///
/// # Errors
///
/// Returns [`LocalityError`] when the zone or UUID is invalid.
pub fn validate_zoned_uuid(value: &str) -> Result<(), LocalityError> {
    let (_, id) = parse_zoned_id_lenient(value)?;
    validate_uuid(&id)
}

/// Validates either a bare UUID or a `region/uuid` identifier.
///
/// # Errors
///
/// Returns [`LocalityError`] when the region or UUID is invalid.
pub fn validate_regional_uuid(value: &str) -> Result<(), LocalityError> {
    let (_, id) = parse_regional_id_lenient(value)?;
    validate_uuid(&id)
}

/// Returns `true` when the input (optionally zone-prefixed) is a UUID.
#[must_use]
pub fn is_uuid(value: &str) -> bool {
    Uuid::parse_str(expand_id(value)).is_ok()
}

#[cfg(test)]
mod tests;
