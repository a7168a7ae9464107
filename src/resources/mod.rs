//! Managed resources of the Instance service.
//!
//! Each resource is a unit struct implementing [`crate::provider::Resource`].
//! Callbacks re-read the remote object at the end of `create` and `update`
//! so the state always reflects what the API reports.

mod image;
mod ip;
mod ip_reverse_dns;
mod placement_group;
mod private_nic;
mod security_group;
mod security_group_rules;
mod server;
mod snapshot;
mod user_data;
mod volume;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::locality::{Zone, expand_id, parse_zoned_id_lenient};
use crate::provider::{Attribute, Meta, ProviderError, ResourceData, Validation};
use crate::scaleway::ApiError;

pub use image::ImageResource;
pub use ip::IpResource;
pub use ip_reverse_dns::IpReverseDnsResource;
pub use placement_group::PlacementGroupResource;
pub use private_nic::PrivateNicResource;
pub use security_group::SecurityGroupResource;
pub use security_group_rules::SecurityGroupRulesResource;
pub use server::ServerResource;
pub use snapshot::SnapshotResource;
pub use user_data::UserDataResource;
pub use volume::VolumeResource;

pub(crate) use image::flatten_image;
pub(crate) use ip::flatten_ip;
pub(crate) use placement_group::flatten_placement_group;
pub(crate) use private_nic::flatten_private_nic;
pub(crate) use security_group::flatten_security_group;
pub(crate) use server::flatten_server;
pub(crate) use snapshot::flatten_snapshot;
pub(crate) use volume::flatten_volume;

/// Zone and bare id of the resource held by `data`.
///
/// The zone comes from the id prefix, then from the `zone` attribute, then
/// from the provider default.
pub(crate) fn locate(meta: &Meta, data: &ResourceData) -> Result<(Zone, String), ProviderError> {
    let (zone, id) = parse_zoned_id_lenient(data.id())?;
    let zone = match zone {
        Some(zone) => zone,
        None => meta.zone_of(data)?,
    };
    Ok((zone, id))
}

/// Unwraps a lookup made by `read`: a vanished object clears the id and
/// yields `None`.
pub(crate) fn found<T>(
    result: Result<T, ApiError>,
    data: &mut ResourceData,
) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => {
            debug!(id = data.id(), "remote object gone, clearing state");
            data.clear_id();
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Treats a not-found failure of a delete call as success.
pub(crate) fn tolerate_not_found(result: Result<(), ApiError>) -> Result<(), ProviderError> {
    match result {
        Err(err) if !err.is_not_found() => Err(err.into()),
        _ => Ok(()),
    }
}

/// `name` when configured, else a generated `tf-<prefix>-<suffix>`.
pub(crate) fn name_or_generate(data: &ResourceData, prefix: &str) -> String {
    data.get_ok_str("name").map_or_else(
        || {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("tf-{prefix}-{}", suffix.get(..8).unwrap_or(&suffix))
        },
        str::to_owned,
    )
}

/// Bare id of an optional reference attribute.
pub(crate) fn reference(data: &ResourceData, path: &str) -> Option<String> {
    data.get_ok_str(path).map(|value| expand_id(value).to_owned())
}

/// Parses an enum attribute, naming the attribute on failure.
pub(crate) fn parse_enum<T>(
    data: &ResourceData,
    path: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, ProviderError> {
    data.get_ok_str(path)
        .map(|value| {
            parse(value).ok_or_else(|| {
                ProviderError::validation(path, format!("unsupported value '{value}'"))
            })
        })
        .transpose()
}

/// Writes the locality attributes shared by every zoned resource.
pub(crate) fn set_locality(data: &mut ResourceData, zone: Zone, project: &str) {
    data.set("zone", zone.to_string());
    data.set("project_id", project);
}

/// `tags` as an optional update field: `Some` only when changed.
pub(crate) fn changed_tags(data: &ResourceData) -> Option<Vec<String>> {
    data.has_change("tags")
        .then(|| data.get_string_list("tags"))
}

/// `name` as an optional update field.
pub(crate) fn changed_name(data: &ResourceData) -> Option<String> {
    data.has_change("name").then(|| data.get_string("name"))
}

/// Attributes shared by every zoned resource.
pub(crate) fn locality_attributes() -> [Attribute; 2] {
    [
        Attribute::string("zone")
            .computed()
            .force_new()
            .validate(Validation::Zone)
            .describe("Zone of the resource"),
        Attribute::string("project_id")
            .computed()
            .force_new()
            .describe("Project owning the resource"),
    ]
}

/// A JSON array of strings.
pub(crate) fn string_array<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Array(items.into_iter().map(|item| Value::String(item.into())).collect())
}
