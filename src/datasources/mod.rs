//! Read-only lookups of Instance objects.
//!
//! Each data source finds one object by its `*_id` attribute or by exact
//! `name`, then fills the state with the flattening of the matching
//! resource. Their schemas are derived from the resource schemas with
//! every attribute turned computed, except the lookup keys.

mod network;
mod server;
mod storage;

use std::future::Future;

use crate::locality::{Zone, new_zoned_id, parse_zoned_id_lenient};
use crate::provider::{Attribute, Meta, ProviderError, Resource, ResourceData, Schema, Validation};
use crate::scaleway::ListFilter;

pub use network::{
    IpDataSource, PlacementGroupDataSource, PrivateNicDataSource, SecurityGroupDataSource,
};
pub use server::{ServerDataSource, ServerTypeDataSource, ServersDataSource};
pub use storage::{ImageDataSource, SnapshotDataSource, VolumeDataSource};

/// Copy of `attribute` that only the provider fills.
fn read_only(attribute: Attribute) -> Attribute {
    Attribute {
        required: false,
        optional: false,
        computed: true,
        force_new: false,
        default: None,
        conflicts_with: &[],
        deprecated: None,
        validation: None,
        max_items: None,
        ..attribute
    }
}

/// Schema of a lookup: `lookups` as given, every other attribute of the
/// resource read-only.
pub(crate) fn lookup_schema(resource: &dyn Resource, lookups: Vec<Attribute>) -> Schema {
    let mut attributes: Vec<Attribute> = resource
        .schema()
        .attributes
        .into_iter()
        .filter(|attribute| !lookups.iter().any(|lookup| lookup.name == attribute.name))
        .map(read_only)
        .collect();
    attributes.extend(lookups);
    Schema::new(attributes)
}

/// Lookup keys shared by zoned data sources: `<id_attribute>`, `name`,
/// `zone` and `project_id`.
pub(crate) fn zoned_lookups(id_attribute: &'static str) -> Vec<Attribute> {
    vec![
        Attribute::string(id_attribute)
            .computed()
            .validate(Validation::ZonedUuid)
            .conflicts_with(&["name"]),
        Attribute::string("name").computed(),
        Attribute::string("zone")
            .computed()
            .validate(Validation::Zone),
        Attribute::string("project_id").computed(),
    ]
}

/// How the configuration identifies the object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Lookup {
    /// Bare identifier.
    Id(String),
    /// Exact name within the project.
    Name(String),
}

/// Zone and lookup key of a data source configuration.
///
/// The zone comes from the id prefix, then from the `zone` attribute, then
/// from the provider default.
pub(crate) fn lookup_of(
    meta: &Meta,
    data: &ResourceData,
    id_attribute: &str,
) -> Result<(Zone, Lookup), ProviderError> {
    if let Some(raw) = data.get_ok_str(id_attribute) {
        let (zone, id) = parse_zoned_id_lenient(raw)?;
        let zone = match zone {
            Some(zone) => zone,
            None => meta.zone_of(data)?,
        };
        return Ok((zone, Lookup::Id(id)));
    }
    let zone = meta.zone_of(data)?;
    match data.get_ok_str("name") {
        Some(name) => Ok((zone, Lookup::Name(name.to_owned()))),
        None => Err(ProviderError::validation(
            id_attribute,
            format!("one of {id_attribute} or name must be set"),
        )),
    }
}

/// The single candidate named exactly `name`.
///
/// The API filters on substrings, so candidates are narrowed to exact
/// matches first.
pub(crate) fn exactly_named<T>(
    kind: &str,
    name: &str,
    candidates: Vec<T>,
    name_of: fn(&T) -> &str,
) -> Result<T, ProviderError> {
    let mut matching: Vec<T> = candidates
        .into_iter()
        .filter(|candidate| name_of(candidate) == name)
        .collect();
    match (matching.pop(), matching.len()) {
        (Some(found), 0) => Ok(found),
        (Some(_), others) => Err(ProviderError::validation(
            "name",
            format!("{} {kind}s found with name '{name}'", others.saturating_add(1)),
        )),
        (None, _) => Err(ProviderError::validation(
            "name",
            format!("no {kind} found with name '{name}'"),
        )),
    }
}

/// Resolves a lookup: fetches by id, or lists by name within `project`
/// and keeps the exact match.
pub(crate) async fn resolve<T, G, L, GetError, ListError>(
    kind: &str,
    lookup: Lookup,
    project: Option<String>,
    get: impl FnOnce(String) -> G,
    list: impl FnOnce(ListFilter) -> L,
    name_of: fn(&T) -> &str,
) -> Result<T, ProviderError>
where
    G: Future<Output = Result<T, GetError>>,
    L: Future<Output = Result<Vec<T>, ListError>>,
    ProviderError: From<GetError> + From<ListError>,
{
    match lookup {
        Lookup::Id(id) => Ok(get(id).await?),
        Lookup::Name(name) => {
            let filter = ListFilter {
                name: Some(name.clone()),
                project,
                tags: Vec::new(),
            };
            let candidates = list(filter).await?;
            exactly_named(kind, &name, candidates, name_of)
        }
    }
}

/// Project named by the configuration, if any.
pub(crate) fn project_filter(data: &ResourceData) -> Option<String> {
    data.get_ok_str("project_id").map(str::to_owned)
}

/// Sets the state id and the `<id_attribute>` of a found object.
pub(crate) fn identify(data: &mut ResourceData, id_attribute: &str, zone: Zone, id: &str) {
    let zoned = new_zoned_id(zone, id);
    data.set(id_attribute, zoned.as_str());
    data.set_id(zoned);
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::exactly_named;
    use crate::provider::ProviderError;

    #[rstest]
    #[case(&["web", "web-2"], Ok("web"))]
    #[case(&["web-1", "web-2"], Err("no server found"))]
    #[case(&["web", "web"], Err("2 servers found"))]
    fn names_must_match_exactly(
        #[case] candidates: &[&str],
        #[case] expected: Result<&str, &str>,
    ) {
        let outcome = exactly_named("server", "web", candidates.to_vec(), |name: &&str| *name);

        match (outcome, expected) {
            (Ok(found), Ok(name)) => assert_eq!(found, name),
            (Err(ProviderError::Validation { message, .. }), Err(fragment)) => {
                assert!(message.contains(fragment), "{message}");
            }
            (outcome, expected) => panic!("got {outcome:?}, expected {expected:?}"),
        }
    }
}
