//! `scaleway_instance_placement_group`.

use tracing::info;

use crate::locality::new_zoned_id;
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::scaleway::{
    CreatePlacementGroupRequest, PlacementGroup, PlacementGroupPolicyMode,
    PlacementGroupPolicyType, UpdatePlacementGroupRequest,
};

use super::{
    changed_name, changed_tags, found, locality_attributes, locate, name_or_generate, parse_enum,
    set_locality, string_array, tolerate_not_found,
};

/// `scaleway_instance_placement_group`.
pub struct PlacementGroupResource;

impl Resource for PlacementGroupResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("name").computed(),
            Attribute::string("policy_mode")
                .default_value("optional")
                .validate(Validation::OneOf(&["optional", "enforced"])),
            Attribute::string("policy_type")
                .default_value("max_availability")
                .validate(Validation::OneOf(&["max_availability", "low_latency"])),
            Attribute::bool("policy_respected").computed_only(),
            Attribute::list("tags"),
        ];
        attributes.extend(locality_attributes());
        Schema::new(attributes)
    }

    fn create<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(create(meta, data))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read(meta, data))
    }

    fn update<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(update(meta, data))
    }

    fn delete<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(delete(meta, data))
    }
}

fn policy_mode(data: &ResourceData) -> Result<PlacementGroupPolicyMode, ProviderError> {
    Ok(parse_enum(data, "policy_mode", PlacementGroupPolicyMode::parse)?
        .unwrap_or(PlacementGroupPolicyMode::Optional))
}

fn policy_type(data: &ResourceData) -> Result<PlacementGroupPolicyType, ProviderError> {
    Ok(parse_enum(data, "policy_type", PlacementGroupPolicyType::parse)?
        .unwrap_or(PlacementGroupPolicyType::MaxAvailability))
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let request = CreatePlacementGroupRequest {
        name: name_or_generate(data, "pg"),
        project: meta.project_of(data),
        policy_mode: policy_mode(data)?,
        policy_type: policy_type(data)?,
        tags: data.get_string_list("tags"),
    };
    let created = meta.instance.create_placement_group(zone, &request).await?;
    data.set_id(new_zoned_id(zone, &created.id));
    info!(%zone, placement_group_id = %created.id, "placement group created");
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let Some(group) = found(meta.instance.get_placement_group(zone, &id).await, data)? else {
        return Ok(());
    };
    flatten_placement_group(data, &group);
    Ok(())
}

/// Writes every attribute of a placement group into `data`.
pub(crate) fn flatten_placement_group(data: &mut ResourceData, group: &PlacementGroup) {
    data.set("name", group.name.as_str());
    data.set("policy_mode", group.policy_mode.as_str());
    data.set("policy_type", group.policy_type.as_str());
    data.set("policy_respected", group.policy_respected);
    data.set("tags", string_array(group.tags.iter().cloned()));
    set_locality(data, group.zone, &group.project);
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let mut request = UpdatePlacementGroupRequest {
        name: changed_name(data),
        tags: changed_tags(data),
        ..UpdatePlacementGroupRequest::default()
    };
    if data.has_change("policy_mode") {
        request.policy_mode = Some(policy_mode(data)?);
    }
    if data.has_change("policy_type") {
        request.policy_type = Some(policy_type(data)?);
    }
    let changed = request.name.is_some()
        || request.tags.is_some()
        || request.policy_mode.is_some()
        || request.policy_type.is_some();
    if changed {
        meta.instance
            .update_placement_group(zone, &id, &request)
            .await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    tolerate_not_found(meta.instance.delete_placement_group(zone, &id).await)?;
    info!(%zone, placement_group_id = %id, "placement group deleted");
    Ok(())
}
