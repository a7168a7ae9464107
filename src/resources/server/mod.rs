//! `scaleway_instance_server`.
//!
//! The heaviest resource of the service: it owns the root volume, attaches
//! reserved IPs, additional volumes and private NICs, writes user data,
//! and drives the power state through [`crate::lifecycle`].

mod create;
mod delete;
mod ips;
mod read;
mod update;
mod volumes;

use serde_json::Value;
use tracing::debug;

use crate::lifecycle::image_drifted;
use crate::locality::{expand_id, is_uuid};
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Timeouts,
    Validation,
};
use crate::scaleway::VolumeType;

use super::{locality_attributes, locate};

pub(crate) use read::flatten_server;

/// Key under which `cloud_init` is stored in the server user data.
pub(crate) const CLOUD_INIT_KEY: &str = "cloud-init";

const ROOT_COMPUTED: [&str; 5] = ["volume_id", "size_in_gb", "volume_type", "name", "sbs_iops"];

/// `scaleway_instance_server`.
pub struct ServerResource;

fn root_volume_block() -> Attribute {
    Attribute::block(
        "root_volume",
        vec![
            Attribute::string("volume_id")
                .computed()
                .validate(Validation::ZonedUuid),
            Attribute::int("size_in_gb").computed().validate(Validation::Positive),
            Attribute::string("volume_type")
                .computed()
                .force_new()
                .validate(Validation::OneOf(&["l_ssd", "b_ssd", "sbs_volume"])),
            Attribute::bool("delete_on_termination").default_value(true),
            Attribute::bool("boot").default_value(false),
            Attribute::string("name").computed(),
            Attribute::int("sbs_iops").computed(),
        ],
    )
    .computed()
    .max_items(1)
}

fn private_network_block() -> Attribute {
    Attribute::block(
        "private_network",
        vec![
            Attribute::string("pn_id")
                .required()
                .validate(Validation::RegionalUuid),
            Attribute::string("mac_address").computed(),
            Attribute::string("status").computed(),
            Attribute::string("zone").computed(),
            Attribute::string("pnic_id").computed(),
        ],
    )
    .max_items(8)
}

fn public_ips_block() -> Attribute {
    Attribute::block(
        "public_ips",
        vec![Attribute::string("id"), Attribute::string("address")],
    )
    .computed_only()
}

impl Resource for ServerResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("name").computed(),
            Attribute::string("type").required().describe("Commercial type"),
            Attribute::string("image").describe("Image UUID or marketplace label"),
            Attribute::list("tags"),
            Attribute::string("security_group_id")
                .computed()
                .validate(Validation::ZonedUuid),
            Attribute::bool("enable_dynamic_ip").default_value(false),
            Attribute::string("placement_group_id").validate(Validation::ZonedUuid),
            Attribute::bool("placement_group_policy_respected").computed_only(),
            root_volume_block(),
            Attribute::list("additional_volume_ids").validate(Validation::ZonedUuid),
            Attribute::string("ip_id")
                .validate(Validation::ZonedUuid)
                .conflicts_with(&["ip_ids"])
                .describe("Alias of a single-element ip_ids"),
            Attribute::set("ip_ids").computed().validate(Validation::ZonedUuid),
            Attribute::string("public_ip").computed_only(),
            public_ips_block(),
            Attribute::string("private_ip").computed_only(),
            private_network_block(),
            Attribute::string("boot_type")
                .default_value("local")
                .validate(Validation::OneOf(&["local", "rescue"])),
            Attribute::string("state")
                .default_value("started")
                .validate(Validation::OneOf(&["started", "stopped", "standby"])),
            Attribute::map("user_data"),
            Attribute::string("cloud_init"),
            Attribute::bool("replace_on_type_change").default_value(false),
            Attribute::bool("protected").default_value(false),
            Attribute::bool("routed_ip_enabled").computed(),
            Attribute::bool("enable_ipv6")
                .default_value(false)
                .deprecated("IPv6 is configured through routed IPs"),
            Attribute::string("organization_id").computed_only(),
        ];
        attributes.extend(locality_attributes());
        Schema::new(attributes)
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::server()
    }

    fn create<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(create::create(meta, data))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read::read(meta, data))
    }

    fn update<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(update::update(meta, data))
    }

    fn delete<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(delete::delete(meta, data))
    }

    fn customize_diff<'a>(
        &'a self,
        meta: &'a Meta,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(customize_diff(meta, data))
    }
}

/// Root volume type requested in configuration or recorded in state.
pub(crate) fn root_volume_type(data: &ResourceData) -> Option<VolumeType> {
    data.get_ok_str("root_volume.0.volume_type")
        .and_then(VolumeType::parse)
}

/// `pn_id` of every `private_network` block, in order.
pub(super) fn private_network_ids(blocks: Option<&Value>) -> Vec<String> {
    blocks
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|block| block.get("pn_id").and_then(Value::as_str))
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn carry_root_volume(data: &mut ResourceData) {
    if data.list_len("root_volume") == 0 {
        return;
    }
    for field in ROOT_COMPUTED {
        let path = format!("root_volume.0.{field}");
        if data.get(&path).is_none()
            && let Some(previous) = data.get_prior(&path).cloned()
        {
            data.set(&path, previous);
        }
    }
}

fn carry_private_networks(data: &mut ResourceData) {
    for index in 0..data.list_len("private_network") {
        let path = format!("private_network.{index}");
        let same_network = data
            .get_str(&format!("{path}.pn_id"))
            .zip(data.get_prior(&format!("{path}.pn_id")).and_then(Value::as_str))
            .is_some_and(|(planned, prior)| expand_id(planned) == expand_id(prior));
        if !same_network {
            continue;
        }
        for field in ["mac_address", "status", "zone", "pnic_id"] {
            let nested = format!("{path}.{field}");
            if let Some(previous) = data.get_prior(&nested).cloned() {
                data.set(&nested, previous);
            }
        }
    }
}

async fn image_forces_replacement(meta: &Meta, data: &ResourceData) -> Result<bool, ProviderError> {
    let (before, after) = data.get_change("image");
    let Some(desired) = after.as_str().filter(|image| !image.is_empty()) else {
        return Ok(false);
    };
    if is_uuid(expand_id(desired)) {
        let previous = before.as_str().map(expand_id);
        return Ok(previous != Some(expand_id(desired)));
    }
    let (zone, id) = locate(meta, data)?;
    let server = meta.instance.get_server(zone, &id).await?;
    let root_type = root_volume_type(data).unwrap_or(VolumeType::LSsd);
    image_drifted(meta, &server, desired, root_type).await
}

fn local_root_resized(data: &ResourceData) -> bool {
    data.has_change("root_volume.0.size_in_gb")
        && data
            .get_prior("root_volume.0.volume_type")
            .and_then(Value::as_str)
            .is_some_and(|volume_type| volume_type == VolumeType::LSsd.as_str())
}

async fn customize_diff(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    carry_root_volume(data);
    carry_private_networks(data);
    if data.get_bool("enable_ipv6") && data.get_bool_opt("routed_ip_enabled") != Some(false) {
        data.add_attribute_warning(
            "enable_ipv6",
            "enable_ipv6 is ignored on servers with routed IPs enabled",
        );
    }
    if data.is_new_resource() {
        return Ok(());
    }
    if data.has_change("type") && data.get_bool("replace_on_type_change") {
        data.force_new("type");
        if data.has_change("root_volume.0.volume_id") {
            data.add_warning(
                "root volume will not be preserved",
                "the server is replaced because its type changed; the current root volume is deleted \
                 when delete_on_termination is set",
            );
        }
    }
    if data.has_change("image") && image_forces_replacement(meta, data).await? {
        debug!(id = data.id(), "image drifted, replacing server");
        data.force_new("image");
    }
    if local_root_resized(data) {
        data.force_new("root_volume.0.size_in_gb");
    }
    Ok(())
}

#[cfg(test)]
mod tests;
