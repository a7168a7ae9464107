use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::lifecycle::state_of;
use crate::locality::{Zone, expand_id, is_uuid, new_regional_id, new_zoned_id};
use crate::provider::{Meta, ProviderError, ResourceData};
use crate::scaleway::{PrivateNic, Server, bytes_to_gb};
use crate::volume::get_unknown_volume;

use super::super::{found, locate, set_locality, string_array};
use super::ips::reserved_ip_ids;
use super::{CLOUD_INIT_KEY, private_network_ids};

pub(super) async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let Some(server) = found(meta.instance.get_server(zone, &id).await, data)? else {
        return Ok(());
    };
    flatten_server(meta, data, &server).await
}

/// Writes every attribute of `server` into `data`.
///
/// Attributes that only exist in configuration, such as a marketplace
/// label in `image` or `delete_on_termination`, keep their current value.
/// So does `state` while the server is in a transient state.
pub(crate) async fn flatten_server(
    meta: &Meta,
    data: &mut ResourceData,
    server: &Server,
) -> Result<(), ProviderError> {
    let zone = server.zone;
    data.set("name", server.name.as_str());
    data.set("type", server.commercial_type.as_str());
    data.set("tags", string_array(server.tags.iter().cloned()));
    set_locality(data, zone, &server.project);
    data.set("organization_id", server.organization.as_str());
    flatten_image(data, server);
    if let Some(group) = &server.security_group {
        data.set("security_group_id", new_zoned_id(zone, &group.id));
    }
    data.set("enable_dynamic_ip", server.dynamic_ip_required);
    match &server.placement_group {
        Some(group) => {
            data.set("placement_group_id", new_zoned_id(zone, &group.id));
            data.set("placement_group_policy_respected", group.policy_respected);
        }
        None => {
            data.set("placement_group_id", Value::Null);
            data.set("placement_group_policy_respected", Value::Null);
        }
    }
    data.set("boot_type", server.boot_type.as_str());
    if let Ok(state) = state_of(server) {
        data.set("state", state.as_str());
    }
    data.set("protected", server.protected);
    data.set("routed_ip_enabled", server.routed_ip_enabled);
    data.set("enable_ipv6", server.enable_ipv6);

    flatten_root_volume(meta, data, server).await?;
    data.set(
        "additional_volume_ids",
        string_array(
            server
                .additional_volumes()
                .into_iter()
                .map(|volume| new_zoned_id(zone, &volume.id)),
        ),
    );
    flatten_ips(data, server);
    data.set(
        "private_ip",
        server.private_ip.clone().map_or(Value::Null, Value::String),
    );
    flatten_user_data(meta, data, server).await?;
    flatten_private_networks(data, server);
    Ok(())
}

fn flatten_image(data: &mut ResourceData, server: &Server) {
    let configured_label = data
        .get_ok_str("image")
        .is_some_and(|image| !is_uuid(expand_id(image)));
    if configured_label {
        return;
    }
    if let Some(image) = &server.image {
        data.set("image", new_zoned_id(server.zone, &image.id));
    }
}

async fn flatten_root_volume(
    meta: &Meta,
    data: &mut ResourceData,
    server: &Server,
) -> Result<(), ProviderError> {
    let Some(attached) = server.root_volume() else {
        data.set("root_volume", json!([]));
        return Ok(());
    };
    let delete_on_termination = data
        .get_bool_opt("root_volume.0.delete_on_termination")
        .unwrap_or(true);
    let volume = get_unknown_volume(meta, server.zone, &attached.id).await?;
    let size = attached.size.or(volume.size).unwrap_or_default();
    let mut block = json!({
        "volume_id": new_zoned_id(server.zone, &attached.id),
        "size_in_gb": bytes_to_gb(size),
        "volume_type": attached.volume_type.as_str(),
        "delete_on_termination": delete_on_termination,
        "boot": attached.boot,
        "name": volume.name,
    });
    if let (Some(iops), Value::Object(fields)) = (volume.iops, &mut block) {
        fields.insert(String::from("sbs_iops"), json!(iops));
    }
    data.set("root_volume", Value::Array(vec![block]));
    Ok(())
}

fn flatten_ips(data: &mut ResourceData, server: &Server) {
    let zone = server.zone;
    let public_ips: Vec<Value> = server
        .public_ips
        .iter()
        .map(|ip| json!({"id": new_zoned_id(zone, &ip.id), "address": ip.address}))
        .collect();
    data.set("public_ips", Value::Array(public_ips));
    data.set(
        "public_ip",
        server
            .public_ipv4()
            .map_or(Value::Null, |ip| Value::String(ip.address.clone())),
    );
    let reserved: Vec<String> = reserved_ip_ids(server)
        .iter()
        .map(|id| new_zoned_id(zone, id))
        .collect();
    if data.get_ok_str("ip_id").is_some() {
        let alias = reserved.first().cloned().map_or(Value::Null, Value::String);
        data.set("ip_id", alias);
        data.set("ip_ids", json!([]));
    } else {
        data.set("ip_ids", string_array(reserved));
    }
}

async fn flatten_user_data(
    meta: &Meta,
    data: &mut ResourceData,
    server: &Server,
) -> Result<(), ProviderError> {
    let keys = meta
        .instance
        .list_server_user_data(server.zone, &server.id)
        .await?;
    let mut user_data = BTreeMap::new();
    let mut cloud_init = None;
    for key in keys {
        let content = meta
            .instance
            .get_server_user_data(server.zone, &server.id, &key)
            .await?;
        if key == CLOUD_INIT_KEY {
            cloud_init = Some(content);
        } else {
            user_data.insert(key, Value::String(content));
        }
    }
    data.set("user_data", Value::Object(user_data.into_iter().collect()));
    data.set("cloud_init", cloud_init.map_or(Value::Null, Value::String));
    Ok(())
}

/// Networks keep the order of the current state; NICs the state does not
/// know about are appended.
fn flatten_private_networks(data: &mut ResourceData, server: &Server) {
    let zone = server.zone;
    let mut remaining: Vec<_> = server.private_nics.iter().collect();
    let mut blocks = Vec::new();
    for configured in private_network_ids(data.get("private_network")) {
        let position = remaining
            .iter()
            .position(|nic| nic.private_network_id == expand_id(&configured));
        if let Some(index) = position {
            let nic = remaining.remove(index);
            blocks.push(network_block(zone, configured, nic));
        }
    }
    for nic in remaining {
        let pn_id = new_regional_id(zone.region(), &nic.private_network_id);
        blocks.push(network_block(zone, pn_id, nic));
    }
    data.set("private_network", Value::Array(blocks));
}

fn network_block(zone: Zone, pn_id: String, nic: &PrivateNic) -> Value {
    json!({
        "pn_id": pn_id,
        "mac_address": nic.mac_address,
        "status": nic.state.as_str(),
        "zone": zone.as_str(),
        "pnic_id": new_zoned_id(zone, &nic.id),
    })
}
