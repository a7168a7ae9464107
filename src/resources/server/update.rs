use std::time::Duration;

use tracing::{debug, info};

use crate::lifecycle::{TargetState, migrate_server_type, reach_state, state_of};
use crate::locality::{Zone, expand_id};
use crate::private_nic::PrivateNicHandler;
use crate::provider::{Meta, ProviderError, ResourceData};
use crate::scaleway::{BootType, SecurityGroupTemplate, Server, ServerState, UpdateServerRequest};
use crate::waiter::wait_for_server;

use super::super::{changed_name, changed_tags, locate, parse_enum, reference};
use super::ips::{desired_ip_ids, reconcile_ips};
use super::volumes::{update_additional_volumes, update_root_volume};
use super::{CLOUD_INIT_KEY, private_network_ids, read};

pub(super) async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let timeout = data.timeouts().update;

    let request = server_changes(data)?;
    if !request.is_empty() {
        meta.instance.update_server(zone, &id, &request).await?;
        debug!(%zone, server_id = %id, "server attributes updated");
    }

    let current = fetch(meta, zone, &id, timeout).await?;
    update_user_data(meta, data, &current).await?;

    if data.has_change("type") {
        migrate_server_type(meta, zone, &id, &data.get_string("type"), timeout).await?;
    }
    if data.has_change("placement_group_id") {
        let current = fetch(meta, zone, &id, timeout).await?;
        update_placement_group(meta, data, &current, timeout).await?;
    }
    if data.has_change("additional_volume_ids") {
        let current = fetch(meta, zone, &id, timeout).await?;
        let desired = data.get_string_list("additional_volume_ids");
        update_additional_volumes(meta, zone, &current, &desired, timeout).await?;
    }
    if data.has_changes(&["root_volume.0.size_in_gb", "root_volume.0.sbs_iops"]) {
        let current = fetch(meta, zone, &id, timeout).await?;
        update_root_volume(meta, zone, data, &current, timeout).await?;
    }
    if data.has_changes(&["ip_ids", "ip_id"]) {
        let current = fetch(meta, zone, &id, timeout).await?;
        reconcile_ips(meta, zone, &current, &desired_ip_ids(data)).await?;
    }
    if data.has_change("private_network") {
        update_private_networks(meta, data, zone, &id, timeout).await?;
    }
    if data.has_change("state")
        && let Some(target) = data.get_ok_str("state").and_then(TargetState::parse)
    {
        reach_state(meta, zone, &id, target, timeout).await?;
    }

    read::read(meta, data).await
}

async fn fetch(meta: &Meta, zone: Zone, id: &str, timeout: Duration) -> Result<Server, ProviderError> {
    Ok(wait_for_server(meta.instance.as_ref(), zone, id, meta.wait_options(timeout)).await?)
}

fn server_changes(data: &ResourceData) -> Result<UpdateServerRequest, ProviderError> {
    let mut request = UpdateServerRequest {
        name: changed_name(data),
        tags: changed_tags(data),
        ..UpdateServerRequest::default()
    };
    if data.has_change("security_group_id")
        && let Some(group) = reference(data, "security_group_id")
    {
        request.security_group = Some(SecurityGroupTemplate { id: group });
    }
    if data.has_change("enable_dynamic_ip") {
        request.dynamic_ip_required = Some(data.get_bool("enable_dynamic_ip"));
    }
    if data.has_change("boot_type") {
        request.boot_type = parse_enum(data, "boot_type", BootType::parse)?;
    }
    if data.has_change("protected") {
        request.protected = Some(data.get_bool("protected"));
    }
    if data.has_change("routed_ip_enabled") {
        request.routed_ip_enabled = data.get_bool_opt("routed_ip_enabled");
    }
    if data.has_change("enable_ipv6") {
        request.enable_ipv6 = Some(data.get_bool("enable_ipv6"));
    }
    Ok(request)
}

/// Writes changed keys and deletes removed ones; `cloud_init` lives in the
/// same store under its own key.
async fn update_user_data(
    meta: &Meta,
    data: &mut ResourceData,
    server: &Server,
) -> Result<(), ProviderError> {
    let zone = server.zone;
    if data.has_change("user_data") {
        let (before, _) = data.get_change("user_data");
        let desired = data.get_string_map("user_data");
        if let Some(previous) = before.as_object() {
            for key in previous.keys().filter(|key| !desired.contains_key(*key)) {
                meta.instance
                    .delete_server_user_data(zone, &server.id, key)
                    .await?;
            }
        }
        for (key, content) in &desired {
            let unchanged = before.get(key).and_then(|value| value.as_str()) == Some(content);
            if !unchanged {
                meta.instance
                    .set_server_user_data(zone, &server.id, key, content)
                    .await?;
            }
        }
    }
    if data.has_change("cloud_init") {
        match data.get_ok_str("cloud_init") {
            Some(cloud_init) => {
                meta.instance
                    .set_server_user_data(zone, &server.id, CLOUD_INIT_KEY, cloud_init)
                    .await?;
            }
            None => {
                meta.instance
                    .delete_server_user_data(zone, &server.id, CLOUD_INIT_KEY)
                    .await?;
            }
        }
        if server.state == ServerState::Running {
            data.add_attribute_warning(
                "cloud_init",
                "instance may need to be rebooted to pick up the new cloud-init",
            );
        }
    }
    Ok(())
}

/// Joining a placement group requires a stopped server; leaving one does
/// not.
async fn update_placement_group(
    meta: &Meta,
    data: &ResourceData,
    server: &Server,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let desired = reference(data, "placement_group_id");
    let request = UpdateServerRequest {
        placement_group: Some(desired.clone()),
        ..UpdateServerRequest::default()
    };
    let prior = state_of(server)?;
    let must_stop = desired.is_some() && prior != TargetState::Stopped;
    if must_stop {
        reach_state(meta, server.zone, &server.id, TargetState::Stopped, timeout).await?;
    }
    meta.instance
        .update_server(server.zone, &server.id, &request)
        .await?;
    info!(zone = %server.zone, server_id = %server.id, placement_group = ?desired, "placement group updated");
    if must_stop {
        reach_state(meta, server.zone, &server.id, prior, timeout).await?;
    }
    Ok(())
}

async fn update_private_networks(
    meta: &Meta,
    data: &ResourceData,
    zone: Zone,
    server_id: &str,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let prior = private_network_ids(data.get_prior("private_network"));
    let desired = private_network_ids(data.get("private_network"));
    let mut handler = PrivateNicHandler::new(meta, zone, server_id, timeout).await?;
    if desired.is_empty() {
        return handler.detach_all().await;
    }
    let unchanged = prior.len() == desired.len()
        && prior
            .iter()
            .zip(&desired)
            .all(|(before, after)| expand_id(before) == expand_id(after));
    if unchanged {
        return Ok(());
    }
    handler.reconcile(&prior, &desired).await
}
