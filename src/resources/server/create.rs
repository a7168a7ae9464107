use tracing::info;

use crate::lifecycle::{TargetState, check_local_volumes, get_server_type, reach_state, resolve_image};
use crate::locality::new_zoned_id;
use crate::private_nic::PrivateNicHandler;
use crate::provider::{Meta, ProviderError, ResourceData};
use crate::scaleway::{BootType, CreateServerRequest};
use crate::volume::get_unknown_volume;
use crate::waiter::wait_for_server;

use super::super::{name_or_generate, parse_enum, reference};
use super::ips::desired_ip_ids;
use super::volumes::{
    additional_volumes, apply_root_iops, default_root_type, root_volume, volume_templates,
};
use super::{CLOUD_INIT_KEY, private_network_ids, read, root_volume_type};

pub(super) async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let project = meta.project_of(data);
    let timeout = data.timeouts().create;
    let commercial_type = data.get_string("type");
    let server_type = get_server_type(meta, zone, &commercial_type).await?;

    let image = data.get_ok_str("image").map(str::to_owned);
    if image.is_none() && data.get_ok_str("root_volume.0.volume_id").is_none() {
        return Err(ProviderError::validation(
            "image",
            "image is required unless root_volume.0.volume_id is set",
        ));
    }
    let root_type = root_volume_type(data).unwrap_or_else(|| default_root_type(&server_type));
    let image_id = match &image {
        Some(label) => Some(resolve_image(meta, zone, label, &commercial_type, root_type).await?),
        None => None,
    };

    let root = root_volume(meta, zone, data, &server_type).await?;
    let additional =
        additional_volumes(meta, zone, &data.get_string_list("additional_volume_ids")).await?;
    let mut all = vec![root.clone()];
    all.extend(additional.iter().cloned());
    check_local_volumes(&server_type, &all)?;

    let request = CreateServerRequest {
        name: name_or_generate(data, "srv"),
        commercial_type: commercial_type.clone(),
        image: image_id,
        volumes: volume_templates(Some(&root), &additional),
        dynamic_ip_required: Some(data.get_bool("enable_dynamic_ip")),
        routed_ip_enabled: data.get_bool_opt("routed_ip_enabled"),
        boot_type: parse_enum(data, "boot_type", BootType::parse)?,
        public_ips: desired_ip_ids(data).into_iter().collect(),
        project,
        tags: data.get_string_list("tags"),
        security_group: reference(data, "security_group_id"),
        placement_group: reference(data, "placement_group_id"),
        protected: data.get_bool("protected"),
        enable_ipv6: data.get_bool("enable_ipv6").then_some(true),
    };
    let created = meta.instance.create_server(zone, &request).await?;
    data.set_id(new_zoned_id(zone, &created.id));
    info!(%zone, server_id = %created.id, commercial_type, "server created");
    let server = wait_for_server(
        meta.instance.as_ref(),
        zone,
        &created.id,
        meta.wait_options(timeout),
    )
    .await?;

    if let Some(attached) = server.root_volume() {
        let created_root = get_unknown_volume(meta, zone, &attached.id).await?;
        apply_root_iops(meta, data, &created_root, timeout).await;
    }

    for (key, content) in data.get_string_map("user_data") {
        meta.instance
            .set_server_user_data(zone, &server.id, &key, &content)
            .await?;
    }
    if let Some(cloud_init) = data.get_ok_str("cloud_init") {
        meta.instance
            .set_server_user_data(zone, &server.id, CLOUD_INIT_KEY, cloud_init)
            .await?;
    }

    let target = data
        .get_ok_str("state")
        .and_then(TargetState::parse)
        .unwrap_or(TargetState::Started);
    reach_state(meta, zone, &server.id, target, timeout).await?;

    let networks = private_network_ids(data.get("private_network"));
    if !networks.is_empty() {
        let mut handler = PrivateNicHandler::new(meta, zone, &server.id, timeout).await?;
        for network in &networks {
            handler.attach(network, Vec::new(), Vec::new()).await?;
        }
    }

    read::read(meta, data).await
}
