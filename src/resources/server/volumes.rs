//! Root and additional volumes of a server.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::info;

use crate::lifecycle::{check_local_volumes, get_server_type, reach_state, state_of, TargetState};
use crate::locality::{Zone, expand_id};
use crate::provider::{Meta, ProviderError, ResourceData};
use crate::scaleway::{Server, ServerType, UpdateServerRequest, VolumeType, gb_to_bytes};
use crate::volume::{
    UnknownVolume, VolumeBackend, VolumeTemplate, get_unknown_volume, resize_unknown_volume,
    update_unknown_volume_iops,
};

use super::root_volume_type;

/// Root volume type used when configuration leaves it unset.
pub(super) fn default_root_type(server_type: &ServerType) -> VolumeType {
    if server_type.is_block_only() {
        VolumeType::SbsVolume
    } else {
        VolumeType::LSsd
    }
}

/// Root volume described by `root_volume.0`: an existing volume when
/// `volume_id` is set, else a fresh volume created with the server.
pub(super) async fn root_volume(
    meta: &Meta,
    zone: Zone,
    data: &ResourceData,
    server_type: &ServerType,
) -> Result<UnknownVolume, ProviderError> {
    let boot = data.get_bool("root_volume.0.boot").then_some(true);
    if let Some(volume_id) = data.get_ok_str("root_volume.0.volume_id") {
        let existing = get_unknown_volume(meta, zone, expand_id(volume_id)).await?;
        return Ok(UnknownVolume { boot, ..existing });
    }
    let volume_type = root_volume_type(data).unwrap_or_else(|| default_root_type(server_type));
    let size = data.get_ok_u64("root_volume.0.size_in_gb").map(gb_to_bytes);
    Ok(UnknownVolume {
        name: data.get_string("root_volume.0.name"),
        boot,
        ..UnknownVolume::fresh(zone, size, VolumeBackend::of(volume_type))
    })
}

/// Looks every id of `additional_volume_ids` up through the facade.
pub(super) async fn additional_volumes(
    meta: &Meta,
    zone: Zone,
    ids: &[String],
) -> Result<Vec<UnknownVolume>, ProviderError> {
    let mut volumes = Vec::with_capacity(ids.len());
    for id in ids {
        volumes.push(get_unknown_volume(meta, zone, expand_id(id)).await?);
    }
    Ok(volumes)
}

/// Server volume map: root at `"0"`, additional volumes from `"1"`.
pub(super) fn volume_templates(
    root: Option<&UnknownVolume>,
    additional: &[UnknownVolume],
) -> BTreeMap<String, VolumeTemplate> {
    let mut templates = BTreeMap::new();
    if let Some(volume) = root {
        let mut template = volume.volume_template();
        if volume.id.is_empty() && !volume.name.is_empty() {
            template.name = Some(volume.name.clone());
        }
        templates.insert(String::from("0"), template);
    }
    for (index, volume) in (1_u32..).zip(additional) {
        templates.insert(index.to_string(), volume.volume_template());
    }
    templates
}

/// Replaces the additional volumes of `server` with `desired_ids`.
///
/// Adding a local volume requires a stopped server: the server is stopped
/// for the update and brought back to its prior state afterwards.
pub(super) async fn update_additional_volumes(
    meta: &Meta,
    zone: Zone,
    server: &Server,
    desired_ids: &[String],
    timeout: Duration,
) -> Result<(), ProviderError> {
    let root = server.root_volume().map(UnknownVolume::from);
    let additional = additional_volumes(meta, zone, desired_ids).await?;
    let mut all: Vec<UnknownVolume> = root.iter().cloned().collect();
    all.extend(additional.iter().cloned());
    let server_type = get_server_type(meta, zone, &server.commercial_type).await?;
    check_local_volumes(&server_type, &all)?;

    let attached: Vec<&str> = server
        .additional_volumes()
        .into_iter()
        .map(|volume| volume.id.as_str())
        .collect();
    let adds_local = additional
        .iter()
        .any(|volume| volume.is_local() && !attached.contains(&volume.id.as_str()));
    let prior = state_of(server)?;
    let must_stop = adds_local && prior != TargetState::Stopped;
    if must_stop {
        reach_state(meta, zone, &server.id, TargetState::Stopped, timeout).await?;
    }
    let request = UpdateServerRequest {
        volumes: Some(volume_templates(root.as_ref(), &additional)),
        ..UpdateServerRequest::default()
    };
    meta.instance.update_server(zone, &server.id, &request).await?;
    info!(%zone, server_id = %server.id, count = additional.len(), "additional volumes updated");
    if must_stop {
        reach_state(meta, zone, &server.id, prior, timeout).await?;
    }
    Ok(())
}

/// Sets the provisioned IOPS of a block root volume. Failures become a
/// warning because the server itself is healthy.
pub(super) async fn apply_root_iops(
    meta: &Meta,
    data: &mut ResourceData,
    root: &UnknownVolume,
    timeout: Duration,
) {
    let Some(iops) = data
        .get_ok_u64("root_volume.0.sbs_iops")
        .and_then(|value| u32::try_from(value).ok())
    else {
        return;
    };
    if !root.is_block_volume() || root.iops == Some(iops) {
        return;
    }
    if let Err(err) = update_unknown_volume_iops(meta, root, iops, timeout).await {
        data.add_warning("failed to update root volume IOPS", err.to_string());
    }
}

/// Resizes the root volume in place and updates its IOPS.
pub(super) async fn update_root_volume(
    meta: &Meta,
    zone: Zone,
    data: &mut ResourceData,
    server: &Server,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let Some(attached) = server.root_volume() else {
        return Ok(());
    };
    let root = get_unknown_volume(meta, zone, &attached.id).await?;
    if data.has_change("root_volume.0.size_in_gb")
        && let Some(size_in_gb) = data.get_ok_u64("root_volume.0.size_in_gb")
    {
        resize_unknown_volume(meta, &root, gb_to_bytes(size_in_gb), timeout).await?;
    }
    if data.has_change("root_volume.0.sbs_iops") {
        apply_root_iops(meta, data, &root, timeout).await;
    }
    Ok(())
}
