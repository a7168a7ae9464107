use tracing::info;

use crate::lifecycle::{TargetState, reach_state};
use crate::private_nic::PrivateNicHandler;
use crate::provider::{Meta, ProviderError, ResourceData};
use crate::scaleway::UpdateServerRequest;
use crate::volume::{UnknownVolume, delete_unknown_volume};
use crate::waiter::wait_for_server_deleted;

use super::super::locate;
use super::ips::{detach_ip, reserved_ip_ids};

/// Detaches reserved IPs and the placement group, stops the server,
/// removes its NICs, deletes it, then deletes the root volume when
/// `delete_on_termination` holds. Additional volumes survive.
pub(super) async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let timeout = data.timeouts().delete;
    let server = match meta.instance.get_server(zone, &id).await {
        Ok(server) => server,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let root = server.root_volume().map(UnknownVolume::from);

    for ip_id in reserved_ip_ids(&server) {
        detach_ip(meta, zone, &ip_id).await?;
    }
    if server.placement_group.is_some() {
        let request = UpdateServerRequest {
            placement_group: Some(None),
            ..UpdateServerRequest::default()
        };
        meta.instance.update_server(zone, &id, &request).await?;
    }
    reach_state(meta, zone, &id, TargetState::Stopped, timeout).await?;

    let mut handler = PrivateNicHandler::new(meta, zone, &id, timeout).await?;
    handler.detach_all().await?;

    match meta.instance.delete_server(zone, &id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    wait_for_server_deleted(meta.instance.as_ref(), zone, &id, meta.wait_options(timeout)).await?;
    info!(%zone, server_id = %id, "server deleted");

    let delete_root = data
        .get_bool_opt("root_volume.0.delete_on_termination")
        .unwrap_or(true);
    if delete_root && let Some(volume) = root {
        delete_unknown_volume(meta, &volume, timeout).await?;
    }
    Ok(())
}
