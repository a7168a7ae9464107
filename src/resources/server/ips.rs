//! Reserved IPs attached to a server.

use std::collections::BTreeSet;

use tracing::info;

use crate::locality::{Zone, expand_id};
use crate::provider::{Meta, ProviderError, ResourceData};
use crate::scaleway::{Server, UpdateIpRequest};

/// IPs the configuration wants attached: `ip_ids` plus the `ip_id` alias.
pub(super) fn desired_ip_ids(data: &ResourceData) -> BTreeSet<String> {
    let mut ids: BTreeSet<String> = data
        .get_string_list("ip_ids")
        .iter()
        .map(|id| expand_id(id).to_owned())
        .collect();
    if let Some(id) = data.get_ok_str("ip_id") {
        ids.insert(expand_id(id).to_owned());
    }
    ids
}

/// Reserved IPs attached to `server`; dynamic addresses are skipped.
pub(super) fn reserved_ip_ids(server: &Server) -> BTreeSet<String> {
    server
        .public_ips
        .iter()
        .filter(|ip| !ip.dynamic)
        .map(|ip| ip.id.clone())
        .collect()
}

/// Detaches the reserved IPs outside `desired`, then attaches the missing
/// ones. Detaching first lets an address move between two slots of the
/// same server.
pub(super) async fn reconcile_ips(
    meta: &Meta,
    zone: Zone,
    server: &Server,
    desired: &BTreeSet<String>,
) -> Result<(), ProviderError> {
    let observed = reserved_ip_ids(server);
    for id in observed.difference(desired) {
        detach_ip(meta, zone, id).await?;
        info!(%zone, server_id = %server.id, ip_id = %id, "IP detached");
    }
    for id in desired.difference(&observed) {
        let request = UpdateIpRequest {
            server: Some(Some(server.id.clone())),
            ..UpdateIpRequest::default()
        };
        meta.instance.update_ip(zone, id, &request).await?;
        info!(%zone, server_id = %server.id, ip_id = %id, "IP attached");
    }
    Ok(())
}

/// Detaches one IP from whatever server holds it.
pub(super) async fn detach_ip(meta: &Meta, zone: Zone, id: &str) -> Result<(), ProviderError> {
    let request = UpdateIpRequest {
        server: Some(None),
        ..UpdateIpRequest::default()
    };
    meta.instance.update_ip(zone, id, &request).await?;
    Ok(())
}
