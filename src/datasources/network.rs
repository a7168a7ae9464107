//! IP, placement group, private NIC and security group lookups.

use crate::locality::{
    Zone, expand_id, new_nested_zoned_id, new_zoned_id, parse_zoned_id_lenient,
};
use crate::provider::{
    Attribute, DataSource, Meta, ProviderError, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::resources::{
    IpResource, PlacementGroupResource, PrivateNicResource, SecurityGroupResource, flatten_ip,
    flatten_placement_group, flatten_private_nic, flatten_security_group,
};
use crate::scaleway::{ListFilter, PlacementGroup, SecurityGroup};
use crate::security_group::read_rules_into;

use super::{identify, lookup_of, lookup_schema, project_filter, resolve, zoned_lookups};

/// `data.scaleway_instance_ip`, found by `ip_id` or `address`.
pub struct IpDataSource;

impl DataSource for IpDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(
            &IpResource,
            vec![
                Attribute::string("ip_id")
                    .computed()
                    .validate(Validation::ZonedUuid)
                    .conflicts_with(&["address"]),
                Attribute::string("address").computed(),
                Attribute::string("zone")
                    .computed()
                    .validate(Validation::Zone),
                Attribute::string("project_id").computed(),
            ],
        )
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_ip(meta, data))
    }
}

async fn read_ip(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let ip = if let Some(raw) = data.get_ok_str("ip_id") {
        let (zone, id) = parse_zoned_id_lenient(raw)?;
        let zone = match zone {
            Some(zone) => zone,
            None => meta.zone_of(data)?,
        };
        meta.instance.get_ip(zone, &id).await?
    } else if let Some(address) = data.get_ok_str("address").map(str::to_owned) {
        let zone = meta.zone_of(data)?;
        let filter = ListFilter {
            project: project_filter(data),
            ..ListFilter::default()
        };
        meta.instance
            .list_ips(zone, &filter)
            .await?
            .into_iter()
            .find(|ip| ip.address == address)
            .ok_or_else(|| {
                ProviderError::validation("address", format!("no IP found with address {address}"))
            })?
    } else {
        return Err(ProviderError::validation(
            "ip_id",
            "one of ip_id or address must be set",
        ));
    };
    identify(data, "ip_id", ip.zone, &ip.id);
    flatten_ip(data, &ip);
    Ok(())
}

/// `data.scaleway_instance_placement_group`.
pub struct PlacementGroupDataSource;

impl DataSource for PlacementGroupDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(&PlacementGroupResource, zoned_lookups("placement_group_id"))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_placement_group(meta, data))
    }
}

async fn read_placement_group(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, lookup) = lookup_of(meta, data, "placement_group_id")?;
    let group = resolve(
        "placement group",
        lookup,
        project_filter(data),
        |id| async move { meta.instance.get_placement_group(zone, &id).await },
        |filter| async move { meta.instance.list_placement_groups(zone, &filter).await },
        |group: &PlacementGroup| group.name.as_str(),
    )
    .await?;
    identify(data, "placement_group_id", group.zone, &group.id);
    flatten_placement_group(data, &group);
    Ok(())
}

/// `data.scaleway_instance_security_group`, rules included.
pub struct SecurityGroupDataSource;

impl DataSource for SecurityGroupDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(&SecurityGroupResource, zoned_lookups("security_group_id"))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_security_group(meta, data))
    }
}

async fn read_security_group(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, lookup) = lookup_of(meta, data, "security_group_id")?;
    let group = resolve(
        "security group",
        lookup,
        project_filter(data),
        |id| async move { meta.instance.get_security_group(zone, &id).await },
        |filter| async move { meta.instance.list_security_groups(zone, &filter).await },
        |group: &SecurityGroup| group.name.as_str(),
    )
    .await?;
    identify(data, "security_group_id", group.zone, &group.id);
    flatten_security_group(data, &group);
    read_rules_into(meta, group.zone, &group.id, data).await
}

/// `data.scaleway_instance_private_nic`, found on `server_id` by
/// `private_nic_id` or `private_network_id`.
pub struct PrivateNicDataSource;

impl DataSource for PrivateNicDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(
            &PrivateNicResource,
            vec![
                Attribute::string("server_id")
                    .required()
                    .validate(Validation::ZonedUuid),
                Attribute::string("private_nic_id")
                    .conflicts_with(&["private_network_id"])
                    .validate(Validation::ZonedUuid),
                Attribute::string("private_network_id")
                    .computed()
                    .validate(Validation::RegionalUuid),
                Attribute::string("zone")
                    .computed()
                    .validate(Validation::Zone),
            ],
        )
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_private_nic(meta, data))
    }
}

async fn read_private_nic(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let server_ref = data.get_string("server_id");
    let zone: Zone = match parse_zoned_id_lenient(&server_ref)? {
        (Some(zone), _) => zone,
        (None, _) => meta.zone_of(data)?,
    };
    let server_id = expand_id(&server_ref).to_owned();
    let nic = if let Some(nic_id) = data.get_ok_str("private_nic_id").map(expand_id) {
        meta.instance
            .get_private_nic(zone, &server_id, nic_id)
            .await?
    } else if let Some(network) = data.get_ok_str("private_network_id").map(expand_id) {
        meta.instance
            .list_private_nics(zone, &server_id)
            .await?
            .into_iter()
            .find(|nic| nic.private_network_id == network)
            .ok_or_else(|| {
                ProviderError::validation(
                    "private_network_id",
                    format!("server {server_id} has no NIC in private network {network}"),
                )
            })?
    } else {
        return Err(ProviderError::validation(
            "private_nic_id",
            "one of private_nic_id or private_network_id must be set",
        ));
    };
    data.set_id(new_nested_zoned_id(zone, &server_id, &nic.id));
    data.set("private_nic_id", new_zoned_id(zone, &nic.id));
    flatten_private_nic(data, zone, &nic);
    Ok(())
}
