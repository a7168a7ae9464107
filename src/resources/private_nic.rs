//! `scaleway_instance_private_nic`.
//!
//! Identified by `zone/server_id/nic_id`.

use tracing::info;

use crate::locality::{
    Zone, expand_id, new_nested_zoned_id, new_regional_id, new_zoned_id, parse_nested_zoned_id,
    parse_zoned_id_lenient,
};
use crate::private_nic::{PrivateNicHandler, delete_private_nic};
use crate::provider::{
    Attribute, ImportFormat, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema,
    Validation,
};
use crate::scaleway::{PrivateNic, UpdatePrivateNicRequest};

use super::{changed_tags, found, reference, string_array};

/// `scaleway_instance_private_nic`.
pub struct PrivateNicResource;

impl Resource for PrivateNicResource {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("server_id")
                .required()
                .force_new()
                .validate(Validation::ZonedUuid),
            Attribute::string("private_network_id")
                .required()
                .force_new()
                .validate(Validation::RegionalUuid),
            Attribute::list("ipam_ip_ids").force_new(),
            Attribute::string("mac_address").computed_only(),
            Attribute::string("status").computed_only(),
            Attribute::list("tags"),
            Attribute::string("zone")
                .computed()
                .force_new()
                .validate(Validation::Zone),
        ])
    }

    fn import_format(&self) -> ImportFormat {
        ImportFormat::Nested
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

/// Zone, server id and NIC id held by the state identifier.
fn locate_nic(data: &ResourceData) -> Result<(Zone, String, String), ProviderError> {
    let id = parse_nested_zoned_id(data.id())?;
    Ok((id.zone, id.outer, id.inner))
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let server_ref = data.get_string("server_id");
    let zone = match parse_zoned_id_lenient(&server_ref)? {
        (Some(zone), _) => zone,
        (None, _) => meta.zone_of(data)?,
    };
    let server_id = expand_id(&server_ref).to_owned();
    let network = reference(data, "private_network_id").unwrap_or_default();
    let ipam_ip_ids = data
        .get_string_list("ipam_ip_ids")
        .iter()
        .map(|id| expand_id(id).to_owned())
        .collect();

    let mut handler =
        PrivateNicHandler::new(meta, zone, &server_id, data.timeouts().create).await?;
    if handler.get(&network).is_some() {
        return Err(ProviderError::validation(
            "private_network_id",
            format!("server {server_id} is already attached to private network {network}"),
        ));
    }
    let nic = handler
        .attach(&network, data.get_string_list("tags"), ipam_ip_ids)
        .await?;
    data.set_id(new_nested_zoned_id(zone, &server_id, &nic.id));
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, server_id, nic_id) = locate_nic(data)?;
    let lookup = meta
        .instance
        .get_private_nic(zone, &server_id, &nic_id)
        .await;
    let Some(nic) = found(lookup, data)? else {
        return Ok(());
    };
    flatten_private_nic(data, zone, &nic);
    Ok(())
}

/// Writes every attribute of a private NIC into `data`.
pub(crate) fn flatten_private_nic(data: &mut ResourceData, zone: Zone, nic: &PrivateNic) {
    data.set("server_id", new_zoned_id(zone, &nic.server_id));
    data.set(
        "private_network_id",
        new_regional_id(zone.region(), &nic.private_network_id),
    );
    data.set("mac_address", nic.mac_address.as_str());
    data.set("status", nic.state.as_str());
    data.set("tags", string_array(nic.tags.iter().cloned()));
    data.set("zone", zone.as_str());
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, server_id, nic_id) = locate_nic(data)?;
    if let Some(tags) = changed_tags(data) {
        let request = UpdatePrivateNicRequest { tags: Some(tags) };
        meta.instance
            .update_private_nic(zone, &server_id, &nic_id, &request)
            .await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, server_id, nic_id) = locate_nic(data)?;
    delete_private_nic(meta, zone, &server_id, &nic_id, data.timeouts().delete).await?;
    info!(%zone, %server_id, %nic_id, "private NIC deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::{Provider, ProviderError};
    use crate::test_support::FakeCloud;

    const NIC: &str = "scaleway_instance_private_nic";
    const NETWORK: &str = "fr-par/33333333-3333-4333-8333-333333333333";

    async fn create(provider: &Provider, name: &str, config: Value) -> (String, Value) {
        let plan = provider.plan(name, None, config).await.expect("plan");
        provider
            .apply(name, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    async fn server(provider: &Provider) -> String {
        create(
            provider,
            "scaleway_instance_server",
            json!({"type": "DEV1-S", "image": "ubuntu_jammy"}),
        )
        .await
        .0
    }

    #[rstest]
    #[tokio::test]
    async fn nic_id_nests_the_server() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let server_id = server(&provider).await;

        let (id, state) = create(
            &provider,
            NIC,
            json!({"server_id": server_id, "private_network_id": NETWORK, "tags": ["a"]}),
        )
        .await;

        let bare_server = server_id.trim_start_matches("fr-par-1/");
        assert!(id.starts_with(&format!("fr-par-1/{bare_server}/")), "{id}");
        assert_eq!(state["private_network_id"], json!(NETWORK));
        assert_eq!(state["status"], json!("available"));
        assert!(state["mac_address"].as_str().is_some_and(|mac| !mac.is_empty()));
        assert_eq!(cloud.private_nics(bare_server).len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn a_second_nic_on_the_same_network_is_rejected() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let server_id = server(&provider).await;
        let config = json!({"server_id": server_id, "private_network_id": NETWORK});
        create(&provider, NIC, config.clone()).await;

        let plan = provider.plan(NIC, None, config).await.expect("plan");
        let err = provider
            .apply(NIC, None, Some(plan.planned))
            .await
            .expect_err("duplicate");

        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_a_missing_nic_succeeds() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let server_id = server(&provider).await;
        let (id, state) = create(
            &provider,
            NIC,
            json!({"server_id": server_id, "private_network_id": NETWORK}),
        )
        .await;
        provider
            .apply(NIC, Some((&id, &state)), None)
            .await
            .expect("first delete");

        provider
            .apply(NIC, Some((&id, &state)), None)
            .await
            .expect("second delete");

        let bare_server = server_id.trim_start_matches("fr-par-1/");
        assert!(cloud.private_nics(bare_server).is_empty());
    }
}
