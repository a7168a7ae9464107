//! `scaleway_instance_ip`.
//!
//! The Instance API reports released IPs as 403 rather than 404, so every
//! lookup here treats both the same way.

use serde_json::Value;
use tracing::info;

use crate::locality::new_zoned_id;
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::scaleway::{ApiError, CreateIpRequest, Ip, IpType, UpdateIpRequest};

use super::ip_reverse_dns::update_reverse;
use super::{changed_tags, locality_attributes, locate, parse_enum, set_locality, string_array};

/// `scaleway_instance_ip`.
pub struct IpResource;

impl Resource for IpResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("address").computed_only(),
            Attribute::string("prefix").computed_only(),
            Attribute::string("reverse").computed(),
            Attribute::string("type")
                .computed()
                .force_new()
                .validate(Validation::OneOf(&["nat", "routed_ipv4", "routed_ipv6"])),
            Attribute::string("server_id").computed_only(),
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

/// Whether an IP lookup failure means the IP is gone.
pub(crate) const fn ip_gone(err: &ApiError) -> bool {
    err.is_not_found() || err.is_forbidden()
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let request = CreateIpRequest {
        project: meta.project_of(data),
        tags: data.get_string_list("tags"),
        server: None,
        ip_type: parse_enum(data, "type", IpType::parse)?,
    };
    let created = meta.instance.create_ip(zone, &request).await?;
    data.set_id(new_zoned_id(zone, &created.id));
    info!(%zone, ip_id = %created.id, address = %created.address, "IP reserved");

    if let Some(reverse) = data.get_ok_str("reverse").map(str::to_owned) {
        update_reverse(meta, zone, &created.id, Some(reverse), data.timeouts().create).await?;
    }
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let ip = match meta.instance.get_ip(zone, &id).await {
        Ok(ip) => ip,
        Err(err) if ip_gone(&err) => {
            data.clear_id();
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    flatten_ip(data, &ip);
    Ok(())
}

/// Writes every attribute of a flexible IP into `data`.
pub(crate) fn flatten_ip(data: &mut ResourceData, ip: &Ip) {
    data.set("address", ip.address.as_str());
    data.set(
        "prefix",
        ip.prefix.clone().map_or(Value::Null, Value::String),
    );
    data.set(
        "reverse",
        ip.reverse.clone().map_or(Value::Null, Value::String),
    );
    data.set("type", ip.ip_type.as_str());
    data.set(
        "server_id",
        ip.server.as_ref().map_or(Value::Null, |server| {
            Value::String(new_zoned_id(ip.zone, &server.id))
        }),
    );
    data.set("tags", string_array(ip.tags.iter().cloned()));
    set_locality(data, ip.zone, &ip.project);
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    if let Some(tags) = changed_tags(data) {
        let request = UpdateIpRequest {
            tags: Some(tags),
            ..UpdateIpRequest::default()
        };
        meta.instance.update_ip(zone, &id, &request).await?;
    }
    if data.has_change("reverse") {
        let reverse = data.get_ok_str("reverse").map(str::to_owned);
        update_reverse(meta, zone, &id, reverse, data.timeouts().update).await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    match meta.instance.delete_ip(zone, &id).await {
        Ok(()) => {
            info!(%zone, ip_id = %id, "IP released");
            Ok(())
        }
        Err(err) if ip_gone(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::Provider;
    use crate::test_support::FakeCloud;

    const IP: &str = "scaleway_instance_ip";

    async fn create(provider: &Provider, config: Value) -> (String, Value) {
        let plan = provider.plan(IP, None, config).await.expect("plan");
        provider
            .apply(IP, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    #[rstest]
    #[tokio::test]
    async fn reverse_is_set_after_reservation() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();

        let (id, state) = create(&provider, json!({"reverse": "www.example.com"})).await;

        let bare = id.trim_start_matches("fr-par-1/");
        assert_eq!(state["reverse"], json!("www.example.com"));
        assert_eq!(state["server_id"], json!(null));
        assert_eq!(
            cloud.calls_matching("update_ip"),
            vec![format!("update_ip {bare} reverse=www.example.com")]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn a_released_ip_is_read_as_gone() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let (id, state) = create(&provider, json!({})).await;
        provider
            .apply(IP, Some((&id, &state)), None)
            .await
            .expect("delete");

        let applied = provider.read(IP, &id, state).await.expect("read");

        assert!(applied.state.is_none());
    }
}
