//! `scaleway_instance_user_data`.
//!
//! One key of a server's user-data, identified by `zone/server_id/key`.

use tracing::info;

use crate::locality::{
    Zone, expand_id, new_nested_zoned_id, new_zoned_id, parse_nested_zoned_id,
    parse_zoned_id_lenient,
};
use crate::provider::{
    Attribute, ImportFormat, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema,
    Validation,
};

use super::{found, tolerate_not_found};

/// `scaleway_instance_user_data`.
pub struct UserDataResource;

impl Resource for UserDataResource {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("server_id")
                .required()
                .force_new()
                .validate(Validation::ZonedUuid),
            Attribute::string("key")
                .required()
                .force_new()
                .validate(Validation::NonEmpty),
            Attribute::string("value").required(),
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

fn locate_key(data: &ResourceData) -> Result<(Zone, String, String), ProviderError> {
    let id = parse_nested_zoned_id(data.id())?;
    Ok((id.zone, id.outer, id.inner))
}

async fn write(meta: &Meta, data: &ResourceData) -> Result<(), ProviderError> {
    let (zone, server_id, key) = locate_key(data)?;
    let value = data.get_string("value");
    meta.instance
        .set_server_user_data(zone, &server_id, &key, &value)
        .await?;
    info!(%zone, %server_id, %key, "user data written");
    Ok(())
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let server_ref = data.get_string("server_id");
    let zone = match parse_zoned_id_lenient(&server_ref)? {
        (Some(zone), _) => zone,
        (None, _) => meta.zone_of(data)?,
    };
    let key = data.get_string("key");
    data.set_id(new_nested_zoned_id(zone, expand_id(&server_ref), &key));
    write(meta, data).await?;
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, server_id, key) = locate_key(data)?;
    let lookup = meta
        .instance
        .get_server_user_data(zone, &server_id, &key)
        .await;
    let Some(value) = found(lookup, data)? else {
        return Ok(());
    };
    data.set("server_id", new_zoned_id(zone, &server_id));
    data.set("key", key);
    data.set("value", value);
    data.set("zone", zone.as_str());
    Ok(())
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    if data.has_change("value") {
        write(meta, data).await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, server_id, key) = locate_key(data)?;
    tolerate_not_found(
        meta.instance
            .delete_server_user_data(zone, &server_id, &key)
            .await,
    )?;
    info!(%zone, %server_id, %key, "user data deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::Provider;
    use crate::test_support::FakeCloud;

    const USER_DATA: &str = "scaleway_instance_user_data";

    async fn create(provider: &Provider, name: &str, config: Value) -> (String, Value) {
        let plan = provider.plan(name, None, config).await.expect("plan");
        provider
            .apply(name, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    #[rstest]
    #[tokio::test]
    async fn delete_removes_only_its_key() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let (server, _) = create(
            &provider,
            "scaleway_instance_server",
            json!({"type": "DEV1-S", "image": "ubuntu_jammy"}),
        )
        .await;
        let bare = server.trim_start_matches("fr-par-1/").to_owned();
        let (first, first_state) = create(
            &provider,
            USER_DATA,
            json!({"server_id": server, "key": "foo", "value": "bar"}),
        )
        .await;
        create(
            &provider,
            USER_DATA,
            json!({"server_id": server, "key": "other", "value": "kept"}),
        )
        .await;
        assert_eq!(first, format!("fr-par-1/{bare}/foo"));

        provider
            .apply(USER_DATA, Some((&first, &first_state)), None)
            .await
            .expect("delete");

        let remaining = cloud.user_data(&bare);
        assert_eq!(remaining.keys().collect::<Vec<_>>(), ["other"]);
    }

    #[rstest]
    #[tokio::test]
    async fn import_rejects_bare_keys() {
        let cloud = FakeCloud::new();

        let outcome = cloud.provider().import(USER_DATA, "foo").await;

        assert!(outcome.is_err());
    }
}
