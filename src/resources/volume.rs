//! `scaleway_instance_volume`.

use serde_json::Value;
use tracing::info;

use crate::locality::new_zoned_id;
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Timeouts,
    Validation,
};
use crate::scaleway::{
    CreateVolumeRequest, UpdateVolumeRequest, Volume, VolumeType, bytes_to_gb, gb_to_bytes,
};
use crate::volume::{UnknownVolume, resize_unknown_volume};
use crate::waiter::{wait_for_instance_volume, wait_for_instance_volume_deleted};

use super::{
    changed_name, changed_tags, found, locality_attributes, locate, name_or_generate, reference,
    set_locality, string_array, tolerate_not_found,
};

/// `scaleway_instance_volume`.
pub struct VolumeResource;

impl Resource for VolumeResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("name").computed(),
            Attribute::string("type")
                .default_value("b_ssd")
                .force_new()
                .validate(Validation::OneOf(&["l_ssd", "b_ssd", "scratch"])),
            Attribute::int("size_in_gb")
                .computed()
                .validate(Validation::Positive)
                .conflicts_with(&["from_snapshot_id"]),
            Attribute::string("from_snapshot_id")
                .force_new()
                .validate(Validation::ZonedUuid),
            Attribute::string("server_id").computed_only(),
            Attribute::list("tags"),
        ];
        attributes.extend(locality_attributes());
        Schema::new(attributes)
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::server()
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

fn volume_request(data: &ResourceData, project: String) -> Result<CreateVolumeRequest, ProviderError> {
    let volume_type = data.get_ok_str("type").and_then(VolumeType::parse);
    let mut request = CreateVolumeRequest {
        name: name_or_generate(data, "vol"),
        project,
        volume_type,
        tags: data.get_string_list("tags"),
        ..CreateVolumeRequest::default()
    };
    match (data.get_ok_u64("size_in_gb"), reference(data, "from_snapshot_id")) {
        (Some(_), Some(_)) => {
            return Err(ProviderError::validation(
                "size_in_gb",
                "conflicts with from_snapshot_id",
            ));
        }
        (Some(size), None) => request.size = Some(gb_to_bytes(size)),
        (None, Some(snapshot)) => request.base_snapshot = Some(snapshot),
        (None, None) => {
            return Err(ProviderError::validation(
                "size_in_gb",
                "size_in_gb is required unless from_snapshot_id is set",
            ));
        }
    }
    Ok(request)
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let request = volume_request(data, meta.project_of(data))?;
    let created = meta.instance.create_volume(zone, &request).await?;
    data.set_id(new_zoned_id(zone, &created.id));
    info!(%zone, volume_id = %created.id, "volume created");
    wait_for_instance_volume(
        meta.instance.as_ref(),
        zone,
        &created.id,
        meta.wait_options(data.timeouts().create),
    )
    .await?;
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let Some(volume) = found(meta.instance.get_volume(zone, &id).await, data)? else {
        return Ok(());
    };
    flatten_volume(data, &volume);
    Ok(())
}

/// Writes every attribute of an instance volume into `data`.
pub(crate) fn flatten_volume(data: &mut ResourceData, volume: &Volume) {
    data.set("name", volume.name.as_str());
    data.set("type", volume.volume_type.as_str());
    data.set("size_in_gb", bytes_to_gb(volume.size));
    data.set("tags", string_array(volume.tags.iter().cloned()));
    data.set(
        "server_id",
        volume.server.as_ref().map_or(Value::Null, |server| {
            Value::String(new_zoned_id(volume.zone, &server.id))
        }),
    );
    set_locality(data, volume.zone, &volume.project);
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let request = UpdateVolumeRequest {
        name: changed_name(data),
        tags: changed_tags(data),
        ..UpdateVolumeRequest::default()
    };
    if request.name.is_some() || request.tags.is_some() {
        meta.instance.update_volume(zone, &id, &request).await?;
    }
    if data.has_change("size_in_gb")
        && let Some(size) = data.get_ok_u64("size_in_gb")
    {
        let volume: UnknownVolume = meta.instance.get_volume(zone, &id).await?.into();
        resize_unknown_volume(meta, &volume, gb_to_bytes(size), data.timeouts().update).await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let options = meta.wait_options(data.timeouts().delete);
    let volume = match wait_for_instance_volume(meta.instance.as_ref(), zone, &id, options).await {
        Ok(volume) => volume,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if let Some(server) = volume.server {
        return Err(ProviderError::volume(
            &id,
            format!("volume is attached to server {}", server.id),
        ));
    }
    tolerate_not_found(meta.instance.delete_volume(zone, &id).await)?;
    wait_for_instance_volume_deleted(meta.instance.as_ref(), zone, &id, options).await?;
    info!(%zone, volume_id = %id, "volume deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use crate::provider::ProviderError;
    use crate::test_support::FakeCloud;

    const VOLUME: &str = "scaleway_instance_volume";

    async fn create(cloud: &FakeCloud, config: serde_json::Value) -> (String, serde_json::Value) {
        let provider = cloud.provider();
        let plan = provider.plan(VOLUME, None, config).await.expect("plan");
        provider
            .apply(VOLUME, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    #[rstest]
    #[tokio::test]
    async fn sized_volume_is_created_without_a_snapshot() {
        let cloud = FakeCloud::new();
        let (id, state) = create(&cloud, json!({"size_in_gb": 20})).await;

        assert!(id.starts_with("fr-par-1/"));
        assert_eq!(state["size_in_gb"], json!(20));
        assert_eq!(state["type"], json!("b_ssd"));
        assert_eq!(state["server_id"], json!(null));
    }

    #[rstest]
    #[tokio::test]
    async fn size_and_snapshot_conflict() {
        let cloud = FakeCloud::new();
        let err = cloud
            .provider()
            .plan(
                VOLUME,
                None,
                json!({
                    "size_in_gb": 20,
                    "from_snapshot_id": "fr-par-1/22222222-2222-4222-8222-222222222222",
                }),
            )
            .await
            .expect_err("conflict");

        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[rstest]
    #[case(30, None)]
    #[case(10, Some("cannot be resized down"))]
    #[tokio::test]
    async fn block_volumes_only_grow(#[case] size: u64, #[case] failure: Option<&str>) {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let (id, state) = create(&cloud, json!({"size_in_gb": 20})).await;
        let plan = provider
            .plan(VOLUME, Some((&id, &state)), json!({"size_in_gb": size}))
            .await
            .expect("plan");

        let outcome = provider
            .apply(VOLUME, Some((&id, &state)), Some(plan.planned))
            .await;

        match failure {
            None => {
                let (_, updated) = outcome.expect("resize").state.expect("state");
                assert_eq!(updated["size_in_gb"], json!(size));
            }
            Some(message) => {
                let err = outcome.expect_err("shrink");
                assert!(err.to_string().contains(message), "{err}");
                assert!(cloud.calls_matching("update_volume").is_empty());
            }
        }
    }

    #[rstest]
    #[tokio::test]
    async fn local_volumes_cannot_be_resized() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let config = json!({"size_in_gb": 20, "type": "l_ssd"});
        let (id, state) = create(&cloud, config).await;
        let plan = provider
            .plan(
                VOLUME,
                Some((&id, &state)),
                json!({"size_in_gb": 25, "type": "l_ssd"}),
            )
            .await
            .expect("plan");

        let err = provider
            .apply(VOLUME, Some((&id, &state)), Some(plan.planned))
            .await
            .expect_err("l_ssd resize");

        assert!(matches!(err, ProviderError::Volume { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_removes_a_detached_volume() {
        let cloud = FakeCloud::new();
        let (id, state) = create(&cloud, json!({"size_in_gb": 5})).await;

        cloud
            .provider()
            .apply(VOLUME, Some((&id, &state)), None)
            .await
            .expect("delete");

        let bare = id.split_once('/').map(|(_, bare)| bare).unwrap_or_default();
        assert!(cloud.volume(bare).is_none());
    }
}
