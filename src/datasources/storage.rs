//! Volume, snapshot and image lookups.

use crate::locality::Zone;
use crate::provider::{DataSource, Meta, ProviderError, ResourceData, ResourceFuture, Schema};
use crate::resources::{
    ImageResource, SnapshotResource, VolumeResource, flatten_image, flatten_snapshot,
    flatten_volume,
};
use crate::scaleway::{Image, ListFilter, Volume};
use crate::volume::{UnknownSnapshot, get_unknown_snapshot};

use super::{identify, lookup_of, lookup_schema, project_filter, resolve, zoned_lookups};

/// `data.scaleway_instance_volume`.
pub struct VolumeDataSource;

impl DataSource for VolumeDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(&VolumeResource, zoned_lookups("volume_id"))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_volume(meta, data))
    }
}

async fn read_volume(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, lookup) = lookup_of(meta, data, "volume_id")?;
    let volume = resolve(
        "volume",
        lookup,
        project_filter(data),
        |id| async move { meta.instance.get_volume(zone, &id).await },
        |filter| async move { meta.instance.list_volumes(zone, &filter).await },
        |volume: &Volume| volume.name.as_str(),
    )
    .await?;
    identify(data, "volume_id", volume.zone, &volume.id);
    flatten_volume(data, &volume);
    Ok(())
}

/// `data.scaleway_instance_snapshot`.
///
/// Name lookups search instance and block snapshots alike.
pub struct SnapshotDataSource;

impl DataSource for SnapshotDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(&SnapshotResource, zoned_lookups("snapshot_id"))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_snapshot(meta, data))
    }
}

async fn list_unknown_snapshots(
    meta: &Meta,
    zone: Zone,
    filter: ListFilter,
) -> Result<Vec<UnknownSnapshot>, ProviderError> {
    let mut snapshots: Vec<UnknownSnapshot> = meta
        .instance
        .list_snapshots(zone, &filter)
        .await?
        .into_iter()
        .map(UnknownSnapshot::from)
        .collect();
    snapshots.extend(
        meta.block
            .list_block_snapshots(zone, &filter)
            .await?
            .into_iter()
            .map(UnknownSnapshot::from),
    );
    Ok(snapshots)
}

async fn read_snapshot(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, lookup) = lookup_of(meta, data, "snapshot_id")?;
    let snapshot = resolve(
        "snapshot",
        lookup,
        project_filter(data),
        |id| async move { get_unknown_snapshot(meta, zone, &id).await },
        |filter| list_unknown_snapshots(meta, zone, filter),
        |snapshot: &UnknownSnapshot| snapshot.name.as_str(),
    )
    .await?;
    identify(data, "snapshot_id", snapshot.zone, &snapshot.id);
    flatten_snapshot(data, &snapshot);
    Ok(())
}

/// `data.scaleway_instance_image`.
pub struct ImageDataSource;

impl DataSource for ImageDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(&ImageResource, zoned_lookups("image_id"))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_image(meta, data))
    }
}

async fn read_image(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, lookup) = lookup_of(meta, data, "image_id")?;
    let image = resolve(
        "image",
        lookup,
        project_filter(data),
        |id| async move { meta.instance.get_image(zone, &id).await },
        |filter| async move { meta.instance.list_images(zone, &filter).await },
        |image: &Image| image.name.as_str(),
    )
    .await?;
    identify(data, "image_id", image.zone, &image.id);
    flatten_image(data, &image);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::{Provider, ProviderError};
    use crate::test_support::FakeCloud;

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
    async fn volume_is_found_by_name_or_id() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let (id, _) = create(
            &provider,
            "scaleway_instance_volume",
            json!({"name": "data", "size_in_gb": 10}),
        )
        .await;
        create(
            &provider,
            "scaleway_instance_volume",
            json!({"name": "data-backup", "size_in_gb": 10}),
        )
        .await;

        for config in [json!({"name": "data"}), json!({"volume_id": id})] {
            let (found, state) = provider
                .read_data_source("scaleway_instance_volume", config)
                .await
                .expect("lookup")
                .state
                .expect("state");
            assert_eq!(found, id);
            assert_eq!(state["size_in_gb"], json!(10));
            assert_eq!(state["name"], json!("data"));
        }
    }

    #[rstest]
    #[tokio::test]
    async fn block_snapshots_are_found_by_name() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        create(
            &provider,
            "scaleway_instance_snapshot",
            json!({
                "name": "imported",
                "type": "sbs_snapshot",
                "import": [{"bucket": "bucket", "key": "disk.qcow2"}],
            }),
        )
        .await;

        let (_, state) = provider
            .read_data_source("scaleway_instance_snapshot", json!({"name": "imported"}))
            .await
            .expect("lookup")
            .state
            .expect("state");

        assert_eq!(state["type"], json!("sbs_snapshot"));
    }

    #[rstest]
    #[tokio::test]
    async fn a_lookup_key_is_required() {
        let cloud = FakeCloud::new();

        let err = cloud
            .provider()
            .read_data_source("scaleway_instance_image", json!({}))
            .await
            .expect_err("no key");

        assert!(matches!(err, ProviderError::Validation { .. }));
    }
}
