//! `scaleway_instance_snapshot`.
//!
//! A snapshot is taken from a volume of either backend, or imported from
//! object storage. The backend is never configured: it follows the volume,
//! or the `type` for imports, where `sbs_snapshot` selects Block Storage.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::locality::{Zone, new_zoned_id};
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Timeouts,
    Validation,
};
use crate::scaleway::{
    CreateSnapshotRequest, ImportBlockSnapshotRequest, ObjectLocation, SnapshotVolumeType,
    UpdateBlockSnapshotRequest, UpdateSnapshotRequest, bytes_to_gb,
};
use crate::volume::{
    SnapshotBackend, SnapshotSpec, UnknownSnapshot, create_snapshot_from_unknown_volume,
    get_unknown_snapshot, get_unknown_volume,
};
use crate::waiter::{wait_for_block_snapshot, wait_for_instance_snapshot};

use super::{
    changed_name, changed_tags, locality_attributes, locate, name_or_generate, reference,
    set_locality, string_array, tolerate_not_found,
};

/// `type` of Block Storage snapshots.
pub(crate) const BLOCK_SNAPSHOT_TYPE: &str = "sbs_snapshot";

/// `scaleway_instance_snapshot`.
pub struct SnapshotResource;

fn import_block() -> Attribute {
    Attribute::block(
        "import",
        vec![
            Attribute::string("bucket").required().validate(Validation::NonEmpty),
            Attribute::string("key").required().validate(Validation::NonEmpty),
        ],
    )
    .force_new()
    .max_items(1)
    .conflicts_with(&["volume_id"])
}

impl Resource for SnapshotResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("name").computed(),
            Attribute::string("volume_id")
                .force_new()
                .validate(Validation::ZonedUuid),
            Attribute::string("type")
                .computed()
                .force_new()
                .validate(Validation::OneOf(&["l_ssd", "b_ssd", "unified", BLOCK_SNAPSHOT_TYPE])),
            Attribute::int("size_in_gb").computed_only(),
            import_block(),
            Attribute::list("tags"),
        ];
        attributes.extend(locality_attributes());
        Schema::new(attributes)
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::image()
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

#[derive(Debug, Deserialize)]
struct ImportSource {
    bucket: String,
    key: String,
}

fn import_source(data: &ResourceData) -> Result<Option<ObjectLocation>, ProviderError> {
    let Some(block) = data.get("import.0") else {
        return Ok(None);
    };
    let source: ImportSource = serde_json::from_value(block.clone())
        .map_err(|err| ProviderError::validation("import.0", err.to_string()))?;
    Ok(Some(ObjectLocation {
        bucket: source.bucket,
        key: source.key,
    }))
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let timeout = data.timeouts().create;
    let spec = SnapshotSpec {
        name: name_or_generate(data, "snp"),
        project: meta.project_of(data),
        tags: data.get_string_list("tags"),
        volume_type: data.get_ok_str("type").and_then(SnapshotVolumeType::parse),
    };
    let requested_type = data.get_ok_str("type").map(str::to_owned);

    let snapshot = match (reference(data, "volume_id"), import_source(data)?) {
        (Some(_), Some(_)) => {
            return Err(ProviderError::validation("import", "conflicts with volume_id"));
        }
        (Some(volume_id), None) => {
            let volume = get_unknown_volume(meta, zone, &volume_id).await?;
            let wants_block = requested_type.as_deref() == Some(BLOCK_SNAPSHOT_TYPE);
            if requested_type.is_some() && wants_block != volume.is_block_volume() {
                return Err(ProviderError::validation(
                    "type",
                    format!("volume {volume_id} cannot produce a snapshot of this type"),
                ));
            }
            create_snapshot_from_unknown_volume(meta, &volume, &spec, timeout).await?
        }
        (None, Some(location)) => {
            import_snapshot(meta, zone, &spec, requested_type.as_deref(), location, timeout)
                .await?
        }
        (None, None) => {
            return Err(ProviderError::validation(
                "volume_id",
                "one of volume_id or import is required",
            ));
        }
    };
    data.set_id(new_zoned_id(zone, &snapshot.id));
    info!(%zone, snapshot_id = %snapshot.id, snapshot_type = snapshot.type_name(), "snapshot created");
    read(meta, data).await
}

async fn import_snapshot(
    meta: &Meta,
    zone: Zone,
    spec: &SnapshotSpec,
    requested_type: Option<&str>,
    location: ObjectLocation,
    timeout: Duration,
) -> Result<UnknownSnapshot, ProviderError> {
    let options = meta.wait_options(timeout);
    if requested_type == Some(BLOCK_SNAPSHOT_TYPE) {
        let request = ImportBlockSnapshotRequest {
            location,
            name: spec.name.clone(),
            project_id: spec.project.clone(),
            tags: spec.tags.clone(),
        };
        let created = meta.block.import_block_snapshot(zone, &request).await?;
        let settled =
            wait_for_block_snapshot(meta.block.as_ref(), zone, &created.id, options).await?;
        return Ok(settled.into());
    }
    let request = CreateSnapshotRequest {
        name: spec.name.clone(),
        volume_type: Some(spec.volume_type.unwrap_or(SnapshotVolumeType::Unified)),
        bucket: Some(location.bucket),
        key: Some(location.key),
        project: spec.project.clone(),
        tags: spec.tags.clone(),
        ..CreateSnapshotRequest::default()
    };
    let created = meta.instance.create_snapshot(zone, &request).await?;
    let settled =
        wait_for_instance_snapshot(meta.instance.as_ref(), zone, &created.id, options).await?;
    Ok(settled.into())
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let snapshot = match get_unknown_snapshot(meta, zone, &id).await {
        Ok(snapshot) => snapshot,
        Err(err) if err.is_not_found() => {
            data.clear_id();
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    flatten_snapshot(data, &snapshot);
    Ok(())
}

/// Writes every attribute of a snapshot of either backend into `data`.
pub(crate) fn flatten_snapshot(data: &mut ResourceData, snapshot: &UnknownSnapshot) {
    data.set("name", snapshot.name.as_str());
    data.set("type", snapshot.type_name());
    data.set("size_in_gb", bytes_to_gb(snapshot.size));
    data.set("tags", string_array(snapshot.tags.iter().cloned()));
    if let Some(volume_id) = &snapshot.volume_id {
        data.set("volume_id", new_zoned_id(snapshot.zone, volume_id));
    }
    set_locality(data, snapshot.zone, &snapshot.project);
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let name = changed_name(data);
    let tags = changed_tags(data);
    if name.is_some() || tags.is_some() {
        let snapshot = get_unknown_snapshot(meta, zone, &id).await?;
        match snapshot.backend {
            SnapshotBackend::Instance(_) => {
                let request = UpdateSnapshotRequest { name, tags };
                meta.instance.update_snapshot(zone, &id, &request).await?;
            }
            SnapshotBackend::Block => {
                let request = UpdateBlockSnapshotRequest { name, tags };
                meta.block.update_block_snapshot(zone, &id, &request).await?;
            }
        }
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let options = meta.wait_options(data.timeouts().delete);
    let snapshot = match get_unknown_snapshot(meta, zone, &id).await {
        Ok(snapshot) => snapshot,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err),
    };
    match snapshot.backend {
        SnapshotBackend::Instance(_) => {
            wait_for_instance_snapshot(meta.instance.as_ref(), zone, &id, options).await?;
            tolerate_not_found(meta.instance.delete_snapshot(zone, &id).await)?;
        }
        SnapshotBackend::Block => {
            wait_for_block_snapshot(meta.block.as_ref(), zone, &id, options).await?;
            tolerate_not_found(meta.block.delete_block_snapshot(zone, &id).await)?;
        }
    }
    info!(%zone, snapshot_id = %id, "snapshot deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::{Provider, ProviderError};
    use crate::test_support::FakeCloud;

    const SNAPSHOT: &str = "scaleway_instance_snapshot";
    const VOLUME: &str = "scaleway_instance_volume";

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
    async fn snapshot_type_follows_the_volume() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let (volume_id, _) = create(&provider, VOLUME, json!({"size_in_gb": 10})).await;

        let (_, state) = create(&provider, SNAPSHOT, json!({"volume_id": volume_id})).await;

        assert_eq!(state["type"], json!("b_ssd"));
        assert_eq!(state["size_in_gb"], json!(10));
        assert_eq!(state["volume_id"], json!(volume_id));
    }

    #[rstest]
    #[case(json!(null), "unified")]
    #[case(json!("sbs_snapshot"), "sbs_snapshot")]
    #[tokio::test]
    async fn imports_pick_the_backend_from_the_type(
        #[case] requested: Value,
        #[case] expected: &str,
    ) {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();

        let (_, state) = create(
            &provider,
            SNAPSHOT,
            json!({"type": requested, "import": [{"bucket": "backups", "key": "disk.qcow2"}]}),
        )
        .await;

        assert_eq!(state["type"], json!(expected));
    }

    #[rstest]
    #[tokio::test]
    async fn a_source_is_required() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let plan = provider
            .plan(SNAPSHOT, None, json!({}))
            .await
            .expect("plan");

        let err = provider
            .apply(SNAPSHOT, None, Some(plan.planned))
            .await
            .expect_err("no source");

        assert!(matches!(err, ProviderError::Validation { field, .. } if field == "volume_id"));
        assert!(cloud.mutating_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn renaming_updates_in_place() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let (volume_id, _) = create(&provider, VOLUME, json!({"size_in_gb": 10})).await;
        let config = json!({"volume_id": volume_id, "name": "before"});
        let (id, state) = create(&provider, SNAPSHOT, config).await;

        let plan = provider
            .plan(
                SNAPSHOT,
                Some((&id, &state)),
                json!({"volume_id": volume_id, "name": "after"}),
            )
            .await
            .expect("plan");
        assert!(plan.requires_replace.is_empty());
        let applied = provider
            .apply(SNAPSHOT, Some((&id, &state)), Some(plan.planned))
            .await
            .expect("update");

        let (_, updated) = applied.state.expect("state");
        assert_eq!(updated["name"], json!("after"));
    }
}
