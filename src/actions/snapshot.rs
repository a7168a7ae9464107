//! `scaleway_instance_create_snapshot` and `scaleway_instance_export_snapshot`.

use serde::Deserialize;
use tracing::info;

use crate::provider::{
    Action, Attribute, Meta, ProviderError, ResourceData, ResourceFuture, Schema, Timeouts,
    Validation,
};
use crate::resources::{name_or_generate, parse_enum};
use crate::scaleway::{ObjectLocation, SnapshotVolumeType};
use crate::volume::{
    SnapshotSpec, create_snapshot_from_unknown_volume, export_unknown_snapshot,
    get_unknown_snapshot, get_unknown_volume,
};

use super::target;

/// Snapshots any volume, whichever API owns it. Scratch volumes are
/// rejected.
pub struct CreateSnapshotAction;

#[derive(Debug, Deserialize)]
struct CreateSnapshotInput {
    volume_id: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl Action for CreateSnapshotAction {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("volume_id")
                .required()
                .validate(Validation::ZonedUuid),
            Attribute::string("name"),
            Attribute::string("type")
                .validate(Validation::OneOf(&["l_ssd", "b_ssd", "unified"]))
                .describe("Restore type of an instance snapshot"),
            Attribute::list("tags"),
            Attribute::string("zone").validate(Validation::Zone),
            Attribute::string("project_id"),
        ])
    }

    fn invoke<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(create_snapshot(meta, data))
    }
}

async fn create_snapshot(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let input: CreateSnapshotInput = data.decode()?;
    let (zone, volume_id) = target(meta, data, &input.volume_id)?;
    let spec = SnapshotSpec {
        name: name_or_generate(data, "snp"),
        project: meta.project_of(data),
        tags: input.tags,
        volume_type: parse_enum(data, "type", SnapshotVolumeType::parse)?,
    };
    let volume = get_unknown_volume(meta, zone, &volume_id).await?;
    let snapshot =
        create_snapshot_from_unknown_volume(meta, &volume, &spec, Timeouts::image().create)
            .await?;
    info!(%zone, %volume_id, snapshot_id = %snapshot.id, "snapshot action completed");
    Ok(())
}

/// Exports a snapshot of either backend to an object-storage location.
pub struct ExportSnapshotAction;

#[derive(Debug, Deserialize)]
struct ExportSnapshotInput {
    snapshot_id: String,
    bucket: String,
    key: String,
}

impl Action for ExportSnapshotAction {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("snapshot_id")
                .required()
                .validate(Validation::ZonedUuid),
            Attribute::string("bucket")
                .required()
                .validate(Validation::NonEmpty),
            Attribute::string("key")
                .required()
                .validate(Validation::NonEmpty),
            Attribute::string("zone").validate(Validation::Zone),
        ])
    }

    fn invoke<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(export_snapshot(meta, data))
    }
}

async fn export_snapshot(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let input: ExportSnapshotInput = data.decode()?;
    let (zone, snapshot_id) = target(meta, data, &input.snapshot_id)?;
    let snapshot = get_unknown_snapshot(meta, zone, &snapshot_id).await?;
    let location = ObjectLocation {
        bucket: input.bucket,
        key: input.key,
    };
    export_unknown_snapshot(meta, &snapshot, &location, Timeouts::image().create).await
}
