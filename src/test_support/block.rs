//! [`BlockApi`] and [`MarketplaceApi`] over the in-memory state.

use crate::locality::Zone;
use crate::scaleway::{
    ApiError, ApiFuture, BlockApi, BlockSnapshot, BlockSnapshotStatus, BlockVolume,
    BlockVolumeSource, BlockVolumeStatus, CreateBlockSnapshotRequest, CreateBlockVolumeRequest,
    GB, ImportBlockSnapshotRequest, ListFilter, LocalImage, LocalImageQuery, MarketplaceApi,
    ObjectLocation, SnapshotParentVolume, StorageClass, UpdateBlockSnapshotRequest,
    UpdateBlockVolumeRequest, VolumeSpecifications,
};

use super::{FakeCloud, new_id, pending};

const DEFAULT_IOPS: u32 = 5000;
const IMPORTED_SNAPSHOT_SIZE: u64 = 10 * GB;

impl BlockApi for FakeCloud {
    fn get_block_volume<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, BlockVolume> {
        pending(self.call("get_block_volume", format!("get_block_volume {id}"), |state| {
            state
                .block_volumes
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::not_found("block_volume", id))
        }))
    }

    fn list_block_volumes<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<BlockVolume>> {
        pending(self.call(
            "list_block_volumes",
            String::from("list_block_volumes"),
            |state| {
                Ok(state
                    .block_volumes
                    .values()
                    .filter(|volume| filter.matches(&volume.name, &volume.project_id, &volume.tags))
                    .cloned()
                    .collect())
            },
        ))
    }

    fn create_block_volume<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateBlockVolumeRequest,
    ) -> ApiFuture<'a, BlockVolume> {
        pending(self.call(
            "create_block_volume",
            format!("create_block_volume {}", request.name),
            |state| {
                let size = match &request.source {
                    BlockVolumeSource::FromEmpty { size } => *size,
                    BlockVolumeSource::FromSnapshot { snapshot_id, size } => {
                        let snapshot = state
                            .block_snapshots
                            .get(snapshot_id)
                            .ok_or_else(|| ApiError::not_found("block_snapshot", snapshot_id))?;
                        size.unwrap_or(snapshot.size)
                    }
                };
                let volume = BlockVolume {
                    id: new_id(),
                    name: request.name.clone(),
                    size,
                    volume_type: String::from("sbs_5k"),
                    status: BlockVolumeStatus::Available,
                    references: Vec::new(),
                    specs: VolumeSpecifications {
                        perf_iops: Some(request.perf_iops.unwrap_or(DEFAULT_IOPS)),
                        class: Some(StorageClass::Sbs),
                    },
                    tags: request.tags.clone(),
                    zone,
                    project_id: request.project_id.clone(),
                };
                state.block_volumes.insert(volume.id.clone(), volume.clone());
                Ok(volume)
            },
        ))
    }

    fn update_block_volume<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateBlockVolumeRequest,
    ) -> ApiFuture<'a, BlockVolume> {
        pending(self.call(
            "update_block_volume",
            format!("update_block_volume {id}"),
            |state| {
                let volume = state
                    .block_volumes
                    .get_mut(id)
                    .ok_or_else(|| ApiError::not_found("block_volume", id))?;
                if let Some(size) = request.size {
                    if size < volume.size {
                        return Err(ApiError::InvalidArguments {
                            message: String::from("block volumes cannot be resized down"),
                            details: vec![(String::from("size"), String::from("must grow"))],
                        });
                    }
                    volume.size = size;
                }
                if let Some(iops) = request.perf_iops {
                    volume.specs.perf_iops = Some(iops);
                }
                if let Some(name) = &request.name {
                    volume.name.clone_from(name);
                }
                if let Some(tags) = &request.tags {
                    volume.tags.clone_from(tags);
                }
                Ok(volume.clone())
            },
        ))
    }

    fn delete_block_volume<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call(
            "delete_block_volume",
            format!("delete_block_volume {id}"),
            |state| {
                let volume = state
                    .block_volumes
                    .get(id)
                    .ok_or_else(|| ApiError::not_found("block_volume", id))?;
                if volume.attached_server().is_some() {
                    return Err(ApiError::PreconditionFailed {
                        message: String::from("volume is still attached"),
                    });
                }
                state.block_volumes.remove(id);
                Ok(())
            },
        ))
    }

    fn get_block_snapshot<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, BlockSnapshot> {
        pending(self.call(
            "get_block_snapshot",
            format!("get_block_snapshot {id}"),
            |state| {
                state
                    .block_snapshots
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found("block_snapshot", id))
            },
        ))
    }

    fn list_block_snapshots<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<BlockSnapshot>> {
        pending(self.call(
            "list_block_snapshots",
            String::from("list_block_snapshots"),
            |state| {
                Ok(state
                    .block_snapshots
                    .values()
                    .filter(|snapshot| {
                        filter.matches(&snapshot.name, &snapshot.project_id, &snapshot.tags)
                    })
                    .cloned()
                    .collect())
            },
        ))
    }

    fn create_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot> {
        pending(self.call(
            "create_block_snapshot",
            format!("create_block_snapshot {}", request.volume_id),
            |state| {
                let volume = state
                    .block_volumes
                    .get(&request.volume_id)
                    .ok_or_else(|| ApiError::not_found("block_volume", &request.volume_id))?;
                let snapshot = BlockSnapshot {
                    id: new_id(),
                    name: request.name.clone(),
                    size: volume.size,
                    status: BlockSnapshotStatus::Available,
                    parent_volume: Some(SnapshotParentVolume {
                        id: volume.id.clone(),
                        name: volume.name.clone(),
                    }),
                    tags: request.tags.clone(),
                    zone,
                    project_id: request.project_id.clone(),
                };
                state
                    .block_snapshots
                    .insert(snapshot.id.clone(), snapshot.clone());
                Ok(snapshot)
            },
        ))
    }

    fn import_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a ImportBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot> {
        pending(self.call(
            "import_block_snapshot",
            format!(
                "import_block_snapshot {}/{}",
                request.location.bucket, request.location.key
            ),
            |state| {
                let snapshot = BlockSnapshot {
                    id: new_id(),
                    name: request.name.clone(),
                    size: IMPORTED_SNAPSHOT_SIZE,
                    status: BlockSnapshotStatus::Available,
                    parent_volume: None,
                    tags: request.tags.clone(),
                    zone,
                    project_id: request.project_id.clone(),
                };
                state
                    .block_snapshots
                    .insert(snapshot.id.clone(), snapshot.clone());
                Ok(snapshot)
            },
        ))
    }

    fn export_block_snapshot<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        location: &'a ObjectLocation,
    ) -> ApiFuture<'a, BlockSnapshot> {
        pending(self.call(
            "export_block_snapshot",
            format!("export_block_snapshot {id} {}/{}", location.bucket, location.key),
            |state| {
                state
                    .block_snapshots
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found("block_snapshot", id))
            },
        ))
    }

    fn update_block_snapshot<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot> {
        pending(self.call(
            "update_block_snapshot",
            format!("update_block_snapshot {id}"),
            |state| {
                let snapshot = state
                    .block_snapshots
                    .get_mut(id)
                    .ok_or_else(|| ApiError::not_found("block_snapshot", id))?;
                if let Some(name) = &request.name {
                    snapshot.name.clone_from(name);
                }
                if let Some(tags) = &request.tags {
                    snapshot.tags.clone_from(tags);
                }
                Ok(snapshot.clone())
            },
        ))
    }

    fn delete_block_snapshot<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call(
            "delete_block_snapshot",
            format!("delete_block_snapshot {id}"),
            |state| {
                state
                    .block_snapshots
                    .remove(id)
                    .map(drop)
                    .ok_or_else(|| ApiError::not_found("block_snapshot", id))
            },
        ))
    }
}

impl MarketplaceApi for FakeCloud {
    fn get_local_image_by_label<'a>(
        &'a self,
        query: &'a LocalImageQuery,
    ) -> ApiFuture<'a, LocalImage> {
        pending(self.call(
            "get_local_image_by_label",
            format!(
                "get_local_image_by_label {} {} {}",
                query.label, query.commercial_type, query.image_type
            ),
            |state| {
                state
                    .local_images
                    .iter()
                    .find(|image| {
                        image.label == query.label
                            && image.image_type == query.image_type
                            && image
                                .compatible_commercial_types
                                .contains(&query.commercial_type)
                    })
                    .map(|image| LocalImage {
                        zone: query.zone,
                        ..image.clone()
                    })
                    .ok_or_else(|| ApiError::not_found("marketplace_local_image", &query.label))
            },
        ))
    }
}
