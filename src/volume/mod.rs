//! Backend-agnostic view of volumes and snapshots.
//!
//! Users hand the provider a bare volume id without saying whether it
//! belongs to the legacy Instance API (`l_ssd`, `b_ssd`, `scratch`) or to
//! Block Storage (`sbs_volume`). Lookups try the Instance API first and
//! fall back to Block Storage on 404; every follow-up operation then
//! dispatches on [`VolumeBackend`].

use std::time::Duration;

use tracing::{debug, info};

use crate::locality::Zone;
use crate::provider::{Meta, ProviderError};
use crate::scaleway::{
    ApiError, BlockSnapshot, BlockVolume, CreateBlockSnapshotRequest, CreateSnapshotRequest,
    ObjectLocation, ServerVolume, Snapshot, SnapshotVolumeType, UpdateBlockVolumeRequest,
    UpdateVolumeRequest, Volume, VolumeServerTemplate, VolumeType,
};
use crate::waiter::{
    wait_for_block_snapshot, wait_for_block_volume, wait_for_block_volume_and_references,
    wait_for_block_volume_deleted, wait_for_instance_snapshot, wait_for_instance_volume,
    wait_for_instance_volume_deleted,
};

/// Server-creation volume template produced by [`UnknownVolume::volume_template`].
pub type VolumeTemplate = VolumeServerTemplate;

/// API owning a volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VolumeBackend {
    /// Legacy Instance API volume of the given type.
    Instance(VolumeType),
    /// Block Storage volume.
    Block,
}

impl VolumeBackend {
    /// Backend serving volumes of `volume_type`.
    #[must_use]
    pub const fn of(volume_type: VolumeType) -> Self {
        match volume_type {
            VolumeType::SbsVolume => Self::Block,
            other => Self::Instance(other),
        }
    }
}

/// A volume resolved from a bare identifier, or a fresh volume to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownVolume {
    /// Volume identifier; empty for a volume that does not exist yet.
    pub id: String,
    /// Volume name.
    pub name: String,
    /// Zone of the volume.
    pub zone: Zone,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Server the volume is attached to.
    pub server_id: Option<String>,
    /// Whether the server should boot from this volume.
    pub boot: Option<bool>,
    /// Owning API.
    pub backend: VolumeBackend,
    /// Provisioned IOPS of block volumes.
    pub iops: Option<u32>,
}

impl UnknownVolume {
    /// Describes a volume to be created alongside a server.
    #[must_use]
    pub const fn fresh(zone: Zone, size: Option<u64>, backend: VolumeBackend) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            zone,
            size,
            server_id: None,
            boot: None,
            backend,
            iops: None,
        }
    }

    /// Returns `true` for Block Storage volumes.
    #[must_use]
    pub const fn is_block_volume(&self) -> bool {
        matches!(self.backend, VolumeBackend::Block)
    }

    /// Returns `true` for local SSD volumes, whose size counts against the
    /// commercial type constraints.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self.backend, VolumeBackend::Instance(VolumeType::LSsd))
    }

    /// Volume type as reported on servers.
    #[must_use]
    pub const fn volume_type(&self) -> VolumeType {
        match self.backend {
            VolumeBackend::Instance(volume_type) => volume_type,
            VolumeBackend::Block => VolumeType::SbsVolume,
        }
    }

    /// Template embedded in `CreateServer` or `UpdateServer`.
    ///
    /// Existing instance volumes are referenced by id and name, existing
    /// block volumes by id and type, and fresh volumes by size and type.
    #[must_use]
    pub fn volume_template(&self) -> VolumeTemplate {
        if self.id.is_empty() {
            return VolumeTemplate {
                size: self.size,
                volume_type: Some(self.volume_type()),
                boot: self.boot,
                ..VolumeTemplate::default()
            };
        }
        match self.backend {
            VolumeBackend::Block => VolumeTemplate {
                id: Some(self.id.clone()),
                volume_type: Some(VolumeType::SbsVolume),
                boot: self.boot,
                ..VolumeTemplate::default()
            },
            VolumeBackend::Instance(_) => VolumeTemplate {
                id: Some(self.id.clone()),
                name: Some(self.name.clone()),
                boot: self.boot,
                ..VolumeTemplate::default()
            },
        }
    }
}

impl From<Volume> for UnknownVolume {
    fn from(volume: Volume) -> Self {
        Self {
            id: volume.id,
            name: volume.name,
            zone: volume.zone,
            size: Some(volume.size),
            server_id: volume.server.map(|server| server.id),
            boot: None,
            backend: VolumeBackend::Instance(volume.volume_type),
            iops: None,
        }
    }
}

impl From<BlockVolume> for UnknownVolume {
    fn from(volume: BlockVolume) -> Self {
        let server_id = volume.attached_server().map(str::to_owned);
        Self {
            id: volume.id,
            name: volume.name,
            zone: volume.zone,
            size: Some(volume.size),
            server_id,
            boot: None,
            backend: VolumeBackend::Block,
            iops: volume.specs.perf_iops,
        }
    }
}

impl From<&ServerVolume> for UnknownVolume {
    fn from(volume: &ServerVolume) -> Self {
        let backend = VolumeBackend::of(volume.volume_type);
        Self {
            id: volume.id.clone(),
            name: volume.name.clone(),
            zone: volume.zone,
            size: volume.size,
            server_id: None,
            boot: Some(volume.boot),
            backend,
            iops: None,
        }
    }
}

/// API owning a snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotBackend {
    /// Instance snapshot restoring to the given type.
    Instance(SnapshotVolumeType),
    /// Block Storage snapshot.
    Block,
}

/// A snapshot resolved from a bare identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownSnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Snapshot name.
    pub name: String,
    /// Zone of the snapshot.
    pub zone: Zone,
    /// Size in bytes.
    pub size: u64,
    /// Owning API.
    pub backend: SnapshotBackend,
    /// Volume the snapshot was taken from, when still known.
    pub volume_id: Option<String>,
    /// Owning project.
    pub project: String,
    /// User tags.
    pub tags: Vec<String>,
}

impl UnknownSnapshot {
    /// Returns `true` for Block Storage snapshots.
    #[must_use]
    pub const fn is_block_snapshot(&self) -> bool {
        matches!(self.backend, SnapshotBackend::Block)
    }

    /// Type reported in the `type` attribute of snapshot resources.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self.backend {
            SnapshotBackend::Instance(volume_type) => volume_type.as_str(),
            SnapshotBackend::Block => "sbs_snapshot",
        }
    }
}

impl From<Snapshot> for UnknownSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name,
            zone: snapshot.zone,
            size: snapshot.size,
            backend: SnapshotBackend::Instance(snapshot.volume_type),
            volume_id: snapshot.base_volume.map(|volume| volume.id),
            project: snapshot.project,
            tags: snapshot.tags,
        }
    }
}

impl From<BlockSnapshot> for UnknownSnapshot {
    fn from(snapshot: BlockSnapshot) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name,
            zone: snapshot.zone,
            size: snapshot.size,
            backend: SnapshotBackend::Block,
            volume_id: snapshot.parent_volume.map(|volume| volume.id),
            project: snapshot.project_id,
            tags: snapshot.tags,
        }
    }
}

/// Name, project and tags of a snapshot to create.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SnapshotSpec {
    /// Snapshot name.
    pub name: String,
    /// Owning project.
    pub project: String,
    /// User tags.
    pub tags: Vec<String>,
    /// Restore type of an instance snapshot; inferred from the volume when
    /// unset.
    pub volume_type: Option<SnapshotVolumeType>,
}

/// Looks a volume up in the Instance API, then in Block Storage.
///
/// # Errors
///
/// Returns a not-found [`ProviderError::Api`] when neither API knows the
/// id, and propagates any other failure.
pub async fn get_unknown_volume(
    meta: &Meta,
    zone: Zone,
    id: &str,
) -> Result<UnknownVolume, ProviderError> {
    match meta.instance.get_volume(zone, id).await {
        Ok(volume) => return Ok(volume.into()),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }
    debug!(%zone, volume_id = id, "volume unknown to the instance API, trying block storage");
    match meta.block.get_block_volume(zone, id).await {
        Ok(volume) => Ok(volume.into()),
        Err(err) if err.is_not_found() => Err(ApiError::not_found("volume", id).into()),
        Err(err) => Err(err.into()),
    }
}

/// Looks a snapshot up in the Instance API, then in Block Storage.
///
/// # Errors
///
/// Returns a not-found [`ProviderError::Api`] when neither API knows the
/// id, and propagates any other failure.
pub async fn get_unknown_snapshot(
    meta: &Meta,
    zone: Zone,
    id: &str,
) -> Result<UnknownSnapshot, ProviderError> {
    match meta.instance.get_snapshot(zone, id).await {
        Ok(snapshot) => return Ok(snapshot.into()),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }
    match meta.block.get_block_snapshot(zone, id).await {
        Ok(snapshot) => Ok(snapshot.into()),
        Err(err) if err.is_not_found() => Err(ApiError::not_found("snapshot", id).into()),
        Err(err) => Err(err.into()),
    }
}

/// Waits until the volume accepts attach, detach and power actions.
///
/// # Errors
///
/// Propagates waiter failures.
pub async fn wait_unknown_volume_ready(
    meta: &Meta,
    volume: &UnknownVolume,
    timeout: Duration,
) -> Result<UnknownVolume, ProviderError> {
    let options = meta.wait_options(timeout);
    let refreshed: UnknownVolume = match volume.backend {
        VolumeBackend::Block => {
            wait_for_block_volume_and_references(
                meta.block.as_ref(),
                volume.zone,
                &volume.id,
                options,
            )
            .await?
            .into()
        }
        VolumeBackend::Instance(_) => {
            wait_for_instance_volume(meta.instance.as_ref(), volume.zone, &volume.id, options)
                .await?
                .into()
        }
    };
    Ok(UnknownVolume {
        boot: volume.boot,
        ..refreshed
    })
}

/// Waits until a snapshot of either backend is no longer transient.
///
/// # Errors
///
/// Propagates waiter failures.
pub async fn wait_unknown_snapshot(
    meta: &Meta,
    snapshot: &UnknownSnapshot,
    timeout: Duration,
) -> Result<UnknownSnapshot, ProviderError> {
    let options = meta.wait_options(timeout);
    let settled = match snapshot.backend {
        SnapshotBackend::Instance(_) => {
            wait_for_instance_snapshot(meta.instance.as_ref(), snapshot.zone, &snapshot.id, options)
                .await?
                .into()
        }
        SnapshotBackend::Block => {
            wait_for_block_snapshot(meta.block.as_ref(), snapshot.zone, &snapshot.id, options)
                .await?
                .into()
        }
    };
    Ok(settled)
}

/// Snapshots a volume through the API that owns it and waits for the
/// snapshot to settle.
///
/// # Errors
///
/// Rejects scratch volumes and propagates API and waiter failures.
pub async fn create_snapshot_from_unknown_volume(
    meta: &Meta,
    volume: &UnknownVolume,
    spec: &SnapshotSpec,
    timeout: Duration,
) -> Result<UnknownSnapshot, ProviderError> {
    let options = meta.wait_options(timeout);
    match volume.backend {
        VolumeBackend::Instance(VolumeType::Scratch) => Err(ProviderError::volume(
            &volume.id,
            "cannot snapshot scratch volume",
        )),
        VolumeBackend::Instance(_) => {
            let request = CreateSnapshotRequest {
                name: spec.name.clone(),
                volume_id: Some(volume.id.clone()),
                volume_type: spec.volume_type,
                project: spec.project.clone(),
                tags: spec.tags.clone(),
                ..CreateSnapshotRequest::default()
            };
            let created = meta.instance.create_snapshot(volume.zone, &request).await?;
            info!(zone = %volume.zone, volume_id = %volume.id, snapshot_id = %created.id, "instance snapshot requested");
            let settled =
                wait_for_instance_snapshot(meta.instance.as_ref(), volume.zone, &created.id, options)
                    .await?;
            Ok(settled.into())
        }
        VolumeBackend::Block => {
            let request = CreateBlockSnapshotRequest {
                volume_id: volume.id.clone(),
                name: spec.name.clone(),
                project_id: spec.project.clone(),
                tags: spec.tags.clone(),
            };
            let created = meta
                .block
                .create_block_snapshot(volume.zone, &request)
                .await?;
            info!(zone = %volume.zone, volume_id = %volume.id, snapshot_id = %created.id, "block snapshot requested");
            let settled =
                wait_for_block_snapshot(meta.block.as_ref(), volume.zone, &created.id, options)
                    .await?;
            Ok(settled.into())
        }
    }
}

/// Grows a volume to `new_size` bytes.
///
/// # Errors
///
/// Rejects local volumes and downward resizes before any call, then
/// propagates API and waiter failures.
pub async fn resize_unknown_volume(
    meta: &Meta,
    volume: &UnknownVolume,
    new_size: u64,
    timeout: Duration,
) -> Result<(), ProviderError> {
    if let VolumeBackend::Instance(volume_type) = volume.backend
        && volume_type != VolumeType::BSsd
    {
        return Err(ProviderError::volume(
            &volume.id,
            format!("{volume_type} volumes cannot be resized"),
        ));
    }
    if volume.size.is_some_and(|size| new_size < size) {
        return Err(ProviderError::volume(
            &volume.id,
            "block volumes cannot be resized down",
        ));
    }
    if volume.size == Some(new_size) {
        return Ok(());
    }
    let options = meta.wait_options(timeout);
    match volume.backend {
        VolumeBackend::Instance(_) => {
            let request = UpdateVolumeRequest {
                size: Some(new_size),
                ..UpdateVolumeRequest::default()
            };
            meta.instance
                .update_volume(volume.zone, &volume.id, &request)
                .await?;
            wait_for_instance_volume(meta.instance.as_ref(), volume.zone, &volume.id, options)
                .await?;
        }
        VolumeBackend::Block => {
            let request = UpdateBlockVolumeRequest {
                size: Some(new_size),
                ..UpdateBlockVolumeRequest::default()
            };
            meta.block
                .update_block_volume(volume.zone, &volume.id, &request)
                .await?;
            wait_for_block_volume(meta.block.as_ref(), volume.zone, &volume.id, options).await?;
        }
    }
    info!(zone = %volume.zone, volume_id = %volume.id, new_size, "volume resized");
    Ok(())
}

/// Updates the provisioned IOPS of a block volume.
///
/// # Errors
///
/// Rejects instance volumes and propagates API failures.
pub async fn update_unknown_volume_iops(
    meta: &Meta,
    volume: &UnknownVolume,
    iops: u32,
    timeout: Duration,
) -> Result<(), ProviderError> {
    if !volume.is_block_volume() {
        return Err(ProviderError::volume(
            &volume.id,
            "IOPS can only be set on block volumes",
        ));
    }
    if volume.iops == Some(iops) {
        return Ok(());
    }
    let request = UpdateBlockVolumeRequest {
        perf_iops: Some(iops),
        ..UpdateBlockVolumeRequest::default()
    };
    meta.block
        .update_block_volume(volume.zone, &volume.id, &request)
        .await?;
    wait_for_block_volume(
        meta.block.as_ref(),
        volume.zone,
        &volume.id,
        meta.wait_options(timeout),
    )
    .await?;
    debug!(zone = %volume.zone, volume_id = %volume.id, iops, "volume IOPS updated");
    Ok(())
}

/// Deletes a volume and waits until it is gone. A volume that is already
/// gone is not an error.
///
/// # Errors
///
/// Propagates API and waiter failures.
pub async fn delete_unknown_volume(
    meta: &Meta,
    volume: &UnknownVolume,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let options = meta.wait_options(timeout);
    let outcome = match volume.backend {
        VolumeBackend::Block => meta.block.delete_block_volume(volume.zone, &volume.id).await,
        VolumeBackend::Instance(_) => meta.instance.delete_volume(volume.zone, &volume.id).await,
    };
    match outcome {
        Ok(()) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match volume.backend {
        VolumeBackend::Block => {
            wait_for_block_volume_deleted(meta.block.as_ref(), volume.zone, &volume.id, options)
                .await?;
        }
        VolumeBackend::Instance(_) => {
            wait_for_instance_volume_deleted(
                meta.instance.as_ref(),
                volume.zone,
                &volume.id,
                options,
            )
            .await?;
        }
    }
    info!(zone = %volume.zone, volume_id = %volume.id, "volume deleted");
    Ok(())
}

/// Exports a snapshot to object storage through the API that owns it.
///
/// # Errors
///
/// Propagates API and waiter failures.
pub async fn export_unknown_snapshot(
    meta: &Meta,
    snapshot: &UnknownSnapshot,
    location: &ObjectLocation,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let options = meta.wait_options(timeout);
    match snapshot.backend {
        SnapshotBackend::Instance(_) => {
            meta.instance
                .export_snapshot(snapshot.zone, &snapshot.id, location)
                .await?;
            wait_for_instance_snapshot(meta.instance.as_ref(), snapshot.zone, &snapshot.id, options)
                .await?;
        }
        SnapshotBackend::Block => {
            meta.block
                .export_block_snapshot(snapshot.zone, &snapshot.id, location)
                .await?;
            wait_for_block_snapshot(meta.block.as_ref(), snapshot.zone, &snapshot.id, options)
                .await?;
        }
    }
    info!(
        zone = %snapshot.zone,
        snapshot_id = %snapshot.id,
        bucket = %location.bucket,
        key = %location.key,
        "snapshot exported"
    );
    Ok(())
}

#[cfg(test)]
mod tests;
