//! Wire types for the Scaleway Block Storage API (`/block/v1alpha1`).

use serde::{Deserialize, Serialize};

use crate::locality::Zone;

use super::types::ObjectLocation;

/// Lifecycle state of a block volume.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockVolumeStatus {
    /// Being created.
    Creating,
    /// Ready and detached.
    Available,
    /// Attached to a server.
    InUse,
    /// Being deleted.
    Deleting,
    /// Deleted.
    Deleted,
    /// Being resized.
    Resizing,
    /// Failed.
    Error,
    /// Snapshot in progress.
    Snapshotting,
    /// Locked by the platform.
    Locked,
    /// Being updated.
    Updating,
    /// Value not known to this client.
    #[serde(other)]
    Unknown,
}

impl BlockVolumeStatus {
    /// Returns `true` when the volume can be attached, detached or resized.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Available | Self::InUse)
    }
}

/// Lifecycle state of a block snapshot.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSnapshotStatus {
    /// Being created.
    Creating,
    /// Ready.
    Available,
    /// Failed.
    Error,
    /// Being deleted.
    Deleting,
    /// Deleted.
    Deleted,
    /// Restoring into a volume.
    InUse,
    /// Locked by the platform.
    Locked,
    /// Being exported.
    Exporting,
    /// Value not known to this client.
    #[serde(other)]
    Unknown,
}

/// Status of a volume reference (attachment to a product resource).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    /// Attaching.
    Attaching,
    /// Attached.
    Attached,
    /// Detaching.
    Detaching,
    /// Detached.
    Detached,
    /// Being snapshotted.
    Snapshotting,
    /// Failed.
    Error,
    /// Value not known to this client.
    #[serde(other)]
    Unknown,
}

impl ReferenceStatus {
    /// Returns `true` when the reference is not in flight.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Attached | Self::Detached | Self::Error)
    }
}

/// Attachment of a block volume to a product resource such as a server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VolumeReference {
    /// Reference identifier.
    pub id: String,
    /// Identifier of the product resource.
    pub product_resource_id: String,
    /// Product resource kind, for example `instance_server`.
    #[serde(default)]
    pub product_resource_type: String,
    /// Attachment status.
    pub status: ReferenceStatus,
}

/// Performance specification of a block volume.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VolumeSpecifications {
    /// Provisioned IOPS.
    #[serde(default)]
    pub perf_iops: Option<u32>,
    /// Storage class.
    #[serde(default)]
    pub class: Option<StorageClass>,
}

/// Block storage class.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    /// Standard block storage.
    Bssd,
    /// Low-latency SBS.
    Sbs,
    /// Value not known to this client.
    #[serde(other)]
    Unknown,
}

/// Block storage volume.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockVolume {
    /// Volume identifier.
    pub id: String,
    /// Volume name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Volume type, for example `sbs_5k`.
    #[serde(rename = "type", default)]
    pub volume_type: String,
    /// Lifecycle state.
    pub status: BlockVolumeStatus,
    /// Attachments.
    #[serde(default)]
    pub references: Vec<VolumeReference>,
    /// Performance specification.
    #[serde(default)]
    pub specs: VolumeSpecifications,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Zone of the volume.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl BlockVolume {
    /// Returns the server this volume is attached to, if any.
    #[must_use]
    pub fn attached_server(&self) -> Option<&str> {
        self.references
            .iter()
            .find(|reference| {
                reference.product_resource_type == "instance_server"
                    && reference.status != ReferenceStatus::Detached
            })
            .map(|reference| reference.product_resource_id.as_str())
    }

    /// Returns `true` when the volume and all its references are settled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.is_settled()
            && self
                .references
                .iter()
                .all(|reference| reference.status.is_settled())
    }
}

/// Source of a new block volume.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockVolumeSource {
    /// Empty volume of the given size in bytes.
    FromEmpty {
        /// Size in bytes.
        size: u64,
    },
    /// Restore from a block snapshot.
    FromSnapshot {
        /// Snapshot identifier.
        snapshot_id: String,
        /// Optional size override in bytes.
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
}

/// `POST /volumes` body of the block API.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateBlockVolumeRequest {
    /// Volume name.
    pub name: String,
    /// Owning project.
    pub project_id: String,
    /// Source of the volume data.
    #[serde(flatten)]
    pub source: BlockVolumeSource,
    /// Provisioned IOPS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf_iops: Option<u32>,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PATCH /volumes/{id}` body of the block API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateBlockVolumeRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New size in bytes (grow only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// New IOPS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf_iops: Option<u32>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Parent volume reference of a block snapshot.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SnapshotParentVolume {
    /// Volume identifier.
    pub id: String,
    /// Volume name.
    #[serde(default)]
    pub name: String,
}

/// Block storage snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockSnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Snapshot name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Lifecycle state.
    pub status: BlockSnapshotStatus,
    /// Volume the snapshot was taken from.
    #[serde(default)]
    pub parent_volume: Option<SnapshotParentVolume>,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Zone of the snapshot.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

/// `POST /snapshots` body of the block API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateBlockSnapshotRequest {
    /// Source volume.
    pub volume_id: String,
    /// Snapshot name.
    pub name: String,
    /// Owning project.
    pub project_id: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `POST /snapshots/import-from-object-storage` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImportBlockSnapshotRequest {
    /// Source object.
    #[serde(flatten)]
    pub location: ObjectLocation,
    /// Snapshot name.
    pub name: String,
    /// Owning project.
    pub project_id: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PATCH /snapshots/{id}` body of the block API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateBlockSnapshotRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(status: BlockVolumeStatus, references: Vec<VolumeReference>) -> BlockVolume {
        BlockVolume {
            id: String::from("vol"),
            name: String::from("data"),
            size: 10_000_000_000,
            volume_type: String::from("sbs_5k"),
            status,
            references,
            specs: VolumeSpecifications::default(),
            tags: vec![],
            zone: Zone::FrPar1,
            project_id: String::new(),
        }
    }

    fn reference(status: ReferenceStatus) -> VolumeReference {
        VolumeReference {
            id: String::from("ref"),
            product_resource_id: String::from("srv"),
            product_resource_type: String::from("instance_server"),
            status,
        }
    }

    #[test]
    fn attaching_reference_is_not_ready() {
        let volume = volume(
            BlockVolumeStatus::InUse,
            vec![reference(ReferenceStatus::Attaching)],
        );
        assert!(!volume.is_ready());
        assert_eq!(volume.attached_server(), Some("srv"));
    }

    #[test]
    fn detached_reference_means_no_server() {
        let volume = volume(
            BlockVolumeStatus::Available,
            vec![reference(ReferenceStatus::Detached)],
        );
        assert!(volume.is_ready());
        assert_eq!(volume.attached_server(), None);
    }

    #[test]
    fn create_request_flattens_source() {
        let request = CreateBlockVolumeRequest {
            name: String::from("data"),
            project_id: String::from("proj"),
            source: BlockVolumeSource::FromEmpty { size: 5 },
            perf_iops: Some(5000),
            tags: vec![],
        };
        let json = serde_json::to_value(&request).expect("encode");
        assert_eq!(json["from_empty"]["size"], 5);
        assert_eq!(json["perf_iops"], 5000);
    }
}
