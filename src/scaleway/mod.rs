//! Seam between the provider and the Scaleway HTTP APIs.
//!
//! Resource callbacks never talk HTTP directly: they go through the
//! [`InstanceApi`], [`BlockApi`] and [`MarketplaceApi`] traits so the same
//! reconciliation code runs against [`HttpClient`] in production and against
//! the in-memory double in [`crate::test_support`] in tests.

mod block;
mod error;
mod http;
mod marketplace;
mod types;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::locality::Zone;

pub use block::{
    BlockSnapshot, BlockSnapshotStatus, BlockVolume, BlockVolumeSource, BlockVolumeStatus,
    CreateBlockSnapshotRequest, CreateBlockVolumeRequest, ImportBlockSnapshotRequest,
    ReferenceStatus, SnapshotParentVolume, StorageClass, UpdateBlockSnapshotRequest,
    UpdateBlockVolumeRequest, VolumeReference, VolumeSpecifications,
};
pub use error::ApiError;
pub use http::{HttpClient, HttpClientConfig};
pub use marketplace::{LocalImage, LocalImageQuery, LocalImageType};
pub use types::*;

/// Future returned by every API call.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Operations of the Instance API used by the provider.
pub trait InstanceApi: Send + Sync {
    /// Fetches a server.
    fn get_server<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Server>;
    /// Lists servers matching the filter.
    fn list_servers<'a>(&'a self, zone: Zone, filter: &'a ListFilter)
    -> ApiFuture<'a, Vec<Server>>;
    /// Creates a server in the `stopped` state.
    fn create_server<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateServerRequest,
    ) -> ApiFuture<'a, Server>;
    /// Applies a partial update to a server.
    fn update_server<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateServerRequest,
    ) -> ApiFuture<'a, Server>;
    /// Deletes a stopped server without touching its volumes.
    fn delete_server<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;
    /// Triggers a power or maintenance action.
    fn server_action<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a ServerActionRequest,
    ) -> ApiFuture<'a, Task>;
    /// Lists commercial types offered in the zone.
    fn list_server_types(&self, zone: Zone) -> ApiFuture<'_, Vec<ServerType>>;
    /// Returns the stock level (`available`, `scarce`, `shortage`) per type.
    fn server_types_availability(&self, zone: Zone) -> ApiFuture<'_, BTreeMap<String, String>>;
    /// Lists user-data keys of a server.
    fn list_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
    ) -> ApiFuture<'a, Vec<String>>;
    /// Reads one user-data value.
    fn get_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, String>;
    /// Writes one user-data value.
    fn set_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        key: &'a str,
        content: &'a str,
    ) -> ApiFuture<'a, ()>;
    /// Deletes one user-data key.
    fn delete_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, ()>;
    /// Attaches an existing volume to a server.
    fn attach_server_volume<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        volume_id: &'a str,
        volume_type: VolumeType,
    ) -> ApiFuture<'a, Server>;
    /// Detaches a volume from whichever server holds it.
    fn detach_server_volume<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> ApiFuture<'a, Server>;

    /// Fetches an instance volume.
    fn get_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Volume>;
    /// Lists instance volumes.
    fn list_volumes<'a>(&'a self, zone: Zone, filter: &'a ListFilter)
    -> ApiFuture<'a, Vec<Volume>>;
    /// Creates an instance volume.
    fn create_volume<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateVolumeRequest,
    ) -> ApiFuture<'a, Volume>;
    /// Updates an instance volume.
    fn update_volume<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateVolumeRequest,
    ) -> ApiFuture<'a, Volume>;
    /// Deletes an instance volume.
    fn delete_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;

    /// Fetches an instance snapshot.
    fn get_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Snapshot>;
    /// Lists instance snapshots.
    fn list_snapshots<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Snapshot>>;
    /// Creates an instance snapshot from a volume or an object import.
    fn create_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateSnapshotRequest,
    ) -> ApiFuture<'a, Snapshot>;
    /// Updates an instance snapshot.
    fn update_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateSnapshotRequest,
    ) -> ApiFuture<'a, Snapshot>;
    /// Deletes an instance snapshot.
    fn delete_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;
    /// Exports an instance snapshot to object storage.
    fn export_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        location: &'a ObjectLocation,
    ) -> ApiFuture<'a, Task>;

    /// Fetches an image.
    fn get_image<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Image>;
    /// Lists images.
    fn list_images<'a>(&'a self, zone: Zone, filter: &'a ListFilter) -> ApiFuture<'a, Vec<Image>>;
    /// Creates an image from snapshots.
    fn create_image<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateImageRequest,
    ) -> ApiFuture<'a, Image>;
    /// Updates an image.
    fn update_image<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateImageRequest,
    ) -> ApiFuture<'a, Image>;
    /// Deletes an image, leaving its snapshots in place.
    fn delete_image<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;

    /// Fetches a flexible IP.
    fn get_ip<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Ip>;
    /// Lists flexible IPs.
    fn list_ips<'a>(&'a self, zone: Zone, filter: &'a ListFilter) -> ApiFuture<'a, Vec<Ip>>;
    /// Reserves a flexible IP.
    fn create_ip<'a>(&'a self, zone: Zone, request: &'a CreateIpRequest) -> ApiFuture<'a, Ip>;
    /// Updates a flexible IP, including attachment and reverse DNS.
    fn update_ip<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateIpRequest,
    ) -> ApiFuture<'a, Ip>;
    /// Releases a flexible IP.
    fn delete_ip<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;

    /// Fetches a placement group.
    fn get_placement_group<'a>(&'a self, zone: Zone, id: &'a str)
    -> ApiFuture<'a, PlacementGroup>;
    /// Lists placement groups.
    fn list_placement_groups<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<PlacementGroup>>;
    /// Creates a placement group.
    fn create_placement_group<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreatePlacementGroupRequest,
    ) -> ApiFuture<'a, PlacementGroup>;
    /// Updates a placement group in a single request.
    fn update_placement_group<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdatePlacementGroupRequest,
    ) -> ApiFuture<'a, PlacementGroup>;
    /// Deletes a placement group.
    fn delete_placement_group<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;

    /// Fetches a security group.
    fn get_security_group<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, SecurityGroup>;
    /// Lists security groups.
    fn list_security_groups<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<SecurityGroup>>;
    /// Creates a security group.
    fn create_security_group<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateSecurityGroupRequest,
    ) -> ApiFuture<'a, SecurityGroup>;
    /// Updates a security group.
    fn update_security_group<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateSecurityGroupRequest,
    ) -> ApiFuture<'a, SecurityGroup>;
    /// Deletes a security group.
    fn delete_security_group<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;
    /// Lists every rule of a security group ordered by position.
    fn list_security_group_rules<'a>(
        &'a self,
        zone: Zone,
        security_group_id: &'a str,
    ) -> ApiFuture<'a, Vec<SecurityGroupRule>>;
    /// Replaces every editable rule of a security group at once.
    fn set_security_group_rules<'a>(
        &'a self,
        zone: Zone,
        security_group_id: &'a str,
        rules: &'a [SetSecurityGroupRule],
    ) -> ApiFuture<'a, Vec<SecurityGroupRule>>;

    /// Lists the private NICs of a server.
    fn list_private_nics<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
    ) -> ApiFuture<'a, Vec<PrivateNic>>;
    /// Fetches one private NIC.
    fn get_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
    ) -> ApiFuture<'a, PrivateNic>;
    /// Plugs a server into a private network.
    fn create_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        request: &'a CreatePrivateNicRequest,
    ) -> ApiFuture<'a, PrivateNic>;
    /// Updates a private NIC.
    fn update_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
        request: &'a UpdatePrivateNicRequest,
    ) -> ApiFuture<'a, PrivateNic>;
    /// Unplugs a private NIC.
    fn delete_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
    ) -> ApiFuture<'a, ()>;
}

/// Operations of the Block Storage API used by the provider.
pub trait BlockApi: Send + Sync {
    /// Fetches a block volume.
    fn get_block_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, BlockVolume>;
    /// Lists block volumes.
    fn list_block_volumes<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<BlockVolume>>;
    /// Creates a block volume.
    fn create_block_volume<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateBlockVolumeRequest,
    ) -> ApiFuture<'a, BlockVolume>;
    /// Updates a block volume (name, size, IOPS, tags).
    fn update_block_volume<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateBlockVolumeRequest,
    ) -> ApiFuture<'a, BlockVolume>;
    /// Deletes a detached block volume.
    fn delete_block_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;
    /// Fetches a block snapshot.
    fn get_block_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, BlockSnapshot>;
    /// Lists block snapshots.
    fn list_block_snapshots<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<BlockSnapshot>>;
    /// Snapshots a block volume.
    fn create_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot>;
    /// Imports a block snapshot from object storage.
    fn import_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a ImportBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot>;
    /// Exports a block snapshot to object storage.
    fn export_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        location: &'a ObjectLocation,
    ) -> ApiFuture<'a, BlockSnapshot>;
    /// Updates a block snapshot.
    fn update_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot>;
    /// Deletes a block snapshot.
    fn delete_block_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()>;
}

/// Operations of the Marketplace API used by the provider.
pub trait MarketplaceApi: Send + Sync {
    /// Resolves a marketplace label to a zone-local image.
    fn get_local_image_by_label<'a>(
        &'a self,
        query: &'a LocalImageQuery,
    ) -> ApiFuture<'a, LocalImage>;
}
