//! Block Storage API endpoints.

use reqwest::Method;

use crate::locality::Zone;
use crate::scaleway::block::{
    BlockSnapshot, BlockVolume, CreateBlockSnapshotRequest, CreateBlockVolumeRequest,
    ImportBlockSnapshotRequest, UpdateBlockSnapshotRequest, UpdateBlockVolumeRequest,
};
use crate::scaleway::types::{ListFilter, ObjectLocation};
use crate::scaleway::{ApiFuture, BlockApi};

use super::{HttpClient, Target};

impl BlockApi for HttpClient {
    fn get_block_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, BlockVolume> {
        Box::pin(async move {
            let url = self.block_url(zone, &format!("/volumes/{id}"));
            self.get_root(&url, Target::new("block_volume", id))
                .await
        })
    }

    fn list_block_volumes<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<BlockVolume>> {
        Box::pin(async move {
            let url = self.block_url(zone, "/volumes");
            self.list_all(&url, &filter.query(), "volumes").await
        })
    }

    fn create_block_volume<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateBlockVolumeRequest,
    ) -> ApiFuture<'a, BlockVolume> {
        Box::pin(async move {
            let url = self.block_url(zone, "/volumes");
            self.send_root(
                Method::POST,
                &url,
                request,
                Target::new("block_volume", &request.name),
            )
            .await
        })
    }

    fn update_block_volume<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateBlockVolumeRequest,
    ) -> ApiFuture<'a, BlockVolume> {
        Box::pin(async move {
            let url = self.block_url(zone, &format!("/volumes/{id}"));
            self.send_root(Method::PATCH, &url, request, Target::new("block_volume", id))
                .await
        })
    }

    fn delete_block_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.block_url(zone, &format!("/volumes/{id}"));
            self.delete(&url, Target::new("block_volume", id)).await
        })
    }

    fn get_block_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, BlockSnapshot> {
        Box::pin(async move {
            let url = self.block_url(zone, &format!("/snapshots/{id}"));
            self.get_root(&url, Target::new("block_snapshot", id))
                .await
        })
    }

    fn list_block_snapshots<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<BlockSnapshot>> {
        Box::pin(async move {
            let url = self.block_url(zone, "/snapshots");
            self.list_all(&url, &filter.query(), "snapshots").await
        })
    }

    fn create_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot> {
        Box::pin(async move {
            let url = self.block_url(zone, "/snapshots");
            self.send_root(
                Method::POST,
                &url,
                request,
                Target::new("block_snapshot", &request.name),
            )
            .await
        })
    }

    fn import_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a ImportBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot> {
        Box::pin(async move {
            let url = self.block_url(zone, "/snapshots/import-from-object-storage");
            self.send_root(
                Method::POST,
                &url,
                request,
                Target::new("block_snapshot", &request.name),
            )
            .await
        })
    }

    fn export_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        location: &'a ObjectLocation,
    ) -> ApiFuture<'a, BlockSnapshot> {
        Box::pin(async move {
            let url = self.block_url(zone, "/snapshots/export-to-object-storage");
            let body = serde_json::json!({
                "snapshot_id": id,
                "bucket": location.bucket,
                "key": location.key,
            });
            self.send_root(Method::POST, &url, &body, Target::new("block_snapshot", id))
                .await
        })
    }

    fn update_block_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateBlockSnapshotRequest,
    ) -> ApiFuture<'a, BlockSnapshot> {
        Box::pin(async move {
            let url = self.block_url(zone, &format!("/snapshots/{id}"));
            self.send_root(Method::PATCH, &url, request, Target::new("block_snapshot", id))
                .await
        })
    }

    fn delete_block_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.block_url(zone, &format!("/snapshots/{id}"));
            self.delete(&url, Target::new("block_snapshot", id)).await
        })
    }
}
