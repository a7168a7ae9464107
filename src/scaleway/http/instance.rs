//! Instance API endpoints.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::locality::Zone;
use crate::scaleway::types::{
    CreateImageRequest, CreateIpRequest, CreatePlacementGroupRequest, CreatePrivateNicRequest,
    CreateSecurityGroupRequest, CreateServerRequest, CreateSnapshotRequest, CreateVolumeRequest,
    Image, Ip, ListFilter, ObjectLocation, PlacementGroup, PrivateNic, SecurityGroup,
    SecurityGroupRule, Server, ServerAction, ServerActionRequest, ServerType, SetSecurityGroupRule,
    Snapshot, Task, UpdateImageRequest, UpdateIpRequest, UpdatePlacementGroupRequest,
    UpdatePrivateNicRequest, UpdateSecurityGroupRequest, UpdateServerRequest,
    UpdateSnapshotRequest, UpdateVolumeRequest, Volume, VolumeType,
};
use crate::scaleway::{ApiFuture, InstanceApi};

use super::{HttpClient, Target};

#[derive(Deserialize)]
struct Availability {
    availability: String,
}

impl HttpClient {
    const fn sdk_action(action: ServerAction) -> bool {
        !matches!(action, ServerAction::Backup | ServerAction::EnableRoutedIp)
    }
}

impl InstanceApi for HttpClient {
    fn get_server<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{id}"));
            self.get_field(&url, "server", Target::new("server", id))
                .await
        })
    }

    fn list_servers<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Server>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/servers");
            self.list_all(&url, &filter.query(), "servers").await
        })
    }

    fn create_server<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateServerRequest,
    ) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/servers");
            debug!(%zone, name = %request.name, commercial_type = %request.commercial_type, "creating server");
            self.send_field(
                Method::POST,
                &url,
                request,
                "server",
                Target::new("server", &request.name),
            )
            .await
        })
    }

    fn update_server<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateServerRequest,
    ) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{id}"));
            self.send_field(Method::PATCH, &url, request, "server", Target::new("server", id))
                .await
        })
    }

    fn delete_server<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.api.delete_instance_async(zone.as_str(), id).await?;
            Ok(())
        })
    }

    fn server_action<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a ServerActionRequest,
    ) -> ApiFuture<'a, Task> {
        Box::pin(async move {
            debug!(%zone, server_id = id, action = %request.action, "server action");
            if Self::sdk_action(request.action) {
                self.api
                    .perform_instance_action_async(zone.as_str(), id, request.action.as_str())
                    .await?;
                return Ok(Task {
                    description: request.action.as_str().to_owned(),
                    status: String::from("pending"),
                    href_from: format!("/servers/{id}/action"),
                    ..Task::default()
                });
            }
            let url = self.instance_url(zone, &format!("/servers/{id}/action"));
            self.send_field(Method::POST, &url, request, "task", Target::new("server", id))
                .await
        })
    }

    fn list_server_types(&self, zone: Zone) -> ApiFuture<'_, Vec<ServerType>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/products/servers");
            let types: BTreeMap<String, ServerType> = self
                .get_field(&url, "servers", Target::list("server_type"))
                .await?;
            Ok(types
                .into_iter()
                .map(|(name, server_type)| ServerType {
                    name,
                    ..server_type
                })
                .collect())
        })
    }

    fn server_types_availability(&self, zone: Zone) -> ApiFuture<'_, BTreeMap<String, String>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/products/servers/availability");
            let stock: BTreeMap<String, Availability> = self
                .get_field(&url, "servers", Target::list("server_type"))
                .await?;
            Ok(stock
                .into_iter()
                .map(|(name, entry)| (name, entry.availability))
                .collect())
        })
    }

    fn list_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
    ) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/user_data"));
            self.get_field(&url, "user_data", Target::new("server", server_id))
                .await
        })
    }

    fn get_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/user_data/{key}"));
            let body =
                Self::execute(self.request(Method::GET, &url), Target::new("user_data", key))
                    .await?;
            Ok(body.text())
        })
    }

    fn set_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        key: &'a str,
        content: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/user_data/{key}"));
            let builder = self
                .request(Method::PATCH, &url)
                .header("Content-Type", "text/plain")
                .body(content.to_owned());
            Self::execute(builder, Target::new("user_data", key))
                .await
                .map(drop)
        })
    }

    fn delete_server_user_data<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/user_data/{key}"));
            self.delete(&url, Target::new("user_data", key)).await
        })
    }

    fn attach_server_volume<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        volume_id: &'a str,
        volume_type: VolumeType,
    ) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/attach-volume"));
            let body = json!({ "volume_id": volume_id, "volume_type": volume_type });
            self.send_field(Method::POST, &url, &body, "server", Target::new("server", server_id))
                .await
        })
    }

    fn detach_server_volume<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/detach-volume"));
            let body = json!({ "volume_id": volume_id });
            self.send_field(Method::POST, &url, &body, "server", Target::new("server", server_id))
                .await
        })
    }

    fn get_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Volume> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/volumes/{id}"));
            self.get_field(&url, "volume", Target::new("instance_volume", id))
                .await
        })
    }

    fn list_volumes<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Volume>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/volumes");
            self.list_all(&url, &filter.query(), "volumes").await
        })
    }

    fn create_volume<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateVolumeRequest,
    ) -> ApiFuture<'a, Volume> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/volumes");
            self.send_field(
                Method::POST,
                &url,
                request,
                "volume",
                Target::new("instance_volume", &request.name),
            )
            .await
        })
    }

    fn update_volume<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateVolumeRequest,
    ) -> ApiFuture<'a, Volume> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/volumes/{id}"));
            self.send_field(
                Method::PATCH,
                &url,
                request,
                "volume",
                Target::new("instance_volume", id),
            )
            .await
        })
    }

    fn delete_volume<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/volumes/{id}"));
            self.delete(&url, Target::new("instance_volume", id)).await
        })
    }

    fn get_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Snapshot> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/snapshots/{id}"));
            self.get_field(&url, "snapshot", Target::new("instance_snapshot", id))
                .await
        })
    }

    fn list_snapshots<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Snapshot>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/snapshots");
            self.list_all(&url, &filter.query(), "snapshots").await
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateSnapshotRequest,
    ) -> ApiFuture<'a, Snapshot> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/snapshots");
            self.send_field(
                Method::POST,
                &url,
                request,
                "snapshot",
                Target::new("instance_snapshot", &request.name),
            )
            .await
        })
    }

    fn update_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateSnapshotRequest,
    ) -> ApiFuture<'a, Snapshot> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/snapshots/{id}"));
            self.send_field(
                Method::PATCH,
                &url,
                request,
                "snapshot",
                Target::new("instance_snapshot", id),
            )
            .await
        })
    }

    fn delete_snapshot<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/snapshots/{id}"));
            self.delete(&url, Target::new("instance_snapshot", id)).await
        })
    }

    fn export_snapshot<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        location: &'a ObjectLocation,
    ) -> ApiFuture<'a, Task> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/snapshots/{id}/export"));
            self.send_field(
                Method::POST,
                &url,
                location,
                "task",
                Target::new("instance_snapshot", id),
            )
            .await
        })
    }

    fn get_image<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Image> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/images/{id}"));
            self.get_field(&url, "image", Target::new("instance_image", id))
                .await
        })
    }

    fn list_images<'a>(&'a self, zone: Zone, filter: &'a ListFilter) -> ApiFuture<'a, Vec<Image>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/images");
            self.list_all(&url, &filter.query(), "images").await
        })
    }

    fn create_image<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateImageRequest,
    ) -> ApiFuture<'a, Image> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/images");
            self.send_field(
                Method::POST,
                &url,
                request,
                "image",
                Target::new("instance_image", &request.name),
            )
            .await
        })
    }

    fn update_image<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateImageRequest,
    ) -> ApiFuture<'a, Image> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/images/{id}"));
            self.send_field(
                Method::PATCH,
                &url,
                request,
                "image",
                Target::new("instance_image", id),
            )
            .await
        })
    }

    fn delete_image<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/images/{id}"));
            self.delete(&url, Target::new("instance_image", id)).await
        })
    }

    fn get_ip<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, Ip> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/ips/{id}"));
            self.get_field(&url, "ip", Target::new("instance_ip", id))
                .await
        })
    }

    fn list_ips<'a>(&'a self, zone: Zone, filter: &'a ListFilter) -> ApiFuture<'a, Vec<Ip>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/ips");
            self.list_all(&url, &filter.query(), "ips").await
        })
    }

    fn create_ip<'a>(&'a self, zone: Zone, request: &'a CreateIpRequest) -> ApiFuture<'a, Ip> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/ips");
            self.send_field(Method::POST, &url, request, "ip", Target::list("instance_ip"))
                .await
        })
    }

    fn update_ip<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateIpRequest,
    ) -> ApiFuture<'a, Ip> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/ips/{id}"));
            self.send_field(Method::PATCH, &url, request, "ip", Target::new("instance_ip", id))
                .await
        })
    }

    fn delete_ip<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/ips/{id}"));
            self.delete(&url, Target::new("instance_ip", id)).await
        })
    }

    fn get_placement_group<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
    ) -> ApiFuture<'a, PlacementGroup> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/placement_groups/{id}"));
            self.get_field(&url, "placement_group", Target::new("placement_group", id))
                .await
        })
    }

    fn list_placement_groups<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<PlacementGroup>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/placement_groups");
            self.list_all(&url, &filter.query(), "placement_groups")
                .await
        })
    }

    fn create_placement_group<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreatePlacementGroupRequest,
    ) -> ApiFuture<'a, PlacementGroup> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/placement_groups");
            self.send_field(
                Method::POST,
                &url,
                request,
                "placement_group",
                Target::new("placement_group", &request.name),
            )
            .await
        })
    }

    fn update_placement_group<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdatePlacementGroupRequest,
    ) -> ApiFuture<'a, PlacementGroup> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/placement_groups/{id}"));
            self.send_field(
                Method::PATCH,
                &url,
                request,
                "placement_group",
                Target::new("placement_group", id),
            )
            .await
        })
    }

    fn delete_placement_group<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/placement_groups/{id}"));
            self.delete(&url, Target::new("placement_group", id)).await
        })
    }

    fn get_security_group<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, SecurityGroup> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/security_groups/{id}"));
            self.get_field(&url, "security_group", Target::new("security_group", id))
                .await
        })
    }

    fn list_security_groups<'a>(
        &'a self,
        zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<SecurityGroup>> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/security_groups");
            self.list_all(&url, &filter.query(), "security_groups")
                .await
        })
    }

    fn create_security_group<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateSecurityGroupRequest,
    ) -> ApiFuture<'a, SecurityGroup> {
        Box::pin(async move {
            let url = self.instance_url(zone, "/security_groups");
            self.send_field(
                Method::POST,
                &url,
                request,
                "security_group",
                Target::new("security_group", &request.name),
            )
            .await
        })
    }

    fn update_security_group<'a>(
        &'a self,
        zone: Zone,
        id: &'a str,
        request: &'a UpdateSecurityGroupRequest,
    ) -> ApiFuture<'a, SecurityGroup> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/security_groups/{id}"));
            self.send_field(
                Method::PATCH,
                &url,
                request,
                "security_group",
                Target::new("security_group", id),
            )
            .await
        })
    }

    fn delete_security_group<'a>(&'a self, zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/security_groups/{id}"));
            self.delete(&url, Target::new("security_group", id)).await
        })
    }

    fn list_security_group_rules<'a>(
        &'a self,
        zone: Zone,
        security_group_id: &'a str,
    ) -> ApiFuture<'a, Vec<SecurityGroupRule>> {
        Box::pin(async move {
            let url =
                self.instance_url(zone, &format!("/security_groups/{security_group_id}/rules"));
            let mut rules: Vec<SecurityGroupRule> = self.list_all(&url, &[], "rules").await?;
            rules.sort_by_key(|rule| rule.position);
            Ok(rules)
        })
    }

    fn set_security_group_rules<'a>(
        &'a self,
        zone: Zone,
        security_group_id: &'a str,
        rules: &'a [SetSecurityGroupRule],
    ) -> ApiFuture<'a, Vec<SecurityGroupRule>> {
        Box::pin(async move {
            let url =
                self.instance_url(zone, &format!("/security_groups/{security_group_id}/rules"));
            debug!(%zone, security_group_id, count = rules.len(), "replacing security group rules");
            let body = json!({ "rules": rules });
            self.send_field(
                Method::PUT,
                &url,
                &body,
                "rules",
                Target::new("security_group", security_group_id),
            )
            .await
        })
    }

    fn list_private_nics<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
    ) -> ApiFuture<'a, Vec<PrivateNic>> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/private_nics"));
            self.list_all(&url, &[], "private_nics").await
        })
    }

    fn get_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
    ) -> ApiFuture<'a, PrivateNic> {
        Box::pin(async move {
            let url =
                self.instance_url(zone, &format!("/servers/{server_id}/private_nics/{nic_id}"));
            self.get_field(&url, "private_nic", Target::new("private_nic", nic_id))
                .await
        })
    }

    fn create_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        request: &'a CreatePrivateNicRequest,
    ) -> ApiFuture<'a, PrivateNic> {
        Box::pin(async move {
            let url = self.instance_url(zone, &format!("/servers/{server_id}/private_nics"));
            self.send_field(
                Method::POST,
                &url,
                request,
                "private_nic",
                Target::new("server", server_id),
            )
            .await
        })
    }

    fn update_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
        request: &'a UpdatePrivateNicRequest,
    ) -> ApiFuture<'a, PrivateNic> {
        Box::pin(async move {
            let url =
                self.instance_url(zone, &format!("/servers/{server_id}/private_nics/{nic_id}"));
            self.send_field(
                Method::PATCH,
                &url,
                request,
                "private_nic",
                Target::new("private_nic", nic_id),
            )
            .await
        })
    }

    fn delete_private_nic<'a>(
        &'a self,
        zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url =
                self.instance_url(zone, &format!("/servers/{server_id}/private_nics/{nic_id}"));
            self.delete(&url, Target::new("private_nic", nic_id)).await
        })
    }
}
