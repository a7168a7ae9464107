//! [`InstanceApi`] over the in-memory state.

use std::collections::BTreeMap;

use crate::locality::Zone;
use crate::scaleway::{
    ApiError, ApiFuture, BlockVolumeStatus, CreateImageRequest, CreateIpRequest,
    CreatePlacementGroupRequest, CreatePrivateNicRequest, CreateSecurityGroupRequest,
    CreateServerRequest, CreateSnapshotRequest, CreateVolumeRequest, GB, Image, ImageState,
    ImageVolume, ImageVolumeTemplate, InstanceApi, Ip, IpState, IpType, ListFilter,
    ObjectLocation, PlacementGroup, PrivateNic, PrivateNicState, ReferenceStatus, ResourceRef,
    RuleAction, SecurityGroup, SecurityGroupRule, Server, ServerAction, ServerActionRequest,
    ServerImage, ServerIp, ServerPlacementGroup, ServerState, ServerType, ServerVolume,
    SetSecurityGroupRule, Snapshot, SnapshotState, SnapshotVolumeType, StorageClass, Task,
    UpdateImageRequest, UpdateIpRequest, UpdatePlacementGroupRequest, UpdatePrivateNicRequest,
    UpdateSecurityGroupRequest, UpdateServerRequest, UpdateSnapshotRequest, UpdateVolumeRequest,
    Volume, VolumeReference, VolumeServerTemplate, VolumeSpecifications, VolumeState, VolumeType,
};

use super::{CloudState, FakeCloud, new_id, pending};

const DEFAULT_BLOCK_SIZE: u64 = 10 * GB;

fn precondition(message: impl Into<String>) -> ApiError {
    ApiError::PreconditionFailed {
        message: message.into(),
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::InvalidArguments {
        message: message.into(),
        details: Vec::new(),
    }
}

fn instance_reference(server_id: &str) -> VolumeReference {
    VolumeReference {
        id: new_id(),
        product_resource_id: server_id.to_owned(),
        product_resource_type: String::from("instance_server"),
        status: ReferenceStatus::Attached,
    }
}

fn render_optional(value: Option<&Option<String>>) -> Option<String> {
    value.map(|inner| inner.clone().unwrap_or_else(|| String::from("null")))
}

impl CloudState {
    fn server_type(&self, name: &str) -> Result<&ServerType, ApiError> {
        self.server_types
            .iter()
            .find(|server_type| server_type.name == name)
            .ok_or_else(|| invalid(format!("unknown commercial type {name}")))
    }

    fn render_server(&self, id: &str) -> Result<Server, ApiError> {
        let mut server = self
            .servers
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("instance_server", id))?;
        server.private_nics = self
            .private_nics
            .values()
            .filter(|nic| nic.server_id == id)
            .cloned()
            .collect();
        for attached in server.volumes.values_mut() {
            if let Some(stored) = self.volumes.get(&attached.id) {
                attached.size = Some(stored.size);
                attached.name.clone_from(&stored.name);
                attached.state = Some(stored.state.to_string());
            }
        }
        Ok(server)
    }

    fn server_mut(&mut self, id: &str) -> Result<&mut Server, ApiError> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found("instance_server", id))
    }

    fn local_size(&self, volumes: &BTreeMap<String, ServerVolume>) -> u64 {
        volumes
            .values()
            .filter(|volume| volume.volume_type == VolumeType::LSsd)
            .map(|volume| {
                self.volumes
                    .get(&volume.id)
                    .map_or(volume.size.unwrap_or_default(), |stored| stored.size)
            })
            .sum()
    }

    fn check_local_size(
        &self,
        commercial_type: &str,
        volumes: &BTreeMap<String, ServerVolume>,
    ) -> Result<(), ApiError> {
        let constraint = self
            .server_type(commercial_type)?
            .volumes_constraint
            .unwrap_or_default();
        let total = self.local_size(volumes);
        if total < constraint.min_size || total > constraint.max_size {
            return Err(invalid(format!(
                "the total size of local-volume(s) must be between {} and {} bytes, got {total}",
                constraint.min_size, constraint.max_size
            )));
        }
        Ok(())
    }

    fn link_volume(
        &mut self,
        server: &ResourceRef,
        volume_id: &str,
        boot: bool,
    ) -> Result<ServerVolume, ApiError> {
        if let Some(volume) = self.volumes.get_mut(volume_id) {
            if volume
                .server
                .as_ref()
                .is_some_and(|holder| holder.id != server.id)
            {
                return Err(precondition(format!(
                    "volume {volume_id} is already attached"
                )));
            }
            volume.server = Some(server.clone());
            return Ok(ServerVolume {
                id: volume.id.clone(),
                name: volume.name.clone(),
                size: Some(volume.size),
                volume_type: volume.volume_type,
                boot,
                state: Some(volume.state.to_string()),
                zone: volume.zone,
            });
        }
        let volume = self
            .block_volumes
            .get_mut(volume_id)
            .ok_or_else(|| ApiError::not_found("volume", volume_id))?;
        if volume.attached_server().is_some_and(|holder| holder != server.id) {
            return Err(precondition(format!(
                "volume {volume_id} is already attached"
            )));
        }
        if volume.attached_server().is_none() {
            volume.references.push(instance_reference(&server.id));
        }
        volume.status = BlockVolumeStatus::InUse;
        Ok(ServerVolume {
            id: volume.id.clone(),
            name: String::new(),
            size: None,
            volume_type: VolumeType::SbsVolume,
            boot,
            state: Some(String::from("in_use")),
            zone: volume.zone,
        })
    }

    fn unlink_volume(&mut self, volume_id: &str) {
        if let Some(volume) = self.volumes.get_mut(volume_id) {
            volume.server = None;
        }
        if let Some(volume) = self.block_volumes.get_mut(volume_id) {
            volume
                .references
                .retain(|reference| reference.product_resource_type != "instance_server");
            volume.status = BlockVolumeStatus::Available;
        }
    }

    fn snapshot_size(&self, id: &str) -> Option<u64> {
        self.snapshots
            .get(id)
            .map(|snapshot| snapshot.size)
            .or_else(|| self.block_snapshots.get(id).map(|snapshot| snapshot.size))
    }

    fn materialise_volume(
        &mut self,
        zone: Zone,
        project: &str,
        server: &ResourceRef,
        index: &str,
        template: &VolumeServerTemplate,
        root_default: (VolumeType, u64),
    ) -> Result<ServerVolume, ApiError> {
        let boot = template.boot.unwrap_or(index == "0");
        if let Some(id) = template.id.as_deref() {
            return self.link_volume(server, id, boot);
        }
        let volume_type = template.volume_type.unwrap_or(if index == "0" {
            root_default.0
        } else {
            VolumeType::LSsd
        });
        let size = template
            .size
            .or_else(|| {
                template
                    .base_snapshot
                    .as_deref()
                    .and_then(|snapshot| self.snapshot_size(snapshot))
            })
            .unwrap_or(root_default.1);
        let name = template
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{index}", server.name));
        let id = new_id();
        if volume_type == VolumeType::SbsVolume {
            self.block_volumes.insert(
                id.clone(),
                crate::scaleway::BlockVolume {
                    id: id.clone(),
                    name,
                    size,
                    volume_type: String::from("sbs_5k"),
                    status: BlockVolumeStatus::InUse,
                    references: vec![instance_reference(&server.id)],
                    specs: VolumeSpecifications {
                        perf_iops: Some(5000),
                        class: Some(StorageClass::Sbs),
                    },
                    tags: Vec::new(),
                    zone,
                    project_id: project.to_owned(),
                },
            );
            return Ok(ServerVolume {
                id,
                name: String::new(),
                size: None,
                volume_type,
                boot,
                state: Some(String::from("in_use")),
                zone,
            });
        }
        let created = self.tick();
        self.volumes.insert(
            id.clone(),
            Volume {
                id: id.clone(),
                name: name.clone(),
                volume_type,
                size,
                state: VolumeState::Available,
                server: Some(server.clone()),
                zone,
                project: project.to_owned(),
                tags: Vec::new(),
                creation_date: created.clone(),
                modification_date: created,
            },
        );
        Ok(ServerVolume {
            id,
            name,
            size: Some(size),
            volume_type,
            boot,
            state: Some(String::from("available")),
            zone,
        })
    }

    fn default_security_group(&mut self, zone: Zone, project: &str) -> ResourceRef {
        if let Some(existing) = self
            .security_groups
            .values()
            .find(|group| group.project_default && group.project == project && group.zone == zone)
        {
            return ResourceRef {
                id: existing.id.clone(),
                name: existing.name.clone(),
            };
        }
        let id = new_id();
        let name = String::from("Default security group");
        self.security_groups.insert(
            id.clone(),
            SecurityGroup {
                id: id.clone(),
                name: name.clone(),
                description: String::new(),
                stateful: true,
                inbound_default_policy: RuleAction::Accept,
                outbound_default_policy: RuleAction::Accept,
                enable_default_security: true,
                project_default: true,
                tags: Vec::new(),
                servers: Vec::new(),
                zone,
                project: project.to_owned(),
            },
        );
        ResourceRef { id, name }
    }

    fn join_security_group(&mut self, server: &ResourceRef, group_id: &str) -> Result<ResourceRef, ApiError> {
        for group in self.security_groups.values_mut() {
            group.servers.retain(|member| member.id != server.id);
        }
        let group = self
            .security_groups
            .get_mut(group_id)
            .ok_or_else(|| ApiError::not_found("instance_security_group", group_id))?;
        group.servers.push(server.clone());
        Ok(ResourceRef {
            id: group.id.clone(),
            name: group.name.clone(),
        })
    }

    fn attach_ip(&mut self, ip_id: &str, server_id: &str) -> Result<(), ApiError> {
        self.detach_ip(ip_id);
        let server_name = self.server_mut(server_id)?.name.clone();
        let ip = self
            .ips
            .get_mut(ip_id)
            .ok_or_else(|| ApiError::not_found("instance_ip", ip_id))?;
        ip.server = Some(ResourceRef {
            id: server_id.to_owned(),
            name: server_name,
        });
        ip.state = IpState::Attached;
        let entry = ServerIp {
            id: ip.id.clone(),
            address: ip.address.clone(),
            family: String::from(if ip.ip_type == IpType::RoutedIpv6 {
                "inet6"
            } else {
                "inet"
            }),
            dynamic: false,
            netmask: String::from("32"),
            provisioning_mode: String::from("manual"),
        };
        self.server_mut(server_id)?.public_ips.push(entry);
        Ok(())
    }

    fn detach_ip(&mut self, ip_id: &str) {
        let Some(ip) = self.ips.get_mut(ip_id) else {
            return;
        };
        let holder = ip.server.take();
        ip.state = IpState::Detached;
        if let Some(server) = holder.and_then(|reference| self.servers.get_mut(&reference.id)) {
            server.public_ips.retain(|entry| entry.id != ip_id);
        }
    }

    fn release_server(&mut self, id: &str, delete_volumes: bool) -> Result<(), ApiError> {
        let server = self
            .servers
            .remove(id)
            .ok_or_else(|| ApiError::not_found("instance_server", id))?;
        for volume in server.volumes.values() {
            if delete_volumes {
                self.volumes.remove(&volume.id);
                self.block_volumes.remove(&volume.id);
            } else {
                self.unlink_volume(&volume.id);
            }
        }
        for ip in self.ips.values_mut() {
            if ip.server.as_ref().is_some_and(|holder| holder.id == id) {
                ip.server = None;
                ip.state = IpState::Detached;
            }
        }
        for group in self.security_groups.values_mut() {
            group.servers.retain(|member| member.id != id);
        }
        self.private_nics.retain(|_, nic| nic.server_id != id);
        self.user_data.remove(id);
        Ok(())
    }

    fn renumber_volumes(volumes: BTreeMap<String, ServerVolume>) -> BTreeMap<String, ServerVolume> {
        let mut root = None;
        let mut others: Vec<(u32, ServerVolume)> = Vec::new();
        for (key, volume) in volumes {
            if key == "0" {
                root = Some(volume);
            } else {
                others.push((key.parse().unwrap_or(u32::MAX), volume));
            }
        }
        others.sort_by_key(|(index, _)| *index);
        let mut renumbered = BTreeMap::new();
        if let Some(volume) = root {
            renumbered.insert(String::from("0"), volume);
        }
        for (position, (_, volume)) in others.into_iter().enumerate() {
            renumbered.insert(position.saturating_add(1).to_string(), volume);
        }
        renumbered
    }

    fn create_server(&mut self, zone: Zone, request: &CreateServerRequest) -> Result<Server, ApiError> {
        let server_type = self.server_type(&request.commercial_type)?.clone();
        let root_default = if server_type.is_block_only() {
            (VolumeType::SbsVolume, DEFAULT_BLOCK_SIZE)
        } else {
            (
                VolumeType::LSsd,
                server_type.volumes_constraint.unwrap_or_default().max_size,
            )
        };
        let id = new_id();
        let reference = ResourceRef {
            id: id.clone(),
            name: request.name.clone(),
        };
        let mut templates = request.volumes.clone();
        if request.image.is_some() {
            templates.entry(String::from("0")).or_default();
        }
        let mut volumes = BTreeMap::new();
        for (index, template) in &templates {
            let volume = self.materialise_volume(
                zone,
                &request.project,
                &reference,
                index,
                template,
                root_default,
            )?;
            volumes.insert(index.clone(), volume);
        }
        if let Err(err) = self.check_local_size(&request.commercial_type, &volumes) {
            for volume in volumes.values() {
                self.volumes.remove(&volume.id);
                self.block_volumes.remove(&volume.id);
            }
            return Err(err);
        }
        let security_group = match request.security_group.as_deref() {
            Some(group_id) => self.join_security_group(&reference, group_id)?,
            None => {
                let default = self.default_security_group(zone, &request.project);
                self.join_security_group(&reference, &default.id)?
            }
        };
        let created = self.tick();
        let server = Server {
            id: id.clone(),
            name: request.name.clone(),
            organization: request.project.clone(),
            project: request.project.clone(),
            commercial_type: request.commercial_type.clone(),
            image: request.image.as_ref().map(|image| ServerImage {
                id: image.clone(),
                name: String::new(),
            }),
            state: ServerState::Stopped,
            boot_type: request.boot_type.unwrap_or(crate::scaleway::BootType::Local),
            tags: request.tags.clone(),
            security_group: Some(security_group),
            placement_group: request.placement_group.as_ref().map(|group| {
                ServerPlacementGroup {
                    id: group.clone(),
                    policy_respected: true,
                }
            }),
            dynamic_ip_required: request.dynamic_ip_required.unwrap_or_default(),
            routed_ip_enabled: request.routed_ip_enabled.unwrap_or(true),
            enable_ipv6: request.enable_ipv6.unwrap_or_default(),
            volumes,
            public_ips: Vec::new(),
            private_ip: None,
            private_nics: Vec::new(),
            protected: request.protected,
            arch: server_type.arch.clone(),
            zone,
            creation_date: created.clone(),
            modification_date: created,
        };
        self.servers.insert(id.clone(), server);
        for ip_id in &request.public_ips {
            self.attach_ip(ip_id, &id)?;
        }
        self.render_server(&id)
    }

    fn update_server(&mut self, id: &str, request: &UpdateServerRequest) -> Result<Server, ApiError> {
        let current = self.render_server(id)?;
        let reference = ResourceRef {
            id: id.to_owned(),
            name: request.name.clone().unwrap_or_else(|| current.name.clone()),
        };
        if let Some(commercial_type) = &request.commercial_type {
            if current.state != ServerState::Stopped {
                return Err(precondition("server must be stopped to change its type"));
            }
            self.check_local_size(commercial_type, &current.volumes)?;
        }
        if matches!(request.placement_group, Some(Some(_))) && current.state != ServerState::Stopped {
            return Err(precondition(
                "server must be stopped to change its placement group",
            ));
        }
        let security_group = match &request.security_group {
            Some(template) => Some(self.join_security_group(&reference, &template.id)?),
            None => None,
        };
        let volumes = match &request.volumes {
            Some(templates) => {
                let wanted: Vec<&str> = templates
                    .values()
                    .filter_map(|template| template.id.as_deref())
                    .collect();
                for attached in current.volumes.values() {
                    if !wanted.contains(&attached.id.as_str()) {
                        self.unlink_volume(&attached.id);
                    }
                }
                let mut linked = BTreeMap::new();
                for (index, template) in templates {
                    let volume = self.materialise_volume(
                        current.zone,
                        &current.project,
                        &reference,
                        index,
                        template,
                        (VolumeType::LSsd, DEFAULT_BLOCK_SIZE),
                    )?;
                    linked.insert(index.clone(), volume);
                }
                let commercial_type = request
                    .commercial_type
                    .as_deref()
                    .unwrap_or(&current.commercial_type);
                self.check_local_size(commercial_type, &linked)?;
                Some(linked)
            }
            None => None,
        };
        let modified = self.tick();
        let server = self.server_mut(id)?;
        if let Some(name) = &request.name {
            server.name.clone_from(name);
        }
        if let Some(tags) = &request.tags {
            server.tags.clone_from(tags);
        }
        if let Some(group) = security_group {
            server.security_group = Some(group);
        }
        if let Some(dynamic) = request.dynamic_ip_required {
            server.dynamic_ip_required = dynamic;
        }
        if let Some(boot_type) = request.boot_type {
            server.boot_type = boot_type;
        }
        if let Some(placement_group) = &request.placement_group {
            server.placement_group = placement_group.as_ref().map(|group| ServerPlacementGroup {
                id: group.clone(),
                policy_respected: true,
            });
        }
        if let Some(commercial_type) = &request.commercial_type {
            server.commercial_type.clone_from(commercial_type);
        }
        if let Some(linked) = volumes {
            server.volumes = linked;
        }
        if let Some(protected) = request.protected {
            server.protected = protected;
        }
        if let Some(routed) = request.routed_ip_enabled {
            server.routed_ip_enabled = routed;
        }
        if let Some(ipv6) = request.enable_ipv6 {
            server.enable_ipv6 = ipv6;
        }
        server.modification_date = modified;
        self.render_server(id)
    }

    fn run_action(&mut self, id: &str, action: ServerAction) -> Result<Task, ApiError> {
        let server = self.server_mut(id)?;
        let from = server.state;
        if from == ServerState::Locked {
            return Err(precondition(format!("server {id} is locked")));
        }
        let next = match (action, from) {
            (ServerAction::Poweron, ServerState::Stopped | ServerState::StoppedInPlace)
            | (ServerAction::Reboot, ServerState::Running) => ServerState::Running,
            (ServerAction::Poweroff, ServerState::Running | ServerState::StoppedInPlace) => {
                ServerState::Stopped
            }
            (ServerAction::StopInPlace, ServerState::Running) => ServerState::StoppedInPlace,
            (ServerAction::Backup | ServerAction::EnableRoutedIp, state) => state,
            (ServerAction::Terminate, ServerState::Running) => {
                self.release_server(id, true)?;
                return Ok(task(action, id));
            }
            _ => {
                return Err(precondition(format!(
                    "server should not be {from} to {action}"
                )));
            }
        };
        server.state = next;
        if action == ServerAction::EnableRoutedIp {
            server.routed_ip_enabled = true;
        }
        let needs_dynamic_ip = next == ServerState::Running
            && server.dynamic_ip_required
            && server.public_ips.is_empty();
        if needs_dynamic_ip {
            let octet = self.allocate_address();
            self.server_mut(id)?.public_ips.push(ServerIp {
                id: new_id(),
                address: format!("163.172.{}.{}", octet >> 8, octet & 0xff),
                family: String::from("inet"),
                dynamic: true,
                netmask: String::from("32"),
                provisioning_mode: String::from("dhcp"),
            });
        }
        let mut done = task(action, id);
        if action == ServerAction::Backup
            && let Some(image_id) = self.backup_server(id)?
        {
            done.href_result = format!("/images/{image_id}");
        }
        Ok(done)
    }

    fn backup_server(&mut self, id: &str) -> Result<Option<String>, ApiError> {
        let server = self.render_server(id)?;
        let mut snapshots = Vec::new();
        for volume in server.volumes.values() {
            let snapshot = self.snapshot_volume(
                server.zone,
                &CreateSnapshotRequest {
                    name: format!("{}-backup", volume.name),
                    volume_id: Some(volume.id.clone()),
                    project: server.project.clone(),
                    ..CreateSnapshotRequest::default()
                },
            )?;
            snapshots.push(snapshot);
        }
        let Some((root, extra)) = snapshots.split_first() else {
            return Ok(None);
        };
        let created = self.tick();
        let image_id = new_id();
        self.images.insert(
            image_id.clone(),
            Image {
                id: image_id.clone(),
                name: format!("{}-backup", server.name),
                arch: server.arch.clone(),
                root_volume: image_volume(root),
                extra_volumes: extra
                    .iter()
                    .enumerate()
                    .map(|(index, snapshot)| {
                        (index.saturating_add(1).to_string(), image_volume(snapshot))
                    })
                    .collect(),
                tags: Vec::new(),
                public: false,
                state: ImageState::Available,
                from_server: Some(id.to_owned()),
                project: server.project.clone(),
                organization: server.organization.clone(),
                zone: server.zone,
                creation_date: created.clone(),
                modification_date: created,
            },
        );
        Ok(Some(image_id))
    }

    fn snapshot_volume(
        &mut self,
        zone: Zone,
        request: &CreateSnapshotRequest,
    ) -> Result<Snapshot, ApiError> {
        let (size, volume_type, base_volume) = match request.volume_id.as_deref() {
            Some(volume_id) => {
                let volume = self
                    .volumes
                    .get(volume_id)
                    .ok_or_else(|| ApiError::not_found("instance_volume", volume_id))?;
                let volume_type = match volume.volume_type {
                    VolumeType::LSsd => SnapshotVolumeType::LSsd,
                    VolumeType::BSsd => SnapshotVolumeType::BSsd,
                    _ => return Err(invalid("cannot snapshot this volume type")),
                };
                (
                    volume.size,
                    request.volume_type.unwrap_or(volume_type),
                    Some(ResourceRef {
                        id: volume.id.clone(),
                        name: volume.name.clone(),
                    }),
                )
            }
            None => match (&request.bucket, &request.key) {
                (Some(_), Some(_)) => (
                    request.size.unwrap_or(DEFAULT_BLOCK_SIZE),
                    request.volume_type.unwrap_or(SnapshotVolumeType::Unified),
                    None,
                ),
                _ => return Err(invalid("volume_id or bucket and key are required")),
            },
        };
        let created = self.tick();
        let snapshot = Snapshot {
            id: new_id(),
            name: request.name.clone(),
            volume_type,
            size,
            state: SnapshotState::Available,
            base_volume,
            tags: request.tags.clone(),
            zone,
            project: request.project.clone(),
            creation_date: created.clone(),
            modification_date: created,
        };
        self.snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    fn image_volume_for(&self, id: &str) -> Result<ImageVolume, ApiError> {
        if let Some(snapshot) = self.snapshots.get(id) {
            return Ok(image_volume(snapshot));
        }
        self.block_snapshots
            .get(id)
            .map(|snapshot| ImageVolume {
                id: snapshot.id.clone(),
                name: snapshot.name.clone(),
                size: snapshot.size,
                volume_type: String::from("sbs_snapshot"),
            })
            .ok_or_else(|| ApiError::not_found("snapshot", id))
    }

    fn image_volumes(
        &self,
        templates: &BTreeMap<String, ImageVolumeTemplate>,
    ) -> Result<BTreeMap<String, ImageVolume>, ApiError> {
        templates
            .iter()
            .map(|(index, template)| Ok((index.clone(), self.image_volume_for(&template.id)?)))
            .collect()
    }
}

fn image_volume(snapshot: &Snapshot) -> ImageVolume {
    ImageVolume {
        id: snapshot.id.clone(),
        name: snapshot.name.clone(),
        size: snapshot.size,
        volume_type: snapshot.volume_type.to_string(),
    }
}

fn task(action: ServerAction, id: &str) -> Task {
    Task {
        id: new_id(),
        description: action.to_string(),
        status: String::from("success"),
        href_from: format!("/servers/{id}/action"),
        href_result: format!("/servers/{id}"),
    }
}

impl InstanceApi for FakeCloud {
    fn get_server<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, Server> {
        pending(self.call("get_server", format!("get_server {id}"), |state| {
            state.render_server(id)
        }))
    }

    fn list_servers<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Server>> {
        pending(self.call("list_servers", String::from("list_servers"), |state| {
            let ids: Vec<String> = state
                .servers
                .values()
                .filter(|server| filter.matches(&server.name, &server.project, &server.tags))
                .map(|server| server.id.clone())
                .collect();
            ids.iter().map(|id| state.render_server(id)).collect()
        }))
    }

    fn create_server<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateServerRequest,
    ) -> ApiFuture<'a, Server> {
        pending(self.call(
            "create_server",
            format!("create_server {}", request.name),
            |state| state.create_server(zone, request),
        ))
    }

    fn update_server<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateServerRequest,
    ) -> ApiFuture<'a, Server> {
        pending(self.call("update_server", format!("update_server {id}"), |state| {
            state.update_server(id, request)
        }))
    }

    fn delete_server<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call("delete_server", format!("delete_server {id}"), |state| {
            let server = state.render_server(id)?;
            if server.state != ServerState::Stopped {
                return Err(precondition("server should be stopped"));
            }
            state.release_server(id, false)
        }))
    }

    fn server_action<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a ServerActionRequest,
    ) -> ApiFuture<'a, Task> {
        pending(self.call(
            "server_action",
            format!("server_action {} {id}", request.action),
            |state| state.run_action(id, request.action),
        ))
    }

    fn list_server_types(&self, _zone: Zone) -> ApiFuture<'_, Vec<ServerType>> {
        pending(self.call(
            "list_server_types",
            String::from("list_server_types"),
            |state| Ok(state.server_types.clone()),
        ))
    }

    fn server_types_availability(&self, _zone: Zone) -> ApiFuture<'_, BTreeMap<String, String>> {
        pending(self.call(
            "server_types_availability",
            String::from("get_server_types_availability"),
            |state| {
                Ok(state
                    .server_types
                    .iter()
                    .map(|server_type| (server_type.name.clone(), String::from("available")))
                    .collect())
            },
        ))
    }

    fn list_server_user_data<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
    ) -> ApiFuture<'a, Vec<String>> {
        pending(self.call(
            "list_server_user_data",
            format!("list_server_user_data {server_id}"),
            |state| {
                state.render_server(server_id)?;
                Ok(state
                    .user_data
                    .get(server_id)
                    .map(|entries| entries.keys().cloned().collect())
                    .unwrap_or_default())
            },
        ))
    }

    fn get_server_user_data<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, String> {
        pending(self.call(
            "get_server_user_data",
            format!("get_server_user_data {server_id} {key}"),
            |state| {
                state
                    .user_data
                    .get(server_id)
                    .and_then(|entries| entries.get(key))
                    .cloned()
                    .ok_or_else(|| ApiError::not_found("user_data", key))
            },
        ))
    }

    fn set_server_user_data<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        key: &'a str,
        content: &'a str,
    ) -> ApiFuture<'a, ()> {
        pending(self.call(
            "set_server_user_data",
            format!("set_server_user_data {server_id} {key}"),
            |state| {
                state.render_server(server_id)?;
                state
                    .user_data
                    .entry(server_id.to_owned())
                    .or_default()
                    .insert(key.to_owned(), content.to_owned());
                Ok(())
            },
        ))
    }

    fn delete_server_user_data<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, ()> {
        pending(self.call(
            "delete_server_user_data",
            format!("delete_server_user_data {server_id} {key}"),
            |state| {
                state
                    .user_data
                    .get_mut(server_id)
                    .and_then(|entries| entries.remove(key))
                    .map(drop)
                    .ok_or_else(|| ApiError::not_found("user_data", key))
            },
        ))
    }

    fn attach_server_volume<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        volume_id: &'a str,
        _volume_type: VolumeType,
    ) -> ApiFuture<'a, Server> {
        pending(self.call(
            "attach_server_volume",
            format!("attach_server_volume {server_id} {volume_id}"),
            |state| {
                let server = state.render_server(server_id)?;
                let reference = ResourceRef {
                    id: server.id.clone(),
                    name: server.name.clone(),
                };
                let attached = state.link_volume(&reference, volume_id, false)?;
                let mut volumes = server.volumes.clone();
                volumes.insert(volumes.len().to_string(), attached);
                if let Err(err) = state.check_local_size(&server.commercial_type, &volumes) {
                    state.unlink_volume(volume_id);
                    return Err(err);
                }
                state.server_mut(server_id)?.volumes = CloudState::renumber_volumes(volumes);
                state.render_server(server_id)
            },
        ))
    }

    fn detach_server_volume<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> ApiFuture<'a, Server> {
        pending(self.call(
            "detach_server_volume",
            format!("detach_server_volume {server_id} {volume_id}"),
            |state| {
                let server = state.server_mut(server_id)?;
                let volumes: BTreeMap<String, ServerVolume> = server
                    .volumes
                    .clone()
                    .into_iter()
                    .filter(|(_, volume)| volume.id != volume_id)
                    .collect();
                server.volumes = CloudState::renumber_volumes(volumes);
                state.unlink_volume(volume_id);
                state.render_server(server_id)
            },
        ))
    }

    fn get_volume<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, Volume> {
        pending(self.call("get_volume", format!("get_volume {id}"), |state| {
            state
                .volumes
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::not_found("instance_volume", id))
        }))
    }

    fn list_volumes<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Volume>> {
        pending(self.call("list_volumes", String::from("list_volumes"), |state| {
            Ok(state
                .volumes
                .values()
                .filter(|volume| filter.matches(&volume.name, &volume.project, &volume.tags))
                .cloned()
                .collect())
        }))
    }

    fn create_volume<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateVolumeRequest,
    ) -> ApiFuture<'a, Volume> {
        pending(self.call(
            "create_volume",
            format!("create_volume {}", request.name),
            |state| {
                let size = match (request.size, request.base_snapshot.as_deref()) {
                    (Some(size), None) => size,
                    (None, Some(snapshot)) => state
                        .snapshot_size(snapshot)
                        .ok_or_else(|| ApiError::not_found("instance_snapshot", snapshot))?,
                    _ => return Err(invalid("exactly one of size and base_snapshot is required")),
                };
                let created = state.tick();
                let volume = Volume {
                    id: new_id(),
                    name: request.name.clone(),
                    volume_type: request.volume_type.unwrap_or(VolumeType::BSsd),
                    size,
                    state: VolumeState::Available,
                    server: None,
                    zone,
                    project: request.project.clone(),
                    tags: request.tags.clone(),
                    creation_date: created.clone(),
                    modification_date: created,
                };
                state.volumes.insert(volume.id.clone(), volume.clone());
                Ok(volume)
            },
        ))
    }

    fn update_volume<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateVolumeRequest,
    ) -> ApiFuture<'a, Volume> {
        pending(self.call("update_volume", format!("update_volume {id}"), |state| {
            let volume = state
                .volumes
                .get_mut(id)
                .ok_or_else(|| ApiError::not_found("instance_volume", id))?;
            if let Some(size) = request.size {
                if volume.volume_type != VolumeType::BSsd {
                    return Err(invalid("only b_ssd volumes can be resized"));
                }
                if size < volume.size {
                    return Err(invalid("volumes cannot be resized down"));
                }
                volume.size = size;
            }
            if let Some(name) = &request.name {
                volume.name.clone_from(name);
            }
            if let Some(tags) = &request.tags {
                volume.tags.clone_from(tags);
            }
            Ok(volume.clone())
        }))
    }

    fn delete_volume<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call("delete_volume", format!("delete_volume {id}"), |state| {
            let volume = state
                .volumes
                .get(id)
                .ok_or_else(|| ApiError::not_found("instance_volume", id))?;
            if volume.server.is_some() {
                return Err(precondition("volume is attached to a server"));
            }
            state.volumes.remove(id);
            Ok(())
        }))
    }

    fn get_snapshot<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, Snapshot> {
        pending(self.call("get_snapshot", format!("get_snapshot {id}"), |state| {
            state
                .snapshots
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::not_found("instance_snapshot", id))
        }))
    }

    fn list_snapshots<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<Snapshot>> {
        pending(self.call("list_snapshots", String::from("list_snapshots"), |state| {
            Ok(state
                .snapshots
                .values()
                .filter(|snapshot| {
                    filter.matches(&snapshot.name, &snapshot.project, &snapshot.tags)
                })
                .cloned()
                .collect())
        }))
    }

    fn create_snapshot<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateSnapshotRequest,
    ) -> ApiFuture<'a, Snapshot> {
        pending(self.call(
            "create_snapshot",
            format!("create_snapshot {}", request.name),
            |state| state.snapshot_volume(zone, request),
        ))
    }

    fn update_snapshot<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateSnapshotRequest,
    ) -> ApiFuture<'a, Snapshot> {
        pending(self.call("update_snapshot", format!("update_snapshot {id}"), |state| {
            let snapshot = state
                .snapshots
                .get_mut(id)
                .ok_or_else(|| ApiError::not_found("instance_snapshot", id))?;
            if let Some(name) = &request.name {
                snapshot.name.clone_from(name);
            }
            if let Some(tags) = &request.tags {
                snapshot.tags.clone_from(tags);
            }
            Ok(snapshot.clone())
        }))
    }

    fn delete_snapshot<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call("delete_snapshot", format!("delete_snapshot {id}"), |state| {
            state
                .snapshots
                .remove(id)
                .map(drop)
                .ok_or_else(|| ApiError::not_found("instance_snapshot", id))
        }))
    }

    fn export_snapshot<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        location: &'a ObjectLocation,
    ) -> ApiFuture<'a, Task> {
        pending(self.call(
            "export_snapshot",
            format!("export_snapshot {id} {}/{}", location.bucket, location.key),
            |state| {
                state
                    .snapshots
                    .get(id)
                    .ok_or_else(|| ApiError::not_found("instance_snapshot", id))?;
                Ok(Task {
                    id: new_id(),
                    description: String::from("export_snapshot"),
                    status: String::from("success"),
                    href_from: format!("/snapshots/{id}/export"),
                    href_result: format!("{}/{}", location.bucket, location.key),
                })
            },
        ))
    }

    fn get_image<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, Image> {
        pending(self.call("get_image", format!("get_image {id}"), |state| {
            state
                .images
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::not_found("instance_image", id))
        }))
    }

    fn list_images<'a>(&'a self, _zone: Zone, filter: &'a ListFilter) -> ApiFuture<'a, Vec<Image>> {
        pending(self.call("list_images", String::from("list_images"), |state| {
            Ok(state
                .images
                .values()
                .filter(|image| filter.matches(&image.name, &image.project, &image.tags))
                .cloned()
                .collect())
        }))
    }

    fn create_image<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateImageRequest,
    ) -> ApiFuture<'a, Image> {
        pending(self.call(
            "create_image",
            format!("create_image {}", request.name),
            |state| {
                let root_volume = state.image_volume_for(&request.root_volume)?;
                let extra_volumes = state.image_volumes(&request.extra_volumes)?;
                let created = state.tick();
                let image = Image {
                    id: new_id(),
                    name: request.name.clone(),
                    arch: request.arch.clone(),
                    root_volume,
                    extra_volumes,
                    tags: request.tags.clone(),
                    public: request.public,
                    state: ImageState::Available,
                    from_server: None,
                    project: request.project.clone(),
                    organization: request.project.clone(),
                    zone,
                    creation_date: created.clone(),
                    modification_date: created,
                };
                state.images.insert(image.id.clone(), image.clone());
                Ok(image)
            },
        ))
    }

    fn update_image<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateImageRequest,
    ) -> ApiFuture<'a, Image> {
        pending(self.call("update_image", format!("update_image {id}"), |state| {
            let extra_volumes = match &request.extra_volumes {
                Some(templates) => Some(state.image_volumes(templates)?),
                None => None,
            };
            let modified = state.tick();
            let image = state
                .images
                .get_mut(id)
                .ok_or_else(|| ApiError::not_found("instance_image", id))?;
            if let Some(name) = &request.name {
                image.name.clone_from(name);
            }
            if let Some(arch) = &request.arch {
                image.arch.clone_from(arch);
            }
            if let Some(volumes) = extra_volumes {
                image.extra_volumes = volumes;
            }
            if let Some(tags) = &request.tags {
                image.tags.clone_from(tags);
            }
            if let Some(public) = request.public {
                image.public = public;
            }
            image.modification_date = modified;
            Ok(image.clone())
        }))
    }

    fn delete_image<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call("delete_image", format!("delete_image {id}"), |state| {
            state
                .images
                .remove(id)
                .map(drop)
                .ok_or_else(|| ApiError::not_found("instance_image", id))
        }))
    }

    fn get_ip<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, Ip> {
        pending(self.call("get_ip", format!("get_ip {id}"), |state| {
            state.ips.get(id).cloned().ok_or_else(|| ApiError::Forbidden {
                message: format!("insufficient permissions to read ip {id}"),
            })
        }))
    }

    fn list_ips<'a>(&'a self, _zone: Zone, filter: &'a ListFilter) -> ApiFuture<'a, Vec<Ip>> {
        pending(self.call("list_ips", String::from("list_ips"), |state| {
            Ok(state
                .ips
                .values()
                .filter(|ip| filter.matches(&ip.address, &ip.project, &ip.tags))
                .cloned()
                .collect())
        }))
    }

    fn create_ip<'a>(&'a self, zone: Zone, request: &'a CreateIpRequest) -> ApiFuture<'a, Ip> {
        pending(self.call("create_ip", String::from("create_ip"), |state| {
            let ip_type = request.ip_type.unwrap_or(IpType::RoutedIpv4);
            let octet = state.allocate_address();
            let (address, prefix) = if ip_type == IpType::RoutedIpv6 {
                (String::new(), Some(format!("2001:bc8:1::{octet:x}/64")))
            } else {
                (format!("51.15.{}.{}", octet >> 8, octet & 0xff), None)
            };
            let ip = Ip {
                id: new_id(),
                address,
                prefix,
                reverse: None,
                server: None,
                tags: request.tags.clone(),
                ip_type,
                state: IpState::Detached,
                zone,
                project: request.project.clone(),
            };
            state.ips.insert(ip.id.clone(), ip.clone());
            if let Some(server_id) = request.server.as_deref() {
                state.attach_ip(&ip.id, server_id)?;
            }
            state
                .ips
                .get(&ip.id)
                .cloned()
                .ok_or_else(|| ApiError::not_found("instance_ip", &ip.id))
        }))
    }

    fn update_ip<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateIpRequest,
    ) -> ApiFuture<'a, Ip> {
        let mut call = format!("update_ip {id}");
        if let Some(reverse) = render_optional(request.reverse.as_ref()) {
            call.push_str(&format!(" reverse={reverse}"));
        }
        if let Some(server) = render_optional(request.server.as_ref()) {
            call.push_str(&format!(" server={server}"));
        }
        if request.tags.is_some() {
            call.push_str(" tags");
        }
        pending(self.call("update_ip", call, |state| {
            if !state.ips.contains_key(id) {
                return Err(ApiError::not_found("instance_ip", id));
            }
            if let Some(reverse) = &request.reverse {
                if reverse.is_some() && state.unresolved_reverse > 0 {
                    state.unresolved_reverse = state.unresolved_reverse.saturating_sub(1);
                    return Err(invalid(
                        "reverse dns record cannot be resolved, please check the A/AAAA record",
                    ));
                }
                if let Some(ip) = state.ips.get_mut(id) {
                    ip.reverse.clone_from(reverse);
                }
            }
            match &request.server {
                Some(Some(server_id)) => state.attach_ip(id, server_id)?,
                Some(None) => state.detach_ip(id),
                None => {}
            }
            let ip = state
                .ips
                .get_mut(id)
                .ok_or_else(|| ApiError::not_found("instance_ip", id))?;
            if let Some(tags) = &request.tags {
                ip.tags.clone_from(tags);
            }
            Ok(ip.clone())
        }))
    }

    fn delete_ip<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call("delete_ip", format!("delete_ip {id}"), |state| {
            if !state.ips.contains_key(id) {
                return Err(ApiError::not_found("instance_ip", id));
            }
            state.detach_ip(id);
            state.ips.remove(id);
            Ok(())
        }))
    }

    fn get_placement_group<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
    ) -> ApiFuture<'a, PlacementGroup> {
        pending(self.call(
            "get_placement_group",
            format!("get_placement_group {id}"),
            |state| {
                state
                    .placement_groups
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found("instance_placement_group", id))
            },
        ))
    }

    fn list_placement_groups<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<PlacementGroup>> {
        pending(self.call(
            "list_placement_groups",
            String::from("list_placement_groups"),
            |state| {
                Ok(state
                    .placement_groups
                    .values()
                    .filter(|group| filter.matches(&group.name, &group.project, &group.tags))
                    .cloned()
                    .collect())
            },
        ))
    }

    fn create_placement_group<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreatePlacementGroupRequest,
    ) -> ApiFuture<'a, PlacementGroup> {
        pending(self.call(
            "create_placement_group",
            format!("create_placement_group {}", request.name),
            |state| {
                let group = PlacementGroup {
                    id: new_id(),
                    name: request.name.clone(),
                    policy_mode: request.policy_mode,
                    policy_type: request.policy_type,
                    policy_respected: true,
                    tags: request.tags.clone(),
                    zone,
                    project: request.project.clone(),
                };
                state.placement_groups.insert(group.id.clone(), group.clone());
                Ok(group)
            },
        ))
    }

    fn update_placement_group<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdatePlacementGroupRequest,
    ) -> ApiFuture<'a, PlacementGroup> {
        pending(self.call(
            "update_placement_group",
            format!("update_placement_group {id}"),
            |state| {
                let group = state
                    .placement_groups
                    .get_mut(id)
                    .ok_or_else(|| ApiError::not_found("instance_placement_group", id))?;
                if let Some(name) = &request.name {
                    group.name.clone_from(name);
                }
                if let Some(mode) = request.policy_mode {
                    group.policy_mode = mode;
                }
                if let Some(policy_type) = request.policy_type {
                    group.policy_type = policy_type;
                }
                if let Some(tags) = &request.tags {
                    group.tags.clone_from(tags);
                }
                Ok(group.clone())
            },
        ))
    }

    fn delete_placement_group<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call(
            "delete_placement_group",
            format!("delete_placement_group {id}"),
            |state| {
                state
                    .placement_groups
                    .remove(id)
                    .map(drop)
                    .ok_or_else(|| ApiError::not_found("instance_placement_group", id))
            },
        ))
    }

    fn get_security_group<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, SecurityGroup> {
        pending(self.call(
            "get_security_group",
            format!("get_security_group {id}"),
            |state| {
                state
                    .security_groups
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found("instance_security_group", id))
            },
        ))
    }

    fn list_security_groups<'a>(
        &'a self,
        _zone: Zone,
        filter: &'a ListFilter,
    ) -> ApiFuture<'a, Vec<SecurityGroup>> {
        pending(self.call(
            "list_security_groups",
            String::from("list_security_groups"),
            |state| {
                Ok(state
                    .security_groups
                    .values()
                    .filter(|group| filter.matches(&group.name, &group.project, &group.tags))
                    .cloned()
                    .collect())
            },
        ))
    }

    fn create_security_group<'a>(
        &'a self,
        zone: Zone,
        request: &'a CreateSecurityGroupRequest,
    ) -> ApiFuture<'a, SecurityGroup> {
        pending(self.call(
            "create_security_group",
            format!("create_security_group {}", request.name),
            |state| {
                let group = SecurityGroup {
                    id: new_id(),
                    name: request.name.clone(),
                    description: request.description.clone(),
                    stateful: request.stateful,
                    inbound_default_policy: request.inbound_default_policy,
                    outbound_default_policy: request.outbound_default_policy,
                    enable_default_security: request.enable_default_security,
                    project_default: false,
                    tags: request.tags.clone(),
                    servers: Vec::new(),
                    zone,
                    project: request.project.clone(),
                };
                state.security_groups.insert(group.id.clone(), group.clone());
                state.rules.insert(group.id.clone(), Vec::new());
                Ok(group)
            },
        ))
    }

    fn update_security_group<'a>(
        &'a self,
        _zone: Zone,
        id: &'a str,
        request: &'a UpdateSecurityGroupRequest,
    ) -> ApiFuture<'a, SecurityGroup> {
        pending(self.call(
            "update_security_group",
            format!("update_security_group {id}"),
            |state| {
                let group = state
                    .security_groups
                    .get_mut(id)
                    .ok_or_else(|| ApiError::not_found("instance_security_group", id))?;
                if let Some(name) = &request.name {
                    group.name.clone_from(name);
                }
                if let Some(description) = &request.description {
                    group.description.clone_from(description);
                }
                if let Some(stateful) = request.stateful {
                    group.stateful = stateful;
                }
                if let Some(policy) = request.inbound_default_policy {
                    group.inbound_default_policy = policy;
                }
                if let Some(policy) = request.outbound_default_policy {
                    group.outbound_default_policy = policy;
                }
                if let Some(enabled) = request.enable_default_security {
                    group.enable_default_security = enabled;
                }
                if let Some(tags) = &request.tags {
                    group.tags.clone_from(tags);
                }
                Ok(group.clone())
            },
        ))
    }

    fn delete_security_group<'a>(&'a self, _zone: Zone, id: &'a str) -> ApiFuture<'a, ()> {
        pending(self.call(
            "delete_security_group",
            format!("delete_security_group {id}"),
            |state| {
                let group = state
                    .security_groups
                    .get(id)
                    .ok_or_else(|| ApiError::not_found("instance_security_group", id))?;
                if !group.servers.is_empty() {
                    return Err(precondition("security group is in use"));
                }
                state.security_groups.remove(id);
                state.rules.remove(id);
                Ok(())
            },
        ))
    }

    fn list_security_group_rules<'a>(
        &'a self,
        _zone: Zone,
        security_group_id: &'a str,
    ) -> ApiFuture<'a, Vec<SecurityGroupRule>> {
        pending(self.call(
            "list_security_group_rules",
            format!("list_security_group_rules {security_group_id}"),
            |state| {
                if !state.security_groups.contains_key(security_group_id) {
                    return Err(ApiError::not_found(
                        "instance_security_group",
                        security_group_id,
                    ));
                }
                let mut rules = state
                    .rules
                    .get(security_group_id)
                    .cloned()
                    .unwrap_or_default();
                rules.sort_by_key(|rule| rule.position);
                Ok(rules)
            },
        ))
    }

    fn set_security_group_rules<'a>(
        &'a self,
        _zone: Zone,
        security_group_id: &'a str,
        rules: &'a [SetSecurityGroupRule],
    ) -> ApiFuture<'a, Vec<SecurityGroupRule>> {
        pending(self.call(
            "set_security_group_rules",
            format!("set_security_group_rules {security_group_id} {}", rules.len()),
            |state| {
                if !state.security_groups.contains_key(security_group_id) {
                    return Err(ApiError::not_found(
                        "instance_security_group",
                        security_group_id,
                    ));
                }
                let stored = state.rules.entry(security_group_id.to_owned()).or_default();
                stored.retain(|rule| !rule.editable);
                let offset = u32::try_from(stored.len()).unwrap_or(u32::MAX);
                for (index, rule) in rules.iter().enumerate() {
                    let position = offset
                        .saturating_add(u32::try_from(index).unwrap_or(u32::MAX))
                        .saturating_add(1);
                    stored.push(SecurityGroupRule {
                        id: new_id(),
                        direction: rule.direction,
                        position,
                        action: rule.action,
                        protocol: rule.protocol,
                        ip_range: rule.ip_range.clone(),
                        dest_port_from: rule.dest_port_from,
                        dest_port_to: rule.dest_port_to,
                        editable: true,
                    });
                }
                Ok(stored.clone())
            },
        ))
    }

    fn list_private_nics<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
    ) -> ApiFuture<'a, Vec<PrivateNic>> {
        pending(self.call(
            "list_private_nics",
            format!("list_private_nics {server_id}"),
            |state| {
                state.render_server(server_id)?;
                Ok(state
                    .private_nics
                    .values()
                    .filter(|nic| nic.server_id == server_id)
                    .cloned()
                    .collect())
            },
        ))
    }

    fn get_private_nic<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
    ) -> ApiFuture<'a, PrivateNic> {
        pending(self.call(
            "get_private_nic",
            format!("get_private_nic {server_id} {nic_id}"),
            |state| {
                state
                    .private_nics
                    .get(nic_id)
                    .filter(|nic| nic.server_id == server_id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found("instance_private_nic", nic_id))
            },
        ))
    }

    fn create_private_nic<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        request: &'a CreatePrivateNicRequest,
    ) -> ApiFuture<'a, PrivateNic> {
        pending(self.call(
            "create_private_nic",
            format!(
                "create_private_nic {server_id} {}",
                request.private_network_id
            ),
            |state| {
                state.render_server(server_id)?;
                if state.private_nics.values().any(|nic| {
                    nic.server_id == server_id
                        && nic.private_network_id == request.private_network_id
                }) {
                    return Err(ApiError::Conflict {
                        message: String::from("server is already in this private network"),
                    });
                }
                let serial = state.allocate_address();
                let nic = PrivateNic {
                    id: new_id(),
                    server_id: server_id.to_owned(),
                    private_network_id: request.private_network_id.clone(),
                    mac_address: format!("02:00:00:00:{:02x}:{:02x}", serial >> 8, serial & 0xff),
                    state: PrivateNicState::Available,
                    tags: request.tags.clone(),
                };
                state.private_nics.insert(nic.id.clone(), nic.clone());
                Ok(nic)
            },
        ))
    }

    fn update_private_nic<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
        request: &'a UpdatePrivateNicRequest,
    ) -> ApiFuture<'a, PrivateNic> {
        pending(self.call(
            "update_private_nic",
            format!("update_private_nic {server_id} {nic_id}"),
            |state| {
                let nic = state
                    .private_nics
                    .get_mut(nic_id)
                    .filter(|nic| nic.server_id == server_id)
                    .ok_or_else(|| ApiError::not_found("instance_private_nic", nic_id))?;
                if let Some(tags) = &request.tags {
                    nic.tags.clone_from(tags);
                }
                Ok(nic.clone())
            },
        ))
    }

    fn delete_private_nic<'a>(
        &'a self,
        _zone: Zone,
        server_id: &'a str,
        nic_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        pending(self.call(
            "delete_private_nic",
            format!("delete_private_nic {server_id} {nic_id}"),
            |state| {
                let owned = state
                    .private_nics
                    .get(nic_id)
                    .is_some_and(|nic| nic.server_id == server_id);
                if !owned {
                    return Err(ApiError::not_found("instance_private_nic", nic_id));
                }
                state.private_nics.remove(nic_id);
                Ok(())
            },
        ))
    }
}
