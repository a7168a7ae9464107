//! Wire types for the Scaleway Instance API (`/instance/v1`).
//!
//! Only the fields the provider reads or writes are modelled. Unknown enum
//! values decode to an `Unknown` variant so that new remote states do not
//! break decoding; the lifecycle engine rejects them explicitly instead.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locality::Zone;

/// Bytes in one gigabyte as used by the Scaleway API (SI units).
pub const GB: u64 = 1_000_000_000;

macro_rules! api_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                #[serde(rename = $text)]
                $variant,
            )+
            /// Value not known to this client.
            #[serde(other)]
            Unknown,
        }

        impl $name {
            /// Returns the API spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Unknown => "unknown",
                }
            }

            /// Parses the API spelling, returning `None` for unknown input.
            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

api_enum! {
    /// Remote power state of a server.
    ServerState {
        Running => "running",
        Stopped => "stopped",
        StoppedInPlace => "stopped in place",
        Starting => "starting",
        Stopping => "stopping",
        Locked => "locked",
    }
}

api_enum! {
    /// Action accepted by `POST /servers/{id}/action`.
    ServerAction {
        Poweron => "poweron",
        Poweroff => "poweroff",
        StopInPlace => "stop_in_place",
        Reboot => "reboot",
        Terminate => "terminate",
        Backup => "backup",
        EnableRoutedIp => "enable_routed_ip",
    }
}

api_enum! {
    /// Volume backend type as reported on servers and instance volumes.
    VolumeType {
        LSsd => "l_ssd",
        BSsd => "b_ssd",
        Scratch => "scratch",
        SbsVolume => "sbs_volume",
    }
}

api_enum! {
    /// Volume type of an instance snapshot.
    SnapshotVolumeType {
        LSsd => "l_ssd",
        BSsd => "b_ssd",
        Unified => "unified",
    }
}

api_enum! {
    /// Lifecycle state of an instance volume.
    VolumeState {
        Available => "available",
        Snapshotting => "snapshotting",
        Fetching => "fetching",
        Resizing => "resizing",
        Saving => "saving",
        Hotsyncing => "hotsyncing",
        Error => "error",
    }
}

api_enum! {
    /// Lifecycle state of an instance snapshot.
    SnapshotState {
        Available => "available",
        Snapshotting => "snapshotting",
        Error => "error",
        InvalidData => "invalid_data",
        Importing => "importing",
        Exporting => "exporting",
    }
}

api_enum! {
    /// Lifecycle state of an image.
    ImageState {
        Available => "available",
        Creating => "creating",
        Error => "error",
    }
}

api_enum! {
    /// Boot mode of a server.
    BootType {
        Local => "local",
        Bootscript => "bootscript",
        Rescue => "rescue",
    }
}

api_enum! {
    /// Flexible IP flavour.
    IpType {
        Nat => "nat",
        RoutedIpv4 => "routed_ipv4",
        RoutedIpv6 => "routed_ipv6",
    }
}

api_enum! {
    /// Flexible IP attachment state.
    IpState {
        Detached => "detached",
        Attached => "attached",
        Pending => "pending",
        Error => "error",
    }
}

api_enum! {
    /// Whether a placement group policy is best effort or mandatory.
    PlacementGroupPolicyMode {
        Optional => "optional",
        Enforced => "enforced",
    }
}

api_enum! {
    /// Placement strategy of a placement group.
    PlacementGroupPolicyType {
        MaxAvailability => "max_availability",
        LowLatency => "low_latency",
    }
}

api_enum! {
    /// Default or per-rule firewall verdict.
    RuleAction {
        Accept => "accept",
        Drop => "drop",
    }
}

api_enum! {
    /// Traffic direction of a security group rule.
    RuleDirection {
        Inbound => "inbound",
        Outbound => "outbound",
    }
}

api_enum! {
    /// Transport protocol matched by a security group rule.
    RuleProtocol {
        Tcp => "TCP",
        Udp => "UDP",
        Icmp => "ICMP",
        Any => "ANY",
    }
}

api_enum! {
    /// Private NIC state.
    PrivateNicState {
        Available => "available",
        Syncing => "syncing",
        SyncingError => "syncing_error",
    }
}

/// Reference to another resource embedded in a response.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceRef {
    /// Identifier of the referenced resource.
    pub id: String,
    /// Name of the referenced resource.
    #[serde(default)]
    pub name: String,
}

/// Image summary embedded in a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerImage {
    /// Image identifier.
    pub id: String,
    /// Image name.
    #[serde(default)]
    pub name: String,
}

/// Volume attached to a server, keyed by index in [`Server::volumes`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerVolume {
    /// Volume identifier.
    pub id: String,
    /// Volume name (empty for block volumes).
    #[serde(default)]
    pub name: String,
    /// Size in bytes; block volumes do not report it here.
    #[serde(default)]
    pub size: Option<u64>,
    /// Backend type.
    pub volume_type: VolumeType,
    /// Whether the server boots from this volume.
    #[serde(default)]
    pub boot: bool,
    /// Volume state as reported by the instance API.
    #[serde(default)]
    pub state: Option<String>,
    /// Zone of the volume.
    pub zone: Zone,
}

/// Public IP attached to a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerIp {
    /// Flexible IP identifier.
    pub id: String,
    /// IP address.
    pub address: String,
    /// `inet` or `inet6`.
    #[serde(default)]
    pub family: String,
    /// Whether the address was allocated dynamically.
    #[serde(default)]
    pub dynamic: bool,
    /// Prefix length or gateway information.
    #[serde(default)]
    pub netmask: String,
    /// `dhcp`, `slaac`, or `manual`.
    #[serde(default)]
    pub provisioning_mode: String,
}

/// Placement group membership embedded in a server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerPlacementGroup {
    /// Placement group identifier.
    pub id: String,
    /// Whether the group policy is currently satisfied.
    #[serde(default)]
    pub policy_respected: bool,
}

/// Compute instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Server {
    /// Server identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Owning organization.
    #[serde(default)]
    pub organization: String,
    /// Owning project.
    #[serde(default)]
    pub project: String,
    /// Commercial type (for example `DEV1-S`).
    pub commercial_type: String,
    /// Image the server was installed from.
    #[serde(default)]
    pub image: Option<ServerImage>,
    /// Power state.
    pub state: ServerState,
    /// Boot mode.
    #[serde(default = "default_boot_type")]
    pub boot_type: BootType,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Security group the server belongs to.
    #[serde(default)]
    pub security_group: Option<ResourceRef>,
    /// Placement group membership.
    #[serde(default)]
    pub placement_group: Option<ServerPlacementGroup>,
    /// Whether a dynamic IP is required.
    #[serde(default)]
    pub dynamic_ip_required: bool,
    /// Whether routed IPs are enabled (always true for new servers).
    #[serde(default)]
    pub routed_ip_enabled: bool,
    /// Deprecated IPv6 toggle.
    #[serde(default)]
    pub enable_ipv6: bool,
    /// Volumes keyed by index; `"0"` is the root volume.
    #[serde(default)]
    pub volumes: BTreeMap<String, ServerVolume>,
    /// Attached public IPs.
    #[serde(default)]
    pub public_ips: Vec<ServerIp>,
    /// Deprecated private IP.
    #[serde(default)]
    pub private_ip: Option<String>,
    /// Attached private NICs.
    #[serde(default)]
    pub private_nics: Vec<PrivateNic>,
    /// Deletion protection.
    #[serde(default)]
    pub protected: bool,
    /// CPU architecture.
    #[serde(default)]
    pub arch: String,
    /// Zone of the server.
    pub zone: Zone,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub creation_date: String,
    /// RFC 3339 modification timestamp.
    #[serde(default)]
    pub modification_date: String,
}

const fn default_boot_type() -> BootType {
    BootType::Local
}

impl Server {
    /// Returns the root volume (index `"0"`).
    #[must_use]
    pub fn root_volume(&self) -> Option<&ServerVolume> {
        self.volumes.get("0")
    }

    /// Returns additional volumes sorted by numeric index.
    #[must_use]
    pub fn additional_volumes(&self) -> Vec<&ServerVolume> {
        let mut indexed: Vec<(u32, &ServerVolume)> = self
            .volumes
            .iter()
            .filter_map(|(key, volume)| key.parse::<u32>().ok().map(|index| (index, volume)))
            .filter(|(index, _)| *index != 0)
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, volume)| volume).collect()
    }

    /// Returns the first public IPv4 address, if any.
    #[must_use]
    pub fn public_ipv4(&self) -> Option<&ServerIp> {
        self.public_ips.iter().find(|ip| ip.family != "inet6")
    }
}

/// Volume creation template embedded in `CreateServer` and `UpdateServer`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VolumeServerTemplate {
    /// Existing volume to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name of an existing instance volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in bytes for a fresh volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Backend type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<VolumeType>,
    /// Whether the server boots from this volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot: Option<bool>,
    /// Base snapshot of a fresh volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_snapshot: Option<String>,
    /// Project of a fresh volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// `POST /servers` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateServerRequest {
    /// Server name.
    pub name: String,
    /// Commercial type.
    pub commercial_type: String,
    /// Image identifier; omitted when booting from an existing volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Volume templates keyed by index.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeServerTemplate>,
    /// Whether a dynamic IP should be allocated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_ip_required: Option<bool>,
    /// Whether routed IPs are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_ip_enabled: Option<bool>,
    /// Boot mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_type: Option<BootType>,
    /// Flexible IPs to attach at creation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub public_ips: Vec<String>,
    /// Owning project.
    pub project: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Security group identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
    /// Placement group identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_group: Option<String>,
    /// Deletion protection.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub protected: bool,
    /// Deprecated IPv6 toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ipv6: Option<bool>,
}

/// Reference body used when moving a server to another security group.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SecurityGroupTemplate {
    /// Security group identifier.
    pub id: String,
}

/// `PATCH /servers/{id}` body; absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateServerRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New security group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<SecurityGroupTemplate>,
    /// Dynamic IP requirement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_ip_required: Option<bool>,
    /// Boot mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_type: Option<BootType>,
    /// `Some(None)` removes the server from its placement group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_group: Option<Option<String>>,
    /// New commercial type (server must be stopped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commercial_type: Option<String>,
    /// Complete replacement of the volume map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<BTreeMap<String, VolumeServerTemplate>>,
    /// Deletion protection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected: Option<bool>,
    /// Routed IP migration toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_ip_enabled: Option<bool>,
    /// Deprecated IPv6 toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ipv6: Option<bool>,
}

impl UpdateServerRequest {
    /// Returns `true` when no field would be sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// `POST /servers/{id}/action` body.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerActionRequest {
    /// Action to perform.
    pub action: ServerAction,
    /// Name of the backup image (backup only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Asynchronous task handle returned by actions.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Task {
    /// Task identifier.
    #[serde(default)]
    pub id: String,
    /// Task description.
    #[serde(default)]
    pub description: String,
    /// `pending`, `started`, `success`, `failure`, `retry`.
    #[serde(default)]
    pub status: String,
    /// Resource the task started from.
    #[serde(default)]
    pub href_from: String,
    /// Resource produced by the task, for example `/images/<id>`.
    #[serde(default)]
    pub href_result: String,
}

/// Instance (legacy) volume.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Volume {
    /// Volume identifier.
    pub id: String,
    /// Volume name.
    pub name: String,
    /// Backend type.
    pub volume_type: VolumeType,
    /// Size in bytes.
    pub size: u64,
    /// Lifecycle state.
    pub state: VolumeState,
    /// Server the volume is attached to.
    #[serde(default)]
    pub server: Option<ResourceRef>,
    /// Zone of the volume.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project: String,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub creation_date: String,
    /// RFC 3339 modification timestamp.
    #[serde(default)]
    pub modification_date: String,
}

/// `POST /volumes` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateVolumeRequest {
    /// Volume name.
    pub name: String,
    /// Owning project.
    pub project: String,
    /// Backend type.
    pub volume_type: Option<VolumeType>,
    /// Size in bytes; mutually exclusive with `base_snapshot`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Snapshot to restore from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_snapshot: Option<String>,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PATCH /volumes/{id}` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateVolumeRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New size in bytes (grow only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Instance snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Snapshot name.
    pub name: String,
    /// Volume type the snapshot restores to.
    pub volume_type: SnapshotVolumeType,
    /// Size in bytes.
    pub size: u64,
    /// Lifecycle state.
    pub state: SnapshotState,
    /// Volume the snapshot was taken from.
    #[serde(default)]
    pub base_volume: Option<ResourceRef>,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Zone of the snapshot.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project: String,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub creation_date: String,
    /// RFC 3339 modification timestamp.
    #[serde(default)]
    pub modification_date: String,
}

/// `POST /snapshots` body: either `volume_id` or `bucket`/`key` is set.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateSnapshotRequest {
    /// Snapshot name.
    pub name: String,
    /// Source volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<String>,
    /// Target volume type; inferred from the source volume when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<SnapshotVolumeType>,
    /// Object storage bucket for imports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Object key for imports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Imported size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Owning project.
    pub project: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PATCH /snapshots/{id}` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateSnapshotRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Object storage location used for snapshot import and export.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ObjectLocation {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

/// Volume reference inside an image.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageVolume {
    /// Snapshot or volume identifier.
    pub id: String,
    /// Name of the referenced snapshot.
    #[serde(default)]
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Volume type.
    #[serde(default)]
    pub volume_type: String,
}

/// Machine image.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Image {
    /// Image identifier.
    pub id: String,
    /// Image name.
    pub name: String,
    /// CPU architecture.
    pub arch: String,
    /// Root snapshot.
    pub root_volume: ImageVolume,
    /// Extra snapshots keyed by index starting at `"1"`.
    #[serde(default)]
    pub extra_volumes: BTreeMap<String, ImageVolume>,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the image is public.
    #[serde(default)]
    pub public: bool,
    /// Lifecycle state.
    pub state: ImageState,
    /// Server the image was created from.
    #[serde(default)]
    pub from_server: Option<String>,
    /// Owning project.
    #[serde(default)]
    pub project: String,
    /// Owning organization.
    #[serde(default)]
    pub organization: String,
    /// Zone of the image.
    pub zone: Zone,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub creation_date: String,
    /// RFC 3339 modification timestamp.
    #[serde(default)]
    pub modification_date: String,
}

/// Reference to a snapshot used as an extra image volume.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageVolumeTemplate {
    /// Snapshot identifier.
    pub id: String,
}

/// `POST /images` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateImageRequest {
    /// Image name.
    pub name: String,
    /// Root snapshot identifier.
    pub root_volume: String,
    /// CPU architecture.
    pub arch: String,
    /// Extra volumes keyed by index starting at `"1"`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_volumes: BTreeMap<String, ImageVolumeTemplate>,
    /// Owning project.
    pub project: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Whether the image is public.
    pub public: bool,
}

/// `PATCH /images/{id}` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateImageRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New architecture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Atomic replacement of the extra volume map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_volumes: Option<BTreeMap<String, ImageVolumeTemplate>>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Visibility toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

/// Flexible IP.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ip {
    /// IP identifier.
    pub id: String,
    /// Address.
    pub address: String,
    /// CIDR prefix for routed IPv6.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Reverse DNS record.
    #[serde(default)]
    pub reverse: Option<String>,
    /// Server the IP is attached to.
    #[serde(default)]
    pub server: Option<ResourceRef>,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// IP flavour.
    #[serde(rename = "type")]
    pub ip_type: IpType,
    /// Attachment state.
    #[serde(default = "default_ip_state")]
    pub state: IpState,
    /// Zone of the IP.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project: String,
}

const fn default_ip_state() -> IpState {
    IpState::Detached
}

/// `POST /ips` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateIpRequest {
    /// Owning project.
    pub project: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Server to attach to right away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// IP flavour.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ip_type: Option<IpType>,
}

/// `PATCH /ips/{id}` body. `Some(None)` clears a nullable field.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateIpRequest {
    /// Reverse DNS record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<Option<String>>,
    /// Server attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Option<String>>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Placement group.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlacementGroup {
    /// Placement group identifier.
    pub id: String,
    /// Name.
    pub name: String,
    /// Policy mode.
    pub policy_mode: PlacementGroupPolicyMode,
    /// Policy type.
    pub policy_type: PlacementGroupPolicyType,
    /// Whether every member satisfies the policy.
    #[serde(default)]
    pub policy_respected: bool,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Zone of the group.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project: String,
}

/// `POST /placement_groups` body.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreatePlacementGroupRequest {
    /// Name.
    pub name: String,
    /// Owning project.
    pub project: String,
    /// Policy mode.
    pub policy_mode: PlacementGroupPolicyMode,
    /// Policy type.
    pub policy_type: PlacementGroupPolicyType,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PATCH /placement_groups/{id}` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdatePlacementGroupRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New policy mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_mode: Option<PlacementGroupPolicyMode>,
    /// New policy type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<PlacementGroupPolicyType>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Security group.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SecurityGroup {
    /// Security group identifier.
    pub id: String,
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Whether the firewall tracks connections.
    #[serde(default)]
    pub stateful: bool,
    /// Verdict for inbound traffic matching no rule.
    pub inbound_default_policy: RuleAction,
    /// Verdict for outbound traffic matching no rule.
    pub outbound_default_policy: RuleAction,
    /// Whether SMTP is blocked by default.
    #[serde(default)]
    pub enable_default_security: bool,
    /// Whether this is the project default group.
    #[serde(default)]
    pub project_default: bool,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Servers in the group.
    #[serde(default)]
    pub servers: Vec<ResourceRef>,
    /// Zone of the group.
    pub zone: Zone,
    /// Owning project.
    #[serde(default)]
    pub project: String,
}

/// `POST /security_groups` body.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateSecurityGroupRequest {
    /// Name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Owning project.
    pub project: String,
    /// Whether the firewall tracks connections.
    pub stateful: bool,
    /// Inbound default verdict.
    pub inbound_default_policy: RuleAction,
    /// Outbound default verdict.
    pub outbound_default_policy: RuleAction,
    /// Whether SMTP is blocked by default.
    pub enable_default_security: bool,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PATCH /security_groups/{id}` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateSecurityGroupRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stateful toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stateful: Option<bool>,
    /// Inbound default verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_default_policy: Option<RuleAction>,
    /// Outbound default verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_default_policy: Option<RuleAction>,
    /// SMTP blocking toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_default_security: Option<bool>,
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Security group rule as returned by the API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SecurityGroupRule {
    /// Rule identifier.
    pub id: String,
    /// Traffic direction.
    pub direction: RuleDirection,
    /// 1-based position within the group.
    pub position: u32,
    /// Verdict.
    pub action: RuleAction,
    /// Protocol.
    pub protocol: RuleProtocol,
    /// Source or destination CIDR.
    pub ip_range: String,
    /// First destination port.
    #[serde(default)]
    pub dest_port_from: Option<u32>,
    /// Last destination port.
    #[serde(default)]
    pub dest_port_to: Option<u32>,
    /// Whether the rule is user-managed.
    #[serde(default)]
    pub editable: bool,
}

/// Entry of `PUT /security_groups/{id}/rules`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SetSecurityGroupRule {
    /// Verdict.
    pub action: RuleAction,
    /// Protocol.
    pub protocol: RuleProtocol,
    /// Traffic direction.
    pub direction: RuleDirection,
    /// CIDR.
    pub ip_range: String,
    /// First destination port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port_from: Option<u32>,
    /// Last destination port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port_to: Option<u32>,
    /// 1-based position within the direction.
    pub position: u32,
    /// Always `true` for user rules.
    pub editable: bool,
}

/// Private NIC connecting a server to a private network.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PrivateNic {
    /// NIC identifier.
    pub id: String,
    /// Server the NIC belongs to.
    pub server_id: String,
    /// Private network identifier.
    pub private_network_id: String,
    /// MAC address, empty until assigned.
    #[serde(default)]
    pub mac_address: String,
    /// NIC state.
    pub state: PrivateNicState,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `POST /servers/{id}/private_nics` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreatePrivateNicRequest {
    /// Private network identifier.
    pub private_network_id: String,
    /// User tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// IPAM IPs to assign.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipam_ip_ids: Vec<String>,
}

/// `PATCH /servers/{id}/private_nics/{nic}` body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdatePrivateNicRequest {
    /// Replacement tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Size bounds in bytes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VolumeConstraint {
    /// Minimum total size.
    pub min_size: u64,
    /// Maximum total size.
    pub max_size: u64,
}

/// Per-volume constraints of a server type.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PerVolumeConstraint {
    /// Bounds for each local volume.
    #[serde(default)]
    pub l_ssd: Option<VolumeConstraint>,
}

/// Commercial server type.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerType {
    /// Commercial type name, filled from the map key.
    #[serde(default)]
    pub name: String,
    /// Number of vCPUs.
    #[serde(default)]
    pub ncpus: u32,
    /// Memory in bytes.
    #[serde(default)]
    pub ram: u64,
    /// Number of GPUs.
    #[serde(default)]
    pub gpu: u64,
    /// CPU architecture.
    #[serde(default)]
    pub arch: String,
    /// Bounds on the total size of local volumes.
    #[serde(default)]
    pub volumes_constraint: Option<VolumeConstraint>,
    /// Bounds on each local volume.
    #[serde(default)]
    pub per_volume_constraint: Option<PerVolumeConstraint>,
    /// Whether the type is end-of-service.
    #[serde(default)]
    pub end_of_service: bool,
}

impl ServerType {
    /// Returns `true` when the type accepts no local volume at all.
    #[must_use]
    pub fn is_block_only(&self) -> bool {
        self.volumes_constraint
            .is_none_or(|constraint| constraint.max_size == 0)
    }
}

/// Filters shared by the list endpoints.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListFilter {
    /// Name filter (substring match on the API side).
    pub name: Option<String>,
    /// Project filter.
    pub project: Option<String>,
    /// Tags the resources must all carry.
    pub tags: Vec<String>,
}

impl ListFilter {
    /// Filter on name only.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Filter on tags only.
    #[must_use]
    pub fn by_tags(tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Returns `true` when the resource attributes satisfy the filter.
    #[must_use]
    pub fn matches(&self, name: &str, project: &str, tags: &[String]) -> bool {
        self.name.as_deref().is_none_or(|wanted| name.contains(wanted))
            && self.project.as_deref().is_none_or(|wanted| wanted == project)
            && self.tags.iter().all(|tag| tags.contains(tag))
    }

    /// Renders the filter as query parameters.
    #[must_use]
    pub fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(name) = &self.name {
            query.push((String::from("name"), name.clone()));
        }
        if let Some(project) = &self.project {
            query.push((String::from("project"), project.clone()));
        }
        if !self.tags.is_empty() {
            query.push((String::from("tags"), self.tags.join(",")));
        }
        query
    }
}

/// Converts gigabytes to bytes.
#[must_use]
pub const fn gb_to_bytes(size_in_gb: u64) -> u64 {
    size_in_gb.saturating_mul(GB)
}

/// Converts bytes to whole gigabytes, rounding down.
#[must_use]
pub const fn bytes_to_gb(size: u64) -> u64 {
    size.div_euclid(GB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_state_decodes_stopped_in_place() {
        let state: ServerState = serde_json::from_str("\"stopped in place\"").expect("decode");
        assert_eq!(state, ServerState::StoppedInPlace);
    }

    #[test]
    fn unknown_enum_values_decode_to_unknown() {
        let state: ServerState = serde_json::from_str("\"hibernating\"").expect("decode");
        assert_eq!(state, ServerState::Unknown);
    }

    #[test]
    fn rule_protocol_uses_upper_case_on_the_wire() {
        let json = serde_json::to_string(&RuleProtocol::Tcp).expect("encode");
        assert_eq!(json, "\"TCP\"");
    }

    #[test]
    fn update_ip_request_serialises_explicit_null_server() {
        let request = UpdateIpRequest {
            server: Some(None),
            ..UpdateIpRequest::default()
        };
        let json = serde_json::to_string(&request).expect("encode");
        assert_eq!(json, r#"{"server":null}"#);
    }

    #[test]
    fn empty_update_server_request_is_detected() {
        assert!(UpdateServerRequest::default().is_empty());
        let named = UpdateServerRequest {
            name: Some(String::from("web")),
            ..UpdateServerRequest::default()
        };
        assert!(!named.is_empty());
    }

    #[test]
    fn additional_volumes_are_sorted_numerically() {
        let volume = |id: &str| ServerVolume {
            id: id.to_owned(),
            name: String::new(),
            size: Some(GB),
            volume_type: VolumeType::BSsd,
            boot: false,
            state: None,
            zone: Zone::FrPar1,
        };
        let mut volumes = BTreeMap::new();
        volumes.insert(String::from("0"), volume("root"));
        volumes.insert(String::from("10"), volume("ten"));
        volumes.insert(String::from("2"), volume("two"));
        let server = Server {
            id: String::from("srv"),
            name: String::from("srv"),
            organization: String::new(),
            project: String::new(),
            commercial_type: String::from("DEV1-S"),
            image: None,
            state: ServerState::Stopped,
            boot_type: BootType::Local,
            tags: vec![],
            security_group: None,
            placement_group: None,
            dynamic_ip_required: false,
            routed_ip_enabled: true,
            enable_ipv6: false,
            volumes,
            public_ips: vec![],
            private_ip: None,
            private_nics: vec![],
            protected: false,
            arch: String::from("x86_64"),
            zone: Zone::FrPar1,
            creation_date: String::new(),
            modification_date: String::new(),
        };
        let ids: Vec<_> = server
            .additional_volumes()
            .into_iter()
            .map(|volume| volume.id.as_str())
            .collect();
        assert_eq!(ids, vec!["two", "ten"]);
    }

    #[test]
    fn size_conversions_use_si_gigabytes() {
        assert_eq!(gb_to_bytes(20), 20_000_000_000);
        assert_eq!(bytes_to_gb(20_000_000_000), 20);
    }
}
