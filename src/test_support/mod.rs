//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCloud`] keeps every object in memory and implements the three API
//! traits, so resources, waiters and the sweeper can be exercised without a
//! network. Each call is appended to a log (`"server_action poweron <id>"`)
//! that tests assert on, and failures can be scripted per operation.

mod block;
mod instance;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use crate::locality::Zone;
use crate::provider::{Meta, Provider};
use crate::scaleway::{
    ApiError, ApiFuture, BlockSnapshot, BlockVolume, GB, Image, Ip, LocalImage, LocalImageType,
    PerVolumeConstraint, PlacementGroup, PrivateNic, SecurityGroup, SecurityGroupRule, Server,
    ServerType, Snapshot, Volume, VolumeConstraint,
};

/// Project used by [`FakeCloud::meta`].
pub const TEST_PROJECT_ID: &str = "11111111-1111-4111-8111-111111111111";

/// Marketplace image returned for `ubuntu_jammy` on local storage.
pub const UBUNTU_JAMMY_LOCAL: &str = "0a1b2c3d-0000-4000-8000-000000000001";
/// Marketplace image returned for `ubuntu_jammy` on block storage.
pub const UBUNTU_JAMMY_SBS: &str = "0a1b2c3d-0000-4000-8000-000000000002";
/// Marketplace image returned for `ubuntu_focal` on local storage.
pub const UBUNTU_FOCAL_LOCAL: &str = "0a1b2c3d-0000-4000-8000-000000000003";
/// Marketplace image returned for `ubuntu_focal` on block storage.
pub const UBUNTU_FOCAL_SBS: &str = "0a1b2c3d-0000-4000-8000-000000000004";

#[derive(Default)]
struct CloudState {
    servers: BTreeMap<String, Server>,
    user_data: BTreeMap<String, BTreeMap<String, String>>,
    volumes: BTreeMap<String, Volume>,
    snapshots: BTreeMap<String, Snapshot>,
    images: BTreeMap<String, Image>,
    ips: BTreeMap<String, Ip>,
    placement_groups: BTreeMap<String, PlacementGroup>,
    security_groups: BTreeMap<String, SecurityGroup>,
    rules: BTreeMap<String, Vec<SecurityGroupRule>>,
    private_nics: BTreeMap<String, PrivateNic>,
    block_volumes: BTreeMap<String, BlockVolume>,
    block_snapshots: BTreeMap<String, BlockSnapshot>,
    server_types: Vec<ServerType>,
    local_images: Vec<LocalImage>,
    calls: Vec<String>,
    failures: BTreeMap<String, VecDeque<ApiError>>,
    unresolved_reverse: u32,
    next_address: u32,
    clock: u32,
}

impl CloudState {
    fn take_failure(&mut self, operation: &str) -> Option<ApiError> {
        self.failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
    }

    fn allocate_address(&mut self) -> u32 {
        self.next_address = self.next_address.saturating_add(1);
        self.next_address
    }

    fn tick(&mut self) -> String {
        self.clock = self.clock.saturating_add(1);
        format!("2024-01-01T00:00:00.{:06}Z", self.clock)
    }
}

/// In-memory Scaleway cloud.
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    /// Creates a cloud offering the fixture server types and marketplace
    /// images.
    #[must_use]
    pub fn new() -> Self {
        let cloud = Self::default();
        {
            let mut state = cloud.lock();
            state.server_types = fixture_server_types();
            state.local_images = fixture_local_images();
        }
        cloud
    }

    /// Provider handle backed by this cloud, polling every millisecond.
    #[must_use]
    pub fn meta(&self) -> Meta {
        Meta::from_client(Arc::new(self.clone()), Zone::FrPar1, TEST_PROJECT_ID)
            .with_retry_interval(Duration::from_millis(1))
    }

    /// Registry backed by this cloud.
    #[must_use]
    pub fn provider(&self) -> Provider {
        Provider::new(self.meta())
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call`, pops a scripted failure for `operation` if any, then
    /// runs `body` against the state.
    fn call<T>(
        &self,
        operation: &str,
        call: String,
        body: impl FnOnce(&mut CloudState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(err) = state.take_failure(operation) {
            return Err(err);
        }
        body(&mut state)
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls whose log line starts with `prefix`.
    #[must_use]
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Calls that change remote state (everything but `get_` and `list_`).
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|call| !call.starts_with("get_") && !call.starts_with("list_"))
            .cloned()
            .collect()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Makes the next call to `operation` fail with `error`.
    pub fn fail_next(&self, operation: &str, error: ApiError) {
        self.lock()
            .failures
            .entry(operation.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Makes the next `times` reverse DNS updates fail as unresolvable.
    pub fn fail_reverse_resolution(&self, times: u32) {
        self.lock().unresolved_reverse = times;
    }

    /// Stored server.
    #[must_use]
    pub fn server(&self, id: &str) -> Option<Server> {
        self.lock().servers.get(id).cloned()
    }

    /// Stored servers.
    #[must_use]
    pub fn servers(&self) -> Vec<Server> {
        self.lock().servers.values().cloned().collect()
    }

    /// Replaces a stored server, for example to simulate a locked state.
    pub fn put_server(&self, server: Server) {
        self.lock().servers.insert(server.id.clone(), server);
    }

    /// Stored instance volume.
    #[must_use]
    pub fn volume(&self, id: &str) -> Option<Volume> {
        self.lock().volumes.get(id).cloned()
    }

    /// Stored block volume.
    #[must_use]
    pub fn block_volume(&self, id: &str) -> Option<BlockVolume> {
        self.lock().block_volumes.get(id).cloned()
    }

    /// Replaces a stored block volume.
    pub fn put_block_volume(&self, volume: BlockVolume) {
        self.lock().block_volumes.insert(volume.id.clone(), volume);
    }

    /// Stored instance snapshot.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<Snapshot> {
        self.lock().snapshots.get(id).cloned()
    }

    /// Stored block snapshot.
    #[must_use]
    pub fn block_snapshot(&self, id: &str) -> Option<BlockSnapshot> {
        self.lock().block_snapshots.get(id).cloned()
    }

    /// Stored image.
    #[must_use]
    pub fn image(&self, id: &str) -> Option<Image> {
        self.lock().images.get(id).cloned()
    }

    /// Stored flexible IP.
    #[must_use]
    pub fn ip(&self, id: &str) -> Option<Ip> {
        self.lock().ips.get(id).cloned()
    }

    /// Stored security group.
    #[must_use]
    pub fn security_group(&self, id: &str) -> Option<SecurityGroup> {
        self.lock().security_groups.get(id).cloned()
    }

    /// Rules of a security group ordered by position.
    #[must_use]
    pub fn rules(&self, security_group_id: &str) -> Vec<SecurityGroupRule> {
        self.lock()
            .rules
            .get(security_group_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored placement group.
    #[must_use]
    pub fn placement_group(&self, id: &str) -> Option<PlacementGroup> {
        self.lock().placement_groups.get(id).cloned()
    }

    /// Private NICs of a server.
    #[must_use]
    pub fn private_nics(&self, server_id: &str) -> Vec<PrivateNic> {
        self.lock()
            .private_nics
            .values()
            .filter(|nic| nic.server_id == server_id)
            .cloned()
            .collect()
    }

    /// User-data of a server.
    #[must_use]
    pub fn user_data(&self, server_id: &str) -> BTreeMap<String, String> {
        self.lock()
            .user_data
            .get(server_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Fixture server type by commercial name.
#[must_use]
pub fn server_type(name: &str) -> Option<ServerType> {
    fixture_server_types()
        .into_iter()
        .find(|server_type| server_type.name == name)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn pending<'a, T: Send + 'a>(result: Result<T, ApiError>) -> ApiFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

fn local_type(name: &str, ncpus: u32, size_gb: u64) -> ServerType {
    let constraint = VolumeConstraint {
        min_size: 0,
        max_size: size_gb.saturating_mul(GB),
    };
    ServerType {
        name: name.to_owned(),
        ncpus,
        ram: u64::from(ncpus).saturating_mul(2 * GB),
        gpu: 0,
        arch: String::from("x86_64"),
        volumes_constraint: Some(constraint),
        per_volume_constraint: Some(PerVolumeConstraint {
            l_ssd: Some(VolumeConstraint {
                min_size: GB,
                max_size: size_gb.saturating_mul(GB),
            }),
        }),
        end_of_service: false,
    }
}

fn fixture_server_types() -> Vec<ServerType> {
    vec![
        local_type("DEV1-S", 2, 20),
        local_type("DEV1-M", 3, 40),
        local_type("DEV1-L", 4, 80),
        local_type("GP1-XS", 4, 150),
        ServerType {
            name: String::from("PLAY2-NANO"),
            ncpus: 1,
            ram: 2 * GB,
            gpu: 0,
            arch: String::from("x86_64"),
            volumes_constraint: Some(VolumeConstraint::default()),
            per_volume_constraint: None,
            end_of_service: false,
        },
    ]
}

fn fixture_local_images() -> Vec<LocalImage> {
    let compatible: Vec<String> = fixture_server_types()
        .into_iter()
        .map(|server_type| server_type.name)
        .collect();
    [
        ("ubuntu_jammy", LocalImageType::InstanceLocal, UBUNTU_JAMMY_LOCAL),
        ("ubuntu_jammy", LocalImageType::InstanceSbs, UBUNTU_JAMMY_SBS),
        ("ubuntu_focal", LocalImageType::InstanceLocal, UBUNTU_FOCAL_LOCAL),
        ("ubuntu_focal", LocalImageType::InstanceSbs, UBUNTU_FOCAL_SBS),
    ]
    .into_iter()
    .map(|(label, image_type, id)| LocalImage {
        id: id.to_owned(),
        compatible_commercial_types: compatible.clone(),
        arch: String::from("x86_64"),
        zone: Zone::FrPar1,
        label: label.to_owned(),
        image_type,
    })
    .collect()
}
