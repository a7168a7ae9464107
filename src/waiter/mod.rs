//! Polling helpers that wait for remote entities to settle.
//!
//! Waiters only read: they call a fetch closure on a fixed cadence until a
//! terminal predicate holds or the deadline passes. Dropping the returned
//! future cancels both the in-flight request and the loop.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::locality::Zone;
use crate::scaleway::{
    ApiError, BlockApi, BlockSnapshot, BlockSnapshotStatus, BlockVolume, BlockVolumeStatus, Image,
    ImageState, InstanceApi, PrivateNic, PrivateNicState, Server, ServerState, Snapshot,
    SnapshotState, Volume, VolumeState,
};

/// Default delay between two polls.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Default budget for server operations.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default budget for image and snapshot operations.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Default budget for IP and security group operations.
pub const DEFAULT_SHORT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while waiting.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WaitError {
    /// The entity did not reach a terminal state in time.
    #[error("timeout waiting for {resource} {id} (last state: {last_state})")]
    Timeout {
        /// Resource kind.
        resource: String,
        /// Identifier being waited on.
        id: String,
        /// State observed on the final poll.
        last_state: String,
    },
    /// The entity disappeared while waiting for it to settle.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind.
        resource: String,
        /// Identifier being waited on.
        id: String,
    },
    /// A poll failed for another reason.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl WaitError {
    /// Returns `true` when the entity vanished.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
            || matches!(self, Self::Api(ApiError::NotFound { .. }))
    }
}

/// Deadline and cadence of a wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitOptions {
    /// Total budget.
    pub timeout: Duration,
    /// Delay between polls.
    pub retry_interval: Duration,
}

impl WaitOptions {
    /// Builds options from a timeout and a retry interval.
    #[must_use]
    pub const fn new(timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            timeout,
            retry_interval,
        }
    }

    /// Returns a copy with another timeout.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_TIMEOUT, DEFAULT_RETRY_INTERVAL)
    }
}

/// Identifies the entity being waited on, for logs and errors.
#[derive(Clone, Copy, Debug)]
pub struct WaitTarget<'a> {
    /// Resource kind.
    pub resource: &'a str,
    /// Identifier.
    pub id: &'a str,
}

impl<'a> WaitTarget<'a> {
    /// Builds a target.
    #[must_use]
    pub const fn new(resource: &'a str, id: &'a str) -> Self {
        Self { resource, id }
    }

    fn timeout(self, last_state: String) -> WaitError {
        WaitError::Timeout {
            resource: self.resource.to_owned(),
            id: self.id.to_owned(),
            last_state,
        }
    }

    fn not_found(self) -> WaitError {
        WaitError::NotFound {
            resource: self.resource.to_owned(),
            id: self.id.to_owned(),
        }
    }
}

/// Polls `fetch` until `is_terminal` holds.
///
/// # Errors
///
/// Returns [`WaitError::NotFound`] when a poll reports 404,
/// [`WaitError::Timeout`] carrying the last described state when the
/// deadline passes, and [`WaitError::Api`] for any other poll failure.
pub async fn poll_until<T, F, Fut, P, D>(
    target: WaitTarget<'_>,
    options: WaitOptions,
    mut fetch: F,
    is_terminal: P,
    describe: D,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    P: Fn(&T) -> bool,
    D: Fn(&T) -> String,
{
    let deadline = Instant::now() + options.timeout;
    loop {
        let current = match fetch().await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => return Err(target.not_found()),
            Err(err) => return Err(WaitError::Api(err)),
        };
        let state = describe(&current);
        if is_terminal(&current) {
            debug!(resource = target.resource, id = target.id, %state, "reached terminal state");
            return Ok(current);
        }
        if Instant::now() + options.retry_interval > deadline {
            return Err(target.timeout(state));
        }
        debug!(resource = target.resource, id = target.id, %state, "waiting");
        sleep(options.retry_interval).await;
    }
}

/// Polls `fetch` until it reports 404 or `is_gone` holds.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] when the entity is still present at the
/// deadline and [`WaitError::Api`] for any non-404 poll failure.
pub async fn poll_until_gone<T, F, Fut, P, D>(
    target: WaitTarget<'_>,
    options: WaitOptions,
    mut fetch: F,
    is_gone: P,
    describe: D,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    P: Fn(&T) -> bool,
    D: Fn(&T) -> String,
{
    let deadline = Instant::now() + options.timeout;
    loop {
        let current = match fetch().await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(WaitError::Api(err)),
        };
        if is_gone(&current) {
            return Ok(());
        }
        let state = describe(&current);
        if Instant::now() + options.retry_interval > deadline {
            return Err(target.timeout(state));
        }
        debug!(resource = target.resource, id = target.id, %state, "waiting for deletion");
        sleep(options.retry_interval).await;
    }
}

const fn server_is_stable(server: &Server) -> bool {
    !matches!(server.state, ServerState::Starting | ServerState::Stopping)
}

/// Waits until a server leaves `starting`/`stopping`.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_server(
    api: &dyn InstanceApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<Server, WaitError> {
    poll_until(
        WaitTarget::new("server", id),
        options,
        || api.get_server(zone, id),
        server_is_stable,
        |server| server.state.to_string(),
    )
    .await
}

/// Waits until a server is gone.
///
/// # Errors
///
/// See [`poll_until_gone`].
pub async fn wait_for_server_deleted(
    api: &dyn InstanceApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<(), WaitError> {
    poll_until_gone(
        WaitTarget::new("server", id),
        options,
        || api.get_server(zone, id),
        |_| false,
        |server| server.state.to_string(),
    )
    .await
}

/// Waits until an instance volume is no longer transient.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_instance_volume(
    api: &dyn InstanceApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<Volume, WaitError> {
    poll_until(
        WaitTarget::new("instance_volume", id),
        options,
        || api.get_volume(zone, id),
        |volume| matches!(volume.state, VolumeState::Available | VolumeState::Error),
        |volume| volume.state.to_string(),
    )
    .await
}

/// Waits until an instance volume is gone.
///
/// # Errors
///
/// See [`poll_until_gone`].
pub async fn wait_for_instance_volume_deleted(
    api: &dyn InstanceApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<(), WaitError> {
    poll_until_gone(
        WaitTarget::new("instance_volume", id),
        options,
        || api.get_volume(zone, id),
        |_| false,
        |volume| volume.state.to_string(),
    )
    .await
}

fn block_status_name(status: BlockVolumeStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| String::from("unknown"))
}

/// Waits until a block volume reaches a settled status.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_block_volume(
    api: &dyn BlockApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<BlockVolume, WaitError> {
    poll_until(
        WaitTarget::new("block_volume", id),
        options,
        || api.get_block_volume(zone, id),
        |volume| volume.status.is_settled() || volume.status == BlockVolumeStatus::Error,
        |volume| block_status_name(volume.status),
    )
    .await
}

/// Waits until a block volume and every reference to it are settled, so
/// that attach, detach and power actions will be accepted.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_block_volume_and_references(
    api: &dyn BlockApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<BlockVolume, WaitError> {
    poll_until(
        WaitTarget::new("block_volume", id),
        options,
        || api.get_block_volume(zone, id),
        |volume| volume.is_ready() || volume.status == BlockVolumeStatus::Error,
        |volume| {
            let pending = volume
                .references
                .iter()
                .filter(|reference| !reference.status.is_settled())
                .count();
            format!(
                "{} ({pending} pending references)",
                block_status_name(volume.status)
            )
        },
    )
    .await
}

/// Waits until a block volume is gone.
///
/// # Errors
///
/// See [`poll_until_gone`].
pub async fn wait_for_block_volume_deleted(
    api: &dyn BlockApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<(), WaitError> {
    poll_until_gone(
        WaitTarget::new("block_volume", id),
        options,
        || api.get_block_volume(zone, id),
        |volume| volume.status == BlockVolumeStatus::Deleted,
        |volume| block_status_name(volume.status),
    )
    .await
}

/// Waits until an instance snapshot is no longer transient.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_instance_snapshot(
    api: &dyn InstanceApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<Snapshot, WaitError> {
    poll_until(
        WaitTarget::new("instance_snapshot", id),
        options,
        || api.get_snapshot(zone, id),
        |snapshot| {
            !matches!(
                snapshot.state,
                SnapshotState::Snapshotting | SnapshotState::Importing | SnapshotState::Exporting
            )
        },
        |snapshot| snapshot.state.to_string(),
    )
    .await
}

/// Waits until a block snapshot is no longer transient.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_block_snapshot(
    api: &dyn BlockApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<BlockSnapshot, WaitError> {
    poll_until(
        WaitTarget::new("block_snapshot", id),
        options,
        || api.get_block_snapshot(zone, id),
        |snapshot| {
            !matches!(
                snapshot.status,
                BlockSnapshotStatus::Creating
                    | BlockSnapshotStatus::Deleting
                    | BlockSnapshotStatus::Exporting
            )
        },
        |snapshot| format!("{:?}", snapshot.status).to_lowercase(),
    )
    .await
}

/// Waits until an image leaves `creating`.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_image(
    api: &dyn InstanceApi,
    zone: Zone,
    id: &str,
    options: WaitOptions,
) -> Result<Image, WaitError> {
    poll_until(
        WaitTarget::new("instance_image", id),
        options,
        || api.get_image(zone, id),
        |image| image.state != ImageState::Creating,
        |image| image.state.to_string(),
    )
    .await
}

/// Waits until a private NIC leaves `syncing`.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_private_nic(
    api: &dyn InstanceApi,
    zone: Zone,
    server_id: &str,
    nic_id: &str,
    options: WaitOptions,
) -> Result<PrivateNic, WaitError> {
    poll_until(
        WaitTarget::new("private_nic", nic_id),
        options,
        || api.get_private_nic(zone, server_id, nic_id),
        |nic| nic.state != PrivateNicState::Syncing,
        |nic| nic.state.to_string(),
    )
    .await
}

/// Waits until a private NIC has been assigned a MAC address.
///
/// # Errors
///
/// See [`poll_until`].
pub async fn wait_for_mac_address(
    api: &dyn InstanceApi,
    zone: Zone,
    server_id: &str,
    nic_id: &str,
    options: WaitOptions,
) -> Result<PrivateNic, WaitError> {
    poll_until(
        WaitTarget::new("private_nic", nic_id),
        options,
        || api.get_private_nic(zone, server_id, nic_id),
        |nic| !nic.mac_address.is_empty(),
        |nic| format!("{} (mac pending)", nic.state),
    )
    .await
}

/// Waits until a private NIC is gone.
///
/// # Errors
///
/// See [`poll_until_gone`].
pub async fn wait_for_private_nic_deleted(
    api: &dyn InstanceApi,
    zone: Zone,
    server_id: &str,
    nic_id: &str,
    options: WaitOptions,
) -> Result<(), WaitError> {
    poll_until_gone(
        WaitTarget::new("private_nic", nic_id),
        options,
        || api.get_private_nic(zone, server_id, nic_id),
        |_| false,
        |nic| nic.state.to_string(),
    )
    .await
}
