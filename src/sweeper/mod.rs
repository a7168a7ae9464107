//! Batch cleanup of test resources.
//!
//! Integration runs against a real account tag everything they create with
//! `scw-instance-test-run-<id>`. The sweeper lists each kind of Instance
//! object carrying that tag across the configured zones, deletes them
//! through a bounded [`WorkerPool`], then lists again and fails if anything
//! tagged remains.

mod types;

use thiserror::Error;
use tracing::{info, warn};

use crate::lifecycle::{TargetState, reach_state, server_volumes, state_of};
use crate::locality::Zone;
use crate::provider::{Meta, ProviderError, Timeouts};
use crate::resources::tolerate_not_found;
use crate::scaleway::{ListFilter, ServerAction, ServerActionRequest};
use crate::volume::delete_unknown_volume;
use crate::waiter::wait_for_server_deleted;
use crate::workerpool::WorkerPool;

pub use types::{ResourceKind, SweepSummary};

/// Environment variable used by test harnesses to identify a test run.
pub const TEST_RUN_ID_ENV: &str = "SCW_INSTANCE_TEST_RUN_ID";

/// Prefix of the tag applied to test resources.
pub const TEST_RUN_TAG_PREFIX: &str = "scw-instance-test-run-";

/// Default number of concurrent deletions.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration of a sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweeperConfig {
    /// Project scoping resource discovery.
    pub project_id: String,
    /// Test run identifier used to build the tag.
    pub test_run_id: String,
    /// Zones to sweep.
    pub zones: Vec<Zone>,
    /// Maximum number of concurrent deletions.
    pub concurrency: usize,
}

impl SweeperConfig {
    /// Builds a config, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SweeperError::InvalidConfig`] when a field is blank or no
    /// zone is given.
    pub fn new(
        project_id: impl Into<String>,
        test_run_id: impl Into<String>,
        zones: Vec<Zone>,
    ) -> Result<Self, SweeperError> {
        let trimmed_project_id = project_id.into().trim().to_owned();
        let trimmed_test_run_id = test_run_id.into().trim().to_owned();
        if trimmed_project_id.is_empty() {
            return Err(SweeperError::InvalidConfig {
                field: String::from("project_id"),
            });
        }
        if trimmed_test_run_id.is_empty() {
            return Err(SweeperError::InvalidConfig {
                field: String::from("test_run_id"),
            });
        }
        if zones.is_empty() {
            return Err(SweeperError::InvalidConfig {
                field: String::from("zones"),
            });
        }
        Ok(Self {
            project_id: trimmed_project_id,
            test_run_id: trimmed_test_run_id,
            zones,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    /// Returns a copy deleting up to `concurrency` objects at once.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Tag carried by the resources of this test run.
    #[must_use]
    pub fn test_run_tag(&self) -> String {
        format!("{TEST_RUN_TAG_PREFIX}{}", self.test_run_id)
    }

    fn filter(&self) -> ListFilter {
        ListFilter {
            name: None,
            project: Some(self.project_id.clone()),
            tags: vec![self.test_run_tag()],
        }
    }
}

/// Errors returned by the sweeper.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SweeperError {
    /// A required configuration value is missing.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the blank field.
        field: String,
    },
    /// Listing tagged resources failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Some deletions failed.
    #[error("{count} deletions failed: {message}")]
    Failures {
        /// Number of failed deletions.
        count: usize,
        /// Failure messages, one per line.
        message: String,
    },
    /// Tagged resources remain after the sweep.
    #[error("resources remain after sweep: {message}")]
    NotClean {
        /// Remaining counts per kind.
        message: String,
    },
}

#[derive(Clone, Debug)]
struct Target {
    kind: ResourceKind,
    zone: Zone,
    id: String,
}

/// Deletes tagged Instance resources through the API seam.
pub struct Sweeper {
    meta: Meta,
    config: SweeperConfig,
}

impl Sweeper {
    /// Creates a sweeper over the given handle.
    #[must_use]
    pub const fn new(meta: Meta, config: SweeperConfig) -> Self {
        Self { meta, config }
    }

    /// Deletes every tagged resource, kind by kind in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`SweeperError::Failures`] when a deletion fails,
    /// [`SweeperError::NotClean`] when tagged resources survive, and
    /// propagates listing failures.
    pub async fn sweep(&self) -> Result<SweepSummary, SweeperError> {
        let tag = self.config.test_run_tag();
        let mut summary = SweepSummary::default();
        let mut failures = Vec::new();

        for kind in ResourceKind::ORDER {
            let targets = self.list(*kind).await?;
            if targets.is_empty() {
                continue;
            }
            info!(%kind, count = targets.len(), %tag, "sweeping");
            let mut pool = WorkerPool::new(self.config.concurrency);
            for target in targets.iter().cloned() {
                let meta = self.meta.clone();
                pool.submit(async move {
                    delete(&meta, &target).await.map_err(|err| {
                        let Target { kind, zone, id } = &target;
                        warn!(%kind, %zone, id = %id, error = %err, "deletion failed");
                        format!("{kind} {zone}/{id}: {err}")
                    })
                });
            }
            let errors = pool.close().await;
            summary.record(*kind, targets.len().saturating_sub(errors.len()));
            failures.extend(errors);
        }

        if !failures.is_empty() {
            return Err(SweeperError::Failures {
                count: failures.len(),
                message: failures.join("\n"),
            });
        }
        self.verify_clean().await?;
        info!(deleted = summary.total(), %tag, "sweep complete");
        Ok(summary)
    }

    async fn verify_clean(&self) -> Result<(), SweeperError> {
        let mut remaining = Vec::new();
        for kind in ResourceKind::ORDER {
            let count = self.list(*kind).await?.len();
            if count > 0 {
                remaining.push(format!("{kind} remaining: {count}"));
            }
        }
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(SweeperError::NotClean {
                message: remaining.join(", "),
            })
        }
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Target>, ProviderError> {
        let filter = self.config.filter();
        let instance = self.meta.instance.as_ref();
        let block = self.meta.block.as_ref();
        let mut targets = Vec::new();
        for zone in self.config.zones.iter().copied() {
            let ids: Vec<String> = match kind {
                ResourceKind::Server => instance
                    .list_servers(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|server| server.id)
                    .collect(),
                ResourceKind::Image => instance
                    .list_images(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|image| image.id)
                    .collect(),
                ResourceKind::Snapshot => instance
                    .list_snapshots(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|snapshot| snapshot.id)
                    .collect(),
                ResourceKind::BlockSnapshot => block
                    .list_block_snapshots(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|snapshot| snapshot.id)
                    .collect(),
                ResourceKind::Volume => instance
                    .list_volumes(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|volume| volume.id)
                    .collect(),
                ResourceKind::BlockVolume => block
                    .list_block_volumes(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|volume| volume.id)
                    .collect(),
                ResourceKind::Ip => instance
                    .list_ips(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|ip| ip.id)
                    .collect(),
                ResourceKind::SecurityGroup => instance
                    .list_security_groups(zone, &filter)
                    .await?
                    .into_iter()
                    .filter(|group| !group.project_default)
                    .map(|group| group.id)
                    .collect(),
                ResourceKind::PlacementGroup => instance
                    .list_placement_groups(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|group| group.id)
                    .collect(),
            };
            targets.extend(ids.into_iter().map(|id| Target {
                kind,
                zone,
                id,
            }));
        }
        Ok(targets)
    }
}

async fn delete(meta: &Meta, target: &Target) -> Result<(), ProviderError> {
    let Target { kind, zone, id } = target;
    let (zone, id) = (*zone, id.as_str());
    let outcome = match kind {
        ResourceKind::Server => return delete_server(meta, zone, id).await,
        ResourceKind::Image => meta.instance.delete_image(zone, id).await,
        ResourceKind::Snapshot => meta.instance.delete_snapshot(zone, id).await,
        ResourceKind::BlockSnapshot => meta.block.delete_block_snapshot(zone, id).await,
        ResourceKind::Volume => meta.instance.delete_volume(zone, id).await,
        ResourceKind::BlockVolume => meta.block.delete_block_volume(zone, id).await,
        ResourceKind::Ip => meta.instance.delete_ip(zone, id).await,
        ResourceKind::SecurityGroup => meta.instance.delete_security_group(zone, id).await,
        ResourceKind::PlacementGroup => meta.instance.delete_placement_group(zone, id).await,
    };
    tolerate_not_found(outcome)
}

/// Running servers are terminated along with their volumes. Other
/// servers are stopped and deleted, then their volumes are deleted one by
/// one.
async fn delete_server(meta: &Meta, zone: Zone, id: &str) -> Result<(), ProviderError> {
    let timeout = Timeouts::server().delete;
    let server = match meta.instance.get_server(zone, id).await {
        Ok(server) => server,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let volumes = if state_of(&server)? == TargetState::Started {
        let request = ServerActionRequest {
            action: ServerAction::Terminate,
            name: None,
        };
        meta.instance.server_action(zone, id, &request).await?;
        Vec::new()
    } else {
        let stopped = reach_state(meta, zone, id, TargetState::Stopped, timeout).await?;
        tolerate_not_found(meta.instance.delete_server(zone, id).await)?;
        server_volumes(&stopped)
    };
    wait_for_server_deleted(meta.instance.as_ref(), zone, id, meta.wait_options(timeout)).await?;
    for volume in &volumes {
        delete_unknown_volume(meta, volume, timeout).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
