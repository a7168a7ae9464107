//! `scaleway_instance_server_action` and `scaleway_instance_server_reboot`.

use std::iter;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::lifecycle::server_action_and_wait;
use crate::locality::Zone;
use crate::provider::{
    Action, Attribute, Meta, ProviderError, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::scaleway::{ServerAction, ServerActionRequest, Task};
use crate::volume::{get_unknown_snapshot, wait_unknown_snapshot};
use crate::waiter::{wait_for_image, wait_for_server};

use super::target;

const ACTIONS: &[&str] = &[
    "poweron",
    "poweroff",
    "stop_in_place",
    "reboot",
    "terminate",
    "backup",
    "enable_routed_ip",
];

/// Runs any power action on a server.
///
/// With `wait`, the action returns once the server settles; a `backup`
/// additionally waits for the image and each of its snapshots.
pub struct ServerPowerAction;

#[derive(Debug, Deserialize)]
struct ServerActionInput {
    server_id: String,
    action: String,
    #[serde(default)]
    wait: bool,
    #[serde(default)]
    name: Option<String>,
}

impl Action for ServerPowerAction {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("server_id")
                .required()
                .validate(Validation::ZonedUuid),
            Attribute::string("action")
                .required()
                .validate(Validation::OneOf(ACTIONS)),
            Attribute::bool("wait").default_value(false),
            Attribute::string("name").describe("Name of the image produced by a backup"),
            Attribute::string("zone").validate(Validation::Zone),
        ])
    }

    fn invoke<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(run_server_action(meta, data))
    }
}

async fn run_server_action(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let input: ServerActionInput = data.decode()?;
    let (zone, server_id) = target(meta, data, &input.server_id)?;
    let action = ServerAction::parse(&input.action).ok_or_else(|| {
        ProviderError::validation("action", format!("unsupported action '{}'", input.action))
    })?;
    let timeout = data.timeouts().default;

    let request = ServerActionRequest {
        action,
        name: input.name,
    };
    let task = meta
        .instance
        .server_action(zone, &server_id, &request)
        .await?;
    info!(%zone, %server_id, %action, "server action requested");

    if !input.wait || action == ServerAction::Terminate {
        return Ok(());
    }
    wait_for_server(
        meta.instance.as_ref(),
        zone,
        &server_id,
        meta.wait_options(timeout),
    )
    .await?;
    if action == ServerAction::Backup {
        wait_backup(meta, zone, &task, timeout).await?;
    }
    Ok(())
}

async fn wait_backup(
    meta: &Meta,
    zone: Zone,
    task: &Task,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let Some(image_id) = task.href_result.strip_prefix("/images/") else {
        debug!(%zone, result = %task.href_result, "backup task names no image");
        return Ok(());
    };
    let image = wait_for_image(
        meta.instance.as_ref(),
        zone,
        image_id,
        meta.wait_options(timeout),
    )
    .await?;
    for volume in iter::once(&image.root_volume).chain(image.extra_volumes.values()) {
        let snapshot = get_unknown_snapshot(meta, zone, &volume.id).await?;
        wait_unknown_snapshot(meta, &snapshot, timeout).await?;
    }
    info!(%zone, image_id, "backup settled");
    Ok(())
}

/// Reboots a server and waits for it to come back.
pub struct ServerRebootAction;

#[derive(Debug, Deserialize)]
struct ServerRebootInput {
    server_id: String,
}

impl Action for ServerRebootAction {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("server_id")
                .required()
                .validate(Validation::ZonedUuid),
            Attribute::string("zone").validate(Validation::Zone),
        ])
    }

    fn invoke<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(reboot(meta, data))
    }
}

async fn reboot(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let input: ServerRebootInput = data.decode()?;
    let (zone, server_id) = target(meta, data, &input.server_id)?;
    server_action_and_wait(
        meta,
        zone,
        &server_id,
        ServerAction::Reboot,
        data.timeouts().default,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use crate::provider::{Provider, ProviderError};
    use crate::scaleway::ServerState;
    use crate::test_support::FakeCloud;

    const ACTION: &str = "scaleway_instance_server_action";

    struct Running {
        cloud: FakeCloud,
        provider: Provider,
        id: String,
    }

    impl Running {
        fn bare_id(&self) -> &str {
            self.id.trim_start_matches("fr-par-1/")
        }
    }

    #[fixture]
    async fn running() -> Running {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let config = json!({"type": "DEV1-S", "image": "ubuntu_jammy"});
        let plan = provider
            .plan("scaleway_instance_server", None, config)
            .await
            .expect("plan");
        let (id, _) = provider
            .apply("scaleway_instance_server", None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state");
        cloud.clear_calls();
        Running {
            cloud,
            provider,
            id,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn poweroff_waits_for_the_server(#[future] running: Running) {
        let running = running.await;

        running
            .provider
            .invoke(
                ACTION,
                json!({"server_id": running.id, "action": "poweroff", "wait": true}),
            )
            .await
            .expect("poweroff");

        let server = running.cloud.server(running.bare_id()).expect("server");
        assert_eq!(server.state, ServerState::Stopped);
        assert!(!running.cloud.calls_matching("get_server").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn terminate_does_not_wait(#[future] running: Running) {
        let running = running.await;

        running
            .provider
            .invoke(
                ACTION,
                json!({"server_id": running.id, "action": "terminate", "wait": true}),
            )
            .await
            .expect("terminate");

        assert!(running.cloud.calls_matching("get_server").is_empty());
        assert!(running.cloud.server(running.bare_id()).is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn backup_waits_for_each_snapshot(#[future] running: Running) {
        let running = running.await;

        running
            .provider
            .invoke(
                ACTION,
                json!({"server_id": running.id, "action": "backup", "wait": true}),
            )
            .await
            .expect("backup");

        assert_eq!(running.cloud.calls_matching("get_image").len(), 1);
        assert!(!running.cloud.calls_matching("get_snapshot").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_actions_are_rejected(#[future] running: Running) {
        let running = running.await;

        let err = running
            .provider
            .invoke(ACTION, json!({"server_id": running.id, "action": "explode"}))
            .await
            .expect_err("unknown action");

        assert!(matches!(err, ProviderError::Validation { .. }));
        assert!(running.cloud.calls_matching("server_action").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn reboot_returns_a_running_server(#[future] running: Running) {
        let running = running.await;

        running
            .provider
            .invoke("scaleway_instance_server_reboot", json!({"server_id": running.id}))
            .await
            .expect("reboot");

        assert_eq!(
            running.cloud.calls_matching("server_action"),
            [format!("server_action reboot {}", running.bare_id())]
        );
    }
}
