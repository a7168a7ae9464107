//! End-to-end server lifecycle against the in-memory cloud.

#[path = "common/harness.rs"]
mod common;

use common::{Harness, bare};
use rstest::{fixture, rstest};
use scaleway_instance::scaleway::ServerState;
use serde_json::{Value, json};

const SERVER: &str = "scaleway_instance_server";
const IP: &str = "scaleway_instance_ip";

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn with(config: &Value, key: &str, value: Value) -> Value {
    let mut updated = config.clone();
    updated[key] = value;
    updated
}

#[rstest]
#[tokio::test]
async fn server_stops_and_restarts_with_the_same_address(harness: Harness) {
    let config = json!({
        "type": "DEV1-S",
        "image": "ubuntu_focal",
        "state": "started",
        "enable_dynamic_ip": true,
    });
    let (id, state) = harness.create(SERVER, config.clone()).await;
    let address = state["public_ip"].as_str().unwrap_or_default().to_owned();
    assert!(!address.is_empty(), "a dynamic address is assigned");
    assert_eq!(state["state"], json!("started"));

    harness.cloud.clear_calls();
    let (_, stopped) = harness
        .update(SERVER, &id, &state, with(&config, "state", json!("stopped")))
        .await;
    assert_eq!(stopped["state"], json!("stopped"));
    assert_eq!(stopped["public_ip"], json!(address));
    assert_eq!(
        harness.cloud.server(bare(&id)).map(|server| server.state),
        Some(ServerState::Stopped)
    );

    let (_, restarted) = harness.update(SERVER, &id, &stopped, config).await;
    assert_eq!(restarted["state"], json!("started"));
    assert_eq!(restarted["public_ip"], json!(address));
    assert_eq!(
        harness.cloud.calls_matching("server_action"),
        [
            format!("server_action poweroff {}", bare(&id)),
            format!("server_action poweron {}", bare(&id)),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn running_server_needs_no_action_to_stay_running(harness: Harness) {
    let config = json!({"type": "DEV1-S", "image": "ubuntu_jammy"});
    let (id, state) = harness.create(SERVER, config.clone()).await;
    harness.cloud.clear_calls();

    harness.update(SERVER, &id, &state, config).await;

    assert!(harness.cloud.calls_matching("server_action").is_empty());
}

#[rstest]
#[tokio::test]
async fn repeated_updates_write_once(harness: Harness) {
    let config = json!({"type": "DEV1-S", "image": "ubuntu_jammy", "tags": ["a"]});
    let (id, state) = harness.create(SERVER, config.clone()).await;
    let retagged = with(&config, "tags", json!(["a", "b"]));
    harness.cloud.clear_calls();

    let (_, first) = harness.update(SERVER, &id, &state, retagged.clone()).await;
    assert_eq!(harness.cloud.calls_matching("update_server").len(), 1);

    harness.cloud.clear_calls();
    harness.update(SERVER, &id, &first, retagged).await;
    assert!(harness.cloud.calls_matching("update_server").is_empty());
}

#[rstest]
#[tokio::test]
async fn consecutive_reads_agree(harness: Harness) {
    let (id, state) = harness
        .create(SERVER, json!({"type": "DEV1-S", "image": "ubuntu_jammy"}))
        .await;

    let first = harness
        .provider
        .read(SERVER, &id, state)
        .await
        .expect("first read")
        .state
        .expect("state");
    let second = harness
        .provider
        .read(SERVER, &id, first.1.clone())
        .await
        .expect("second read")
        .state
        .expect("state");

    assert_eq!(first, second);
}

#[rstest]
#[tokio::test]
async fn reserved_ip_survives_its_server(harness: Harness) {
    let (ip_id, _) = harness.create(IP, json!({})).await;
    let (id, state) = harness
        .create(
            SERVER,
            json!({"type": "DEV1-S", "image": "ubuntu_jammy", "ip_id": ip_id}),
        )
        .await;
    assert_eq!(
        harness
            .cloud
            .ip(bare(&ip_id))
            .and_then(|ip| ip.server)
            .map(|server| server.id),
        Some(bare(&id).to_owned())
    );

    harness.destroy(SERVER, &id, &state).await;

    let ip = harness.cloud.ip(bare(&ip_id)).expect("ip kept");
    assert!(ip.server.is_none());
    let (_, refreshed) = harness
        .provider
        .read(IP, &ip_id, json!({}))
        .await
        .expect("read ip")
        .state
        .expect("ip state");
    assert!(refreshed["server_id"].as_str().unwrap_or_default().is_empty());
}
