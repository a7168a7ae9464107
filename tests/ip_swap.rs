//! Swapping the reserved IP of a running server.

#[path = "common/harness.rs"]
mod harness;

use harness::{Harness, bare};
use rstest::rstest;
use serde_json::json;

const SERVER: &str = "scaleway_instance_server";

#[rstest]
#[tokio::test]
async fn old_ip_is_detached_before_the_new_one_is_attached() {
    let harness = Harness::new();
    let (ip_a, _) = harness.create("scaleway_instance_ip", json!({})).await;
    let (ip_b, b_state) = harness.create("scaleway_instance_ip", json!({})).await;
    let config = json!({"type": "DEV1-S", "image": "ubuntu_jammy", "ip_id": ip_a});
    let (id, state) = harness.create(SERVER, config).await;
    harness.cloud.clear_calls();

    let (_, swapped) = harness
        .update(
            SERVER,
            &id,
            &state,
            json!({"type": "DEV1-S", "image": "ubuntu_jammy", "ip_id": ip_b}),
        )
        .await;

    let ip_updates = harness.cloud.calls_matching("update_ip");
    assert_eq!(
        ip_updates,
        [
            format!("update_ip {} server=null", bare(&ip_a)),
            format!("update_ip {} server={}", bare(&ip_b), bare(&id)),
        ]
    );
    assert_eq!(swapped["public_ip"], b_state["address"]);
    assert_eq!(swapped["ip_id"], json!(ip_b));
    assert!(
        harness
            .cloud
            .ip(bare(&ip_a))
            .is_some_and(|ip| ip.server.is_none())
    );
}
