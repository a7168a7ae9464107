//! Attaching and detaching a private network through the server resource.

#[path = "common/harness.rs"]
mod harness;

use harness::{Harness, bare};
use rstest::rstest;
use serde_json::json;

const SERVER: &str = "scaleway_instance_server";
const NETWORK: &str = "fr-par/aaaaaaaa-0000-4000-8000-000000000001";

#[rstest]
#[tokio::test]
async fn network_block_adds_and_removes_a_nic() {
    let harness = Harness::new();
    let base = json!({"type": "DEV1-S", "image": "ubuntu_jammy"});
    let (id, state) = harness.create(SERVER, base.clone()).await;

    let mut attached = base.clone();
    attached["private_network"] = json!([{"pn_id": NETWORK}]);
    let (_, with_nic) = harness.update(SERVER, &id, &state, attached).await;

    assert!(
        with_nic["private_network"][0]["mac_address"]
            .as_str()
            .is_some_and(|mac| !mac.is_empty())
    );
    let nics = harness.cloud.private_nics(bare(&id));
    assert_eq!(nics.len(), 1);
    assert_eq!(
        nics.first().map(|nic| nic.private_network_id.as_str()),
        Some(bare(NETWORK))
    );

    let (_, detached) = harness.update(SERVER, &id, &with_nic, base).await;

    assert!(harness.cloud.private_nics(bare(&id)).is_empty());
    assert!(
        detached["private_network"]
            .as_array()
            .is_none_or(Vec::is_empty)
    );
}

#[rstest]
#[tokio::test]
async fn standalone_nic_reports_its_network() {
    let harness = Harness::new();
    let (server, _) = harness
        .create(
            SERVER,
            json!({"type": "DEV1-S", "image": "ubuntu_jammy"}),
        )
        .await;

    let (nic, state) = harness
        .create(
            "scaleway_instance_private_nic",
            json!({"server_id": server, "private_network_id": NETWORK}),
        )
        .await;

    assert!(nic.starts_with(&format!("fr-par-1/{}/", bare(&server))));
    assert_eq!(state["private_network_id"], json!(NETWORK));
    assert!(state["mac_address"].as_str().is_some_and(|mac| !mac.is_empty()));

    harness
        .destroy("scaleway_instance_private_nic", &nic, &state)
        .await;
    assert!(harness.cloud.private_nics(bare(&server)).is_empty());
}
