//! Snapshots and images built from a server root volume.

#[path = "common/harness.rs"]
mod common;

use common::{Harness, bare};
use rstest::{fixture, rstest};
use scaleway_instance::provider::ProviderError;
use serde_json::json;

const SERVER: &str = "scaleway_instance_server";

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn local_root(size: u64) -> serde_json::Value {
    json!({
        "type": "DEV1-S",
        "image": "ubuntu_jammy",
        "root_volume": [{"size_in_gb": size, "volume_type": "l_ssd"}],
    })
}

#[rstest]
#[tokio::test]
async fn image_is_built_from_a_root_volume_snapshot(harness: Harness) {
    let (_, server) = harness.create(SERVER, local_root(20)).await;
    let root = server["root_volume"][0]["volume_id"]
        .as_str()
        .expect("root volume id")
        .to_owned();
    assert_eq!(server["root_volume"][0]["size_in_gb"], json!(20));

    let (snapshot, snapshot_state) = harness
        .create("scaleway_instance_snapshot", json!({"volume_id": root}))
        .await;
    assert_eq!(snapshot_state["type"], json!("l_ssd"));

    let (image, image_state) = harness
        .create(
            "scaleway_instance_image",
            json!({"root_volume_id": snapshot, "tags": ["tag1", "tag2"]}),
        )
        .await;

    assert_eq!(image_state["root_volume_id"], json!(snapshot));
    assert_eq!(image_state["architecture"], json!("x86_64"));
    assert_eq!(image_state["public"], json!(false));
    assert_eq!(image_state["tags"], json!(["tag1", "tag2"]));
    let stored = harness.cloud.image(bare(&image)).expect("image");
    assert_eq!(stored.root_volume.id, bare(&snapshot));
}

#[rstest]
#[tokio::test]
async fn resizing_a_local_root_replaces_the_server(harness: Harness) {
    let (id, state) = harness.create(SERVER, local_root(10)).await;

    let plan = harness.plan_update(SERVER, &id, &state, local_root(20)).await;

    assert!(
        plan.requires_replace
            .iter()
            .any(|attribute| attribute == "root_volume.0.size_in_gb"),
        "requires_replace: {:?}",
        plan.requires_replace
    );
}

#[rstest]
#[tokio::test]
async fn scratch_volumes_cannot_be_snapshotted(harness: Harness) {
    let (volume, _) = harness
        .create(
            "scaleway_instance_volume",
            json!({"type": "scratch", "size_in_gb": 20}),
        )
        .await;
    let plan = harness
        .provider
        .plan(
            "scaleway_instance_snapshot",
            None,
            json!({"volume_id": volume}),
        )
        .await
        .expect("plan");
    harness.cloud.clear_calls();

    let err = harness
        .provider
        .apply("scaleway_instance_snapshot", None, Some(plan.planned))
        .await
        .expect_err("scratch snapshot");

    assert!(matches!(err, ProviderError::Volume { .. }), "{err}");
    assert!(harness.cloud.calls_matching("create_snapshot").is_empty());
}
