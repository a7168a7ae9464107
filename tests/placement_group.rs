//! Placement group shared by several servers.

#[path = "common/harness.rs"]
mod harness;

use harness::{Harness, bare};
use rstest::rstest;
use serde_json::json;

#[rstest]
#[tokio::test]
async fn enforced_group_is_respected_by_all_members() {
    let harness = Harness::new();
    let (group, _) = harness
        .create(
            "scaleway_instance_placement_group",
            json!({"policy_type": "max_availability", "policy_mode": "enforced"}),
        )
        .await;

    let mut members = Vec::new();
    for name in ["pg-1", "pg-2", "pg-3"] {
        let (id, state) = harness
            .create(
                "scaleway_instance_server",
                json!({
                    "name": name,
                    "type": "DEV1-S",
                    "image": "ubuntu_jammy",
                    "placement_group_id": group,
                }),
            )
            .await;
        assert_eq!(state["placement_group_id"], json!(group));
        assert_eq!(state["placement_group_policy_respected"], json!(true));
        members.push(id);
    }

    for id in &members {
        let server = harness.cloud.server(bare(id)).expect("server");
        let joined = server.placement_group.expect("member of the group");
        assert_eq!(joined.id, bare(&group));
        assert!(joined.policy_respected);
    }
}
