//! Editing the inline rules of a security group.

#[path = "common/harness.rs"]
mod harness;

use harness::{Harness, bare};
use rstest::rstest;
use scaleway_instance::scaleway::RuleAction;
use serde_json::json;

const GROUP: &str = "scaleway_instance_security_group";

#[rstest]
#[tokio::test]
async fn prepended_rule_renumbers_the_group() {
    let harness = Harness::new();
    let (id, state) = harness
        .create(
            GROUP,
            json!({
                "name": "web",
                "inbound_default_policy": "drop",
                "inbound_rule": [
                    {"action": "accept", "protocol": "TCP", "port": 80, "ip_range": "0.0.0.0/0"},
                    {"action": "drop", "protocol": "TCP", "port": 443, "ip_range": "0.0.0.0/0"},
                ],
            }),
        )
        .await;
    assert_eq!(harness.cloud.rules(bare(&id)).len(), 2);
    harness.cloud.clear_calls();

    let (_, updated) = harness
        .update(
            GROUP,
            &id,
            &state,
            json!({
                "name": "web",
                "inbound_default_policy": "drop",
                "inbound_rule": [
                    {"action": "drop", "protocol": "TCP", "port": 80, "ip_range": "8.8.8.8/32"},
                    {"action": "accept", "protocol": "TCP", "port": 80, "ip_range": "0.0.0.0/0"},
                    {"action": "drop", "protocol": "TCP", "port": 443, "ip_range": "0.0.0.0/0"},
                ],
            }),
        )
        .await;

    let rules: Vec<(u32, RuleAction, String, Option<u32>)> = harness
        .cloud
        .rules(bare(&id))
        .into_iter()
        .map(|rule| (rule.position, rule.action, rule.ip_range, rule.dest_port_from))
        .collect();
    assert_eq!(
        rules,
        [
            (1, RuleAction::Drop, String::from("8.8.8.8/32"), Some(80)),
            (2, RuleAction::Accept, String::from("0.0.0.0/0"), Some(80)),
            (3, RuleAction::Drop, String::from("0.0.0.0/0"), Some(443)),
        ]
    );
    assert_eq!(harness.cloud.calls_matching("set_security_group_rules").len(), 1);
    assert_eq!(updated["inbound_rule"][0]["ip_range"], json!("8.8.8.8/32"));
    assert_eq!(updated["inbound_rule"].as_array().map(Vec::len), Some(3));
}

#[rstest]
#[tokio::test]
async fn separate_rules_resource_owns_an_external_group() {
    let harness = Harness::new();
    let (group, _) = harness
        .create(GROUP, json!({"external_rules": true}))
        .await;

    let (rules_id, rules_state) = harness
        .create(
            "scaleway_instance_security_group_rules",
            json!({
                "security_group_id": group,
                "outbound_rule": [{"action": "drop", "protocol": "UDP", "port": 53}],
            }),
        )
        .await;

    assert_eq!(rules_id, group);
    assert_eq!(harness.cloud.rules(bare(&group)).len(), 1);

    harness
        .destroy("scaleway_instance_security_group_rules", &rules_id, &rules_state)
        .await;
    assert!(harness.cloud.rules(bare(&group)).is_empty());
}
