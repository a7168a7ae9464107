//! Unit tests for rule parsing and reconciliation.

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::scaleway::{CreateSecurityGroupRequest, InstanceApi};
use crate::test_support::{FakeCloud, TEST_PROJECT_ID};

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
}

async fn group(cloud: &FakeCloud) -> String {
    cloud
        .create_security_group(
            Zone::FrPar1,
            &CreateSecurityGroupRequest {
                name: String::from("web"),
                description: String::new(),
                project: TEST_PROJECT_ID.to_owned(),
                stateful: true,
                inbound_default_policy: RuleAction::Accept,
                outbound_default_policy: RuleAction::Accept,
                enable_default_security: true,
                tags: vec![],
            },
        )
        .await
        .expect("create security group")
        .id
}

fn tcp(action: RuleAction, ip_range: &str, port: u32) -> Rule {
    Rule::single_port(action, RuleProtocol::Tcp, ip_range, port)
}

#[rstest]
#[case(json!({"action": "accept", "port": 22}), Some(22), Some(22))]
#[case(json!({"action": "accept", "port_range": "1-1024"}), Some(1), Some(1024))]
#[case(json!({"action": "accept", "port_range": "22-22"}), Some(22), Some(22))]
#[case(json!({"action": "accept"}), None, None)]
fn ports_parse_from_either_attribute(
    #[case] block: Value,
    #[case] from: Option<u32>,
    #[case] to: Option<u32>,
) {
    let rule = parse_rule("inbound_rule.0", &block).expect("valid rule");
    assert_eq!((rule.port_from, rule.port_to), (from, to));
}

#[rstest]
#[case(json!({"action": "drop", "ip": "8.8.8.8"}), "8.8.8.8/32")]
#[case(json!({"action": "drop", "ip": ""}), ANY_IPV4)]
#[case(json!({"action": "drop"}), ANY_IPV4)]
#[case(json!({"action": "drop", "ip_range": "10.0.0.0/8"}), "10.0.0.0/8")]
fn ip_ranges_are_normalised(#[case] block: Value, #[case] expected: &str) {
    let rule = parse_rule("inbound_rule.0", &block).expect("valid rule");
    assert_eq!(rule.ip_range, expected);
}

#[rstest]
#[case(json!({"action": "accept", "port_range": "80"}))]
#[case(json!({"action": "accept", "port_range": "90-80"}))]
#[case(json!({"action": "reject"}))]
fn malformed_blocks_name_the_field(#[case] block: Value) {
    let err = parse_rule("inbound_rule.3", &block).expect_err("invalid rule");
    assert!(
        matches!(err, ProviderError::Validation { field, .. } if field.starts_with("inbound_rule.3"))
    );
}

#[test]
fn absent_ports_compare_as_zero() {
    let open = Rule {
        port_from: None,
        port_to: None,
        ..tcp(RuleAction::Accept, ANY_IPV4, 0)
    };
    let zero = tcp(RuleAction::Accept, ANY_IPV4, 0);
    assert!(rule_equals(&open, &zero));
    assert!(!rule_equals(&open, &tcp(RuleAction::Accept, ANY_IPV4, 80)));
}

#[rstest]
#[case(tcp(RuleAction::Accept, ANY_IPV4, 80), json!({"action": "accept", "protocol": "TCP", "ip_range": ANY_IPV4, "port": 80}))]
#[case(
    Rule { port_to: Some(1024), ..tcp(RuleAction::Drop, ANY_IPV4, 1) },
    json!({"action": "drop", "protocol": "TCP", "ip_range": ANY_IPV4, "port_range": "1-1024"})
)]
#[case(
    Rule { port_from: None, port_to: None, ..tcp(RuleAction::Drop, ANY_IPV4, 0) },
    json!({"action": "drop", "protocol": "TCP", "ip_range": ANY_IPV4})
)]
fn flattening_stores_port_only_for_single_ports(#[case] rule: Rule, #[case] expected: Value) {
    assert_eq!(flatten_rule(&rule), expected);
}

#[test]
fn merge_keeps_equal_state_blocks_and_follows_remote_length() {
    let state = vec![
        json!({"action": "drop", "ip": "8.8.8.8", "port": 80}),
        json!({"action": "accept", "port": 443}),
        json!({"action": "accept", "port": 8080}),
    ];
    let remote = vec![
        tcp(RuleAction::Drop, "8.8.8.8/32", 80),
        tcp(RuleAction::Drop, ANY_IPV4, 443),
    ];

    let merged = merge_rules(&state, &remote);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.first(), state.first());
    assert_eq!(merged.get(1), Some(&flatten_rule(&tcp(RuleAction::Drop, ANY_IPV4, 443))));
}

#[rstest]
#[tokio::test]
async fn reconcile_writes_once_in_the_intended_order(cloud: FakeCloud) {
    let id = group(&cloud).await;
    let meta = cloud.meta();
    let initial = [
        tcp(RuleAction::Accept, ANY_IPV4, 80),
        tcp(RuleAction::Drop, ANY_IPV4, 443),
    ];
    reconcile_security_group_rules(&meta, Zone::FrPar1, &id, &initial, &[])
        .await
        .expect("initial rules");
    cloud.clear_calls();

    let prepended = [
        tcp(RuleAction::Drop, "8.8.8.8/32", 80),
        tcp(RuleAction::Accept, ANY_IPV4, 80),
        tcp(RuleAction::Drop, ANY_IPV4, 443),
    ];
    let wrote = reconcile_security_group_rules(&meta, Zone::FrPar1, &id, &prepended, &[])
        .await
        .expect("prepend");

    assert!(wrote);
    assert_eq!(
        cloud.calls_matching("set_security_group_rules"),
        vec![format!("set_security_group_rules {id} 3")]
    );
    let stored = cloud.rules(&id);
    let positions: Vec<u32> = stored.iter().map(|rule| rule.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
    for (expected, observed) in prepended.iter().zip(&stored) {
        assert!(rule_equals(expected, &Rule::from(observed)));
    }
}

#[rstest]
#[tokio::test]
async fn reconcile_is_silent_when_rules_match(cloud: FakeCloud) {
    let id = group(&cloud).await;
    let meta = cloud.meta();
    let inbound = [tcp(RuleAction::Accept, ANY_IPV4, 22)];
    let outbound = [tcp(RuleAction::Drop, ANY_IPV4, 25)];
    reconcile_security_group_rules(&meta, Zone::FrPar1, &id, &inbound, &outbound)
        .await
        .expect("initial rules");
    cloud.clear_calls();

    let wrote = reconcile_security_group_rules(&meta, Zone::FrPar1, &id, &inbound, &outbound)
        .await
        .expect("second pass");

    assert!(!wrote);
    assert!(cloud.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn read_splits_rules_by_direction(cloud: FakeCloud) {
    let id = group(&cloud).await;
    let meta = cloud.meta();
    reconcile_security_group_rules(
        &meta,
        Zone::FrPar1,
        &id,
        &[tcp(RuleAction::Accept, ANY_IPV4, 22)],
        &[tcp(RuleAction::Drop, ANY_IPV4, 25)],
    )
    .await
    .expect("rules");
    let mut data = ResourceData::from_state(
        format!("fr-par-1/{id}"),
        json!({"inbound_rule": [{"action": "accept", "port": 22}]}),
    );

    read_rules_into(&meta, Zone::FrPar1, &id, &mut data)
        .await
        .expect("read");

    assert_eq!(data.get("inbound_rule"), Some(&json!([{"action": "accept", "port": 22}])));
    assert_eq!(data.get_str("outbound_rule.0.action"), Some("drop"));
    assert_eq!(data.get_i64("outbound_rule.0.port"), Some(25));
}
