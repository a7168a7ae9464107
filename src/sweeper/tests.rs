//! Unit tests for the sweeper.

use rstest::rstest;
use serde_json::{Value, json};

use super::{ResourceKind, Sweeper, SweeperConfig, SweeperError};
use crate::locality::Zone;
use crate::provider::Provider;
use crate::scaleway::ApiError;
use crate::test_support::{FakeCloud, TEST_PROJECT_ID};

const TAG: &str = "scw-instance-test-run-r1";

async fn create(provider: &Provider, name: &str, config: Value) -> String {
    let plan = provider.plan(name, None, config).await.expect("plan");
    let (id, _) = provider
        .apply(name, None, Some(plan.planned))
        .await
        .expect("apply")
        .state
        .expect("state");
    id.trim_start_matches("fr-par-1/").to_owned()
}

fn sweeper(cloud: &FakeCloud) -> Sweeper {
    let config = SweeperConfig::new(TEST_PROJECT_ID, "r1", vec![Zone::FrPar1])
        .expect("config")
        .with_concurrency(2);
    Sweeper::new(cloud.meta(), config)
}

#[rstest]
fn test_run_tag_uses_prefix() {
    let config = SweeperConfig::new(" project ", " abc ", vec![Zone::FrPar1]).expect("config");

    assert_eq!(config.project_id, "project");
    assert_eq!(config.test_run_tag(), "scw-instance-test-run-abc");
}

#[rstest]
#[case("", "r1", vec![Zone::FrPar1], "project_id")]
#[case("   ", "r1", vec![Zone::FrPar1], "project_id")]
#[case("project", "", vec![Zone::FrPar1], "test_run_id")]
#[case("project", "r1", Vec::new(), "zones")]
fn blank_config_fields_are_rejected(
    #[case] project_id: &str,
    #[case] test_run_id: &str,
    #[case] zones: Vec<Zone>,
    #[case] field: &str,
) {
    let err = SweeperConfig::new(project_id, test_run_id, zones).expect_err("blank field");

    assert_eq!(
        err,
        SweeperError::InvalidConfig {
            field: field.to_owned()
        }
    );
}

#[rstest]
#[tokio::test]
async fn tagged_resources_are_deleted() {
    let cloud = FakeCloud::new();
    let provider = cloud.provider();
    let running = create(
        &provider,
        "scaleway_instance_server",
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "tags": [TAG]}),
    )
    .await;
    let stopped = create(
        &provider,
        "scaleway_instance_server",
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "state": "stopped", "tags": [TAG]}),
    )
    .await;
    let tagged_ip = create(&provider, "scaleway_instance_ip", json!({"tags": [TAG]})).await;
    let kept_ip = create(&provider, "scaleway_instance_ip", json!({"tags": ["keep"]})).await;
    let volume = create(
        &provider,
        "scaleway_instance_volume",
        json!({"type": "b_ssd", "size_in_gb": 20, "tags": [TAG]}),
    )
    .await;
    let group = create(
        &provider,
        "scaleway_instance_security_group",
        json!({"name": "swept", "tags": [TAG]}),
    )
    .await;

    let summary = sweeper(&cloud).sweep().await.expect("sweep");

    assert_eq!(summary.deleted(ResourceKind::Server), 2);
    assert_eq!(summary.deleted(ResourceKind::Ip), 1);
    assert_eq!(summary.deleted(ResourceKind::SecurityGroup), 1);
    assert!(cloud.servers().is_empty());
    assert!(cloud.server(&running).is_none());
    assert!(cloud.server(&stopped).is_none());
    assert!(cloud.ip(&tagged_ip).is_none());
    assert!(cloud.ip(&kept_ip).is_some());
    assert!(cloud.volume(&volume).is_none());
    assert!(cloud.security_group(&group).is_none());
}

#[rstest]
#[tokio::test]
async fn nothing_to_sweep_is_clean() {
    let cloud = FakeCloud::new();

    let summary = sweeper(&cloud).sweep().await.expect("sweep");

    assert_eq!(summary.total(), 0);
    assert!(cloud.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_deletions_are_reported() {
    let cloud = FakeCloud::new();
    let provider = cloud.provider();
    for _ in 0..2 {
        create(&provider, "scaleway_instance_ip", json!({"tags": [TAG]})).await;
    }
    cloud.fail_next(
        "delete_ip",
        ApiError::Conflict {
            message: String::from("ip is busy"),
        },
    );

    let err = sweeper(&cloud).sweep().await.expect_err("failure");

    match err {
        SweeperError::Failures { count, message } => {
            assert_eq!(count, 1);
            assert!(message.contains("ip is busy"), "message: {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
