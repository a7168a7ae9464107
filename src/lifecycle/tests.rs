//! Unit tests for the server lifecycle engine.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::scaleway::{CreateServerRequest, GB, InstanceApi, VolumeServerTemplate};
use crate::test_support::{FakeCloud, TEST_PROJECT_ID, UBUNTU_JAMMY_LOCAL, UBUNTU_JAMMY_SBS};
use crate::volume::VolumeBackend;

const TIMEOUT: Duration = Duration::from_secs(5);

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
}

async fn server(cloud: &FakeCloud, commercial_type: &str) -> Server {
    cloud
        .create_server(
            Zone::FrPar1,
            &CreateServerRequest {
                name: String::from("web"),
                commercial_type: commercial_type.to_owned(),
                image: Some(UBUNTU_JAMMY_LOCAL.to_owned()),
                project: TEST_PROJECT_ID.to_owned(),
                ..CreateServerRequest::default()
            },
        )
        .await
        .expect("create server")
}

fn actions(cloud: &FakeCloud) -> Vec<String> {
    cloud
        .calls_matching("server_action")
        .into_iter()
        .filter_map(|call| call.split(' ').nth(1).map(str::to_owned))
        .collect()
}

#[rstest]
#[case(ServerState::Stopped, TargetState::Started, vec![ServerAction::Poweron])]
#[case(
    ServerState::Stopped,
    TargetState::Standby,
    vec![ServerAction::Poweron, ServerAction::StopInPlace]
)]
#[case(ServerState::Running, TargetState::Stopped, vec![ServerAction::Poweroff])]
#[case(ServerState::Running, TargetState::Standby, vec![ServerAction::StopInPlace])]
#[case(ServerState::StoppedInPlace, TargetState::Started, vec![ServerAction::Poweron])]
#[case(
    ServerState::StoppedInPlace,
    TargetState::Stopped,
    vec![ServerAction::Poweron, ServerAction::Poweroff]
)]
#[case(ServerState::Running, TargetState::Started, vec![])]
#[case(ServerState::Stopped, TargetState::Stopped, vec![])]
#[case(ServerState::StoppedInPlace, TargetState::Standby, vec![])]
fn transitions_follow_the_table(
    #[case] from: ServerState,
    #[case] to: TargetState,
    #[case] expected: Vec<ServerAction>,
) {
    assert_eq!(plan_transition("srv", from, to).expect("known pair"), expected);
}

#[rstest]
#[case(ServerState::Starting)]
#[case(ServerState::Stopping)]
#[case(ServerState::Unknown)]
fn unknown_pairs_are_rejected(#[case] from: ServerState) {
    let err = plan_transition("srv", from, TargetState::Started).expect_err("unknown pair");
    assert!(matches!(err, ProviderError::InvalidTransition { .. }));
}

#[test]
fn locked_servers_are_fatal() {
    let err = plan_transition("srv", ServerState::Locked, TargetState::Stopped)
        .expect_err("locked");
    assert_eq!(
        err,
        ProviderError::ServerLocked {
            id: String::from("srv")
        }
    );
    assert!(err.to_string().contains("contact Scaleway support"));
}

#[rstest]
#[case("started", Some(TargetState::Started))]
#[case("standby", Some(TargetState::Standby))]
#[case("paused", None)]
fn target_states_parse_attribute_values(
    #[case] value: &str,
    #[case] expected: Option<TargetState>,
) {
    assert_eq!(TargetState::parse(value), expected);
}

#[rstest]
#[tokio::test]
async fn reach_state_runs_each_planned_action(cloud: FakeCloud) {
    let created = server(&cloud, "DEV1-S").await;
    cloud.clear_calls();

    let standby = reach_state(&cloud.meta(), Zone::FrPar1, &created.id, TargetState::Standby, TIMEOUT)
        .await
        .expect("reach standby");

    assert_eq!(standby.state, ServerState::StoppedInPlace);
    assert_eq!(actions(&cloud), vec!["poweron", "stop_in_place"]);
}

#[rstest]
#[tokio::test]
async fn reaching_the_current_state_is_a_no_op(cloud: FakeCloud) {
    let created = server(&cloud, "DEV1-S").await;
    let meta = cloud.meta();
    reach_state(&meta, Zone::FrPar1, &created.id, TargetState::Started, TIMEOUT)
        .await
        .expect("start");
    cloud.clear_calls();

    reach_state(&meta, Zone::FrPar1, &created.id, TargetState::Started, TIMEOUT)
        .await
        .expect("start again");

    assert!(cloud.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn volumes_are_waited_before_the_first_action(cloud: FakeCloud) {
    let created = server(&cloud, "DEV1-S").await;
    let root_poll = created
        .root_volume()
        .map(|volume| format!("get_volume {}", volume.id))
        .expect("root volume");
    cloud.clear_calls();

    reach_state(&cloud.meta(), Zone::FrPar1, &created.id, TargetState::Started, TIMEOUT)
        .await
        .expect("start");

    let calls = cloud.calls();
    let volume_poll = calls.iter().position(|call| *call == root_poll);
    let first_action = calls.iter().position(|call| call.starts_with("server_action"));
    assert!(volume_poll.is_some());
    assert!(volume_poll < first_action);
}

#[rstest]
#[tokio::test]
async fn locked_servers_fail_without_actions(cloud: FakeCloud) {
    let created = server(&cloud, "DEV1-S").await;
    cloud.put_server(Server {
        state: ServerState::Locked,
        ..created.clone()
    });
    cloud.clear_calls();

    let err = reach_state(&cloud.meta(), Zone::FrPar1, &created.id, TargetState::Started, TIMEOUT)
        .await
        .expect_err("locked");

    assert!(matches!(err, ProviderError::ServerLocked { .. }));
    assert!(cloud.mutating_calls().is_empty());
}

fn local(size_gb: u64) -> UnknownVolume {
    UnknownVolume::fresh(
        Zone::FrPar1,
        Some(size_gb * GB),
        VolumeBackend::Instance(VolumeType::LSsd),
    )
}

#[rstest]
#[case("DEV1-M", vec![local(20), local(20)], true)]
#[case("DEV1-S", vec![local(20), local(20)], false)]
#[case(
    "DEV1-S",
    vec![local(20), UnknownVolume::fresh(Zone::FrPar1, Some(100 * GB), VolumeBackend::Block)],
    true
)]
fn local_volume_totals_respect_type_bounds(
    #[case] commercial_type: &str,
    #[case] volumes: Vec<UnknownVolume>,
    #[case] fits: bool,
) {
    let server_type = crate::test_support::server_type(commercial_type).expect("fixture type");
    assert_eq!(check_local_volumes(&server_type, &volumes).is_ok(), fits);
}

#[test]
fn constraint_errors_name_both_bounds() {
    let server_type = crate::test_support::server_type("DEV1-S").expect("fixture type");
    let err = check_local_volumes(&server_type, &[local(30)]).expect_err("too large");
    assert_eq!(
        err.to_string(),
        "DEV1-S requires between 0GB and 20GB of local volumes, got 30GB"
    );
}

#[rstest]
#[tokio::test]
async fn migration_restores_the_prior_state(cloud: FakeCloud) {
    let created = server(&cloud, "DEV1-S").await;
    let meta = cloud.meta();
    reach_state(&meta, Zone::FrPar1, &created.id, TargetState::Started, TIMEOUT)
        .await
        .expect("start");
    cloud.clear_calls();

    let migrated = migrate_server_type(&meta, Zone::FrPar1, &created.id, "DEV1-M", TIMEOUT)
        .await
        .expect("migrate");

    assert_eq!(migrated.commercial_type, "DEV1-M");
    assert_eq!(migrated.state, ServerState::Running);
    assert_eq!(actions(&cloud), vec!["poweroff", "poweron"]);
}

#[rstest]
#[tokio::test]
async fn migration_checks_constraints_before_stopping(cloud: FakeCloud) {
    let created = server(&cloud, "DEV1-S").await;
    cloud.clear_calls();

    let err = migrate_server_type(&cloud.meta(), Zone::FrPar1, &created.id, "PLAY2-NANO", TIMEOUT)
        .await
        .expect_err("no local storage on PLAY2-NANO");

    assert!(matches!(err, ProviderError::ServerTypeConstraint { .. }));
    assert!(cloud.mutating_calls().is_empty());
}

#[rstest]
#[case(VolumeType::LSsd, UBUNTU_JAMMY_LOCAL)]
#[case(VolumeType::SbsVolume, UBUNTU_JAMMY_SBS)]
#[tokio::test]
async fn labels_resolve_through_the_marketplace(
    cloud: FakeCloud,
    #[case] root_volume_type: VolumeType,
    #[case] expected: &str,
) {
    let image = resolve_image(&cloud.meta(), Zone::FrPar1, "ubuntu_jammy", "DEV1-S", root_volume_type)
        .await
        .expect("resolve");
    assert_eq!(image, expected);
}

#[rstest]
#[tokio::test]
async fn localized_uuids_bypass_the_marketplace(cloud: FakeCloud) {
    let image = resolve_image(
        &cloud.meta(),
        Zone::FrPar1,
        &format!("fr-par-1/{UBUNTU_JAMMY_LOCAL}"),
        "DEV1-S",
        VolumeType::LSsd,
    )
    .await
    .expect("resolve");
    assert_eq!(image, UBUNTU_JAMMY_LOCAL);
    assert!(cloud.calls_matching("get_local_image_by_label").is_empty());
}

#[rstest]
#[case("ubuntu_jammy", false)]
#[case("ubuntu_focal", true)]
#[case(UBUNTU_JAMMY_LOCAL, false)]
#[case(UBUNTU_JAMMY_SBS, true)]
#[tokio::test]
async fn image_drift_compares_resolved_ids(
    cloud: FakeCloud,
    #[case] desired: &str,
    #[case] drifted: bool,
) {
    let created = server(&cloud, "DEV1-S").await;
    let result = image_drifted(&cloud.meta(), &created, desired, VolumeType::LSsd)
        .await
        .expect("drift check");
    assert_eq!(result, drifted);
}

#[rstest]
#[tokio::test]
async fn server_volumes_lists_root_first(cloud: FakeCloud) {
    let mut volumes = std::collections::BTreeMap::new();
    volumes.insert(
        String::from("1"),
        VolumeServerTemplate {
            size: Some(5 * GB),
            volume_type: Some(VolumeType::SbsVolume),
            ..VolumeServerTemplate::default()
        },
    );
    let created = cloud
        .create_server(
            Zone::FrPar1,
            &CreateServerRequest {
                name: String::from("db"),
                commercial_type: String::from("DEV1-S"),
                image: Some(UBUNTU_JAMMY_LOCAL.to_owned()),
                volumes,
                project: TEST_PROJECT_ID.to_owned(),
                ..CreateServerRequest::default()
            },
        )
        .await
        .expect("create server");

    let listed = server_volumes(&created);

    assert_eq!(listed.len(), 2);
    assert!(listed.first().is_some_and(UnknownVolume::is_local));
    assert!(listed.get(1).is_some_and(UnknownVolume::is_block_volume));
    assert!(
        listed
            .iter()
            .all(|volume| volume.server_id.as_deref() == Some(created.id.as_str()))
    );
}
