//! Unit tests for the server resource.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use crate::locality::expand_id;
use crate::provider::{Provider, ProviderError};
use crate::scaleway::{CreateIpRequest, InstanceApi, ServerState};
use crate::test_support::{FakeCloud, TEST_PROJECT_ID, UBUNTU_JAMMY_LOCAL};

const SERVER: &str = "scaleway_instance_server";

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
}

async fn create(provider: &Provider, config: Value) -> (String, Value) {
    let plan = provider.plan(SERVER, None, config).await.expect("plan");
    provider
        .apply(SERVER, None, Some(plan.planned))
        .await
        .expect("apply")
        .state
        .expect("created state")
}

async fn update(provider: &Provider, id: &str, state: &Value, config: Value) -> (String, Value) {
    let plan = provider
        .plan(SERVER, Some((id, state)), config)
        .await
        .expect("plan");
    assert!(plan.requires_replace.is_empty(), "unexpected replacement");
    provider
        .apply(SERVER, Some((id, state)), Some(plan.planned))
        .await
        .expect("apply")
        .state
        .expect("updated state")
}

fn bare(id: &str) -> String {
    expand_id(id).to_owned()
}

async fn reserved_ip(cloud: &FakeCloud) -> String {
    cloud
        .create_ip(
            crate::locality::Zone::FrPar1,
            &CreateIpRequest {
                project: TEST_PROJECT_ID.to_owned(),
                ..CreateIpRequest::default()
            },
        )
        .await
        .expect("create ip")
        .id
}

#[rstest]
#[tokio::test]
async fn create_starts_the_server_with_a_dynamic_address(cloud: FakeCloud) {
    let provider = cloud.provider();

    let (id, state) = create(
        &provider,
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "enable_dynamic_ip": true}),
    )
    .await;

    assert!(id.starts_with("fr-par-1/"));
    assert_eq!(state["state"], json!("started"));
    assert_eq!(state["image"], json!("ubuntu_jammy"));
    assert_eq!(state["root_volume"][0]["volume_type"], json!("l_ssd"));
    assert_eq!(state["root_volume"][0]["delete_on_termination"], json!(true));
    assert!(state["public_ip"].as_str().is_some_and(|ip| ip.starts_with("163.172.")));
    assert_eq!(state["ip_ids"], json!([]));
    let server = cloud.server(&bare(&id)).expect("server");
    assert_eq!(server.state, ServerState::Running);
    assert_eq!(server.image.map(|image| image.id), Some(UBUNTU_JAMMY_LOCAL.to_owned()));
    assert!(
        state["name"]
            .as_str()
            .is_some_and(|name| name.starts_with("tf-srv-"))
    );
}

#[rstest]
#[tokio::test]
async fn create_requires_an_image_or_a_root_volume(cloud: FakeCloud) {
    let provider = cloud.provider();
    let plan = provider
        .plan(SERVER, None, json!({"type": "DEV1-S"}))
        .await
        .expect("plan");

    let err = provider
        .apply(SERVER, None, Some(plan.planned))
        .await
        .expect_err("missing image");

    assert!(matches!(err, ProviderError::Validation { field, .. } if field == "image"));
    assert!(cloud.calls_matching("create_server").is_empty());
}

#[rstest]
#[tokio::test]
async fn oversized_local_volumes_fail_before_any_mutation(cloud: FakeCloud) {
    let provider = cloud.provider();
    let plan = provider
        .plan(
            SERVER,
            None,
            json!({
                "type": "DEV1-S",
                "image": "ubuntu_jammy",
                "root_volume": [{"size_in_gb": 30}],
            }),
        )
        .await
        .expect("plan");

    let err = provider
        .apply(SERVER, None, Some(plan.planned))
        .await
        .expect_err("too large");

    assert!(matches!(
        err,
        ProviderError::ServerTypeConstraint { max_gb: 20, total_gb: 30, .. }
    ));
    assert!(cloud.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn stopping_issues_a_single_poweroff(cloud: FakeCloud) {
    let provider = cloud.provider();
    let config = json!({"type": "DEV1-S", "image": "ubuntu_jammy"});
    let (id, state) = create(&provider, config.clone()).await;
    cloud.clear_calls();

    let mut stopped = config;
    stopped["state"] = json!("stopped");
    let (_, state) = update(&provider, &id, &state, stopped).await;

    assert_eq!(state["state"], json!("stopped"));
    assert_eq!(
        cloud.calls_matching("server_action"),
        vec![format!("server_action poweroff {}", bare(&id))]
    );
}

#[rstest]
#[tokio::test]
async fn type_change_migrates_in_place_and_restarts(cloud: FakeCloud) {
    let provider = cloud.provider();
    let (id, state) = create(&provider, json!({"type": "DEV1-S", "image": "ubuntu_jammy"})).await;
    cloud.clear_calls();

    let (new_id, state) = update(
        &provider,
        &id,
        &state,
        json!({"type": "DEV1-M", "image": "ubuntu_jammy"}),
    )
    .await;

    assert_eq!(new_id, id);
    assert_eq!(state["type"], json!("DEV1-M"));
    assert_eq!(state["state"], json!("started"));
    let server_id = bare(&id);
    assert_eq!(
        cloud.calls_matching("server_action"),
        vec![
            format!("server_action poweroff {server_id}"),
            format!("server_action poweron {server_id}"),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn type_change_can_require_replacement(cloud: FakeCloud) {
    let provider = cloud.provider();
    let (id, state) = create(
        &provider,
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "replace_on_type_change": true}),
    )
    .await;

    let plan = provider
        .plan(
            SERVER,
            Some((&id, &state)),
            json!({"type": "DEV1-M", "image": "ubuntu_jammy", "replace_on_type_change": true}),
        )
        .await
        .expect("plan");

    assert!(plan.requires_replace.contains(&String::from("type")));
}

#[rstest]
#[tokio::test]
async fn label_drift_requires_replacement(cloud: FakeCloud) {
    let provider = cloud.provider();
    let (id, state) = create(&provider, json!({"type": "DEV1-S", "image": "ubuntu_jammy"})).await;

    let plan = provider
        .plan(
            SERVER,
            Some((&id, &state)),
            json!({"type": "DEV1-S", "image": "ubuntu_focal"}),
        )
        .await
        .expect("plan");

    assert_eq!(plan.requires_replace, vec![String::from("image")]);
}

#[rstest]
#[tokio::test]
async fn replacing_the_reserved_ip_detaches_before_attaching(cloud: FakeCloud) {
    let provider = cloud.provider();
    let first = reserved_ip(&cloud).await;
    let second = reserved_ip(&cloud).await;
    let (id, state) = create(
        &provider,
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "ip_ids": [format!("fr-par-1/{first}")]}),
    )
    .await;
    cloud.clear_calls();

    let (_, state) = update(
        &provider,
        &id,
        &state,
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "ip_ids": [format!("fr-par-1/{second}")]}),
    )
    .await;

    let server_id = bare(&id);
    assert_eq!(
        cloud.calls_matching("update_ip"),
        vec![
            format!("update_ip {first} server=null"),
            format!("update_ip {second} server={server_id}"),
        ]
    );
    assert_eq!(state["ip_ids"], json!([format!("fr-par-1/{second}")]));
}

#[rstest]
#[tokio::test]
async fn ip_id_is_an_alias_of_a_single_ip(cloud: FakeCloud) {
    let provider = cloud.provider();
    let ip = reserved_ip(&cloud).await;

    let (_, state) = create(
        &provider,
        json!({"type": "DEV1-S", "image": "ubuntu_jammy", "ip_id": format!("fr-par-1/{ip}")}),
    )
    .await;

    assert_eq!(state["ip_id"], json!(format!("fr-par-1/{ip}")));
    assert_eq!(state["ip_ids"], json!([]));
    assert_eq!(
        cloud.ip(&ip).and_then(|stored| stored.server).map(|server| server.id),
        cloud.servers().first().map(|server| server.id.clone())
    );
}

#[rstest]
#[tokio::test]
async fn user_data_keys_are_added_and_removed(cloud: FakeCloud) {
    let provider = cloud.provider();
    let (id, state) = create(
        &provider,
        json!({
            "type": "DEV1-S",
            "image": "ubuntu_jammy",
            "user_data": {"foo": "bar", "gone": "soon"},
            "cloud_init": "#cloud-config\n",
        }),
    )
    .await;
    assert_eq!(state["cloud_init"], json!("#cloud-config\n"));
    assert_eq!(state["user_data"], json!({"foo": "bar", "gone": "soon"}));

    let (_, state) = update(
        &provider,
        &id,
        &state,
        json!({
            "type": "DEV1-S",
            "image": "ubuntu_jammy",
            "user_data": {"foo": "baz"},
            "cloud_init": "#cloud-config\n",
        }),
    )
    .await;

    assert_eq!(state["user_data"], json!({"foo": "baz"}));
    let stored = cloud.user_data(&bare(&id));
    assert_eq!(stored.get("foo").map(String::as_str), Some("baz"));
    assert!(!stored.contains_key("gone"));
    assert!(stored.contains_key("cloud-init"));
}

#[rstest]
#[case(json!(null), false)]
#[case(json!(false), true)]
#[tokio::test]
async fn delete_honours_delete_on_termination(
    cloud: FakeCloud,
    #[case] delete_on_termination: Value,
    #[case] root_survives: bool,
) {
    let provider = cloud.provider();
    let mut config = json!({"type": "DEV1-S", "image": "ubuntu_jammy"});
    if !delete_on_termination.is_null() {
        config["root_volume"] = json!([{"delete_on_termination": delete_on_termination}]);
    }
    let (id, state) = create(&provider, config).await;
    let root = state["root_volume"][0]["volume_id"]
        .as_str()
        .map(bare)
        .expect("root volume id");

    let applied = provider
        .apply(SERVER, Some((&id, &state)), None)
        .await
        .expect("delete");

    assert!(applied.state.is_none());
    assert!(cloud.server(&bare(&id)).is_none());
    assert_eq!(cloud.volume(&root).is_some(), root_survives);
}

#[rstest]
#[tokio::test]
async fn read_clears_the_id_of_a_vanished_server(cloud: FakeCloud) {
    let provider = cloud.provider();

    let applied = provider
        .read(
            SERVER,
            "fr-par-1/22222222-2222-4222-8222-222222222222",
            json!({"type": "DEV1-S"}),
        )
        .await
        .expect("read");

    assert!(applied.state.is_none());
}
