//! Unit tests for the unknown-volume facade.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::scaleway::{
    BlockApi, BlockVolumeSource, CreateBlockVolumeRequest, CreateVolumeRequest, GB, InstanceApi,
};
use crate::test_support::{FakeCloud, TEST_PROJECT_ID};

const TIMEOUT: Duration = Duration::from_secs(5);

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
}

async fn instance_volume(cloud: &FakeCloud, volume_type: VolumeType, size_gb: u64) -> Volume {
    cloud
        .create_volume(
            Zone::FrPar1,
            &CreateVolumeRequest {
                name: String::from("data"),
                project: TEST_PROJECT_ID.to_owned(),
                volume_type: Some(volume_type),
                size: Some(size_gb * GB),
                ..CreateVolumeRequest::default()
            },
        )
        .await
        .expect("create instance volume")
}

async fn block_volume(cloud: &FakeCloud, size_gb: u64) -> BlockVolume {
    cloud
        .create_block_volume(
            Zone::FrPar1,
            &CreateBlockVolumeRequest {
                name: String::from("sbs"),
                project_id: TEST_PROJECT_ID.to_owned(),
                source: BlockVolumeSource::FromEmpty {
                    size: size_gb * GB,
                },
                perf_iops: None,
                tags: vec![],
            },
        )
        .await
        .expect("create block volume")
}

#[rstest]
#[tokio::test]
async fn lookup_prefers_the_instance_api(cloud: FakeCloud) {
    let volume = instance_volume(&cloud, VolumeType::BSsd, 20).await;
    let found = get_unknown_volume(&cloud.meta(), Zone::FrPar1, &volume.id)
        .await
        .expect("lookup");
    assert_eq!(found.backend, VolumeBackend::Instance(VolumeType::BSsd));
    assert_eq!(found.size, Some(20 * GB));
    assert!(cloud.calls_matching("get_block_volume").is_empty());
}

#[rstest]
#[tokio::test]
async fn lookup_falls_back_to_block_storage(cloud: FakeCloud) {
    let volume = block_volume(&cloud, 15).await;
    let found = get_unknown_volume(&cloud.meta(), Zone::FrPar1, &volume.id)
        .await
        .expect("lookup");
    assert!(found.is_block_volume());
    assert_eq!(found.iops, Some(5000));
    assert_eq!(
        cloud.calls_matching("get_"),
        vec![
            format!("get_volume {}", volume.id),
            format!("get_block_volume {}", volume.id)
        ]
    );
}

#[rstest]
#[tokio::test]
async fn lookup_reports_not_found_when_both_apis_miss(cloud: FakeCloud) {
    let err = get_unknown_volume(&cloud.meta(), Zone::FrPar1, "missing")
        .await
        .expect_err("unknown id");
    assert!(err.is_not_found());
}

#[rstest]
#[case::existing_instance(
    UnknownVolume {
        id: String::from("vol"),
        name: String::from("root"),
        boot: Some(true),
        ..UnknownVolume::fresh(Zone::FrPar1, Some(GB), VolumeBackend::Instance(VolumeType::LSsd))
    },
    VolumeTemplate {
        id: Some(String::from("vol")),
        name: Some(String::from("root")),
        boot: Some(true),
        ..VolumeTemplate::default()
    }
)]
#[case::existing_block(
    UnknownVolume {
        id: String::from("vol"),
        ..UnknownVolume::fresh(Zone::FrPar1, None, VolumeBackend::Block)
    },
    VolumeTemplate {
        id: Some(String::from("vol")),
        volume_type: Some(VolumeType::SbsVolume),
        ..VolumeTemplate::default()
    }
)]
#[case::fresh(
    UnknownVolume::fresh(Zone::FrPar1, Some(20 * GB), VolumeBackend::Instance(VolumeType::LSsd)),
    VolumeTemplate {
        size: Some(20 * GB),
        volume_type: Some(VolumeType::LSsd),
        ..VolumeTemplate::default()
    }
)]
fn volume_template_has_three_shapes(#[case] volume: UnknownVolume, #[case] expected: VolumeTemplate) {
    assert_eq!(volume.volume_template(), expected);
}

#[rstest]
#[tokio::test]
async fn snapshots_dispatch_by_backend(cloud: FakeCloud) {
    let meta = cloud.meta();
    let spec = SnapshotSpec {
        name: String::from("snap"),
        project: TEST_PROJECT_ID.to_owned(),
        ..SnapshotSpec::default()
    };
    let local: UnknownVolume = instance_volume(&cloud, VolumeType::LSsd, 20).await.into();
    let block: UnknownVolume = block_volume(&cloud, 10).await.into();

    let from_local = create_snapshot_from_unknown_volume(&meta, &local, &spec, TIMEOUT)
        .await
        .expect("instance snapshot");
    let from_block = create_snapshot_from_unknown_volume(&meta, &block, &spec, TIMEOUT)
        .await
        .expect("block snapshot");

    assert_eq!(
        from_local.backend,
        SnapshotBackend::Instance(SnapshotVolumeType::LSsd)
    );
    assert!(cloud.snapshot(&from_local.id).is_some());
    assert!(from_block.is_block_snapshot());
    assert!(cloud.block_snapshot(&from_block.id).is_some());
}

#[rstest]
#[tokio::test]
async fn scratch_volumes_cannot_be_snapshotted(cloud: FakeCloud) {
    let scratch: UnknownVolume = instance_volume(&cloud, VolumeType::Scratch, 20).await.into();
    cloud.clear_calls();
    let err = create_snapshot_from_unknown_volume(
        &cloud.meta(),
        &scratch,
        &SnapshotSpec::default(),
        TIMEOUT,
    )
    .await
    .expect_err("scratch rejected");
    assert!(err.to_string().contains("cannot snapshot scratch volume"));
    assert!(cloud.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn b_ssd_volumes_grow_in_place(cloud: FakeCloud) {
    let volume: UnknownVolume = instance_volume(&cloud, VolumeType::BSsd, 20).await.into();
    resize_unknown_volume(&cloud.meta(), &volume, 30 * GB, TIMEOUT)
        .await
        .expect("resize");
    assert_eq!(cloud.volume(&volume.id).map(|stored| stored.size), Some(30 * GB));
}

#[rstest]
#[tokio::test]
async fn downward_resizes_are_rejected_before_any_call(cloud: FakeCloud) {
    let volume: UnknownVolume = instance_volume(&cloud, VolumeType::BSsd, 20).await.into();
    cloud.clear_calls();
    let err = resize_unknown_volume(&cloud.meta(), &volume, 10 * GB, TIMEOUT)
        .await
        .expect_err("shrink rejected");
    assert!(err.to_string().contains("cannot be resized down"));
    assert!(cloud.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn local_volumes_cannot_be_resized(cloud: FakeCloud) {
    let volume: UnknownVolume = instance_volume(&cloud, VolumeType::LSsd, 20).await.into();
    let err = resize_unknown_volume(&cloud.meta(), &volume, 40 * GB, TIMEOUT)
        .await
        .expect_err("l_ssd rejected");
    assert!(matches!(err, ProviderError::Volume { .. }));
}

#[rstest]
#[tokio::test]
async fn block_volumes_resize_and_update_iops(cloud: FakeCloud) {
    let meta = cloud.meta();
    let volume: UnknownVolume = block_volume(&cloud, 10).await.into();
    resize_unknown_volume(&meta, &volume, 25 * GB, TIMEOUT)
        .await
        .expect("resize");
    update_unknown_volume_iops(&meta, &volume, 15000, TIMEOUT)
        .await
        .expect("iops");
    let stored = cloud.block_volume(&volume.id).expect("stored");
    assert_eq!(stored.size, 25 * GB);
    assert_eq!(stored.specs.perf_iops, Some(15000));
}

#[rstest]
#[tokio::test]
async fn iops_are_rejected_on_instance_volumes(cloud: FakeCloud) {
    let volume: UnknownVolume = instance_volume(&cloud, VolumeType::BSsd, 10).await.into();
    let result = update_unknown_volume_iops(&cloud.meta(), &volume, 5000, TIMEOUT).await;
    assert!(result.is_err());
}

#[rstest]
#[tokio::test]
async fn deleting_a_vanished_volume_succeeds(cloud: FakeCloud) {
    let volume: UnknownVolume = block_volume(&cloud, 10).await.into();
    let meta = cloud.meta();
    delete_unknown_volume(&meta, &volume, TIMEOUT)
        .await
        .expect("first delete");
    delete_unknown_volume(&meta, &volume, TIMEOUT)
        .await
        .expect("second delete tolerated");
    assert!(cloud.block_volume(&volume.id).is_none());
}

#[rstest]
#[tokio::test]
async fn snapshot_lookup_falls_back_to_block_storage(cloud: FakeCloud) {
    let meta = cloud.meta();
    let volume: UnknownVolume = block_volume(&cloud, 10).await.into();
    let created = create_snapshot_from_unknown_volume(
        &meta,
        &volume,
        &SnapshotSpec {
            name: String::from("snap"),
            ..SnapshotSpec::default()
        },
        TIMEOUT,
    )
    .await
    .expect("snapshot");
    let found = get_unknown_snapshot(&meta, Zone::FrPar1, &created.id)
        .await
        .expect("lookup");
    assert_eq!(found.type_name(), "sbs_snapshot");
    assert_eq!(found.size, 10 * GB);
}
