//! `scaleway_instance_image`.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::info;

use crate::locality::{Zone, expand_id, new_zoned_id};
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Timeouts,
    Validation,
};
use crate::scaleway::{
    CreateImageRequest, Image, ImageVolume, ImageVolumeTemplate, UpdateImageRequest, bytes_to_gb,
};
use crate::waiter::wait_for_image;

use super::{
    changed_name, changed_tags, found, locality_attributes, locate, name_or_generate,
    set_locality, string_array, tolerate_not_found,
};

/// `scaleway_instance_image`.
pub struct ImageResource;

fn volume_block(name: &'static str) -> Attribute {
    Attribute::block(
        name,
        vec![
            Attribute::string("id"),
            Attribute::string("name"),
            Attribute::int("size_in_gb"),
            Attribute::string("volume_type"),
        ],
    )
    .computed_only()
}

impl Resource for ImageResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("name").computed(),
            Attribute::string("root_volume_id")
                .required()
                .force_new()
                .validate(Validation::ZonedUuid)
                .describe("Instance or block snapshot used as root volume"),
            Attribute::string("architecture")
                .default_value("x86_64")
                .force_new()
                .validate(Validation::OneOf(&["x86_64", "arm", "arm64"])),
            Attribute::list("additional_volume_ids").validate(Validation::ZonedUuid),
            Attribute::list("tags"),
            Attribute::bool("public").default_value(false),
            volume_block("root_volume"),
            volume_block("additional_volumes"),
            Attribute::string("from_server_id").computed_only(),
            Attribute::string("state").computed_only(),
            Attribute::string("creation_date").computed_only(),
            Attribute::string("modification_date").computed_only(),
            Attribute::string("organization_id").computed_only(),
        ];
        attributes.extend(locality_attributes());
        Schema::new(attributes)
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::image()
    }

    fn create<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(create(meta, data))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read(meta, data))
    }

    fn update<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(update(meta, data))
    }

    fn delete<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(delete(meta, data))
    }
}

/// Extra volumes keyed by their position, starting at `"1"`.
fn extra_volume_templates(ids: &[String]) -> BTreeMap<String, ImageVolumeTemplate> {
    ids.iter()
        .zip(1_u32..)
        .map(|(id, index)| {
            (
                index.to_string(),
                ImageVolumeTemplate {
                    id: expand_id(id).to_owned(),
                },
            )
        })
        .collect()
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let request = CreateImageRequest {
        name: name_or_generate(data, "img"),
        root_volume: expand_id(&data.get_string("root_volume_id")).to_owned(),
        arch: data.get_string("architecture"),
        extra_volumes: extra_volume_templates(&data.get_string_list("additional_volume_ids")),
        project: meta.project_of(data),
        tags: data.get_string_list("tags"),
        public: data.get_bool("public"),
    };
    let created = meta.instance.create_image(zone, &request).await?;
    data.set_id(new_zoned_id(zone, &created.id));
    wait_for_image(
        meta.instance.as_ref(),
        zone,
        &created.id,
        meta.wait_options(data.timeouts().create),
    )
    .await?;
    info!(%zone, image_id = %created.id, "image created");
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let Some(image) = found(meta.instance.get_image(zone, &id).await, data)? else {
        return Ok(());
    };
    flatten_image(data, &image);
    Ok(())
}

fn volume_value(zone: Zone, volume: &ImageVolume) -> Value {
    json!({
        "id": new_zoned_id(zone, &volume.id),
        "name": volume.name,
        "size_in_gb": bytes_to_gb(volume.size),
        "volume_type": volume.volume_type,
    })
}

/// Extra volumes in numeric key order; `"10"` sorts after `"9"`.
fn ordered_extra_volumes(image: &Image) -> Vec<&ImageVolume> {
    let mut volumes: Vec<(u32, &ImageVolume)> = image
        .extra_volumes
        .iter()
        .map(|(key, volume)| (key.parse().unwrap_or(u32::MAX), volume))
        .collect();
    volumes.sort_by_key(|(index, _)| *index);
    volumes.into_iter().map(|(_, volume)| volume).collect()
}

/// Writes every attribute of an image into `data`.
pub(crate) fn flatten_image(data: &mut ResourceData, image: &Image) {
    let zone = image.zone;
    let extra_volumes = ordered_extra_volumes(image);
    data.set("name", image.name.as_str());
    data.set("root_volume_id", new_zoned_id(zone, &image.root_volume.id));
    data.set("architecture", image.arch.as_str());
    data.set(
        "additional_volume_ids",
        string_array(
            extra_volumes
                .iter()
                .map(|volume| new_zoned_id(zone, &volume.id)),
        ),
    );
    data.set("tags", string_array(image.tags.iter().cloned()));
    data.set("public", image.public);
    data.set(
        "root_volume",
        Value::Array(vec![volume_value(zone, &image.root_volume)]),
    );
    data.set(
        "additional_volumes",
        Value::Array(
            extra_volumes
                .iter()
                .map(|volume| volume_value(zone, volume))
                .collect(),
        ),
    );
    data.set(
        "from_server_id",
        image
            .from_server
            .as_deref()
            .map_or(Value::Null, |server| Value::String(new_zoned_id(zone, server))),
    );
    data.set("state", image.state.as_str());
    data.set("creation_date", image.creation_date.as_str());
    data.set("modification_date", image.modification_date.as_str());
    data.set("organization_id", image.organization.as_str());
    set_locality(data, zone, &image.project);
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let mut request = UpdateImageRequest {
        name: changed_name(data),
        tags: changed_tags(data),
        ..UpdateImageRequest::default()
    };
    if data.has_change("additional_volume_ids") {
        request.extra_volumes = Some(extra_volume_templates(
            &data.get_string_list("additional_volume_ids"),
        ));
    }
    if data.has_change("public") {
        request.public = Some(data.get_bool("public"));
    }
    let changed = request.name.is_some()
        || request.tags.is_some()
        || request.extra_volumes.is_some()
        || request.public.is_some();
    if changed {
        meta.instance.update_image(zone, &id, &request).await?;
        wait_for_image(
            meta.instance.as_ref(),
            zone,
            &id,
            meta.wait_options(data.timeouts().update),
        )
        .await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    tolerate_not_found(meta.instance.delete_image(zone, &id).await)?;
    info!(%zone, image_id = %id, "image deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::extra_volume_templates;
    use crate::provider::Provider;
    use crate::test_support::FakeCloud;

    const IMAGE: &str = "scaleway_instance_image";

    async fn create(provider: &Provider, name: &str, config: Value) -> (String, Value) {
        let plan = provider.plan(name, None, config).await.expect("plan");
        provider
            .apply(name, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    async fn snapshot(provider: &Provider) -> String {
        let (volume, _) = create(
            provider,
            "scaleway_instance_volume",
            json!({"size_in_gb": 10}),
        )
        .await;
        create(provider, "scaleway_instance_snapshot", json!({"volume_id": volume}))
            .await
            .0
    }

    #[test]
    fn extra_volumes_are_numbered_from_one() {
        let templates = extra_volume_templates(&[
            String::from("fr-par-1/aaaa"),
            String::from("bbbb"),
        ]);

        let keys: Vec<&str> = templates.keys().map(String::as_str).collect();
        assert_eq!(keys, ["1", "2"]);
        assert_eq!(templates.get("1").map(|t| t.id.as_str()), Some("aaaa"));
    }

    #[rstest]
    #[tokio::test]
    async fn extra_volumes_are_replaced_atomically() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let root = snapshot(&provider).await;
        let first = snapshot(&provider).await;
        let second = snapshot(&provider).await;
        let (id, state) = create(
            &provider,
            IMAGE,
            json!({"root_volume_id": root, "additional_volume_ids": [first]}),
        )
        .await;
        assert_eq!(state["additional_volume_ids"], json!([first]));
        cloud.clear_calls();

        let plan = provider
            .plan(
                IMAGE,
                Some((&id, &state)),
                json!({"root_volume_id": root, "additional_volume_ids": [second, first]}),
            )
            .await
            .expect("plan");
        let (_, updated) = provider
            .apply(IMAGE, Some((&id, &state)), Some(plan.planned))
            .await
            .expect("update")
            .state
            .expect("state");

        assert_eq!(cloud.calls_matching("update_image").len(), 1);
        assert_eq!(updated["additional_volume_ids"], json!([second, first]));
        assert_eq!(updated["public"], json!(false));
    }
}
