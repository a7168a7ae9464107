//! Server, server list and commercial type lookups.

use serde_json::{Value, json};
use tracing::debug;

use crate::lifecycle::{get_server_type, state_of};
use crate::locality::new_zoned_id;
use crate::provider::{
    Attribute, DataSource, Meta, ProviderError, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::resources::{ServerResource, flatten_server};
use crate::scaleway::{ListFilter, Server, ServerType};

use super::{identify, lookup_of, lookup_schema, project_filter, resolve, zoned_lookups};

/// `data.scaleway_instance_server`.
pub struct ServerDataSource;

impl DataSource for ServerDataSource {
    fn schema(&self) -> Schema {
        lookup_schema(&ServerResource, zoned_lookups("server_id"))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_server(meta, data))
    }
}

async fn read_server(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, lookup) = lookup_of(meta, data, "server_id")?;
    let server = resolve(
        "server",
        lookup,
        project_filter(data),
        |id| async move { meta.instance.get_server(zone, &id).await },
        |filter| async move { meta.instance.list_servers(zone, &filter).await },
        |server: &Server| server.name.as_str(),
    )
    .await?;
    identify(data, "server_id", server.zone, &server.id);
    flatten_server(meta, data, &server).await
}

/// `data.scaleway_instance_servers`: every server of a zone whose name
/// contains `name` and which carries all `tags`.
pub struct ServersDataSource;

impl DataSource for ServersDataSource {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("name").describe("Substring of the server names"),
            Attribute::list("tags").describe("Tags every server must carry"),
            Attribute::string("zone")
                .computed()
                .validate(Validation::Zone),
            Attribute::string("project_id").computed(),
            Attribute::block(
                "servers",
                vec![
                    Attribute::string("id"),
                    Attribute::string("name"),
                    Attribute::string("type"),
                    Attribute::string("state"),
                    Attribute::list("tags"),
                    Attribute::string("image"),
                    Attribute::string("boot_type"),
                    Attribute::string("security_group_id"),
                    Attribute::string("placement_group_id"),
                    Attribute::string("public_ip"),
                    Attribute::string("private_ip"),
                    Attribute::bool("enable_dynamic_ip"),
                    Attribute::bool("routed_ip_enabled"),
                    Attribute::string("zone"),
                    Attribute::string("project_id"),
                    Attribute::string("organization_id"),
                ],
            )
            .computed_only(),
        ])
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_servers(meta, data))
    }
}

fn summarize(server: &Server) -> Value {
    let zone = server.zone;
    let state = state_of(server)
        .map_or_else(|_| server.state.to_string(), |target| target.to_string());
    json!({
        "id": new_zoned_id(zone, &server.id),
        "name": server.name,
        "type": server.commercial_type,
        "state": state,
        "tags": server.tags,
        "image": server.image.as_ref().map(|image| image.id.as_str()),
        "boot_type": server.boot_type.to_string(),
        "security_group_id": server
            .security_group
            .as_ref()
            .map(|group| new_zoned_id(zone, &group.id)),
        "placement_group_id": server
            .placement_group
            .as_ref()
            .map(|group| new_zoned_id(zone, &group.id)),
        "public_ip": server.public_ipv4().map(|ip| ip.address.as_str()),
        "private_ip": server.private_ip,
        "enable_dynamic_ip": server.dynamic_ip_required,
        "routed_ip_enabled": server.routed_ip_enabled,
        "zone": zone.as_str(),
        "project_id": server.project,
        "organization_id": server.organization,
    })
}

async fn read_servers(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let filter = ListFilter {
        name: data.get_ok_str("name").map(str::to_owned),
        project: project_filter(data),
        tags: data.get_string_list("tags"),
    };
    let servers = meta.instance.list_servers(zone, &filter).await?;
    debug!(%zone, count = servers.len(), "servers listed");
    data.set_id(zone.as_str());
    data.set("zone", zone.as_str());
    data.set(
        "servers",
        Value::Array(servers.iter().map(summarize).collect()),
    );
    Ok(())
}

/// `data.scaleway_instance_server_type`: sizing and availability of a
/// commercial type.
pub struct ServerTypeDataSource;

impl DataSource for ServerTypeDataSource {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("name").required().validate(Validation::NonEmpty),
            Attribute::string("zone")
                .computed()
                .validate(Validation::Zone),
            Attribute::int("cpu").computed_only(),
            Attribute::int("ram").computed_only(),
            Attribute::int("gpu").computed_only(),
            Attribute::string("architecture").computed_only(),
            Attribute::bool("end_of_service").computed_only(),
            Attribute::string("availability").computed_only(),
            Attribute::block(
                "volumes",
                vec![
                    Attribute::int("min_size_total"),
                    Attribute::int("max_size_total"),
                    Attribute::int("min_size_per_local_volume"),
                    Attribute::int("max_size_per_local_volume"),
                    Attribute::bool("support_block_storage"),
                ],
            )
            .computed_only(),
        ])
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read_server_type(meta, data))
    }
}

fn volume_limits(server_type: &ServerType) -> Value {
    let total = server_type.volumes_constraint.unwrap_or_default();
    let local = server_type
        .per_volume_constraint
        .as_ref()
        .and_then(|constraint| constraint.l_ssd)
        .unwrap_or_default();
    json!([{
        "min_size_total": total.min_size,
        "max_size_total": total.max_size,
        "min_size_per_local_volume": local.min_size,
        "max_size_per_local_volume": local.max_size,
        "support_block_storage": true,
    }])
}

async fn read_server_type(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let name = data.get_string("name");
    let server_type = get_server_type(meta, zone, &name).await?;
    let availability = meta
        .instance
        .server_types_availability(zone)
        .await?
        .remove(&name)
        .unwrap_or_else(|| String::from("unknown"));

    data.set_id(new_zoned_id(zone, &name));
    data.set("zone", zone.as_str());
    data.set("cpu", server_type.ncpus);
    data.set("ram", server_type.ram);
    data.set("gpu", server_type.gpu);
    data.set("architecture", server_type.arch.as_str());
    data.set("end_of_service", server_type.end_of_service);
    data.set("availability", availability);
    data.set("volumes", volume_limits(&server_type));
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::{Provider, ProviderError};
    use crate::scaleway::GB;
    use crate::test_support::FakeCloud;

    async fn create_server(provider: &Provider, config: Value) -> String {
        let plan = provider
            .plan("scaleway_instance_server", None, config)
            .await
            .expect("plan");
        provider
            .apply("scaleway_instance_server", None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
            .0
    }

    #[rstest]
    #[tokio::test]
    async fn server_is_found_by_name() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let id = create_server(
            &provider,
            json!({"name": "web", "type": "DEV1-S", "image": "ubuntu_jammy"}),
        )
        .await;

        let (found, state) = provider
            .read_data_source("scaleway_instance_server", json!({"name": "web"}))
            .await
            .expect("lookup")
            .state
            .expect("state");

        assert_eq!(found, id);
        assert_eq!(state["type"], json!("DEV1-S"));
        assert_eq!(state["state"], json!("started"));
    }

    #[rstest]
    #[tokio::test]
    async fn servers_are_filtered_by_tags() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        for (name, tag) in [("a-1", "blue"), ("a-2", "blue"), ("b-1", "green")] {
            create_server(
                &provider,
                json!({"name": name, "type": "DEV1-S", "image": "ubuntu_jammy", "tags": [tag]}),
            )
            .await;
        }

        let (_, state) = provider
            .read_data_source("scaleway_instance_servers", json!({"tags": ["blue"]}))
            .await
            .expect("list")
            .state
            .expect("state");

        let mut names: Vec<&str> = state["servers"]
            .as_array()
            .expect("servers")
            .iter()
            .filter_map(|server| server["name"].as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, ["a-1", "a-2"]);
    }

    #[rstest]
    #[tokio::test]
    async fn server_type_reports_sizing() {
        let cloud = FakeCloud::new();

        let (id, state) = cloud
            .provider()
            .read_data_source("scaleway_instance_server_type", json!({"name": "DEV1-S"}))
            .await
            .expect("lookup")
            .state
            .expect("state");

        assert_eq!(id, "fr-par-1/DEV1-S");
        assert_eq!(state["cpu"], json!(2));
        assert_eq!(state["availability"], json!("available"));
        assert_eq!(state["volumes"][0]["max_size_total"], json!(20 * GB));
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_server_type_is_rejected() {
        let cloud = FakeCloud::new();

        let err = cloud
            .provider()
            .read_data_source("scaleway_instance_server_type", json!({"name": "NOPE-1"}))
            .await
            .expect_err("unknown type");

        assert!(matches!(err, ProviderError::Validation { .. }));
    }
}
