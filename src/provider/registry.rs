//! Name-keyed registry and the plan/apply entry points used by hosts.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::actions::{
    CreateSnapshotAction, ExportSnapshotAction, ServerPowerAction, ServerRebootAction,
};
use crate::datasources::{
    ImageDataSource, IpDataSource, PlacementGroupDataSource, PrivateNicDataSource,
    SecurityGroupDataSource, ServerDataSource, ServerTypeDataSource, ServersDataSource,
    SnapshotDataSource, VolumeDataSource,
};
use crate::resources::{
    ImageResource, IpResource, IpReverseDnsResource, PlacementGroupResource, PrivateNicResource,
    SecurityGroupResource, SecurityGroupRulesResource, ServerResource, SnapshotResource,
    UserDataResource, VolumeResource,
};

use super::data::ResourceData;
use super::diagnostics::Diagnostics;
use super::error::ProviderError;
use super::meta::Meta;
use super::traits::{Action, DataSource, Resource};

/// Outcome of planning a change.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Planned values after defaults and customisation.
    pub planned: Value,
    /// Attributes whose change replaces the resource.
    pub requires_replace: Vec<String>,
    /// Warnings raised while planning.
    pub diagnostics: Diagnostics,
}

/// Outcome of applying a change or reading a resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Applied {
    /// Identifier and state, or `None` when the object no longer exists.
    pub state: Option<(String, Value)>,
    /// Warnings raised while applying.
    pub diagnostics: Diagnostics,
}

impl Applied {
    fn from_data(data: ResourceData) -> Self {
        let diagnostics = data.diagnostics().clone();
        Self {
            state: data.into_state(),
            diagnostics,
        }
    }
}

/// Every resource, data source and action of the Instance service.
pub struct Provider {
    meta: Meta,
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
    actions: BTreeMap<&'static str, Box<dyn Action>>,
}

impl Provider {
    /// Registers every component against the given handle.
    #[must_use]
    pub fn new(meta: Meta) -> Self {
        let mut resources: BTreeMap<&'static str, Box<dyn Resource>> = BTreeMap::new();
        resources.insert("scaleway_instance_server", Box::new(ServerResource));
        resources.insert("scaleway_instance_volume", Box::new(VolumeResource));
        resources.insert("scaleway_instance_snapshot", Box::new(SnapshotResource));
        resources.insert("scaleway_instance_image", Box::new(ImageResource));
        resources.insert("scaleway_instance_ip", Box::new(IpResource));
        resources.insert(
            "scaleway_instance_ip_reverse_dns",
            Box::new(IpReverseDnsResource),
        );
        resources.insert(
            "scaleway_instance_placement_group",
            Box::new(PlacementGroupResource),
        );
        resources.insert("scaleway_instance_private_nic", Box::new(PrivateNicResource));
        resources.insert(
            "scaleway_instance_security_group",
            Box::new(SecurityGroupResource),
        );
        resources.insert(
            "scaleway_instance_security_group_rules",
            Box::new(SecurityGroupRulesResource),
        );
        resources.insert("scaleway_instance_user_data", Box::new(UserDataResource));

        let mut data_sources: BTreeMap<&'static str, Box<dyn DataSource>> = BTreeMap::new();
        data_sources.insert("scaleway_instance_server", Box::new(ServerDataSource));
        data_sources.insert("scaleway_instance_servers", Box::new(ServersDataSource));
        data_sources.insert("scaleway_instance_volume", Box::new(VolumeDataSource));
        data_sources.insert("scaleway_instance_snapshot", Box::new(SnapshotDataSource));
        data_sources.insert("scaleway_instance_image", Box::new(ImageDataSource));
        data_sources.insert("scaleway_instance_ip", Box::new(IpDataSource));
        data_sources.insert(
            "scaleway_instance_placement_group",
            Box::new(PlacementGroupDataSource),
        );
        data_sources.insert(
            "scaleway_instance_private_nic",
            Box::new(PrivateNicDataSource),
        );
        data_sources.insert(
            "scaleway_instance_security_group",
            Box::new(SecurityGroupDataSource),
        );
        data_sources.insert(
            "scaleway_instance_server_type",
            Box::new(ServerTypeDataSource),
        );

        let mut actions: BTreeMap<&'static str, Box<dyn Action>> = BTreeMap::new();
        actions.insert("scaleway_instance_server_action", Box::new(ServerPowerAction));
        actions.insert(
            "scaleway_instance_create_snapshot",
            Box::new(CreateSnapshotAction),
        );
        actions.insert(
            "scaleway_instance_export_snapshot",
            Box::new(ExportSnapshotAction),
        );
        actions.insert(
            "scaleway_instance_server_reboot",
            Box::new(ServerRebootAction),
        );

        Self {
            meta,
            resources,
            data_sources,
            actions,
        }
    }

    /// Shared handle.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Registered resource names.
    pub fn resource_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    /// Registered data source names.
    pub fn data_source_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.data_sources.keys().copied()
    }

    /// Registered action names.
    pub fn action_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.keys().copied()
    }

    fn resource(&self, name: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ProviderError::Config(format!("unknown resource type '{name}'")))
    }

    /// Validates configuration and computes the planned values.
    ///
    /// `prior` is `None` for creations. Computed attributes left unset in
    /// configuration keep their prior value.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] for invalid configuration and
    /// propagates failures of the resource's plan customisation.
    pub async fn plan(
        &self,
        name: &str,
        prior: Option<(&str, &Value)>,
        mut config: Value,
    ) -> Result<Plan, ProviderError> {
        let resource = self.resource(name)?;
        let schema = resource.schema();
        schema.apply_defaults(&mut config);
        schema.validate(&config)?;

        let mut data = match prior {
            None => ResourceData::new(config.clone()),
            Some((id, state)) => {
                let planned = carry_computed(&schema, state, config.clone());
                ResourceData::planned(id, state.clone(), planned)
            }
        }
        .with_timeouts(resource.timeouts());

        for (attribute, message) in schema.deprecations(&config) {
            data.add_attribute_warning(&attribute, message);
        }
        if let Some((_, state)) = prior {
            for attribute in schema.force_new_changes(state, data.planned_state()) {
                data.force_new(&attribute);
            }
        }
        resource.customize_diff(&self.meta, &mut data).await?;
        debug!(resource = name, replace = ?data.requires_replace(), "planned");

        Ok(Plan {
            planned: data.state().clone(),
            requires_replace: data.requires_replace().iter().cloned().collect(),
            diagnostics: data.diagnostics().clone(),
        })
    }

    /// Applies a planned change: create when `prior` is `None`, delete when
    /// `planned` is `None`, update otherwise. Creations and updates end
    /// with a refresh.
    ///
    /// # Errors
    ///
    /// Propagates callback failures.
    pub async fn apply(
        &self,
        name: &str,
        prior: Option<(&str, &Value)>,
        planned: Option<Value>,
    ) -> Result<Applied, ProviderError> {
        let resource = self.resource(name)?;
        let timeouts = resource.timeouts();
        match (prior, planned) {
            (None, None) => Ok(Applied {
                state: None,
                diagnostics: Diagnostics::default(),
            }),
            (Some((id, state)), None) => {
                info!(resource = name, id, "deleting");
                let mut data = ResourceData::from_state(id, state.clone()).with_timeouts(timeouts);
                resource.delete(&self.meta, &mut data).await?;
                data.clear_id();
                Ok(Applied::from_data(data))
            }
            (None, Some(desired)) => {
                info!(resource = name, "creating");
                let mut data = ResourceData::new(desired).with_timeouts(timeouts);
                resource.create(&self.meta, &mut data).await?;
                Ok(Applied::from_data(data))
            }
            (Some((id, state)), Some(desired)) => {
                info!(resource = name, id, "updating");
                let mut data =
                    ResourceData::planned(id, state.clone(), desired).with_timeouts(timeouts);
                resource.update(&self.meta, &mut data).await?;
                Ok(Applied::from_data(data))
            }
        }
    }

    /// Refreshes a resource.
    ///
    /// # Errors
    ///
    /// Propagates callback failures; a vanished object is not an error.
    pub async fn read(&self, name: &str, id: &str, state: Value) -> Result<Applied, ProviderError> {
        let resource = self.resource(name)?;
        let mut data = ResourceData::from_state(id, state).with_timeouts(resource.timeouts());
        resource.read(&self.meta, &mut data).await?;
        Ok(Applied::from_data(data))
    }

    /// Imports an existing object by its localized identifier.
    ///
    /// # Errors
    ///
    /// Rejects identifiers without a zone prefix and propagates read
    /// failures.
    pub async fn import(&self, name: &str, id: &str) -> Result<Applied, ProviderError> {
        let resource = self.resource(name)?;
        resource.validate_import_id(id)?;
        self.read(name, id, Value::Object(serde_json::Map::new()))
            .await
    }

    /// Runs a data source.
    ///
    /// # Errors
    ///
    /// Returns validation errors and propagates lookup failures.
    pub async fn read_data_source(
        &self,
        name: &str,
        mut config: Value,
    ) -> Result<Applied, ProviderError> {
        let data_source = self.data_sources.get(name).ok_or_else(|| {
            ProviderError::Config(format!("unknown data source '{name}'"))
        })?;
        let schema = data_source.schema();
        schema.apply_defaults(&mut config);
        schema.validate(&config)?;
        let mut data = ResourceData::new(config);
        data_source.read(&self.meta, &mut data).await?;
        Ok(Applied::from_data(data))
    }

    /// Runs an action.
    ///
    /// # Errors
    ///
    /// Returns validation errors and propagates action failures.
    pub async fn invoke(&self, name: &str, mut config: Value) -> Result<Diagnostics, ProviderError> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| ProviderError::Config(format!("unknown action '{name}'")))?;
        let schema = action.schema();
        schema.apply_defaults(&mut config);
        schema.validate(&config)?;
        let mut data = ResourceData::new(config);
        action.invoke(&self.meta, &mut data).await?;
        Ok(data.diagnostics().clone())
    }
}

fn carry_computed(schema: &super::schema::Schema, prior: &Value, mut config: Value) -> Value {
    if let Value::Object(object) = &mut config {
        for attribute in schema.attributes.iter().filter(|attribute| attribute.computed) {
            let unset = object
                .get(attribute.name)
                .is_none_or(Value::is_null);
            if unset && let Some(previous) = prior.get(attribute.name) {
                object.insert(attribute.name.to_owned(), previous.clone());
            }
        }
    }
    config
}
