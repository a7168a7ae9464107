//! Shared handle passed to every callback.

use std::sync::Arc;
use std::time::Duration;

use crate::locality::{Region, Zone, parse_zoned_id_lenient};
use crate::scaleway::{BlockApi, InstanceApi, MarketplaceApi};
use crate::waiter::{DEFAULT_RETRY_INTERVAL, WaitOptions};

use super::data::ResourceData;
use super::error::ProviderError;

/// API clients and provider-level defaults.
#[derive(Clone)]
pub struct Meta {
    /// Instance API.
    pub instance: Arc<dyn InstanceApi>,
    /// Block Storage API.
    pub block: Arc<dyn BlockApi>,
    /// Marketplace API.
    pub marketplace: Arc<dyn MarketplaceApi>,
    /// Zone used when a resource does not set one.
    pub default_zone: Zone,
    /// Region used when a resource does not set one.
    pub default_region: Region,
    /// Project used when a resource does not set one.
    pub default_project_id: String,
    /// Organization reported on resources.
    pub default_organization_id: Option<String>,
    /// Delay between two polls of a waiter.
    pub retry_interval: Duration,
}

impl Meta {
    /// Builds a handle backed by one client implementing every API.
    #[must_use]
    pub fn from_client<C>(client: Arc<C>, default_zone: Zone, project_id: &str) -> Self
    where
        C: InstanceApi + BlockApi + MarketplaceApi + 'static,
    {
        Self {
            instance: client.clone(),
            block: client.clone(),
            marketplace: client,
            default_zone,
            default_region: default_zone.region(),
            default_project_id: project_id.to_owned(),
            default_organization_id: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Returns a copy polling at another cadence.
    #[must_use]
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Wait options bounded by `timeout` at the configured cadence.
    #[must_use]
    pub const fn wait_options(&self, timeout: Duration) -> WaitOptions {
        WaitOptions::new(timeout, self.retry_interval)
    }

    /// Zone of a resource: the `zone` attribute, else the prefix of its
    /// identifier, else the provider default.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Locality`] when the attribute or the id
    /// prefix names an unknown zone.
    pub fn zone_of(&self, data: &ResourceData) -> Result<Zone, ProviderError> {
        if let Some(zone) = data.get_ok_str("zone") {
            return Ok(zone.parse()?);
        }
        let (zone, _) = parse_zoned_id_lenient(data.id())?;
        Ok(zone.unwrap_or(self.default_zone))
    }

    /// Project of a resource: the `project_id` attribute or the default.
    #[must_use]
    pub fn project_of(&self, data: &ResourceData) -> String {
        data.get_ok_str("project_id")
            .map_or_else(|| self.default_project_id.clone(), str::to_owned)
    }
}
