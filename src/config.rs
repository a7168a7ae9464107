//! Configuration loading via `ortho-config`.

use std::sync::Arc;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::locality::{Region, Zone};
use crate::provider::Meta;
use crate::scaleway::{HttpClient, HttpClientConfig};

/// Name of the configuration file read from the working directory and the
/// XDG config directory.
pub const CONFIG_FILE: &str = "scaleway-instance.toml";

/// Provider credentials and defaults, merged from defaults, configuration
/// files, `SCW_*` environment variables and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ProviderConfig {
    /// Access key of the API key pair. Only reported, never sent.
    pub access_key: Option<String>,
    /// Secret key sent as `X-Auth-Token`. Required.
    pub secret_key: String,
    /// Project new resources are created in. Required.
    pub default_project_id: String,
    /// Organization reported on resources.
    pub default_organization_id: Option<String>,
    /// Zone used when a resource does not set one.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Region used when a resource does not set one. Derived from the zone
    /// when unset.
    pub default_region: Option<String>,
    /// Base URL of the API.
    #[ortho_config(default = "https://api.scaleway.com".to_owned())]
    pub api_url: String,
    /// Seconds between two polls while waiting for an object to settle.
    #[ortho_config(default = 5)]
    pub wait_retry_interval_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProviderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [scaleway] in {CONFIG_FILE}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration, CLI flags included.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Ok(Self::load()?)
    }

    /// Loads configuration from defaults, files and the environment only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Ok(Self::load_from_iter([std::ffi::OsString::from(
            "scw-instance",
        )])?)
    }

    /// Checks required fields and parses the locality defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank
    /// and [`ConfigError::Invalid`] for an unknown zone or region, or a zero
    /// poll interval.
    pub fn validate(&self) -> Result<(Zone, Region), ConfigError> {
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new("Scaleway API secret key", "SCW_SECRET_KEY", "secret_key"),
        )?;
        Self::require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
            ),
        )?;
        Self::require_field(
            &self.default_zone,
            &FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone"),
        )?;
        Self::require_field(
            &self.api_url,
            &FieldMetadata::new("API URL", "SCW_API_URL", "api_url"),
        )?;
        if self.wait_retry_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "wait_retry_interval_secs must be positive",
            )));
        }
        let zone: Zone = self
            .default_zone
            .trim()
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("default_zone: {err}")))?;
        let region = match self.default_region.as_deref().map(str::trim) {
            Some(region) if !region.is_empty() => region
                .parse()
                .map_err(|err| ConfigError::Invalid(format!("default_region: {err}")))?,
            _ => zone.region(),
        };
        Ok((zone, region))
    }

    /// Builds the provider handle over the HTTPS client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn meta(&self) -> Result<Meta, ConfigError> {
        let (zone, region) = self.validate()?;
        let client = HttpClient::new(HttpClientConfig {
            api_url: self.api_url.trim_end_matches('/').to_owned(),
            ..HttpClientConfig::new(self.secret_key.trim())
        });
        let mut meta = Meta::from_client(Arc::new(client), zone, self.default_project_id.trim())
            .with_retry_interval(Duration::from_secs(self.wait_retry_interval_secs));
        meta.default_region = region;
        meta.default_organization_id = self
            .default_organization_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        Ok(meta)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A field holds a value that cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<Arc<ortho_config::OrthoError>> for ConfigError {
    fn from(value: Arc<ortho_config::OrthoError>) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::{ConfigError, ProviderConfig};
    use crate::locality::{Region, Zone};

    #[fixture]
    fn config() -> ProviderConfig {
        ProviderConfig {
            access_key: None,
            secret_key: String::from("secret"),
            default_project_id: String::from("project"),
            default_organization_id: Some(String::from("  ")),
            default_zone: String::from("nl-ams-2"),
            default_region: None,
            api_url: String::from("https://api.example.test/"),
            wait_retry_interval_secs: 5,
        }
    }

    #[rstest]
    fn region_follows_the_zone(config: ProviderConfig) {
        assert_eq!(config.validate(), Ok((Zone::NlAms2, Region::NlAms)));
    }

    #[rstest]
    #[case("secret_key", "SCW_SECRET_KEY")]
    #[case("default_project_id", "SCW_DEFAULT_PROJECT_ID")]
    fn blank_required_fields_name_their_source(
        mut config: ProviderConfig,
        #[case] field: &str,
        #[case] env_var: &str,
    ) {
        match field {
            "secret_key" => config.secret_key = String::from(" "),
            _ => config.default_project_id = String::new(),
        }

        let Err(ConfigError::MissingField(message)) = config.validate() else {
            panic!("expected a missing field error");
        };

        assert!(message.contains(env_var), "message: {message}");
        assert!(message.contains("scaleway-instance.toml"), "message: {message}");
    }

    #[rstest]
    #[case("mars-1", None)]
    #[case("fr-par-1", Some("mars"))]
    fn unknown_localities_are_invalid(
        mut config: ProviderConfig,
        #[case] zone: &str,
        #[case] region: Option<&str>,
    ) {
        config.default_zone = zone.to_owned();
        config.default_region = region.map(str::to_owned);

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn meta_carries_the_defaults(config: ProviderConfig) {
        let meta = config.meta().expect("meta");

        assert_eq!(meta.default_zone, Zone::NlAms2);
        assert_eq!(meta.default_project_id, "project");
        assert_eq!(meta.default_organization_id, None);
        assert_eq!(meta.retry_interval.as_secs(), 5);
    }
}
