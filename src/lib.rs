//! Scaleway Instance resources, data sources and actions.
//!
//! The crate manages servers, volumes, snapshots, images, flexible IPs,
//! security groups, placement groups, private NICs and user-data through
//! a name-keyed [`provider::Provider`] registry that infrastructure hosts
//! drive with JSON configuration. Every remote call goes through the API
//! traits in [`scaleway`], implemented over HTTPS by
//! [`scaleway::HttpClient`] and in memory by [`test_support::FakeCloud`].

pub mod actions;
pub mod config;
pub mod datasources;
pub mod lifecycle;
pub mod locality;
pub mod private_nic;
pub mod provider;
pub mod resources;
pub mod scaleway;
pub mod security_group;
pub mod sweeper;
pub mod test_support;
pub mod volume;
pub mod waiter;
pub mod workerpool;

pub use config::{ConfigError, ProviderConfig};
pub use provider::{Meta, Provider, ProviderError};
pub use sweeper::{Sweeper, SweeperConfig, SweeperError, TEST_RUN_ID_ENV, TEST_RUN_TAG_PREFIX};
