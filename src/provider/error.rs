//! Errors raised by resource, data source and action callbacks.

use thiserror::Error;

use crate::locality::LocalityError;
use crate::scaleway::ApiError;
use crate::waiter::WaitError;

/// Errors surfaced to the host as error diagnostics.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// An attribute failed validation before any remote call.
    #[error("invalid value for {field}: {message}")]
    Validation {
        /// Attribute path, for example `root_volume.0.size_in_gb`.
        field: String,
        /// Reason.
        message: String,
    },
    /// A localized identifier could not be parsed.
    #[error(transparent)]
    Locality(#[from] LocalityError),
    /// A remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// A waiter failed.
    #[error(transparent)]
    Wait(#[from] WaitError),
    /// The server cannot move between the two states.
    #[error("cannot transition server from {from} to {to}")]
    InvalidTransition {
        /// Current remote state.
        from: String,
        /// Requested target state.
        to: String,
    },
    /// The server is locked by the platform.
    #[error("server {id} is locked, please contact Scaleway support")]
    ServerLocked {
        /// Server identifier.
        id: String,
    },
    /// Local volumes do not fit the requested commercial type.
    #[error(
        "{commercial_type} requires between {min_gb}GB and {max_gb}GB of local volumes, got {total_gb}GB"
    )]
    ServerTypeConstraint {
        /// Commercial type.
        commercial_type: String,
        /// Lower bound in GB.
        min_gb: u64,
        /// Upper bound in GB.
        max_gb: u64,
        /// Sum of local volume sizes in GB.
        total_gb: u64,
    },
    /// A volume operation is not supported for its type.
    #[error("volume {id}: {message}")]
    Volume {
        /// Volume identifier.
        id: String,
        /// Reason.
        message: String,
    },
    /// The provider configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Builds a [`ProviderError::Validation`].
    #[must_use]
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    /// Builds a [`ProviderError::Volume`].
    #[must_use]
    pub fn volume(id: &str, message: impl Into<String>) -> Self {
        Self::Volume {
            id: id.to_owned(),
            message: message.into(),
        }
    }

    /// Returns `true` when the error means the remote object is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Api(err) => err.is_not_found(),
            Self::Wait(err) => err.is_not_found(),
            _ => false,
        }
    }
}
