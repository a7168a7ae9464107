//! Per-operation timeouts.

use std::time::Duration;

use crate::waiter::{DEFAULT_IMAGE_TIMEOUT, DEFAULT_SERVER_TIMEOUT, DEFAULT_SHORT_TIMEOUT};

/// Budgets for each callback of a resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Budget of `create`.
    pub create: Duration,
    /// Budget of `read`.
    pub read: Duration,
    /// Budget of `update`.
    pub update: Duration,
    /// Budget of `delete`.
    pub delete: Duration,
    /// Budget of anything else, for example plan-time lookups.
    pub default: Duration,
}

impl Timeouts {
    /// Same budget for every callback.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
            default: timeout,
        }
    }

    /// Defaults for servers and volumes.
    #[must_use]
    pub const fn server() -> Self {
        Self::uniform(DEFAULT_SERVER_TIMEOUT)
    }

    /// Defaults for images and snapshots.
    #[must_use]
    pub const fn image() -> Self {
        Self::uniform(DEFAULT_IMAGE_TIMEOUT)
    }

    /// Defaults for IPs, security groups and placement groups.
    #[must_use]
    pub const fn short() -> Self {
        Self::uniform(DEFAULT_SHORT_TIMEOUT)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::server()
    }
}
