//! Host-runtime seam.
//!
//! Resources, data sources and actions are async callbacks over a shared
//! [`Meta`] handle and a [`ResourceData`] attribute bag. The [`Provider`]
//! registry validates configuration against each [`Schema`], computes plans
//! and dispatches create, read, update and delete.

mod data;
mod diagnostics;
mod error;
mod meta;
mod registry;
mod schema;
mod timeouts;
mod traits;

pub use data::{ResourceData, is_zero, lookup};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::ProviderError;
pub use meta::Meta;
pub use registry::{Applied, Plan, Provider};
pub use schema::{Attribute, Kind, Schema, Validation};
pub use timeouts::Timeouts;
pub use traits::{Action, DataSource, ImportFormat, Resource, ResourceFuture};
