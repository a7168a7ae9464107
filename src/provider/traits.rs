//! Callback traits implemented by resources, data sources and actions.

use std::future::Future;
use std::pin::Pin;

use crate::locality::{parse_nested_zoned_id, parse_zoned_id};

use super::data::ResourceData;
use super::error::ProviderError;
use super::meta::Meta;
use super::schema::Schema;
use super::timeouts::Timeouts;

/// Future returned by every callback.
pub type ResourceFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + 'a>>;

/// How an imported identifier is validated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportFormat {
    /// `zone/uuid`.
    Zoned,
    /// `zone/outer/inner`.
    Nested,
}

/// A managed resource with full CRUD.
pub trait Resource: Send + Sync {
    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Default budgets of each callback.
    fn timeouts(&self) -> Timeouts {
        Timeouts::short()
    }

    /// Shape of the identifier accepted by import.
    fn import_format(&self) -> ImportFormat {
        ImportFormat::Zoned
    }

    /// Creates the remote object and sets the identifier.
    fn create<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a>;

    /// Refreshes the state; clears the identifier when the object is gone.
    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a>;

    /// Applies the planned changes.
    fn update<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a>;

    /// Deletes the remote object.
    fn delete<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a>;

    /// Adjusts the plan: marks replacements and adds warnings.
    fn customize_diff<'a>(
        &'a self,
        _meta: &'a Meta,
        _data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Validates an identifier passed to import.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Locality`] when the identifier is not
    /// localized; bare UUIDs are rejected.
    fn validate_import_id(&self, id: &str) -> Result<(), ProviderError> {
        match self.import_format() {
            ImportFormat::Zoned => parse_zoned_id(id).map(drop)?,
            ImportFormat::Nested => parse_nested_zoned_id(id).map(drop)?,
        }
        Ok(())
    }
}

/// A read-only lookup.
pub trait DataSource: Send + Sync {
    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Looks the object up and fills the state.
    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a>;
}

/// A one-shot operation without state.
pub trait Action: Send + Sync {
    /// Input schema.
    fn schema(&self) -> Schema;

    /// Runs the action with the configured inputs.
    fn invoke<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a>;
}
