//! One-shot operations invoked outside the create/read/update/delete cycle.
//!
//! Actions keep no state. Their inputs are decoded from the configuration
//! bag into typed structs once the schema has validated them.

mod server;
mod snapshot;

use crate::locality::{Zone, expand_id, parse_zoned_id_lenient};
use crate::provider::{Meta, ProviderError, ResourceData};

pub use server::{ServerPowerAction, ServerRebootAction};
pub use snapshot::{CreateSnapshotAction, ExportSnapshotAction};

/// Zone and bare id of an object referenced by an action input.
///
/// The zone comes from the id prefix, then from the `zone` input, then
/// from the provider default.
fn target(meta: &Meta, data: &ResourceData, raw: &str) -> Result<(Zone, String), ProviderError> {
    let zone = match parse_zoned_id_lenient(raw)? {
        (Some(zone), _) => zone,
        (None, _) => meta.zone_of(data)?,
    };
    Ok((zone, expand_id(raw).to_owned()))
}
