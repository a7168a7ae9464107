//! Server lifecycle engine.
//!
//! Servers move between three user-visible states. [`plan_transition`]
//! maps a remote state and a target to the power actions that connect
//! them, rejecting any pair it does not know, and [`reach_state`] runs the
//! plan once the server and its volumes have settled. Commercial type
//! migration and marketplace image resolution live here too because both
//! need to stop and restart servers or to compare remote images.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::locality::{Zone, expand_id, is_uuid};
use crate::provider::{Meta, ProviderError};
use crate::scaleway::{
    LocalImageQuery, LocalImageType, Server, ServerAction, ServerActionRequest, ServerState,
    ServerType, UpdateServerRequest, VolumeType, bytes_to_gb,
};
use crate::volume::{UnknownVolume, wait_unknown_volume_ready};
use crate::waiter::wait_for_server;

/// State requested through the `state` attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetState {
    /// Remote `running`.
    Started,
    /// Remote `stopped`.
    Stopped,
    /// Remote `stopped in place`.
    Standby,
}

impl TargetState {
    /// Attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Standby => "standby",
        }
    }

    /// Parses an attribute value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(Self::Started),
            "stopped" => Some(Self::Stopped),
            "standby" => Some(Self::Standby),
            _ => None,
        }
    }

    const fn from_remote(state: ServerState) -> Option<Self> {
        match state {
            ServerState::Running => Some(Self::Started),
            ServerState::Stopped => Some(Self::Stopped),
            ServerState::StoppedInPlace => Some(Self::Standby),
            _ => None,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute value describing the remote state of `server`.
///
/// # Errors
///
/// Returns [`ProviderError::ServerLocked`] for locked servers and
/// [`ProviderError::InvalidTransition`] for transient or unknown states,
/// which usually mean another client is acting on the server.
pub fn state_of(server: &Server) -> Result<TargetState, ProviderError> {
    if server.state == ServerState::Locked {
        return Err(ProviderError::ServerLocked {
            id: server.id.clone(),
        });
    }
    TargetState::from_remote(server.state).ok_or_else(|| ProviderError::InvalidTransition {
        from: server.state.to_string(),
        to: String::from("a stable state"),
    })
}

/// Power actions leading from `from` to `to`, in order.
///
/// # Errors
///
/// Returns [`ProviderError::ServerLocked`] when the server is locked and
/// [`ProviderError::InvalidTransition`] for any pair outside the table.
pub fn plan_transition(
    server_id: &str,
    from: ServerState,
    to: TargetState,
) -> Result<Vec<ServerAction>, ProviderError> {
    use ServerAction::{Poweroff, Poweron, StopInPlace};

    if from == ServerState::Locked {
        return Err(ProviderError::ServerLocked {
            id: server_id.to_owned(),
        });
    }
    let actions = match (from, to) {
        (ServerState::Running, TargetState::Started)
        | (ServerState::Stopped, TargetState::Stopped)
        | (ServerState::StoppedInPlace, TargetState::Standby) => Vec::new(),
        (ServerState::Stopped | ServerState::StoppedInPlace, TargetState::Started) => {
            vec![Poweron]
        }
        (ServerState::Stopped, TargetState::Standby) => vec![Poweron, StopInPlace],
        (ServerState::Running, TargetState::Stopped) => vec![Poweroff],
        (ServerState::Running, TargetState::Standby) => vec![StopInPlace],
        (ServerState::StoppedInPlace, TargetState::Stopped) => vec![Poweron, Poweroff],
        _ => {
            return Err(ProviderError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
    };
    Ok(actions)
}

/// Volumes attached to `server`, root first.
#[must_use]
pub fn server_volumes(server: &Server) -> Vec<UnknownVolume> {
    server
        .root_volume()
        .into_iter()
        .chain(server.additional_volumes())
        .map(|volume| UnknownVolume {
            server_id: Some(server.id.clone()),
            ..UnknownVolume::from(volume)
        })
        .collect()
}

/// Waits until every volume attached to `server` accepts power actions.
///
/// # Errors
///
/// Propagates waiter failures.
pub async fn wait_server_volumes_ready(
    meta: &Meta,
    server: &Server,
    timeout: Duration,
) -> Result<(), ProviderError> {
    for volume in server_volumes(server) {
        wait_unknown_volume_ready(meta, &volume, timeout).await?;
    }
    Ok(())
}

/// Runs one power action and waits for the server to settle.
///
/// # Errors
///
/// Propagates API and waiter failures.
pub async fn server_action_and_wait(
    meta: &Meta,
    zone: Zone,
    server_id: &str,
    action: ServerAction,
    timeout: Duration,
) -> Result<Server, ProviderError> {
    let request = ServerActionRequest { action, name: None };
    meta.instance
        .server_action(zone, server_id, &request)
        .await?;
    info!(%zone, server_id, %action, "server action requested");
    Ok(wait_for_server(
        meta.instance.as_ref(),
        zone,
        server_id,
        meta.wait_options(timeout),
    )
    .await?)
}

/// Drives a server to `target` and returns its final representation.
///
/// The server is first waited out of any transient state. When actions
/// are needed, every attached volume is waited ready before the first
/// one.
///
/// # Errors
///
/// Returns [`ProviderError::ServerLocked`] or
/// [`ProviderError::InvalidTransition`] before any action, and propagates
/// API and waiter failures.
pub async fn reach_state(
    meta: &Meta,
    zone: Zone,
    server_id: &str,
    target: TargetState,
    timeout: Duration,
) -> Result<Server, ProviderError> {
    let options = meta.wait_options(timeout);
    let mut server = wait_for_server(meta.instance.as_ref(), zone, server_id, options).await?;
    let actions = plan_transition(server_id, server.state, target)?;
    if actions.is_empty() {
        debug!(%zone, server_id, %target, "server already in target state");
        return Ok(server);
    }
    wait_server_volumes_ready(meta, &server, timeout).await?;
    for action in actions {
        server = server_action_and_wait(meta, zone, server_id, action, timeout).await?;
    }
    info!(%zone, server_id, %target, "server reached target state");
    Ok(server)
}

/// Looks a commercial type up.
///
/// # Errors
///
/// Returns [`ProviderError::Validation`] on the `type` attribute when the
/// zone does not offer the type.
pub async fn get_server_type(
    meta: &Meta,
    zone: Zone,
    commercial_type: &str,
) -> Result<ServerType, ProviderError> {
    meta.instance
        .list_server_types(zone)
        .await?
        .into_iter()
        .find(|server_type| server_type.name == commercial_type)
        .ok_or_else(|| {
            ProviderError::validation(
                "type",
                format!("commercial type {commercial_type} is not available in {zone}"),
            )
        })
}

/// Checks the summed size of local volumes against the type bounds.
///
/// # Errors
///
/// Returns [`ProviderError::ServerTypeConstraint`] naming both bounds.
pub fn check_local_volumes(
    server_type: &ServerType,
    volumes: &[UnknownVolume],
) -> Result<(), ProviderError> {
    let Some(constraint) = server_type.volumes_constraint else {
        return Ok(());
    };
    let total: u64 = volumes
        .iter()
        .filter(|volume| volume.is_local())
        .filter_map(|volume| volume.size)
        .sum();
    if total < constraint.min_size || total > constraint.max_size {
        return Err(ProviderError::ServerTypeConstraint {
            commercial_type: server_type.name.clone(),
            min_gb: bytes_to_gb(constraint.min_size),
            max_gb: bytes_to_gb(constraint.max_size),
            total_gb: bytes_to_gb(total),
        });
    }
    Ok(())
}

/// Changes the commercial type of a server in place.
///
/// The server is stopped, updated and brought back to the state it had
/// before the call.
///
/// # Errors
///
/// Returns [`ProviderError::ServerTypeConstraint`] before touching the
/// server when its local volumes do not fit the new type, and propagates
/// API and waiter failures.
pub async fn migrate_server_type(
    meta: &Meta,
    zone: Zone,
    server_id: &str,
    commercial_type: &str,
    timeout: Duration,
) -> Result<Server, ProviderError> {
    let options = meta.wait_options(timeout);
    let server = wait_for_server(meta.instance.as_ref(), zone, server_id, options).await?;
    let server_type = get_server_type(meta, zone, commercial_type).await?;
    check_local_volumes(&server_type, &server_volumes(&server))?;
    let prior = state_of(&server)?;

    reach_state(meta, zone, server_id, TargetState::Stopped, timeout).await?;
    let request = UpdateServerRequest {
        commercial_type: Some(commercial_type.to_owned()),
        ..UpdateServerRequest::default()
    };
    meta.instance
        .update_server(zone, server_id, &request)
        .await?;
    info!(
        %zone,
        server_id,
        from = %server.commercial_type,
        to = commercial_type,
        "server type changed"
    );
    reach_state(meta, zone, server_id, prior, timeout).await
}

/// Marketplace flavour matching a root volume type.
#[must_use]
pub const fn local_image_type(root_volume_type: VolumeType) -> LocalImageType {
    if matches!(root_volume_type, VolumeType::SbsVolume) {
        LocalImageType::InstanceSbs
    } else {
        LocalImageType::InstanceLocal
    }
}

/// Resolves the `image` attribute to an image identifier.
///
/// UUIDs, localized or not, are used as they are. Anything else is a
/// marketplace label resolved for the commercial type and the flavour of
/// the root volume.
///
/// # Errors
///
/// Propagates marketplace failures, including not-found for unknown
/// labels.
pub async fn resolve_image(
    meta: &Meta,
    zone: Zone,
    image: &str,
    commercial_type: &str,
    root_volume_type: VolumeType,
) -> Result<String, ProviderError> {
    let candidate = expand_id(image);
    if is_uuid(candidate) {
        return Ok(candidate.to_owned());
    }
    let query = LocalImageQuery {
        label: image.to_owned(),
        zone,
        commercial_type: commercial_type.to_owned(),
        image_type: local_image_type(root_volume_type),
    };
    let resolved = meta.marketplace.get_local_image_by_label(&query).await?;
    debug!(%zone, label = image, image_id = %resolved.id, "marketplace label resolved");
    Ok(resolved.id)
}

/// Returns `true` when `server` no longer runs the image `desired` names.
///
/// A UUID drifts when it differs from the server image; a label drifts
/// when the marketplace now resolves it to another image.
///
/// # Errors
///
/// Propagates marketplace failures.
pub async fn image_drifted(
    meta: &Meta,
    server: &Server,
    desired: &str,
    root_volume_type: VolumeType,
) -> Result<bool, ProviderError> {
    let current = server.image.as_ref().map(|image| image.id.as_str());
    let resolved = resolve_image(
        meta,
        server.zone,
        desired,
        &server.commercial_type,
        root_volume_type,
    )
    .await?;
    Ok(current != Some(resolved.as_str()))
}

#[cfg(test)]
mod tests;
