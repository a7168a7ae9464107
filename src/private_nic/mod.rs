//! Private NIC attachment for a single server.
//!
//! A server carries at most one NIC per private network, so the handler
//! indexes the NICs it observes by private network identifier. The index
//! is built once per operation and kept in step with each attach and
//! detach it performs.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::locality::{Zone, expand_id};
use crate::provider::{Meta, ProviderError};
use crate::scaleway::{CreatePrivateNicRequest, PrivateNic};
use crate::waiter::{wait_for_mac_address, wait_for_private_nic, wait_for_private_nic_deleted};

/// NICs of one server keyed by private network.
pub struct PrivateNicHandler<'a> {
    meta: &'a Meta,
    zone: Zone,
    server_id: String,
    timeout: Duration,
    nics: BTreeMap<String, PrivateNic>,
}

impl<'a> PrivateNicHandler<'a> {
    /// Lists the NICs of `server_id`.
    ///
    /// # Errors
    ///
    /// Propagates API failures.
    pub async fn new(
        meta: &'a Meta,
        zone: Zone,
        server_id: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let nics = meta
            .instance
            .list_private_nics(zone, server_id)
            .await?
            .into_iter()
            .map(|nic| (nic.private_network_id.clone(), nic))
            .collect();
        Ok(Self {
            meta,
            zone,
            server_id: server_id.to_owned(),
            timeout,
            nics,
        })
    }

    /// NIC attached to a private network, given as a bare or regional id.
    #[must_use]
    pub fn get(&self, private_network_id: &str) -> Option<&PrivateNic> {
        self.nics.get(expand_id(private_network_id))
    }

    /// Observed NICs ordered by private network id.
    pub fn nics(&self) -> impl Iterator<Item = &PrivateNic> {
        self.nics.values()
    }

    /// Attaches the server to a private network and waits until the NIC
    /// has a MAC address. Already attached networks are left alone.
    ///
    /// # Errors
    ///
    /// Propagates API and waiter failures.
    pub async fn attach(
        &mut self,
        private_network_id: &str,
        tags: Vec<String>,
        ipam_ip_ids: Vec<String>,
    ) -> Result<PrivateNic, ProviderError> {
        let network = expand_id(private_network_id);
        if let Some(existing) = self.nics.get(network) {
            debug!(zone = %self.zone, server_id = %self.server_id, private_network_id = network, "already attached");
            return Ok(existing.clone());
        }
        let request = CreatePrivateNicRequest {
            private_network_id: network.to_owned(),
            tags,
            ipam_ip_ids,
        };
        let created = self
            .meta
            .instance
            .create_private_nic(self.zone, &self.server_id, &request)
            .await?;
        let options = self.meta.wait_options(self.timeout);
        wait_for_private_nic(
            self.meta.instance.as_ref(),
            self.zone,
            &self.server_id,
            &created.id,
            options,
        )
        .await?;
        let ready = wait_for_mac_address(
            self.meta.instance.as_ref(),
            self.zone,
            &self.server_id,
            &created.id,
            options,
        )
        .await?;
        info!(
            zone = %self.zone,
            server_id = %self.server_id,
            private_network_id = network,
            nic_id = %ready.id,
            "private NIC attached"
        );
        self.nics.insert(network.to_owned(), ready.clone());
        Ok(ready)
    }

    /// Detaches the server from a private network and waits until the NIC
    /// is gone. Networks without a NIC are ignored.
    ///
    /// # Errors
    ///
    /// Propagates API and waiter failures.
    pub async fn detach(&mut self, private_network_id: &str) -> Result<(), ProviderError> {
        let network = expand_id(private_network_id);
        let Some(nic) = self.nics.remove(network) else {
            return Ok(());
        };
        delete_private_nic(self.meta, self.zone, &self.server_id, &nic.id, self.timeout).await?;
        info!(
            zone = %self.zone,
            server_id = %self.server_id,
            private_network_id = network,
            "private NIC detached"
        );
        Ok(())
    }

    /// Detaches every observed NIC.
    ///
    /// # Errors
    ///
    /// Propagates API and waiter failures.
    pub async fn detach_all(&mut self) -> Result<(), ProviderError> {
        let networks: Vec<String> = self.nics.keys().cloned().collect();
        for network in networks {
            self.detach(&network).await?;
        }
        Ok(())
    }

    /// Applies a positional change of the `private_network` list.
    ///
    /// Each slot whose network changed detaches the old network, unless
    /// another slot still wants it, and attaches the new one. Slots past
    /// the end of `desired` are detached.
    ///
    /// # Errors
    ///
    /// Propagates API and waiter failures.
    pub async fn reconcile(
        &mut self,
        prior: &[String],
        desired: &[String],
    ) -> Result<(), ProviderError> {
        let wanted: Vec<&str> = desired.iter().map(|id| expand_id(id)).collect();
        let slots = prior.len().max(desired.len());
        for index in 0..slots {
            let old = prior.get(index).map(|id| expand_id(id));
            let new = wanted.get(index).copied();
            if old == new {
                continue;
            }
            if let Some(network) = old
                && !wanted.contains(&network)
            {
                self.detach(network).await?;
            }
            if let Some(network) = new {
                self.attach(network, Vec::new(), Vec::new()).await?;
            }
        }
        Ok(())
    }
}

/// Deletes a NIC and waits until it is gone; a NIC that is already gone
/// is not an error.
///
/// # Errors
///
/// Propagates API and waiter failures.
pub async fn delete_private_nic(
    meta: &Meta,
    zone: Zone,
    server_id: &str,
    nic_id: &str,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let options = meta.wait_options(timeout);
    match wait_for_private_nic(meta.instance.as_ref(), zone, server_id, nic_id, options).await {
        Ok(_) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match meta.instance.delete_private_nic(zone, server_id, nic_id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    wait_for_private_nic_deleted(meta.instance.as_ref(), zone, server_id, nic_id, options).await?;
    Ok(())
}
