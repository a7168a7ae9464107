//! `scaleway_instance_ip_reverse_dns`.
//!
//! The reverse record of an IP is only accepted once the matching A or
//! AAAA record resolves, which lags behind its creation. Updates retry on
//! that error until the operation timeout.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::locality::{Zone, expand_id, new_zoned_id, parse_zoned_id_lenient};
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Timeouts,
    Validation,
};
use crate::scaleway::{Ip, UpdateIpRequest};

use super::ip::ip_gone;
use super::locate;

/// `scaleway_instance_ip_reverse_dns`.
pub struct IpReverseDnsResource;

impl Resource for IpReverseDnsResource {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("ip_id")
                .required()
                .force_new()
                .validate(Validation::ZonedUuid),
            Attribute::string("reverse")
                .required()
                .validate(Validation::NonEmpty),
            Attribute::string("zone")
                .computed()
                .force_new()
                .validate(Validation::Zone),
        ])
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::server()
    }

    fn create<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(create(meta, data))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read(meta, data))
    }

    fn update<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(update(meta, data))
    }

    fn delete<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(delete(meta, data))
    }
}

/// Sets or clears the reverse record of an IP, retrying while the API
/// reports that the name does not resolve yet.
///
/// # Errors
///
/// Returns the last API error once `timeout` has elapsed, or any other
/// API failure immediately.
pub(crate) async fn update_reverse(
    meta: &Meta,
    zone: Zone,
    ip_id: &str,
    reverse: Option<String>,
    timeout: Duration,
) -> Result<Ip, ProviderError> {
    let request = UpdateIpRequest {
        reverse: Some(reverse),
        ..UpdateIpRequest::default()
    };
    let deadline = Instant::now() + timeout;
    loop {
        match meta.instance.update_ip(zone, ip_id, &request).await {
            Ok(ip) => {
                info!(%zone, ip_id, reverse = ?ip.reverse, "reverse DNS updated");
                return Ok(ip);
            }
            Err(err)
                if err.is_reverse_unresolved()
                    && Instant::now() + meta.retry_interval <= deadline =>
            {
                debug!(%zone, ip_id, "reverse DNS does not resolve yet, retrying");
                sleep(meta.retry_interval).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let ip_id = data.get_string("ip_id");
    let zone = match parse_zoned_id_lenient(&ip_id)? {
        (Some(zone), _) => zone,
        (None, _) => meta.zone_of(data)?,
    };
    let bare = expand_id(&ip_id).to_owned();
    let reverse = data.get_ok_str("reverse").map(str::to_owned);
    update_reverse(meta, zone, &bare, reverse, data.timeouts().create).await?;
    data.set_id(new_zoned_id(zone, &bare));
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let ip = match meta.instance.get_ip(zone, &id).await {
        Ok(ip) => ip,
        Err(err) if ip_gone(&err) => {
            data.clear_id();
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    data.set("ip_id", new_zoned_id(zone, &ip.id));
    data.set("reverse", ip.reverse.unwrap_or_default());
    data.set("zone", zone.as_str());
    Ok(())
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    if data.has_change("reverse") {
        let reverse = data.get_ok_str("reverse").map(str::to_owned);
        update_reverse(meta, zone, &id, reverse, data.timeouts().update).await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    match update_reverse(meta, zone, &id, None, data.timeouts().delete).await {
        Ok(_) => Ok(()),
        Err(ProviderError::Api(err)) if ip_gone(&err) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::json;

    use super::update_reverse;
    use crate::locality::Zone;
    use crate::scaleway::{CreateIpRequest, InstanceApi};
    use crate::test_support::{FakeCloud, TEST_PROJECT_ID};

    const REVERSE_DNS: &str = "scaleway_instance_ip_reverse_dns";

    async fn reserve(cloud: &FakeCloud) -> String {
        cloud
            .create_ip(
                Zone::FrPar1,
                &CreateIpRequest {
                    project: TEST_PROJECT_ID.to_owned(),
                    ..CreateIpRequest::default()
                },
            )
            .await
            .expect("reserve")
            .id
    }

    #[rstest]
    #[tokio::test]
    async fn unresolved_reverse_is_retried_until_accepted() {
        let cloud = FakeCloud::new();
        let ip = reserve(&cloud).await;
        cloud.fail_reverse_resolution(2);

        let updated = update_reverse(
            &cloud.meta(),
            Zone::FrPar1,
            &ip,
            Some(String::from("www.example.com")),
            Duration::from_secs(5),
        )
        .await
        .expect("reverse set");

        assert_eq!(updated.reverse.as_deref(), Some("www.example.com"));
        assert_eq!(cloud.calls_matching("update_ip").len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn retries_stop_at_the_timeout() {
        let cloud = FakeCloud::new();
        let ip = reserve(&cloud).await;
        cloud.fail_reverse_resolution(u32::MAX);

        let err = update_reverse(
            &cloud.meta(),
            Zone::FrPar1,
            &ip,
            Some(String::from("www.example.com")),
            Duration::from_millis(20),
        )
        .await
        .expect_err("never resolves");

        assert!(err.to_string().contains("cannot be resolved"), "{err}");
    }

    #[rstest]
    #[tokio::test]
    async fn delete_clears_the_record() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let ip = reserve(&cloud).await;
        let config = json!({"ip_id": format!("fr-par-1/{ip}"), "reverse": "www.example.com"});
        let plan = provider.plan(REVERSE_DNS, None, config).await.expect("plan");
        let (id, state) = provider
            .apply(REVERSE_DNS, None, Some(plan.planned))
            .await
            .expect("create")
            .state
            .expect("state");
        assert_eq!(state["reverse"], json!("www.example.com"));

        provider
            .apply(REVERSE_DNS, Some((&id, &state)), None)
            .await
            .expect("delete");

        assert_eq!(cloud.ip(&ip).and_then(|stored| stored.reverse), None);
    }
}
