//! HTTP implementation of the API traits.
//!
//! Power actions and server deletion go through `scaleway-rs`; every other
//! endpoint is called directly with `reqwest` since the SDK does not cover
//! volumes, snapshots, security groups or private NICs.

mod block;
mod instance;
mod marketplace;

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use scaleway_rs::ScalewayApi;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::locality::Zone;

use super::error::ApiError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u64 = 100;
/// Default Scaleway API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.scaleway.com";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Connection settings for [`HttpClient`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpClientConfig {
    /// Base URL, without trailing slash.
    pub api_url: String,
    /// Secret key sent as `X-Auth-Token`.
    pub secret_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpClientConfig {
    /// Builds a configuration against the public endpoint.
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            api_url: String::from(DEFAULT_API_URL),
            secret_key: secret_key.into(),
            timeout: HTTP_TIMEOUT,
        }
    }
}

/// Client implementing [`super::InstanceApi`], [`super::BlockApi`] and
/// [`super::MarketplaceApi`] over HTTPS.
#[derive(Clone)]
pub struct HttpClient {
    api: ScalewayApi,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Creates a client from its connection settings.
    #[must_use]
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
        }
    }

    fn instance_url(&self, zone: Zone, path: &str) -> String {
        format!(
            "{}/instance/v1/zones/{zone}{path}",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn block_url(&self, zone: Zone, path: &str) -> String {
        format!(
            "{}/block/v1alpha1/zones/{zone}{path}",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn marketplace_url(&self, path: &str) -> String {
        format!(
            "{}/marketplace/v2{path}",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        HTTP_CLIENT
            .request(method, url)
            .header("X-Auth-Token", &self.config.secret_key)
            .timeout(self.config.timeout)
    }

    async fn execute(
        builder: RequestBuilder,
        target: Target<'_>,
    ) -> Result<bytes_body::Body, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(
            resource = target.resource,
            id = target.id,
            status = status.as_u16(),
            "scaleway api response"
        );
        if status.is_success() {
            return Ok(bytes_body::Body(body.to_vec()));
        }
        Err(ApiError::from_response(
            status.as_u16(),
            target.resource,
            target.id,
            &body,
        ))
    }

    async fn fetch_field<T: DeserializeOwned>(
        builder: RequestBuilder,
        field: &str,
        target: Target<'_>,
    ) -> Result<T, ApiError> {
        let body = Self::execute(builder, target).await?;
        body.field(field)
    }

    async fn get_field<T: DeserializeOwned>(
        &self,
        url: &str,
        field: &str,
        target: Target<'_>,
    ) -> Result<T, ApiError> {
        Self::fetch_field(self.request(Method::GET, url), field, target)
            .await
    }

    async fn send_field<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        field: &str,
        target: Target<'_>,
    ) -> Result<T, ApiError> {
        Self::fetch_field(self.request(method, url).json(body), field, target)
            .await
    }

    async fn get_root<T: DeserializeOwned>(
        &self,
        url: &str,
        target: Target<'_>,
    ) -> Result<T, ApiError> {
        Self::execute(self.request(Method::GET, url), target)
            .await?
            .decode()
    }

    async fn send_root<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        target: Target<'_>,
    ) -> Result<T, ApiError> {
        Self::execute(self.request(method, url).json(body), target)
            .await?
            .decode()
    }

    async fn delete(&self, url: &str, target: Target<'_>) -> Result<(), ApiError> {
        Self::execute(self.request(Method::DELETE, url), target)
            .await
            .map(drop)
    }

    async fn list_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
        field: &str,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page = 1_u64;
        loop {
            let builder = self
                .request(Method::GET, url)
                .query(query)
                .query(&[("page", page), ("per_page", PAGE_SIZE)]);
            let body = Self::execute(builder, Target::list(field)).await?;
            let value = body.value()?;
            let total = value
                .get("total_count")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            let batch: Vec<T> = bytes_body::decode_field(value, field)?;
            let batch_len = batch.len();
            items.extend(batch);
            if batch_len == 0 || items.len() as u64 >= total {
                return Ok(items);
            }
            page += 1;
        }
    }
}

/// Names the resource addressed by a request, used for error reporting.
#[derive(Clone, Copy, Debug)]
struct Target<'a> {
    resource: &'a str,
    id: &'a str,
}

impl<'a> Target<'a> {
    const fn new(resource: &'a str, id: &'a str) -> Self {
        Self { resource, id }
    }

    const fn list(resource: &'a str) -> Self {
        Self { resource, id: "" }
    }
}

mod bytes_body {
    use serde::de::DeserializeOwned;
    use serde_json::Value;

    use crate::scaleway::error::ApiError;

    pub(super) struct Body(pub(super) Vec<u8>);

    impl Body {
        pub(super) fn value(&self) -> Result<Value, ApiError> {
            serde_json::from_slice(&self.0).map_err(|err| ApiError::Decode(err.to_string()))
        }

        pub(super) fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
            serde_json::from_slice(&self.0).map_err(|err| ApiError::Decode(err.to_string()))
        }

        pub(super) fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T, ApiError> {
            decode_field(self.value()?, field)
        }

        pub(super) fn text(self) -> String {
            String::from_utf8_lossy(&self.0).into_owned()
        }
    }

    pub(super) fn decode_field<T: DeserializeOwned>(
        mut value: Value,
        field: &str,
    ) -> Result<T, ApiError> {
        let inner = value
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| ApiError::Decode(format!("response is missing '{field}'")))?;
        serde_json::from_value(inner).map_err(|err| ApiError::Decode(err.to_string()))
    }
}
