use std::fmt::Debug;
use std::sync::Arc;

use crate::{error, Result};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, Response};
use snafu::ResultExt;
use url::Url;

/// A trait over the handful of HTTP verbs this crate issues against a
/// registry (or its auth service). Exists purely as an intercept point for
/// unit tests; [`ReqwestTransport`] is the only production implementation.
#[async_trait]
pub(crate) trait RegistryTransport: Send + Sync + Debug {
    async fn send(&self, method: Method, url: Url, headers: HeaderMap) -> Result<Response>;
}

#[derive(Debug)]
pub(crate) struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client configuration is static and always valid"),
        }
    }
}

#[async_trait]
impl RegistryTransport for ReqwestTransport {
    async fn send(&self, method: Method, url: Url, headers: HeaderMap) -> Result<Response> {
        self.client
            .request(method, url)
            .headers(headers)
            .send()
            .await
            .context(error::RequestSnafu)
    }
}

/// Handle to the transport. Cloneable and cheap, matching the registry
/// client handle pattern: callers hold this, not a raw `reqwest::Client`.
#[derive(Clone, Debug)]
pub(crate) struct TransportHandle {
    inner: Arc<dyn RegistryTransport>,
}

impl TransportHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReqwestTransport::new()),
        }
    }

    pub async fn send(&self, method: Method, url: Url, headers: HeaderMap) -> Result<Response> {
        self.inner.send(method, url, headers).await
    }
}
