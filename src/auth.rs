//! Per-repository pull-token acquisition and the single-retry-on-401 policy.
//!
//! Deliberately the opposite of a global mutable session: every caller owns
//! one `RegistryAuth`, scoped to one `(namespace, repo)`, and must call
//! [`RegistryAuth::invalidate`] at the end of its logical operation so a
//! repo-scoped token can never leak into a request for a different repo.

use crate::client::TransportHandle;
use crate::{error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use snafu::{ensure, OptionExt};
use url::Url;

pub const DOCKER_REGISTRY_HOST: &str = "https://registry-1.docker.io";
const DOCKER_AUTH_URL: &str = "https://auth.docker.io/token";
const DOCKER_AUTH_SERVICE: &str = "registry.docker.io";

pub const MANIFEST_ACCEPT: &str =
    "application/vnd.docker.distribution.manifest.v2+json, application/vnd.docker.distribution.manifest.list.v2+json, application/vnd.oci.image.manifest.v1+json, application/vnd.oci.image.index.v1+json";

#[derive(Debug, PartialEq, Eq)]
enum TokenState {
    NoToken,
    HaveToken(String),
    Invalidated,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token")]
    token: String,
}

/// Basic-auth credentials, presented to the token endpoint if configured.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Owns the lifecycle of a single pull token scoped to one repository.
#[derive(Debug)]
pub struct RegistryAuth {
    transport: TransportHandle,
    auth_url: Url,
    registry_host: Url,
    namespace: String,
    repo: String,
    basic: Option<BasicCredentials>,
    state: TokenState,
}

impl RegistryAuth {
    pub fn new(namespace: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            transport: TransportHandle::new(),
            auth_url: Url::parse(DOCKER_AUTH_URL).expect("static url is valid"),
            registry_host: Url::parse(DOCKER_REGISTRY_HOST).expect("static url is valid"),
            namespace: namespace.into(),
            repo: repo.into(),
            basic: None,
            state: TokenState::NoToken,
        }
    }

    pub fn with_basic_auth(mut self, credentials: BasicCredentials) -> Self {
        self.basic = Some(credentials);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    pub fn registry_host(&self) -> &Url {
        &self.registry_host
    }

    /// Acquire (or reuse) a pull-scoped token for this repository.
    pub async fn ensure_token(&mut self) -> Result<&str> {
        if matches!(self.state, TokenState::HaveToken(_)) {
            return Ok(self.current_token().expect("state just matched HaveToken"));
        }

        ensure!(
            self.state != TokenState::Invalidated,
            error::AuthSnafu {
                reason: "auth handle was already invalidated".to_string()
            }
        );

        let scope = format!("repository:{}/{}:pull", self.namespace, self.repo);
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("service", DOCKER_AUTH_SERVICE)
            .append_pair("scope", &scope);

        let mut headers = HeaderMap::new();
        if let Some(basic) = &self.basic {
            use base64::Engine;
            let value = format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", basic.username, basic.password))
            );
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|_| error::Error::AuthError {
                    reason: "credentials contain invalid header characters".to_string(),
                })?,
            );
        }

        let response = self
            .transport
            .send(Method::GET, url, headers)
            .await
            .map_err(|_| error::Error::AuthError {
                reason: "token endpoint request failed".to_string(),
            })?;

        ensure!(
            response.status().is_success(),
            error::AuthSnafu {
                reason: format!("token endpoint returned {}", response.status())
            }
        );

        let parsed: TokenResponse =
            response
                .json()
                .await
                .map_err(|_| error::Error::AuthError {
                    reason: "token endpoint response was not valid json".to_string(),
                })?;

        trace!(target: "auth", namespace = %self.namespace, repo = %self.repo, "acquired pull token");
        self.state = TokenState::HaveToken(parsed.token);
        match &self.state {
            TokenState::HaveToken(token) => Ok(token.as_str()),
            _ => unreachable!(),
        }
    }

    /// Send a request, attaching the bearer token and the registry `Accept`
    /// header, retrying exactly once on a 401 after refreshing the token.
    pub async fn request(&mut self, method: Method, url: Url) -> Result<Response> {
        self.request_with(method, url, None).await
    }

    /// Like [`RegistryAuth::request`] but also sets a `Range` header, for
    /// the range blob reader.
    pub async fn request_range(&mut self, url: Url, start: u64, end: u64) -> Result<Response> {
        self.request_with(Method::GET, url, Some((start, end))).await
    }

    async fn request_with(
        &mut self,
        method: Method,
        url: Url,
        range: Option<(u64, u64)>,
    ) -> Result<Response> {
        let response = self.send_once(method.clone(), url.clone(), range).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(target: "auth", namespace = %self.namespace, repo = %self.repo, "401, refreshing token and retrying once");
        self.state = TokenState::NoToken;
        self.ensure_token().await?;
        let retried = self.send_once(method, url, range).await?;
        ensure!(
            retried.status() != StatusCode::UNAUTHORIZED,
            error::UnauthorizedSnafu {
                namespace: self.namespace.clone(),
                repo: self.repo.clone(),
            }
        );
        Ok(retried)
    }

    fn current_token(&self) -> Option<&str> {
        match &self.state {
            TokenState::HaveToken(t) => Some(t.as_str()),
            _ => None,
        }
    }

    async fn send_once(
        &mut self,
        method: Method,
        url: Url,
        range: Option<(u64, u64)>,
    ) -> Result<Response> {
        self.ensure_token().await?;
        let token = self
            .current_token()
            .context(error::AuthSnafu {
                reason: "token missing after ensure_token".to_string(),
            })?
            .to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| error::Error::AuthError {
                reason: "token contains invalid header characters".to_string(),
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_ACCEPT));
        if let Some((start, end)) = range {
            headers.insert(
                reqwest::header::RANGE,
                HeaderValue::from_str(&format!("bytes={start}-{end}")).map_err(|_| {
                    error::Error::AuthError {
                        reason: "invalid range".to_string(),
                    }
                })?,
            );
        }
        self.transport.send(method, url, headers).await
    }

    /// Drop the token. Must be called at the end of a logical operation.
    pub fn invalidate(&mut self) {
        self.state = TokenState::Invalidated;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// Serves `responses` in order, one per accepted connection, then stops.
    fn spawn_sequential_mock(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for response in responses {
                if let Ok((mut stream, _)) = listener.accept() {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(response.as_bytes());
                }
            }
        });
        format!("http://{addr}")
    }

    /// Serves the same response to every connection, counting hits.
    fn spawn_counting_mock(response: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        (format!("http://{addr}"), counter)
    }

    #[tokio::test]
    async fn ensure_token_is_cached_after_first_fetch() {
        let (addr, hits) =
            spawn_counting_mock(http_response("200 OK", r#"{"token":"abctoken"}"#));
        let mut auth = RegistryAuth::new("library", "alpine")
            .with_auth_url(Url::parse(&format!("{addr}/token")).unwrap());

        let first = auth.ensure_token().await.unwrap().to_string();
        let second = auth.ensure_token().await.unwrap().to_string();

        assert_eq!(first, "abctoken");
        assert_eq!(second, "abctoken");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_retries_exactly_once_on_401() {
        let (auth_addr, auth_hits) =
            spawn_counting_mock(http_response("200 OK", r#"{"token":"abctoken"}"#));
        let registry_addr = spawn_sequential_mock(vec![
            http_response("401 Unauthorized", ""),
            http_response("200 OK", "hello"),
        ]);

        let mut auth = RegistryAuth::new("library", "alpine")
            .with_auth_url(Url::parse(&format!("{auth_addr}/token")).unwrap());
        let url = Url::parse(&registry_addr).unwrap();

        let response = auth.request(Method::GET, url).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.text().await.unwrap(), "hello");
        assert_eq!(auth_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn request_fails_with_unauthorized_after_second_401() {
        let (auth_addr, _auth_hits) =
            spawn_counting_mock(http_response("200 OK", r#"{"token":"abctoken"}"#));
        let registry_addr = spawn_sequential_mock(vec![
            http_response("401 Unauthorized", ""),
            http_response("401 Unauthorized", ""),
        ]);

        let mut auth = RegistryAuth::new("library", "alpine")
            .with_auth_url(Url::parse(&format!("{auth_addr}/token")).unwrap());
        let url = Url::parse(&registry_addr).unwrap();

        let err = auth.request(Method::GET, url).await.unwrap_err();
        assert!(matches!(err, error::Error::Unauthorized { .. }));
    }
}
