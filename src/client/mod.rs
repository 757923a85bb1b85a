//! Token-aware HTTP client.
//!
//! [`AzureClient`] owns one cached [`Token`], refreshes it through a
//! [`TokenCredential`] when it is missing or expired (bounded, linear backoff),
//! injects authorization headers and hands the request to an [`HttpTransport`].
//! Responses are returned untouched; only token acquisition is ever retried.

pub mod headers;
pub mod transport;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::auth::{Token, TokenCredential};
use crate::error::{AuthError, Result};
use crate::retry::RefreshPolicy;
use crate::utils::join_url;

pub use headers::{HttpHeaderBuilder, bearer_headers, merge_headers};
pub use transport::{HttpTransport, HttpTransportRequest, HttpTransportResponse, ReqwestTransport};

/// Builds request headers from the current token, replacing the default bearer header.
pub type HeaderBuilder = Arc<dyn Fn(&Token) -> HeaderMap + Send + Sync>;

/// Which credential to use, for which scope, and how to turn a token into headers.
#[derive(Clone)]
pub struct CredentialPolicy {
    /// Credential used to obtain tokens.
    pub helper: Arc<dyn TokenCredential>,
    /// Scope passed to every `get_token` call.
    pub scope: String,
    /// Custom header builder; bearer authorization when `None`.
    pub builder: Option<HeaderBuilder>,
}

impl std::fmt::Debug for CredentialPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPolicy")
            .field("helper", &self.helper.name())
            .field("scope", &self.scope)
            .field("has_builder", &self.builder.is_some())
            .finish()
    }
}

impl CredentialPolicy {
    /// Create a policy with the default bearer header.
    pub fn new(helper: Arc<dyn TokenCredential>, scope: impl Into<String>) -> Self {
        Self {
            helper,
            scope: scope.into(),
            builder: None,
        }
    }

    /// Replace the default bearer header with custom headers.
    pub fn with_header_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&Token) -> HeaderMap + Send + Sync + 'static,
    {
        self.builder = Some(Arc::new(builder));
        self
    }
}

/// Per-request options. Caller headers win over generated ones.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method; `GET` when unset.
    pub method: Option<Method>,
    /// Caller headers, applied last.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Option<Vec<u8>>,
    /// Passed to the transport as-is.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Empty options: `GET`, no headers, no body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Add a single header, replacing an existing one with the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge a header map; its keys win on collision.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = merge_headers(self.headers, &headers);
        self
    }

    /// Set a raw body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the per-request timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP client that keeps a valid bearer token on every request.
///
/// Clones share the token cache. Concurrent requests that find the token stale
/// each run their own refresh unless single-flight refresh is enabled.
#[derive(Clone)]
pub struct AzureClient {
    base_url: String,
    credential: CredentialPolicy,
    transport: Arc<dyn HttpTransport>,
    refresh_policy: RefreshPolicy,
    cache: Arc<Mutex<Option<Token>>>,
    single_flight: bool,
    refresh_gate: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for AzureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClient")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("refresh_policy", &self.refresh_policy)
            .field("single_flight", &self.single_flight)
            .finish()
    }
}

impl AzureClient {
    /// Create a client using the default `reqwest` transport.
    pub fn new(base_url: impl Into<String>, credential: CredentialPolicy) -> Self {
        Self {
            base_url: base_url.into(),
            credential,
            transport: Arc::new(ReqwestTransport::new()),
            refresh_policy: RefreshPolicy::default(),
            cache: Arc::new(Mutex::new(None)),
            single_flight: false,
            refresh_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Use a custom HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Override the refresh attempt limit and backoff.
    pub const fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    /// Serialize token refreshes per client so one expiry triggers one refresh.
    pub const fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Currently cached token, fresh or not.
    pub fn cached_token(&self) -> Option<Token> {
        self.cache.lock().ok().and_then(|g| g.clone())
    }

    /// Seed the cache with an externally obtained token.
    pub fn prime_token(&self, token: Token) {
        self.store(token);
    }

    fn store(&self, token: Token) {
        if let Ok(mut g) = self.cache.lock() {
            *g = Some(token);
        }
    }

    fn has_fresh_token(&self) -> bool {
        self.cache
            .lock()
            .ok()
            .is_some_and(|g| g.as_ref().is_some_and(Token::is_fresh))
    }

    /// Ask the credential for a new token and cache it, replacing whatever was cached.
    pub async fn refresh(&self) -> Result<Token> {
        let token = self
            .credential
            .helper
            .get_token(&self.credential.scope)
            .await?;
        self.store(token.clone());
        tracing::debug!(target: "azure_rest_auth::client", credential = self.credential.helper.name(), expires_at = %token.expires_at(), "token refreshed");
        Ok(token)
    }

    async fn ensure_token(&self) -> Result<Token> {
        let _gate = if self.single_flight {
            Some(self.refresh_gate.lock().await)
        } else {
            None
        };

        let policy = self.refresh_policy;
        let mut attempt = 0;
        let mut last_error = None;
        while !self.has_fresh_token() {
            if attempt >= policy.max_attempts {
                tracing::warn!(target: "azure_rest_auth::client", attempts = attempt, "token refresh exhausted");
                return Err(AuthError::RefreshExhausted {
                    attempts: attempt,
                    last_error,
                });
            }
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
            if let Err(e) = self.refresh().await {
                tracing::warn!(target: "azure_rest_auth::client", attempt, error = %e, "token refresh failed");
                last_error = Some(e.to_string());
            }
        }

        self.cached_token().ok_or(AuthError::TokenAbsent)
    }

    /// Send a request to `path` (relative to the base URL) with a valid token attached.
    pub async fn send_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpTransportResponse> {
        let token = self.ensure_token().await?;
        let url = join_url(&self.base_url, path);

        let generated = match &self.credential.builder {
            Some(builder) => builder(&token),
            None => bearer_headers(&token)?,
        };
        let headers = merge_headers(generated, &options.headers);
        let method = options.method.unwrap_or(Method::GET);

        tracing::debug!(target: "azure_rest_auth::client", %method, %url, "dispatching request");

        self.transport
            .execute(HttpTransportRequest {
                method,
                url,
                headers,
                body: options.body,
                timeout: options.timeout,
            })
            .await
    }

    /// Send a `GET` request.
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<HttpTransportResponse> {
        self.send_request(path, options.with_method(Method::GET))
            .await
    }

    /// Send a `DELETE` request.
    pub async fn delete(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpTransportResponse> {
        self.send_request(path, options.with_method(Method::DELETE))
            .await
    }

    /// Send a `POST` request with an optional JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpTransportResponse> {
        self.send_json(Method::POST, path, body, options).await
    }

    /// Send a `PUT` request with an optional JSON body.
    pub async fn put(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpTransportResponse> {
        self.send_json(Method::PUT, path, body, options).await
    }

    /// Send a `PATCH` request with an optional JSON body.
    pub async fn patch(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpTransportResponse> {
        self.send_json(Method::PATCH, path, body, options).await
    }

    /// JSON content type by default; a given body replaces `options.body`.
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpTransportResponse> {
        let headers = merge_headers(
            HttpHeaderBuilder::new().with_json_content_type().build(),
            &options.headers,
        );
        let body = match body {
            Some(value) => Some(serde_json::to_vec(&value).map_err(|e| {
                AuthError::InvalidRequest(format!("failed to serialize request body: {e}"))
            })?),
            None => options.body,
        };
        self.send_request(
            path,
            RequestOptions {
                method: Some(method),
                headers,
                body,
                timeout: options.timeout,
            },
        )
        .await
    }
}
