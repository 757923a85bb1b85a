//! Managed identity credential backed by the Azure Instance Metadata Service (IMDS).
//!
//! The endpoint is only reachable from inside Azure, so requests carry a short
//! timeout and fail fast everywhere else.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::auth::{Token, TokenCredential, epoch_seconds, scope_to_resource};
use crate::config::CredentialEnv;
use crate::error::{AuthError, Result};

pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const METADATA_HEADER: &str = "Metadata";
const METADATA_HEADER_VALUE: &str = "true";
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);
/// Lifetime assumed when IMDS omits `expires_on`.
const FALLBACK_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct ImdsTokenResponse {
    access_token: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Options for [`ManagedIdentityCredential`].
#[derive(Debug, Clone)]
pub struct ManagedIdentityOptions {
    pub endpoint: String,
    /// Client id of a user-assigned identity; system-assigned when `None`.
    pub client_id: Option<String>,
    pub timeout: Duration,
}

impl Default for ManagedIdentityOptions {
    fn default() -> Self {
        Self {
            endpoint: IMDS_ENDPOINT.to_string(),
            client_id: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ManagedIdentityOptions {
    pub fn from_config(env: &CredentialEnv) -> Self {
        Self {
            endpoint: env
                .imds_endpoint
                .clone()
                .unwrap_or_else(|| IMDS_ENDPOINT.to_string()),
            client_id: env.client_id.clone(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Obtains tokens for the managed identity assigned to the current Azure host.
#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    options: ManagedIdentityOptions,
    http: Client,
}

impl ManagedIdentityCredential {
    pub fn new(options: ManagedIdentityOptions) -> Self {
        Self::with_http_client(options, Client::new())
    }

    pub const fn with_http_client(options: ManagedIdentityOptions, http: Client) -> Self {
        Self { options, http }
    }

    pub fn from_env() -> Self {
        Self::new(ManagedIdentityOptions::from_config(&CredentialEnv::from_env()))
    }

    fn request_error(&self, e: reqwest::Error) -> AuthError {
        if e.is_timeout() {
            AuthError::Timeout {
                context: "ManagedIdentityCredential: IMDS request".to_string(),
                timeout: self.options.timeout,
            }
        } else {
            AuthError::HttpError(format!(
                "ManagedIdentityCredential: metadata endpoint request failed (are you running in Azure?): {e}"
            ))
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<Token> {
        let resource = scope_to_resource(scope);
        let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
        if let Some(client_id) = &self.options.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        tracing::debug!(target: "azure_rest_auth::managed_identity", endpoint = %self.options.endpoint, %resource, user_assigned = self.options.client_id.is_some(), "requesting IMDS token");

        let resp = self
            .http
            .get(&self.options.endpoint)
            .header(METADATA_HEADER, METADATA_HEADER_VALUE)
            .query(&query)
            .timeout(self.options.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(AuthError::HttpStatus {
                context: "ManagedIdentityCredential: IMDS token request".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await.map_err(|e| self.request_error(e))?;
        let parsed: ImdsTokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::ParseError(format!(
                "ManagedIdentityCredential: invalid IMDS token response: {e}"
            ))
        })?;

        let expires_at = epoch_seconds(parsed.expires_on.as_ref())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(FALLBACK_LIFETIME_SECS));

        Ok(Token::new(parsed.access_token, expires_at)?
            .with_token_type(parsed.token_type)
            .with_client_id(parsed.client_id))
    }

    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/metadata/identity/oauth2/token";
    const SCOPE: &str = "https://management.azure.com/.default";

    fn credential(server: &MockServer) -> ManagedIdentityCredential {
        ManagedIdentityCredential::new(
            ManagedIdentityOptions::default().with_endpoint(format!("{}{}", server.uri(), TOKEN_PATH)),
        )
    }

    #[tokio::test]
    async fn fetches_system_assigned_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", "2018-02-01"))
            .and(query_param("resource", "https://management.azure.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mi-token",
                "client_id": "mi-client",
                "expires_on": "1700000000",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = credential(&server).get_token(SCOPE).await.unwrap();
        assert_eq!(token.access_token(), "mi-token");
        assert_eq!(token.client_id(), Some("mi-client"));
        assert_eq!(token.expires_at().timestamp_millis(), 1_700_000_000_000);
        assert_eq!(token.token_type(), "Bearer");
    }

    #[tokio::test]
    async fn passes_user_assigned_client_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(query_param("client_id", "user-assigned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ua-token",
                "expires_on": 1700000000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::new(
            ManagedIdentityOptions::default()
                .with_endpoint(format!("{}{}", server.uri(), TOKEN_PATH))
                .with_client_id("user-assigned"),
        );
        let token = cred.get_token(SCOPE).await.unwrap();
        assert_eq!(token.access_token(), "ua-token");
    }

    #[tokio::test]
    async fn missing_expiry_defaults_to_one_hour() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "mi-token" })),
            )
            .mount(&server)
            .await;

        let before = Utc::now();
        let token = credential(&server).get_token(SCOPE).await.unwrap();
        let after = Utc::now();
        let hour = chrono::Duration::seconds(3600);
        assert!(token.expires_at() >= before + hour);
        assert!(token.expires_at() <= after + hour);
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("identity not found"))
            .mount(&server)
            .await;

        let err = credential(&server).get_token(SCOPE).await.unwrap_err();
        match err {
            AuthError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "identity not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn truncated_error_body_is_reported() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial")
                .await
                .unwrap();
        });

        let cred = ManagedIdentityCredential::new(
            ManagedIdentityOptions::default()
                .with_endpoint(format!("http://{addr}{TOKEN_PATH}"))
                .with_timeout(Duration::from_secs(5)),
        );
        let err = cred.get_token(SCOPE).await.unwrap_err();
        match err {
            AuthError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("failed to read response body"), "{body}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::new(
            ManagedIdentityOptions::default()
                .with_endpoint(format!("{}{}", server.uri(), TOKEN_PATH))
                .with_timeout(Duration::from_millis(50)),
        );
        let err = cred.get_token(SCOPE).await.unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }

    #[test]
    fn options_follow_config() {
        let env = CredentialEnv {
            client_id: Some("cid".into()),
            imds_endpoint: Some("http://localhost:1/token".into()),
            ..CredentialEnv::default()
        };
        let options = ManagedIdentityOptions::from_config(&env);
        assert_eq!(options.endpoint, "http://localhost:1/token");
        assert_eq!(options.client_id.as_deref(), Some("cid"));
        assert_eq!(options.timeout, Duration::from_millis(300));

        let defaults = ManagedIdentityOptions::from_config(&CredentialEnv::default());
        assert_eq!(defaults.endpoint, IMDS_ENDPOINT);
    }
}
