//! Service principal credential (OAuth 2.0 client credentials grant).
//!
//! Authenticates an app registration against the Microsoft identity platform
//! with either a client secret or a federated client assertion. Expiry is
//! derived additively from `expires_in`, never from an absolute timestamp.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::auth::{DEFAULT_AUTHORITY_HOST, Token, TokenCredential};
use crate::config::{AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID, CredentialEnv};
use crate::error::{AuthError, Result};

/// Assertion type for JWT-bearer federated client authentication.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: serde_json::Value,
}

/// Options for [`ServicePrincipalCredential`].
#[derive(Clone, Default)]
pub struct ServicePrincipalOptions {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    /// Client secret, or the client assertion when `federated` is set.
    pub secret_or_assertion: Option<SecretString>,
    /// Send `secret_or_assertion` as a `client_assertion` instead of a `client_secret`.
    pub federated: bool,
    /// Authority host; the public Azure authority when `None`.
    pub authority_host: Option<String>,
}

impl std::fmt::Debug for ServicePrincipalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalOptions")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("has_secret_or_assertion", &self.secret_or_assertion.is_some())
            .field("federated", &self.federated)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl ServicePrincipalOptions {
    /// Client-secret flow.
    pub fn client_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            client_id: Some(client_id.into()),
            secret_or_assertion: Some(SecretString::from(secret.into())),
            federated: false,
            authority_host: None,
        }
    }

    /// Federated client-assertion flow.
    pub fn client_assertion(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        assertion: impl Into<String>,
    ) -> Self {
        Self {
            federated: true,
            ..Self::client_secret(tenant_id, client_id, assertion)
        }
    }

    pub fn from_config(env: &CredentialEnv) -> Self {
        Self {
            tenant_id: env.tenant_id.clone(),
            client_id: env.client_id.clone(),
            secret_or_assertion: env.client_secret.clone(),
            federated: false,
            authority_host: env.authority_host.clone(),
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = Some(authority_host.into());
        self
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`, tolerating a trailing slash on the authority.
    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        let authority = self
            .authority_host
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY_HOST)
            .trim_end_matches('/');
        format!("{authority}/{tenant_id}/oauth2/v2.0/token")
    }
}

/// Obtains app-only tokens for a service principal.
#[derive(Debug, Clone)]
pub struct ServicePrincipalCredential {
    options: ServicePrincipalOptions,
    http: Client,
}

impl ServicePrincipalCredential {
    pub fn new(options: ServicePrincipalOptions) -> Self {
        Self::with_http_client(options, Client::new())
    }

    pub const fn with_http_client(options: ServicePrincipalOptions, http: Client) -> Self {
        Self { options, http }
    }

    pub fn from_env() -> Self {
        Self::new(ServicePrincipalOptions::from_config(&CredentialEnv::from_env()))
    }

    fn required<'a>(value: Option<&'a str>, variable: &str) -> Result<&'a str> {
        value.ok_or_else(|| {
            AuthError::ConfigurationError(format!(
                "ServicePrincipalCredential: missing {variable}"
            ))
        })
    }
}

#[async_trait]
impl TokenCredential for ServicePrincipalCredential {
    async fn get_token(&self, scope: &str) -> Result<Token> {
        let secret = self.options.secret_or_assertion.as_ref().ok_or_else(|| {
            let what = if self.options.federated {
                "client assertion"
            } else {
                AZURE_CLIENT_SECRET
            };
            AuthError::ConfigurationError(format!("ServicePrincipalCredential: missing {what}"))
        })?;
        let tenant_id = Self::required(self.options.tenant_id.as_deref(), AZURE_TENANT_ID)?;
        let client_id = Self::required(self.options.client_id.as_deref(), AZURE_CLIENT_ID)?;

        let url = self.options.token_endpoint(tenant_id);
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("scope", scope),
        ];
        if self.options.federated {
            form.push(("client_assertion", secret.expose_secret()));
            form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE));
        } else {
            form.push(("client_secret", secret.expose_secret()));
        }

        tracing::debug!(target: "azure_rest_auth::service_principal", %url, federated = self.options.federated, "requesting client-credentials token");

        let resp = self.http.post(&url).form(&form).send().await.map_err(|e| {
            AuthError::HttpError(format!(
                "ServicePrincipalCredential: token endpoint request failed: {e}"
            ))
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            AuthError::HttpError(format!(
                "ServicePrincipalCredential: failed to read token response: {e}"
            ))
        })?;
        if !status.is_success() {
            return Err(AuthError::HttpStatus {
                context: "ServicePrincipalCredential: token request".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::ParseError(format!(
                "ServicePrincipalCredential: invalid token response: {e}"
            ))
        })?;
        let expires_in = match &parsed.expires_in {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            AuthError::ParseError(format!(
                "ServicePrincipalCredential: invalid expires_in: {}",
                parsed.expires_in
            ))
        })?;

        let expires_at = chrono::Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::ParseError(format!(
                    "ServicePrincipalCredential: invalid expires_in: {expires_in} is out of range"
                ))
            })?;
        Ok(Token::new(parsed.access_token, expires_at)?
            .with_token_type(parsed.token_type)
            .with_client_id(Some(client_id.to_string())))
    }

    fn name(&self) -> &'static str {
        "ServicePrincipalCredential"
    }
}
