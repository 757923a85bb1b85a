//! Authentication helpers and credential strategies.
//!
//! This module defines the async [`TokenCredential`] contract used by the
//! credential chain and the token-aware client, the [`Token`] value it yields,
//! and the concrete acquisition strategies.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{AuthError, Result};

pub mod chain;
pub mod cli;
pub mod managed_identity;
pub mod service_principal;
pub mod workload_identity;

pub use chain::{ChainEntry, ChainedCredential};
pub use cli::{AzureCliCredential, AzureCliOptions, CommandOutput, CommandRunner, ShellCommandRunner};
pub use managed_identity::{ManagedIdentityCredential, ManagedIdentityOptions};
pub use service_principal::{ServicePrincipalCredential, ServicePrincipalOptions};
pub use workload_identity::{WorkloadIdentityCredential, WorkloadIdentityOptions};

/// Marker appended to a resource URI meaning "every permission granted to the app".
pub const DEFAULT_SCOPE_SUFFIX: &str = "/.default";

/// Public Azure authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// A short-lived access token.
#[derive(Clone)]
pub struct Token {
    access_token: SecretString,
    expires_at: DateTime<Utc>,
    token_type: Option<String>,
    client_id: Option<String>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl Token {
    /// Create a token. An empty access token is rejected.
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(AuthError::ParseError(
                "token response did not contain an access token".to_string(),
            ));
        }
        Ok(Self {
            access_token: SecretString::from(access_token),
            expires_at,
            token_type: None,
            client_id: None,
        })
    }

    /// Set the token type reported by the provider.
    pub fn with_token_type(mut self, token_type: Option<String>) -> Self {
        self.token_type = token_type;
        self
    }

    /// Set the client id of the identity the token was issued to.
    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    /// Raw access token, suitable for an `Authorization` header.
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Absolute expiry time.
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Token type reported by the provider, `Bearer` when none was given.
    pub fn token_type(&self) -> &str {
        self.token_type.as_deref().unwrap_or("Bearer")
    }

    /// Client id of the issuing identity, when known.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Strict comparison: a token expiring exactly at `now` is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the token is still valid right now.
    pub fn is_fresh(&self) -> bool {
        !self.is_expired_at(Utc::now())
    }
}

/// An async access-token source.
///
/// Implementations hold no mutable state: each call performs its own external
/// lookup (subprocess, HTTP request or file read) and returns a fresh answer.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Obtain a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> Result<Token>;

    /// Name used in diagnostics and chain errors.
    fn name(&self) -> &'static str;
}

/// A credential returning a fixed token, for tests and externally managed tokens.
pub struct StaticCredential {
    token: Token,
}

impl StaticCredential {
    /// Always return `token`.
    pub const fn new(token: Token) -> Self {
        Self { token }
    }

    /// A bearer token that stays valid for the given lifetime from now.
    pub fn bearer(access_token: impl Into<String>, lifetime: Duration) -> Result<Self> {
        Ok(Self::new(Token::new(access_token, Utc::now() + lifetime)?))
    }
}

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, _scope: &str) -> Result<Token> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &'static str {
        "StaticCredential"
    }
}

/// Strip the default-scope marker, yielding the bare resource URI.
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix(DEFAULT_SCOPE_SUFFIX).unwrap_or(scope)
}

/// Append the default-scope marker when missing.
pub fn resource_to_scope(resource: &str) -> String {
    if resource.ends_with(DEFAULT_SCOPE_SUFFIX) {
        resource.to_string()
    } else {
        format!("{}{}", resource.trim_end_matches('/'), DEFAULT_SCOPE_SUFFIX)
    }
}

/// Parse an epoch-seconds value delivered either as a JSON number or a numeric string.
pub(crate) fn epoch_seconds(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    DateTime::from_timestamp(secs, 0)
}
