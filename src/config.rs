//! Environment configuration boundary.
//!
//! Every credential strategy receives an already-resolved options struct; this
//! module is the single place that reads process environment variables. The
//! `from_env()` factories on the strategies are thin adapters over
//! [`CredentialEnv`].

use std::path::PathBuf;

use secrecy::SecretString;

pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub const AZURE_IMDS_ENDPOINT: &str = "AZURE_IMDS_ENDPOINT";
pub const AZURE_CREDENTIAL_DIAGNOSTICS: &str = "AZURE_CREDENTIAL_DIAGNOSTICS";

/// Credential-related settings resolved from the environment.
///
/// Empty values are treated as absent. Nothing is validated here; strategies
/// report missing inputs on their first `get_token` call.
#[derive(Clone, Default)]
pub struct CredentialEnv {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub federated_token_file: Option<PathBuf>,
    pub authority_host: Option<String>,
    pub imds_endpoint: Option<String>,
    /// Per-attempt chain logging.
    pub diagnostics: bool,
}

impl std::fmt::Debug for CredentialEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEnv")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("federated_token_file", &self.federated_token_file)
            .field("authority_host", &self.authority_host)
            .field("imds_endpoint", &self.imds_endpoint)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl CredentialEnv {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            tenant_id: get(AZURE_TENANT_ID),
            client_id: get(AZURE_CLIENT_ID),
            client_secret: get(AZURE_CLIENT_SECRET).map(SecretString::from),
            federated_token_file: get(AZURE_FEDERATED_TOKEN_FILE).map(PathBuf::from),
            authority_host: get(AZURE_AUTHORITY_HOST),
            imds_endpoint: get(AZURE_IMDS_ENDPOINT),
            diagnostics: get(AZURE_CREDENTIAL_DIAGNOSTICS).is_some_and(|v| is_truthy(&v)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
