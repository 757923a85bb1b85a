//! Workload identity credential.
//!
//! Reads a federated token file (e.g. a projected Kubernetes service account
//! token) on every call and exchanges it through [`ServicePrincipalCredential`]
//! as a client assertion.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;

use crate::auth::service_principal::{ServicePrincipalCredential, ServicePrincipalOptions};
use crate::auth::{Token, TokenCredential};
use crate::config::{AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE, AZURE_TENANT_ID, CredentialEnv};
use crate::error::{AuthError, Result};

/// Options for [`WorkloadIdentityCredential`].
#[derive(Debug, Clone, Default)]
pub struct WorkloadIdentityOptions {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub token_file_path: Option<PathBuf>,
    pub authority_host: Option<String>,
}

impl WorkloadIdentityOptions {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            client_id: Some(client_id.into()),
            token_file_path: Some(token_file_path.into()),
            authority_host: None,
        }
    }

    pub fn from_config(env: &CredentialEnv) -> Self {
        Self {
            tenant_id: env.tenant_id.clone(),
            client_id: env.client_id.clone(),
            token_file_path: env.federated_token_file.clone(),
            authority_host: env.authority_host.clone(),
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = Some(authority_host.into());
        self
    }
}

/// Exchanges a federated token file for an access token.
#[derive(Debug, Clone)]
pub struct WorkloadIdentityCredential {
    options: WorkloadIdentityOptions,
    http: Client,
}

impl WorkloadIdentityCredential {
    pub fn new(options: WorkloadIdentityOptions) -> Self {
        Self::with_http_client(options, Client::new())
    }

    pub const fn with_http_client(options: WorkloadIdentityOptions, http: Client) -> Self {
        Self { options, http }
    }

    pub fn from_env() -> Self {
        Self::new(WorkloadIdentityOptions::from_config(&CredentialEnv::from_env()))
    }

    async fn read_assertion(path: &Path) -> Result<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AuthError::FederatedTokenFileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(AuthError::IoError(format!(
                "WorkloadIdentityCredential: failed to read federated token file {}: {e}",
                path.display()
            ))),
        }
    }
}

fn missing(variable: &str) -> AuthError {
    AuthError::ConfigurationError(format!("WorkloadIdentityCredential: missing {variable}"))
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<Token> {
        let tenant_id = self
            .options
            .tenant_id
            .as_ref()
            .ok_or_else(|| missing(AZURE_TENANT_ID))?;
        let client_id = self
            .options
            .client_id
            .as_ref()
            .ok_or_else(|| missing(AZURE_CLIENT_ID))?;
        let path = self
            .options
            .token_file_path
            .as_ref()
            .ok_or_else(|| missing(AZURE_FEDERATED_TOKEN_FILE))?;

        let assertion = Self::read_assertion(path).await?;
        if assertion.is_empty() {
            return Err(AuthError::ConfigurationError(format!(
                "WorkloadIdentityCredential: federated token file {} is empty",
                path.display()
            )));
        }
        tracing::debug!(target: "azure_rest_auth::workload_identity", path = %path.display(), "read federated token file");

        let delegate = ServicePrincipalCredential::with_http_client(
            ServicePrincipalOptions {
                tenant_id: Some(tenant_id.clone()),
                client_id: Some(client_id.clone()),
                secret_or_assertion: Some(SecretString::from(assertion)),
                federated: true,
                authority_host: self.options.authority_host.clone(),
            },
            self.http.clone(),
        );
        delegate.get_token(scope).await
    }

    fn name(&self) -> &'static str {
        "WorkloadIdentityCredential"
    }
}
