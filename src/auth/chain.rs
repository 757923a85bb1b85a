//! Chained credential with ordered fallback.
//!
//! Resolution order:
//! 1) Workload identity (federated token file)
//! 2) Managed identity (IMDS)
//! 3) Service principal (client secret)
//! 4) Azure CLI
//!
//! Each entry is constructed fresh for every attempt and the first token wins.
//! Failures are collected so the final error explains every step. The chain
//! itself caches nothing.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::auth::{
    AzureCliCredential, AzureCliOptions, ManagedIdentityCredential, ManagedIdentityOptions,
    ServicePrincipalCredential, ServicePrincipalOptions, Token, TokenCredential,
    WorkloadIdentityCredential, WorkloadIdentityOptions,
};
use crate::config::CredentialEnv;
use crate::error::{AuthError, ChainFailure, Result};

type CredentialFactory = Arc<dyn Fn() -> Box<dyn TokenCredential> + Send + Sync>;

/// A named credential constructor in a chain.
#[derive(Clone)]
pub struct ChainEntry {
    name: &'static str,
    factory: CredentialFactory,
}

impl std::fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEntry").field("name", &self.name).finish()
    }
}

impl ChainEntry {
    pub fn new<F, C>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: TokenCredential + 'static,
    {
        Self {
            name,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn TokenCredential>),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Tries each credential in order until one yields a token.
#[derive(Debug, Clone)]
pub struct ChainedCredential {
    entries: Vec<ChainEntry>,
    diagnostics: bool,
}

impl Default for ChainedCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainedCredential {
    /// The default chain; every entry reads the process environment when it is tried.
    pub fn new() -> Self {
        let entries = vec![
            ChainEntry::new("WorkloadIdentityCredential", WorkloadIdentityCredential::from_env),
            ChainEntry::new("ManagedIdentityCredential", ManagedIdentityCredential::from_env),
            ChainEntry::new("ServicePrincipalCredential", ServicePrincipalCredential::from_env),
            ChainEntry::new("AzureCliCredential", AzureCliCredential::from_env),
        ];
        Self::from_entries(entries, CredentialEnv::from_env().diagnostics)
    }

    /// The default chain over an already-resolved configuration.
    pub fn from_config(env: CredentialEnv) -> Self {
        let env = Arc::new(env);
        let (wi, mi, sp, cli) = (env.clone(), env.clone(), env.clone(), env.clone());
        let entries = vec![
            ChainEntry::new("WorkloadIdentityCredential", move || {
                WorkloadIdentityCredential::new(WorkloadIdentityOptions::from_config(&wi))
            }),
            ChainEntry::new("ManagedIdentityCredential", move || {
                ManagedIdentityCredential::new(ManagedIdentityOptions::from_config(&mi))
            }),
            ChainEntry::new("ServicePrincipalCredential", move || {
                ServicePrincipalCredential::new(ServicePrincipalOptions::from_config(&sp))
            }),
            ChainEntry::new("AzureCliCredential", move || {
                AzureCliCredential::new(AzureCliOptions::from_config(&cli))
            }),
        ];
        Self::from_entries(entries, env.diagnostics)
    }

    pub const fn from_entries(entries: Vec<ChainEntry>, diagnostics: bool) -> Self {
        Self {
            entries,
            diagnostics,
        }
    }

    pub fn entry_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(ChainEntry::name).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    async fn get_token(&self, scope: &str) -> Result<Token> {
        let mut failures = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let started = Instant::now();
            if self.diagnostics {
                tracing::info!(target: "azure_rest_auth::chain", credential = entry.name, "attempting credential");
            }

            let credential = (entry.factory)();
            match credential.get_token(scope).await {
                Ok(token) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if self.diagnostics {
                        tracing::info!(target: "azure_rest_auth::chain", credential = entry.name, elapsed_ms, "credential succeeded");
                    }
                    tracing::debug!(target: "azure_rest_auth::chain", credential = entry.name, "token acquired");
                    return Ok(token);
                }
                Err(e) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if self.diagnostics {
                        tracing::info!(target: "azure_rest_auth::chain", credential = entry.name, elapsed_ms, error = %e, "credential failed");
                    } else {
                        tracing::debug!(target: "azure_rest_auth::chain", credential = entry.name, error = %e, "credential unavailable");
                    }
                    failures.push(ChainFailure::new(entry.name, e.to_string()));
                }
            }
        }

        tracing::debug!(target: "azure_rest_auth::chain", attempts = failures.len(), "all credentials failed");
        Err(AuthError::ChainExhausted(failures))
    }

    fn name(&self) -> &'static str {
        "ChainedCredential"
    }
}
