//! # azure-rest-auth - Token-aware HTTP access to Azure REST APIs
//!
//! Resolves an access token through a chain of credential strategies and keeps
//! it attached to every outgoing request, refreshing it when it expires.
//!
#![deny(unsafe_code)]

//! ## Features
//!
//! - **Credential chain**: workload identity, managed identity, service principal and
//!   Azure CLI, tried in order until one produces a token.
//! - **Token caching**: one token per client, refreshed on expiry with bounded linear backoff.
//! - **Pluggable seams**: swap the HTTP transport, the CLI command runner or the header builder.
//! - **Library first**: responses are passed through untouched; interpretation is up to the caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use azure_rest_auth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let policy = CredentialPolicy::new(
//!         Arc::new(ChainedCredential::new()),
//!         "https://management.azure.com/.default",
//!     );
//!     let client = AzureClient::new("https://management.azure.com", policy);
//!
//!     let response = client
//!         .get("/subscriptions?api-version=2022-12-01", RequestOptions::new())
//!         .await?;
//!     println!("{} {}", response.status, response.text());
//!     Ok(())
//! }
//! ```
//!
//! ## Environment
//!
//! The default chain reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`,
//! `AZURE_FEDERATED_TOKEN_FILE`, `AZURE_AUTHORITY_HOST` and `AZURE_IMDS_ENDPOINT`.
//! Set `AZURE_CREDENTIAL_DIAGNOSTICS=1` to log each chain step through `tracing`.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod utils;

pub use auth::{Token, TokenCredential};
pub use client::{AzureClient, CredentialPolicy, RequestOptions};
pub use error::{AuthError, Result};

/// Commonly used types.
pub mod prelude {
    pub use crate::auth::{
        AzureCliCredential, ChainedCredential, ManagedIdentityCredential,
        ServicePrincipalCredential, StaticCredential, Token, TokenCredential,
        WorkloadIdentityCredential, resource_to_scope, scope_to_resource,
    };
    pub use crate::client::{
        AzureClient, CredentialPolicy, HttpTransport, HttpTransportResponse, RequestOptions,
    };
    pub use crate::config::CredentialEnv;
    pub use crate::error::{AuthError, ErrorCategory, Result};
    pub use crate::retry::RefreshPolicy;
}
