//! Core error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// A single strategy failure recorded by the credential chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    /// Name of the credential that failed (e.g. `ManagedIdentityCredential`).
    pub credential: String,
    /// Human-readable failure message.
    pub message: String,
}

impl ChainFailure {
    pub fn new(credential: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            message: message.into(),
        }
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Required input missing or invalid; never retried.
    Configuration,
    /// A strategy could not obtain a token.
    Acquisition,
    /// Every strategy of a chain failed.
    Chain,
    /// The client's bounded refresh loop gave up.
    Refresh,
    /// Network-level failure raised by the HTTP transport.
    Transport,
    /// Request construction or internal invariant failures.
    Internal,
}

/// Errors produced by credentials and the token-aware client.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required strategy input is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The Azure CLI could not be found or started.
    #[error("Azure CLI not installed: {0}")]
    CliNotInstalled(String),

    /// The Azure CLI has no logged-in account.
    #[error("Azure CLI not logged in: {0}")]
    CliNotLoggedIn(String),

    /// A subprocess ran but did not yield a usable result.
    #[error("Process error: {0}")]
    ProcessError(String),

    /// An external call exceeded its deadline.
    #[error("{context} timed out after {}ms", .timeout.as_millis())]
    Timeout { context: String, timeout: Duration },

    /// A token endpoint answered with a non-success status.
    #[error("{context} failed with status {status}: {body}")]
    HttpStatus {
        context: String,
        status: u16,
        body: String,
    },

    /// A token endpoint could not be reached.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The federated token file does not exist.
    #[error("Federated token file not found: {}", .0.display())]
    FederatedTokenFileNotFound(PathBuf),

    /// Any other I/O failure while reading local credential material.
    #[error("IO error: {0}")]
    IoError(String),

    /// A provider response could not be turned into a token.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Every credential in a chain failed.
    #[error("{}", render_chain(.0))]
    ChainExhausted(Vec<ChainFailure>),

    /// The client never obtained a valid token within its refresh budget.
    #[error("Failed to refresh token after multiple attempts ({attempts}){}", render_cause(.last_error))]
    RefreshExhausted {
        attempts: u32,
        last_error: Option<String>,
    },

    /// No token cached after a successful freshness loop.
    #[error("Token unexpectedly absent after refresh")]
    TokenAbsent,

    /// The outgoing request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network-level failure from the HTTP transport, passed through as-is.
    #[error(transparent)]
    Transport(reqwest::Error),
}

fn render_chain(failures: &[ChainFailure]) -> String {
    let mut out = String::from(
        "ChainedCredential failed to retrieve a token from the included credentials.",
    );
    for failure in failures {
        out.push('\n');
        out.push_str(&failure.credential);
        out.push_str(": ");
        out.push_str(&failure.message);
    }
    out
}

fn render_cause(cause: &Option<String>) -> String {
    cause.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
}

impl AuthError {
    /// Error category for programmatic handling.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::CliNotInstalled(_)
            | Self::CliNotLoggedIn(_)
            | Self::ProcessError(_)
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::HttpError(_)
            | Self::FederatedTokenFileNotFound(_)
            | Self::IoError(_)
            | Self::ParseError(_) => ErrorCategory::Acquisition,
            Self::ChainExhausted(_) => ErrorCategory::Chain,
            Self::RefreshExhausted { .. } => ErrorCategory::Refresh,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::TokenAbsent | Self::InvalidRequest(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a strategy failed to obtain a token.
    pub const fn is_acquisition_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Acquisition)
    }

    /// Whether this is a timeout of an external call.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Per-strategy failures when every chain entry failed.
    pub fn chain_failures(&self) -> Option<&[ChainFailure]> {
        match self {
            Self::ChainExhausted(failures) => Some(failures),
            _ => None,
        }
    }
}
