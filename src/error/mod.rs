//! Error Handling Module
//!
//! This module provides the error type shared by every credential strategy,
//! the credential chain and the token-aware client:
//! - Core error types (`AuthError`, `ChainFailure`, `ErrorCategory`)
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use azure_rest_auth::error::{AuthError, ErrorCategory};
//!
//! let error = AuthError::ConfigurationError("AZURE_CLIENT_SECRET is not set".into());
//! assert_eq!(error.category(), ErrorCategory::Configuration);
//! ```

mod conversions;
pub mod types;

pub use types::*;
