//! Type Conversions for AuthError
//!
//! This module contains From trait implementations for converting
//! common error types into AuthError.

use super::types::AuthError;

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for AuthError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidRequest(format!("invalid header value: {err}"))
    }
}
