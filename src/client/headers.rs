//! HTTP Headers Utility
//!
//! Header construction for authorized requests and caller-wins merging.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::auth::Token;
use crate::error::{AuthError, Result};

/// HTTP header builder for API requests
pub struct HttpHeaderBuilder {
    headers: HeaderMap,
}

impl HttpHeaderBuilder {
    /// Create a new header builder
    pub fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
        }
    }

    /// Add Bearer token authorization
    pub fn with_bearer_auth(mut self, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Add JSON content type
    pub fn with_json_content_type(mut self) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            AuthError::InvalidRequest(format!("Invalid header name '{name}': {e}"))
        })?;
        self.headers.insert(header_name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    /// Build the final HeaderMap
    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

impl Default for HttpHeaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default authorization headers for a token: `Authorization: Bearer <token>`.
pub fn bearer_headers(token: &Token) -> Result<HeaderMap> {
    Ok(HttpHeaderBuilder::new()
        .with_bearer_auth(token.access_token())?
        .build())
}

/// Merge `overrides` into `base`.
///
/// Every header name present in `overrides` replaces all values `base` had for
/// it; other `base` headers are kept.
pub fn merge_headers(mut base: HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    for name in overrides.keys() {
        base.remove(name);
    }
    for (name, value) in overrides {
        base.append(name.clone(), value.clone());
    }
    base
}
