//! Utility modules
//!
//! Small helpers shared by the client.

pub mod url;

pub use url::*;
