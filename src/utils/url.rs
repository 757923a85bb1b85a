//! URL helpers.

/// Join a base URL and a relative path with exactly one separating slash.
///
/// # Example
/// ```rust,ignore
/// assert_eq!(join_url("https://x/", "/y"), "https://x/y");
/// assert_eq!(join_url("https://x", "y"), "https://x/y");
/// ```
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
