//! Serving URL detection in dev server output

use std::sync::LazyLock;

use regex::Regex;

/// Matches `http(s)://localhost:<port>` or `http(s)://127.0.0.1:<port>`
static SERVER_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:localhost|127\.0\.0\.1):\d+").expect("valid server URL regex")
});

/// Marker Flutter prints on the line that announces the web server
pub const SERVED_AT_MARKER: &str = "is being served at";

/// Extract the serving URL from a line of dev server output.
///
/// Only scheme, host and port are returned; any trailing path is dropped.
/// Matching is case-insensitive and the returned text keeps the casing of
/// the input line.
pub fn extract_server_url(line: &str) -> Option<String> {
    SERVER_URL_RE.find(line).map(|m| m.as_str().to_string())
}

/// Check whether a line looks like a URL announcement
///
/// Used to flag announcement lines the URL pattern failed to match.
pub fn looks_like_url_announcement(line: &str) -> bool {
    line.contains(SERVED_AT_MARKER)
}
