//! Helpers shared by the pipeline steps.
//!
//! - String shortening for log output
//! - Elapsed-time rendering for run summaries
//! - HTTP client construction with the configured timeout and proxy

use crate::config::ProxySettings;
use std::time::Duration;
use tracing::debug;

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and the count of
/// dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Render an elapsed duration as seconds with two decimals, e.g. `"1.25s"`.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

/// Build a `reqwest` client with a whole-request timeout and optional proxy.
pub fn build_http_client(
    timeout: Duration,
    proxy: Option<&ProxySettings>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

    if let Some(settings) = proxy {
        let mut proxy = reqwest::Proxy::all(settings.url())?;
        if let Some(user) = &settings.username {
            proxy = proxy.basic_auth(user, settings.password.as_deref().unwrap_or_default());
        }
        debug!(proxy = %settings.url(), "Routing requests through proxy");
        builder = builder.proxy(proxy);
    }

    builder.build()
}
