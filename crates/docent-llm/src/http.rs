//! Shared HTTP client construction for consistent timeout configuration.

use std::time::Duration;

/// Create the HTTP client used by the remote providers.
///
/// Config: 30s connect timeout, caller-provided request timeout,
/// `docent/{version}` user-agent, redirect limit 10.
#[must_use]
pub fn default_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(timeout)
        .user_agent(concat!("docent/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
