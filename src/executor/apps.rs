use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use tracing::trace;

/// Sends app-control requests to the device's app manager.
pub trait AppLauncher: Send + Sync {
    /// POST to `url` with an empty-ish body. Errors are reported to the caller.
    fn post(&self, url: &Url) -> Result<()>;
}

/// Builds the app-manager URL for `action` (`launch` or `close`) on `app_id`.
pub fn app_action_url(endpoint: &str, action: &str, app_id: &str) -> Result<Url> {
    let base = format!("{}/as/apps/action/{action}", endpoint.trim_end_matches('/'));
    Url::parse_with_params(&base, &[("appId", app_id)])
        .with_context(|| format!("Invalid app endpoint URL {base}"))
}

/// `AppLauncher` over HTTP.
///
/// Uses the blocking client, so it must be created and used off the async runtime
/// (the engine runs inside `spawn_blocking`).
pub struct HttpLauncher {
    client: Client,
}

impl HttpLauncher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl AppLauncher for HttpLauncher {
    fn post(&self, url: &Url) -> Result<()> {
        trace!(target: "otto::runtime", %url, "POST");
        self.client
            .post(url.clone())
            .body(" ")
            .send()
            .with_context(|| format!("HTTP request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("HTTP request to {url} was rejected"))?;
        Ok(())
    }
}
