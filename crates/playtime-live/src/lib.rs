//! HTTP live-presence gate
//!
//! Asks a configured endpoint whether an external handle is broadcasting.
//! The check URL is a template with a `{handle}` placeholder; the endpoint
//! must answer with a JSON body `{"live": true|false}`.

use async_trait::async_trait;
use playtime_config::LiveGateConfig;
use playtime_host_api::{GateError, GateResult, LiveGate};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct LiveResponse {
    live: bool,
}

/// [`LiveGate`] backed by an HTTP endpoint
pub struct HttpLiveGate {
    client: Client,
    config: LiveGateConfig,
}

impl HttpLiveGate {
    pub fn new(config: LiveGateConfig) -> GateResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| GateError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl LiveGate for HttpLiveGate {
    async fn is_live_now(&self, external_handle: Option<&str>) -> GateResult<bool> {
        let Some(handle) = external_handle else {
            debug!("No external handle linked; not live");
            return Ok(false);
        };

        let url = self
            .config
            .url_for(&urlencoding::encode(handle))
            .ok_or(GateError::NotConfigured)?;

        debug!(url = %url, "Checking live status");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                GateError::Timeout
            } else {
                GateError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "Live check rejected");
            return Err(GateError::Status(status.as_u16()));
        }

        let body: LiveResponse = response
            .json()
            .await
            .map_err(|e| GateError::Decode(e.to_string()))?;

        debug!(url = %url, live = body.live, "Live check complete");
        Ok(body.live)
    }

    fn is_configured(&self) -> bool {
        self.config.check_url.is_some()
    }
}
