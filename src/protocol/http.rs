use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ProtocolClient, SendReceipt};
use crate::config::Config;

#[derive(Serialize)]
struct SendRequest<'a> {
    recipient: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    success: bool,
    #[serde(default)]
    message: String,
}

/// Protocol client living in a sidecar bridge process, reached over its local
/// REST endpoint.
pub struct HttpBridgeClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBridgeClient {
    pub fn new(config: &Config) -> Self {
        Self::with_endpoint(&config.bridge_url, config.bridge_api_token.clone())
    }

    pub fn with_endpoint(base_url: &str, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn send_url(&self) -> String {
        format!("{}/api/send", self.base_url)
    }
}

#[async_trait]
impl ProtocolClient for HttpBridgeClient {
    async fn send_text(&self, destination: &str, body: &str) -> anyhow::Result<SendReceipt> {
        debug!("Bridge client: POST {} for {}", self.send_url(), destination);
        let mut request = self.http.post(self.send_url()).json(&SendRequest {
            recipient: destination,
            message: body,
        });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<SendResponse>(&text) {
            Ok(parsed) => Ok(SendReceipt {
                ok: parsed.success && status.is_success(),
                detail: if parsed.message.is_empty() {
                    status.to_string()
                } else {
                    parsed.message
                },
            }),
            Err(_) if !status.is_success() => Ok(SendReceipt {
                ok: false,
                detail: format!("bridge returned {}: {}", status, text.trim()),
            }),
            Err(e) => Err(anyhow::anyhow!("unreadable bridge response: {}", e)),
        }
    }
}
