use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NotifyError;
use crate::SmsTransport;

/// SMS gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsGatewayConfig {
    pub gateway_url: String,
    pub api_key: String,
}

/// [`SmsTransport`] over a JSON HTTP gateway with bearer-token auth.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
}

impl HttpSmsGateway {
    pub fn new(gateway_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_config(config: &SmsGatewayConfig) -> Self {
        Self::new(&config.gateway_url, &config.api_key)
    }
}

#[async_trait]
impl SmsTransport for HttpSmsGateway {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let payload = serde_json::json!({
            "to": to,
            "message": body,
        });

        let response = self
            .client
            .post(&self.gateway_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(NotifyError::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                service: "sms gateway".to_string(),
                status,
                body,
            }
            .into());
        }

        Ok(())
    }
}
