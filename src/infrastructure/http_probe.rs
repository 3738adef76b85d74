use crate::config::HttpProbeConfig;
use crate::domain::payment::PaymentMethod;
use crate::domain::ports::{Probe, ProbePage};
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

/// Probe talking to the payment pages and the Snap transaction endpoint over HTTPS.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    snap_base_url: String,
}

impl HttpProbe {
    pub fn new(config: &HttpProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            snap_base_url: config.snap_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn pay_endpoint(&self, token: &str) -> String {
        format!("{}/snap/v1/transactions/{}/pay", self.snap_base_url, token)
    }

    async fn charge(&self, token: &str, payment_type: &str) -> Result<Option<Value>> {
        let url = self.pay_endpoint(token);
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .header("Referer", format!("{}/snap/v4/redirection/{}", self.snap_base_url, token))
            .json(&json!({ "payment_type": payment_type }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            // 404 is normal for tokens issued only for redirection.
            debug!(status = status.as_u16(), payment_type, "http_probe: no transaction payload");
            return Ok(None);
        }
        Ok(Some(response.json::<Value>().await?))
    }

    /// Fetches the BCA virtual account number for a Snap token, if one was issued.
    pub async fn virtual_account(&self, token: &str) -> Result<Option<String>> {
        let Some(payload) = self.charge(token, "bca_va").await? else {
            return Ok(None);
        };
        Ok(payload
            .get("va_numbers")
            .and_then(Value::as_array)
            .and_then(|numbers| numbers.first())
            .and_then(|entry| entry.get("va_number"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn fetch_text(&self, url: &str) -> Result<ProbePage> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url = %url, status, bytes = body.len(), "http_probe: fetched page");
        Ok(ProbePage { status, body })
    }

    async fn fetch_structured(&self, token: &str, method: &PaymentMethod) -> Result<Option<Value>> {
        if token.is_empty() {
            return Err(ReconError::ProbeError("empty token".to_string()));
        }
        self.charge(token, method.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_endpoint_strips_trailing_slash() {
        let probe = HttpProbe::new(&HttpProbeConfig {
            snap_base_url: "https://snap.example/".to_string(),
            ..HttpProbeConfig::default()
        })
        .unwrap();
        assert_eq!(
            probe.pay_endpoint("abc"),
            "https://snap.example/snap/v1/transactions/abc/pay"
        );
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let probe = HttpProbe::new(&HttpProbeConfig::default()).unwrap();
        let result = probe.fetch_structured("", &PaymentMethod::Gopay).await;
        assert!(matches!(result, Err(ReconError::ProbeError(_))));
    }
}
