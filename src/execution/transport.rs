//! Delivery paths for signed orders
//!
//! Each transport carries the same signed payload to the exchange by a
//! different network route. Any non-2xx answer or network error is a failure.

use super::SignedOrder;
use crate::config::ExecutionConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// One way of getting a signed order to the exchange
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver the order and return the exchange's JSON answer
    async fn send(&self, order: &SignedOrder) -> Result<Value>;
}

fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// Read a response, failing on non-2xx or an explicit `success: false`
async fn read_answer(name: &str, resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));

    if !status.is_success() {
        let reason = body
            .get("errorMsg")
            .or_else(|| body.get("error"))
            .or_else(|| body.get("message"))
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| text.chars().take(200).collect());
        return Err(BotError::Api(format!("{} returned {}: {}", name, status, reason)));
    }

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = body
            .get("errorMsg")
            .or_else(|| body.pointer("/data/errorMsg"))
            .and_then(Value::as_str)
            .unwrap_or("rejected");
        return Err(BotError::Execution(format!("{}: {}", name, reason)));
    }

    Ok(body)
}

fn header_map(order: &SignedOrder) -> Value {
    let map: serde_json::Map<String, Value> = order
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

/// POST straight to the exchange
pub struct DirectClob {
    http: Client,
    clob_url: String,
}

impl DirectClob {
    pub fn new(clob_url: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            clob_url: clob_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for DirectClob {
    fn name(&self) -> &str {
        "direct"
    }

    async fn send(&self, order: &SignedOrder) -> Result<Value> {
        let mut req = self
            .http
            .post(format!("{}/order", self.clob_url))
            .header("Content-Type", "application/json")
            .body(order.body.clone());
        for (name, value) in &order.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        read_answer(self.name(), req.send().await?).await
    }
}

/// Relay that forwards `{order, headers}` to the exchange
pub struct OrderRelay {
    http: Client,
    url: String,
    secret: Option<String>,
}

impl OrderRelay {
    pub fn new(url: &str, secret: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            url: url.trim_end_matches('/').to_string(),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl Transport for OrderRelay {
    fn name(&self) -> &str {
        "relay"
    }

    async fn send(&self, order: &SignedOrder) -> Result<Value> {
        let payload = json!({
            "order": order.payload,
            "headers": header_map(order),
        });

        let mut req = self.http.post(format!("{}/order", self.url)).json(&payload);
        if let Some(secret) = &self.secret {
            req = req.header("x-relay-secret", secret);
        }

        read_answer(self.name(), req.send().await?).await
    }
}

/// Proxy that forwards `{signedOrder, headers}` to the exchange
pub struct SubmitProxy {
    http: Client,
    url: String,
}

impl SubmitProxy {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for SubmitProxy {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn send(&self, order: &SignedOrder) -> Result<Value> {
        let payload = json!({
            "signedOrder": order.payload,
            "headers": header_map(order),
        });

        let resp = self
            .http
            .post(format!("{}/submit-order", self.url))
            .json(&payload)
            .send()
            .await?;

        read_answer(self.name(), resp).await
    }
}

/// Build the fallback chain in configured order. Paths without a URL are skipped.
pub fn transports_from_config(
    config: &ExecutionConfig,
    clob_url: &str,
) -> Result<Vec<Arc<dyn Transport>>> {
    let mut chain: Vec<Arc<dyn Transport>> = Vec::new();

    for name in &config.transports {
        match name.to_lowercase().as_str() {
            "direct" => chain.push(Arc::new(DirectClob::new(clob_url)?)),
            "relay" => match &config.relay_url {
                Some(url) => {
                    chain.push(Arc::new(OrderRelay::new(url, config.relay_secret.clone())?))
                }
                None => warn!("Transport 'relay' listed but execution.relay_url is not set"),
            },
            "proxy" => match &config.proxy_url {
                Some(url) => chain.push(Arc::new(SubmitProxy::new(url)?)),
                None => warn!("Transport 'proxy' listed but execution.proxy_url is not set"),
            },
            other => warn!("Unknown transport {:?} ignored", other),
        }
    }

    Ok(chain)
}
