//! LLM-backed oracle: market snapshot, completion call, report parsing

use super::{parse_report, CycleReport, IdeationOracle, IdeationRequest};
use crate::client::GammaClient;
use crate::config::{IdeationConfig, LlmConfig};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SYSTEM_MESSAGE: &str = "You are a quantitative trading simulation engine. You MUST respond with valid JSON only. No markdown, no explanation, just pure JSON.";

/// Markets fetched before the liquidity filter
const SNAPSHOT_FETCH_LIMIT: usize = 30;

/// Completion backend
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Anthropic {
        api_key: String,
        model: String,
    },
    DeepSeek {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
        base_url: String,
    },
    /// Any OpenAI-compatible endpoint (Ollama, vLLM, ...)
    Compatible {
        api_key: Option<String>,
        model: String,
        base_url: String,
    },
}

impl LlmProvider {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let model = config.model.clone();
        let base_url = config.base_url.clone();
        let api_key = config.api_key.clone();

        match config.provider.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic {
                api_key,
                model: model.unwrap_or_else(|| "claude-opus-4-20250514".to_string()),
            }),
            "deepseek" => Ok(LlmProvider::DeepSeek {
                api_key,
                model: model.unwrap_or_else(|| "deepseek-chat".to_string()),
            }),
            "openai" | "gpt" => Ok(LlmProvider::OpenAI {
                api_key,
                model: model.unwrap_or_else(|| "gpt-4o".to_string()),
                base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            }),
            "ollama" => Ok(LlmProvider::Compatible {
                api_key: Some(api_key).filter(|k| !k.is_empty()),
                model: model.unwrap_or_else(|| "llama3".to_string()),
                base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            }),
            "compatible" | "custom" => Ok(LlmProvider::Compatible {
                api_key: Some(api_key).filter(|k| !k.is_empty()),
                model: model.ok_or_else(|| {
                    BotError::InvalidInput("llm.model is required for custom providers".into())
                })?,
                base_url: base_url.ok_or_else(|| {
                    BotError::InvalidInput("llm.base_url is required for custom providers".into())
                })?,
            }),
            other => Err(BotError::InvalidInput(format!(
                "Unknown LLM provider: {}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic { .. } => "anthropic",
            LlmProvider::DeepSeek { .. } => "deepseek",
            LlmProvider::OpenAI { .. } => "openai",
            LlmProvider::Compatible { .. } => "compatible",
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct BinanceTicker {
    #[serde(rename = "lastPrice")]
    last_price: String,
    volume: String,
    #[serde(rename = "highPrice")]
    high_price: String,
    #[serde(rename = "lowPrice")]
    low_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

/// Oracle backed by an LLM completion API
pub struct LlmOracle {
    http: Client,
    provider: LlmProvider,
    max_tokens: u32,
    gamma: GammaClient,
    settings: IdeationConfig,
}

impl LlmOracle {
    pub fn new(
        provider: LlmProvider,
        max_tokens: u32,
        gamma: GammaClient,
        settings: IdeationConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            provider,
            max_tokens,
            gamma,
            settings,
        })
    }

    pub fn from_config(
        config: &LlmConfig,
        gamma: GammaClient,
        settings: IdeationConfig,
    ) -> Result<Self> {
        Self::new(LlmProvider::from_config(config)?, config.max_tokens, gamma, settings)
    }

    /// Highest-liquidity open markets, one line each
    async fn market_snapshot(&self) -> String {
        match self.gamma.get_top_markets(SNAPSHOT_FETCH_LIMIT).await {
            Ok(markets) => {
                let lines: Vec<String> = markets
                    .iter()
                    .filter(|m| m.liquidity > self.settings.min_liquidity)
                    .take(self.settings.market_limit)
                    .map(|m| {
                        let prices: Vec<String> = m
                            .outcomes
                            .iter()
                            .map(|o| o.price.map(|p| p.to_string()).unwrap_or_else(|| "?".into()))
                            .collect();
                        format!(
                            "{} | price: [{}] | vol: ${} | liq: ${}",
                            m.question,
                            prices.join(", "),
                            m.volume.round(),
                            m.liquidity.round()
                        )
                    })
                    .collect();

                if lines.is_empty() {
                    "POLYMARKET LIVE:\nNo high-liquidity markets found.".to_string()
                } else {
                    format!("POLYMARKET LIVE:\n{}", lines.join("\n"))
                }
            }
            Err(e) => {
                debug!("Market snapshot failed: {}", e);
                "POLYMARKET: fetch error".to_string()
            }
        }
    }

    async fn btc_ticker(&self) -> String {
        let url = format!(
            "{}/api/v3/ticker/24hr",
            self.settings.binance_url.trim_end_matches('/')
        );

        let ticker = async {
            let resp = self
                .http
                .get(&url)
                .query(&[("symbol", "BTCUSDT")])
                .send()
                .await?
                .error_for_status()?;
            resp.json::<BinanceTicker>().await
        };

        match ticker.await {
            Ok(t) => format!(
                "BINANCE BTC/USDT: price={} vol24h={} high={} low={} change={}%",
                t.last_price, t.volume, t.high_price, t.low_price, t.price_change_percent
            ),
            Err(e) => {
                debug!("Binance ticker failed: {}", e);
                "BINANCE: fetch error".to_string()
            }
        }
    }

    async fn complete(&self, user_message: &str) -> Result<String> {
        match &self.provider {
            LlmProvider::Anthropic { api_key, model } => {
                let body = AnthropicRequest {
                    model,
                    max_tokens: self.max_tokens,
                    system: SYSTEM_MESSAGE,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: user_message,
                    }],
                };

                let resp = self
                    .http
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
                    .send()
                    .await?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(BotError::Api(format!("LLM API error {}: {}", status, text)));
                }

                let parsed: AnthropicResponse = resp.json().await?;
                Ok(parsed
                    .content
                    .into_iter()
                    .next()
                    .map(|c| c.text)
                    .unwrap_or_else(|| "{}".to_string()))
            }
            LlmProvider::DeepSeek { api_key, model } => {
                self.chat_completion("https://api.deepseek.com", Some(api_key), model, user_message)
                    .await
            }
            LlmProvider::OpenAI {
                api_key,
                model,
                base_url,
            } => {
                self.chat_completion(base_url, Some(api_key), model, user_message)
                    .await
            }
            LlmProvider::Compatible {
                api_key,
                model,
                base_url,
            } => {
                self.chat_completion(base_url, api_key.as_ref(), model, user_message)
                    .await
            }
        }
    }

    async fn chat_completion(
        &self,
        base_url: &str,
        api_key: Option<&String>,
        model: &str,
        user_message: &str,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BotError::Api(format!("LLM API error {}: {}", status, text)));
        }

        let parsed: ChatResponse = resp.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string()))
    }
}

/// `Cycle N. Bankroll: B.` header, live data, then the operator prompt
pub(crate) fn build_user_message(
    request: &IdeationRequest,
    market_data: &str,
    ticker: &str,
) -> String {
    let bankroll = request
        .bankroll
        .to_f64()
        .map(|b| b.to_string())
        .unwrap_or_else(|| request.bankroll.to_string());

    format!(
        "Cycle {}. Bankroll: {}.\n\nLIVE DATA:\n{}\n{}\n\n{}",
        request.cycle, bankroll, market_data, ticker, request.system_prompt
    )
}

#[async_trait]
impl IdeationOracle for LlmOracle {
    async fn ideate(&self, request: &IdeationRequest) -> Result<CycleReport> {
        let (market_data, ticker) = tokio::join!(self.market_snapshot(), self.btc_ticker());
        let message = build_user_message(request, &market_data, &ticker);

        info!(
            "Cycle {}: asking {} for ideas (bankroll {})",
            request.cycle,
            self.provider.name(),
            request.bankroll
        );

        let text = self.complete(&message).await?;
        let report = parse_report(&text, request.cycle, request.bankroll);

        info!("Cycle {}: {} hypos", report.cycle, report.hypos.len());
        Ok(report)
    }
}
