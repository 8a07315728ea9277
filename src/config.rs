//! Configuration
//!
//! Loaded from an optional TOML file, then overridden by `POLYCLAW__*`
//! environment variables (e.g. `POLYCLAW__LLM__API_KEY`). A `.env` file in the
//! working directory is read first.

use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polymarket: PolymarketConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub ideation: IdeationConfig,
}

impl Config {
    /// Load configuration from `path` (missing file is fine) and the environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = shellexpand::tilde(path).into_owned();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("POLYCLAW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketConfig {
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default = "default_polygon_rpc_url")]
    pub polygon_rpc_url: String,
    /// Wallet key, hex with or without 0x
    #[serde(default)]
    pub private_key: Option<String>,
    /// Proxy wallet holding funds, when different from the signer
    #[serde(default)]
    pub funder_address: Option<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default)]
    pub signature_type: u8,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub api_passphrase: Option<String>,
}

impl Default for PolymarketConfig {
    fn default() -> Self {
        Self {
            clob_url: default_clob_url(),
            gamma_url: default_gamma_url(),
            data_url: default_data_url(),
            polygon_rpc_url: default_polygon_rpc_url(),
            private_key: None,
            funder_address: None,
            chain_id: default_chain_id(),
            signature_type: 0,
            api_key: None,
            api_secret: None,
            api_passphrase: None,
        }
    }
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_data_url() -> String {
    "https://data-api.polymarket.com".to_string()
}

fn default_polygon_rpc_url() -> String {
    "https://polygon-rpc.com".to_string()
}

fn default_chain_id() -> u64 {
    137
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// anthropic, deepseek, openai or ollama
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "data/polyclaw.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Delivery paths in the order they are tried: direct, relay, proxy
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default)]
    pub relay_secret: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            transports: default_transports(),
            relay_url: None,
            relay_secret: None,
            proxy_url: None,
        }
    }
}

fn default_transports() -> Vec<String> {
    vec!["relay".to_string(), "proxy".to_string(), "direct".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeationConfig {
    #[serde(default = "default_binance_url")]
    pub binance_url: String,
    /// Markets below this liquidity are left out of the snapshot
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Decimal,
    #[serde(default = "default_market_limit")]
    pub market_limit: usize,
    #[serde(default = "default_bankroll")]
    pub default_bankroll: Decimal,
}

impl Default for IdeationConfig {
    fn default() -> Self {
        Self {
            binance_url: default_binance_url(),
            min_liquidity: default_min_liquidity(),
            market_limit: default_market_limit(),
            default_bankroll: default_bankroll(),
        }
    }
}

fn default_binance_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_min_liquidity() -> Decimal {
    dec!(15000)
}

fn default_market_limit() -> usize {
    15
}

fn default_bankroll() -> Decimal {
    dec!(100)
}
