//! Polygon balance queries over an ethers provider

use crate::error::{BotError, Result};
use ethers::contract::abigen;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Bridged USDC.e
pub const USDC_BRIDGED: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";
/// Native USDC
pub const USDC_NATIVE: &str = "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359";

const USDC_DECIMALS: u32 = 6;
const MATIC_DECIMALS: u32 = 18;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

abigen!(
    Erc20,
    r#"[
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

#[derive(Clone)]
pub struct ChainClient {
    provider: Arc<Provider<Http>>,
}

/// On-chain holdings of one address
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainBalances {
    #[serde(with = "rust_decimal::serde::float")]
    pub usdc: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub matic: Decimal,
}

/// Everything the wallet view shows
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReport {
    pub address: String,
    pub proxy_address: Option<String>,
    pub eoa: ChainBalances,
    pub proxy: Option<ChainBalances>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub exchange_collateral: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub positions_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_usdc: Decimal,
}

impl WalletReport {
    /// Total spendable plus marked positions
    pub fn compute_total(&mut self) {
        let proxy_usdc = self.proxy.as_ref().map(|p| p.usdc).unwrap_or(Decimal::ZERO);
        self.total_usdc = self.eoa.usdc
            + proxy_usdc
            + self.exchange_collateral.unwrap_or(Decimal::ZERO)
            + self.positions_value;
    }
}

impl ChainClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| BotError::InvalidInput(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    /// ERC-20 balance in whole tokens
    pub async fn token_balance(&self, token: &str, owner: &str, decimals: u32) -> Result<Decimal> {
        let contract = Erc20::new(parse_address(token)?, self.provider.clone());
        let owner = parse_address(owner)?;

        let units = with_timeout("balanceOf", contract.balance_of(owner).call())
            .await?
            .map_err(|e| BotError::Api(format!("balanceOf failed: {}", e)))?;
        units_to_decimal(units, decimals)
    }

    /// Native MATIC balance
    pub async fn matic_balance(&self, owner: &str) -> Result<Decimal> {
        let owner = parse_address(owner)?;
        let wei = with_timeout("eth_getBalance", self.provider.get_balance(owner, None))
            .await?
            .map_err(|e| BotError::Api(format!("eth_getBalance failed: {}", e)))?;
        units_to_decimal(wei, MATIC_DECIMALS)
    }

    /// Both USDC contracts summed, plus MATIC. A failing leg counts as zero.
    pub async fn balances(&self, owner: &str) -> ChainBalances {
        let (bridged, native, matic) = tokio::join!(
            self.token_balance(USDC_BRIDGED, owner, USDC_DECIMALS),
            self.token_balance(USDC_NATIVE, owner, USDC_DECIMALS),
            self.matic_balance(owner),
        );

        let mut usdc = Decimal::ZERO;
        for (token, balance) in [(USDC_BRIDGED, bridged), (USDC_NATIVE, native)] {
            match balance {
                Ok(b) => usdc += b,
                Err(e) => debug!("balanceOf {} on {} failed: {}", owner, token, e),
            }
        }

        let matic = matic.unwrap_or_else(|e| {
            debug!("MATIC balance of {} failed: {}", owner, e);
            Decimal::ZERO
        });

        ChainBalances { usdc, matic }
    }
}

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address.trim())
        .map_err(|_| BotError::InvalidInput(format!("Invalid address: {}", address)))
}

async fn with_timeout<F: Future>(call: &str, fut: F) -> Result<F::Output> {
    tokio::time::timeout(RPC_TIMEOUT, fut)
        .await
        .map_err(|_| BotError::Api(format!("{} timed out", call)))
}

/// Base units scaled down by `decimals`
fn units_to_decimal(units: U256, decimals: u32) -> Result<Decimal> {
    let formatted = format_units(units, decimals)
        .map_err(|e| BotError::Api(format!("Invalid token amount {}: {}", units, e)))?;
    Decimal::from_str(&formatted)
        .map(|d| d.normalize())
        .map_err(|e| BotError::Api(format!("Amount out of range {}: {}", formatted, e)))
}
