//! Polymarket API clients

pub mod auth;
pub mod chain;
pub mod clob;
pub mod data;
pub mod gamma;

pub use auth::{ApiCredentials, PolySigner};
pub use chain::{ChainClient, WalletReport};
pub use clob::ClobClient;
pub use data::DataClient;
pub use gamma::GammaClient;

use crate::config::PolymarketConfig;
use crate::error::{BotError, Result};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Every outbound Polymarket client, built from one config section
#[derive(Clone)]
pub struct PolymarketClient {
    pub gamma: GammaClient,
    pub clob: ClobClient,
    pub data: DataClient,
    pub chain: ChainClient,
    pub funder: Option<String>,
}

impl PolymarketClient {
    /// Build the clients. Configured API credentials are installed right away.
    pub async fn new(config: PolymarketConfig) -> Result<Self> {
        let signer = config
            .private_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(|k| PolySigner::from_private_key(k, config.chain_id))
            .transpose()?;

        if let Some(signer) = &signer {
            info!("Signer address: {}", signer.address_checksum());
        }

        let clob = ClobClient::new(&config.clob_url, signer, config.signature_type)?;

        if let Some(creds) = ApiCredentials::from_parts(
            config.api_key.as_deref(),
            config.api_secret.as_deref(),
            config.api_passphrase.as_deref(),
        ) {
            clob.set_credentials(creds).await;
        }

        Ok(Self {
            gamma: GammaClient::new(&config.gamma_url)?,
            clob,
            data: DataClient::new(&config.data_url)?,
            chain: ChainClient::new(&config.polygon_rpc_url)?,
            funder: config.funder_address,
        })
    }

    /// Address whose positions and collateral are reported: funder, else signer
    pub fn account_address(&self) -> Option<String> {
        self.funder
            .clone()
            .or_else(|| self.clob.signer().map(|s| s.address_checksum()))
    }

    /// On-chain, exchange and position balances of the configured wallet.
    /// Each leg that fails to load counts as zero.
    pub async fn wallet_report(&self) -> Result<WalletReport> {
        let eoa = self
            .clob
            .signer()
            .map(|s| s.address_checksum())
            .or_else(|| self.funder.clone())
            .ok_or_else(|| BotError::Auth("Wallet not configured".into()))?;

        let proxy = self
            .funder
            .clone()
            .filter(|f| !f.eq_ignore_ascii_case(&eoa));
        let holder = proxy.clone().unwrap_or_else(|| eoa.clone());

        let proxy_balances = async {
            match &proxy {
                Some(p) => Some(self.chain.balances(p).await),
                None => None,
            }
        };
        let collateral = async {
            if self.clob.credentials().await.is_none() {
                return None;
            }
            match self.clob.get_collateral_balance().await {
                Ok(b) => Some(b),
                Err(e) => {
                    debug!("Collateral balance unavailable: {}", e);
                    None
                }
            }
        };

        let (eoa_balances, proxy_balances, collateral, positions) = tokio::join!(
            self.chain.balances(&eoa),
            proxy_balances,
            collateral,
            self.data.positions(&holder),
        );

        let positions_value = match positions {
            Ok(p) => data::positions_value(&p),
            Err(e) => {
                debug!("Positions unavailable for {}: {}", holder, e);
                Decimal::ZERO
            }
        };

        let mut report = WalletReport {
            address: eoa,
            proxy_address: proxy,
            eoa: eoa_balances,
            proxy: proxy_balances,
            exchange_collateral: collateral,
            positions_value,
            total_usdc: Decimal::ZERO,
        };
        report.compute_total();
        Ok(report)
    }
}
