//! Order submission
//!
//! [`OrderSubmitter::submit`] is the single entry point: validate, reprice
//! from the live midpoint, sign locally, then hand the signed order to each
//! configured transport in turn until one of them lands it.

pub mod transport;

pub use transport::{transports_from_config, DirectClob, OrderRelay, SubmitProxy, Transport};

use crate::client::auth::{ApiCredentials, OrderSignData, PolySigner};
use crate::client::ClobClient;
use crate::error::Result;
use crate::types::Side;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Minimum price increment
pub const TICK: Decimal = dec!(0.01);

/// 6-decimal base units for both USDC and outcome shares
const BASE_UNITS: Decimal = dec!(1000000);

/// Fill-and-kill: take what is available now, cancel the rest
const ORDER_TYPE: &str = "FAK";

/// Order as the caller describes it
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: Side,
    /// Shares
    pub size: Decimal,
    pub price: Decimal,
}

/// Accepted order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub order_id: Option<String>,
    pub status: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_price: Decimal,
    /// Transport that delivered it
    pub via: String,
    pub response: Value,
}

/// One transport's failure
#[derive(Debug, Clone, Serialize)]
pub struct TransportFailure {
    pub transport: String,
    pub error: String,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.transport, self.error)
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid order: {0}")]
    Invalid(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("No transport configured")]
    NoTransport,

    #[error("All transports failed: {}", join_failures(.0))]
    Exhausted(Vec<TransportFailure>),
}

fn join_failures(failures: &[TransportFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Live price reference used to reprice orders
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn midpoint(&self, token_id: &str) -> Result<Decimal>;
}

#[async_trait]
impl PriceSource for ClobClient {
    async fn midpoint(&self, token_id: &str) -> Result<Decimal> {
        self.get_midpoint(token_id).await
    }
}

/// Signed `POST /order` payload plus its auth headers
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub payload: Value,
    /// Exact body the HMAC covers
    pub body: String,
    pub headers: Vec<(String, String)>,
}

pub struct OrderSubmitter {
    signer: PolySigner,
    credentials: ApiCredentials,
    /// Address holding the funds; the signer's own when not set
    maker: Address,
    signature_type: u8,
    prices: Option<Arc<dyn PriceSource>>,
    transports: Vec<Arc<dyn Transport>>,
}

impl OrderSubmitter {
    pub fn new(
        signer: PolySigner,
        credentials: ApiCredentials,
        funder: Option<&str>,
        signature_type: u8,
        transports: Vec<Arc<dyn Transport>>,
    ) -> std::result::Result<Self, SubmitError> {
        let maker = match funder.filter(|f| !f.is_empty()) {
            Some(f) => f
                .parse::<Address>()
                .map_err(|e| SubmitError::Invalid(format!("funder address {}: {}", f, e)))?,
            None => signer.address(),
        };

        Ok(Self {
            signer,
            credentials,
            maker,
            signature_type,
            prices: None,
            transports,
        })
    }

    /// Reprice each order from the live midpoint before signing
    pub fn with_price_source(mut self, prices: Arc<dyn PriceSource>) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn transport_names(&self) -> Vec<String> {
        self.transports.iter().map(|t| t.name().to_string()).collect()
    }

    pub async fn submit(&self, request: OrderRequest) -> std::result::Result<Receipt, SubmitError> {
        validate(&request)?;

        if self.transports.is_empty() {
            return Err(SubmitError::NoTransport);
        }

        let mut price = request.price;
        if let Some(prices) = &self.prices {
            match prices.midpoint(&request.token_id).await {
                Ok(mid) if mid > Decimal::ZERO && mid < Decimal::ONE => {
                    debug!("Live midpoint {} (requested {})", mid, request.price);
                    price = mid;
                }
                Ok(mid) => debug!("Ignoring out-of-range midpoint {}", mid),
                Err(e) => warn!("Midpoint unavailable, keeping requested price: {}", e),
            }
        }
        let price = round_to_tick(price);

        let signed = self.sign(&request, price)?;

        info!(
            "Submitting {} {} @ {} on {}...",
            request.side,
            request.size,
            price,
            request.token_id.chars().take(20).collect::<String>()
        );

        let mut failures = Vec::new();
        for transport in &self.transports {
            match transport.send(&signed).await {
                Ok(answer) => {
                    let receipt = Receipt {
                        order_id: extract_order_id(&answer),
                        status: extract_status(&answer),
                        final_price: price,
                        via: transport.name().to_string(),
                        response: answer,
                    };
                    info!(
                        "Order accepted via {}: {:?} ({})",
                        receipt.via, receipt.order_id, receipt.status
                    );
                    return Ok(receipt);
                }
                Err(e) => {
                    warn!("Transport {} failed: {}", transport.name(), e);
                    failures.push(TransportFailure {
                        transport: transport.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(SubmitError::Exhausted(failures))
    }

    /// Build and sign the exchange order for `request` at `price`
    pub fn sign(
        &self,
        request: &OrderRequest,
        price: Decimal,
    ) -> std::result::Result<SignedOrder, SubmitError> {
        let token_id = U256::from_dec_str(request.token_id.trim())
            .map_err(|e| SubmitError::Invalid(format!("token id {}: {}", request.token_id, e)))?;

        let shares = order_shares(request.size);
        let notional = (shares * price).round_dp_with_strategy(4, RoundingStrategy::ToZero);
        let (maker_amount, taker_amount) = match request.side {
            Side::Buy => (base_units(notional)?, base_units(shares)?),
            Side::Sell => (base_units(shares)?, base_units(notional)?),
        };

        let salt: u64 = rand::rng().random_range(1..(1u64 << 53));
        let side_code: u8 = match request.side {
            Side::Buy => 0,
            Side::Sell => 1,
        };

        let data = OrderSignData {
            salt: U256::from(salt),
            maker: self.maker,
            signer: self.signer.address(),
            taker: Address::zero(),
            token_id,
            maker_amount,
            taker_amount,
            expiration: U256::zero(),
            nonce: U256::zero(),
            fee_rate_bps: U256::zero(),
            side: side_code,
            signature_type: self.signature_type,
        };

        let signature = self
            .signer
            .sign_order(&data)
            .map_err(|e| SubmitError::Signing(e.to_string()))?;

        let payload = json!({
            "order": {
                "salt": salt,
                "maker": ethers::utils::to_checksum(&data.maker, None),
                "signer": self.signer.address_checksum(),
                "taker": ethers::utils::to_checksum(&data.taker, None),
                "tokenId": request.token_id.trim(),
                "makerAmount": maker_amount.to_string(),
                "takerAmount": taker_amount.to_string(),
                "expiration": "0",
                "nonce": "0",
                "feeRateBps": "0",
                "side": request.side.as_str(),
                "signatureType": self.signature_type,
                "signature": signature,
            },
            "owner": self.credentials.api_key,
            "orderType": ORDER_TYPE,
        });

        let body = payload.to_string();
        let headers = self
            .credentials
            .l2_headers(
                &self.signer.address_checksum(),
                chrono::Utc::now().timestamp(),
                "POST",
                "/order",
                Some(&body),
            )
            .map_err(|e| SubmitError::Signing(e.to_string()))?;

        Ok(SignedOrder {
            payload,
            body,
            headers,
        })
    }
}

fn validate(request: &OrderRequest) -> std::result::Result<(), SubmitError> {
    if request.token_id.trim().is_empty() {
        return Err(SubmitError::Invalid("token id is empty".into()));
    }
    if order_shares(request.size) <= Decimal::ZERO {
        return Err(SubmitError::Invalid(format!(
            "size must be at least 0.01 shares, got {}",
            request.size
        )));
    }
    if request.price <= Decimal::ZERO || request.price >= Decimal::ONE {
        return Err(SubmitError::Invalid(format!(
            "price must be in (0, 1), got {}",
            request.price
        )));
    }
    Ok(())
}

/// Shares actually signed: the size cut to two decimals
fn order_shares(size: Decimal) -> Decimal {
    size.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Nearest tick, half away from zero, kept inside [0.01, 0.99]
pub fn round_to_tick(price: Decimal) -> Decimal {
    price
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .clamp(TICK, Decimal::ONE - TICK)
}

fn base_units(amount: Decimal) -> std::result::Result<U256, SubmitError> {
    (amount * BASE_UNITS)
        .trunc()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| SubmitError::Invalid(format!("amount out of range: {}", amount)))
}

/// `orderID | orderId | order_id`, top level or under `data`
pub fn extract_order_id(answer: &Value) -> Option<String> {
    for scope in [Some(answer), answer.get("data")].into_iter().flatten() {
        for key in ["orderID", "orderId", "order_id"] {
            if let Some(id) = scope.get(key).and_then(Value::as_str) {
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }
    None
}

fn extract_status(answer: &Value) -> String {
    [answer.get("status"), answer.pointer("/data/status")]
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .unwrap_or("submitted")
        .to_string()
}
