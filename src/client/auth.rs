//! Authentication and signing for Polymarket API
//!
//! Level 1: EIP-712 typed data signed by the wallet (API key derivation, orders).
//! Level 2: HMAC-SHA256 over `timestamp + method + path + body` with the API secret.

use crate::error::{BotError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use hmac::{Hmac, Mac};
use sha2::Sha256;

// EIP-712 domain constants for CLOB auth
const CLOB_DOMAIN_NAME: &str = "ClobAuthDomain";
const CLOB_VERSION: &str = "1";
const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

/// CTF exchange contract on Polygon
const EXCHANGE_ADDRESS: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// Signer for Polymarket API authentication
#[derive(Clone)]
pub struct PolySigner {
    wallet: LocalWallet,
    chain_id: u64,
}

impl PolySigner {
    /// Create a new signer from a private key (hex string, with or without 0x prefix)
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let key_hex = private_key.trim().trim_start_matches("0x");
        let wallet: LocalWallet = key_hex
            .parse()
            .map_err(|e| BotError::Auth(format!("Invalid private key: {}", e)))?;

        let wallet = wallet.with_chain_id(chain_id);

        Ok(Self { wallet, chain_id })
    }

    /// Get the signer's address
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Checksummed address, as the CLOB expects in `POLY_ADDRESS`
    pub fn address_checksum(&self) -> String {
        ethers::utils::to_checksum(&self.wallet.address(), None)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sign_digest(&self, hash: H256) -> Result<String> {
        let signature = self
            .wallet
            .sign_hash(hash)
            .map_err(|e| BotError::Auth(format!("Signing failed: {}", e)))?;

        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }

    /// Sign EIP-712 ClobAuth message for Level 1 authentication
    pub fn sign_clob_auth(&self, timestamp: i64, nonce: u64) -> Result<String> {
        let domain_type_hash =
            keccak256(b"EIP712Domain(string name,string version,uint256 chainId)");

        let mut domain_data = Vec::with_capacity(128);
        domain_data.extend_from_slice(&domain_type_hash);
        domain_data.extend_from_slice(&keccak256(CLOB_DOMAIN_NAME.as_bytes()));
        domain_data.extend_from_slice(&keccak256(CLOB_VERSION.as_bytes()));
        domain_data.extend_from_slice(&u256_to_bytes32(U256::from(self.chain_id)));
        let domain_separator = keccak256(&domain_data);

        let struct_type_hash = keccak256(
            b"ClobAuth(address address,string timestamp,uint256 nonce,string message)",
        );

        let mut struct_data = Vec::with_capacity(160);
        struct_data.extend_from_slice(&struct_type_hash);
        struct_data.extend_from_slice(&address_to_bytes32(self.wallet.address()));
        struct_data.extend_from_slice(&keccak256(timestamp.to_string().as_bytes()));
        struct_data.extend_from_slice(&u256_to_bytes32(U256::from(nonce)));
        struct_data.extend_from_slice(&keccak256(CLOB_AUTH_MESSAGE.as_bytes()));
        let struct_hash = keccak256(&struct_data);

        self.sign_digest(typed_digest(&domain_separator, &struct_hash))
    }

    /// Level 1 headers for `/auth/*` key endpoints
    pub fn l1_headers(&self, timestamp: i64, nonce: u64) -> Result<Vec<(String, String)>> {
        let signature = self.sign_clob_auth(timestamp, nonce)?;
        Ok(vec![
            ("POLY_ADDRESS".to_string(), self.address_checksum()),
            ("POLY_SIGNATURE".to_string(), signature),
            ("POLY_TIMESTAMP".to_string(), timestamp.to_string()),
            ("POLY_NONCE".to_string(), nonce.to_string()),
        ])
    }

    /// Sign an order for submission to CLOB
    pub fn sign_order(&self, order: &OrderSignData) -> Result<String> {
        let domain_separator = self.compute_domain_separator()?;
        let struct_hash = compute_order_struct_hash(order);
        self.sign_digest(typed_digest(&domain_separator, &struct_hash))
    }

    fn compute_domain_separator(&self) -> Result<[u8; 32]> {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let exchange: Address = EXCHANGE_ADDRESS
            .parse()
            .map_err(|e| BotError::Auth(format!("Invalid exchange address: {}", e)))?;

        let mut data = Vec::with_capacity(160);
        data.extend_from_slice(&type_hash);
        data.extend_from_slice(&keccak256(b"Polymarket CTF Exchange"));
        data.extend_from_slice(&keccak256(b"1"));
        data.extend_from_slice(&u256_to_bytes32(U256::from(self.chain_id)));
        data.extend_from_slice(&address_to_bytes32(exchange));

        Ok(keccak256(&data))
    }
}

fn compute_order_struct_hash(order: &OrderSignData) -> [u8; 32] {
    let type_hash = keccak256(
        b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
    );

    let mut data = Vec::with_capacity(416);
    data.extend_from_slice(&type_hash);
    data.extend_from_slice(&u256_to_bytes32(order.salt));
    data.extend_from_slice(&address_to_bytes32(order.maker));
    data.extend_from_slice(&address_to_bytes32(order.signer));
    data.extend_from_slice(&address_to_bytes32(order.taker));
    data.extend_from_slice(&u256_to_bytes32(order.token_id));
    data.extend_from_slice(&u256_to_bytes32(order.maker_amount));
    data.extend_from_slice(&u256_to_bytes32(order.taker_amount));
    data.extend_from_slice(&u256_to_bytes32(order.expiration));
    data.extend_from_slice(&u256_to_bytes32(order.nonce));
    data.extend_from_slice(&u256_to_bytes32(order.fee_rate_bps));
    data.extend_from_slice(&[0u8; 31]);
    data.push(order.side);
    data.extend_from_slice(&[0u8; 31]);
    data.push(order.signature_type);

    keccak256(&data)
}

/// keccak256("\x19\x01" + domain_separator + struct_hash)
fn typed_digest(domain_separator: &[u8; 32], struct_hash: &[u8; 32]) -> H256 {
    let mut digest_data = Vec::with_capacity(66);
    digest_data.extend_from_slice(&[0x19, 0x01]);
    digest_data.extend_from_slice(domain_separator);
    digest_data.extend_from_slice(struct_hash);
    H256::from(keccak256(&digest_data))
}

fn u256_to_bytes32(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

fn address_to_bytes32(addr: Address) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_bytes());
    bytes
}

/// API credentials for Level 2 CLOB authentication
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    /// base64 (standard or URL-safe)
    pub api_secret: String,
    pub api_passphrase: String,
}

impl ApiCredentials {
    /// Credentials are usable only when all three parts are present
    pub fn from_parts(
        api_key: Option<&str>,
        api_secret: Option<&str>,
        api_passphrase: Option<&str>,
    ) -> Option<Self> {
        match (api_key, api_secret, api_passphrase) {
            (Some(k), Some(s), Some(p)) if !k.is_empty() && !s.is_empty() && !p.is_empty() => {
                Some(Self {
                    api_key: k.to_string(),
                    api_secret: s.to_string(),
                    api_passphrase: p.to_string(),
                })
            }
            _ => None,
        }
    }

    /// HMAC-SHA256 signature of the request, base64 encoded
    pub fn sign_request(
        &self,
        timestamp: i64,
        method: &str,
        request_path: &str,
        body: Option<&str>,
    ) -> Result<String> {
        let secret = self.api_secret.replace('-', "+").replace('_', "/");
        let key = STANDARD
            .decode(secret.as_bytes())
            .or_else(|_| URL_SAFE.decode(self.api_secret.as_bytes()))
            .map_err(|e| BotError::Auth(format!("Invalid API secret: {}", e)))?;

        let mut mac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|e| BotError::Auth(format!("Invalid HMAC key: {}", e)))?;

        mac.update(timestamp.to_string().as_bytes());
        mac.update(method.as_bytes());
        mac.update(request_path.as_bytes());
        if let Some(body) = body {
            mac.update(body.as_bytes());
        }

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Level 2 headers for an authenticated request
    pub fn l2_headers(
        &self,
        address: &str,
        timestamp: i64,
        method: &str,
        request_path: &str,
        body: Option<&str>,
    ) -> Result<Vec<(String, String)>> {
        let signature = self.sign_request(timestamp, method, request_path, body)?;
        Ok(vec![
            ("POLY_ADDRESS".to_string(), address.to_string()),
            ("POLY_SIGNATURE".to_string(), signature),
            ("POLY_TIMESTAMP".to_string(), timestamp.to_string()),
            ("POLY_API_KEY".to_string(), self.api_key.clone()),
            ("POLY_PASSPHRASE".to_string(), self.api_passphrase.clone()),
        ])
    }
}

/// Order data for signing
#[derive(Debug, Clone)]
pub struct OrderSignData {
    pub salt: U256,
    pub maker: Address,
    pub signer: Address,
    pub taker: Address,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    pub expiration: U256,
    pub nonce: U256,
    pub fee_rate_bps: U256,
    pub side: u8,
    pub signature_type: u8,
}
