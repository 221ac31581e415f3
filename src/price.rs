// src/price.rs
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ethers::signers::Signer;
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::error::PaymasterError;
use crate::signed::{check_field_widths, PaymasterPrice, PriceProtocol};
use crate::types::SignedPriceQuote;

/// Quote lifetime used by the short-lived signed price deployments.
pub const SHORT_QUOTE_VALIDITY: u64 = 5 * 60;

/// Quote lifetime used by the long-lived signed price deployments.
pub const LONG_QUOTE_VALIDITY: u64 = 60 * 60 * 24 * 30;

/// Supplies the current token price in the 1e18 scale the paymaster
/// contract expects.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn latest_price(&self) -> Result<U256, PaymasterError>;
}

/// Fixed price, e.g. an operator-set emergency price.
#[derive(Debug, Clone, Copy)]
pub struct StaticPriceSource {
    price: U256,
}

impl StaticPriceSource {
    pub fn new(price: U256) -> Self {
        Self { price }
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn latest_price(&self) -> Result<U256, PaymasterError> {
        Ok(self.price)
    }
}

pub(crate) fn unix_now() -> Result<u64, PaymasterError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| PaymasterError::InvalidParameters(e.to_string()))?
        .as_secs())
}

/// Reads the current price and has `signer` attest it for
/// `valid_period` seconds starting now.
pub async fn build_signed_price_quote<P, S>(
    source: &P,
    signer: &S,
    protocol: &PriceProtocol,
    paymaster: Address,
    chain_id: u64,
    valid_period: u64,
) -> Result<SignedPriceQuote, PaymasterError>
where
    P: PriceSource + ?Sized,
    S: Signer,
{
    let price = source.latest_price().await?;
    sign_price_quote(signer, protocol, paymaster, chain_id, price, unix_now()?, valid_period).await
}

pub async fn sign_price_quote<S: Signer>(
    signer: &S,
    protocol: &PriceProtocol,
    paymaster: Address,
    chain_id: u64,
    price: U256,
    signed_at: u64,
    valid_period: u64,
) -> Result<SignedPriceQuote, PaymasterError> {
    // 1. Reject prices and windows the contract would refuse
    if price.is_zero() {
        return Err(PaymasterError::StalePrice);
    }
    if valid_period == 0 {
        return Err(PaymasterError::InvalidParameters(
            "quote validity period must be positive".to_string(),
        ));
    }
    let valid_until = signed_at
        .checked_add(valid_period)
        .ok_or(PaymasterError::Overflow("quote expiry"))?;
    check_field_widths(price, signed_at, valid_until)?;

    // 2. Sign the typed-data message under the protocol's domain
    let message = PaymasterPrice::new(protocol, paymaster, chain_id, price, signed_at, valid_until);
    debug!(
        "Signing price {} for paymaster {:?} on chain {}",
        price, paymaster, chain_id
    );
    let signature = signer
        .sign_typed_data(&message)
        .await
        .map_err(|e| PaymasterError::Signing(e.to_string()))?;

    info!(
        "Signed price quote for {:?}, valid until {}",
        paymaster, valid_until
    );

    Ok(SignedPriceQuote {
        paymaster_address: paymaster,
        chain_id,
        price,
        signed_at,
        valid_until,
        signature: Bytes::from(signature.to_vec()),
    })
}
