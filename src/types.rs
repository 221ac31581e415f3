// src/types.rs
use ethers::types::{Address, Bytes, I256, U256};
use serde::{Deserialize, Serialize};

use crate::error::PaymasterError;

/// ERC-4337 (entry point v0.6) user operation, as submitted by wallets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// The gas fields of an operation that bound its worst-case cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationGasParams {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    pub max_fee_per_gas: U256,
}

impl OperationGasParams {
    /// Builds gas params from signed inputs, rejecting any negative field.
    pub fn try_from_signed(
        pre_verification_gas: I256,
        verification_gas_limit: I256,
        call_gas_limit: I256,
        max_fee_per_gas: I256,
    ) -> Result<Self, PaymasterError> {
        let unsigned = |name: &str, value: I256| {
            if value.is_negative() {
                Err(PaymasterError::InvalidParameters(format!(
                    "{name} cannot be negative: {value}"
                )))
            } else {
                Ok(value.into_raw())
            }
        };

        Ok(Self {
            pre_verification_gas: unsigned("preVerificationGas", pre_verification_gas)?,
            verification_gas_limit: unsigned("verificationGasLimit", verification_gas_limit)?,
            call_gas_limit: unsigned("callGasLimit", call_gas_limit)?,
            max_fee_per_gas: unsigned("maxFeePerGas", max_fee_per_gas)?,
        })
    }
}

impl From<&UserOperation> for OperationGasParams {
    fn from(op: &UserOperation) -> Self {
        Self {
            pre_verification_gas: op.pre_verification_gas,
            verification_gas_limit: op.verification_gas_limit,
            call_gas_limit: op.call_gas_limit,
            max_fee_per_gas: op.max_fee_per_gas,
        }
    }
}

/// Token price (1e18 scale) and markup (1e6 scale) used for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: U256,
    pub markup: U256,
}

/// A price attested by the paymaster's price signer, bound to one
/// paymaster contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPriceQuote {
    pub paymaster_address: Address,
    pub chain_id: u64,
    pub price: U256,
    pub signed_at: u64,
    pub valid_until: u64,
    pub signature: Bytes,
}

impl SignedPriceQuote {
    /// Pairs the attested price with the paymaster's markup.
    pub fn price_quote(&self, markup: U256) -> PriceQuote {
        PriceQuote {
            price: self.price,
            markup,
        }
    }
}

/// Where the paymaster contract takes its price from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteKind {
    /// The contract reads its own cached oracle price.
    Cached(PriceQuote),
    /// The price travels in the payload, signed off-chain.
    Signed { quote: SignedPriceQuote, markup: U256 },
}

impl QuoteKind {
    pub fn price_quote(&self) -> PriceQuote {
        match self {
            Self::Cached(quote) => *quote,
            Self::Signed { quote, markup } => quote.price_quote(*markup),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResponse {
    pub paymaster_and_data: Bytes,
    pub token_amount: U256,
}
