// src/error.rs
use ethers::types::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymasterError {
    #[error("No price set yet: cached price is zero")]
    StalePrice,

    #[error("Malformed paymaster payload: {0}")]
    MalformedPayload(String),

    #[error("Token allowance not enough: {allowance} < {required}")]
    InsufficientApproval { allowance: U256, required: U256 },

    #[error("Arithmetic overflow while computing {0}")]
    Overflow(&'static str),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Price signing failed: {0}")]
    Signing(String),

    #[error("Price source error: {0}")]
    PriceSource(String),

    #[error("Chain {0} is not supported")]
    UnsupportedChain(u64),

    #[error("Token {token} is not supported on chain {chain_id}")]
    UnsupportedToken { chain_id: u64, token: String },

    #[error("Invalid price signature: {0}")]
    InvalidSignature(String),

    #[error("Price quote validUntil {valid_until} is not after signedAt {signed_at}")]
    InvalidValidityWindow { signed_at: u64, valid_until: u64 },

    #[error("Price quote expired at {valid_until}, now {now}")]
    QuoteExpired { valid_until: u64, now: u64 },

    #[error("Price signed by {recovered:?}, expected {expected:?}")]
    SignerMismatch { expected: Address, recovered: Address },
}

impl PaymasterError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }
}
