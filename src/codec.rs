// src/codec.rs
//! `paymasterAndData` layouts. The contract tells them apart by total
//! length only, so this module does the same.
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::PaymasterError;
use crate::signed::{SignedPricePayload, SIGNED_PAYLOAD_LEN};

pub const ADDRESS_LEN: usize = 20;
pub const WORD_LEN: usize = 32;

const NO_REFUND_FLAG: u8 = 0x00;

/// address
pub const CACHED_LEN: usize = ADDRESS_LEN;
/// address ++ no-refund byte
pub const CACHED_NO_REFUND_LEN: usize = ADDRESS_LEN + 1;
/// address ++ price override
pub const CACHED_OVERRIDE_LEN: usize = ADDRESS_LEN + WORD_LEN;
/// address ++ price override ++ no-refund byte
pub const CACHED_OVERRIDE_NO_REFUND_LEN: usize = ADDRESS_LEN + WORD_LEN + 1;

/// Payload for a paymaster that prices with its own cached oracle price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPricePayload {
    pub paymaster: Address,
    pub price_override: Option<U256>,
    pub suppress_refund: bool,
}

impl CachedPricePayload {
    pub fn new(paymaster: Address) -> Self {
        Self {
            paymaster,
            price_override: None,
            suppress_refund: false,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut data = Vec::with_capacity(CACHED_OVERRIDE_NO_REFUND_LEN);
        data.extend_from_slice(self.paymaster.as_bytes());

        if let Some(price) = self.price_override {
            let mut word = [0u8; WORD_LEN];
            price.to_big_endian(&mut word);
            data.extend_from_slice(&word);
        }
        if self.suppress_refund {
            data.push(NO_REFUND_FLAG);
        }

        Bytes::from(data)
    }

    /// A 21 byte payload is always address plus no-refund flag, never a
    /// one byte override. The flag byte's value is not inspected.
    pub fn decode(data: &[u8]) -> Result<Self, PaymasterError> {
        let (price_override, suppress_refund) = match data.len() {
            CACHED_LEN => (None, false),
            CACHED_NO_REFUND_LEN => (None, true),
            CACHED_OVERRIDE_LEN => (Some(read_word(&data[ADDRESS_LEN..])), false),
            CACHED_OVERRIDE_NO_REFUND_LEN => (Some(read_word(&data[ADDRESS_LEN..])), true),
            len => {
                return Err(PaymasterError::malformed(format!(
                    "cached price payload must be 20, 21, 52 or 53 bytes, got {len}"
                )))
            }
        };

        Ok(Self {
            paymaster: read_address(data),
            price_override,
            suppress_refund,
        })
    }
}

/// Any payload the paymaster contract accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymasterPayload {
    Cached(CachedPricePayload),
    Signed(SignedPricePayload),
}

impl PaymasterPayload {
    pub fn paymaster(&self) -> Address {
        match self {
            Self::Cached(payload) => payload.paymaster,
            Self::Signed(payload) => payload.paymaster,
        }
    }

    pub fn encode(&self) -> Result<Bytes, PaymasterError> {
        match self {
            Self::Cached(payload) => Ok(payload.encode()),
            Self::Signed(payload) => payload.encode(),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, PaymasterError> {
        match data.len() {
            SIGNED_PAYLOAD_LEN => SignedPricePayload::decode(data).map(Self::Signed),
            _ => CachedPricePayload::decode(data).map(Self::Cached),
        }
    }
}

/// Reads the leading paymaster address; callers check the length first.
pub(crate) fn read_address(data: &[u8]) -> Address {
    Address::from_slice(&data[..ADDRESS_LEN])
}

pub(crate) fn read_word(data: &[u8]) -> U256 {
    U256::from_big_endian(&data[..WORD_LEN])
}
