// src/lib.rs
//! Token-denominated gas sponsorship for ERC-4337 paymasters: worst-case
//! fee conversion and the `paymasterAndData` layouts the paymaster
//! contracts parse.
pub mod codec;
pub mod config;
pub mod error;
pub mod fee;
pub mod fixed_point;
pub mod paymaster;
pub mod price;
pub mod signed;
pub mod types;

pub use crate::codec::{CachedPricePayload, PaymasterPayload};
pub use crate::error::PaymasterError;
pub use crate::fee::{check_approval, estimate_token_cost};
pub use crate::paymaster::Paymaster;
pub use crate::price::{build_signed_price_quote, PriceSource};
pub use crate::signed::{encode_signed_payload, verify_signed_quote, PriceProtocol, SignedPricePayload};
pub use crate::types::{OperationGasParams, PriceQuote, QuoteKind, SignedPriceQuote, UserOperation};
