// src/paymaster.rs
use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info, warn};

use crate::codec::CachedPricePayload;
use crate::config::{ChainRegistry, SponsorConfig, TokenConfig, DEFAULT_ENTRY_POINT};
use crate::error::PaymasterError;
use crate::fee::{check_approval, estimate_token_cost};
use crate::price::{build_signed_price_quote, PriceSource};
use crate::signed::{encode_signed_payload, PriceProtocol};
use crate::types::{
    OperationGasParams, PaymasterResponse, PriceQuote, QuoteKind, SignedPriceQuote, UserOperation,
};

/// Client-side view of one deployed ERC-20 paymaster.
pub struct Paymaster {
    price_signer: Option<LocalWallet>,
    pub paymaster_address: Address,
    chain_id: u64,
    protocol: PriceProtocol,
    // Seconds a signed price stays valid
    quote_valid_period: u64,
    entry_point: Address,
    // Token and oracle addresses, looked up by this paymaster's chain id
    registry: ChainRegistry,
}

impl Paymaster {
    pub fn new(config: &SponsorConfig) -> Result<Self> {
        let price_signer = config
            .price_signer()
            .context("Failed to load price signer")?;
        let registry = config
            .load_registry()
            .context("Failed to load chain registry")?;

        info!(
            "Initialized paymaster client for {:?} on chain {}",
            config.paymaster_address, config.chain_id
        );

        Ok(Self {
            price_signer,
            paymaster_address: config.paymaster_address,
            chain_id: config.chain_id,
            protocol: config.protocol,
            quote_valid_period: config.quote_valid_period,
            entry_point: config.entry_point,
            registry,
        })
    }

    pub fn with_signer(
        paymaster_address: Address,
        chain_id: u64,
        price_signer: Option<LocalWallet>,
        protocol: PriceProtocol,
        quote_valid_period: u64,
    ) -> Self {
        Self {
            price_signer,
            paymaster_address,
            chain_id,
            protocol,
            quote_valid_period,
            entry_point: DEFAULT_ENTRY_POINT,
            registry: ChainRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: ChainRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn protocol(&self) -> &PriceProtocol {
        &self.protocol
    }

    /// Entry point the sponsored operations are submitted through.
    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    // Token and oracle for `symbol` on this paymaster's chain
    pub fn token(&self, symbol: &str) -> Result<&TokenConfig, PaymasterError> {
        self.registry.token(self.chain_id, symbol)
    }

    pub fn native_oracle(&self) -> Result<Address, PaymasterError> {
        self.registry.native_oracle(self.chain_id)
    }

    /// Token amount the paymaster will hold from the sender for `user_op`.
    pub fn calculate_token_amount(
        &self,
        user_op: &UserOperation,
        quote: &PriceQuote,
    ) -> Result<U256, PaymasterError> {
        estimate_token_cost(&OperationGasParams::from(user_op), quote)
    }

    /// Fails early when the sender's allowance cannot cover the operation.
    /// Returns the required amount on success.
    pub fn verify_token_approval(
        &self,
        user_op: &UserOperation,
        quote: &PriceQuote,
        allowance: U256,
    ) -> Result<U256, PaymasterError> {
        // 1. Compute the worst-case token cost at the quoted price
        let required = self.calculate_token_amount(user_op, quote)?;

        // 2. Compare it with the allowance the sender granted the paymaster
        if let Err(e) = check_approval(allowance, required) {
            warn!("Rejecting operation from {:?}: {}", user_op.sender, e);
            return Err(e);
        }
        Ok(required)
    }

    pub fn cached_paymaster_and_data(&self, price_override: Option<U256>, suppress_refund: bool) -> Bytes {
        CachedPricePayload {
            paymaster: self.paymaster_address,
            price_override,
            suppress_refund,
        }
        .encode()
    }

    /// Cached-price payload whose override slot carries the estimated
    /// token amount.
    pub fn generate_paymaster_and_data(
        &self,
        user_op: &UserOperation,
        quote: &PriceQuote,
    ) -> Result<PaymasterResponse, PaymasterError> {
        // 1. Estimate the token amount at the cached price
        let token_amount = self.calculate_token_amount(user_op, quote)?;

        // 2. Put it in the override slot, refunds enabled
        Ok(PaymasterResponse {
            paymaster_and_data: self.cached_paymaster_and_data(Some(token_amount), false),
            token_amount,
        })
    }

    pub async fn sign_price_quote<P>(&self, source: &P) -> Result<SignedPriceQuote, PaymasterError>
    where
        P: PriceSource + ?Sized,
    {
        // Only deployments configured with a price signer can attest prices
        let signer = self.price_signer.as_ref().ok_or_else(|| {
            PaymasterError::InvalidParameters("no price signer configured".to_string())
        })?;

        build_signed_price_quote(
            source,
            signer,
            &self.protocol,
            self.paymaster_address,
            self.chain_id,
            self.quote_valid_period,
        )
        .await
    }

    /// Signed-price payload; `maxCost` is the operation's cost at the
    /// signed price.
    pub fn signed_paymaster_and_data(
        &self,
        user_op: &UserOperation,
        quote: &SignedPriceQuote,
        markup: U256,
    ) -> Result<PaymasterResponse, PaymasterError> {
        // 1. The quote must be bound to this paymaster on this chain
        if quote.paymaster_address != self.paymaster_address || quote.chain_id != self.chain_id {
            return Err(PaymasterError::InvalidParameters(format!(
                "quote is bound to {:?} on chain {}, not this paymaster",
                quote.paymaster_address, quote.chain_id
            )));
        }

        // 2. Cap the cost at what the operation needs at the signed price
        let max_cost = self.calculate_token_amount(user_op, &quote.price_quote(markup))?;

        // 3. Encode the quote with the cap into the signed price layout
        let paymaster_and_data = encode_signed_payload(quote, max_cost)?;
        debug!(
            "Encoded signed price payload for {:?}, max cost {}",
            user_op.sender, max_cost
        );

        Ok(PaymasterResponse {
            paymaster_and_data,
            token_amount: max_cost,
        })
    }

    pub fn sponsor(
        &self,
        user_op: &UserOperation,
        kind: &QuoteKind,
    ) -> Result<PaymasterResponse, PaymasterError> {
        // 1. Build the payload in the layout matching where the contract reads its price
        let response = match kind {
            QuoteKind::Cached(quote) => self.generate_paymaster_and_data(user_op, quote)?,
            QuoteKind::Signed { quote, markup } => {
                self.signed_paymaster_and_data(user_op, quote, *markup)?
            }
        };

        // 2. Log what the sender will be charged at most
        info!(
            "Sponsoring operation from {:?} for {} tokens",
            user_op.sender, response.token_amount
        );
        Ok(response)
    }
}
