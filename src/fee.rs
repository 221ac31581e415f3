// src/fee.rs
use ethers::types::U256;

use crate::error::PaymasterError;
use crate::fixed_point::{checked_add, checked_mul, PRICE_DENOMINATOR, PRICE_SCALE};
use crate::types::{OperationGasParams, PriceQuote};

/// Multiplier on the verification gas limit covering the paymaster's own
/// validation step.
pub const VERIFICATION_GAS_BUFFER: U256 = U256([3, 0, 0, 0]);

/// Gas reserved for the paymaster's post-op refund bookkeeping.
pub const REFUND_POSTOP_COST: U256 = U256([40_000, 0, 0, 0]);

/// Computes the token amount covering the operation's worst-case cost,
/// marked up by `quote.markup`.
///
/// The products are taken before either division, and the division by the
/// price scale happens before the division by the markup denominator.
pub fn estimate_token_cost(
    params: &OperationGasParams,
    quote: &PriceQuote,
) -> Result<U256, PaymasterError> {
    if quote.price.is_zero() {
        return Err(PaymasterError::StalePrice);
    }

    let buffered_verification = checked_mul(
        params.verification_gas_limit,
        VERIFICATION_GAS_BUFFER,
        "buffered verification gas",
    )?;
    let gas = checked_add(
        checked_add(params.pre_verification_gas, buffered_verification, "required gas")?,
        params.call_gas_limit,
        "required gas",
    )?;
    let required_pre_fund = checked_mul(gas, params.max_fee_per_gas, "required prefund")?;

    let post_op = checked_mul(params.max_fee_per_gas, REFUND_POSTOP_COST, "post-op cost")?;
    let total_cost = checked_add(required_pre_fund, post_op, "total cost")?;

    let marked_up = checked_mul(total_cost, quote.markup, "marked up cost")?;
    let converted = checked_mul(marked_up, quote.price, "token conversion")?;

    Ok(converted / PRICE_SCALE / PRICE_DENOMINATOR)
}

/// Advisory allowance check; the contract makes the final decision.
pub fn check_approval(token_allowance: U256, required_amount: U256) -> Result<(), PaymasterError> {
    if token_allowance < required_amount {
        return Err(PaymasterError::InsufficientApproval {
            allowance: token_allowance,
            required: required_amount,
        });
    }
    Ok(())
}
