//! Price, value and fee normalization. All arithmetic is integer only; the
//! fee rate unit is basis points of the total price.

use {
    model::order::{AssetKind, Order, Side},
    primitive_types::{H160, U256},
    serde::Serialize,
};

pub const MAX_FEE_BPS: u64 = 10_000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pricing {
    /// Total of payment amount and declared fees. Per unit for divisible
    /// assets.
    pub price: U256,
    /// What the taker effectively receives: the full price for sell orders,
    /// the price net of fees for buy orders. Per unit for divisible assets.
    pub value: U256,
    /// Sum of all declared fees as basis points of the price.
    pub fee_bps: u64,
    pub fee_breakdown: Vec<FeeEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEntry {
    pub kind: FeeKind,
    pub recipient: H160,
    pub bps: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeKind {
    Royalty,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("computed price is zero")]
    ZeroPrice,
    #[error("divisible order without a quantity")]
    ZeroQuantity,
    #[error("amounts overflow")]
    Overflow,
}

/// Computes the canonical economics of an order. The fee rate is taken over
/// the aggregate price before any per-unit division so that rounding the unit
/// price does not distort it.
pub fn normalize(order: &Order, kind: AssetKind) -> Result<Pricing, PricingError> {
    let fee_amount = order
        .fees
        .iter()
        .try_fold(U256::zero(), |total, fee| total.checked_add(fee.amount))
        .ok_or(PricingError::Overflow)?;
    let price = order
        .erc20_token_amount
        .checked_add(fee_amount)
        .ok_or(PricingError::Overflow)?;
    if price.is_zero() {
        return Err(PricingError::ZeroPrice);
    }
    let value = match order.side {
        Side::Buy => price - fee_amount,
        Side::Sell => price,
    };

    let bps_of_price = |amount: U256| -> Result<u64, PricingError> {
        let scaled = amount
            .checked_mul(MAX_FEE_BPS.into())
            .ok_or(PricingError::Overflow)?;
        u64::try_from(scaled / price).map_err(|_| PricingError::Overflow)
    };
    let fee_bps = bps_of_price(fee_amount)?;
    let fee_breakdown = order
        .fees
        .iter()
        .map(|fee| {
            Ok(FeeEntry {
                kind: FeeKind::Royalty,
                recipient: fee.recipient,
                bps: bps_of_price(fee.amount)?,
            })
        })
        .collect::<Result<_, _>>()?;

    let (price, value) = if kind.is_divisible() {
        let quantity = order.quantity();
        if quantity.is_zero() {
            return Err(PricingError::ZeroQuantity);
        }
        (price / quantity, value / quantity)
    } else {
        (price, value)
    };

    Ok(Pricing {
        price,
        value,
        fee_bps,
        fee_breakdown,
    })
}
