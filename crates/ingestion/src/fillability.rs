//! Contract for the live on-chain state checker that determines whether an
//! order could currently be filled.

use {
    anyhow::Result,
    model::order::{AssetKind, Order},
};

/// The checker's verdict. The three partial states are recoverable: the maker
/// can top up balance or grant approval later without re-submitting, so such
/// orders are persisted with adjusted status flags instead of rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FillabilityCheck {
    Fillable,
    NoBalance,
    NoApproval,
    NoBalanceNoApproval,
    /// Terminal, e.g. the asset was burned or the order was cancelled
    /// on-chain.
    Unfillable { reason: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FillabilityChecking: Send + Sync {
    /// Checks maker balance and exchange approval against current chain
    /// state. Errors are infrastructure faults, not verdicts.
    async fn check(&self, order: &Order, kind: AssetKind) -> Result<FillabilityCheck>;
}
