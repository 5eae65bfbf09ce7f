//! Contract for the token set registry which canonicalizes the asset
//! description of an order (single token, contract-wide or token range) into
//! a persisted set identifier.

use {anyhow::Result, model::order::AssetReference, primitive_types::H256};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenSet {
    /// Canonical identifier, e.g. `token:<contract>:<id>` for single tokens.
    pub id: String,
    pub schema_hash: H256,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenSetResolving: Send + Sync {
    /// Resolves the set for an asset reference, persisting it on first use.
    /// A caller supplied schema hash takes precedence over a derived one.
    /// `None` when no set can be built for the reference.
    async fn resolve(
        &self,
        asset: &AssetReference,
        schema_hash: Option<H256>,
    ) -> Result<Option<TokenSet>>;
}
