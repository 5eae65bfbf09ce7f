//! Resolves the asset standard a contract implements. Orders on contracts
//! whose standard cannot be determined are not ingestable.

use {anyhow::Result, model::order::AssetKind, primitive_types::H160};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AssetKindResolving: Send + Sync {
    /// `None` when the contract implements no supported standard.
    async fn asset_kind(&self, contract: H160) -> Result<Option<AssetKind>>;
}
