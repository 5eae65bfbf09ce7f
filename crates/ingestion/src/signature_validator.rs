//! Contract for cryptographic signature verification of submitted orders.

use {
    model::order::{OrderHash, Signature},
    primitive_types::H160,
};

#[derive(Debug, thiserror::Error)]
pub enum SignatureValidationError {
    /// The signature does not recover to the maker.
    #[error("invalid signature")]
    Invalid,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SignatureValidating: Send + Sync {
    async fn validate(
        &self,
        hash: &OrderHash,
        maker: H160,
        signature: &Signature,
    ) -> Result<(), SignatureValidationError>;
}
