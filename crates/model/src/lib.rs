pub mod order;
pub mod u256_decimal;

pub use order::{
    AssetKind,
    AssetReference,
    NATIVE_TOKEN_ADDRESS,
    Order,
    OrderHash,
    OrderMetadata,
    Side,
    SourceToken,
};
