//! Order ingestion service: validates batches of signed marketplace orders
//! and persists the accepted ones.

pub mod arguments;
pub mod asset_kinds;
pub mod fillability;
pub mod ingest;
pub mod metrics;
pub mod notifier;
pub mod pricing;
pub mod signature_validator;
pub mod sources;
pub mod token_sets;
