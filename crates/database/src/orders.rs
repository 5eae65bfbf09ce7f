//! The shared order table every per-protocol processor writes into. Rows are
//! keyed by the order's canonical hash and written at most once; later
//! lifecycle changes (fills, expiry sweeps) happen out of band.

use {
    crate::{Address, OrderHash, SchemaHash},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    serde_json::Value as JsonValue,
    sqlx::{PgConnection, Postgres, QueryBuilder},
    tracing::instrument,
};

/// Protocol plus asset standard of an order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "OrderKind", rename_all = "kebab-case")]
pub enum OrderKind {
    ExchangeErc721,
    ExchangeErc1155,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "OrderSide", rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Whether current on-chain balance is sufficient to fill the order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "FillabilityStatus", rename_all = "kebab-case")]
pub enum FillabilityStatus {
    Fillable,
    NoBalance,
}

/// Whether the exchange contract holds sufficient spending approval.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "ApprovalStatus", rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Approved,
    NoApproval,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub hash: OrderHash,
    pub kind: OrderKind,
    pub side: Side,
    pub fillability_status: FillabilityStatus,
    pub approval_status: ApprovalStatus,
    pub token_set_id: String,
    pub token_set_schema_hash: SchemaHash,
    pub maker: Address,
    pub taker: Address,
    pub price: BigDecimal,
    pub value: BigDecimal,
    pub quantity_remaining: BigDecimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub nonce: BigDecimal,
    pub source_id: Option<i64>,
    pub contract: Address,
    pub fee_bps: i64,
    pub fee_breakdown: JsonValue,
    pub raw_data: JsonValue,
    pub expiration: DateTime<Utc>,
}

/// Bulk inserts normalized orders, silently skipping hashes that already have
/// a row. Returns the number of rows actually written, which makes replays of
/// the same batch observable no-ops.
#[instrument(skip_all, fields(orders = orders.len()))]
pub async fn insert_orders(ex: &mut PgConnection, orders: &[Order]) -> Result<u64, sqlx::Error> {
    if orders.is_empty() {
        return Ok(0);
    }
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO orders (hash, kind, side, fillability_status, approval_status, \
         token_set_id, token_set_schema_hash, maker, taker, price, value, \
         quantity_remaining, valid_from, valid_to, nonce, source_id, contract, fee_bps, \
         fee_breakdown, raw_data, expiration) ",
    );
    builder.push_values(orders, |mut row, order| {
        row.push_bind(order.hash)
            .push_bind(order.kind)
            .push_bind(order.side)
            .push_bind(order.fillability_status)
            .push_bind(order.approval_status)
            .push_bind(&order.token_set_id)
            .push_bind(order.token_set_schema_hash)
            .push_bind(order.maker)
            .push_bind(order.taker)
            .push_bind(&order.price)
            .push_bind(&order.value)
            .push_bind(&order.quantity_remaining)
            .push_bind(order.valid_from)
            .push_bind(order.valid_to)
            .push_bind(&order.nonce)
            .push_bind(order.source_id)
            .push_bind(order.contract)
            .push_bind(order.fee_bps)
            .push_bind(&order.fee_breakdown)
            .push_bind(&order.raw_data)
            .push_bind(order.expiration);
    });
    builder.push(" ON CONFLICT (hash) DO NOTHING");
    let result = builder.build().execute(ex).await?;
    Ok(result.rows_affected())
}

pub async fn order_exists(ex: &mut PgConnection, hash: &OrderHash) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "SELECT EXISTS(SELECT 1 FROM orders WHERE hash = $1);";
    sqlx::query_scalar(QUERY).bind(hash).fetch_one(ex).await
}

pub async fn single_order(
    ex: &mut PgConnection,
    hash: &OrderHash,
) -> Result<Option<Order>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM orders WHERE hash = $1;";
    sqlx::query_as(QUERY).bind(hash).fetch_optional(ex).await
}

/// The extra uniqueness dimensions for non divisible assets, where the
/// protocol allows a maker to reuse a nonce across distinct listings.
pub struct Listing<'a> {
    pub contract: &'a Address,
    pub price: &'a BigDecimal,
}

/// Whether a persisted order already claims the maker's nonce. For divisible
/// assets the nonce alone is the uniqueness key; for non divisible assets the
/// listing's contract and price are part of it.
pub async fn nonce_is_taken(
    ex: &mut PgConnection,
    kind: OrderKind,
    maker: &Address,
    nonce: &BigDecimal,
    listing: Option<Listing<'_>>,
) -> Result<bool, sqlx::Error> {
    const QUERY_BY_NONCE: &str = "\
        SELECT EXISTS(SELECT 1 FROM orders WHERE kind = $1 AND maker = $2 AND nonce = $3);";
    const QUERY_BY_LISTING: &str = "\
        SELECT EXISTS(SELECT 1 FROM orders WHERE kind = $1 AND maker = $2 AND nonce = $3 \
         AND contract = $4 AND price = $5);";
    match listing {
        None => {
            sqlx::query_scalar(QUERY_BY_NONCE)
                .bind(kind)
                .bind(maker)
                .bind(nonce)
                .fetch_one(ex)
                .await
        }
        Some(listing) => {
            sqlx::query_scalar(QUERY_BY_LISTING)
                .bind(kind)
                .bind(maker)
                .bind(nonce)
                .bind(listing.contract)
                .bind(listing.price)
                .fetch_one(ex)
                .await
        }
    }
}
