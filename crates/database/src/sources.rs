//! Registry of order sources, the marketplaces and frontends orders are
//! attributed to. Rows are append-only; the numeric id is the stable
//! identifier referenced by order rows.

use {
    crate::Address,
    serde_json::Value as JsonValue,
    sqlx::PgConnection,
};

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub address: Address,
    pub name: Option<String>,
    pub metadata: JsonValue,
}

/// Inserts a source or returns the id of the existing row for the address.
pub async fn upsert(
    ex: &mut PgConnection,
    address: &Address,
    name: Option<&str>,
    metadata: &JsonValue,
) -> Result<i64, sqlx::Error> {
    // DO UPDATE instead of DO NOTHING so that RETURNING also yields the id of
    // a pre-existing row.
    const QUERY: &str = "\
        INSERT INTO sources (address, name, metadata) VALUES ($1, $2, $3) \
        ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address \
        RETURNING id;";
    sqlx::query_scalar(QUERY)
        .bind(address)
        .bind(name)
        .bind(metadata)
        .fetch_one(ex)
        .await
}

/// Loads the full registry, used to build the in-process snapshot cache.
pub async fn load_all(ex: &mut PgConnection) -> Result<Vec<Source>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM sources ORDER BY id;";
    sqlx::query_as(QUERY).fetch_all(ex).await
}
