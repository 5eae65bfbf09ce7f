pub mod blocks;
pub mod byte_array;
pub mod orders;
pub mod sources;

use {
    byte_array::ByteArray,
    sqlx::{Executor, PgConnection, PgPool},
};

// Design:
//
// Functions that execute multiple statements take `&mut PgTransaction` to
// ensure the whole function succeeds or fails together. Functions that
// execute a single statement take `&mut PgConnection`. We call the parameter
// `ex` for `Executor` which is the trait whose methods we use to run queries.
// This scheme allows callers to decide whether they want to use a function as
// part of a bigger transaction or standalone. Note that PgTransaction
// implements Deref to PgConnection. Callers do need to take care of calling
// `commit` on the transaction.
//
// For tests a useful pattern is to start a transaction at the beginning of
// the test, use it for all queries and never commit it. When the uncommitted
// transaction gets dropped it is rolled back, which allows postgres tests to
// run in parallel.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

pub type Address = ByteArray<20>;
pub type OrderHash = ByteArray<32>;
pub type BlockHash = ByteArray<32>;
pub type SchemaHash = ByteArray<32>;

/// The names of tables we use in the db.
pub const TABLES: &[&str] = &["orders", "sources", "blocks"];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table} CASCADE;").as_str())
            .await?;
    }
    Ok(())
}

/// Like above but more ergonomic for some tests that use a pool.
#[allow(non_snake_case)]
pub async fn clear_DANGER(pool: &PgPool) -> sqlx::Result<()> {
    let mut transaction = pool.begin().await?;
    clear_DANGER_(&mut transaction).await?;
    transaction.commit().await
}

/// Counts rows in a table. Only used by tests.
pub async fn count_rows_in_table(ex: &mut PgConnection, table: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table};"))
        .fetch_one(ex)
        .await
}
