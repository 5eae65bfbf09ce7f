//! Block bookkeeping shared with the chain-sync logic surrounding the order
//! processors. Reorgs are handled by deleting the exact (number, hash) pair
//! that got orphaned; several hashes can temporarily coexist at one height.

use {
    crate::BlockHash,
    sqlx::PgConnection,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::FromRow)]
pub struct Block {
    pub hash: BlockHash,
    pub number: i64,
}

pub async fn append(ex: &mut PgConnection, blocks: &[Block]) -> Result<(), sqlx::Error> {
    // ON CONFLICT so that concurrently syncing processes do not error on
    // blocks they both observed.
    const QUERY: &str = "\
        INSERT INTO blocks (hash, number) VALUES ($1, $2) ON CONFLICT DO NOTHING;";
    for block in blocks {
        sqlx::query(QUERY)
            .bind(block.hash)
            .bind(block.number)
            .execute(&mut *ex)
            .await?;
    }
    Ok(())
}

/// Removes an orphaned block. Both coordinates must match so a reorg at one
/// height never deletes the canonical row that replaced the orphan.
pub async fn delete(
    ex: &mut PgConnection,
    number: i64,
    hash: &BlockHash,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "DELETE FROM blocks WHERE number = $1 AND hash = $2;";
    let result = sqlx::query(QUERY)
        .bind(number)
        .bind(hash)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// All hashes known at a height.
pub async fn hashes_at(ex: &mut PgConnection, number: i64) -> Result<Vec<BlockHash>, sqlx::Error> {
    const QUERY: &str = "SELECT hash FROM blocks WHERE number = $1;";
    sqlx::query_scalar(QUERY).bind(number).fetch_all(ex).await
}

pub async fn latest_block(ex: &mut PgConnection) -> Result<i64, sqlx::Error> {
    const QUERY: &str = "SELECT COALESCE(MAX(number), 0) FROM blocks;";
    sqlx::query_scalar(QUERY).fetch_one(ex).await
}
