//! Registry resolving source tokens (a marketplace address or a bare name)
//! to stable numeric identifiers. The registry keeps an in-process snapshot
//! of the backing table which is rebuilt after every write, so reads are a
//! map lookup in the common case.

use {
    anyhow::{Context, Result},
    database::byte_array::ByteArray,
    model::order::SourceToken,
    primitive_types::H160,
    serde::Serialize,
    serde_json::Value as JsonValue,
    sqlx::PgPool,
    std::collections::HashMap,
    tokio::sync::RwLock,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub address: H160,
    pub name: Option<String>,
    pub metadata: JsonValue,
}

#[derive(Default)]
struct Snapshot {
    by_address: HashMap<H160, Source>,
    by_name: HashMap<String, Source>,
}

pub struct SourceRegistry {
    pool: PgPool,
    cache: RwLock<Snapshot>,
}

impl SourceRegistry {
    /// Creates the registry and loads the initial snapshot. Intended to be
    /// called once at startup and shared through an `Arc`.
    pub async fn initialize(pool: PgPool) -> Result<Self> {
        let registry = Self {
            pool,
            cache: RwLock::new(Snapshot::default()),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Resolves a source token, creating a registry entry on first use. Bare
    /// names get a random placeholder address until the real one is claimed
    /// out of band.
    pub async fn resolve(&self, token: &SourceToken) -> Result<Source> {
        {
            let cache = self.cache.read().await;
            let hit = match token {
                SourceToken::Address(address) => cache.by_address.get(address),
                SourceToken::Name(name) => cache.by_name.get(name),
            };
            if let Some(source) = hit {
                return Ok(source.clone());
            }
        }

        let (address, name) = match token {
            SourceToken::Address(address) => (*address, None),
            SourceToken::Name(name) => (H160(rand::random()), Some(name.as_str())),
        };
        let metadata = serde_json::json!({});
        let mut ex = self.pool.acquire().await?;
        let id = database::sources::upsert(&mut ex, &ByteArray(address.0), name, &metadata)
            .await
            .context("insert source")?;
        drop(ex);
        // Writes invalidate the snapshot.
        self.reload().await?;

        Ok(Source {
            id,
            address,
            name: name.map(str::to_string),
            metadata,
        })
    }

    async fn reload(&self) -> Result<()> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::sources::load_all(&mut ex)
            .await
            .context("load sources")?;
        let mut snapshot = Snapshot::default();
        for row in rows {
            let source = Source {
                id: row.id,
                address: H160(row.address.0),
                name: row.name,
                metadata: row.metadata,
            };
            if let Some(name) = &source.name {
                snapshot.by_name.insert(name.clone(), source.clone());
            }
            snapshot.by_address.insert(source.address, source);
        }
        *self.cache.write().await = snapshot;
        Ok(())
    }
}
