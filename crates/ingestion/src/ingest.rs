//! The order ingestion pipeline: batches of raw signed orders are validated
//! concurrently, normalized and bulk-persisted into the shared order table,
//! after which downstream consumers are signaled.

use {
    crate::{
        asset_kinds::AssetKindResolving,
        fillability::{FillabilityCheck, FillabilityChecking},
        notifier::{ArchivalOrder, ArchivalRelaying, OrderEvent, OrderEventSending},
        pricing::{self, MAX_FEE_BPS},
        signature_validator::{SignatureValidating, SignatureValidationError},
        sources::SourceRegistry,
        token_sets::TokenSetResolving,
    },
    anyhow::{Context, Result},
    chrono::{DateTime, TimeZone, Utc},
    database::{byte_array::ByteArray, orders as db},
    futures::stream::StreamExt,
    model::{
        NATIVE_TOKEN_ADDRESS,
        order::{AssetKind, Order, OrderHash, OrderMetadata, Side},
    },
    number::u256_to_big_decimal,
    primitive_types::H160,
    serde::Serialize,
    sqlx::PgPool,
    std::sync::Arc,
};

/// Bounds the number of orders of one batch that are in flight at the same
/// time, to cap load on the on-chain checker and the database.
pub const MAX_CONCURRENT_VALIDATIONS: usize = 20;

/// Terminal status of one ingestion attempt. A data value, not an error: the
/// caller gets one per submitted order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, strum::AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum IngestStatus {
    Success,
    AlreadyExists,
    UnknownOrderKind,
    DuplicatedNonce,
    Expired,
    UnsupportedPaymentToken,
    UnsupportedTaker,
    Invalid,
    InvalidSignature,
    NotFillable,
    InvalidTokenSet,
    FeesTooHigh,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub hash: OrderHash,
    pub status: IngestStatus,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IngestOptions {
    /// Forward accepted orders to the archival relay after persisting them.
    pub relay_to_archive: bool,
}

pub struct Ingestor {
    pool: PgPool,
    wrapped_native_token: H160,
    max_concurrent_validations: usize,
    sources: Arc<SourceRegistry>,
    asset_kinds: Arc<dyn AssetKindResolving>,
    signatures: Arc<dyn SignatureValidating>,
    fillability: Arc<dyn FillabilityChecking>,
    token_sets: Arc<dyn TokenSetResolving>,
    events: Arc<dyn OrderEventSending>,
    archival: Arc<dyn ArchivalRelaying>,
}

struct Processed {
    outcome: Outcome,
    row: Option<db::Order>,
    archival: Option<ArchivalOrder>,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        wrapped_native_token: H160,
        sources: Arc<SourceRegistry>,
        asset_kinds: Arc<dyn AssetKindResolving>,
        signatures: Arc<dyn SignatureValidating>,
        fillability: Arc<dyn FillabilityChecking>,
        token_sets: Arc<dyn TokenSetResolving>,
        events: Arc<dyn OrderEventSending>,
        archival: Arc<dyn ArchivalRelaying>,
    ) -> Self {
        Self {
            pool,
            wrapped_native_token,
            max_concurrent_validations: MAX_CONCURRENT_VALIDATIONS,
            sources,
            asset_kinds,
            signatures,
            fillability,
            token_sets,
            events,
            archival,
        }
    }

    pub fn with_max_concurrent_validations(mut self, cap: usize) -> Self {
        self.max_concurrent_validations = cap;
        self
    }

    /// Runs a whole batch through validation and persists the accepted subset
    /// with one conflict-ignoring bulk insert, so replaying a batch is a
    /// no-op. Downstream events fire only after persistence and only for
    /// orders that reached `success`.
    ///
    /// Returns one outcome per order, in no particular order. An order whose
    /// processing hit an unexpected error is logged and omitted from the
    /// result; it never aborts its siblings.
    pub async fn ingest(
        &self,
        batch: Vec<(Order, OrderMetadata)>,
        options: IngestOptions,
    ) -> Result<Vec<Outcome>> {
        let processed: Vec<Option<Processed>> = futures::stream::iter(batch)
            .map(|(order, metadata)| self.process_logged(order, metadata))
            .buffer_unordered(self.max_concurrent_validations)
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(processed.len());
        let mut rows = Vec::new();
        let mut archivals = Vec::new();
        for processed in processed.into_iter().flatten() {
            if let Some(row) = processed.row {
                rows.push(row);
            }
            if let Some(archival) = processed.archival {
                archivals.push(archival);
            }
            outcomes.push(processed.outcome);
        }

        let mut ex = self.pool.acquire().await?;
        db::insert_orders(&mut ex, &rows)
            .await
            .context("insert orders")?;
        drop(ex);

        let metrics = Metrics::get();
        for outcome in &outcomes {
            metrics
                .outcomes
                .with_label_values(&[outcome.status.as_ref()])
                .inc();
        }

        let events: Vec<_> = outcomes
            .iter()
            .filter(|outcome| outcome.status == IngestStatus::Success)
            .map(|outcome| OrderEvent::new_order(outcome.hash))
            .collect();
        if !events.is_empty() {
            self.events
                .enqueue(events)
                .await
                .context("enqueue order events")?;
        }

        if options.relay_to_archive && !archivals.is_empty() {
            if let Err(err) = self.archival.relay(archivals).await {
                tracing::warn!(?err, "archival relay failed");
            }
        }

        Ok(outcomes)
    }

    async fn process_logged(&self, order: Order, metadata: OrderMetadata) -> Option<Processed> {
        match self.process(&order, &metadata).await {
            Ok(processed) => Some(processed),
            Err(err) => {
                Metrics::get().unexpected_errors.inc();
                tracing::error!(
                    ?err,
                    ?order,
                    "unexpected error ingesting order, dropping it from the batch"
                );
                None
            }
        }
    }

    /// Runs one order through the ordered validation checks. The first
    /// failing check decides the terminal status; no later check runs.
    async fn process(&self, order: &Order, metadata: &OrderMetadata) -> Result<Processed> {
        let hash = order.hash();
        let reject = |status: IngestStatus| -> Result<Processed> {
            Ok(Processed {
                outcome: Outcome { hash, status },
                row: None,
                archival: None,
            })
        };

        // Existence and nonce lookups share one connection which is released
        // before the slower external checks.
        let mut ex = self.pool.acquire().await?;
        if db::order_exists(&mut ex, &ByteArray(hash.0)).await? {
            return reject(IngestStatus::AlreadyExists);
        }

        let contract = order.asset.contract();
        let Some(kind) = self.asset_kinds.asset_kind(contract).await? else {
            return reject(IngestStatus::UnknownOrderKind);
        };

        // The pricing runs before the nonce guard because the non divisible
        // uniqueness key includes the computed price.
        let pricing = match pricing::normalize(order, kind) {
            Ok(pricing) => pricing,
            Err(err) => {
                tracing::debug!(%hash, %err, "order has no computable price");
                return reject(IngestStatus::Invalid);
            }
        };

        let maker = ByteArray(order.maker.0);
        let contract_bytes = ByteArray(contract.0);
        let nonce = u256_to_big_decimal(&order.nonce);
        let price = u256_to_big_decimal(&pricing.price);
        let listing = (!kind.is_divisible()).then_some(db::Listing {
            contract: &contract_bytes,
            price: &price,
        });
        if db::nonce_is_taken(&mut ex, order_kind(kind), &maker, &nonce, listing).await? {
            return reject(IngestStatus::DuplicatedNonce);
        }
        drop(ex);

        // The expiry bound is exclusive: an order expiring right now is
        // already unfillable.
        let now = Utc::now();
        if u64::try_from(now.timestamp()).unwrap_or(0) >= order.expiry {
            return reject(IngestStatus::Expired);
        }

        let payment_token_ok = match order.side {
            Side::Buy => order.erc20_token == self.wrapped_native_token,
            Side::Sell => order.erc20_token == NATIVE_TOKEN_ADDRESS,
        };
        if !payment_token_ok {
            return reject(IngestStatus::UnsupportedPaymentToken);
        }

        // Only open orders are indexed.
        if !order.taker.is_zero() {
            return reject(IngestStatus::UnsupportedTaker);
        }

        if let Err(err) = order.check_structure(kind) {
            tracing::debug!(%hash, %err, "malformed order");
            return reject(IngestStatus::Invalid);
        }

        match self.signatures.validate(&hash, order.maker, &order.signature).await {
            Ok(()) => (),
            Err(SignatureValidationError::Invalid) => {
                return reject(IngestStatus::InvalidSignature);
            }
            Err(SignatureValidationError::Other(err)) => {
                return Err(err.context("signature validation"));
            }
        }

        let (fillability_status, approval_status) = match self
            .fillability
            .check(order, kind)
            .await
            .context("fillability check")?
        {
            FillabilityCheck::Fillable => (db::FillabilityStatus::Fillable, db::ApprovalStatus::Approved),
            FillabilityCheck::NoBalance => (db::FillabilityStatus::NoBalance, db::ApprovalStatus::Approved),
            FillabilityCheck::NoApproval => (db::FillabilityStatus::Fillable, db::ApprovalStatus::NoApproval),
            FillabilityCheck::NoBalanceNoApproval => {
                (db::FillabilityStatus::NoBalance, db::ApprovalStatus::NoApproval)
            }
            FillabilityCheck::Unfillable { reason } => {
                tracing::debug!(%hash, reason, "order is not fillable");
                return reject(IngestStatus::NotFillable);
            }
        };

        let Some(token_set) = self
            .token_sets
            .resolve(&order.asset, metadata.schema_hash)
            .await
            .context("token set resolution")?
        else {
            return reject(IngestStatus::InvalidTokenSet);
        };

        if pricing.fee_bps > MAX_FEE_BPS {
            return reject(IngestStatus::FeesTooHigh);
        }

        let source = match &metadata.source {
            Some(token) => Some(self.sources.resolve(token).await?),
            None => None,
        };

        let expiration = expiry_to_datetime(order.expiry);
        let row = db::Order {
            hash: ByteArray(hash.0),
            kind: order_kind(kind),
            side: order_side(order.side),
            fillability_status,
            approval_status,
            token_set_id: token_set.id,
            token_set_schema_hash: ByteArray(token_set.schema_hash.0),
            maker,
            taker: ByteArray(order.taker.0),
            price,
            value: u256_to_big_decimal(&pricing.value),
            quantity_remaining: u256_to_big_decimal(&order.quantity()),
            valid_from: now,
            valid_to: expiration,
            nonce,
            source_id: source.as_ref().map(|source| source.id),
            contract: contract_bytes,
            fee_bps: i64::try_from(pricing.fee_bps).context("fee bps")?,
            fee_breakdown: serde_json::to_value(&pricing.fee_breakdown)?,
            raw_data: serde_json::to_value(order)?,
            expiration,
        };
        let archival = ArchivalOrder {
            order: order.clone(),
            schema_hash: token_set.schema_hash,
            source,
        };

        Ok(Processed {
            outcome: Outcome {
                hash,
                status: IngestStatus::Success,
            },
            row: Some(row),
            archival: Some(archival),
        })
    }
}

fn order_kind(kind: AssetKind) -> db::OrderKind {
    match kind {
        AssetKind::Erc721 => db::OrderKind::ExchangeErc721,
        AssetKind::Erc1155 => db::OrderKind::ExchangeErc1155,
    }
}

fn order_side(side: Side) -> db::Side {
    match side {
        Side::Buy => db::Side::Buy,
        Side::Sell => db::Side::Sell,
    }
}

/// Orders with expiries beyond the representable range are treated as never
/// expiring.
fn expiry_to_datetime(expiry: u64) -> DateTime<Utc> {
    i64::try_from(expiry)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Ingestion attempts by terminal status.
    #[metric(name = "order_ingestion_outcomes", labels("status"))]
    outcomes: prometheus::IntCounterVec,

    /// Orders dropped from a batch because of an unexpected error.
    #[metric(name = "order_ingestion_unexpected_errors")]
    unexpected_errors: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(crate::metrics::get_storage_registry()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            asset_kinds::MockAssetKindResolving,
            fillability::MockFillabilityChecking,
            notifier::{MockArchivalRelaying, MockOrderEventSending},
            signature_validator::MockSignatureValidating,
            token_sets::{MockTokenSetResolving, TokenSet},
        },
        anyhow::anyhow,
        model::order::{AssetReference, Fee, Signature, SourceToken},
        primitive_types::{H256, U256},
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    const WRAPPED_NATIVE: H160 = H160([0xcc; 20]);

    fn sell_order(token_id: u64) -> Order {
        Order {
            side: Side::Sell,
            maker: H160([0x11; 20]),
            taker: H160::zero(),
            expiry: far_future(),
            nonce: 1u64.into(),
            erc20_token: NATIVE_TOKEN_ADDRESS,
            erc20_token_amount: 900u64.into(),
            fees: vec![Fee {
                recipient: H160([0x22; 20]),
                amount: 100u64.into(),
            }],
            asset: AssetReference::SingleToken {
                contract: H160([0x33; 20]),
                token_id: token_id.into(),
            },
            nft_amount: None,
            signature: Signature::default(),
        }
    }

    fn far_future() -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap() + 3600
    }

    struct Collaborators {
        asset_kind: Option<AssetKind>,
        fillability: FillabilityCheck,
        signature_valid: bool,
        token_set: Option<TokenSet>,
    }

    impl Default for Collaborators {
        fn default() -> Self {
            Self {
                asset_kind: Some(AssetKind::Erc721),
                fillability: FillabilityCheck::Fillable,
                signature_valid: true,
                token_set: Some(TokenSet {
                    id: "token:0x33:1".to_string(),
                    schema_hash: H256([0x44; 32]),
                }),
            }
        }
    }

    async fn ingestor(pool: PgPool, collaborators: Collaborators) -> Ingestor {
        let mut asset_kinds = MockAssetKindResolving::new();
        let kind = collaborators.asset_kind;
        asset_kinds
            .expect_asset_kind()
            .returning(move |_| Ok(kind));

        let mut signatures = MockSignatureValidating::new();
        let valid = collaborators.signature_valid;
        signatures.expect_validate().returning(move |_, _, _| {
            if valid {
                Ok(())
            } else {
                Err(SignatureValidationError::Invalid)
            }
        });

        let mut fillability = MockFillabilityChecking::new();
        let check = collaborators.fillability;
        fillability
            .expect_check()
            .returning(move |_, _| Ok(check.clone()));

        let mut token_sets = MockTokenSetResolving::new();
        let token_set = collaborators.token_set;
        token_sets
            .expect_resolve()
            .returning(move |_, _| Ok(token_set.clone()));

        let mut events = MockOrderEventSending::new();
        events.expect_enqueue().returning(|_| Ok(()));

        let sources = Arc::new(SourceRegistry::initialize(pool.clone()).await.unwrap());
        Ingestor::new(
            pool,
            WRAPPED_NATIVE,
            sources,
            Arc::new(asset_kinds),
            Arc::new(signatures),
            Arc::new(fillability),
            Arc::new(token_sets),
            Arc::new(events),
            Arc::new(MockArchivalRelaying::new()),
        )
    }

    async fn statuses(
        ingestor: &Ingestor,
        orders: Vec<Order>,
    ) -> Vec<IngestStatus> {
        ingestor
            .ingest(
                orders
                    .into_iter()
                    .map(|order| (order, OrderMetadata::default()))
                    .collect(),
                IngestOptions::default(),
            )
            .await
            .unwrap()
            .iter()
            .map(|outcome| outcome.status)
            .collect()
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_ingest_success_is_idempotent() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();
        let ingestor = ingestor(pool.clone(), Collaborators::default()).await;

        let order = sell_order(7);
        let hash = order.hash();
        assert_eq!(
            statuses(&ingestor, vec![order.clone()]).await,
            vec![IngestStatus::Success]
        );
        assert_eq!(
            statuses(&ingestor, vec![order]).await,
            vec![IngestStatus::AlreadyExists]
        );

        let mut ex = pool.acquire().await.unwrap();
        assert_eq!(
            database::count_rows_in_table(&mut ex, "orders").await.unwrap(),
            1
        );
        let row = db::single_order(&mut ex, &ByteArray(hash.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.fillability_status, db::FillabilityStatus::Fillable);
        assert_eq!(row.approval_status, db::ApprovalStatus::Approved);
        // Sell side: value equals price.
        assert_eq!(row.value, row.price);
        assert_eq!(row.price, sqlx::types::BigDecimal::from(1000));
        assert_eq!(row.fee_bps, 1000);
        assert_eq!(row.quantity_remaining, sqlx::types::BigDecimal::from(1));
        assert_eq!(row.source_id, None);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_events_fire_once_per_success_after_persistence() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let mut events = MockOrderEventSending::new();
        let sink = recorded.clone();
        events.expect_enqueue().returning(move |batch| {
            sink.lock().unwrap().extend(batch);
            Ok(())
        });

        let base = ingestor(pool.clone(), Collaborators::default()).await;
        let ingestor = Ingestor {
            events: Arc::new(events),
            ..base
        };

        let good = sell_order(7);
        let expired = Order {
            expiry: 1,
            ..sell_order(8)
        };
        ingestor
            .ingest(
                vec![
                    (good.clone(), OrderMetadata::default()),
                    (expired, OrderMetadata::default()),
                ],
                IngestOptions::default(),
            )
            .await
            .unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].hash, good.hash());
        assert_eq!(recorded[0].context, format!("new-order-{}", good.hash()));
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_rejections_write_no_rows() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();

        // Buy order quoting something other than the wrapped native token.
        let ingestor_default = ingestor(pool.clone(), Collaborators::default()).await;
        let bad_buy = Order {
            side: Side::Buy,
            erc20_token: H160([0x55; 20]),
            ..sell_order(1)
        };
        assert_eq!(
            statuses(&ingestor_default, vec![bad_buy]).await,
            vec![IngestStatus::UnsupportedPaymentToken]
        );

        // Sell order must quote the native placeholder.
        let bad_sell = Order {
            erc20_token: WRAPPED_NATIVE,
            ..sell_order(2)
        };
        assert_eq!(
            statuses(&ingestor_default, vec![bad_sell]).await,
            vec![IngestStatus::UnsupportedPaymentToken]
        );

        // Private order.
        let private = Order {
            taker: H160([0x66; 20]),
            ..sell_order(3)
        };
        assert_eq!(
            statuses(&ingestor_default, vec![private]).await,
            vec![IngestStatus::UnsupportedTaker]
        );

        // Expiring right now is already expired: the bound is exclusive.
        let expiring_now = Order {
            expiry: u64::try_from(Utc::now().timestamp()).unwrap(),
            ..sell_order(4)
        };
        assert_eq!(
            statuses(&ingestor_default, vec![expiring_now]).await,
            vec![IngestStatus::Expired]
        );

        // Structurally broken: single token assets have no quantity.
        let malformed = Order {
            nft_amount: Some(2u64.into()),
            ..sell_order(5)
        };
        assert_eq!(
            statuses(&ingestor_default, vec![malformed]).await,
            vec![IngestStatus::Invalid]
        );

        // Unresolvable asset standard.
        let unknown_kind = ingestor(
            pool.clone(),
            Collaborators {
                asset_kind: None,
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            statuses(&unknown_kind, vec![sell_order(6)]).await,
            vec![IngestStatus::UnknownOrderKind]
        );

        // Bad signature.
        let bad_signature = ingestor(
            pool.clone(),
            Collaborators {
                signature_valid: false,
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            statuses(&bad_signature, vec![sell_order(7)]).await,
            vec![IngestStatus::InvalidSignature]
        );

        // Terminally unfillable.
        let unfillable = ingestor(
            pool.clone(),
            Collaborators {
                fillability: FillabilityCheck::Unfillable {
                    reason: "asset burned".to_string(),
                },
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            statuses(&unfillable, vec![sell_order(8)]).await,
            vec![IngestStatus::NotFillable]
        );

        // No token set.
        let no_token_set = ingestor(
            pool.clone(),
            Collaborators {
                token_set: None,
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            statuses(&no_token_set, vec![sell_order(9)]).await,
            vec![IngestStatus::InvalidTokenSet]
        );

        let mut ex = pool.acquire().await.unwrap();
        assert_eq!(
            database::count_rows_in_table(&mut ex, "orders").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_recoverable_fillability_persists_with_flags() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();
        let ingestor = ingestor(
            pool.clone(),
            Collaborators {
                fillability: FillabilityCheck::NoBalanceNoApproval,
                ..Default::default()
            },
        )
        .await;

        let order = sell_order(7);
        // Recoverable sub-states persist and count as success.
        assert_eq!(
            statuses(&ingestor, vec![order.clone()]).await,
            vec![IngestStatus::Success]
        );

        let mut ex = pool.acquire().await.unwrap();
        let row = db::single_order(&mut ex, &ByteArray(order.hash().0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.fillability_status, db::FillabilityStatus::NoBalance);
        assert_eq!(row.approval_status, db::ApprovalStatus::NoApproval);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_duplicated_nonce_policies() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();
        let ingestor = ingestor(pool.clone(), Collaborators::default()).await;

        // Non divisible: same maker and nonce is fine as long as the listing
        // (contract, price) differs.
        assert_eq!(
            statuses(&ingestor, vec![sell_order(1)]).await,
            vec![IngestStatus::Success]
        );
        let same_listing = sell_order(2);
        assert_eq!(
            statuses(&ingestor, vec![same_listing]).await,
            vec![IngestStatus::DuplicatedNonce]
        );
        let different_price = Order {
            erc20_token_amount: 1900u64.into(),
            ..sell_order(3)
        };
        assert_eq!(
            statuses(&ingestor, vec![different_price]).await,
            vec![IngestStatus::Success]
        );

        // Divisible: the nonce alone is the uniqueness key, price changes do
        // not help.
        let divisible = self::ingestor(
            pool.clone(),
            Collaborators {
                asset_kind: Some(AssetKind::Erc1155),
                ..Default::default()
            },
        )
        .await;
        let multi = Order {
            nonce: 2u64.into(),
            nft_amount: Some(5u64.into()),
            ..sell_order(4)
        };
        assert_eq!(
            statuses(&divisible, vec![multi.clone()]).await,
            vec![IngestStatus::Success]
        );
        let repriced = Order {
            erc20_token_amount: 4900u64.into(),
            asset: AssetReference::SingleToken {
                contract: H160([0x33; 20]),
                token_id: 9u64.into(),
            },
            ..multi
        };
        assert_eq!(
            statuses(&divisible, vec![repriced]).await,
            vec![IngestStatus::DuplicatedNonce]
        );
    }

    struct FailingChecker {
        fail_token_id: U256,
    }

    #[async_trait::async_trait]
    impl FillabilityChecking for FailingChecker {
        async fn check(&self, order: &Order, _: AssetKind) -> Result<FillabilityCheck> {
            match &order.asset {
                AssetReference::SingleToken { token_id, .. } if *token_id == self.fail_token_id => {
                    Err(anyhow!("node connection reset"))
                }
                _ => Ok(FillabilityCheck::Fillable),
            }
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_unexpected_error_drops_only_that_order() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();
        let base = ingestor(pool.clone(), Collaborators::default()).await;
        let ingestor = Ingestor {
            fillability: Arc::new(FailingChecker {
                fail_token_id: 2u64.into(),
            }),
            ..base
        };

        // Distinct nonces so the orders do not trip the nonce guard.
        let batch: Vec<_> = (1u64..=3)
            .map(|i| {
                let order = Order {
                    nonce: i.into(),
                    ..sell_order(i)
                };
                (order, OrderMetadata::default())
            })
            .collect();
        let outcomes = ingestor
            .ingest(batch, IngestOptions::default())
            .await
            .unwrap();

        // The failing order is dropped, its siblings are unaffected.
        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes
                .iter()
                .all(|outcome| outcome.status == IngestStatus::Success)
        );
        let mut ex = pool.acquire().await.unwrap();
        assert_eq!(
            database::count_rows_in_table(&mut ex, "orders").await.unwrap(),
            2
        );
    }

    struct CountingChecker {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FillabilityChecking for CountingChecker {
        async fn check(&self, _: &Order, _: AssetKind) -> Result<FillabilityCheck> {
            let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(FillabilityCheck::Fillable)
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_concurrency_never_exceeds_cap() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();
        let checker = Arc::new(CountingChecker {
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
        });
        let base = ingestor(pool.clone(), Collaborators::default()).await;
        let ingestor = Ingestor {
            fillability: checker.clone(),
            ..base
        };

        let batch: Vec<_> = (1u64..=100)
            .map(|i| {
                let order = Order {
                    nonce: i.into(),
                    ..sell_order(i)
                };
                (order, OrderMetadata::default())
            })
            .collect();
        let outcomes = ingestor
            .ingest(batch, IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 100);
        assert!(checker.max.load(Ordering::SeqCst) <= MAX_CONCURRENT_VALIDATIONS);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_source_and_archival() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();

        let relayed = Arc::new(Mutex::new(Vec::new()));
        let mut archival = MockArchivalRelaying::new();
        let sink = relayed.clone();
        archival.expect_relay().returning(move |orders| {
            sink.lock().unwrap().extend(orders);
            Ok(())
        });

        let base = ingestor(pool.clone(), Collaborators::default()).await;
        let ingestor = Ingestor {
            archival: Arc::new(archival),
            ..base
        };

        let order = sell_order(7);
        let metadata = OrderMetadata {
            schema_hash: None,
            source: Some(SourceToken::Name("marketplace.example".to_string())),
        };
        let outcomes = ingestor
            .ingest(
                vec![(order.clone(), metadata)],
                IngestOptions {
                    relay_to_archive: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, IngestStatus::Success);

        // The persisted row references the newly registered source.
        let mut ex = pool.acquire().await.unwrap();
        let row = db::single_order(&mut ex, &ByteArray(order.hash().0))
            .await
            .unwrap()
            .unwrap();
        assert!(row.source_id.is_some());

        let relayed = relayed.lock().unwrap();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].order, order);
        assert_eq!(relayed[0].schema_hash, H256([0x44; 32]));
        assert_eq!(
            relayed[0].source.as_ref().unwrap().name.as_deref(),
            Some("marketplace.example")
        );
    }
}
