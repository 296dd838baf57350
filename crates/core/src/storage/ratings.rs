use crate::domain::rating::RatingEvent;
use crate::ingest::error::StoreError;
use crate::ingest::run::RatingStore;
use crate::recommend::LatestRatings;
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const INSERT_CHUNK_SIZE: usize = 200;

#[derive(Debug, Clone)]
pub struct PgRatingStore {
    pool: PgPool,
}

impl PgRatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RatingStore for PgRatingStore {
    async fn store_batch(&self, events: &[RatingEvent]) -> Result<u64, StoreError> {
        insert_ratings_batch(&self.pool, events).await.map_err(StoreError)
    }
}

#[async_trait::async_trait]
impl LatestRatings for PgRatingStore {
    async fn latest_by_ticker(&self) -> anyhow::Result<Vec<RatingEvent>> {
        latest_ratings_by_ticker(&self.pool).await
    }
}

/// Inserts a batch in one transaction. Rows whose natural key is already
/// persisted are skipped, never overwritten; the returned count covers
/// rows actually written.
pub async fn insert_ratings_batch(pool: &PgPool, events: &[RatingEvent]) -> anyhow::Result<u64> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    // Batch the insert to reduce round trips, but keep it transactional.
    let mut inserted: u64 = 0;
    let mut batch_idx: usize = 0;
    for chunk in events.chunks(INSERT_CHUNK_SIZE) {
        batch_idx += 1;
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO analyst_ratings \
             (ticker, company, brokerage, action, rating_from, rating_to, target_from, target_to, issued_at, ingested_at) ",
        );
        qb.push_values(chunk, |mut b, event| {
            b.push_bind(event.ticker.as_str())
                .push_bind(event.company.as_str())
                .push_bind(event.brokerage.as_str())
                .push_bind(event.action.as_str())
                .push_bind(event.rating_from.as_deref())
                .push_bind(event.rating_to.as_str())
                .push_bind(event.target_from)
                .push_bind(event.target_to)
                .push_bind(event.issued_at)
                .push_bind(event.ingested_at);
        });
        qb.push(" ON CONFLICT (ticker, brokerage, rating_to, issued_at) DO NOTHING");

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch insert analyst_ratings failed")?;
        inserted += res.rows_affected();

        tracing::debug!(
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "analyst_ratings batch insert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}

/// Most recent rating per ticker. Ties on issued_at break on ingestion
/// recency, then natural-key lexical order, so the result is deterministic.
pub async fn latest_ratings_by_ticker(pool: &PgPool) -> anyhow::Result<Vec<RatingEvent>> {
    let rows = sqlx::query_as::<
        _,
        (
            String,
            String,
            String,
            String,
            Option<String>,
            String,
            Option<f64>,
            Option<f64>,
            DateTime<Utc>,
            DateTime<Utc>,
        ),
    >(
        "SELECT DISTINCT ON (ticker) \
            ticker, company, brokerage, action, rating_from, rating_to, \
            target_from, target_to, issued_at, ingested_at \
         FROM analyst_ratings \
         ORDER BY ticker ASC, issued_at DESC, ingested_at DESC, brokerage ASC, rating_to ASC",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select latest analyst_ratings failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(
                ticker,
                company,
                brokerage,
                action,
                rating_from,
                rating_to,
                target_from,
                target_to,
                issued_at,
                ingested_at,
            )| RatingEvent {
                ticker,
                company,
                brokerage,
                action,
                rating_from,
                rating_to,
                target_from,
                target_to,
                issued_at,
                ingested_at,
            },
        )
        .collect())
}

pub async fn record_ingest_run(
    pool: &PgPool,
    started_at: DateTime<Utc>,
    status: &str,
    error: Option<&str>,
    summary: Option<serde_json::Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let finished_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO rating_ingest_runs (id, started_at, finished_at, status, error, summary) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .persistent(false)
    .bind(id)
    .bind(started_at)
    .bind(finished_at)
    .bind(status)
    .bind(error)
    .bind(summary)
    .execute(pool)
    .await
    .context("insert rating_ingest_runs failed")?;

    Ok(id)
}
