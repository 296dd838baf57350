use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratingflow_core::config::Settings;
use ratingflow_core::domain::rating::RatingEvent;
use ratingflow_core::ingest::{ingest_all, HttpRatingsFeed, RatingStore, StoreError};
use ratingflow_core::storage::ratings::{record_ingest_run, PgRatingStore};

#[derive(Debug, Parser)]
#[command(name = "ratingflow_worker")]
struct Args {
    /// Fetch and transform the whole feed, but skip all database writes.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let feed = HttpRatingsFeed::from_settings(&settings)?;

    let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::warn!("ctrl-c received; cancelling ingestion");
        let _ = cancel_tx.send(true);
    });

    if args.dry_run {
        let report = ingest_all(&feed, &DiscardStore, &mut cancel_rx)
            .await
            .map_err(anyhow::Error::new)?;
        tracing::info!(
            dry_run = true,
            pages = report.pages,
            fetched = report.fetched,
            distinct = report.inserted,
            "ingestion dry-run complete"
        );
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    ratingflow_core::storage::migrate(&pool).await?;

    let store = PgRatingStore::new(pool.clone());
    let started_at = chrono::Utc::now();

    match ingest_all(&feed, &store, &mut cancel_rx).await {
        Ok(report) => {
            let summary = serde_json::json!({
                "pages": report.pages,
                "fetched": report.fetched,
                "inserted": report.inserted,
            });
            let run_id =
                record_ingest_run(&pool, started_at, "success", None, Some(summary)).await?;

            tracing::info!(
                %run_id,
                pages = report.pages,
                fetched = report.fetched,
                inserted = report.inserted,
                "ingestion run complete"
            );
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            let run_id =
                record_ingest_run(&pool, started_at, "error", Some(&format!("{err:#}")), None)
                    .await?;

            tracing::error!(%run_id, error = %err, "ingestion run failed");
            Err(err)
        }
    }
}

/// Counts would-be inserts without touching the database.
struct DiscardStore;

#[async_trait::async_trait]
impl RatingStore for DiscardStore {
    async fn store_batch(&self, events: &[RatingEvent]) -> Result<u64, StoreError> {
        Ok(events.len() as u64)
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
