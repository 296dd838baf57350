use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ratingflow_core::config::Settings;
use ratingflow_core::domain::recommendation::Recommendation;
use ratingflow_core::ingest::{ingest_all, HttpRatingsFeed};
use ratingflow_core::jobs::{IngestJob, JobRegistry};
use ratingflow_core::recommend::cache::RecommendationCache;
use ratingflow_core::storage::ratings::PgRatingStore;

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match ratingflow_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let cache = pool.as_ref().map(|pool| {
        Arc::new(RecommendationCache::new(
            Arc::new(PgRatingStore::new(pool.clone())),
            chrono::Duration::seconds(settings.cache_ttl_secs as i64),
        ))
    });

    let state = AppState {
        pool,
        cache,
        jobs: Arc::new(JobRegistry::new()),
        settings: Arc::new(settings),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations", get(get_recommendations))
        .route("/ingestions", post(trigger_ingestion))
        .route("/ingestions/:id", get(get_ingestion))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    cache: Option<Arc<RecommendationCache>>,
    jobs: Arc<JobRegistry>,
    settings: Arc<Settings>,
}

async fn get_recommendations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Recommendation>>, StatusCode> {
    let Some(cache) = &state.cache else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let recommendations = cache.get().await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "recommendation refresh failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(recommendations))
}

#[derive(Debug, Serialize)]
struct SubmittedJob {
    job_id: Uuid,
}

async fn trigger_ingestion(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SubmittedJob>), StatusCode> {
    let Some(pool) = state.pool.clone() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let feed = HttpRatingsFeed::from_settings(&state.settings).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "ratings feed is not configured");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let jobs = state.jobs.clone();
    let job_id = jobs.submit();

    tokio::spawn(async move {
        jobs.start(job_id);
        let store = PgRatingStore::new(pool);
        // The sender stays alive for the duration of the task; api-triggered
        // runs are only ever cancelled by process shutdown.
        let (_cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);

        match ingest_all(&feed, &store, &mut cancel_rx).await {
            Ok(report) => {
                tracing::info!(
                    %job_id,
                    pages = report.pages,
                    fetched = report.fetched,
                    inserted = report.inserted,
                    "ingestion job finished"
                );
                jobs.succeed(job_id, report);
            }
            Err(err) => {
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%job_id, error = %err, "ingestion job failed");
                jobs.fail(job_id, format!("{err:#}"));
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(SubmittedJob { job_id })))
}

async fn get_ingestion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IngestJob>, StatusCode> {
    let id = Uuid::parse_str(&id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let job = state.jobs.get(id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(job))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
