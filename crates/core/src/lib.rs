pub mod domain;
pub mod ingest;
pub mod jobs;
pub mod recommend;
pub mod storage;

pub mod config {
    use anyhow::Context;

    const DEFAULT_CACHE_TTL_SECS: u64 = 300;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub ratings_feed_url: Option<String>,
        pub ratings_feed_token: Option<String>,
        pub sentry_dsn: Option<String>,
        pub cache_ttl_secs: u64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let cache_ttl_secs = std::env::var("RECOMMENDATION_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_CACHE_TTL_SECS);

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                ratings_feed_url: std::env::var("RATINGS_FEED_URL").ok(),
                ratings_feed_token: std::env::var("RATINGS_FEED_TOKEN").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                cache_ttl_secs,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_ratings_feed_url(&self) -> anyhow::Result<&str> {
            self.ratings_feed_url
                .as_deref()
                .context("RATINGS_FEED_URL is required")
        }

        pub fn require_ratings_feed_token(&self) -> anyhow::Result<&str> {
            self.ratings_feed_token
                .as_deref()
                .context("RATINGS_FEED_TOKEN is required")
        }
    }
}
