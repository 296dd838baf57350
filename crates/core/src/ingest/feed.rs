use crate::config::Settings;
use crate::ingest::error::FetchError;
use crate::ingest::types::FeedPage;
use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

// Caps the exponent so an aggressive retry config cannot overflow the shift.
const MAX_BACKOFF_EXP: u32 = 6;

#[async_trait::async_trait]
pub trait RatingsFeed: Send + Sync {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, FetchError>;
}

/// Client for the paginated upstream ratings feed. Transport failures and
/// 5xx responses are retried with exponential backoff; everything else is
/// returned to the caller on the first attempt.
#[derive(Debug, Clone)]
pub struct HttpRatingsFeed {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retries: u32,
}

impl HttpRatingsFeed {
    pub fn new(base_url: String, token: String, timeout: Duration, retries: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build ratings feed http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            retries,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_ratings_feed_url()?.to_string();
        let token = settings.require_ratings_feed_token()?.to_string();

        let timeout_secs = std::env::var("RATINGS_FEED_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("RATINGS_FEED_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        Self::new(base_url, token, Duration::from_secs(timeout_secs), retries)
    }
}

fn backoff_delay(retry: u32) -> Duration {
    Duration::from_secs(1 << retry.min(MAX_BACKOFF_EXP))
}

#[async_trait::async_trait]
impl RatingsFeed for HttpRatingsFeed {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, FetchError> {
        let mut retry: u32 = 0;
        loop {
            let mut req = self.http.get(self.base_url.as_str()).bearer_auth(&self.token);
            if let Some(cursor) = cursor {
                req = req.query(&[("next_page", cursor)]);
            }

            let res = match req.send().await {
                Ok(res) => res,
                Err(err) => {
                    if retry >= self.retries {
                        return Err(FetchError::Transport {
                            attempts: retry + 1,
                            detail: err.to_string(),
                        });
                    }
                    let backoff = backoff_delay(retry);
                    tracing::warn!(retry, ?backoff, error = %err, "ratings feed request failed; retrying");
                    tokio::time::sleep(backoff).await;
                    retry += 1;
                    continue;
                }
            };

            let status = res.status();
            let body = match res.text().await {
                Ok(body) => body,
                Err(err) => {
                    if retry >= self.retries {
                        return Err(FetchError::Transport {
                            attempts: retry + 1,
                            detail: format!("failed to read feed response: {err}"),
                        });
                    }
                    let backoff = backoff_delay(retry);
                    tracing::warn!(retry, ?backoff, error = %err, "ratings feed body read failed; retrying");
                    tokio::time::sleep(backoff).await;
                    retry += 1;
                    continue;
                }
            };

            if status.is_server_error() {
                if retry >= self.retries {
                    return Err(FetchError::Transport {
                        attempts: retry + 1,
                        detail: format!("ratings feed HTTP {status}: {body}"),
                    });
                }
                let backoff = backoff_delay(retry);
                tracing::warn!(retry, ?backoff, http_status = %status, "ratings feed HTTP error; retrying");
                tokio::time::sleep(backoff).await;
                retry += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status { status, body });
            }

            return serde_json::from_str::<FeedPage>(&body).map_err(|err| FetchError::Decode {
                detail: format!("{err}: {body}"),
            });
        }
    }
}
