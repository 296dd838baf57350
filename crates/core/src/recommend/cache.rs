use crate::domain::recommendation::Recommendation;
use crate::recommend::{build_recommendations, LatestRatings};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    recommendations: Vec<Recommendation>,
    generated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.generated_at < ttl
    }
}

/// Single-slot read-through cache for the recommendation list. The slot is
/// replaced wholesale on refresh; readers only ever observe a complete
/// snapshot or none at all.
pub struct RecommendationCache {
    source: Arc<dyn LatestRatings>,
    ttl: Duration,
    slot: RwLock<Option<CacheEntry>>,
}

impl RecommendationCache {
    pub fn new(source: Arc<dyn LatestRatings>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Returns the cached list while it is inside the TTL window, otherwise
    /// recomputes it from the latest stored ratings. The write lock
    /// serializes refreshers; a failed refresh leaves the previous snapshot
    /// in place and surfaces the error to this caller only.
    pub async fn get(&self) -> anyhow::Result<Vec<Recommendation>> {
        {
            let slot = self.slot.read().await;
            if let Some(entry) = slot.as_ref() {
                if entry.is_fresh(Utc::now(), self.ttl) {
                    return Ok(entry.recommendations.clone());
                }
            }
        }

        let mut slot = self.slot.write().await;

        // Another refresher may have repopulated the slot while this
        // caller waited on the write lock.
        if let Some(entry) = slot.as_ref() {
            if entry.is_fresh(Utc::now(), self.ttl) {
                return Ok(entry.recommendations.clone());
            }
        }

        let latest = self.source.latest_by_ticker().await?;
        let generated_at = Utc::now();
        let recommendations = build_recommendations(&latest, generated_at);

        tracing::debug!(
            tickers = latest.len(),
            recommendations = recommendations.len(),
            "recommendation cache refreshed"
        );

        *slot = Some(CacheEntry {
            recommendations: recommendations.clone(),
            generated_at,
        });
        Ok(recommendations)
    }

    #[cfg(test)]
    async fn snapshot_generated_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().await.as_ref().map(|entry| entry.generated_at)
    }
}
