use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEvent {
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub action: String,
    pub rating_from: Option<String>,
    pub rating_to: String,
    pub target_from: Option<f64>,
    pub target_to: Option<f64>,
    pub issued_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// Business identity of a rating. Two events with equal keys describe the
/// same analyst action, and the store keeps at most one of them. Equality
/// and ordering are field-wise, so a delimiter inside a field can never
/// collide with another key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey {
    pub ticker: String,
    pub brokerage: String,
    pub rating_to: String,
    pub issued_at: DateTime<Utc>,
}

impl RatingEvent {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            ticker: self.ticker.clone(),
            brokerage: self.brokerage.clone(),
            rating_to: self.rating_to.clone(),
            issued_at: self.issued_at,
        }
    }
}

/// Collapses events sharing a natural key, keeping the first occurrence
/// per key. Output is ordered by key.
pub fn dedup_by_natural_key(events: Vec<RatingEvent>) -> Vec<RatingEvent> {
    let mut by_key: BTreeMap<NaturalKey, RatingEvent> = BTreeMap::new();
    for event in events {
        by_key.entry(event.natural_key()).or_insert(event);
    }
    by_key.into_values().collect()
}
