use crate::domain::rating::RatingEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder until a market-data backed signal is wired in.
pub const TECHNICAL_SIGNAL_NEUTRAL: &str = "NEUTRAL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub ticker: String,
    pub company: String,
    pub score: f64,
    pub rationale: String,
    pub latest_rating: RatingEvent,
    pub target_price: Option<f64>,
    pub technical_signal: String,
    pub sentiment_score: Option<f64>,
    pub generated_at: DateTime<Utc>,
}
