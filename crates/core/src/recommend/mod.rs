pub mod cache;

use crate::domain::rating::RatingEvent;
use crate::domain::recommendation::{Recommendation, TECHNICAL_SIGNAL_NEUTRAL};
use chrono::{DateTime, Utc};

/// Read path over the stored ratings: the single most recent event per
/// ticker.
#[async_trait::async_trait]
pub trait LatestRatings: Send + Sync {
    async fn latest_by_ticker(&self) -> anyhow::Result<Vec<RatingEvent>>;
}

pub const MAX_RECOMMENDATIONS: usize = 10;

const BASE_SCORE: f64 = 0.70;
const RECENT_BONUS: f64 = 0.05;
const RECENT_WINDOW_DAYS: i64 = 7;

const POSITIVE_ACTION_VERBS: [&str; 3] = ["upgraded", "initiated", "reiterated"];
const POSITIVE_RATING_LABELS: [&str; 4] = ["buy", "strong buy", "outperform", "overweight"];

/// Position of a rating label on the sell-to-buy ladder. Labels outside
/// the table return None and never participate in upgrade detection.
pub fn rating_rank(label: &str) -> Option<u8> {
    match label.trim().to_ascii_lowercase().as_str() {
        "strong sell" => Some(0),
        "sell" => Some(1),
        "underperform" | "underweight" | "reduce" => Some(2),
        "hold" | "neutral" | "market perform" | "equal weight" | "sector perform" => Some(3),
        "outperform" | "overweight" | "accumulate" => Some(4),
        "buy" => Some(5),
        "strong buy" => Some(6),
        _ => None,
    }
}

fn has_positive_action(event: &RatingEvent) -> bool {
    let action = event.action.to_ascii_lowercase();
    POSITIVE_ACTION_VERBS.iter().any(|verb| action.contains(verb))
}

fn has_positive_label(event: &RatingEvent) -> bool {
    let label = event.rating_to.trim().to_ascii_lowercase();
    POSITIVE_RATING_LABELS.contains(&label.as_str())
}

fn is_upgrade(event: &RatingEvent) -> bool {
    let from = event.rating_from.as_deref().and_then(rating_rank);
    let to = rating_rank(&event.rating_to);
    match (from, to) {
        (Some(from), Some(to)) => to > from,
        _ => false,
    }
}

pub fn is_candidate(event: &RatingEvent) -> bool {
    has_positive_action(event) || has_positive_label(event) || is_upgrade(event)
}

/// Keeps the ratings that indicate positive analyst sentiment. Input is
/// expected to hold one rating per ticker.
pub fn select_candidates(latest: &[RatingEvent]) -> Vec<&RatingEvent> {
    latest.iter().filter(|event| is_candidate(event)).collect()
}

fn label_bonus(rating_to: &str) -> f64 {
    match rating_to.trim().to_ascii_lowercase().as_str() {
        "strong buy" => 0.20,
        "buy" => 0.15,
        "outperform" | "overweight" => 0.10,
        _ => 0.0,
    }
}

/// Scores one candidate and assembles its rationale. `now` is passed in so
/// the recency window is deterministic under test.
pub fn score_rating(event: &RatingEvent, now: DateTime<Utc>) -> Recommendation {
    let age_days = (now - event.issued_at).num_days();

    let mut score = BASE_SCORE + label_bonus(&event.rating_to);
    if age_days <= RECENT_WINDOW_DAYS {
        score += RECENT_BONUS;
    }
    let score = score.min(1.0);

    let mut rationale = format!("{} rating by {}", event.rating_to, event.brokerage);
    if age_days <= 1 {
        rationale.push_str(", issued today");
    } else if age_days <= RECENT_WINDOW_DAYS {
        rationale.push_str(&format!(", issued {age_days} days ago"));
    }
    if let Some(target) = event.target_to {
        rationale.push_str(&format!(", price target ${target:.2}"));
    }

    Recommendation {
        ticker: event.ticker.clone(),
        company: event.company.clone(),
        score,
        rationale,
        latest_rating: event.clone(),
        target_price: event.target_to,
        technical_signal: TECHNICAL_SIGNAL_NEUTRAL.to_string(),
        sentiment_score: None,
        generated_at: now,
    }
}

/// Filter, score, rank. Ties on score fall back to ticker order so the
/// list is stable across refreshes.
pub fn build_recommendations(latest: &[RatingEvent], now: DateTime<Utc>) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = select_candidates(latest)
        .into_iter()
        .map(|event| score_rating(event, now))
        .collect();

    recommendations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}
