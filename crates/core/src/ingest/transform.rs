use crate::domain::rating::{dedup_by_natural_key, RatingEvent};
use crate::ingest::error::ValidationError;
use crate::ingest::types::RawRating;
use chrono::{DateTime, Utc};

/// Converts one page of raw records into typed events. A missing required
/// field or an unparseable timestamp rejects the whole page; prices are
/// supplementary and degrade to None. Records sharing a natural key within
/// the page are collapsed before they reach storage.
pub fn transform_page(
    raw: &[RawRating],
    ingested_at: DateTime<Utc>,
) -> Result<Vec<RatingEvent>, ValidationError> {
    let mut events = Vec::with_capacity(raw.len());
    for (index, record) in raw.iter().enumerate() {
        events.push(transform_record(index, record, ingested_at)?);
    }
    Ok(dedup_by_natural_key(events))
}

fn transform_record(
    index: usize,
    raw: &RawRating,
    ingested_at: DateTime<Utc>,
) -> Result<RatingEvent, ValidationError> {
    let ticker = require_field(index, "ticker", &raw.ticker)?;
    let company = require_field(index, "company", &raw.company)?;
    let brokerage = require_field(index, "brokerage", &raw.brokerage)?;
    let action = require_field(index, "action", &raw.action)?;
    let rating_to = require_field(index, "rating_to", &raw.rating_to)?;
    let issued_at = parse_issued_at(index, &raw.time)?;

    let rating_from = match raw.rating_from.trim() {
        "" => None,
        trimmed => Some(trimmed.to_string()),
    };

    Ok(RatingEvent {
        ticker,
        company,
        brokerage,
        action,
        rating_from,
        rating_to,
        target_from: parse_price(&raw.target_from),
        target_to: parse_price(&raw.target_to),
        issued_at,
        ingested_at,
    })
}

fn require_field(
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError {
            index,
            field,
            detail: "must be non-empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_issued_at(index: usize, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| ValidationError {
            index,
            field: "time",
            detail: format!("{err} (got {value:?})"),
        })
}

/// Parses a price that may carry a currency prefix and comma grouping.
pub(crate) fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_start_matches(['$', '€', '£', '¥']);
    let cleaned = trimmed.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}
