use serde::{Deserialize, Serialize};

/// One page of the upstream ratings feed. `next_page` is null (or absent)
/// on the final page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub items: Vec<RawRating>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Raw feed record. The upstream emits every field as a string; typing
/// happens in the transformer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRating {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub brokerage: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub rating_from: String,
    #[serde(default)]
    pub rating_to: String,
    #[serde(default)]
    pub target_from: String,
    #[serde(default)]
    pub target_to: String,
    #[serde(default)]
    pub time: String,
}
