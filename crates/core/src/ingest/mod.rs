pub mod error;
pub mod feed;
pub mod run;
pub mod transform;
pub mod types;

pub use error::{FetchError, IngestError, StoreError, ValidationError};
pub use feed::{HttpRatingsFeed, RatingsFeed};
pub use run::{ingest_all, IngestReport, RatingStore};
