use crate::domain::rating::RatingEvent;
use crate::ingest::error::{IngestError, StoreError};
use crate::ingest::feed::RatingsFeed;
use crate::ingest::transform::transform_page;
use chrono::Utc;
use tokio::sync::watch;

#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// Persists a batch in one transaction, skipping rows whose natural key
    /// already exists. Returns the count actually inserted.
    async fn store_batch(&self, events: &[RatingEvent]) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: u32,
    pub fetched: u64,
    pub inserted: u64,
}

/// Drives fetch -> transform -> store until the feed signals completion
/// with an empty page or a missing cursor. Each page commits on its own,
/// so a failed run keeps the pages that already landed. The only retry in
/// the pipeline lives inside the feed client.
pub async fn ingest_all(
    feed: &dyn RatingsFeed,
    store: &dyn RatingStore,
    cancel: &mut watch::Receiver<bool>,
) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport::default();
    let mut cursor: Option<String> = None;

    loop {
        if *cancel.borrow() {
            return Err(IngestError::Cancelled);
        }

        // Racing the fetch against the cancel signal also interrupts a
        // backoff sleep pending inside the feed client.
        let page = tokio::select! {
            res = feed.fetch_page(cursor.as_deref()) => res?,
            _ = cancelled(cancel) => return Err(IngestError::Cancelled),
        };

        if page.items.is_empty() {
            tracing::info!(
                pages = report.pages,
                inserted = report.inserted,
                "ratings feed returned an empty page; ingestion complete"
            );
            break;
        }

        report.pages += 1;
        report.fetched += page.items.len() as u64;

        let events = transform_page(&page.items, Utc::now())?;
        let inserted = store.store_batch(&events).await?;
        report.inserted += inserted;

        tracing::info!(
            page = report.pages,
            records = page.items.len(),
            distinct = events.len(),
            inserted,
            "ingested ratings page"
        );

        match page.next_page.as_deref().map(str::trim) {
            Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
            _ => break,
        }
    }

    Ok(report)
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    loop {
        if cancel.changed().await.is_err() {
            // Sender dropped without cancelling; this run can never be
            // cancelled anymore.
            std::future::pending::<()>().await;
        }
        if *cancel.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rating::NaturalKey;
    use crate::ingest::error::{FetchError, ValidationError};
    use crate::ingest::types::{FeedPage, RawRating};
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn raw(ticker: &str, target_to: &str, time: &str) -> RawRating {
        RawRating {
            ticker: ticker.to_string(),
            company: format!("{ticker} Inc."),
            brokerage: "Goldman Sachs".to_string(),
            action: "upgraded by".to_string(),
            rating_from: "Hold".to_string(),
            rating_to: "Buy".to_string(),
            target_from: String::new(),
            target_to: target_to.to_string(),
            time: time.to_string(),
        }
    }

    fn page(items: Vec<RawRating>, next_page: Option<&str>) -> FeedPage {
        FeedPage {
            items,
            next_page: next_page.map(str::to_string),
        }
    }

    struct ScriptedFeed {
        pages: Mutex<VecDeque<FeedPage>>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(pages: Vec<FeedPage>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl RatingsFeed for ScriptedFeed {
        async fn fetch_page(&self, _cursor: Option<&str>) -> Result<FeedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.pages.lock().unwrap().pop_front();
            Ok(next.unwrap_or(FeedPage {
                items: vec![],
                next_page: None,
            }))
        }
    }

    /// Flips the cancel flag while serving its first page, so the loop
    /// must notice before requesting the next one.
    struct CancellingFeed {
        tx: watch::Sender<bool>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RatingsFeed for CancellingFeed {
        async fn fetch_page(&self, _cursor: Option<&str>) -> Result<FeedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(true);
            Ok(page(
                vec![raw("AAPL", "", "2024-01-01T00:00:00Z")],
                Some("page-2"),
            ))
        }
    }

    struct PendingFeed;

    #[async_trait::async_trait]
    impl RatingsFeed for PendingFeed {
        async fn fetch_page(&self, _cursor: Option<&str>) -> Result<FeedPage, FetchError> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        keys: Mutex<HashSet<NaturalKey>>,
        batches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RatingStore for MemoryStore {
        async fn store_batch(&self, events: &[RatingEvent]) -> Result<u64, StoreError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            let mut keys = self.keys.lock().unwrap();
            let mut inserted = 0;
            for event in events {
                if keys.insert(event.natural_key()) {
                    inserted += 1;
                }
            }
            Ok(inserted)
        }
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl RatingStore for FailingStore {
        async fn store_batch(&self, _events: &[RatingEvent]) -> Result<u64, StoreError> {
            Err(StoreError(anyhow::anyhow!("connection reset")))
        }
    }

    fn live_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn walks_every_page_and_sums_inserts() {
        let feed = ScriptedFeed::new(vec![
            page(
                vec![
                    raw("AAPL", "$180.00", "2024-01-01T00:00:00Z"),
                    raw("MSFT", "$400.00", "2024-01-02T00:00:00Z"),
                ],
                Some("page-2"),
            ),
            page(vec![raw("GOOG", "$150.00", "2024-01-03T00:00:00Z")], None),
        ]);
        let store = MemoryStore::default();
        let (_tx, mut cancel) = live_cancel();

        let report = ingest_all(&feed, &store, &mut cancel).await.unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.inserted, 3);
        // One fetch per page; the null cursor ends the run without an
        // extra round trip.
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_page_stops_successfully() {
        let feed = ScriptedFeed::new(vec![page(vec![], Some("ignored"))]);
        let store = MemoryStore::default();
        let (_tx, mut cancel) = live_cancel();

        let report = ingest_all(&feed, &store, &mut cancel).await.unwrap();

        assert_eq!(report, IngestReport::default());
        assert_eq!(store.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rerun_against_unchanged_feed_inserts_nothing() {
        let pages = || {
            vec![page(
                vec![
                    raw("AAPL", "$180.00", "2024-01-01T00:00:00Z"),
                    raw("MSFT", "$400.00", "2024-01-02T00:00:00Z"),
                ],
                None,
            )]
        };
        let store = MemoryStore::default();
        let (_tx, mut cancel) = live_cancel();

        let first = ingest_all(&ScriptedFeed::new(pages()), &store, &mut cancel)
            .await
            .unwrap();
        let second = ingest_all(&ScriptedFeed::new(pages()), &store, &mut cancel)
            .await
            .unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(store.keys.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_records_on_one_page_store_a_single_row() {
        // Two byte-identical records plus a third sharing their natural key.
        let feed = ScriptedFeed::new(vec![page(
            vec![
                raw("AAPL", "$150.00", "2024-01-01T00:00:00Z"),
                raw("AAPL", "$150.00", "2024-01-01T00:00:00Z"),
                raw("AAPL", "$155.00", "2024-01-01T00:00:00Z"),
            ],
            None,
        )]);
        let store = MemoryStore::default();
        let (_tx, mut cancel) = live_cancel();

        let report = ingest_all(&feed, &store, &mut cancel).await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_run() {
        let feed = ScriptedFeed::new(vec![
            page(vec![raw("AAPL", "", "2024-01-01T00:00:00Z")], Some("page-2")),
            page(vec![raw("MSFT", "", "2024-01-02T00:00:00Z")], None),
        ]);
        let (_tx, mut cancel) = live_cancel();

        let err = ingest_all(&feed, &FailingStore, &mut cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Store(_)));
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_failure_aborts_the_run() {
        let feed = ScriptedFeed::new(vec![page(
            vec![raw("AAPL", "", "not-a-timestamp")],
            None,
        )]);
        let store = MemoryStore::default();
        let (_tx, mut cancel) = live_cancel();

        let err = ingest_all(&feed, &store, &mut cancel).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Validation(ValidationError { field: "time", .. })
        ));
        assert_eq!(store.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_aborts_before_the_first_fetch() {
        let feed = ScriptedFeed::new(vec![page(
            vec![raw("AAPL", "", "2024-01-01T00:00:00Z")],
            None,
        )]);
        let store = MemoryStore::default();
        let (tx, mut cancel) = live_cancel();
        tx.send(true).unwrap();

        let err = ingest_all(&feed, &store, &mut cancel).await.unwrap_err();

        assert!(matches!(err, IngestError::Cancelled));
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_aborts_between_pages() {
        let (tx, mut cancel) = live_cancel();
        let feed = CancellingFeed {
            tx,
            calls: AtomicUsize::new(0),
        };
        let store = MemoryStore::default();

        let err = ingest_all(&feed, &store, &mut cancel).await.unwrap_err();

        assert!(matches!(err, IngestError::Cancelled));
        // The in-flight page commits; the cursor is never followed.
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_an_in_flight_fetch() {
        let (tx, mut cancel) = live_cancel();
        let handle = tokio::spawn(async move {
            let store = MemoryStore::default();
            ingest_all(&PendingFeed, &store, &mut cancel).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let res = handle.await.unwrap();
        assert!(matches!(res, Err(IngestError::Cancelled)));
    }
}
