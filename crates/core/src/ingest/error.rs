use std::fmt;

/// A record field the pipeline cannot proceed without. Aborts the whole
/// page it was found on.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub index: usize,
    pub field: &'static str,
    pub detail: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid rating record (index={}, field={}): {}",
            self.index, self.field, self.detail
        )
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum FetchError {
    /// Non-success status below 500. Client errors are not transient, so
    /// they are never retried.
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// Transport failure or 5xx, after exhausting retries.
    Transport { attempts: u32, detail: String },
    /// Response body did not match the page envelope.
    Decode { detail: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status { status, body } => {
                write!(f, "ratings feed HTTP {status}: {body}")
            }
            FetchError::Transport { attempts, detail } => {
                write!(f, "ratings feed unreachable after {attempts} attempts: {detail}")
            }
            FetchError::Decode { detail } => {
                write!(f, "ratings feed response did not decode: {detail}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Transaction-level storage failure. Nothing from the affected batch was
/// written.
#[derive(Debug)]
pub struct StoreError(pub anyhow::Error);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rating store error: {:#}", self.0)
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug)]
pub enum IngestError {
    Fetch(FetchError),
    Validation(ValidationError),
    Store(StoreError),
    Cancelled,
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Fetch(e) => write!(f, "page fetch failed: {e}"),
            IngestError::Validation(e) => write!(f, "page rejected: {e}"),
            IngestError::Store(e) => write!(f, "batch store failed: {e}"),
            IngestError::Cancelled => write!(f, "ingestion cancelled"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Fetch(e) => Some(e),
            IngestError::Validation(e) => Some(e),
            IngestError::Store(e) => Some(e),
            IngestError::Cancelled => None,
        }
    }
}

impl From<FetchError> for IngestError {
    fn from(e: FetchError) -> Self {
        IngestError::Fetch(e)
    }
}

impl From<ValidationError> for IngestError {
    fn from(e: ValidationError) -> Self {
        IngestError::Validation(e)
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        IngestError::Store(e)
    }
}
