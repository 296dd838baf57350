use crate::ingest::run::IngestReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages: Option<u32>,
    pub fetched: Option<u64>,
    pub inserted: Option<u64>,
    pub error: Option<String>,
}

/// In-process registry that makes fire-and-forget ingestion observable:
/// submit hands out an id, the run reports its transitions, callers poll
/// by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, IngestJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self) -> Uuid {
        let id = Uuid::new_v4();
        let job = IngestJob {
            id,
            state: JobState::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            pages: None,
            fetched: None,
            inserted: None,
            error: None,
        };
        self.lock().insert(id, job);
        id
    }

    pub fn start(&self, id: Uuid) {
        if let Some(job) = self.lock().get_mut(&id) {
            job.state = JobState::Running;
            job.started_at = Some(Utc::now());
        }
    }

    pub fn succeed(&self, id: Uuid, report: IngestReport) {
        if let Some(job) = self.lock().get_mut(&id) {
            job.state = JobState::Succeeded;
            job.finished_at = Some(Utc::now());
            job.pages = Some(report.pages);
            job.fetched = Some(report.fetched);
            job.inserted = Some(report.inserted);
        }
    }

    pub fn fail(&self, id: Uuid, error: String) {
        if let Some(job) = self.lock().get_mut(&id) {
            job.state = JobState::Failed;
            job.finished_at = Some(Utc::now());
            job.error = Some(error);
        }
    }

    pub fn get(&self, id: Uuid) -> Option<IngestJob> {
        self.lock().get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, IngestJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
