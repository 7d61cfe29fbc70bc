use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::generation::{GenerationJob, JobState, NormalizedStatus, ProviderKind};

/// In-process job table shared between a submitting request and its background unit.
///
/// Every mutation replaces or merges a whole [`GenerationJob`] under the shard lock,
/// so readers never see a half-written record. Entries idle for longer than `ttl`
/// are evicted on the next insert.
#[derive(Debug)]
pub struct TaskStore {
    jobs: DashMap<String, GenerationJob>,
    ttl: Duration,
}

impl TaskStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            ttl,
        }
    }

    /// Register a fresh job as Pending/0%. Returns `false` if the id is already taken.
    pub fn create(&self, job_id: &str, provider: ProviderKind) -> bool {
        self.evict_expired();
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(GenerationJob::new(job_id, provider));
                true
            }
        }
    }

    /// Merge a status into an existing job and return the merged view.
    pub fn observe(&self, job_id: &str, status: &NormalizedStatus) -> Option<NormalizedStatus> {
        self.jobs.get_mut(job_id).map(|mut job| {
            job.observe(status);
            job.status()
        })
    }

    /// Merge a status into the job, registering it on first sight.
    ///
    /// An `Unknown` status for an id never seen before is returned as is and not stored.
    pub fn track(
        &self,
        job_id: &str,
        provider: ProviderKind,
        status: &NormalizedStatus,
    ) -> NormalizedStatus {
        if !self.jobs.contains_key(job_id) {
            if status.state == JobState::Unknown {
                return status.clone();
            }
            self.evict_expired();
        }
        let mut job = self
            .jobs
            .entry(job_id.to_string())
            .or_insert_with(|| GenerationJob::new(job_id, provider));
        job.observe(status);
        job.status()
    }

    pub fn fail(&self, job_id: &str, reason: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.fail(reason);
        }
    }

    pub fn status(&self, job_id: &str) -> Option<NormalizedStatus> {
        self.jobs.get(job_id).map(|job| job.status())
    }

    pub fn get(&self, job_id: &str) -> Option<GenerationJob> {
        self.jobs.get(job_id).map(|job| job.clone())
    }

    /// Drop entries with no activity within the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            let last_seen = job.last_polled_at.unwrap_or(job.created_at);
            (now - last_seen)
                .to_std()
                .map(|idle| idle < self.ttl)
                .unwrap_or(true)
        });
        before.saturating_sub(self.jobs.len())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
