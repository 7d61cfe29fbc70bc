//! In-memory doubles for the persistence, storage and provider seams

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Barrier;

use photo_ia_backend::db::{PhotoRepository, RepoError};
use photo_ia_backend::models::generation::{
    GenerationOptions, JobState, NormalizedStatus, ProviderKind,
};
use photo_ia_backend::models::photo::{NewPhoto, PhotoRecord, PhotoUpdate};
use photo_ia_backend::services::job_monitor::JobMonitor;
use photo_ia_backend::services::name_allocator::NameAllocator;
use photo_ia_backend::services::photo_service::PhotoService;
use photo_ia_backend::services::post_processor::FrameSet;
use photo_ia_backend::services::providers::{GenerationProvider, ProviderError};
use photo_ia_backend::services::storage::{ObjectStorage, StorageError};

/// Photo table in a mutex, with the same unique-name rule as Postgres.
#[derive(Default)]
pub struct InMemoryPhotoRepository {
    rows: Mutex<Vec<PhotoRecord>>,
    next_id: AtomicU32,
    stale_reads: Option<StaleReads>,
}

/// Holds the first `remaining` name reads at a barrier after they took their
/// snapshot, so every one of them computes from the same stale view.
struct StaleReads {
    barrier: Arc<Barrier>,
    remaining: AtomicUsize,
}

impl InMemoryPhotoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_reads(parties: usize) -> Self {
        Self {
            stale_reads: Some(StaleReads {
                barrier: Arc::new(Barrier::new(parties)),
                remaining: AtomicUsize::new(parties),
            }),
            ..Self::default()
        }
    }

    /// Insert a row directly, bypassing allocation.
    pub fn seed(&self, name: &str) -> PhotoRecord {
        let record = self.build(NewPhoto {
            name: name.to_string(),
            quantity: 0,
            original_url: None,
        });
        self.rows.lock().unwrap().push(record.clone());
        record
    }

    pub fn all(&self) -> Vec<PhotoRecord> {
        self.rows.lock().unwrap().clone()
    }

    fn build(&self, photo: NewPhoto) -> PhotoRecord {
        let now = Utc::now();
        PhotoRecord {
            id: i64::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            name: photo.name,
            original_url: photo.original_url,
            generated_url: None,
            quantity: photo.quantity,
            printed: false,
            gender: None,
            theme: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl PhotoRepository for InMemoryPhotoRepository {
    async fn list_all_names(&self) -> Result<Vec<String>, RepoError> {
        let names: Vec<String> = self.rows.lock().unwrap().iter().map(|r| r.name.clone()).collect();

        if let Some(stale) = &self.stale_reads {
            let held = stale
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if held {
                stale.barrier.wait().await;
            }
        }
        Ok(names)
    }

    async fn insert_photo(&self, photo: NewPhoto) -> Result<PhotoRecord, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.name == photo.name) {
            return Err(RepoError::UniqueViolation(photo.name));
        }
        let record = self.build(photo);
        rows.push(record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<PhotoRecord>, RepoError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.name == name).cloned())
    }

    async fn update_fields(
        &self,
        id: i64,
        update: PhotoUpdate,
    ) -> Result<Option<PhotoRecord>, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(q) = update.quantity {
            row.quantity = q;
        }
        if let Some(p) = update.printed {
            row.printed = p;
        }
        if let Some(url) = update.generated_url {
            row.generated_url = Some(url);
        }
        if let Some(g) = update.gender {
            row.gender = Some(g);
        }
        if let Some(t) = update.theme {
            row.theme = Some(t);
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }
}

/// Objects keyed by URL. Anything the tests want to "download" is seeded by URL.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl InMemoryStorage {
    pub const BASE: &'static str = "https://storage.test/bucket";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, url: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), (data, "image/png".to_string()));
    }

    pub fn object(&self, url: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(url).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.object(&self.public_url(key)).is_some()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", Self::BASE, key)
    }

    async fn put(&self, data: &[u8], key: &str, content_type: &str) -> Result<String, StorageError> {
        let url = self.public_url(key);
        self.objects
            .lock()
            .unwrap()
            .insert(url.clone(), (data.to_vec(), content_type.to_string()));
        Ok(url)
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        self.object(url)
            .map(|(data, _)| data)
            .ok_or_else(|| StorageError::Config(format!("no object at {url}")))
    }
}

/// Replays scripted statuses (the last one repeats) and scripted submit results.
pub struct ScriptedProvider {
    statuses: Mutex<VecDeque<NormalizedStatus>>,
    submits: Mutex<VecDeque<Result<String, ProviderError>>>,
    pub polls: AtomicU32,
    pub submitted: Mutex<Vec<(String, GenerationOptions)>>,
}

impl ScriptedProvider {
    pub fn new(statuses: Vec<NormalizedStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            submits: Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_submits(self, results: Vec<Result<String, ProviderError>>) -> Self {
        *self.submits.lock().unwrap() = results.into();
        self
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apiframe
    }

    async fn submit(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ProviderError> {
        self.submitted
            .lock()
            .unwrap()
            .push((prompt.to_string(), options.clone()));
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("job-1".to_string()))
    }

    async fn poll(&self, _job_id: &str) -> NormalizedStatus {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.statuses.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_else(NormalizedStatus::unknown)
        }
    }
}

pub fn status(state: JobState, percentage: Option<u8>, urls: &[&str]) -> NormalizedStatus {
    NormalizedStatus::new(state, percentage, urls.iter().map(|u| u.to_string()).collect())
}

/// Monitor with millisecond pacing.
pub fn fast_monitor(max_attempts: u32) -> JobMonitor {
    JobMonitor::new(max_attempts, Duration::from_millis(1))
        .with_submit_retries(2, Duration::from_millis(1))
}

/// Everything a [`PhotoService`] test needs to inspect afterwards.
pub struct Harness {
    pub service: PhotoService,
    pub repo: Arc<InMemoryPhotoRepository>,
    pub storage: Arc<InMemoryStorage>,
    pub provider: Arc<ScriptedProvider>,
}

pub fn harness(
    repo: InMemoryPhotoRepository,
    provider: ScriptedProvider,
    frames: FrameSet,
    max_attempts: u32,
) -> Harness {
    harness_with_prefix(repo, provider, frames, max_attempts, "photo")
}

pub fn harness_with_prefix(
    repo: InMemoryPhotoRepository,
    provider: ScriptedProvider,
    frames: FrameSet,
    max_attempts: u32,
    prefix: &str,
) -> Harness {
    let repo = Arc::new(repo);
    let storage = Arc::new(InMemoryStorage::new());
    let provider = Arc::new(provider);
    let service = PhotoService::new(
        repo.clone(),
        storage.clone(),
        provider.clone(),
        fast_monitor(max_attempts),
        frames,
        NameAllocator::new(prefix),
    );
    Harness {
        service,
        repo,
        storage,
        provider,
    }
}
