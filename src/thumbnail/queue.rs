//! Thumbnail Generation Queue
//!
//! Single-flight generation with bounded concurrency. Every cache key has at
//! most one job in flight; later requests for the same key join its waiter list
//! and receive the same outcome, in arrival order. Queued jobs are served FIFO by
//! a fixed pool of workers. Instant jobs skip the FIFO and start on their own
//! permit pool, but still join an in-flight job when one exists.
//!
//! Jobs are never cancelled. A caller that stops waiting just drops its
//! receiver; the job still finishes and populates the cache.

use super::render::{Renderer, DEFAULT_JPEG_QUALITY};
use super::signature::{Priority, TransformSignature, DEFAULT_MAX_DIMENSION};
use super::store::{CachedArtifact, ThumbnailStore};
use crate::error::ApiError;
use crate::index::SourceResolver;
use crate::types::{CacheKey, ContentHash};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Outcome delivered to every waiter of a job
pub type GenerationResult = Result<CachedArtifact, ApiError>;

/// Configuration for the generation queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of worker tasks serving queued jobs
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum instant jobs rendering at once
    #[serde(default = "default_instant_concurrency")]
    pub instant_concurrency: usize,
    /// Upper bound for requested width and height
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// JPEG quality for rendered thumbnails (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_workers() -> usize {
    2
}

fn default_instant_concurrency() -> usize {
    4
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            instant_concurrency: default_instant_concurrency(),
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Queued jobs not yet picked up by a worker
    pub pending: usize,
    /// Jobs currently rendering
    pub processing: usize,
    /// Jobs that produced an artifact
    pub completed: usize,
    /// Jobs that ended in an error
    pub failed: usize,
}

/// One unit of generation work
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub key: CacheKey,
    pub content: ContentHash,
    pub signature: TransformSignature,
    pub created_at: Instant,
}

impl GenerationJob {
    pub fn new(content: ContentHash, signature: TransformSignature) -> Self {
        Self {
            key: signature.cache_key(&content),
            content,
            signature,
            created_at: Instant::now(),
        }
    }
}

type Waiter = oneshot::Sender<GenerationResult>;

/// State shared between the queue handle and its worker tasks
struct QueueState {
    /// key -> waiters of the job in flight for that key
    in_flight: Mutex<HashMap<CacheKey, Vec<Waiter>>>,
    /// FIFO of queued jobs
    pending: Mutex<VecDeque<GenerationJob>>,
    /// Wakes workers when a job is queued
    notify: Notify,
    instant_permits: Semaphore,
    running: RwLock<bool>,
    stats: RwLock<QueueStats>,
    store: ThumbnailStore,
    resolver: Arc<dyn SourceResolver>,
    renderer: Arc<dyn Renderer>,
}

fn queue_stopped() -> ApiError {
    ApiError::GenerationFailed("generation queue stopped".to_string())
}

/// Thumbnail generation queue
pub struct GenerationQueue {
    state: Arc<QueueState>,
    workers: RwLock<Vec<JoinHandle<()>>>,
    config: GenerationConfig,
}

impl GenerationQueue {
    pub fn new(
        store: ThumbnailStore,
        resolver: Arc<dyn SourceResolver>,
        renderer: Arc<dyn Renderer>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            state: Arc::new(QueueState {
                in_flight: Mutex::new(HashMap::new()),
                pending: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                instant_permits: Semaphore::new(config.instant_concurrency.max(1)),
                running: RwLock::new(false),
                stats: RwLock::new(QueueStats::default()),
                store,
                resolver,
                renderer,
            }),
            workers: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Admit a request for `job.key` and return a receiver for its outcome.
    ///
    /// If a job for the key is already in flight, the request joins it whatever
    /// its priority. Otherwise a new job is created: queued jobs go to the back
    /// of the FIFO, instant jobs are spawned immediately. A queued request made
    /// while the workers are not running fails at once with `GenerationFailed`.
    pub fn admit(
        &self,
        job: GenerationJob,
        priority: Priority,
    ) -> oneshot::Receiver<GenerationResult> {
        let (tx, rx) = oneshot::channel();

        {
            let mut in_flight = self.state.in_flight.lock();
            if let Some(waiters) = in_flight.get_mut(&job.key) {
                waiters.push(tx);
                debug!(
                    key = %job.key,
                    waiters = waiters.len(),
                    "Joined in-flight generation"
                );
                return rx;
            }

            // checked and pushed under the registry lock so `stop` cannot
            // strand a job between the two
            if priority == Priority::Queued {
                if !*self.state.running.read() {
                    debug!(key = %job.key, "Rejected queued job: workers not running");
                    self.state.stats.write().failed += 1;
                    let _ = tx.send(Err(queue_stopped()));
                    return rx;
                }
                in_flight.insert(job.key.clone(), vec![tx]);
                debug!(
                    key = %job.key,
                    content = %job.content,
                    signature = %job.signature,
                    "Queued generation job"
                );
                self.state.pending.lock().push_back(job);
                self.state.stats.write().pending += 1;
                self.state.notify.notify_one();
                return rx;
            }

            in_flight.insert(job.key.clone(), vec![tx]);
        }

        debug!(
            key = %job.key,
            content = %job.content,
            signature = %job.signature,
            "Starting instant generation job"
        );

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            match state.instant_permits.acquire().await {
                Ok(_permit) => Self::run_job(&state, job).await,
                Err(_) => Self::finish(
                    &state,
                    &job.key,
                    Err(ApiError::GenerationFailed(
                        "instant generation pool closed".to_string(),
                    )),
                ),
            }
        });

        rx
    }

    /// Start the queued-job workers
    pub fn start(&self) -> Result<(), ApiError> {
        let mut running = self.state.running.write();
        if *running {
            return Ok(());
        }
        *running = true;
        drop(running);

        let worker_count = self.config.workers.max(1);
        let mut workers = self.workers.write();
        for i in 0..worker_count {
            let state = Arc::clone(&self.state);
            workers.push(tokio::spawn(async move {
                Self::worker_loop(i, state).await;
            }));
        }

        info!(
            worker_count = workers.len(),
            "Started thumbnail generation workers"
        );
        Ok(())
    }

    /// Stop workers and fail any job that never left the FIFO.
    ///
    /// Running jobs finish first. Instant jobs already spawned are not affected.
    pub async fn stop(&self) -> Result<(), ApiError> {
        let was_running = {
            let _registry = self.state.in_flight.lock();
            let mut running = self.state.running.write();
            std::mem::replace(&mut *running, false)
        };

        let workers = std::mem::take(&mut *self.workers.write());
        for handle in workers {
            let _ = handle.await;
        }

        let abandoned = Self::abandon_pending(&self.state);
        if was_running {
            info!(abandoned, "Stopped thumbnail generation workers");
        }
        Ok(())
    }

    /// Fail every job left in the FIFO; returns how many there were.
    fn abandon_pending(state: &QueueState) -> usize {
        let abandoned: Vec<GenerationJob> = state.pending.lock().drain(..).collect();
        {
            let mut stats = state.stats.write();
            stats.pending = 0;
            stats.failed += abandoned.len();
        }
        for job in &abandoned {
            Self::finish(state, &job.key, Err(queue_stopped()));
        }
        abandoned.len()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        self.state.stats.read().clone()
    }

    /// Number of keys with a job in flight
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.lock().len()
    }

    /// Wait until no job is queued or in flight
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> Result<(), ApiError> {
        let start = Instant::now();
        loop {
            if self.in_flight() == 0 && self.state.pending.lock().is_empty() {
                return Ok(());
            }
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(ApiError::GenerationFailed(
                        "timeout waiting for generation queue to drain".to_string(),
                    ));
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    async fn worker_loop(worker_id: usize, state: Arc<QueueState>) {
        debug!(worker_id, "Worker started");

        while *state.running.read() {
            let job = state.pending.lock().pop_front();

            let job = match job {
                Some(job) => job,
                None => {
                    // wake on a new job, or periodically to notice shutdown
                    tokio::select! {
                        _ = state.notify.notified() => {}
                        _ = sleep(Duration::from_millis(100)) => {}
                    }
                    continue;
                }
            };

            {
                let mut stats = state.stats.write();
                stats.pending = stats.pending.saturating_sub(1);
            }

            debug!(
                worker_id,
                key = %job.key,
                queued_ms = job.created_at.elapsed().as_millis() as u64,
                "Processing generation job"
            );
            Self::run_job(&state, job).await;
        }

        debug!(worker_id, "Worker stopped");
    }

    async fn run_job(state: &Arc<QueueState>, job: GenerationJob) {
        state.stats.write().processing += 1;
        let start = Instant::now();

        let result = Self::generate(state, &job).await;

        {
            let mut stats = state.stats.write();
            stats.processing = stats.processing.saturating_sub(1);
            match &result {
                Ok(_) => stats.completed += 1,
                Err(_) => stats.failed += 1,
            }
        }

        if let Ok(artifact) = &result {
            info!(
                key = %job.key,
                path = %artifact.disk_path.display(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Thumbnail generated"
            );
        }

        Self::finish(state, &job.key, result);
    }

    /// Resolve, render and store. The artifact is on disk before any waiter
    /// is notified.
    async fn generate(state: &Arc<QueueState>, job: &GenerationJob) -> GenerationResult {
        let store = state.store.clone();
        let key = job.key.clone();
        let signature = job.signature;
        let content = job.content;
        let resolver = Arc::clone(&state.resolver);
        let renderer = Arc::clone(&state.renderer);

        tokio::task::spawn_blocking(move || -> GenerationResult {
            // a job admitted just after a previous one finished finds its artifact
            if let Some(existing) = store.get(&key)? {
                return Ok(existing);
            }
            let source = resolver
                .resolve(&content)
                .ok_or_else(|| ApiError::SourceNotFound(content.to_hex()))?;
            let bytes = renderer.render(&source, &signature)?;
            Ok(store.store(&key, &bytes)?)
        })
        .await
        .map_err(|e| ApiError::GenerationFailed(format!("render task aborted: {}", e)))?
    }

    /// Retire the key and hand `result` to its waiters in arrival order.
    fn finish(state: &QueueState, key: &CacheKey, result: GenerationResult) {
        let waiters = state.in_flight.lock().remove(key).unwrap_or_default();
        for waiter in waiters {
            // receiver may have lost interest
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for GenerationQueue {
    fn drop(&mut self) {
        {
            let _registry = self.state.in_flight.lock();
            *self.state.running.write() = false;
        }
        self.state.notify.notify_waiters();
        let abandoned = Self::abandon_pending(&self.state);
        if abandoned > 0 {
            debug!(abandoned, "Dropped generation queue with queued jobs");
        }
    }
}
