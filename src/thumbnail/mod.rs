//! Thumbnails
//!
//! Request entry point over the content-addressed store and the generation
//! queue. A request resolves to a path on disk: straight from the store on a
//! hit, otherwise after the single job for its cache key completes.

pub mod queue;
pub mod render;
pub mod signature;
pub mod store;

pub use queue::{GenerationConfig, GenerationJob, GenerationQueue, QueueStats};
pub use render::{ImageRenderer, Renderer};
pub use signature::{Modifier, Priority, ThumbnailRequest, TransformSignature};
pub use store::{CachedArtifact, ThumbnailStore};

use crate::config::MediaConfig;
use crate::error::ApiError;
use crate::index::SourceResolver;
use crate::types::ContentHash;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Thumbnail service handle. Clones share one queue and store.
#[derive(Clone)]
pub struct Thumbnailer {
    store: ThumbnailStore,
    queue: Arc<GenerationQueue>,
    max_dimension: u32,
}

impl Thumbnailer {
    pub fn new(
        store: ThumbnailStore,
        resolver: Arc<dyn SourceResolver>,
        renderer: Arc<dyn Renderer>,
        config: GenerationConfig,
    ) -> Self {
        let max_dimension = config.max_dimension;
        Self {
            queue: Arc::new(GenerationQueue::new(
                store.clone(),
                resolver,
                renderer,
                config,
            )),
            store,
            max_dimension,
        }
    }

    /// Build a thumbnailer with the JPEG renderer and the configured store.
    pub fn from_config(
        config: &MediaConfig,
        resolver: Arc<dyn SourceResolver>,
    ) -> Result<Self, ApiError> {
        let root = config.storage.resolve_thumbnail_dir()?;
        Ok(Self::new(
            ThumbnailStore::new(root),
            resolver,
            Arc::new(ImageRenderer::new(config.generation.jpeg_quality)),
            config.generation.clone(),
        ))
    }

    /// Start the queued workers. Until then, and after `stop`, queued misses
    /// fail with `GenerationFailed`; instant misses still generate.
    pub fn start(&self) -> Result<(), ApiError> {
        self.queue.start()
    }

    pub async fn stop(&self) -> Result<(), ApiError> {
        self.queue.stop().await
    }

    pub fn store(&self) -> &ThumbnailStore {
        &self.store
    }

    pub fn queue(&self) -> &GenerationQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Resolve a thumbnail for `content_hash` (hex) and a query such as
    /// `width=100&height=100&modifier=caret&instant=true`, already split into
    /// pairs.
    pub async fn request<I, K, V>(&self, content_hash: &str, query: I) -> Result<PathBuf, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let content = ContentHash::from_hex(content_hash)?;
        let request = ThumbnailRequest::parse(query, self.max_dimension)?;
        self.request_parsed(content, request).await
    }

    /// Resolve an already-parsed request.
    pub async fn request_parsed(
        &self,
        content: ContentHash,
        request: ThumbnailRequest,
    ) -> Result<PathBuf, ApiError> {
        let key = request.signature.cache_key(&content);
        if let Some(path) = self.store.lookup(&key).await? {
            debug!(key = %key, "Thumbnail cache hit");
            return Ok(path);
        }

        let job = GenerationJob::new(content, request.signature);
        match self.queue.admit(job, request.priority).await {
            Ok(result) => result.map(|artifact| artifact.disk_path),
            Err(_) => Err(ApiError::GenerationFailed(
                "generation job dropped before completion".to_string(),
            )),
        }
    }

    /// Callback form of `request`. The callback always runs on a spawned
    /// task, never inside this call, even for a cache hit or a bad query.
    pub fn request_with<F>(&self, content_hash: String, query: Vec<(String, String)>, callback: F)
    where
        F: FnOnce(Result<PathBuf, ApiError>) + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.request(&content_hash, query).await;
            callback(result);
        });
    }

    /// Queue generation of `signature` for `content` without waiting for it.
    pub fn precompute(&self, content: ContentHash, signature: TransformSignature) {
        let this = self.clone();
        tokio::spawn(async move {
            let request = ThumbnailRequest {
                signature,
                priority: Priority::Queued,
            };
            if let Err(e) = this.request_parsed(content, request).await {
                debug!(content = %content, signature = %signature, error = %e, "Precompute failed");
            }
        });
    }
}
