use super::support::{eventually, memory_index, write_png, CountingRenderer, GatedRenderer};
use futures::future::join_all;
use mediacache::error::ApiError;
use mediacache::index::SourceIndex;
use mediacache::thumbnail::{
    GenerationConfig, ImageRenderer, Modifier, Renderer, ThumbnailStore, Thumbnailer,
    TransformSignature,
};
use mediacache::types::ContentHash;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    index: SourceIndex,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        std::fs::create_dir_all(root.join("media")).unwrap();
        Self {
            _temp: temp,
            root,
            index: memory_index(),
        }
    }

    /// Write and index a PNG; returns its path and content hash.
    fn source(&self, name: &str, width: u32, height: u32) -> (PathBuf, ContentHash) {
        let path = self.root.join("media").join(name);
        write_png(&path, width, height);
        let identity = self.index.index_file(&path).unwrap();
        (path, identity.hash.unwrap())
    }

    fn thumbnailer(&self, renderer: Arc<dyn Renderer>, config: GenerationConfig) -> Thumbnailer {
        let t = Thumbnailer::new(
            ThumbnailStore::new(self.root.join("thumbs")),
            Arc::new(self.index.clone()),
            renderer,
            config,
        );
        t.start().unwrap();
        t
    }
}

fn query(width: u32, height: u32, extra: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut pairs = vec![
        ("width".to_string(), width.to_string()),
        ("height".to_string(), height.to_string()),
    ];
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    pairs
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_requests_generate_once() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 320, 240);
    let renderer = Arc::new(CountingRenderer::with_delay(Duration::from_millis(200)));
    let t = fixture.thumbnailer(renderer.clone(), GenerationConfig::default());
    let hex = content.to_hex();

    let requests = (0..16).map(|i| {
        let t = t.clone();
        let hex = hex.clone();
        // mix admission modes; they still share one job
        let extra: &[(&str, &str)] = if i % 2 == 0 { &[] } else { &[("instant", "true")] };
        let q = query(100, 100, extra);
        async move { t.request(&hex, q).await }
    });
    let results = join_all(requests).await;

    let paths: Vec<PathBuf> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(paths.iter().all(|p| p == &paths[0]));
    assert_eq!(renderer.calls(), 1);
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cache_hit_after_completion() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 64, 64);
    let renderer = Arc::new(CountingRenderer::new());
    let t = fixture.thumbnailer(renderer.clone(), GenerationConfig::default());
    let hex = content.to_hex();

    let first = t.request(&hex, query(32, 32, &[])).await.unwrap();
    assert_eq!(renderer.calls(), 1);

    // same signature spelled differently
    let reordered = vec![
        ("modifier".to_string(), "fit".to_string()),
        ("height".to_string(), "32".to_string()),
        ("width".to_string(), "32".to_string()),
        ("instant".to_string(), "true".to_string()),
    ];
    let second = t.request(&hex, reordered).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(renderer.calls(), 1);

    // a different signature is a different artifact
    let caret = t
        .request(&hex, query(32, 32, &[("modifier", "caret")]))
        .await
        .unwrap();
    assert_ne!(first, caret);
    assert_eq!(renderer.calls(), 2);
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instant_bypasses_blocked_queue() {
    let fixture = Fixture::new();
    let (slow_path, slow) = fixture.source("slow.png", 64, 64);
    let (_, fast) = fixture.source("fast.png", 65, 65);
    let (_, waiting) = fixture.source("waiting.png", 66, 66);

    let renderer = Arc::new(GatedRenderer::new(slow_path));
    let config = GenerationConfig {
        workers: 1,
        ..GenerationConfig::default()
    };
    let t = fixture.thumbnailer(renderer.clone(), config);

    let blocked = {
        let t = t.clone();
        let hex = slow.to_hex();
        tokio::spawn(async move { t.request(&hex, query(16, 16, &[])).await })
    };
    assert!(eventually(|| renderer.entered()).await);

    let behind = {
        let t = t.clone();
        let hex = waiting.to_hex();
        tokio::spawn(async move { t.request(&hex, query(16, 16, &[])).await })
    };

    let instant = tokio::time::timeout(
        Duration::from_secs(5),
        t.request(&fast.to_hex(), query(16, 16, &[("instant", "true")])),
    )
    .await
    .expect("instant request waited behind the queue");
    assert!(instant.is_ok());

    // the only worker is still held, so the queued job cannot have run
    assert!(!blocked.is_finished());
    assert!(!behind.is_finished());

    renderer.open();
    assert!(blocked.await.unwrap().is_ok());
    assert!(behind.await.unwrap().is_ok());
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_delivered_to_all_waiters_then_retry() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 40, 40);
    let renderer = Arc::new(CountingRenderer::failing(1));
    let t = fixture.thumbnailer(renderer.clone(), GenerationConfig::default());
    let hex = content.to_hex();

    let results = join_all((0..4).map(|_| {
        let t = t.clone();
        let hex = hex.clone();
        async move { t.request(&hex, query(20, 20, &[])).await }
    }))
    .await;
    assert_eq!(renderer.calls(), 1);
    for result in results {
        assert!(matches!(result, Err(ApiError::GenerationFailed(_))));
    }
    assert_eq!(t.queue().in_flight(), 0);

    // no negative caching: the next request starts a new job
    let path = t.request(&hex, query(20, 20, &[])).await.unwrap();
    assert!(path.exists());
    assert_eq!(renderer.calls(), 2);
    let stats = t.stats();
    assert_eq!((stats.completed, stats.failed), (1, 1));
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rendered_dimensions() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("wide.png", 200, 100);
    let t = fixture.thumbnailer(Arc::new(ImageRenderer::default()), GenerationConfig::default());
    let hex = content.to_hex();

    let fit = t.request(&hex, query(50, 50, &[])).await.unwrap();
    let caret = t
        .request(&hex, query(50, 50, &[("modifier", "caret"), ("instant", "true")]))
        .await
        .unwrap();

    let fit = image::open(&fit).unwrap();
    let caret = image::open(&caret).unwrap();
    assert_eq!((fit.width(), fit.height()), (50, 25));
    assert_eq!((caret.width(), caret.height()), (50, 50));
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unindexed_content_is_not_found() {
    let fixture = Fixture::new();
    let t = fixture.thumbnailer(Arc::new(CountingRenderer::new()), GenerationConfig::default());

    let err = t
        .request(&ContentHash([7u8; 32]).to_hex(), query(10, 10, &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::SourceNotFound(_)));
    assert!(err.is_not_found());
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dimension_bound_from_config() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 10, 10);
    let config = GenerationConfig {
        max_dimension: 64,
        ..GenerationConfig::default()
    };
    let t = fixture.thumbnailer(Arc::new(CountingRenderer::new()), config);

    let err = t
        .request(&content.to_hex(), query(65, 10, &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidQuery(_)));
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_with_callback() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 30, 30);
    let t = fixture.thumbnailer(Arc::new(ImageRenderer::default()), GenerationConfig::default());
    let (tx, rx) = tokio::sync::oneshot::channel();

    t.request_with(content.to_hex(), query(10, 10, &[]), move |result| {
        let _ = tx.send(result);
    });
    let path = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(path.starts_with(t.store().root()));
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_precompute_then_request_hits_cache() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 30, 30);
    let renderer = Arc::new(CountingRenderer::new());
    let t = fixture.thumbnailer(renderer.clone(), GenerationConfig::default());
    let signature = TransformSignature::new(12, 12, Modifier::Fit);

    t.precompute(content, signature);
    let key = signature.cache_key(&content);
    let store = t.store().clone();
    assert!(eventually(|| store.get(&key).unwrap().is_some()).await);

    t.request(&content.to_hex(), query(12, 12, &[])).await.unwrap();
    assert_eq!(renderer.calls(), 1);
    t.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stopped_queue_does_not_strand_requests() {
    let fixture = Fixture::new();
    let (_, content) = fixture.source("a.png", 30, 30);
    let renderer = Arc::new(CountingRenderer::new());
    let t = fixture.thumbnailer(renderer.clone(), GenerationConfig::default());
    t.stop().await.unwrap();
    let hex = content.to_hex();

    let queued = {
        let t = t.clone();
        let hex = hex.clone();
        tokio::spawn(async move { t.request(&hex, query(10, 10, &[])).await })
    };
    let queued = tokio::time::timeout(Duration::from_secs(2), queued)
        .await
        .expect("queued request never resolved")
        .unwrap();
    assert!(matches!(queued, Err(ApiError::GenerationFailed(_))));
    assert_eq!(t.queue().in_flight(), 0);

    let instant = tokio::time::timeout(
        Duration::from_secs(2),
        t.request(&hex, query(10, 10, &[("instant", "true")])),
    )
    .await
    .expect("instant request waited on a stopped queue");
    assert!(instant.unwrap().exists());
    assert_eq!(renderer.calls(), 1);
}
