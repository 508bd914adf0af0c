//! Shared fixtures

#![allow(dead_code)]

use mediacache::error::ApiError;
use mediacache::index::SourceIndex;
use mediacache::thumbnail::{ImageRenderer, Renderer, TransformSignature};
use mediacache::xstat::codec::{MemoryAttributeStore, DEFAULT_ATTRIBUTE};
use mediacache::IdentityResolver;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub fn memory_identities() -> IdentityResolver {
    IdentityResolver::with_store(Arc::new(MemoryAttributeStore::new()), DEFAULT_ATTRIBUTE)
}

pub fn memory_index() -> SourceIndex {
    SourceIndex::new(memory_identities())
}

/// Write a gradient PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 200])
    })
    .save(path)
    .unwrap();
}

/// Counts renders and delegates to the JPEG renderer
#[derive(Default)]
pub struct CountingRenderer {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
    inner: ImageRenderer,
}

impl CountingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Fail the first `n` renders.
    pub fn failing(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            delay: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for CountingRenderer {
    fn render(&self, source: &Path, signature: &TransformSignature) -> Result<Vec<u8>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ApiError::GenerationFailed("injected failure".to_string()));
        }
        self.inner.render(source, signature)
    }
}

/// Holds renders of one source until `open` is called
pub struct GatedRenderer {
    blocked: PathBuf,
    open: Mutex<bool>,
    cond: Condvar,
    entered: AtomicBool,
    inner: ImageRenderer,
}

impl GatedRenderer {
    pub fn new(blocked: PathBuf) -> Self {
        Self {
            blocked,
            open: Mutex::new(false),
            cond: Condvar::new(),
            entered: AtomicBool::new(false),
            inner: ImageRenderer::default(),
        }
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    /// Whether a render of the blocked source has started.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

impl Renderer for GatedRenderer {
    fn render(&self, source: &Path, signature: &TransformSignature) -> Result<Vec<u8>, ApiError> {
        if source == self.blocked {
            self.entered.store(true, Ordering::SeqCst);
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cond.wait(open).unwrap();
            }
        }
        self.inner.render(source, signature)
    }
}

/// Poll `condition` for up to five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
