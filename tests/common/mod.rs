//! Shared fixtures: a decoder that records and can block or fail its calls, and an
//! uploader that hands out numbered handles and tracks which ones are alive.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::UVec2;
use parking_lot::Mutex;

use texturette::{
    CacheKey, Config, DecodeError, Decoder, Error, PixelFormat, Pixels, Source, Texture,
    TextureCache, UploadError, Uploader,
};

pub type Cache = TextureCache<MockUploader>;
pub type Outcome = (usize, CacheKey, Result<Texture<u64>, Error>);
pub type Seen = Rc<RefCell<Vec<Outcome>>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A 2x2 opaque white image.
pub fn white_pixels() -> Pixels {
    Pixels::new(vec![0xff; 16], UVec2::new(2, 2), PixelFormat::Rgba8Srgb).unwrap()
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Default)]
pub struct CountingDecoder {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    gate: Option<flume::Receiver<()>>,
}

impl CountingDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A decoder whose calls block until a `()` is sent (or the sender is dropped).
    pub fn gated() -> (Arc<Self>, flume::Sender<()>) {
        let (tx, rx) = flume::unbounded();
        let decoder = Self {
            gate: Some(rx),
            ..Default::default()
        };
        (Arc::new(decoder), tx)
    }

    pub fn fail(&self, path: &str) {
        self.failing.lock().insert(path.to_string());
    }

    pub fn succeed(&self, path: &str) {
        self.failing.lock().remove(path);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|p| *p == path).count()
    }
}

/// A panic payload that panics again when dropped, which takes the worker thread down.
struct ExplodingPayload;

impl Drop for ExplodingPayload {
    fn drop(&mut self) {
        panic!("panic payload dropped");
    }
}

impl Decoder for CountingDecoder {
    fn decode(&self, source: &Source) -> Result<Pixels, DecodeError> {
        let name = match source {
            Source::Path { path, .. } => path.to_string_lossy().into_owned(),
            Source::Encoded { bytes, .. } => format!("<{} bytes>", bytes.len()),
        };
        self.calls.lock().push(name.clone());

        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if name.contains("crash") {
            std::panic::panic_any(ExplodingPayload);
        }
        if name.contains("panic") {
            panic!("decoder exploded on {name}");
        }
        if self.failing.lock().contains(&name) {
            return Err(DecodeError::Malformed(format!("{name} is corrupt")));
        }
        Ok(white_pixels())
    }
}

// ============================================================================
// Uploader
// ============================================================================

/// Handles are unique across uploaders, like resources of different devices.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
pub struct GpuLog {
    pub uploads: Vec<CacheKey>,
    pub destroyed: Vec<u64>,
    pub live: HashSet<u64>,
    pub rejected: HashSet<CacheKey>,
}

/// Clones share one [`GpuLog`], so a test can keep watching after the cache took its copy.
#[derive(Clone, Default)]
pub struct MockUploader(pub Rc<RefCell<GpuLog>>);

impl MockUploader {
    pub fn uploads(&self) -> usize {
        self.0.borrow().uploads.len()
    }

    pub fn uploads_of(&self, key: &str) -> usize {
        let key = CacheKey::path(key);
        self.0.borrow().uploads.iter().filter(|k| **k == key).count()
    }

    pub fn live(&self) -> usize {
        self.0.borrow().live.len()
    }

    pub fn is_live(&self, handle: u64) -> bool {
        self.0.borrow().live.contains(&handle)
    }

    pub fn is_destroyed(&self, handle: u64) -> bool {
        self.0.borrow().destroyed.contains(&handle)
    }

    pub fn reject(&self, key: &str) {
        self.0.borrow_mut().rejected.insert(CacheKey::path(key));
    }

    pub fn accept(&self, key: &str) {
        self.0.borrow_mut().rejected.remove(&CacheKey::path(key));
    }
}

impl Uploader for MockUploader {
    type Handle = u64;

    fn upload(&mut self, key: &CacheKey, pixels: &Pixels) -> Result<u64, UploadError> {
        let mut log = self.0.borrow_mut();
        if log.rejected.contains(key) {
            return Err(UploadError::Rejected(format!("{key} refused")));
        }
        if pixels.size().x == 0 || pixels.size().y == 0 {
            return Err(UploadError::Empty);
        }
        let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        log.uploads.push(key.clone());
        log.live.insert(handle);
        Ok(handle)
    }

    fn destroy(&mut self, handle: u64) {
        let mut log = self.0.borrow_mut();
        assert!(!log.destroyed.contains(&handle), "handle {handle} destroyed twice");
        log.live.remove(&handle);
        log.destroyed.push(handle);
    }
}

// ============================================================================
// Cache helpers
// ============================================================================

pub fn cache_with(config: Config, gpu: &MockUploader, decoder: &Arc<CountingDecoder>) -> Cache {
    init_logger();
    TextureCache::new(config, gpu.clone(), decoder.clone()).unwrap()
}

pub fn cache(gpu: &MockUploader, decoder: &Arc<CountingDecoder>) -> Cache {
    cache_with(Config::default().with_workers(2), gpu, decoder)
}

/// Drains until no decode is pending, failing the test after a few seconds.
pub fn drain_until_idle(cache: &mut Cache) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while cache.pending_count() > 0 {
        cache.drain();
        assert!(Instant::now() < deadline, "decodes did not finish in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub fn seen() -> Seen {
    Rc::new(RefCell::new(Vec::new()))
}

/// A callback that records its outcome in `seen`, tagged with `tag`.
pub fn record(
    seen: &Seen,
    tag: usize,
) -> impl FnOnce(Result<Texture<u64>, Error>, &CacheKey) + 'static {
    let seen = seen.clone();
    move |result, key| seen.borrow_mut().push((tag, key.clone(), result))
}
