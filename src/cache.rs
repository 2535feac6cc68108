//! The texture cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::Config;
use crate::decode::{Decoder, Source};
use crate::error::{DecodeError, Error, RecreationError};
use crate::key::CacheKey;
use crate::pixels::Pixels;
use crate::recipe::{Producers, Recipe};
use crate::texture::Texture;
use crate::upload::Uploader;
use crate::worker::{Completed, WorkerPool};

#[cfg(feature = "text")]
use crate::text::{CosmicRasterizer, Rasterizer, TextDesc};

/// References the cache holds on every entry itself.
const BASELINE: u32 = 1;

/// Receives the outcome of an asynchronous load on the GPU thread.
pub type Callback<H> = Box<dyn FnOnce(Result<Texture<H>, Error>, &CacheKey)>;

struct Entry<H> {
    texture: Texture<H>,
    recipe: Recipe,
    refs: u32,
}

/// What happened to an asynchronous request.
enum Submission {
    Started,
    DuplicateInFlight,
    Rejected,
}

/// A snapshot of what the cache holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Resident textures.
    pub textures: usize,
    /// Keys with a decode in flight.
    pub pending: usize,
    /// Outstanding holder references across all textures.
    pub holders: u64,
    /// Pixel data held on the GPU, in bytes.
    pub bytes: usize,
}

/// Caches GPU textures by key.
///
/// The cache belongs to the thread that owns the GPU context: every method that uploads or
/// destroys textures, and every callback, runs there. Only decoding happens elsewhere, on
/// the cache's worker threads. Other threads can share the [`Texture`]s it hands out.
///
/// Textures stay cached until they are evicted explicitly, either with
/// [`TextureCache::evict`] or by [`TextureCache::evict_unused`] once every holder has
/// called [`TextureCache::release`].
pub struct TextureCache<U: Uploader> {
    config: Config,
    uploader: U,
    producers: Producers,
    entries: IndexMap<CacheKey, Entry<U::Handle>>,
    pending: HashMap<CacheKey, Vec<Callback<U::Handle>>>,
    pool: Option<WorkerPool>,
}

impl<U: Uploader> TextureCache<U> {
    /// Creates a cache and starts its decode workers.
    pub fn new(config: Config, uploader: U, decoder: Arc<dyn Decoder>) -> Result<Self, Error> {
        let pool = WorkerPool::spawn(&config, decoder.clone())?;
        Ok(Self {
            config,
            uploader,
            producers: Producers {
                decoder,
                #[cfg(feature = "text")]
                rasterizer: Box::new(CosmicRasterizer::new()),
            },
            entries: IndexMap::new(),
            pending: HashMap::new(),
            pool: Some(pool),
        })
    }

    /// Loads the image at the path `key` names, or returns the cached texture.
    ///
    /// Decoding and uploading happen on the calling thread. If an asynchronous load of `key`
    /// is already running, this waits for it instead of decoding a second time.
    pub fn get_or_load(&mut self, key: impl Into<CacheKey>) -> Result<Texture<U::Handle>, Error> {
        let key: CacheKey = key.into();
        let source = self.source_for(&key);
        self.get_or_load_from(key, source)
    }

    /// Like [`TextureCache::get_or_load`], decoding `source` on a miss.
    pub fn get_or_load_from(
        &mut self,
        key: impl Into<CacheKey>,
        source: Source,
    ) -> Result<Texture<U::Handle>, Error> {
        let key: CacheKey = key.into();
        if let Some(texture) = self.acquire(&key) {
            return Ok(texture);
        }

        if self.pending.contains_key(&key) {
            log::debug!("{key} is already loading, waiting for it");
            return self.finish_pending(&key);
        }

        let pixels = self
            .producers
            .decoder
            .decode(&source)
            .inspect_err(|e| log::warn!("failed to decode {key}: {e}"))?;
        self.install(key, &pixels, Recipe::Decode(source), 1)
    }

    /// Loads the image at the path `key` names in the background.
    ///
    /// If the texture is cached, `callback` runs right away. Otherwise it runs from a later
    /// [`TextureCache::drain`]. Concurrent requests for the same key share one decode and
    /// their callbacks run in the order they were made.
    pub fn get_or_load_async(
        &mut self,
        key: impl Into<CacheKey>,
        callback: impl FnOnce(Result<Texture<U::Handle>, Error>, &CacheKey) + 'static,
    ) {
        let key: CacheKey = key.into();
        let source = self.source_for(&key);
        self.get_or_load_from_async(key, source, callback);
    }

    /// Like [`TextureCache::get_or_load_async`], decoding `source` on a miss.
    pub fn get_or_load_from_async(
        &mut self,
        key: impl Into<CacheKey>,
        source: Source,
        callback: impl FnOnce(Result<Texture<U::Handle>, Error>, &CacheKey) + 'static,
    ) {
        let key: CacheKey = key.into();
        if let Some(texture) = self.acquire(&key) {
            callback(Ok(texture), &key);
            return;
        }

        match self.submit(key.clone(), source, Box::new(callback)) {
            Submission::Started => log::debug!("queued {key}"),
            Submission::DuplicateInFlight => log::debug!("coalesced request for {key}"),
            Submission::Rejected => {}
        }
    }

    /// Caches an already decoded image.
    ///
    /// The pixels are kept so the texture can be recreated. If `key` is already cached, the
    /// cached texture is returned and `pixels` is ignored.
    pub fn add_pixels(
        &mut self,
        key: impl Into<CacheKey>,
        pixels: Pixels,
    ) -> Result<Texture<U::Handle>, Error> {
        let key: CacheKey = key.into();
        if let Some(texture) = self.acquire(&key) {
            return Ok(texture);
        }
        self.install(key, &pixels, Recipe::Pixels(pixels.clone()), 1)
    }

    /// Renders text into a texture and caches it.
    ///
    /// The default rasterizer starts without fonts; install one with fonts through
    /// [`TextureCache::set_rasterizer`].
    #[cfg(feature = "text")]
    pub fn add_text(
        &mut self,
        key: impl Into<CacheKey>,
        desc: TextDesc,
    ) -> Result<Texture<U::Handle>, Error> {
        let key: CacheKey = key.into();
        if let Some(texture) = self.acquire(&key) {
            return Ok(texture);
        }
        let pixels = self
            .producers
            .rasterizer
            .rasterize(&desc)
            .inspect_err(|e| log::warn!("failed to render {key}: {e}"))?;
        self.install(key, &pixels, Recipe::Text(desc), 1)
    }

    /// Replaces the rasterizer used for text textures.
    #[cfg(feature = "text")]
    pub fn set_rasterizer(&mut self, rasterizer: impl Rasterizer + 'static) {
        self.producers.rasterizer = Box::new(rasterizer);
    }

    /// Returns the cached texture for `key` without taking a reference.
    pub fn lookup(&self, key: impl Into<CacheKey>) -> Option<Texture<U::Handle>> {
        let key: CacheKey = key.into();
        self.entries.get(&key).map(|entry| entry.texture.clone())
    }

    pub fn contains(&self, key: impl Into<CacheKey>) -> bool {
        let key: CacheKey = key.into();
        self.entries.contains_key(&key)
    }

    /// Whether a background decode of `key` is in flight.
    pub fn is_pending(&self, key: impl Into<CacheKey>) -> bool {
        let key: CacheKey = key.into();
        self.pending.contains_key(&key)
    }

    /// The recipe `key` would be recreated from.
    pub fn recipe(&self, key: impl Into<CacheKey>) -> Option<&Recipe> {
        let key: CacheKey = key.into();
        self.entries.get(&key).map(|entry| &entry.recipe)
    }

    /// Reference count of `key`, including the cache's own reference.
    pub fn ref_count(&self, key: impl Into<CacheKey>) -> Option<u32> {
        let key: CacheKey = key.into();
        self.entries.get(&key).map(|entry| entry.refs)
    }

    /// Number of callers holding `key`.
    pub fn holders(&self, key: impl Into<CacheKey>) -> Option<u32> {
        self.ref_count(key).map(|refs| refs - BASELINE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Keys of all cached textures, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.keys()
    }

    /// Drops one holder reference to `key`.
    ///
    /// The texture stays cached until it is evicted.
    pub fn release(&mut self, key: impl Into<CacheKey>) {
        let key: CacheKey = key.into();
        match self.entries.get_mut(&key) {
            Some(entry) if entry.refs > BASELINE => entry.refs -= 1,
            Some(_) => log::warn!("released {key}, which has no holders"),
            None => log::debug!("released {key}, which is not cached"),
        }
    }

    /// Evicts every texture nobody holds. Returns how many were evicted.
    pub fn evict_unused(&mut self) -> usize {
        let before = self.entries.len();
        let uploader = &mut self.uploader;
        self.entries.retain(|key, entry| {
            if entry.refs > BASELINE {
                return true;
            }
            retire(uploader, key, entry);
            false
        });
        before - self.entries.len()
    }

    /// Evicts `key` whether or not it is held. Returns whether it was cached.
    pub fn evict(&mut self, key: impl Into<CacheKey>) -> bool {
        let key: CacheKey = key.into();
        match self.entries.shift_remove(&key) {
            Some(entry) => {
                retire(&mut self.uploader, &key, &entry);
                true
            }
            None => false,
        }
    }

    /// Evicts `texture` whether or not it is held. Returns whether it was cached.
    pub fn evict_texture(&mut self, texture: &Texture<U::Handle>) -> bool {
        let cached = self
            .entries
            .get(texture.key())
            .is_some_and(|entry| entry.texture == *texture);
        cached && self.evict(texture.key())
    }

    /// Evicts every texture. Returns how many were evicted.
    pub fn evict_all(&mut self) -> usize {
        let count = self.entries.len();
        for (key, entry) in self.entries.drain(..) {
            retire(&mut self.uploader, &key, &entry);
        }
        count
    }

    /// Uploads finished background decodes and runs their callbacks.
    ///
    /// Call this once per frame. Returns how many decodes were processed.
    pub fn drain(&mut self) -> usize {
        let budget = self.config.drain_budget.map_or(usize::MAX, |b| b.max(1));
        let mut processed = 0;
        while processed < budget {
            let Some(completed) = self.pool.as_ref().and_then(WorkerPool::try_completed) else {
                break;
            };
            self.complete(completed);
            processed += 1;
        }

        if !self.pending.is_empty() && self.pool.as_ref().is_some_and(WorkerPool::is_gone) {
            log::warn!(
                "decode workers are gone, failing {} pending loads",
                self.pending.len()
            );
            self.fail_pending(DecodeError::WorkerGone.into());
        }
        processed
    }

    /// Regenerates every texture from its recipe after the GPU context was lost.
    ///
    /// Textures keep their identity; only the GPU handle inside them changes. A texture that
    /// fails to regenerate keeps its old handle and is reported, and the rest are still
    /// processed.
    pub fn recreate_all(&mut self) -> Vec<RecreationError> {
        log::info!("recreating {} textures", self.entries.len());
        let mut failures = vec![];
        for (key, entry) in self.entries.iter() {
            if let Err(cause) = regenerate(&mut self.producers, &mut self.uploader, key, entry) {
                log::warn!("failed to recreate {key}: {cause}");
                failures.push(RecreationError {
                    key: key.clone(),
                    cause,
                });
            }
        }
        if !failures.is_empty() {
            log::info!("{} textures could not be recreated", failures.len());
        }
        failures
    }

    /// Regenerates a single texture from its recipe.
    pub fn recreate(&mut self, key: impl Into<CacheKey>) -> Result<(), RecreationError> {
        let key: CacheKey = key.into();
        let Some(entry) = self.entries.get(&key) else {
            return Err(RecreationError {
                cause: Error::NotResident(key.clone()),
                key,
            });
        };
        regenerate(&mut self.producers, &mut self.uploader, &key, entry)
            .map_err(|cause| RecreationError { key, cause })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            textures: self.entries.len(),
            pending: self.pending.len(),
            holders: self
                .entries
                .values()
                .map(|entry| u64::from(entry.refs - BASELINE))
                .sum(),
            bytes: self.entries.values().map(|entry| entry.texture.byte_len()).sum(),
        }
    }

    /// Logs every cached texture and the total memory they use.
    pub fn log_contents(&self) {
        for (key, entry) in &self.entries {
            let size = entry.texture.size();
            log::info!(
                "{key}: holders={} {}x{} {:?} {} KiB ({})",
                entry.refs - BASELINE,
                size.x,
                size.y,
                entry.texture.format(),
                entry.texture.byte_len() / 1024,
                entry.recipe.kind(),
            );
        }
        let stats = self.stats();
        log::info!(
            "{} textures, {} loading, {:.2} MiB",
            stats.textures,
            stats.pending,
            stats.bytes as f64 / (1024.0 * 1024.0)
        );
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    pub fn uploader_mut(&mut self) -> &mut U {
        &mut self.uploader
    }

    /// Swaps in a new uploader, e.g. for a device created after the old one was lost.
    ///
    /// Follow with [`TextureCache::recreate_all`].
    pub fn set_uploader(&mut self, uploader: U) -> U {
        std::mem::replace(&mut self.uploader, uploader)
    }

    /// Tears the cache down.
    ///
    /// Stops the workers, fails every request still loading with [`Error::ShutDown`] and
    /// destroys every texture. Dropping the cache does the same.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
        self.fail_pending(Error::ShutDown);
        let evicted = self.evict_all();
        if evicted > 0 {
            log::debug!("destroyed {evicted} textures on shutdown");
        }
    }

    fn source_for(&self, key: &CacheKey) -> Source {
        Source::path(self.config.resolve(key.as_str()))
    }

    /// Takes a holder reference on a cached texture.
    fn acquire(&mut self, key: &CacheKey) -> Option<Texture<U::Handle>> {
        let entry = self.entries.get_mut(key)?;
        entry.refs += 1;
        Some(entry.texture.clone())
    }

    fn install(
        &mut self,
        key: CacheKey,
        pixels: &Pixels,
        recipe: Recipe,
        holders: u32,
    ) -> Result<Texture<U::Handle>, Error> {
        let handle = self
            .uploader
            .upload(&key, pixels)
            .inspect_err(|e| log::warn!("failed to upload {key}: {e}"))?;
        let texture = Texture::new(key.clone(), handle, pixels.size(), pixels.format());
        log::debug!(
            "cached {key} ({}x{}, from {})",
            pixels.size().x,
            pixels.size().y,
            recipe.kind()
        );
        self.entries.insert(
            key,
            Entry {
                texture: texture.clone(),
                recipe,
                refs: BASELINE + holders,
            },
        );
        Ok(texture)
    }

    fn submit(&mut self, key: CacheKey, source: Source, callback: Callback<U::Handle>) -> Submission {
        if let Some(callbacks) = self.pending.get_mut(&key) {
            callbacks.push(callback);
            return Submission::DuplicateInFlight;
        }

        let submitted = match &self.pool {
            Some(pool) => pool.submit(key.clone(), source),
            None => Err(DecodeError::WorkerGone),
        };
        match submitted {
            Ok(()) => {
                self.pending.insert(key, vec![callback]);
                Submission::Started
            }
            Err(e) => {
                log::warn!("could not queue {key}: {e}");
                callback(Err(e.into()), &key);
                Submission::Rejected
            }
        }
    }

    /// Moves a finished decode into the cache and runs the callbacks waiting on it.
    fn complete(&mut self, completed: Completed) {
        let Completed {
            key,
            source,
            result,
        } = completed;
        let callbacks = self.pending.remove(&key).unwrap_or_default();
        let holders = callbacks.len() as u32;

        let outcome = match self.entries.get_mut(&key) {
            Some(entry) => {
                log::debug!("{key} was cached while decoding, dropping the decode");
                entry.refs += holders;
                Ok(entry.texture.clone())
            }
            None => match result {
                Ok(pixels) => self.install(key.clone(), &pixels, Recipe::Decode(source), holders),
                Err(e) => {
                    log::warn!("failed to decode {key}: {e}");
                    Err(e.into())
                }
            },
        };

        for callback in callbacks {
            callback(outcome.clone(), &key);
        }
    }

    /// Blocks until the decode for `key` is done, completing other decodes on the way.
    ///
    /// The caller waits as the last of `key`'s callbacks, so it counts as a holder like them.
    fn finish_pending(&mut self, key: &CacheKey) -> Result<Texture<U::Handle>, Error> {
        let slot = Rc::new(RefCell::new(None));
        if let Some(callbacks) = self.pending.get_mut(key) {
            let slot = slot.clone();
            callbacks.push(Box::new(
                move |outcome: Result<Texture<U::Handle>, Error>, _: &CacheKey| {
                    *slot.borrow_mut() = Some(outcome);
                },
            ));
        }

        loop {
            let outcome = slot.borrow_mut().take();
            if let Some(outcome) = outcome {
                return outcome;
            }
            let completed = match &self.pool {
                Some(pool) => pool.wait_completed(),
                None => Err(DecodeError::WorkerGone),
            };
            match completed {
                Ok(completed) => self.complete(completed),
                Err(e) => self.fail_pending(e.into()),
            }
        }
    }

    fn fail_pending(&mut self, error: Error) {
        for (key, callbacks) in self.pending.drain() {
            log::debug!("failing {} requests for {key}: {error}", callbacks.len());
            for callback in callbacks {
                callback(Err(error.clone()), &key);
            }
        }
    }
}

impl<U: Uploader> Drop for TextureCache<U> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn regenerate<U: Uploader>(
    producers: &mut Producers,
    uploader: &mut U,
    key: &CacheKey,
    entry: &Entry<U::Handle>,
) -> Result<(), Error> {
    let pixels = producers.render(&entry.recipe)?;
    let handle = uploader.upload(key, &pixels)?;
    let old = entry.texture.replace(handle, pixels.size(), pixels.format());
    uploader.destroy(old);
    Ok(())
}

fn retire<U: Uploader>(uploader: &mut U, key: &CacheKey, entry: &Entry<U::Handle>) {
    log::debug!("evicting {key}");
    entry.texture.retire();
    uploader.destroy(entry.texture.handle());
}
