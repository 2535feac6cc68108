//! Cache configuration.

use std::path::PathBuf;

/// Tunables for a [`crate::TextureCache`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of decode worker threads. Clamped to at least 1.
    pub workers: usize,
    /// Name given to decode worker threads; the worker index is appended.
    pub thread_name: String,
    /// Directory that relative path keys are resolved against.
    pub asset_root: Option<PathBuf>,
    /// Maximum number of finished decodes uploaded per [`crate::TextureCache::drain`] call.
    ///
    /// [`None`] uploads everything that is ready.
    pub drain_budget: Option<usize>,
    /// Usage flags for textures created by [`crate::WgpuUploader`].
    pub texture_usage: wgpu::TextureUsages,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(4),
            thread_name: "texturette-decode".to_string(),
            asset_root: None,
            drain_budget: None,
            texture_usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        }
    }
}

impl Config {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    pub fn with_drain_budget(mut self, budget: usize) -> Self {
        self.drain_budget = Some(budget);
        self
    }

    pub fn with_texture_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.texture_usage = usage;
        self
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Where the file behind a path key lives.
    pub(crate) fn resolve(&self, key: &str) -> PathBuf {
        match &self.asset_root {
            Some(root) => root.join(key),
            None => PathBuf::from(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_least_one_worker() {
        assert_eq!(Config::default().with_workers(0).worker_count(), 1);
        assert!(Config::default().worker_count() <= 4);
    }

    #[test]
    fn resolves_against_root() {
        let config = Config::default().with_asset_root("assets");
        assert_eq!(config.resolve("tex/a.png"), PathBuf::from("assets/tex/a.png"));
        assert_eq!(Config::default().resolve("tex/a.png"), PathBuf::from("tex/a.png"));
    }
}
