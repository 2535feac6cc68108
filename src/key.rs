use std::sync::Arc;

/// Identifies a texture in the cache.
///
/// Usually a normalized resource path. Keys created with [`CacheKey::unique`] are never
/// handed out twice, which is how callers get a fresh texture for content that has no
/// natural name (raw buffers, rendered text).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Creates a key from a resource path.
    ///
    /// Backslashes become forward slashes, repeated slashes are collapsed and `.` segments
    /// are dropped, so `"tex//./a.png"` and `"tex\\a.png"` name the same texture. `..` is
    /// kept as is.
    pub fn path(path: &str) -> Self {
        let unified = path.replace('\\', "/");
        let absolute = unified.starts_with('/');
        let segments = unified
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect::<Vec<_>>();
        let mut normalized = String::with_capacity(unified.len());
        if absolute {
            normalized.push('/');
        }
        normalized.push_str(&segments.join("/"));
        Self(normalized.into())
    }

    /// Creates a key that no other call will return.
    pub fn unique() -> Self {
        static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let id = NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Self(format!("#texture-{id}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key was minted by [`CacheKey::unique`] rather than derived from a path.
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with("#texture-")
    }
}

impl From<&str> for CacheKey {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<String> for CacheKey {
    fn from(path: String) -> Self {
        Self::path(&path)
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(key: &CacheKey) -> Self {
        key.clone()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}
