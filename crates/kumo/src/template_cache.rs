//! Cache of parsed template documents keyed by resolved path.
//!
//! Entries hold the raw tree, before any substitution, so one entry serves
//! every include site regardless of its parameters. Entries expire after the
//! configured TTL; an expired entry whose file is unchanged on disk (same
//! metadata and content digest) is renewed instead of reparsed.

use crate::config::ExpanderConfig;
use crate::error::Result;
use crate::template_loader::{load_document, Fingerprint};
use kumo_ast::ComponentNode;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// One cached document. Never mutated; refreshes replace the entry.
#[derive(Debug, Clone)]
pub struct TemplateCacheEntry {
    pub resolved_path: PathBuf,
    pub raw_tree: Arc<Vec<ComponentNode>>,
    pub loaded_at: Instant,
    pub fingerprint: Fingerprint,
}

impl TemplateCacheEntry {
    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.loaded_at.elapsed() < ttl,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe template cache shared by every expansion of an engine.
#[derive(Debug)]
pub struct TemplateCache {
    entries: RwLock<HashMap<PathBuf, Arc<TemplateCacheEntry>>>,
    ttl: Option<Duration>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    /// Create a cache whose entries expire after `ttl` (`None` keeps them
    /// until invalidated).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A cache that stores nothing; every lookup reads the file.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(None)
        }
    }

    pub fn from_config(config: &ExpanderConfig) -> Self {
        if config.cache_enabled {
            Self::new(config.cache_ttl())
        } else {
            Self::disabled()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the raw tree for `path`, loading and parsing it when there is
    /// no usable entry. `path` must already be resolved and canonical.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<Vec<ComponentNode>>> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let (nodes, _) = load_document(path)?;
            return Ok(Arc::new(nodes));
        }

        let cached = self.read().get(path).cloned();
        if let Some(entry) = cached {
            if entry.is_fresh(self.ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), "template cache hit");
                return Ok(Arc::clone(&entry.raw_tree));
            }

            if Fingerprint::of(path).ok() == Some(entry.fingerprint) {
                let renewed = TemplateCacheEntry {
                    loaded_at: Instant::now(),
                    ..(*entry).clone()
                };
                self.write().insert(path.to_path_buf(), Arc::new(renewed));
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), "template cache entry renewed, file unchanged");
                return Ok(Arc::clone(&entry.raw_tree));
            }

            tracing::debug!(path = %path.display(), "template cache entry stale");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %path.display(), "template cache miss");

        let (nodes, fingerprint) = load_document(path)?;
        let entry = Arc::new(TemplateCacheEntry {
            resolved_path: path.to_path_buf(),
            raw_tree: Arc::new(nodes),
            loaded_at: Instant::now(),
            fingerprint,
        });
        let tree = Arc::clone(&entry.raw_tree);
        self.write().insert(path.to_path_buf(), entry);
        Ok(tree)
    }

    /// Drop the entry for `path`. Returns whether an entry was removed.
    ///
    /// Relative or non-canonical paths are accepted; they are canonicalized
    /// when the file still exists.
    pub fn invalidate(&self, path: &Path) -> bool {
        let canonical = path.canonicalize().ok();
        let mut entries = self.write();
        let mut removed = entries.remove(path).is_some();
        if let Some(key) = canonical {
            removed |= entries.remove(&key).is_some();
        }
        tracing::debug!(path = %path.display(), removed, "template cache invalidate");
        removed
    }

    pub fn clear(&self) {
        self.write().clear();
        tracing::debug!("template cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read().contains_key(path)
    }

    // Entries are immutable, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Arc<TemplateCacheEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Arc<TemplateCacheEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(ExpanderConfig::default().cache_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use std::fs;

    fn write_template(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path.canonicalize().unwrap()
    }

    #[test]
    fn test_second_load_is_hit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::new(None);

        let first = cache.get_or_load(&path).unwrap();
        let second = cache.get_or_load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn test_expired_entry_with_unchanged_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::new(Some(Duration::ZERO));

        let first = cache.get_or_load(&path).unwrap();
        let second = cache.get_or_load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_entry_with_changed_file_is_reparsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::new(Some(Duration::ZERO));

        assert_eq!(cache.get_or_load(&path).unwrap().len(), 1);
        fs::write(&path, "- type: divider\n- type: divider\n").unwrap();
        assert_eq!(cache.get_or_load(&path).unwrap().len(), 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_expired_entry_reparsed_after_same_length_edit_with_restored_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: text\n  content: old\n");
        let cache = TemplateCache::new(Some(Duration::ZERO));

        let first = cache.get_or_load(&path).unwrap();
        assert_eq!(serde_json::to_value(&*first).unwrap()[0]["content"], "old");
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        fs::write(&path, "- type: text\n  content: new\n").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);

        let second = cache.get_or_load(&path).unwrap();
        assert_eq!(serde_json::to_value(&*second).unwrap()[0]["content"], "new");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_unexpired_entry_ignores_disk_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::new(None);

        cache.get_or_load(&path).unwrap();
        fs::write(&path, "[]").unwrap();
        assert_eq!(cache.get_or_load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::new(None);

        cache.get_or_load(&path).unwrap();
        assert!(cache.contains(&path));
        assert!(cache.invalidate(&dir.path().join("./a.yaml")));
        assert!(!cache.contains(&path));
        assert!(!cache.invalidate(&path));

        fs::write(&path, "[]").unwrap();
        assert!(cache.get_or_load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_invalidate_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::new(None);

        cache.get_or_load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(cache.invalidate(&path));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_template(dir.path(), "a.yaml", "[]");
        let b = write_template(dir.path(), "b.yaml", "[]");
        let cache = TemplateCache::new(None);

        cache.get_or_load(&a).unwrap();
        cache.get_or_load(&b).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = TemplateCache::disabled();

        cache.get_or_load(&path).unwrap();
        cache.get_or_load(&path).unwrap();
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 0,
                hits: 0,
                misses: 2
            }
        );
    }

    #[test]
    fn test_load_failure_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TemplateCache::new(None);
        let missing = dir.path().join("missing.yaml");

        let result = cache.get_or_load(&missing);
        assert!(matches!(result, Err(TemplateError::TemplateNotFound { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(dir.path(), "a.yaml", "- type: divider\n");
        let cache = Arc::new(TemplateCache::new(None));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let cache = Arc::clone(&cache);
                let path = path.clone();
                s.spawn(move || {
                    for _ in 0..10 {
                        assert_eq!(cache.get_or_load(&path).unwrap().len(), 1);
                    }
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits + stats.misses, 40);
    }

    #[test]
    fn test_from_config() {
        let cache = TemplateCache::from_config(&ExpanderConfig::default().without_cache());
        assert!(!cache.is_enabled());
        let cache = TemplateCache::from_config(&ExpanderConfig::default());
        assert_eq!(cache.ttl(), Some(Duration::from_millis(30_000)));
    }
}
