//! Parse cache (C8): a fixed-capacity map from source fingerprint to a
//! parsed `Root`, shared by an engine's `create_script`/`create_expression`
//! and the template engine's chunk parser. Built on `dashmap` so lookups and
//! insertions take `&self` — the same reason `Context` is held as `Rc<dyn
//! Context>` rather than `&mut`: an engine handle is cloned and reused
//! across repeated `execute` calls, sometimes from within a continuation
//! that is itself mid-parse-or-eval, and `&mut self` can't express that.
//!
//! A cached tree is only ever handed out once its parse has fully
//! succeeded — a failed parse never reaches the map, so a reader can never
//! observe a partially built `Root`.

use crate::ast::Root;
use crate::error::JexlResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

struct Entry {
    root: Arc<Root>,
    touched: u64,
}

/// Source fingerprint: the source text paired with the name it was parsed
/// under (two hosts parsing identical text under different `source_name`s
/// get distinct cache slots, since that name surfaces in every `Origin`).
#[derive(Hash, PartialEq, Eq, Clone)]
struct Fingerprint(String, String);

pub struct Cache {
    capacity: usize,
    entries: DashMap<Fingerprint, Entry>,
    clock: AtomicU64,
}

impl Cache {
    /// `capacity == 0` disables caching: every call reparses and nothing is
    /// ever stored, matching `JexlOptions`-style "off means off" knobs
    /// elsewhere in this crate.
    pub fn new(capacity: usize) -> Self {
        Cache {
            capacity,
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns the cached tree for `(source_name, source)`, parsing and
    /// inserting it via `parse` on a miss. `parse` is a factory, not a fixed
    /// function pointer: a host can inject feature gating, pragma defaults,
    /// or an entirely different grammar front-end, and the cache doesn't
    /// care which.
    pub fn get_or_parse<F>(&self, source_name: &str, source: &str, parse: F) -> JexlResult<Arc<Root>>
    where
        F: FnOnce() -> JexlResult<Root>,
    {
        let key = Fingerprint(source_name.to_string(), source.to_string());
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.touched = self.tick();
            return Ok(Arc::clone(&entry.root));
        }
        // Parsed outside any map lock: a concurrent miss on the same key
        // just parses twice and one of the two insertions wins, rather than
        // holding a shard lock across an arbitrarily slow parse.
        let root = Arc::new(parse()?);
        self.insert(key, Arc::clone(&root));
        Ok(root)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, key: Fingerprint, root: Arc<Root>) {
        if self.capacity == 0 {
            return;
        }
        let touched = self.tick();
        self.entries.insert(key, Entry { root, touched });
        if self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Approximate LRU: scans for the globally least-recently-touched entry.
    /// `dashmap` has no built-in ordering index, so eviction is a linear
    /// scan rather than a true O(1) LRU list — acceptable since it only
    /// runs on the rare insert that pushes the cache over capacity, not on
    /// every hit.
    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.touched)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            log::trace!("cache: evicting '{}' at capacity {}", key.0, self.capacity);
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JexlError;
    use crate::origin::Origin;

    fn dummy_root() -> Root {
        Root::Expression(crate::ast::Expr::Literal(crate::ast::Literal::Int(1), Origin::unknown("t")))
    }

    #[test]
    fn miss_then_hit_reuses_tree() {
        let cache = Cache::new(4);
        let mut parses = 0;
        let a = cache
            .get_or_parse("t", "1 + 1", || {
                parses += 1;
                Ok(dummy_root())
            })
            .unwrap();
        let b = cache
            .get_or_parse("t", "1 + 1", || {
                parses += 1;
                Ok(dummy_root())
            })
            .unwrap();
        assert_eq!(parses, 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_source_names_get_distinct_slots() {
        let cache = Cache::new(4);
        cache.get_or_parse("a", "1", || Ok(dummy_root())).unwrap();
        cache.get_or_parse("b", "1", || Ok(dummy_root())).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_never_stores() {
        let cache = Cache::new(0);
        cache.get_or_parse("t", "1", || Ok(dummy_root())).unwrap();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn eviction_keeps_size_at_capacity() {
        let cache = Cache::new(2);
        for src in ["1", "2", "3"] {
            cache.get_or_parse("t", src, || Ok(dummy_root())).unwrap();
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_parse_is_never_cached() {
        let cache = Cache::new(4);
        let err: JexlResult<Root> = Err(JexlError::parsing(Origin::unknown("t"), "boom"));
        assert!(cache.get_or_parse("t", "bad", || err).is_err());
        assert_eq!(cache.len(), 0);
    }
}
