use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::util::modified_time;

/// Modification times observed for the files a cached value was derived from.
///
/// A missing file is recorded as `None`, so creating it later also counts as a
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness(Vec<(PathBuf, Option<SystemTime>)>);

impl Freshness {
    pub fn observe(paths: &[&Path]) -> Self {
        Self(
            paths
                .iter()
                .map(|path| (path.to_path_buf(), modified_time(path)))
                .collect(),
        )
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    freshness: Freshness,
    value: V,
}

/// Memoizes derived values until one of their backing files changes.
#[derive(Debug)]
pub struct MtimeCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for MtimeCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> MtimeCache<K, V> {
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: &K,
        freshness: Freshness,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().freshness != freshness {
                    debug!("cache entry stale, recomputing");
                    let value = compute()?;
                    occupied.insert(CacheEntry { freshness, value });
                }
                Ok(&occupied.into_mut().value)
            }
            Entry::Vacant(vacant) => {
                let value = compute()?;
                Ok(&vacant.insert(CacheEntry { freshness, value }).value)
            }
        }
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;
    use std::time::Duration;

    use super::*;

    fn bump_mtime(path: &Path) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        let later = SystemTime::now() + Duration::from_secs(120);
        file.set_modified(later).unwrap();
    }

    #[test]
    fn value_is_reused_while_files_are_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.json");
        fs::write(&source, "[]").unwrap();

        let calls = Cell::new(0);
        let mut cache = MtimeCache::<String, usize>::default();
        let key = "source.json".to_string();

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with(&key, Freshness::observe(&[source.as_path()]), || {
                    calls.set(calls.get() + 1);
                    Ok::<usize, ()>(calls.get())
                })
                .unwrap();
            assert_eq!(*value, 1);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn changed_or_created_file_triggers_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.json");
        let scores = dir.path().join("scores.json");
        fs::write(&source, "[]").unwrap();

        let calls = Cell::new(0);
        let mut cache = MtimeCache::<String, usize>::default();
        let key = "source.json".to_string();
        let lookup = |cache: &mut MtimeCache<String, usize>| {
            *cache
                .get_or_try_insert_with(&key, Freshness::observe(&[source.as_path(), scores.as_path()]), || {
                    calls.set(calls.get() + 1);
                    Ok::<usize, ()>(calls.get())
                })
                .unwrap()
        };

        assert_eq!(lookup(&mut cache), 1);
        fs::write(&scores, "{}").unwrap();
        assert_eq!(lookup(&mut cache), 2);
        bump_mtime(&source);
        assert_eq!(lookup(&mut cache), 3);
        assert_eq!(lookup(&mut cache), 3);
    }

    #[test]
    fn failed_compute_leaves_no_entry() {
        let mut cache = MtimeCache::<String, usize>::default();
        let result = cache.get_or_try_insert_with(&"k".to_string(), Freshness::observe(&[]), || {
            Err::<usize, &str>("boom")
        });
        assert!(result.is_err());
        assert_eq!(cache.len(), 0);
    }
}
