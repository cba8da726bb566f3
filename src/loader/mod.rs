//! Decoding captured JSON files, with a per-session cache for the files the
//! analyzers read repeatedly (pod lists, event lists, ad-hoc documents).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AnalysisError, Result};
use crate::k8s::{EventList, PodList};

/// Reads and decodes `path`. A missing file is `Ok(None)`.
pub fn load_list<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(AnalysisError::io(path, err)),
    };
    let value = serde_json::from_slice(&bytes).map_err(|err| AnalysisError::decode(path, err))?;
    Ok(Some(value))
}

struct TypedCache<T> {
    entries: Mutex<HashMap<PathBuf, Arc<T>>>,
}

impl<T> Default for TypedCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: DeserializeOwned> TypedCache<T> {
    fn get_or_load(&self, path: &Path, reads: &AtomicUsize) -> Result<Option<Arc<T>>> {
        let key = cache_key(path);
        if let Some(hit) = self.lock().get(&key) {
            return Ok(Some(Arc::clone(hit)));
        }

        reads.fetch_add(1, Ordering::Relaxed);
        let Some(value) = load_list::<T>(path)? else {
            return Ok(None);
        };

        // A concurrent load of the same file may have won; keep whichever
        // landed first so every caller shares one value.
        let mut entries = self.lock();
        let entry = entries.entry(key).or_insert_with(|| Arc::new(value));
        Ok(Some(Arc::clone(entry)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn cache_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Memoizes decoded files for the lifetime of one analysis session.
///
/// Only successful loads are cached; missing files and decode failures are
/// retried on the next request.
#[derive(Default)]
pub struct SnapshotCache {
    pods: TypedCache<PodList>,
    events: TypedCache<EventList>,
    json: TypedCache<Value>,
    reads: AtomicUsize,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pod_list(&self, path: &Path) -> Result<Option<Arc<PodList>>> {
        self.pods.get_or_load(path, &self.reads)
    }

    pub fn event_list(&self, path: &Path) -> Result<Option<Arc<EventList>>> {
        self.events.get_or_load(path, &self.reads)
    }

    pub fn json(&self, path: &Path) -> Result<Option<Arc<Value>>> {
        self.json.get_or_load(path, &self.reads)
    }

    /// Number of times a file was actually read from disk.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn make_temp_dir() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "vzanalyze-loader-test-{}-{seq}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create dir");
        dir
    }

    #[test]
    fn pod_list_is_read_once() {
        let dir = make_temp_dir();
        let path = dir.join("pods.json");
        std::fs::write(
            &path,
            br#"{"items":[{"metadata":{"name":"p1","namespace":"ns"}}]}"#,
        )
        .expect("write");

        let cache = SnapshotCache::new();
        let first = cache.pod_list(&path).expect("load").expect("present");
        assert_eq!(cache.reads(), 1);
        let second = cache.pod_list(&path).expect("load").expect("present");
        assert_eq!(cache.reads(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.items[0].metadata.name, "p1");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_absent_not_an_error() {
        let dir = make_temp_dir();
        let cache = SnapshotCache::new();
        assert!(cache.event_list(&dir.join("events.json")).expect("load").is_none());
        assert!(load_list::<Value>(&dir.join("nope.json")).expect("load").is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_file_is_a_decode_error() {
        let dir = make_temp_dir();
        let path = dir.join("events.json");
        std::fs::write(&path, b"{not json").expect("write");
        let cache = SnapshotCache::new();
        let err = cache.event_list(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
