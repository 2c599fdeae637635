//! In-memory key-value store with per-key and global versioning.
//!
//! Two replica roles share this type: a leader calls [`VersionedStore::set`]
//! for locally originated writes, while a follower calls
//! [`VersionedStore::apply_write`] to absorb replicated writes out of band.
//! The store makes no assumption about which role it is serving — both
//! call paths are always available, and it is up to the caller (the HTTP
//! layer) to refuse direct writes on a follower.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CResult, Error};

/// An opaque value. Any JSON document round-trips unchanged.
pub type Value = serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub version: u64,
}

/// One row of the leader's in-memory write log, kept for debugging only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteLogRecord {
    pub global_version: u64,
    pub key_version: u64,
    pub key: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

struct StoreInner {
    data: HashMap<String, Entry>,
    global_version: u64,
    log: Vec<WriteLogRecord>,
}

impl StoreInner {
    fn new() -> Self {
        Self { data: HashMap::new(), global_version: 0, log: Vec::new() }
    }

    /// Lock-free inner form of `set`. Callers that already hold the mutex
    /// (none today, but kept for the shape described in the design notes)
    /// can call this directly instead of re-locking.
    fn set_locked(&mut self, key: &str, value: Value) -> CResult<u64> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.global_version += 1;
        let version = self.data.get(key).map(|e| e.version).unwrap_or(0) + 1;
        self.data.insert(key.to_string(), Entry { value: value.clone(), version });
        self.log.push(WriteLogRecord {
            global_version: self.global_version,
            key_version: version,
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
        });
        Ok(version)
    }

    fn apply_write_locked(&mut self, key: &str, value: Value, version: u64) -> CResult<bool> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.global_version = self.global_version.max(version);
        let current = self.data.get(key).map(|e| e.version).unwrap_or(0);
        if version > current {
            self.data.insert(key.to_string(), Entry { value, version });
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Shared, versioned key-value map. All operations serialize through a
/// single mutex — there is no reader/writer split, matching the
/// last-writer-wins-by-version convergence rule this store implements.
pub struct VersionedStore {
    inner: Mutex<StoreInner>,
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(StoreInner::new()) }
    }

    /// Returns the current value for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<Entry> {
        let inner = self.inner.lock().unwrap();
        inner.data.get(key).cloned()
    }

    /// Local leader write. Bumps the per-key version and the global
    /// version, and appends to the in-memory write log.
    pub fn set(&self, key: &str, value: Value) -> CResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.set_locked(key, value)
    }

    /// Follower write. Installs `value` at `version` only if `version` is
    /// strictly greater than the key's current version. Returns whether
    /// the write was installed — a stale write is not an error.
    pub fn apply_write(&self, key: &str, value: Value, version: u64) -> CResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.apply_write_locked(key, value, version)
    }

    /// Removes `key` if present. Not replicated — see the design notes on
    /// delete being a leader-only operation.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.data.remove(key).is_some();
        if existed {
            inner.global_version += 1;
        }
        existed
    }

    /// Detached copy of the entire mapping.
    pub fn get_all(&self) -> HashMap<String, Entry> {
        let inner = self.inner.lock().unwrap();
        inner.data.clone()
    }

    pub fn get_version(&self) -> u64 {
        self.inner.lock().unwrap().global_version
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().data.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().data.keys().cloned().collect()
    }

    /// Snapshot of the write log, oldest first.
    pub fn write_log(&self) -> Vec<WriteLogRecord> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.data.clear();
        inner.log.clear();
        inner.global_version = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn set_bumps_per_key_and_global_version() {
        let store = VersionedStore::new();
        assert_eq!(store.set("a", json!("1")).unwrap(), 1);
        assert_eq!(store.set("a", json!("2")).unwrap(), 2);
        assert_eq!(store.set("b", json!("x")).unwrap(), 1);
        assert_eq!(store.get_version(), 3);
        assert_eq!(store.get("a").unwrap().value, json!("2"));
    }

    #[test]
    fn set_rejects_empty_key() {
        let store = VersionedStore::new();
        assert!(matches!(store.set("", json!(1)), Err(Error::EmptyKey)));
    }

    #[test]
    fn apply_write_installs_strictly_newer_versions_only() {
        let store = VersionedStore::new();
        assert!(store.apply_write("x", json!("a"), 1).unwrap());
        assert!(store.apply_write("x", json!("c"), 3).unwrap());
        // stale write is silently absorbed, not an error, and not installed
        assert!(!store.apply_write("x", json!("b"), 2).unwrap());
        assert_eq!(store.get("x").unwrap().value, json!("c"));
        assert_eq!(store.get("x").unwrap().version, 3);
    }

    #[test]
    fn apply_write_converges_regardless_of_arrival_order() {
        let leader = VersionedStore::new();
        let v1 = leader.set("x", json!("a")).unwrap();
        let v2 = leader.set("x", json!("b")).unwrap();
        let v3 = leader.set("x", json!("c")).unwrap();

        // simulate out-of-order delivery to a follower
        let follower = VersionedStore::new();
        follower.apply_write("x", json!("c"), v3).unwrap();
        follower.apply_write("x", json!("a"), v1).unwrap();
        follower.apply_write("x", json!("b"), v2).unwrap();

        let entry = follower.get("x").unwrap();
        assert_eq!(entry.value, json!("c"));
        assert_eq!(entry.version, 3);
    }

    #[test]
    fn delete_removes_key_and_bumps_global_version_only() {
        let store = VersionedStore::new();
        store.set("a", json!(1)).unwrap();
        let before = store.get_version();
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(store.get("a").is_none());
        assert_eq!(store.get_version(), before + 1);
    }

    #[test]
    fn get_all_and_keys_reflect_snapshot() {
        let store = VersionedStore::new();
        store.set("a", json!(1)).unwrap();
        store.set("b", json!(2)).unwrap();
        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.get_all().len(), 2);
    }

    #[test]
    fn clear_resets_everything() {
        let store = VersionedStore::new();
        store.set("a", json!(1)).unwrap();
        store.clear();
        assert_eq!(store.size(), 0);
        assert_eq!(store.get_version(), 0);
        assert!(store.write_log().is_empty());
    }

    #[test]
    fn write_log_only_records_local_writes() {
        let store = VersionedStore::new();
        store.set("a", json!(1)).unwrap();
        store.apply_write("b", json!(2), 1).unwrap();
        let log = store.write_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].key, "a");
    }
}
