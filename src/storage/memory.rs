//! In-memory storage, used for tests and the `memory` backend setting

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Edit, PrefBackend, StorageProvider, StoredValue};

/// Process-local backend for a single namespace
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, StoredValue>>,
    fail_commits: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail without touching the entries
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read, presence check and key listing fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn readable(&self) -> anyhow::Result<MutexGuard<'_, HashMap<String, StoredValue>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("read rejected by memory backend");
        }
        Ok(self.entries())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PrefBackend for MemoryBackend {
    async fn read(&self, key: &str) -> anyhow::Result<Option<StoredValue>> {
        Ok(self.readable()?.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.readable()?.contains_key(key))
    }

    async fn commit(&self, edits: Vec<Edit>) -> anyhow::Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            anyhow::bail!("commit rejected by memory backend");
        }

        let mut entries = self.entries();
        for edit in edits {
            match edit {
                Edit::Put(key, value) => {
                    entries.insert(key, value);
                }
                Edit::Remove(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<_> = self.readable()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Hands out one shared [`MemoryBackend`] per namespace
#[derive(Default)]
pub struct MemoryProvider {
    namespaces: Mutex<HashMap<String, Arc<MemoryBackend>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend for `namespace`, created on first use
    pub fn backend(&self, namespace: &str) -> Arc<MemoryBackend> {
        self.namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn open(&self, namespace: &str) -> anyhow::Result<Arc<dyn PrefBackend>> {
        Ok(self.backend(namespace))
    }
}
