//! Underlying persistent settings storage
//!
//! The store never talks to a database directly. It opens a namespace through
//! a [`StorageProvider`] and gets back a [`StorageHandle`], which offers:
//! - Typed reads with a caller-supplied default
//! - An [`Editor`] that batches puts and removes and applies them in one commit
//! - Presence checks
//!
//! Two providers ship with the crate: [`MemoryProvider`] and [`SqliteProvider`].

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryBackend, MemoryProvider};
pub use sqlite::{SqliteBackend, SqliteProvider};

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PrefError, Result};
use crate::value::{PrefKind, Primitive};

/// A primitive the storage mechanism can hold
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Bool(bool),
    String(String),
    StringSet(BTreeSet<String>),
}

impl StoredValue {
    pub fn kind(&self) -> PrefKind {
        match self {
            StoredValue::Int(_) => PrefKind::Int,
            StoredValue::Long(_) => PrefKind::Long,
            StoredValue::Float(_) => PrefKind::Float,
            StoredValue::Bool(_) => PrefKind::Bool,
            StoredValue::String(_) => PrefKind::String,
            StoredValue::StringSet(_) => PrefKind::StringSet,
        }
    }
}

/// A single pending change
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Put(String, StoredValue),
    Remove(String),
}

/// Raw key-value backend for one namespace
#[async_trait]
pub trait PrefBackend: Send + Sync {
    /// Read the entry for `key`, if any
    async fn read(&self, key: &str) -> anyhow::Result<Option<StoredValue>>;

    /// Check whether an entry exists for `key`
    async fn contains(&self, key: &str) -> anyhow::Result<bool>;

    /// Apply all edits atomically, in order
    async fn commit(&self, edits: Vec<Edit>) -> anyhow::Result<()>;

    /// List all keys, sorted
    async fn keys(&self) -> anyhow::Result<Vec<String>>;
}

/// Opens the backend for a namespace
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn open(&self, namespace: &str) -> anyhow::Result<Arc<dyn PrefBackend>>;
}

/// Handle to an opened namespace with typed accessors
#[derive(Clone)]
pub struct StorageHandle {
    namespace: String,
    backend: Arc<dyn PrefBackend>,
}

impl StorageHandle {
    /// Open `namespace` through `provider`
    pub async fn open(provider: &dyn StorageProvider, namespace: &str) -> Result<Self> {
        let backend = provider.open(namespace).await?;
        log::debug!("Opened preference namespace: {}", namespace);
        Ok(Self {
            namespace: namespace.to_string(),
            backend,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Read the raw entry for `key`
    pub async fn read(&self, key: &str) -> Result<Option<StoredValue>> {
        Ok(self.backend.read(key).await?)
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.backend.contains(key).await?)
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.backend.keys().await?)
    }

    /// Start a batch of edits
    pub fn edit(&self) -> Editor<'_> {
        Editor {
            backend: &*self.backend,
            edits: Vec::new(),
        }
    }

    /// Read `key` as `T`; `None` if absent.
    ///
    /// An entry holding another primitive is a [`PrefError::TypeMismatch`].
    pub async fn get<T: Primitive>(&self, key: &str) -> Result<Option<T>> {
        let Some(stored) = self.read(key).await? else {
            return Ok(None);
        };
        let found = stored.kind();
        T::from_stored(stored)
            .map(Some)
            .ok_or_else(|| stored_mismatch(key, T::kind(), found))
    }

    /// Get int value
    pub async fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Get long value
    pub async fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Get float value
    pub async fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Get bool value
    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Get string value
    pub async fn get_string(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Get string set value
    pub async fn get_string_set(
        &self,
        key: &str,
        default: BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        Ok(self.get(key).await?.unwrap_or(default))
    }
}

pub(crate) fn stored_mismatch(key: &str, expected: PrefKind, found: PrefKind) -> PrefError {
    PrefError::TypeMismatch {
        key: key.to_string(),
        expected,
        found,
    }
}

/// Pending edits against a [`StorageHandle`]; nothing is written until [`Editor::commit`]
pub struct Editor<'a> {
    backend: &'a dyn PrefBackend,
    edits: Vec<Edit>,
}

impl Editor<'_> {
    pub fn put(mut self, key: &str, value: StoredValue) -> Self {
        self.edits.push(Edit::Put(key.to_string(), value));
        self
    }

    /// Queue a typed primitive
    pub fn put_value<T: Primitive>(self, key: &str, value: T) -> Self {
        self.put(key, value.to_stored())
    }

    pub fn put_int(self, key: &str, value: i32) -> Self {
        self.put_value(key, value)
    }

    pub fn put_long(self, key: &str, value: i64) -> Self {
        self.put_value(key, value)
    }

    pub fn put_float(self, key: &str, value: f32) -> Self {
        self.put_value(key, value)
    }

    pub fn put_bool(self, key: &str, value: bool) -> Self {
        self.put_value(key, value)
    }

    pub fn put_string(self, key: &str, value: &str) -> Self {
        self.put_value(key, value.to_string())
    }

    pub fn put_string_set(self, key: &str, value: BTreeSet<String>) -> Self {
        self.put_value(key, value)
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.edits.push(Edit::Remove(key.to_string()));
        self
    }

    /// Apply all pending edits atomically
    pub async fn commit(self) -> Result<()> {
        if self.edits.is_empty() {
            return Ok(());
        }
        self.backend.commit(self.edits).await?;
        Ok(())
    }
}
