//! Typed preference store over an opened storage namespace

use std::any::type_name;
use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::codec::{JsonCodec, PrefCodec};
use crate::error::{PrefError, Result};
use crate::registry::{ObservationRegistry, Observer};
use crate::storage::{StorageHandle, StorageProvider, StoredValue, stored_mismatch};
use crate::value::{ObjectHolder, PrefKind, PrefType, Primitive};

/// Storage namespace for an application id
pub fn namespace_for(app_id: &str) -> String {
    format!("{}_prefs", app_id)
}

/// Typed, observable preference store.
///
/// Construct one per application and share it by reference. Every operation
/// other than [`initialize`](Self::initialize) fails with
/// [`PrefError::NotInitialized`] until a storage handle has been opened.
///
/// Writes, deletes and first observations are serialized: each one checks the
/// binding, touches storage and updates the registry as a single step.
pub struct PrefStore<C = JsonCodec> {
    storage: OnceCell<StorageHandle>,
    registry: Arc<ObservationRegistry>,
    codec: C,
    writes: Mutex<()>,
}

impl PrefStore<JsonCodec> {
    /// Create an uninitialized store using JSON for objects
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for PrefStore<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PrefCodec> PrefStore<C> {
    /// Create an uninitialized store that encodes objects with `codec`
    pub fn with_codec(codec: C) -> Self {
        Self {
            storage: OnceCell::new(),
            registry: Arc::new(ObservationRegistry::new()),
            codec,
            writes: Mutex::new(()),
        }
    }

    /// Open the `<app_id>_prefs` namespace. Must be called exactly once.
    pub async fn initialize(&self, provider: &dyn StorageProvider, app_id: &str) -> Result<()> {
        self.initialize_namespace(provider, &namespace_for(app_id))
            .await
    }

    /// Open an explicit namespace. Fails with [`PrefError::AlreadyInitialized`] on a second call.
    pub async fn initialize_namespace(
        &self,
        provider: &dyn StorageProvider,
        namespace: &str,
    ) -> Result<()> {
        if self.storage.get().is_some() {
            return Err(PrefError::AlreadyInitialized);
        }

        let handle = StorageHandle::open(provider, namespace).await?;
        // A concurrent initialize may have won while we were opening
        self.storage
            .set(handle)
            .map_err(|_| PrefError::AlreadyInitialized)?;

        log::info!("Initialized preference store: {}", namespace);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.storage.get().is_some()
    }

    /// Namespace of the opened storage, once initialized
    pub fn namespace(&self) -> Option<&str> {
        self.storage.get().map(|s| s.namespace())
    }

    pub fn registry(&self) -> &Arc<ObservationRegistry> {
        &self.registry
    }

    fn handle(&self, key: &str) -> Result<&StorageHandle> {
        let storage = self.storage.get().ok_or(PrefError::NotInitialized)?;
        if key.is_empty() {
            return Err(PrefError::InvalidKey);
        }
        Ok(storage)
    }

    /// True iff storage holds an entry for `key`
    pub async fn has_key(&self, key: &str) -> Result<bool> {
        self.handle(key)?.contains(key).await
    }

    /// Remove the entry for `key`. Returns whether anything was removed.
    ///
    /// Observers of the key are reset to the zero value of its bound type.
    pub async fn delete_key(&self, key: &str) -> Result<bool> {
        let storage = self.handle(key)?;
        let _guard = self.writes.lock().await;

        if !storage.contains(key).await? {
            return Ok(false);
        }

        storage.edit().remove(key).commit().await?;
        log::debug!("Deleted preference: {}", key);

        self.registry.reset(key)?;
        Ok(true)
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.storage
            .get()
            .ok_or(PrefError::NotInitialized)?
            .keys()
            .await
    }

    /// Write a primitive value, then notify observers of `key`.
    ///
    /// A value whose type differs from the key's binding is rejected before
    /// anything is written.
    pub async fn put<T: Primitive>(&self, key: &str, value: T) -> Result<()> {
        let storage = self.handle(key)?;
        let _guard = self.writes.lock().await;

        // Validate against the binding before touching storage
        self.registry.check(key, T::kind())?;

        storage.edit().put_value(key, value.clone()).commit().await?;
        log::debug!("Set preference: {} ({})", key, T::kind());

        self.registry.notify(key, value.into_value())
    }

    /// Read a primitive value, or `default` if absent
    pub async fn get<T: Primitive>(&self, key: &str, default: T) -> Result<T> {
        let storage = self.handle(key)?;
        self.registry.check(key, T::kind())?;

        Ok(storage.get::<T>(key).await?.unwrap_or(default))
    }

    /// Observe `key` as `T`.
    ///
    /// The first observation binds the key and seeds it from storage (or the
    /// type's zero value). Later observations attach to the same subscription
    /// and must use the same type.
    pub async fn observe<T: Primitive>(&self, key: &str) -> Result<Observer<T>> {
        let storage = self.handle(key)?;
        let _guard = self.writes.lock().await;

        // Already bound: the cached value wins over storage
        if self.registry.is_observed(key) {
            return Observer::subscribe(self.registry.clone(), key, T::zero());
        }

        let seed = storage.get::<T>(key).await?.unwrap_or_else(T::zero);
        log::debug!("Observing preference: {} as {}", key, T::kind());
        Observer::subscribe(self.registry.clone(), key, seed)
    }

    /// Encode `value` with the codec and store it as text. `None` clears the object.
    ///
    /// Observers receive the original object, not the encoded text.
    pub async fn put_object<O>(&self, key: &str, value: Option<O>) -> Result<()>
    where
        O: Serialize + Send + Sync + 'static,
    {
        let storage = self.handle(key)?;
        let _guard = self.writes.lock().await;

        self.registry.check(key, ObjectHolder::<O>::kind())?;

        // Cleared objects are stored as empty text
        let text = match &value {
            Some(v) => self
                .codec
                .encode(v)
                .map_err(|source| PrefError::Serialization {
                    key: key.to_string(),
                    source,
                })?,
            None => String::new(),
        };

        storage.edit().put_string(key, &text).commit().await?;
        log::debug!("Set preference: {} ({})", key, ObjectHolder::<O>::kind());

        self.registry
            .notify(key, ObjectHolder::new(value).into_value())
    }

    /// Decode the object stored under `key`; `None` if absent or cleared
    pub async fn get_object<O>(&self, key: &str) -> Result<Option<O>>
    where
        O: DeserializeOwned + Send + Sync + 'static,
    {
        let storage = self.handle(key)?;
        self.registry.check(key, ObjectHolder::<O>::kind())?;

        self.read_object(storage, key).await
    }

    /// Observe `key` as an object of type `O`, delivered in an [`ObjectHolder`]
    pub async fn observe_object<O>(&self, key: &str) -> Result<Observer<ObjectHolder<O>>>
    where
        O: DeserializeOwned + Send + Sync + 'static,
    {
        let storage = self.handle(key)?;
        let _guard = self.writes.lock().await;

        if self.registry.is_observed(key) {
            return Observer::subscribe(self.registry.clone(), key, ObjectHolder::empty());
        }

        let seed = ObjectHolder::new(self.read_object::<O>(storage, key).await?);
        log::debug!(
            "Observing preference: {} as {}",
            key,
            ObjectHolder::<O>::kind()
        );
        Observer::subscribe(self.registry.clone(), key, seed)
    }

    async fn read_object<O: DeserializeOwned>(
        &self,
        storage: &StorageHandle,
        key: &str,
    ) -> Result<Option<O>> {
        let text = match storage.read(key).await? {
            Some(StoredValue::String(text)) => text,
            Some(other) => {
                return Err(stored_mismatch(
                    key,
                    PrefKind::Object(type_name::<O>()),
                    other.kind(),
                ));
            }
            None => return Ok(None),
        };

        if text.is_empty() {
            return Ok(None);
        }

        self.codec
            .decode(&text)
            .map(Some)
            .map_err(|source| PrefError::Deserialization {
                key: key.to_string(),
                source,
            })
    }

    /// Set int value
    pub async fn put_int(&self, key: &str, value: i32) -> Result<()> {
        self.put(key, value).await
    }

    /// Get int value
    pub async fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        self.get(key, default).await
    }

    /// Observe int value
    pub async fn observe_int(&self, key: &str) -> Result<Observer<i32>> {
        self.observe(key).await
    }

    /// Set long value
    pub async fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, value).await
    }

    /// Get long value
    pub async fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        self.get(key, default).await
    }

    /// Observe long value
    pub async fn observe_long(&self, key: &str) -> Result<Observer<i64>> {
        self.observe(key).await
    }

    /// Set float value
    pub async fn put_float(&self, key: &str, value: f32) -> Result<()> {
        self.put(key, value).await
    }

    /// Get float value
    pub async fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        self.get(key, default).await
    }

    /// Observe float value
    pub async fn observe_float(&self, key: &str) -> Result<Observer<f32>> {
        self.observe(key).await
    }

    /// Set double value, stored as the bit pattern of a long
    pub async fn put_double(&self, key: &str, value: f64) -> Result<()> {
        self.put(key, value).await
    }

    /// Get double value
    pub async fn get_double(&self, key: &str, default: f64) -> Result<f64> {
        self.get(key, default).await
    }

    /// Observe double value
    pub async fn observe_double(&self, key: &str) -> Result<Observer<f64>> {
        self.observe(key).await
    }

    /// Set bool value
    pub async fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        self.put(key, value).await
    }

    /// Get bool value
    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        self.get(key, default).await
    }

    /// Observe bool value
    pub async fn observe_bool(&self, key: &str) -> Result<Observer<bool>> {
        self.observe(key).await
    }

    /// Set string value
    pub async fn put_string(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.put(key, value.into()).await
    }

    /// Get string value
    pub async fn get_string(&self, key: &str, default: &str) -> Result<String> {
        self.get(key, default.to_string()).await
    }

    /// Observe string value
    pub async fn observe_string(&self, key: &str) -> Result<Observer<String>> {
        self.observe(key).await
    }

    /// Set string set value
    pub async fn put_string_set(&self, key: &str, value: BTreeSet<String>) -> Result<()> {
        self.put(key, value).await
    }

    /// Get string set value
    pub async fn get_string_set(
        &self,
        key: &str,
        default: BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        self.get(key, default).await
    }

    /// Observe string set value
    pub async fn observe_string_set(&self, key: &str) -> Result<Observer<BTreeSet<String>>> {
        self.observe(key).await
    }
}
