//! Live, type-checked subscriptions per key
//!
//! A key becomes bound the first time it is observed: the registry caches a
//! value for it, and the tag of that value is the binding. From then on every
//! write, read or observation of the key must carry the same [`PrefKind`].
//! Subscriptions are never dropped; individual listeners can be.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{PrefError, Result};
use crate::value::{PrefKind, PrefType, PrefValue};

type Listener = Arc<dyn Fn(&PrefValue) + Send + Sync>;

/// Identifies a listener registered through [`Observer::listen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    value: PrefValue,
    listeners: Vec<(ListenerId, Listener)>,
}

impl Subscription {
    fn listeners(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, l)| l.clone()).collect()
    }
}

/// Registry of subscriptions, owned by one [`PrefStore`](crate::PrefStore)
pub struct ObservationRegistry {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    next_listener: AtomicU64,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Kind the key is bound to, if it has been observed
    pub fn binding(&self, key: &str) -> Option<PrefKind> {
        self.subscriptions().get(key).map(|s| s.value.kind())
    }

    pub fn is_observed(&self, key: &str) -> bool {
        self.subscriptions().contains_key(key)
    }

    /// Last value pushed to the key's observers
    pub fn current(&self, key: &str) -> Option<PrefValue> {
        self.subscriptions().get(key).map(|s| s.value.clone())
    }

    /// Number of observed keys
    pub fn len(&self) -> usize {
        self.subscriptions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions().is_empty()
    }

    /// Fail if `key` is bound to anything other than `kind`. Unbound keys pass.
    pub fn check(&self, key: &str, kind: PrefKind) -> Result<()> {
        match self.binding(key) {
            Some(bound) if bound != kind => Err(mismatch(key, bound, kind)),
            _ => Ok(()),
        }
    }

    /// Create the subscription for `key` seeded with `seed`, or validate an
    /// existing one against the seed's kind.
    ///
    /// Returns the cached value, which for an existing subscription is the
    /// value it already held rather than `seed`.
    pub fn subscribe(&self, key: &str, seed: PrefValue) -> Result<PrefValue> {
        let mut subscriptions = self.subscriptions();

        // Existing subscription keeps its cached value
        if let Some(existing) = subscriptions.get(key) {
            let bound = existing.value.kind();
            if bound != seed.kind() {
                return Err(mismatch(key, bound, seed.kind()));
            }
            return Ok(existing.value.clone());
        }

        log::debug!("Bound preference '{}' to {}", key, seed.kind());
        subscriptions.insert(
            key.to_string(),
            Subscription {
                value: seed.clone(),
                listeners: Vec::new(),
            },
        );
        Ok(seed)
    }

    /// Push `value` to the observers of `key`.
    ///
    /// No-op if nobody observes the key. Listeners run in registration order on
    /// the calling thread, after the registry lock is released.
    pub fn notify(&self, key: &str, value: PrefValue) -> Result<()> {
        let listeners = {
            let mut subscriptions = self.subscriptions();
            let Some(subscription) = subscriptions.get_mut(key) else {
                return Ok(());
            };

            let bound = subscription.value.kind();
            if bound != value.kind() {
                return Err(mismatch(key, bound, value.kind()));
            }

            subscription.value = value.clone();
            subscription.listeners()
        };

        // Lock released; listeners may re-enter the registry
        for listener in listeners {
            listener(&value);
        }
        Ok(())
    }

    /// Reset an observed key to its bound kind's zero value and notify.
    ///
    /// Used after the key is deleted from storage; the binding survives.
    pub fn reset(&self, key: &str) -> Result<()> {
        match self.binding(key) {
            Some(kind) => self.notify(key, PrefValue::zero(kind)),
            None => Ok(()),
        }
    }

    fn add_listener(
        &self,
        key: &str,
        seed: PrefValue,
        listener: Listener,
    ) -> (ListenerId, PrefValue) {
        let mut subscriptions = self.subscriptions();
        // Seed only applies if the subscription was never created
        let subscription = subscriptions
            .entry(key.to_string())
            .or_insert_with(|| Subscription {
                value: seed,
                listeners: Vec::new(),
            });
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        subscription.listeners.push((id, listener));
        (id, subscription.value.clone())
    }

    fn remove_listener(&self, key: &str, id: ListenerId) -> bool {
        let mut subscriptions = self.subscriptions();
        let Some(subscription) = subscriptions.get_mut(key) else {
            return false;
        };
        let before = subscription.listeners.len();
        subscription.listeners.retain(|(existing, _)| *existing != id);
        subscription.listeners.len() != before
    }

    fn listener_count(&self, key: &str) -> usize {
        self.subscriptions()
            .get(key)
            .map(|s| s.listeners.len())
            .unwrap_or(0)
    }
}

impl Default for ObservationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(key: &str, bound: PrefKind, attempted: PrefKind) -> PrefError {
    log::warn!(
        "Rejected {} for preference '{}' bound to {}",
        attempted,
        key,
        bound
    );
    PrefError::TypeMismatch {
        key: key.to_string(),
        expected: bound,
        found: attempted,
    }
}

/// Typed view of one subscription
pub struct Observer<T> {
    key: String,
    registry: Arc<ObservationRegistry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PrefType> Observer<T> {
    /// Bind `key` to `T` and seed it, or attach to the existing subscription
    pub fn subscribe(registry: Arc<ObservationRegistry>, key: &str, seed: T) -> Result<Self> {
        registry.subscribe(key, seed.into_value())?;
        Ok(Self {
            key: key.to_string(),
            registry,
            _marker: PhantomData,
        })
    }

    /// Observed key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current cached value
    pub fn value(&self) -> T {
        self.registry
            .current(&self.key)
            .and_then(|v| T::from_value(&v))
            .unwrap_or_else(T::zero)
    }

    /// Register a listener. It is called right away with the current value,
    /// then once per accepted update.
    pub fn listen<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        // Values of another kind never reach a bound subscription
        let wrapped: Listener = Arc::new(move |value: &PrefValue| {
            if let Some(value) = T::from_value(value) {
                listener(&value);
            }
        });

        let (id, current) =
            self.registry
                .add_listener(&self.key, T::zero().into_value(), wrapped.clone());
        wrapped(&current);
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unlisten(&self, id: ListenerId) -> bool {
        self.registry.remove_listener(&self.key, id)
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.registry.listener_count(&self.key)
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            registry: self.registry.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("key", &self.key)
            .field("binding", &self.registry.binding(&self.key))
            .finish()
    }
}
