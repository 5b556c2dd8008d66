//! Reference in-memory storage

use crate::error::Result;
use crate::listeners::{ListenerRegistry, UpdateListener};
use crate::storage::Storage;
use crate::subscription::Subscription;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A [`Storage`] backed by a `HashMap`
///
/// Writes and the enqueueing of their notifications happen under one lock,
/// so listeners of a key see updates in the order the writes were applied.
/// Listeners themselves run after the lock is released.
///
/// # Example
///
/// ```
/// use persisted::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::<String, u32>::new();
/// storage.store_value(3, &"count".to_string()).unwrap();
/// assert_eq!(storage.retrieve_value(&"count".to_string()).unwrap(), Some(3));
/// ```
pub struct InMemoryStorage<K, V> {
    values: Mutex<HashMap<K, V>>,
    listeners: ListenerRegistry<K, V>,
}

impl<K, V> InMemoryStorage<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty storage
    pub fn new() -> Self {
        Self::with_values(std::iter::empty())
    }

    /// Create a storage pre-populated with `values`
    pub fn with_values(values: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<K, V>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for InMemoryStorage<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for InMemoryStorage<K, V>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryStorage")
            .field("keys", &values.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl<K, V> Storage for InMemoryStorage<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    fn store_value(&self, value: V, key: &K) -> Result<()> {
        let pending = {
            let mut values = self.values();
            values.insert(key.clone(), value.clone());
            self.listeners.enqueue(key, Some(value))
        };

        pending.dispatch();
        Ok(())
    }

    fn remove_value(&self, key: &K) -> Result<()> {
        let pending = {
            let mut values = self.values();
            if values.remove(key).is_none() {
                return Ok(());
            }
            self.listeners.enqueue(key, None)
        };

        pending.dispatch();
        Ok(())
    }

    fn retrieve_value(&self, key: &K) -> Result<Option<V>> {
        Ok(self.values().get(key).cloned())
    }

    fn add_update_listener(&self, key: &K, listener: UpdateListener<V>) -> Subscription {
        self.listeners.add(key, listener)
    }
}
