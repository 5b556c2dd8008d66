//! The capability every storage backend provides

use crate::error::Result;
use crate::subscription::Subscription;
use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

pub use crate::listeners::UpdateListener;

/// A dynamically typed stored value
///
/// Backends that keep values of mixed types under one roof (a preference
/// domain, for example) use this as their `Value`. Persisters built with
/// [`Persister::with_any_storage`](crate::Persister::with_any_storage) check
/// the concrete type when reading.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// A keyed backend that can store, remove, and retrieve values and report
/// changes to them
///
/// Implementations write through on every call; reads must reflect the
/// backend's current state rather than a cache.
pub trait Storage: Send + Sync + 'static {
    /// The key type; only used for equality and hashing by this crate
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    /// The stored representation
    type Value: Clone + Send + Sync + 'static;

    /// Write `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the write fails.
    fn store_value(&self, value: Self::Value, key: &Self::Key) -> Result<()>;

    /// Delete the value under `key`; later reads return `None`
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the removal fails.
    fn remove_value(&self, key: &Self::Key) -> Result<()>;

    /// Read the value under `key`
    ///
    /// Returns `Ok(None)` when no value is stored.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::UnexpectedValueType`](crate::PersistError::UnexpectedValueType)
    /// if a value is present but has the wrong shape, or the backend's error
    /// if the read fails.
    fn retrieve_value(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Call `listener` whenever the value under `key` changes, through any
    /// path including changes made outside this process
    ///
    /// The listener is never called from within this method, only for
    /// subsequent changes. It receives `None` when the value is removed.
    fn add_update_listener(
        &self,
        key: &Self::Key,
        listener: UpdateListener<Self::Value>,
    ) -> Subscription;
}

/// A [`Storage`] whose values are [`AnyValue`]s
pub trait AnyStorage: Storage<Value = AnyValue> {}

impl<S: Storage<Value = AnyValue>> AnyStorage for S {}
