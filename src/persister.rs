//! Binding of a key, a storage, a transformer, and a default value

use crate::error::{PersistError, Result};
use crate::storage::{AnyValue, Storage};
use crate::subscription::{Cancellable, Subscription};
use crate::transformer::{Downcast, Identity, Transformer};
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

bitflags! {
    /// When a persister writes its default value back to storage
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DefaultValuePersistOption: u8 {
        /// Store the default value when nothing is stored
        const PERSIST_WHEN_NIL = 1;
        /// Store the default value when the stored value cannot be read
        const PERSIST_ON_ERROR = 1 << 1;
    }
}

type UpdateCallback<V> = Box<dyn Fn(Result<Option<V>>) + Send + Sync>;

/// Typed access to one key of one storage
///
/// `retrieve` returns `Ok(None)` when nothing is stored.
trait Binding<V>: Send + Sync {
    fn persist(&self, value: V) -> Result<()>;
    fn remove(&self) -> Result<()>;
    fn retrieve(&self) -> Result<Option<V>>;
    fn subscribe(&self, listener: UpdateCallback<V>) -> Subscription;
}

struct StorageBinding<S: Storage, T> {
    storage: Arc<S>,
    key: S::Key,
    transformer: Arc<T>,
}

impl<S, T> Binding<T::Input> for StorageBinding<S, T>
where
    S: Storage,
    T: Transformer<Output = S::Value> + 'static,
    T::Input: 'static,
{
    fn persist(&self, value: T::Input) -> Result<()> {
        let stored = self
            .transformer
            .transform(value)
            .map_err(PersistError::transform)?;
        self.storage.store_value(stored, &self.key)
    }

    fn remove(&self) -> Result<()> {
        self.storage.remove_value(&self.key)
    }

    fn retrieve(&self) -> Result<Option<T::Input>> {
        self.storage
            .retrieve_value(&self.key)?
            .map(|stored| {
                self.transformer
                    .untransform(stored)
                    .map_err(PersistError::transform)
            })
            .transpose()
    }

    fn subscribe(&self, listener: UpdateCallback<T::Input>) -> Subscription {
        let transformer = Arc::clone(&self.transformer);

        self.storage.add_update_listener(
            &self.key,
            Box::new(move |stored| {
                let update = stored
                    .map(|stored| {
                        transformer
                            .untransform(stored)
                            .map_err(PersistError::transform)
                    })
                    .transpose();
                listener(update);
            }),
        )
    }
}

/// Maps `None` to removal so absence in the domain is absence in storage
struct OptionalBinding<B> {
    inner: B,
}

impl<B, X> Binding<Option<X>> for OptionalBinding<B>
where
    B: Binding<X>,
    X: 'static,
{
    fn persist(&self, value: Option<X>) -> Result<()> {
        match value {
            Some(value) => self.inner.persist(value),
            None => self.inner.remove(),
        }
    }

    fn remove(&self) -> Result<()> {
        self.inner.remove()
    }

    fn retrieve(&self) -> Result<Option<Option<X>>> {
        Ok(self.inner.retrieve()?.map(Some))
    }

    fn subscribe(&self, listener: UpdateCallback<Option<X>>) -> Subscription {
        self.inner
            .subscribe(Box::new(move |update| listener(update.map(|value| value.map(Some)))))
    }
}

/// Persists values of type `V` under one key of a [`Storage`]
///
/// A persister holds no value of its own: every read goes to storage. When
/// nothing readable is stored it falls back to its default value, which is
/// computed on demand and, depending on
/// [`DefaultValuePersistOption`], written back.
///
/// Cloning a persister is cheap and yields a handle to the same binding.
///
/// # Example
///
/// ```
/// use persisted::{InMemoryStorage, Persister};
/// use std::sync::Arc;
///
/// let storage = Arc::new(InMemoryStorage::<String, String>::new());
/// let theme = Persister::new("theme".to_string(), storage, "light".to_string());
///
/// assert_eq!(theme.retrieve_value(), "light");
/// theme.persist("dark".to_string()).unwrap();
/// assert_eq!(theme.retrieve_value(), "dark");
/// ```
pub struct Persister<V> {
    binding: Arc<dyn Binding<V>>,
    key_description: Arc<str>,
    default_value: Arc<dyn Fn() -> V + Send + Sync>,
    default_value_persist_behaviour: DefaultValuePersistOption,
}

impl<V> Clone for Persister<V> {
    fn clone(&self) -> Self {
        Self {
            binding: Arc::clone(&self.binding),
            key_description: Arc::clone(&self.key_description),
            default_value: Arc::clone(&self.default_value),
            default_value_persist_behaviour: self.default_value_persist_behaviour,
        }
    }
}

impl<V> fmt::Debug for Persister<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister")
            .field("key", &self.key_description)
            .field(
                "default_value_persist_behaviour",
                &self.default_value_persist_behaviour,
            )
            .finish_non_exhaustive()
    }
}

impl<V> Persister<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn from_binding<K: fmt::Debug>(
        key: &K,
        binding: impl Binding<V> + 'static,
        default_value: Arc<dyn Fn() -> V + Send + Sync>,
    ) -> Self {
        Self {
            binding: Arc::new(binding),
            key_description: format!("{key:?}").into(),
            default_value,
            default_value_persist_behaviour: DefaultValuePersistOption::empty(),
        }
    }

    /// Persist `V` as-is in a storage whose values are `V`
    pub fn new<S>(key: S::Key, storage: Arc<S>, default_value: V) -> Self
    where
        S: Storage<Value = V>,
    {
        Self::with_transformer(key, storage, Identity::new(), default_value)
    }

    /// Persist `V` through `transformer`
    pub fn with_transformer<S, T>(
        key: S::Key,
        storage: Arc<S>,
        transformer: T,
        default_value: V,
    ) -> Self
    where
        S: Storage,
        T: Transformer<Input = V, Output = S::Value> + 'static,
    {
        let binding = StorageBinding {
            storage,
            key: key.clone(),
            transformer: Arc::new(transformer),
        };
        Self::from_binding(&key, binding, Arc::new(move || default_value.clone()))
    }

    /// Persist `V` in a storage of dynamically typed values
    ///
    /// Reading a value of any other type yields
    /// [`PersistError::UnexpectedValueType`].
    pub fn with_any_storage<S>(key: S::Key, storage: Arc<S>, default_value: V) -> Self
    where
        S: Storage<Value = AnyValue>,
    {
        Self::with_transformer(key, storage, Downcast::new(), default_value)
    }

    /// Compute the default value with `default_value` each time it is needed
    pub fn with_default_value_fn(
        mut self,
        default_value: impl Fn() -> V + Send + Sync + 'static,
    ) -> Self {
        self.default_value = Arc::new(default_value);
        self
    }

    /// Set when the default value is written back to storage
    pub fn with_default_value_persist_behaviour(
        mut self,
        behaviour: DefaultValuePersistOption,
    ) -> Self {
        self.default_value_persist_behaviour = behaviour;
        self
    }

    /// Debug rendering of the key this persister is bound to
    pub fn key_description(&self) -> &str {
        &self.key_description
    }

    /// A freshly computed default value
    pub fn default_value(&self) -> V {
        (self.default_value)()
    }

    pub fn default_value_persist_behaviour(&self) -> DefaultValuePersistOption {
        self.default_value_persist_behaviour
    }

    /// Transform and store `value`
    ///
    /// # Errors
    ///
    /// Returns the transformer's error (nothing is written) or the storage's
    /// error.
    pub fn persist(&self, value: V) -> Result<()> {
        log::trace!("Persisting value for {}", self.key_description);
        self.binding.persist(value)
    }

    /// Remove the stored value
    ///
    /// # Errors
    ///
    /// Returns the storage's error.
    pub fn remove_value(&self) -> Result<()> {
        log::trace!("Removing value for {}", self.key_description);
        self.binding.remove()
    }

    /// Read the stored value, falling back to the default
    ///
    /// Nothing stored yields the default value, written back first when
    /// [`DefaultValuePersistOption::PERSIST_WHEN_NIL`] is set. A value that
    /// cannot be read yields the default value, written back and with the
    /// read error discarded, when
    /// [`DefaultValuePersistOption::PERSIST_ON_ERROR`] is set.
    ///
    /// # Errors
    ///
    /// Returns the read or untransform error when `PERSIST_ON_ERROR` is not
    /// set, and the write error if persisting the default value fails.
    pub fn retrieve_value_or_throw(&self) -> Result<V> {
        match self.binding.retrieve() {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                let default_value = self.default_value();
                if self
                    .default_value_persist_behaviour
                    .contains(DefaultValuePersistOption::PERSIST_WHEN_NIL)
                {
                    log::debug!(
                        "No value stored for {}, persisting default value",
                        self.key_description
                    );
                    self.persist(default_value.clone())?;
                }
                Ok(default_value)
            }
            Err(e) => {
                if !self
                    .default_value_persist_behaviour
                    .contains(DefaultValuePersistOption::PERSIST_ON_ERROR)
                {
                    return Err(e);
                }

                log::warn!(
                    "Failed to read value for {}, persisting default value: {e}",
                    self.key_description
                );
                let default_value = self.default_value();
                self.persist(default_value.clone())?;
                Ok(default_value)
            }
        }
    }

    /// Read the stored value, returning the default on any error
    ///
    /// Applies the same write-back policy as
    /// [`retrieve_value_or_throw`](Self::retrieve_value_or_throw); errors that
    /// would have been returned are logged instead and nothing else is
    /// written.
    pub fn retrieve_value(&self) -> V {
        self.retrieve_value_or_throw().unwrap_or_else(|e| {
            log::debug!(
                "Using default value for {} after error: {e}",
                self.key_description
            );
            self.default_value()
        })
    }

    /// Call `listener` each time the stored value changes
    ///
    /// A removed value is reported as the default value; a value that cannot
    /// be untransformed is reported as an error. The listener stays
    /// registered for as long as the returned subscription is held.
    pub fn add_update_listener(
        &self,
        listener: impl Fn(Result<V>) + Send + Sync + 'static,
    ) -> Subscription {
        let default_value = Arc::clone(&self.default_value);

        self.binding.subscribe(Box::new(move |update| {
            listener(update.map(|value| value.unwrap_or_else(|| default_value())));
        }))
    }

    /// Updates as an async channel
    ///
    /// # Example
    ///
    /// ```
    /// use persisted::{InMemoryStorage, Persister};
    /// use std::sync::Arc;
    ///
    /// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
    /// let storage = Arc::new(InMemoryStorage::<String, u32>::new());
    /// let volume = Persister::new("volume".to_string(), storage, 5);
    /// let mut updates = volume.updates();
    ///
    /// volume.persist(7).unwrap();
    /// assert_eq!(updates.recv().await.unwrap().unwrap(), 7);
    /// # });
    /// ```
    pub fn updates(&self) -> Updates<V> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.add_update_listener(move |update| {
            // The receiver going away is handled by dropping `Updates`
            let _ = sender.send(update);
        });

        Updates {
            receiver,
            subscription,
        }
    }
}

impl<X> Persister<Option<X>>
where
    X: Clone + Send + Sync + 'static,
{
    /// Persist an optional value where `None` means "nothing stored"
    ///
    /// Persisting `None` removes the stored value instead of storing a null.
    /// The default value is `None`.
    pub fn optional<S>(key: S::Key, storage: Arc<S>) -> Self
    where
        S: Storage<Value = X>,
    {
        Self::optional_with_transformer(key, storage, Identity::new())
    }

    /// Like [`optional`](Self::optional), storing `Some` values through
    /// `transformer`
    pub fn optional_with_transformer<S, T>(key: S::Key, storage: Arc<S>, transformer: T) -> Self
    where
        S: Storage,
        T: Transformer<Input = X, Output = S::Value> + 'static,
    {
        let binding = OptionalBinding {
            inner: StorageBinding {
                storage,
                key: key.clone(),
                transformer: Arc::new(transformer),
            },
        };
        Self::from_binding(&key, binding, Arc::new(|| None::<X>))
    }
}

/// A stream of updates from [`Persister::updates`]
///
/// Dropping it unregisters the underlying listener.
#[derive(Debug)]
pub struct Updates<V> {
    receiver: mpsc::UnboundedReceiver<Result<V>>,
    subscription: Subscription,
}

impl<V> Updates<V> {
    /// Wait for the next update
    ///
    /// Returns `None` once cancelled and drained.
    pub async fn recv(&mut self) -> Option<Result<V>> {
        self.receiver.recv().await
    }

    /// The next update if one is already waiting
    pub fn try_recv(&mut self) -> Option<Result<V>> {
        self.receiver.try_recv().ok()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<V> Cancellable for Updates<V> {
    fn cancel(&self) {
        self.subscription.cancel();
    }
}
