//! Property-style access to a persisted value

use crate::persister::Persister;

/// A read/write handle over a [`Persister`] that never fails
///
/// Reads fall back to the default value on any error. Writes are
/// fire-and-forget: a failed write is logged and otherwise only visible
/// through the persister's update listeners or by calling
/// [`Persister::persist`] directly.
///
/// For `Persisted<Option<X>>` built from [`Persister::optional`], setting
/// `None` removes the stored value.
///
/// # Example
///
/// ```
/// use persisted::{InMemoryStorage, Persisted, Persister, Storage};
/// use std::sync::Arc;
///
/// let storage = Arc::new(InMemoryStorage::<String, String>::new());
/// let nickname = Persisted::new(Persister::optional("nickname".to_string(), storage.clone()));
///
/// nickname.set(Some("ada".to_string()));
/// assert_eq!(nickname.get(), Some("ada".to_string()));
///
/// nickname.set(None);
/// assert_eq!(storage.retrieve_value(&"nickname".to_string()).unwrap(), None);
/// ```
#[derive(Debug, Clone)]
pub struct Persisted<V> {
    persister: Persister<V>,
}

impl<V> Persisted<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(persister: Persister<V>) -> Self {
        Self { persister }
    }

    /// The stored value, or the default value if it is missing or unreadable
    pub fn get(&self) -> V {
        self.persister.retrieve_value()
    }

    /// Store `value`, logging rather than returning any error
    pub fn set(&self, value: V) {
        if let Err(e) = self.persister.persist(value) {
            log::warn!(
                "Failed to persist value for {}: {e}",
                self.persister.key_description()
            );
        }
    }

    /// Remove the stored value so reads return the default again
    pub fn reset(&self) {
        if let Err(e) = self.persister.remove_value() {
            log::warn!(
                "Failed to remove value for {}: {e}",
                self.persister.key_description()
            );
        }
    }

    /// The underlying persister, for subscriptions and fallible access
    pub fn persister(&self) -> &Persister<V> {
        &self.persister
    }
}

impl<V> From<Persister<V>> for Persisted<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn from(persister: Persister<V>) -> Self {
        Self::new(persister)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use crate::storage::Storage;
    use crate::subscription::Subscription;
    use crate::transformer::JsonTransformer;
    use crate::{InMemoryStorage, UpdateListener};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Rejects every write
    struct ReadOnly;

    impl Storage for ReadOnly {
        type Key = String;
        type Value = Vec<u8>;

        fn store_value(&self, _value: Vec<u8>, _key: &String) -> crate::Result<()> {
            Err(PersistError::storage(std::io::Error::other("read-only")))
        }

        fn remove_value(&self, _key: &String) -> crate::Result<()> {
            Err(PersistError::storage(std::io::Error::other("read-only")))
        }

        fn retrieve_value(&self, _key: &String) -> crate::Result<Option<Vec<u8>>> {
            Ok(Some(b"not json".to_vec()))
        }

        fn add_update_listener(
            &self,
            _key: &String,
            _listener: UpdateListener<Vec<u8>>,
        ) -> Subscription {
            Subscription::empty()
        }
    }

    #[test_log::test]
    fn get_and_set_go_through_storage() {
        let storage = Arc::new(InMemoryStorage::<String, u32>::new());
        let volume = Persisted::new(Persister::new("volume".to_string(), storage.clone(), 5));

        assert_eq!(volume.get(), 5);
        volume.set(8);
        assert_eq!(volume.get(), 8);
        assert_eq!(storage.retrieve_value(&"volume".to_string()).unwrap(), Some(8));

        volume.reset();
        assert_eq!(volume.get(), 5);
        assert!(storage.is_empty());
    }

    #[test_log::test]
    fn errors_are_swallowed() {
        let persisted: Persisted<u32> = Persister::with_transformer(
            "volume".to_string(),
            Arc::new(ReadOnly),
            JsonTransformer::new(),
            5,
        )
        .into();

        persisted.set(8);
        persisted.reset();

        assert_eq!(persisted.get(), 5);
        assert!(persisted.persister().retrieve_value_or_throw().is_err());
    }

    #[test_log::test]
    fn setting_none_removes() {
        let storage = Arc::new(InMemoryStorage::<String, String>::new());
        let nickname = Persisted::new(Persister::optional("nickname".to_string(), storage.clone()));

        nickname.set(Some("ada".to_string()));
        assert_eq!(storage.len(), 1);

        nickname.set(None);
        assert!(storage.is_empty());
        assert_eq!(nickname.get(), None);
    }
}
