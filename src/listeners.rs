//! Per-key listener bookkeeping shared by storage backends
//!
//! Backends own one [`ListenerRegistry`] and call [`ListenerRegistry::enqueue`]
//! while they still hold whatever lock serializes their writes, then call
//! [`Pending::dispatch`] once that lock is released. Listener callbacks never
//! run with a registry lock held, so a listener may freely read, write, or
//! subscribe on the same storage.

use crate::subscription::Subscription;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked with the new raw value for a key, `None` meaning removed
pub type UpdateListener<V> = Box<dyn Fn(Option<V>) + Send + Sync>;

type SharedListener<V> = Arc<dyn Fn(Option<V>) + Send + Sync>;

type Slots<K, V> = Mutex<HashMap<K, Arc<Slot<V>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Listeners and undelivered updates for a single key
struct Slot<V> {
    listeners: Mutex<BTreeMap<u64, SharedListener<V>>>,
    queue: Mutex<DispatchQueue<V>>,
}

struct DispatchQueue<V> {
    pending: VecDeque<Option<V>>,
    draining: bool,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            queue: Mutex::new(DispatchQueue {
                pending: VecDeque::new(),
                draining: false,
            }),
        }
    }
}

/// Registry of update listeners, keyed by storage key
pub struct ListenerRegistry<K, V> {
    slots: Arc<Slots<K, V>>,
    next_id: Arc<AtomicU64>,
}

impl<K, V> Clone for ListenerRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, V> Default for ListenerRegistry<K, V> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K, V> std::fmt::Debug for ListenerRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListenerRegistry {{ keys: {} }}", lock(&self.slots).len())
    }
}

impl<K, V> ListenerRegistry<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `key`
    ///
    /// The listener is only called for updates enqueued after this returns.
    /// Dropping or cancelling the returned subscription unregisters it.
    pub fn add(&self, key: &K, listener: UpdateListener<V>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut slots = lock(&self.slots);
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new()));
            lock(&slot.listeners).insert(id, Arc::from(listener));
        }

        let slots = Arc::clone(&self.slots);
        let key = key.clone();

        Subscription::new(move || {
            let mut slots = lock(&slots);
            let Some(slot) = slots.get(&key) else {
                return;
            };

            let now_empty = {
                let mut listeners = lock(&slot.listeners);
                listeners.remove(&id);
                listeners.is_empty()
            };

            if now_empty && !lock(&slot.queue).draining {
                slots.remove(&key);
            }
        })
    }

    /// Number of keys with registered listeners
    pub fn slot_count(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Number of listeners currently registered for `key`
    pub fn listener_count(&self, key: &K) -> usize {
        lock(&self.slots)
            .get(key)
            .map_or(0, |slot| lock(&slot.listeners).len())
    }

    /// Queue `value` for delivery to the listeners of `key`
    ///
    /// Updates for one key are delivered in the order they are enqueued.
    /// Nothing is delivered until [`Pending::dispatch`] is called.
    pub fn enqueue(&self, key: &K, value: Option<V>) -> Pending<K, V> {
        let Some(slot) = lock(&self.slots).get(key).cloned() else {
            return Pending { drain: None };
        };

        let mut queue = lock(&slot.queue);
        queue.pending.push_back(value);

        if queue.draining {
            // Whoever is draining this slot delivers the update after the
            // ones ahead of it
            return Pending { drain: None };
        }

        queue.draining = true;
        drop(queue);

        Pending {
            drain: Some(Drain {
                key: key.clone(),
                slot,
                slots: Arc::clone(&self.slots),
            }),
        }
    }

    /// Enqueue and immediately dispatch
    pub fn notify(&self, key: &K, value: Option<V>) {
        self.enqueue(key, value).dispatch();
    }
}

/// Updates queued by [`ListenerRegistry::enqueue`] that still need delivering
///
/// Dropping it without dispatching, or a listener panicking mid-dispatch,
/// discards the slot's undelivered updates and frees the slot for the next
/// writer.
#[must_use = "queued updates are only delivered by `dispatch`"]
pub struct Pending<K, V> {
    drain: Option<Drain<K, V>>,
}

/// The right to drain one slot
struct Drain<K, V> {
    key: K,
    slot: Arc<Slot<V>>,
    slots: Arc<Slots<K, V>>,
}

impl<K, V> Pending<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Deliver queued updates
    ///
    /// Must be called without holding the backend's own locks.
    pub fn dispatch(mut self) {
        let Some(drain) = &self.drain else {
            return;
        };

        loop {
            let value = {
                let mut queue = lock(&drain.slot.queue);
                match queue.pending.pop_front() {
                    Some(value) => value,
                    None => {
                        queue.draining = false;
                        break;
                    }
                }
            };

            // Snapshot so listeners may subscribe or cancel while being called
            let listeners: Vec<SharedListener<V>> =
                lock(&drain.slot.listeners).values().cloned().collect();

            log::trace!("Dispatching update to {} listener(s)", listeners.len());

            for listener in listeners {
                listener(value.clone());
            }
        }

        if let Some(drain) = self.drain.take() {
            drain.release_if_unused();
        }
    }
}

impl<K: Eq + Hash, V> Drain<K, V> {
    /// Drop the slot if its last listener went away while it was draining
    fn release_if_unused(self) {
        let mut slots = lock(&self.slots);

        let unused = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
            && lock(&self.slot.listeners).is_empty()
            && !lock(&self.slot.queue).draining;

        if unused {
            slots.remove(&self.key);
        }
    }
}

impl<K, V> Drop for Pending<K, V> {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            let mut queue = lock(&drain.slot.queue);
            queue.pending.clear();
            queue.draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type Seen = Arc<Mutex<Vec<Option<u32>>>>;

    fn recorder(seen: &Seen) -> UpdateListener<u32> {
        let seen = Arc::clone(seen);
        Box::new(move |value| seen.lock().unwrap().push(value))
    }

    #[test_log::test]
    fn delivers_to_every_listener_of_the_key() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let first = Seen::default();
        let second = Seen::default();
        let _a = registry.add(&"k", recorder(&first));
        let _b = registry.add(&"k", recorder(&second));

        registry.notify(&"k", Some(1));
        registry.notify(&"k", None);

        assert_eq!(*first.lock().unwrap(), vec![Some(1), None]);
        assert_eq!(*second.lock().unwrap(), vec![Some(1), None]);
    }

    #[test_log::test]
    fn other_keys_are_not_notified() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let seen = Seen::default();
        let _subscription = registry.add(&"b", recorder(&seen));

        registry.notify(&"a", Some(1));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test_log::test]
    fn cancelled_listeners_are_removed() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let seen = Seen::default();
        let subscription = registry.add(&"k", recorder(&seen));
        assert_eq!(registry.listener_count(&"k"), 1);

        drop(subscription);
        registry.notify(&"k", Some(1));

        assert_eq!(registry.listener_count(&"k"), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test_log::test]
    fn reentrant_updates_are_delivered_in_order() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let seen = Seen::default();

        let inner = registry.clone();
        let _writer = registry.add(
            &"k",
            Box::new(move |value| {
                if value == Some(1) {
                    inner.notify(&"k", Some(2));
                    inner.notify(&"k", Some(3));
                }
            }),
        );
        let _recorder = registry.add(&"k", recorder(&seen));

        registry.notify(&"k", Some(1));

        assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(2), Some(3)]);
    }

    #[test_log::test]
    fn listener_can_subscribe_while_being_notified() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let added = Arc::new(Mutex::new(Vec::new()));

        let inner = registry.clone();
        let store = Arc::clone(&added);
        let _subscription = registry.add(
            &"k",
            Box::new(move |_| {
                let subscription = inner.add(&"other", Box::new(|_| {}));
                store.lock().unwrap().push(subscription);
            }),
        );

        registry.notify(&"k", Some(1));

        assert_eq!(registry.listener_count(&"other"), 1);
    }

    #[test_log::test]
    fn undispatched_updates_do_not_block_the_key() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let seen = Seen::default();
        let _subscription = registry.add(&"k", recorder(&seen));

        drop(registry.enqueue(&"k", Some(1)));
        registry.notify(&"k", Some(2));

        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }

    #[test_log::test]
    fn panic_on_one_key_leaves_other_keys_deliverable() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let seen = Seen::default();

        let _panicky = registry.add(&"a", Box::new(|_| panic!("listener failed")));
        let _recorder = registry.add(&"b", recorder(&seen));

        let inner = registry.clone();
        let result = std::thread::spawn(move || {
            let pending = vec![inner.enqueue(&"a", Some(1)), inner.enqueue(&"b", Some(1))];
            for pending in pending {
                pending.dispatch();
            }
        })
        .join();
        assert!(result.is_err());

        registry.notify(&"b", Some(2));

        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }

    #[test_log::test]
    fn slot_is_released_when_last_listener_cancels_during_dispatch() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let own = Arc::new(Mutex::new(None::<Subscription>));

        let handle = Arc::clone(&own);
        let subscription = registry.add(
            &"k",
            Box::new(move |_| {
                handle.lock().unwrap().take();
            }),
        );
        *own.lock().unwrap() = Some(subscription);

        registry.notify(&"k", Some(1));

        assert_eq!(registry.listener_count(&"k"), 0);
        assert_eq!(registry.slot_count(), 0);
    }

    #[test_log::test]
    fn panicking_listener_does_not_block_later_updates() {
        let registry = ListenerRegistry::<&str, u32>::new();
        let seen = Seen::default();

        let panicky = registry.add(&"k", Box::new(|_| panic!("listener failed")));
        let _recorder = registry.add(&"k", recorder(&seen));

        let inner = registry.clone();
        let result = std::thread::spawn(move || inner.notify(&"k", Some(1))).join();
        assert!(result.is_err());

        drop(panicky);
        registry.notify(&"k", Some(2));

        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }
}
