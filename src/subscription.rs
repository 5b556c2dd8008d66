//! Handles for registered update listeners

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Something that can stop delivering updates
pub trait Cancellable {
    /// Stop the work this handle represents
    ///
    /// Calling this more than once has no further effect.
    fn cancel(&self);
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

type CancelFn = Box<dyn FnOnce() + Send>;

/// A single listener registration
///
/// The subscription owns the cleanup closure handed to it by the backend.
/// Cancelling runs the closure at most once; dropping the subscription
/// cancels it, so holding the value is what keeps the listener alive.
///
/// Subscriptions compare by identity: two separately created
/// subscriptions are never equal.
pub struct Subscription {
    id: u64,
    cancel: Mutex<Option<CancelFn>>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` when cancelled or dropped
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to clean up
    pub fn empty() -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            cancel: Mutex::new(None),
        }
    }

    /// Whether the cleanup has already run (or there never was any)
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Cancellable for Subscription {
    fn cancel(&self) {
        // Take the closure before running it so a re-entrant cancel sees `None`
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(cancel) = cancel {
            log::trace!("Cancelling subscription {}", self.id);
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, subscription)
    }

    #[test_log::test]
    fn cancel_runs_cleanup_exactly_once() {
        let (count, subscription) = counting();

        subscription.cancel();
        subscription.cancel();
        drop(subscription);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn drop_cancels() {
        let (count, subscription) = counting();
        assert!(!subscription.is_cancelled());

        drop(subscription);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn subscriptions_compare_by_identity() {
        let first = Subscription::new(|| {});
        let second = Subscription::new(|| {});

        assert_ne!(first, second);
        assert!(Subscription::empty().is_cancelled());
    }
}
