//! Observer registry shared by the cache, the sandbox and the orchestrator.
//!
//! Observers are plain callbacks. The registry clones the current list
//! before invoking it, so a callback may subscribe or unsubscribe without
//! deadlocking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Registry<T> = Mutex<BTreeMap<u64, Observer<T>>>;

pub struct ObserverSet<T> {
    observers: Arc<Registry<T>>,
    next_id: AtomicU64,
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self {
            observers: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T: 'static> ObserverSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(observer));

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.observers);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                }
            })),
        }
    }

    pub fn notify(&self, value: &T) {
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for observer in observers {
            observer(value);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered observer.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notifies_until_dropped() {
        let set = ObserverSet::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let sub = set.subscribe(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });
        set.notify(&2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        drop(sub);
        set.notify(&5);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn explicit_unsubscribe_removes_only_that_observer() {
        let set = ObserverSet::<()>::new();
        let first = set.subscribe(|_| {});
        let _second = set.subscribe(|_| {});
        assert_eq!(set.len(), 2);
        first.unsubscribe();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn subscription_outliving_the_set_is_harmless() {
        let set = ObserverSet::<()>::new();
        let sub = set.subscribe(|_| {});
        drop(set);
        drop(sub);
    }
}
