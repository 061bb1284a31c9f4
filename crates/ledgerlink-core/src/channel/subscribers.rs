// ── Callback fan-out ──
//
// Concurrent subscriber storage. Dispatch always walks a snapshot, so a
// callback may subscribe or unsubscribe (even itself) while it runs.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) struct SubscriberSet<T> {
    next_id: AtomicU64,
    entries: DashMap<u64, Callback<T>>,
}

impl<T> SubscriberSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: DashMap::new(),
        }
    }

    /// Register a callback, returning its id.
    pub(crate) fn insert(&self, callback: Callback<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, callback);
        id
    }

    /// Remove a callback. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Current callbacks in registration order.
    fn snapshot(&self) -> Vec<Callback<T>> {
        let mut entries: Vec<(u64, Callback<T>)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, callback)| callback).collect()
    }

    /// Deliver `value` to every current subscriber.
    ///
    /// A panicking callback is logged and skipped; the rest still receive
    /// the value. Returns how many callbacks completed normally.
    pub(crate) fn dispatch(&self, value: &T) -> usize {
        self.snapshot()
            .iter()
            .filter(|callback| invoke(callback.as_ref(), value))
            .count()
    }
}

/// Run one callback, containing any panic.
pub(crate) fn invoke<T>(callback: &(dyn Fn(&T) + Send + Sync), value: &T) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(value))) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic>".into());
            tracing::error!(%reason, "subscriber callback panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, Callback<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Callback<u32> = Arc::new(move |v: &u32| {
            sink.lock().expect("recorder lock").push(*v);
        });
        (seen, callback)
    }

    #[test]
    fn every_subscriber_receives_every_value() {
        let set = SubscriberSet::new();
        let (a, cb_a) = recorder();
        let (b, cb_b) = recorder();
        set.insert(cb_a);
        set.insert(cb_b);

        assert_eq!(set.dispatch(&1), 2);
        assert_eq!(set.dispatch(&2), 2);

        assert_eq!(*a.lock().expect("lock"), vec![1, 2]);
        assert_eq!(*b.lock().expect("lock"), vec![1, 2]);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let set = SubscriberSet::new();
        set.insert(Arc::new(|v: &u32| {
            if *v > 0 {
                panic!("boom {v}");
            }
        }));
        let (seen, cb) = recorder();
        set.insert(cb);

        assert_eq!(set.dispatch(&7), 1);
        assert_eq!(*seen.lock().expect("lock"), vec![7]);
    }

    #[test]
    fn removal_during_dispatch_is_safe() {
        let set = Arc::new(SubscriberSet::new());
        let (seen, cb) = recorder();

        let weak = Arc::downgrade(&set);
        let self_id = Arc::new(AtomicU64::new(u64::MAX));
        let id_ref = Arc::clone(&self_id);
        let id = set.insert(Arc::new(move |_: &u32| {
            if let Some(set) = weak.upgrade() {
                set.remove(id_ref.load(Ordering::SeqCst));
            }
        }));
        self_id.store(id, Ordering::SeqCst);
        set.insert(cb);

        set.dispatch(&1);
        set.dispatch(&2);

        assert_eq!(set.len(), 1);
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2]);
    }

    #[test]
    fn remove_twice_reports_false() {
        let set = SubscriberSet::<u32>::new();
        let id = set.insert(Arc::new(|_: &u32| {}));
        assert!(set.remove(id));
        assert!(!set.remove(id));
    }
}
