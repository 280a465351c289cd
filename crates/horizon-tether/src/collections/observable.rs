//! The read surface shared by collections and views, and ordered delivery
//! of their notifications.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use horizon_tether_core::Signal;
use horizon_tether_core::logging::targets;
use parking_lot::Mutex;

use super::change::CollectionChanged;
use super::config::Delivery;

/// Bound for collection elements.
pub trait CollectionItem: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> CollectionItem for T {}

/// A collection that reports its changes.
///
/// Implemented by the concurrent collections and by the views derived from
/// them, so views can be stacked.
pub trait ObservableCollection<T: CollectionItem>: Send + Sync {
    /// Number of items.
    fn len(&self) -> usize;

    /// Returns `true` if there are no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `index`.
    fn get(&self, index: usize) -> Option<T>;

    /// Position of the first item equal to `item`.
    fn index_of(&self, item: &T) -> Option<usize>;

    /// Returns `true` if an item equal to `item` is present.
    fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// A copy of the items.
    fn snapshot(&self) -> Vec<T> {
        self.versioned_snapshot().0
    }

    /// A copy of the items together with the version they reflect.
    ///
    /// Events with a version at or below the returned one are already
    /// reflected in the copy.
    fn versioned_snapshot(&self) -> (Vec<T>, u64);

    /// Current version; increases by one per mutation.
    fn version(&self) -> u64;

    /// Emitted after every change.
    fn collection_changed(&self) -> &Signal<CollectionChanged<T>>;

    /// Emitted with the new length after changes that alter it.
    fn count_changed(&self) -> &Signal<usize>;
}

/// The signals a collection emits.
pub(crate) struct ChangeSignals<T: CollectionItem> {
    pub(crate) collection_changed: Signal<CollectionChanged<T>>,
    pub(crate) count_changed: Signal<usize>,
}

/// A queued notification.
#[derive(Debug)]
pub(crate) enum Notification<T> {
    Changed(CollectionChanged<T>),
    Count(usize),
}

impl<T: CollectionItem> ChangeSignals<T> {
    fn emit(&self, notification: Notification<T>) {
        match notification {
            Notification::Changed(change) => self.collection_changed.emit(change),
            Notification::Count(count) => self.count_changed.emit(count),
        }
    }
}

thread_local! {
    /// Queues whose signals are being emitted on this thread.
    static EMITTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a queue as emitting on the current thread until dropped.
struct Emitting(usize);

impl Emitting {
    fn enter(key: usize) -> Self {
        EMITTING.with(|keys| keys.borrow_mut().push(key));
        Self(key)
    }

    fn active(key: usize) -> bool {
        EMITTING.with(|keys| keys.borrow().contains(&key))
    }
}

impl Drop for Emitting {
    fn drop(&mut self) {
        EMITTING.with(|keys| {
            let mut keys = keys.borrow_mut();
            if let Some(pos) = keys.iter().rposition(|k| *k == self.0) {
                keys.remove(pos);
            }
        });
    }
}

struct Pending<T> {
    queue: VecDeque<Notification<T>>,
    /// Notifications ever queued.
    issued: u64,
    /// Notifications taken off the queue for delivery.
    delivered: u64,
}

/// Delivers notifications in the order they were queued.
///
/// Owners queue a mutation's notifications while still holding their own
/// lock, release it, and call [`drain`](Self::drain). `drain` returns only
/// once everything queued before it has been delivered: one thread at a time
/// delivers, in queue order, so a mutator may end up delivering notifications
/// of earlier mutations made on other threads before its own.
///
/// A callback that mutates the owner while its notification is being emitted
/// does not wait; the delivery in progress picks up its notifications.
pub(crate) struct ChangeQueue<T: CollectionItem> {
    signals: Arc<ChangeSignals<T>>,
    pending: Mutex<Pending<T>>,
    delivery_lock: Mutex<()>,
    /// Highest sequence number queued from inside one of our own callbacks.
    nested_through: AtomicU64,
    delivery: Delivery,
}

impl<T: CollectionItem> ChangeQueue<T> {
    pub(crate) fn new(delivery: Delivery) -> Self {
        Self {
            signals: Arc::new(ChangeSignals {
                collection_changed: Signal::new(),
                count_changed: Signal::new(),
            }),
            pending: Mutex::new(Pending {
                queue: VecDeque::new(),
                issued: 0,
                delivered: 0,
            }),
            delivery_lock: Mutex::new(()),
            nested_through: AtomicU64::new(0),
            delivery,
        }
    }

    pub(crate) fn collection_changed(&self) -> &Signal<CollectionChanged<T>> {
        &self.signals.collection_changed
    }

    pub(crate) fn count_changed(&self) -> &Signal<usize> {
        &self.signals.count_changed
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.signals) as usize
    }

    pub(crate) fn push(&self, notifications: impl IntoIterator<Item = Notification<T>>) {
        let mut pending = self.pending.lock();
        let before = pending.queue.len();
        pending.queue.extend(notifications);
        pending.issued += (pending.queue.len() - before) as u64;
    }

    /// Deliver everything queued so far, then return.
    pub(crate) fn drain(&self) {
        let target = self.pending.lock().issued;
        if Emitting::active(self.key()) {
            self.nested_through.fetch_max(target, Ordering::AcqRel);
            return;
        }

        let _delivering = self.delivery_lock.lock();
        loop {
            let goal = target.max(self.nested_through.load(Ordering::Acquire));
            let next = {
                let mut pending = self.pending.lock();
                if pending.delivered >= goal {
                    None
                } else {
                    let next = pending.queue.pop_front();
                    if next.is_some() {
                        pending.delivered += 1;
                    }
                    next
                }
            };
            match next {
                Some(notification) => self.deliver(notification),
                None => return,
            }
        }
    }

    /// Deliver one notification immediately, bypassing the queue.
    pub(crate) fn deliver(&self, notification: Notification<T>) {
        let key = self.key();
        match &self.delivery {
            Delivery::Inline => emit_guarded(&self.signals, Some(key), notification),
            Delivery::Invoke(dispatcher) => {
                let signals = self.signals.clone();
                let task = Box::new(move || emit_guarded(&signals, Some(key), notification));
                if let Err(err) = dispatcher.invoke(task) {
                    tracing::warn!(target: targets::COLLECTIONS, dispatcher = dispatcher.name(), error = %err, "notification dropped");
                }
            }
            Delivery::Post(dispatcher) => {
                // Nobody waits on a posted emission, so callbacks may take the
                // delivery lock normally.
                let signals = self.signals.clone();
                let task = Box::new(move || emit_guarded(&signals, None, notification));
                if let Err(err) = dispatcher.post(task) {
                    tracing::warn!(target: targets::COLLECTIONS, dispatcher = dispatcher.name(), error = %err, "notification dropped");
                }
            }
        }
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.pending.lock().queue.len()
    }
}

/// Emit one notification. A panicking subscriber is logged and does not
/// stop later notifications.
fn emit_guarded<T: CollectionItem>(signals: &ChangeSignals<T>, key: Option<usize>, notification: Notification<T>) {
    let _emitting = key.map(Emitting::enter);
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| signals.emit(notification)));
    if outcome.is_err() {
        tracing::error!(target: targets::COLLECTIONS, "collection subscriber panicked");
    }
}

impl<T: CollectionItem> std::fmt::Debug for ChangeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeQueue")
            .field("pending", &self.pending.lock().queue.len())
            .field("delivery", &self.delivery)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::change::CollectionChange;

    #[test]
    fn test_drain_in_order() {
        let queue = Arc::new(ChangeQueue::<i32>::new(Delivery::Inline));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        queue.collection_changed().connect(move |change| seen_clone.lock().push(change.version));
        let seen_clone = seen.clone();
        queue.count_changed().connect(move |count| seen_clone.lock().push(100 + *count as u64));

        queue.push([
            Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 1)),
            Notification::Count(0),
            Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 2)),
        ]);
        queue.drain();
        assert_eq!(*seen.lock(), vec![1, 100, 2]);
    }

    #[test]
    fn test_nested_push_is_delivered_after_current() {
        let queue = Arc::new(ChangeQueue::<i32>::new(Delivery::Inline));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&queue);
        let seen_clone = seen.clone();
        queue.collection_changed().connect(move |change| {
            seen_clone.lock().push(change.version);
            if change.version == 1
                && let Some(queue) = weak.upgrade()
            {
                queue.push([Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 3))]);
                queue.drain();
                // Not delivered yet: the outer drain owns delivery.
                assert_eq!(queue.queued(), 2);
            }
        });

        queue.push([
            Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 1)),
            Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 2)),
        ]);
        queue.drain();
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_delivery() {
        let queue = ChangeQueue::<i32>::new(Delivery::Inline);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        queue.collection_changed().connect(move |change| {
            seen_clone.lock().push(change.version);
            if change.version == 1 {
                panic!("subscriber failure");
            }
        });

        for version in 1..=3 {
            queue.push([Notification::Changed(CollectionChanged::new(CollectionChange::Reset, version))]);
            queue.drain();
        }
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(queue.queued(), 0);
    }

    #[test]
    fn test_drain_waits_for_delivery_in_progress() {
        use std::sync::mpsc;
        use std::time::Duration;

        let queue = Arc::new(ChangeQueue::<i32>::new(Delivery::Inline));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (parked_tx, parked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let seen_clone = seen.clone();
        queue.collection_changed().connect(move |change| {
            if change.version == 1 {
                parked_tx.send(()).unwrap();
                release_rx.lock().recv().unwrap();
            }
            seen_clone.lock().push(change.version);
        });

        let first = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                queue.push([Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 1))]);
                queue.drain();
            })
        };
        parked_rx.recv().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let second = {
            let queue = queue.clone();
            let seen = seen.clone();
            std::thread::spawn(move || {
                queue.push([Notification::Changed(CollectionChanged::new(CollectionChange::Reset, 2))]);
                queue.drain();
                done_tx.send(seen.lock().clone()).unwrap();
            })
        };

        // The second drain may not return while the first delivery is parked.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        release_tx.send(()).unwrap();
        assert_eq!(done_rx.recv().unwrap(), vec![1, 2]);
        first.join().unwrap();
        second.join().unwrap();
    }
}
