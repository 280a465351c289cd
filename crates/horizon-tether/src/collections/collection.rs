//! Thread-safe observable collection.

use std::cell::RefCell;

use horizon_tether_core::Signal;
use horizon_tether_core::logging::targets;
use parking_lot::ReentrantMutex;

use super::change::{CollectionChange, CollectionChanged};
use super::config::{CollectionConfig, Delivery};
use super::observable::{ChangeQueue, CollectionItem, Notification, ObservableCollection};
use crate::error::CollectionError;

pub(crate) struct State<T> {
    pub(crate) items: Vec<T>,
    version: u64,
}

/// A mutation in progress: the items plus the notifications it will send.
pub(crate) struct Edit<'a, T: CollectionItem> {
    state: &'a mut State<T>,
    notifications: Vec<Notification<T>>,
}

impl<T: CollectionItem> Edit<'_, T> {
    pub(crate) fn items(&self) -> &[T] {
        &self.state.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<T> {
        &mut self.state.items
    }

    /// Record a change, advancing the version.
    pub(crate) fn changed(&mut self, change: CollectionChange<T>) {
        self.state.version += 1;
        self.notifications
            .push(Notification::Changed(CollectionChanged::new(change, self.state.version)));
    }

    /// Record the current length.
    pub(crate) fn count_changed(&mut self) {
        self.notifications.push(Notification::Count(self.state.items.len()));
    }
}

/// A collection that many threads can mutate and observe.
///
/// Every mutation is applied and its notifications queued under one lock;
/// notifications are then delivered after the lock is released, in mutation
/// order, so subscribers may read or even mutate the collection from their
/// callbacks. A mutating call returns once its own notifications have been
/// delivered (or, with asynchronous marshaling, posted). Set
/// [`CollectionConfig::hold_lock_during_notify`] to deliver while still
/// holding the lock instead.
///
/// # Example
///
/// ```
/// use horizon_tether::collections::{CollectionChange, ConcurrentObservableCollection, ObservableCollection};
/// use std::sync::Arc;
/// use parking_lot::Mutex;
///
/// let names = ConcurrentObservableCollection::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let seen_clone = seen.clone();
/// names.collection_changed().connect(move |event| seen_clone.lock().push(event.change.clone()));
///
/// names.add("ada".to_string());
/// names.insert(0, "grace".to_string()).unwrap();
/// assert_eq!(names.snapshot(), vec!["grace".to_string(), "ada".to_string()]);
/// assert!(matches!(seen.lock()[1], CollectionChange::Add { index: 0, .. }));
/// ```
pub struct ConcurrentObservableCollection<T: CollectionItem> {
    state: ReentrantMutex<RefCell<State<T>>>,
    queue: ChangeQueue<T>,
    hold_lock: bool,
}

impl<T: CollectionItem> ConcurrentObservableCollection<T> {
    /// Create an empty collection delivering inline.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create a collection holding `items`, delivering inline.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::build(items, CollectionConfig::inline(), Delivery::Inline)
    }

    /// Create an empty collection with custom delivery.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidConfig`] for contradictory options and
    /// [`CollectionError::NoExecutionContext`] when marshaling is requested
    /// without a dispatcher available.
    pub fn with_config(config: CollectionConfig) -> Result<Self, CollectionError> {
        Self::with_items(Vec::new(), config)
    }

    /// Create a collection holding `items` with custom delivery.
    pub fn with_items(items: Vec<T>, config: CollectionConfig) -> Result<Self, CollectionError> {
        let delivery = config.resolve()?;
        Ok(Self::build(items, config, delivery))
    }

    fn build(items: Vec<T>, config: CollectionConfig, delivery: Delivery) -> Self {
        tracing::debug!(target: targets::COLLECTIONS, len = items.len(), ?delivery, "collection created");
        Self {
            state: ReentrantMutex::new(RefCell::new(State { items, version: 0 })),
            queue: ChangeQueue::new(delivery),
            hold_lock: config.hold_lock_during_notify,
        }
    }

    /// Apply `f` under the lock and deliver what it recorded.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Edit<'_, T>) -> R) -> R {
        let guard = self.state.lock();
        let (result, notifications) = {
            let mut state = guard.borrow_mut();
            let mut edit = Edit {
                state: &mut *state,
                notifications: Vec::new(),
            };
            let result = f(&mut edit);
            (result, edit.notifications)
        };

        if self.hold_lock {
            for notification in notifications {
                self.queue.deliver(notification);
            }
            return result;
        }

        if notifications.is_empty() {
            return result;
        }
        self.queue.push(notifications);
        drop(guard);
        self.queue.drain();
        result
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&State<T>) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Append `item`.
    pub fn add(&self, item: T) {
        self.mutate(|edit| {
            let index = edit.items().len();
            edit.items_mut().push(item.clone());
            edit.changed(CollectionChange::Add {
                index,
                items: vec![item],
            });
            edit.count_changed();
        });
    }

    /// Insert `item` at `index`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index > len`.
    pub fn insert(&self, index: usize, item: T) -> Result<(), CollectionError> {
        self.mutate(|edit| {
            let len = edit.items().len();
            if index > len {
                return Err(CollectionError::IndexOutOfRange { index, len });
            }
            edit.items_mut().insert(index, item.clone());
            edit.changed(CollectionChange::Add {
                index,
                items: vec![item],
            });
            edit.count_changed();
            Ok(())
        })
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T, CollectionError> {
        self.mutate(|edit| {
            let len = edit.items().len();
            if index >= len {
                return Err(CollectionError::IndexOutOfRange { index, len });
            }
            let item = edit.items_mut().remove(index);
            edit.changed(CollectionChange::Remove {
                index,
                items: vec![item.clone()],
            });
            edit.count_changed();
            Ok(item)
        })
    }

    /// Remove the first item equal to `item`. Returns whether one was found.
    pub fn remove(&self, item: &T) -> bool {
        self.mutate(|edit| {
            let Some(index) = edit.items().iter().position(|x| x == item) else {
                return false;
            };
            let removed = edit.items_mut().remove(index);
            edit.changed(CollectionChange::Remove {
                index,
                items: vec![removed],
            });
            edit.count_changed();
            true
        })
    }

    /// Replace the item at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: T) -> Result<T, CollectionError> {
        self.mutate(|edit| {
            let len = edit.items().len();
            if index >= len {
                return Err(CollectionError::IndexOutOfRange { index, len });
            }
            let old = std::mem::replace(&mut edit.items_mut()[index], item.clone());
            edit.changed(CollectionChange::Replace {
                index,
                old: old.clone(),
                new: item,
            });
            Ok(old)
        })
    }

    /// Move the item at `old_index` so that it ends up at `new_index`.
    ///
    /// Moving an item onto its own position changes nothing and sends no
    /// notification.
    pub fn move_item(&self, old_index: usize, new_index: usize) -> Result<(), CollectionError> {
        self.mutate(|edit| {
            let len = edit.items().len();
            for index in [old_index, new_index] {
                if index >= len {
                    return Err(CollectionError::IndexOutOfRange { index, len });
                }
            }
            if old_index == new_index {
                return Ok(());
            }
            let item = edit.items_mut().remove(old_index);
            edit.items_mut().insert(new_index, item.clone());
            edit.changed(CollectionChange::Move {
                old_index,
                new_index,
                item,
            });
            Ok(())
        })
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.mutate(|edit| {
            edit.items_mut().clear();
            edit.changed(CollectionChange::Reset);
            edit.count_changed();
        });
    }
}

impl<T: CollectionItem> Default for ConcurrentObservableCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> FromIterator<T> for ConcurrentObservableCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: CollectionItem> ObservableCollection<T> for ConcurrentObservableCollection<T> {
    fn len(&self) -> usize {
        self.read(|state| state.items.len())
    }

    fn get(&self, index: usize) -> Option<T> {
        self.read(|state| state.items.get(index).cloned())
    }

    fn index_of(&self, item: &T) -> Option<usize> {
        self.read(|state| state.items.iter().position(|x| x == item))
    }

    fn versioned_snapshot(&self) -> (Vec<T>, u64) {
        self.read(|state| (state.items.clone(), state.version))
    }

    fn version(&self) -> u64 {
        self.read(|state| state.version)
    }

    fn collection_changed(&self) -> &Signal<CollectionChanged<T>> {
        self.queue.collection_changed()
    }

    fn count_changed(&self) -> &Signal<usize> {
        self.queue.count_changed()
    }
}

impl<T: CollectionItem> std::fmt::Debug for ConcurrentObservableCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (len, version) = self.read(|state| (state.items.len(), state.version));
        f.debug_struct("ConcurrentObservableCollection")
            .field("len", &len)
            .field("version", &version)
            .field("queue", &self.queue)
            .finish()
    }
}

static_assertions::assert_impl_all!(ConcurrentObservableCollection<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn record<T: CollectionItem>(
        collection: &ConcurrentObservableCollection<T>,
    ) -> (Arc<Mutex<Vec<CollectionChanged<T>>>>, Arc<Mutex<Vec<usize>>>) {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let counts = Arc::new(Mutex::new(Vec::new()));
        let changes_clone = changes.clone();
        collection
            .collection_changed()
            .connect(move |event| changes_clone.lock().push(event.clone()));
        let counts_clone = counts.clone();
        collection.count_changed().connect(move |count| counts_clone.lock().push(*count));
        (changes, counts)
    }

    #[test]
    fn test_add_insert_remove_events() {
        let collection = ConcurrentObservableCollection::new();
        let (changes, counts) = record(&collection);

        collection.add(1);
        collection.insert(0, 0).unwrap();
        assert_eq!(collection.remove_at(1), Ok(1));
        assert!(collection.remove(&0));
        assert!(!collection.remove(&0));

        let changes = changes.lock();
        assert_eq!(
            changes.iter().map(|c| c.change.clone()).collect::<Vec<_>>(),
            vec![
                CollectionChange::Add { index: 0, items: vec![1] },
                CollectionChange::Add { index: 0, items: vec![0] },
                CollectionChange::Remove { index: 1, items: vec![1] },
                CollectionChange::Remove { index: 0, items: vec![0] },
            ]
        );
        assert_eq!(changes.iter().map(|c| c.version).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(*counts.lock(), vec![1, 2, 1, 0]);
    }

    #[test]
    fn test_replace_and_move_do_not_report_count() {
        let collection: ConcurrentObservableCollection<_> = ["a", "b", "c"].into_iter().collect();
        let (changes, counts) = record(&collection);

        assert_eq!(collection.set(1, "B"), Ok("b"));
        collection.move_item(0, 2).unwrap();
        collection.move_item(1, 1).unwrap();

        assert_eq!(collection.snapshot(), vec!["B", "c", "a"]);
        assert_eq!(changes.lock().len(), 2);
        assert!(counts.lock().is_empty());
    }

    #[test]
    fn test_clear_sends_reset() {
        let collection = ConcurrentObservableCollection::from_vec(vec![1, 2, 3]);
        let (changes, counts) = record(&collection);

        collection.clear();
        assert!(collection.is_empty());
        assert_eq!(changes.lock()[0].change, CollectionChange::Reset);
        assert_eq!(*counts.lock(), vec![0]);
    }

    #[test]
    fn test_out_of_range() {
        let collection = ConcurrentObservableCollection::from_vec(vec![1]);
        let (changes, _) = record(&collection);

        assert_eq!(
            collection.insert(3, 9),
            Err(CollectionError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(
            collection.remove_at(1),
            Err(CollectionError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert!(collection.set(5, 0).is_err());
        assert!(collection.move_item(0, 1).is_err());
        assert!(changes.lock().is_empty());
        assert_eq!(collection.version(), 0);
    }

    #[test]
    fn test_subscriber_can_mutate() {
        let collection = Arc::new(ConcurrentObservableCollection::new());
        let weak = Arc::downgrade(&collection);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        collection.collection_changed().connect(move |event| {
            seen_clone.lock().push(event.version);
            if let CollectionChange::Add { items, .. } = &event.change
                && items[0] < 3
                && let Some(collection) = weak.upgrade()
            {
                collection.add(items[0] + 1);
            }
        });

        collection.add(1);
        assert_eq!(collection.snapshot(), vec![1, 2, 3]);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_hold_lock_callbacks_see_post_mutation_state() {
        let config = CollectionConfig::builder().hold_lock_during_notify(true).build().unwrap();
        let collection = Arc::new(ConcurrentObservableCollection::with_config(config).unwrap());
        let weak = Arc::downgrade(&collection);
        let lengths = Arc::new(Mutex::new(Vec::new()));

        let lengths_clone = lengths.clone();
        collection.collection_changed().connect(move |_| {
            if let Some(collection) = weak.upgrade() {
                lengths_clone.lock().push(collection.len());
            }
        });

        collection.add("x");
        collection.add("y");
        assert_eq!(*lengths.lock(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_adds_deliver_every_event() {
        let collection = Arc::new(ConcurrentObservableCollection::new());
        let (changes, _) = record(&collection);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let collection = collection.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        collection.add(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collection.len(), 2000);
        let changes = changes.lock();
        assert_eq!(changes.len(), 2000);
        assert!(changes.windows(2).all(|w| w[0].version + 1 == w[1].version));
    }
}
