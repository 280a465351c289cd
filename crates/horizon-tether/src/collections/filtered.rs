//! Read-only filtered view.

use std::sync::Arc;

use horizon_tether_core::Signal;
use parking_lot::RwLock;

use super::change::{CollectionChange, CollectionChanged};
use super::config::{CollectionConfig, Delivery};
use super::observable::ObservableCollection;
use super::view::{SharedCollection, View, ViewItem, ViewPolicy};
use crate::error::CollectionError;

/// Predicate deciding which items a [`FilteredList`] shows.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub(crate) struct FilterPolicy<T> {
    predicate: RwLock<Predicate<T>>,
}

impl<T> FilterPolicy<T> {
    fn current(&self) -> Predicate<T> {
        self.predicate.read().clone()
    }
}

impl<T: ViewItem> ViewPolicy<T> for FilterPolicy<T> {
    fn name(&self) -> &'static str {
        "filtered"
    }

    fn insert(&self, items: &mut Vec<T>, item: T) -> Option<CollectionChange<T>> {
        let predicate = self.current();
        if !predicate(&item) {
            return None;
        }
        let index = items.len();
        items.push(item.clone());
        Some(CollectionChange::Add {
            index,
            items: vec![item],
        })
    }

    fn reevaluate(&self, items: &mut Vec<T>, item: &T, occurrences: usize) -> Vec<CollectionChange<T>> {
        let predicate = self.current();
        let present = items.iter().filter(|x| *x == item).count();
        let mut changes = Vec::new();
        if predicate(item) {
            for _ in present..occurrences {
                let index = items.len();
                items.push(item.clone());
                changes.push(CollectionChange::Add {
                    index,
                    items: vec![item.clone()],
                });
            }
        } else {
            while let Some(index) = items.iter().position(|x| x == item) {
                let removed = items.remove(index);
                changes.push(CollectionChange::Remove {
                    index,
                    items: vec![removed],
                });
            }
        }
        changes
    }

    fn rebuild(&self, items: Vec<T>) -> Vec<T> {
        let predicate = self.current();
        items.into_iter().filter(|item| predicate(item)).collect()
    }
}

/// A read-only view of the items of a source collection that satisfy a
/// predicate.
///
/// The view follows the source's structural changes and every item's own
/// property changes: an item that starts satisfying the predicate is
/// appended, one that stops is removed. Items are kept in the order they
/// entered the view. Mutators fail with [`CollectionError::ReadOnly`].
///
/// The predicate runs while the view's lock is held and must not access
/// the view.
///
/// # Example
///
/// ```
/// use horizon_tether::collections::{ConcurrentObservableList, FilteredList, ObservableCollection};
/// use std::sync::Arc;
///
/// let numbers = Arc::new(ConcurrentObservableList::from_vec(vec![1, 2, 3, 4]));
/// let even = FilteredList::new(numbers.clone(), |n: &i32| n % 2 == 0);
/// assert_eq!(even.snapshot(), vec![2, 4]);
///
/// numbers.add(6);
/// assert_eq!(even.snapshot(), vec![2, 4, 6]);
/// ```
pub struct FilteredList<T: ViewItem> {
    view: Arc<View<T, FilterPolicy<T>>>,
}

impl<T: ViewItem> FilteredList<T> {
    /// Create a view of `source` delivering its notifications inline.
    pub fn new(source: SharedCollection<T>, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self::create(source, Arc::new(predicate), Delivery::Inline)
    }

    /// Create a view with custom notification delivery.
    ///
    /// # Errors
    ///
    /// As [`CollectionConfig`] resolution: contradictory options or no
    /// dispatcher to marshal to.
    pub fn with_config(
        source: SharedCollection<T>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        config: CollectionConfig,
    ) -> Result<Self, CollectionError> {
        let delivery = config.resolve()?;
        Ok(Self::create(source, Arc::new(predicate), delivery))
    }

    fn create(source: SharedCollection<T>, predicate: Predicate<T>, delivery: Delivery) -> Self {
        let policy = FilterPolicy {
            predicate: RwLock::new(predicate),
        };
        Self {
            view: View::new(source, policy, delivery),
        }
    }

    /// The current predicate.
    pub fn filter(&self) -> Predicate<T> {
        self.view.policy().current()
    }

    /// Replace the predicate and rebuild the view.
    pub fn set_filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) {
        *self.view.policy().predicate.write() = Arc::new(predicate);
        self.view.refresh();
    }

    /// The collection the view follows.
    pub fn source(&self) -> SharedCollection<T> {
        self.view.source()
    }

    /// Follow `source` instead and rebuild the view.
    pub fn set_source(&self, source: SharedCollection<T>) {
        self.view.set_source(source);
    }

    /// Rebuild the view from the source, re-evaluating every item.
    pub fn refresh(&self) {
        self.view.refresh();
    }

    /// Number of items whose property changes the view follows.
    pub fn observed_items(&self) -> usize {
        self.view.subscribed_items()
    }

    /// Always fails: the view is read-only.
    pub fn add(&self, _item: T) -> Result<(), CollectionError> {
        Err(CollectionError::ReadOnly { operation: "add to" })
    }

    /// Always fails: the view is read-only.
    pub fn insert(&self, _index: usize, _item: T) -> Result<(), CollectionError> {
        Err(CollectionError::ReadOnly { operation: "insert into" })
    }

    /// Always fails: the view is read-only.
    pub fn remove(&self, _item: &T) -> Result<bool, CollectionError> {
        Err(CollectionError::ReadOnly { operation: "remove from" })
    }

    /// Always fails: the view is read-only.
    pub fn remove_at(&self, _index: usize) -> Result<T, CollectionError> {
        Err(CollectionError::ReadOnly { operation: "remove from" })
    }

    /// Always fails: the view is read-only.
    pub fn set(&self, _index: usize, _item: T) -> Result<T, CollectionError> {
        Err(CollectionError::ReadOnly { operation: "replace in" })
    }

    /// Always fails: the view is read-only.
    pub fn clear(&self) -> Result<(), CollectionError> {
        Err(CollectionError::ReadOnly { operation: "clear" })
    }
}

impl<T: ViewItem> ObservableCollection<T> for FilteredList<T> {
    fn len(&self) -> usize {
        self.view.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.view.get(index)
    }

    fn index_of(&self, item: &T) -> Option<usize> {
        self.view.index_of(item)
    }

    fn versioned_snapshot(&self) -> (Vec<T>, u64) {
        self.view.versioned_snapshot()
    }

    fn version(&self) -> u64 {
        self.view.version()
    }

    fn collection_changed(&self) -> &Signal<CollectionChanged<T>> {
        self.view.collection_changed()
    }

    fn count_changed(&self) -> &Signal<usize> {
        self.view.count_changed()
    }
}

impl<T: ViewItem> std::fmt::Debug for FilteredList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredList")
            .field("len", &self.len())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(FilteredList<i32>: Send, Sync);
