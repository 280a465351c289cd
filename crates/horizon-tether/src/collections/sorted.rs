//! Read-only sorted view.

use std::cmp::Ordering;
use std::sync::Arc;

use horizon_tether_core::Signal;
use parking_lot::RwLock;
use rayon::slice::ParallelSliceMut;

use super::change::{CollectionChange, CollectionChanged};
use super::config::{CollectionConfig, Delivery};
use super::observable::ObservableCollection;
use super::view::{SharedCollection, View, ViewItem, ViewPolicy};
use crate::error::CollectionError;

/// Ordering used by a [`SortedList`].
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Rebuilds of at least this many items sort on the rayon pool.
pub const PARALLEL_SORT_THRESHOLD: usize = 4096;

pub(crate) struct SortPolicy<T> {
    comparator: RwLock<Comparator<T>>,
}

impl<T> SortPolicy<T> {
    fn current(&self) -> Comparator<T> {
        self.comparator.read().clone()
    }
}

/// Index after every item that does not sort after `item`.
fn upper_bound<T>(items: &[T], item: &T, compare: &Comparator<T>) -> usize {
    items.partition_point(|x| compare(x, item) != Ordering::Greater)
}

fn in_place<T>(items: &[T], index: usize, compare: &Comparator<T>) -> bool {
    let item = &items[index];
    let after_previous = index == 0 || compare(&items[index - 1], item) != Ordering::Greater;
    let before_next = index + 1 == items.len() || compare(item, &items[index + 1]) != Ordering::Greater;
    after_previous && before_next
}

impl<T: ViewItem> ViewPolicy<T> for SortPolicy<T> {
    fn name(&self) -> &'static str {
        "sorted"
    }

    fn insert(&self, items: &mut Vec<T>, item: T) -> Option<CollectionChange<T>> {
        let compare = self.current();
        let index = upper_bound(items, &item, &compare);
        items.insert(index, item.clone());
        Some(CollectionChange::Add {
            index,
            items: vec![item],
        })
    }

    fn reevaluate(&self, items: &mut Vec<T>, item: &T, occurrences: usize) -> Vec<CollectionChange<T>> {
        let compare = self.current();
        let mut changes = Vec::new();
        for _ in 0..occurrences {
            let misplaced = items
                .iter()
                .enumerate()
                .position(|(index, x)| x == item && !in_place(items, index, &compare));
            let Some(old_index) = misplaced else {
                break;
            };
            let moved = items.remove(old_index);
            let new_index = upper_bound(items, &moved, &compare);
            items.insert(new_index, moved.clone());
            if new_index != old_index {
                changes.push(CollectionChange::Move {
                    old_index,
                    new_index,
                    item: moved,
                });
            }
        }
        changes
    }

    fn rebuild(&self, mut items: Vec<T>) -> Vec<T> {
        let compare = self.current();
        if items.len() >= PARALLEL_SORT_THRESHOLD {
            items.par_sort_by(|a, b| compare(a, b));
        } else {
            items.sort_by(|a, b| compare(a, b));
        }
        items
    }
}

/// A read-only view of a source collection kept in comparator order.
///
/// Equal items keep the order in which they entered the view. When an item
/// reports a property change that puts it out of order it is moved to its
/// new place with a single `Move`. Mutators fail with
/// [`CollectionError::ReadOnly`].
///
/// The comparator runs while the view's lock is held and must not access
/// the view.
///
/// # Example
///
/// ```
/// use horizon_tether::collections::{ConcurrentObservableList, ObservableCollection, SortedList};
/// use std::sync::Arc;
///
/// let words = Arc::new(ConcurrentObservableList::from_vec(vec!["pear", "fig", "apple"]));
/// let by_len = SortedList::by_key(words.clone(), |w: &&str| w.len());
/// assert_eq!(by_len.snapshot(), vec!["fig", "pear", "apple"]);
///
/// words.add("kiwi");
/// assert_eq!(by_len.snapshot(), vec!["fig", "pear", "kiwi", "apple"]);
/// ```
pub struct SortedList<T: ViewItem> {
    view: Arc<View<T, SortPolicy<T>>>,
}

impl<T: ViewItem> SortedList<T> {
    /// Create a view of `source` ordered by `comparator`, delivering its
    /// notifications inline.
    pub fn new(source: SharedCollection<T>, comparator: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self::create(source, Arc::new(comparator), Delivery::Inline)
    }

    /// Create a view ordered by a key extracted from each item.
    pub fn by_key<K: Ord>(source: SharedCollection<T>, key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::new(source, move |a, b| key(a).cmp(&key(b)))
    }

    /// Create a view with custom notification delivery.
    ///
    /// # Errors
    ///
    /// As [`CollectionConfig`] resolution: contradictory options or no
    /// dispatcher to marshal to.
    pub fn with_config(
        source: SharedCollection<T>,
        comparator: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
        config: CollectionConfig,
    ) -> Result<Self, CollectionError> {
        let delivery = config.resolve()?;
        Ok(Self::create(source, Arc::new(comparator), delivery))
    }

    fn create(source: SharedCollection<T>, comparator: Comparator<T>, delivery: Delivery) -> Self {
        let policy = SortPolicy {
            comparator: RwLock::new(comparator),
        };
        Self {
            view: View::new(source, policy, delivery),
        }
    }

    /// The current comparator.
    pub fn comparator(&self) -> Comparator<T> {
        self.view.policy().current()
    }

    /// Replace the comparator and re-sort.
    pub fn set_comparator(&self, comparator: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) {
        *self.view.policy().comparator.write() = Arc::new(comparator);
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

    /// Rebuild the view from the source.
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

    /// Always fails: the view decides the order.
    pub fn move_item(&self, _from: usize, _to: usize) -> Result<(), CollectionError> {
        Err(CollectionError::ReadOnly { operation: "move within" })
    }

    /// Always fails: the view is read-only.
    pub fn clear(&self) -> Result<(), CollectionError> {
        Err(CollectionError::ReadOnly { operation: "clear" })
    }
}

impl<T: ViewItem> ObservableCollection<T> for SortedList<T> {
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

impl<T: ViewItem> std::fmt::Debug for SortedList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedList")
            .field("len", &self.len())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(SortedList<i32>: Send, Sync);
