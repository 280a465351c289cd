//! Observable list with batch operations.

use std::cmp::Ordering;

use horizon_tether_core::Signal;

use super::change::{CollectionChange, CollectionChanged};
use super::collection::ConcurrentObservableCollection;
use super::config::CollectionConfig;
use super::observable::{CollectionItem, ObservableCollection};
use crate::error::CollectionError;

/// A [`ConcurrentObservableCollection`] with list conveniences.
///
/// Batch operations send one notification per contiguous block rather than
/// one per item.
///
/// # Example
///
/// ```
/// use horizon_tether::collections::{ConcurrentObservableList, ObservableCollection};
///
/// let list = ConcurrentObservableList::new();
/// list.add_range([5, 3, 8, 1]);
/// assert_eq!(list.remove_where(|x| *x > 4), 2);
/// list.sort_by(|a, b| a.cmp(b));
/// assert_eq!(list.snapshot(), vec![1, 3]);
/// ```
#[derive(Debug)]
pub struct ConcurrentObservableList<T: CollectionItem> {
    inner: ConcurrentObservableCollection<T>,
}

impl<T: CollectionItem> ConcurrentObservableList<T> {
    /// Create an empty list delivering inline.
    pub fn new() -> Self {
        Self {
            inner: ConcurrentObservableCollection::new(),
        }
    }

    /// Create a list holding `items`, delivering inline.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: ConcurrentObservableCollection::from_vec(items),
        }
    }

    /// Create an empty list with custom delivery.
    pub fn with_config(config: CollectionConfig) -> Result<Self, CollectionError> {
        Ok(Self {
            inner: ConcurrentObservableCollection::with_config(config)?,
        })
    }

    /// Create a list holding `items` with custom delivery.
    pub fn with_items(items: Vec<T>, config: CollectionConfig) -> Result<Self, CollectionError> {
        Ok(Self {
            inner: ConcurrentObservableCollection::with_items(items, config)?,
        })
    }

    /// Append `item`.
    pub fn add(&self, item: T) {
        self.inner.add(item);
    }

    /// Insert `item` at `index`.
    pub fn insert(&self, index: usize, item: T) -> Result<(), CollectionError> {
        self.inner.insert(index, item)
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T, CollectionError> {
        self.inner.remove_at(index)
    }

    /// Remove the first item equal to `item`.
    pub fn remove(&self, item: &T) -> bool {
        self.inner.remove(item)
    }

    /// Replace the item at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: T) -> Result<T, CollectionError> {
        self.inner.set(index, item)
    }

    /// Move the item at `old_index` to `new_index`.
    pub fn move_item(&self, old_index: usize, new_index: usize) -> Result<(), CollectionError> {
        self.inner.move_item(old_index, new_index)
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Append all of `items` with a single `Add` notification.
    pub fn add_range(&self, items: impl IntoIterator<Item = T>) {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        self.inner.mutate(|edit| {
            let index = edit.items().len();
            edit.items_mut().extend(items.iter().cloned());
            edit.changed(CollectionChange::Add { index, items });
            edit.count_changed();
        });
    }

    /// Remove every item matching `predicate`, returning how many were removed.
    ///
    /// Sends one `Remove` per contiguous block of removed items, last block
    /// first, so each notification's index is valid when applied in order.
    /// `predicate` runs under the list's lock and must not access the list.
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        self.inner.mutate(|edit| {
            let marks: Vec<bool> = edit.items().iter().map(&mut predicate).collect();
            let mut blocks = Vec::new();
            let mut i = 0;
            while i < marks.len() {
                if marks[i] {
                    let start = i;
                    while i < marks.len() && marks[i] {
                        i += 1;
                    }
                    blocks.push(start..i);
                } else {
                    i += 1;
                }
            }

            let removed: usize = blocks.iter().map(|block| block.len()).sum();
            for block in blocks.into_iter().rev() {
                let index = block.start;
                let items: Vec<T> = edit.items_mut().drain(block).collect();
                edit.changed(CollectionChange::Remove { index, items });
            }
            if removed > 0 {
                edit.count_changed();
            }
            removed
        })
    }

    /// Keep only the items matching `predicate`.
    pub fn retain(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        self.remove_where(|item| !predicate(item))
    }

    /// The first item matching `predicate`.
    pub fn first_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.inner
            .read(|state| state.items.iter().find(|item| predicate(*item)).cloned())
    }

    /// Replace the contents, sending `Reset` followed by one `Add`.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) {
        let items: Vec<T> = items.into_iter().collect();
        self.inner.mutate(|edit| {
            *edit.items_mut() = items.clone();
            edit.changed(CollectionChange::Reset);
            if !items.is_empty() {
                edit.changed(CollectionChange::Add { index: 0, items });
            }
            edit.count_changed();
        });
    }

    /// Stable-sort the items, sending `Reset`.
    pub fn sort_by(&self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        self.inner.mutate(|edit| {
            edit.items_mut().sort_by(&mut compare);
            edit.changed(CollectionChange::Reset);
        });
    }
}

impl<T: CollectionItem> Default for ConcurrentObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> From<Vec<T>> for ConcurrentObservableList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: CollectionItem> FromIterator<T> for ConcurrentObservableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: CollectionItem> ObservableCollection<T> for ConcurrentObservableList<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.inner.get(index)
    }

    fn index_of(&self, item: &T) -> Option<usize> {
        self.inner.index_of(item)
    }

    fn versioned_snapshot(&self) -> (Vec<T>, u64) {
        self.inner.versioned_snapshot()
    }

    fn version(&self) -> u64 {
        self.inner.version()
    }

    fn collection_changed(&self) -> &Signal<CollectionChanged<T>> {
        self.inner.collection_changed()
    }

    fn count_changed(&self) -> &Signal<usize> {
        self.inner.count_changed()
    }
}
