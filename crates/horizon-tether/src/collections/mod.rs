//! Thread-safe observable collections and the read-only views derived from
//! them.
//!
//! [`ConcurrentObservableCollection`] and [`ConcurrentObservableList`] may be
//! mutated from any thread. Every mutation bumps the collection's version
//! and produces one [`CollectionChanged`] event; events are delivered in
//! mutation order, outside the collection lock unless the configuration asks
//! otherwise, and optionally marshaled to a [`Dispatcher`].
//!
//! [`FilteredList`] and [`SortedList`] follow any [`ObservableCollection`],
//! including each other, and additionally re-evaluate elements that report
//! their own property changes.
//!
//! # Example
//!
//! ```
//! use horizon_tether::collections::{
//!     ConcurrentObservableList, FilteredList, ObservableCollection, SortedList,
//! };
//! use std::sync::Arc;
//!
//! let numbers = Arc::new(ConcurrentObservableList::from_vec(vec![9, 4, 7, 2]));
//! let odd = Arc::new(FilteredList::new(numbers.clone(), |n: &i32| n % 2 == 1));
//! let odd_sorted = SortedList::new(odd.clone(), |a: &i32, b: &i32| a.cmp(b));
//!
//! numbers.add(1);
//! assert_eq!(odd_sorted.snapshot(), vec![1, 7, 9]);
//! ```
//!
//! [`Dispatcher`]: horizon_tether_core::Dispatcher

mod change;
mod collection;
mod config;
mod filtered;
mod list;
mod listener;
mod observable;
mod sorted;
mod view;

pub use change::{ChangeKind, CollectionChange, CollectionChanged};
pub use collection::ConcurrentObservableCollection;
pub use config::{CollectionConfig, CollectionConfigBuilder};
pub use filtered::{FilteredList, Predicate};
pub use list::ConcurrentObservableList;
pub use listener::{CollectionChangedListener, PropertyChangedListener};
pub use observable::{CollectionItem, ObservableCollection};
pub use sorted::{Comparator, PARALLEL_SORT_THRESHOLD, SortedList};
pub use view::{SharedCollection, ViewItem};
