//! Integration tests for concurrent collections and derived views.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use horizon_tether::collections::{CollectionChangedListener, CollectionItem};
use horizon_tether::prelude::*;
use parking_lot::Mutex;

#[derive(Bindable, Default)]
struct Item {
    #[property(name = "Value")]
    value: Property<i64>,

    #[notify]
    notifier: PropertyChangedNotifier,
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Item({})", self.value())
    }
}

fn item(value: i64) -> Arc<Item> {
    let item = Item::default();
    item.set_value(value);
    Arc::new(item)
}

/// Deterministic pseudo-random sequence for mutation scripts.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn assert_filtered<T: CollectionItem + std::fmt::Debug>(
    source: &dyn ObservableCollection<T>,
    view: &dyn ObservableCollection<T>,
    predicate: impl Fn(&T) -> bool,
) {
    let expected: Vec<T> = source.snapshot().into_iter().filter(|x| predicate(x)).collect();
    let actual = view.snapshot();
    assert_eq!(actual.len(), expected.len(), "view {actual:?} expected {expected:?}");
    for x in &expected {
        let wanted = expected.iter().filter(|y| *y == x).count();
        let present = actual.iter().filter(|y| *y == x).count();
        assert_eq!(present, wanted, "{x:?} appears {present} times, expected {wanted}");
    }
}

#[test]
fn concurrent_adds_notify_once_each() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let list = Arc::new(ConcurrentObservableList::<usize>::new());
    let adds = Arc::new(AtomicUsize::new(0));
    let versions = Arc::new(Mutex::new(Vec::new()));

    let adds_clone = adds.clone();
    let versions_clone = versions.clone();
    list.collection_changed().connect(move |event| {
        if let CollectionChange::Add { items, .. } = &event.change {
            adds_clone.fetch_add(items.len(), Ordering::SeqCst);
        }
        versions_clone.lock().push(event.version);
    });

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let list = list.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    list.add(t * PER_THREAD + i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = THREADS * PER_THREAD;
    assert_eq!(adds.load(Ordering::SeqCst), total);
    assert_eq!(list.len(), total);
    assert!((0..total).all(|x| list.contains(&x)));

    // Delivered in mutation order.
    let versions = versions.lock();
    assert_eq!(*versions, (1..=total as u64).collect::<Vec<_>>());
}

#[test]
fn filtered_view_under_concurrent_adds() {
    let source = Arc::new(ConcurrentObservableList::<i32>::new());
    let filtered = FilteredList::new(source.clone(), |x: &i32| x % 3 == 0);

    let evens = {
        let source = source.clone();
        thread::spawn(move || {
            for x in (0..10_000).step_by(2) {
                source.add(x);
            }
        })
    };
    let threes = {
        let source = source.clone();
        thread::spawn(move || {
            for x in (0..10_000).step_by(3) {
                source.add(x);
            }
        })
    };
    evens.join().unwrap();
    threes.join().unwrap();

    let added: Vec<i32> = (0..10_000).step_by(2).chain((0..10_000).step_by(3)).collect();
    let expected = added.iter().filter(|x| *x % 3 == 0).count();
    assert_eq!(filtered.len(), expected);
    assert_filtered(source.as_ref(), &filtered, |x| x % 3 == 0);
}

#[test]
fn filtered_view_tracks_mutation_script() {
    let items: Vec<_> = (0..20).map(item).collect();
    let source = Arc::new(ConcurrentObservableList::from_vec(items.clone()));
    let even = |x: &Arc<Item>| x.value() % 2 == 0;
    let filtered = FilteredList::new(source.clone(), even);

    let mut rng = Lcg(7);
    let mut spare: Vec<Arc<Item>> = Vec::new();
    for step in 0..400 {
        match rng.next(6) {
            0 => {
                let fresh = item(rng.next(100) as i64);
                spare.push(fresh.clone());
                source.add(fresh);
            }
            1 if !source.is_empty() => {
                let index = rng.next(source.len() as u64) as usize;
                source.remove_at(index).unwrap();
            }
            2 if !source.is_empty() => {
                let index = rng.next(source.len() as u64) as usize;
                source.set(index, item(rng.next(100) as i64)).unwrap();
            }
            3 if step % 50 == 0 => {
                source.replace_all((0..5).map(|v| item(v * 3)));
            }
            _ => {
                if let Some(target) = source.get(rng.next(source.len().max(1) as u64) as usize) {
                    target.set_value(rng.next(100) as i64);
                }
            }
        }
        assert_filtered(source.as_ref(), &filtered, even);
        assert!(filtered.snapshot().iter().all(even));
    }

    // Items no longer in the source are not followed.
    for stale in items.iter().chain(&spare).filter(|x| !source.contains(x)) {
        stale.set_value(0);
    }
    assert_filtered(source.as_ref(), &filtered, even);
}

#[test]
fn duplicate_items_are_counted() {
    let shared = item(2);
    let source = Arc::new(ConcurrentObservableList::from_vec(vec![shared.clone(), item(4), shared.clone()]));
    let filtered = FilteredList::new(source.clone(), |x: &Arc<Item>| x.value() % 2 == 0);
    assert_eq!(filtered.len(), 3);

    shared.set_value(3);
    assert_eq!(filtered.len(), 1);

    shared.set_value(6);
    assert_eq!(filtered.len(), 3);

    source.remove(&shared);
    shared.set_value(7);
    assert_eq!(filtered.len(), 1);
    shared.set_value(8);
    assert_eq!(filtered.len(), 2);
}

#[test]
fn sorted_view_stays_sorted_through_element_changes() {
    let items: Vec<_> = (0..50).map(|v| item(v * 7 % 50)).collect();
    let source = Arc::new(ConcurrentObservableList::from_vec(items.clone()));
    let sorted = SortedList::by_key(source.clone(), |x: &Arc<Item>| x.value());

    let moves = Arc::new(AtomicUsize::new(0));
    let other = Arc::new(AtomicUsize::new(0));
    let moves_clone = moves.clone();
    let other_clone = other.clone();
    sorted.collection_changed().connect(move |event| match event.change {
        CollectionChange::Move { .. } => {
            moves_clone.fetch_add(1, Ordering::SeqCst);
        }
        _ => {
            other_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    let mut rng = Lcg(42);
    for _ in 0..300 {
        let before = moves.load(Ordering::SeqCst);
        let target = &items[rng.next(items.len() as u64) as usize];
        target.set_value(rng.next(100) as i64);
        assert!(moves.load(Ordering::SeqCst) - before <= 1);

        let values: Vec<i64> = sorted.snapshot().iter().map(|x| x.value()).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "not sorted: {values:?}");
    }
    assert_eq!(other.load(Ordering::SeqCst), 0);
    assert_eq!(sorted.len(), items.len());
}

#[test]
fn sorted_view_under_concurrent_adds() {
    let source = Arc::new(ConcurrentObservableList::<i64>::new());
    let sorted = SortedList::new(source.clone(), |a: &i64, b: &i64| b.cmp(a));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let source = source.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    source.add((i * 4 + t) * 37 % 1000);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = sorted.snapshot();
    assert_eq!(snapshot.len(), 1000);
    assert!(snapshot.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn sorted_view_tracks_mutation_script() {
    let items: Vec<_> = (0..20).map(|v| item(v * 13 % 20)).collect();
    let source = Arc::new(ConcurrentObservableList::from_vec(items));
    let sorted = SortedList::by_key(source.clone(), |x: &Arc<Item>| x.value());

    let mut rng = Lcg(11);
    for step in 0..400 {
        match rng.next(6) {
            0 => source.add(item(rng.next(50) as i64)),
            1 if !source.is_empty() => {
                let index = rng.next(source.len() as u64) as usize;
                source.remove_at(index).unwrap();
            }
            2 if !source.is_empty() => {
                let index = rng.next(source.len() as u64) as usize;
                source.set(index, item(rng.next(50) as i64)).unwrap();
            }
            3 if step % 50 == 0 => {
                source.replace_all((0..8).map(|v| item(v * 5 % 8)));
            }
            4 if source.len() > 1 => {
                let from = rng.next(source.len() as u64) as usize;
                let to = rng.next(source.len() as u64) as usize;
                source.move_item(from, to).unwrap();
            }
            _ => {
                if let Some(target) = source.get(rng.next(source.len().max(1) as u64) as usize) {
                    target.set_value(rng.next(50) as i64);
                }
            }
        }
        assert_filtered(source.as_ref(), &sorted, |_| true);
        let values: Vec<i64> = sorted.snapshot().iter().map(|x| x.value()).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "step {step}: not sorted: {values:?}");
    }
}

#[test]
fn source_moves_are_ignored_by_views() {
    let source = Arc::new(ConcurrentObservableList::from_vec(vec![5, 2, 8, 1, 4, 6]));
    let filtered = FilteredList::new(source.clone(), |x: &i32| x % 2 == 0);
    let sorted = SortedList::new(source.clone(), |a: &i32, b: &i32| a.cmp(b));
    let filtered_before = filtered.snapshot();
    let sorted_before = sorted.snapshot();

    let events = Arc::new(AtomicUsize::new(0));
    for view in [&filtered as &dyn ObservableCollection<i32>, &sorted] {
        let events = events.clone();
        view.collection_changed().connect(move |_| {
            events.fetch_add(1, Ordering::SeqCst);
        });
    }

    source.move_item(0, 4).unwrap();
    source.move_item(5, 0).unwrap();
    assert_eq!(source.snapshot(), vec![6, 2, 8, 1, 4, 5]);

    assert_eq!(events.load(Ordering::SeqCst), 0);
    assert_eq!(filtered.snapshot(), filtered_before);
    assert_eq!(sorted.snapshot(), sorted_before);

    // Later changes still apply incrementally.
    source.add(10);
    assert_eq!(events.load(Ordering::SeqCst), 2);
    assert_eq!(filtered.snapshot().last(), Some(&10));
    assert_eq!(sorted.snapshot(), vec![1, 2, 4, 5, 6, 8, 10]);
}

#[test]
fn mutation_returns_after_its_notifications_are_delivered() {
    use std::sync::mpsc;
    use std::time::Duration;

    let list = Arc::new(ConcurrentObservableList::<i32>::new());
    let view = Arc::new(FilteredList::new(list.clone(), |_: &i32| true));
    let (parked_tx, parked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    list.collection_changed().connect(move |event| {
        if event.version == 1 {
            parked_tx.send(()).unwrap();
            release_rx.lock().recv().unwrap();
        }
    });

    let first = {
        let list = list.clone();
        thread::spawn(move || list.add(1))
    };
    parked_rx.recv().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let second = {
        let list = list.clone();
        let view = view.clone();
        thread::spawn(move || {
            list.add(2);
            done_tx.send(view.contains(&2)).unwrap();
        })
    };

    // Delivery of the first add is still in progress, so the second add
    // cannot have returned yet.
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    release_tx.send(()).unwrap();
    assert!(done_rx.recv().unwrap());

    first.join().unwrap();
    second.join().unwrap();
    assert_eq!(view.snapshot(), vec![1, 2]);
}

#[test]
fn panicking_subscriber_does_not_silence_collection() {
    let list = Arc::new(ConcurrentObservableList::<i32>::new());
    let view = FilteredList::new(list.clone(), |x: &i32| *x > 1);
    let versions = Arc::new(Mutex::new(Vec::new()));

    let versions_clone = versions.clone();
    list.collection_changed().connect(move |event| versions_clone.lock().push(event.version));
    list.collection_changed().connect(|event| {
        if event.version == 1 {
            panic!("subscriber failure");
        }
    });

    list.add(1);
    list.add(2);
    list.add(3);

    assert_eq!(*versions.lock(), vec![1, 2, 3]);
    assert_eq!(view.snapshot(), vec![2, 3]);
}

#[test]
fn views_are_read_only_and_leave_source_untouched() {
    let source = Arc::new(ConcurrentObservableList::from_vec(vec![3, 1, 2]));
    let filtered = FilteredList::new(source.clone(), |_: &i32| true);
    let sorted = SortedList::new(source.clone(), |a: &i32, b: &i32| a.cmp(b));
    let version = source.version();

    assert!(matches!(filtered.add(4), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(filtered.remove(&3), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(filtered.insert(0, 9), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(filtered.set(0, 9), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(sorted.add(4), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(sorted.remove(&3), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(sorted.insert(0, 9), Err(CollectionError::ReadOnly { .. })));
    assert!(matches!(sorted.set(0, 9), Err(CollectionError::ReadOnly { .. })));

    assert_eq!(source.version(), version);
    assert_eq!(source.snapshot(), vec![3, 1, 2]);
    assert_eq!(sorted.snapshot(), vec![1, 2, 3]);
}

#[test]
fn views_stack() {
    let items: Vec<_> = [5, 8, 1, 6, 3].into_iter().map(item).collect();
    let source = Arc::new(ConcurrentObservableList::from_vec(items.clone()));
    let odd = Arc::new(FilteredList::new(source.clone(), |x: &Arc<Item>| x.value() % 2 == 1));
    let sorted = SortedList::by_key(odd.clone(), |x: &Arc<Item>| x.value());

    let values = |list: &SortedList<Arc<Item>>| list.snapshot().iter().map(|x| x.value()).collect::<Vec<_>>();
    assert_eq!(values(&sorted), vec![1, 3, 5]);

    items[1].set_value(7);
    assert_eq!(values(&sorted), vec![1, 3, 5, 7]);

    items[0].set_value(4);
    assert_eq!(values(&sorted), vec![1, 3, 7]);

    source.clear();
    assert!(sorted.is_empty());
}

#[test]
fn marshaled_delivery_runs_on_dispatcher_in_order() {
    let ui = DispatchQueue::builder().name("collections-ui").build();
    let config = CollectionConfig::builder().dispatcher(ui.dispatcher()).build().unwrap();
    let list = Arc::new(ConcurrentObservableList::<u32>::with_config(config).unwrap());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let on_ui = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    let on_ui_clone = on_ui.clone();
    let dispatcher = ui.dispatcher();
    list.collection_changed().connect(move |event| {
        if dispatcher.is_current() {
            on_ui_clone.fetch_add(1, Ordering::SeqCst);
        }
        seen_clone.lock().push(event.version);
    });

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let list = list.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    list.add(t * 100 + i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Synchronous marshaling: every add has been delivered by now.
    assert_eq!(on_ui.load(Ordering::SeqCst), 400);
    assert_eq!(*seen.lock(), (1..=400).collect::<Vec<u64>>());
    ui.shutdown();
}

#[test]
fn asynchronous_delivery_completes_after_shutdown() {
    let worker = DispatchQueue::builder().name("collections-async").build();
    let config = CollectionConfig::builder()
        .dispatcher(worker.dispatcher())
        .asynchronous(true)
        .build()
        .unwrap();
    let list = ConcurrentObservableList::<u32>::with_config(config).unwrap();

    let counts = Arc::new(Mutex::new(Vec::new()));
    let counts_clone = counts.clone();
    list.count_changed().connect(move |count| counts_clone.lock().push(*count));

    list.add_range([1, 2, 3]);
    list.add(4);
    list.remove_at(0).unwrap();
    worker.shutdown();

    assert_eq!(*counts.lock(), vec![3, 4, 3]);
}

#[test]
fn marshaling_without_dispatcher_fails() {
    let config = CollectionConfig::builder().marshal(true).build().unwrap();
    // The test thread has no current dispatcher.
    let result = ConcurrentObservableList::<u32>::with_config(config);
    assert!(matches!(result, Err(CollectionError::NoExecutionContext)));
}

#[test]
fn listener_rebroadcasts_view_changes() {
    let source = Arc::new(ConcurrentObservableList::from_vec(vec![1, 2, 3]));
    let filtered = Arc::new(FilteredList::new(source.clone(), |x: &i32| *x > 1));
    let listener = CollectionChangedListener::new(filtered.clone(), InlineDispatcher::shared(), false);

    let kinds = Arc::new(Mutex::new(HashSet::new()));
    let kinds_clone = kinds.clone();
    listener
        .collection_changed()
        .connect(move |event| {
            kinds_clone.lock().insert(event.change.kind());
        });

    source.add(5);
    source.remove(&2);
    filtered.refresh();

    let kinds = kinds.lock();
    assert_eq!(kinds.len(), 3);
    drop(kinds);
    drop(listener);
    assert_eq!(filtered.collection_changed().connection_count(), 0);
}
