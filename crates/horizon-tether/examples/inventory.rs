//! Inventory walkthrough: a dotted-path binding plus filtered and sorted
//! views over a list mutated from worker threads.
//!
//! Run with `RUST_LOG=horizon_tether=debug` to watch bindings re-resolve and
//! views refresh.

use std::sync::Arc;
use std::thread;

use horizon_tether::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Bindable, Default)]
struct Product {
    #[property(name = "Name")]
    name: Property<String>,

    #[property(name = "Stock")]
    stock: Property<i64>,

    #[notify]
    notifier: PropertyChangedNotifier,
}

impl PartialEq for Product {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[derive(Bindable, Default)]
struct Store {
    #[property(name = "Featured")]
    featured: Property<Value>,

    #[notify]
    notifier: PropertyChangedNotifier,
}

fn product(name: &str, stock: i64) -> Arc<Product> {
    let product = Product::default();
    product.set_name(name.to_string());
    product.set_stock(stock);
    Arc::new(product)
}

fn main() -> horizon_tether::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Bind the featured product's stock to a label, through the store.
    let store = Arc::new(Store::default());
    let label = Arc::new(DynamicObject::new("Label").with_property("Text", Value::Null));
    let _featured = HierarchicalBinding::builder()
        .source(&store, "Featured.Stock")
        .target(&label, "Text")
        .fallback("n/a")
        .build()?;
    println!("featured stock: {}", label.get("Text").unwrap_or_default());

    let lamp = product("lamp", 3);
    store.set_featured(Value::object(lamp.clone()));
    println!("featured stock: {}", label.get("Text").unwrap_or_default());
    lamp.set_stock(2);
    println!("featured stock: {}", label.get("Text").unwrap_or_default());

    // Views over a list filled concurrently.
    let inventory = Arc::new(ConcurrentObservableList::<Arc<Product>>::new());
    let low = Arc::new(FilteredList::new(inventory.clone(), |p: &Arc<Product>| p.stock() < 5));
    let by_stock = SortedList::by_key(low.clone(), |p: &Arc<Product>| p.stock());

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let inventory = inventory.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    inventory.add(product(&format!("item-{worker}-{i}"), i64::from(worker * 5 + i)));
                }
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }
    inventory.add(lamp.clone());

    println!("{} products, {} low on stock", inventory.len(), low.len());
    for product in by_stock.snapshot() {
        println!("  {:<10} {}", product.name(), product.stock());
    }

    lamp.set_stock(10);
    println!("after restocking the lamp: {} low on stock", by_stock.len());
    Ok(())
}
