//! Execution contexts for marshaling callbacks onto a designated thread.
//!
//! A [`Dispatcher`] runs closures on one logical thread. Collections and
//! listeners use it to deliver change notifications on, typically, a UI
//! thread instead of whichever thread performed the mutation.
//!
//! # Key Types
//!
//! - [`Dispatcher`] - The execution context trait
//! - [`DispatchQueue`] - A dedicated thread draining a FIFO task queue
//! - [`InlineDispatcher`] - Runs everything immediately on the caller's thread
//!
//! # Current Dispatcher
//!
//! Each thread may have a *current* dispatcher, captured by components that
//! are configured to marshal without naming an explicit target. A
//! [`DispatchQueue`] installs itself as current on its own thread; other
//! threads opt in via [`set_current`].
//!
//! # Example
//!
//! ```
//! use horizon_tether_core::dispatch::{DispatchQueue, Dispatcher};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let queue = DispatchQueue::builder().name("ui").build();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let hits_clone = hits.clone();
//! queue
//!     .invoke(Box::new(move || {
//!         hits_clone.fetch_add(1, Ordering::SeqCst);
//!     }))
//!     .unwrap();
//!
//! // `invoke` blocks until the task has run on the queue thread.
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! queue.shutdown();
//! ```

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use parking_lot::Mutex;

use crate::error::DispatchError;
use crate::invocation::Envelope;
use crate::logging::{PerfSpan, span_names, targets};

/// A unit of work handed to a dispatcher.
pub type Task = Box<dyn FnOnce() + Send>;

/// An execution context bound to one logical thread.
pub trait Dispatcher: Send + Sync {
    /// Returns `true` if the calling thread is this dispatcher's thread.
    fn is_current(&self) -> bool;

    /// Run `task` on the dispatcher's thread and block until it returns.
    ///
    /// Implementations run the task inline when called from their own
    /// thread so that a synchronous hop never waits on itself.
    fn invoke(&self, task: Task) -> Result<(), DispatchError>;

    /// Queue `task` on the dispatcher's thread and return immediately.
    fn post(&self, task: Task) -> Result<(), DispatchError>;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str {
        "dispatcher"
    }
}

impl std::fmt::Debug for dyn Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name())
            .finish()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn Dispatcher>>> = const { RefCell::new(None) };
}

/// Returns the calling thread's current dispatcher, if one is installed.
pub fn current() -> Option<Arc<dyn Dispatcher>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Install `dispatcher` as the calling thread's current dispatcher.
///
/// Returns the previously installed dispatcher.
pub fn set_current(dispatcher: Option<Arc<dyn Dispatcher>>) -> Option<Arc<dyn Dispatcher>> {
    CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), dispatcher))
}

/// A dispatcher that runs every task immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl InlineDispatcher {
    /// Create a shareable inline dispatcher.
    pub fn shared() -> Arc<dyn Dispatcher> {
        Arc::new(Self)
    }
}

impl Dispatcher for InlineDispatcher {
    fn is_current(&self) -> bool {
        true
    }

    fn invoke(&self, task: Task) -> Result<(), DispatchError> {
        task();
        Ok(())
    }

    fn post(&self, task: Task) -> Result<(), DispatchError> {
        task();
        Ok(())
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// Configuration for creating a [`DispatchQueue`].
#[derive(Debug, Clone)]
pub struct DispatchQueueConfig {
    /// Name for the queue thread.
    pub name: String,
    /// Stack size for the queue thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Capacity of the task queue. `None` means unbounded.
    pub queue_capacity: Option<usize>,
}

impl Default for DispatchQueueConfig {
    fn default() -> Self {
        Self {
            name: "horizon-dispatch".to_string(),
            stack_size: None,
            queue_capacity: None,
        }
    }
}

/// Builder for creating a [`DispatchQueue`] with custom configuration.
#[derive(Debug, Default)]
pub struct DispatchQueueBuilder {
    config: DispatchQueueConfig,
}

impl DispatchQueueBuilder {
    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the queue thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Bound the task queue. Posting to a full queue fails with
    /// [`DispatchError::QueueFull`].
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    /// Build and start the queue.
    pub fn build(self) -> DispatchQueue {
        DispatchQueue::with_config(self.config)
    }
}

enum Job {
    Run(Envelope),
    Shutdown,
}

/// State shared between queue handles and the queue thread.
struct QueueShared {
    name: String,
    sender: Sender<Job>,
    thread_id: OnceLock<ThreadId>,
    running: AtomicBool,
    pending: AtomicUsize,
}

impl QueueShared {
    fn submit(&self, envelope: Envelope) -> Result<(), DispatchError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.sender.try_send(Job::Run(envelope)) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                match err {
                    TrySendError::Full(_) => Err(DispatchError::QueueFull),
                    TrySendError::Disconnected(_) => Err(DispatchError::ShutDown),
                }
            }
        }
    }
}

impl Dispatcher for QueueShared {
    fn is_current(&self) -> bool {
        self.thread_id.get() == Some(&thread::current().id())
    }

    fn invoke(&self, task: Task) -> Result<(), DispatchError> {
        if self.is_current() {
            task();
            return Ok(());
        }
        let (envelope, latch) = Envelope::awaited(task);
        self.submit(envelope)?;
        latch.wait();
        Ok(())
    }

    fn post(&self, task: Task) -> Result<(), DispatchError> {
        self.submit(Envelope::detached(task))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A dedicated thread that runs submitted tasks one at a time, in FIFO order.
///
/// The queue installs itself as the [`current`] dispatcher on its thread, so
/// components constructed from inside a queued task capture it automatically.
///
/// Dropping the queue shuts it down after the tasks already submitted have
/// run. Clones of [`DispatchQueue::dispatcher`]
/// outliving the handle fail with [`DispatchError::ShutDown`].
pub struct DispatchQueue {
    shared: Arc<QueueShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchQueue {
    /// Create a queue with default configuration.
    pub fn new() -> Self {
        Self::with_config(DispatchQueueConfig::default())
    }

    /// Create a builder for a custom configuration.
    pub fn builder() -> DispatchQueueBuilder {
        DispatchQueueBuilder::default()
    }

    /// Create a queue with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the thread.
    pub fn with_config(config: DispatchQueueConfig) -> Self {
        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };

        let shared = Arc::new(QueueShared {
            name: config.name.clone(),
            sender,
            thread_id: OnceLock::new(),
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
        });

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let thread_shared = shared.clone();
        let handle = builder
            .spawn(move || run_queue(thread_shared, receiver))
            .expect("failed to spawn dispatch queue thread");
        let _ = shared.thread_id.set(handle.thread().id());

        tracing::debug!(target: targets::DISPATCH, name = %config.name, "dispatch queue started");

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// A shareable dispatcher handle for this queue.
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.shared.clone()
    }

    /// Check if the queue still accepts work.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of submitted tasks that have not finished yet.
    pub fn pending_tasks(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Stop accepting work, run what is already queued, and join the thread.
    ///
    /// Calling this from the queue's own thread only stops intake; the
    /// thread exits once the current task returns.
    pub fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            // A full bounded queue still stops: the loop re-checks `running`.
            let _ = self.shared.sender.try_send(Job::Shutdown);
            tracing::debug!(target: targets::DISPATCH, name = %self.shared.name, "dispatch queue stopping");
        }
        if self.shared.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!(target: targets::DISPATCH, name = %self.shared.name, "dispatch queue thread panicked");
            }
        }
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for DispatchQueue {
    fn is_current(&self) -> bool {
        self.shared.is_current()
    }

    fn invoke(&self, task: Task) -> Result<(), DispatchError> {
        self.shared.invoke(task)
    }

    fn post(&self, task: Task) -> Result<(), DispatchError> {
        self.shared.post(task)
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("name", &self.shared.name)
            .field("running", &self.is_running())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

fn run_queue(shared: Arc<QueueShared>, receiver: Receiver<Job>) {
    let _ = shared.thread_id.set(thread::current().id());
    set_current(Some(shared.clone()));

    while let Ok(job) = receiver.recv() {
        match job {
            Job::Run(envelope) => {
                let outcome = {
                    let _perf = PerfSpan::new(span_names::DISPATCH);
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| envelope.open()))
                };
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                if outcome.is_err() {
                    tracing::error!(target: targets::DISPATCH, name = %shared.name, "dispatched task panicked");
                }
                if !shared.running.load(Ordering::Acquire) && receiver.is_empty() {
                    break;
                }
            }
            Job::Shutdown => break,
        }
    }

    // Run anything that raced in before intake closed.
    while let Ok(Job::Run(envelope)) = receiver.try_recv() {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| envelope.open()));
        shared.pending.fetch_sub(1, Ordering::AcqRel);
    }

    set_current(None);
    tracing::debug!(target: targets::DISPATCH, name = %shared.name, "dispatch queue stopped");
}

static_assertions::assert_impl_all!(DispatchQueue: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_invoke_runs_on_queue_thread() {
        let queue = DispatchQueue::builder().name("test-queue").build();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_on_clone = ran_on.clone();
        queue
            .invoke(Box::new(move || {
                *ran_on_clone.lock() = Some(thread::current().id());
            }))
            .unwrap();

        let ran_on = (*ran_on.lock()).expect("task should have run");
        assert_ne!(ran_on, thread::current().id());
        assert_eq!(Some(&ran_on), queue.shared.thread_id.get());
    }

    #[test]
    fn test_post_preserves_fifo_order() {
        let queue = DispatchQueue::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let received = received.clone();
            queue
                .post(Box::new(move || received.lock().push(i)))
                .unwrap();
        }
        queue.shutdown();

        assert_eq!(*received.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_invoke_from_queue_thread_runs_inline() {
        let queue = Arc::new(DispatchQueue::new());
        let nested_ran = Arc::new(AtomicBool::new(false));

        let dispatcher = queue.dispatcher();
        let nested_clone = nested_ran.clone();
        queue
            .invoke(Box::new(move || {
                assert!(dispatcher.is_current());
                let inner = nested_clone.clone();
                dispatcher
                    .invoke(Box::new(move || inner.store(true, Ordering::SeqCst)))
                    .unwrap();
            }))
            .unwrap();

        assert!(nested_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queue_installs_current_dispatcher() {
        let queue = DispatchQueue::new();
        let saw_current = Arc::new(AtomicBool::new(false));

        let saw_clone = saw_current.clone();
        queue
            .invoke(Box::new(move || {
                let current = current().expect("queue thread should have a current dispatcher");
                saw_clone.store(current.is_current(), Ordering::SeqCst);
            }))
            .unwrap();

        assert!(saw_current.load(Ordering::SeqCst));
        assert!(current().is_none());
    }

    #[test]
    fn test_post_after_shutdown_fails() {
        let queue = DispatchQueue::new();
        let dispatcher = queue.dispatcher();
        queue.shutdown();

        assert!(!queue.is_running());
        assert_eq!(
            dispatcher.post(Box::new(|| {})),
            Err(DispatchError::ShutDown)
        );
    }

    #[test]
    fn test_panicking_task_does_not_kill_queue() {
        let queue = DispatchQueue::new();
        queue.post(Box::new(|| panic!("boom"))).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        queue
            .invoke(Box::new(move || ran_clone.store(true, Ordering::SeqCst)))
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_bounded_queue_reports_full() {
        let queue = DispatchQueue::builder().queue_capacity(1).build();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        // Park the queue thread so the single slot stays occupied.
        queue
            .post(Box::new(move || {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            }))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));

        queue.post(Box::new(|| {})).unwrap();
        assert_eq!(queue.post(Box::new(|| {})), Err(DispatchError::QueueFull));

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_set_current_returns_previous() {
        let inline = InlineDispatcher::shared();
        assert!(set_current(Some(inline)).is_none());
        assert_eq!(current().map(|d| d.name().to_string()), Some("inline".into()));
        assert!(set_current(None).is_some());
        assert!(current().is_none());
    }
}
