//! Tasks in flight between a submitting thread and a dispatch queue.
//!
//! A task posted with [`Dispatcher::post`](crate::Dispatcher::post) travels
//! alone. One handed over with [`Dispatcher::invoke`](crate::Dispatcher::invoke)
//! carries a [`Latch`] the submitter blocks on until the queue thread has run
//! it.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::dispatch::Task;

/// A task plus, for blocking hand-offs, the latch to release afterwards.
pub(crate) struct Envelope {
    task: Task,
    latch: Option<Arc<Latch>>,
}

impl Envelope {
    /// A task nobody waits for.
    pub(crate) fn detached(task: Task) -> Self {
        Self { task, latch: None }
    }

    /// A task whose submitter waits on the returned latch.
    pub(crate) fn awaited(task: Task) -> (Self, Arc<Latch>) {
        let latch = Arc::new(Latch::default());
        let envelope = Self {
            task,
            latch: Some(latch.clone()),
        };
        (envelope, latch)
    }

    /// Run the task.
    ///
    /// The latch opens even if the task panics, so the submitter is never
    /// left blocked.
    pub(crate) fn open(self) {
        let Self { task, latch } = self;
        let _release = latch.map(Release);
        task();
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("awaited", &self.latch.is_some())
            .finish_non_exhaustive()
    }
}

/// One-shot gate a blocked submitter waits on.
#[derive(Default)]
pub(crate) struct Latch {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Latch {
    fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Block until the latch opens.
    ///
    /// Waiting on the thread that is meant to open it deadlocks; dispatchers
    /// run such tasks inline instead.
    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }

    #[cfg(test)]
    fn wait_for(&self, timeout: std::time::Duration) -> bool {
        let mut open = self.open.lock();
        if !*open {
            self.opened.wait_for(&mut open, timeout);
        }
        *open
    }
}

struct Release(Arc<Latch>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_detached_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        Envelope::detached(Box::new(move || ran_clone.store(true, Ordering::SeqCst))).open();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_awaited_releases_waiter() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let (envelope, latch) = Envelope::awaited(Box::new(move || ran_clone.store(true, Ordering::SeqCst)));

        let worker = std::thread::spawn(move || envelope.open());
        latch.wait();
        assert!(ran.load(Ordering::SeqCst));
        worker.join().unwrap();
    }

    #[test]
    fn test_latch_opens_on_panic() {
        let (envelope, latch) = Envelope::awaited(Box::new(|| panic!("task failed")));
        assert!(std::thread::spawn(move || envelope.open()).join().is_err());
        assert!(latch.wait_for(Duration::from_secs(1)));
    }

    #[test]
    fn test_unopened_latch_times_out() {
        let (_envelope, latch) = Envelope::awaited(Box::new(|| {}));
        assert!(!latch.wait_for(Duration::from_millis(10)));
    }
}
