//! Marshalling work onto the thread that owns a store.
//!
//! Worker threads cannot make structural changes. Besides recording commands
//! they can hand a closure to a [`MainThreadDispatcher`]: `post` queues it and
//! returns at once, `invoke` blocks until the main thread has run it.
//!
//! [`QueuedDispatcher`] is the real implementation: jobs go through a
//! crossbeam channel and the main thread drains them with
//! [`QueuedDispatcher::run_pending`], typically once per frame or tick.
//! [`ImmediateDispatcher`] runs everything inline for single-threaded hosts.

use std::fmt;
use std::thread::{self, ThreadId};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{trace, warn};

use crate::engine::error::{EcsError, EcsResult};

/// Unit of work handed to a dispatcher.
pub type DispatchJob = Box<dyn FnOnce() + Send>;

/// Runs closures on a designated main thread.
pub trait MainThreadDispatcher: Send + Sync {
    /// Queues `job` to run on the main thread and returns immediately.
    fn post(&self, job: DispatchJob);

    /// Runs `job` on the main thread and returns after it completed. Runs it
    /// inline when called from the main thread.
    fn invoke(&self, job: DispatchJob);

    /// Returns `true` on the main thread.
    fn is_main_thread(&self) -> bool;
}

/// Channel-backed dispatcher whose main thread is the thread that created it.
pub struct QueuedDispatcher {
    main: ThreadId,
    sender: Sender<DispatchJob>,
    receiver: Receiver<DispatchJob>,
}

impl fmt::Debug for QueuedDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedDispatcher").field("main", &self.main).field("pending", &self.pending()).finish()
    }
}

impl Default for QueuedDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuedDispatcher {
    /// Dispatcher owned by the calling thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { main: thread::current().id(), sender, receiver }
    }

    /// Number of queued jobs.
    #[inline]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs every queued job, including jobs queued while draining, and
    /// returns how many ran.
    ///
    /// ## Errors
    /// [`EcsError::NotOwnerThread`] when called off the main thread.
    pub fn run_pending(&self) -> EcsResult<usize> {
        if !self.is_main_thread() {
            return Err(EcsError::NotOwnerThread);
        }
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "dispatcher drained");
        }
        Ok(ran)
    }
}

impl MainThreadDispatcher for QueuedDispatcher {
    fn post(&self, job: DispatchJob) {
        if self.sender.send(job).is_err() {
            warn!("dispatcher queue closed, job dropped");
        }
    }

    fn invoke(&self, job: DispatchJob) {
        if self.is_main_thread() {
            job();
            return;
        }
        let (done, wait) = bounded::<()>(1);
        self.post(Box::new(move || {
            job();
            let _ = done.send(());
        }));
        if wait.recv().is_err() {
            warn!("invoked job did not complete");
        }
    }

    #[inline]
    fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main
    }
}

/// Dispatcher that runs every job inline on the calling thread.
///
/// Unlike the trait contract, `post` does not queue here: it runs the job
/// before returning, exactly like `invoke`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateDispatcher;

impl MainThreadDispatcher for ImmediateDispatcher {
    fn post(&self, job: DispatchJob) {
        job();
    }

    fn invoke(&self, job: DispatchJob) {
        job();
    }

    fn is_main_thread(&self) -> bool {
        true
    }
}
