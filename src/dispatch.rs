//! Main-thread continuation queue.
//!
//! Work that must touch render-thread state is parked here and executed when
//! the owning thread calls [`MainThreadQueue::dispatch_main_thread_tasks`],
//! typically once per frame. Nothing in this module blocks.

use std::{
    collections::VecDeque,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use futures::task::noop_waker_ref;

use crate::executor::{Task, panic_message};

/// A cloneable handle to one shared FIFO of main-thread continuations.
#[derive(Clone, Default)]
pub struct MainThreadQueue {
    pending: Arc<Mutex<VecDeque<Task>>>,
}

impl MainThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `work` until the next dispatch and returns a future for its result.
    ///
    /// The future resolves to `None` if the queue is dropped before the work
    /// runs, or if the work panics.
    pub fn run_in_main_thread<T, F>(&self, work: F) -> impl Future<Output = Option<T>> + Send + use<T, F>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        self.push(Box::new(move || {
            if tx.send(work()).is_err() {
                log::trace!("Main-thread result dropped, receiver went away");
            }
        }));
        async move { rx.receive().await }
    }

    pub fn push(&self, task: Task) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every continuation queued so far and returns how many ran.
    ///
    /// Continuations queued while dispatching wait for the next call, which
    /// keeps one frame's work bounded.
    pub fn dispatch_main_thread_tasks(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let count = batch.len();
        for task in batch {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                log::error!(
                    "Main-thread task execution failed: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
        count
    }

    /// Drives `future` to completion on the current thread while pumping this
    /// queue. Meant for synchronous top-level APIs only; frame loops should
    /// call [`dispatch_main_thread_tasks`](Self::dispatch_main_thread_tasks)
    /// and poll instead.
    pub fn wait_pumping<F: Future>(&self, future: F) -> F::Output {
        let mut future = pin!(future);
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return output;
            }
            if self.dispatch_main_thread_tasks() == 0 {
                std::thread::yield_now();
            }
        }
    }
}

impl std::fmt::Debug for MainThreadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadQueue")
            .field("pending", &self.len())
            .finish()
    }
}
