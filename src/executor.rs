//! Task execution substrate.
//!
//! [`TaskExecutor`] runs units of work either inline on the calling thread or
//! on a single background worker fed by a FIFO queue. Failures inside a task
//! are caught and logged; they never reach the caller and never stop the
//! worker.
//!
//! Shutdown discards everything that is still queued. A task that is already
//! running is allowed to finish before the worker is joined.

use std::{
    any::Any,
    collections::VecDeque,
    future::Future,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where submitted tasks run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run on the calling thread before `submit` returns.
    #[default]
    Synchronous,
    /// Push onto the queue drained by the background worker.
    Queued,
}

struct State {
    mode: ExecutionMode,
    queue: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Tasks never run while the lock is held, so a poisoned lock still guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs tasks inline or on one lazily started worker thread.
///
/// The mode is stored next to the queue under the same lock, so a mode switch
/// can never interleave with a half-finished submission. Switching while
/// tasks are still queued is refused (see [`set_mode`](Self::set_mode)).
pub struct TaskExecutor {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    worker_name: String,
}

impl TaskExecutor {
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_worker_name(mode, "tileflow-worker")
    }

    pub fn with_worker_name(mode: ExecutionMode, worker_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    mode,
                    queue: VecDeque::new(),
                    shutdown: false,
                }),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
            worker_name: worker_name.into(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.shared.lock().mode
    }

    /// Switches between inline and queued execution.
    ///
    /// Returns `false` and keeps the current mode when tasks are still waiting
    /// in the queue, because their execution context would silently change.
    pub fn set_mode(&self, mode: ExecutionMode) -> bool {
        let mut state = self.shared.lock();
        if state.mode == mode {
            return true;
        }
        if !state.queue.is_empty() {
            log::warn!(
                "Refusing to switch executor to {:?} while {} task(s) are queued",
                mode,
                state.queue.len()
            );
            return false;
        }
        state.mode = mode;
        log::debug!("Executor switched to {:?} mode", mode);
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Number of tasks waiting for the worker.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Fire-and-forget submission. The caller never observes whether the task
    /// succeeded. After [`shutdown`](Self::shutdown) the task is dropped unexecuted.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.shutdown {
            log::debug!("Executor is shut down, dropping submitted task");
            return;
        }
        match state.mode {
            ExecutionMode::Synchronous => {
                drop(state);
                run_isolated("Synchronous", Box::new(task));
            }
            ExecutionMode::Queued => {
                state.queue.push_back(Box::new(task));
                drop(state);
                self.ensure_worker();
                self.shared.wake.notify_one();
            }
        }
    }

    /// Submits a value-producing closure and returns a future for its result.
    ///
    /// The future yields `None` when the task was discarded by shutdown or
    /// panicked before producing a value.
    pub fn run_in_worker<T, F>(&self, work: F) -> impl Future<Output = Option<T>> + Send + use<T, F>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        self.submit(move || {
            if tx.send(work()).is_err() {
                log::trace!("Worker result dropped, receiver went away");
            }
        });
        async move { rx.receive().await }
    }

    /// Stops accepting work, discards the queue, wakes the worker and joins it.
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        let discarded = {
            let mut state = self.shared.lock();
            state.shutdown = true;
            std::mem::take(&mut state.queue)
        };
        self.shared.wake.notify_all();
        if !discarded.is_empty() {
            log::debug!("Discarding {} queued task(s) on shutdown", discarded.len());
        }
        drop(discarded);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Shutdown triggered from inside a task; the loop exits on its own.
                log::debug!("Executor shut down from its own worker thread, not joining");
                return;
            }
            if handle.join().is_err() {
                log::error!("Executor worker thread terminated abnormally");
            }
        }
    }

    fn ensure_worker(&self) {
        self.ensure_worker_with(|name, shared| {
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || worker_loop(&shared))
        });
    }

    fn ensure_worker_with<S>(&self, spawn: S)
    where
        S: FnOnce(&str, Arc<Shared>) -> io::Result<thread::JoinHandle<()>>,
    {
        let error = {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            if worker.is_some() || self.shared.lock().shutdown {
                return;
            }
            match spawn(&self.worker_name, Arc::clone(&self.shared)) {
                Ok(handle) => {
                    log::debug!("Started executor worker thread '{}'", self.worker_name);
                    *worker = Some(handle);
                    return;
                }
                Err(e) => e,
            }
        };
        // The worker lock is released here, so inline tasks may submit again.
        log::error!("Could not start worker thread ({}), running queued tasks inline", error);
        let pending = std::mem::take(&mut self.shared.lock().queue);
        pending
            .into_iter()
            .for_each(|task| run_isolated("Asynchronous", task));
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(ExecutionMode::default())
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TaskExecutor")
            .field("mode", &state.mode)
            .field("queued", &state.queue.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.lock();
            while !state.shutdown && state.queue.is_empty() {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.shutdown {
                let discarded = std::mem::take(&mut state.queue);
                drop(state);
                drop(discarded);
                return;
            }
            state.queue.pop_front()
        };
        if let Some(task) = task {
            run_isolated("Asynchronous", task);
        }
    }
}

fn run_isolated(kind: &str, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        log::error!("{} task execution failed: {}", kind, panic_message(payload.as_ref()));
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown failure".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn synchronous_submit_runs_before_returning() {
        let executor = TaskExecutor::new(ExecutionMode::Synchronous);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        executor.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mode_switch_refused_while_tasks_are_queued() {
        let executor = TaskExecutor::new(ExecutionMode::Queued);
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        executor.submit(move || {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
        });
        started_rx.recv().unwrap();
        executor.submit(|| {});
        assert!(!executor.set_mode(ExecutionMode::Synchronous));
        assert_eq!(executor.mode(), ExecutionMode::Queued);
        gate_tx.send(()).unwrap();
        executor.shutdown();
    }

    #[test]
    fn failed_spawn_runs_queued_tasks_inline_and_they_can_submit_again() {
        let executor = Arc::new(TaskExecutor::new(ExecutionMode::Queued));
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let inner = executor.clone();
        executor.shared.lock().queue.push_back(Box::new(move || {
            inner.submit(move || {
                let _ = done_tx.send(());
            });
        }));

        let outer = executor.clone();
        std::thread::spawn(move || {
            outer.ensure_worker_with(|_, _| Err(io::Error::other("no threads left")));
        });
        done_rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("task submitted from an inline task never ran");
        executor.shutdown();
    }

    #[test]
    fn panic_message_handles_both_string_kinds() {
        let p: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(p.as_ref()), "boom");
        let p: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(p.as_ref()), "bang");
    }
}
