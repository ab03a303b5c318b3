use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use tileflow::{ExecutionMode, TaskExecutor};

use crate::common::test_utils::init_logger;

mod common;

/// Submits a task that reports when it started and then blocks until released.
fn submit_blocker(executor: &TaskExecutor) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    executor.submit(move || {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv();
    });
    (started_rx, release_tx)
}

#[test]
fn synchronous_submit_runs_before_returning() {
    init_logger();
    let executor = TaskExecutor::new(ExecutionMode::Synchronous);
    let ran_on = Arc::new(Mutex::new(None));
    let slot = ran_on.clone();
    executor.submit(move || {
        *slot.lock().unwrap() = Some(thread::current().id());
    });
    assert_eq!(*ran_on.lock().unwrap(), Some(thread::current().id()));
    assert_eq!(executor.queued(), 0);
}

#[test]
fn synchronous_failures_are_swallowed() {
    init_logger();
    let executor = TaskExecutor::new(ExecutionMode::Synchronous);
    executor.submit(|| panic!("task failure"));
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    executor.submit(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn queued_tasks_run_in_submission_order_on_one_worker() {
    init_logger();
    let executor = TaskExecutor::with_worker_name(ExecutionMode::Queued, "fifo-worker");
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..100 {
        let order = order.clone();
        executor.submit(move || {
            let name = thread::current().name().map(str::to_string);
            order.lock().unwrap().push((i, name));
        });
    }
    let barrier = executor.run_in_worker(|| ());
    assert_eq!(futures::executor::block_on(barrier), Some(()));

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 100);
    for (expected, (i, name)) in order.iter().enumerate() {
        assert_eq!(*i, expected);
        assert_eq!(name.as_deref(), Some("fifo-worker"));
    }
}

#[test]
fn panicking_task_does_not_stop_the_worker() {
    init_logger();
    let executor = TaskExecutor::new(ExecutionMode::Queued);
    executor.submit(|| panic!("worker task failure"));
    let failed = executor.run_in_worker(|| -> u32 { panic!("value task failure") });
    let value = executor.run_in_worker(|| 5);
    assert_eq!(futures::executor::block_on(failed), None);
    assert_eq!(futures::executor::block_on(value), Some(5));
}

#[test]
fn submit_after_shutdown_is_a_no_op() {
    init_logger();
    for mode in [ExecutionMode::Synchronous, ExecutionMode::Queued] {
        let executor = TaskExecutor::new(mode);
        executor.shutdown();
        assert!(executor.is_shut_down());

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        executor.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(futures::executor::block_on(executor.run_in_worker(|| 1)), None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        executor.shutdown();
    }
}

#[test]
fn shutdown_discards_queued_tasks_and_finishes_the_running_one() {
    init_logger();
    let executor = Arc::new(TaskExecutor::new(ExecutionMode::Queued));
    let (started, release) = submit_blocker(&executor);
    started.recv().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let c = counter.clone();
        executor.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(executor.queued(), 3);

    // Release the running task only once the queue has been taken.
    let watcher = {
        let executor = executor.clone();
        thread::spawn(move || {
            while !executor.is_shut_down() {
                thread::yield_now();
            }
            release.send(()).unwrap();
        })
    };
    executor.shutdown();
    watcher.join().unwrap();

    assert_eq!(executor.queued(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn mode_switch_is_refused_while_tasks_are_queued() {
    init_logger();
    let executor = TaskExecutor::new(ExecutionMode::Queued);
    let (started, release) = submit_blocker(&executor);
    started.recv().unwrap();
    executor.submit(|| ());

    assert!(!executor.set_mode(ExecutionMode::Synchronous));
    assert_eq!(executor.mode(), ExecutionMode::Queued);

    release.send(()).unwrap();
    assert_eq!(futures::executor::block_on(executor.run_in_worker(|| ())), Some(()));
    assert!(executor.set_mode(ExecutionMode::Synchronous));
    assert_eq!(executor.mode(), ExecutionMode::Synchronous);
}
