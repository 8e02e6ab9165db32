use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use columnar_ecs::{EcsError, ImmediateDispatcher, MainThreadDispatcher, QueuedDispatcher};

#[test]
fn post_queues_until_the_main_thread_drains() {
    let dispatcher = Arc::new(QueuedDispatcher::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let worker = {
        let dispatcher = dispatcher.clone();
        let counter = counter.clone();
        thread::spawn(move || {
            assert!(!dispatcher.is_main_thread());
            for _ in 0..3 {
                let counter = counter.clone();
                dispatcher.post(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
            assert_eq!(dispatcher.run_pending(), Err(EcsError::NotOwnerThread));
        })
    };
    worker.join().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(dispatcher.pending(), 3);
    assert_eq!(dispatcher.run_pending(), Ok(3));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn invoke_blocks_until_the_main_thread_ran_the_job() {
    let dispatcher = Arc::new(QueuedDispatcher::new());
    let ran_on = Arc::new(std::sync::Mutex::new(None));
    let main = thread::current().id();

    let worker = {
        let dispatcher = dispatcher.clone();
        let ran_on = ran_on.clone();
        thread::spawn(move || {
            let slot = ran_on.clone();
            dispatcher.invoke(Box::new(move || {
                *slot.lock().unwrap() = Some(thread::current().id());
            }));
            assert!(ran_on.lock().unwrap().is_some());
        })
    };

    while !worker.is_finished() {
        dispatcher.run_pending().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    worker.join().unwrap();
    assert_eq!(*ran_on.lock().unwrap(), Some(main));
}

#[test]
fn invoke_on_the_main_thread_runs_inline() {
    let dispatcher = QueuedDispatcher::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let inner = counter.clone();
    dispatcher.invoke(Box::new(move || {
        inner.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.pending(), 0);
}

#[test]
fn immediate_dispatcher_runs_everything_inline() {
    let dispatcher = ImmediateDispatcher;
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let counter = counter.clone();
        dispatcher.post(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert!(dispatcher.is_main_thread());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}
