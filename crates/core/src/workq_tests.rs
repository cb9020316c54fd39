// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[test]
fn processes_every_item() {
    let done = Arc::new(AtomicUsize::new(0));
    let done2 = Arc::clone(&done);
    let wq = WorkQueue::new(4, move |_item: u32| {
        done2.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..100u32 {
        wq.add(i, false).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while done.load(Ordering::SeqCst) < 100 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(done.load(Ordering::SeqCst), 100);
}

#[test]
fn shutdown_drains_and_joins_within_idle_window() {
    let done = Arc::new(AtomicUsize::new(0));
    let done2 = Arc::clone(&done);
    let wq = WorkQueue::new(4, move |_item: u32| {
        done2.fetch_add(1, Ordering::SeqCst);
    });
    for i in 0..100u32 {
        wq.add(i, false).unwrap();
    }

    let start = Instant::now();
    wq.shutdown().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2), "slow shutdown");
    assert_eq!(done.load(Ordering::SeqCst), 100);
    assert_eq!(wq.workers(), 0);
}

#[test]
fn add_after_shutdown_is_rejected() {
    let wq = WorkQueue::new(2, |_item: u32| {});
    wq.shutdown().unwrap();
    assert_eq!(wq.add(1, false), Err(WorkqError::Invalid));
    assert_eq!(wq.shutdown(), Err(WorkqError::Invalid));
}

#[test]
fn priority_items_jump_the_queue() {
    // single worker, gated so the queue backs up
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new((Mutex::new(false), Condvar::new()));

    let order2 = Arc::clone(&order);
    let gate2 = Arc::clone(&gate);
    let wq = WorkQueue::new(1, move |item: u32| {
        let mut open = gate2.0.lock();
        while !*open {
            gate2.1.wait(&mut open);
        }
        drop(open);
        order2.lock().push(item);
    });

    wq.add(1, false).unwrap();
    // give the worker time to take item 1 and block on the gate
    std::thread::sleep(Duration::from_millis(50));
    wq.add(2, false).unwrap();
    wq.add(3, true).unwrap();

    *gate.0.lock() = true;
    gate.1.notify_all();
    wq.shutdown().unwrap();

    assert_eq!(*order.lock(), vec![1, 3, 2]);
}

#[test]
fn idle_workers_exit_on_their_own() {
    let wq = WorkQueue::new(4, |_item: u32| {});
    for i in 0..8u32 {
        wq.add(i, false).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while wq.workers() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(wq.workers(), 0);
}
