//! Scheduler lifecycle and batching tests, run on paused time

use parking_lot::Mutex;
use polybot::scheduler::{Scheduler, SchedulerConfig};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(fast_secs: u64, slow_secs: u64, batch: usize) -> SchedulerConfig {
    SchedulerConfig {
        fast_tick_interval: Duration::from_secs(fast_secs),
        slow_tick_interval: Duration::from_secs(slow_secs),
        max_markets_per_tick: batch,
        max_runtime: None,
    }
}

fn market_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("m{:02}", i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_start_stop_lifecycle() {
    let scheduler = Scheduler::new(config(5, 60, 10));
    assert!(!scheduler.is_running());

    // stop before start is harmless
    scheduler.stop().await;

    scheduler.start();
    assert!(scheduler.is_running());

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    // restartable after stop
    scheduler.start();
    assert!(scheduler.is_running());
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_noop() {
    let scheduler = Scheduler::new(config(5, 60, 10));
    let slow_calls = Arc::new(AtomicUsize::new(0));
    let counter = slow_calls.clone();
    scheduler.add_slow_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    scheduler.start();
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // one slow loop, one immediate tick
    assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_ticks_follow_interval() {
    let scheduler = Scheduler::new(config(5, 60, 10));
    let slow_calls = Arc::new(AtomicUsize::new(0));
    let counter = slow_calls.clone();
    scheduler.add_slow_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(150)).await;

    // ticks at 0s, 60s, 120s
    assert_eq!(slow_calls.load(Ordering::SeqCst), 3);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_max_runtime_stops_both_loops() {
    let scheduler = Scheduler::new(SchedulerConfig {
        max_runtime: Some(Duration::from_secs(12)),
        ..config(5, 60, 10)
    });
    scheduler.set_market_ids(market_ids(3));

    let fast_calls = Arc::new(AtomicUsize::new(0));
    let counter = fast_calls.clone();
    scheduler.add_fast_callback(move |_batch| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(!scheduler.is_running());
    // ticks at 0s, 5s, 10s before the deadline
    assert_eq!(fast_calls.load(Ordering::SeqCst), 3);

    // stop after a self-stop still joins cleanly
    scheduler.stop().await;
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_fast_batches_cover_every_market() {
    let ids = market_ids(23);
    let scheduler = Scheduler::new(config(1, 3600, 5));
    scheduler.set_market_ids(ids.clone());

    let batches = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
    let log = batches.clone();
    scheduler.add_fast_callback(move |batch| {
        log.lock().push(batch);
        async { Ok(()) }
    });

    scheduler.start();
    // ceil(23 / 5) = 5 ticks at 0s..4s
    tokio::time::sleep(Duration::from_millis(4500)).await;
    scheduler.stop().await;

    let batches = batches.lock().clone();
    assert_eq!(batches.len(), 5);
    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 5));
    assert_eq!(batches[4].len(), 3);

    let seen: HashSet<&String> = batches.iter().flatten().collect();
    assert_eq!(seen.len(), ids.len());
}

#[tokio::test(start_paused = true)]
async fn test_market_ids_replaced_mid_run() {
    let scheduler = Scheduler::new(config(1, 3600, 2));
    scheduler.set_market_ids(market_ids(4));

    let batches = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
    let log = batches.clone();
    scheduler.add_fast_callback(move |batch| {
        log.lock().push(batch);
        async { Ok(()) }
    });

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.set_market_ids(vec!["x".to_string()]);
    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop().await;

    let batches = batches.lock().clone();
    assert_eq!(batches[0], vec!["m00", "m01"]);
    assert_eq!(batches[1], vec!["x"]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_callback_does_not_block_others() {
    let scheduler = Scheduler::new(config(5, 10, 10));
    let healthy = Arc::new(AtomicUsize::new(0));

    scheduler.add_slow_callback(|| async { anyhow::bail!("listing unavailable") });
    let counter = healthy.clone();
    scheduler.add_slow_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(25)).await;

    // errors do not back off: ticks at 0s, 10s, 20s
    assert!(scheduler.is_running());
    assert_eq!(healthy.load(Ordering::SeqCst), 3);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_loops() {
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let scheduler = Scheduler::new(config(1, 3600, 10));
        scheduler.set_market_ids(market_ids(1));
        let counter = calls.clone();
        scheduler.add_fast_callback(move |_batch| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
    }

    let before = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), before);
}
