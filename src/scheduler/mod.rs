//! Dual-rate polling scheduler
//!
//! Two tokio tasks share a per-run stop flag:
//! - the slow loop runs slow callbacks (universe refresh) every slow interval
//! - the fast loop hands the next round-robin batch of market ids to fast
//!   callbacks (price refresh) every fast interval
//!
//! Waits are sliced so `stop()` is observed within ~100ms.

mod round_robin;

pub use round_robin::RoundRobin;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Longest single sleep between run-flag checks
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Pause after a callback panics
const PANIC_BACKOFF: Duration = Duration::from_secs(1);

/// How long `stop()` waits for each loop before aborting it
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

type SlowCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type FastCallback = Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Scheduler timing
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub fast_tick_interval: Duration,
    pub slow_tick_interval: Duration,
    /// Round-robin batch size for the fast loop
    pub max_markets_per_tick: usize,
    /// Both loops stop themselves once this much time has passed since start
    pub max_runtime: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_tick_interval: Duration::from_secs(5),
            slow_tick_interval: Duration::from_secs(60),
            max_markets_per_tick: 50,
            max_runtime: None,
        }
    }
}

struct RunHandle {
    running: Arc<AtomicBool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

/// Fast/slow tick scheduler with round-robin batching
pub struct Scheduler {
    config: SchedulerConfig,
    batcher: Arc<RoundRobin>,
    slow_callbacks: Arc<RwLock<Vec<SlowCallback>>>,
    fast_callbacks: Arc<RwLock<Vec<FastCallback>>>,
    run: Mutex<Option<RunHandle>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let batcher = Arc::new(RoundRobin::new(config.max_markets_per_tick));
        Self::with_batcher(config, batcher)
    }

    /// Scheduler drawing fast batches from a shared batcher
    pub fn with_batcher(config: SchedulerConfig, batcher: Arc<RoundRobin>) -> Self {
        Self {
            config,
            batcher,
            slow_callbacks: Arc::new(RwLock::new(Vec::new())),
            fast_callbacks: Arc::new(RwLock::new(Vec::new())),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn batcher(&self) -> &Arc<RoundRobin> {
        &self.batcher
    }

    /// Replace the ids polled by the fast loop
    pub fn set_market_ids(&self, ids: Vec<String>) {
        let count = ids.len();
        self.batcher.set_market_ids(ids);
        tracing::info!(market_count = count, "Scheduler market ids updated");
    }

    /// Register a callback for every slow tick
    pub fn add_slow_callback<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.slow_callbacks
            .write()
            .push(Arc::new(move || callback().boxed()));
    }

    /// Register a callback receiving each fast-tick batch
    pub fn add_fast_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.fast_callbacks
            .write()
            .push(Arc::new(move |batch| callback(batch).boxed()));
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::SeqCst))
    }

    /// Spawn both loops; a no-op with a warning while already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut run = self.run.lock();
        if run
            .as_ref()
            .is_some_and(|r| r.running.load(Ordering::SeqCst))
        {
            tracing::warn!("Scheduler already running");
            return;
        }

        let running = Arc::new(AtomicBool::new(true));
        let deadline = self.config.max_runtime.map(|d| Instant::now() + d);

        let slow = tokio::spawn(slow_loop(
            running.clone(),
            self.slow_callbacks.clone(),
            self.config.slow_tick_interval,
            deadline,
        ));
        let fast = tokio::spawn(fast_loop(
            running.clone(),
            self.fast_callbacks.clone(),
            self.batcher.clone(),
            self.config.fast_tick_interval,
            deadline,
        ));

        *run = Some(RunHandle {
            running,
            tasks: vec![("slow", slow), ("fast", fast)],
        });

        tracing::info!(
            fast_interval_ms = self.config.fast_tick_interval.as_millis() as u64,
            slow_interval_ms = self.config.slow_tick_interval.as_millis() as u64,
            batch_size = self.batcher.batch_size(),
            max_runtime_secs = self.config.max_runtime.map(|d| d.as_secs()),
            "Scheduler started"
        );
    }

    /// Stop both loops and wait for them; safe to call repeatedly
    pub async fn stop(&self) {
        let Some(run) = self.run.lock().take() else {
            tracing::debug!("Scheduler not running");
            return;
        };

        run.running.store(false, Ordering::SeqCst);

        for (name, mut handle) in run.tasks {
            match tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(task = name, error = %err, "Scheduler task failed"),
                Err(_) => {
                    tracing::warn!(task = name, "Scheduler task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.running.store(false, Ordering::SeqCst);
        }
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Sleep for `total`, waking every slice to check the run flag
async fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let end = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= end {
            break;
        }
        tokio::time::sleep((end - now).min(SLEEP_SLICE)).await;
    }
}

/// Run one callback future, catching errors and panics
///
/// Returns true when the callback panicked.
async fn guard<Fut>(loop_name: &'static str, index: usize, fut: Fut) -> bool
where
    Fut: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => false,
        Ok(Err(err)) => {
            tracing::error!(tick = loop_name, callback = index, error = %format!("{:#}", err), "Tick callback failed");
            false
        }
        Err(_) => {
            tracing::error!(tick = loop_name, callback = index, "Tick callback panicked");
            true
        }
    }
}

async fn slow_loop(
    running: Arc<AtomicBool>,
    callbacks: Arc<RwLock<Vec<SlowCallback>>>,
    interval: Duration,
    deadline: Option<Instant>,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Slow tick loop started");

    while running.load(Ordering::SeqCst) {
        if deadline_passed(deadline) {
            tracing::warn!("Slow tick: max runtime exceeded, stopping");
            running.store(false, Ordering::SeqCst);
            break;
        }

        let started = Instant::now();
        let snapshot: Vec<SlowCallback> = callbacks.read().clone();

        let mut panicked = false;
        for (index, callback) in snapshot.iter().enumerate() {
            panicked |= guard("slow", index, async { callback().await }).await;
        }

        let wait = if panicked {
            PANIC_BACKOFF
        } else {
            interval.saturating_sub(started.elapsed())
        };
        sleep_while_running(&running, wait).await;
    }

    tracing::info!("Slow tick loop exited");
}

async fn fast_loop(
    running: Arc<AtomicBool>,
    callbacks: Arc<RwLock<Vec<FastCallback>>>,
    batcher: Arc<RoundRobin>,
    interval: Duration,
    deadline: Option<Instant>,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Fast tick loop started");

    while running.load(Ordering::SeqCst) {
        if deadline_passed(deadline) {
            tracing::warn!("Fast tick: max runtime exceeded, stopping");
            running.store(false, Ordering::SeqCst);
            break;
        }

        let started = Instant::now();
        let batch = batcher.next_batch();

        let mut panicked = false;
        if !batch.is_empty() {
            let snapshot: Vec<FastCallback> = callbacks.read().clone();
            for (index, callback) in snapshot.iter().enumerate() {
                let batch = batch.clone();
                panicked |= guard("fast", index, async move { callback(batch).await }).await;
            }
        }

        let wait = if panicked {
            PANIC_BACKOFF
        } else {
            interval.saturating_sub(started.elapsed())
        };
        sleep_while_running(&running, wait).await;
    }

    tracing::info!("Fast tick loop exited");
}
