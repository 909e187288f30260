//! Scheduler - Periodic Jobs Behind a Trait
//!
//! Hosts never touch timers directly. In production a `TokioScheduler`
//! spawns one task per job; in tests a `ManualScheduler` fires due jobs
//! only when the test moves its `ManualClock` forward.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use poema_core::error::{PoemaError, PoemaResult};
use poema_core::{Clock, ManualClock};

/// Work run on every firing
pub type Job = Box<dyn FnMut() + Send + 'static>;

/// Identifies a registered job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobHandle(u64);

/// Timer registration
pub trait Scheduler: Send + Sync {
    /// Run `job` every `period_ms`, plus up to `jitter_ms` of random delay
    fn schedule(&self, name: &str, period_ms: u64, jitter_ms: u64, job: Job) -> PoemaResult<JobHandle>;

    /// Stop a job; false if it was not registered
    fn cancel(&self, handle: JobHandle) -> bool;

    /// Jobs currently registered
    fn active(&self) -> usize;
}

// ============================================================================
// TOKIO
// ============================================================================

/// One tokio task per job
#[derive(Default)]
pub struct TokioScheduler {
    next: AtomicU64,
    tasks: Mutex<HashMap<JobHandle, tokio::task::JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, name: &str, period_ms: u64, jitter_ms: u64, mut job: Job) -> PoemaResult<JobHandle> {
        if period_ms == 0 {
            return Err(PoemaError::Scheduler(format!("job '{}' has a zero period", name)));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoemaError::Scheduler(format!("no tokio runtime for '{}': {}", name, e)))?;

        let handle = JobHandle(self.next.fetch_add(1, Ordering::SeqCst));
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                if jitter_ms > 0 {
                    let extra = rand::thread_rng().gen_range(0..=jitter_ms);
                    tokio::time::sleep(Duration::from_millis(extra)).await;
                }
                job();
            }
        });

        tracing::debug!("⏱️ Scheduled '{}' every {}ms (+{}ms jitter)", name, period_ms, jitter_ms);
        self.tasks.lock().insert(handle, task);
        Ok(handle)
    }

    fn cancel(&self, handle: JobHandle) -> bool {
        match self.tasks.lock().remove(&handle) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn active(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

// ============================================================================
// MANUAL
// ============================================================================

struct ManualJob {
    name: String,
    period_ms: u64,
    next_due: u64,
    fired: u64,
    job: Job,
}

/// Fires jobs against a `ManualClock`, only when asked
///
/// Jobs run while the scheduler's lock is held, so they must not call back
/// into the scheduler. Jitter is ignored.
pub struct ManualScheduler {
    clock: ManualClock,
    next: AtomicU64,
    jobs: Mutex<BTreeMap<JobHandle, ManualJob>>,
}

impl ManualScheduler {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            next: AtomicU64::new(0),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Move the clock forward and fire everything that came due
    pub fn advance(&self, ms: u64) -> usize {
        self.clock.advance(ms);
        self.run_due()
    }

    /// Fire every job due at the current time (catching up missed periods)
    pub fn run_due(&self) -> usize {
        let now = self.clock.now_ms();
        let mut fired = 0;
        for job in self.jobs.lock().values_mut() {
            while job.next_due <= now {
                (job.job)();
                job.fired += 1;
                job.next_due += job.period_ms;
                fired += 1;
            }
        }
        fired
    }

    /// Times a job has fired (0 for unknown handles)
    pub fn fired(&self, handle: JobHandle) -> u64 {
        self.jobs.lock().get(&handle).map_or(0, |j| j.fired)
    }

    /// Names of registered jobs, in registration order
    pub fn names(&self) -> Vec<String> {
        self.jobs.lock().values().map(|j| j.name.clone()).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, name: &str, period_ms: u64, _jitter_ms: u64, job: Job) -> PoemaResult<JobHandle> {
        if period_ms == 0 {
            return Err(PoemaError::Scheduler(format!("job '{}' has a zero period", name)));
        }
        let handle = JobHandle(self.next.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().insert(
            handle,
            ManualJob {
                name: name.to_string(),
                period_ms,
                next_due: self.clock.now_ms() + period_ms,
                fired: 0,
                job,
            },
        );
        Ok(handle)
    }

    fn cancel(&self, handle: JobHandle) -> bool {
        self.jobs.lock().remove(&handle).is_some()
    }

    fn active(&self) -> usize {
        self.jobs.lock().len()
    }
}

/// Shared handle used by hosts
pub type SharedScheduler = Arc<dyn Scheduler>;
