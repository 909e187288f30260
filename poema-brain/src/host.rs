//! # Host - Lifecycle of One Engine's Jobs
//!
//! An `EngineHost` registers two periodic jobs on a `Scheduler`:
//!
//! - **tick**: fast, `tick()` followed by `cull()` on the simulation
//! - **decay**: slow, `consolidate()` on the attached index (if any)
//!
//! The decay period must be longer than the tick period. `start()` on a
//! running host does nothing; `stop()` cancels every job it registered.
//! A tick that returns an error or panics is logged and counted, and the
//! next firing runs as usual.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use poema_core::error::{PoemaError, PoemaResult};
use poema_core::{Consolidation, Simulation};

use crate::scheduler::{JobHandle, SharedScheduler};

/// Timing of a host's jobs
#[derive(Clone, Copy, Debug)]
pub struct HostTiming {
    pub tick_period_ms: u64,
    pub tick_jitter_ms: u64,
    pub decay_period_ms: u64,
}

/// Counters shared with the jobs
#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
    decays: AtomicU64,
}

/// Snapshot of a host's counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub running: bool,
    pub ticks: u64,
    pub failures: u64,
    pub panics: u64,
    pub decays: u64,
}

/// Owns the scheduled jobs of one simulation (and its optional index)
pub struct EngineHost {
    name: String,
    simulation: Arc<RwLock<dyn Simulation>>,
    index: Option<Arc<RwLock<dyn Consolidation>>>,
    scheduler: SharedScheduler,
    timing: HostTiming,
    handles: Mutex<Vec<JobHandle>>,
    counters: Arc<Counters>,
}

impl EngineHost {
    /// Create a stopped host
    ///
    /// Fails when an index is attached and its decay period is not longer
    /// than the tick period.
    pub fn new(
        name: impl Into<String>,
        simulation: Arc<RwLock<dyn Simulation>>,
        index: Option<Arc<RwLock<dyn Consolidation>>>,
        scheduler: SharedScheduler,
        timing: HostTiming,
    ) -> PoemaResult<Self> {
        let name = name.into();
        if index.is_some() && timing.decay_period_ms <= timing.tick_period_ms {
            return Err(PoemaError::config(format!(
                "'{}': decay period {}ms must exceed tick period {}ms",
                name, timing.decay_period_ms, timing.tick_period_ms
            )));
        }

        Ok(Self {
            name,
            simulation,
            index,
            scheduler,
            timing,
            handles: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the jobs; returns false if already running
    pub fn start(&self) -> PoemaResult<bool> {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            debug!("'{}' already running", self.name);
            return Ok(false);
        }

        let tick = self.scheduler.schedule(
            &format!("{}:tick", self.name),
            self.timing.tick_period_ms,
            self.timing.tick_jitter_ms,
            self.tick_job(),
        )?;
        handles.push(tick);

        if let Some(index) = &self.index {
            match self.scheduler.schedule(
                &format!("{}:decay", self.name),
                self.timing.decay_period_ms,
                0,
                decay_job(self.name.clone(), index.clone(), self.counters.clone()),
            ) {
                Ok(decay) => handles.push(decay),
                Err(e) => {
                    // Leave nothing half-started
                    for handle in handles.drain(..) {
                        self.scheduler.cancel(handle);
                    }
                    return Err(e);
                }
            }
        }

        info!("▶️ '{}' started ({} jobs)", self.name, handles.len());
        Ok(true)
    }

    /// Cancel every job; returns how many were cancelled
    pub fn stop(&self) -> usize {
        let mut handles = self.handles.lock();
        let cancelled = handles
            .drain(..)
            .filter(|h| self.scheduler.cancel(*h))
            .count();
        if cancelled > 0 {
            info!("⏹️ '{}' stopped", self.name);
        }
        cancelled
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            running: self.is_running(),
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
            decays: self.counters.decays.load(Ordering::Relaxed),
        }
    }

    fn tick_job(&self) -> Box<dyn FnMut() + Send> {
        let name = self.name.clone();
        let simulation = self.simulation.clone();
        let counters = self.counters.clone();

        Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut sim = simulation.write();
                let mut report = sim.tick()?;
                report.culled = sim.cull();
                Ok::<_, PoemaError>(report)
            }));

            match outcome {
                Ok(Ok(report)) => {
                    counters.ticks.fetch_add(1, Ordering::Relaxed);
                    debug!("'{}' tick {} ({} culled)", name, report.tick, report.culled);
                }
                Ok(Err(e)) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️ '{}' tick failed: {}", name, e);
                }
                Err(panic) => {
                    counters.panics.fetch_add(1, Ordering::Relaxed);
                    error!("💥 '{}' tick panicked: {}", name, panic_message(&*panic));
                }
            }
        })
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decay_job(
    name: String,
    index: Arc<RwLock<dyn Consolidation>>,
    counters: Arc<Counters>,
) -> Box<dyn FnMut() + Send> {
    Box::new(move || {
        match catch_unwind(AssertUnwindSafe(|| index.write().consolidate())) {
            Ok(report) => {
                counters.decays.fetch_add(1, Ordering::Relaxed);
                debug!("'{}' decay: {} kept, {} pruned", name, report.decayed, report.pruned);
            }
            Err(panic) => {
                counters.panics.fetch_add(1, Ordering::Relaxed);
                error!("💥 '{}' decay panicked: {}", name, panic_message(&*panic));
            }
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poema_core::{AggregateMetrics, ConsolidationReport, ManualClock, MetricAggregator, MetricFamily, AttributeKind, TickReport};

    use crate::scheduler::{ManualScheduler, Scheduler};

    /// Ticks normally except on the listed tick numbers
    struct Flaky {
        ticks: u64,
        panic_on: u64,
        fail_on: u64,
    }

    impl Simulation for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn tick(&mut self) -> PoemaResult<TickReport> {
            self.ticks += 1;
            if self.ticks == self.panic_on {
                panic!("tick {} exploded", self.ticks);
            }
            if self.ticks == self.fail_on {
                return Err(PoemaError::InvalidState("bad tick".to_string()));
            }
            Ok(TickReport { tick: self.ticks, ..TickReport::default() })
        }

        fn cull(&mut self) -> usize {
            0
        }

        fn metrics(&self) -> AggregateMetrics {
            MetricAggregator::new(MetricFamily::Network, AttributeKind::Energy).aggregate(std::iter::empty())
        }

        fn tick_count(&self) -> u64 {
            self.ticks
        }
    }

    #[derive(Default)]
    struct Counting {
        passes: u64,
    }

    impl Consolidation for Counting {
        fn consolidate(&mut self) -> ConsolidationReport {
            self.passes += 1;
            ConsolidationReport::default()
        }
    }

    const TIMING: HostTiming = HostTiming { tick_period_ms: 1_000, tick_jitter_ms: 0, decay_period_ms: 5_000 };

    fn host(
        sim: Flaky,
        index: Option<Arc<RwLock<Counting>>>,
        scheduler: Arc<ManualScheduler>,
    ) -> EngineHost {
        let simulation: Arc<RwLock<dyn Simulation>> = Arc::new(RwLock::new(sim));
        let index = index.map(|i| i as Arc<RwLock<dyn Consolidation>>);
        EngineHost::new("test", simulation, index, scheduler, TIMING).unwrap()
    }

    fn steady() -> Flaky {
        Flaky { ticks: 0, panic_on: 0, fail_on: 0 }
    }

    #[test]
    fn test_start_twice_registers_once() {
        let scheduler = Arc::new(ManualScheduler::new(ManualClock::new(0)));
        let index = Arc::new(RwLock::new(Counting::default()));
        let host = host(steady(), Some(index), scheduler.clone());

        assert!(host.start().unwrap());
        assert!(!host.start().unwrap());
        assert_eq!(scheduler.active(), 2);
        assert!(host.is_running());
    }

    #[test]
    fn test_stop_cancels_all() {
        let scheduler = Arc::new(ManualScheduler::new(ManualClock::new(0)));
        let index = Arc::new(RwLock::new(Counting::default()));
        let host = host(steady(), Some(index), scheduler.clone());

        host.start().unwrap();
        assert_eq!(host.stop(), 2);
        assert_eq!(scheduler.active(), 0);
        assert!(!host.is_running());

        scheduler.advance(10_000);
        assert_eq!(host.stats().ticks, 0);
    }

    #[test]
    fn test_decay_fires_less_often_than_tick() {
        let scheduler = Arc::new(ManualScheduler::new(ManualClock::new(0)));
        let index = Arc::new(RwLock::new(Counting::default()));
        let host = host(steady(), Some(index.clone()), scheduler.clone());
        host.start().unwrap();

        for _ in 0..10 {
            scheduler.advance(1_000);
        }

        let stats = host.stats();
        assert_eq!(stats.ticks, 10);
        assert_eq!(stats.decays, 2);
        assert_eq!(index.read().passes, 2);
    }

    #[test]
    fn test_rejects_decay_faster_than_tick() {
        let scheduler: SharedScheduler = Arc::new(ManualScheduler::new(ManualClock::new(0)));
        let simulation: Arc<RwLock<dyn Simulation>> = Arc::new(RwLock::new(steady()));
        let index: Arc<RwLock<dyn Consolidation>> = Arc::new(RwLock::new(Counting::default()));
        let timing = HostTiming { decay_period_ms: 1_000, ..TIMING };
        assert!(EngineHost::new("bad", simulation, Some(index), scheduler, timing).is_err());
    }

    #[test]
    fn test_panicking_tick_does_not_stop_later_ticks() {
        let scheduler = Arc::new(ManualScheduler::new(ManualClock::new(0)));
        let sim = Flaky { ticks: 0, panic_on: 2, fail_on: 4 };
        let host = host(sim, None, scheduler.clone());
        host.start().unwrap();

        for _ in 0..6 {
            scheduler.advance(1_000);
        }

        let stats = host.stats();
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.ticks, 4);
        assert!(stats.running);
    }
}
