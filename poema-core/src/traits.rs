//! # Traits - Seams Between Jobs and What They Drive
//!
//! A host schedules two kinds of periodic work:
//!
//! - `Simulation`: the fast loop (tick + cull) of a mutation engine
//! - `Consolidation`: the slow loop (decay) of an associative index
//!
//! Hosts only see these traits, so tests can hand them anything that ticks.

use serde::{Deserialize, Serialize};

use crate::error::PoemaResult;
use crate::metrics::AggregateMetrics;

/// What one tick did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number after this tick
    pub tick: u64,

    /// Entities whose attributes were mutated (paused ones are skipped)
    pub mutated: usize,

    /// Children spawned as a side effect
    pub spawned: usize,

    /// Text events appended to history
    pub events: usize,

    /// Status changes (random flips and re-derivations)
    pub status_flips: usize,

    /// Entities removed by the cull that followed
    pub culled: usize,

    /// Side effects that failed and were skipped
    pub failures: usize,
}

/// The fast loop of an engine
pub trait Simulation: Send + Sync {
    /// Name used in logs and routes
    fn name(&self) -> &str;

    /// Advance every entity once
    fn tick(&mut self) -> PoemaResult<TickReport>;

    /// Remove spent entities, returning how many went
    fn cull(&mut self) -> usize;

    /// Current aggregate snapshot
    fn metrics(&self) -> AggregateMetrics;

    /// Ticks completed so far
    fn tick_count(&self) -> u64;
}

/// What one consolidation pass did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Edges that survived with a lower weight
    pub decayed: usize,

    /// Edges removed under the prune floor
    pub pruned: usize,
}

/// The slow loop of an index
pub trait Consolidation: Send + Sync {
    /// Weaken every association and drop the faint ones
    fn consolidate(&mut self) -> ConsolidationReport;
}
