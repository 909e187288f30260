//! # Engine - One Kernel's Periodic Loop
//!
//! A `PeriodicMutationEngine` owns a population of entities and advances
//! them once per tick:
//!
//! 1. every non-paused entity, in insertion order, drifts each attribute by
//!    `(rand - 0.5) * step` (clamped to its range)
//! 2. its status is re-derived from the primary attribute
//! 3. one roll decides an optional side effect: spawn a child, narrate a
//!    history line, or flip the status
//!
//! Every `metrics_history_every` ticks a metrics snapshot joins the history.
//! Culling is a separate pass so hosts and commands decide when it runs.
//!
//! ## Module Structure
//!
//! - `profile` - Kernel variants (attributes, probabilities, vocabulary)
//! - `lifecycle` - Spawn and cull
//! - `commands` - Command API (evolve, perturb, pause, resume, spawn)

pub mod profile;
pub mod commands;
mod lifecycle;

pub use commands::{CommandOutcome, EngineCommand};
pub use profile::{AttributeSpec, KernelProfile};

use std::collections::BTreeMap;
use std::sync::Arc;

use poema_core::config::EngineConfig;
use poema_core::error::{PoemaError, PoemaResult};
use poema_core::{
    AggregateMetrics, Category, Clock, Entity, EntityId, BoundedHistoryLog, HistoryEntry,
    MetricAggregator, RandomContentTable, RandomSource, Simulation, Status, TickReport,
};

// ============================================================================
// ENGINE STRUCT
// ============================================================================

/// Drives one kernel's entities through randomized update cycles
pub struct PeriodicMutationEngine {
    // === Definition ===

    /// Kernel variant
    profile: KernelProfile,

    /// Engine settings
    config: EngineConfig,

    // === State ===

    /// Entities keyed by id (ids are monotonic, so this is insertion order)
    entities: BTreeMap<EntityId, Entity>,

    /// Narration and metrics snapshots
    history: BoundedHistoryLog<HistoryEntry>,

    /// Next id to hand out
    next_id: u64,

    /// Ticks completed
    tick_count: u64,

    // === Injected ===

    aggregator: MetricAggregator,
    content: RandomContentTable,
    rng: Box<dyn RandomSource>,
    clock: Arc<dyn Clock>,
}

impl PeriodicMutationEngine {
    /// Create an empty engine
    pub fn new(
        profile: KernelProfile,
        config: EngineConfig,
        rng: Box<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let aggregator = MetricAggregator::new(profile.family, profile.primary);
        let history = BoundedHistoryLog::new(config.history_capacity);

        tracing::info!("🌱 Engine '{}' created ({} attributes)", profile.name, profile.attributes.len());

        Self {
            profile,
            config,
            entities: BTreeMap::new(),
            history,
            next_id: 1,
            tick_count: 0,
            aggregator,
            content: RandomContentTable::builtin(),
            rng,
            clock,
        }
    }

    /// Builder: replace the narration templates
    pub fn with_content(mut self, content: RandomContentTable) -> Self {
        self.content = content;
        self
    }

    /// Create `count` seeds from the profile's initial ranges
    pub fn seed(&mut self, count: usize) -> PoemaResult<Vec<EntityId>> {
        let now = self.clock.now_ms();
        let mut ids = Vec::with_capacity(count);

        for i in 0..count {
            self.check_population()?;

            let categories = self.profile.categories;
            let category = categories.get(i % categories.len().max(1)).copied().unwrap_or(Category::Process);
            let labels = self.profile.labels;
            let label = labels.get(self.rng.index(labels.len())).copied().unwrap_or("entity");
            let id = self.allocate_id();

            let mut entity = Entity::new(id, category, label, now);
            for spec in &self.profile.attributes {
                let value = self.rng.range(spec.initial.0, spec.initial.1);
                entity.insert_attribute(spec.kind, spec.bounded(value));
            }
            entity.status = Status::Active;

            self.entities.insert(id, entity);
            ids.push(id);
        }

        tracing::info!("🌱 '{}' seeded {} entities", self.profile.name, ids.len());
        Ok(ids)
    }

    /// Insert a prepared seed; it receives a fresh id and generation 0
    pub fn insert_seed(&mut self, mut entity: Entity) -> PoemaResult<EntityId> {
        self.check_population()?;

        let id = self.allocate_id();
        entity.id = id;
        entity.generation = 0;
        entity.parent_id = None;
        entity.children_ids.clear();
        self.entities.insert(id, entity);
        Ok(id)
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Advance every non-paused entity once
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now_ms();
        let mut report = TickReport::default();

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            if entity.paused {
                continue;
            }

            // Drift
            for (kind, bounded) in entity.attributes_mut() {
                let step = self.profile.step_for(kind) * self.config.step_scale;
                let delta = self.rng.delta(step);
                if !bounded.nudge(delta) {
                    report.failures += 1;
                }
            }
            report.mutated += 1;

            // Status from the primary resource
            if let Some(status) = derive_status(entity, self.profile.primary, self.config.critical_ratio) {
                if status != entity.status {
                    entity.status = status;
                    report.status_flips += 1;
                }
            }

            // One side effect at most
            let roll = self.rng.next_f32();
            let spawn_edge = self.profile.spawn_probability;
            let event_edge = spawn_edge + self.profile.event_probability;
            let flip_edge = event_edge + self.profile.flip_probability;

            if roll < spawn_edge {
                match self.spawn(id) {
                    Ok(_) => report.spawned += 1,
                    Err(PoemaError::PopulationLimit { .. }) => {}
                    Err(e) => {
                        tracing::debug!("'{}' spawn from {} skipped: {}", self.profile.name, id, e);
                        report.failures += 1;
                    }
                }
            } else if roll < event_edge {
                self.narrate(id, now);
                report.events += 1;
            } else if roll < flip_edge {
                let status = Status::ALL[self.rng.index(Status::ALL.len())];
                if let Some(entity) = self.entities.get_mut(&id) {
                    if entity.status != status {
                        entity.status = status;
                        report.status_flips += 1;
                    }
                }
            }
        }

        self.tick_count += 1;
        report.tick = self.tick_count;

        let every = self.config.metrics_history_every;
        if every > 0 && self.tick_count % every == 0 {
            let metrics = self.metrics();
            self.history.push(HistoryEntry::metrics(now, metrics));
        }

        tracing::debug!(
            "'{}' tick {}: {} mutated, {} spawned, {} events",
            self.profile.name, report.tick, report.mutated, report.spawned, report.events
        );
        report
    }

    /// Append a templated line about an entity
    fn narrate(&mut self, id: EntityId, now: u64) {
        let (subject, value) = match self.entities.get(&id) {
            Some(e) => (
                format!("{} {}", e.label, e.id),
                e.attribute(self.profile.primary).unwrap_or(0.0),
            ),
            None => (id.to_string(), 0.0),
        };
        let line = self.content.render(self.profile.content, &subject, value, self.rng.as_mut());
        self.history.push(HistoryEntry::text(now, line));
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Copy of every entity, in insertion order
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    /// Copy of one entity
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.entities.get(&id).cloned()
    }

    /// Aggregate metrics of the current population
    pub fn metrics(&self) -> AggregateMetrics {
        self.aggregator.aggregate(self.entities.values())
    }

    /// Newest `n` history entries, oldest first
    pub fn history(&self, n: usize) -> Vec<HistoryEntry> {
        self.history.snapshot(n)
    }

    pub fn name(&self) -> &'static str {
        self.profile.name
    }

    pub fn profile(&self) -> &KernelProfile {
        &self.profile
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_population(&self) -> PoemaResult<()> {
        if self.entities.len() >= self.config.max_population {
            return Err(PoemaError::PopulationLimit {
                current: self.entities.len(),
                max: self.config.max_population,
            });
        }
        Ok(())
    }
}

/// Status implied by the primary attribute, if any
///
/// Below the critical ratio an entity is `Critical`; a critical entity that
/// recovers becomes `Active`. Otherwise the current status stands.
fn derive_status(entity: &Entity, primary: poema_core::AttributeKind, critical_ratio: f32) -> Option<Status> {
    let ratio = entity.bounds(primary)?.ratio();
    if ratio < critical_ratio {
        Some(Status::Critical)
    } else if entity.status == Status::Critical {
        Some(Status::Active)
    } else {
        None
    }
}

impl Simulation for PeriodicMutationEngine {
    fn name(&self) -> &str {
        self.profile.name
    }

    fn tick(&mut self) -> PoemaResult<TickReport> {
        Ok(PeriodicMutationEngine::tick(self))
    }

    fn cull(&mut self) -> usize {
        PeriodicMutationEngine::cull(self).len()
    }

    fn metrics(&self) -> AggregateMetrics {
        PeriodicMutationEngine::metrics(self)
    }

    fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
