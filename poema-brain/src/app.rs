//! # Installation - The Composition Root
//!
//! Owns every engine, the archive, the content source and the relay. Nothing
//! here is global: the binary builds one `Installation` and hands an `Arc`
//! of it to the HTTP routes.
//!
//! Each kernel gets its own `EngineHost`. The archive's decay job rides on
//! the micelio network's host, the kernel it is named after.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};

use poema_core::config::PoemaConfig;
use poema_core::error::{PoemaError, PoemaResult};
use poema_core::{
    AggregateMetrics, Clock, Consolidation, Entity, EntityId, HistoryEntry, RandomSource,
    Simulation,
};

use crate::engine::{CommandOutcome, EngineCommand, KernelProfile, PeriodicMutationEngine};
use crate::host::{EngineHost, HostStats, HostTiming};
use crate::index::{AssociativeIndex, Cluster, IndexStats, QueryHit};
use crate::relay::{RelayClient, RelayRequest, RelayResponse};
use crate::scheduler::SharedScheduler;
use crate::source::{ContentSource, SourceStats};

/// Kernel whose host also runs the archive's decay job
const ARCHIVE_HOST: &str = "micelio-network";

/// k-means passes for `/archive/clusters`
const CLUSTER_ITERATIONS: usize = 12;

pub type SharedEngine = Arc<RwLock<PeriodicMutationEngine>>;
pub type SharedIndex = Arc<RwLock<AssociativeIndex>>;

/// One line of `GET /engines`
#[derive(Clone, Debug, Serialize)]
pub struct EngineSummary {
    pub name: String,
    pub population: usize,
    pub tick_count: u64,
    pub host: HostStats,
}

/// Body of `GET /health`
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub engines: usize,
    pub running: usize,
    pub archive: IndexStats,
    pub source: SourceStats,
}

struct Kernel {
    engine: SharedEngine,
    host: EngineHost,
}

/// Every running part of POEMA
pub struct Installation {
    config: PoemaConfig,
    kernels: BTreeMap<&'static str, Kernel>,
    archive: SharedIndex,
    source: ContentSource,
    relay: RelayClient,
    next_passage: AtomicU64,
    rng: Mutex<Box<dyn RandomSource>>,
}

impl Installation {
    /// Build the five kernels, the archive and the network clients
    pub fn new(config: PoemaConfig, scheduler: SharedScheduler, clock: Arc<dyn Clock>) -> PoemaResult<Self> {
        config.validate()?;

        // Each part gets its own stream, all derived from one optional seed
        let seed = config.engine.rng_seed;
        let stream = |n: u64| poema_core::random::boxed(seed.map(|s| s.wrapping_add(n)));

        let archive: SharedIndex = Arc::new(RwLock::new(AssociativeIndex::new(&config.index)?));
        let timing = HostTiming {
            tick_period_ms: config.engine.tick_interval_ms,
            tick_jitter_ms: config.engine.tick_jitter_ms,
            decay_period_ms: config.index.decay_interval_ms,
        };

        let mut kernels = BTreeMap::new();
        for (n, profile) in KernelProfile::builtin().into_iter().enumerate() {
            let name = profile.name;
            let engine: SharedEngine = Arc::new(RwLock::new(PeriodicMutationEngine::new(
                profile,
                config.engine.clone(),
                stream(n as u64 + 1),
                clock.clone(),
            )));

            let simulation: Arc<RwLock<dyn Simulation>> = engine.clone();
            let index = if name == ARCHIVE_HOST {
                Some(archive.clone() as Arc<RwLock<dyn Consolidation>>)
            } else {
                None
            };
            let host = EngineHost::new(name, simulation, index, scheduler.clone(), timing)?;
            kernels.insert(name, Kernel { engine, host });
        }

        let source = ContentSource::new(config.content.clone(), stream(100))?;
        let relay = RelayClient::new(config.relay.clone(), stream(200), clock)?;

        info!("🌌 Installation ready: {} kernels", kernels.len());

        Ok(Self {
            config,
            kernels,
            archive,
            source,
            relay,
            next_passage: AtomicU64::new(1),
            rng: Mutex::new(stream(0)),
        })
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Seed every kernel with the configured number of entities
    pub fn seed(&self) -> PoemaResult<usize> {
        let count = self.config.engine.seed_count;
        let mut total = 0;
        for kernel in self.kernels.values() {
            total += kernel.engine.write().seed(count)?.len();
        }
        info!("🌱 Seeded {} entities", total);
        Ok(total)
    }

    /// Start every host; returns how many were newly started
    ///
    /// A host that fails to start stops the ones already started.
    pub fn start(&self) -> PoemaResult<usize> {
        let mut started = 0;
        for kernel in self.kernels.values() {
            match kernel.host.start() {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }
        Ok(started)
    }

    /// Stop every host; returns the number of jobs cancelled
    pub fn stop(&self) -> usize {
        self.kernels.values().map(|k| k.host.stop()).sum()
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    pub fn engine(&self, name: &str) -> PoemaResult<SharedEngine> {
        self.kernels
            .get(name)
            .map(|k| k.engine.clone())
            .ok_or_else(|| PoemaError::EngineNotFound(name.to_string()))
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.kernels.keys().copied().collect()
    }

    pub fn summaries(&self) -> Vec<EngineSummary> {
        self.kernels
            .iter()
            .map(|(name, kernel)| {
                let engine = kernel.engine.read();
                EngineSummary {
                    name: name.to_string(),
                    population: engine.len(),
                    tick_count: engine.tick_count(),
                    host: kernel.host.stats(),
                }
            })
            .collect()
    }

    pub fn entities(&self, name: &str) -> PoemaResult<Vec<Entity>> {
        Ok(self.engine(name)?.read().entities())
    }

    pub fn metrics(&self, name: &str) -> PoemaResult<AggregateMetrics> {
        Ok(self.engine(name)?.read().metrics())
    }

    pub fn history(&self, name: &str) -> PoemaResult<Vec<HistoryEntry>> {
        let n = self.config.engine.history_capacity;
        Ok(self.engine(name)?.read().history(n))
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "alive",
            engines: self.kernels.len(),
            running: self.kernels.values().filter(|k| k.host.is_running()).count(),
            archive: self.archive.read().stats(),
            source: self.source.stats(),
        }
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    pub fn command(&self, name: &str, command: EngineCommand) -> PoemaResult<CommandOutcome> {
        let engine = self.engine(name)?;
        let outcome = engine.write().apply(command)?;
        Ok(outcome)
    }

    // ========================================================================
    // ARCHIVE
    // ========================================================================

    /// Fetch one batch of seed passages and archive them
    ///
    /// Never fails on network trouble: the source falls back to static text.
    /// Passages already in the archive are skipped.
    pub async fn ingest(&self) -> PoemaResult<usize> {
        let passages = self.source.fetch_seed_passages().await;

        let mut archive = self.archive.write();
        let mut indexed = 0;
        for passage in &passages {
            if let Some(existing) = archive.find_text(passage) {
                tracing::debug!("📚 Already archived as #{}", existing);
                continue;
            }
            let id = EntityId(self.next_passage.fetch_add(1, Ordering::Relaxed));
            match archive.index_entity(id, passage) {
                Ok(edges) => {
                    indexed += 1;
                    tracing::debug!("📚 Archived #{} ({} edges)", id, edges);
                }
                Err(e) => warn!("⚠️ Could not archive passage: {}", e),
            }
        }

        info!("📚 Archive now holds {} passages", archive.len());
        Ok(indexed)
    }

    pub fn query(&self, text: &str) -> Vec<QueryHit> {
        self.archive.read().query(text)
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        let mut rng = self.rng.lock();
        self.archive
            .read()
            .clusters(self.config.index.clusters, CLUSTER_ITERATIONS, rng.as_mut())
    }

    pub fn archive(&self) -> SharedIndex {
        self.archive.clone()
    }

    // ========================================================================
    // RELAY
    // ========================================================================

    pub async fn relay(&self, request: RelayRequest) -> PoemaResult<RelayResponse> {
        self.relay.relay(request).await
    }

    pub fn config(&self) -> &PoemaConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poema_core::ManualClock;

    use crate::scheduler::{ManualScheduler, Scheduler};

    fn installation() -> (Installation, Arc<ManualScheduler>) {
        let mut config = PoemaConfig::default();
        config.engine.rng_seed = Some(11);
        config.engine.seed_count = 3;
        config.content.offline = true;

        let clock = ManualClock::new(0);
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let installation = Installation::new(config, scheduler.clone(), Arc::new(clock)).unwrap();
        (installation, scheduler)
    }

    #[test]
    fn test_builds_five_kernels() {
        let (installation, _) = installation();
        assert_eq!(
            installation.engine_names(),
            vec!["agent-collective", "autopoietic-core", "autopoietic-kernel", "autopoietic-system", "micelio-network"]
        );
        assert_eq!(installation.seed().unwrap(), 15);
        assert!(installation.summaries().iter().all(|s| s.population == 3));
    }

    #[test]
    fn test_start_registers_ticks_and_one_decay() {
        let (installation, scheduler) = installation();
        installation.seed().unwrap();

        assert_eq!(installation.start().unwrap(), 5);
        assert_eq!(installation.start().unwrap(), 0);
        assert_eq!(scheduler.active(), 6);
        assert_eq!(installation.health().running, 5);

        scheduler.advance(3_000);
        assert!(installation.summaries().iter().all(|s| s.tick_count == 3));

        assert_eq!(installation.stop(), 6);
        assert_eq!(scheduler.active(), 0);
    }

    #[test]
    fn test_unknown_engine() {
        let (installation, _) = installation();
        assert!(matches!(installation.metrics("nope"), Err(PoemaError::EngineNotFound(_))));
        assert!(matches!(
            installation.command("nope", EngineCommand::ForceEvolution),
            Err(PoemaError::EngineNotFound(_))
        ));
    }

    #[test]
    fn test_command_reaches_engine() {
        let (installation, _) = installation();
        installation.seed().unwrap();
        let outcome = installation.command("agent-collective", EngineCommand::ForceEvolution).unwrap();
        assert!(matches!(outcome, CommandOutcome::Evolved { .. }));
        assert_eq!(installation.engine("agent-collective").unwrap().read().tick_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_ingest_archives_fallback_text() {
        let (installation, _) = installation();
        assert_eq!(installation.ingest().await.unwrap(), 1);
        assert_eq!(installation.health().archive.nodes, 1);
        assert_eq!(installation.health().source.fallbacks, 1);
    }

    #[tokio::test]
    async fn test_repeated_ingest_does_not_grow_archive() {
        let (installation, _) = installation();
        let mut indexed = 0;
        for _ in 0..300 {
            indexed += installation.ingest().await.unwrap();
        }

        // Offline text comes from a handful of fixed lines
        let nodes = installation.health().archive.nodes;
        assert_eq!(nodes, indexed);
        assert!((1..=6).contains(&nodes));
        assert!(nodes <= installation.config().index.max_nodes);
        assert_eq!(installation.health().source.fallbacks, 300);
    }
}
