//! # Metrics - Aggregate Snapshots of a Population
//!
//! A [`MetricAggregator`] turns the current entity collection into an
//! [`AggregateMetrics`] record. It is a pure function: calling it twice with
//! no tick in between yields identical output, and an empty collection yields
//! the documented defaults (all zero) rather than NaN.
//!
//! The "autopoiesis", "collective" and "network" figures are labelled
//! weighted averages. They do not model any theory beyond their formulas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{AttributeKind, Entity, Status};
use crate::error::{PoemaError, PoemaResult};

/// Which derived metric set a kernel reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricFamily {
    Autopoiesis,
    Collective,
    Network,
}

/// Population-level figures shared by every family
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationMetrics {
    /// Number of entities
    pub count: usize,

    /// Share of entities with status `active`
    pub active_ratio: f32,

    /// Share of entities with status `critical`
    pub critical_ratio: f32,

    /// Share of paused entities
    pub paused_ratio: f32,

    /// Mean lineage depth (unbounded, >= 0)
    pub mean_generation: f32,

    /// Mean primary attribute, normalised to 0..1
    pub mean_primary: f32,

    /// Mean of every attribute, normalised to 0..1
    pub attribute_means: BTreeMap<AttributeKind, f32>,
}

/// Family-specific derived metrics, all in 0..1
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum MetricSet {
    Autopoiesis {
        organizational_closure: f32,
        self_production: f32,
        structural_coupling: f32,
        autonomy: f32,
    },
    Collective {
        collective_consciousness: f32,
        dialogue_activity: f32,
        creative_tension: f32,
    },
    Network {
        connectivity: f32,
        mean_resonance: f32,
        growth: f32,
    },
}

impl MetricSet {
    /// All-zero set for a family (the empty-population default)
    pub fn zeroed(family: MetricFamily) -> Self {
        match family {
            MetricFamily::Autopoiesis => MetricSet::Autopoiesis {
                organizational_closure: 0.0,
                self_production: 0.0,
                structural_coupling: 0.0,
                autonomy: 0.0,
            },
            MetricFamily::Collective => MetricSet::Collective {
                collective_consciousness: 0.0,
                dialogue_activity: 0.0,
                creative_tension: 0.0,
            },
            MetricFamily::Network => MetricSet::Network {
                connectivity: 0.0,
                mean_resonance: 0.0,
                growth: 0.0,
            },
        }
    }

    /// Named values, in declaration order
    pub fn values(&self) -> Vec<(&'static str, f32)> {
        match *self {
            MetricSet::Autopoiesis { organizational_closure, self_production, structural_coupling, autonomy } => vec![
                ("organizational_closure", organizational_closure),
                ("self_production", self_production),
                ("structural_coupling", structural_coupling),
                ("autonomy", autonomy),
            ],
            MetricSet::Collective { collective_consciousness, dialogue_activity, creative_tension } => vec![
                ("collective_consciousness", collective_consciousness),
                ("dialogue_activity", dialogue_activity),
                ("creative_tension", creative_tension),
            ],
            MetricSet::Network { connectivity, mean_resonance, growth } => vec![
                ("connectivity", connectivity),
                ("mean_resonance", mean_resonance),
                ("growth", growth),
            ],
        }
    }
}

/// Snapshot of a population (never persisted)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub population: PopulationMetrics,
    pub derived: MetricSet,
}

impl AggregateMetrics {
    /// Reject non-finite or out-of-range values
    pub fn validate(&self) -> PoemaResult<()> {
        let p = &self.population;
        let unit_checks = [
            ("active_ratio", p.active_ratio),
            ("critical_ratio", p.critical_ratio),
            ("paused_ratio", p.paused_ratio),
            ("mean_primary", p.mean_primary),
        ];
        for (name, v) in unit_checks.into_iter().chain(self.derived.values()) {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(PoemaError::metric(format!("{} = {}", name, v)));
            }
        }
        for (kind, v) in &p.attribute_means {
            if !v.is_finite() || !(0.0..=1.0).contains(v) {
                return Err(PoemaError::metric(format!("mean {} = {}", kind.name(), v)));
            }
        }
        if !p.mean_generation.is_finite() || p.mean_generation < 0.0 {
            return Err(PoemaError::metric(format!("mean_generation = {}", p.mean_generation)));
        }
        Ok(())
    }
}

/// Guarded ratio: 0 when `whole` is 0
#[inline]
fn share(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

/// Computes [`AggregateMetrics`] for one kernel
#[derive(Clone, Copy, Debug)]
pub struct MetricAggregator {
    pub family: MetricFamily,
    /// Attribute that stands for "vitality" (used for `mean_primary`)
    pub primary: AttributeKind,
}

impl MetricAggregator {
    pub fn new(family: MetricFamily, primary: AttributeKind) -> Self {
        Self { family, primary }
    }

    /// Summarize the collection
    pub fn aggregate<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) -> AggregateMetrics {
        let entities: Vec<&Entity> = entities.into_iter().collect();
        let count = entities.len();

        if count == 0 {
            return AggregateMetrics {
                population: PopulationMetrics::default(),
                derived: MetricSet::zeroed(self.family),
            };
        }

        let active = entities.iter().filter(|e| e.status == Status::Active).count();
        let critical = entities.iter().filter(|e| e.status == Status::Critical).count();
        let paused = entities.iter().filter(|e| e.paused).count();
        let descendants = entities.iter().filter(|e| !e.is_seed()).count();
        let parents = entities.iter().filter(|e| !e.children_ids.is_empty()).count();
        let linked = entities.iter().filter(|e| e.parent_id.is_some()).count();
        let generation_sum: f32 = entities.iter().map(|e| e.generation as f32).sum();

        // Per-attribute normalised sums
        let mut sums: BTreeMap<AttributeKind, (f32, usize)> = BTreeMap::new();
        for e in &entities {
            for (kind, b) in e.attributes() {
                let slot = sums.entry(kind).or_insert((0.0, 0));
                slot.0 += b.ratio();
                slot.1 += 1;
            }
        }
        let attribute_means: BTreeMap<AttributeKind, f32> = sums
            .into_iter()
            .map(|(k, (sum, n))| (k, if n == 0 { 0.0 } else { (sum / n as f32).clamp(0.0, 1.0) }))
            .collect();
        let mean = |kind: AttributeKind| attribute_means.get(&kind).copied().unwrap_or(0.0);

        let population = PopulationMetrics {
            count,
            active_ratio: share(active, count),
            critical_ratio: share(critical, count),
            paused_ratio: share(paused, count),
            mean_generation: generation_sum / count as f32,
            mean_primary: mean(self.primary),
            attribute_means: attribute_means.clone(),
        };

        let derived = match self.family {
            MetricFamily::Autopoiesis => {
                let coherence = mean(AttributeKind::Coherence);
                let coupling_signal = mean(AttributeKind::Resonance).max(mean(AttributeKind::Consciousness));
                MetricSet::Autopoiesis {
                    organizational_closure: (0.5 * coherence
                        + 0.3 * (1.0 - population.critical_ratio)
                        + 0.2 * population.mean_primary)
                        .clamp(0.0, 1.0),
                    self_production: share(descendants, count),
                    structural_coupling: (0.5 * share(parents, count) + 0.5 * coupling_signal).clamp(0.0, 1.0),
                    autonomy: (0.6 * population.active_ratio + 0.4 * population.mean_primary).clamp(0.0, 1.0),
                }
            }
            MetricFamily::Collective => MetricSet::Collective {
                collective_consciousness: mean(AttributeKind::Consciousness),
                dialogue_activity: population.active_ratio,
                creative_tension: (mean(AttributeKind::Creativity) * (1.0 - population.critical_ratio))
                    .clamp(0.0, 1.0),
            },
            MetricFamily::Network => MetricSet::Network {
                connectivity: share(linked, count),
                mean_resonance: mean(AttributeKind::Resonance),
                growth: share(descendants, count),
            },
        };

        AggregateMetrics { population, derived }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Bounded, Category, EntityId};

    fn entity(id: u64, energy: f32, status: Status) -> Entity {
        let mut e = Entity::new(EntityId(id), Category::Process, "p", 0)
            .with_attribute(AttributeKind::Energy, Bounded::percent(energy))
            .with_attribute(AttributeKind::Coherence, Bounded::unit(0.5));
        e.status = status;
        e
    }

    #[test]
    fn test_empty_collection_defaults() {
        let none: Vec<Entity> = Vec::new();
        for family in [MetricFamily::Autopoiesis, MetricFamily::Collective, MetricFamily::Network] {
            let metrics = MetricAggregator::new(family, AttributeKind::Energy).aggregate(&none);
            assert_eq!(metrics.population.count, 0);
            assert_eq!(metrics.population.mean_primary, 0.0);
            assert!(metrics.derived.values().iter().all(|(_, v)| *v == 0.0));
            assert!(metrics.validate().is_ok());
        }
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let entities = vec![entity(1, 20.0, Status::Active), entity(2, 80.0, Status::Critical)];
        let agg = MetricAggregator::new(MetricFamily::Autopoiesis, AttributeKind::Energy);
        assert_eq!(agg.aggregate(&entities), agg.aggregate(&entities));
    }

    #[test]
    fn test_population_ratios() {
        let entities = vec![
            entity(1, 0.0, Status::Active),
            entity(2, 100.0, Status::Active),
            entity(3, 50.0, Status::Critical),
            entity(4, 50.0, Status::Idle),
        ];
        let m = MetricAggregator::new(MetricFamily::Network, AttributeKind::Energy).aggregate(&entities);
        assert_eq!(m.population.count, 4);
        assert_eq!(m.population.active_ratio, 0.5);
        assert_eq!(m.population.critical_ratio, 0.25);
        assert_eq!(m.population.mean_primary, 0.5);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let mut m = MetricAggregator::new(MetricFamily::Collective, AttributeKind::Energy)
            .aggregate(&[entity(1, 10.0, Status::Idle)]);
        m.population.active_ratio = f32::NAN;
        assert!(matches!(m.validate(), Err(PoemaError::InvalidMetric(_))));
    }
}
