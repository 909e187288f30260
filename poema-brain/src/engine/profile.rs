//! Kernel Profiles
//!
//! Every "kernel" of the installation is the same loop with different
//! numbers: which categories it animates, which attributes its entities
//! carry, how far each attribute drifts per tick, how often it spawns or
//! talks, and which metric family summarizes it.

use poema_core::{AttributeKind, Bounded, Category, ContentCategory, MetricFamily};

/// Declared range, seed range and per-tick step of one attribute
#[derive(Clone, Copy, Debug)]
pub struct AttributeSpec {
    pub kind: AttributeKind,
    pub min: f32,
    pub max: f32,
    /// Seeds start uniformly inside this range
    pub initial: (f32, f32),
    /// `value += (rand - 0.5) * step` each tick
    pub step: f32,
}

impl AttributeSpec {
    pub const fn new(kind: AttributeKind, min: f32, max: f32, initial: (f32, f32), step: f32) -> Self {
        Self { kind, min, max, initial, step }
    }

    /// Attribute holding `value` inside this spec's range
    pub fn bounded(&self, value: f32) -> Bounded {
        Bounded::new(value, self.min, self.max)
    }
}

/// Declarative description of one kernel variant
#[derive(Clone, Debug)]
pub struct KernelProfile {
    /// Route and log name
    pub name: &'static str,

    /// Categories assigned round-robin to seeds
    pub categories: &'static [Category],

    /// Role labels drawn at random for seeds
    pub labels: &'static [&'static str],

    /// Attributes every entity carries
    pub attributes: Vec<AttributeSpec>,

    /// Resource paid on reproduction, checked by cull and status
    pub primary: AttributeKind,

    /// Per-entity, per-tick side-effect probabilities (summing below 1)
    pub spawn_probability: f32,
    pub event_probability: f32,
    pub flip_probability: f32,

    /// Template category for narration
    pub content: ContentCategory,

    pub family: MetricFamily,
}

use AttributeKind::*;

impl KernelProfile {
    /// Step size declared for `kind` (0 when undeclared)
    pub fn step_for(&self, kind: AttributeKind) -> f32 {
        self.attributes
            .iter()
            .find(|a| a.kind == kind)
            .map_or(0.0, |a| a.step)
    }

    /// Processes maintaining their own boundary
    pub fn autopoietic_kernel() -> Self {
        Self {
            name: "autopoietic-kernel",
            categories: &[Category::Process],
            labels: &["membrane", "metabolism", "boundary", "catalyst", "loop"],
            attributes: vec![
                AttributeSpec::new(Energy, 0.0, 100.0, (40.0, 80.0), 8.0),
                AttributeSpec::new(Coherence, 0.0, 1.0, (0.3, 0.7), 0.08),
                AttributeSpec::new(Consciousness, 0.0, 1.0, (0.1, 0.4), 0.05),
            ],
            primary: Energy,
            spawn_probability: 0.03,
            event_probability: 0.08,
            flip_probability: 0.04,
            content: ContentCategory::Process,
            family: MetricFamily::Autopoiesis,
        }
    }

    /// Components coupled into a self-producing organisation
    pub fn autopoietic_system() -> Self {
        Self {
            name: "autopoietic-system",
            categories: &[Category::Component, Category::Process],
            labels: &["sensor", "effector", "regulator", "archive", "interface"],
            attributes: vec![
                AttributeSpec::new(Fitness, 0.0, 100.0, (50.0, 90.0), 6.0),
                AttributeSpec::new(Coherence, 0.0, 1.0, (0.4, 0.8), 0.06),
                AttributeSpec::new(Resonance, 0.0, 1.0, (0.2, 0.6), 0.1),
            ],
            primary: Fitness,
            spawn_probability: 0.02,
            event_probability: 0.06,
            flip_probability: 0.05,
            content: ContentCategory::System,
            family: MetricFamily::Autopoiesis,
        }
    }

    /// Memory nodes evolving under the core
    pub fn autopoietic_core() -> Self {
        Self {
            name: "autopoietic-core",
            categories: &[Category::MemoryNode],
            labels: &["trace", "echo", "fragment", "palimpsest"],
            attributes: vec![
                AttributeSpec::new(Energy, 0.0, 100.0, (30.0, 70.0), 5.0),
                AttributeSpec::new(Consciousness, 0.0, 1.0, (0.2, 0.5), 0.04),
                AttributeSpec::new(Coherence, 0.0, 1.0, (0.3, 0.6), 0.05),
            ],
            primary: Energy,
            spawn_probability: 0.025,
            event_probability: 0.1,
            flip_probability: 0.03,
            content: ContentCategory::Core,
            family: MetricFamily::Autopoiesis,
        }
    }

    /// Internal agents holding a dialogue
    pub fn agent_collective() -> Self {
        Self {
            name: "agent-collective",
            categories: &[Category::Agent],
            labels: &["poet", "philosopher", "critic", "dreamer", "archivist"],
            attributes: vec![
                AttributeSpec::new(Energy, 0.0, 100.0, (50.0, 100.0), 6.0),
                AttributeSpec::new(Consciousness, 0.0, 1.0, (0.3, 0.7), 0.06),
                AttributeSpec::new(Creativity, 0.0, 1.0, (0.2, 0.9), 0.1),
            ],
            primary: Energy,
            spawn_probability: 0.01,
            event_probability: 0.2,
            flip_probability: 0.06,
            content: ContentCategory::Dialogue,
            family: MetricFamily::Collective,
        }
    }

    /// Micelio nodes spreading through a feed
    pub fn micelio_network() -> Self {
        Self {
            name: "micelio-network",
            categories: &[Category::MicelioNode],
            labels: &["hypha", "spore", "knot", "fruiting-body"],
            attributes: vec![
                AttributeSpec::new(Energy, 0.0, 100.0, (40.0, 90.0), 7.0),
                AttributeSpec::new(Resonance, 0.0, 1.0, (0.1, 0.5), 0.08),
                AttributeSpec::new(Intensity, 0.0, 10.0, (2.0, 6.0), 1.0),
            ],
            primary: Energy,
            spawn_probability: 0.05,
            event_probability: 0.07,
            flip_probability: 0.02,
            content: ContentCategory::Micelio,
            family: MetricFamily::Network,
        }
    }

    /// Every built-in profile, in route order
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::autopoietic_kernel(),
            Self::autopoietic_system(),
            Self::autopoietic_core(),
            Self::agent_collective(),
            Self::micelio_network(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_well_formed() {
        let profiles = KernelProfile::builtin();
        assert_eq!(profiles.len(), 5);
        for p in &profiles {
            assert!(!p.categories.is_empty(), "{}", p.name);
            assert!(!p.labels.is_empty(), "{}", p.name);
            assert!(p.attributes.iter().any(|a| a.kind == p.primary), "{}", p.name);
            let total = p.spawn_probability + p.event_probability + p.flip_probability;
            assert!(total < 0.9, "{}", p.name);
            for a in &p.attributes {
                assert!(a.min <= a.initial.0 && a.initial.1 <= a.max, "{}", p.name);
            }
        }
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = KernelProfile::builtin().iter().map(|p| p.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
    }
}
