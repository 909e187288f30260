//! # Entity - The Simulated Unit of the Installation
//!
//! An entity is whatever a kernel animates: a process, an agent, a
//! component, a memory node, a micelio node. It carries:
//! - Vitality attributes, each bound to a declared range
//! - A coarse status label
//! - Lineage (generation, parent, children)
//!
//! ## Invariant
//!
//! Every attribute is clamped to its `[min, max]` after each write.
//! Non-finite writes are dropped and the attribute keeps its previous value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PoemaError, PoemaResult};

/// Identifier, unique within the owning engine
///
/// Allocated monotonically, so id order is insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of entity categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Process,
    Agent,
    Component,
    MemoryNode,
    MicelioNode,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Process => write!(f, "process"),
            Category::Agent => write!(f, "agent"),
            Category::Component => write!(f, "component"),
            Category::MemoryNode => write!(f, "memory"),
            Category::MicelioNode => write!(f, "micelio"),
        }
    }
}

/// Named vitality attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Energy,
    Consciousness,
    Intensity,
    Fitness,
    Coherence,
    Resonance,
    Creativity,
}

impl AttributeKind {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Energy => "energy",
            AttributeKind::Consciousness => "consciousness",
            AttributeKind::Intensity => "intensity",
            AttributeKind::Fitness => "fitness",
            AttributeKind::Coherence => "coherence",
            AttributeKind::Resonance => "resonance",
            AttributeKind::Creativity => "creativity",
        }
    }
}

/// A scalar held inside a declared range
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounded {
    value: f32,
    min: f32,
    max: f32,
}

impl Bounded {
    /// Create a bounded value (range is reordered if given backwards)
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let start = if value.is_finite() { value } else { min };
        Self { value: start.clamp(min, max), min, max }
    }

    /// Value on a 0..1 scale
    pub fn unit(value: f32) -> Self {
        Self::new(value, 0.0, 1.0)
    }

    /// Value on a 0..100 scale
    pub fn percent(value: f32) -> Self {
        Self::new(value, 0.0, 100.0)
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    #[inline]
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Write a candidate value, clamped
    ///
    /// Returns false (and keeps the old value) if the candidate is NaN or infinite.
    pub fn set(&mut self, candidate: f32) -> bool {
        if !candidate.is_finite() {
            return false;
        }
        self.value = candidate.clamp(self.min, self.max);
        true
    }

    /// Add a delta, clamped
    pub fn nudge(&mut self, delta: f32) -> bool {
        self.set(self.value + delta)
    }

    /// Position within the range, 0..1 (0 for a degenerate range)
    pub fn ratio(&self) -> f32 {
        let span = self.span();
        if span <= f32::EPSILON {
            return 0.0;
        }
        ((self.value - self.min) / span).clamp(0.0, 1.0)
    }

    /// Value sitting at `ratio` of the range
    pub fn at_ratio(&self, ratio: f32) -> f32 {
        self.min + self.span() * ratio
    }

    pub fn is_within(&self) -> bool {
        self.value.is_finite() && self.value >= self.min && self.value <= self.max
    }
}

/// Coarse status label
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Active,
    Critical,
    Dormant,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Idle, Status::Active, Status::Critical, Status::Dormant];
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::Active => write!(f, "active"),
            Status::Critical => write!(f, "critical"),
            Status::Dormant => write!(f, "dormant"),
        }
    }
}

/// A simulated record advanced by a mutation engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier within the owning engine
    pub id: EntityId,

    /// Category tag
    pub category: Category,

    /// Role label from the owning kernel's vocabulary ("poet", "membrane", ...)
    pub label: String,

    /// Vitality attributes (private: writes go through the clamping setters)
    attributes: BTreeMap<AttributeKind, Bounded>,

    /// Coarse status
    pub status: Status,

    /// Depth in the lineage tree (0 = seed)
    pub generation: u32,

    /// Parent, if spawned
    pub parent_id: Option<EntityId>,

    /// Children, oldest first (bounded by the engine)
    pub children_ids: Vec<EntityId>,

    /// Creation time (ms, from the engine clock)
    pub created_at: u64,

    /// Paused entities are skipped by `tick()`
    pub paused: bool,
}

impl Entity {
    /// Create a seed entity with no attributes yet
    pub fn new(id: EntityId, category: Category, label: impl Into<String>, created_at: u64) -> Self {
        Self {
            id,
            category,
            label: label.into(),
            attributes: BTreeMap::new(),
            status: Status::Idle,
            generation: 0,
            parent_id: None,
            children_ids: Vec::new(),
            created_at,
            paused: false,
        }
    }

    /// Builder: declare an attribute
    pub fn with_attribute(mut self, kind: AttributeKind, bounded: Bounded) -> Self {
        self.attributes.insert(kind, bounded);
        self
    }

    /// Declare (or replace) an attribute
    pub fn insert_attribute(&mut self, kind: AttributeKind, bounded: Bounded) {
        self.attributes.insert(kind, bounded);
    }

    /// Current value of an attribute
    pub fn attribute(&self, kind: AttributeKind) -> Option<f32> {
        self.attributes.get(&kind).map(|b| b.value())
    }

    /// Attribute with its bounds
    pub fn bounds(&self, kind: AttributeKind) -> Option<Bounded> {
        self.attributes.get(&kind).copied()
    }

    /// All attributes in a stable order
    pub fn attributes(&self) -> impl Iterator<Item = (AttributeKind, &Bounded)> {
        self.attributes.iter().map(|(k, b)| (*k, b))
    }

    /// Mutable access for the engine's mutate pass (writes stay clamped)
    pub fn attributes_mut(&mut self) -> impl Iterator<Item = (AttributeKind, &mut Bounded)> {
        self.attributes.iter_mut().map(|(k, b)| (*k, b))
    }

    /// Write an attribute (clamped; non-finite writes are ignored)
    pub fn set_attribute(&mut self, kind: AttributeKind, value: f32) -> PoemaResult<()> {
        match self.attributes.get_mut(&kind) {
            Some(b) => {
                b.set(value);
                Ok(())
            }
            None => Err(PoemaError::entity(format!(
                "{} has no attribute '{}'",
                self.id,
                kind.name()
            ))),
        }
    }

    /// Seeds (generation 0) are protected from culling
    pub fn is_seed(&self) -> bool {
        self.generation == 0
    }

    /// Record a child, dropping the oldest if over `max`
    pub fn add_child(&mut self, child: EntityId, max: usize) {
        self.children_ids.push(child);
        let max = max.max(1);
        if self.children_ids.len() > max {
            let overflow = self.children_ids.len() - max;
            self.children_ids.drain(0..overflow);
        }
    }

    /// Forget a child (after it is culled)
    pub fn remove_child(&mut self, child: EntityId) {
        self.children_ids.retain(|c| *c != child);
    }

    /// Every attribute inside its range
    pub fn is_consistent(&self) -> bool {
        self.attributes.values().all(|b| b.is_within())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_clamps() {
        let mut b = Bounded::percent(50.0);
        b.nudge(80.0);
        assert_eq!(b.value(), 100.0);
        b.set(-3.0);
        assert_eq!(b.value(), 0.0);
    }

    #[test]
    fn test_bounded_ignores_nan() {
        let mut b = Bounded::unit(0.4);
        assert!(!b.set(f32::NAN));
        assert!(!b.nudge(f32::INFINITY));
        assert_eq!(b.value(), 0.4);
    }

    #[test]
    fn test_bounded_reorders_range() {
        let b = Bounded::new(5.0, 10.0, 0.0);
        assert_eq!(b.min(), 0.0);
        assert_eq!(b.max(), 10.0);
        assert_eq!(b.ratio(), 0.5);
    }

    #[test]
    fn test_children_are_bounded() {
        let mut e = Entity::new(EntityId(1), Category::Process, "membrane", 0);
        for i in 0..5 {
            e.add_child(EntityId(10 + i), 3);
        }
        assert_eq!(e.children_ids, vec![EntityId(12), EntityId(13), EntityId(14)]);
        e.remove_child(EntityId(13));
        assert_eq!(e.children_ids, vec![EntityId(12), EntityId(14)]);
    }

    #[test]
    fn test_missing_attribute_is_an_error() {
        let mut e = Entity::new(EntityId(1), Category::Agent, "poet", 0)
            .with_attribute(AttributeKind::Energy, Bounded::unit(0.5));
        assert!(e.set_attribute(AttributeKind::Energy, 2.0).is_ok());
        assert_eq!(e.attribute(AttributeKind::Energy), Some(1.0));
        assert!(e.set_attribute(AttributeKind::Fitness, 0.1).is_err());
    }
}
