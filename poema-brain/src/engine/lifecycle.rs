//! Lifecycle - Replication and Culling
//!
//! Children inherit every attribute with a multiplicative jitter and cost
//! their parent part of its primary resource. Spent descendants are culled;
//! seeds never are.

use poema_core::Bounded;

use super::*;

impl PeriodicMutationEngine {
    /// Spawn a child from `parent_id`
    ///
    /// The child inherits each attribute times a jitter drawn from
    /// `[child_jitter_min, child_jitter_max)`, clamped to the attribute's range.
    /// The parent keeps `primary * reproduction_cost_fraction`.
    pub fn spawn(&mut self, parent_id: EntityId) -> PoemaResult<EntityId> {
        self.check_population()?;

        let now = self.clock.now_ms();
        let (jitter_min, jitter_max) = (self.config.child_jitter_min, self.config.child_jitter_max);

        let parent = self
            .entities
            .get(&parent_id)
            .ok_or(PoemaError::EntityNotFound(parent_id.0))?;

        let id = EntityId(self.next_id);
        let mut child = Entity::new(id, parent.category, parent.label.clone(), now);
        for (kind, bounded) in parent.attributes() {
            let jitter = self.rng.range(jitter_min, jitter_max);
            child.insert_attribute(kind, Bounded::new(bounded.value() * jitter, bounded.min(), bounded.max()));
        }
        child.generation = parent.generation.saturating_add(1);
        child.parent_id = Some(parent_id);
        child.status = Status::Active;
        self.next_id += 1;

        // Parent pays the cost
        let primary = self.profile.primary;
        let cost_fraction = self.config.reproduction_cost_fraction;
        let max_children = self.config.max_children;
        if let Some(parent) = self.entities.get_mut(&parent_id) {
            if let Some(resource) = parent.attribute(primary) {
                // f64 product so that e.g. 100 x 0.3 lands on 30 exactly
                let kept = (f64::from(resource) * cost_fraction) as f32;
                parent.set_attribute(primary, kept)?;
            }
            parent.add_child(id, max_children);
        }

        tracing::debug!("🧬 '{}' {} spawned {} (gen {})", self.profile.name, parent_id, id, child.generation);
        self.entities.insert(id, child);
        Ok(id)
    }

    /// Remove descendants whose primary attribute fell under the floor
    ///
    /// The floor sits at `cull_floor_ratio` of the primary attribute's range.
    /// Generation-0 entities are never removed. Returns the culled ids.
    pub fn cull(&mut self) -> Vec<EntityId> {
        let primary = self.profile.primary;
        let floor_ratio = self.config.cull_floor_ratio;

        let doomed: Vec<(EntityId, Option<EntityId>)> = self
            .entities
            .values()
            .filter(|e| !e.is_seed())
            .filter(|e| match e.bounds(primary) {
                Some(b) => b.value() < b.at_ratio(floor_ratio),
                None => false,
            })
            .map(|e| (e.id, e.parent_id))
            .collect();

        for (id, parent_id) in &doomed {
            self.entities.remove(id);
            if let Some(parent) = parent_id.and_then(|p| self.entities.get_mut(&p)) {
                parent.remove_child(*id);
            }
        }

        if !doomed.is_empty() {
            tracing::debug!("💀 '{}' culled {} entities", self.profile.name, doomed.len());
        }
        doomed.into_iter().map(|(id, _)| id).collect()
    }
}
