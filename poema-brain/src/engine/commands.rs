//! Commands - External Nudges to an Engine
//!
//! Commands are how the outside world touches a running kernel: force an
//! evolution step, shake every entity, pause or resume one, or ask one to
//! reproduce. They never panic; every failure comes back as a `PoemaError`.

use serde::{Deserialize, Serialize};

use super::*;

/// A request against one engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    /// Run one tick and a cull right now
    ForceEvolution,
    /// Shift every attribute by a random delta scaled by `intensity` (0..1)
    Perturb { intensity: f32 },
    Pause { id: EntityId },
    Resume { id: EntityId },
    Spawn { parent: EntityId },
}

/// What a command did
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Evolved { report: TickReport },
    Perturbed { entities: usize, intensity: f32 },
    Paused { id: EntityId },
    Resumed { id: EntityId },
    Spawned { id: EntityId },
}

impl PeriodicMutationEngine {
    /// Apply a command
    pub fn apply(&mut self, command: EngineCommand) -> PoemaResult<CommandOutcome> {
        tracing::info!("🎛️ '{}' <- {:?}", self.profile.name, command);

        match command {
            EngineCommand::ForceEvolution => {
                let mut report = self.tick();
                report.culled = self.cull().len();
                Ok(CommandOutcome::Evolved { report })
            }
            EngineCommand::Perturb { intensity } => {
                let intensity = clamp_intensity(intensity)?;
                let entities = self.perturb(intensity);
                Ok(CommandOutcome::Perturbed { entities, intensity })
            }
            EngineCommand::Pause { id } => {
                self.set_paused(id, true)?;
                Ok(CommandOutcome::Paused { id })
            }
            EngineCommand::Resume { id } => {
                self.set_paused(id, false)?;
                Ok(CommandOutcome::Resumed { id })
            }
            EngineCommand::Spawn { parent } => {
                let id = self.spawn(parent)?;
                Ok(CommandOutcome::Spawned { id })
            }
        }
    }

    /// Shake every unpaused entity; deltas are `(rand - 0.5) * span * intensity`
    ///
    /// Paused entities are frozen for perturbations as they are for ticks.
    fn perturb(&mut self, intensity: f32) -> usize {
        let mut touched = 0;
        for entity in self.entities.values_mut().filter(|e| !e.paused) {
            for (_, bounded) in entity.attributes_mut() {
                let delta = self.rng.delta(bounded.span() * intensity);
                bounded.nudge(delta);
            }
            touched += 1;
        }
        touched
    }

    fn set_paused(&mut self, id: EntityId, paused: bool) -> PoemaResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(PoemaError::EntityNotFound(id.0))?;
        entity.paused = paused;
        Ok(())
    }
}

/// Clamp to [0, 1]; NaN is rejected
fn clamp_intensity(intensity: f32) -> PoemaResult<f32> {
    if intensity.is_nan() {
        return Err(PoemaError::InvalidState("perturb intensity is not a number".to_string()));
    }
    Ok(intensity.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use poema_core::{AttributeKind, Bounded, SeededRandom};

    use crate::engine::tests::engine_with;

    fn engine() -> PeriodicMutationEngine {
        let mut engine = engine_with(
            KernelProfile::agent_collective(),
            EngineConfig::default(),
            Box::new(SeededRandom::from_seed(21)),
        );
        engine.seed(4).unwrap();
        engine
    }

    #[test]
    fn test_force_evolution_ticks() {
        let mut engine = engine();
        let outcome = engine.apply(EngineCommand::ForceEvolution).unwrap();
        match outcome {
            CommandOutcome::Evolved { report } => assert_eq!(report.tick, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.tick_count(), 1);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut engine = engine();
        let id = engine.entities()[1].id;

        engine.apply(EngineCommand::Pause { id }).unwrap();
        assert!(engine.entity(id).unwrap().paused);
        let before = engine.entity(id).unwrap().attribute(AttributeKind::Creativity);
        engine.tick();
        assert_eq!(engine.entity(id).unwrap().attribute(AttributeKind::Creativity), before);

        engine.apply(EngineCommand::Resume { id }).unwrap();
        assert!(!engine.entity(id).unwrap().paused);
    }

    #[test]
    fn test_unknown_entity() {
        let mut engine = engine();
        let result = engine.apply(EngineCommand::Pause { id: EntityId(999) });
        assert!(matches!(result, Err(PoemaError::EntityNotFound(999))));
    }

    #[test]
    fn test_perturb_clamps_intensity() {
        let mut engine = engine();
        let outcome = engine.apply(EngineCommand::Perturb { intensity: 7.0 }).unwrap();
        assert_eq!(outcome, CommandOutcome::Perturbed { entities: 4, intensity: 1.0 });
        assert!(engine.entities().iter().all(|e| e.is_consistent()));

        let nan = engine.apply(EngineCommand::Perturb { intensity: f32::NAN });
        assert!(matches!(nan, Err(PoemaError::InvalidState(_))));
    }

    #[test]
    fn test_perturb_leaves_paused_entities_alone() {
        let mut engine = engine();
        let id = engine.entities()[2].id;
        engine.apply(EngineCommand::Pause { id }).unwrap();
        let before: Vec<(AttributeKind, Bounded)> =
            engine.entity(id).unwrap().attributes().map(|(k, b)| (k, *b)).collect();

        let outcome = engine.apply(EngineCommand::Perturb { intensity: 1.0 }).unwrap();
        assert_eq!(outcome, CommandOutcome::Perturbed { entities: 3, intensity: 1.0 });

        let after: Vec<(AttributeKind, Bounded)> =
            engine.entity(id).unwrap().attributes().map(|(k, b)| (k, *b)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_spawn_command() {
        let mut engine = engine();
        let parent = engine.entities()[0].id;
        let outcome = engine.apply(EngineCommand::Spawn { parent }).unwrap();
        let CommandOutcome::Spawned { id } = outcome else {
            panic!("expected a spawn");
        };
        assert_eq!(engine.entity(id).unwrap().parent_id, Some(parent));
    }

    #[test]
    fn test_command_wire_format() {
        let cmd: EngineCommand = serde_json::from_str(r#"{"command":"perturb","intensity":0.5}"#).unwrap();
        assert_eq!(cmd, EngineCommand::Perturb { intensity: 0.5 });
    }
}
