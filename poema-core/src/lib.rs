//! # POEMA Core
//!
//! Core types and traits for POEMA, a periodic simulation and association
//! toolkit for a generative poetry installation.
//!
//! This crate provides the building blocks every engine shares:
//! - **Entity**: a record of bounded vitality attributes with lineage
//! - **BoundedHistoryLog**: fixed-capacity narration with FIFO overflow
//! - **MetricAggregator**: pure summaries of an entity collection
//! - **Text features**: tokens, concept tags and hashed vectors
//! - **RandomContentTable**: static flavor-text templates
//!
//! ## Determinism
//!
//! Nothing here reads the wall clock or a global RNG. Randomness comes
//! from a [`RandomSource`] and time from a [`Clock`], both injected.

pub mod clock;
pub mod config;
pub mod content;
pub mod entity;
pub mod error;
pub mod history;
pub mod metrics;
pub mod random;
pub mod text;
pub mod traits;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PoemaConfig;
pub use content::{ContentCategory, RandomContentTable};
pub use entity::{AttributeKind, Bounded, Category, Entity, EntityId, Status};
pub use error::{PoemaError, PoemaResult};
pub use history::{BoundedHistoryLog, HistoryEntry, HistoryEvent};
pub use metrics::{AggregateMetrics, MetricAggregator, MetricFamily, MetricSet, PopulationMetrics};
pub use random::{ConstantRandom, RandomSource, SeededRandom};
pub use text::Concept;
pub use traits::*;
