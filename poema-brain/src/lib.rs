//! # POEMA Brain
//!
//! The running side of POEMA: five periodic mutation kernels, the
//! associative archive they feed, and the HTTP surface around them.
//!
//! ## Module Structure
//!
//! - `engine` - Periodic mutation engine, kernel profiles, commands
//! - `index` - Associative archive and its clustering
//! - `scheduler` - Timer abstraction (tokio and manual)
//! - `host` - Start/stop lifecycle of an engine's jobs
//! - `source` - Seed text from the web, with static fallback
//! - `relay` - Chat relay with semantic tags and reply scores
//! - `app` - The `Installation` composition root
//! - `handlers` - warp routes

pub mod app;
pub mod engine;
pub mod handlers;
pub mod host;
pub mod index;
pub mod relay;
pub mod scheduler;
pub mod source;

pub use app::Installation;
pub use engine::{EngineCommand, KernelProfile, PeriodicMutationEngine};
pub use host::EngineHost;
pub use index::AssociativeIndex;
pub use relay::RelayClient;
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use source::ContentSource;
