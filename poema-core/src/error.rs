//! # Error Types for POEMA
//!
//! Unified error handling across the POEMA crates.

use thiserror::Error;

/// Main error type for POEMA operations
#[derive(Error, Debug)]
pub enum PoemaError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity-related error
    #[error("Entity error: {0}")]
    Entity(String),

    /// Entity not found in its owning engine
    #[error("Entity {0} not found")]
    EntityNotFound(u64),

    /// No engine registered under this name
    #[error("Engine '{0}' not found")]
    EngineNotFound(String),

    /// Population limit reached
    #[error("Population limit reached: {current} >= {max}")]
    PopulationLimit { current: usize, max: usize },

    /// Feature vector of the wrong length
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Metric outside its declared range (or not finite)
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Timer registration error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for POEMA operations
pub type PoemaResult<T> = Result<T, PoemaError>;

impl PoemaError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an entity error
    pub fn entity(msg: impl Into<String>) -> Self {
        Self::Entity(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a metric error
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::InvalidMetric(msg.into())
    }
}

impl From<serde_json::Error> for PoemaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
