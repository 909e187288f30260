//! # Configuration - POEMA's Vital Parameters
//!
//! Every tunable of the installation lives here: how fast kernels tick,
//! how hard they mutate, how the archive links and forgets, where seed text
//! comes from and where the relay forwards to.

use serde::{Deserialize, Serialize};

use crate::error::{PoemaError, PoemaResult};

/// Master configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoemaConfig {
    /// Mutation engine settings (shared by every kernel)
    pub engine: EngineConfig,

    /// Associative archive settings
    pub index: IndexConfig,

    /// External seed-text source
    pub content: ContentConfig,

    /// Remote chat relay
    pub relay: RelayConfig,

    /// HTTP surface
    pub network: NetworkConfig,
}

/// Periodic mutation engine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base period between ticks (milliseconds)
    pub tick_interval_ms: u64,

    /// Maximum extra random delay added to each tick (milliseconds)
    pub tick_jitter_ms: u64,

    /// Multiplier applied to every attribute's step size (0 = frozen)
    pub step_scale: f32,

    /// Cull floor as a fraction of the primary attribute's range
    pub cull_floor_ratio: f32,

    /// Below this fraction of its range the primary attribute marks an entity critical
    pub critical_ratio: f32,

    /// Parent keeps this fraction of its primary resource after spawning
    pub reproduction_cost_fraction: f64,

    /// Lower bound of the multiplicative jitter applied to inherited attributes
    pub child_jitter_min: f32,

    /// Upper bound of the multiplicative jitter applied to inherited attributes
    pub child_jitter_max: f32,

    /// Hard population cap per engine
    pub max_population: usize,

    /// Maximum children tracked per entity
    pub max_children: usize,

    /// Retained history entries per engine
    pub history_capacity: usize,

    /// Append a metrics snapshot to history every N ticks (0 = never)
    pub metrics_history_every: u64,

    /// Seed entities created at startup
    pub seed_count: usize,

    /// Fixed RNG seed (None = entropy)
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            tick_jitter_ms: 250,
            step_scale: 1.0,
            cull_floor_ratio: 0.05,   // 5 on a 0..100 scale
            critical_ratio: 0.2,
            reproduction_cost_fraction: 0.5,
            child_jitter_min: 0.7,
            child_jitter_max: 1.1,
            max_population: 256,
            max_children: 16,
            history_capacity: 100,
            metrics_history_every: 10,
            seed_count: 5,
            rng_seed: None,
        }
    }
}

/// Associative archive settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Feature vector length (fixed for the life of the index)
    pub dims: usize,

    /// Weight of concept-tag overlap in edge scoring
    pub alpha: f32,

    /// Weight of cosine similarity in edge scoring (alpha + beta = 1)
    pub beta: f32,

    /// Minimum weighted similarity to create an edge
    pub edge_threshold: f32,

    /// Edge weight multiplier applied on every consolidation pass
    pub decay_factor: f32,

    /// Edges below this weight are removed
    pub prune_floor: f32,

    /// Query result count
    pub top_k: usize,

    /// Period of the consolidation (decay) job in milliseconds
    pub decay_interval_ms: u64,

    /// Cluster count for archive k-means
    pub clusters: usize,

    /// Archive capacity; the oldest passage is evicted beyond it
    pub max_nodes: usize,

    /// Strongest edges kept per archived passage
    pub max_edges_per_node: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dims: 32,
            alpha: 0.4,
            beta: 0.6,
            edge_threshold: 0.3,
            decay_factor: 0.95,
            prune_floor: 0.01,
            top_k: 6,
            decay_interval_ms: 30_000,
            clusters: 4,
            max_nodes: 500,
            max_edges_per_node: 16,
        }
    }
}

/// External seed-text source
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Proxy URL template; `{url}` is replaced by the encoded source URL
    pub proxy_template: String,

    /// Pages to learn seed text from
    pub sources: Vec<String>,

    /// Request timeout (milliseconds)
    pub timeout_ms: u64,

    /// Period of the ingestion job (milliseconds)
    pub fetch_interval_ms: u64,

    /// Maximum passages kept per fetch
    pub max_passages: usize,

    /// Skip the network entirely and always use the static table
    pub offline: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            proxy_template: "https://api.allorigins.win/raw?url={url}".to_string(),
            sources: vec![
                "https://en.wikiquote.org/wiki/Special:Random".to_string(),
                "https://simple.wikipedia.org/wiki/Special:Random".to_string(),
            ],
            timeout_ms: 5_000,
            fetch_interval_ms: 120_000,
            max_passages: 8,
            offline: false,
        }
    }
}

/// Remote chat relay
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Chat-completion endpoint
    pub endpoint: String,

    /// Model name forwarded upstream
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Base system prompt, before semantic tags are appended
    pub system_prompt: String,

    /// JSON-lines cache of relayed exchanges (best effort)
    pub cache_path: String,

    /// Upstream timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "POEMA_RELAY_API_KEY".to_string(),
            system_prompt: "You are the voice of a generative poetry installation. Answer briefly.".to_string(),
            cache_path: "data/relay-cache.jsonl".to_string(),
            timeout_ms: 20_000,
        }
    }
}

/// HTTP surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address
    pub bind_address: String,

    /// Port
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8787,
        }
    }
}

impl PoemaConfig {
    /// Load configuration from file
    pub fn load(path: &str) -> PoemaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> PoemaResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create config from environment variables
    ///
    /// Reads:
    /// - POEMA_CONFIG: JSON config file to start from (default: built-in defaults)
    /// - POEMA_PORT: HTTP port
    /// - POEMA_TICK_MS: Tick interval
    /// - POEMA_SEED: Fixed RNG seed
    /// - POEMA_OFFLINE: "1"/"true" disables network seed fetching
    /// - POEMA_RELAY_ENDPOINT: Relay upstream URL
    pub fn from_env() -> Self {
        let mut config = match std::env::var("POEMA_CONFIG") {
            Ok(path) => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Cannot load {}: {}, using defaults", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        if let Ok(val) = std::env::var("POEMA_PORT") {
            if let Ok(v) = val.parse() {
                config.network.port = v;
            }
        }
        if let Ok(val) = std::env::var("POEMA_TICK_MS") {
            if let Ok(v) = val.parse() {
                config.engine.tick_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("POEMA_SEED") {
            if let Ok(v) = val.parse() {
                config.engine.rng_seed = Some(v);
            }
        }
        if let Ok(val) = std::env::var("POEMA_OFFLINE") {
            config.content.offline = val == "1" || val.to_lowercase() == "true";
        }
        if let Ok(val) = std::env::var("POEMA_RELAY_ENDPOINT") {
            config.relay.endpoint = val;
        }

        config
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> PoemaResult<()> {
        let e = &self.engine;
        if !(0.0..=1.0).contains(&e.reproduction_cost_fraction) {
            return Err(PoemaError::config("reproduction_cost_fraction must be within [0, 1]"));
        }
        if !(e.child_jitter_min.is_finite() && e.child_jitter_max.is_finite()) {
            return Err(PoemaError::config("child jitter bounds must be finite"));
        }
        if e.child_jitter_min > e.child_jitter_max || e.child_jitter_min < 0.0 {
            return Err(PoemaError::config("child jitter range is inverted or negative"));
        }
        if !(e.step_scale.is_finite() && e.step_scale >= 0.0) {
            return Err(PoemaError::config("step_scale must be finite and non-negative"));
        }
        if !(0.0..=1.0).contains(&e.cull_floor_ratio) {
            return Err(PoemaError::config("cull_floor_ratio must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&e.critical_ratio) {
            return Err(PoemaError::config("critical_ratio must be within [0, 1]"));
        }
        if e.tick_interval_ms == 0 {
            return Err(PoemaError::config("tick_interval_ms must be positive"));
        }

        let i = &self.index;
        if i.dims == 0 {
            return Err(PoemaError::config("index dims must be positive"));
        }
        if !(i.alpha.is_finite() && i.beta.is_finite()) || ((i.alpha + i.beta) - 1.0).abs() > 1e-4 {
            return Err(PoemaError::config(format!(
                "alpha + beta must equal 1 (got {} + {})",
                i.alpha, i.beta
            )));
        }
        if !(i.decay_factor > 0.0 && i.decay_factor < 1.0) {
            return Err(PoemaError::config("decay_factor must be within (0, 1)"));
        }
        if i.decay_interval_ms <= e.tick_interval_ms {
            return Err(PoemaError::config(
                "decay_interval_ms must be longer than tick_interval_ms",
            ));
        }
        if i.top_k == 0 {
            return Err(PoemaError::config("top_k must be positive"));
        }
        if i.max_nodes == 0 || i.max_edges_per_node == 0 {
            return Err(PoemaError::config("archive capacity and edge cap must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PoemaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unbalanced_weights() {
        let mut config = PoemaConfig::default();
        config.index.alpha = 0.7;
        config.index.beta = 0.7;
        assert!(matches!(config.validate(), Err(PoemaError::Config(_))));
    }

    #[test]
    fn test_decay_must_be_slower_than_tick() {
        let mut config = PoemaConfig::default();
        config.index.decay_interval_ms = config.engine.tick_interval_ms;
        assert!(config.validate().is_err());
    }

    fn rejects(edit: impl FnOnce(&mut PoemaConfig)) -> bool {
        let mut config = PoemaConfig::default();
        edit(&mut config);
        matches!(config.validate(), Err(PoemaError::Config(_)))
    }

    #[test]
    fn test_rejects_ratios_outside_unit_range() {
        assert!(rejects(|c| c.engine.cull_floor_ratio = 1.5));
        assert!(rejects(|c| c.engine.cull_floor_ratio = -0.1));
        assert!(rejects(|c| c.engine.cull_floor_ratio = f32::NAN));
        assert!(rejects(|c| c.engine.critical_ratio = 2.0));
        assert!(rejects(|c| c.engine.critical_ratio = f32::NAN));
        assert!(!rejects(|c| c.engine.critical_ratio = 1.0));
    }

    #[test]
    fn test_rejects_bad_step_scale() {
        assert!(rejects(|c| c.engine.step_scale = -1.0));
        assert!(rejects(|c| c.engine.step_scale = f32::INFINITY));
        assert!(rejects(|c| c.engine.step_scale = f32::NAN));
        assert!(!rejects(|c| c.engine.step_scale = 0.0));
    }

    #[test]
    fn test_rejects_non_finite_jitter() {
        assert!(rejects(|c| c.engine.child_jitter_min = f32::NAN));
        assert!(rejects(|c| c.engine.child_jitter_max = f32::NAN));
        assert!(rejects(|c| c.engine.child_jitter_max = f32::INFINITY));
        assert!(rejects(|c| c.engine.reproduction_cost_fraction = f64::NAN));
    }

    #[test]
    fn test_rejects_non_finite_weights_and_empty_archive() {
        assert!(rejects(|c| c.index.alpha = f32::NAN));
        assert!(rejects(|c| c.index.max_nodes = 0));
        assert!(rejects(|c| c.index.max_edges_per_node = 0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poema.json");
        let path = path.to_str().unwrap();

        let mut config = PoemaConfig::default();
        config.engine.rng_seed = Some(7);
        config.save(path).unwrap();

        let loaded = PoemaConfig::load(path).unwrap();
        assert_eq!(loaded.engine.rng_seed, Some(7));
        assert_eq!(loaded.index.dims, config.index.dims);
    }
}
