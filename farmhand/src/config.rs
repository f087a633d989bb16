//! Agent configuration.
//!
//! Plain structs with `Default` impls; `AgentConfig::from_env` applies the
//! optional `FARMHAND_*` overrides on top of the defaults.

use std::time::Duration;

/// HP-bar sampling.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Interval between HP samples.
    pub poll_interval: Duration,
    /// `hp_ratio` at or below this value counts as dead.
    pub zero_hp_threshold: f32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            zero_hp_threshold: 0.01,
        }
    }
}

/// Step execution defaults.
#[derive(Debug, Clone, Copy)]
pub struct FlowDefaults {
    /// Minimum acceptable template-match score when a step names none.
    pub threshold: f32,
    /// Polling interval for wait/click deadlines (>= 10 Hz).
    pub poll_interval: Duration,
}

impl Default for FlowDefaults {
    fn default() -> Self {
        Self {
            threshold: crate::step::DEFAULT_THRESHOLD,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Buff-state cache.
#[derive(Debug, Clone, Copy)]
pub struct ChargedConfig {
    /// How long a buff-state probe stays valid.
    pub cache_ttl: Duration,
}

impl Default for ChargedConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
        }
    }
}

/// Cycle orchestration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Soft resets tolerated within one cycle before escalating to a full
    /// account restart.
    pub max_resets: u32,
    /// How long the in-game macros are left running after being started.
    pub macro_duration: Duration,
    /// Re-check delay while the player is dead.
    pub dead_retry: Duration,
    /// Re-check delay while the respawn choice is still undecided.
    pub revive_retry: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_resets: 3,
            macro_duration: Duration::from_secs(2),
            dead_retry: Duration::from_secs(1),
            revive_retry: Duration::from_millis(300),
        }
    }
}

/// Full login restart.
#[derive(Debug, Clone)]
pub struct RestartConfig {
    pub max_restart_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restart_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Serial device parameters. The transport is opened by the embedder; the
/// baud rate is recorded here for that wiring.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baud: 115_200 }
    }
}

/// Everything in one place.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub watcher: WatcherConfig,
    pub flow: FlowDefaults,
    pub charged: ChargedConfig,
    pub orchestrator: OrchestratorConfig,
    pub restart: RestartConfig,
    pub serial: SerialConfig,
}

impl AgentConfig {
    /// Defaults with `FARMHAND_*` environment overrides applied.
    ///
    /// Recognized: `FARMHAND_POLL_MS`, `FARMHAND_ZERO_HP`,
    /// `FARMHAND_THRESHOLD`, `FARMHAND_MAX_RESETS`,
    /// `FARMHAND_RESTART_ATTEMPTS`, `FARMHAND_BAUD`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_parse::<u64>("FARMHAND_POLL_MS") {
            cfg.watcher.poll_interval = Duration::from_millis(ms);
        }
        if let Some(v) = env_parse::<f32>("FARMHAND_ZERO_HP") {
            cfg.watcher.zero_hp_threshold = v;
        }
        if let Some(v) = env_parse::<f32>("FARMHAND_THRESHOLD") {
            cfg.flow.threshold = v;
        }
        if let Some(v) = env_parse::<u32>("FARMHAND_MAX_RESETS") {
            cfg.orchestrator.max_resets = v;
        }
        if let Some(v) = env_parse::<u32>("FARMHAND_RESTART_ATTEMPTS") {
            cfg.restart.max_restart_attempts = v;
        }
        if let Some(v) = env_parse::<u32>("FARMHAND_BAUD") {
            cfg.serial.baud = v;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
