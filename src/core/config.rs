//! Simulation configuration with documented constants
//!
//! All tunable values are collected here with notes on how they interact.
//! A config is constructed once per run and passed by reference; there is
//! no ambient global state.

use crate::core::error::{AgoraError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decision-service parameters: generation, retry, admission control,
/// caching and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Model identifier sent to the service
    pub model: String,

    /// Maximum tokens per generated decision
    pub max_tokens: u32,

    /// Sampling temperature for generation
    pub temperature: f32,

    /// Attempts per call before the client gives up
    pub max_retries: u32,

    /// First-retry backoff; doubles per attempt up to `max_backoff_ms`
    pub base_backoff_ms: u64,

    /// Backoff ceiling
    pub max_backoff_ms: u64,

    /// Per-request timeout; a timed-out attempt counts as a failure
    pub request_timeout_ms: u64,

    /// Sustained outbound call rate (tokens refilled per second)
    pub rate_limit_per_second: f64,

    /// Extra admissions allowed above the sustained rate
    ///
    /// Any one-second window admits at most
    /// `rate_limit_per_second + burst` calls.
    pub burst: f64,

    /// Response cache capacity in entries (LRU eviction beyond this)
    pub cache_capacity: usize,

    /// Requests coalesced per batch window
    pub batch_size: usize,

    /// How long a batch window stays open waiting to fill
    ///
    /// Bounds the latency a request can pay for amortization: a cache
    /// miss waits at most this long before dispatch begins.
    pub flush_interval_ms: u64,

    /// Calls per circuit-breaker evaluation window
    pub breaker_window: u32,

    /// Failure rate within a window that trips the breaker
    pub breaker_failure_rate: f64,

    /// How long a tripped breaker short-circuits to the fallback
    /// generator before probing the service again
    pub breaker_cooldown_ms: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-haiku-20240307".into(),
            max_tokens: 150,
            temperature: 0.7,
            max_retries: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 16_000,
            request_timeout_ms: 60_000,
            rate_limit_per_second: 10.0,
            burst: 5.0,
            cache_capacity: 5_000,
            batch_size: 32,
            flush_interval_ms: 50,
            breaker_window: 20,
            breaker_failure_rate: 0.5,
            breaker_cooldown_ms: 30_000,
        }
    }
}

/// Per-actor parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Number of actors spawned at simulation init
    pub count: usize,

    /// Memory buffer capacity K; eviction is lowest importance, then oldest
    pub memory_capacity: usize,

    /// Radius within which another actor is a legal social target
    pub social_radius: f32,

    /// World units traveled per tick while Moving
    pub move_speed: f32,

    /// Starting energy scalar in [0, 1]
    pub initial_energy: f32,

    /// Starting account balance
    pub initial_money: f64,

    /// Wage credited per completed work action
    pub wage: f64,

    /// Energy spent per work action
    pub work_cost: f32,

    /// Energy spent per create action
    pub create_cost: f32,

    /// Energy recovered per rest action
    pub rest_recovery: f32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            count: 50,
            memory_capacity: 20,
            social_radius: 10.0,
            move_speed: 1.0,
            initial_energy: 1.0,
            initial_money: 100.0,
            wage: 10.0,
            work_cost: 0.1,
            create_cost: 0.2,
            rest_recovery: 0.3,
        }
    }
}

/// Step-engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Ticks before the run transitions to Completed
    pub max_steps: u64,

    /// World bounds (positions live in [0, width) x [0, height))
    pub world_width: f32,
    pub world_height: f32,

    /// Seed for world initialization and reproducible runs
    pub seed: u64,

    /// Upper bound on concurrent decision submissions per tick
    ///
    /// Caps memory and context-building cost; submissions beyond the
    /// bound wait for a permit rather than erroring.
    pub max_in_flight: usize,

    /// Soft per-tick deadline; unresolved actors default to Idle.
    /// In-flight calls are not cancelled and still warm the cache.
    pub tick_deadline_ms: u64,

    /// Actor count above which context building uses the thread pool
    pub parallel_threshold: usize,

    /// Snapshot cadence in ticks; 0 disables autosave
    pub autosave_interval: u64,

    /// Tick-summary logging cadence
    pub metrics_interval: u64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000,
            world_width: 100.0,
            world_height: 100.0,
            seed: 0,
            max_in_flight: 256,
            tick_deadline_ms: 2_000,
            parallel_threshold: 1_000,
            autosave_interval: 100,
            metrics_interval: 10,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for snapshots and autosaves
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./results".into(),
        }
    }
}

/// Top-level configuration for a simulation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decision: DecisionConfig,
    pub actors: ActorConfig,
    pub step: StepConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any omitted section or field.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| AgoraError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(AgoraError::ConfigError(msg));

        if self.decision.rate_limit_per_second <= 0.0 {
            return fail("rate_limit_per_second must be positive".into());
        }
        if self.decision.burst < 1.0 {
            return fail("burst must be at least 1 (the bucket must hold a whole token)".into());
        }
        if self.decision.cache_capacity == 0 {
            return fail("cache_capacity must be positive".into());
        }
        if self.decision.batch_size == 0 {
            return fail("batch_size must be positive".into());
        }
        if self.decision.flush_interval_ms == 0 {
            return fail("flush_interval_ms must be positive".into());
        }
        if self.decision.max_retries == 0 {
            return fail("max_retries must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.decision.breaker_failure_rate)
            || self.decision.breaker_failure_rate == 0.0
        {
            return fail("breaker_failure_rate must be in (0, 1]".into());
        }
        if self.decision.base_backoff_ms > self.decision.max_backoff_ms {
            return fail(format!(
                "base_backoff_ms ({}) must not exceed max_backoff_ms ({})",
                self.decision.base_backoff_ms, self.decision.max_backoff_ms
            ));
        }
        if self.actors.memory_capacity == 0 {
            return fail("memory_capacity must be positive".into());
        }
        if self.actors.move_speed <= 0.0 {
            return fail("move_speed must be positive".into());
        }
        if self.step.world_width <= 0.0 || self.step.world_height <= 0.0 {
            return fail("world dimensions must be positive".into());
        }
        if self.step.max_in_flight == 0 {
            return fail("max_in_flight must be positive".into());
        }
        if self.step.tick_deadline_ms == 0 {
            return fail("tick_deadline_ms must be positive".into());
        }
        Ok(())
    }
}
