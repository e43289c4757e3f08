//! Configuration
//!
//! Every tunable of the simulation, the engine loop and the controller
//! gateway. Nothing is read from process-wide state: the engine is built
//! from an explicit [`Config`], which can be loaded from JSON. Missing
//! fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::fixed::{to_fixed, Fixed};
use crate::network::server::ServerConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`Config`].
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simulation geometry and physics.
    pub sim: SimConfig,
    /// Engine loop, publication and throttling.
    pub engine: EngineConfig,
    /// WebSocket controller gateway.
    pub server: ServerConfig,
    /// Run the built-in heuristic controllers in-process.
    pub demo_controllers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            demo_controllers: true,
        }
    }
}

impl Config {
    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim.validate()?;
        self.engine.validate()
    }
}

/// Simulation configuration, in world units (pixels) and ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Play field width.
    pub field_width: i32,
    /// Play field height.
    pub field_height: i32,
    /// Ground/obstacle tile size. Obstacles are two tiles wide and gaps keep
    /// one tile of margin from both edges.
    pub tile_size: i32,
    /// Fixed horizontal position of every agent's left edge.
    pub agent_x: i32,
    /// Scoring reference: an obstacle scores once its trailing edge is left of this.
    pub score_line_x: i32,
    /// Agent box width.
    pub agent_width: i32,
    /// Agent box height.
    pub agent_height: i32,
    /// Downward acceleration per tick.
    pub gravity: f64,
    /// Vertical velocity set by a jump (negative is upward).
    pub jump_impulse: f64,
    /// Maximum downward velocity.
    pub terminal_velocity: f64,
    /// Horizontal scroll per tick, shared by obstacles and ground.
    pub scroll_speed: i32,
    /// Vertical size of every obstacle gap.
    pub gap_height: i32,
    /// Ticks between obstacle spawns.
    pub spawn_delay: i32,
    /// Base seed; each episode derives its own seed from this and its generation.
    pub seed: u64,
    /// Population used when the binary starts the first episode.
    pub population: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            field_width: 640,
            field_height: 480,
            tile_size: 32,
            agent_x: 100,
            score_line_x: 120,
            agent_width: 60,
            agent_height: 75,
            gravity: 0.25,
            jump_impulse: -6.0,
            terminal_velocity: 96.0,
            scroll_speed: 3,
            gap_height: 180,
            spawn_delay: 110,
            seed: 0x5EED,
            population: 20,
        }
    }
}

/// Agent integration constants in fixed-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentPhysics {
    /// Added to velocity every tick.
    pub gravity: Fixed,
    /// Velocity after a jump.
    pub jump_impulse: Fixed,
    /// Velocity clamp.
    pub terminal_velocity: Fixed,
}

impl SimConfig {
    /// Obstacle width (two tiles).
    #[inline]
    pub fn obstacle_width(&self) -> i32 {
        self.tile_size * 2
    }

    /// Lower vertical bound for agents: the top of the ground strip.
    #[inline]
    pub fn ground_y(&self) -> i32 {
        self.field_height - self.tile_size
    }

    /// Fixed-point physics constants.
    pub fn agent_physics(&self) -> AgentPhysics {
        AgentPhysics {
            gravity: to_fixed(self.gravity),
            jump_impulse: to_fixed(self.jump_impulse),
            terminal_velocity: to_fixed(self.terminal_velocity),
        }
    }

    /// Validate geometry and physics.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.field_width <= 0 || self.field_height <= 0 {
            return Err(ConfigError::Invalid("field dimensions must be positive".into()));
        }
        if self.tile_size <= 0 {
            return Err(ConfigError::Invalid("tile_size must be positive".into()));
        }
        if self.field_height - self.gap_height - 2 * self.tile_size <= 0 {
            return Err(ConfigError::Invalid(format!(
                "gap_height {} plus two {}-unit margins does not fit in field height {}",
                self.gap_height, self.tile_size, self.field_height
            )));
        }
        if self.gap_height <= 0 {
            return Err(ConfigError::Invalid("gap_height must be positive".into()));
        }
        if self.scroll_speed <= 0 {
            return Err(ConfigError::Invalid("scroll_speed must be positive".into()));
        }
        if self.spawn_delay < 0 {
            return Err(ConfigError::Invalid("spawn_delay must not be negative".into()));
        }
        if self.agent_width <= 0 || self.agent_height <= 0 {
            return Err(ConfigError::Invalid("agent dimensions must be positive".into()));
        }
        if self.agent_height >= self.ground_y() {
            return Err(ConfigError::Invalid("agent does not fit above the ground".into()));
        }
        if self.terminal_velocity <= 0.0 || self.terminal_velocity >= 1024.0 {
            return Err(ConfigError::Invalid("terminal_velocity must be in (0, 1024)".into()));
        }
        if self.gravity < 0.0 || self.jump_impulse.abs() >= 1024.0 {
            return Err(ConfigError::Invalid("gravity or jump_impulse out of range".into()));
        }
        Ok(())
    }
}

/// Engine loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// External frames per second driven by [`crate::engine::SimulationEngine::run`].
    pub frame_rate: u32,
    /// How long a step waits for awaiting callers to claim a published snapshot.
    pub claim_timeout_ms: u64,
    /// Record consumed input batches for replay.
    pub record_inputs: bool,
    /// Batches kept per episode; the recording is closed once full.
    pub max_recorded_inputs: usize,
    /// Ticks-per-frame control.
    pub throttle: ThrottleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            claim_timeout_ms: 2,
            record_inputs: true,
            max_recorded_inputs: 50_000,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate loop settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("frame_rate must be positive".into()));
        }
        self.throttle.validate()
    }
}

/// Adaptive ticks-per-frame configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Hill-climb the multiplier; otherwise pin it to `fixed_steps_per_frame`.
    pub adaptive: bool,
    /// Upper bound of the multiplier.
    pub ceiling: u32,
    /// Measured frames per second below which the multiplier backs off.
    pub target_tps: f64,
    /// Multiplier used when not adaptive.
    pub fixed_steps_per_frame: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            ceiling: 64,
            target_tps: 50.0,
            fixed_steps_per_frame: 2,
        }
    }
}

impl ThrottleConfig {
    /// Validate bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ceiling == 0 || self.fixed_steps_per_frame == 0 {
            return Err(ConfigError::Invalid("throttle multipliers must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{DEFAULT_GRAVITY, DEFAULT_JUMP_IMPULSE, DEFAULT_TERMINAL_VELOCITY};

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sim.obstacle_width(), 64);
        assert_eq!(config.sim.ground_y(), 448);
    }

    #[test]
    fn test_default_physics_matches_constants() {
        let physics = SimConfig::default().agent_physics();
        assert_eq!(physics.gravity, DEFAULT_GRAVITY);
        assert_eq!(physics.jump_impulse, DEFAULT_JUMP_IMPULSE);
        assert_eq!(physics.terminal_velocity, DEFAULT_TERMINAL_VELOCITY);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(
            r#"{ "sim": { "gap_height": 200, "seed": 9 }, "engine": { "throttle": { "ceiling": 8 } } }"#,
        )
        .unwrap();
        assert_eq!(config.sim.gap_height, 200);
        assert_eq!(config.sim.seed, 9);
        assert_eq!(config.sim.field_height, 480);
        assert_eq!(config.engine.throttle.ceiling, 8);
        assert_eq!(config.engine.frame_rate, 60);
        assert_eq!(config.engine.max_recorded_inputs, 50_000);
        assert!(config.demo_controllers);
        assert_eq!(config.server.bind_addr.port(), 8080);
    }

    #[test]
    fn test_gap_must_fit() {
        let result = Config::from_json_str(r#"{ "sim": { "gap_height": 420 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_json() {
        let result = Config::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let mut config = Config::default();
        config.engine.throttle.ceiling = 0;
        assert!(config.validate().is_err());
    }
}
