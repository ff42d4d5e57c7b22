//! Engine configuration.
//!
//! Every tunable lives here and is passed explicitly to [`crate::Engine::new`].
//! Defaults match the documented behaviour; JSON and `SHOOTER_*` environment
//! variables can override them.

use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::chain::dispatcher::DispatchConfig;
use crate::chain::encoder::EncoderConfig;
use crate::chain::metrics::MetricsConfig;
use crate::engine::clock::ClockConfig;
use crate::game::tick::SimConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed JSON.
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    /// Environment variable present but unparsable.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },

    /// Values parse but make no sense together.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// On-chain program receiving the actions
    pub program_id: String,
    /// Simulation rules
    pub sim: SimConfig,
    /// Frame pacing
    pub clock: ClockConfig,
    /// Submission pipeline
    pub dispatch: DispatchConfig,
    /// Event encoding
    pub encoder: EncoderConfig,
    /// Statistics and feed
    pub metrics: MetricsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program_id: "chain-shooter".to_string(),
            sim: SimConfig::default(),
            clock: ClockConfig::default(),
            dispatch: DispatchConfig::default(),
            encoder: EncoderConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SHOOTER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(program_id) = lookup("SHOOTER_PROGRAM_ID") {
            self.program_id = program_id;
        }
        override_parsed(&lookup, "SHOOTER_SEED", &mut self.sim.seed)?;
        override_parsed(&lookup, "SHOOTER_LIVES", &mut self.sim.player_lives)?;
        override_parsed(&lookup, "SHOOTER_TICK_RATE", &mut self.clock.tick_rate)?;
        override_parsed(&lookup, "SHOOTER_MAX_RETRIES", &mut self.dispatch.max_retries)?;
        override_parsed(&lookup, "SHOOTER_BACKOFF_MS", &mut self.dispatch.backoff_base_ms)?;
        override_parsed(&lookup, "SHOOTER_COMBAT_CONCURRENCY", &mut self.dispatch.combat_concurrency)?;
        override_parsed(&lookup, "SHOOTER_MAX_QUEUE_DEPTH", &mut self.dispatch.max_queue_depth)?;
        override_parsed(&lookup, "SHOOTER_RATE_LIMIT", &mut self.dispatch.rate_limit_per_sec)?;
        override_parsed(&lookup, "SHOOTER_RATE_BURST", &mut self.dispatch.rate_limit_burst)?;
        override_parsed(&lookup, "SHOOTER_SUBMIT_TIMEOUT_MS", &mut self.dispatch.submit_timeout_ms)?;
        override_parsed(&lookup, "SHOOTER_MOVE_WINDOW_MS", &mut self.encoder.move_window_ms)?;
        override_parsed(&lookup, "SHOOTER_MAX_SHOTS_PER_SEC", &mut self.encoder.max_shots_per_sec)?;
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program_id.trim().is_empty() {
            return Err(ConfigError::Invalid("program_id is empty".into()));
        }
        if self.clock.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be positive".into()));
        }
        if self.clock.max_ticks_per_frame == 0 {
            return Err(ConfigError::Invalid("max_ticks_per_frame must be positive".into()));
        }
        if self.dispatch.rate_limit_per_sec <= 0.0 || self.dispatch.rate_limit_burst == 0 {
            return Err(ConfigError::Invalid("rate limit must allow launches".into()));
        }
        if self.dispatch.max_queue_depth == 0 {
            return Err(ConfigError::Invalid("max_queue_depth must be positive".into()));
        }
        if self.encoder.min_name_len > self.encoder.max_name_len {
            return Err(ConfigError::Invalid("min_name_len exceeds max_name_len".into()));
        }
        if self.sim.width <= 0.0 || self.sim.height <= 0.0 {
            return Err(ConfigError::Invalid("canvas size must be positive".into()));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, var: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.max_queue_depth, 50);
        assert_eq!(config.encoder.move_window_ms, 200);
        assert_eq!(config.clock.tick_rate, 60);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(
            r#"{ "program_id": "arcade", "dispatch": { "max_retries": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.program_id, "arcade");
        assert_eq!(config.dispatch.max_retries, 4);
        assert_eq!(config.dispatch.combat_concurrency, 3);
        assert_eq!(config.sim, SimConfig::default());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(EngineConfig::from_json("{ nope"), Err(ConfigError::Json(_))));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "program_id": "  " }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SHOOTER_PROGRAM_ID", "prog-7"),
            ("SHOOTER_SEED", "42"),
            ("SHOOTER_RATE_LIMIT", "2.5"),
            ("SHOOTER_MAX_QUEUE_DEPTH", " 12 "),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.program_id, "prog-7");
        assert_eq!(config.sim.seed, 42);
        assert_eq!(config.dispatch.rate_limit_per_sec, 2.5);
        assert_eq!(config.dispatch.max_queue_depth, 12);
    }

    #[test]
    fn test_env_parse_error() {
        let err = EngineConfig::default()
            .with_env_overrides(|k| (k == "SHOOTER_MAX_RETRIES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "SHOOTER_MAX_RETRIES"));
    }
}
