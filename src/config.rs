//! Planner configuration.
//!
//! Every section has a `Default`, and a JSON document only needs to name
//! the values it overrides.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::model::RadiusBounds;
use crate::resolver::ResolverConfig;
use crate::solver::SolveOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub resolver: ResolverConfig,
    pub solve: SolveOptions,
    pub radius: RadiusBounds,
}

impl PlannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PlannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Reject values that would make estimates meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resolver;
        if !(r.walk_speed_kmh > 0.0) || !(r.drive_speed_kmh > 0.0) {
            return Err(ConfigError::Invalid("speeds must be positive".to_string()));
        }
        if !(r.transit_margin > 0.0) {
            return Err(ConfigError::Invalid("transit_margin must be positive".to_string()));
        }
        if !(r.max_walk_access_m >= 0.0) {
            return Err(ConfigError::Invalid(
                "max_walk_access_m must not be negative".to_string(),
            ));
        }
        if !(self.radius.min_m > 0.0 && self.radius.min_m <= self.radius.max_m) {
            return Err(ConfigError::Invalid(
                "radius bounds must satisfy 0 < min <= max".to_string(),
            ));
        }
        Ok(())
    }
}
