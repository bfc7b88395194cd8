//! Engine configuration, loaded from JSON or RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::geometry::Vec2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f32 },
}

/// Tunables shared by every scene. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Camera viewport in pixels.
    pub window_dimensions: Vec2,
    pub window_fullscreen: bool,
    /// Pixels per grid cell.
    pub tile_size: f32,
    /// Background music fade-in/fade-out on scene load/unload.
    pub music_fade_ms: u32,
    /// Seconds before an NPC can be talked to again.
    pub interaction_cooldown: f32,
    /// Dialogue visibility fade, in alpha points per second.
    pub dialogue_fade_rate: f32,
    /// Option-highlight fade, in alpha points per second.
    pub choice_fade_rate: f32,
    /// Background music volume is divided by this while a dialogue plays.
    pub dialogue_music_duck: f32,
    pub shake_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_dimensions: Vec2::new(640.0, 360.0),
            window_fullscreen: false,
            tile_size: 32.0,
            music_fade_ms: 1000,
            interaction_cooldown: 1.0,
            dialogue_fade_rate: 1020.0,
            choice_fade_rate: 1020.0,
            dialogue_music_duck: 3.0,
            shake_seed: 0,
        }
    }
}

impl EngineConfig {
    /// Load from a `.ron` file, or from JSON for any other extension.
    pub fn load(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("ron") => Self::parse_ron(&contents),
            _ => Self::parse_json(&contents),
        }
    }

    pub fn parse_json(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = serde_json::from_str(input)?;
        config.validate()
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()
    }

    /// Reject values the runtime divides by.
    pub fn validate(self) -> Result<EngineConfig, ConfigError> {
        let divisors = [
            ("tile_size", self.tile_size),
            ("dialogue_music_duck", self.dialogue_music_duck),
        ];
        for (field, value) in divisors {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        Ok(self)
    }
}
