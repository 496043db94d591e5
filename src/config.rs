use serde::Deserialize;

use crate::constants::{
    DEFAULT_EVENT_CHANCE, DEFAULT_EXTRACTION_RADIUS, DEFAULT_REQUIRED_SECS,
    DEFAULT_TRACKER_COOLDOWN_SECS, ESCAPE_SWEEP_MS, EVENT_SWEEP_MS, TRACKER_SWEEP_MS,
};
use crate::types::{Position, WorldId};

/// All tunables, supplied fully built at engine construction.
/// Hot reload is out of scope: reconfiguring means rebuilding the engine.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    pub escape: EscapeConfig,
    pub tracker: TrackerConfig,
    pub events: EventConfig,
    pub abilities: Vec<AbilityDefinition>,
    pub items: Vec<ItemDefinition>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EscapeConfig {
    #[serde(rename = "sweepIntervalMs")]
    pub sweep_interval_ms: u64,
    pub points: Vec<ExtractionPointConfig>,
    /// Drop-off column for extracted players; the actual landing spot is
    /// the highest safe ground at this (x, z).
    #[serde(rename = "spectatorSpawn")]
    pub spectator_spawn: Position,
}

impl Default for EscapeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: ESCAPE_SWEEP_MS,
            points: Vec::new(),
            spectator_spawn: Position::new(WorldId(0), 0.0, 64.0, 0.0),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExtractionPointConfig {
    pub name: String,
    pub position: Position,
    pub radius: f64,
    #[serde(rename = "requiredSecs")]
    pub required_secs: u32,
    pub enabled: bool,
}

impl Default for ExtractionPointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Position::new(WorldId(0), 0.0, 64.0, 0.0),
            radius: DEFAULT_EXTRACTION_RADIUS,
            required_secs: DEFAULT_REQUIRED_SECS,
            enabled: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    #[serde(rename = "sweepIntervalMs")]
    pub sweep_interval_ms: u64,
    #[serde(rename = "manualCooldownSecs")]
    pub manual_cooldown_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: TRACKER_SWEEP_MS,
            manual_cooldown_secs: DEFAULT_TRACKER_COOLDOWN_SECS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    #[serde(rename = "sweepIntervalMs")]
    pub sweep_interval_ms: u64,
    /// Per-match probability of triggering one event per sweep.
    #[serde(rename = "triggerChance")]
    pub trigger_chance: f64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: EVENT_SWEEP_MS,
            trigger_chance: DEFAULT_EVENT_CHANCE,
        }
    }
}

/// Immutable after construction.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AbilityDefinition {
    pub name: String,
    #[serde(rename = "cooldownSecs")]
    pub cooldown_secs: u64,
    #[serde(rename = "durationSecs")]
    pub duration_secs: u64,
    pub enabled: bool,
}

impl Default for AbilityDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            cooldown_secs: 30,
            duration_secs: 0,
            enabled: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ItemDefinition {
    pub name: String,
    #[serde(rename = "maxUses")]
    pub max_uses: u32,
    pub consumable: bool,
}

impl Default for ItemDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_uses: 1,
            consumable: true,
        }
    }
}
