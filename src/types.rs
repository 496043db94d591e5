use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque stable player identifier. Universal map key; state never holds
/// back-references to live entities.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self { world, x, y, z }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Hunter,
    Survivor,
    Spectator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Lobby,
    Playing,
    Finished,
}

/// Display payload for a hunter's tracking device.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackerView {
    pub owner: PlayerId,
    pub target: Option<PlayerId>,
    #[serde(rename = "targetName")]
    pub target_name: Option<String>,
    #[serde(rename = "worldLabel")]
    pub world_label: Option<String>,
    /// Truncated block distance, or -1 when the target is in another world.
    pub distance: i64,
    #[serde(rename = "updatedAtMs")]
    pub updated_at_ms: u64,
}

/// Diagnostic event stream emitted by the sweeps, drained by the caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PursuitEvent {
    EscapeStarted {
        player: PlayerId,
        point: String,
    },
    EscapeProgress {
        player: PlayerId,
        point: String,
        #[serde(rename = "progressSecs")]
        progress_secs: u32,
        percent: u32,
    },
    EscapeCancelled {
        player: PlayerId,
        point: String,
    },
    EscapeCompleted {
        player: PlayerId,
        point: String,
    },
    TargetAcquired {
        hunter: PlayerId,
        target: PlayerId,
    },
    TargetLost {
        hunter: PlayerId,
    },
    AbilityActivated {
        player: PlayerId,
        ability: String,
    },
    AbilityExpired {
        player: PlayerId,
        ability: String,
    },
    ItemUsed {
        player: PlayerId,
        item: String,
        remaining: u32,
    },
    EventTriggered {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        name: String,
    },
}
