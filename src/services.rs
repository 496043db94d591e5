use serde::Serialize;

use crate::types::{MatchId, MatchPhase, PlayerId, Position, Role, WorldId};

/// Parameterized message to a player or a match. Localization and
/// rendering happen on the other side of the notifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    EscapeStarted { point: String },
    EscapeProgress { percent: u32 },
    EscapeCancelled,
    EscapeCompleted { player_name: String },
    TrackerTarget {
        name: String,
        world: String,
        distance: i64,
    },
    TrackerNoTarget,
    TrackerOnCooldown { remaining_secs: u64 },
    AbilityActivated { ability: String },
    AbilityOnCooldown { ability: String, remaining_secs: u64 },
    AbilityDisabled { ability: String },
    ItemDepleted { item: String },
    Thunderstorm { x: f64, z: f64 },
    FogBank,
    SupplyDrop { item: String },
}

/// Match membership and role bookkeeping, owned elsewhere.
/// Player lists come back in a stable iteration order.
pub trait RosterService: Send + Sync {
    fn matches_in_progress(&self) -> Vec<MatchId>;
    fn match_phase(&self, match_id: &MatchId) -> MatchPhase;
    fn alive_survivors(&self, match_id: &MatchId) -> Vec<PlayerId>;
    fn hunters(&self, match_id: &MatchId) -> Vec<PlayerId>;
    fn match_of(&self, player: &PlayerId) -> Option<MatchId>;
    fn role_of(&self, player: &PlayerId) -> Option<Role>;
    fn display_name(&self, player: &PlayerId) -> String;
    /// Flip the player to non-participating mode after a successful escape.
    fn mark_extracted(&self, match_id: &MatchId, player: &PlayerId);
    /// Whether the hunter currently holds the tracking device.
    fn holds_tracker(&self, player: &PlayerId) -> bool;
}

pub trait PresenceService: Send + Sync {
    fn is_connected(&self, player: &PlayerId) -> bool;
}

pub trait SpatialService: Send + Sync {
    fn position_of(&self, player: &PlayerId) -> Option<Position>;
    /// Straight-line distance; `None` when the positions are in
    /// different worlds.
    fn distance(&self, a: &Position, b: &Position) -> Option<f64>;
    fn teleport(&self, player: &PlayerId, to: &Position);
    fn highest_ground(&self, world: WorldId, x: f64, z: f64) -> Position;
    fn world_label(&self, world: WorldId) -> String;
}

pub trait NotifierService: Send + Sync {
    fn send(&self, player: &PlayerId, notice: &Notice);
    fn broadcast(&self, match_id: &MatchId, notice: &Notice);
}
