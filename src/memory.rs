use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::services::{Notice, NotifierService, PresenceService, RosterService, SpatialService};
use crate::types::{MatchId, MatchPhase, PlayerId, Position, Role, WorldId};

/// Single-process implementation of every collaborator trait. Backs the
/// headless simulate binary and the test suites; keeps players in a
/// BTreeMap so iteration order is stable.
#[derive(Default)]
pub struct MemoryWorld {
    inner: Mutex<Inner>,
    notices: Mutex<Vec<NoticeRecord>>,
}

#[derive(Default)]
struct Inner {
    matches: BTreeMap<MatchId, MatchPhase>,
    players: BTreeMap<PlayerId, PlayerEntry>,
    ground_height: HashMap<WorldId, f64>,
}

#[derive(Clone, Debug)]
struct PlayerEntry {
    name: String,
    match_id: MatchId,
    role: Role,
    connected: bool,
    extracted: bool,
    holds_tracker: bool,
    position: Option<Position>,
}

/// A recorded notifier call: `recipient` for direct sends, `match_id`
/// for broadcasts.
#[derive(Clone, Debug)]
pub struct NoticeRecord {
    pub recipient: Option<PlayerId>,
    pub match_id: Option<MatchId>,
    pub notice: Notice,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_match(&self, match_id: &MatchId, phase: MatchPhase) {
        self.lock_inner().matches.insert(match_id.clone(), phase);
    }

    pub fn set_phase(&self, match_id: &MatchId, phase: MatchPhase) {
        self.lock_inner().matches.insert(match_id.clone(), phase);
    }

    pub fn add_player(
        &self,
        match_id: &MatchId,
        player: &PlayerId,
        name: &str,
        role: Role,
        position: Position,
    ) {
        self.lock_inner().players.insert(
            player.clone(),
            PlayerEntry {
                name: name.to_string(),
                match_id: match_id.clone(),
                role,
                connected: true,
                extracted: false,
                holds_tracker: role == Role::Hunter,
                position: Some(position),
            },
        );
    }

    pub fn remove_player(&self, player: &PlayerId) {
        self.lock_inner().players.remove(player);
    }

    pub fn set_position(&self, player: &PlayerId, position: Position) {
        if let Some(entry) = self.lock_inner().players.get_mut(player) {
            entry.position = Some(position);
        }
    }

    /// Simulates a failed spatial lookup for this player.
    pub fn clear_position(&self, player: &PlayerId) {
        if let Some(entry) = self.lock_inner().players.get_mut(player) {
            entry.position = None;
        }
    }

    pub fn set_connected(&self, player: &PlayerId, connected: bool) {
        if let Some(entry) = self.lock_inner().players.get_mut(player) {
            entry.connected = connected;
        }
    }

    pub fn set_holds_tracker(&self, player: &PlayerId, holds: bool) {
        if let Some(entry) = self.lock_inner().players.get_mut(player) {
            entry.holds_tracker = holds;
        }
    }

    pub fn set_ground_height(&self, world: WorldId, height: f64) {
        self.lock_inner().ground_height.insert(world, height);
    }

    pub fn is_extracted(&self, player: &PlayerId) -> bool {
        self.lock_inner()
            .players
            .get(player)
            .map(|entry| entry.extracted)
            .unwrap_or(false)
    }

    pub fn drain_notices(&self) -> Vec<NoticeRecord> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn players_of(&self, match_id: &MatchId, role: Role) -> Vec<PlayerId> {
        self.lock_inner()
            .players
            .iter()
            .filter(|(_, entry)| {
                entry.match_id == *match_id && entry.role == role && !entry.extracted
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl RosterService for MemoryWorld {
    fn matches_in_progress(&self) -> Vec<MatchId> {
        self.lock_inner()
            .matches
            .iter()
            .filter(|(_, phase)| **phase == MatchPhase::Playing)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn match_phase(&self, match_id: &MatchId) -> MatchPhase {
        self.lock_inner()
            .matches
            .get(match_id)
            .copied()
            .unwrap_or(MatchPhase::Finished)
    }

    fn alive_survivors(&self, match_id: &MatchId) -> Vec<PlayerId> {
        self.players_of(match_id, Role::Survivor)
    }

    fn hunters(&self, match_id: &MatchId) -> Vec<PlayerId> {
        self.players_of(match_id, Role::Hunter)
    }

    fn match_of(&self, player: &PlayerId) -> Option<MatchId> {
        self.lock_inner()
            .players
            .get(player)
            .map(|entry| entry.match_id.clone())
    }

    fn role_of(&self, player: &PlayerId) -> Option<Role> {
        self.lock_inner().players.get(player).map(|entry| entry.role)
    }

    fn display_name(&self, player: &PlayerId) -> String {
        self.lock_inner()
            .players
            .get(player)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| player.to_string())
    }

    fn mark_extracted(&self, _match_id: &MatchId, player: &PlayerId) {
        if let Some(entry) = self.lock_inner().players.get_mut(player) {
            entry.extracted = true;
            entry.role = Role::Spectator;
        }
    }

    fn holds_tracker(&self, player: &PlayerId) -> bool {
        self.lock_inner()
            .players
            .get(player)
            .map(|entry| entry.holds_tracker)
            .unwrap_or(false)
    }
}

impl PresenceService for MemoryWorld {
    fn is_connected(&self, player: &PlayerId) -> bool {
        self.lock_inner()
            .players
            .get(player)
            .map(|entry| entry.connected)
            .unwrap_or(false)
    }
}

impl SpatialService for MemoryWorld {
    fn position_of(&self, player: &PlayerId) -> Option<Position> {
        self.lock_inner()
            .players
            .get(player)
            .and_then(|entry| entry.position)
    }

    fn distance(&self, a: &Position, b: &Position) -> Option<f64> {
        if a.world != b.world {
            return None;
        }
        let (dx, dy, dz) = (a.x - b.x, a.y - b.y, a.z - b.z);
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }

    fn teleport(&self, player: &PlayerId, to: &Position) {
        self.set_position(player, *to);
    }

    fn highest_ground(&self, world: WorldId, x: f64, z: f64) -> Position {
        let y = self
            .lock_inner()
            .ground_height
            .get(&world)
            .copied()
            .unwrap_or(64.0);
        Position::new(world, x, y, z)
    }

    fn world_label(&self, world: WorldId) -> String {
        format!("world-{}", world.0)
    }
}

impl NotifierService for MemoryWorld {
    fn send(&self, player: &PlayerId, notice: &Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NoticeRecord {
                recipient: Some(player.clone()),
                match_id: None,
                notice: notice.clone(),
            });
    }

    fn broadcast(&self, match_id: &MatchId, notice: &Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NoticeRecord {
                recipient: None,
                match_id: Some(match_id.clone()),
                notice: notice.clone(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survivor_listing_is_stable_and_skips_extracted() {
        let world = MemoryWorld::new();
        let m = MatchId::new("m1");
        world.add_match(&m, MatchPhase::Playing);
        let pos = Position::new(WorldId(0), 0.0, 64.0, 0.0);
        for id in ["s3", "s1", "s2"] {
            world.add_player(&m, &PlayerId::new(id), id, Role::Survivor, pos);
        }
        assert_eq!(
            world.alive_survivors(&m),
            vec![PlayerId::new("s1"), PlayerId::new("s2"), PlayerId::new("s3")]
        );

        world.mark_extracted(&m, &PlayerId::new("s2"));
        assert_eq!(
            world.alive_survivors(&m),
            vec![PlayerId::new("s1"), PlayerId::new("s3")]
        );
    }

    #[test]
    fn distance_is_none_across_worlds() {
        let world = MemoryWorld::new();
        let a = Position::new(WorldId(0), 0.0, 0.0, 0.0);
        let b = Position::new(WorldId(1), 0.0, 0.0, 0.0);
        let c = Position::new(WorldId(0), 3.0, 0.0, 4.0);
        assert_eq!(world.distance(&a, &b), None);
        assert_eq!(world.distance(&a, &c), Some(5.0));
    }
}
