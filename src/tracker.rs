use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::constants::{CROSS_WORLD_DISTANCE, PARALLEL_SWEEP_LANES, PARALLEL_SWEEP_THRESHOLD};
use crate::cooldowns::CooldownLedger;
use crate::error::PursuitError;
use crate::services::{Notice, NotifierService, PresenceService, RosterService, SpatialService};
use crate::types::{PlayerId, Role, TrackerView, WorldId};

#[derive(Clone, Debug)]
pub struct TrackerState {
    pub owner: PlayerId,
    pub current_target: Option<PlayerId>,
    pub last_update_ms: u64,
}

#[derive(Clone, Debug)]
struct SelectedTarget {
    id: PlayerId,
    distance: f64,
    same_world: bool,
    world: WorldId,
}

#[derive(Clone, Debug, Default)]
struct Selection {
    target: Option<SelectedTarget>,
}

/// Owns every hunter's tracker. The autonomous 1 Hz sweep and the manual
/// compass click share the same state map and selection logic; only the
/// manual path is cooldown-gated.
pub struct TrackerCoordinator {
    states: Mutex<HashMap<PlayerId, TrackerState>>,
    cooldown: CooldownLedger,
    cooldown_secs: u64,
    roster: Arc<dyn RosterService>,
    presence: Arc<dyn PresenceService>,
    spatial: Arc<dyn SpatialService>,
    notifier: Arc<dyn NotifierService>,
}

impl TrackerCoordinator {
    pub fn new(
        cooldown_secs: u64,
        roster: Arc<dyn RosterService>,
        presence: Arc<dyn PresenceService>,
        spatial: Arc<dyn SpatialService>,
        notifier: Arc<dyn NotifierService>,
    ) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            cooldown: CooldownLedger::new(),
            cooldown_secs,
            roster,
            presence,
            spatial,
            notifier,
        }
    }

    /// Called on hunter-role assignment.
    pub fn register(&self, owner: &PlayerId, now_ms: u64) {
        self.lock_states().insert(
            owner.clone(),
            TrackerState {
                owner: owner.clone(),
                current_target: None,
                last_update_ms: now_ms,
            },
        );
    }

    /// Called on role change, extraction, disconnect, or match end.
    pub fn remove(&self, owner: &PlayerId) {
        self.lock_states().remove(owner);
        self.cooldown.clear(owner);
    }

    /// Drops any stored reference to a departed target so no tracker
    /// carries a stale pointer.
    pub fn forget_target(&self, target: &PlayerId) {
        for state in self.lock_states().values_mut() {
            if state.current_target.as_ref() == Some(target) {
                state.current_target = None;
            }
        }
    }

    pub fn registered(&self, owner: &PlayerId) -> bool {
        self.lock_states().contains_key(owner)
    }

    pub fn target_of(&self, owner: &PlayerId) -> Option<PlayerId> {
        self.lock_states()
            .get(owner)
            .and_then(|state| state.current_target.clone())
    }

    /// Stable snapshot of every registered tracker's current target.
    pub fn targets_snapshot(&self) -> Vec<(PlayerId, Option<PlayerId>)> {
        let mut snapshot: Vec<(PlayerId, Option<PlayerId>)> = self
            .lock_states()
            .iter()
            .map(|(owner, state)| (owner.clone(), state.current_target.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    pub fn remaining_cooldown(&self, owner: &PlayerId, now_ms: u64) -> u64 {
        self.cooldown.remaining_secs(owner, now_ms)
    }

    pub fn clear_all(&self) {
        self.lock_states().clear();
        self.cooldown.clear_all();
    }

    /// Unconditional recompute-and-apply: new selection, refreshed
    /// display, `last_update_ms` stamped.
    pub fn update_target(&self, owner: &PlayerId, now_ms: u64) -> Result<TrackerView, PursuitError> {
        let selection = self.compute_selection(owner)?;
        Ok(self.apply_selection(owner, selection, now_ms))
    }

    /// Manual trigger. With the switch gesture held this cycles to the
    /// next candidate in roster order, free of any cooldown gate.
    /// Otherwise it is cooldown-gated, and the cooldown starts at the
    /// manual use, not at selection.
    pub fn manual_use(
        &self,
        owner: &PlayerId,
        switch_held: bool,
        now_ms: u64,
    ) -> Result<TrackerView, PursuitError> {
        if switch_held {
            return self.cycle_target(owner, now_ms);
        }
        let remaining = self.cooldown.remaining_secs(owner, now_ms);
        if remaining > 0 {
            return Err(PursuitError::OnCooldown {
                remaining_secs: remaining,
            });
        }
        let view = self.update_target(owner, now_ms)?;
        let _ = self.cooldown.try_start(owner, self.cooldown_secs, 0, now_ms);
        Ok(view)
    }

    /// Deterministic cyclic rotation over the ordered candidate list,
    /// independent of distance. A stored target no longer on the roster
    /// restarts the rotation from the front.
    pub fn cycle_target(&self, owner: &PlayerId, now_ms: u64) -> Result<TrackerView, PursuitError> {
        let candidates = self.candidates(owner)?;
        if candidates.is_empty() {
            return Ok(self.apply_selection(owner, Selection::default(), now_ms));
        }

        let current = self
            .lock_states()
            .get(owner)
            .and_then(|state| state.current_target.clone());
        let next_index = current
            .and_then(|target| candidates.iter().position(|c| *c == target))
            .map(|index| (index + 1) % candidates.len())
            .unwrap_or(0);
        let chosen = candidates[next_index].clone();

        let owner_pos = self.spatial.position_of(owner);
        let target = self.spatial.position_of(&chosen).map(|target_pos| {
            let distance = owner_pos.and_then(|op| self.spatial.distance(&op, &target_pos));
            SelectedTarget {
                id: chosen.clone(),
                distance: distance.unwrap_or(CROSS_WORLD_DISTANCE),
                same_world: distance.is_some(),
                world: target_pos.world,
            }
        });
        Ok(self.apply_selection(owner, Selection { target }, now_ms))
    }

    /// Autonomous sweep: bypasses the cooldown, skips hunters not
    /// holding the tracking item, reconciles stale owners, and isolates
    /// per-hunter failures. Returns the number of refreshed trackers.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let owners: Vec<PlayerId> = self.lock_states().keys().cloned().collect();
        let mut eligible = Vec::with_capacity(owners.len());
        for owner in owners {
            if self.roster.role_of(&owner) != Some(Role::Hunter) {
                // stale registration; the owner left or changed role
                self.remove(&owner);
                continue;
            }
            if !self.roster.holds_tracker(&owner) {
                continue;
            }
            eligible.push(owner);
        }

        let selections: Vec<(PlayerId, Result<Selection, PursuitError>)> =
            if eligible.len() > PARALLEL_SWEEP_THRESHOLD {
                self.compute_parallel(&eligible)
            } else {
                eligible
                    .iter()
                    .map(|owner| (owner.clone(), self.compute_selection(owner)))
                    .collect()
            };

        let mut updated = 0;
        for (owner, selection) in selections {
            match selection {
                Ok(selection) => {
                    self.apply_selection(&owner, selection, now_ms);
                    updated += 1;
                }
                Err(err) => {
                    log::warn!("tracker sweep skipped {owner}: {err}");
                }
            }
        }
        updated
    }

    /// Selection is a pure read over roster/spatial snapshots, so chunks
    /// can run on scoped threads; application stays sequential.
    fn compute_parallel(
        &self,
        owners: &[PlayerId],
    ) -> Vec<(PlayerId, Result<Selection, PursuitError>)> {
        let chunk_size = owners.len().div_ceil(PARALLEL_SWEEP_LANES);
        std::thread::scope(|scope| {
            let handles: Vec<_> = owners
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|owner| (owner.clone(), self.compute_selection(owner)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect()
        })
    }

    /// Alive, connected survivors of the owner's match, stable order.
    fn candidates(&self, owner: &PlayerId) -> Result<Vec<PlayerId>, PursuitError> {
        if self.roster.role_of(owner) != Some(Role::Hunter) {
            return Err(PursuitError::StaleReference);
        }
        let match_id = self.roster.match_of(owner).ok_or(PursuitError::StaleReference)?;
        Ok(self
            .roster
            .alive_survivors(&match_id)
            .into_iter()
            .filter(|candidate| self.presence.is_connected(candidate))
            .collect())
    }

    /// Nearest candidate by cross-boundary distance: straight line in
    /// the same world, the sentinel otherwise, so the comparison is
    /// total. Ties keep the earlier candidate.
    fn compute_selection(&self, owner: &PlayerId) -> Result<Selection, PursuitError> {
        let candidates = self.candidates(owner)?;
        let owner_pos = self
            .spatial
            .position_of(owner)
            .ok_or(PursuitError::NoValidTarget)?;

        let mut best: Option<SelectedTarget> = None;
        for candidate in candidates {
            let Some(target_pos) = self.spatial.position_of(&candidate) else {
                continue;
            };
            let (distance, same_world) = match self.spatial.distance(&owner_pos, &target_pos) {
                Some(distance) => (distance, true),
                None => (CROSS_WORLD_DISTANCE, false),
            };
            let beats = best
                .as_ref()
                .map(|current| distance < current.distance)
                .unwrap_or(true);
            if beats {
                best = Some(SelectedTarget {
                    id: candidate,
                    distance,
                    same_world,
                    world: target_pos.world,
                });
            }
        }
        Ok(Selection { target: best })
    }

    fn apply_selection(&self, owner: &PlayerId, selection: Selection, now_ms: u64) -> TrackerView {
        {
            let mut states = self.lock_states();
            let state = states.entry(owner.clone()).or_insert_with(|| TrackerState {
                owner: owner.clone(),
                current_target: None,
                last_update_ms: now_ms,
            });
            state.current_target = selection.target.as_ref().map(|t| t.id.clone());
            state.last_update_ms = now_ms;
        }

        match selection.target {
            Some(target) => {
                let name = self.roster.display_name(&target.id);
                let world_label = self.spatial.world_label(target.world);
                let distance = if target.same_world {
                    target.distance as i64
                } else {
                    -1
                };
                self.notifier.send(
                    owner,
                    &Notice::TrackerTarget {
                        name: name.clone(),
                        world: world_label.clone(),
                        distance,
                    },
                );
                TrackerView {
                    owner: owner.clone(),
                    target: Some(target.id),
                    target_name: Some(name),
                    world_label: Some(world_label),
                    distance,
                    updated_at_ms: now_ms,
                }
            }
            None => {
                self.notifier.send(owner, &Notice::TrackerNoTarget);
                TrackerView {
                    owner: owner.clone(),
                    target: None,
                    target_name: None,
                    world_label: None,
                    distance: -1,
                    updated_at_ms: now_ms,
                }
            }
        }
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, TrackerState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use crate::types::{MatchId, MatchPhase, Position};

    const OVERWORLD: WorldId = WorldId(0);
    const NETHER: WorldId = WorldId(1);

    fn setup() -> (Arc<MemoryWorld>, TrackerCoordinator, MatchId) {
        let world = Arc::new(MemoryWorld::new());
        let m = MatchId::new("m1");
        world.add_match(&m, MatchPhase::Playing);
        let coordinator = TrackerCoordinator::new(
            10,
            world.clone(),
            world.clone(),
            world.clone(),
            world.clone(),
        );
        (world, coordinator, m)
    }

    fn hunter(world: &MemoryWorld, m: &MatchId, id: &str, x: f64) -> PlayerId {
        let p = PlayerId::new(id);
        world.add_player(m, &p, id, Role::Hunter, Position::new(OVERWORLD, x, 64.0, 0.0));
        p
    }

    fn survivor(world: &MemoryWorld, m: &MatchId, id: &str, pos: Position) -> PlayerId {
        let p = PlayerId::new(id);
        world.add_player(m, &p, id, Role::Survivor, pos);
        p
    }

    #[test]
    fn nearest_selection_is_deterministic() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        survivor(&world, &m, "s-far", Position::new(OVERWORLD, 30.0, 64.0, 0.0));
        let near = survivor(&world, &m, "s-near", Position::new(OVERWORLD, 10.0, 64.0, 0.0));
        coordinator.register(&h, 0);

        for now in [1_000, 2_000, 3_000] {
            let view = coordinator.update_target(&h, now).expect("selection");
            assert_eq!(view.target.as_ref(), Some(&near));
            assert_eq!(view.distance, 10);
            assert_eq!(view.updated_at_ms, now);
        }
    }

    #[test]
    fn tie_keeps_first_candidate_in_order() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let a = survivor(&world, &m, "sa", Position::new(OVERWORLD, 10.0, 64.0, 0.0));
        survivor(&world, &m, "sb", Position::new(OVERWORLD, -10.0, 64.0, 0.0));
        coordinator.register(&h, 0);

        let view = coordinator.update_target(&h, 0).expect("selection");
        assert_eq!(view.target, Some(a));
    }

    #[test]
    fn same_world_beats_cross_world_at_any_distance() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        survivor(&world, &m, "s-other", Position::new(NETHER, 1.0, 64.0, 0.0));
        let far = survivor(
            &world,
            &m,
            "s-same",
            Position::new(OVERWORLD, 100_000.0, 64.0, 0.0),
        );
        coordinator.register(&h, 0);

        let view = coordinator.update_target(&h, 0).expect("selection");
        assert_eq!(view.target, Some(far));
        assert_eq!(view.distance, 100_000);
    }

    #[test]
    fn sole_cross_world_survivor_is_selected_with_unknown_distance() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let s = survivor(&world, &m, "s1", Position::new(NETHER, 5.0, 64.0, 5.0));
        coordinator.register(&h, 0);

        let view = coordinator.update_target(&h, 0).expect("selection");
        assert_eq!(view.target, Some(s));
        assert_eq!(view.distance, -1);
        assert_eq!(view.world_label.as_deref(), Some("world-1"));
    }

    #[test]
    fn disconnected_survivors_are_skipped() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let near = survivor(&world, &m, "s-near", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        let far = survivor(&world, &m, "s-far", Position::new(OVERWORLD, 50.0, 64.0, 0.0));
        world.set_connected(&near, false);
        coordinator.register(&h, 0);

        let view = coordinator.update_target(&h, 0).expect("selection");
        assert_eq!(view.target, Some(far));
    }

    #[test]
    fn no_candidates_clears_target() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let s = survivor(&world, &m, "s1", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        coordinator.register(&h, 0);
        coordinator.update_target(&h, 0).expect("selection");
        assert_eq!(coordinator.target_of(&h), Some(s.clone()));

        world.mark_extracted(&m, &s);
        let view = coordinator.update_target(&h, 1_000).expect("selection");
        assert_eq!(view.target, None);
        assert_eq!(coordinator.target_of(&h), None);
        let no_target = world
            .drain_notices()
            .into_iter()
            .any(|record| record.notice == Notice::TrackerNoTarget);
        assert!(no_target);
    }

    #[test]
    fn cycle_rotates_in_roster_order_ignoring_distance() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let s1 = survivor(&world, &m, "s1", Position::new(OVERWORLD, 100.0, 64.0, 0.0));
        let s2 = survivor(&world, &m, "s2", Position::new(OVERWORLD, 1.0, 64.0, 0.0));
        let s3 = survivor(&world, &m, "s3", Position::new(OVERWORLD, 50.0, 64.0, 0.0));
        coordinator.register(&h, 0);

        let order: Vec<PlayerId> = (0..4)
            .map(|i| {
                coordinator
                    .cycle_target(&h, i * 1_000)
                    .expect("cycle")
                    .target
                    .expect("candidate")
            })
            .collect();
        assert_eq!(order, vec![s1.clone(), s2, s3, s1]);
    }

    #[test]
    fn cycle_restarts_when_stored_target_is_stale() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let s1 = survivor(&world, &m, "s1", Position::new(OVERWORLD, 10.0, 64.0, 0.0));
        let s2 = survivor(&world, &m, "s2", Position::new(OVERWORLD, 20.0, 64.0, 0.0));
        coordinator.register(&h, 0);

        let first = coordinator.cycle_target(&h, 0).expect("cycle");
        assert_eq!(first.target, Some(s1.clone()));
        world.mark_extracted(&m, &s1);

        let next = coordinator.cycle_target(&h, 1_000).expect("cycle");
        assert_eq!(next.target, Some(s2));
    }

    #[test]
    fn manual_use_is_cooldown_gated_and_switch_is_not() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        survivor(&world, &m, "s1", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        coordinator.register(&h, 0);

        assert!(coordinator.manual_use(&h, false, 0).is_ok());
        assert_eq!(
            coordinator.manual_use(&h, false, 4_000),
            Err(PursuitError::OnCooldown { remaining_secs: 6 })
        );
        // switch gesture bypasses the gate
        assert!(coordinator.manual_use(&h, true, 4_000).is_ok());
        // cooldown expires at t=10
        assert!(coordinator.manual_use(&h, false, 10_000).is_ok());
    }

    #[test]
    fn sweep_bypasses_cooldown_and_skips_bare_hands() {
        let (world, coordinator, m) = setup();
        let h1 = hunter(&world, &m, "h1", 0.0);
        let h2 = hunter(&world, &m, "h2", 0.0);
        survivor(&world, &m, "s1", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        coordinator.register(&h1, 0);
        coordinator.register(&h2, 0);

        coordinator.manual_use(&h1, false, 0).expect("manual");
        world.set_holds_tracker(&h2, false);

        // h1 still cooling down, h2 not holding the device
        assert_eq!(coordinator.sweep(1_000), 1);
        assert!(coordinator.target_of(&h1).is_some());
        assert!(coordinator.target_of(&h2).is_none());
    }

    #[test]
    fn sweep_reconciles_demoted_owners() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        survivor(&world, &m, "s1", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        coordinator.register(&h, 0);

        world.remove_player(&h);
        assert_eq!(coordinator.sweep(1_000), 0);
        assert!(!coordinator.registered(&h));
    }

    #[test]
    fn large_sweep_takes_parallel_path() {
        let (world, coordinator, m) = setup();
        let s = survivor(&world, &m, "s1", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        let hunters: Vec<PlayerId> = (0..PARALLEL_SWEEP_THRESHOLD + 8)
            .map(|i| {
                let h = hunter(&world, &m, &format!("h{i:03}"), i as f64);
                coordinator.register(&h, 0);
                h
            })
            .collect();

        assert_eq!(coordinator.sweep(1_000), hunters.len());
        for h in &hunters {
            assert_eq!(coordinator.target_of(h), Some(s.clone()));
        }
    }

    #[test]
    fn forget_target_clears_stale_pointer() {
        let (world, coordinator, m) = setup();
        let h = hunter(&world, &m, "h1", 0.0);
        let s = survivor(&world, &m, "s1", Position::new(OVERWORLD, 5.0, 64.0, 0.0));
        coordinator.register(&h, 0);
        coordinator.update_target(&h, 0).expect("selection");
        assert_eq!(coordinator.target_of(&h), Some(s.clone()));

        coordinator.forget_target(&s);
        assert_eq!(coordinator.target_of(&h), None);
    }
}
