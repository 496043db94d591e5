use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::abilities::{AbilityEngine, Activation};
use crate::config::PursuitConfig;
use crate::error::PursuitError;
use crate::escape::EscapeCoordinator;
use crate::events::{FogBank, RandomEventScheduler, SupplyDrop, Thunderstorm};
use crate::items::ItemEngine;
use crate::services::{Notice, NotifierService, PresenceService, RosterService, SpatialService};
use crate::tracker::TrackerCoordinator;
use crate::types::{MatchId, PlayerId, PursuitEvent, TrackerView};

/// The host services the engine runs against. Cloned into every
/// component at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub roster: Arc<dyn RosterService>,
    pub presence: Arc<dyn PresenceService>,
    pub spatial: Arc<dyn SpatialService>,
    pub notifier: Arc<dyn NotifierService>,
}

/// Root of the pursuit subsystem. Owns one component per concern and a
/// per-match escape coordinator map; the runtime drives the three sweeps
/// and players drive the user actions, both through this type.
pub struct PursuitEngine {
    collaborators: Collaborators,
    abilities: AbilityEngine,
    items: Arc<ItemEngine>,
    trackers: TrackerCoordinator,
    events: RandomEventScheduler,
    escapes: Mutex<HashMap<MatchId, Arc<EscapeCoordinator>>>,
    journal: Mutex<Vec<PursuitEvent>>,
    config: PursuitConfig,
}

impl PursuitEngine {
    /// Ability and item engines arrive prebuilt because their effect
    /// hooks are host code; everything else is assembled here from the
    /// config.
    pub fn new(
        config: PursuitConfig,
        collaborators: Collaborators,
        abilities: AbilityEngine,
        items: ItemEngine,
        seed: u64,
    ) -> Self {
        let items = Arc::new(items);
        let trackers = TrackerCoordinator::new(
            config.tracker.manual_cooldown_secs,
            collaborators.roster.clone(),
            collaborators.presence.clone(),
            collaborators.spatial.clone(),
            collaborators.notifier.clone(),
        );
        let events = RandomEventScheduler::new(
            config.events.trigger_chance,
            seed,
            collaborators.roster.clone(),
            collaborators.spatial.clone(),
            collaborators.notifier.clone(),
            items.clone(),
        )
        .with_event(Box::new(Thunderstorm))
        .with_event(Box::new(FogBank))
        .with_event(Box::new(SupplyDrop));
        Self {
            collaborators,
            abilities,
            items,
            trackers,
            events,
            escapes: Mutex::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Drains the diagnostic event journal accumulated by sweeps and
    /// user actions since the last drain.
    pub fn drain_events(&self) -> Vec<PursuitEvent> {
        std::mem::take(&mut *self.journal.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn record(&self, event: PursuitEvent) {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    pub fn config(&self) -> &PursuitConfig {
        &self.config
    }

    pub fn abilities(&self) -> &AbilityEngine {
        &self.abilities
    }

    pub fn items(&self) -> &ItemEngine {
        &self.items
    }

    pub fn trackers(&self) -> &TrackerCoordinator {
        &self.trackers
    }

    /// Called when a match enters the playing phase: builds the escape
    /// coordinator and registers a tracker for every hunter.
    pub fn prepare_match(&self, match_id: &MatchId, now_ms: u64) {
        self.escape_of(match_id);
        for hunter in self.collaborators.roster.hunters(match_id) {
            self.trackers.register(&hunter, now_ms);
        }
        log::info!("match {match_id} prepared");
    }

    /// Called when a match ends, whatever the outcome. Drops the escape
    /// coordinator with all progress and strips per-player state.
    pub fn end_match(&self, match_id: &MatchId) {
        self.lock_escapes().remove(match_id);
        for hunter in self.collaborators.roster.hunters(match_id) {
            self.purge_player(&hunter);
        }
        for survivor in self.collaborators.roster.alive_survivors(match_id) {
            self.purge_player(&survivor);
        }
        log::info!("match {match_id} torn down");
    }

    /// Strips every trace of a departed player: ability windows and
    /// cooldowns, item counters, tracker state, escape progress, and any
    /// tracker still pointing at them.
    pub fn purge_player(&self, player: &PlayerId) {
        self.abilities.clear_player(player);
        self.items.clear_player(player);
        self.trackers.remove(player);
        self.trackers.forget_target(player);
        for escape in self.lock_escapes().values() {
            escape.clear_player(player);
        }
    }

    /// Fixed-rate escape pass over every running match. Players who
    /// complete their escape are purged here, in the same pass.
    pub fn run_escape_sweep(&self, _now_ms: u64) -> Vec<PursuitEvent> {
        let mut fired = Vec::new();
        for match_id in self.collaborators.roster.matches_in_progress() {
            let escape = self.escape_of(&match_id);
            let report = escape.tick();
            fired.extend(report.events);
            for player in report.extracted {
                self.purge_player(&player);
            }
        }
        for event in &fired {
            self.record(event.clone());
        }
        fired
    }

    pub fn run_tracker_sweep(&self, now_ms: u64) -> usize {
        let before = self.trackers.targets_snapshot();
        let updated = self.trackers.sweep(now_ms);
        let after = self.trackers.targets_snapshot();

        let previous: HashMap<PlayerId, Option<PlayerId>> = before.into_iter().collect();
        for (hunter, target) in after {
            let was = previous.get(&hunter).cloned().flatten();
            if target == was {
                continue;
            }
            match target {
                Some(target) => self.record(PursuitEvent::TargetAcquired { hunter, target }),
                None => self.record(PursuitEvent::TargetLost { hunter }),
            }
        }
        updated
    }

    pub fn run_event_sweep(&self) -> Vec<PursuitEvent> {
        let fired = self.events.sweep();
        for event in &fired {
            self.record(event.clone());
        }
        fired
    }

    /// User action. Failures are informational: the player is told what
    /// blocked the activation and the error still propagates to the
    /// caller.
    pub fn activate_ability(
        &self,
        player: &PlayerId,
        ability: &str,
        now_ms: u64,
    ) -> Result<Activation, PursuitError> {
        match self.abilities.activate(player, ability, now_ms) {
            Ok(activation) => {
                self.collaborators.notifier.send(
                    player,
                    &Notice::AbilityActivated {
                        ability: activation.ability.clone(),
                    },
                );
                self.record(PursuitEvent::AbilityActivated {
                    player: player.clone(),
                    ability: activation.ability.clone(),
                });
                Ok(activation)
            }
            Err(err) => {
                match &err {
                    PursuitError::Disabled => self.collaborators.notifier.send(
                        player,
                        &Notice::AbilityDisabled {
                            ability: ability.to_string(),
                        },
                    ),
                    PursuitError::OnCooldown { remaining_secs } => {
                        self.collaborators.notifier.send(
                            player,
                            &Notice::AbilityOnCooldown {
                                ability: ability.to_string(),
                                remaining_secs: *remaining_secs,
                            },
                        )
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }

    /// Deferred end callback target for a timed activation. The epoch
    /// check makes a late callback after deactivation or purge a no-op.
    pub fn expire_ability(&self, player: &PlayerId, ability: &str, epoch: u64) -> bool {
        if !self.abilities.expire_window(player, ability, epoch) {
            return false;
        }
        self.record(PursuitEvent::AbilityExpired {
            player: player.clone(),
            ability: ability.to_string(),
        });
        true
    }

    /// User action. A use refused on an empty counter tells the player
    /// the item is spent.
    pub fn use_item(&self, player: &PlayerId, item: &str) -> bool {
        if self.items.use_item(player, item) {
            self.record(PursuitEvent::ItemUsed {
                player: player.clone(),
                item: item.to_string(),
                remaining: self.items.remaining(player, item),
            });
            return true;
        }
        if self.items.knows(item) && self.items.remaining(player, item) == 0 {
            self.collaborators.notifier.send(
                player,
                &Notice::ItemDepleted {
                    item: item.to_string(),
                },
            );
        }
        false
    }

    /// User action on the tracking device. `switch_held` selects the
    /// cycle gesture, which skips the manual cooldown.
    pub fn tracker_use(
        &self,
        player: &PlayerId,
        switch_held: bool,
        now_ms: u64,
    ) -> Result<TrackerView, PursuitError> {
        match self.trackers.manual_use(player, switch_held, now_ms) {
            Ok(view) => Ok(view),
            Err(err) => {
                if let PursuitError::OnCooldown { remaining_secs } = &err {
                    self.collaborators.notifier.send(
                        player,
                        &Notice::TrackerOnCooldown {
                            remaining_secs: *remaining_secs,
                        },
                    );
                }
                Err(err)
            }
        }
    }

    fn escape_of(&self, match_id: &MatchId) -> Arc<EscapeCoordinator> {
        self.lock_escapes()
            .entry(match_id.clone())
            .or_insert_with(|| {
                Arc::new(EscapeCoordinator::new(
                    match_id.clone(),
                    self.config.escape.clone(),
                    self.collaborators.roster.clone(),
                    self.collaborators.spatial.clone(),
                    self.collaborators.notifier.clone(),
                ))
            })
            .clone()
    }

    fn lock_escapes(&self) -> std::sync::MutexGuard<'_, HashMap<MatchId, Arc<EscapeCoordinator>>> {
        self.escapes.lock().unwrap_or_else(|e| e.into_inner())
    }
}
