use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::items::ItemEngine;
use crate::services::{Notice, NotifierService, RosterService, SpatialService};
use crate::types::{MatchId, MatchPhase, PursuitEvent};

/// Everything a fired event may touch. Events run on the sweep task and
/// must not block; anything longer-lived goes through the item engine or
/// the notifier.
pub struct EventContext<'a> {
    pub match_id: &'a MatchId,
    pub roster: &'a dyn RosterService,
    pub spatial: &'a dyn SpatialService,
    pub notifier: &'a dyn NotifierService,
    pub items: &'a ItemEngine,
}

/// A world event that can strike a running match. `can_trigger` keeps
/// inapplicable events out of the draw; `fire` reports whether the event
/// actually took effect, and a false return suppresses the triggered
/// announcement (state may have shifted since the eligibility check).
pub trait MatchEvent: Send + Sync {
    fn name(&self) -> &str;

    fn can_trigger(&self, _ctx: &EventContext<'_>) -> bool {
        true
    }

    fn fire(&self, ctx: &EventContext<'_>, rng: &mut StdRng) -> bool;
}

/// Rolls the dice once per running match per sweep. The RNG is seeded at
/// construction so a whole run replays from one seed; per match the draw
/// order is fixed: chance first, then the index into the eligible
/// catalog.
pub struct RandomEventScheduler {
    events: Vec<Box<dyn MatchEvent>>,
    trigger_chance: f64,
    rng: Mutex<StdRng>,
    roster: Arc<dyn RosterService>,
    spatial: Arc<dyn SpatialService>,
    notifier: Arc<dyn NotifierService>,
    items: Arc<ItemEngine>,
}

impl RandomEventScheduler {
    pub fn new(
        trigger_chance: f64,
        seed: u64,
        roster: Arc<dyn RosterService>,
        spatial: Arc<dyn SpatialService>,
        notifier: Arc<dyn NotifierService>,
        items: Arc<ItemEngine>,
    ) -> Self {
        Self {
            events: Vec::new(),
            trigger_chance,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            roster,
            spatial,
            notifier,
            items,
        }
    }

    pub fn with_event(mut self, event: Box<dyn MatchEvent>) -> Self {
        self.events.push(event);
        self
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events.iter().map(|e| e.name().to_string()).collect()
    }

    /// One scheduler pass over every running match.
    pub fn sweep(&self) -> Vec<PursuitEvent> {
        let mut fired = Vec::new();
        if self.events.is_empty() {
            return fired;
        }
        for match_id in self.roster.matches_in_progress() {
            if self.roster.match_phase(&match_id) != MatchPhase::Playing {
                continue;
            }
            if let Some(name) = self.roll(&match_id) {
                fired.push(PursuitEvent::EventTriggered {
                    match_id: match_id.clone(),
                    name,
                });
            }
        }
        fired
    }

    fn roll(&self, match_id: &MatchId) -> Option<String> {
        // only the draws themselves hold the guard; eligibility checks
        // and the fire hook call collaborators, so they run on a child
        // RNG derived under the lock to keep the replay seed-stable
        let mut rng = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            if rng.random::<f64>() >= self.trigger_chance {
                return None;
            }
            StdRng::seed_from_u64(rng.random())
        };
        let ctx = EventContext {
            match_id,
            roster: self.roster.as_ref(),
            spatial: self.spatial.as_ref(),
            notifier: self.notifier.as_ref(),
            items: self.items.as_ref(),
        };
        let eligible: Vec<&dyn MatchEvent> = self
            .events
            .iter()
            .map(|event| event.as_ref())
            .filter(|event| event.can_trigger(&ctx))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let event = eligible[rng.random_range(0..eligible.len())];
        if !event.fire(&ctx, &mut rng) {
            log::debug!("event {} fizzled in {match_id}", event.name());
            return None;
        }
        log::info!("event {} struck {match_id}", event.name());
        Some(event.name().to_string())
    }
}

/// Lightning at the highest safe ground above a random survivor's
/// column; the presentation layer draws the strike.
pub struct Thunderstorm;

impl MatchEvent for Thunderstorm {
    fn name(&self) -> &str {
        "thunderstorm"
    }

    fn can_trigger(&self, ctx: &EventContext<'_>) -> bool {
        !ctx.roster.alive_survivors(ctx.match_id).is_empty()
    }

    fn fire(&self, ctx: &EventContext<'_>, rng: &mut StdRng) -> bool {
        let survivors = ctx.roster.alive_survivors(ctx.match_id);
        if survivors.is_empty() {
            return false;
        }
        let mark = &survivors[rng.random_range(0..survivors.len())];
        let Some(position) = ctx.spatial.position_of(mark) else {
            return false;
        };
        let strike = ctx
            .spatial
            .highest_ground(position.world, position.x, position.z);
        ctx.notifier.broadcast(
            ctx.match_id,
            &Notice::Thunderstorm {
                x: strike.x,
                z: strike.z,
            },
        );
        true
    }
}

/// Broadcast-only visibility event.
pub struct FogBank;

impl MatchEvent for FogBank {
    fn name(&self) -> &str {
        "fog-bank"
    }

    fn fire(&self, ctx: &EventContext<'_>, _rng: &mut StdRng) -> bool {
        ctx.notifier.broadcast(ctx.match_id, &Notice::FogBank);
        true
    }
}

/// Refills one random hunter with one random known item kind.
pub struct SupplyDrop;

impl MatchEvent for SupplyDrop {
    fn name(&self) -> &str {
        "supply-drop"
    }

    fn can_trigger(&self, ctx: &EventContext<'_>) -> bool {
        !ctx.roster.hunters(ctx.match_id).is_empty() && !ctx.items.item_names().is_empty()
    }

    fn fire(&self, ctx: &EventContext<'_>, rng: &mut StdRng) -> bool {
        let hunters = ctx.roster.hunters(ctx.match_id);
        if hunters.is_empty() {
            return false;
        }
        let names = ctx.items.item_names();
        if names.is_empty() {
            return false;
        }
        let target = &hunters[rng.random_range(0..hunters.len())];
        let item = &names[rng.random_range(0..names.len())];
        ctx.items.give_full(target, item);
        ctx.notifier
            .broadcast(ctx.match_id, &Notice::SupplyDrop { item: item.clone() });
        true
    }
}
