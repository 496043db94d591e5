use std::collections::HashMap;

use crate::config::AbilityDefinition;
use crate::cooldowns::CooldownLedger;
use crate::error::PursuitError;
use crate::types::PlayerId;

/// Per-ability behavior hook. `on_activate` runs the effect and reports
/// whether its preconditions held; the cooldown is consumed only when it
/// returns true. `on_expire` undoes a nonzero-duration effect and fires
/// at most once per activation, from natural expiry or explicit
/// deactivation, whichever comes first.
pub trait AbilityEffect: Send + Sync {
    fn on_activate(&self, player: &PlayerId) -> bool;
    fn on_expire(&self, _player: &PlayerId) {}
}

struct AbilitySlot {
    def: AbilityDefinition,
    effect: Box<dyn AbilityEffect>,
    ledger: CooldownLedger,
}

/// Successful activation. A nonzero duration carries the window epoch the
/// runtime needs to schedule the deferred end callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    pub ability: String,
    pub duration_ms: u64,
    pub window_epoch: Option<u64>,
}

/// Activation state machine per (player, ability):
/// Idle -> Cooldown -> (Active ->) Idle.
///
/// The slot table is immutable after construction; all per-player state
/// lives inside each slot's ledger.
#[derive(Default)]
pub struct AbilityEngine {
    slots: HashMap<String, AbilitySlot>,
}

impl AbilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ability(
        mut self,
        def: AbilityDefinition,
        effect: Box<dyn AbilityEffect>,
    ) -> Self {
        self.slots.insert(
            def.name.clone(),
            AbilitySlot {
                def,
                effect,
                ledger: CooldownLedger::new(),
            },
        );
        self
    }

    pub fn activate(
        &self,
        player: &PlayerId,
        ability: &str,
        now_ms: u64,
    ) -> Result<Activation, PursuitError> {
        let slot = self.slots.get(ability).ok_or(PursuitError::Disabled)?;
        if !slot.def.enabled {
            return Err(PursuitError::Disabled);
        }
        // the ledger arbitrates racing activations: the cooldown is
        // consumed before the hook runs and rolled back if it declines;
        // the hook fires at most once per consumed cooldown
        let window = slot
            .ledger
            .try_start(player, slot.def.cooldown_secs, slot.def.duration_secs, now_ms)
            .map_err(|remaining_secs| PursuitError::OnCooldown { remaining_secs })?;
        if !slot.effect.on_activate(player) {
            slot.ledger.clear(player);
            return Err(PursuitError::HookFailure);
        }
        Ok(Activation {
            ability: slot.def.name.clone(),
            duration_ms: slot.def.duration_secs * 1_000,
            window_epoch: window.map(|w| w.epoch),
        })
    }

    /// Deferred end callback path. Fires the expiry hook only if the
    /// window still carries the captured epoch; otherwise a no-op
    /// (already deactivated, cleared, or re-activated).
    pub fn expire_window(&self, player: &PlayerId, ability: &str, epoch: u64) -> bool {
        let Some(slot) = self.slots.get(ability) else {
            return false;
        };
        if !slot.ledger.end_window_if_current(player, epoch) {
            return false;
        }
        slot.effect.on_expire(player);
        true
    }

    /// Explicit deactivation; idempotent.
    pub fn deactivate(&self, player: &PlayerId, ability: &str) -> bool {
        let Some(slot) = self.slots.get(ability) else {
            return false;
        };
        if slot.ledger.take_window(player).is_none() {
            return false;
        }
        slot.effect.on_expire(player);
        true
    }

    pub fn is_active(&self, player: &PlayerId, ability: &str, now_ms: u64) -> bool {
        self.slots
            .get(ability)
            .and_then(|slot| slot.ledger.active_window(player, now_ms))
            .is_some()
    }

    pub fn remaining_cooldown(&self, player: &PlayerId, ability: &str, now_ms: u64) -> u64 {
        self.slots
            .get(ability)
            .map(|slot| slot.ledger.remaining_secs(player, now_ms))
            .unwrap_or(0)
    }

    pub fn clear_player(&self, player: &PlayerId) {
        for slot in self.slots.values() {
            slot.ledger.clear(player);
        }
    }

    pub fn clear_all(&self) {
        for slot in self.slots.values() {
            slot.ledger.clear_all();
        }
    }
}
