use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::ItemDefinition;
use crate::types::PlayerId;

/// Side-effecting use hook. Must not block beyond enqueuing its own
/// timed continuation. Returning false means the precondition failed and
/// no use is consumed.
pub trait ItemEffect: Send + Sync {
    fn on_use(&self, player: &PlayerId) -> bool;
}

struct ItemSlot {
    def: ItemDefinition,
    effect: Box<dyn ItemEffect>,
    uses: Mutex<HashMap<PlayerId, u32>>,
}

/// Consumable item engine: per-player remaining-uses counters plus an
/// activation effect per item kind. The slot table is immutable after
/// construction.
#[derive(Default)]
pub struct ItemEngine {
    slots: HashMap<String, ItemSlot>,
}

impl ItemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, def: ItemDefinition, effect: Box<dyn ItemEffect>) -> Self {
        self.slots.insert(
            def.name.clone(),
            ItemSlot {
                def,
                effect,
                uses: Mutex::new(HashMap::new()),
            },
        );
        self
    }

    pub fn knows(&self, item: &str) -> bool {
        self.slots.contains_key(item)
    }

    /// Fails when the player has no remaining uses (default 0). The
    /// counter arbitrates racing uses: a consumable charge is reserved
    /// under the lock before the hook runs and restored if it declines,
    /// so the hook fires at most once per charge.
    pub fn use_item(&self, player: &PlayerId, item: &str) -> bool {
        let Some(slot) = self.slots.get(item) else {
            return false;
        };
        {
            let mut uses = slot.uses.lock().unwrap_or_else(|e| e.into_inner());
            let Some(count) = uses.get_mut(player) else {
                return false;
            };
            if *count == 0 {
                return false;
            }
            if slot.def.consumable {
                *count -= 1;
            }
        }
        // hook runs outside the lock; it may call back into the engine
        if !slot.effect.on_use(player) {
            if slot.def.consumable {
                let mut uses = slot.uses.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(count) = uses.get_mut(player) {
                    *count = (*count + 1).min(slot.def.max_uses);
                }
            }
            return false;
        }
        true
    }

    /// Resets (does not add to) the player's counter.
    pub fn give(&self, player: &PlayerId, item: &str, amount: u32) {
        if let Some(slot) = self.slots.get(item) {
            let capped = amount.min(slot.def.max_uses);
            slot.uses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(player.clone(), capped);
        }
    }

    pub fn give_full(&self, player: &PlayerId, item: &str) {
        if let Some(slot) = self.slots.get(item) {
            self.give(player, item, slot.def.max_uses);
        }
    }

    pub fn remaining(&self, player: &PlayerId, item: &str) -> u32 {
        self.slots
            .get(item)
            .map(|slot| {
                slot.uses
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(player)
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    pub fn item_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear_player(&self, player: &PlayerId) {
        for slot in self.slots.values() {
            slot.uses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(player);
        }
    }

    pub fn clear_all(&self) {
        for slot in self.slots.values() {
            slot.uses.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct CountingUse {
        count: AtomicU32,
        reject: bool,
    }

    impl ItemEffect for Arc<CountingUse> {
        fn on_use(&self, _player: &PlayerId) -> bool {
            if self.reject {
                return false;
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn engine_with(name: &str, max_uses: u32, consumable: bool, reject: bool) -> (ItemEngine, Arc<CountingUse>) {
        let effect = Arc::new(CountingUse {
            reject,
            ..CountingUse::default()
        });
        let engine = ItemEngine::new().with_item(
            ItemDefinition {
                name: name.to_string(),
                max_uses,
                consumable,
            },
            Box::new(effect.clone()),
        );
        (engine, effect)
    }

    fn player(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    #[test]
    fn two_uses_then_depleted_without_hook() {
        let (engine, effect) = engine_with("flare", 2, true, false);
        let p = player("p1");
        engine.give_full(&p, "flare");

        assert!(engine.use_item(&p, "flare"));
        assert!(engine.use_item(&p, "flare"));
        assert_eq!(engine.remaining(&p, "flare"), 0);
        assert!(!engine.use_item(&p, "flare"));
        assert_eq!(effect.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_counter_is_zero() {
        let (engine, effect) = engine_with("flare", 2, true, false);
        assert!(!engine.use_item(&player("p1"), "flare"));
        assert_eq!(effect.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn give_resets_rather_than_adds() {
        let (engine, _) = engine_with("flare", 5, true, false);
        let p = player("p1");
        engine.give(&p, "flare", 3);
        assert!(engine.use_item(&p, "flare"));
        engine.give(&p, "flare", 3);
        assert_eq!(engine.remaining(&p, "flare"), 3);
    }

    #[test]
    fn give_caps_at_max_uses() {
        let (engine, _) = engine_with("flare", 2, true, false);
        let p = player("p1");
        engine.give(&p, "flare", 99);
        assert_eq!(engine.remaining(&p, "flare"), 2);
    }

    #[test]
    fn hook_failure_keeps_counter() {
        let (engine, _) = engine_with("flare", 2, true, true);
        let p = player("p1");
        engine.give_full(&p, "flare");
        assert!(!engine.use_item(&p, "flare"));
        assert_eq!(engine.remaining(&p, "flare"), 2);
    }

    #[test]
    fn racing_uses_cannot_overspend_the_last_charge() {
        let (engine, effect) = engine_with("flare", 2, true, false);
        let p = player("p1");
        engine.give(&p, "flare", 1);
        let barrier = std::sync::Barrier::new(2);
        let successes = AtomicU32::new(0);

        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    barrier.wait();
                    if engine.use_item(&p, "flare") {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        // the loser sees an empty counter before its hook runs
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(effect.count.load(Ordering::SeqCst), 1);
        assert_eq!(engine.remaining(&p, "flare"), 0);
    }

    #[test]
    fn non_consumable_never_decrements() {
        let (engine, effect) = engine_with("compass", 1, false, false);
        let p = player("p1");
        engine.give_full(&p, "compass");
        assert!(engine.use_item(&p, "compass"));
        assert!(engine.use_item(&p, "compass"));
        assert_eq!(engine.remaining(&p, "compass"), 1);
        assert_eq!(effect.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_player_resets_to_default() {
        let (engine, _) = engine_with("flare", 2, true, false);
        let p = player("p1");
        engine.give_full(&p, "flare");
        engine.clear_player(&p);
        assert_eq!(engine.remaining(&p, "flare"), 0);
    }
}
