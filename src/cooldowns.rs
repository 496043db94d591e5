use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::types::PlayerId;

static NEXT_WINDOW_EPOCH: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug)]
struct CooldownEntry {
    ready_at_ms: u64,
}

/// Present only while a nonzero-duration effect is in force. The epoch is
/// issued at activation; a deferred end callback that captured an older
/// epoch finds the window gone or re-issued and becomes a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveWindow {
    pub ends_at_ms: u64,
    pub epoch: u64,
}

/// Shared cooldown/duration primitive. One instance per concern
/// (per ability, per tracker coordinator); keyed by player.
///
/// Expired cooldown entries are evicted lazily on read. The cooldown and
/// the active window are independent timers: a duration may outlast or
/// undershoot its cooldown.
#[derive(Debug, Default)]
pub struct CooldownLedger {
    entries: Mutex<HashMap<PlayerId, CooldownEntry>>,
    windows: Mutex<HashMap<PlayerId, ActiveWindow>>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with the remaining whole seconds while an unexpired entry
    /// exists. On success stores the new cooldown and, for a nonzero
    /// duration, opens an active window and returns it so the caller can
    /// schedule the single deferred end callback.
    pub fn try_start(
        &self,
        player: &PlayerId,
        cooldown_secs: u64,
        duration_secs: u64,
        now_ms: u64,
    ) -> Result<Option<ActiveWindow>, u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(player) {
            if entry.ready_at_ms > now_ms {
                return Err(remaining_secs_from(entry.ready_at_ms, now_ms));
            }
        }
        entries.insert(
            player.clone(),
            CooldownEntry {
                ready_at_ms: now_ms + cooldown_secs * 1_000,
            },
        );
        drop(entries);

        if duration_secs == 0 {
            return Ok(None);
        }
        let window = ActiveWindow {
            ends_at_ms: now_ms + duration_secs * 1_000,
            epoch: NEXT_WINDOW_EPOCH.fetch_add(1, Ordering::Relaxed),
        };
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(player.clone(), window);
        Ok(Some(window))
    }

    pub fn is_on_cooldown(&self, player: &PlayerId, now_ms: u64) -> bool {
        self.remaining_secs(player, now_ms) > 0
    }

    /// `max(0, ceil((ready_at - now) / 1000))`, evicting on expiry.
    pub fn remaining_secs(&self, player: &PlayerId, now_ms: u64) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get(player) else {
            return 0;
        };
        if entry.ready_at_ms <= now_ms {
            entries.remove(player);
            return 0;
        }
        remaining_secs_from(entry.ready_at_ms, now_ms)
    }

    pub fn active_window(&self, player: &PlayerId, now_ms: u64) -> Option<ActiveWindow> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.get(player).copied()?;
        if window.ends_at_ms <= now_ms {
            windows.remove(player);
            return None;
        }
        Some(window)
    }

    /// Cooperative check-on-fire for the deferred end callback: removes
    /// the window only if it still carries the captured epoch.
    pub fn end_window_if_current(&self, player: &PlayerId, epoch: u64) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        match windows.get(player) {
            Some(window) if window.epoch == epoch => {
                windows.remove(player);
                true
            }
            _ => false,
        }
    }

    /// Explicit deactivation; returns the removed window if one was open.
    pub fn take_window(&self, player: &PlayerId) -> Option<ActiveWindow> {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(player)
    }

    pub fn clear(&self, player: &PlayerId) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(player);
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(player);
    }

    pub fn clear_all(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

fn remaining_secs_from(ready_at_ms: u64, now_ms: u64) -> u64 {
    ready_at_ms.saturating_sub(now_ms).div_ceil(1_000)
}
