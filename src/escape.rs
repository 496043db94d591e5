use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{EscapeConfig, ExtractionPointConfig};
use crate::constants::TICK_SECS;
use crate::services::{Notice, NotifierService, RosterService, SpatialService};
use crate::types::{MatchId, PlayerId, PursuitEvent};

/// Fixed area where sustained presence for `required_secs` removes a
/// survivor from active pursuit. Owns the per-player progress counter;
/// a progress entry is removed outright (never floored at zero) on
/// cancel or completion.
pub struct ExtractionPoint {
    config: ExtractionPointConfig,
    progress: Mutex<HashMap<PlayerId, u32>>,
}

impl ExtractionPoint {
    fn new(config: ExtractionPointConfig) -> Self {
        Self {
            config,
            progress: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn progress_of(&self, player: &PlayerId) -> Option<u32> {
        self.lock_progress().get(player).copied()
    }

    fn lock_progress(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, u32>> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct EscapeTickReport {
    pub events: Vec<PursuitEvent>,
    /// Players who completed their escape this tick; the engine purges
    /// their tracker/cooldown state.
    pub extracted: Vec<PlayerId>,
}

/// Per-match owner of the extraction points. `tick` resolves containment
/// for every alive survivor once per fixed 1 Hz tick; user actions never
/// touch progress directly.
pub struct EscapeCoordinator {
    match_id: MatchId,
    points: Vec<ExtractionPoint>,
    config: EscapeConfig,
    roster: Arc<dyn RosterService>,
    spatial: Arc<dyn SpatialService>,
    notifier: Arc<dyn NotifierService>,
}

impl EscapeCoordinator {
    pub fn new(
        match_id: MatchId,
        config: EscapeConfig,
        roster: Arc<dyn RosterService>,
        spatial: Arc<dyn SpatialService>,
        notifier: Arc<dyn NotifierService>,
    ) -> Self {
        let points = config
            .points
            .iter()
            .cloned()
            .map(ExtractionPoint::new)
            .collect();
        Self {
            match_id,
            points,
            config,
            roster,
            spatial,
            notifier,
        }
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn points(&self) -> &[ExtractionPoint] {
        &self.points
    }

    /// One fixed-rate escape sweep over this match. Per-survivor failures
    /// are isolated: a bad lookup for one player never aborts the rest.
    pub fn tick(&self) -> EscapeTickReport {
        let mut report = EscapeTickReport::default();
        for survivor in self.roster.alive_survivors(&self.match_id) {
            self.resolve_survivor(&survivor, &mut report);
        }
        report
    }

    fn resolve_survivor(&self, survivor: &PlayerId, report: &mut EscapeTickReport) {
        let containing = self.containing_point(survivor);
        let existing = self
            .points
            .iter()
            .position(|point| point.progress_of(survivor).is_some());

        match (containing, existing) {
            (Some(at), None) => {
                self.points[at]
                    .lock_progress()
                    .insert(survivor.clone(), 0);
                let point = self.points[at].name().to_string();
                self.notifier.send(
                    survivor,
                    &Notice::EscapeStarted {
                        point: point.clone(),
                    },
                );
                report.events.push(PursuitEvent::EscapeStarted {
                    player: survivor.clone(),
                    point,
                });
            }
            (Some(at), Some(current)) if at == current => {
                self.advance(survivor, at, report);
            }
            // Containment moved within a single tick: treated as leaving
            // the old point; progress at the new one starts next tick.
            (Some(_), Some(current)) | (None, Some(current)) => {
                self.cancel(survivor, current, report);
            }
            (None, None) => {}
        }
    }

    /// First enabled point containing the survivor, in configured order.
    fn containing_point(&self, survivor: &PlayerId) -> Option<usize> {
        let position = self.spatial.position_of(survivor)?;
        self.points.iter().position(|point| {
            if !point.config.enabled {
                return false;
            }
            match self.spatial.distance(&position, &point.config.position) {
                Some(distance) => distance <= point.config.radius,
                None => false,
            }
        })
    }

    fn advance(&self, survivor: &PlayerId, at: usize, report: &mut EscapeTickReport) {
        let point = &self.points[at];
        let required = point.config.required_secs.max(1);
        let progress = {
            let mut progress = point.lock_progress();
            let Some(entry) = progress.get_mut(survivor) else {
                return;
            };
            *entry += TICK_SECS;
            let value = *entry;
            if value >= required {
                progress.remove(survivor);
            }
            value
        };

        if progress >= required {
            self.complete(survivor, at, report);
        } else {
            let percent = progress * 100 / required;
            self.notifier
                .send(survivor, &Notice::EscapeProgress { percent });
            report.events.push(PursuitEvent::EscapeProgress {
                player: survivor.clone(),
                point: point.name().to_string(),
                progress_secs: progress,
                percent,
            });
        }
    }

    fn complete(&self, survivor: &PlayerId, at: usize, report: &mut EscapeTickReport) {
        let point = self.points[at].name().to_string();
        let name = self.roster.display_name(survivor);
        self.roster.mark_extracted(&self.match_id, survivor);

        let spawn = self.config.spectator_spawn;
        let landing = self
            .spatial
            .highest_ground(spawn.world, spawn.x, spawn.z);
        self.spatial.teleport(survivor, &landing);

        self.notifier.broadcast(
            &self.match_id,
            &Notice::EscapeCompleted { player_name: name },
        );
        log::info!("{survivor} escaped at {point} in match {}", self.match_id);
        report.events.push(PursuitEvent::EscapeCompleted {
            player: survivor.clone(),
            point,
        });
        report.extracted.push(survivor.clone());
    }

    fn cancel(&self, survivor: &PlayerId, current: usize, report: &mut EscapeTickReport) {
        self.points[current].lock_progress().remove(survivor);
        self.notifier.send(survivor, &Notice::EscapeCancelled);
        report.events.push(PursuitEvent::EscapeCancelled {
            player: survivor.clone(),
            point: self.points[current].name().to_string(),
        });
    }

    /// Drops any progress entry for the player (disconnect, purge).
    pub fn clear_player(&self, player: &PlayerId) {
        for point in &self.points {
            point.lock_progress().remove(player);
        }
    }
}
