use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::abilities::Activation;
use crate::engine::PursuitEngine;
use crate::types::PlayerId;

/// Wall-clock milliseconds. Every core operation takes this explicitly,
/// so only the runtime edge and the binaries ever call it.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Starts the three fixed-rate sweep tasks. Intervals come from the
/// engine config; a sweep that overruns delays the next tick instead of
/// bursting.
pub fn spawn_sweeps(engine: Arc<PursuitEngine>) -> Vec<JoinHandle<()>> {
    let escape_ms = engine.config().escape.sweep_interval_ms;
    let tracker_ms = engine.config().tracker.sweep_interval_ms;
    let event_ms = engine.config().events.sweep_interval_ms;

    let escape_engine = engine.clone();
    let escape = tokio::spawn(async move {
        let mut ticker = sweep_interval(escape_ms);
        loop {
            ticker.tick().await;
            escape_engine.run_escape_sweep(now_ms());
        }
    });

    let tracker_engine = engine.clone();
    let tracker = tokio::spawn(async move {
        let mut ticker = sweep_interval(tracker_ms);
        loop {
            ticker.tick().await;
            tracker_engine.run_tracker_sweep(now_ms());
        }
    });

    let event = tokio::spawn(async move {
        let mut ticker = sweep_interval(event_ms);
        loop {
            ticker.tick().await;
            engine.run_event_sweep();
        }
    });

    vec![escape, tracker, event]
}

fn sweep_interval(period_ms: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

/// Schedules the deferred end callback for a timed activation. The
/// callback re-checks the window epoch, so a deactivation, purge, or
/// re-activation in the meantime turns it into a no-op.
pub fn spawn_ability_expiry(
    engine: Arc<PursuitEngine>,
    player: PlayerId,
    activation: &Activation,
) -> Option<JoinHandle<()>> {
    let epoch = activation.window_epoch?;
    let ability = activation.ability.clone();
    let delay = Duration::from_millis(activation.duration_ms);
    Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if engine.expire_ability(&player, &ability, epoch) {
            log::debug!("{ability} wore off for {player}");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::{AbilityEffect, AbilityEngine};
    use crate::config::{
        AbilityDefinition, EscapeConfig, ExtractionPointConfig, PursuitConfig,
    };
    use crate::engine::Collaborators;
    use crate::items::ItemEngine;
    use crate::memory::MemoryWorld;
    use crate::types::{MatchId, MatchPhase, Position, Role, WorldId};

    struct AlwaysOk;

    impl AbilityEffect for AlwaysOk {
        fn on_activate(&self, _player: &PlayerId) -> bool {
            true
        }
    }

    fn test_engine(world: &Arc<MemoryWorld>) -> Arc<PursuitEngine> {
        let config = PursuitConfig {
            escape: EscapeConfig {
                points: vec![ExtractionPointConfig {
                    name: "pad".to_string(),
                    position: Position::new(WorldId(0), 100.0, 64.0, 100.0),
                    radius: 4.0,
                    required_secs: 2,
                    enabled: true,
                }],
                ..EscapeConfig::default()
            },
            ..PursuitConfig::default()
        };
        let collaborators = Collaborators {
            roster: world.clone(),
            presence: world.clone(),
            spatial: world.clone(),
            notifier: world.clone(),
        };
        let abilities = AbilityEngine::new().with_ability(
            AbilityDefinition {
                name: "dash".to_string(),
                cooldown_secs: 5,
                duration_secs: 3,
                enabled: true,
            },
            Box::new(AlwaysOk),
        );
        Arc::new(PursuitEngine::new(
            config,
            collaborators,
            abilities,
            ItemEngine::new(),
            7,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_expiry_ends_the_window() {
        let world = Arc::new(MemoryWorld::new());
        let m = MatchId::new("m1");
        world.add_match(&m, MatchPhase::Playing);
        let p = PlayerId::new("p1");
        world.add_player(&m, &p, "p1", Role::Survivor, Position::new(WorldId(0), 0.0, 64.0, 0.0));
        let engine = test_engine(&world);

        let activation = engine.activate_ability(&p, "dash", 0).expect("activates");
        let handle = spawn_ability_expiry(engine.clone(), p.clone(), &activation)
            .expect("timed window");
        assert!(engine.abilities().is_active(&p, "dash", 1_000));

        handle.await.expect("expiry task");
        assert!(!engine.abilities().is_active(&p, "dash", 3_000));
        let expired = engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, crate::types::PursuitEvent::AbilityExpired { .. }));
        assert!(expired);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_expiry_after_deactivation_is_a_no_op() {
        let world = Arc::new(MemoryWorld::new());
        let m = MatchId::new("m1");
        world.add_match(&m, MatchPhase::Playing);
        let p = PlayerId::new("p1");
        world.add_player(&m, &p, "p1", Role::Survivor, Position::new(WorldId(0), 0.0, 64.0, 0.0));
        let engine = test_engine(&world);

        let activation = engine.activate_ability(&p, "dash", 0).expect("activates");
        let handle = spawn_ability_expiry(engine.clone(), p.clone(), &activation)
            .expect("timed window");
        assert!(engine.abilities().deactivate(&p, "dash"));

        // the sleeping task wakes, finds a stale epoch, and does nothing
        handle.await.expect("expiry task");
        assert!(!engine.abilities().is_active(&p, "dash", 3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_tasks_drive_a_full_escape() {
        let world = Arc::new(MemoryWorld::new());
        let m = MatchId::new("m1");
        world.add_match(&m, MatchPhase::Playing);
        let s = PlayerId::new("s1");
        world.add_player(
            &m,
            &s,
            "s1",
            Role::Survivor,
            Position::new(WorldId(0), 100.0, 64.0, 100.0),
        );
        let engine = test_engine(&world);

        let handles = spawn_sweeps(engine.clone());
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        for handle in &handles {
            handle.abort();
        }

        assert!(world.is_extracted(&s));
    }
}
