use chase_pursuit_server::abilities::{AbilityEffect, AbilityEngine};
use chase_pursuit_server::config::{
    AbilityDefinition, EscapeConfig, ExtractionPointConfig, ItemDefinition, PursuitConfig,
};
use chase_pursuit_server::engine::{Collaborators, PursuitEngine};
use chase_pursuit_server::items::{ItemEffect, ItemEngine};
use chase_pursuit_server::memory::MemoryWorld;
use chase_pursuit_server::services::SpatialService;
use chase_pursuit_server::types::{
    MatchId, MatchPhase, PlayerId, Position, PursuitEvent, Role, WorldId,
};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PAD_X: f64 = 100.0;
const PAD_Z: f64 = 100.0;
const EVENT_EVERY_TICKS: u64 = 15;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    survivors: Option<usize>,
    #[arg(long)]
    hunters: Option<usize>,
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long)]
    chance: Option<f64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    survivors: usize,
    hunters: usize,
    ticks: u64,
    #[serde(rename = "triggerChance")]
    trigger_chance: f64,
    seed: u64,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u64,
    survivors: usize,
    hunters: usize,
    #[serde(rename = "finishedTick")]
    finished_tick: u64,
    extracted: usize,
    #[serde(rename = "escapesStarted")]
    escapes_started: u64,
    #[serde(rename = "escapesCancelled")]
    escapes_cancelled: u64,
    #[serde(rename = "trackerUpdates")]
    tracker_updates: u64,
    #[serde(rename = "abilityUses")]
    ability_uses: u64,
    #[serde(rename = "itemUses")]
    item_uses: u64,
    #[serde(rename = "eventsTriggered")]
    events_triggered: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "eventCounts")]
    event_counts: BTreeMap<String, u64>,
    scenarios: Vec<ScenarioResultLine>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let started_at = chrono::Utc::now().to_rfc3339();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| format!("sim-{seed_hint}"));

    let mut has_anomaly = false;
    let mut results = Vec::new();
    let mut event_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &run_id,
            json!({
                "scenario": scenario.name,
                "survivors": scenario.survivors,
                "hunters": scenario.hunters,
                "ticks": scenario.ticks,
                "seed": scenario.seed,
            }),
        );
        let result = run_scenario(&scenario);

        if !result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += result.anomalies.len();
        *event_counts.entry("escapeStarted".to_string()).or_insert(0) += result.escapes_started;
        *event_counts.entry("escapeCancelled".to_string()).or_insert(0) +=
            result.escapes_cancelled;
        *event_counts.entry("escapeCompleted".to_string()).or_insert(0) +=
            result.extracted as u64;
        *event_counts.entry("eventTriggered".to_string()).or_insert(0) += result.events_triggered;

        emit_log(
            "info",
            "scenario_finished",
            &run_id,
            json!({
                "scenario": result.scenario,
                "finishedTick": result.finished_tick,
                "extracted": result.extracted,
                "anomalyCount": result.anomalies.len(),
            }),
        );
        println!(
            "{}",
            serde_json::to_string(&result).expect("scenario result should serialize")
        );
        results.push(result);
    }

    let summary = RunSummary {
        run_id: run_id.clone(),
        started_at,
        finished_at: chrono::Utc::now().to_rfc3339(),
        scenario_count: results.len(),
        anomaly_count: total_anomalies,
        event_counts,
        scenarios: results,
    };

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
    }

    emit_log(
        "info",
        "run_finished",
        &run_id,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "eventCounts": summary.event_counts,
        }),
    );
    if has_anomaly {
        std::process::exit(1);
    }
}

struct AlwaysOk;

impl AbilityEffect for AlwaysOk {
    fn on_activate(&self, _player: &PlayerId) -> bool {
        true
    }
}

impl ItemEffect for AlwaysOk {
    fn on_use(&self, _player: &PlayerId) -> bool {
        true
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioResultLine {
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let world = Arc::new(MemoryWorld::new());
    let match_id = MatchId::new(format!("{}-{}", scenario.name, scenario.seed));
    world.add_match(&match_id, MatchPhase::Playing);

    let survivors: Vec<PlayerId> = (0..scenario.survivors)
        .map(|idx| {
            let id = PlayerId::new(format!("runner_{:02}", idx + 1));
            world.add_player(
                &match_id,
                &id,
                &format!("Runner-{:02}", idx + 1),
                Role::Survivor,
                Position::new(WorldId(0), rng.random_range(-50.0..50.0), 64.0, rng.random_range(-50.0..50.0)),
            );
            id
        })
        .collect();
    let hunters: Vec<PlayerId> = (0..scenario.hunters)
        .map(|idx| {
            let id = PlayerId::new(format!("hunter_{:02}", idx + 1));
            world.add_player(
                &match_id,
                &id,
                &format!("Hunter-{:02}", idx + 1),
                Role::Hunter,
                Position::new(WorldId(0), rng.random_range(-50.0..50.0), 64.0, rng.random_range(-50.0..50.0)),
            );
            id
        })
        .collect();

    let engine = build_engine(&world, scenario);
    engine.prepare_match(&match_id, 0);
    for survivor in &survivors {
        engine.items().give_full(survivor, "flare");
    }

    let mut escapes_started = 0u64;
    let mut escapes_cancelled = 0u64;
    let mut tracker_updates = 0u64;
    let mut ability_uses = 0u64;
    let mut item_uses = 0u64;
    let mut events_triggered = 0u64;
    let mut anomalies = Vec::new();
    let mut finished_tick = 0u64;

    for tick in 0..scenario.ticks {
        let now_ms = tick * 1_000;
        finished_tick = tick;

        for survivor in &survivors {
            if world.is_extracted(survivor) {
                continue;
            }
            step_towards_pad(&world, survivor, &mut rng);
            if rng.random::<f64>() < 0.05
                && engine.activate_ability(survivor, "sprint", now_ms).is_ok()
            {
                ability_uses += 1;
            }
            if rng.random::<f64>() < 0.02 && engine.use_item(survivor, "flare") {
                item_uses += 1;
            }
        }
        for hunter in &hunters {
            random_walk(&world, hunter, &mut rng);
        }

        for event in engine.run_escape_sweep(now_ms) {
            match event {
                PursuitEvent::EscapeStarted { .. } => escapes_started += 1,
                PursuitEvent::EscapeCancelled { .. } => escapes_cancelled += 1,
                PursuitEvent::EscapeProgress { percent, .. } => {
                    if percent > 100 {
                        anomalies.push(format!("escape percent out of range: {percent}"));
                    }
                }
                _ => {}
            }
        }
        tracker_updates += engine.run_tracker_sweep(now_ms) as u64;
        if tick % EVENT_EVERY_TICKS == 0 {
            events_triggered += engine.run_event_sweep().len() as u64;
        }

        for hunter in &hunters {
            if let Some(target) = engine.trackers().target_of(hunter) {
                if world.is_extracted(&target) {
                    anomalies.push(format!("{hunter} still tracks extracted {target}"));
                }
            }
        }
        if survivors.iter().all(|survivor| world.is_extracted(survivor)) {
            break;
        }
    }

    let extracted = survivors
        .iter()
        .filter(|survivor| world.is_extracted(survivor))
        .count();
    ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        survivors: scenario.survivors,
        hunters: scenario.hunters,
        finished_tick,
        extracted,
        escapes_started,
        escapes_cancelled,
        tracker_updates,
        ability_uses,
        item_uses,
        events_triggered,
        anomalies,
    }
}

fn build_engine(world: &Arc<MemoryWorld>, scenario: &Scenario) -> PursuitEngine {
    let mut config = PursuitConfig::default();
    config.escape = EscapeConfig {
        points: vec![ExtractionPointConfig {
            name: "north-pad".to_string(),
            position: Position::new(WorldId(0), PAD_X, 64.0, PAD_Z),
            radius: 5.0,
            required_secs: 10,
            enabled: true,
        }],
        ..EscapeConfig::default()
    };
    config.events.trigger_chance = scenario.trigger_chance;

    let abilities = AbilityEngine::new().with_ability(
        AbilityDefinition {
            name: "sprint".to_string(),
            cooldown_secs: 20,
            duration_secs: 5,
            enabled: true,
        },
        Box::new(AlwaysOk),
    );
    let items = ItemEngine::new().with_item(
        ItemDefinition {
            name: "flare".to_string(),
            max_uses: 2,
            consumable: true,
        },
        Box::new(AlwaysOk),
    );
    let collaborators = Collaborators {
        roster: world.clone(),
        presence: world.clone(),
        spatial: world.clone(),
        notifier: world.clone(),
    };
    PursuitEngine::new(config, collaborators, abilities, items, scenario.seed)
}

/// Biased walk: mostly towards the pad, with enough jitter that some
/// survivors wander off it again and cancel their escape.
fn step_towards_pad(world: &MemoryWorld, survivor: &PlayerId, rng: &mut StdRng) {
    let Some(pos) = world.position_of(survivor) else {
        return;
    };
    let (dx, dz) = if rng.random::<f64>() < 0.8 {
        (
            (PAD_X - pos.x).clamp(-4.0, 4.0),
            (PAD_Z - pos.z).clamp(-4.0, 4.0),
        )
    } else {
        (rng.random_range(-6.0..6.0), rng.random_range(-6.0..6.0))
    };
    world.set_position(survivor, Position::new(pos.world, pos.x + dx, pos.y, pos.z + dz));
}

fn random_walk(world: &MemoryWorld, hunter: &PlayerId, rng: &mut StdRng) {
    if let Some(pos) = world.position_of(hunter) {
        world.set_position(
            hunter,
            Position::new(
                pos.world,
                pos.x + rng.random_range(-5.0..5.0),
                pos.y,
                pos.z + rng.random_range(-5.0..5.0),
            ),
        );
    }
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = cli.seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    });
    let trigger_chance = cli.chance.unwrap_or(0.15).clamp(0.0, 1.0);

    if cli.survivors.is_some() || cli.hunters.is_some() || cli.ticks.is_some() {
        let survivors = cli.survivors.unwrap_or(4).clamp(1, 100);
        return vec![Scenario {
            name: format!("custom-r{survivors}"),
            survivors,
            hunters: cli.hunters.unwrap_or(2).clamp(0, 100),
            ticks: cli.ticks.unwrap_or(120).clamp(1, 36_000),
            trigger_chance,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "quick-chase".to_string(),
            survivors: 4,
            hunters: 2,
            ticks: 120,
            trigger_chance,
            seed,
        },
        Scenario {
            name: "crowded-chase".to_string(),
            survivors: 12,
            hunters: 6,
            ticks: 300,
            trigger_chance,
            seed: seed.wrapping_add(1),
        },
    ]
}

fn emit_log(level: &str, event: &str, run_id: &str, details: Value) {
    let line = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": level,
        "event": event,
        "runId": run_id,
        "details": details,
    });
    eprintln!(
        "{}",
        serde_json::to_string(&line).expect("structured log should serialize")
    );
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let text = serde_json::to_string_pretty(summary).expect("run summary should serialize");
    std::fs::write(path, text)
}
