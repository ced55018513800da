//! Overseer Headless Simulation Harness
//!
//! Runs seeded colonies through the full engine and checks the registry,
//! fleet and delivery invariants after every tick. No rendering, no I/O
//! beyond an optional scenario file.
//!
//! Usage:
//!   cargo run -p overseer-simtest
//!   cargo run -p overseer-simtest -- --verbose
//!   cargo run -p overseer-simtest -- --scenario path/to/scenario.json

use std::collections::{BTreeMap, BTreeSet};

use log::LevelFilter;
use overseer_core::demand::DemandBook;
use overseer_core::engine::{OverseerEngine, TickReport};
use overseer_core::generation::ColonyConfig;
use overseer_core::spawning::{take_census, ProductionOutcome};
use overseer_logic::config::OverseerConfig;
use overseer_logic::fleet::{next_to_produce, plan_fleet, ColonyCensus, Stage};
use overseer_logic::production::InitialState;
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, ResourceType, TaskId, WorkerId};
use overseer_logic::roles::Role;
use overseer_logic::task::{TaskKind, TaskRegistry, TaskRequest};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

// ── Scenario (JSON) ─────────────────────────────────────────────────────
const DEFAULT_SCENARIO: &str = include_str!("../scenarios/default.json");

#[derive(Debug, Deserialize)]
struct Scenario {
    seeds: Vec<u64>,
    ticks: u64,
    colonies: Vec<ScenarioColony>,
    #[serde(default)]
    config: OverseerConfig,
}

#[derive(Debug, Deserialize)]
struct ScenarioColony {
    preset: String,
    attack_from: Option<u64>,
    attack_until: Option<u64>,
}

impl ScenarioColony {
    fn colony_config(&self, id: ColonyId) -> Option<ColonyConfig> {
        match self.preset.as_str() {
            "outpost" => Some(ColonyConfig {
                id,
                name: format!("Outpost {}", id.0),
                ..ColonyConfig::default()
            }),
            "metropolis" => Some(ColonyConfig::metropolis(id)),
            _ => None,
        }
    }

    fn under_attack(&self, tick: u64) -> bool {
        match (self.attack_from, self.attack_until) {
            (Some(from), Some(until)) => tick >= from && tick < until,
            (Some(from), None) => tick >= from,
            _ => false,
        }
    }
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

/// Warn by default, debug with `--verbose`.
fn logger(verbose: bool) -> env_logger::Builder {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    builder
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    // RUST_LOG, when set, overrides the level picked here.
    logger(verbose).parse_default_env().init();
    println!("=== Overseer Simulation Harness ===\n");

    let scenario_path = args
        .iter()
        .position(|a| a == "--scenario")
        .and_then(|i| args.get(i + 1));
    let scenario_json = match scenario_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("cannot read scenario {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => DEFAULT_SCENARIO.to_string(),
    };

    let mut results = Vec::new();

    // 1. Scenario parse
    let scenario = match serde_json::from_str::<Scenario>(&scenario_json) {
        Ok(s) => {
            results.push(TestResult {
                name: "scenario_parse".into(),
                passed: !s.seeds.is_empty() && !s.colonies.is_empty(),
                detail: format!(
                    "{} seeds x {} colonies x {} ticks",
                    s.seeds.len(),
                    s.colonies.len(),
                    s.ticks
                ),
            });
            Some(s)
        }
        Err(e) => {
            results.push(TestResult {
                name: "scenario_parse".into(),
                passed: false,
                detail: format!("JSON parse error: {}", e),
            });
            None
        }
    };

    // 2. Registry protocol
    results.extend(validate_registry(verbose));

    // 3. Fleet sizing sweep
    results.extend(validate_fleet_sizing(verbose));

    // 4. Full engine runs
    if let Some(scenario) = &scenario {
        results.extend(validate_engine_runs(scenario, verbose));
    }

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 2. Registry ─────────────────────────────────────────────────────────

fn validate_registry(_verbose: bool) -> Vec<TestResult> {
    println!("--- Task Registry ---");
    let mut results = Vec::new();

    let mut registry = TaskRegistry::new();
    let request = |amount| TaskRequest {
        target: NodeId(1),
        kind: TaskKind::Load,
        resource: ResourceType::Energy,
        amount,
        priority: 5,
    };
    let a = registry.request(request(100), 0, 500).map(|o| o.id());
    let b = registry.request(request(40), 1, 500).map(|o| o.id());
    let merged_amount = a
        .as_ref()
        .ok()
        .and_then(|id| registry.get(*id))
        .map(|t| t.amount)
        .unwrap_or(0);
    results.push(TestResult {
        name: "registry_idempotent_merge".into(),
        passed: a.is_ok() && a == b && registry.len() == 1 && merged_amount >= 100,
        detail: format!("{} task(s), amount {}", registry.len(), merged_amount),
    });

    results.push(TestResult {
        name: "registry_rejects_zero".into(),
        passed: registry.request(request(0), 0, 500).is_err(),
        detail: "zero-amount request rejected".into(),
    });

    let claims: Vec<bool> = (0..5)
        .map(|w| registry.claim_next(WorkerId(w), 2, |_| true).is_some())
        .collect();
    let winners = claims.iter().filter(|c| **c).count();
    results.push(TestResult {
        name: "registry_single_claim".into(),
        passed: winners == 1,
        detail: format!("{} of 5 workers claimed the only task", winners),
    });

    results
}

// ── 3. Fleet sizing ─────────────────────────────────────────────────────

fn census_for(stage: Stage) -> ColonyCensus {
    let mut nodes: Vec<(NodeKind, u32)> = vec![(NodeKind::Spawner, 1), (NodeKind::Source, 2)];
    match stage {
        Stage::Outpost => {}
        Stage::Settlement => nodes.push((NodeKind::Extension, 5)),
        Stage::Established => nodes.extend([(NodeKind::Extension, 10), (NodeKind::Tower, 1)]),
        Stage::Fortified => nodes.extend([(NodeKind::Extension, 20), (NodeKind::Storage, 1)]),
        Stage::Metropolis => nodes.extend([
            (NodeKind::Extension, 30),
            (NodeKind::Storage, 1),
            (NodeKind::Terminal, 1),
            (NodeKind::Lab, 3),
        ]),
    }
    ColonyCensus {
        controller_level: stage.tier(),
        node_counts: nodes.into_iter().collect(),
        ..Default::default()
    }
}

fn validate_fleet_sizing(verbose: bool) -> Vec<TestResult> {
    println!("--- Fleet Sizing ---");
    let mut results = Vec::new();
    let config = OverseerConfig::default();

    let mut stage_failures = Vec::new();
    let mut determinism_failures = Vec::new();
    let mut starvation_failures = Vec::new();
    let mut defense_failures = Vec::new();
    let mut cap_failures = Vec::new();

    for stage in Stage::ALL {
        for under_attack in [false, true] {
            for starving in [false, true] {
                let mut census = census_for(stage);
                census.under_attack = under_attack;
                if !starving {
                    census.population.insert(Role::Harvester, 2);
                }
                let label = format!(
                    "{:?}{}{}",
                    stage,
                    if under_attack { "+attack" } else { "" },
                    if starving { "+starving" } else { "" }
                );

                let plan = plan_fleet(&census, &config);
                if plan.stage != stage {
                    stage_failures.push(label.clone());
                }
                if plan != plan_fleet(&census, &config) {
                    determinism_failures.push(label.clone());
                }
                if starving
                    && (plan.targets.get(Role::Harvester) < 1
                        || plan.priority.first() != Some(&Role::Harvester)
                        || next_to_produce(&plan, &census) != Some(Role::Harvester))
                {
                    starvation_failures.push(label.clone());
                }
                if under_attack {
                    let expected = if starving { 1 } else { 0 };
                    if plan.targets.get(Role::Defender) < 1
                        || plan.priority.get(expected) != Some(&Role::Defender)
                    {
                        defense_failures.push(label.clone());
                    }
                } else if plan.targets.get(Role::Defender) != 0 {
                    defense_failures.push(label.clone());
                }
                for role in Role::ALL {
                    if let Some(kind) = role.serviced_node() {
                        if plan.targets.get(role) > census.nodes_of(kind) {
                            cap_failures.push(format!("{} {}", label, role));
                        }
                    }
                }
                if verbose {
                    println!("  {:<28} {:?}", label, plan.targets.as_map());
                }
            }
        }
    }

    for (name, failures, ok) in [
        ("fleet_stage_ladder", stage_failures, "every stage detected"),
        ("fleet_deterministic", determinism_failures, "plans identical on repeat"),
        ("fleet_starvation_first", starvation_failures, "gatherer first when starving"),
        ("fleet_defense_response", defense_failures, "defenders only under attack"),
        ("fleet_node_caps", cap_failures, "dedicated roles capped by nodes"),
    ] {
        results.push(TestResult {
            name: name.into(),
            passed: failures.is_empty(),
            detail: if failures.is_empty() {
                ok.into()
            } else {
                failures.join(", ")
            },
        });
    }

    // No towers and a young controller: the largest escalation.
    let mut census = census_for(Stage::Outpost);
    census.under_attack = true;
    census.controller_level = 1;
    census.population.insert(Role::Harvester, 2);
    let defenders = plan_fleet(&census, &config).targets.get(Role::Defender);
    results.push(TestResult {
        name: "fleet_undefended_escalation".into(),
        passed: defenders >= 2,
        detail: format!("{} defenders with no towers", defenders),
    });

    results
}

// ── 4. Engine runs ──────────────────────────────────────────────────────

const LAB_ENERGY_STOCK: u32 = 300;

#[derive(Default)]
struct RunStats {
    violations: Vec<String>,
    completed: usize,
    produced: usize,
    dropped: usize,
    peak_tasks: usize,
}

/// Registry and worker-memory invariants that must hold after every tick.
fn check_invariants(engine: &OverseerEngine, tick: u64, stats: &mut RunStats) {
    let registry = &engine.memory.registry;
    let snapshot = &engine.snapshot;

    let mut holders: BTreeMap<TaskId, Vec<WorkerId>> = BTreeMap::new();
    for id in snapshot.worker_ids() {
        if let Some((worker, _)) = snapshot.worker(id) {
            if let Some(memory) = worker.task {
                holders.entry(memory.task).or_default().push(id);
            }
        }
    }
    for (task, workers) in &holders {
        if workers.len() > 1 {
            stats
                .violations
                .push(format!("tick {}: {} held by {:?}", tick, task, workers));
        }
    }

    for task in registry.iter() {
        if task.delivered > task.requested_total {
            stats.violations.push(format!(
                "tick {}: {} over-delivered {} of {}",
                tick, task.id, task.delivered, task.requested_total
            ));
        }
        if !snapshot.node_exists(task.target) {
            stats
                .violations
                .push(format!("tick {}: {} targets missing {}", tick, task.id, task.target));
        }
        if let Some(worker) = task.assignee {
            if !snapshot.worker_exists(worker) {
                stats.violations.push(format!(
                    "tick {}: {} assigned to missing {}",
                    tick, task.id, worker
                ));
            }
        }
    }
    stats.peak_tasks = stats.peak_tasks.max(registry.len());
}

fn record(report: &TickReport, stats: &mut RunStats) {
    for (_, step) in &report.steps {
        if matches!(step, overseer_core::worker::WorkerStep::Completed(_)) {
            stats.completed += 1;
        }
    }
    for scheduler in &report.schedulers {
        match scheduler.production {
            ProductionOutcome::Produced { .. } => stats.produced += 1,
            ProductionOutcome::Dropped { .. } => stats.dropped += 1,
            _ => {}
        }
    }
}

fn validate_engine_runs(scenario: &Scenario, verbose: bool) -> Vec<TestResult> {
    println!("--- Engine Runs ---");
    let mut results = Vec::new();

    for seed in &scenario.seeds {
        let mut engine = OverseerEngine::new(scenario.config.clone());
        let mut rng = StdRng::seed_from_u64(*seed);
        let mut colonies = Vec::new();
        let mut book = DemandBook::new();
        for (i, setup) in scenario.colonies.iter().enumerate() {
            let id = ColonyId(i as u32);
            match setup.colony_config(id) {
                Some(config) => {
                    let layout = engine.generate(&config, &mut rng);
                    // Labs keep a small energy stock so lab tenders have work.
                    for lab in &layout.labs {
                        book.stock(id, *lab, ResourceType::Energy, LAB_ENERGY_STOCK);
                    }
                    colonies.push((id, setup));
                }
                None => results.push(TestResult {
                    name: format!("seed{}_preset", seed),
                    passed: false,
                    detail: format!("unknown preset '{}'", setup.preset),
                }),
            }
        }

        engine.set_demand_source(Some(Box::new(book)));

        // A manual request that can never be served (no labs in an outpost)
        // must be dropped, not retried forever.
        let mut queued_invalid = BTreeSet::new();
        for (id, setup) in &colonies {
            if setup.preset == "outpost" {
                engine.enqueue_production(*id, Role::LabTender, 0, InitialState::new());
                queued_invalid.insert(*id);
            }
        }

        let mut stats = RunStats::default();
        for tick in 0..scenario.ticks {
            for (id, setup) in &colonies {
                let attacked = setup.under_attack(tick);
                if let Some(colony) = engine.snapshot.colony_mut(*id) {
                    colony.under_attack = attacked;
                }
            }
            let report = engine.tick();
            record(&report, &mut stats);
            engine.garbage_collect();
            check_invariants(&engine, tick, &mut stats);
        }

        results.push(TestResult {
            name: format!("seed{}_invariants", seed),
            passed: stats.violations.is_empty(),
            detail: if stats.violations.is_empty() {
                format!(
                    "{} ticks clean, peak {} open tasks",
                    scenario.ticks, stats.peak_tasks
                )
            } else {
                format!(
                    "{} violations, first: {}",
                    stats.violations.len(),
                    stats.violations[0]
                )
            },
        });

        let gatherers: Vec<(ColonyId, u32)> = colonies
            .iter()
            .map(|(id, _)| {
                let census = take_census(&engine.snapshot, &engine.memory.registry, *id, engine.now());
                let count = census
                    .map(|c| c.population_of(Role::Harvester) + c.population_of(Role::Miner))
                    .unwrap_or(0);
                (*id, count)
            })
            .collect();
        results.push(TestResult {
            name: format!("seed{}_energy_income", seed),
            passed: gatherers.iter().all(|(_, n)| *n > 0),
            detail: format!("gatherers per colony: {:?}", gatherers),
        });

        results.push(TestResult {
            name: format!("seed{}_fleet_grows", seed),
            passed: stats.produced > 0,
            detail: format!("{} workers produced", stats.produced),
        });

        let invalid_left: usize = queued_invalid
            .iter()
            .filter_map(|id| engine.memory.queues.get(id))
            .map(|q| q.iter().filter(|e| e.role == Role::LabTender).count())
            .sum();
        results.push(TestResult {
            name: format!("seed{}_invalid_requests_dropped", seed),
            passed: invalid_left == 0 && stats.dropped >= queued_invalid.len(),
            detail: format!("{} dropped, {} left", stats.dropped, invalid_left),
        });

        let has_logistics = colonies.iter().any(|(_, s)| s.preset == "metropolis");
        if has_logistics {
            results.push(TestResult {
                name: format!("seed{}_tasks_complete", seed),
                passed: stats.completed > 0,
                detail: format!("{} tasks completed", stats.completed),
            });
        }

        let mut buffer = Vec::new();
        let roundtrip = engine
            .save(&mut buffer)
            .and_then(|_| overseer_core::persistence::load_memory(buffer.as_slice()));
        results.push(TestResult {
            name: format!("seed{}_persistence", seed),
            passed: roundtrip
                .as_ref()
                .is_ok_and(|m| m.registry.len() == engine.memory.registry.len()),
            detail: match &roundtrip {
                Ok(m) => format!("{} bytes, {} tasks", buffer.len(), m.registry.len()),
                Err(e) => e.to_string(),
            },
        });

        if verbose {
            for (id, _) in &colonies {
                if let Some(plan) = engine.fleet_plan(*id) {
                    println!(
                        "  seed {} {}: {:?} targets {:?}",
                        seed,
                        id,
                        plan.stage,
                        plan.targets.as_map()
                    );
                }
            }
        }
        log::info!(
            "seed {} done: {} completed, {} produced",
            seed,
            stats.completed,
            stats.produced
        );
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_sets_log_level() {
        assert_eq!(logger(false).build().filter(), LevelFilter::Warn);
        assert_eq!(logger(true).build().filter(), LevelFilter::Debug);
    }
}
