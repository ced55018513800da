//! Overseer engine - per-tick entry points.
//!
//! The engine owns the world snapshot, the core memory (task registry and
//! production queues) and the collaborators, and threads them by reference
//! into every component. A full [`OverseerEngine::tick`] runs, in order:
//!
//! 1. task garbage collection
//! 2. the scheduler for every colony (demand detection, then production)
//! 3. extension grouping refresh
//! 4. every live worker, in ascending id order
//! 5. world upkeep

use std::collections::BTreeMap;
use std::io::{Read, Write};

use overseer_logic::allocator::GroupIndex;
use overseer_logic::config::OverseerConfig;
use overseer_logic::fleet::{plan_fleet, FleetPlan, Stage};
use overseer_logic::production::InitialState;
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, Position, TaskId, WorkerId};
use overseer_logic::roles::Role;
use overseer_logic::task::{Expiry, RequestOutcome, Task, TaskError, TaskRequest};

use crate::demand::{detect_demand, DemandReport, DemandSource};
use crate::generation::{generate_colony, ColonyConfig, ColonyLayout};
use crate::mechanics::{run_upkeep, UpkeepReport};
use crate::movement::{GridMovement, Movement};
use crate::persistence::{load_memory, save_memory, CoreMemory, SaveError};
use crate::snapshot::Snapshot;
use crate::spawning::{run_production, take_census, ProductionOutcome};
use crate::worker::{describe_expiry, WorkerContext, WorkerStep};

/// What the scheduler did for one colony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    pub colony: ColonyId,
    pub stage: Stage,
    pub demand: DemandReport,
    pub production: ProductionOutcome,
}

/// Summary of one full tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub collected: Vec<(Task, Expiry)>,
    pub schedulers: Vec<SchedulerReport>,
    pub steps: Vec<(WorkerId, WorkerStep)>,
    pub upkeep: UpkeepReport,
}

pub struct OverseerEngine {
    /// ECS world and id indexes.
    pub snapshot: Snapshot,
    /// Task registry, production queues and tick counter.
    pub memory: CoreMemory,
    pub config: OverseerConfig,
    groups: BTreeMap<ColonyId, GroupIndex>,
    stages: BTreeMap<ColonyId, Stage>,
    movement: Box<dyn Movement>,
    demand: Option<Box<dyn DemandSource>>,
}

impl Default for OverseerEngine {
    fn default() -> Self {
        Self::new(OverseerConfig::default())
    }
}

impl OverseerEngine {
    pub fn new(config: OverseerConfig) -> Self {
        Self {
            snapshot: Snapshot::new(),
            memory: CoreMemory::default(),
            config,
            groups: BTreeMap::new(),
            stages: BTreeMap::new(),
            movement: Box::new(GridMovement::default()),
            demand: None,
        }
    }

    pub fn with_movement(mut self, movement: impl Movement + 'static) -> Self {
        self.movement = Box::new(movement);
        self
    }

    pub fn with_demand_source(mut self, source: impl DemandSource + 'static) -> Self {
        self.demand = Some(Box::new(source));
        self
    }

    pub fn set_demand_source(&mut self, source: Option<Box<dyn DemandSource>>) {
        self.demand = source;
    }

    pub fn now(&self) -> u64 {
        self.memory.tick
    }

    /// Generate a colony into the world and register its production queue.
    pub fn generate(&mut self, config: &ColonyConfig, rng: &mut impl rand::Rng) -> ColonyLayout {
        let layout = generate_colony(&mut self.snapshot, config, rng);
        self.memory.queues.entry(layout.colony).or_default();
        layout
    }

    /// Run one full tick.
    pub fn tick(&mut self) -> TickReport {
        let now = self.memory.tick;
        let collected = self.garbage_collect();

        let schedulers = self
            .snapshot
            .colony_ids()
            .into_iter()
            .filter_map(|colony| self.run_scheduler_tick(colony))
            .collect();

        self.refresh_groups();

        let steps = self
            .snapshot
            .worker_ids()
            .into_iter()
            .map(|id| (id, self.run_worker_tick(id)))
            .collect();

        let upkeep = run_upkeep(&mut self.snapshot);
        self.memory.tick += 1;

        TickReport {
            tick: now,
            collected,
            schedulers,
            steps,
            upkeep,
        }
    }

    // ── Task registry ───────────────────────────────────────────────────

    pub fn request_task(&mut self, request: TaskRequest) -> Result<RequestOutcome, TaskError> {
        let outcome =
            self.memory
                .registry
                .request(request, self.memory.tick, self.config.task_horizon)?;
        if let RequestOutcome::Created(id) = outcome {
            log::info!(
                "{} created: {:?} {:?} x{} at {}",
                id,
                request.kind,
                request.resource,
                request.amount,
                request.target
            );
        }
        Ok(outcome)
    }

    pub fn claim_task(&mut self, task: TaskId, worker: WorkerId) -> Result<(), TaskError> {
        self.memory.registry.claim(task, worker)
    }

    pub fn release_task(&mut self, task: TaskId, worker: WorkerId) -> bool {
        self.memory.registry.release(task, worker)
    }

    pub fn complete_task(&mut self, task: TaskId) -> Option<Task> {
        self.memory.registry.complete(task)
    }

    /// Drop expired tasks, tasks whose nodes vanished and tasks held by dead
    /// workers. Workers still remembering a dropped task find it missing on
    /// their next decision and reset.
    pub fn garbage_collect(&mut self) -> Vec<(Task, Expiry)> {
        let snapshot = &self.snapshot;
        let collected = self.memory.registry.garbage_collect(
            self.memory.tick,
            |node| snapshot.node_exists(node),
            |worker| snapshot.worker_exists(worker),
        );
        for (task, reason) in &collected {
            log::debug!("{} collected: {}", task.id, describe_expiry(*reason));
        }
        collected
    }

    // ── Fleet and production ────────────────────────────────────────────

    /// Desired population per role, recomputed from the current world.
    pub fn fleet_targets(&self, colony: ColonyId) -> Option<BTreeMap<Role, u32>> {
        self.fleet_plan(colony)
            .map(|plan| plan.targets.as_map().clone())
    }

    pub fn fleet_plan(&self, colony: ColonyId) -> Option<FleetPlan> {
        let census = take_census(&self.snapshot, &self.memory.registry, colony, self.memory.tick)?;
        Some(plan_fleet(&census, &self.config))
    }

    /// Queue a worker ahead of the fleet plan. Returns the request's
    /// sequence number, or `None` for an unknown colony.
    pub fn enqueue_production(
        &mut self,
        colony: ColonyId,
        role: Role,
        priority: i32,
        initial_state: InitialState,
    ) -> Option<u64> {
        self.snapshot.colony(colony)?;
        let seq = self.memory.queues.entry(colony).or_default().enqueue(
            role,
            priority,
            initial_state,
            self.memory.tick,
        );
        log::info!("{} queued {} (request {}, priority {})", colony, role, seq, priority);
        Some(seq)
    }

    /// Demand detection followed by production for one colony.
    pub fn run_scheduler_tick(&mut self, colony: ColonyId) -> Option<SchedulerReport> {
        self.snapshot.colony(colony)?;
        let now = self.memory.tick;
        let demand = detect_demand(
            &self.snapshot,
            &mut self.memory.registry,
            colony,
            self.demand.as_deref(),
            &self.config,
            now,
        );
        let queue = self.memory.queues.entry(colony).or_default();
        let (plan, production) = run_production(
            &mut self.snapshot,
            &self.memory.registry,
            queue,
            colony,
            &self.config,
            now,
        )?;

        let previous = self.stages.insert(colony, plan.stage);
        if previous.is_some_and(|p| p != plan.stage) {
            log::info!("{} advanced to {:?}", colony, plan.stage);
        }
        Some(SchedulerReport {
            colony,
            stage: plan.stage,
            demand,
            production,
        })
    }

    /// Rebuild each colony's extension grouping when it is stale.
    pub fn refresh_groups(&mut self) {
        let now = self.memory.tick;
        for colony in self.snapshot.colony_ids() {
            let extensions: Vec<(NodeId, Position)> = self
                .snapshot
                .colony_nodes(colony)
                .into_iter()
                .filter(|(n, _)| n.kind == NodeKind::Extension)
                .map(|(n, pos)| (n.id, pos))
                .collect();
            let index = self.groups.entry(colony).or_insert_with(|| {
                GroupIndex::new(self.config.group_cell_size, self.config.group_ttl)
            });
            if index.refresh(now, &extensions) {
                log::debug!("{} regrouped {} extensions", colony, extensions.len());
            }
        }
    }

    pub fn groups(&self, colony: ColonyId) -> Option<&GroupIndex> {
        self.groups.get(&colony)
    }

    /// Run one worker's decision procedure.
    pub fn run_worker_tick(&mut self, worker: WorkerId) -> WorkerStep {
        let mut ctx = WorkerContext {
            snapshot: &mut self.snapshot,
            registry: &mut self.memory.registry,
            groups: &self.groups,
            movement: self.movement.as_mut(),
            config: &self.config,
            now: self.memory.tick,
        };
        crate::worker::run_worker_tick(&mut ctx, worker)
    }

    // ── Persistence ─────────────────────────────────────────────────────

    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        save_memory(writer, &self.memory)
    }

    /// Replace the core memory with a saved one. The world is left as is.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), SaveError> {
        self.memory = load_memory(reader)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Colony;
    use overseer_logic::resources::ResourceType;
    use overseer_logic::task::TaskKind;

    fn engine_with_colony() -> (OverseerEngine, ColonyId) {
        let mut engine = OverseerEngine::default();
        let colony = engine
            .snapshot
            .add_colony(Colony::new(ColonyId(0), "home", Position::new(25, 25)));
        engine
            .snapshot
            .spawn_node(NodeKind::Spawner, colony, Position::new(25, 27));
        engine
            .snapshot
            .spawn_node(NodeKind::Source, colony, Position::new(10, 10));
        (engine, colony)
    }

    #[test]
    fn test_tick_advances_clock() {
        let (mut engine, _) = engine_with_colony();
        let report = engine.tick();
        assert_eq!(report.tick, 0);
        assert_eq!(engine.now(), 1);
    }

    #[test]
    fn test_fleet_targets_are_idempotent() {
        let (engine, colony) = engine_with_colony();
        assert_eq!(engine.fleet_targets(colony), engine.fleet_targets(colony));
        assert!(engine.fleet_targets(ColonyId(9)).is_none());
    }

    #[test]
    fn test_enqueue_unknown_colony() {
        let (mut engine, colony) = engine_with_colony();
        assert!(engine
            .enqueue_production(ColonyId(5), Role::Defender, 0, InitialState::new())
            .is_none());
        assert_eq!(
            engine.enqueue_production(colony, Role::Defender, 0, InitialState::new()),
            Some(0)
        );
    }

    #[test]
    fn test_save_load_restores_registry() {
        let (mut engine, colony) = engine_with_colony();
        let node = engine.snapshot.colony_nodes(colony)[0].0.id;
        let id = engine
            .request_task(TaskRequest {
                target: node,
                kind: TaskKind::Load,
                resource: ResourceType::Energy,
                amount: 100,
                priority: 5,
            })
            .unwrap()
            .id();

        let mut buffer = Vec::new();
        engine.save(&mut buffer).unwrap();
        engine.complete_task(id);
        assert!(engine.memory.registry.is_empty());

        engine.load(buffer.as_slice()).unwrap();
        assert_eq!(engine.memory.registry.get(id).map(|t| t.amount), Some(100));
    }

    #[test]
    fn test_gc_logs_and_removes_vanished_target() {
        let (mut engine, colony) = engine_with_colony();
        let node = engine.snapshot.colony_nodes(colony)[1].0.id;
        engine
            .request_task(TaskRequest {
                target: node,
                kind: TaskKind::Unload,
                resource: ResourceType::Energy,
                amount: 50,
                priority: 20,
            })
            .unwrap();
        engine.snapshot.despawn_node(node);

        let collected = engine.garbage_collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].1, Expiry::TargetGone);
        assert!(engine.memory.registry.is_empty());
    }
}
