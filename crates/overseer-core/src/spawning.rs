//! Production queue consumer and fleet fall-through.
//!
//! Once per colony per tick: if a spawner is idle, the lowest-priority-value
//! queued request is attempted first. Only an empty queue lets the fleet
//! plan pick the role, except in a starving colony that cannot afford the
//! queued body: the plan's gatherer goes first and the request stays queued.
//! At most one worker is produced per colony per tick.

use hecs::Entity;

use overseer_logic::config::OverseerConfig;
use overseer_logic::fleet::{next_to_produce, plan_fleet, ColonyCensus, FleetPlan, Stage};
use overseer_logic::production::{InitialState, ProductionQueue};
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, ResourceType, WorkerId};
use overseer_logic::roles::{BodyPlan, Role};
use overseer_logic::task::TaskRegistry;

use crate::components::{ResourceNode, Spawner, Worker};
use crate::snapshot::Snapshot;

/// Why the production capability refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every spawner is still working on a previous body.
    Busy,
    /// Energy will come back; try again later.
    NotEnoughEnergy { needed: u32, available: u32 },
    /// The colony has nothing for this role to do.
    InvalidRole(Role),
    /// Even the smallest body costs more than the colony can ever hold.
    ExceedsCapacity { needed: u32, capacity: u32 },
}

impl SpawnError {
    /// Whether retrying on a later tick can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SpawnError::Busy | SpawnError::NotEnoughEnergy { .. })
    }
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnError::Busy => write!(f, "no idle spawner"),
            SpawnError::NotEnoughEnergy { needed, available } => {
                write!(f, "not enough energy: need {}, have {}", needed, available)
            }
            SpawnError::InvalidRole(role) => write!(f, "no work for role {}", role),
            SpawnError::ExceedsCapacity { needed, capacity } => {
                write!(
                    f,
                    "body costs {} but production capacity is {}",
                    needed, capacity
                )
            }
        }
    }
}

impl std::error::Error for SpawnError {}

/// What the consumer did for a colony this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductionOutcome {
    /// No idle spawner; nothing was touched.
    Busy,
    Produced {
        worker: WorkerId,
        role: Role,
        from_queue: bool,
    },
    /// Not enough energy yet; the request stays where it was.
    Waiting { role: Role, from_queue: bool },
    /// A queued request failed for good and was removed.
    Dropped { seq: u64, role: Role, error: SpawnError },
    /// Plan production failed in a way retrying next tick may not fix.
    Blocked { role: Role, error: SpawnError },
    /// Every role is at or above target.
    Satisfied,
}

/// Energy available to production right now, and the most it can hold.
pub fn production_energy(snapshot: &Snapshot, colony: ColonyId) -> (u32, u32) {
    snapshot
        .colony_nodes(colony)
        .iter()
        .filter(|(n, _)| matches!(n.kind, NodeKind::Spawner | NodeKind::Extension))
        .fold((0, 0), |(available, capacity), (n, _)| {
            (
                available + n.energy(),
                capacity + n.store.capacity_for(ResourceType::Energy),
            )
        })
}

/// Observable colony state for the fleet planner.
pub fn take_census(
    snapshot: &Snapshot,
    registry: &TaskRegistry,
    colony: ColonyId,
    now: u64,
) -> Option<ColonyCensus> {
    let info = snapshot.colony(colony)?;
    let nodes = snapshot.colony_nodes(colony);

    let mut census = ColonyCensus {
        controller_level: info.controller_level,
        under_attack: info.under_attack,
        population: snapshot.population(colony),
        ..Default::default()
    };
    for (node, _) in &nodes {
        *census.node_counts.entry(node.kind).or_insert(0) += 1;
        match node.kind {
            NodeKind::Tower => {
                census.tower_energy += node.energy();
                census.tower_capacity += node.store.capacity_for(ResourceType::Energy);
            }
            NodeKind::ConstructionSite if node.energy_deficit() > 0 => {
                census.construction_backlog += 1;
            }
            _ => {}
        }
    }
    census.open_tasks = registry
        .iter()
        .filter(|t| !t.is_expired(now) && nodes.iter().any(|(n, _)| n.id == t.target))
        .count() as u32;
    Some(census)
}

/// First idle spawner of the colony, lowest id first.
fn idle_spawner(snapshot: &Snapshot, colony: ColonyId, now: u64) -> Option<(NodeId, Entity)> {
    let mut idle: Vec<(NodeId, Entity)> = snapshot
        .world
        .query::<(&ResourceNode, &Spawner)>()
        .iter()
        .filter(|(_, (node, spawner))| node.colony == colony && spawner.is_idle(now))
        .map(|(entity, (node, _))| (node.id, entity))
        .collect();
    idle.sort_by_key(|(id, _)| *id);
    idle.into_iter().next()
}

pub fn has_idle_spawner(snapshot: &Snapshot, colony: ColonyId, now: u64) -> bool {
    idle_spawner(snapshot, colony, now).is_some()
}

/// Body to build for `role`. A starving colony gets the cheapest gatherer so
/// it can always restart.
pub fn choose_body(role: Role, stage: Stage, starving: bool, energy_capacity: u32) -> BodyPlan {
    if starving && role.is_primary_gatherer() {
        return role.body(Stage::Outpost);
    }
    role.affordable_body(stage, energy_capacity)
        .unwrap_or_else(|| role.body(Stage::Outpost))
}

/// Produce one worker at the colony's first idle spawner, paying from
/// spawners first, then extensions.
pub fn produce(
    snapshot: &mut Snapshot,
    colony: ColonyId,
    role: Role,
    body: BodyPlan,
    initial_state: InitialState,
    now: u64,
) -> Result<WorkerId, SpawnError> {
    let (spawner, entity) = idle_spawner(snapshot, colony, now).ok_or(SpawnError::Busy)?;
    let (available, capacity) = production_energy(snapshot, colony);
    if body.cost > capacity {
        return Err(SpawnError::ExceedsCapacity {
            needed: body.cost,
            capacity,
        });
    }
    if body.cost > available {
        return Err(SpawnError::NotEnoughEnergy {
            needed: body.cost,
            available,
        });
    }

    let mut payers: Vec<(NodeKind, NodeId)> = snapshot
        .colony_nodes(colony)
        .iter()
        .filter(|(n, _)| matches!(n.kind, NodeKind::Spawner | NodeKind::Extension))
        .map(|(n, _)| (n.kind, n.id))
        .collect();
    payers.sort();
    let mut owed = body.cost;
    for (_, payer) in payers {
        if owed == 0 {
            break;
        }
        let paid = snapshot
            .with_node_mut(payer, |n| n.store.take(ResourceType::Energy, owed))
            .unwrap_or(0);
        owed -= paid;
    }

    if let Ok(mut capability) = snapshot.world.get::<&mut Spawner>(entity) {
        capability.busy_until = now + u64::from(body.spawn_ticks);
    }
    let position = snapshot
        .node(spawner)
        .map(|(_, pos)| pos)
        .unwrap_or_default();
    let worker = snapshot.spawn_worker(position, |id| {
        Worker::new(id, role, colony, body).with_state(initial_state)
    });
    log::info!(
        "{} produced {} ({}) at {} for {} energy",
        colony,
        worker,
        role,
        spawner,
        body.cost
    );
    Ok(worker)
}

fn validate_role(role: Role, census: &ColonyCensus) -> Result<(), SpawnError> {
    match role.serviced_node() {
        Some(kind) if census.nodes_of(kind) == 0 => Err(SpawnError::InvalidRole(role)),
        _ => Ok(()),
    }
}

/// Run the consumer for one colony. Returns the plan it used alongside the
/// outcome so callers can report stage changes.
pub fn run_production(
    snapshot: &mut Snapshot,
    registry: &TaskRegistry,
    queue: &mut ProductionQueue,
    colony: ColonyId,
    config: &OverseerConfig,
    now: u64,
) -> Option<(FleetPlan, ProductionOutcome)> {
    let census = take_census(snapshot, registry, colony, now)?;
    let plan = plan_fleet(&census, config);
    if !has_idle_spawner(snapshot, colony, now) {
        return Some((plan, ProductionOutcome::Busy));
    }
    let (_, capacity) = production_energy(snapshot, colony);

    if let Some(entry) = queue.peek().cloned() {
        let body = choose_body(entry.role, plan.stage, plan.starving, capacity);
        let attempt = validate_role(entry.role, &census).and_then(|_| {
            produce(snapshot, colony, entry.role, body, entry.initial_state.clone(), now)
        });
        let outcome = match attempt {
            Ok(worker) => {
                queue.remove(entry.seq);
                ProductionOutcome::Produced {
                    worker,
                    role: entry.role,
                    from_queue: true,
                }
            }
            // A starving colony cannot save up for the queued body; let the
            // fleet plan restart income first and keep the request.
            Err(SpawnError::NotEnoughEnergy { .. })
                if plan.starving && !entry.role.is_primary_gatherer() =>
            {
                log::debug!(
                    "{} starving, request {} ({}) waits behind the gatherer",
                    colony,
                    entry.seq,
                    entry.role
                );
                let outcome = produce_from_plan(snapshot, &plan, &census, colony, capacity, now);
                return Some((plan, outcome));
            }
            Err(error) if error.is_recoverable() => ProductionOutcome::Waiting {
                role: entry.role,
                from_queue: true,
            },
            Err(error) => {
                log::warn!(
                    "{} dropped queued {} (request {}): {}",
                    colony,
                    entry.role,
                    entry.seq,
                    error
                );
                queue.remove(entry.seq);
                ProductionOutcome::Dropped {
                    seq: entry.seq,
                    role: entry.role,
                    error,
                }
            }
        };
        return Some((plan, outcome));
    }

    let outcome = produce_from_plan(snapshot, &plan, &census, colony, capacity, now);
    Some((plan, outcome))
}

/// Produce the first role in plan order that is below target.
fn produce_from_plan(
    snapshot: &mut Snapshot,
    plan: &FleetPlan,
    census: &ColonyCensus,
    colony: ColonyId,
    capacity: u32,
    now: u64,
) -> ProductionOutcome {
    let Some(role) = next_to_produce(plan, census) else {
        return ProductionOutcome::Satisfied;
    };
    let body = choose_body(role, plan.stage, plan.starving, capacity);
    match produce(snapshot, colony, role, body, InitialState::new(), now) {
        Ok(worker) => ProductionOutcome::Produced {
            worker,
            role,
            from_queue: false,
        },
        Err(error) if error.is_recoverable() => ProductionOutcome::Waiting {
            role,
            from_queue: false,
        },
        Err(error) => {
            log::debug!("{} cannot produce {}: {}", colony, role, error);
            ProductionOutcome::Blocked { role, error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Colony, Position};

    fn outpost() -> (Snapshot, ColonyId, NodeId) {
        let mut snapshot = Snapshot::new();
        let colony = snapshot.add_colony(Colony::new(ColonyId(0), "home", Position::new(10, 10)));
        let spawner = snapshot.spawn_node(NodeKind::Spawner, colony, Position::new(10, 12));
        snapshot.spawn_node(NodeKind::Source, colony, Position::new(2, 2));
        (snapshot, colony, spawner)
    }

    fn fill(snapshot: &mut Snapshot, node: NodeId, amount: u32) {
        snapshot.with_node_mut(node, |n| n.store.add(ResourceType::Energy, amount));
    }

    #[test]
    fn test_cost_drawn_from_spawners_then_extensions() {
        let (mut snapshot, colony, spawner) = outpost();
        let ext = snapshot.spawn_node(NodeKind::Extension, colony, Position::new(11, 12));
        fill(&mut snapshot, spawner, 100);
        fill(&mut snapshot, ext, 50);

        let body = BodyPlan::from_parts(1, 0, 1);
        assert_eq!(body.cost, 150);
        produce(&mut snapshot, colony, Role::Upgrader, body, InitialState::new(), 0).unwrap();

        assert_eq!(snapshot.node(spawner).unwrap().0.energy(), 0);
        assert_eq!(snapshot.node(ext).unwrap().0.energy(), 0);
    }

    #[test]
    fn test_spawner_busy_after_producing() {
        let (mut snapshot, colony, spawner) = outpost();
        fill(&mut snapshot, spawner, 300);
        let body = BodyPlan::from_parts(1, 1, 1);
        produce(&mut snapshot, colony, Role::Harvester, body, InitialState::new(), 5).unwrap();

        let again = produce(&mut snapshot, colony, Role::Harvester, body, InitialState::new(), 6);
        assert_eq!(again, Err(SpawnError::Busy));
        fill(&mut snapshot, spawner, 200);
        let later = 5 + u64::from(body.spawn_ticks);
        assert!(produce(&mut snapshot, colony, Role::Harvester, body, InitialState::new(), later)
            .is_ok());
    }

    #[test]
    fn test_queue_waits_on_energy() {
        let (mut snapshot, colony, _) = outpost();
        let registry = TaskRegistry::new();
        let mut queue = ProductionQueue::new();
        queue.enqueue(Role::Defender, 0, InitialState::new(), 0);

        let (_, outcome) = run_production(
            &mut snapshot,
            &registry,
            &mut queue,
            colony,
            &OverseerConfig::default(),
            0,
        )
        .unwrap();
        assert_eq!(
            outcome,
            ProductionOutcome::Waiting {
                role: Role::Defender,
                from_queue: true
            }
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_drops_invalid_role() {
        let (mut snapshot, colony, spawner) = outpost();
        fill(&mut snapshot, spawner, 300);
        let registry = TaskRegistry::new();
        let mut queue = ProductionQueue::new();
        // No lab in the colony.
        queue.enqueue(Role::LabTender, 0, InitialState::new(), 0);

        let (_, outcome) = run_production(
            &mut snapshot,
            &registry,
            &mut queue,
            colony,
            &OverseerConfig::default(),
            0,
        )
        .unwrap();
        assert!(matches!(
            outcome,
            ProductionOutcome::Dropped {
                error: SpawnError::InvalidRole(Role::LabTender),
                ..
            }
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_copies_initial_state() {
        let (mut snapshot, colony, spawner) = outpost();
        fill(&mut snapshot, spawner, 300);
        let registry = TaskRegistry::new();
        let mut queue = ProductionQueue::new();
        let mut state = InitialState::new();
        state.insert("squad".to_string(), "north".to_string());
        queue.enqueue(Role::Defender, 0, state.clone(), 0);

        let (_, outcome) = run_production(
            &mut snapshot,
            &registry,
            &mut queue,
            colony,
            &OverseerConfig::default(),
            0,
        )
        .unwrap();
        let ProductionOutcome::Produced { worker, from_queue, .. } = outcome else {
            panic!("expected production, got {:?}", outcome);
        };
        assert!(from_queue);
        assert_eq!(snapshot.worker(worker).unwrap().0.initial_state, state);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_busy_spawner_touches_nothing() {
        let (mut snapshot, colony, spawner) = outpost();
        fill(&mut snapshot, spawner, 300);
        let entity = snapshot.node_entity(spawner).unwrap();
        snapshot.world.get::<&mut Spawner>(entity).unwrap().busy_until = 10;
        let registry = TaskRegistry::new();
        let mut queue = ProductionQueue::new();
        queue.enqueue(Role::LabTender, 0, InitialState::new(), 0);

        let (_, outcome) = run_production(
            &mut snapshot,
            &registry,
            &mut queue,
            colony,
            &OverseerConfig::default(),
            3,
        )
        .unwrap();
        assert_eq!(outcome, ProductionOutcome::Busy);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_starving_colony_gets_cheapest_harvester() {
        let (mut snapshot, colony, spawner) = outpost();
        fill(&mut snapshot, spawner, 200);
        let registry = TaskRegistry::new();
        let mut queue = ProductionQueue::new();

        let (plan, outcome) = run_production(
            &mut snapshot,
            &registry,
            &mut queue,
            colony,
            &OverseerConfig::default(),
            0,
        )
        .unwrap();
        assert!(plan.starving);
        let ProductionOutcome::Produced { worker, role, .. } = outcome else {
            panic!("expected production, got {:?}", outcome);
        };
        assert_eq!(role, Role::Harvester);
        assert_eq!(
            snapshot.worker(worker).unwrap().0.body,
            Role::Harvester.body(Stage::Outpost)
        );
    }
}
