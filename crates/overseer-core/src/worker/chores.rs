//! Task-free routines: refilling production buffers, gathering energy for
//! the controller and construction, static mining and parking.

use overseer_logic::allocator::{pick_grouped_target, pick_target, Candidate, Commitment, FillCategory};
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, Position, ResourceType, WorkerId};
use overseer_logic::roles::Role;

use super::{approach, deposit, pick_node, set_mode, withdraw, WorkerContext, WorkerStep};
use crate::components::{ResourceNode, WorkerMode};

/// Kinds a gatherer may take stored energy from before harvesting.
const STORED_ENERGY: &[NodeKind] = &[NodeKind::Storage, NodeKind::Container];

/// Tiles between a miner and the container it drops into.
const MINER_DROP_RANGE: u32 = 2;

/// Energy spent per work rate point on construction or the controller.
const SPEND_PER_WORK: u32 = 2;

/// Spawners, extensions and towers that want energy, with their urgency.
fn refill_candidates(
    ctx: &WorkerContext<'_>,
    colony: ColonyId,
    nodes: &[(ResourceNode, Position)],
) -> Vec<Candidate> {
    let under_attack = ctx
        .snapshot
        .colony(colony)
        .is_some_and(|c| c.under_attack);
    nodes
        .iter()
        .filter(|(node, _)| node.kind.is_refill_target() && node.energy_deficit() > 0)
        .filter_map(|(node, pos)| {
            let category = match node.kind {
                NodeKind::Tower if under_attack => FillCategory::Emergency,
                NodeKind::Tower
                    if node.fill_ratio(ResourceType::Energy) < ctx.config.tower_refill_ratio =>
                {
                    FillCategory::Routine
                }
                NodeKind::Tower => return None,
                _ => FillCategory::Production,
            };
            Some(Candidate {
                node: node.id,
                position: *pos,
                category,
                deficit: node.energy_deficit(),
            })
        })
        .collect()
}

/// Energy other workers of the colony are carrying toward their targets.
fn commitments(ctx: &WorkerContext<'_>, colony: ColonyId) -> Vec<Commitment> {
    ctx.snapshot
        .colony_workers(colony)
        .into_iter()
        .filter_map(|(w, _)| {
            let target = w.target?;
            let carrying = w.carrying(ResourceType::Energy);
            (carrying > 0).then_some(Commitment {
                worker: w.id,
                target,
                carrying,
            })
        })
        .collect()
}

/// Keep spawners, extensions and towers topped up. An empty worker fetches
/// energy from `sources` first. Returns `None` when there is nothing the
/// worker can usefully refill.
pub(super) fn refill(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    sources: &[NodeKind],
) -> Option<WorkerStep> {
    let (worker, pos) = ctx.snapshot.worker(id)?;
    let nodes = ctx.snapshot.colony_nodes(worker.colony);
    let candidates = refill_candidates(ctx, worker.colony, &nodes);
    let commitments = commitments(ctx, worker.colony);

    let carrying = worker.carrying(ResourceType::Energy);
    if carrying == 0 {
        if sources.is_empty() || pick_target(id, pos, &candidates, &commitments).is_none() {
            return None;
        }
        let source = pick_node(&nodes, pos, sources, |n| {
            !n.kind.is_refill_target() && n.energy() > 0
        })?;
        return Some(match approach(ctx, id, source)? {
            true => WorkerStep::Withdrew {
                node: source,
                amount: withdraw(ctx, id, source, ResourceType::Energy, u32::MAX),
            },
            false => WorkerStep::Moving { toward: source },
        });
    }

    let target = match ctx.groups.get(&worker.colony) {
        Some(groups) => pick_grouped_target(id, pos, &candidates, &commitments, groups),
        None => pick_target(id, pos, &candidates, &commitments),
    }?;
    Some(match approach(ctx, id, target)? {
        true => WorkerStep::Deposited {
            node: target,
            amount: deposit(ctx, id, target, ResourceType::Energy, carrying),
        },
        false => WorkerStep::Moving { toward: target },
    })
}

/// Harvester, upgrader and builder loop: fill up with energy, then spend it.
pub(super) fn gather(ctx: &mut WorkerContext<'_>, id: WorkerId) -> WorkerStep {
    let Some((worker, _)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    if worker.body.capacity == 0 {
        return park(ctx, id);
    }

    let carrying = worker.carrying(ResourceType::Energy);
    let mode = match worker.mode {
        WorkerMode::Delivering if carrying == 0 => WorkerMode::Collecting,
        WorkerMode::Idle | WorkerMode::Collecting if worker.is_full() => WorkerMode::Delivering,
        WorkerMode::Idle => WorkerMode::Collecting,
        mode => mode,
    };
    if mode != worker.mode {
        set_mode(ctx, id, mode);
    }

    match mode {
        WorkerMode::Delivering => spend(ctx, id, worker.role),
        WorkerMode::Idle | WorkerMode::Collecting => collect_energy(ctx, id, worker.role),
    }
}

fn collect_energy(ctx: &mut WorkerContext<'_>, id: WorkerId, role: Role) -> WorkerStep {
    let Some((worker, pos)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    let nodes = ctx.snapshot.colony_nodes(worker.colony);

    if !role.is_primary_gatherer() {
        if let Some(store) = pick_node(&nodes, pos, STORED_ENERGY, |n| n.energy() > 0) {
            return match approach(ctx, id, store) {
                Some(true) => {
                    let amount = withdraw(ctx, id, store, ResourceType::Energy, u32::MAX);
                    set_mode(ctx, id, WorkerMode::Delivering);
                    WorkerStep::Withdrew { node: store, amount }
                }
                Some(false) => WorkerStep::Moving { toward: store },
                None => park(ctx, id),
            };
        }
    }

    let Some(source) = pick_node(&nodes, pos, &[NodeKind::Source], |n| n.energy() > 0) else {
        if worker.carrying(ResourceType::Energy) > 0 {
            set_mode(ctx, id, WorkerMode::Delivering);
            return spend(ctx, id, role);
        }
        return park(ctx, id);
    };
    match approach(ctx, id, source) {
        Some(true) => harvest(ctx, id, source, worker.body.work_rate),
        Some(false) => WorkerStep::Moving { toward: source },
        None => park(ctx, id),
    }
}

fn harvest(ctx: &mut WorkerContext<'_>, id: WorkerId, source: NodeId, rate: u32) -> WorkerStep {
    let amount = withdraw(ctx, id, source, ResourceType::Energy, rate.max(1));
    if ctx.snapshot.worker(id).is_some_and(|(w, _)| w.is_full()) {
        set_mode(ctx, id, WorkerMode::Delivering);
    }
    WorkerStep::Harvested {
        node: source,
        amount,
    }
}

/// Put carried energy to use: harvesters refill first, builders build,
/// everyone falls back to the controller.
fn spend(ctx: &mut WorkerContext<'_>, id: WorkerId, role: Role) -> WorkerStep {
    if role.refills() {
        if let Some(step) = refill(ctx, id, &[]) {
            return step;
        }
    }
    let Some((worker, pos)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    let nodes = ctx.snapshot.colony_nodes(worker.colony);
    let kinds: &[NodeKind] = match role {
        Role::Upgrader => &[NodeKind::Controller],
        _ => &[NodeKind::ConstructionSite, NodeKind::Controller],
    };
    let Some(sink) = pick_node(&nodes, pos, kinds, |n| n.energy_deficit() > 0) else {
        return park(ctx, id);
    };
    match approach(ctx, id, sink) {
        Some(true) => {
            let rate = worker.body.work_rate.max(1) * SPEND_PER_WORK;
            let amount = deposit(ctx, id, sink, ResourceType::Energy, rate);
            WorkerStep::Deposited { node: sink, amount }
        }
        Some(false) => WorkerStep::Moving { toward: sink },
        None => park(ctx, id),
    }
}

/// Static miner: claim a source no other miner works, harvest it, and drop
/// the output into a nearby container.
pub(super) fn mine(ctx: &mut WorkerContext<'_>, id: WorkerId) -> WorkerStep {
    let Some((worker, pos)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    let nodes = ctx.snapshot.colony_nodes(worker.colony);

    let current = worker
        .target
        .filter(|t| nodes.iter().any(|(n, _)| n.id == *t && n.kind == NodeKind::Source));
    let source = current.or_else(|| {
        let taken: Vec<NodeId> = ctx
            .snapshot
            .colony_workers(worker.colony)
            .into_iter()
            .filter(|(w, _)| w.id != id && w.role == Role::Miner)
            .filter_map(|(w, _)| w.target)
            .collect();
        pick_node(&nodes, pos, &[NodeKind::Source], |n| !taken.contains(&n.id))
    });
    let Some(source) = source else {
        return park(ctx, id);
    };

    match approach(ctx, id, source) {
        Some(true) => {}
        Some(false) => return WorkerStep::Moving { toward: source },
        None => return park(ctx, id),
    }

    if worker.is_full() {
        let Some(pos) = ctx.snapshot.worker(id).map(|(_, p)| p) else {
            return WorkerStep::Missing;
        };
        let container = nodes
            .iter()
            .filter(|(n, p)| {
                n.kind == NodeKind::Container
                    && pos.in_range(p, MINER_DROP_RANGE)
                    && n.store.free_for(ResourceType::Energy) > 0
            })
            .map(|(n, p)| (pos.range_to(p), n.id))
            .min()
            .map(|(_, id)| id);
        return match container {
            Some(container) => WorkerStep::Deposited {
                node: container,
                amount: deposit(ctx, id, container, ResourceType::Energy, u32::MAX),
            },
            // Nowhere to drop; wait at the source.
            None => WorkerStep::Parked,
        };
    }
    harvest(ctx, id, source, worker.body.work_rate)
}

/// Wait at the colony's rally point with no declared target.
pub(super) fn park(ctx: &mut WorkerContext<'_>, id: WorkerId) -> WorkerStep {
    let Some((worker, from)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    let rally = ctx
        .snapshot
        .colony(worker.colony)
        .map(|c| c.rally_point)
        .unwrap_or(from);
    let outcome = ctx.movement.advance(id, from, rally, ctx.config.interaction_range);
    ctx.snapshot.with_worker_mut(id, |w, pos| {
        *pos = outcome.position;
        w.target = None;
    });
    WorkerStep::Parked
}
