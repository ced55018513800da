//! Task-driven collect/deliver loop shared by haulers, lab tenders and
//! couriers.
//!
//! ```text
//! Idle ──claim──▶ Collecting ──full / source empty──▶ Delivering
//!   ▲                                                   │
//!   └──── task done / worker empty / task invalidated ◀─┘
//! ```
//!
//! A worker that empties before the task is done releases the claim rather
//! than keeping it, so higher-priority work created meanwhile can take over
//! between trips.

use overseer_logic::resources::{NodeId, Position, ResourceType, WorkerId};
use overseer_logic::roles::LogisticsProfile;
use overseer_logic::task::{Task, TaskKind};

use super::{approach, chores, deposit, pick_node, set_mode, withdraw, WorkerContext, WorkerStep};
use crate::components::{ResourceNode, TaskMemory, Worker, WorkerMode};

/// Why a worker let go of its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Task, target or assignment disappeared or changed hands.
    Invalidated,
    /// Nothing left to pick up; the source may refill later.
    SourceEmpty,
    /// No drop-off with room for the cargo.
    NoSink,
    /// Drop-off full and the reroute budget is spent.
    DestinationFull,
    /// Delivered everything carried but the task wants more.
    WorkerEmpty,
}

pub(super) fn run(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    profile: &LogisticsProfile,
) -> WorkerStep {
    let Some((worker, _)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };

    match worker.task {
        Some(memory) if !still_valid(ctx, id, &memory) => {
            ctx.registry.release(memory.task, id);
            ctx.snapshot.with_worker_mut(id, |w, _| w.reset());
            log::debug!("{} dropped stale {}", id, memory.task);
            WorkerStep::Released {
                task: memory.task,
                reason: ReleaseReason::Invalidated,
            }
        }
        Some(memory) => match worker.mode {
            WorkerMode::Delivering => {
                let reroutes = ctx.config.reroutes_per_tick;
                deliver(ctx, id, profile, memory, reroutes)
            }
            WorkerMode::Idle | WorkerMode::Collecting => collect(ctx, id, profile, memory),
        },
        None => idle(ctx, id, profile, &worker),
    }
}

fn still_valid(ctx: &WorkerContext<'_>, id: WorkerId, memory: &TaskMemory) -> bool {
    let Some(task) = ctx.registry.get(memory.task) else {
        return false;
    };
    task.assignee == Some(id)
        && ctx.snapshot.node_exists(memory.target)
        && match memory.kind {
            TaskKind::Transfer { to } => ctx.snapshot.node_exists(to),
            TaskKind::Load | TaskKind::Unload => true,
        }
}

/// Whether a worker could make progress on `task` right now. Keeps idle
/// workers from claiming work whose pickup is empty or whose cargo has
/// nowhere to go.
fn feasible(
    task: &Task,
    nodes: &[(ResourceNode, Position)],
    profile: &LogisticsProfile,
    carrying: Option<ResourceType>,
) -> bool {
    let node = |id: NodeId| nodes.iter().map(|(n, _)| n).find(|n| n.id == id);
    let Some(target) = node(task.target) else {
        return false;
    };
    if !profile.accepts(task.kind.tag(), target.kind) {
        return false;
    }
    if let Some(resource) = carrying {
        // A loaded worker only takes work its cargo can go toward.
        return resource == task.resource && !matches!(task.kind, TaskKind::Unload);
    }
    match task.kind {
        TaskKind::Load => nodes.iter().any(|(n, _)| {
            n.id != task.target && profile.sources.contains(&n.kind) && n.store.get(task.resource) > 0
        }),
        TaskKind::Unload => {
            target.store.get(task.resource) > 0
                && nodes.iter().any(|(n, _)| {
                    n.id != task.target
                        && profile.sinks.contains(&n.kind)
                        && n.store.free_for(task.resource) > 0
                })
        }
        TaskKind::Transfer { to } => {
            target.store.get(task.resource) > 0
                && node(to).is_some_and(|dest| dest.store.free_for(task.resource) > 0)
        }
    }
}

fn idle(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    profile: &LogisticsProfile,
    worker: &Worker,
) -> WorkerStep {
    let nodes = ctx.snapshot.colony_nodes(worker.colony);
    let carrying = worker.carried.first_resource();

    let claimed = ctx.registry.claim_next(id, ctx.now, |task| {
        feasible(task, &nodes, profile, carrying)
    });

    let Some(task_id) = claimed else {
        return match carrying {
            Some(resource) => drain(ctx, id, profile, resource),
            None if worker.role.refills() => {
                chores::refill(ctx, id, profile.sources).unwrap_or_else(|| chores::park(ctx, id))
            }
            None => chores::park(ctx, id),
        };
    };

    let Some(task) = ctx.registry.get(task_id) else {
        return WorkerStep::Missing;
    };
    let memory = TaskMemory::from_task(task);
    let mode = if carrying == Some(task.resource) {
        WorkerMode::Delivering
    } else {
        WorkerMode::Collecting
    };
    log::debug!(
        "{} ({}) claimed {} {:?} {:?} x{} at {}",
        id,
        worker.role,
        task.id,
        task.kind,
        task.resource,
        task.amount,
        task.target
    );
    ctx.snapshot.with_worker_mut(id, |w, _| {
        w.task = Some(memory);
        w.mode = mode;
    });

    // Start on the task right away rather than idling a tick.
    let reroutes = ctx.config.reroutes_per_tick;
    match mode {
        WorkerMode::Delivering => deliver(ctx, id, profile, memory, reroutes),
        WorkerMode::Idle | WorkerMode::Collecting => collect(ctx, id, profile, memory),
    };
    WorkerStep::Claimed(task_id)
}

/// Leftover cargo with no task: energy goes to refill targets when the role
/// refills, everything else to the nearest sink.
fn drain(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    profile: &LogisticsProfile,
    resource: ResourceType,
) -> WorkerStep {
    let Some((worker, pos)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    if resource == ResourceType::Energy && worker.role.refills() {
        if let Some(step) = chores::refill(ctx, id, profile.sources) {
            return step;
        }
    }
    let nodes = ctx.snapshot.colony_nodes(worker.colony);
    let Some(sink) = pick_node(&nodes, pos, profile.sinks, |n| n.store.free_for(resource) > 0)
    else {
        return chores::park(ctx, id);
    };
    match approach(ctx, id, sink) {
        Some(true) => {
            let amount = deposit(ctx, id, sink, resource, u32::MAX);
            WorkerStep::Deposited { node: sink, amount }
        }
        Some(false) => WorkerStep::Moving { toward: sink },
        None => chores::park(ctx, id),
    }
}

fn collect(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    profile: &LogisticsProfile,
    mut memory: TaskMemory,
) -> WorkerStep {
    let Some((worker, pos)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    let Some(remaining) = ctx.registry.get(memory.task).map(|t| t.amount) else {
        return give_up(ctx, id, &memory, ReleaseReason::Invalidated);
    };
    let resource = memory.resource;

    let pickup = match memory.kind {
        TaskKind::Load => {
            let nodes = ctx.snapshot.colony_nodes(worker.colony);
            let remembered = memory.pickup.filter(|p| {
                nodes
                    .iter()
                    .any(|(n, _)| n.id == *p && n.store.get(resource) > 0)
            });
            remembered.or_else(|| {
                pick_node(&nodes, pos, profile.sources, |n| {
                    n.id != memory.target && n.store.get(resource) > 0
                })
            })
        }
        TaskKind::Unload | TaskKind::Transfer { .. } => Some(memory.target),
    };
    let Some(pickup) = pickup else {
        return give_up(ctx, id, &memory, ReleaseReason::SourceEmpty);
    };
    if memory.pickup != Some(pickup) {
        memory.pickup = Some(pickup);
        ctx.snapshot.with_worker_mut(id, |w, _| w.task = Some(memory));
    }

    match approach(ctx, id, pickup) {
        None => return give_up(ctx, id, &memory, ReleaseReason::Invalidated),
        Some(false) => return WorkerStep::Moving { toward: pickup },
        Some(true) => {}
    }

    let carrying = worker.carrying(resource);
    let want = remaining.saturating_sub(carrying);
    if want == 0 {
        set_mode(ctx, id, WorkerMode::Delivering);
        let reroutes = ctx.config.reroutes_per_tick;
        return deliver(ctx, id, profile, memory, reroutes);
    }

    let taken = withdraw(ctx, id, pickup, resource, want);
    if taken == 0 {
        if carrying > 0 {
            // Source ran dry; take what is already aboard.
            set_mode(ctx, id, WorkerMode::Delivering);
            let reroutes = ctx.config.reroutes_per_tick;
            return deliver(ctx, id, profile, memory, reroutes);
        }
        return give_up(ctx, id, &memory, ReleaseReason::SourceEmpty);
    }

    let source_left = ctx
        .snapshot
        .node(pickup)
        .map(|(n, _)| n.store.get(resource))
        .unwrap_or(0);
    let loaded = ctx
        .snapshot
        .worker(id)
        .map(|(w, _)| (w.carrying(resource), w.carried.free_for(resource)));
    if let Some((now_carrying, free)) = loaded {
        if free == 0 || now_carrying >= remaining || source_left == 0 {
            set_mode(ctx, id, WorkerMode::Delivering);
        } else {
            set_mode(ctx, id, WorkerMode::Collecting);
        }
    }
    WorkerStep::Withdrew {
        node: pickup,
        amount: taken,
    }
}

fn sink_for(
    ctx: &WorkerContext<'_>,
    worker: &Worker,
    pos: Position,
    profile: &LogisticsProfile,
    resource: ResourceType,
    exclude: &[NodeId],
) -> Option<NodeId> {
    let nodes = ctx.snapshot.colony_nodes(worker.colony);
    pick_node(&nodes, pos, profile.sinks, |n| {
        !exclude.contains(&n.id) && n.store.free_for(resource) > 0
    })
}

fn deliver(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    profile: &LogisticsProfile,
    mut memory: TaskMemory,
    reroutes_left: u32,
) -> WorkerStep {
    let Some((worker, pos)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };
    let Some(remaining) = ctx.registry.get(memory.task).map(|t| t.amount) else {
        return give_up(ctx, id, &memory, ReleaseReason::Invalidated);
    };
    let resource = memory.resource;

    let dropoff = match memory.kind {
        TaskKind::Load => Some(memory.target),
        TaskKind::Transfer { to } => Some(to),
        // The drop-off stays fixed once chosen; finding it full on arrival
        // is what triggers a reroute.
        TaskKind::Unload => memory
            .dropoff
            .filter(|d| ctx.snapshot.node_exists(*d))
            .or_else(|| sink_for(ctx, &worker, pos, profile, resource, &[memory.target])),
    };
    let Some(dropoff) = dropoff else {
        return give_up(ctx, id, &memory, ReleaseReason::NoSink);
    };
    if matches!(memory.kind, TaskKind::Unload) && memory.dropoff != Some(dropoff) {
        memory.dropoff = Some(dropoff);
        ctx.snapshot.with_worker_mut(id, |w, _| w.task = Some(memory));
    }

    match approach(ctx, id, dropoff) {
        None => return give_up(ctx, id, &memory, ReleaseReason::Invalidated),
        Some(false) => return WorkerStep::Moving { toward: dropoff },
        Some(true) => {}
    }

    let carrying = worker.carrying(resource);
    if carrying == 0 {
        return give_up(ctx, id, &memory, ReleaseReason::WorkerEmpty);
    }

    let delivered = deposit(ctx, id, dropoff, resource, carrying.min(remaining));
    if delivered == 0 {
        return match memory.kind {
            TaskKind::Unload if reroutes_left > 0 => {
                let next = sink_for(ctx, &worker, pos, profile, resource, &[memory.target, dropoff]);
                match next {
                    Some(next) => {
                        log::debug!("{} rerouting {} from {} to {}", id, memory.task, dropoff, next);
                        memory.dropoff = Some(next);
                        ctx.snapshot.with_worker_mut(id, |w, _| w.task = Some(memory));
                        match deliver(ctx, id, profile, memory, reroutes_left - 1) {
                            WorkerStep::Moving { .. } => WorkerStep::Rerouted {
                                from: dropoff,
                                to: next,
                            },
                            step => step,
                        }
                    }
                    None => give_up(ctx, id, &memory, ReleaseReason::DestinationFull),
                }
            }
            TaskKind::Unload => give_up(ctx, id, &memory, ReleaseReason::DestinationFull),
            TaskKind::Load | TaskKind::Transfer { .. } => {
                // The fixed destination filled up from elsewhere; nothing
                // left for this task to do.
                finish(ctx, id, &memory)
            }
        };
    }

    match ctx.registry.record_delivery(memory.task, id, delivered) {
        Ok(0) => finish(ctx, id, &memory),
        Ok(_) => {
            let empty = ctx
                .snapshot
                .worker(id)
                .map(|(w, _)| w.carrying(resource) == 0)
                .unwrap_or(true);
            if empty {
                give_up(ctx, id, &memory, ReleaseReason::WorkerEmpty)
            } else {
                WorkerStep::Deposited {
                    node: dropoff,
                    amount: delivered,
                }
            }
        }
        Err(err) => {
            log::debug!("{} lost {}: {}", id, memory.task, err);
            ctx.snapshot.with_worker_mut(id, |w, _| w.reset());
            WorkerStep::Released {
                task: memory.task,
                reason: ReleaseReason::Invalidated,
            }
        }
    }
}

fn finish(ctx: &mut WorkerContext<'_>, id: WorkerId, memory: &TaskMemory) -> WorkerStep {
    if let Some(task) = ctx.registry.complete(memory.task) {
        log::info!(
            "{} completed by {} ({} of {:?} delivered to {})",
            task.id,
            id,
            task.delivered,
            task.resource,
            task.target
        );
    }
    ctx.snapshot.with_worker_mut(id, |w, _| w.reset());
    WorkerStep::Completed(memory.task)
}

/// Release the task, or complete it when nothing remains to be done, and
/// return the worker to idle.
fn give_up(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    memory: &TaskMemory,
    reason: ReleaseReason,
) -> WorkerStep {
    let done = ctx
        .registry
        .get(memory.task)
        .is_some_and(|t| t.amount == 0 && t.assignee == Some(id));
    if done {
        return finish(ctx, id, memory);
    }
    ctx.registry.release(memory.task, id);
    ctx.snapshot.with_worker_mut(id, |w, _| w.reset());
    match reason {
        ReleaseReason::DestinationFull => {
            log::warn!("{} found no room for {} after rerouting", id, memory.task)
        }
        _ => log::debug!("{} released {} ({:?})", id, memory.task, reason),
    }
    WorkerStep::Released {
        task: memory.task,
        reason,
    }
}
