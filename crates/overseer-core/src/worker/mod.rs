//! Per-worker decision procedure, run once per worker per tick.
//!
//! Logistics roles (hauler, lab tender, courier) run the task-driven
//! collect/deliver loop in [`logistics`]; the remaining roles run the simpler
//! chores in [`chores`]. Every lookup tolerates the worker, its task or its
//! target having vanished: the worker drops the stale reference and decides
//! again from scratch.

mod chores;
mod logistics;

use std::collections::BTreeMap;

use overseer_logic::allocator::GroupIndex;
use overseer_logic::config::OverseerConfig;
use overseer_logic::resources::{
    ColonyId, NodeId, NodeKind, Position, ResourceType, TaskId, WorkerId,
};
use overseer_logic::roles::Role;
use overseer_logic::task::{Expiry, TaskRegistry};

use crate::components::{ResourceNode, WorkerMode};
use crate::movement::Movement;
use crate::snapshot::Snapshot;

pub use logistics::ReleaseReason;

/// Everything a worker decision may read or mutate during one tick.
pub struct WorkerContext<'a> {
    pub snapshot: &'a mut Snapshot,
    pub registry: &'a mut TaskRegistry,
    pub groups: &'a BTreeMap<ColonyId, GroupIndex>,
    pub movement: &'a mut dyn Movement,
    pub config: &'a OverseerConfig,
    pub now: u64,
}

/// The most significant thing a worker did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStep {
    /// The id no longer resolves to a live worker.
    Missing,
    Parked,
    Moving { toward: NodeId },
    Claimed(TaskId),
    Withdrew { node: NodeId, amount: u32 },
    Harvested { node: NodeId, amount: u32 },
    Deposited { node: NodeId, amount: u32 },
    Rerouted { from: NodeId, to: NodeId },
    Completed(TaskId),
    Released { task: TaskId, reason: ReleaseReason },
}

/// Run one worker for one tick.
pub fn run_worker_tick(ctx: &mut WorkerContext<'_>, id: WorkerId) -> WorkerStep {
    let Some((worker, _)) = ctx.snapshot.worker(id) else {
        return WorkerStep::Missing;
    };

    match worker.role.logistics() {
        Some(profile) => logistics::run(ctx, id, &profile),
        None => match worker.role {
            Role::Miner => chores::mine(ctx, id),
            Role::Defender => chores::park(ctx, id),
            Role::Harvester | Role::Upgrader | Role::Builder => chores::gather(ctx, id),
            // Logistics roles are handled above.
            Role::Hauler | Role::LabTender | Role::Courier => chores::park(ctx, id),
        },
    }
}

/// Move toward `node`, declaring it as the worker's target. Returns whether
/// the worker can interact with it this tick, or `None` when either side
/// has vanished.
fn approach(ctx: &mut WorkerContext<'_>, id: WorkerId, node: NodeId) -> Option<bool> {
    let (_, node_pos) = ctx.snapshot.node(node)?;
    let (_, from) = ctx.snapshot.worker(id)?;
    let range = ctx.config.interaction_range;
    let outcome = ctx.movement.advance(id, from, node_pos, range);
    ctx.snapshot.with_worker_mut(id, |w, pos| {
        *pos = outcome.position;
        w.target = Some(node);
    })?;
    Some(outcome.in_range)
}

/// Move `amount` (capped by cargo space and availability) from a node into
/// the worker's cargo. Returns what moved.
fn withdraw(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    node: NodeId,
    resource: ResourceType,
    amount: u32,
) -> u32 {
    let Some((worker, _)) = ctx.snapshot.worker(id) else {
        return 0;
    };
    let want = amount.min(worker.carried.free_for(resource));
    if want == 0 {
        return 0;
    }
    let taken = ctx
        .snapshot
        .with_node_mut(node, |n| n.store.take(resource, want))
        .unwrap_or(0);
    if taken > 0 {
        let added = ctx
            .snapshot
            .with_worker_mut(id, |w, _| w.carried.add(resource, taken))
            .unwrap_or(0);
        if added < taken {
            // Cargo space was checked above; put any overflow back.
            ctx.snapshot
                .with_node_mut(node, |n| n.store.add(resource, taken - added));
        }
        return added;
    }
    0
}

/// Move up to `amount` of cargo into a node. Returns what the node accepted.
fn deposit(
    ctx: &mut WorkerContext<'_>,
    id: WorkerId,
    node: NodeId,
    resource: ResourceType,
    amount: u32,
) -> u32 {
    let Some((worker, _)) = ctx.snapshot.worker(id) else {
        return 0;
    };
    let offer = amount.min(worker.carrying(resource));
    if offer == 0 {
        return 0;
    }
    let accepted = ctx
        .snapshot
        .with_node_mut(node, |n| n.store.add(resource, offer))
        .unwrap_or(0);
    if accepted > 0 {
        ctx.snapshot
            .with_worker_mut(id, |w, _| w.carried.take(resource, accepted));
    }
    accepted
}

/// Best node among `kinds` (earlier kinds preferred), nearest first, lowest
/// id on ties.
fn pick_node(
    nodes: &[(ResourceNode, Position)],
    from: Position,
    kinds: &[NodeKind],
    accept: impl Fn(&ResourceNode) -> bool,
) -> Option<NodeId> {
    nodes
        .iter()
        .filter_map(|(node, pos)| {
            let rank = kinds.iter().position(|k| *k == node.kind)?;
            accept(node).then_some((rank, from.range_to(pos), node.id))
        })
        .min()
        .map(|(_, _, id)| id)
}

fn set_mode(ctx: &mut WorkerContext<'_>, id: WorkerId, mode: WorkerMode) {
    ctx.snapshot.with_worker_mut(id, |w, _| w.mode = mode);
}

/// Log helper shared with the engine's garbage collection pass.
pub(crate) fn describe_expiry(reason: Expiry) -> &'static str {
    match reason {
        Expiry::Elapsed => "expired",
        Expiry::TargetGone => "target gone",
        Expiry::DestinationGone => "destination gone",
        Expiry::AssigneeGone => "assignee gone",
    }
}
