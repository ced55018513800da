//! Demand detection - turns colony structure and recipe needs into tasks.
//!
//! Every scheduler tick the colony is scanned and, for each unit of work, the
//! need is compared with what the registry already holds for it. Only the
//! difference is requested, so repeated scans converge on one task per unit
//! of work instead of inflating it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use overseer_logic::config::OverseerConfig;
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, ResourceType};
use overseer_logic::task::{RequestOutcome, TaskKind, TaskRegistry, TaskRequest};

use crate::components::ResourceNode;
use crate::snapshot::Snapshot;

/// What a production pipeline wants done with one resource at one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandKind {
    /// Keep at least `amount` staged at the node.
    Stock { amount: u32 },
    /// Empty the node of the resource.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub node: NodeId,
    pub resource: ResourceType,
    pub kind: DemandKind,
}

/// Recipe/demand collaborator: which inputs a colony's production targets
/// need and where they have to be staged.
pub trait DemandSource {
    fn demands(&self, colony: ColonyId, now: u64) -> Vec<Demand>;
}

/// Fixed demand list per colony, for drivers without a recipe planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemandBook {
    entries: BTreeMap<ColonyId, Vec<Demand>>,
}

impl DemandBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the demand for `(node, resource)`.
    pub fn set(&mut self, colony: ColonyId, demand: Demand) {
        let list = self.entries.entry(colony).or_default();
        list.retain(|d| !(d.node == demand.node && d.resource == demand.resource));
        list.push(demand);
    }

    pub fn stock(&mut self, colony: ColonyId, node: NodeId, resource: ResourceType, amount: u32) {
        self.set(
            colony,
            Demand {
                node,
                resource,
                kind: DemandKind::Stock { amount },
            },
        );
    }

    pub fn clear(&mut self, colony: ColonyId, node: NodeId, resource: ResourceType) {
        self.set(
            colony,
            Demand {
                node,
                resource,
                kind: DemandKind::Clear,
            },
        );
    }

    /// Forget every demand on `node`.
    pub fn remove_node(&mut self, node: NodeId) {
        for list in self.entries.values_mut() {
            list.retain(|d| d.node != node);
        }
    }
}

impl DemandSource for DemandBook {
    fn demands(&self, colony: ColonyId, _now: u64) -> Vec<Demand> {
        self.entries.get(&colony).cloned().unwrap_or_default()
    }
}

/// Tasks touched by one detection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemandReport {
    pub created: u32,
    pub merged: u32,
}

struct Detector<'a> {
    registry: &'a mut TaskRegistry,
    config: &'a OverseerConfig,
    now: u64,
    report: DemandReport,
}

impl Detector<'_> {
    /// Request whatever part of `need` the registry does not already cover.
    fn top_up(&mut self, target: NodeId, kind: TaskKind, resource: ResourceType, need: u32) {
        let outstanding = self.registry.outstanding(target, kind, resource, self.now);
        let delta = need.saturating_sub(outstanding);
        if delta == 0 {
            return;
        }
        let priority = match kind {
            TaskKind::Unload => self.config.unload_priority,
            TaskKind::Load => self.config.load_priority,
            TaskKind::Transfer { .. } => self.config.transfer_priority,
        };
        let request = TaskRequest {
            target,
            kind,
            resource,
            amount: delta,
            priority,
        };
        match self.registry.request(request, self.now, self.config.task_horizon) {
            Ok(RequestOutcome::Created(id)) => {
                self.report.created += 1;
                log::info!("{} created: {:?} {:?} x{} at {}", id, kind, resource, delta, target);
            }
            Ok(RequestOutcome::Merged(_)) => self.report.merged += 1,
            Err(err) => log::debug!("demand at {} rejected: {}", target, err),
        }
    }
}

/// Scan one colony and raise or top up the tasks its state calls for.
pub fn detect_demand(
    snapshot: &Snapshot,
    registry: &mut TaskRegistry,
    colony: ColonyId,
    source: Option<&dyn DemandSource>,
    config: &OverseerConfig,
    now: u64,
) -> DemandReport {
    let nodes: Vec<ResourceNode> = snapshot
        .colony_nodes(colony)
        .into_iter()
        .map(|(node, _)| node)
        .collect();
    let first = |kind: NodeKind| nodes.iter().find(|n| n.kind == kind);
    let storage = first(NodeKind::Storage);
    let terminal = first(NodeKind::Terminal);

    let mut detector = Detector {
        registry,
        config,
        now,
        report: DemandReport::default(),
    };

    // Overflowing containers, only once there is somewhere central to empty
    // them into.
    if storage.is_some() || terminal.is_some() {
        for node in nodes.iter().filter(|n| n.kind == NodeKind::Container) {
            for (resource, stored) in node.store.iter() {
                if node.fill_ratio(resource) > config.container_overflow_ratio {
                    detector.top_up(node.id, TaskKind::Unload, resource, stored);
                }
            }
        }
    }

    // Keep the terminal's energy near its target, fed from storage.
    if let (Some(storage), Some(terminal)) = (storage, terminal) {
        let have = terminal.energy();
        let wanted = config.terminal_energy_target.saturating_sub(have);
        let need = wanted
            .min(storage.energy())
            .min(terminal.store.free_for(ResourceType::Energy));
        if need > 0 {
            let kind = TaskKind::Transfer { to: terminal.id };
            detector.top_up(storage.id, kind, ResourceType::Energy, need);
        }
    }

    let demands = source.map(|s| s.demands(colony, now)).unwrap_or_default();
    for demand in &demands {
        let Some(node) = nodes.iter().find(|n| n.id == demand.node) else {
            continue;
        };
        match demand.kind {
            DemandKind::Stock { amount } => {
                let need = amount
                    .saturating_sub(node.store.get(demand.resource))
                    .min(node.store.free_for(demand.resource));
                detector.top_up(node.id, TaskKind::Load, demand.resource, need);
            }
            DemandKind::Clear => {
                let need = node.store.get(demand.resource);
                detector.top_up(node.id, TaskKind::Unload, demand.resource, need);
            }
        }
    }

    // Lab output: anything a lab holds that it is not being stocked with.
    for lab in nodes.iter().filter(|n| n.kind == NodeKind::Lab) {
        for (resource, stored) in lab.store.iter() {
            if resource == ResourceType::Energy {
                continue;
            }
            let stocked = demands.iter().any(|d| {
                d.node == lab.id
                    && d.resource == resource
                    && matches!(d.kind, DemandKind::Stock { .. })
            });
            let cleared = demands
                .iter()
                .any(|d| d.node == lab.id && d.resource == resource && d.kind == DemandKind::Clear);
            if !stocked && !cleared {
                detector.top_up(lab.id, TaskKind::Unload, resource, stored);
            }
        }
    }

    detector.report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Colony, Position};

    fn colony_with(kinds: &[NodeKind]) -> (Snapshot, ColonyId, Vec<NodeId>) {
        let mut snapshot = Snapshot::new();
        let colony = snapshot.add_colony(Colony::new(ColonyId(0), "home", Position::new(10, 10)));
        let ids = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| snapshot.spawn_node(*kind, colony, Position::new(i as i32 * 3, 0)))
            .collect();
        (snapshot, colony, ids)
    }

    #[test]
    fn test_container_overflow_needs_central_sink() {
        let (mut snapshot, colony, ids) = colony_with(&[NodeKind::Container]);
        snapshot.with_node_mut(ids[0], |n| n.store.add(ResourceType::Energy, 1500));
        let mut registry = TaskRegistry::new();
        let config = OverseerConfig::default();

        let report = detect_demand(&snapshot, &mut registry, colony, None, &config, 0);
        assert_eq!(report.created, 0);

        snapshot.spawn_node(NodeKind::Storage, colony, Position::new(20, 20));
        let report = detect_demand(&snapshot, &mut registry, colony, None, &config, 0);
        assert_eq!(report.created, 1);
        let task = registry.iter().next().unwrap();
        assert_eq!(task.kind, TaskKind::Unload);
        assert_eq!(task.amount, 1500);
        assert_eq!(task.priority, config.unload_priority);
    }

    #[test]
    fn test_repeated_scans_do_not_inflate() {
        let (mut snapshot, colony, ids) = colony_with(&[NodeKind::Container, NodeKind::Storage]);
        snapshot.with_node_mut(ids[0], |n| n.store.add(ResourceType::Energy, 1200));
        let mut registry = TaskRegistry::new();
        let config = OverseerConfig::default();

        detect_demand(&snapshot, &mut registry, colony, None, &config, 0);
        let report = detect_demand(&snapshot, &mut registry, colony, None, &config, 1);
        assert_eq!(report, DemandReport::default());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().amount, 1200);

        // More accumulated: only the difference is merged in.
        snapshot.with_node_mut(ids[0], |n| n.store.add(ResourceType::Energy, 300));
        let report = detect_demand(&snapshot, &mut registry, colony, None, &config, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(registry.iter().next().unwrap().amount, 1500);
    }

    #[test]
    fn test_terminal_transfer_capped_by_storage() {
        let (mut snapshot, colony, ids) = colony_with(&[NodeKind::Storage, NodeKind::Terminal]);
        snapshot.with_node_mut(ids[0], |n| n.store.add(ResourceType::Energy, 4000));
        let mut registry = TaskRegistry::new();
        let config = OverseerConfig::default();

        detect_demand(&snapshot, &mut registry, colony, None, &config, 0);
        let task = registry.iter().next().unwrap();
        assert_eq!(task.kind, TaskKind::Transfer { to: ids[1] });
        assert_eq!(task.target, ids[0]);
        assert_eq!(task.amount, 4000);
    }

    #[test]
    fn test_recipe_stock_and_lab_output() {
        let (mut snapshot, colony, ids) = colony_with(&[NodeKind::Lab, NodeKind::Storage]);
        let lab = ids[0];
        snapshot.with_node_mut(lab, |n| {
            n.store.add(ResourceType::Hydrogen, 100);
            n.store.add(ResourceType::Hydroxide, 40);
        });
        let mut book = DemandBook::new();
        book.stock(colony, lab, ResourceType::Hydrogen, 500);
        let mut registry = TaskRegistry::new();
        let config = OverseerConfig::default();

        let report = detect_demand(&snapshot, &mut registry, colony, Some(&book), &config, 0);
        assert_eq!(report.created, 2);

        let load = registry
            .find_open(lab, TaskKind::Load, ResourceType::Hydrogen, 0)
            .unwrap();
        assert_eq!(load.amount, 400);
        let unload = registry
            .find_open(lab, TaskKind::Unload, ResourceType::Hydroxide, 0)
            .unwrap();
        assert_eq!(unload.amount, 40);
        assert!(unload.priority > load.priority);
    }

    #[test]
    fn test_demand_on_missing_node_is_skipped() {
        let (snapshot, colony, _) = colony_with(&[NodeKind::Storage]);
        let mut book = DemandBook::new();
        book.clear(colony, NodeId(99), ResourceType::Oxygen);
        let mut registry = TaskRegistry::new();
        let report = detect_demand(
            &snapshot,
            &mut registry,
            colony,
            Some(&book),
            &OverseerConfig::default(),
            0,
        );
        assert_eq!(report, DemandReport::default());
        assert!(registry.is_empty());
    }
}
