//! World upkeep run after the workers act: sources regenerate, energy sinks
//! consume what was delivered, finished construction disappears and workers
//! age out.

use overseer_logic::resources::{ColonyId, NodeId, NodeKind, ResourceType, WorkerId};

use crate::components::{Regeneration, ResourceNode, Worker};
use crate::snapshot::Snapshot;

/// Upgrade progress needed to leave each controller level.
const LEVEL_COST: u64 = 1000;
const MAX_CONTROLLER_LEVEL: u8 = 8;
/// Energy a tower burns per tick while the colony is under attack.
const TOWER_FIRE_COST: u32 = 10;

/// Changes worth reporting from one upkeep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpkeepReport {
    pub expired_workers: Vec<WorkerId>,
    pub finished_sites: Vec<NodeId>,
    pub level_ups: Vec<(ColonyId, u8)>,
}

pub fn run_upkeep(snapshot: &mut Snapshot) -> UpkeepReport {
    let mut report = UpkeepReport::default();

    for (_, (node, regen)) in snapshot
        .world
        .query_mut::<(&mut ResourceNode, &Regeneration)>()
    {
        node.store.add(ResourceType::Energy, regen.per_tick);
    }

    let under_attack: Vec<ColonyId> = snapshot
        .colony_ids()
        .into_iter()
        .filter(|id| snapshot.colony(*id).is_some_and(|c| c.under_attack))
        .collect();

    let mut upgraded: Vec<(ColonyId, u64)> = Vec::new();
    for (_, node) in snapshot.world.query_mut::<&mut ResourceNode>() {
        match node.kind {
            NodeKind::Controller => {
                let spent = node.store.clear(ResourceType::Energy);
                if spent > 0 {
                    upgraded.push((node.colony, u64::from(spent)));
                }
            }
            NodeKind::Tower if under_attack.contains(&node.colony) => {
                node.store.take(ResourceType::Energy, TOWER_FIRE_COST);
            }
            NodeKind::ConstructionSite if node.energy_deficit() == 0 => {
                report.finished_sites.push(node.id);
            }
            _ => {}
        }
    }

    for (colony_id, spent) in upgraded {
        if let Some(colony) = snapshot.colony_mut(colony_id) {
            colony.upgrade_progress += spent;
            while colony.controller_level < MAX_CONTROLLER_LEVEL
                && colony.upgrade_progress >= LEVEL_COST * u64::from(colony.controller_level)
            {
                colony.upgrade_progress -= LEVEL_COST * u64::from(colony.controller_level);
                colony.controller_level += 1;
                log::info!("{} controller reached level {}", colony_id, colony.controller_level);
                report.level_ups.push((colony_id, colony.controller_level));
            }
        }
    }

    for site in &report.finished_sites {
        snapshot.despawn_node(*site);
        log::info!("construction at {} finished", site);
    }

    for (_, worker) in snapshot.world.query_mut::<&mut Worker>() {
        worker.ticks_to_live = worker.ticks_to_live.saturating_sub(1);
        if worker.ticks_to_live == 0 {
            report.expired_workers.push(worker.id);
        }
    }
    report.expired_workers.sort();
    for id in &report.expired_workers {
        snapshot.despawn_worker(*id);
        log::debug!("{} reached the end of its lifespan", id);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Colony, Position};
    use overseer_logic::roles::{BodyPlan, Role};

    fn home() -> (Snapshot, ColonyId) {
        let mut snapshot = Snapshot::new();
        let colony = snapshot.add_colony(Colony::new(ColonyId(0), "home", Position::new(5, 5)));
        (snapshot, colony)
    }

    #[test]
    fn test_sources_regenerate() {
        let (mut snapshot, colony) = home();
        let source = snapshot.spawn_node(NodeKind::Source, colony, Position::new(1, 1));
        run_upkeep(&mut snapshot);
        run_upkeep(&mut snapshot);
        assert_eq!(snapshot.node(source).unwrap().0.energy(), 20);
    }

    #[test]
    fn test_controller_levels_up() {
        let (mut snapshot, colony) = home();
        let controller = snapshot.spawn_node(NodeKind::Controller, colony, Position::new(9, 9));
        snapshot.with_node_mut(controller, |n| n.store.add(ResourceType::Energy, 1000));

        let report = run_upkeep(&mut snapshot);
        assert_eq!(report.level_ups, vec![(colony, 2)]);
        let c = snapshot.colony(colony).unwrap();
        assert_eq!(c.controller_level, 2);
        assert_eq!(c.upgrade_progress, 0);
        assert_eq!(snapshot.node(controller).unwrap().0.energy(), 0);
    }

    #[test]
    fn test_finished_site_removed() {
        let (mut snapshot, colony) = home();
        let site = snapshot.spawn_node(NodeKind::ConstructionSite, colony, Position::new(3, 3));
        snapshot.with_node_mut(site, |n| n.store.add(ResourceType::Energy, 5000));

        let report = run_upkeep(&mut snapshot);
        assert_eq!(report.finished_sites, vec![site]);
        assert!(!snapshot.node_exists(site));
    }

    #[test]
    fn test_workers_age_out() {
        let (mut snapshot, colony) = home();
        let worker = snapshot.spawn_worker(Position::default(), |id| {
            let mut w = Worker::new(id, Role::Builder, colony, BodyPlan::from_parts(1, 1, 1));
            w.ticks_to_live = 2;
            w
        });
        assert!(run_upkeep(&mut snapshot).expired_workers.is_empty());
        assert_eq!(run_upkeep(&mut snapshot).expired_workers, vec![worker]);
        assert!(!snapshot.worker_exists(worker));
    }
}
