//! World snapshot - the ECS world plus id indexes.
//!
//! Workers and nodes can vanish between the tick they were referenced and
//! the tick they are looked up again, so every lookup by id returns an
//! `Option` and never panics.

use hecs::{Entity, World};
use std::collections::{BTreeMap, HashMap};

use crate::components::{Colony, Position, Regeneration, ResourceNode, Spawner, Worker};
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, WorkerId};
use overseer_logic::roles::Role;

#[derive(Default)]
pub struct Snapshot {
    pub world: World,
    workers: HashMap<WorkerId, Entity>,
    nodes: HashMap<NodeId, Entity>,
    colonies: BTreeMap<ColonyId, Colony>,
    next_worker_id: u32,
    next_node_id: u32,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Colonies ────────────────────────────────────────────────────────

    pub fn add_colony(&mut self, colony: Colony) -> ColonyId {
        let id = colony.id;
        self.colonies.insert(id, colony);
        id
    }

    pub fn colony(&self, id: ColonyId) -> Option<&Colony> {
        self.colonies.get(&id)
    }

    pub fn colony_mut(&mut self, id: ColonyId) -> Option<&mut Colony> {
        self.colonies.get_mut(&id)
    }

    pub fn colony_ids(&self) -> Vec<ColonyId> {
        self.colonies.keys().copied().collect()
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    /// Spawn a node of `kind` with the standard store. Spawners get a
    /// production capability, sources a regeneration rate.
    pub fn spawn_node(&mut self, kind: NodeKind, colony: ColonyId, position: Position) -> NodeId {
        let id = self.allocate_node_id();
        let node = ResourceNode::standard(id, kind, colony);
        self.insert_node(node, position);
        id
    }

    /// Spawn a node built by `build`, which receives the freshly allocated id.
    pub fn spawn_node_with(
        &mut self,
        position: Position,
        build: impl FnOnce(NodeId) -> ResourceNode,
    ) -> NodeId {
        let id = self.allocate_node_id();
        let node = build(id);
        self.insert_node(node, position);
        id
    }

    fn insert_node(&mut self, node: ResourceNode, position: Position) {
        let id = node.id;
        let entity = match node.kind {
            NodeKind::Spawner => self.world.spawn((node, position, Spawner::default())),
            NodeKind::Source => self
                .world
                .spawn((node, position, Regeneration { per_tick: 10 })),
            _ => self.world.spawn((node, position)),
        };
        self.nodes.insert(id, entity);
    }

    pub fn despawn_node(&mut self, id: NodeId) -> bool {
        match self.nodes.remove(&id) {
            Some(entity) => self.world.despawn(entity).is_ok(),
            None => false,
        }
    }

    pub fn node_entity(&self, id: NodeId) -> Option<Entity> {
        self.nodes
            .get(&id)
            .copied()
            .filter(|e| self.world.contains(*e))
    }

    pub fn node_exists(&self, id: NodeId) -> bool {
        self.node_entity(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<(ResourceNode, Position)> {
        let entity = self.node_entity(id)?;
        let node = self.world.get::<&ResourceNode>(entity).ok()?;
        let pos = self.world.get::<&Position>(entity).ok()?;
        Some(((*node).clone(), *pos))
    }

    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        let entity = self.node_entity(id)?;
        let node = self.world.get::<&ResourceNode>(entity).ok()?;
        Some(node.kind)
    }

    pub fn with_node_mut<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut ResourceNode) -> R,
    ) -> Option<R> {
        let entity = self.node_entity(id)?;
        let mut node = self.world.get::<&mut ResourceNode>(entity).ok()?;
        Some(f(&mut node))
    }

    /// All nodes of a colony, ordered by id.
    pub fn colony_nodes(&self, colony: ColonyId) -> Vec<(ResourceNode, Position)> {
        let mut nodes: Vec<(ResourceNode, Position)> = self
            .world
            .query::<(&ResourceNode, &Position)>()
            .iter()
            .filter(|(_, (node, _))| node.colony == colony)
            .map(|(_, (node, pos))| (node.clone(), *pos))
            .collect();
        nodes.sort_by_key(|(node, _)| node.id);
        nodes
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    // ── Workers ─────────────────────────────────────────────────────────

    /// Spawn a worker built by `build`, which receives the new id.
    pub fn spawn_worker(
        &mut self,
        position: Position,
        build: impl FnOnce(WorkerId) -> Worker,
    ) -> WorkerId {
        let id = WorkerId(self.next_worker_id);
        self.next_worker_id += 1;
        let worker = build(id);
        let entity = self.world.spawn((worker, position));
        self.workers.insert(id, entity);
        id
    }

    pub fn despawn_worker(&mut self, id: WorkerId) -> bool {
        match self.workers.remove(&id) {
            Some(entity) => self.world.despawn(entity).is_ok(),
            None => false,
        }
    }

    pub fn worker_entity(&self, id: WorkerId) -> Option<Entity> {
        self.workers
            .get(&id)
            .copied()
            .filter(|e| self.world.contains(*e))
    }

    pub fn worker_exists(&self, id: WorkerId) -> bool {
        self.worker_entity(id).is_some()
    }

    pub fn worker(&self, id: WorkerId) -> Option<(Worker, Position)> {
        let entity = self.worker_entity(id)?;
        let worker = self.world.get::<&Worker>(entity).ok()?;
        let pos = self.world.get::<&Position>(entity).ok()?;
        Some(((*worker).clone(), *pos))
    }

    pub fn with_worker_mut<R>(
        &mut self,
        id: WorkerId,
        f: impl FnOnce(&mut Worker, &mut Position) -> R,
    ) -> Option<R> {
        let entity = self.worker_entity(id)?;
        let (worker, pos) = self
            .world
            .query_one_mut::<(&mut Worker, &mut Position)>(entity)
            .ok()?;
        Some(f(worker, pos))
    }

    /// Live worker ids in ascending order, the order workers act in.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, e)| self.world.contains(**e))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn colony_workers(&self, colony: ColonyId) -> Vec<(Worker, Position)> {
        let mut workers: Vec<(Worker, Position)> = self
            .world
            .query::<(&Worker, &Position)>()
            .iter()
            .filter(|(_, (w, _))| w.colony == colony)
            .map(|(_, (w, p))| (w.clone(), *p))
            .collect();
        workers.sort_by_key(|(w, _)| w.id);
        workers
    }

    pub fn population(&self, colony: ColonyId) -> BTreeMap<Role, u32> {
        let mut counts = BTreeMap::new();
        for (_, worker) in self.world.query::<&Worker>().iter() {
            if worker.colony == colony {
                *counts.entry(worker.role).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_logic::resources::ResourceType;
    use overseer_logic::roles::BodyPlan;

    fn colony(snapshot: &mut Snapshot) -> ColonyId {
        snapshot.add_colony(Colony::new(ColonyId(0), "home", Position::new(25, 25)))
    }

    #[test]
    fn test_lookup_after_despawn_is_none() {
        let mut snapshot = Snapshot::new();
        let c = colony(&mut snapshot);
        let node = snapshot.spawn_node(NodeKind::Container, c, Position::new(1, 1));
        let worker = snapshot.spawn_worker(Position::new(2, 2), |id| {
            Worker::new(id, Role::Hauler, c, BodyPlan::from_parts(0, 2, 2))
        });

        assert!(snapshot.node(node).is_some());
        assert!(snapshot.worker(worker).is_some());

        assert!(snapshot.despawn_node(node));
        assert!(snapshot.despawn_worker(worker));
        assert!(snapshot.node(node).is_none());
        assert!(snapshot.worker(worker).is_none());
        assert!(!snapshot.despawn_worker(worker));
        assert!(snapshot
            .with_node_mut(node, |n| n.store.add(ResourceType::Energy, 1))
            .is_none());
    }

    #[test]
    fn test_spawner_gets_capability() {
        let mut snapshot = Snapshot::new();
        let c = colony(&mut snapshot);
        let spawner = snapshot.spawn_node(NodeKind::Spawner, c, Position::new(5, 5));
        let entity = snapshot.node_entity(spawner).unwrap();
        assert!(snapshot.world.get::<&Spawner>(entity).is_ok());
    }

    #[test]
    fn test_population_counts_by_role() {
        let mut snapshot = Snapshot::new();
        let c = colony(&mut snapshot);
        for role in [Role::Hauler, Role::Hauler, Role::Miner] {
            snapshot.spawn_worker(Position::default(), |id| {
                Worker::new(id, role, c, BodyPlan::from_parts(1, 1, 1))
            });
        }
        let pop = snapshot.population(c);
        assert_eq!(pop.get(&Role::Hauler), Some(&2));
        assert_eq!(pop.get(&Role::Miner), Some(&1));
        assert_eq!(snapshot.worker_ids().len(), 3);
    }
}
