//! Stationary resource nodes.

use overseer_logic::resources::{ColonyId, NodeId, NodeKind, ResourceType, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub colony: ColonyId,
    pub store: Store,
}

impl ResourceNode {
    /// Node with the store layout usual for its kind.
    pub fn standard(id: NodeId, kind: NodeKind, colony: ColonyId) -> Self {
        Self {
            id,
            kind,
            colony,
            store: standard_store(kind),
        }
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.store = store;
        self
    }

    pub fn energy(&self) -> u32 {
        self.store.get(ResourceType::Energy)
    }

    pub fn energy_deficit(&self) -> u32 {
        self.store.free_for(ResourceType::Energy)
    }

    pub fn fill_ratio(&self, resource: ResourceType) -> f32 {
        let cap = self.store.capacity_for(resource);
        if cap == 0 {
            0.0
        } else {
            self.store.get(resource) as f32 / cap as f32
        }
    }
}

pub fn standard_store(kind: NodeKind) -> Store {
    match kind {
        NodeKind::Spawner => Store::single(ResourceType::Energy, 300),
        NodeKind::Extension => Store::single(ResourceType::Energy, 50),
        NodeKind::Tower => Store::single(ResourceType::Energy, 1000),
        NodeKind::Storage => Store::shared(1_000_000),
        NodeKind::Terminal => Store::shared(300_000),
        NodeKind::Container => Store::shared(2000),
        NodeKind::Lab => {
            let mut limits: BTreeMap<ResourceType, u32> = ResourceType::ALL
                .iter()
                .filter(|r| **r != ResourceType::Energy)
                .map(|r| (*r, 3000))
                .collect();
            limits.insert(ResourceType::Energy, 2000);
            Store::per_resource(limits)
        }
        NodeKind::Source => Store::single(ResourceType::Energy, 3000),
        NodeKind::Controller => Store::single(ResourceType::Energy, 1000),
        NodeKind::ConstructionSite => Store::single(ResourceType::Energy, 5000),
    }
}

/// Production capability attached to spawner nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawner {
    /// First tick the spawner can start producing again.
    pub busy_until: u64,
}

impl Spawner {
    pub fn is_idle(&self, now: u64) -> bool {
        self.busy_until <= now
    }
}

/// Per-tick refill of a source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regeneration {
    pub per_tick: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lab_accepts_minerals() {
        let mut lab = ResourceNode::standard(NodeId(1), NodeKind::Lab, ColonyId(0));
        assert_eq!(lab.store.add(ResourceType::Hydrogen, 100), 100);
        assert_eq!(lab.store.add(ResourceType::Energy, 100), 100);
        assert_eq!(lab.store.free_for(ResourceType::Hydrogen), 2900);
    }

    #[test]
    fn test_extension_deficit() {
        let mut ext = ResourceNode::standard(NodeId(1), NodeKind::Extension, ColonyId(0));
        assert_eq!(ext.energy_deficit(), 50);
        ext.store.add(ResourceType::Energy, 20);
        assert_eq!(ext.energy_deficit(), 30);
        assert!((ext.fill_ratio(ResourceType::Energy) - 0.4).abs() < 1e-6);
    }
}
