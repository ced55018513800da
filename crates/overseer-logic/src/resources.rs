//! Resource types, typed stores, ids and grid positions.
//!
//! Everything here is plain data shared by the task registry, the target
//! allocator and the ECS engine. Stores are keyed by `BTreeMap` so iteration
//! is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Stable id of a logistics task, unique for the registry's lifetime.
    TaskId,
    u64,
    "task#"
);
id_type!(
    /// Id of a mobile worker.
    WorkerId,
    u32,
    "worker#"
);
id_type!(
    /// Id of a stationary resource node.
    NodeId,
    u32,
    "node#"
);
id_type!(ColonyId, u32, "colony#");

/// Tile position on the colony grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: diagonal moves cost the same as straight ones.
    pub fn range_to(&self, other: &Position) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    pub fn in_range(&self, other: &Position, range: u32) -> bool {
        self.range_to(other) <= range
    }

    /// One tile toward `other` (no-op when already there).
    pub fn step_toward(&self, other: &Position) -> Position {
        Position {
            x: self.x + (other.x - self.x).signum(),
            y: self.y + (other.y - self.y).signum(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Energy,
    Hydrogen,
    Oxygen,
    Utrium,
    Keanium,
    Lemergium,
    Zynthium,
    Catalyst,
    Hydroxide,
    Ghodium,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        ResourceType::Energy,
        ResourceType::Hydrogen,
        ResourceType::Oxygen,
        ResourceType::Utrium,
        ResourceType::Keanium,
        ResourceType::Lemergium,
        ResourceType::Zynthium,
        ResourceType::Catalyst,
        ResourceType::Hydroxide,
        ResourceType::Ghodium,
    ];
}

/// Kind of stationary node. Decides which worker variants may use it as a
/// pickup or drop-off point and which fleet roles it justifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Spawner,
    Extension,
    Tower,
    Storage,
    Terminal,
    Container,
    Lab,
    /// Regenerating energy deposit, harvested in place.
    Source,
    /// Energy sink that consumes whatever is delivered (controller upgrade).
    Controller,
    /// Energy sink with finite remaining work.
    ConstructionSite,
}

impl NodeKind {
    /// Nodes that feed the production capability or automated defenses and
    /// are refilled by the target allocator rather than by tasks.
    pub fn is_refill_target(&self) -> bool {
        matches!(
            self,
            NodeKind::Spawner | NodeKind::Extension | NodeKind::Tower
        )
    }
}

/// How much a store can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    /// One pool shared by every resource type (storage, worker cargo).
    Shared(u32),
    /// A separate limit per resource; unlisted types cannot be stored.
    PerResource(BTreeMap<ResourceType, u32>),
}

/// Typed, capacity-bounded resource quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    stored: BTreeMap<ResourceType, u32>,
    capacity: Capacity,
}

impl Store {
    pub fn shared(capacity: u32) -> Self {
        Self {
            stored: BTreeMap::new(),
            capacity: Capacity::Shared(capacity),
        }
    }

    pub fn single(resource: ResourceType, capacity: u32) -> Self {
        let mut limits = BTreeMap::new();
        limits.insert(resource, capacity);
        Self {
            stored: BTreeMap::new(),
            capacity: Capacity::PerResource(limits),
        }
    }

    pub fn per_resource(limits: BTreeMap<ResourceType, u32>) -> Self {
        Self {
            stored: BTreeMap::new(),
            capacity: Capacity::PerResource(limits),
        }
    }

    /// Builder-style initial fill, clamped to capacity.
    pub fn with(mut self, resource: ResourceType, amount: u32) -> Self {
        self.add(resource, amount);
        self
    }

    pub fn get(&self, resource: ResourceType) -> u32 {
        self.stored.get(&resource).copied().unwrap_or(0)
    }

    pub fn used(&self) -> u32 {
        self.stored.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    pub fn capacity_for(&self, resource: ResourceType) -> u32 {
        match &self.capacity {
            Capacity::Shared(total) => *total,
            Capacity::PerResource(limits) => limits.get(&resource).copied().unwrap_or(0),
        }
    }

    pub fn free_for(&self, resource: ResourceType) -> u32 {
        match &self.capacity {
            Capacity::Shared(total) => total.saturating_sub(self.used()),
            Capacity::PerResource(limits) => limits
                .get(&resource)
                .copied()
                .unwrap_or(0)
                .saturating_sub(self.get(resource)),
        }
    }

    /// Adds up to `amount`, returning what actually fit.
    pub fn add(&mut self, resource: ResourceType, amount: u32) -> u32 {
        let accepted = amount.min(self.free_for(resource));
        if accepted > 0 {
            *self.stored.entry(resource).or_insert(0) += accepted;
        }
        accepted
    }

    /// Removes up to `amount`, returning what was actually taken.
    pub fn take(&mut self, resource: ResourceType, amount: u32) -> u32 {
        let available = self.get(resource);
        let taken = amount.min(available);
        if taken == available {
            self.stored.remove(&resource);
        } else if let Some(slot) = self.stored.get_mut(&resource) {
            *slot -= taken;
        }
        taken
    }

    /// Drops everything of one type (controller upgrade, decay).
    pub fn clear(&mut self, resource: ResourceType) -> u32 {
        self.stored.remove(&resource).unwrap_or(0)
    }

    /// Non-zero entries in resource order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, u32)> + '_ {
        self.stored.iter().map(|(r, a)| (*r, *a))
    }

    /// First carried resource, used by idle workers to decide what to drain.
    pub fn first_resource(&self) -> Option<ResourceType> {
        self.stored.keys().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_chebyshev() {
        let a = Position::new(0, 0);
        assert_eq!(a.range_to(&Position::new(3, -5)), 5);
        assert!(a.in_range(&Position::new(1, 1), 1));
        assert!(!a.in_range(&Position::new(2, 0), 1));
    }

    #[test]
    fn test_step_toward_converges() {
        let target = Position::new(4, -2);
        let mut p = Position::new(0, 0);
        for _ in 0..4 {
            p = p.step_toward(&target);
        }
        assert_eq!(p, target);
        assert_eq!(p.step_toward(&target), target);
    }

    #[test]
    fn test_shared_store_clamps() {
        let mut store = Store::shared(100);
        assert_eq!(store.add(ResourceType::Energy, 70), 70);
        assert_eq!(store.add(ResourceType::Oxygen, 50), 30);
        assert_eq!(store.free_for(ResourceType::Energy), 0);
        assert_eq!(store.take(ResourceType::Oxygen, 100), 30);
        assert_eq!(store.get(ResourceType::Oxygen), 0);
        assert_eq!(store.used(), 70);
    }

    #[test]
    fn test_per_resource_store_rejects_unlisted() {
        let mut store = Store::single(ResourceType::Energy, 50);
        assert_eq!(store.add(ResourceType::Hydrogen, 10), 0);
        assert_eq!(store.add(ResourceType::Energy, 80), 50);
        assert_eq!(store.capacity_for(ResourceType::Energy), 50);
        assert_eq!(store.free_for(ResourceType::Energy), 0);
    }

    #[test]
    fn test_take_empties_slot() {
        let mut store = Store::shared(100).with(ResourceType::Energy, 40);
        assert_eq!(store.take(ResourceType::Energy, 40), 40);
        assert!(store.is_empty());
        assert_eq!(store.first_resource(), None);
    }
}
