//! Tunable constants for task generation, allocation and fleet sizing.
//!
//! One `OverseerConfig` is owned by the engine and passed by reference into
//! every decision point. Harness scenarios can override fields from JSON.

use serde::{Deserialize, Serialize};

/// Ticks a task stays open without being refreshed by a new request.
pub const DEFAULT_TASK_HORIZON: u64 = 500;

/// Unload work outranks load work on the same node: an overflowing node
/// blocks further production.
pub const UNLOAD_PRIORITY: i32 = 20;
pub const LOAD_PRIORITY: i32 = 10;
pub const TRANSFER_PRIORITY: i32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    pub task_horizon: u64,
    pub unload_priority: i32,
    pub load_priority: i32,
    pub transfer_priority: i32,

    /// Grid cell edge used to group extensions.
    pub group_cell_size: i32,
    /// Ticks before the extension grouping is rebuilt regardless of changes.
    pub group_ttl: u64,

    /// Container fill ratio above which an unload task is raised.
    pub container_overflow_ratio: f32,
    /// Energy the courier keeps in the terminal.
    pub terminal_energy_target: u32,
    /// Tower fill ratio below which towers become refill candidates.
    pub tower_refill_ratio: f32,
    /// Tower fill ratio that counts as "defenses charged".
    pub tower_charged_ratio: f32,
    /// Controller level at which towers become available.
    pub tower_controller_level: u8,

    pub tasks_per_hauler: u32,
    pub max_extra_haulers: u32,
    pub sites_per_builder: u32,
    pub max_extra_builders: u32,

    /// Delivery reroutes allowed per worker per tick.
    pub reroutes_per_tick: u32,
    /// Tile range within which a worker may interact with a node.
    pub interaction_range: u32,
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            task_horizon: DEFAULT_TASK_HORIZON,
            unload_priority: UNLOAD_PRIORITY,
            load_priority: LOAD_PRIORITY,
            transfer_priority: TRANSFER_PRIORITY,
            group_cell_size: 6,
            group_ttl: 50,
            container_overflow_ratio: 0.5,
            terminal_energy_target: 10_000,
            tower_refill_ratio: 0.8,
            tower_charged_ratio: 0.5,
            tower_controller_level: 3,
            tasks_per_hauler: 4,
            max_extra_haulers: 2,
            sites_per_builder: 5,
            max_extra_builders: 2,
            reroutes_per_tick: 1,
            interaction_range: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unload_outranks_load() {
        let config = OverseerConfig::default();
        assert!(config.unload_priority > config.load_priority);
        assert!(config.load_priority > config.transfer_priority);
    }
}
