//! Worker roles, body plans and logistics profiles.
//!
//! A role is fixed for a worker's lifetime. Its body plan decides what the
//! worker costs to produce and how much it can carry; its logistics profile
//! decides which tasks it accepts and which nodes it may pick up from or drop
//! into.

use serde::{Deserialize, Serialize};

use crate::fleet::Stage;
use crate::resources::NodeKind;
use crate::task::TaskKindTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Generalist that harvests and refills. The colony's primary energy
    /// gatherer: with none alive nothing else can be produced.
    Harvester,
    /// Parks on one source and harvests into its container.
    Miner,
    Hauler,
    Upgrader,
    Builder,
    Defender,
    LabTender,
    /// Balances the terminal against storage.
    Courier,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Harvester,
        Role::Miner,
        Role::Hauler,
        Role::Upgrader,
        Role::Builder,
        Role::Defender,
        Role::LabTender,
        Role::Courier,
    ];

    pub fn is_primary_gatherer(&self) -> bool {
        matches!(self, Role::Harvester)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Harvester => "harvester",
            Role::Miner => "miner",
            Role::Hauler => "hauler",
            Role::Upgrader => "upgrader",
            Role::Builder => "builder",
            Role::Defender => "defender",
            Role::LabTender => "lab_tender",
            Role::Courier => "courier",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|r| r.name() == name)
    }

    /// Node kind a role is dedicated to. The fleet never schedules more of
    /// these workers than there are matching nodes.
    pub fn serviced_node(&self) -> Option<NodeKind> {
        match self {
            Role::Miner => Some(NodeKind::Source),
            Role::LabTender => Some(NodeKind::Lab),
            Role::Courier => Some(NodeKind::Terminal),
            _ => None,
        }
    }

    /// Body plan for a colony at `stage`.
    pub fn body(&self, stage: Stage) -> BodyPlan {
        let tier = stage.tier();
        match self {
            Role::Harvester | Role::Builder => match tier {
                1 => BodyPlan::from_parts(1, 1, 1),
                2 => BodyPlan::from_parts(2, 2, 2),
                _ => BodyPlan::from_parts(3, 3, 3),
            },
            Role::Upgrader => match tier {
                1 => BodyPlan::from_parts(1, 1, 1),
                2 => BodyPlan::from_parts(2, 1, 2),
                _ => BodyPlan::from_parts(4, 2, 3),
            },
            Role::Miner => match tier {
                1 | 2 => BodyPlan::from_parts(2, 1, 1),
                _ => BodyPlan::from_parts(5, 1, 3),
            },
            Role::Hauler => match tier {
                1 | 2 => BodyPlan::from_parts(0, 4, 4),
                3 => BodyPlan::from_parts(0, 6, 6),
                _ => BodyPlan::from_parts(0, 10, 10),
            },
            Role::LabTender => BodyPlan::from_parts(0, 4, 4),
            Role::Courier => BodyPlan::from_parts(0, 8, 4),
            Role::Defender => match tier {
                1 | 2 => BodyPlan::combat(2),
                _ => BodyPlan::combat(4),
            },
        }
    }

    /// Largest body at or below `stage` whose cost fits `energy_capacity`.
    pub fn affordable_body(&self, stage: Stage, energy_capacity: u32) -> Option<BodyPlan> {
        let mut current = Some(stage);
        while let Some(s) = current {
            let plan = self.body(s);
            if plan.cost <= energy_capacity {
                return Some(plan);
            }
            current = s.previous();
        }
        None
    }

    /// Task-driven behaviour, if this role runs the collect/deliver loop.
    pub fn logistics(&self) -> Option<LogisticsProfile> {
        match self {
            Role::Hauler => Some(LogisticsProfile::HAULER),
            Role::LabTender => Some(LogisticsProfile::LAB_TENDER),
            Role::Courier => Some(LogisticsProfile::COURIER),
            _ => None,
        }
    }

    /// Roles that top up spawners, extensions and towers when no task is
    /// claimable.
    pub fn refills(&self) -> bool {
        matches!(self, Role::Harvester | Role::Hauler)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Cost and capabilities of a produced worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyPlan {
    /// Energy drawn from the colony's production buffers.
    pub cost: u32,
    /// Carried quantity limit.
    pub capacity: u32,
    /// Ticks the producing spawner stays busy.
    pub spawn_ticks: u32,
    /// Harvest/build/upgrade throughput per tick.
    pub work_rate: u32,
}

impl BodyPlan {
    const WORK_COST: u32 = 100;
    const PART_COST: u32 = 50;
    const CARRY_SIZE: u32 = 50;
    const TICKS_PER_PART: u32 = 3;

    pub const fn from_parts(work: u32, carry: u32, moves: u32) -> Self {
        Self {
            cost: work * Self::WORK_COST + (carry + moves) * Self::PART_COST,
            capacity: carry * Self::CARRY_SIZE,
            spawn_ticks: (work + carry + moves) * Self::TICKS_PER_PART,
            work_rate: work * 2,
        }
    }

    /// Attack/move pairs; combat is resolved outside the core.
    pub const fn combat(pairs: u32) -> Self {
        Self {
            cost: pairs * 130,
            capacity: 0,
            spawn_ticks: pairs * 2 * Self::TICKS_PER_PART,
            work_rate: 0,
        }
    }
}

/// Which tasks a worker variant accepts and where it may pick up or drop off.
///
/// `sources` and `sinks` are in preference order; the second usable sink is
/// the reroute target when the first is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogisticsProfile {
    pub variant: LoopVariant,
    pub task_kinds: &'static [TaskKindTag],
    /// `None` accepts any target node kind.
    pub target_kinds: Option<&'static [NodeKind]>,
    pub sources: &'static [NodeKind],
    pub sinks: &'static [NodeKind],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopVariant {
    Hauler,
    LabTender,
    Courier,
}

impl LogisticsProfile {
    pub const HAULER: LogisticsProfile = LogisticsProfile {
        variant: LoopVariant::Hauler,
        task_kinds: &[TaskKindTag::Unload, TaskKindTag::Load],
        target_kinds: Some(&[
            NodeKind::Container,
            NodeKind::Storage,
            NodeKind::Tower,
            NodeKind::Spawner,
            NodeKind::Extension,
        ]),
        sources: &[NodeKind::Storage, NodeKind::Container, NodeKind::Terminal],
        sinks: &[NodeKind::Storage, NodeKind::Terminal, NodeKind::Container],
    };

    pub const LAB_TENDER: LogisticsProfile = LogisticsProfile {
        variant: LoopVariant::LabTender,
        task_kinds: &[TaskKindTag::Unload, TaskKindTag::Load],
        target_kinds: Some(&[NodeKind::Lab]),
        sources: &[NodeKind::Terminal, NodeKind::Storage],
        sinks: &[NodeKind::Storage, NodeKind::Terminal],
    };

    pub const COURIER: LogisticsProfile = LogisticsProfile {
        variant: LoopVariant::Courier,
        task_kinds: &[TaskKindTag::Transfer],
        target_kinds: Some(&[NodeKind::Storage, NodeKind::Terminal]),
        sources: &[],
        sinks: &[NodeKind::Storage, NodeKind::Terminal],
    };

    pub fn accepts(&self, kind: TaskKindTag, target_kind: NodeKind) -> bool {
        self.task_kinds.contains(&kind)
            && self
                .target_kinds
                .map(|kinds| kinds.contains(&target_kind))
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_costs() {
        let plan = BodyPlan::from_parts(1, 1, 1);
        assert_eq!(plan.cost, 200);
        assert_eq!(plan.capacity, 50);
        assert_eq!(plan.spawn_ticks, 9);
    }

    #[test]
    fn test_affordable_body_steps_down() {
        let full = Role::Hauler.body(Stage::Metropolis);
        let plan = Role::Hauler
            .affordable_body(Stage::Metropolis, 600)
            .unwrap();
        assert!(plan.cost <= 600);
        assert!(plan.cost < full.cost);
        assert!(Role::Miner.affordable_body(Stage::Outpost, 100).is_none());
    }

    #[test]
    fn test_role_names_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::from_name(role.name()), Some(role));
        }
        assert_eq!(Role::from_name("dancer"), None);
    }

    #[test]
    fn test_profiles_split_work() {
        let lab = Role::LabTender.logistics().unwrap();
        assert!(lab.accepts(TaskKindTag::Load, NodeKind::Lab));
        assert!(!lab.accepts(TaskKindTag::Load, NodeKind::Container));

        let hauler = Role::Hauler.logistics().unwrap();
        assert!(hauler.accepts(TaskKindTag::Unload, NodeKind::Container));
        assert!(!hauler.accepts(TaskKindTag::Transfer, NodeKind::Storage));

        let courier = Role::Courier.logistics().unwrap();
        assert!(courier.accepts(TaskKindTag::Transfer, NodeKind::Terminal));
        assert!(Role::Miner.logistics().is_none());
    }
}
