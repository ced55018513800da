//! Fleet sizing - how many workers of each role a colony should have.
//!
//! The plan is a pure function of a [`ColonyCensus`]: a maturity stage picks
//! baseline targets, then situational rules adjust them in a fixed order
//! (later rules win for the roles they touch):
//!
//! 1. Starvation: no primary gatherers alive forces one and puts the role
//!    first in the production order.
//! 2. Under attack: defenders are added, more when towers are missing or
//!    undercharged.
//! 3. Dedicated roles are capped to the number of nodes they service.
//! 4. No construction backlog trims builders down to one.
//!
//! Open logistics work adds haulers and a construction backlog adds builders
//! before the caps apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::OverseerConfig;
use crate::resources::NodeKind;
use crate::roles::Role;

/// Colony maturity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Spawner only.
    Outpost,
    /// First ring of extensions.
    Settlement,
    /// Towers online or a full extension field.
    Established,
    /// Central storage built.
    Fortified,
    /// Terminal and a lab cluster.
    Metropolis,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Outpost,
        Stage::Settlement,
        Stage::Established,
        Stage::Fortified,
        Stage::Metropolis,
    ];

    /// 1-based ordinal.
    pub fn tier(&self) -> u8 {
        match self {
            Stage::Outpost => 1,
            Stage::Settlement => 2,
            Stage::Established => 3,
            Stage::Fortified => 4,
            Stage::Metropolis => 5,
        }
    }

    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Outpost => None,
            Stage::Settlement => Some(Stage::Outpost),
            Stage::Established => Some(Stage::Settlement),
            Stage::Fortified => Some(Stage::Established),
            Stage::Metropolis => Some(Stage::Fortified),
        }
    }

    pub fn from_census(census: &ColonyCensus) -> Stage {
        let count = |kind| census.nodes_of(kind);
        if count(NodeKind::Storage) > 0 && count(NodeKind::Terminal) > 0 && count(NodeKind::Lab) >= 3
        {
            Stage::Metropolis
        } else if count(NodeKind::Storage) > 0 {
            Stage::Fortified
        } else if count(NodeKind::Tower) > 0 || count(NodeKind::Extension) >= 10 {
            Stage::Established
        } else if count(NodeKind::Extension) >= 5 {
            Stage::Settlement
        } else {
            Stage::Outpost
        }
    }

    fn baseline(&self) -> &'static [(Role, u32)] {
        match self {
            Stage::Outpost => &[(Role::Harvester, 4), (Role::Upgrader, 1), (Role::Builder, 2)],
            Stage::Settlement => &[(Role::Harvester, 3), (Role::Upgrader, 2), (Role::Builder, 2)],
            Stage::Established => &[
                (Role::Harvester, 2),
                (Role::Miner, 2),
                (Role::Hauler, 2),
                (Role::Upgrader, 2),
                (Role::Builder, 2),
            ],
            Stage::Fortified => &[
                (Role::Harvester, 1),
                (Role::Miner, 2),
                (Role::Hauler, 2),
                (Role::Upgrader, 2),
                (Role::Builder, 1),
            ],
            Stage::Metropolis => &[
                (Role::Harvester, 1),
                (Role::Miner, 2),
                (Role::Hauler, 3),
                (Role::Upgrader, 1),
                (Role::Builder, 1),
                (Role::LabTender, 1),
                (Role::Courier, 1),
            ],
        }
    }
}

/// Observable colony state the plan is derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColonyCensus {
    pub controller_level: u8,
    pub under_attack: bool,
    pub node_counts: BTreeMap<NodeKind, u32>,
    pub tower_energy: u32,
    pub tower_capacity: u32,
    /// Construction sites with work remaining.
    pub construction_backlog: u32,
    /// Open logistics tasks targeting this colony's nodes.
    pub open_tasks: u32,
    pub population: BTreeMap<Role, u32>,
}

impl ColonyCensus {
    pub fn nodes_of(&self, kind: NodeKind) -> u32 {
        self.node_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn population_of(&self, role: Role) -> u32 {
        self.population.get(&role).copied().unwrap_or(0)
    }

    /// Towers exist and hold at least the configured share of their capacity.
    pub fn defenses_charged(&self, config: &OverseerConfig) -> bool {
        self.nodes_of(NodeKind::Tower) > 0
            && self.tower_capacity > 0
            && self.tower_energy as f32 >= self.tower_capacity as f32 * config.tower_charged_ratio
    }
}

/// Desired population per role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetTargets(BTreeMap<Role, u32>);

impl FleetTargets {
    pub fn get(&self, role: Role) -> u32 {
        self.0.get(&role).copied().unwrap_or(0)
    }

    pub fn set(&mut self, role: Role, count: u32) {
        if count == 0 {
            self.0.remove(&role);
        } else {
            self.0.insert(role, count);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, u32)> + '_ {
        self.0.iter().map(|(r, c)| (*r, *c))
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<Role, u32> {
        &self.0
    }
}

/// Targets plus the order roles are produced in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetPlan {
    pub stage: Stage,
    pub targets: FleetTargets,
    pub priority: Vec<Role>,
    pub starving: bool,
}

const DEFAULT_ORDER: [Role; 8] = [
    Role::Harvester,
    Role::Miner,
    Role::Hauler,
    Role::Defender,
    Role::Upgrader,
    Role::Builder,
    Role::LabTender,
    Role::Courier,
];

fn move_to_front(order: &mut Vec<Role>, role: Role) {
    if let Some(pos) = order.iter().position(|r| *r == role) {
        let r = order.remove(pos);
        order.insert(0, r);
    }
}

/// Compute the full plan. Pure: the same census always yields the same plan.
pub fn plan_fleet(census: &ColonyCensus, config: &OverseerConfig) -> FleetPlan {
    let stage = Stage::from_census(census);
    let mut targets = FleetTargets::default();
    for (role, count) in stage.baseline() {
        targets.set(*role, *count);
    }

    // Demand scaling from open work.
    let haulers = targets.get(Role::Hauler);
    if haulers > 0 && config.tasks_per_hauler > 0 {
        let extra = (census.open_tasks / config.tasks_per_hauler).min(config.max_extra_haulers);
        targets.set(Role::Hauler, haulers + extra);
    }
    let builders = targets.get(Role::Builder);
    if builders > 0 && config.sites_per_builder > 0 {
        let extra =
            (census.construction_backlog / config.sites_per_builder).min(config.max_extra_builders);
        targets.set(Role::Builder, builders + extra);
    }

    let mut priority = DEFAULT_ORDER.to_vec();

    // 1. Starvation recovery.
    let starving = Role::ALL
        .iter()
        .filter(|r| r.is_primary_gatherer())
        .any(|r| census.population_of(*r) == 0);
    if starving {
        for role in Role::ALL.iter().filter(|r| r.is_primary_gatherer()) {
            targets.set(*role, targets.get(*role).max(1));
        }
    }

    // 2. Under attack.
    if census.under_attack {
        let extra = if census.defenses_charged(config) {
            1
        } else if census.nodes_of(NodeKind::Tower) > 0 {
            2
        } else {
            2 + u32::from(census.controller_level < config.tower_controller_level)
        };
        targets.set(Role::Defender, targets.get(Role::Defender) + extra);
        move_to_front(&mut priority, Role::Defender);
    }

    // Without energy income nothing else can be produced, so the gatherer
    // stays ahead of defenders.
    if starving {
        for role in Role::ALL.iter().filter(|r| r.is_primary_gatherer()) {
            move_to_front(&mut priority, *role);
        }
    }

    // 3. Never more dedicated workers than serviced nodes.
    for role in Role::ALL {
        if let Some(kind) = role.serviced_node() {
            let cap = census.nodes_of(kind);
            targets.set(role, targets.get(role).min(cap));
        }
    }

    // 4. Nothing to build.
    if census.construction_backlog == 0 && targets.get(Role::Builder) > 1 {
        targets.set(Role::Builder, 1);
    }

    FleetPlan {
        stage,
        targets,
        priority,
        starving,
    }
}

/// First role in production order whose population is below target.
pub fn next_to_produce(plan: &FleetPlan, census: &ColonyCensus) -> Option<Role> {
    plan.priority
        .iter()
        .copied()
        .find(|role| census.population_of(*role) < plan.targets.get(*role))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn census(nodes: &[(NodeKind, u32)], population: &[(Role, u32)]) -> ColonyCensus {
        ColonyCensus {
            controller_level: 1,
            node_counts: nodes.iter().copied().collect(),
            population: population.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_ladder() {
        assert_eq!(Stage::from_census(&census(&[], &[])), Stage::Outpost);
        assert_eq!(
            Stage::from_census(&census(&[(NodeKind::Extension, 5)], &[])),
            Stage::Settlement
        );
        assert_eq!(
            Stage::from_census(&census(&[(NodeKind::Tower, 1)], &[])),
            Stage::Established
        );
        assert_eq!(
            Stage::from_census(&census(&[(NodeKind::Storage, 1)], &[])),
            Stage::Fortified
        );
        assert_eq!(
            Stage::from_census(&census(
                &[(NodeKind::Storage, 1), (NodeKind::Terminal, 1), (NodeKind::Lab, 3)],
                &[]
            )),
            Stage::Metropolis
        );
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = OverseerConfig::default();
        let c = census(
            &[(NodeKind::Storage, 1), (NodeKind::Source, 2)],
            &[(Role::Harvester, 1), (Role::Hauler, 1)],
        );
        assert_eq!(plan_fleet(&c, &config), plan_fleet(&c, &config));
    }

    #[test]
    fn test_starvation_recovery() {
        let config = OverseerConfig::default();
        let c = census(
            &[(NodeKind::Storage, 1), (NodeKind::Source, 2)],
            &[(Role::Hauler, 2), (Role::Miner, 2)],
        );
        let plan = plan_fleet(&c, &config);
        assert!(plan.starving);
        assert!(plan.targets.get(Role::Harvester) >= 1);
        assert_eq!(plan.priority[0], Role::Harvester);
        assert_eq!(next_to_produce(&plan, &c), Some(Role::Harvester));
    }

    #[test]
    fn test_starvation_stays_ahead_of_defense() {
        let config = OverseerConfig::default();
        let mut c = census(&[], &[]);
        c.under_attack = true;
        let plan = plan_fleet(&c, &config);
        assert_eq!(plan.priority[0], Role::Harvester);
        assert_eq!(plan.priority[1], Role::Defender);
    }

    #[test]
    fn test_attack_without_towers() {
        let config = OverseerConfig::default();
        let mut c = census(&[], &[(Role::Harvester, 4)]);
        assert_eq!(plan_fleet(&c, &config).targets.get(Role::Defender), 0);

        c.under_attack = true;
        let plan = plan_fleet(&c, &config);
        assert!(plan.targets.get(Role::Defender) >= 2);
        assert_eq!(plan.priority[0], Role::Defender);
        assert_eq!(next_to_produce(&plan, &c), Some(Role::Defender));
    }

    #[test]
    fn test_attack_escalation_by_tower_charge() {
        let config = OverseerConfig::default();
        let mut c = census(&[(NodeKind::Tower, 2)], &[(Role::Harvester, 2)]);
        c.controller_level = 3;
        c.under_attack = true;
        c.tower_capacity = 2000;

        c.tower_energy = 2000;
        assert_eq!(plan_fleet(&c, &config).targets.get(Role::Defender), 1);
        c.tower_energy = 100;
        assert_eq!(plan_fleet(&c, &config).targets.get(Role::Defender), 2);
    }

    #[test]
    fn test_dedicated_roles_capped_by_nodes() {
        let config = OverseerConfig::default();
        let c = census(
            &[
                (NodeKind::Storage, 1),
                (NodeKind::Terminal, 1),
                (NodeKind::Lab, 3),
                (NodeKind::Source, 1),
            ],
            &[(Role::Harvester, 1)],
        );
        let plan = plan_fleet(&c, &config);
        assert_eq!(plan.stage, Stage::Metropolis);
        assert_eq!(plan.targets.get(Role::Miner), 1);
        assert_eq!(plan.targets.get(Role::Courier), 1);

        let none = census(&[(NodeKind::Tower, 1)], &[(Role::Harvester, 1)]);
        assert_eq!(plan_fleet(&none, &config).targets.get(Role::Miner), 0);
    }

    #[test]
    fn test_builders_follow_backlog() {
        let config = OverseerConfig::default();
        let mut c = census(&[], &[(Role::Harvester, 4)]);
        assert_eq!(plan_fleet(&c, &config).targets.get(Role::Builder), 1);

        c.construction_backlog = 12;
        assert!(plan_fleet(&c, &config).targets.get(Role::Builder) > 2);
    }

    #[test]
    fn test_open_tasks_add_haulers() {
        let config = OverseerConfig::default();
        let mut c = census(&[(NodeKind::Tower, 1)], &[(Role::Harvester, 2)]);
        let base = plan_fleet(&c, &config).targets.get(Role::Hauler);
        c.open_tasks = 100;
        let busy = plan_fleet(&c, &config).targets.get(Role::Hauler);
        assert_eq!(busy, base + config.max_extra_haulers);
    }

    #[test]
    fn test_next_to_produce_none_when_full() {
        let config = OverseerConfig::default();
        let c = census(
            &[],
            &[(Role::Harvester, 4), (Role::Upgrader, 1), (Role::Builder, 1)],
        );
        let plan = plan_fleet(&c, &config);
        assert_eq!(next_to_produce(&plan, &c), None);
    }
}
