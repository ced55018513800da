//! Colony generation - seeded layouts for the harness and benchmarks.

use rand::Rng;

use overseer_logic::fleet::Stage;
use overseer_logic::resources::{ColonyId, NodeId, NodeKind, Position, ResourceType};
use overseer_logic::roles::Role;
use overseer_logic::task::TaskRegistry;

use crate::components::{Colony, Worker};
use crate::snapshot::Snapshot;
use crate::spawning::take_census;

/// Configuration for colony generation
#[derive(Debug, Clone)]
pub struct ColonyConfig {
    pub id: ColonyId,
    pub name: String,
    /// Edge length of the square room, in tiles.
    pub room_size: i32,
    pub controller_level: u8,
    pub sources: u32,
    pub extensions: u32,
    pub towers: u32,
    pub containers: u32,
    pub storage: bool,
    pub terminal: bool,
    pub labs: u32,
    pub construction_sites: u32,
    /// Fill spawners and extensions at start.
    pub stocked: bool,
    /// Energy placed in storage at start.
    pub stored_energy: u32,
    pub workers: Vec<(Role, u32)>,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            id: ColonyId(0),
            name: "Home".to_string(),
            room_size: 50,
            controller_level: 1,
            sources: 2,
            extensions: 0,
            towers: 0,
            containers: 0,
            storage: false,
            terminal: false,
            labs: 0,
            construction_sites: 1,
            stocked: true,
            stored_energy: 0,
            workers: Vec::new(),
        }
    }
}

impl ColonyConfig {
    /// A mature colony with every node kind present.
    pub fn metropolis(id: ColonyId) -> Self {
        Self {
            id,
            name: format!("Metropolis {}", id.0),
            controller_level: 6,
            sources: 2,
            extensions: 30,
            towers: 2,
            containers: 2,
            storage: true,
            terminal: true,
            labs: 3,
            construction_sites: 2,
            stored_energy: 50_000,
            workers: vec![
                (Role::Harvester, 1),
                (Role::Miner, 2),
                (Role::Hauler, 3),
                (Role::Upgrader, 1),
                (Role::Builder, 1),
                (Role::LabTender, 1),
                (Role::Courier, 1),
            ],
            ..Self::default()
        }
    }
}

/// Ids of everything a generated colony contains.
#[derive(Debug, Clone, Default)]
pub struct ColonyLayout {
    pub colony: ColonyId,
    pub spawner: Option<NodeId>,
    pub controller: Option<NodeId>,
    pub storage: Option<NodeId>,
    pub terminal: Option<NodeId>,
    pub sources: Vec<NodeId>,
    pub containers: Vec<NodeId>,
    pub extensions: Vec<NodeId>,
    pub towers: Vec<NodeId>,
    pub labs: Vec<NodeId>,
    pub construction_sites: Vec<NodeId>,
}

/// Random tile at least `margin` away from the room edge and not already
/// taken. Gives up after a bounded number of tries and reuses the last pick.
fn free_tile(
    rng: &mut impl Rng,
    size: i32,
    margin: i32,
    taken: &mut Vec<Position>,
    near: Option<(Position, i32)>,
) -> Position {
    let lo = margin.min(size / 2);
    let hi = (size - margin).max(lo + 1);
    let mut pick = Position::new(lo, lo);
    for _ in 0..64 {
        pick = match near {
            Some((center, radius)) => Position::new(
                (center.x + rng.gen_range(-radius..=radius)).clamp(lo, hi - 1),
                (center.y + rng.gen_range(-radius..=radius)).clamp(lo, hi - 1),
            ),
            None => Position::new(rng.gen_range(lo..hi), rng.gen_range(lo..hi)),
        };
        if !taken.contains(&pick) {
            break;
        }
    }
    taken.push(pick);
    pick
}

/// Generate a colony layout into the snapshot.
pub fn generate_colony(
    snapshot: &mut Snapshot,
    config: &ColonyConfig,
    rng: &mut impl Rng,
) -> ColonyLayout {
    let size = config.room_size.max(10);
    let center = Position::new(size / 2, size / 2);
    let colony = snapshot.add_colony(
        Colony::new(config.id, config.name.clone(), Position::new(center.x, center.y + 4))
            .with_controller_level(config.controller_level),
    );
    let mut layout = ColonyLayout {
        colony,
        ..Default::default()
    };
    let mut taken = vec![center];

    let spawner = snapshot.spawn_node(NodeKind::Spawner, colony, center);
    layout.spawner = Some(spawner);

    let controller_pos = free_tile(rng, size, 3, &mut taken, None);
    layout.controller = Some(snapshot.spawn_node(NodeKind::Controller, colony, controller_pos));

    for i in 0..config.sources {
        let pos = free_tile(rng, size, 3, &mut taken, None);
        layout
            .sources
            .push(snapshot.spawn_node(NodeKind::Source, colony, pos));
        if i < config.containers {
            let beside = free_tile(rng, size, 2, &mut taken, Some((pos, 1)));
            layout
                .containers
                .push(snapshot.spawn_node(NodeKind::Container, colony, beside));
        }
    }
    for _ in config.sources..config.containers {
        let pos = free_tile(rng, size, 3, &mut taken, None);
        layout
            .containers
            .push(snapshot.spawn_node(NodeKind::Container, colony, pos));
    }

    for _ in 0..config.extensions {
        let pos = free_tile(rng, size, 2, &mut taken, Some((center, 8)));
        layout
            .extensions
            .push(snapshot.spawn_node(NodeKind::Extension, colony, pos));
    }
    for _ in 0..config.towers {
        let pos = free_tile(rng, size, 2, &mut taken, Some((center, 4)));
        layout
            .towers
            .push(snapshot.spawn_node(NodeKind::Tower, colony, pos));
    }
    if config.storage {
        let pos = free_tile(rng, size, 2, &mut taken, Some((center, 3)));
        layout.storage = Some(snapshot.spawn_node(NodeKind::Storage, colony, pos));
    }
    if config.terminal {
        let pos = free_tile(rng, size, 2, &mut taken, Some((center, 3)));
        layout.terminal = Some(snapshot.spawn_node(NodeKind::Terminal, colony, pos));
    }
    for _ in 0..config.labs {
        let pos = free_tile(rng, size, 2, &mut taken, Some((center, 5)));
        layout.labs.push(snapshot.spawn_node(NodeKind::Lab, colony, pos));
    }
    for _ in 0..config.construction_sites {
        let pos = free_tile(rng, size, 2, &mut taken, None);
        layout
            .construction_sites
            .push(snapshot.spawn_node(NodeKind::ConstructionSite, colony, pos));
    }

    if config.stocked {
        for node in layout.spawner.iter().chain(&layout.extensions) {
            snapshot.with_node_mut(*node, |n| n.store.add(ResourceType::Energy, u32::MAX));
        }
    }
    if let Some(storage) = layout.storage {
        snapshot.with_node_mut(storage, |n| {
            n.store.add(ResourceType::Energy, config.stored_energy)
        });
    }
    for source in &layout.sources {
        snapshot.with_node_mut(*source, |n| n.store.add(ResourceType::Energy, 1500));
    }

    let stage = take_census(snapshot, &TaskRegistry::new(), colony, 0)
        .map(|census| Stage::from_census(&census))
        .unwrap_or(Stage::Outpost);
    for (role, count) in &config.workers {
        for _ in 0..*count {
            let pos = free_tile(rng, size, 2, &mut taken, Some((center, 3)));
            snapshot.spawn_worker(pos, |id| Worker::new(id, *role, colony, role.body(stage)));
        }
    }

    log::info!(
        "generated {} '{}' at {:?}: {} sources, {} extensions, {} workers",
        colony,
        config.name,
        stage,
        layout.sources.len(),
        layout.extensions.len(),
        config.workers.iter().map(|(_, n)| n).sum::<u32>()
    );
    layout
}
