//! Overseer Core - tick engine for a colony of logistics workers.
//!
//! Workers, resource nodes and their positions live in a `hecs` world behind
//! a [`snapshot::Snapshot`] that answers every id lookup with an `Option`.
//! The engine runs the task registry, the fleet scheduler and the production
//! consumer from `overseer-logic` against that world, one tick at a time.
//!
//! # Example
//!
//! ```rust,no_run
//! use overseer_core::prelude::*;
//! use overseer_core::generation::ColonyConfig;
//! use rand::SeedableRng;
//!
//! let mut engine = OverseerEngine::default();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! engine.generate(&ColonyConfig::default(), &mut rng);
//!
//! for _ in 0..1000 {
//!     engine.tick();
//! }
//! ```

pub mod components;
pub mod demand;
pub mod engine;
pub mod generation;
pub mod mechanics;
pub mod movement;
pub mod persistence;
pub mod snapshot;
pub mod spawning;
pub mod worker;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::engine::OverseerEngine;
    pub use crate::snapshot::Snapshot;
    pub use overseer_logic::config::OverseerConfig;
    pub use overseer_logic::resources::{ColonyId, NodeId, NodeKind, ResourceType, TaskId, WorkerId};
    pub use overseer_logic::roles::Role;
}
