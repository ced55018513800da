//! Pure decision logic for the colony overseer.
//!
//! Nothing here touches the ECS world. Functions take plain data and return
//! results, so the registry, the allocator and the fleet planner can be unit
//! tested in isolation and driven by any engine.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`allocator`] | Contention-aware refill target selection, extension grouping |
//! | [`config`] | Tunables and default priorities |
//! | [`fleet`] | Colony stage ladder, per-role targets, production order |
//! | [`production`] | Manually queued production requests |
//! | [`resources`] | Ids, positions, resource types, typed stores |
//! | [`roles`] | Roles, body plans, logistics profiles |
//! | [`task`] | Task registry with merge, claim, release and GC |

pub mod allocator;
pub mod config;
pub mod fleet;
pub mod production;
pub mod resources;
pub mod roles;
pub mod task;
