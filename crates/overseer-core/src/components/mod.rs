//! Component definitions for the ECS world.
//!
//! Components are pure data attached to entities. Behaviour lives in the
//! worker loop, the production consumer and the engine.

mod colony;
mod node;
mod worker;

pub use colony::*;
pub use node::*;
pub use worker::*;

pub use overseer_logic::resources::Position;
