//! Colony-wide signals read by the fleet scheduler.

use overseer_logic::resources::{ColonyId, Position};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Colony {
    pub id: ColonyId,
    pub name: String,
    pub controller_level: u8,
    pub under_attack: bool,
    /// Where idle workers wait.
    pub rally_point: Position,
    /// Energy spent on the controller so far.
    pub upgrade_progress: u64,
}

impl Colony {
    pub fn new(id: ColonyId, name: impl Into<String>, rally_point: Position) -> Self {
        Self {
            id,
            name: name.into(),
            controller_level: 1,
            under_attack: false,
            rally_point,
            upgrade_progress: 0,
        }
    }

    pub fn with_controller_level(mut self, level: u8) -> Self {
        self.controller_level = level;
        self
    }
}
