//! Movement collaborator.
//!
//! The core never computes paths. It asks a [`Movement`] implementation to
//! make progress toward a destination and gets back where the worker ended
//! up and whether it is now close enough to interact.

use overseer_logic::resources::{Position, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub position: Position,
    pub in_range: bool,
}

pub trait Movement {
    fn advance(&mut self, worker: WorkerId, from: Position, to: Position, range: u32)
        -> MoveOutcome;
}

/// Straight-line stepping over an open grid, a fixed number of tiles per
/// tick. Stops as soon as the destination is within range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMovement {
    pub tiles_per_tick: u32,
}

impl GridMovement {
    pub fn new(tiles_per_tick: u32) -> Self {
        Self { tiles_per_tick }
    }
}

impl Default for GridMovement {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Movement for GridMovement {
    fn advance(
        &mut self,
        _worker: WorkerId,
        from: Position,
        to: Position,
        range: u32,
    ) -> MoveOutcome {
        let mut position = from;
        let mut steps = 0;
        while !position.in_range(&to, range) && steps < self.tiles_per_tick {
            position = position.step_toward(&to);
            steps += 1;
        }
        MoveOutcome {
            position,
            in_range: position.in_range(&to, range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_movement_stops_in_range() {
        let mut movement = GridMovement::new(10);
        let outcome = movement.advance(
            WorkerId(0),
            Position::new(0, 0),
            Position::new(5, 0),
            1,
        );
        assert_eq!(outcome.position, Position::new(4, 0));
        assert!(outcome.in_range);
    }

    #[test]
    fn test_grid_movement_speed_limit() {
        let mut movement = GridMovement::default();
        let outcome = movement.advance(
            WorkerId(0),
            Position::new(0, 0),
            Position::new(5, 5),
            1,
        );
        assert_eq!(outcome.position, Position::new(1, 1));
        assert!(!outcome.in_range);
    }
}
