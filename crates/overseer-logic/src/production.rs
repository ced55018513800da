//! Production requests - manually queued workers that jump the fleet plan.
//!
//! Entries are ordered by priority (lower value first), then by arrival.
//! An entry leaves the queue exactly once: when its worker is produced or
//! when production fails in a way retrying cannot fix.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::roles::Role;

/// Opaque key/value payload copied onto the produced worker.
pub type InitialState = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub seq: u64,
    pub role: Role,
    pub priority: i32,
    pub initial_state: InitialState,
    pub enqueued_at: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductionQueue {
    entries: Vec<ProductionRequest>,
    next_seq: u64,
}

impl ProductionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enqueue(
        &mut self,
        role: Role,
        priority: i32,
        initial_state: InitialState,
        now: u64,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(ProductionRequest {
            seq,
            role,
            priority,
            initial_state,
            enqueued_at: now,
        });
        seq
    }

    /// Lowest priority value, oldest first among equals.
    pub fn peek(&self) -> Option<&ProductionRequest> {
        self.entries
            .iter()
            .min_by_key(|entry| (entry.priority, entry.seq))
    }

    pub fn remove(&mut self, seq: u64) -> Option<ProductionRequest> {
        let pos = self.entries.iter().position(|e| e.seq == seq)?;
        Some(self.entries.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductionRequest> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_orders_priority_then_fifo() {
        let mut queue = ProductionQueue::new();
        let late = queue.enqueue(Role::Builder, 5, InitialState::new(), 0);
        let first = queue.enqueue(Role::Defender, 1, InitialState::new(), 1);
        let second = queue.enqueue(Role::Hauler, 1, InitialState::new(), 2);

        assert_eq!(queue.peek().map(|e| e.seq), Some(first));
        queue.remove(first);
        assert_eq!(queue.peek().map(|e| e.seq), Some(second));
        queue.remove(second);
        assert_eq!(queue.peek().map(|e| e.seq), Some(late));
    }

    #[test]
    fn test_remove_is_exactly_once() {
        let mut queue = ProductionQueue::new();
        let seq = queue.enqueue(Role::Defender, 0, InitialState::new(), 0);
        assert!(queue.remove(seq).is_some());
        assert!(queue.remove(seq).is_none());
        assert!(queue.is_empty());
    }
}
