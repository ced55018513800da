//! Contention-aware target allocation for refill work.
//!
//! A worker with free cargo picks the node it should fill next. Nodes that
//! other workers are already heading to with enough cargo to cover the
//! deficit are skipped, so two workers never converge on the same small
//! buffer. Ordering is category first, then range, then node id.
//!
//! Clusters of small buffers (extensions) are grouped into grid cells. The
//! worker is routed to the nearest cell that still has work instead of
//! re-ranking every member every tick.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::resources::{NodeId, Position, WorkerId};

/// Urgency class of a refill candidate. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FillCategory {
    /// Towers while the colony is under attack, or a colony with no energy
    /// to produce workers.
    Emergency,
    /// Production buffers (spawners and extensions).
    Production,
    Routine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub node: NodeId,
    pub position: Position,
    pub category: FillCategory,
    /// Free capacity for the resource being delivered.
    pub deficit: u32,
}

/// Another worker's declared target and what it carries toward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commitment {
    pub worker: WorkerId,
    pub target: NodeId,
    pub carrying: u32,
}

/// Sum of what workers other than `me` are bringing to `node`.
pub fn committed_to(node: NodeId, me: WorkerId, commitments: &[Commitment]) -> u32 {
    commitments
        .iter()
        .filter(|c| c.target == node && c.worker != me)
        .map(|c| c.carrying)
        .fold(0u32, |acc, c| acc.saturating_add(c))
}

/// Candidates whose deficit is not already covered by other workers.
pub fn eligible<'a>(
    me: WorkerId,
    candidates: &'a [Candidate],
    commitments: &[Commitment],
) -> Vec<&'a Candidate> {
    candidates
        .iter()
        .filter(|c| c.deficit > 0 && committed_to(c.node, me, commitments) < c.deficit)
        .collect()
}

fn rank(from: Position, candidate: &Candidate) -> (FillCategory, u32, NodeId) {
    (
        candidate.category,
        from.range_to(&candidate.position),
        candidate.node,
    )
}

/// Best eligible node for `me`, or `None` when everything is spoken for.
pub fn pick_target(
    me: WorkerId,
    from: Position,
    candidates: &[Candidate],
    commitments: &[Commitment],
) -> Option<NodeId> {
    eligible(me, candidates, commitments)
        .into_iter()
        .min_by_key(|c| rank(from, c))
        .map(|c| c.node)
}

/// Like [`pick_target`], but inside the winning category, grouped nodes are
/// reached through their group: the nearest group with any eligible member
/// wins and the pick is made among its members only.
pub fn pick_grouped_target(
    me: WorkerId,
    from: Position,
    candidates: &[Candidate],
    commitments: &[Commitment],
    groups: &GroupIndex,
) -> Option<NodeId> {
    let open = eligible(me, candidates, commitments);
    let category = open.iter().map(|c| c.category).min()?;
    let in_category: Vec<&Candidate> = open
        .into_iter()
        .filter(|c| c.category == category)
        .collect();

    let ungrouped_best = in_category
        .iter()
        .filter(|c| groups.group_of(c.node).is_none())
        .min_by_key(|c| rank(from, c));

    let group = groups.nearest_eligible(from, |node| in_category.iter().any(|c| c.node == node));
    let grouped_best = group.and_then(|g| {
        in_category
            .iter()
            .filter(|c| g.members.contains(&c.node))
            .min_by_key(|c| rank(from, c))
    });

    match (ungrouped_best, grouped_best, group) {
        (Some(single), Some(member), Some(g)) => {
            if from.range_to(&single.position) <= from.range_to(&g.center) {
                Some(single.node)
            } else {
                Some(member.node)
            }
        }
        (Some(single), _, _) => Some(single.node),
        (None, Some(member), _) => Some(member.node),
        (None, None, _) => None,
    }
}

/// A spatial cluster of same-kind nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub center: Position,
    pub members: Vec<NodeId>,
}

/// Grid-bucketed grouping of nodes, rebuilt when the member set changes or
/// the cached grouping is older than `ttl` ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIndex {
    cell_size: i32,
    ttl: u64,
    built_at: Option<u64>,
    members: BTreeSet<NodeId>,
    groups: Vec<NodeGroup>,
}

impl GroupIndex {
    pub fn new(cell_size: i32, ttl: u64) -> Self {
        Self {
            cell_size: cell_size.max(1),
            ttl,
            built_at: None,
            members: BTreeSet::new(),
            groups: Vec::new(),
        }
    }

    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    pub fn built_at(&self) -> Option<u64> {
        self.built_at
    }

    pub fn is_stale(&self, now: u64, nodes: &[(NodeId, Position)]) -> bool {
        match self.built_at {
            None => true,
            Some(at) => {
                now.saturating_sub(at) >= self.ttl
                    || nodes.len() != self.members.len()
                    || nodes.iter().any(|(id, _)| !self.members.contains(id))
            }
        }
    }

    /// Rebuild if stale. Returns whether a rebuild happened.
    pub fn refresh(&mut self, now: u64, nodes: &[(NodeId, Position)]) -> bool {
        if !self.is_stale(now, nodes) {
            return false;
        }

        let mut cells: BTreeMap<(i32, i32), Vec<(NodeId, Position)>> = BTreeMap::new();
        for (id, pos) in nodes {
            let cell = (pos.x.div_euclid(self.cell_size), pos.y.div_euclid(self.cell_size));
            cells.entry(cell).or_default().push((*id, *pos));
        }

        self.groups = cells
            .into_values()
            .map(|mut members| {
                members.sort_by_key(|(id, _)| *id);
                let n = members.len() as i64;
                let sx: i64 = members.iter().map(|(_, p)| p.x as i64).sum();
                let sy: i64 = members.iter().map(|(_, p)| p.y as i64).sum();
                NodeGroup {
                    center: Position::new((sx / n) as i32, (sy / n) as i32),
                    members: members.into_iter().map(|(id, _)| id).collect(),
                }
            })
            .collect();
        self.members = nodes.iter().map(|(id, _)| *id).collect();
        self.built_at = Some(now);
        true
    }

    pub fn group_of(&self, node: NodeId) -> Option<&NodeGroup> {
        self.groups.iter().find(|g| g.members.contains(&node))
    }

    /// Nearest group (by center) with at least one member passing `filter`.
    /// Ties go to the group with the lowest first member id.
    pub fn nearest_eligible(
        &self,
        from: Position,
        filter: impl Fn(NodeId) -> bool,
    ) -> Option<&NodeGroup> {
        self.groups
            .iter()
            .filter(|g| g.members.iter().any(|m| filter(*m)))
            .min_by_key(|g| (from.range_to(&g.center), g.members.first().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(node: u32, x: i32, category: FillCategory, deficit: u32) -> Candidate {
        Candidate {
            node: NodeId(node),
            position: Position::new(x, 0),
            category,
            deficit,
        }
    }

    #[test]
    fn test_covered_node_is_excluded() {
        let candidates = [
            candidate(1, 1, FillCategory::Production, 50),
            candidate(2, 9, FillCategory::Production, 50),
        ];
        let commitments = [Commitment {
            worker: WorkerId(1),
            target: NodeId(1),
            carrying: 50,
        }];

        let pick = pick_target(WorkerId(2), Position::new(0, 0), &candidates, &commitments);
        assert_eq!(pick, Some(NodeId(2)));
    }

    #[test]
    fn test_own_commitment_does_not_exclude() {
        let candidates = [candidate(1, 1, FillCategory::Production, 50)];
        let commitments = [Commitment {
            worker: WorkerId(1),
            target: NodeId(1),
            carrying: 50,
        }];
        let pick = pick_target(WorkerId(1), Position::new(0, 0), &candidates, &commitments);
        assert_eq!(pick, Some(NodeId(1)));
    }

    #[test]
    fn test_partial_commitment_keeps_node() {
        let candidates = [candidate(1, 1, FillCategory::Production, 50)];
        let commitments = [Commitment {
            worker: WorkerId(1),
            target: NodeId(1),
            carrying: 30,
        }];
        let pick = pick_target(WorkerId(2), Position::new(0, 0), &candidates, &commitments);
        assert_eq!(pick, Some(NodeId(1)));
    }

    #[test]
    fn test_everything_covered_idles() {
        let candidates = [candidate(1, 1, FillCategory::Production, 50)];
        let commitments = [
            Commitment {
                worker: WorkerId(1),
                target: NodeId(1),
                carrying: 20,
            },
            Commitment {
                worker: WorkerId(3),
                target: NodeId(1),
                carrying: 30,
            },
        ];
        assert_eq!(
            pick_target(WorkerId(2), Position::new(0, 0), &candidates, &commitments),
            None
        );
    }

    #[test]
    fn test_category_beats_distance_and_id_breaks_ties() {
        let candidates = [
            candidate(5, 1, FillCategory::Routine, 10),
            candidate(4, 20, FillCategory::Emergency, 10),
            candidate(3, 20, FillCategory::Emergency, 10),
        ];
        let pick = pick_target(WorkerId(1), Position::new(0, 0), &candidates, &[]);
        assert_eq!(pick, Some(NodeId(3)));
    }

    #[test]
    fn test_group_index_buckets_and_caches() {
        let nodes = vec![
            (NodeId(1), Position::new(1, 1)),
            (NodeId(2), Position::new(3, 3)),
            (NodeId(3), Position::new(21, 1)),
        ];
        let mut index = GroupIndex::new(10, 50);
        assert!(index.refresh(0, &nodes));
        assert_eq!(index.groups().len(), 2);
        assert_eq!(index.groups()[0].members, vec![NodeId(1), NodeId(2)]);
        assert_eq!(index.groups()[0].center, Position::new(2, 2));

        assert!(!index.refresh(10, &nodes));
        assert!(index.refresh(50, &nodes));

        let fewer = &nodes[..2];
        assert!(index.refresh(51, fewer));
        assert_eq!(index.groups().len(), 1);
    }

    #[test]
    fn test_grouped_pick_routes_to_nearest_group() {
        let nodes = vec![
            (NodeId(1), Position::new(1, 0)),
            (NodeId(2), Position::new(2, 0)),
            (NodeId(3), Position::new(31, 0)),
        ];
        let mut index = GroupIndex::new(10, 50);
        index.refresh(0, &nodes);

        let candidates = [
            candidate(1, 1, FillCategory::Production, 50),
            candidate(2, 2, FillCategory::Production, 50),
            candidate(3, 31, FillCategory::Production, 50),
        ];
        let commitments = [Commitment {
            worker: WorkerId(9),
            target: NodeId(1),
            carrying: 50,
        }];

        let pick = pick_grouped_target(
            WorkerId(1),
            Position::new(25, 0),
            &candidates,
            &commitments,
            &index,
        );
        assert_eq!(pick, Some(NodeId(3)));

        let pick = pick_grouped_target(
            WorkerId(1),
            Position::new(0, 0),
            &candidates,
            &commitments,
            &index,
        );
        assert_eq!(pick, Some(NodeId(2)));
    }
}
