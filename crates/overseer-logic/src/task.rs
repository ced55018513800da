//! Task registry - persistent logistics work with single-writer claims.
//!
//! A task asks for `amount` units of one resource to be moved into
//! (`Load`), out of (`Unload`) or from a node to another node (`Transfer`).
//! At most one open task exists per `(target, resource, kind)`; repeated
//! requests merge into it. A task is claimed by at most one worker at a time.
//!
//! Claims are checked and set inside one call. The tick runs every decision
//! point sequentially, so no other claim can interleave between the check and
//! the write.
//!
//! Priorities are "higher is more urgent". Ties go to the oldest task (lowest
//! id), which keeps long-waiting work from starving.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resources::{NodeId, ResourceType, TaskId, WorkerId};

/// Discriminant of [`TaskKind`], used for filtering and dedup keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskKindTag {
    Load,
    Unload,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Bring the resource to the target node from any suitable source.
    Load,
    /// Take the resource out of the target node to any suitable sink.
    Unload,
    /// Carry the resource from the target node to a fixed destination.
    Transfer { to: NodeId },
}

impl TaskKind {
    pub fn tag(&self) -> TaskKindTag {
        match self {
            TaskKind::Load => TaskKindTag::Load,
            TaskKind::Unload => TaskKindTag::Unload,
            TaskKind::Transfer { .. } => TaskKindTag::Transfer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: NodeId,
    pub resource: ResourceType,
    /// Remaining quantity.
    pub amount: u32,
    pub priority: i32,
    pub assignee: Option<WorkerId>,
    pub created_at: u64,
    pub expires_at: u64,
    /// Sum of every request merged into this task.
    pub requested_total: u32,
    /// Sum of every delivery recorded against this task.
    pub delivered: u32,
}

impl Task {
    pub fn is_claimed(&self) -> bool {
        self.assignee.is_some()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at < now
    }

    fn same_work(&self, target: NodeId, kind: TaskKind, resource: ResourceType) -> bool {
        self.target == target && self.kind == kind && self.resource == resource
    }
}

/// Parameters of a task request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRequest {
    pub target: NodeId,
    pub kind: TaskKind,
    pub resource: ResourceType,
    pub amount: u32,
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    NotFound(TaskId),
    AlreadyClaimed { task: TaskId, by: WorkerId },
    NotAssignee { task: TaskId, worker: WorkerId },
    InvalidAmount,
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::NotFound(id) => write!(f, "{} not found", id),
            TaskError::AlreadyClaimed { task, by } => {
                write!(f, "{} already claimed by {}", task, by)
            }
            TaskError::NotAssignee { task, worker } => {
                write!(f, "{} is not assigned to {}", task, worker)
            }
            TaskError::InvalidAmount => write!(f, "task amount must be positive"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Outcome of [`TaskRegistry::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Created(TaskId),
    Merged(TaskId),
}

impl RequestOutcome {
    pub fn id(&self) -> TaskId {
        match self {
            RequestOutcome::Created(id) | RequestOutcome::Merged(id) => *id,
        }
    }
}

/// Why a task was garbage collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Elapsed,
    TargetGone,
    DestinationGone,
    AssigneeGone,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Open (non-expired) task for the same unit of work, if any.
    pub fn find_open(
        &self,
        target: NodeId,
        kind: TaskKind,
        resource: ResourceType,
        now: u64,
    ) -> Option<&Task> {
        self.tasks
            .values()
            .find(|t| !t.is_expired(now) && t.same_work(target, kind, resource))
    }

    /// Create a task or merge into the equivalent open one.
    ///
    /// Merging adds the requested amount (saturating), keeps the more urgent
    /// priority and pushes the expiry out to `now + horizon`.
    pub fn request(
        &mut self,
        request: TaskRequest,
        now: u64,
        horizon: u64,
    ) -> Result<RequestOutcome, TaskError> {
        if request.amount == 0 {
            return Err(TaskError::InvalidAmount);
        }

        let existing = self
            .tasks
            .values_mut()
            .find(|t| {
                !t.is_expired(now) && t.same_work(request.target, request.kind, request.resource)
            });
        if let Some(task) = existing {
            task.amount = task.amount.saturating_add(request.amount);
            task.requested_total = task.requested_total.saturating_add(request.amount);
            task.priority = task.priority.max(request.priority);
            task.expires_at = task.expires_at.max(now.saturating_add(horizon));
            return Ok(RequestOutcome::Merged(task.id));
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(
            id,
            Task {
                id,
                kind: request.kind,
                target: request.target,
                resource: request.resource,
                amount: request.amount,
                priority: request.priority,
                assignee: None,
                created_at: now,
                expires_at: now.saturating_add(horizon),
                requested_total: request.amount,
                delivered: 0,
            },
        );
        Ok(RequestOutcome::Created(id))
    }

    /// Assign `task` to `worker`. Fails if anyone already holds it.
    pub fn claim(&mut self, task: TaskId, worker: WorkerId) -> Result<(), TaskError> {
        let entry = self.tasks.get_mut(&task).ok_or(TaskError::NotFound(task))?;
        if let Some(by) = entry.assignee {
            return Err(TaskError::AlreadyClaimed { task, by });
        }
        entry.assignee = Some(worker);
        Ok(())
    }

    /// Clear the claim if `worker` holds it. Returns whether anything changed.
    pub fn release(&mut self, task: TaskId, worker: WorkerId) -> bool {
        match self.tasks.get_mut(&task) {
            Some(entry) if entry.assignee == Some(worker) => {
                entry.assignee = None;
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, task: TaskId) -> Option<Task> {
        self.tasks.remove(&task)
    }

    /// Record `amount` units delivered by the assignee, returning the
    /// remaining amount. Deliveries beyond the remaining amount are not
    /// counted.
    pub fn record_delivery(
        &mut self,
        task: TaskId,
        worker: WorkerId,
        amount: u32,
    ) -> Result<u32, TaskError> {
        let entry = self.tasks.get_mut(&task).ok_or(TaskError::NotFound(task))?;
        if entry.assignee != Some(worker) {
            return Err(TaskError::NotAssignee { task, worker });
        }
        let counted = amount.min(entry.amount);
        entry.amount -= counted;
        entry.delivered = entry.delivered.saturating_add(counted);
        Ok(entry.amount)
    }

    /// Drop tasks that have expired or reference something that no longer
    /// exists. Must run before any claim attempt in a tick.
    pub fn garbage_collect(
        &mut self,
        now: u64,
        node_exists: impl Fn(NodeId) -> bool,
        worker_exists: impl Fn(WorkerId) -> bool,
    ) -> Vec<(Task, Expiry)> {
        let mut doomed = Vec::new();
        for task in self.tasks.values() {
            let reason = if task.is_expired(now) {
                Some(Expiry::Elapsed)
            } else if !node_exists(task.target) {
                Some(Expiry::TargetGone)
            } else if matches!(task.kind, TaskKind::Transfer { to } if !node_exists(to)) {
                Some(Expiry::DestinationGone)
            } else if task.assignee.is_some_and(|w| !worker_exists(w)) {
                Some(Expiry::AssigneeGone)
            } else {
                None
            };
            if let Some(reason) = reason {
                doomed.push((task.id, reason));
            }
        }

        doomed
            .into_iter()
            .filter_map(|(id, reason)| self.tasks.remove(&id).map(|t| (t, reason)))
            .collect()
    }

    /// Open, unclaimed tasks passing `filter`, most urgent first.
    pub fn claimable(&self, now: u64, filter: impl Fn(&Task) -> bool) -> Vec<TaskId> {
        let mut open: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| !t.is_claimed() && !t.is_expired(now) && t.amount > 0 && filter(t))
            .collect();
        open.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        open.into_iter().map(|t| t.id).collect()
    }

    /// Claim the first claimable task for `worker`. Contention on a
    /// candidate just moves on to the next one.
    pub fn claim_next(
        &mut self,
        worker: WorkerId,
        now: u64,
        filter: impl Fn(&Task) -> bool,
    ) -> Option<TaskId> {
        self.claimable(now, filter)
            .into_iter()
            .find(|id| self.claim(*id, worker).is_ok())
    }

    /// Task currently held by `worker`, if any.
    pub fn held_by(&self, worker: WorkerId) -> Option<&Task> {
        self.tasks.values().find(|t| t.assignee == Some(worker))
    }

    /// Total requested but not yet delivered for one unit of work.
    pub fn outstanding(
        &self,
        target: NodeId,
        kind: TaskKind,
        resource: ResourceType,
        now: u64,
    ) -> u32 {
        self.find_open(target, kind, resource, now)
            .map(|t| t.amount)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(target: u32, amount: u32, priority: i32) -> TaskRequest {
        TaskRequest {
            target: NodeId(target),
            kind: TaskKind::Load,
            resource: ResourceType::Energy,
            amount,
            priority,
        }
    }

    #[test]
    fn test_request_creates_then_merges() {
        let mut registry = TaskRegistry::new();
        let first = registry.request(load(1, 100, 5), 0, 500).unwrap();
        let second = registry.request(load(1, 40, 7), 3, 500).unwrap();

        assert!(matches!(first, RequestOutcome::Created(_)));
        assert_eq!(second, RequestOutcome::Merged(first.id()));
        assert_eq!(registry.len(), 1);

        let task = registry.get(first.id()).unwrap();
        assert!(task.amount >= 100);
        assert_eq!(task.amount, 140);
        assert_eq!(task.priority, 7);
        assert_eq!(task.expires_at, 503);
    }

    #[test]
    fn test_request_distinguishes_kind_and_resource() {
        let mut registry = TaskRegistry::new();
        registry.request(load(1, 10, 1), 0, 500).unwrap();
        let mut unload = load(1, 10, 1);
        unload.kind = TaskKind::Unload;
        registry.request(unload, 0, 500).unwrap();
        let mut oxygen = load(1, 10, 1);
        oxygen.resource = ResourceType::Oxygen;
        registry.request(oxygen, 0, 500).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut registry = TaskRegistry::new();
        assert_eq!(
            registry.request(load(1, 0, 1), 0, 500),
            Err(TaskError::InvalidAmount)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_merge_saturates() {
        let mut registry = TaskRegistry::new();
        let id = registry.request(load(1, u32::MAX - 1, 1), 0, 500).unwrap().id();
        registry.request(load(1, 10, 1), 0, 500).unwrap();
        assert_eq!(registry.get(id).unwrap().amount, u32::MAX);
    }

    #[test]
    fn test_expired_task_is_not_merged() {
        let mut registry = TaskRegistry::new();
        let old = registry.request(load(1, 10, 1), 0, 5).unwrap().id();
        let new = registry.request(load(1, 10, 1), 10, 5).unwrap();
        assert!(matches!(new, RequestOutcome::Created(id) if id != old));
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut registry = TaskRegistry::new();
        let id = registry.request(load(1, 10, 1), 0, 500).unwrap().id();

        assert!(registry.claim(id, WorkerId(1)).is_ok());
        assert_eq!(
            registry.claim(id, WorkerId(2)),
            Err(TaskError::AlreadyClaimed {
                task: id,
                by: WorkerId(1)
            })
        );
        assert_eq!(registry.get(id).unwrap().assignee, Some(WorkerId(1)));
        assert_eq!(
            registry.claim(TaskId(99), WorkerId(2)),
            Err(TaskError::NotFound(TaskId(99)))
        );
    }

    #[test]
    fn test_release_only_by_assignee() {
        let mut registry = TaskRegistry::new();
        let id = registry.request(load(1, 10, 1), 0, 500).unwrap().id();
        registry.claim(id, WorkerId(1)).unwrap();

        assert!(!registry.release(id, WorkerId(2)));
        assert_eq!(registry.get(id).unwrap().assignee, Some(WorkerId(1)));
        assert!(registry.release(id, WorkerId(1)));
        assert!(!registry.release(id, WorkerId(1)));
        assert!(registry.claim(id, WorkerId(2)).is_ok());
    }

    #[test]
    fn test_claimable_order_priority_then_age() {
        let mut registry = TaskRegistry::new();
        let low = registry.request(load(1, 10, 1), 0, 500).unwrap().id();
        let high_old = registry.request(load(2, 10, 9), 0, 500).unwrap().id();
        let high_new = registry.request(load(3, 10, 9), 1, 500).unwrap().id();
        let claimed = registry.request(load(4, 10, 20), 1, 500).unwrap().id();
        registry.claim(claimed, WorkerId(7)).unwrap();

        assert_eq!(registry.claimable(2, |_| true), vec![high_old, high_new, low]);
    }

    #[test]
    fn test_claim_next_skips_contended() {
        let mut registry = TaskRegistry::new();
        let only = registry.request(load(1, 10, 1), 0, 500).unwrap().id();

        assert_eq!(registry.claim_next(WorkerId(1), 0, |_| true), Some(only));
        assert_eq!(registry.claim_next(WorkerId(2), 0, |_| true), None);
        assert_eq!(registry.held_by(WorkerId(1)).map(|t| t.id), Some(only));
        assert!(registry.held_by(WorkerId(2)).is_none());
    }

    #[test]
    fn test_record_delivery_never_overcounts() {
        let mut registry = TaskRegistry::new();
        let id = registry.request(load(1, 100, 1), 0, 500).unwrap().id();
        registry.claim(id, WorkerId(1)).unwrap();

        assert_eq!(registry.record_delivery(id, WorkerId(1), 60), Ok(40));
        assert_eq!(registry.record_delivery(id, WorkerId(1), 60), Ok(0));
        let task = registry.get(id).unwrap();
        assert_eq!(task.delivered, 100);
        assert!(task.delivered <= task.requested_total);
        assert_eq!(
            registry.record_delivery(id, WorkerId(2), 1),
            Err(TaskError::NotAssignee {
                task: id,
                worker: WorkerId(2)
            })
        );
    }

    #[test]
    fn test_garbage_collect_reasons() {
        let mut registry = TaskRegistry::new();
        let expired = registry.request(load(1, 10, 1), 0, 5).unwrap().id();
        let orphan = registry.request(load(2, 10, 1), 0, 500).unwrap().id();
        let abandoned = registry.request(load(3, 10, 1), 0, 500).unwrap().id();
        let transfer = registry
            .request(
                TaskRequest {
                    target: NodeId(3),
                    kind: TaskKind::Transfer { to: NodeId(2) },
                    resource: ResourceType::Energy,
                    amount: 10,
                    priority: 1,
                },
                0,
                500,
            )
            .unwrap()
            .id();
        let healthy = registry.request(load(4, 10, 1), 0, 500).unwrap().id();
        registry.claim(abandoned, WorkerId(9)).unwrap();
        registry.claim(healthy, WorkerId(1)).unwrap();

        let removed = registry.garbage_collect(10, |n| n != NodeId(2), |w| w == WorkerId(1));
        let reasons: Vec<(TaskId, Expiry)> = removed.iter().map(|(t, r)| (t.id, *r)).collect();

        assert_eq!(
            reasons,
            vec![
                (expired, Expiry::Elapsed),
                (orphan, Expiry::TargetGone),
                (abandoned, Expiry::AssigneeGone),
                (transfer, Expiry::DestinationGone),
            ]
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get(healthy).is_some());
    }
}
