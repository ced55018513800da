//! Mobile worker component and its task memory.

use overseer_logic::production::InitialState;
use overseer_logic::resources::{ColonyId, NodeId, ResourceType, Store, TaskId, WorkerId};
use overseer_logic::roles::{BodyPlan, Role};
use overseer_logic::task::{Task, TaskKind};
use serde::{Deserialize, Serialize};

/// Lifespan of a freshly produced worker, in ticks.
pub const WORKER_LIFESPAN: u32 = 1500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerMode {
    #[default]
    Idle,
    Collecting,
    Delivering,
}

/// What a worker remembers about the task it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMemory {
    pub task: TaskId,
    pub kind: TaskKind,
    pub resource: ResourceType,
    pub target: NodeId,
    /// Resolved pickup node for load tasks.
    pub pickup: Option<NodeId>,
    /// Resolved drop-off node for unload tasks.
    pub dropoff: Option<NodeId>,
}

impl TaskMemory {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task: task.id,
            kind: task.kind,
            resource: task.resource,
            target: task.target,
            pickup: None,
            dropoff: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub role: Role,
    pub colony: ColonyId,
    pub body: BodyPlan,
    pub carried: Store,
    pub mode: WorkerMode,
    pub task: Option<TaskMemory>,
    /// Node the worker is currently heading to or working at. Other workers
    /// read it to avoid converging on the same node.
    pub target: Option<NodeId>,
    pub ticks_to_live: u32,
    pub initial_state: InitialState,
}

impl Worker {
    pub fn new(id: WorkerId, role: Role, colony: ColonyId, body: BodyPlan) -> Self {
        Self {
            id,
            role,
            colony,
            body,
            carried: Store::shared(body.capacity),
            mode: WorkerMode::Idle,
            task: None,
            target: None,
            ticks_to_live: WORKER_LIFESPAN,
            initial_state: InitialState::new(),
        }
    }

    pub fn with_state(mut self, state: InitialState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn carrying(&self, resource: ResourceType) -> u32 {
        self.carried.get(resource)
    }

    pub fn is_full(&self) -> bool {
        self.carried.free_for(ResourceType::Energy) == 0
    }

    /// Forget the task and go back to deciding from scratch.
    pub fn reset(&mut self) {
        self.task = None;
        self.mode = WorkerMode::Idle;
        self.target = None;
    }
}
