//! Agent-local state: the frameworks → executors → tasks tree and the
//! pending status-update table.
//!
//! Ownership is a strict tree. Parents own children; children refer back
//! only by identifier. Removing a framework drops its executors, which drops
//! their tasks and any pending updates for them.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::path::PathBuf;
use std::time::Instant;

use flotilla_id::{ExecutorId, FrameworkId, TaskId};
use flotilla_messages::{
    Endpoint, ExecutorInfo, FrameworkInfo, Resources, StatusUpdate, Task, TaskDescription,
    TaskState,
};

// =============================================================================
// Pending status updates
// =============================================================================

struct Armed {
    update: StatusUpdate,
    deadline: Instant,
}

/// Status updates sent to the master and not yet acknowledged.
///
/// A deadline-ordered min-heap drives retransmission; a per-task map
/// coalesces so that at most one update per task is in flight. Heap entries
/// whose deadline no longer matches the map are stale and skipped lazily.
#[derive(Default)]
pub struct PendingUpdates {
    heap: BinaryHeap<Reverse<(Instant, TaskId)>>,
    armed: HashMap<TaskId, Armed>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `update` for retransmission at `deadline`, replacing any
    /// earlier in-flight update for the same task.
    pub fn arm(&mut self, update: StatusUpdate, deadline: Instant) {
        let task_id = update.status.task_id.clone();
        self.heap.push(Reverse((deadline, task_id.clone())));
        self.armed.insert(task_id, Armed { update, deadline });
    }

    /// Drops the pending update for `task_id`, returning it if present.
    pub fn remove(&mut self, task_id: &TaskId) -> Option<StatusUpdate> {
        self.armed.remove(task_id).map(|armed| armed.update)
    }

    /// Returns every update whose deadline has passed, re-arming each at
    /// `rearm_at` so retries do not spin on every tick.
    pub fn due(&mut self, now: Instant, rearm_at: Instant) -> Vec<StatusUpdate> {
        let mut due = Vec::new();

        while let Some(Reverse((deadline, _))) = self.heap.peek() {
            if *deadline > now {
                break;
            }

            let Some(Reverse((deadline, task_id))) = self.heap.pop() else {
                break;
            };

            match self.armed.get_mut(&task_id) {
                Some(armed) if armed.deadline == deadline => {
                    due.push(armed.update.clone());
                    armed.deadline = rearm_at;
                    self.heap.push(Reverse((rearm_at, task_id)));
                }
                // Acknowledged, superseded, or dropped with its task.
                _ => {}
            }
        }

        due
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.armed.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

// =============================================================================
// Executor
// =============================================================================

/// A framework executor on this agent.
pub struct Executor {
    pub framework_id: FrameworkId,
    pub id: ExecutorId,
    pub info: ExecutorInfo,

    /// Unique work directory allocated at creation.
    pub directory: PathBuf,

    /// Where the executor process registered from; empty until it does.
    pub endpoint: Option<Endpoint>,

    /// Tasks accepted before the executor registered.
    pub queued_tasks: BTreeMap<TaskId, TaskDescription>,

    /// Tasks dispatched to the executor.
    pub launched_tasks: BTreeMap<TaskId, Task>,

    /// Sum of the launched tasks' resources.
    pub resources: Resources,
}

impl Executor {
    pub fn new(framework_id: FrameworkId, info: ExecutorInfo, directory: PathBuf) -> Self {
        let id = info.executor_id.clone();
        Self {
            framework_id,
            id,
            info,
            directory,
            endpoint: None,
            queued_tasks: BTreeMap::new(),
            launched_tasks: BTreeMap::new(),
            resources: Resources::new(),
        }
    }

    /// True once the executor process has registered.
    pub fn registered(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Moves a task into the launched set, accumulating its resources.
    ///
    /// The master enforces task-id uniqueness; a duplicate here would break
    /// the resource accounting invariant.
    pub fn add_task(&mut self, task: &TaskDescription) {
        debug_assert!(!self.launched_tasks.contains_key(&task.task_id));

        let shadow = Task {
            framework_id: self.framework_id.clone(),
            executor_id: self.id.clone(),
            slave_id: task.slave_id.clone(),
            task_id: task.task_id.clone(),
            name: task.name.clone(),
            resources: task.resources.clone(),
            state: TaskState::Starting,
        };

        self.resources.add(&task.resources);
        self.launched_tasks.insert(task.task_id.clone(), shadow);
    }

    /// Removes a task wherever it lives, releasing resources if launched.
    pub fn remove_task(&mut self, task_id: &TaskId) {
        self.queued_tasks.remove(task_id);

        if let Some(task) = self.launched_tasks.remove(task_id) {
            self.resources.subtract(&task.resources);
        }
    }

    pub fn update_task_state(&mut self, task_id: &TaskId, state: TaskState) {
        if let Some(task) = self.launched_tasks.get_mut(task_id) {
            task.state = state;
        }
    }

    pub fn has_task(&self, task_id: &TaskId) -> bool {
        self.queued_tasks.contains_key(task_id) || self.launched_tasks.contains_key(task_id)
    }

    /// Every task id still present, queued or launched.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.queued_tasks
            .keys()
            .chain(self.launched_tasks.keys())
            .cloned()
            .collect()
    }
}

// =============================================================================
// Framework
// =============================================================================

/// A tenant framework with executors on this agent.
pub struct Framework {
    pub id: FrameworkId,
    pub info: FrameworkInfo,

    /// The framework scheduler's endpoint; updated by `UpdateFramework`.
    pub scheduler: Endpoint,

    pub executors: HashMap<ExecutorId, Executor>,

    /// Status updates awaiting acknowledgement from the master.
    pub pending: PendingUpdates,
}

impl Framework {
    pub fn new(id: FrameworkId, info: FrameworkInfo, scheduler: Endpoint) -> Self {
        Self {
            id,
            info,
            scheduler,
            executors: HashMap::new(),
            pending: PendingUpdates::new(),
        }
    }

    /// Creates and stores an executor, returning a reference to it.
    pub fn create_executor(&mut self, info: ExecutorInfo, directory: PathBuf) -> &mut Executor {
        let executor = Executor::new(self.id.clone(), info, directory);
        self.executors.entry(executor.id.clone()).or_insert(executor)
    }

    /// Finds the executor holding `task_id`, queued or launched.
    pub fn executor_id_for_task(&self, task_id: &TaskId) -> Option<ExecutorId> {
        self.executors
            .values()
            .find(|executor| executor.has_task(task_id))
            .map(|executor| executor.id.clone())
    }

    /// Every launched task across all executors.
    pub fn launched_tasks(&self) -> impl Iterator<Item = &Task> {
        self.executors
            .values()
            .flat_map(|executor| executor.launched_tasks.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use flotilla_id::SlaveId;

    fn framework_id() -> FrameworkId {
        FrameworkId::parse("f1").unwrap()
    }

    fn executor_info(id: &str) -> ExecutorInfo {
        ExecutorInfo {
            executor_id: ExecutorId::parse(id).unwrap(),
            uri: "/opt/executor".to_string(),
            data: None,
        }
    }

    fn task(id: &str, resources: &str) -> TaskDescription {
        TaskDescription {
            task_id: TaskId::parse(id).unwrap(),
            slave_id: SlaveId::parse("s1").unwrap(),
            name: format!("task {id}"),
            resources: Resources::parse(resources).unwrap(),
            executor: None,
        }
    }

    fn update_for(task_id: &str) -> StatusUpdate {
        StatusUpdate {
            framework_id: framework_id(),
            executor_id: Some(ExecutorId::parse("e1").unwrap()),
            slave_id: SlaveId::parse("s1").unwrap(),
            status: flotilla_messages::TaskStatus {
                task_id: TaskId::parse(task_id).unwrap(),
                state: TaskState::Running,
                data: None,
            },
            timestamp: 0.0,
            sequence: 1,
        }
    }

    #[test]
    fn test_executor_resource_accounting() {
        let mut executor = Executor::new(framework_id(), executor_info("e1"), PathBuf::from("/w"));

        executor.add_task(&task("t1", "cpus:1;mem:128"));
        executor.add_task(&task("t2", "cpus:2;mem:256"));
        assert_eq!(executor.resources.get("cpus"), 3.0);
        assert_eq!(executor.resources.get("mem"), 384.0);

        executor.remove_task(&TaskId::parse("t1").unwrap());
        assert_eq!(executor.resources.get("cpus"), 2.0);

        executor.remove_task(&TaskId::parse("t2").unwrap());
        assert!(executor.resources.is_empty());
    }

    #[test]
    fn test_executor_remove_queued_task_leaves_resources() {
        let mut executor = Executor::new(framework_id(), executor_info("e1"), PathBuf::from("/w"));

        executor
            .queued_tasks
            .insert(TaskId::parse("t1").unwrap(), task("t1", "cpus:1"));
        executor.remove_task(&TaskId::parse("t1").unwrap());

        assert!(executor.queued_tasks.is_empty());
        assert!(executor.resources.is_empty());
    }

    #[test]
    fn test_framework_finds_executor_for_task() {
        let mut framework = Framework::new(
            framework_id(),
            FrameworkInfo {
                name: "fw".to_string(),
                user: "u".to_string(),
                executor: executor_info("e1"),
            },
            Endpoint::parse("scheduler@10.0.0.3:6000").unwrap(),
        );

        let executor = framework.create_executor(executor_info("e1"), PathBuf::from("/w"));
        executor
            .queued_tasks
            .insert(TaskId::parse("t1").unwrap(), task("t1", "cpus:1"));

        assert_eq!(
            framework.executor_id_for_task(&TaskId::parse("t1").unwrap()),
            Some(ExecutorId::parse("e1").unwrap())
        );
        assert_eq!(
            framework.executor_id_for_task(&TaskId::parse("missing").unwrap()),
            None
        );
    }

    #[test]
    fn test_pending_updates_due_and_rearm() {
        let mut pending = PendingUpdates::new();
        let now = Instant::now();

        pending.arm(update_for("t1"), now);
        pending.arm(update_for("t2"), now + Duration::from_secs(60));

        let due = pending.due(now, now + Duration::from_secs(10));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status.task_id, TaskId::parse("t1").unwrap());

        // t1 was re-armed in the future; nothing is due right away.
        assert!(pending.due(now, now + Duration::from_secs(10)).is_empty());
        assert_eq!(pending.len(), 2);

        // Once the re-armed deadline passes it is due again.
        let later = now + Duration::from_secs(11);
        let due = pending.due(later, later + Duration::from_secs(10));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status.task_id, TaskId::parse("t1").unwrap());
    }

    #[test]
    fn test_pending_updates_acknowledge_removes_one_entry() {
        let mut pending = PendingUpdates::new();
        let now = Instant::now();

        pending.arm(update_for("t1"), now);
        assert!(pending.contains(&TaskId::parse("t1").unwrap()));

        let removed = pending.remove(&TaskId::parse("t1").unwrap());
        assert!(removed.is_some());
        assert!(pending.is_empty());

        // The stale heap entry is skipped, not resent.
        assert!(pending.due(now, now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_pending_updates_coalesce_per_task() {
        let mut pending = PendingUpdates::new();
        let now = Instant::now();

        let mut first = update_for("t1");
        first.sequence = 1;
        let mut second = update_for("t1");
        second.sequence = 2;

        pending.arm(first, now);
        pending.arm(second, now + Duration::from_millis(1));
        assert_eq!(pending.len(), 1);

        let later = now + Duration::from_secs(1);
        let due = pending.due(later, later + Duration::from_secs(10));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].sequence, 2);
    }
}
