//! Protocol message and descriptor types.

use serde::{Deserialize, Serialize};

use flotilla_id::{ExecutorId, FrameworkId, SlaveId, TaskId};

use crate::envelope::Endpoint;
use crate::resources::Resources;

/// The lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted by the agent, not yet reported running by its executor.
    Starting,
    /// Reported running by its executor.
    Running,
    /// Completed successfully.
    Finished,
    /// Completed with an error.
    Failed,
    /// Killed on request.
    Killed,
    /// Presumed dead: its executor went away or it was never known.
    Lost,
}

impl TaskState {
    /// True if the state is terminal: the task will never transition again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time report of a task's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,

    /// Opaque payload attached by the reporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// An authoritative state-change record for a task, flowing
/// executor → agent → master and acknowledged back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub framework_id: FrameworkId,

    /// Absent for updates synthesized by the agent for tasks whose executor
    /// is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    pub slave_id: SlaveId,
    pub status: TaskStatus,

    /// Seconds since the Unix epoch at the time the update was produced.
    pub timestamp: f64,

    /// Position in the executor's update stream. Synthesized updates use
    /// `-1` (no stream) for lost tasks and `0` for killed queued tasks.
    pub sequence: i64,
}

/// Description of an agent advertised to the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveInfo {
    pub hostname: String,
    pub public_hostname: String,
    pub resources: Resources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,
}

/// Description of an executor: how to start it and what to hand it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,

    /// Location of the executor program.
    pub uri: String,

    /// Opaque initialization payload passed through at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Description of a framework, including its default executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub name: String,
    pub user: String,
    pub executor: ExecutorInfo,
}

/// A task assignment from the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescription {
    pub task_id: TaskId,
    pub slave_id: SlaveId,
    pub name: String,
    pub resources: Resources,

    /// Overrides the framework's default executor when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorInfo>,
}

/// The agent-side shadow of a launched task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub framework_id: FrameworkId,
    pub executor_id: ExecutorId,
    pub slave_id: SlaveId,
    pub task_id: TaskId,
    pub name: String,
    pub resources: Resources,
    pub state: TaskState,
}

/// Registration arguments handed to an executor once the agent accepts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorArgs {
    pub framework_id: FrameworkId,
    pub executor_id: ExecutorId,
    pub slave_id: SlaveId,
    pub hostname: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Every message of the agent protocol, in both directions.
///
/// Variants are grouped by the link they travel on; `RunTask` and
/// `KillTask` are relayed by the agent and so appear on more than one link
/// with the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Master detector → agent.
    NewMasterDetected { master: Endpoint },
    NoMasterDetected,

    // Master → agent.
    SlaveRegistered { slave_id: SlaveId },
    SlaveReregistered { slave_id: SlaveId },
    RunTask {
        framework_id: FrameworkId,
        framework: FrameworkInfo,
        scheduler: Endpoint,
        task: TaskDescription,
    },
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    KillFramework { framework_id: FrameworkId },
    UpdateFramework {
        framework_id: FrameworkId,
        scheduler: Endpoint,
    },
    StatusUpdateAck {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    Ping,

    // Agent → master.
    RegisterSlave { slave: SlaveInfo },
    ReregisterSlave {
        slave_id: SlaveId,
        slave: SlaveInfo,
        tasks: Vec<Task>,
    },
    StatusUpdate {
        update: StatusUpdate,
        /// Whether the sender retransmits until acknowledged.
        reliable: bool,
    },
    ExitedExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    },
    Pong,

    // Executor → agent.
    RegisterExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },

    // Agent → executor.
    ExecutorRegistered { args: ExecutorArgs },
    KillExecutor,

    // Framework data messages, relayed by the agent in both directions.
    FrameworkToExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: String,
    },
    ExecutorToFramework {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Starting.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Killed.is_terminal());
        assert!(TaskState::Lost.is_terminal());
    }

    #[test]
    fn test_task_state_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskState::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(TaskState::Lost.to_string(), "lost");
    }

    #[test]
    fn test_message_tagged_serialization() {
        let message = Message::KillTask {
            framework_id: FrameworkId::parse("f1").unwrap(),
            task_id: task_id("t1"),
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"kill_task\""));

        let back: Message = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Message::KillTask { .. }));
    }

    #[test]
    fn test_status_update_roundtrip() {
        let update = StatusUpdate {
            framework_id: FrameworkId::parse("f1").unwrap(),
            executor_id: None,
            slave_id: SlaveId::parse("s1").unwrap(),
            status: TaskStatus {
                task_id: task_id("t1"),
                state: TaskState::Lost,
                data: None,
            },
            timestamp: 12.5,
            sequence: -1,
        };

        let json = serde_json::to_string(&update).unwrap();
        // Absent optionals stay off the wire.
        assert!(!json.contains("executor_id"));

        let back: StatusUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, -1);
        assert_eq!(back.status.state, TaskState::Lost);
    }

    #[test]
    fn test_run_task_roundtrip() {
        let message = Message::RunTask {
            framework_id: FrameworkId::parse("f1").unwrap(),
            framework: FrameworkInfo {
                name: "analytics".to_string(),
                user: "svc".to_string(),
                executor: ExecutorInfo {
                    executor_id: ExecutorId::parse("e1").unwrap(),
                    uri: "/opt/executor".to_string(),
                    data: None,
                },
            },
            scheduler: Endpoint::parse("scheduler@10.0.0.3:6000").unwrap(),
            task: TaskDescription {
                task_id: task_id("t1"),
                slave_id: SlaveId::parse("s1").unwrap(),
                name: "crunch".to_string(),
                resources: Resources::parse("cpus:1;mem:128").unwrap(),
                executor: None,
            },
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        match back {
            Message::RunTask { task, .. } => {
                assert_eq!(task.name, "crunch");
                assert_eq!(task.resources.get("mem"), 128.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
