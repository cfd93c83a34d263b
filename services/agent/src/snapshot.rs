//! Read-only introspection documents.
//!
//! The agent answers a snapshot query with these serde-serializable
//! documents; an external HTTP surface can dump them as `info.json`,
//! `frameworks.json`, `tasks.json`, `stats.json` and the plain-text `vars`.

use std::collections::BTreeMap;

use serde::Serialize;

/// Build and session metadata (`info.json`).
#[derive(Debug, Clone, Serialize)]
pub struct InfoSnapshot {
    pub build_version: String,
    pub start_time: String,
    pub endpoint: String,
    pub state: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slave_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
}

/// One executor inside a framework dump.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSnapshot {
    pub executor_id: String,
    pub registered: bool,
    pub directory: String,
    pub resources: BTreeMap<String, f64>,
    pub queued_tasks: Vec<String>,
    pub launched_tasks: Vec<String>,
}

/// One framework in `frameworks.json`.
#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSnapshot {
    pub id: String,
    pub name: String,
    pub user: String,
    pub executors: Vec<ExecutorSnapshot>,
    pub pending_updates: usize,
}

/// One task in `tasks.json`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub framework_id: String,
    pub executor_id: String,
    pub slave_id: String,
    pub name: String,
    pub state: String,
    pub cpus: f64,
    pub mem: f64,
}

/// Counters (`stats.json`).
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime: f64,
    pub total_frameworks: usize,
    pub finished_tasks: u64,
    pub killed_tasks: u64,
    pub failed_tasks: u64,
    pub lost_tasks: u64,
    pub valid_status_updates: u64,
    pub invalid_status_updates: u64,
    pub valid_framework_messages: u64,
    pub invalid_framework_messages: u64,
}

/// Everything the agent exposes read-only, in one reply.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub info: InfoSnapshot,
    pub frameworks: Vec<FrameworkSnapshot>,
    pub tasks: Vec<TaskSnapshot>,
    pub stats: StatsSnapshot,
    pub configuration: BTreeMap<String, String>,
}

impl StateSnapshot {
    /// Renders the plain-text `vars` document: build info, configuration and
    /// counters, one `key value` pair per line.
    pub fn vars(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("build_version {}\n", self.info.build_version));

        for (key, value) in &self.configuration {
            out.push_str(&format!("{key} {value}\n"));
        }

        let stats = &self.stats;
        out.push_str(&format!("uptime {}\n", stats.uptime));
        out.push_str(&format!("total_frameworks {}\n", stats.total_frameworks));
        out.push_str(&format!("finished_tasks {}\n", stats.finished_tasks));
        out.push_str(&format!("killed_tasks {}\n", stats.killed_tasks));
        out.push_str(&format!("failed_tasks {}\n", stats.failed_tasks));
        out.push_str(&format!("lost_tasks {}\n", stats.lost_tasks));
        out.push_str(&format!(
            "valid_status_updates {}\n",
            stats.valid_status_updates
        ));
        out.push_str(&format!(
            "invalid_status_updates {}\n",
            stats.invalid_status_updates
        ));
        out.push_str(&format!(
            "valid_framework_messages {}\n",
            stats.valid_framework_messages
        ));
        out.push_str(&format!(
            "invalid_framework_messages {}\n",
            stats.invalid_framework_messages
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateSnapshot {
        StateSnapshot {
            info: InfoSnapshot {
                build_version: "0.1.0".to_string(),
                start_time: "2024-01-01T00:00:00Z".to_string(),
                endpoint: "slave@127.0.0.1:5051".to_string(),
                state: "registered".to_string(),
                slave_id: Some("s1".to_string()),
                master: Some("master@127.0.0.1:5050".to_string()),
            },
            frameworks: vec![],
            tasks: vec![],
            stats: StatsSnapshot {
                uptime: 12.5,
                total_frameworks: 0,
                finished_tasks: 3,
                killed_tasks: 1,
                failed_tasks: 0,
                lost_tasks: 0,
                valid_status_updates: 4,
                invalid_status_updates: 0,
                valid_framework_messages: 2,
                invalid_framework_messages: 1,
            },
            configuration: BTreeMap::from([(
                "resources".to_string(),
                "cpus:1;mem:1024".to_string(),
            )]),
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"build_version\":\"0.1.0\""));
        assert!(json.contains("\"finished_tasks\":3"));
    }

    #[test]
    fn test_vars_rendering() {
        let vars = sample().vars();
        assert!(vars.contains("build_version 0.1.0\n"));
        assert!(vars.contains("resources cpus:1;mem:1024\n"));
        assert!(vars.contains("killed_tasks 1\n"));
        assert!(vars.contains("valid_framework_messages 2\n"));
    }
}
