//! Isolation bridge: how executor processes are launched and confined.
//!
//! The agent drives isolation through a synchronous in-process interface and
//! never from outside its own loop, so implementations need not be
//! reentrant. `ProcessIsolation` runs executors as plain child processes;
//! `MockIsolation` records every call for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use flotilla_id::{ExecutorId, FrameworkId};
use flotilla_messages::{ExecutorInfo, FrameworkInfo, Resources};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// The isolation interface the agent calls.
///
/// `launch_executor` returns the child pid to hand to the reaper, or `None`
/// when the executor is launched through a mechanism that is reaped some
/// other way (or failed to launch; the failure then surfaces as the executor
/// never registering).
pub trait Isolation: Send {
    fn initialize(&mut self, conf: &Config, local: bool);

    fn launch_executor(
        &mut self,
        framework_id: &FrameworkId,
        framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        directory: &Path,
    ) -> Option<i32>;

    /// Informs the isolation mechanism of an executor's new resource total.
    fn resources_changed(
        &mut self,
        framework_id: &FrameworkId,
        framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        resources: &Resources,
    );

    fn kill_executor(
        &mut self,
        framework_id: &FrameworkId,
        framework: &FrameworkInfo,
        executor: &ExecutorInfo,
    );
}

// =============================================================================
// Process isolation
// =============================================================================

/// Runs executors as ordinary child processes with no sandboxing.
///
/// Resource limits are advisory only in this flavor; `resources_changed` is
/// recorded in the log and otherwise ignored.
pub struct ProcessIsolation {
    frameworks_home: Option<String>,
    children: HashMap<(FrameworkId, ExecutorId), i32>,
}

impl ProcessIsolation {
    pub fn new() -> Self {
        Self {
            frameworks_home: None,
            children: HashMap::new(),
        }
    }

    fn resolve_executor_path(&self, uri: &str) -> PathBuf {
        let path = Path::new(uri);
        if path.is_relative() {
            if let Some(home) = &self.frameworks_home {
                return Path::new(home).join(path);
            }
        }
        path.to_path_buf()
    }
}

impl Default for ProcessIsolation {
    fn default() -> Self {
        Self::new()
    }
}

impl Isolation for ProcessIsolation {
    fn initialize(&mut self, conf: &Config, _local: bool) {
        self.frameworks_home = conf.frameworks_home.clone();
    }

    fn launch_executor(
        &mut self,
        framework_id: &FrameworkId,
        _framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        directory: &Path,
    ) -> Option<i32> {
        if let Err(e) = std::fs::create_dir_all(directory) {
            error!(
                framework_id = %framework_id,
                executor_id = %executor.executor_id,
                directory = %directory.display(),
                error = %e,
                "failed to create executor work directory"
            );
            return None;
        }

        let program = self.resolve_executor_path(&executor.uri);

        info!(
            framework_id = %framework_id,
            executor_id = %executor.executor_id,
            program = %program.display(),
            directory = %directory.display(),
            "launching executor"
        );

        let child = Command::new(&program)
            .current_dir(directory)
            .env("FLOTILLA_FRAMEWORK_ID", framework_id.as_str())
            .env("FLOTILLA_EXECUTOR_ID", executor.executor_id.as_str())
            .env("FLOTILLA_WORK_DIR", directory)
            .stdin(Stdio::null())
            .spawn();

        match child {
            Ok(child) => {
                let pid = child.id() as i32;
                self.children
                    .insert((framework_id.clone(), executor.executor_id.clone()), pid);
                Some(pid)
            }
            Err(e) => {
                error!(
                    framework_id = %framework_id,
                    executor_id = %executor.executor_id,
                    program = %program.display(),
                    error = %e,
                    "failed to launch executor"
                );
                None
            }
        }
    }

    fn resources_changed(
        &mut self,
        framework_id: &FrameworkId,
        _framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        resources: &Resources,
    ) {
        debug!(
            framework_id = %framework_id,
            executor_id = %executor.executor_id,
            resources = %resources,
            "executor resource total changed"
        );
    }

    fn kill_executor(
        &mut self,
        framework_id: &FrameworkId,
        _framework: &FrameworkInfo,
        executor: &ExecutorInfo,
    ) {
        let key = (framework_id.clone(), executor.executor_id.clone());
        let Some(pid) = self.children.remove(&key) else {
            warn!(
                framework_id = %framework_id,
                executor_id = %executor.executor_id,
                "asked to kill executor with no known process"
            );
            return;
        };

        info!(
            framework_id = %framework_id,
            executor_id = %executor.executor_id,
            pid,
            "killing executor process"
        );

        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGKILL) {
            warn!(pid, error = %e, "failed to kill executor process");
        }
    }
}

// =============================================================================
// Mock isolation
// =============================================================================

/// A single recorded isolation call.
#[derive(Debug, Clone, PartialEq)]
pub enum IsolationCall {
    Initialized {
        local: bool,
    },
    Launched {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        directory: PathBuf,
    },
    ResourcesChanged {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    },
    Killed {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
}

struct MockState {
    calls: Vec<IsolationCall>,
    next_pid: i32,
    assign_pids: bool,
}

/// Records every isolation call; clones share the record.
#[derive(Clone)]
pub struct MockIsolation {
    state: Arc<Mutex<MockState>>,
}

impl MockIsolation {
    /// A mock that hands out pids 1000, 1001, ...
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                next_pid: 1000,
                assign_pids: true,
            })),
        }
    }

    /// A mock whose launches report no reapable pid.
    pub fn without_pids() -> Self {
        let mock = Self::new();
        mock.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .assign_pids = false;
        mock
    }

    pub fn calls(&self) -> Vec<IsolationCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    pub fn clear_calls(&self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clear();
    }

    /// The resource totals reported so far, in call order.
    pub fn resource_changes(&self) -> Vec<Resources> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                IsolationCall::ResourcesChanged { resources, .. } => Some(resources),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockIsolation {
    fn default() -> Self {
        Self::new()
    }
}

impl Isolation for MockIsolation {
    fn initialize(&mut self, _conf: &Config, local: bool) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(IsolationCall::Initialized { local });
    }

    fn launch_executor(
        &mut self,
        framework_id: &FrameworkId,
        _framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        directory: &Path,
    ) -> Option<i32> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(IsolationCall::Launched {
            framework_id: framework_id.clone(),
            executor_id: executor.executor_id.clone(),
            directory: directory.to_path_buf(),
        });

        if state.assign_pids {
            let pid = state.next_pid;
            state.next_pid += 1;
            Some(pid)
        } else {
            None
        }
    }

    fn resources_changed(
        &mut self,
        framework_id: &FrameworkId,
        _framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        resources: &Resources,
    ) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(IsolationCall::ResourcesChanged {
                framework_id: framework_id.clone(),
                executor_id: executor.executor_id.clone(),
                resources: resources.clone(),
            });
    }

    fn kill_executor(
        &mut self,
        framework_id: &FrameworkId,
        _framework: &FrameworkInfo,
        executor: &ExecutorInfo,
    ) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(IsolationCall::Killed {
                framework_id: framework_id.clone(),
                executor_id: executor.executor_id.clone(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor_info() -> ExecutorInfo {
        ExecutorInfo {
            executor_id: ExecutorId::parse("e1").unwrap(),
            uri: "/bin/true".to_string(),
            data: None,
        }
    }

    fn framework_info() -> FrameworkInfo {
        FrameworkInfo {
            name: "fw".to_string(),
            user: "u".to_string(),
            executor: executor_info(),
        }
    }

    #[test]
    fn test_mock_assigns_sequential_pids() {
        let mut mock = MockIsolation::new();
        let fw = FrameworkId::parse("f1").unwrap();

        let first =
            mock.launch_executor(&fw, &framework_info(), &executor_info(), Path::new("/w/0"));
        let second =
            mock.launch_executor(&fw, &framework_info(), &executor_info(), Path::new("/w/1"));

        assert_eq!(first, Some(1000));
        assert_eq!(second, Some(1001));
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_mock_without_pids() {
        let mut mock = MockIsolation::without_pids();
        let fw = FrameworkId::parse("f1").unwrap();

        let pid = mock.launch_executor(&fw, &framework_info(), &executor_info(), Path::new("/w"));
        assert_eq!(pid, None);
    }

    #[test]
    fn test_mock_records_shared_across_clones() {
        let mock = MockIsolation::new();
        let mut handle = mock.clone();
        let fw = FrameworkId::parse("f1").unwrap();

        handle.kill_executor(&fw, &framework_info(), &executor_info());

        assert_eq!(
            mock.calls(),
            vec![IsolationCall::Killed {
                framework_id: fw,
                executor_id: ExecutorId::parse("e1").unwrap(),
            }]
        );
    }

    #[test]
    fn test_process_isolation_resolves_relative_paths() {
        let mut isolation = ProcessIsolation::new();
        let mut conf = Config::default();
        conf.frameworks_home = Some("/srv/frameworks".to_string());
        isolation.initialize(&conf, true);

        assert_eq!(
            isolation.resolve_executor_path("acme/executor"),
            PathBuf::from("/srv/frameworks/acme/executor")
        );
        assert_eq!(
            isolation.resolve_executor_path("/opt/executor"),
            PathBuf::from("/opt/executor")
        );
    }
}
