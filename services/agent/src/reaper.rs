//! Executor process reaper.
//!
//! A second cooperative actor that owns all `waitpid` traffic. The agent
//! registers each launched executor pid with `ReaperHandle::watch`; on a
//! periodic tick the reaper collects at most one zombie and tells the agent
//! which executor died. A process that exits before its watch arrives is
//! buffered so the later watch resolves immediately.
//!
//! The reaper only ever terminates when its link to the agent breaks.

use std::collections::HashMap;
use std::time::Duration;

use flotilla_id::{ExecutorId, FrameworkId};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::AgentHandle;

/// How often the reaper polls for exited children.
pub const REAP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum ReaperMessage {
    Watch {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        pid: i32,
    },
}

/// Handle used by the agent to register executor pids.
#[derive(Clone)]
pub struct ReaperHandle {
    tx: mpsc::UnboundedSender<ReaperMessage>,
}

impl ReaperHandle {
    /// Asks the reaper to watch `pid`. Returns false if the reaper is gone,
    /// which the agent treats as fatal.
    pub fn watch(&self, framework_id: FrameworkId, executor_id: ExecutorId, pid: i32) -> bool {
        self.tx
            .send(ReaperMessage::Watch {
                framework_id,
                executor_id,
                pid,
            })
            .is_ok()
    }
}

/// The reaper actor.
pub struct Reaper {
    agent: AgentHandle,
    rx: mpsc::UnboundedReceiver<ReaperMessage>,
    interval: Duration,

    /// Watched pids and the executor each belongs to.
    watching: HashMap<i32, (FrameworkId, ExecutorId)>,

    /// Exit statuses of processes that died before their watch arrived.
    exited: HashMap<i32, i32>,
}

impl Reaper {
    /// Spawns the reaper with the default poll interval.
    pub fn spawn(agent: AgentHandle) -> ReaperHandle {
        Self::spawn_with_interval(agent, REAP_INTERVAL)
    }

    pub fn spawn_with_interval(agent: AgentHandle, interval: Duration) -> ReaperHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let reaper = Reaper {
            agent,
            rx,
            interval,
            watching: HashMap::new(),
            exited: HashMap::new(),
        };

        tokio::spawn(reaper.run());

        ReaperHandle { tx }
    }

    async fn run(mut self) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                message = self.rx.recv() => match message {
                    Some(ReaperMessage::Watch { framework_id, executor_id, pid }) => {
                        if !self.handle_watch(framework_id, executor_id, pid) {
                            break;
                        }
                    }
                    None => break,
                },

                // The reaper has no reason to outlive the agent.
                _ = self.agent.closed() => {
                    error!("lost the agent");
                    break;
                }

                _ = tick.tick() => {
                    if !self.reap_one() {
                        break;
                    }
                }
            }
        }

        warn!("executor reaper is exiting");
    }

    /// Registers a watch, resolving it immediately when the process already
    /// exited. Returns false when the agent is gone.
    fn handle_watch(&mut self, framework_id: FrameworkId, executor_id: ExecutorId, pid: i32) -> bool {
        if let Some(status) = self.exited.remove(&pid) {
            info!(
                framework_id = %framework_id,
                executor_id = %executor_id,
                pid,
                status,
                "watched process had already exited"
            );
            return self.dispatch(framework_id, executor_id, status);
        }

        info!(pid, executor_id = %executor_id, "reaper watching process");
        self.watching.insert(pid, (framework_id, executor_id));
        true
    }

    /// Collects at most one zombie. Returns false when the agent is gone.
    fn reap_one(&mut self) -> bool {
        let (pid, status) = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => (pid.as_raw(), code),
            Ok(WaitStatus::Signaled(pid, signal, _)) => (pid.as_raw(), 128 + signal as i32),
            Ok(_) => return true,
            Err(Errno::ECHILD) => return true,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                return true;
            }
        };

        info!(pid, status, "reaper collected exited process");

        match self.watching.remove(&pid) {
            Some((framework_id, executor_id)) => self.dispatch(framework_id, executor_id, status),
            None => {
                debug!(pid, "buffering exit of unwatched process");
                self.exited.insert(pid, status);
                true
            }
        }
    }

    fn dispatch(&self, framework_id: FrameworkId, executor_id: ExecutorId, status: i32) -> bool {
        info!(
            framework_id = %framework_id,
            executor_id = %executor_id,
            status,
            "telling agent of exited executor"
        );

        if self.agent.executor_exited(framework_id, executor_id, status) {
            true
        } else {
            error!("lost the agent");
            false
        }
    }
}
