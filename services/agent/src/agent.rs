//! The agent actor.
//!
//! A single-threaded event loop owns all agent state: the master session,
//! the frameworks → executors → tasks tree, the pending status-update table
//! and the statistics counters. Events arrive on one mailbox — inbound wire
//! messages, link-exit notifications, reaper reports, introspection queries,
//! terminate — and each handler runs to completion before the next event is
//! served. A one-second housekeeping tick drives status-update
//! retransmission.
//!
//! Nothing here blocks: outbound sends are non-blocking enqueues on the
//! wire, and the isolation bridge is called inline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use flotilla_id::{ExecutorId, FrameworkId, SlaveId, TaskId};
use flotilla_messages::{
    Endpoint, ExecutorArgs, FrameworkInfo, Message, Resources, SlaveInfo, StatusUpdate, Task,
    TaskDescription, TaskState, TaskStatus,
};

use crate::config::Config;
use crate::isolation::Isolation;
use crate::reaper::ReaperHandle;
use crate::session::{MasterSession, Registration, SessionError};
use crate::snapshot::{
    ExecutorSnapshot, FrameworkSnapshot, InfoSnapshot, StateSnapshot, StatsSnapshot, TaskSnapshot,
};
use crate::state::Framework;
use crate::wire::{Wire, WireEvent};

// =============================================================================
// Events and handle
// =============================================================================

/// One event served by the agent loop.
#[derive(Debug)]
pub enum AgentEvent {
    /// A typed wire message from a remote endpoint.
    Message { from: Endpoint, message: Message },

    /// A linked peer's endpoint went away.
    PeerExited { peer: Endpoint },

    /// The reaper observed an executor process exit.
    ExecutorExited {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    },

    /// Read-only introspection query.
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },

    /// Shut down, tearing down every framework.
    Terminate,
}

/// Cloneable sender half of the agent mailbox.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl AgentHandle {
    /// Creates the agent mailbox.
    pub fn channel() -> (AgentHandle, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AgentHandle { tx }, rx)
    }

    /// Feeds a wire event into the mailbox; used as the wire inbox.
    pub fn wire_event(&self, event: WireEvent) {
        let event = match event {
            WireEvent::Delivered(envelope) => AgentEvent::Message {
                from: envelope.from,
                message: envelope.message,
            },
            WireEvent::PeerExited(peer) => AgentEvent::PeerExited { peer },
        };
        let _ = self.tx.send(event);
    }

    /// Reports an executor process exit. Returns false if the agent is gone.
    pub fn executor_exited(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    ) -> bool {
        self.tx
            .send(AgentEvent::ExecutorExited {
                framework_id,
                executor_id,
                status,
            })
            .is_ok()
    }

    /// Fetches a read-only state snapshot, or `None` if the agent is gone.
    pub async fn snapshot(&self) -> Option<StateSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(AgentEvent::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    pub fn terminate(&self) {
        let _ = self.tx.send(AgentEvent::Terminate);
    }

    /// Resolves once the agent mailbox is closed.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

// =============================================================================
// Errors and counters
// =============================================================================

/// Fatal conditions that terminate the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("executor reaper is gone")]
    ReaperLost,
}

#[derive(Debug, Default)]
struct Statistics {
    finished_tasks: u64,
    killed_tasks: u64,
    failed_tasks: u64,
    lost_tasks: u64,
    valid_status_updates: u64,
    invalid_status_updates: u64,
    valid_framework_messages: u64,
    invalid_framework_messages: u64,
}

impl Statistics {
    fn record_terminal(&mut self, state: TaskState) {
        match state {
            TaskState::Finished => self.finished_tasks += 1,
            TaskState::Failed => self.failed_tasks += 1,
            TaskState::Killed => self.killed_tasks += 1,
            TaskState::Lost => self.lost_tasks += 1,
            TaskState::Starting | TaskState::Running => {}
        }
    }
}

// =============================================================================
// The agent
// =============================================================================

pub struct Agent {
    conf: Config,
    local: bool,
    endpoint: Endpoint,
    info: SlaveInfo,

    session: MasterSession,
    frameworks: HashMap<FrameworkId, Framework>,
    stats: Statistics,

    wire: Arc<dyn Wire>,
    isolation: Box<dyn Isolation>,
    reaper: ReaperHandle,

    events: mpsc::UnboundedReceiver<AgentEvent>,

    start_instant: Instant,
    start_time: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        conf: Config,
        local: bool,
        endpoint: Endpoint,
        wire: Arc<dyn Wire>,
        isolation: Box<dyn Isolation>,
        reaper: ReaperHandle,
        events: mpsc::UnboundedReceiver<AgentEvent>,
    ) -> anyhow::Result<Self> {
        let resources = Resources::parse(&conf.resources)?;
        let (hostname, public_hostname) = hostnames();

        let info = SlaveInfo {
            hostname,
            public_hostname,
            resources,
            attributes: conf.attributes.clone(),
        };

        Ok(Self {
            conf,
            local,
            endpoint,
            info,
            session: MasterSession::new(),
            frameworks: HashMap::new(),
            stats: Statistics::default(),
            wire,
            isolation,
            reaper,
            events,
            start_instant: Instant::now(),
            start_time: Utc::now(),
        })
    }

    /// Serves events until terminated or a fatal error occurs. Either way,
    /// every framework (and so every executor and task) is torn down.
    pub async fn run(mut self) -> Result<(), AgentError> {
        info!(
            endpoint = %self.endpoint,
            resources = %self.info.resources,
            "agent started"
        );

        self.isolation.initialize(&self.conf, self.local);

        let mut tick = tokio::time::interval(self.conf.tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Some(AgentEvent::Terminate) | None => {
                        info!("asked to shut down");
                        self.shutdown();
                        return Ok(());
                    }
                    Some(event) => {
                        if let Err(e) = self.handle_event(event) {
                            error!(error = %e, "fatal agent error");
                            self.shutdown();
                            return Err(e);
                        }
                    }
                },

                _ = tick.tick() => self.handle_tick(),
            }
        }
    }

    fn handle_event(&mut self, event: AgentEvent) -> Result<(), AgentError> {
        match event {
            AgentEvent::Message { from, message } => self.handle_message(from, message),
            AgentEvent::PeerExited { peer } => {
                self.handle_peer_exited(peer);
                Ok(())
            }
            AgentEvent::ExecutorExited {
                framework_id,
                executor_id,
                status,
            } => {
                self.handle_executor_exited(framework_id, executor_id, status);
                Ok(())
            }
            AgentEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
            AgentEvent::Terminate => Ok(()),
        }
    }

    fn handle_message(&mut self, from: Endpoint, message: Message) -> Result<(), AgentError> {
        match message {
            Message::NewMasterDetected { master } => {
                self.handle_new_master(master);
                Ok(())
            }
            Message::NoMasterDetected => {
                info!("lost master(s), waiting for a new master to be elected");
                self.session.disconnected();
                Ok(())
            }
            Message::SlaveRegistered { slave_id } => {
                self.session.registered(slave_id);
                Ok(())
            }
            Message::SlaveReregistered { slave_id } => Ok(self.session.reregistered(slave_id)?),
            Message::RunTask {
                framework_id,
                framework,
                scheduler,
                task,
            } => self.handle_run_task(framework_id, framework, scheduler, task),
            Message::KillTask {
                framework_id,
                task_id,
            } => {
                self.handle_kill_task(framework_id, task_id);
                Ok(())
            }
            Message::KillFramework { framework_id } => {
                info!(framework_id = %framework_id, "asked to kill framework");
                self.remove_framework(&framework_id, true);
                Ok(())
            }
            Message::FrameworkToExecutor {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => {
                self.handle_scheduler_message(slave_id, framework_id, executor_id, data);
                Ok(())
            }
            Message::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => {
                self.handle_executor_message(slave_id, framework_id, executor_id, data);
                Ok(())
            }
            Message::UpdateFramework {
                framework_id,
                scheduler,
            } => {
                self.handle_update_framework(framework_id, scheduler);
                Ok(())
            }
            Message::StatusUpdateAck {
                framework_id,
                task_id,
                ..
            } => {
                self.handle_status_update_ack(from, framework_id, task_id);
                Ok(())
            }
            Message::RegisterExecutor {
                framework_id,
                executor_id,
            } => {
                self.handle_register_executor(from, framework_id, executor_id);
                Ok(())
            }
            Message::StatusUpdate { update, .. } => {
                self.handle_status_update(update);
                Ok(())
            }
            Message::Ping => {
                self.wire.send(&from, Message::Pong);
                Ok(())
            }
            other => {
                warn!(from = %from, message = ?other, "dropping unexpected message");
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Master session
    // -------------------------------------------------------------------------

    fn handle_new_master(&mut self, master: Endpoint) {
        self.wire.link(&master);

        match self.session.new_master(master.clone()) {
            Registration::Register => {
                self.wire.send(
                    &master,
                    Message::RegisterSlave {
                        slave: self.info.clone(),
                    },
                );
            }
            Registration::Reregister(slave_id) => {
                let tasks: Vec<Task> = self
                    .frameworks
                    .values()
                    .flat_map(|framework| framework.launched_tasks().cloned())
                    .collect();

                self.wire.send(
                    &master,
                    Message::ReregisterSlave {
                        slave_id,
                        slave: self.info.clone(),
                        tasks,
                    },
                );
            }
        }
    }

    fn handle_peer_exited(&mut self, peer: Endpoint) {
        info!(peer = %peer, "process exited");

        if self.session.is_master(&peer) {
            warn!("master disconnected, waiting for a new master to be elected");
            self.session.disconnected();
        }
    }

    // -------------------------------------------------------------------------
    // Task lifecycle
    // -------------------------------------------------------------------------

    fn handle_run_task(
        &mut self,
        framework_id: FrameworkId,
        framework_info: FrameworkInfo,
        scheduler: Endpoint,
        task: TaskDescription,
    ) -> Result<(), AgentError> {
        info!(
            task_id = %task.task_id,
            framework_id = %framework_id,
            "got assigned task"
        );

        if !self.frameworks.contains_key(&framework_id) {
            self.frameworks.insert(
                framework_id.clone(),
                Framework::new(framework_id.clone(), framework_info, scheduler),
            );
        }

        // Resolve the target executor before touching anything else; its id
        // also names the work directory when a launch is needed.
        let Some(framework) = self.frameworks.get(&framework_id) else {
            return Ok(());
        };
        let executor_info = task
            .executor
            .clone()
            .unwrap_or_else(|| framework.info.executor.clone());
        let executor_id = executor_info.executor_id.clone();

        if framework.executors.contains_key(&executor_id) {
            let Some(framework) = self.frameworks.get_mut(&framework_id) else {
                return Ok(());
            };
            let fw_info = framework.info.clone();
            let fw_scheduler = framework.scheduler.clone();
            let Some(executor) = framework.executors.get_mut(&executor_id) else {
                return Ok(());
            };

            match executor.endpoint.clone() {
                // Queue the task until the executor comes up.
                None => {
                    executor.queued_tasks.insert(task.task_id.clone(), task);
                }
                Some(endpoint) => {
                    executor.add_task(&task);

                    self.wire.send(
                        &endpoint,
                        Message::RunTask {
                            framework_id: framework_id.clone(),
                            framework: fw_info.clone(),
                            scheduler: fw_scheduler,
                            task,
                        },
                    );

                    self.isolation.resources_changed(
                        &framework_id,
                        &fw_info,
                        &executor.info,
                        &executor.resources,
                    );
                }
            }

            return Ok(());
        }

        // No executor yet: create one and launch it with the task queued.
        let directory = unique_work_directory(
            &self.conf,
            self.session.slave_id(),
            &framework_id,
            &executor_id,
        );

        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            return Ok(());
        };
        let fw_info = framework.info.clone();
        let executor = framework.create_executor(executor_info, directory);
        executor.queued_tasks.insert(task.task_id.clone(), task);
        let exec_info = executor.info.clone();
        let exec_directory = executor.directory.clone();

        let pid =
            self.isolation
                .launch_executor(&framework_id, &fw_info, &exec_info, &exec_directory);

        if let Some(pid) = pid {
            if !self.reaper.watch(framework_id, executor_id, pid) {
                return Err(AgentError::ReaperLost);
            }
        }

        Ok(())
    }

    fn handle_kill_task(&mut self, framework_id: FrameworkId, task_id: TaskId) {
        info!(
            task_id = %task_id,
            framework_id = %framework_id,
            "asked to kill task"
        );

        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!(
                task_id = %task_id,
                framework_id = %framework_id,
                "cannot kill task, no such framework is running"
            );
            self.send_synthesized_update(&framework_id, None, &task_id, TaskState::Lost, -1);
            return;
        };

        let Some(executor_id) = framework.executor_id_for_task(&task_id) else {
            warn!(
                task_id = %task_id,
                framework_id = %framework_id,
                "cannot kill task, no such task is running"
            );
            self.send_synthesized_update(&framework_id, None, &task_id, TaskState::Lost, -1);
            return;
        };

        let endpoint = framework
            .executors
            .get(&executor_id)
            .and_then(|executor| executor.endpoint.clone());

        match endpoint {
            // The executor is up: forward the kill and wait for its own
            // status update.
            Some(endpoint) => {
                self.wire.send(
                    &endpoint,
                    Message::KillTask {
                        framework_id,
                        task_id,
                    },
                );
            }

            // Still queued: drop it here and report it killed.
            None => {
                let mut removed = None;
                if let Some(framework) = self.frameworks.get_mut(&framework_id) {
                    let fw_info = framework.info.clone();
                    if let Some(executor) = framework.executors.get_mut(&executor_id) {
                        executor.remove_task(&task_id);
                        removed = Some((fw_info, executor.info.clone(), executor.resources.clone()));
                    }
                }

                if let Some((fw_info, exec_info, resources)) = removed {
                    self.isolation.resources_changed(
                        &framework_id,
                        &fw_info,
                        &exec_info,
                        &resources,
                    );
                    self.stats.record_terminal(TaskState::Killed);
                    self.send_synthesized_update(
                        &framework_id,
                        Some(&executor_id),
                        &task_id,
                        TaskState::Killed,
                        0,
                    );
                }
            }
        }
    }

    fn handle_register_executor(
        &mut self,
        from: Endpoint,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) {
        info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            from = %from,
            "got registration for executor"
        );

        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            warn!(
                framework_id = %framework_id,
                "framework does not exist (it may have been killed), telling executor to exit"
            );
            self.wire.send(&from, Message::KillExecutor);
            return;
        };

        let Some(executor) = framework.executors.get_mut(&executor_id) else {
            warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                "unexpected executor registering, telling it to exit"
            );
            self.wire.send(&from, Message::KillExecutor);
            return;
        };

        if executor.registered() {
            warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                "executor is already running, telling duplicate to exit"
            );
            self.wire.send(&from, Message::KillExecutor);
            return;
        }

        let Some(slave_id) = self.session.slave_id().cloned() else {
            warn!("executor registering before the agent has a slave id");
            self.wire.send(&from, Message::KillExecutor);
            return;
        };

        executor.endpoint = Some(from.clone());
        let exec_info = executor.info.clone();
        let resources = executor.resources.clone();
        let fw_info = framework.info.clone();
        let fw_scheduler = framework.scheduler.clone();

        // The executor is up: let isolation apply its current limits.
        self.isolation
            .resources_changed(&framework_id, &fw_info, &exec_info, &resources);

        self.wire.send(
            &from,
            Message::ExecutorRegistered {
                args: ExecutorArgs {
                    framework_id: framework_id.clone(),
                    executor_id: executor_id.clone(),
                    slave_id,
                    hostname: self.info.hostname.clone(),
                    data: exec_info.data.clone(),
                },
            },
        );

        info!(framework_id = %framework_id, "flushing queued tasks");

        let queued: Vec<TaskDescription> =
            std::mem::take(&mut executor.queued_tasks).into_values().collect();

        for task in queued {
            executor.add_task(&task);
            self.wire.send(
                &from,
                Message::RunTask {
                    framework_id: framework_id.clone(),
                    framework: fw_info.clone(),
                    scheduler: fw_scheduler.clone(),
                    task,
                },
            );
        }
    }

    fn handle_update_framework(&mut self, framework_id: FrameworkId, scheduler: Endpoint) {
        match self.frameworks.get_mut(&framework_id) {
            Some(framework) => {
                info!(
                    framework_id = %framework_id,
                    scheduler = %scheduler,
                    "updating framework scheduler endpoint"
                );
                framework.scheduler = scheduler;
            }
            None => {
                debug!(
                    framework_id = %framework_id,
                    "ignoring scheduler update for unknown framework"
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Framework messages (best effort, both directions)
    // -------------------------------------------------------------------------

    fn handle_scheduler_message(
        &mut self,
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: String,
    ) {
        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!(
                framework_id = %framework_id,
                "dropping message, framework does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        let Some(executor) = framework.executors.get(&executor_id) else {
            warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                "dropping message, executor does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        let Some(endpoint) = executor.endpoint.clone() else {
            warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                "dropping message, executor is not running"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        self.wire.send(
            &endpoint,
            Message::FrameworkToExecutor {
                slave_id,
                framework_id,
                executor_id,
                data,
            },
        );
        self.stats.valid_framework_messages += 1;
    }

    fn handle_executor_message(
        &mut self,
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: String,
    ) {
        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!(
                framework_id = %framework_id,
                "cannot relay executor message, framework does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        debug!(
            framework_id = %framework_id,
            scheduler = %framework.scheduler,
            "relaying executor message to the framework scheduler"
        );

        self.wire.send(
            &framework.scheduler,
            Message::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            },
        );
        self.stats.valid_framework_messages += 1;
    }

    // -------------------------------------------------------------------------
    // Status updates
    // -------------------------------------------------------------------------

    fn handle_status_update(&mut self, update: StatusUpdate) {
        let state = update.status.state;

        info!(
            task_id = %update.status.task_id,
            framework_id = %update.framework_id,
            state = %state,
            "status update"
        );

        let Some(framework) = self.frameworks.get_mut(&update.framework_id) else {
            warn!(
                framework_id = %update.framework_id,
                "status update error: couldn't lookup framework"
            );
            self.stats.invalid_status_updates += 1;
            return;
        };

        let Some(executor_id) = framework.executor_id_for_task(&update.status.task_id) else {
            warn!(
                framework_id = %update.framework_id,
                task_id = %update.status.task_id,
                "status update error: couldn't lookup executor"
            );
            self.stats.invalid_status_updates += 1;
            return;
        };

        if let Some(executor) = framework.executors.get_mut(&executor_id) {
            executor.update_task_state(&update.status.task_id, state);

            // A terminal state frees the task's resources immediately.
            if state.is_terminal() {
                executor.remove_task(&update.status.task_id);
                let exec_info = executor.info.clone();
                let resources = executor.resources.clone();
                let fw_info = framework.info.clone();

                self.isolation.resources_changed(
                    &update.framework_id,
                    &fw_info,
                    &exec_info,
                    &resources,
                );
                self.stats.record_terminal(state);
            }
        }

        // Relay to the master and keep the update for retransmission until
        // it is acknowledged.
        if let Some(master) = self.session.master() {
            self.wire.send(
                master,
                Message::StatusUpdate {
                    update: update.clone(),
                    reliable: true,
                },
            );
        }

        let deadline = Instant::now() + self.conf.status_update_retry_interval;
        framework.pending.arm(update, deadline);
        self.stats.valid_status_updates += 1;
    }

    fn handle_status_update_ack(&mut self, from: Endpoint, framework_id: FrameworkId, task_id: TaskId) {
        // Acknowledgements come from the master; anyone else has no say over
        // the retransmission table.
        if !self.session.is_master(&from) {
            warn!(
                from = %from,
                task_id = %task_id,
                framework_id = %framework_id,
                "ignoring status update acknowledgement from non-master"
            );
            return;
        }

        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            debug!(
                framework_id = %framework_id,
                "acknowledgement for unknown framework"
            );
            return;
        };

        match framework.pending.remove(&task_id) {
            Some(_) => {
                info!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "got acknowledgement of status update"
                );
            }
            None => {
                debug!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "acknowledgement for unknown status update"
                );
            }
        }
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        let rearm_at = now + self.conf.status_update_retry_interval;

        for framework in self.frameworks.values_mut() {
            for update in framework.pending.due(now, rearm_at) {
                warn!(
                    task_id = %update.status.task_id,
                    framework_id = %framework.id,
                    "resending status update"
                );

                if let Some(master) = self.session.master() {
                    self.wire.send(
                        master,
                        Message::StatusUpdate {
                            update,
                            reliable: true,
                        },
                    );
                }
            }
        }
    }

    /// Sends an unreliable agent-synthesized status update to the master.
    ///
    /// Synthesized updates are not retransmitted: the agent holds no task
    /// state to anchor them to.
    fn send_synthesized_update(
        &self,
        framework_id: &FrameworkId,
        executor_id: Option<&ExecutorId>,
        task_id: &TaskId,
        state: TaskState,
        sequence: i64,
    ) {
        let (Some(master), Some(slave_id)) = (self.session.master(), self.session.slave_id())
        else {
            warn!(
                task_id = %task_id,
                "no master session, dropping synthesized status update"
            );
            return;
        };

        let update = StatusUpdate {
            framework_id: framework_id.clone(),
            executor_id: executor_id.cloned(),
            slave_id: slave_id.clone(),
            status: TaskStatus {
                task_id: task_id.clone(),
                state,
                data: None,
            },
            timestamp: unix_time(),
            sequence,
        };

        self.wire.send(
            master,
            Message::StatusUpdate {
                update,
                reliable: false,
            },
        );
    }

    // -------------------------------------------------------------------------
    // Removal cascades
    // -------------------------------------------------------------------------

    fn handle_executor_exited(
        &mut self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    ) {
        let Some(mut framework) = self.frameworks.remove(&framework_id) else {
            warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                status,
                "executor of unknown framework exited"
            );
            return;
        };

        if !framework.executors.contains_key(&executor_id) {
            warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                status,
                "unknown executor exited"
            );
            self.frameworks.insert(framework_id, framework);
            return;
        }

        info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            status,
            "executor exited"
        );

        if let (Some(master), Some(slave_id)) = (self.session.master(), self.session.slave_id()) {
            self.wire.send(
                master,
                Message::ExitedExecutor {
                    slave_id: slave_id.clone(),
                    framework_id: framework_id.clone(),
                    executor_id: executor_id.clone(),
                    status,
                },
            );
        }

        // The process is already dead; remove without killing.
        self.remove_executor(&mut framework, &executor_id, false);

        if framework.executors.is_empty() {
            info!(
                framework_id = %framework_id,
                "removing framework, its last executor exited"
            );
        } else {
            self.frameworks.insert(framework_id, framework);
        }
    }

    /// Removes a framework and everything under it.
    fn remove_framework(&mut self, framework_id: &FrameworkId, kill_executors: bool) {
        let Some(mut framework) = self.frameworks.remove(framework_id) else {
            return;
        };

        info!(framework_id = %framework_id, "cleaning up framework");

        let executor_ids: Vec<ExecutorId> = framework.executors.keys().cloned().collect();
        for executor_id in executor_ids {
            self.remove_executor(&mut framework, &executor_id, kill_executors);
        }
    }

    /// Removes one executor from a (detached) framework, optionally killing
    /// the process, and reports its surviving tasks lost.
    fn remove_executor(
        &mut self,
        framework: &mut Framework,
        executor_id: &ExecutorId,
        kill: bool,
    ) {
        let Some(executor) = framework.executors.remove(executor_id) else {
            return;
        };

        if kill {
            info!(
                executor_id = %executor_id,
                framework_id = %framework.id,
                "killing executor"
            );

            if let Some(endpoint) = &executor.endpoint {
                self.wire.send(endpoint, Message::KillExecutor);
            }

            self.isolation
                .kill_executor(&framework.id, &framework.info, &executor.info);
        }

        // No further updates will arrive for these tasks; tell the master
        // they are lost and drop anything still pending for them.
        for task_id in executor.task_ids() {
            framework.pending.remove(&task_id);
            self.stats.record_terminal(TaskState::Lost);
            self.send_synthesized_update(
                &framework.id,
                Some(executor_id),
                &task_id,
                TaskState::Lost,
                -1,
            );
        }
    }

    fn shutdown(&mut self) {
        info!(
            frameworks = self.frameworks.len(),
            "shutting down, removing all frameworks"
        );

        let framework_ids: Vec<FrameworkId> = self.frameworks.keys().cloned().collect();
        for framework_id in framework_ids {
            self.remove_framework(&framework_id, true);
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    fn snapshot(&self) -> StateSnapshot {
        let mut frameworks = Vec::new();
        let mut tasks = Vec::new();

        for framework in self.frameworks.values() {
            let mut executors = Vec::new();

            for executor in framework.executors.values() {
                executors.push(ExecutorSnapshot {
                    executor_id: executor.id.to_string(),
                    registered: executor.registered(),
                    directory: executor.directory.display().to_string(),
                    resources: executor
                        .resources
                        .iter()
                        .map(|(name, value)| (name.to_string(), value))
                        .collect(),
                    queued_tasks: executor.queued_tasks.keys().map(|t| t.to_string()).collect(),
                    launched_tasks: executor
                        .launched_tasks
                        .keys()
                        .map(|t| t.to_string())
                        .collect(),
                });

                for task in executor.launched_tasks.values() {
                    tasks.push(TaskSnapshot {
                        task_id: task.task_id.to_string(),
                        framework_id: task.framework_id.to_string(),
                        executor_id: task.executor_id.to_string(),
                        slave_id: task.slave_id.to_string(),
                        name: task.name.clone(),
                        state: task.state.to_string(),
                        cpus: task.resources.get("cpus"),
                        mem: task.resources.get("mem"),
                    });
                }
            }

            frameworks.push(FrameworkSnapshot {
                id: framework.id.to_string(),
                name: framework.info.name.clone(),
                user: framework.info.user.clone(),
                executors,
                pending_updates: framework.pending.len(),
            });
        }

        StateSnapshot {
            info: InfoSnapshot {
                build_version: env!("CARGO_PKG_VERSION").to_string(),
                start_time: self.start_time.to_rfc3339(),
                endpoint: self.endpoint.to_string(),
                state: self.session.state().as_str().to_string(),
                slave_id: self.session.slave_id().map(|id| id.to_string()),
                master: self.session.master().map(|m| m.to_string()),
            },
            frameworks,
            tasks,
            stats: StatsSnapshot {
                uptime: self.start_instant.elapsed().as_secs_f64(),
                total_frameworks: self.frameworks.len(),
                finished_tasks: self.stats.finished_tasks,
                killed_tasks: self.stats.killed_tasks,
                failed_tasks: self.stats.failed_tasks,
                lost_tasks: self.stats.lost_tasks,
                valid_status_updates: self.stats.valid_status_updates,
                invalid_status_updates: self.stats.invalid_status_updates,
                valid_framework_messages: self.stats.valid_framework_messages,
                invalid_framework_messages: self.stats.invalid_framework_messages,
            },
            configuration: self.conf.entries(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn unix_time() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn hostnames() -> (String, String) {
    let hostname = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());

    // The public name can differ from the local one, e.g. on cloud hosts.
    let public_hostname =
        std::env::var("FLOTILLA_PUBLIC_DNS").unwrap_or_else(|_| hostname.clone());

    (hostname, public_hostname)
}

/// Picks a work directory no previous executor launch has used:
/// `<root>/work/slave-<id>/fw-<framework>-<executor>/<n>` for the smallest
/// free `n`. A framework/executor pair may be launched more than once on the
/// same machine, hence the counter.
fn unique_work_directory(
    conf: &Config,
    slave_id: Option<&SlaveId>,
    framework_id: &FrameworkId,
    executor_id: &ExecutorId,
) -> PathBuf {
    let root = conf
        .work_dir
        .clone()
        .or_else(|| conf.home.clone())
        .unwrap_or_else(|| ".".to_string());

    let slave = slave_id.map(|id| id.as_str()).unwrap_or_default();

    let base = PathBuf::from(root)
        .join("work")
        .join(format!("slave-{slave}"))
        .join(format!("fw-{framework_id}-{executor_id}"));

    let mut n: u64 = 0;
    loop {
        let candidate = base.join(n.to_string());
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_work_directory_skips_existing() {
        let root = std::env::temp_dir().join(format!(
            "flotilla-workdir-test-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);

        let mut conf = Config::default();
        conf.work_dir = Some(root.display().to_string());

        let slave_id = SlaveId::parse("s1").unwrap();
        let framework_id = FrameworkId::parse("f1").unwrap();
        let executor_id = ExecutorId::parse("e1").unwrap();

        let first = unique_work_directory(&conf, Some(&slave_id), &framework_id, &executor_id);
        assert!(first.ends_with("work/slave-s1/fw-f1-e1/0"));

        std::fs::create_dir_all(&first).unwrap();

        let second = unique_work_directory(&conf, Some(&slave_id), &framework_id, &executor_id);
        assert!(second.ends_with("work/slave-s1/fw-f1-e1/1"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unique_work_directory_without_slave_id() {
        let conf = Config::default();
        let framework_id = FrameworkId::parse("f1").unwrap();
        let executor_id = ExecutorId::parse("e1").unwrap();

        let dir = unique_work_directory(&conf, None, &framework_id, &executor_id);
        assert!(dir.starts_with("./work/slave-"));
    }

    #[test]
    fn test_statistics_record_terminal() {
        let mut stats = Statistics::default();
        stats.record_terminal(TaskState::Finished);
        stats.record_terminal(TaskState::Lost);
        stats.record_terminal(TaskState::Running);

        assert_eq!(stats.finished_tasks, 1);
        assert_eq!(stats.lost_tasks, 1);
        assert_eq!(stats.failed_tasks, 0);
        assert_eq!(stats.killed_tasks, 0);
    }
}
