//! Master session state machine.
//!
//! ## States
//!
//! ```text
//! Unregistered --register reply--> Registered <--new master (with id)--+
//!      |                               |                               |
//!      +--new master--> (register)     +--no master / link exit--> Disconnected
//! ```
//!
//! The `SlaveId` assigned by the first registration reply is write-once for
//! the agent's lifetime; a re-registration reply carrying a different id is
//! a fatal inconsistency.

use flotilla_id::SlaveId;
use flotilla_messages::Endpoint;
use thiserror::Error;
use tracing::{info, warn};

/// Fatal session protocol violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("re-registered with wrong slave id: have {assigned}, master sent {received}")]
    SlaveIdMismatch {
        assigned: SlaveId,
        received: SlaveId,
    },
}

/// The agent's relationship with the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No registration has completed yet.
    Unregistered,
    /// Registered with the current master.
    Registered,
    /// The master went away; waiting for a new one to be detected.
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unregistered => "unregistered",
            SessionState::Registered => "registered",
            SessionState::Disconnected => "disconnected",
        }
    }
}

/// What to send after a new master is detected.
#[derive(Debug, PartialEq, Eq)]
pub enum Registration {
    /// First contact: register and wait for an assigned id.
    Register,
    /// Already hold an id: re-register, carrying the launched tasks.
    Reregister(SlaveId),
}

/// Tracks the current master, the assigned slave id and the session state.
pub struct MasterSession {
    state: SessionState,
    master: Option<Endpoint>,
    slave_id: Option<SlaveId>,
}

impl MasterSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unregistered,
            master: None,
            slave_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn master(&self) -> Option<&Endpoint> {
        self.master.as_ref()
    }

    pub fn slave_id(&self) -> Option<&SlaveId> {
        self.slave_id.as_ref()
    }

    pub fn is_master(&self, peer: &Endpoint) -> bool {
        self.master.as_ref() == Some(peer)
    }

    /// Adopts a newly detected master and decides how to (re-)register.
    pub fn new_master(&mut self, master: Endpoint) -> Registration {
        info!(master = %master, "new master detected");
        self.master = Some(master);

        match &self.slave_id {
            None => {
                self.state = SessionState::Unregistered;
                Registration::Register
            }
            Some(slave_id) => {
                self.state = SessionState::Registered;
                Registration::Reregister(slave_id.clone())
            }
        }
    }

    /// Records loss of the master; local state is kept while waiting.
    pub fn disconnected(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// Handles the reply to a registration.
    ///
    /// The assigned id is write-once: a conflicting late reply is ignored.
    pub fn registered(&mut self, slave_id: SlaveId) {
        match &self.slave_id {
            None => {
                info!(slave_id = %slave_id, "registered with master");
                self.slave_id = Some(slave_id);
                self.state = SessionState::Registered;
            }
            Some(assigned) if *assigned == slave_id => {
                self.state = SessionState::Registered;
            }
            Some(assigned) => {
                warn!(
                    assigned = %assigned,
                    received = %slave_id,
                    "ignoring registration reply with conflicting slave id"
                );
            }
        }
    }

    /// Handles the reply to a re-registration.
    pub fn reregistered(&mut self, slave_id: SlaveId) -> Result<(), SessionError> {
        match &self.slave_id {
            Some(assigned) if *assigned == slave_id => {
                info!("re-registered with master");
                self.state = SessionState::Registered;
                Ok(())
            }
            Some(assigned) => Err(SessionError::SlaveIdMismatch {
                assigned: assigned.clone(),
                received: slave_id,
            }),
            // A re-register reply without ever registering: treat it as the
            // original registration.
            None => {
                self.registered(slave_id);
                Ok(())
            }
        }
    }
}

impl Default for MasterSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(n: u16) -> Endpoint {
        Endpoint::parse(&format!("master@10.0.0.{n}:5050")).unwrap()
    }

    fn slave_id(s: &str) -> SlaveId {
        SlaveId::parse(s).unwrap()
    }

    #[test]
    fn test_first_master_registers() {
        let mut session = MasterSession::new();
        assert_eq!(session.state(), SessionState::Unregistered);

        let registration = session.new_master(master(1));
        assert_eq!(registration, Registration::Register);
        assert_eq!(session.state(), SessionState::Unregistered);

        session.registered(slave_id("s1"));
        assert_eq!(session.state(), SessionState::Registered);
        assert_eq!(session.slave_id(), Some(&slave_id("s1")));
    }

    #[test]
    fn test_failover_reregisters() {
        let mut session = MasterSession::new();
        session.new_master(master(1));
        session.registered(slave_id("s1"));

        session.disconnected();
        assert_eq!(session.state(), SessionState::Disconnected);

        let registration = session.new_master(master(2));
        assert_eq!(registration, Registration::Reregister(slave_id("s1")));
        assert_eq!(session.state(), SessionState::Registered);
        assert!(session.is_master(&master(2)));
    }

    #[test]
    fn test_slave_id_is_write_once() {
        let mut session = MasterSession::new();
        session.new_master(master(1));
        session.registered(slave_id("s1"));

        session.registered(slave_id("s2"));
        assert_eq!(session.slave_id(), Some(&slave_id("s1")));
    }

    #[test]
    fn test_reregister_reply_mismatch_is_fatal() {
        let mut session = MasterSession::new();
        session.new_master(master(1));
        session.registered(slave_id("s1"));

        assert!(session.reregistered(slave_id("s1")).is_ok());

        let err = session.reregistered(slave_id("s2")).unwrap_err();
        assert_eq!(
            err,
            SessionError::SlaveIdMismatch {
                assigned: slave_id("s1"),
                received: slave_id("s2"),
            }
        );
    }
}
