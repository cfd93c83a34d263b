//! Endpoint messaging runtime.
//!
//! The agent talks to the master, executors and schedulers through the
//! `Wire` trait: a non-blocking `send` toward a named endpoint, plus `link`
//! to request that a peer's failure be surfaced as a `PeerExited` event.
//!
//! `LoopbackWire` is the in-process implementation used in local mode and by
//! tests: inboxes are registered callbacks, every send is recorded, and peer
//! exits can be injected.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use flotilla_messages::{Endpoint, Envelope, Message};
use tracing::trace;

/// An event surfaced by the wire to a registered inbox.
#[derive(Debug)]
pub enum WireEvent {
    /// An inbound message arrived.
    Delivered(Envelope),

    /// A linked peer's endpoint went away.
    PeerExited(Endpoint),
}

/// Outbound messaging interface.
///
/// Sends are best-effort enqueue operations; delivery guarantees live in the
/// protocol (reliable status updates are retransmitted by the agent, not the
/// wire).
pub trait Wire: Send + Sync {
    /// Enqueues a message toward a remote endpoint.
    fn send(&self, to: &Endpoint, message: Message);

    /// Watches a peer; its subsequent failure produces a `PeerExited` event.
    fn link(&self, peer: &Endpoint);
}

type Inbox = Box<dyn Fn(WireEvent) + Send + Sync>;

/// In-process wire: routes envelopes between registered local inboxes.
pub struct LoopbackWire {
    /// Endpoint stamped as the sender on outbound envelopes.
    local: Endpoint,

    inboxes: Mutex<HashMap<Endpoint, Inbox>>,
    links: Mutex<HashSet<Endpoint>>,
    sent: Mutex<Vec<Envelope>>,
}

impl LoopbackWire {
    pub fn new(local: Endpoint) -> Self {
        Self {
            local,
            inboxes: Mutex::new(HashMap::new()),
            links: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Registers an inbox for a local endpoint.
    pub fn register<F>(&self, endpoint: Endpoint, inbox: F)
    where
        F: Fn(WireEvent) + Send + Sync + 'static,
    {
        self.inboxes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(endpoint, Box::new(inbox));
    }

    /// Delivers a message to a registered inbox as if it came from `from`.
    pub fn deliver(&self, from: Endpoint, to: &Endpoint, message: Message) {
        let inboxes = self.inboxes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(inbox) = inboxes.get(to) {
            inbox(WireEvent::Delivered(Envelope {
                from,
                to: to.clone(),
                message,
            }));
        }
    }

    /// Announces a peer's failure to every registered inbox.
    pub fn inject_exit(&self, peer: &Endpoint) {
        let inboxes = self.inboxes.lock().unwrap_or_else(|e| e.into_inner());
        for inbox in inboxes.values() {
            inbox(WireEvent::PeerExited(peer.clone()));
        }
    }

    /// Snapshot of every envelope sent so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Messages sent toward a specific endpoint.
    pub fn sent_to(&self, to: &Endpoint) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|envelope| &envelope.to == to)
            .map(|envelope| envelope.message.clone())
            .collect()
    }

    /// Clears the send record.
    pub fn clear_sent(&self) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// True if `peer` has been linked.
    pub fn is_linked(&self, peer: &Endpoint) -> bool {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(peer)
    }
}

impl Wire for LoopbackWire {
    fn send(&self, to: &Endpoint, message: Message) {
        trace!(to = %to, "wire send");

        let envelope = Envelope {
            from: self.local.clone(),
            to: to.clone(),
            message,
        };

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(envelope.clone());

        let inboxes = self.inboxes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(inbox) = inboxes.get(to) {
            inbox(WireEvent::Delivered(envelope));
        }
    }

    fn link(&self, peer: &Endpoint) {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer.clone());
    }
}
