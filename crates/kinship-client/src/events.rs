//! In-process publish/subscribe for session and relationship changes.
//!
//! The [`Session`](crate::session::Session) publishes identity changes, the
//! [`MutationCoordinator`](crate::coordinator::MutationCoordinator) publishes
//! settled mutations, and the resolver subscribes to both to invalidate its
//! cache.  The view layer may subscribe too, e.g. to show a failure toast.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use kinship_shared::{MutationError, ProfileId};

pub const EVENT_IDENTITY_CHANGED: &str = "identity-changed";
pub const EVENT_SESSION_CLEARED: &str = "session-cleared";
pub const EVENT_MUTATION_SETTLED: &str = "mutation-settled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "error")]
pub enum SettledOutcome {
    Confirmed,
    Failed(String),
}

impl From<&MutationError> for SettledOutcome {
    fn from(err: &MutationError) -> Self {
        Self::Failed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionEvent {
    IdentityChanged {
        previous: Option<ProfileId>,
        current: Option<ProfileId>,
    },
    SessionCleared,
    MutationSettled {
        viewer: ProfileId,
        target: ProfileId,
        outcome: SettledOutcome,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::IdentityChanged { .. } => EVENT_IDENTITY_CHANGED,
            SessionEvent::SessionCleared => EVENT_SESSION_CLEARED,
            SessionEvent::MutationSettled { .. } => EVENT_MUTATION_SETTLED,
        }
    }
}

/// Cloneable handle to the session event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SessionEvent) {
        let event_name = event.name();
        // No subscribers is fine: nothing is cached yet.
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = event_name, receivers, "Published session event"),
            Err(_) => debug!(event = event_name, "Published session event with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

/// What a subscriber finds when it catches up with the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Event(SessionEvent),
    /// The subscriber fell behind and `n` events were dropped.
    Lagged(u64),
}

/// Take every event queued for `rx` without waiting.
pub(crate) fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<Delivery> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(Delivery::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => out.push(Delivery::Lagged(n)),
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }
    out
}
