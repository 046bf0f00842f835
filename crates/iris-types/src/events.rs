use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    protocol::{ClientMessage, ServerMessage},
    session::SessionState,
};

/// Journal entry kinds moving through the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Outbound,
    Inbound,
}

/// Immutable event envelope for the session journal and replay export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Outbound(ClientMessage),
    Inbound(ServerMessage),
}

/// A state transition, with the status line shown to the user at that point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub from: SessionState,
    pub to: SessionState,
    pub details: Option<String>,
}

impl SessionEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(from: SessionState, to: SessionState, details: Option<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent { from, to, details }),
        )
    }

    pub fn outbound(message: ClientMessage) -> Self {
        Self::new(EventKind::Outbound, EventPayload::Outbound(message))
    }

    pub fn inbound(message: ServerMessage) -> Self {
        Self::new(EventKind::Inbound, EventPayload::Inbound(message))
    }
}
