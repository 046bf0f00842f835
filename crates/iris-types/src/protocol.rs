use serde::{Deserialize, Serialize};

/// Client-to-server messages. Fire-and-forget; there is no per-message
/// acknowledgment correlation beyond the inbound status/ack channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One encoded still, as a `data:image/jpeg;base64,...` URI.
    Frame { image: String },
    /// Commit the session under the given (trimmed) name.
    Save { name: String },
    /// Abandon the session.
    Discard {},
}

/// Terminal outcome of a save or discard request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    Saved,
    Discarded,
    Error,
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Free-text advisory shown in the status readout.
    Status { message: String },
    /// Structured acknowledgment that resolves a session.
    Ack { outcome: AckOutcome },
    /// Connection-established signal.
    Connect,
}

/// Substrings the legacy server embeds in terminal status messages.
const LEGACY_SAVED_PATTERN: &str = "Success!";
const LEGACY_DISCARDED_PATTERN: &str = "discarded";

impl ServerMessage {
    /// Returns the terminal outcome this message carries, if any.
    ///
    /// Structured acks are authoritative. Status text is additionally
    /// pattern-matched so the client still resolves against servers that
    /// only speak the legacy free-text contract.
    pub fn terminal_outcome(&self) -> Option<AckOutcome> {
        match self {
            ServerMessage::Ack { outcome } => Some(*outcome),
            ServerMessage::Status { message } => {
                if message.contains(LEGACY_SAVED_PATTERN) {
                    Some(AckOutcome::Saved)
                } else if message.contains(LEGACY_DISCARDED_PATTERN) {
                    Some(AckOutcome::Discarded)
                } else {
                    None
                }
            }
            ServerMessage::Connect => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_kind_payload_framing() {
        let save = ClientMessage::Save {
            name: "Alice".into(),
        };
        let json = serde_json::to_value(&save).expect("serialize save");
        assert_eq!(json["kind"], "save");
        assert_eq!(json["payload"]["name"], "Alice");

        let discard = ClientMessage::Discard {};
        let json = serde_json::to_value(&discard).expect("serialize discard");
        assert_eq!(json["kind"], "discard");
    }

    #[test]
    fn structured_ack_is_terminal() {
        let msg = ServerMessage::Ack {
            outcome: AckOutcome::Saved,
        };
        assert_eq!(msg.terminal_outcome(), Some(AckOutcome::Saved));
        let msg = ServerMessage::Ack {
            outcome: AckOutcome::Error,
        };
        assert_eq!(msg.terminal_outcome(), Some(AckOutcome::Error));
    }

    #[test]
    fn legacy_status_text_is_pattern_matched() {
        let saved = ServerMessage::Status {
            message: "Success! Saved 4 unique faces for Alice.".into(),
        };
        assert_eq!(saved.terminal_outcome(), Some(AckOutcome::Saved));

        let discarded = ServerMessage::Status {
            message: "Session discarded. Ready for new registration.".into(),
        };
        assert_eq!(discarded.terminal_outcome(), Some(AckOutcome::Discarded));

        let advisory = ServerMessage::Status {
            message: "Searching for face...".into(),
        };
        assert_eq!(advisory.terminal_outcome(), None);
        assert_eq!(ServerMessage::Connect.terminal_outcome(), None);
    }
}
