use serde::{Deserialize, Serialize};

use crate::{IrisError, Result};

/// Lifecycle of a single capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting for the user to start; no camera held.
    Idle,
    /// Camera held, frames streaming on the cadence.
    Recording,
    /// Save or discard sent, awaiting the server acknowledgment.
    Resolving,
}

/// Which resolution request is in flight while `Resolving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingResolution {
    Save,
    Discard,
}

/// Validated session name: trimmed, guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionName(String);

impl SessionName {
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IrisError::Session("please enter a name first".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which control group the UI should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlsView {
    /// Name input + start control.
    PreSession,
    /// Save/discard controls.
    InSession,
}

impl ControlsView {
    /// View is a pure function of the session state.
    pub fn for_state(state: SessionState) -> Self {
        match state {
            SessionState::Idle => ControlsView::PreSession,
            SessionState::Recording | SessionState::Resolving => ControlsView::InSession,
        }
    }
}

/// What the UI surface renders; it carries no logic of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiProjection {
    pub state: SessionState,
    pub view: ControlsView,
    pub status: String,
}

impl UiProjection {
    pub fn new(state: SessionState, status: impl Into<String>) -> Self {
        Self {
            state,
            view: ControlsView::for_state(state),
            status: status.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed() {
        let name = SessionName::new("  Alice  ").expect("valid name");
        assert_eq!(name.as_str(), "Alice");
    }

    #[test]
    fn empty_and_whitespace_names_are_rejected() {
        assert!(SessionName::new("").is_err());
        assert!(SessionName::new("   \t ").is_err());
    }

    #[test]
    fn view_follows_state() {
        assert_eq!(
            ControlsView::for_state(SessionState::Idle),
            ControlsView::PreSession
        );
        assert_eq!(
            ControlsView::for_state(SessionState::Recording),
            ControlsView::InSession
        );
        assert_eq!(
            ControlsView::for_state(SessionState::Resolving),
            ControlsView::InSession
        );
    }
}
