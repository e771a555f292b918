use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of the single WhatsApp Web session.
///
/// Wire representation matches the status strings the dashboard polls for,
/// hence the SCREAMING_SNAKE_CASE rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Connecting,
    QrRequired,
    Authenticated,
    Ready,
    Disconnected,
    Error,
}

impl SessionState {
    /// A session in one of these states is starting or live; a second
    /// `/connect` must be rejected with 409 instead of spawning a duplicate
    /// browser session.
    pub fn occupies_session(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::QrRequired | Self::Authenticated | Self::Ready
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Connecting => "CONNECTING",
            Self::QrRequired => "QR_REQUIRED",
            Self::Authenticated => "AUTHENTICATED",
            Self::Ready => "READY",
            Self::Disconnected => "DISCONNECTED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// In-memory session status record, one per session-manager process.
/// Created at process start, mutated only by provider events and the
/// connect/disconnect operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Raw QR payload while pairing; cleared on authentication.
    pub qr: Option<String>,
    pub connected: bool,
    /// Phone number of the linked account, known once the session is ready.
    pub phone: Option<String>,
    /// Reason for the last DISCONNECTED/ERROR transition, if any.
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionStatus {
    pub fn initial() -> Self {
        Self {
            state: SessionState::Init,
            qr: None,
            connected: false,
            phone: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_as_status_string() {
        let json = serde_json::to_string(&SessionState::QrRequired).unwrap();
        assert_eq!(json, "\"QR_REQUIRED\"");

        let back: SessionState = serde_json::from_str("\"DISCONNECTED\"").unwrap();
        assert_eq!(back, SessionState::Disconnected);
    }

    #[test]
    fn occupancy_guard_covers_starting_and_live_states() {
        assert!(SessionState::Connecting.occupies_session());
        assert!(SessionState::QrRequired.occupies_session());
        assert!(SessionState::Ready.occupies_session());
        assert!(!SessionState::Init.occupies_session());
        assert!(!SessionState::Disconnected.occupies_session());
        assert!(!SessionState::Error.occupies_session());
    }
}
