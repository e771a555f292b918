use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Header carrying the shared webhook secret on session-manager calls to
/// the hub.
pub const HOOK_TOKEN_HEADER: &str = "x-hook-token";

/// Events pushed from the session manager to the central hub webhook.
///
/// Delivery is best-effort with bounded retry; the hub treats the webhook as
/// the inbound side of the listener module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HookEvent {
    /// An inbound WhatsApp message arrived on the admin session.
    MessageReceived {
        phone: String,
        body: String,
        wa_message_id: Option<String>,
        received_at: DateTime<Utc>,
    },

    /// The session moved to a new lifecycle state.
    StatusChanged {
        state: SessionState,
        connected: bool,
    },
}

impl HookEvent {
    /// Phone number the event concerns, when it concerns one.
    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::MessageReceived { phone, .. } => Some(phone),
            Self::StatusChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_event_round_trips_tagged_form() {
        let ev = HookEvent::StatusChanged {
            state: SessionState::Ready,
            connected: true,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["data"]["state"], "READY");

        let back: HookEvent = serde_json::from_value(json).unwrap();
        match back {
            HookEvent::StatusChanged { connected, .. } => assert!(connected),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
