use chrono::{DateTime, TimeDelta, Utc};
use leadhub_types::session::{SessionState, SessionStatus};

use crate::provider::ProviderEvent;

/// The session status record plus the QR bookkeeping the supervisor needs.
///
/// Transitions are driven entirely by provider events; this type contributes
/// no retry policy of its own. After DISCONNECTED/ERROR the machine stays
/// put until an external `/connect` rebuilds the provider.
pub struct Machine {
    status: SessionStatus,
    qr_issued_at: Option<DateTime<Utc>>,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::initial(),
            qr_issued_at: None,
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn state(&self) -> SessionState {
        self.status.state
    }

    /// Current QR payload with its issue time, while pairing.
    pub fn qr(&self) -> Option<(String, DateTime<Utc>)> {
        match (&self.status.qr, self.qr_issued_at) {
            (Some(qr), Some(at)) => Some((qr.clone(), at)),
            _ => None,
        }
    }

    /// Entering CONNECTING: wipes pairing leftovers from a previous run.
    pub fn begin_connect(&mut self) {
        self.status.state = SessionState::Connecting;
        self.status.qr = None;
        self.status.connected = false;
        self.status.phone = None;
        self.status.last_error = None;
        self.qr_issued_at = None;
        self.touch();
    }

    /// Explicit `/disconnect` by the operator.
    pub fn mark_disconnected(&mut self) {
        self.status.state = SessionState::Disconnected;
        self.status.connected = false;
        self.status.qr = None;
        self.qr_issued_at = None;
        self.touch();
    }

    /// Provider construction or startup failed.
    pub fn mark_error(&mut self, reason: &str) {
        self.status.state = SessionState::Error;
        self.status.connected = false;
        self.status.qr = None;
        self.qr_issued_at = None;
        self.status.last_error = Some(reason.to_string());
        self.touch();
    }

    /// Apply one provider event. Returns true when the lifecycle state
    /// changed (inbound messages leave it untouched).
    pub fn apply(&mut self, event: &ProviderEvent) -> bool {
        match event {
            ProviderEvent::Qr(data) => {
                self.status.state = SessionState::QrRequired;
                self.status.qr = Some(data.clone());
                self.status.connected = false;
                self.qr_issued_at = Some(Utc::now());
            }
            ProviderEvent::Authenticated => {
                self.status.state = SessionState::Authenticated;
                self.status.qr = None;
                self.qr_issued_at = None;
            }
            ProviderEvent::Ready { phone } => {
                self.status.state = SessionState::Ready;
                self.status.connected = true;
                self.status.qr = None;
                self.qr_issued_at = None;
                if phone.is_some() {
                    self.status.phone = phone.clone();
                }
            }
            ProviderEvent::Disconnected { reason } => {
                self.status.state = SessionState::Disconnected;
                self.status.connected = false;
                self.status.qr = None;
                self.qr_issued_at = None;
                self.status.last_error = Some(reason.clone());
            }
            ProviderEvent::AuthFailure { reason } => {
                self.status.state = SessionState::Error;
                self.status.connected = false;
                self.status.qr = None;
                self.qr_issued_at = None;
                self.status.last_error = Some(reason.clone());
            }
            ProviderEvent::Message { .. } => return false,
        }
        self.touch();
        true
    }

    /// The underlying library stops refreshing QR codes on its own after a
    /// while; a QR older than the threshold means the whole browser session
    /// must be recreated to get a fresh one.
    pub fn qr_is_stale(&self, max_age: TimeDelta) -> bool {
        if self.status.state != SessionState::QrRequired {
            return false;
        }
        match self.qr_issued_at {
            Some(at) => Utc::now() - at > max_age,
            None => false,
        }
    }

    fn touch(&mut self) {
        self.status.updated_at = Utc::now();
    }

    #[cfg(test)]
    pub(crate) fn backdate_qr(&mut self, seconds: i64) {
        if let Some(at) = self.qr_issued_at.as_mut() {
            *at = *at - TimeDelta::seconds(seconds);
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_ready() {
        let mut m = Machine::new();
        assert_eq!(m.state(), SessionState::Init);

        m.begin_connect();
        assert_eq!(m.state(), SessionState::Connecting);

        assert!(m.apply(&ProviderEvent::Qr("2@abc".into())));
        assert_eq!(m.state(), SessionState::QrRequired);
        assert!(m.qr().is_some());

        assert!(m.apply(&ProviderEvent::Authenticated));
        assert_eq!(m.state(), SessionState::Authenticated);
        assert!(m.qr().is_none(), "QR must be cleared on authentication");

        assert!(m.apply(&ProviderEvent::Ready {
            phone: Some("5215512345678".into())
        }));
        assert_eq!(m.state(), SessionState::Ready);
        assert!(m.status().connected);
        assert_eq!(m.status().phone.as_deref(), Some("5215512345678"));
    }

    #[test]
    fn disconnect_event_records_reason_and_drops_connected() {
        let mut m = Machine::new();
        m.begin_connect();
        m.apply(&ProviderEvent::Ready { phone: None });

        m.apply(&ProviderEvent::Disconnected {
            reason: "phone went offline".into(),
        });
        assert_eq!(m.state(), SessionState::Disconnected);
        assert!(!m.status().connected);
        assert_eq!(m.status().last_error.as_deref(), Some("phone went offline"));
    }

    #[test]
    fn auth_failure_lands_in_error() {
        let mut m = Machine::new();
        m.begin_connect();
        m.apply(&ProviderEvent::Qr("2@abc".into()));

        m.apply(&ProviderEvent::AuthFailure {
            reason: "token rejected".into(),
        });
        assert_eq!(m.state(), SessionState::Error);
        assert!(m.qr().is_none());
    }

    #[test]
    fn inbound_message_does_not_move_the_state() {
        let mut m = Machine::new();
        m.begin_connect();
        m.apply(&ProviderEvent::Ready { phone: None });

        let changed = m.apply(&ProviderEvent::Message {
            phone: "5215512345678".into(),
            body: "hola".into(),
            wa_message_id: None,
        });
        assert!(!changed);
        assert_eq!(m.state(), SessionState::Ready);
    }

    #[test]
    fn qr_staleness_only_applies_while_pairing() {
        let mut m = Machine::new();
        m.begin_connect();
        m.apply(&ProviderEvent::Qr("2@abc".into()));

        let max_age = TimeDelta::seconds(60);
        assert!(!m.qr_is_stale(max_age));

        m.backdate_qr(61);
        assert!(m.qr_is_stale(max_age));

        // Once authenticated there is no QR left to expire.
        m.apply(&ProviderEvent::Authenticated);
        assert!(!m.qr_is_stale(max_age));
    }

    #[test]
    fn reconnect_clears_previous_error() {
        let mut m = Machine::new();
        m.begin_connect();
        m.apply(&ProviderEvent::AuthFailure {
            reason: "stale".into(),
        });
        assert_eq!(m.state(), SessionState::Error);

        m.begin_connect();
        assert_eq!(m.state(), SessionState::Connecting);
        assert!(m.status().last_error.is_none());
    }
}
