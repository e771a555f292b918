use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use leadhub_types::events::HookEvent;
use leadhub_types::session::{SessionState, SessionStatus};

use crate::machine::Machine;
use crate::provider::{ProviderConfig, ProviderEvent, SessionProvider};

/// Supervisor tick for the QR staleness check.
const QR_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Capacity of the provider event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already starting or connected")]
    AlreadyActive,
    #[error("session is not ready to send (state {0})")]
    NotReady(SessionState),
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

type ProviderFactory =
    Box<dyn Fn() -> anyhow::Result<Arc<dyn SessionProvider>> + Send + Sync>;

struct State {
    machine: Machine,
    provider: Option<Arc<dyn SessionProvider>>,
    /// Bumped on every connect/teardown; event pumps from torn-down
    /// providers carry an older generation and are ignored.
    generation: u64,
}

/// Owns the one session per process: the status machine, the live provider,
/// and the QR refresh supervisor. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    factory: ProviderFactory,
    qr_max_age: TimeDelta,
    hooks: mpsc::Sender<HookEvent>,
    state: Mutex<State>,
}

impl SessionManager {
    pub fn new(config: ProviderConfig, qr_max_age: TimeDelta, hooks: mpsc::Sender<HookEvent>) -> Self {
        Self::with_factory(Box::new(move || config.build()), qr_max_age, hooks)
    }

    fn with_factory(
        factory: ProviderFactory,
        qr_max_age: TimeDelta,
        hooks: mpsc::Sender<HookEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                qr_max_age,
                hooks,
                state: Mutex::new(State {
                    machine: Machine::new(),
                    provider: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.state.lock().await.machine.status().clone()
    }

    pub async fn qr(&self) -> Option<(String, DateTime<Utc>)> {
        self.inner.state.lock().await.machine.qr()
    }

    /// Start the session. Rejected while a session is already starting or
    /// live — the duplicate-initialization guard.
    pub async fn connect(&self) -> Result<SessionStatus, SessionError> {
        let status = {
            let mut state = self.inner.state.lock().await;
            if state.machine.state().occupies_session() {
                return Err(SessionError::AlreadyActive);
            }
            self.start_locked(&mut state).await?;
            state.machine.status().clone()
        };

        self.emit_status(&status).await;
        Ok(status)
    }

    /// Tear the session down. Idempotent: disconnecting a dead session just
    /// reports DISCONNECTED again.
    pub async fn disconnect(&self) -> SessionStatus {
        let (status, old) = {
            let mut state = self.inner.state.lock().await;
            state.generation += 1;
            let old = state.provider.take();
            state.machine.mark_disconnected();
            (state.machine.status().clone(), old)
        };

        if let Some(provider) = old {
            provider.shutdown().await;
        }
        self.emit_status(&status).await;
        status
    }

    /// Send one message through the live session. Requires READY.
    pub async fn send_text(&self, phone: &str, body: &str) -> Result<String, SessionError> {
        let provider = {
            let state = self.inner.state.lock().await;
            if state.machine.state() != SessionState::Ready {
                return Err(SessionError::NotReady(state.machine.state()));
            }
            state
                .provider
                .clone()
                .ok_or(SessionError::NotReady(state.machine.state()))?
        };

        // Lock released: a slow send must not block status polling.
        Ok(provider.send_text(phone, body).await?)
    }

    /// Supervisor loop: every 15 seconds, recreate the whole provider
    /// session when the pending QR is older than the configured maximum.
    /// The underlying library will not refresh a stale QR on its own.
    pub async fn run_qr_refresh(self) {
        let mut interval = tokio::time::interval(QR_POLL_INTERVAL);
        // The first tick fires immediately; skip it.
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.refresh_stale_qr().await {
                warn!("QR refresh failed: {}", e);
            }
        }
    }

    async fn refresh_stale_qr(&self) -> Result<(), SessionError> {
        let status = {
            let mut state = self.inner.state.lock().await;
            if !state.machine.qr_is_stale(self.inner.qr_max_age) {
                return Ok(());
            }

            info!("login QR expired, recreating the browser session");
            state.generation += 1;
            if let Some(old) = state.provider.take() {
                old.shutdown().await;
            }

            self.start_locked(&mut state).await?;
            state.machine.status().clone()
        };

        self.emit_status(&status).await;
        Ok(())
    }

    /// Build and start a fresh provider. Caller holds the state lock and has
    /// already cleared any previous provider.
    async fn start_locked(&self, state: &mut State) -> Result<(), SessionError> {
        state.generation += 1;
        let generation = state.generation;
        state.machine.begin_connect();

        let provider = match (self.inner.factory)() {
            Ok(p) => p,
            Err(e) => {
                state.machine.mark_error(&e.to_string());
                return Err(SessionError::Provider(e));
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        if let Err(e) = provider.start(tx).await {
            state.machine.mark_error(&e.to_string());
            return Err(SessionError::Provider(e));
        }

        state.provider = Some(provider);
        tokio::spawn(self.clone().pump_events(rx, generation));
        Ok(())
    }

    async fn pump_events(self, mut rx: mpsc::Receiver<ProviderEvent>, generation: u64) {
        while let Some(event) = rx.recv().await {
            self.handle_event(generation, event).await;
        }
    }

    async fn handle_event(&self, generation: u64, event: ProviderEvent) {
        let (status, torn_down, hook) = {
            let mut state = self.inner.state.lock().await;
            if state.generation != generation {
                // Event from a provider that was already torn down.
                return;
            }

            let hook = match &event {
                ProviderEvent::Message {
                    phone,
                    body,
                    wa_message_id,
                } => Some(HookEvent::MessageReceived {
                    phone: phone.clone(),
                    body: body.clone(),
                    wa_message_id: wa_message_id.clone(),
                    received_at: Utc::now(),
                }),
                _ => None,
            };

            let changed = state.machine.apply(&event);

            // On disconnect/auth failure the client object is destroyed and
            // the service waits for an external /connect — no auto-retry.
            let torn_down = match &event {
                ProviderEvent::Disconnected { .. } | ProviderEvent::AuthFailure { .. } => {
                    state.generation += 1;
                    state.provider.take()
                }
                _ => None,
            };

            let status = changed.then(|| state.machine.status().clone());
            (status, torn_down, hook)
        };

        if let Some(provider) = torn_down {
            warn!("session dropped, destroying client (manual /connect required)");
            provider.shutdown().await;
        }

        if let Some(hook) = hook {
            if self.inner.hooks.send(hook).await.is_err() {
                warn!("hook channel closed, inbound message dropped");
            }
        }
        if let Some(status) = status {
            info!("session state -> {}", status.state);
            self.emit_status(&status).await;
        }
    }

    async fn emit_status(&self, status: &SessionStatus) {
        let _ = self
            .inner
            .hooks
            .send(HookEvent::StatusChanged {
                state: status.state,
                connected: status.connected,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Provider scripted from the test: start hands the event sender back
    /// out so the test can play the underlying library.
    struct ScriptedProvider {
        handle: Arc<Mutex<Option<mpsc::Sender<ProviderEvent>>>>,
    }

    #[async_trait]
    impl SessionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn start(&self, events: mpsc::Sender<ProviderEvent>) -> anyhow::Result<()> {
            *self.handle.lock().await = Some(events);
            Ok(())
        }

        async fn send_text(&self, _phone: &str, _body: &str) -> anyhow::Result<String> {
            Ok("WAID-1".into())
        }

        async fn shutdown(&self) {
            *self.handle.lock().await = None;
        }
    }

    fn scripted_manager() -> (
        SessionManager,
        Arc<Mutex<Option<mpsc::Sender<ProviderEvent>>>>,
        mpsc::Receiver<HookEvent>,
    ) {
        let handle: Arc<Mutex<Option<mpsc::Sender<ProviderEvent>>>> =
            Arc::new(Mutex::new(None));
        let factory_handle = handle.clone();
        let (hook_tx, hook_rx) = mpsc::channel(16);

        let manager = SessionManager::with_factory(
            Box::new(move || {
                Ok(Arc::new(ScriptedProvider {
                    handle: factory_handle.clone(),
                }) as Arc<dyn SessionProvider>)
            }),
            TimeDelta::seconds(60),
            hook_tx,
        );
        (manager, handle, hook_rx)
    }

    async fn events_tx(
        handle: &Arc<Mutex<Option<mpsc::Sender<ProviderEvent>>>>,
    ) -> mpsc::Sender<ProviderEvent> {
        handle.lock().await.clone().expect("provider not started")
    }

    /// Drain hooks until the next StatusChanged and return its state.
    async fn next_state_change(rx: &mut mpsc::Receiver<HookEvent>) -> SessionState {
        loop {
            match rx.recv().await.expect("hook channel closed") {
                HookEvent::StatusChanged { state, .. } => return state,
                HookEvent::MessageReceived { .. } => continue,
            }
        }
    }

    #[tokio::test]
    async fn duplicate_connect_is_rejected() {
        let (manager, _, mut hooks) = scripted_manager();

        manager.connect().await.unwrap();
        assert_eq!(next_state_change(&mut hooks).await, SessionState::Connecting);

        match manager.connect().await {
            Err(SessionError::AlreadyActive) => {}
            other => panic!("expected AlreadyActive, got {:?}", other.map(|s| s.state)),
        }
    }

    #[tokio::test]
    async fn provider_events_drive_the_status() {
        let (manager, handle, mut hooks) = scripted_manager();
        manager.connect().await.unwrap();
        next_state_change(&mut hooks).await;

        let tx = events_tx(&handle).await;
        tx.send(ProviderEvent::Qr("2@abc".into())).await.unwrap();
        assert_eq!(next_state_change(&mut hooks).await, SessionState::QrRequired);
        assert!(manager.qr().await.is_some());

        tx.send(ProviderEvent::Authenticated).await.unwrap();
        assert_eq!(
            next_state_change(&mut hooks).await,
            SessionState::Authenticated
        );

        tx.send(ProviderEvent::Ready {
            phone: Some("5215512345678".into()),
        })
        .await
        .unwrap();
        assert_eq!(next_state_change(&mut hooks).await, SessionState::Ready);

        let status = manager.status().await;
        assert!(status.connected);
        assert!(status.qr.is_none());
    }

    #[tokio::test]
    async fn auth_failure_destroys_the_client_until_reconnect() {
        let (manager, handle, mut hooks) = scripted_manager();
        manager.connect().await.unwrap();
        next_state_change(&mut hooks).await;

        let tx = events_tx(&handle).await;
        tx.send(ProviderEvent::AuthFailure {
            reason: "token rejected".into(),
        })
        .await
        .unwrap();
        assert_eq!(next_state_change(&mut hooks).await, SessionState::Error);

        // No auto-retry: still in ERROR, sends rejected.
        match manager.send_text("5215512345678", "hola").await {
            Err(SessionError::NotReady(SessionState::Error)) => {}
            other => panic!("expected NotReady(Error), got {:?}", other),
        }

        // An explicit /connect is allowed again.
        manager.connect().await.unwrap();
        assert_eq!(next_state_change(&mut hooks).await, SessionState::Connecting);
    }

    #[tokio::test]
    async fn send_requires_ready() {
        let (manager, handle, mut hooks) = scripted_manager();
        manager.connect().await.unwrap();
        next_state_change(&mut hooks).await;

        assert!(matches!(
            manager.send_text("5215512345678", "hola").await,
            Err(SessionError::NotReady(SessionState::Connecting))
        ));

        events_tx(&handle)
            .await
            .send(ProviderEvent::Ready { phone: None })
            .await
            .unwrap();
        assert_eq!(next_state_change(&mut hooks).await, SessionState::Ready);

        let wa_id = manager.send_text("5215512345678", "hola").await.unwrap();
        assert_eq!(wa_id, "WAID-1");
    }

    #[tokio::test]
    async fn inbound_messages_become_hook_events() {
        let (manager, handle, mut hooks) = scripted_manager();
        manager.connect().await.unwrap();
        next_state_change(&mut hooks).await;

        events_tx(&handle)
            .await
            .send(ProviderEvent::Message {
                phone: "5215598765432".into(),
                body: "me interesa".into(),
                wa_message_id: Some("MSG1".into()),
            })
            .await
            .unwrap();

        match hooks.recv().await.unwrap() {
            HookEvent::MessageReceived { phone, body, .. } => {
                assert_eq!(phone, "5215598765432");
                assert_eq!(body, "me interesa");
            }
            other => panic!("unexpected hook: {:?}", other),
        }
        // State unchanged by an inbound message.
        assert_eq!(manager.status().await.state, SessionState::Connecting);
    }

    #[tokio::test]
    async fn explicit_disconnect_is_idempotent() {
        let (manager, _, mut hooks) = scripted_manager();
        manager.connect().await.unwrap();
        next_state_change(&mut hooks).await;

        let status = manager.disconnect().await;
        assert_eq!(status.state, SessionState::Disconnected);

        let again = manager.disconnect().await;
        assert_eq!(again.state, SessionState::Disconnected);
    }
}
