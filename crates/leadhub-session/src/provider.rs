use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bridge::BridgeProvider;

/// Events emitted by the underlying WhatsApp client, normalized across
/// whatever automation library sits behind the provider.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A login QR code was (re)issued.
    Qr(String),
    /// The account scanned the QR and the session authenticated.
    Authenticated,
    /// The client finished loading and can send messages.
    Ready { phone: Option<String> },
    /// The session dropped (phone offline, browser crash, unlink).
    Disconnected { reason: String },
    /// Authentication was rejected (stale or invalidated credentials).
    AuthFailure { reason: String },
    /// An inbound message arrived.
    Message {
        phone: String,
        body: String,
        wa_message_id: Option<String>,
    },
}

/// The single seam over the browser-automation client. One trait, one
/// concrete implementation, selected by configuration — the duplicated
/// per-library wrapper modules of the original system collapse here.
///
/// Methods take `&self`: implementations keep their client handle behind
/// their own locks so the manager can hold an `Arc<dyn SessionProvider>`
/// and keep serving status polls while a send is in flight.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start the underlying client. Events flow into `events` until the
    /// provider shuts down or the client dies.
    async fn start(&self, events: mpsc::Sender<ProviderEvent>) -> anyhow::Result<()>;

    /// Deliver one text message. Returns the client's message id.
    async fn send_text(&self, phone: &str, body: &str) -> anyhow::Result<String>;

    /// Log out if the client is still responsive, then tear it down.
    /// Must be safe to call on an already-dead client.
    async fn shutdown(&self);
}

/// Provider selection, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider kind; `bridge` is the only one shipped.
    pub kind: String,
    /// Command line that launches the headless WhatsApp Web bridge.
    pub bridge_cmd: String,
    /// Directory handed to the bridge for its own session/token storage.
    pub session_dir: PathBuf,
}

impl ProviderConfig {
    pub fn build(&self) -> anyhow::Result<Arc<dyn SessionProvider>> {
        match self.kind.as_str() {
            "bridge" => Ok(Arc::new(BridgeProvider::new(
                self.bridge_cmd.clone(),
                self.session_dir.clone(),
            ))),
            other => anyhow::bail!("unknown session provider kind: {}", other),
        }
    }
}
